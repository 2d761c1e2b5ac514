use crate::parsers::{
    Advice835, Claim837P, Eligibility270, Eligibility271, Status276, Status277,
};
use crate::segment::RawSegment;
use csv::ReaderBuilder;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// Load the transaction set names from a csv.
// source: scraped from https://www.arcesb.com/edi/standards/x12/
lazy_static! {
    static ref SCHEMAS: HashMap<String, String> = {
        let mut map = HashMap::new();
        let schemas_path = format!("{}/resources/schemas.csv", env!("CARGO_MANIFEST_DIR"));
        let mut schemas_csv = ReaderBuilder::new()
            .has_headers(false)
            .from_path(schemas_path)
            .expect("Failed to open schemas.csv. Does resources/schemas.csv exist?");
        for record in schemas_csv.records() {
            let record = record.unwrap();
            map.insert(record[0].to_string(), record[1].to_string());
        }
        map
    };
}

/// The human-readable name of a transaction set code, or "unidentified"
/// when the catalogue does not know it.
pub fn transaction_name(set_code: &str) -> &'static str {
    match SCHEMAS.get(set_code) {
        Some(name) => name,
        None => "unidentified",
    }
}

/// Header data from the `ST` segment that opens a transaction.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionHeader {
    /// The three-digit code which selects the parser.
    pub set_code: String,
    /// The transaction type in human-readable form.
    pub transaction_name: String,
    /// Control number, paired with the closing `SE`.
    pub control_number: String,
    /// Implementation convention reference. Optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_reference: Option<String>,
}

impl TransactionHeader {
    pub(crate) fn from_st(segment: &RawSegment) -> TransactionHeader {
        let set_code = segment.element(1).to_string();
        let implementation_reference = match segment.element(3) {
            "" => None,
            reference => Some(reference.to_string()),
        };
        TransactionHeader {
            transaction_name: transaction_name(&set_code).to_string(),
            set_code,
            control_number: segment.element(2).to_string(),
            implementation_reference,
        }
    }
}

/// The transaction-specific payload, keyed by transaction set code.
///
/// A closed set of built-in variants plus an open `Custom` slot for
/// plugin-registered parsers and an `Untyped` fallback when no parser
/// claims the code. The variant tag serializes inline, so payload fields
/// sit directly on the transaction in the canonical projection.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "transaction_type")]
pub enum Payload {
    #[serde(rename = "835")]
    PaymentAdvice(Advice835),
    #[serde(rename = "837P")]
    ProfessionalClaim(Claim837P),
    #[serde(rename = "270")]
    EligibilityInquiry(Eligibility270),
    #[serde(rename = "271")]
    EligibilityResponse(Eligibility271),
    #[serde(rename = "276")]
    StatusInquiry(Status276),
    #[serde(rename = "277")]
    StatusResponse(Status277),
    #[serde(rename = "custom")]
    Custom { type_tag: String, value: Value },
    #[default]
    #[serde(rename = "untyped")]
    Untyped,
}

impl Payload {
    /// The tag identifying this payload kind.
    pub fn type_tag(&self) -> &str {
        match self {
            Payload::PaymentAdvice(_) => "835",
            Payload::ProfessionalClaim(_) => "837P",
            Payload::EligibilityInquiry(_) => "270",
            Payload::EligibilityResponse(_) => "271",
            Payload::StatusInquiry(_) => "276",
            Payload::StatusResponse(_) => "277",
            Payload::Custom { type_tag, .. } => type_tag,
            Payload::Untyped => "untyped",
        }
    }

    /// Whether this payload variant belongs with the given transaction set
    /// code. `Custom` and `Untyped` carry their own tags and match any.
    pub fn matches_set_code(&self, set_code: &str) -> bool {
        match self {
            Payload::PaymentAdvice(_) => set_code == "835",
            Payload::ProfessionalClaim(_) => set_code == "837",
            Payload::EligibilityInquiry(_) => set_code == "270",
            Payload::EligibilityResponse(_) => set_code == "271",
            Payload::StatusInquiry(_) => set_code == "276",
            Payload::StatusResponse(_) => set_code == "277",
            Payload::Custom { .. } | Payload::Untyped => true,
        }
    }
}

/// One transaction: the `ST` header, exactly one payload, and any segments
/// no parser consumed.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub header: TransactionHeader,
    #[serde(flatten)]
    pub payload: Payload,
    /// Untyped pass-through segments attached to this transaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<RawSegment>,
}

impl Transaction {
    /// The canonical dictionary projection: header plus the payload fields
    /// at the transaction level. This is the value business rules resolve
    /// field paths against.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[test]
fn catalogue_spot_checks() {
    assert_eq!(transaction_name("835"), "Health Care Claim Payment/Advice");
    assert_eq!(transaction_name("270"), "Eligibility Coverage or Benefit Inquiry");
    assert_eq!(transaction_name("100"), "Insurance Plan Description");
    assert_eq!(transaction_name("999"), "Implementation Acknowledgment");
    assert_eq!(transaction_name("000"), "unidentified");
}

#[test]
fn header_parses_from_st_tokens() {
    let segment = RawSegment::new("ST", vec!["835".into(), "0001".into()]);
    let header = TransactionHeader::from_st(&segment);
    assert_eq!(header.set_code, "835");
    assert_eq!(header.control_number, "0001");
    assert_eq!(header.transaction_name, "Health Care Claim Payment/Advice");
    assert_eq!(header.implementation_reference, None);
}

#[test]
fn payload_tags_agree_with_set_codes() {
    assert!(Payload::PaymentAdvice(Advice835::default()).matches_set_code("835"));
    assert!(!Payload::PaymentAdvice(Advice835::default()).matches_set_code("837"));
    assert!(Payload::Untyped.matches_set_code("850"));
    let custom = Payload::Custom {
        type_tag: "850-po".to_string(),
        value: Value::Null,
    };
    assert_eq!(custom.type_tag(), "850-po");
    assert!(custom.matches_set_code("850"));
}

#[test]
fn projection_inlines_payload_fields() {
    let transaction = Transaction {
        header: TransactionHeader::from_st(&RawSegment::new(
            "ST",
            vec!["835".into(), "0001".into()],
        )),
        payload: Payload::PaymentAdvice(Advice835::default()),
        segments: Vec::new(),
    };
    let value = transaction.to_value();
    assert_eq!(value["header"]["set_code"], "835");
    assert_eq!(value["transaction_type"], "835");
    // payload fields live at the transaction level, not under a wrapper key
    assert!(value.get("payload").is_none());

    let restored: Transaction = serde_json::from_value(value).unwrap();
    assert_eq!(restored, transaction);
}
