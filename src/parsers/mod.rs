//! Per-transaction segment-to-payload parsers.
//!
//! Every parser receives the buffered segment list for one transaction
//! frame (`ST` through `SE` inclusive) and produces a typed payload. The
//! robustness rules are shared: element access never faults, dates and
//! times keep their raw wire form next to a normalized form, and numeric
//! fields fall back to a default while retaining the raw element.

pub mod hierarchy;
mod t270;
mod t276;
mod t835;
mod t837p;

pub use t270::{Eligibility270, Eligibility271, Parser270};
pub use t276::{Parser276, Status276, Status277};
pub use t835::{Adjustment, Advice835, Claim, FinancialInfo, Parser835, Service};
pub use t837p::{Claim837P, Diagnosis, Parser837P, ProfessionalClaim, ServiceLine};

use crate::convert::{normalize_date, normalize_time};
use crate::handler::{ErrorHandler, ParseError};
use crate::segment::{Delimiters, RawSegment};
use crate::transaction::Payload;
use serde::{Deserialize, Serialize};

/// A parse result: the typed payload plus any segments the parser did not
/// recognize. Unknown tags are not an error; they stay attached to the
/// transaction as untyped segments.
#[derive(Debug)]
pub struct ParsedPayload {
    pub payload: Payload,
    pub extra_segments: Vec<RawSegment>,
}

impl ParsedPayload {
    pub fn new(payload: Payload) -> ParsedPayload {
        ParsedPayload {
            payload,
            extra_segments: Vec::new(),
        }
    }
}

/// A segment-to-payload converter for one or more transaction set codes.
pub trait TransactionParser: Send + Sync {
    /// The transaction set codes this parser accepts.
    fn supported_codes(&self) -> &[&'static str];

    /// Minimal envelope sanity: the frame opens with an `ST` carrying a
    /// supported code and the transaction's mandatory second segment is
    /// present.
    fn validate_envelope(&self, segments: &[RawSegment]) -> bool;

    /// Convert the buffered frame into a payload, routing recoverable
    /// issues through the handler.
    fn parse(
        &self,
        segments: &[RawSegment],
        delimiters: Delimiters,
        handler: &mut ErrorHandler,
    ) -> Result<ParsedPayload, ParseError>;
}

pub(crate) fn find_segment<'a>(segments: &'a [RawSegment], tag: &str) -> Option<&'a RawSegment> {
    segments.iter().find(|s| s.is(tag))
}

/// Envelope check shared by the built-in parsers: an opening `ST` with one
/// of the supported codes plus the mandatory second segment.
pub(crate) fn envelope_opens_with(
    segments: &[RawSegment],
    codes: &[&str],
    mandatory_tag: &str,
) -> bool {
    let opens = segments
        .first()
        .map(|s| s.is("ST") && codes.contains(&s.element(1)))
        .unwrap_or(false);
    opens && find_segment(segments, mandatory_tag).is_some()
}

/// A named party from an `N1` or `NM1` loop, with any address and contact
/// segments that followed it.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    /// Entity identifier code (`PR` payer, `PE` payee, `IL` subscriber,
    /// `QC` patient, `85` billing provider, ...).
    pub code: String,
    /// Organization or last name.
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id_qualifier: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<Contact>,
}

impl Entity {
    /// Build from an `N1` segment: code, name, id qualifier, id.
    pub(crate) fn from_n1(segment: &RawSegment) -> Entity {
        Entity {
            code: segment.element(1).to_string(),
            name: segment.element(2).to_string(),
            id_qualifier: segment.element(3).to_string(),
            id: segment.element(4).to_string(),
            ..Entity::default()
        }
    }

    /// Build from an `NM1` segment: code, last/org name, first name, id
    /// qualifier at position 8 and id at position 9.
    pub(crate) fn from_nm1(segment: &RawSegment) -> Entity {
        Entity {
            code: segment.element(1).to_string(),
            name: segment.element(3).to_string(),
            first_name: segment.element(4).to_string(),
            id_qualifier: segment.element(8).to_string(),
            id: segment.element(9).to_string(),
            ..Entity::default()
        }
    }

    /// Fold a trailing `N3`, `N4` or `PER` segment into this entity.
    pub(crate) fn absorb(&mut self, segment: &RawSegment) {
        match segment.tag.as_str() {
            "N3" => {
                let address = self.address.get_or_insert_with(Address::default);
                address.line1 = segment.element(1).to_string();
                address.line2 = segment.element(2).to_string();
            }
            "N4" => {
                let address = self.address.get_or_insert_with(Address::default);
                address.city = segment.element(1).to_string();
                address.state = segment.element(2).to_string();
                address.postal_code = segment.element(3).to_string();
            }
            "PER" => self.contacts.push(Contact::from_per(segment)),
            _ => {}
        }
    }
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub line1: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub line2: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub city: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub postal_code: String,
}

/// Administrative contact from a `PER` segment.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    pub function_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub numbers: Vec<ContactNumber>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ContactNumber {
    pub qualifier: String,
    pub value: String,
}

impl Contact {
    fn from_per(segment: &RawSegment) -> Contact {
        let mut numbers = Vec::new();
        for position in [(3, 4), (5, 6), (7, 8)] {
            let qualifier = segment.element(position.0);
            let value = segment.element(position.1);
            if !qualifier.is_empty() || !value.is_empty() {
                numbers.push(ContactNumber {
                    qualifier: qualifier.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Contact {
            function_code: segment.element(1).to_string(),
            name: segment.element(2).to_string(),
            numbers,
        }
    }
}

/// A qualified reference number from a `REF` segment.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceId {
    pub qualifier: String,
    pub value: String,
}

impl ReferenceId {
    pub(crate) fn from_ref(segment: &RawSegment) -> ReferenceId {
        ReferenceId {
            qualifier: segment.element(1).to_string(),
            value: segment.element(2).to_string(),
        }
    }
}

/// A qualified date from a `DTM` or `DTP` segment. The raw wire form is
/// always kept; the ISO form only exists when the element matched a known
/// date shape.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DateValue {
    pub qualifier: String,
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl DateValue {
    pub(crate) fn from_dtm(segment: &RawSegment) -> DateValue {
        let raw = segment.element(2).to_string();
        DateValue {
            qualifier: segment.element(1).to_string(),
            iso: normalize_date(&raw),
            time: normalize_time(segment.element(3)),
            raw,
        }
    }

    /// `DTP` carries a format qualifier at position 2; only plain `D8`
    /// dates normalize, ranges (`RD8`) keep the raw form.
    pub(crate) fn from_dtp(segment: &RawSegment) -> DateValue {
        let raw = segment.element(3).to_string();
        let iso = match segment.element(2) {
            "D8" | "" => normalize_date(&raw),
            _ => None,
        };
        DateValue {
            qualifier: segment.element(1).to_string(),
            iso,
            time: None,
            raw,
        }
    }
}

/// A trace number from a `TRN` segment.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_type: String,
    pub reference: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
}

impl Trace {
    pub(crate) fn from_trn(segment: &RawSegment) -> Trace {
        Trace {
            trace_type: segment.element(1).to_string(),
            reference: segment.element(2).to_string(),
            origin: segment.element(3).to_string(),
        }
    }
}

/// Informational note when an anchor segment carries fewer elements than
/// its layout defines. The parse still proceeds with empty defaults.
pub(crate) fn note_short_segment(
    segment: &RawSegment,
    expected: usize,
    handler: &mut ErrorHandler,
) -> Result<(), ParseError> {
    if segment.len() < expected {
        handler.report(
            crate::diagnostic::Diagnostic::info(
                crate::diagnostic::codes::SHORT_SEGMENT,
                format!(
                    "{} segment has {} of {} elements",
                    segment.tag,
                    segment.len(),
                    expected
                ),
            )
            .with_value(segment.tag.clone()),
        )?;
    }
    Ok(())
}

#[test]
fn entity_absorbs_address_and_contact_segments() {
    let mut entity = Entity::from_n1(&RawSegment::new(
        "N1",
        vec!["PE".into(), "CLINIC".into(), "XX".into(), "1234567893".into()],
    ));
    entity.absorb(&RawSegment::new("N3", vec!["100 MAIN ST".into()]));
    entity.absorb(&RawSegment::new(
        "N4",
        vec!["SPRINGFIELD".into(), "IL".into(), "62704".into()],
    ));
    entity.absorb(&RawSegment::new(
        "PER",
        vec!["IC".into(), "BILLING".into(), "TE".into(), "5551234567".into()],
    ));
    assert_eq!(entity.code, "PE");
    assert_eq!(entity.id, "1234567893");
    let address = entity.address.unwrap();
    assert_eq!(address.city, "SPRINGFIELD");
    assert_eq!(entity.contacts[0].numbers[0].value, "5551234567");
}

#[test]
fn dtp_ranges_keep_only_the_raw_form() {
    let range = DateValue::from_dtp(&RawSegment::new(
        "DTP",
        vec!["472".into(), "RD8".into(), "20240101-20240131".into()],
    ));
    assert_eq!(range.iso, None);
    assert_eq!(range.raw, "20240101-20240131");

    let single = DateValue::from_dtp(&RawSegment::new(
        "DTP",
        vec!["472".into(), "D8".into(), "20240115".into()],
    ));
    assert_eq!(single.iso.as_deref(), Some("2024-01-15"));
}
