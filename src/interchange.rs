use crate::convert::{normalize_date, normalize_time};
use crate::functional_group::FunctionalGroup;
use crate::segment::RawSegment;
use serde::{Deserialize, Serialize};

/// Header information from the ISA segment, commonly known as the
/// "envelope" in X12 EDI.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterchangeHeader {
    /// Code identifying the type of information in the authorization
    /// information element. Qualifiers are two-digit prefixes which
    /// categorize the following element.
    pub authorization_qualifier: String,
    pub authorization_information: String,
    /// Code identifying the type of information in the security
    /// information element.
    pub security_qualifier: String,
    pub security_information: String,
    /// Qualifier for the system/method of code structure used for the
    /// sender ID.
    pub sender_qualifier: String,
    /// Identification code published by the sender for other parties to
    /// use as the receiver ID to route data to them.
    pub sender_id: String,
    pub receiver_qualifier: String,
    pub receiver_id: String,
    /// Interchange date in YYMMDD form.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_iso: Option<String>,
    /// Interchange time in HHMM form.
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_iso: Option<String>,
    /// Code identifying the agency responsible for the control standard.
    pub standards_id: String,
    /// Version number of the interchange control segments.
    pub version: String,
    /// A control number assigned by the interchange sender, paired with
    /// the closing IEA.
    pub control_number: String,
    /// `0` when no acknowledgment is requested, `1` when it is.
    pub acknowledgment_requested: String,
    /// `P` production, `T` test, `I` information.
    pub test_indicator: String,
}

impl InterchangeHeader {
    pub(crate) fn from_segment(segment: &RawSegment) -> InterchangeHeader {
        let date = segment.element(9).to_string();
        let time = segment.element(10).to_string();
        InterchangeHeader {
            authorization_qualifier: segment.element(1).to_string(),
            authorization_information: segment.element(2).to_string(),
            security_qualifier: segment.element(3).to_string(),
            security_information: segment.element(4).to_string(),
            sender_qualifier: segment.element(5).to_string(),
            sender_id: segment.element(6).to_string(),
            receiver_qualifier: segment.element(7).to_string(),
            receiver_id: segment.element(8).to_string(),
            date_iso: normalize_date(&date),
            date,
            time_iso: normalize_time(&time),
            time,
            standards_id: segment.element(11).to_string(),
            version: segment.element(12).to_string(),
            control_number: segment.element(13).to_string(),
            acknowledgment_requested: segment.element(14).to_string(),
            test_indicator: segment.element(15).to_string(),
        }
    }
}

/// One interchange: the ISA/IEA envelope and the functional groups inside
/// it.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interchange {
    pub header: InterchangeHeader,
    pub functional_groups: Vec<FunctionalGroup>,
    /// Segments that appeared directly inside the interchange, outside any
    /// functional group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trailing: Vec<RawSegment>,
}

impl Interchange {
    pub(crate) fn open(segment: &RawSegment) -> Interchange {
        Interchange {
            header: InterchangeHeader::from_segment(segment),
            functional_groups: Vec::new(),
            trailing: Vec::new(),
        }
    }
}

#[test]
fn header_parses_from_isa_tokens() {
    let elements: Vec<String> = [
        "00", "", "00", "", "ZZ", "SENDERISA", "14", "0073268795005", "020226", "1534", "U",
        "00401", "000000001", "0", "T", ">",
    ]
    .iter()
    .map(|e| e.to_string())
    .collect();
    let header = InterchangeHeader::from_segment(&RawSegment::new("ISA", elements));
    assert_eq!(header.sender_id, "SENDERISA");
    assert_eq!(header.receiver_id, "0073268795005");
    assert_eq!(header.control_number, "000000001");
    assert_eq!(header.date, "020226");
    assert_eq!(header.date_iso.as_deref(), Some("2002-02-26"));
    assert_eq!(header.time_iso.as_deref(), Some("15:34"));
    assert_eq!(header.test_indicator, "T");
}

#[test]
fn short_isa_reads_as_empty_fields() {
    let header = InterchangeHeader::from_segment(&RawSegment::new("ISA", vec!["00".into()]));
    assert_eq!(header.authorization_qualifier, "00");
    assert_eq!(header.sender_id, "");
    assert_eq!(header.date_iso, None);
}
