use crate::convert::{normalize_date, normalize_time};
use crate::segment::RawSegment;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Header information from the GS segment which opens a functional group.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupHeader {
    /// Identifies the function of this group (`HP` health care payment,
    /// `HC` health care claim, `HS`/`HB` eligibility, `HR`/`HN` claim
    /// status).
    pub functional_id_code: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Group date in CCYYMMDD form.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_iso: Option<String>,
    /// Group time, expressed in 24-hour clock as HHMM or HHMMSS.
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_iso: Option<String>,
    /// Control number, paired with the closing GE segment.
    pub control_number: String,
    /// Code identifying the issuer of the standard.
    pub agency_code: String,
    /// Version, release and industry identifier of the standard in use.
    pub version: String,
}

impl GroupHeader {
    pub(crate) fn from_segment(segment: &RawSegment) -> GroupHeader {
        let date = segment.element(4).to_string();
        let time = segment.element(5).to_string();
        GroupHeader {
            functional_id_code: segment.element(1).to_string(),
            sender_id: segment.element(2).to_string(),
            receiver_id: segment.element(3).to_string(),
            date_iso: normalize_date(&date),
            date,
            time_iso: normalize_time(&time),
            time,
            control_number: segment.element(6).to_string(),
            agency_code: segment.element(7).to_string(),
            version: segment.element(8).to_string(),
        }
    }
}

/// One GS/GE functional group and the transactions inside it.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionalGroup {
    pub header: GroupHeader,
    pub transactions: Vec<Transaction>,
    /// Segments that appeared inside the group but outside any
    /// transaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trailing: Vec<RawSegment>,
}

impl FunctionalGroup {
    pub(crate) fn open(segment: &RawSegment) -> FunctionalGroup {
        FunctionalGroup {
            header: GroupHeader::from_segment(segment),
            transactions: Vec::new(),
            trailing: Vec::new(),
        }
    }
}

#[test]
fn header_parses_from_gs_tokens() {
    let elements: Vec<String> = [
        "HP", "SENDERGS", "007326879", "20020226", "1534", "1", "X", "004010",
    ]
    .iter()
    .map(|e| e.to_string())
    .collect();
    let header = GroupHeader::from_segment(&RawSegment::new("GS", elements));
    assert_eq!(header.functional_id_code, "HP");
    assert_eq!(header.sender_id, "SENDERGS");
    assert_eq!(header.control_number, "1");
    assert_eq!(header.date_iso.as_deref(), Some("2002-02-26"));
    assert_eq!(header.version, "004010");
}
