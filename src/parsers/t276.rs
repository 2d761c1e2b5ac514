//! Health Care Claim Status Request and Notification (276/277).
//!
//! Same `BHT`/`HL` scaffolding as the eligibility pair. A 276 locates a
//! claim by trace numbers and `REF*1K` payer claim control references; the
//! 277 answers with `STC` status lines.

use crate::diagnostic::{codes, Diagnostic};
use crate::handler::{ErrorHandler, ParseError};
use crate::parsers::hierarchy::{build_hierarchy, BeginHierarchy, HierarchyLevel};
use crate::parsers::{ParsedPayload, TransactionParser};
use crate::segment::{Delimiters, RawSegment};
use crate::transaction::Payload;
use serde::{Deserialize, Serialize};

/// Claim status inquiry payload (276).
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status276 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bht: Option<BeginHierarchy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<HierarchyLevel>,
}

/// Claim status response payload (277).
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status277 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bht: Option<BeginHierarchy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<HierarchyLevel>,
}

pub struct Parser276;

impl TransactionParser for Parser276 {
    fn supported_codes(&self) -> &[&'static str] {
        &["276", "277"]
    }

    fn validate_envelope(&self, segments: &[RawSegment]) -> bool {
        super::envelope_opens_with(segments, self.supported_codes(), "BHT")
    }

    fn parse(
        &self,
        segments: &[RawSegment],
        delimiters: Delimiters,
        handler: &mut ErrorHandler,
    ) -> Result<ParsedPayload, ParseError> {
        let (bht, levels, extra_segments) = build_hierarchy(segments, delimiters, handler)?;
        if bht.is_none() {
            handler.report(Diagnostic::error(
                codes::MISSING_REQUIRED_SEGMENT,
                "claim status transaction has no BHT segment",
            ))?;
        }
        let set_code = segments.first().map(|s| s.element(1)).unwrap_or("");
        let payload = if set_code == "277" {
            Payload::StatusResponse(Status277 { bht, levels })
        } else {
            Payload::StatusInquiry(Status276 { bht, levels })
        };
        Ok(ParsedPayload {
            payload,
            extra_segments,
        })
    }
}

#[cfg(test)]
fn seg(raw: &str) -> RawSegment {
    let mut parts = raw.split('*');
    let tag = parts.next().unwrap().to_string();
    RawSegment::new(tag, parts.map(|p| p.to_string()).collect())
}

#[test]
fn status_inquiry_collects_traces_and_claim_references() {
    let segments: Vec<RawSegment> = [
        "ST*276*0001",
        "BHT*0010*13*INQ9001*20241226*1430",
        "HL*1**20*1",
        "NM1*PR*2*ACME HEALTH*****PI*12345",
        "HL*2*1*21*1",
        "HL*3*2*19*1",
        "NM1*1P*2*SPRINGFIELD CLINIC*****XX*1234567893",
        "HL*4*3*22*0",
        "TRN*1*CLAIMTRACE9",
        "NM1*IL*1*DOE*JANE****MI*MEMBER123",
        "REF*1K*PAYERCTL42",
        "DTP*232*RD8*20241201-20241215",
        "SE*12*0001",
    ]
    .iter()
    .map(|r| seg(r))
    .collect();

    let mut handler = ErrorHandler::collecting();
    let parsed = Parser276
        .parse(&segments, Delimiters::default(), &mut handler)
        .unwrap();
    match parsed.payload {
        Payload::StatusInquiry(status) => {
            let subscriber = &status.levels[3];
            assert_eq!(subscriber.traces[0].reference, "CLAIMTRACE9");
            assert_eq!(subscriber.references[0].qualifier, "1K");
            assert_eq!(subscriber.references[0].value, "PAYERCTL42");
            assert_eq!(subscriber.dates[0].raw, "20241201-20241215");
            assert_eq!(subscriber.dates[0].iso, None);
        }
        other => panic!("expected a status inquiry, got {:?}", other),
    }
}

#[test]
fn status_response_parses_stc_composites() {
    let segments: Vec<RawSegment> = [
        "ST*277*0002",
        "BHT*0010*08*RESP9001*20241227*0900",
        "HL*1**20*1",
        "HL*2*1*21*1",
        "HL*3*2*22*0",
        "STC*P3:65*20241227*WQ*500.00*400.00",
        "SE*7*0002",
    ]
    .iter()
    .map(|r| seg(r))
    .collect();

    let mut handler = ErrorHandler::collecting();
    let parsed = Parser276
        .parse(&segments, Delimiters::default(), &mut handler)
        .unwrap();
    match parsed.payload {
        Payload::StatusResponse(status) => {
            let line = &status.levels[2].statuses[0];
            assert_eq!(line.status_category, "P3");
            assert_eq!(line.status_code, "65");
            assert_eq!(line.effective_date_iso.as_deref(), Some("2024-12-27"));
            assert_eq!(line.total_charge.unwrap().to_string(), "500.00");
        }
        other => panic!("expected a status response, got {:?}", other),
    }
}
