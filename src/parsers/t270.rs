//! Eligibility, Coverage or Benefit Inquiry and Information (270/271).
//!
//! Both sets share the `BHT` plus `HL` scaffolding: information source,
//! information receiver, subscriber and optional dependent levels. The 270
//! asks (`EQ` lines), the 271 answers (`EB` lines).

use crate::diagnostic::{codes, Diagnostic};
use crate::handler::{ErrorHandler, ParseError};
use crate::parsers::hierarchy::{build_hierarchy, BeginHierarchy, HierarchyLevel};
use crate::parsers::{ParsedPayload, TransactionParser};
use crate::segment::{Delimiters, RawSegment};
use crate::transaction::Payload;
use serde::{Deserialize, Serialize};

/// Eligibility inquiry payload (270).
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Eligibility270 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bht: Option<BeginHierarchy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<HierarchyLevel>,
}

/// Eligibility response payload (271).
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Eligibility271 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bht: Option<BeginHierarchy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<HierarchyLevel>,
}

pub struct Parser270;

impl TransactionParser for Parser270 {
    fn supported_codes(&self) -> &[&'static str] {
        &["270", "271"]
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
                "eligibility transaction has no BHT segment",
            ))?;
        }
        let set_code = segments.first().map(|s| s.element(1)).unwrap_or("");
        let payload = if set_code == "271" {
            Payload::EligibilityResponse(Eligibility271 { bht, levels })
        } else {
            Payload::EligibilityInquiry(Eligibility270 { bht, levels })
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
fn set_code_selects_the_payload_variant() {
    let inquiry: Vec<RawSegment> = ["ST*270*0001", "BHT*0022*13*R1*20241226*1430", "SE*3*0001"]
        .iter()
        .map(|r| seg(r))
        .collect();
    let mut handler = ErrorHandler::collecting();
    let parsed = Parser270
        .parse(&inquiry, Delimiters::default(), &mut handler)
        .unwrap();
    assert!(matches!(parsed.payload, Payload::EligibilityInquiry(_)));

    let response: Vec<RawSegment> = [
        "ST*271*0002",
        "BHT*0022*11*R1*20241226*1430",
        "HL*1**20*1",
        "NM1*PR*2*ACME HEALTH*****PI*12345",
        "HL*2*1*21*1",
        "HL*3*2*22*0",
        "EB*1*IND*30**GOLD PLAN",
        "SE*8*0002",
    ]
    .iter()
    .map(|r| seg(r))
    .collect();
    let parsed = Parser270
        .parse(&response, Delimiters::default(), &mut handler)
        .unwrap();
    match parsed.payload {
        Payload::EligibilityResponse(eligibility) => {
            let benefit = &eligibility.levels[2].benefits[0];
            assert_eq!(benefit.info_code, "1");
            assert_eq!(benefit.plan_description, "GOLD PLAN");
        }
        other => panic!("expected an eligibility response, got {:?}", other),
    }
}

#[test]
fn missing_bht_is_reported() {
    let segments = vec![seg("ST*270*0001"), seg("SE*2*0001")];
    assert!(!Parser270.validate_envelope(&segments));
    let mut handler = ErrorHandler::collecting();
    Parser270
        .parse(&segments, Delimiters::default(), &mut handler)
        .unwrap();
    assert_eq!(
        handler.diagnostics()[0].code,
        codes::MISSING_REQUIRED_SEGMENT
    );
}
