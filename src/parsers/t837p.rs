//! Health Care Claim: Professional (837P).
//!
//! Validates the `BHT` and `HL` scaffolding, then groups everything between
//! one `CLM` and the next into a claim: `HI` diagnosis composites, `SV1`
//! service lines, claim-level dates and references. Entities met outside a
//! claim (billing provider, subscriber, patient) attach to their hierarchy
//! level.

use crate::convert::decimal_with_raw;
use crate::diagnostic::{codes, Diagnostic};
use crate::handler::{ErrorHandler, ParseError};
use crate::parsers::hierarchy::{BeginHierarchy, HierarchyLevel};
use crate::parsers::{
    note_short_segment, DateValue, Entity, ParsedPayload, ReferenceId, TransactionParser,
};
use crate::segment::{Delimiters, RawSegment};
use crate::transaction::Payload;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Professional claim payload for one 837P transaction.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claim837P {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bht: Option<BeginHierarchy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<HierarchyLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<ProfessionalClaim>,
}

/// One claim loop, opened by `CLM`.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfessionalClaim {
    pub claim_id: String,
    pub total_charge: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_charge_raw: Option<String>,
    /// First component of the `CLM05` place-of-service composite.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub facility_code: String,
    /// Third component of `CLM05`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub frequency_code: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnoses: Vec<Diagnosis>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceLine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<DateValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceId>,
}

/// A diagnosis code from an `HI` composite (`ABK:I10` style).
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub qualifier: String,
    pub code: String,
}

/// A billed service line from an `SV1` segment.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceLine {
    pub procedure_qualifier: String,
    pub procedure_code: String,
    pub charge: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_raw: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit_basis: String,
    pub units: Decimal,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnosis_pointers: Vec<String>,
}

impl ServiceLine {
    fn from_sv1(segment: &RawSegment, delimiters: Delimiters) -> ServiceLine {
        let (charge, charge_raw) = decimal_with_raw(segment.element(2), Decimal::ZERO);
        let (units, _) = decimal_with_raw(segment.element(4), Decimal::ONE);
        let pointers = segment
            .element(7)
            .split(delimiters.component)
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect();
        ServiceLine {
            procedure_qualifier: segment.component(1, 0, delimiters.component).to_string(),
            procedure_code: segment.component(1, 1, delimiters.component).to_string(),
            charge,
            charge_raw,
            unit_basis: segment.element(3).to_string(),
            units,
            diagnosis_pointers: pointers,
        }
    }
}

pub struct Parser837P;

impl TransactionParser for Parser837P {
    fn supported_codes(&self) -> &[&'static str] {
        &["837"]
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
        let mut payload = Claim837P::default();
        let mut extra_segments = Vec::new();
        let mut in_claim = false;

        for segment in segments {
            match segment.tag.as_str() {
                "ST" | "SE" => {}
                "BHT" => {
                    note_short_segment(segment, 4, handler)?;
                    payload.bht = Some(BeginHierarchy::from_bht(segment));
                }
                "HL" => {
                    note_short_segment(segment, 3, handler)?;
                    in_claim = false;
                    payload.levels.push(hierarchy_level(segment));
                }
                "CLM" => {
                    note_short_segment(segment, 2, handler)?;
                    in_claim = true;
                    payload.claims.push(claim_from_clm(segment, delimiters));
                }
                "HI" if in_claim => {
                    if let Some(claim) = payload.claims.last_mut() {
                        for position in 1..=segment.len() {
                            let qualifier = segment.component(position, 0, delimiters.component);
                            let code = segment.component(position, 1, delimiters.component);
                            if !code.is_empty() {
                                claim.diagnoses.push(Diagnosis {
                                    qualifier: qualifier.to_string(),
                                    code: code.to_string(),
                                });
                            }
                        }
                    }
                }
                "SV1" if in_claim => {
                    note_short_segment(segment, 2, handler)?;
                    if let Some(claim) = payload.claims.last_mut() {
                        claim.services.push(ServiceLine::from_sv1(segment, delimiters));
                    }
                }
                "DTP" if in_claim => {
                    if let Some(claim) = payload.claims.last_mut() {
                        claim.dates.push(DateValue::from_dtp(segment));
                    }
                }
                "REF" if in_claim => {
                    if let Some(claim) = payload.claims.last_mut() {
                        claim.references.push(ReferenceId::from_ref(segment));
                    }
                }
                "NM1" => match payload.levels.last_mut() {
                    Some(level) => level.entities.push(Entity::from_nm1(segment)),
                    None => extra_segments.push(segment.clone()),
                },
                "N3" | "N4" | "PER" => {
                    match payload.levels.last_mut().and_then(|l| l.entities.last_mut()) {
                        Some(entity) => entity.absorb(segment),
                        None => extra_segments.push(segment.clone()),
                    }
                }
                "DMG" | "DTM" | "DTP" | "TRN" => match payload.levels.last_mut() {
                    Some(level) => {
                        super::hierarchy::absorb_level_segment(level, segment, delimiters)
                    }
                    None => extra_segments.push(segment.clone()),
                },
                _ => extra_segments.push(segment.clone()),
            }
        }

        if payload.bht.is_none() {
            handler.report(Diagnostic::error(
                codes::MISSING_REQUIRED_SEGMENT,
                "837P transaction has no BHT segment",
            ))?;
        }
        if payload.levels.is_empty() {
            handler.report(Diagnostic::error(
                codes::MISSING_REQUIRED_SEGMENT,
                "837P transaction has no HL hierarchy",
            ))?;
        }

        Ok(ParsedPayload {
            payload: Payload::ProfessionalClaim(payload),
            extra_segments,
        })
    }
}

fn hierarchy_level(segment: &RawSegment) -> HierarchyLevel {
    HierarchyLevel {
        id: segment.element(1).to_string(),
        parent_id: segment.element(2).to_string(),
        level_code: segment.element(3).to_string(),
        has_children: segment.element(4) == "1",
        ..HierarchyLevel::default()
    }
}

fn claim_from_clm(segment: &RawSegment, delimiters: Delimiters) -> ProfessionalClaim {
    let (total_charge, total_charge_raw) = decimal_with_raw(segment.element(2), Decimal::ZERO);
    ProfessionalClaim {
        claim_id: segment.element(1).to_string(),
        total_charge,
        total_charge_raw,
        facility_code: segment.component(5, 0, delimiters.component).to_string(),
        frequency_code: segment.component(5, 2, delimiters.component).to_string(),
        ..ProfessionalClaim::default()
    }
}

#[cfg(test)]
fn seg(raw: &str) -> RawSegment {
    let mut parts = raw.split('*');
    let tag = parts.next().unwrap().to_string();
    RawSegment::new(tag, parts.map(|p| p.to_string()).collect())
}

#[test]
fn claims_group_their_diagnoses_and_service_lines_by_position() {
    let segments: Vec<RawSegment> = [
        "ST*837*0001",
        "BHT*0019*00*BATCH1*20241226*1430*CH",
        "HL*1**20*1",
        "NM1*85*2*SPRINGFIELD CLINIC*****XX*1234567893",
        "HL*2*1*22*0",
        "NM1*IL*1*DOE*JANE****MI*MEMBER123",
        "CLM*CLAIM001*500.00***11:B:1",
        "HI*ABK:I10*ABF:E119",
        "SV1*HC:99213*350.00*UN*1***1",
        "SV1*HC:85025*150.00*UN*1***2",
        "CLM*CLAIM002*200.00***11:B:1",
        "HI*ABK:J069",
        "SV1*HC:99214*200.00*UN*1***1",
        "SE*13*0001",
    ]
    .iter()
    .map(|r| seg(r))
    .collect();

    let mut handler = ErrorHandler::collecting();
    let parsed = Parser837P
        .parse(&segments, Delimiters::default(), &mut handler)
        .unwrap();
    let payload = match parsed.payload {
        Payload::ProfessionalClaim(p) => p,
        other => panic!("expected a professional claim, got {:?}", other),
    };

    assert_eq!(payload.levels.len(), 2);
    assert_eq!(payload.levels[0].entities[0].id, "1234567893");
    assert_eq!(payload.claims.len(), 2);

    let first = &payload.claims[0];
    assert_eq!(first.claim_id, "CLAIM001");
    assert_eq!(first.total_charge.to_string(), "500.00");
    assert_eq!(first.facility_code, "11");
    assert_eq!(first.frequency_code, "1");
    assert_eq!(first.diagnoses.len(), 2);
    assert_eq!(first.diagnoses[1].code, "E119");
    assert_eq!(first.services.len(), 2);
    assert_eq!(first.services[0].procedure_code, "99213");
    assert_eq!(first.services[1].diagnosis_pointers, vec!["2"]);

    assert_eq!(payload.claims[1].services.len(), 1);
    assert!(handler.diagnostics().iter().all(|d| !d.is_blocking()));
}

#[test]
fn missing_scaffolding_is_reported() {
    let segments = vec![seg("ST*837*0001"), seg("CLM*X*10"), seg("SE*3*0001")];
    assert!(!Parser837P.validate_envelope(&segments));
    let mut handler = ErrorHandler::collecting();
    Parser837P
        .parse(&segments, Delimiters::default(), &mut handler)
        .unwrap();
    let blocking: Vec<&str> = handler
        .diagnostics()
        .iter()
        .filter(|d| d.is_blocking())
        .map(|d| d.code.as_str())
        .collect();
    assert_eq!(
        blocking,
        vec![codes::MISSING_REQUIRED_SEGMENT, codes::MISSING_REQUIRED_SEGMENT]
    );
}
