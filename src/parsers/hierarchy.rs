//! Shared scaffolding for the hierarchical transaction sets (270/271,
//! 276/277 and the 837P preamble): the `BHT` beginning segment and the
//! `HL` loop structure that everything else hangs off.

use crate::convert::{decimal_with_raw, normalize_date, normalize_time};
use crate::handler::{ErrorHandler, ParseError};
use crate::parsers::{note_short_segment, DateValue, Entity, ReferenceId, Trace};
use crate::segment::{Delimiters, RawSegment};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Beginning of hierarchical transaction (`BHT`).
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeginHierarchy {
    pub structure_code: String,
    pub purpose_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_iso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transaction_type: String,
}

impl BeginHierarchy {
    pub(crate) fn from_bht(segment: &RawSegment) -> BeginHierarchy {
        let date = segment.element(4).to_string();
        BeginHierarchy {
            structure_code: segment.element(1).to_string(),
            purpose_code: segment.element(2).to_string(),
            reference: segment.element(3).to_string(),
            date_iso: normalize_date(&date),
            date,
            time: normalize_time(segment.element(5)),
            transaction_type: segment.element(6).to_string(),
        }
    }
}

/// One `HL` loop and everything nested under it. Which of the loop vectors
/// fill in depends on the transaction set: 270s carry inquiries, 271s carry
/// benefits, 277s carry statuses.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchyLevel {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_id: String,
    /// Hierarchical level code (`20` information source, `21` receiver,
    /// `22` subscriber, `23` dependent, `19` provider of service).
    pub level_code: String,
    pub has_children: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<Trace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<DateValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics: Option<Demographics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inquiries: Vec<Inquiry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub benefits: Vec<Benefit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<StatusInfo>,
}

impl HierarchyLevel {
    fn from_hl(segment: &RawSegment) -> HierarchyLevel {
        HierarchyLevel {
            id: segment.element(1).to_string(),
            parent_id: segment.element(2).to_string(),
            level_code: segment.element(3).to_string(),
            has_children: segment.element(4) == "1",
            ..HierarchyLevel::default()
        }
    }
}

/// Subscriber or dependent demographics (`DMG`).
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Demographics {
    pub format_qualifier: String,
    pub birth_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date_iso: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gender: String,
}

/// An eligibility inquiry line (`EQ`, 270 only).
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inquiry {
    pub service_type_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub coverage_level: String,
}

/// An eligibility benefit line (`EB`, 271 only).
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Benefit {
    pub info_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub coverage_level: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub insurance_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

/// A claim status line (`STC`, 277 only). The first element is a composite
/// `category:code` pair.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusInfo {
    pub status_category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub effective_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date_iso: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_charge: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_paid: Option<Decimal>,
}

/// Walk a hierarchical transaction frame: the `BHT` header plus every `HL`
/// loop with its nested entities, traces, references, dates and
/// transaction-specific lines. Unrecognized segments come back untouched.
pub(crate) fn build_hierarchy(
    segments: &[RawSegment],
    delimiters: Delimiters,
    handler: &mut ErrorHandler,
) -> Result<(Option<BeginHierarchy>, Vec<HierarchyLevel>, Vec<RawSegment>), ParseError> {
    let mut begin = None;
    let mut levels: Vec<HierarchyLevel> = Vec::new();
    let mut extra = Vec::new();

    for segment in segments {
        match segment.tag.as_str() {
            "ST" | "SE" => {}
            "BHT" => {
                note_short_segment(segment, 4, handler)?;
                begin = Some(BeginHierarchy::from_bht(segment));
            }
            "HL" => {
                note_short_segment(segment, 3, handler)?;
                levels.push(HierarchyLevel::from_hl(segment));
            }
            _ => match levels.last_mut() {
                Some(level) => absorb_into_level(level, segment, delimiters, &mut extra),
                None => extra.push(segment.clone()),
            },
        }
    }
    Ok((begin, levels, extra))
}

/// Fold a recognized loop segment into a level, dropping anything else.
/// Used by the 837P parser, whose claim loops handle the rest themselves.
pub(crate) fn absorb_level_segment(
    level: &mut HierarchyLevel,
    segment: &RawSegment,
    delimiters: Delimiters,
) {
    let mut unrecognized = Vec::new();
    absorb_into_level(level, segment, delimiters, &mut unrecognized);
}

fn absorb_into_level(
    level: &mut HierarchyLevel,
    segment: &RawSegment,
    delimiters: Delimiters,
    extra: &mut Vec<RawSegment>,
) {
    match segment.tag.as_str() {
        "NM1" => level.entities.push(Entity::from_nm1(segment)),
        "N3" | "N4" | "PER" => match level.entities.last_mut() {
            Some(entity) => entity.absorb(segment),
            None => extra.push(segment.clone()),
        },
        "TRN" => level.traces.push(Trace::from_trn(segment)),
        "REF" => level.references.push(ReferenceId::from_ref(segment)),
        "DTP" => level.dates.push(DateValue::from_dtp(segment)),
        "DTM" => level.dates.push(DateValue::from_dtm(segment)),
        "DMG" => {
            let birth_date = segment.element(2).to_string();
            level.demographics = Some(Demographics {
                format_qualifier: segment.element(1).to_string(),
                birth_date_iso: normalize_date(&birth_date),
                birth_date,
                gender: segment.element(3).to_string(),
            });
        }
        "EQ" => level.inquiries.push(Inquiry {
            service_type_code: segment.element(1).to_string(),
            coverage_level: segment.element(3).to_string(),
        }),
        "EB" => {
            let amount = crate::convert::parse_decimal(segment.element(7));
            level.benefits.push(Benefit {
                info_code: segment.element(1).to_string(),
                coverage_level: segment.element(2).to_string(),
                service_type: segment.element(3).to_string(),
                insurance_type: segment.element(4).to_string(),
                plan_description: segment.element(5).to_string(),
                amount,
            });
        }
        "STC" => {
            let effective_date = segment.element(2).to_string();
            let (total_charge, _) = decimal_with_raw(segment.element(4), Decimal::ZERO);
            let (total_paid, _) = decimal_with_raw(segment.element(5), Decimal::ZERO);
            level.statuses.push(StatusInfo {
                status_category: segment.component(1, 0, delimiters.component).to_string(),
                status_code: segment.component(1, 1, delimiters.component).to_string(),
                effective_date_iso: normalize_date(&effective_date),
                effective_date,
                action_code: segment.element(3).to_string(),
                total_charge: non_zero_or_present(segment.element(4), total_charge),
                total_paid: non_zero_or_present(segment.element(5), total_paid),
            });
        }
        _ => extra.push(segment.clone()),
    }
}

fn non_zero_or_present(raw: &str, value: Decimal) -> Option<Decimal> {
    if raw.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
fn seg(raw: &str) -> RawSegment {
    let mut parts = raw.split('*');
    let tag = parts.next().unwrap().to_string();
    RawSegment::new(tag, parts.map(|p| p.to_string()).collect())
}

#[test]
fn hl_loops_collect_their_nested_segments() {
    let segments: Vec<RawSegment> = [
        "ST*270*0001",
        "BHT*0022*13*REF47517*20241226*1430",
        "HL*1**20*1",
        "NM1*PR*2*ACME HEALTH*****PI*12345",
        "HL*2*1*21*1",
        "NM1*1P*2*SPRINGFIELD CLINIC*****XX*1234567893",
        "HL*3*2*22*0",
        "TRN*1*TRACE1*9877281234",
        "NM1*IL*1*DOE*JANE****MI*MEMBER123",
        "DMG*D8*19850614*F",
        "DTP*291*D8*20241226",
        "EQ*30",
        "SE*12*0001",
    ]
    .iter()
    .map(|r| seg(r))
    .collect();

    let mut handler = ErrorHandler::collecting();
    let (begin, levels, extra) =
        build_hierarchy(&segments, Delimiters::default(), &mut handler).unwrap();

    let begin = begin.unwrap();
    assert_eq!(begin.structure_code, "0022");
    assert_eq!(begin.date_iso.as_deref(), Some("2024-12-26"));
    assert_eq!(begin.time.as_deref(), Some("14:30"));

    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0].level_code, "20");
    assert!(levels[0].has_children);
    assert_eq!(levels[1].parent_id, "1");
    let subscriber = &levels[2];
    assert!(!subscriber.has_children);
    assert_eq!(subscriber.traces[0].reference, "TRACE1");
    assert_eq!(subscriber.entities[0].name, "DOE");
    assert_eq!(
        subscriber.demographics.as_ref().unwrap().birth_date_iso.as_deref(),
        Some("1985-06-14")
    );
    assert_eq!(subscriber.inquiries[0].service_type_code, "30");
    assert!(extra.is_empty());
}

#[test]
fn segments_before_the_first_hl_pass_through() {
    let segments = vec![seg("ST*276*0001"), seg("PID*1"), seg("SE*2*0001")];
    let mut handler = ErrorHandler::collecting();
    let (begin, levels, extra) =
        build_hierarchy(&segments, Delimiters::default(), &mut handler).unwrap();
    assert!(begin.is_none());
    assert!(levels.is_empty());
    assert_eq!(extra.len(), 1);
    assert_eq!(extra[0].tag, "PID");
}
