//! Health Care Claim Payment/Advice (835).
//!
//! An 835 reports how a payer settled one or more claims: the payment
//! itself (`BPR`), the payer and payee identities (`N1` loops), and a claim
//! loop per `CLP` carrying adjustments (`CAS`) and service lines (`SVC`).

use crate::convert::{decimal_with_raw, normalize_date, parse_int_or};
use crate::diagnostic::{codes, Diagnostic};
use crate::handler::{ErrorHandler, ParseError};
use crate::parsers::{
    note_short_segment, DateValue, Entity, ParsedPayload, ReferenceId, Trace, TransactionParser,
};
use crate::segment::{Delimiters, RawSegment};
use crate::transaction::Payload;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment-advice payload for one 835 transaction.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Advice835 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_info: Option<FinancialInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
    /// Production date (`DTM*405`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_date: Option<DateValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<Entity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_numbers: Vec<ReferenceId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<DateValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<Claim>,
}

/// Financial information from the `BPR` segment.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialInfo {
    /// Transaction handling code (`I` remittance with payment, `H` notice
    /// only, ...).
    pub handling_code: String,
    pub total_paid: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_paid_raw: Option<String>,
    /// `C` credit or `D` debit.
    pub credit_debit: String,
    /// Payment method code (`ACH`, `CHK`, `FWT`, `NON`, ...).
    pub method: String,
    /// Payment date as it appeared on the wire.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_iso: Option<String>,
}

impl FinancialInfo {
    fn from_bpr(segment: &RawSegment) -> FinancialInfo {
        let (total_paid, total_paid_raw) = decimal_with_raw(segment.element(2), Decimal::ZERO);
        let date = segment.element(11).to_string();
        FinancialInfo {
            handling_code: segment.element(1).to_string(),
            total_paid,
            total_paid_raw,
            credit_debit: segment.element(3).to_string(),
            method: segment.element(4).to_string(),
            date_iso: normalize_date(&date),
            date,
        }
    }
}

/// One claim payment loop, opened by `CLP`.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: String,
    pub status_code: i64,
    pub total_charge: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_charge_raw: Option<String>,
    pub total_paid: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_paid_raw: Option<String>,
    pub patient_responsibility: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_responsibility_raw: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub claim_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payer_control_number: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub facility_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Entity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<DateValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<Adjustment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
}

impl Claim {
    fn from_clp(segment: &RawSegment) -> Claim {
        let (total_charge, total_charge_raw) = decimal_with_raw(segment.element(3), Decimal::ZERO);
        let (total_paid, total_paid_raw) = decimal_with_raw(segment.element(4), Decimal::ZERO);
        let (patient_responsibility, patient_responsibility_raw) =
            decimal_with_raw(segment.element(5), Decimal::ZERO);
        Claim {
            claim_id: segment.element(1).to_string(),
            status_code: parse_int_or(segment.element(2), 0),
            total_charge,
            total_charge_raw,
            total_paid,
            total_paid_raw,
            patient_responsibility,
            patient_responsibility_raw,
            claim_type: segment.element(6).to_string(),
            payer_control_number: segment.element(7).to_string(),
            facility_code: segment.element(8).to_string(),
            ..Claim::default()
        }
    }
}

/// A claim adjustment from a `CAS` segment.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Adjustment {
    /// Adjustment group (`CO`, `CR`, `OA`, `PI`, `PR`).
    pub group_code: String,
    pub reason_code: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_raw: Option<String>,
    pub quantity: Decimal,
}

impl Adjustment {
    fn from_cas(segment: &RawSegment) -> Adjustment {
        let (amount, amount_raw) = decimal_with_raw(segment.element(3), Decimal::ZERO);
        let (quantity, _) = decimal_with_raw(segment.element(4), Decimal::ONE);
        Adjustment {
            group_code: segment.element(1).to_string(),
            reason_code: segment.element(2).to_string(),
            amount,
            amount_raw,
            quantity,
        }
    }
}

/// A paid service line from an `SVC` segment.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    /// Composite qualifier of the procedure (`HC`, `AD`, ...).
    pub procedure_qualifier: String,
    pub procedure_code: String,
    pub charge: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_raw: Option<String>,
    pub paid: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_raw: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revenue_code: String,
    pub units: Decimal,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<DateValue>,
}

impl Service {
    fn from_svc(segment: &RawSegment, delimiters: Delimiters) -> Service {
        let (charge, charge_raw) = decimal_with_raw(segment.element(2), Decimal::ZERO);
        let (paid, paid_raw) = decimal_with_raw(segment.element(3), Decimal::ZERO);
        let (units, _) = decimal_with_raw(segment.element(5), Decimal::ONE);
        Service {
            procedure_qualifier: segment.component(1, 0, delimiters.component).to_string(),
            procedure_code: segment.component(1, 1, delimiters.component).to_string(),
            charge,
            charge_raw,
            paid,
            paid_raw,
            revenue_code: segment.element(4).to_string(),
            units,
            dates: Vec::new(),
        }
    }
}

pub struct Parser835;

impl TransactionParser for Parser835 {
    fn supported_codes(&self) -> &[&'static str] {
        &["835"]
    }

    fn validate_envelope(&self, segments: &[RawSegment]) -> bool {
        super::envelope_opens_with(segments, self.supported_codes(), "BPR")
    }

    fn parse(
        &self,
        segments: &[RawSegment],
        delimiters: Delimiters,
        handler: &mut ErrorHandler,
    ) -> Result<ParsedPayload, ParseError> {
        let mut advice = Advice835::default();
        let mut extra_segments = Vec::new();
        // Which open scope absorbs qualifier-less segments: the payer/payee
        // entity currently being built, or the claim loop once CLP starts.
        let mut open_entity: Option<Entity> = None;
        let mut in_claims = false;

        for segment in segments {
            match segment.tag.as_str() {
                "ST" | "SE" => {}
                "BPR" => {
                    note_short_segment(segment, 4, handler)?;
                    advice.financial_info = Some(FinancialInfo::from_bpr(segment));
                }
                "TRN" => advice.trace = Some(Trace::from_trn(segment)),
                "N1" => {
                    close_entity(&mut advice, open_entity.take());
                    match segment.qualifier() {
                        "PR" | "PE" => open_entity = Some(Entity::from_n1(segment)),
                        _ => extra_segments.push(segment.clone()),
                    }
                }
                "N3" | "N4" | "PER" => match open_entity.as_mut() {
                    Some(entity) => entity.absorb(segment),
                    None => extra_segments.push(segment.clone()),
                },
                "CLP" => {
                    note_short_segment(segment, 4, handler)?;
                    close_entity(&mut advice, open_entity.take());
                    in_claims = true;
                    advice.claims.push(Claim::from_clp(segment));
                }
                "CAS" if in_claims => {
                    note_short_segment(segment, 3, handler)?;
                    if let Some(claim) = advice.claims.last_mut() {
                        claim.adjustments.push(Adjustment::from_cas(segment));
                    }
                }
                "SVC" if in_claims => {
                    note_short_segment(segment, 3, handler)?;
                    if let Some(claim) = advice.claims.last_mut() {
                        claim.services.push(Service::from_svc(segment, delimiters));
                    }
                }
                "NM1" if in_claims => {
                    if let Some(claim) = advice.claims.last_mut() {
                        if segment.qualifier() == "QC" {
                            claim.patient = Some(Entity::from_nm1(segment));
                        } else {
                            extra_segments.push(segment.clone());
                        }
                    }
                }
                "DTM" => {
                    let date = DateValue::from_dtm(segment);
                    if in_claims {
                        // Dates after a service line describe that service;
                        // earlier ones describe the claim.
                        if let Some(claim) = advice.claims.last_mut() {
                            match claim.services.last_mut() {
                                Some(service) => service.dates.push(date),
                                None => claim.dates.push(date),
                            }
                        }
                    } else if date.qualifier == "405" {
                        advice.production_date = Some(date);
                    } else {
                        advice.dates.push(date);
                    }
                }
                "REF" if !in_claims => {
                    advice.reference_numbers.push(ReferenceId::from_ref(segment));
                }
                _ => extra_segments.push(segment.clone()),
            }
        }
        close_entity(&mut advice, open_entity.take());

        if advice.financial_info.is_none() {
            handler.report(Diagnostic::error(
                codes::MISSING_REQUIRED_SEGMENT,
                "835 transaction has no BPR financial information segment",
            ))?;
        }

        Ok(ParsedPayload {
            payload: Payload::PaymentAdvice(advice),
            extra_segments,
        })
    }
}

fn close_entity(advice: &mut Advice835, entity: Option<Entity>) {
    if let Some(entity) = entity {
        match entity.code.as_str() {
            "PR" => advice.payer = Some(entity),
            "PE" => advice.payee = Some(entity),
            _ => {}
        }
    }
}

#[cfg(test)]
fn seg(raw: &str) -> RawSegment {
    let mut parts = raw.split('*');
    let tag = parts.next().unwrap().to_string();
    RawSegment::new(tag, parts.map(|p| p.to_string()).collect())
}

#[cfg(test)]
fn parse_fixture(raws: &[&str]) -> (Advice835, Vec<Diagnostic>) {
    let segments: Vec<RawSegment> = raws.iter().map(|r| seg(r)).collect();
    let mut handler = ErrorHandler::collecting();
    let parsed = Parser835
        .parse(&segments, Delimiters::default(), &mut handler)
        .unwrap();
    match parsed.payload {
        Payload::PaymentAdvice(advice) => (advice, handler.take_diagnostics()),
        other => panic!("expected a payment advice payload, got {:?}", other),
    }
}

#[test]
fn parses_a_minimal_payment_advice() {
    let (advice, diagnostics) = parse_fixture(&[
        "ST*835*0001",
        "BPR*I*1000.00*C*ACH*CCP*01*123456789*DA*987654321*PAYERCO*20241226",
        "TRN*1*TRACE123*1",
        "SE*3*0001",
    ]);
    let financial = advice.financial_info.unwrap();
    assert_eq!(financial.total_paid.to_string(), "1000.00");
    assert_eq!(financial.method, "ACH");
    assert_eq!(financial.date, "20241226");
    assert_eq!(financial.date_iso.as_deref(), Some("2024-12-26"));
    assert_eq!(advice.trace.unwrap().reference, "TRACE123");
    assert!(diagnostics.iter().all(|d| !d.is_blocking()));
}

#[test]
fn groups_claims_with_adjustments_and_services() {
    let (advice, _) = parse_fixture(&[
        "ST*835*0001",
        "BPR*I*450.00*C*ACH",
        "N1*PR*ACME HEALTH",
        "N1*PE*SPRINGFIELD CLINIC*XX*1234567893",
        "CLP*CLAIM001*1*500.00*400.00*100.00*12*PAYER123*11",
        "NM1*QC*1*DOE*JANE",
        "DTM*232*20241215",
        "CAS*PR*1*100.00",
        "SVC*HC:99213*500.00*400.00**1",
        "DTM*472*20241215",
        "CLP*CLAIM002*1*100.00*50.00*50.00",
        "SE*10*0001",
    ]);
    assert_eq!(advice.payer.as_ref().unwrap().name, "ACME HEALTH");
    assert_eq!(advice.payee.as_ref().unwrap().id, "1234567893");
    assert_eq!(advice.claims.len(), 2);

    let first = &advice.claims[0];
    assert_eq!(first.claim_id, "CLAIM001");
    assert_eq!(first.status_code, 1);
    assert_eq!(first.patient.as_ref().unwrap().name, "DOE");
    assert_eq!(first.dates[0].iso.as_deref(), Some("2024-12-15"));
    assert_eq!(first.adjustments[0].group_code, "PR");
    assert_eq!(first.adjustments[0].amount.to_string(), "100.00");
    let service = &first.services[0];
    assert_eq!(service.procedure_qualifier, "HC");
    assert_eq!(service.procedure_code, "99213");
    assert_eq!(service.units, Decimal::ONE);
    assert_eq!(service.dates[0].qualifier, "472");

    assert_eq!(advice.claims[1].total_paid.to_string(), "50.00");
}

#[test]
fn short_segments_read_as_empty_and_defaults() {
    let (advice, diagnostics) = parse_fixture(&["ST*835*0001", "BPR*I", "CLP*X", "SE*4*0001"]);
    let financial = advice.financial_info.unwrap();
    assert_eq!(financial.total_paid, Decimal::ZERO);
    assert_eq!(financial.date, "");
    assert_eq!(financial.date_iso, None);
    assert_eq!(advice.claims[0].claim_id, "X");
    assert_eq!(advice.claims[0].total_charge, Decimal::ZERO);
    assert!(diagnostics.iter().any(|d| d.code == codes::SHORT_SEGMENT));
}

#[test]
fn missing_bpr_is_a_blocking_diagnostic() {
    let segments = vec![seg("ST*835*0001"), seg("SE*2*0001")];
    assert!(!Parser835.validate_envelope(&segments));
    let mut handler = ErrorHandler::collecting();
    Parser835
        .parse(&segments, Delimiters::default(), &mut handler)
        .unwrap();
    assert_eq!(
        handler.diagnostics()[0].code,
        codes::MISSING_REQUIRED_SEGMENT
    );
}

#[test]
fn unparseable_amounts_keep_the_raw_element() {
    let (advice, _) = parse_fixture(&[
        "ST*835*0001",
        "BPR*I*NOT_A_NUMBER*C*ACH",
        "SE*3*0001",
    ]);
    let financial = advice.financial_info.unwrap();
    assert_eq!(financial.total_paid, Decimal::ZERO);
    assert_eq!(financial.total_paid_raw.as_deref(), Some("NOT_A_NUMBER"));
}
