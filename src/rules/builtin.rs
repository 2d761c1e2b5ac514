//! The built-in payment-advice ruleset: the checks every 835 gets unless
//! the host swaps in its own. Everything expressible in the declarative
//! grammar is data; the list-valued checks (per-claim, per-adjustment) are
//! named custom checks registered alongside.

use crate::convert::npi_luhn_valid;
use crate::diagnostic::{codes, Diagnostic, Severity};
use crate::rules::{
    extract, parse_claim_amount, stringify, CrossFieldCheck, CrossFieldKind, FieldValidator,
    Rule, RuleEngine, ValidatorKind,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

const ADJUSTMENT_GROUPS: [&str; 5] = ["CO", "CR", "OA", "PI", "PR"];
const PAYMENT_METHODS: [&str; 5] = ["ACH", "BOP", "CHK", "FWT", "NON"];

/// A rule engine preloaded with the 835 ruleset and its custom checks.
pub fn engine_with_835_rules() -> RuleEngine {
    let mut engine = RuleEngine::new();
    register_builtin_checks(&mut engine);
    for rule in builtin_835_rules() {
        engine.register_rule(rule);
    }
    engine
}

/// Register the named custom checks the built-in ruleset references.
pub fn register_builtin_checks(engine: &mut RuleEngine) {
    engine.register_custom_check("claim_payment_balance", Arc::new(claim_payment_balance));
    engine.register_custom_check("claim_amount_sanity", Arc::new(claim_amount_sanity));
    engine.register_custom_check("adjustment_group_codes", Arc::new(adjustment_group_codes));
    engine.register_custom_check(
        "service_payment_consistency",
        Arc::new(service_payment_consistency),
    );
    engine.register_custom_check("npi_luhn", Arc::new(payee_npi_luhn));
}

/// The built-in 835 business rules.
pub fn builtin_835_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "835_payment_fields".to_string(),
            description: "payment fields are well formed".to_string(),
            category: "financial".to_string(),
            severity: Severity::Error,
            enabled: true,
            field_validators: vec![
                FieldValidator {
                    field_path: "financial_info.total_paid".to_string(),
                    kind: ValidatorKind::CurrencyFormat {
                        min_value: None,
                        max_value: None,
                    },
                    required: true,
                    message: Some("total paid amount is missing or malformed".to_string()),
                    severity: Severity::Error,
                },
                FieldValidator {
                    field_path: "financial_info.date".to_string(),
                    kind: ValidatorKind::DateFormat {
                        format: "CCYYMMDD".to_string(),
                        min_date: None,
                        max_date: None,
                    },
                    required: false,
                    message: Some("payment date is not a CCYYMMDD date".to_string()),
                    severity: Severity::Error,
                },
                FieldValidator {
                    field_path: "financial_info.method".to_string(),
                    kind: ValidatorKind::OneOf {
                        values: PAYMENT_METHODS.iter().map(|m| Value::from(*m)).collect(),
                    },
                    required: false,
                    message: Some("unrecognized payment method code".to_string()),
                    severity: Severity::Warning,
                },
            ],
            cross_field_checks: Vec::new(),
            custom_check: None,
        },
        Rule {
            name: "835_financial_balance".to_string(),
            description: "payment total matches the sum of claim payments".to_string(),
            category: "financial".to_string(),
            severity: Severity::Error,
            enabled: true,
            field_validators: Vec::new(),
            cross_field_checks: Vec::new(),
            custom_check: Some("claim_payment_balance".to_string()),
        },
        Rule {
            name: "835_claim_amounts".to_string(),
            description: "claim charges and payments are sane".to_string(),
            category: "claim".to_string(),
            severity: Severity::Error,
            enabled: true,
            field_validators: Vec::new(),
            cross_field_checks: Vec::new(),
            custom_check: Some("claim_amount_sanity".to_string()),
        },
        Rule {
            name: "835_adjustment_codes".to_string(),
            description: "adjustment group codes come from the claim adjustment group set"
                .to_string(),
            category: "adjustment".to_string(),
            severity: Severity::Warning,
            enabled: true,
            field_validators: Vec::new(),
            cross_field_checks: Vec::new(),
            custom_check: Some("adjustment_group_codes".to_string()),
        },
        Rule {
            name: "835_service_amounts".to_string(),
            description: "service payments do not exceed their charges".to_string(),
            category: "service".to_string(),
            severity: Severity::Error,
            enabled: true,
            field_validators: Vec::new(),
            cross_field_checks: Vec::new(),
            custom_check: Some("service_payment_consistency".to_string()),
        },
        Rule {
            name: "835_payee_identity".to_string(),
            description: "the payee is named and identified".to_string(),
            category: "entity".to_string(),
            severity: Severity::Error,
            enabled: true,
            field_validators: vec![
                FieldValidator {
                    field_path: "payee.name".to_string(),
                    kind: ValidatorKind::Required,
                    required: true,
                    message: Some("payee has no name".to_string()),
                    severity: Severity::Error,
                },
                FieldValidator {
                    field_path: "payee.id".to_string(),
                    kind: ValidatorKind::NpiFormat,
                    required: false,
                    message: Some("payee identifier is not a ten-digit NPI".to_string()),
                    severity: Severity::Error,
                },
            ],
            cross_field_checks: vec![CrossFieldCheck {
                kind: CrossFieldKind::LogicalCheck {
                    condition: crate::rules::Condition::field_exists("payer.name"),
                },
                severity: Some(Severity::Warning),
                message: Some("payer is unnamed".to_string()),
                error_code: None,
            }],
            custom_check: None,
        },
        // The Luhn checksum stays a separate rule from the shape check, so
        // hosts can disable it for test identifiers.
        Rule {
            name: "835_payee_npi_checksum".to_string(),
            description: "the payee NPI passes its checksum".to_string(),
            category: "entity".to_string(),
            severity: Severity::Warning,
            enabled: true,
            field_validators: Vec::new(),
            cross_field_checks: Vec::new(),
            custom_check: Some("npi_luhn".to_string()),
        },
    ]
}

fn claims(payload: &Value) -> &[Value] {
    payload
        .get("claims")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn claim_payment_balance(payload: &Value) -> Result<Vec<Diagnostic>, String> {
    let total = match extract(payload, "financial_info.total_paid") {
        Some(value) => match parse_claim_amount(value) {
            Some(total) => total,
            None => return Ok(Vec::new()),
        },
        None => return Ok(Vec::new()),
    };
    let claim_list = claims(payload);
    if claim_list.is_empty() {
        return Ok(Vec::new());
    }
    let sum: Decimal = claim_list
        .iter()
        .filter_map(|claim| claim.get("total_paid").and_then(parse_claim_amount))
        .sum();
    let tolerance = Decimal::from_parts(1, 0, 0, false, 2);
    let difference = (total - sum).abs();
    if difference <= tolerance {
        return Ok(Vec::new());
    }
    Ok(vec![Diagnostic::error(
        codes::BALANCE_MISMATCH,
        format!(
            "payment total {} does not match the {} claim payments summing to {}",
            total,
            claim_list.len(),
            sum
        ),
    )
    .with_extra("total_field", "financial_info.total_paid")
    .with_extra("total_value", total.to_string())
    .with_extra("sum_value", sum.to_string())
    .with_extra("difference", difference.to_string())])
}

fn claim_amount_sanity(payload: &Value) -> Result<Vec<Diagnostic>, String> {
    let mut diagnostics = Vec::new();
    for (index, claim) in claims(payload).iter().enumerate() {
        let charge = claim.get("total_charge").and_then(parse_claim_amount);
        let paid = claim.get("total_paid").and_then(parse_claim_amount);
        if let Some(charge) = charge {
            if charge < Decimal::ZERO {
                diagnostics.push(
                    Diagnostic::error(
                        codes::CONSISTENCY_CHECK_FAILED,
                        "claim charge is negative",
                    )
                    .with_path(format!("claims[{}].total_charge", index))
                    .with_value(charge.to_string()),
                );
            }
        }
        if let Some(paid) = paid {
            if paid < Decimal::ZERO {
                diagnostics.push(
                    Diagnostic::error(
                        codes::CONSISTENCY_CHECK_FAILED,
                        "claim payment is negative",
                    )
                    .with_path(format!("claims[{}].total_paid", index))
                    .with_value(paid.to_string()),
                );
            }
        }
        if let (Some(charge), Some(paid)) = (charge, paid) {
            if paid > charge {
                diagnostics.push(
                    Diagnostic::error(
                        codes::CONSISTENCY_CHECK_FAILED,
                        "claim payment exceeds the charge",
                    )
                    .with_path(format!("claims[{}].total_paid", index))
                    .with_value(paid.to_string()),
                );
            }
        }
    }
    Ok(diagnostics)
}

fn adjustment_group_codes(payload: &Value) -> Result<Vec<Diagnostic>, String> {
    let mut diagnostics = Vec::new();
    for (claim_index, claim) in claims(payload).iter().enumerate() {
        let adjustments = claim
            .get("adjustments")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for (index, adjustment) in adjustments.iter().enumerate() {
            let group = adjustment
                .get("group_code")
                .map(stringify)
                .unwrap_or_default();
            if !ADJUSTMENT_GROUPS.contains(&group.as_str()) {
                diagnostics.push(
                    Diagnostic::warning(
                        "FIELD_VALIDATION_ENUM",
                        format!("unknown adjustment group code {:?}", group),
                    )
                    .with_path(format!(
                        "claims[{}].adjustments[{}].group_code",
                        claim_index, index
                    ))
                    .with_value(group),
                );
            }
            if let Some(amount) = adjustment.get("amount").and_then(parse_claim_amount) {
                if amount < Decimal::ZERO {
                    diagnostics.push(
                        Diagnostic::warning(
                            codes::CONSISTENCY_CHECK_FAILED,
                            "adjustment amount is negative",
                        )
                        .with_path(format!(
                            "claims[{}].adjustments[{}].amount",
                            claim_index, index
                        ))
                        .with_value(amount.to_string()),
                    );
                }
            }
        }
    }
    Ok(diagnostics)
}

fn service_payment_consistency(payload: &Value) -> Result<Vec<Diagnostic>, String> {
    let mut diagnostics = Vec::new();
    for (claim_index, claim) in claims(payload).iter().enumerate() {
        let services = claim
            .get("services")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for (index, service) in services.iter().enumerate() {
            let charge = service.get("charge").and_then(parse_claim_amount);
            let paid = service.get("paid").and_then(parse_claim_amount);
            if let (Some(charge), Some(paid)) = (charge, paid) {
                if paid > charge {
                    diagnostics.push(
                        Diagnostic::error(
                            codes::CONSISTENCY_CHECK_FAILED,
                            "service payment exceeds its charge",
                        )
                        .with_path(format!(
                            "claims[{}].services[{}].paid",
                            claim_index, index
                        ))
                        .with_value(paid.to_string()),
                    );
                }
            }
        }
    }
    Ok(diagnostics)
}

fn payee_npi_luhn(payload: &Value) -> Result<Vec<Diagnostic>, String> {
    let id = match extract(payload, "payee.id") {
        Some(id) => stringify(id),
        None => return Ok(Vec::new()),
    };
    // shape problems belong to the npi_format validator
    if id.len() != 10 || !id.chars().all(|c| c.is_ascii_digit()) {
        return Ok(Vec::new());
    }
    if npi_luhn_valid(&id) {
        return Ok(Vec::new());
    }
    Ok(vec![Diagnostic::warning(
        "NPI_CHECKSUM_FAILED",
        "payee NPI fails its Luhn checksum",
    )
    .with_path("payee.id")
    .with_value(id)])
}

#[cfg(test)]
fn payload_with(total: &str, paid: &[&str]) -> Value {
    serde_json::json!({
        "header": { "set_code": "835", "control_number": "0001" },
        "financial_info": { "total_paid": total, "method": "ACH", "date": "20241226" },
        "payer": { "name": "ACME HEALTH" },
        "payee": { "name": "CLINIC", "id": "1234567893" },
        "claims": paid.iter().map(|p| serde_json::json!({
            "total_charge": "500.00", "total_paid": p,
            "adjustments": [ { "group_code": "PR", "amount": "10.00" } ],
            "services": [ { "charge": "500.00", "paid": p } ]
        })).collect::<Vec<_>>()
    })
}

#[test]
fn a_balanced_advice_passes_every_builtin_rule() {
    let engine = engine_with_835_rules();
    let diagnostics = engine.validate(&payload_with("450.00", &["200.00", "250.00"]));
    assert!(diagnostics.is_empty(), "unexpected: {:?}", diagnostics);
}

#[test]
fn out_of_balance_claims_are_reported_once() {
    let engine = engine_with_835_rules();
    let diagnostics = engine.validate(&payload_with("500", &["200", "250"]));
    let balance: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.code == codes::BALANCE_MISMATCH)
        .collect();
    assert_eq!(balance.len(), 1);
    assert_eq!(balance[0].extras["difference"], "50");
    assert_eq!(balance[0].rule_name.as_deref(), Some("835_financial_balance"));
}

#[test]
fn overpaid_claims_and_bad_groups_are_flagged() {
    let engine = engine_with_835_rules();
    let mut payload = payload_with("600.00", &["600.00"]);
    payload["claims"][0]["adjustments"][0]["group_code"] = Value::String("XX".to_string());
    let diagnostics = engine.validate(&payload);
    assert!(diagnostics
        .iter()
        .any(|d| d.code == codes::CONSISTENCY_CHECK_FAILED
            && d.rule_name.as_deref() == Some("835_claim_amounts")));
    assert!(diagnostics
        .iter()
        .any(|d| d.code == "FIELD_VALIDATION_ENUM"
            && d.rule_name.as_deref() == Some("835_adjustment_codes")));
}

#[test]
fn luhn_failures_are_warnings_from_their_own_rule() {
    let engine = engine_with_835_rules();
    let mut payload = payload_with("450.00", &["200.00", "250.00"]);
    payload["payee"]["id"] = Value::String("1234567890".to_string());
    let diagnostics = engine.validate(&payload);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, "NPI_CHECKSUM_FAILED");
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert_eq!(
        diagnostics[0].rule_name.as_deref(),
        Some("835_payee_npi_checksum")
    );
}
