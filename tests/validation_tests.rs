// End-to-end validation: parse a payment advice, project it, and run
// declarative business rules over the projection.

use edi_healthcare::rules::{engine_with_835_rules, Rule, RuleEngine};
use edi_healthcare::{codes, parse, Severity};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use std::str::FromStr;

const ADVICE_WITH_CLAIMS: &str = concat!(
    "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *241226*1430*U*00501*000000001*0*P*>~",
    "GS*HP*SENDER*RECEIVER*20241226*1430*000000001*X*005010X221A1~",
    "ST*835*0001~",
    "BPR*I*500*C*ACH*CCP*01*123456789*DA*987654321*PAYERCO*20241226~",
    "TRN*1*TRACE123*1~",
    "N1*PR*ACME HEALTH~",
    "N1*PE*SPRINGFIELD CLINIC*XX*1234567893~",
    "CLP*CLAIM001*1*100*200*20*12*PAYER123~",
    "CLP*CLAIM002*1*300*250*50*12*PAYER456~",
    "SE*8*0001~",
    "GE*1*000000001~",
    "IEA*1*000000001~"
);

fn balance_rule() -> Rule {
    serde_json::from_value(serde_json::json!({
        "name": "claim_balance",
        "category": "financial",
        "severity": "warning",
        "cross_field_checks": [{
            "type": "balance_check",
            "total_field": "financial_info.total_paid",
            "sum_fields": ["claims[0].total_paid", "claims[1].total_paid"],
            "tolerance": "0.01"
        }]
    }))
    .unwrap()
}

#[test]
fn balance_mismatch_reports_exactly_one_diagnostic_with_the_difference() {
    let outcome = parse(ADVICE_WITH_CLAIMS).unwrap();
    let transaction = outcome.document.transactions().next().unwrap();

    let mut engine = RuleEngine::new();
    engine.register_rule(balance_rule());
    let diagnostics = engine.validate_transaction(transaction);

    // total 500 against claims paying 200 + 250
    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.code, codes::BALANCE_MISMATCH);
    assert_eq!(diagnostic.rule_name.as_deref(), Some("claim_balance"));
    assert_eq!(
        Decimal::from_str(diagnostic.extras["difference"].as_str().unwrap()).unwrap(),
        Decimal::from(50)
    );
}

#[test]
fn calculation_check_compares_against_the_result_field() {
    let input = ADVICE_WITH_CLAIMS
        .replace("CLP*CLAIM001*1*100*200*20*12*PAYER123~", "CLP*CLAIM001*1*100*79*20*12*PAYER123~");
    let outcome = parse(&input).unwrap();
    let transaction = outcome.document.transactions().next().unwrap();

    let mut engine = RuleEngine::new();
    engine.register_rule(
        serde_json::from_value(serde_json::json!({
            "name": "paid_is_charge_minus_responsibility",
            "category": "financial",
            "severity": "warning",
            "cross_field_checks": [{
                "type": "calculation_check",
                "calculation": {
                    "operation": "subtract",
                    "operands": ["claims[0].total_charge", "claims[0].patient_responsibility"]
                },
                "result_field": "claims[0].total_paid",
                "tolerance": "0.01"
            }]
        }))
        .unwrap(),
    );
    let diagnostics = engine.validate_transaction(transaction);
    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.code, codes::CALCULATION_MISMATCH);
    assert_eq!(
        Decimal::from_str(diagnostic.extras["expected_value"].as_str().unwrap()).unwrap(),
        Decimal::from(80)
    );
    assert_eq!(
        Decimal::from_str(diagnostic.extras["actual_value"].as_str().unwrap()).unwrap(),
        Decimal::from(79)
    );
}

#[test]
fn header_paths_resolve_against_the_transaction_header() {
    let outcome = parse(ADVICE_WITH_CLAIMS).unwrap();
    let transaction = outcome.document.transactions().next().unwrap();

    let mut engine = RuleEngine::new();
    engine.register_rule(
        serde_json::from_value(serde_json::json!({
            "name": "declared_as_835",
            "category": "structure",
            "severity": "error",
            "field_validators": [
                { "field_path": "header.set_code", "validator": "enum", "values": ["835"] },
                { "field_path": "header.control_number", "validator": "required" }
            ]
        }))
        .unwrap(),
    );
    assert!(engine.validate_transaction(transaction).is_empty());
}

#[test]
fn yymmdd_century_boundary_flows_through_the_envelope() {
    let twenties = ADVICE_WITH_CLAIMS.replace("*241226*1430*U", "*291231*1430*U");
    let outcome = parse(&twenties).unwrap();
    assert_eq!(
        outcome.document.interchanges[0].header.date_iso.as_deref(),
        Some("2029-12-31")
    );

    let thirties = ADVICE_WITH_CLAIMS.replace("*241226*1430*U", "*301231*1430*U");
    let outcome = parse(&thirties).unwrap();
    assert_eq!(
        outcome.document.interchanges[0].header.date_iso.as_deref(),
        Some("1930-12-31")
    );
}

#[test]
fn builtin_ruleset_accepts_a_balanced_advice() {
    let balanced = ADVICE_WITH_CLAIMS
        .replace("BPR*I*500*C", "BPR*I*450.00*C")
        .replace("CLP*CLAIM001*1*100*200*20", "CLP*CLAIM001*1*220*200*20");
    let outcome = parse(&balanced).unwrap();
    let transaction = outcome.document.transactions().next().unwrap();

    let engine = engine_with_835_rules();
    let diagnostics = engine.validate_transaction(transaction);
    assert!(diagnostics.is_empty(), "unexpected: {:?}", diagnostics);
}

#[test]
fn builtin_ruleset_flags_an_unbalanced_advice() {
    let outcome = parse(ADVICE_WITH_CLAIMS).unwrap();
    let transaction = outcome.document.transactions().next().unwrap();

    let engine = engine_with_835_rules();
    let diagnostics = engine.validate_transaction(transaction);
    // 500 != 450 and claim 1 is overpaid (200 paid on a 100 charge)
    assert!(diagnostics.iter().any(|d| d.code == codes::BALANCE_MISMATCH));
    assert!(diagnostics
        .iter()
        .any(|d| d.code == codes::CONSISTENCY_CHECK_FAILED
            && d.path.as_deref() == Some("claims[0].total_paid")));
}

#[test]
fn disabling_a_rule_strictly_shrinks_the_diagnostic_set() {
    let outcome = parse(ADVICE_WITH_CLAIMS).unwrap();
    let transaction = outcome.document.transactions().next().unwrap();

    let mut engine = engine_with_835_rules();
    let before = engine.validate_transaction(transaction);
    assert!(engine.disable_rule("835_financial_balance"));
    let during = engine.validate_transaction(transaction);
    assert!(during.len() < before.len());
    assert!(engine.enable_rule("835_financial_balance"));
    assert_eq!(engine.validate_transaction(transaction), before);
}

#[test]
fn rule_subset_selection_and_severity_reporting() {
    let outcome = parse(ADVICE_WITH_CLAIMS).unwrap();
    let transaction = outcome.document.transactions().next().unwrap();

    let engine = engine_with_835_rules();
    let payload = transaction.to_value();
    let subset = engine.validate_rules(&payload, &["835_financial_balance"]);
    assert!(subset.iter().all(|d| d.rule_name.as_deref() == Some("835_financial_balance")));

    // the framework itself never emits CRITICAL
    let all = engine.validate(&payload);
    assert!(all.iter().all(|d| d.severity != Severity::Critical));
}
