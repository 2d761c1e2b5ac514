//! Cross-field validations: balance, consistency, calculation and logical
//! checks that look at more than one resolved field.

use crate::diagnostic::{codes, Diagnostic, Severity};
use crate::rules::{as_number, extract, extract_currency, stringify, Calculation, Condition};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
#[cfg(test)]
use std::str::FromStr;

fn default_tolerance() -> Decimal {
    // 0.01
    Decimal::from_parts(1, 0, 0, false, 2)
}

/// One cross-field validation entry on a rule. Severity, message and code
/// default from the owning rule and the check kind; each entry may
/// override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossFieldCheck {
    #[serde(flatten)]
    pub kind: CrossFieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrossFieldKind {
    /// `|total - sum(sum_fields)| <= tolerance`. Fields that do not
    /// resolve to decimals count as zero; a null total passes.
    BalanceCheck {
        total_field: String,
        sum_fields: Vec<String>,
        #[serde(default = "default_tolerance")]
        tolerance: Decimal,
    },
    /// Compare two resolved fields under a relation.
    ConsistencyCheck {
        field1: String,
        field2: String,
        relation: Relation,
    },
    /// Evaluate a calculation tree and compare it to a result field under
    /// a tolerance.
    CalculationCheck {
        calculation: Calculation,
        result_field: String,
        #[serde(default = "default_tolerance")]
        tolerance: Decimal,
    },
    /// Evaluate a logical condition; failure emits a diagnostic.
    LogicalCheck { condition: Condition },
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
}

impl CrossFieldCheck {
    pub fn execute(&self, payload: &Value, rule_severity: Severity) -> Vec<Diagnostic> {
        let severity = self.severity.unwrap_or(rule_severity);
        match &self.kind {
            CrossFieldKind::BalanceCheck {
                total_field,
                sum_fields,
                tolerance,
            } => self.balance(payload, severity, total_field, sum_fields, *tolerance),
            CrossFieldKind::ConsistencyCheck {
                field1,
                field2,
                relation,
            } => self.consistency(payload, severity, field1, field2, *relation),
            CrossFieldKind::CalculationCheck {
                calculation,
                result_field,
                tolerance,
            } => self.calculation(payload, severity, calculation, result_field, *tolerance),
            CrossFieldKind::LogicalCheck { condition } => {
                self.logical(payload, severity, condition)
            }
        }
    }

    fn balance(
        &self,
        payload: &Value,
        severity: Severity,
        total_field: &str,
        sum_fields: &[String],
        tolerance: Decimal,
    ) -> Vec<Diagnostic> {
        let total = match extract_currency(payload, total_field) {
            Some(total) => total,
            None => return Vec::new(),
        };
        let sum: Decimal = sum_fields
            .iter()
            .filter_map(|field| extract_currency(payload, field))
            .sum();
        let difference = (total - sum).abs();
        if difference <= tolerance {
            return Vec::new();
        }
        let message = self.message.clone().unwrap_or_else(|| {
            format!("balance mismatch: {} = {}, sum = {}", total_field, total, sum)
        });
        vec![Diagnostic::new(
            severity,
            self.error_code.as_deref().unwrap_or(codes::BALANCE_MISMATCH),
            message,
        )
        .with_extra("total_field", total_field)
        .with_extra("total_value", total.to_string())
        .with_extra("sum_fields", json!(sum_fields))
        .with_extra("sum_value", sum.to_string())
        .with_extra("difference", difference.to_string())]
    }

    fn consistency(
        &self,
        payload: &Value,
        severity: Severity,
        field1: &str,
        field2: &str,
        relation: Relation,
    ) -> Vec<Diagnostic> {
        let value1 = extract(payload, field1);
        let value2 = extract(payload, field2);
        let holds = match relation {
            Relation::Equal => crate::rules::value_eq(value1, value2),
            Relation::NotEqual => !crate::rules::value_eq(value1, value2),
            Relation::GreaterThan => numeric(value1, value2, |a, b| a > b),
            Relation::LessThan => numeric(value1, value2, |a, b| a < b),
            Relation::GreaterEqual => numeric(value1, value2, |a, b| a >= b),
            Relation::LessEqual => numeric(value1, value2, |a, b| a <= b),
        };
        if holds {
            return Vec::new();
        }
        let relation_name = match relation {
            Relation::Equal => "equal",
            Relation::NotEqual => "not_equal",
            Relation::GreaterThan => "greater_than",
            Relation::LessThan => "less_than",
            Relation::GreaterEqual => "greater_equal",
            Relation::LessEqual => "less_equal",
        };
        let message = self.message.clone().unwrap_or_else(|| {
            format!("consistency check failed: {} {} {}", field1, relation_name, field2)
        });
        vec![Diagnostic::new(
            severity,
            self.error_code
                .as_deref()
                .unwrap_or(codes::CONSISTENCY_CHECK_FAILED),
            message,
        )
        .with_extra("field1", field1)
        .with_extra("field1_value", optional_text(value1))
        .with_extra("field2", field2)
        .with_extra("field2_value", optional_text(value2))
        .with_extra("relationship", relation_name)]
    }

    fn calculation(
        &self,
        payload: &Value,
        severity: Severity,
        calculation: &Calculation,
        result_field: &str,
        tolerance: Decimal,
    ) -> Vec<Diagnostic> {
        let expected = match calculation.evaluate(payload) {
            Ok(expected) => expected,
            Err(reason) => {
                return vec![Diagnostic::error(
                    codes::CALCULATION_ERROR,
                    format!("calculation validation error: {}", reason),
                )
                .with_extra("result_field", result_field)];
            }
        };
        let actual = extract_currency(payload, result_field);
        let (expected, actual) = match (expected, actual) {
            (Some(expected), Some(actual)) => (expected, actual),
            // a null on either side is not a mismatch
            _ => return Vec::new(),
        };
        let difference = (expected - actual).abs();
        if difference <= tolerance {
            return Vec::new();
        }
        let message = self.message.clone().unwrap_or_else(|| {
            format!("calculation mismatch: expected {}, got {}", expected, actual)
        });
        vec![Diagnostic::new(
            severity,
            self.error_code
                .as_deref()
                .unwrap_or(codes::CALCULATION_MISMATCH),
            message,
        )
        .with_extra("result_field", result_field)
        .with_extra("expected_value", expected.to_string())
        .with_extra("actual_value", actual.to_string())
        .with_extra("difference", difference.to_string())]
    }

    fn logical(&self, payload: &Value, severity: Severity, condition: &Condition) -> Vec<Diagnostic> {
        if condition.evaluate(payload) {
            return Vec::new();
        }
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "logical check failed".to_string());
        vec![Diagnostic::new(
            severity,
            self.error_code
                .as_deref()
                .unwrap_or(codes::LOGICAL_CHECK_FAILED),
            message,
        )
        .with_extra(
            "condition",
            serde_json::to_value(condition).unwrap_or(Value::Null),
        )]
    }
}

fn numeric(value1: Option<&Value>, value2: Option<&Value>, compare: fn(f64, f64) -> bool) -> bool {
    match (value1.and_then(as_number), value2.and_then(as_number)) {
        (Some(a), Some(b)) => compare(a, b),
        _ => false,
    }
}

fn optional_text(value: Option<&Value>) -> Value {
    match value {
        Some(value) => Value::String(stringify(value)),
        None => Value::Null,
    }
}

#[cfg(test)]
fn check(json: Value) -> CrossFieldCheck {
    serde_json::from_value(json).unwrap()
}

#[cfg(test)]
fn payload() -> Value {
    serde_json::json!({
        "financial_info": { "total_paid": "500" },
        "claims": [
            { "total_charge": "100", "patient_responsibility": "20", "total_paid": "200" },
            { "total_paid": "250" }
        ]
    })
}

#[test]
fn balance_mismatch_reports_the_difference() {
    let balance = check(serde_json::json!({
        "type": "balance_check",
        "total_field": "financial_info.total_paid",
        "sum_fields": ["claims[0].total_paid", "claims[1].total_paid"],
        "tolerance": "0.01"
    }));
    let diagnostics = balance.execute(&payload(), Severity::Warning);
    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.code, codes::BALANCE_MISMATCH);
    assert_eq!(diagnostic.severity, Severity::Warning);
    assert_eq!(
        Decimal::from_str(diagnostic.extras["difference"].as_str().unwrap()).unwrap(),
        Decimal::from(50)
    );
}

#[test]
fn balance_tolerance_is_inclusive() {
    let build = |total: &str| {
        let mut p = payload();
        p["financial_info"]["total_paid"] = Value::String(total.to_string());
        p["claims"][0]["total_paid"] = Value::String("10.005".to_string());
        p["claims"][1]["total_paid"] = Value::String("0".to_string());
        p
    };
    let balance = check(serde_json::json!({
        "type": "balance_check",
        "total_field": "financial_info.total_paid",
        "sum_fields": ["claims[0].total_paid", "claims[1].total_paid"]
    }));
    assert!(balance.execute(&build("10.00"), Severity::Warning).is_empty());
    assert_eq!(balance.execute(&build("10.02"), Severity::Warning).len(), 1);
}

#[test]
fn null_total_passes_the_balance_check() {
    let balance = check(serde_json::json!({
        "type": "balance_check",
        "total_field": "financial_info.missing",
        "sum_fields": ["claims[0].total_paid"]
    }));
    assert!(balance.execute(&payload(), Severity::Error).is_empty());
}

#[test]
fn calculation_mismatch_carries_expected_and_actual() {
    let mut p = payload();
    p["claims"][0]["total_paid"] = Value::String("79".to_string());
    let calculation = check(serde_json::json!({
        "type": "calculation_check",
        "calculation": {
            "operation": "subtract",
            "operands": ["claims[0].total_charge", "claims[0].patient_responsibility"]
        },
        "result_field": "claims[0].total_paid",
        "tolerance": "0.01"
    }));
    let diagnostics = calculation.execute(&p, Severity::Warning);
    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.code, codes::CALCULATION_MISMATCH);
    assert_eq!(diagnostic.extras["expected_value"], "80");
    assert_eq!(diagnostic.extras["actual_value"], "79");
    assert_eq!(
        Decimal::from_str(diagnostic.extras["difference"].as_str().unwrap()).unwrap(),
        Decimal::ONE
    );
}

#[test]
fn consistency_relations() {
    let equal = check(serde_json::json!({
        "type": "consistency_check",
        "field1": "claims[0].total_paid", "field2": "claims[0].total_paid",
        "relation": "equal"
    }));
    assert!(equal.execute(&payload(), Severity::Warning).is_empty());

    let greater = check(serde_json::json!({
        "type": "consistency_check",
        "field1": "claims[0].total_charge", "field2": "claims[0].patient_responsibility",
        "relation": "greater_than"
    }));
    assert!(greater.execute(&payload(), Severity::Warning).is_empty());

    // ordering against a non-numeric operand fails the check
    let not_numeric = check(serde_json::json!({
        "type": "consistency_check",
        "field1": "claims[0].total_charge", "field2": "financial_info.missing",
        "relation": "less_than"
    }));
    assert_eq!(not_numeric.execute(&payload(), Severity::Warning).len(), 1);
}

#[test]
fn severity_defaults_to_the_rule_and_overrides_win() {
    let defaulted = check(serde_json::json!({
        "type": "logical_check",
        "condition": { "field": "financial_info.missing", "operator": "exists" }
    }));
    assert_eq!(
        defaulted.execute(&payload(), Severity::Error)[0].severity,
        Severity::Error
    );

    let overridden = check(serde_json::json!({
        "type": "logical_check",
        "severity": "info",
        "condition": { "field": "financial_info.missing", "operator": "exists" }
    }));
    assert_eq!(
        overridden.execute(&payload(), Severity::Error)[0].severity,
        Severity::Info
    );
}
