//! The business-rule engine: declarative rules composed of field
//! validators, cross-field checks and named custom checks, evaluated
//! against the canonical projection of a transaction.
//!
//! Rules are data. Everything except a custom check round-trips through
//! serde, so rule sets can ship as configuration; custom logic is a named
//! function the host registers on the engine rather than inline code.

pub mod builtin;
mod calc;
mod condition;
mod cross;
mod engine;
mod field;

pub use builtin::{builtin_835_rules, engine_with_835_rules, register_builtin_checks};
pub use calc::{Calculation, Operand};
pub use condition::{Branch, Condition, LeafCondition, Operator};
pub use cross::{CrossFieldCheck, CrossFieldKind, Relation};
pub use engine::{CustomCheck, RuleEngine};
pub use field::{FieldValidator, ValidatorKind};

use crate::convert::parse_decimal;
use crate::diagnostic::Severity;
use crate::path::resolve;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named bundle of validations with a severity and category. Rules are
/// immutable once registered apart from the `enabled` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_rule_severity")]
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_validators: Vec<FieldValidator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cross_field_checks: Vec<CrossFieldCheck>,
    /// Name of a custom check registered on the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_check: Option<String>,
}

fn default_rule_severity() -> Severity {
    Severity::Error
}

fn default_enabled() -> bool {
    true
}

/// Resolve a path and collapse JSON null into absence: rules treat the two
/// identically.
pub(crate) fn extract<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    match resolve(payload, path) {
        Some(Value::Null) | None => None,
        value => value,
    }
}

/// The stringification rules use for comparisons and reporting: strings
/// stay themselves, scalars print, containers print as compact JSON.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolve a path as an exact decimal, if it parses as one.
pub(crate) fn extract_currency(payload: &Value, path: &str) -> Option<Decimal> {
    extract(payload, path).and_then(parse_claim_amount)
}

/// Parse one projected field as an exact decimal.
pub(crate) fn parse_claim_amount(value: &Value) -> Option<Decimal> {
    parse_decimal(&stringify(value))
}

/// Numeric coercion for ordering comparisons: numbers and numeric strings.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Loose equality: numbers compare numerically, everything else exactly.
/// Absence equals absence, and nothing else.
pub(crate) fn value_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[test]
fn extract_collapses_null_into_absence() {
    let payload = serde_json::json!({ "a": null, "b": "x" });
    assert_eq!(extract(&payload, "a"), None);
    assert_eq!(extract(&payload, "missing"), None);
    assert!(extract(&payload, "b").is_some());
}

#[test]
fn value_eq_compares_numbers_numerically() {
    let a = serde_json::json!(79);
    let b = serde_json::json!(79.0);
    assert!(value_eq(Some(&a), Some(&b)));
    let s = serde_json::json!("79");
    assert!(!value_eq(Some(&a), Some(&s)));
    assert!(value_eq(None, None));
    assert!(!value_eq(Some(&a), None));
}

#[test]
fn rules_deserialize_from_configuration() {
    let rule: Rule = serde_json::from_value(serde_json::json!({
        "name": "payment_sanity",
        "description": "payment fields are well formed",
        "category": "financial",
        "severity": "error",
        "field_validators": [
            { "field_path": "financial_info.total_paid", "validator": "currency_format", "required": true }
        ],
        "cross_field_checks": [
            { "type": "balance_check", "total_field": "financial_info.total_paid",
              "sum_fields": ["claims[0].total_paid"] }
        ]
    }))
    .unwrap();
    assert!(rule.enabled);
    assert_eq!(rule.field_validators.len(), 1);
    assert_eq!(rule.cross_field_checks.len(), 1);
    assert_eq!(rule.custom_check, None);
}
