//! The logical-condition grammar used by `logical_check` cross-field
//! validations and `conditional_required` field validators.
//!
//! Conditions are plain data so rule sets can live in configuration:
//! branches (`and`, `or`, `if_then`) nest arbitrarily and leaves compare
//! one resolved field against an expected value.

use crate::rules::{as_number, extract, value_eq};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Branch(Branch),
    Leaf(LeafCondition),
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Branch {
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
    /// Passes whenever `if` is false; otherwise `then` decides.
    IfThen {
        #[serde(rename = "if")]
        when: Box<Condition>,
        then: Box<Condition>,
    },
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct LeafCondition {
    pub field: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Exists,
    NotExists,
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
}

impl Condition {
    pub fn evaluate(&self, payload: &Value) -> bool {
        match self {
            Condition::Branch(Branch::And { conditions }) => {
                conditions.iter().all(|c| c.evaluate(payload))
            }
            Condition::Branch(Branch::Or { conditions }) => {
                conditions.iter().any(|c| c.evaluate(payload))
            }
            Condition::Branch(Branch::IfThen { when, then }) => {
                if when.evaluate(payload) {
                    then.evaluate(payload)
                } else {
                    true
                }
            }
            Condition::Leaf(leaf) => leaf.evaluate(payload),
        }
    }

    /// Convenience constructor for the common existence leaf.
    pub fn field_exists(field: &str) -> Condition {
        Condition::Leaf(LeafCondition {
            field: field.to_string(),
            operator: Operator::Exists,
            value: None,
        })
    }

    pub fn field_equals(field: &str, value: impl Into<Value>) -> Condition {
        Condition::Leaf(LeafCondition {
            field: field.to_string(),
            operator: Operator::Eq,
            value: Some(value.into()),
        })
    }
}

impl LeafCondition {
    fn evaluate(&self, payload: &Value) -> bool {
        let actual = extract(payload, &self.field);
        let expected = self.value.as_ref();
        match self.operator {
            Operator::Exists => actual.is_some(),
            Operator::NotExists => actual.is_none(),
            Operator::Eq => value_eq(actual, expected),
            Operator::Ne => !value_eq(actual, expected),
            Operator::Gt => ordered(actual, expected, |a, b| a > b),
            Operator::Lt => ordered(actual, expected, |a, b| a < b),
            Operator::Gte => ordered(actual, expected, |a, b| a >= b),
            Operator::Lte => ordered(actual, expected, |a, b| a <= b),
            // a scalar expected value is not a member list
            Operator::In => match expected {
                Some(Value::Array(items)) => {
                    items.iter().any(|item| value_eq(actual, Some(item)))
                }
                _ => false,
            },
            Operator::NotIn => match expected {
                Some(Value::Array(items)) => {
                    !items.iter().any(|item| value_eq(actual, Some(item)))
                }
                _ => true,
            },
        }
    }
}

/// Ordering comparisons need both sides numeric; anything else fails the
/// condition rather than faulting.
fn ordered(actual: Option<&Value>, expected: Option<&Value>, compare: fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(as_number), expected.and_then(as_number)) {
        (Some(a), Some(b)) => compare(a, b),
        _ => false,
    }
}

#[cfg(test)]
fn payload() -> Value {
    serde_json::json!({
        "financial_info": { "total_paid": "1000.00", "method": "ACH" },
        "claims": [ { "status_code": 1 } ]
    })
}

#[test]
fn leaves_compare_resolved_fields() {
    let p = payload();
    assert!(Condition::field_exists("financial_info.method").evaluate(&p));
    assert!(!Condition::field_exists("financial_info.missing").evaluate(&p));
    assert!(Condition::field_equals("financial_info.method", "ACH").evaluate(&p));
    assert!(!Condition::field_equals("financial_info.method", "CHK").evaluate(&p));
}

#[test]
fn ordering_operators_coerce_numeric_strings() {
    let p = payload();
    let gt: Condition = serde_json::from_value(serde_json::json!({
        "field": "financial_info.total_paid", "operator": "gt", "value": 500
    }))
    .unwrap();
    assert!(gt.evaluate(&p));

    // non-numeric operand fails the comparison
    let bad: Condition = serde_json::from_value(serde_json::json!({
        "field": "financial_info.method", "operator": "gt", "value": 500
    }))
    .unwrap();
    assert!(!bad.evaluate(&p));
}

#[test]
fn if_then_passes_when_the_premise_is_false() {
    let p = payload();
    let condition: Condition = serde_json::from_value(serde_json::json!({
        "type": "if_then",
        "if": { "field": "financial_info.method", "operator": "eq", "value": "CHK" },
        "then": { "field": "check_number", "operator": "exists" }
    }))
    .unwrap();
    assert!(condition.evaluate(&p));
}

#[test]
fn membership_with_a_scalar_expected_value() {
    let p = payload();
    let in_scalar: Condition = serde_json::from_value(serde_json::json!({
        "field": "financial_info.method", "operator": "in", "value": "ACH"
    }))
    .unwrap();
    assert!(!in_scalar.evaluate(&p));

    let not_in_scalar: Condition = serde_json::from_value(serde_json::json!({
        "field": "financial_info.method", "operator": "not_in", "value": "ACH"
    }))
    .unwrap();
    assert!(not_in_scalar.evaluate(&p));

    let in_list: Condition = serde_json::from_value(serde_json::json!({
        "field": "financial_info.method", "operator": "in", "value": ["ACH", "CHK"]
    }))
    .unwrap();
    assert!(in_list.evaluate(&p));
}

#[test]
fn branches_nest() {
    let p = payload();
    let condition: Condition = serde_json::from_value(serde_json::json!({
        "type": "and",
        "conditions": [
            { "field": "financial_info.total_paid", "operator": "exists" },
            { "type": "or", "conditions": [
                { "field": "financial_info.method", "operator": "eq", "value": "ACH" },
                { "field": "financial_info.method", "operator": "eq", "value": "CHK" }
            ]}
        ]
    }))
    .unwrap();
    assert!(condition.evaluate(&p));
}
