//! The calculation grammar for `calculation_check` cross-field
//! validations: a small tree of decimal operations over field paths.

use crate::rules::extract_currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Calculation {
    /// Decimal sum of all operands; unresolvable operands count as zero.
    Sum { operands: Vec<Operand> },
    /// `operands[0] - operands[1]`; null if either side is null.
    Subtract { operands: Vec<Operand> },
    /// Product of all operands; null if any operand is null.
    Multiply { operands: Vec<Operand> },
    /// `operands[0] / operands[1]`; null when the divisor is null or zero.
    Divide { operands: Vec<Operand> },
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Expr(Box<Calculation>),
    Field(String),
}

impl Operand {
    fn value(&self, payload: &Value) -> Result<Option<Decimal>, String> {
        match self {
            Operand::Field(path) => Ok(extract_currency(payload, path)),
            Operand::Expr(expr) => expr.evaluate(payload),
        }
    }
}

impl Calculation {
    /// Evaluate the tree. `Ok(None)` means a null result (and is not a
    /// mismatch); `Err` means the tree itself is malformed.
    pub fn evaluate(&self, payload: &Value) -> Result<Option<Decimal>, String> {
        match self {
            Calculation::Sum { operands } => {
                let mut total = Decimal::ZERO;
                for operand in operands {
                    if let Some(value) = operand.value(payload)? {
                        total += value;
                    }
                }
                Ok(Some(total))
            }
            Calculation::Subtract { operands } => {
                let (left, right) = binary_operands(operands, payload, "subtract")?;
                Ok(match (left, right) {
                    (Some(a), Some(b)) => Some(a - b),
                    _ => None,
                })
            }
            Calculation::Multiply { operands } => {
                if operands.len() < 2 {
                    return Err("multiply needs at least two operands".to_string());
                }
                let mut product = Decimal::ONE;
                for operand in operands {
                    match operand.value(payload)? {
                        Some(value) => product *= value,
                        None => return Ok(None),
                    }
                }
                Ok(Some(product))
            }
            Calculation::Divide { operands } => {
                let (left, right) = binary_operands(operands, payload, "divide")?;
                Ok(match (left, right) {
                    (Some(a), Some(b)) if !b.is_zero() => Some(a / b),
                    _ => None,
                })
            }
        }
    }
}

fn binary_operands(
    operands: &[Operand],
    payload: &Value,
    name: &str,
) -> Result<(Option<Decimal>, Option<Decimal>), String> {
    if operands.len() < 2 {
        return Err(format!("{} needs two operands", name));
    }
    Ok((operands[0].value(payload)?, operands[1].value(payload)?))
}

#[cfg(test)]
fn payload() -> Value {
    serde_json::json!({
        "claims": [
            { "total_charge": "100", "patient_responsibility": "20", "total_paid": "79" },
            { "total_charge": "50.50", "total_paid": "50.50" }
        ]
    })
}

#[cfg(test)]
fn calc(json: Value) -> Calculation {
    serde_json::from_value(json).unwrap()
}

#[test]
fn sum_treats_nulls_as_zero() {
    let calculation = calc(serde_json::json!({
        "operation": "sum",
        "operands": ["claims[0].total_paid", "claims[1].total_paid", "claims[9].total_paid"]
    }));
    assert_eq!(
        calculation.evaluate(&payload()).unwrap(),
        Some("129.50".parse().unwrap())
    );
}

#[test]
fn subtract_is_null_when_a_side_is_missing() {
    let calculation = calc(serde_json::json!({
        "operation": "subtract",
        "operands": ["claims[0].total_charge", "claims[0].patient_responsibility"]
    }));
    assert_eq!(
        calculation.evaluate(&payload()).unwrap(),
        Some(Decimal::from(80))
    );

    let missing = calc(serde_json::json!({
        "operation": "subtract",
        "operands": ["claims[0].total_charge", "claims[0].nope"]
    }));
    assert_eq!(missing.evaluate(&payload()).unwrap(), None);
}

#[test]
fn divide_by_zero_is_null_not_an_error() {
    let calculation = calc(serde_json::json!({
        "operation": "divide",
        "operands": ["claims[0].total_charge", { "operation": "subtract",
            "operands": ["claims[0].total_paid", "claims[0].total_paid"] }]
    }));
    assert_eq!(calculation.evaluate(&payload()).unwrap(), None);
}

#[test]
fn nested_expressions_compose() {
    let calculation = calc(serde_json::json!({
        "operation": "multiply",
        "operands": [
            { "operation": "subtract", "operands": ["claims[0].total_charge", "claims[0].patient_responsibility"] },
            "claims[1].total_paid"
        ]
    }));
    assert_eq!(
        calculation.evaluate(&payload()).unwrap(),
        Some("4040.00".parse().unwrap())
    );
}

#[test]
fn malformed_trees_are_errors() {
    let calculation = calc(serde_json::json!({
        "operation": "divide",
        "operands": ["claims[0].total_charge"]
    }));
    assert!(calculation.evaluate(&payload()).is_err());
}
