//! Field-level validators: one resolved field path checked against one
//! validator kind. The kinds are a closed set; a null value passes every
//! kind unless the validator demands presence.

use crate::convert::parse_wire_date;
use crate::diagnostic::{codes, Diagnostic, Severity};
use crate::rules::{as_number, extract, stringify, Condition};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

lazy_static! {
    static ref NPI: Regex = Regex::new(r"^\d{10}$").unwrap();
    static ref EIN: Regex = Regex::new(r"^\d{2}-\d{7}$").unwrap();
    static ref SSN: Regex = Regex::new(r"^\d{3}-\d{2}-\d{4}$").unwrap();
    static ref PLAIN_TAX_ID: Regex = Regex::new(r"^\d{9}$").unwrap();
}

// +/- 999,999,999.99 (mantissa 99_999_999_999 split into 32-bit words)
const CURRENCY_MAX: Decimal = Decimal::from_parts(1_215_752_191, 23, 0, false, 2);
const CURRENCY_MIN: Decimal = Decimal::from_parts(1_215_752_191, 23, 0, true, 2);

/// One field validation: a path, a kind, and how to report failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValidator {
    pub field_path: String,
    #[serde(flatten)]
    pub kind: ValidatorKind,
    /// Whether a null value fails this validator.
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "default_severity")]
    pub severity: Severity,
}

fn default_severity() -> Severity {
    Severity::Error
}

/// The closed set of validator kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "validator", rename_all = "snake_case")]
pub enum ValidatorKind {
    /// Non-null and non-empty after trimming.
    Required,
    /// Presence demanded only when the `when` condition holds against the
    /// same payload.
    ConditionalRequired { when: Condition },
    /// Fixed-point decimal with at most two fractional digits, inside the
    /// configured range.
    CurrencyFormat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_value: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_value: Option<Decimal>,
    },
    /// Parseable under the named wire format and inside the optional
    /// calendar bounds.
    DateFormat {
        #[serde(default = "default_date_format")]
        format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_date: Option<NaiveDate>,
    },
    /// Exactly ten decimal digits. The Luhn checksum is a separate named
    /// check, not part of the shape validation.
    NpiFormat,
    /// EIN (`XX-XXXXXXX`), SSN (`XXX-XX-XXXX`) or nine bare digits.
    TaxIdFormat,
    /// Numeric and inside the inclusive bounds.
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// String-equal to one of the allowed values after stringification.
    #[serde(rename = "enum")]
    OneOf { values: Vec<Value> },
    /// Anchored-from-start regular expression match.
    #[serde(rename = "regex")]
    Pattern { pattern: String },
}

fn default_date_format() -> String {
    "CCYYMMDD".to_string()
}

impl ValidatorKind {
    fn code_suffix(&self) -> &'static str {
        match self {
            ValidatorKind::Required => "REQUIRED",
            ValidatorKind::ConditionalRequired { .. } => "CONDITIONAL_REQUIRED",
            ValidatorKind::CurrencyFormat { .. } => "CURRENCY_FORMAT",
            ValidatorKind::DateFormat { .. } => "DATE_FORMAT",
            ValidatorKind::NpiFormat => "NPI_FORMAT",
            ValidatorKind::TaxIdFormat => "TAX_ID_FORMAT",
            ValidatorKind::Range { .. } => "RANGE",
            ValidatorKind::OneOf { .. } => "ENUM",
            ValidatorKind::Pattern { .. } => "REGEX",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ValidatorKind::Required => "required",
            ValidatorKind::ConditionalRequired { .. } => "conditional_required",
            ValidatorKind::CurrencyFormat { .. } => "currency_format",
            ValidatorKind::DateFormat { .. } => "date_format",
            ValidatorKind::NpiFormat => "npi_format",
            ValidatorKind::TaxIdFormat => "tax_id_format",
            ValidatorKind::Range { .. } => "range",
            ValidatorKind::OneOf { .. } => "enum",
            ValidatorKind::Pattern { .. } => "regex",
        }
    }
}

impl FieldValidator {
    /// Resolve the path and apply the validator kind. At most one
    /// diagnostic comes back; internal failures (a bad configured pattern)
    /// surface as `FIELD_VALIDATION_ERROR`.
    pub fn validate(&self, payload: &Value) -> Vec<Diagnostic> {
        let value = extract(payload, &self.field_path);
        match self.check(value, payload) {
            Ok(true) => Vec::new(),
            Ok(false) => vec![self.failure(value)],
            Err(reason) => vec![Diagnostic::error(
                codes::FIELD_VALIDATION_ERROR,
                format!("field validation error for {}: {}", self.field_path, reason),
            )
            .with_path(self.field_path.clone())],
        }
    }

    fn check(&self, value: Option<&Value>, payload: &Value) -> Result<bool, String> {
        match &self.kind {
            ValidatorKind::Required => Ok(present(value)),
            ValidatorKind::ConditionalRequired { when } => {
                if when.evaluate(payload) {
                    Ok(present(value))
                } else {
                    Ok(true)
                }
            }
            kind => {
                let value = match value {
                    Some(value) => value,
                    None => return Ok(!self.required),
                };
                self.check_present(kind, value)
            }
        }
    }

    fn check_present(&self, kind: &ValidatorKind, value: &Value) -> Result<bool, String> {
        let text = stringify(value);
        match kind {
            ValidatorKind::CurrencyFormat { min_value, max_value } => {
                let amount = match Decimal::from_str(text.trim()) {
                    Ok(amount) => amount,
                    Err(_) => return Ok(false),
                };
                if amount.scale() > 2 {
                    return Ok(false);
                }
                let min = min_value.unwrap_or(CURRENCY_MIN);
                let max = max_value.unwrap_or(CURRENCY_MAX);
                Ok(min <= amount && amount <= max)
            }
            ValidatorKind::DateFormat { format, min_date, max_date } => {
                if text.trim().is_empty() {
                    return Ok(!self.required);
                }
                let date = match parse_wire_date(&text, format) {
                    Some(date) => date,
                    None => return Ok(false),
                };
                if let Some(min) = min_date {
                    if date < *min {
                        return Ok(false);
                    }
                }
                if let Some(max) = max_date {
                    if date > *max {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ValidatorKind::NpiFormat => {
                if text.trim().is_empty() {
                    return Ok(!self.required);
                }
                Ok(NPI.is_match(text.trim()))
            }
            ValidatorKind::TaxIdFormat => {
                if text.trim().is_empty() {
                    return Ok(!self.required);
                }
                let id = text.trim();
                Ok(EIN.is_match(id) || SSN.is_match(id) || PLAIN_TAX_ID.is_match(id))
            }
            ValidatorKind::Range { min, max } => {
                let number = match as_number(value) {
                    Some(number) => number,
                    None => return Ok(false),
                };
                Ok(min.unwrap_or(f64::NEG_INFINITY) <= number
                    && number <= max.unwrap_or(f64::INFINITY))
            }
            ValidatorKind::OneOf { values } => {
                Ok(values.iter().any(|allowed| stringify(allowed) == text))
            }
            ValidatorKind::Pattern { pattern } => {
                let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
                // anchored at the start, like a match rather than a search
                Ok(regex.find(&text).map(|m| m.start() == 0).unwrap_or(false))
            }
            // presence kinds are dispatched before value checks
            ValidatorKind::Required | ValidatorKind::ConditionalRequired { .. } => Ok(true),
        }
    }

    fn failure(&self, value: Option<&Value>) -> Diagnostic {
        let message = match &self.message {
            Some(message) => message.clone(),
            None => format!("field validation failed: {}", self.field_path),
        };
        let mut diagnostic = Diagnostic::new(
            self.severity,
            &format!("FIELD_VALIDATION_{}", self.kind.code_suffix()),
            message,
        )
        .with_path(self.field_path.clone())
        .with_extra("validator_type", self.kind.name());
        if let Some(value) = value {
            diagnostic = diagnostic.with_value(stringify(value));
        }
        diagnostic
    }
}

fn present(value: Option<&Value>) -> bool {
    match value {
        Some(value) => !stringify(value).trim().is_empty(),
        None => false,
    }
}

#[cfg(test)]
fn validator(json: Value) -> FieldValidator {
    serde_json::from_value(json).unwrap()
}

#[cfg(test)]
fn payload() -> Value {
    serde_json::json!({
        "financial_info": { "total_paid": "1000.00", "method": "ACH", "date": "20241226" },
        "payee": { "npi": "1234567893", "tax_id": "12-3456789" },
        "claims": [ { "total_paid": "1.234" } ]
    })
}

#[test]
fn currency_rejects_three_fractional_digits() {
    let v = validator(serde_json::json!({
        "field_path": "claims[0].total_paid", "validator": "currency_format"
    }));
    assert_eq!(v.validate(&payload()).len(), 1);
    assert_eq!(
        v.validate(&payload())[0].code,
        "FIELD_VALIDATION_CURRENCY_FORMAT"
    );

    let ok = validator(serde_json::json!({
        "field_path": "financial_info.total_paid", "validator": "currency_format"
    }));
    assert!(ok.validate(&payload()).is_empty());
}

#[test]
fn null_passes_unless_required() {
    let optional = validator(serde_json::json!({
        "field_path": "financial_info.missing", "validator": "currency_format"
    }));
    assert!(optional.validate(&payload()).is_empty());

    let demanded = validator(serde_json::json!({
        "field_path": "financial_info.missing", "validator": "currency_format", "required": true
    }));
    assert_eq!(demanded.validate(&payload()).len(), 1);
}

#[test]
fn date_format_checks_the_calendar_and_bounds() {
    let v = validator(serde_json::json!({
        "field_path": "financial_info.date", "validator": "date_format"
    }));
    assert!(v.validate(&payload()).is_empty());

    let bounded = validator(serde_json::json!({
        "field_path": "financial_info.date", "validator": "date_format",
        "min_date": "2025-01-01"
    }));
    assert_eq!(bounded.validate(&payload()).len(), 1);

    let invalid = validator(serde_json::json!({
        "field_path": "financial_info.method", "validator": "date_format"
    }));
    assert_eq!(invalid.validate(&payload()).len(), 1);
}

#[test]
fn npi_and_tax_id_shapes() {
    let npi = validator(serde_json::json!({
        "field_path": "payee.npi", "validator": "npi_format"
    }));
    assert!(npi.validate(&payload()).is_empty());

    let tax = validator(serde_json::json!({
        "field_path": "payee.tax_id", "validator": "tax_id_format"
    }));
    assert!(tax.validate(&payload()).is_empty());

    let bad = validator(serde_json::json!({
        "field_path": "financial_info.method", "validator": "npi_format"
    }));
    assert_eq!(bad.validate(&payload()).len(), 1);
}

#[test]
fn enum_compares_after_stringification() {
    let v = validator(serde_json::json!({
        "field_path": "financial_info.method", "validator": "enum",
        "values": ["ACH", "CHK", "FWT", "NON"]
    }));
    assert!(v.validate(&payload()).is_empty());

    let narrow = validator(serde_json::json!({
        "field_path": "financial_info.method", "validator": "enum", "values": ["CHK"]
    }));
    assert_eq!(narrow.validate(&payload()).len(), 1);
}

#[test]
fn regex_matches_are_anchored_from_the_start() {
    let v = validator(serde_json::json!({
        "field_path": "financial_info.method", "validator": "regex", "pattern": "AC"
    }));
    assert!(v.validate(&payload()).is_empty());

    let unanchored = validator(serde_json::json!({
        "field_path": "financial_info.method", "validator": "regex", "pattern": "CH"
    }));
    assert_eq!(unanchored.validate(&payload()).len(), 1);

    let broken = validator(serde_json::json!({
        "field_path": "financial_info.method", "validator": "regex", "pattern": "("
    }));
    assert_eq!(broken.validate(&payload())[0].code, codes::FIELD_VALIDATION_ERROR);
}

#[test]
fn conditional_required_consults_its_premise() {
    let demanded = validator(serde_json::json!({
        "field_path": "financial_info.trace_number",
        "validator": "conditional_required",
        "when": { "field": "financial_info.method", "operator": "eq", "value": "ACH" }
    }));
    assert_eq!(demanded.validate(&payload()).len(), 1);

    let dormant = validator(serde_json::json!({
        "field_path": "financial_info.trace_number",
        "validator": "conditional_required",
        "when": { "field": "financial_info.method", "operator": "eq", "value": "CHK" }
    }));
    assert!(dormant.validate(&payload()).is_empty());
}
