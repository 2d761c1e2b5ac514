use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Severity of a [Diagnostic].
///
/// `Critical` is reserved for rule authors marking domain-blocking
/// conditions; the framework itself never emits it.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Whether this severity aborts processing under the fail-fast policy.
    pub fn is_blocking(self) -> bool {
        matches!(self, Severity::Critical | Severity::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(f, "{}", label)
    }
}

/// A structured record of a parse or validation finding.
///
/// Diagnostics are data, not errors: every recoverable issue in the pipeline
/// becomes one of these and processing continues. Once emitted a diagnostic
/// is never mutated (the rule engine stamps `rule_name`/`rule_category`
/// before emission).
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable machine-readable code, one of the constants in [codes].
    pub code: String,
    pub message: String,
    /// Field path the finding refers to, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Offending value, stringified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_category: Option<String>,
    /// Kind-specific payload (`total_field`, `difference`, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity,
            code: code.to_string(),
            message: message.into(),
            path: None,
            value: None,
            rule_name: None,
            rule_category: None,
            extras: Map::new(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Error, code, message)
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Warning, code, message)
    }

    pub fn info(code: &str, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Info, code, message)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Diagnostic {
        self.path = Some(path.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Diagnostic {
        self.value = Some(value.into());
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Diagnostic {
        self.extras.insert(key.to_string(), value.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)
    }
}

/// The diagnostic codes emitted by this crate.
pub mod codes {
    // structural
    pub const NO_ISA_HEADER: &str = "NO_ISA_HEADER";
    pub const ENVELOPE_SEQUENCE_ERROR: &str = "ENVELOPE_SEQUENCE_ERROR";
    pub const CONTROL_NUMBER_MISMATCH: &str = "CONTROL_NUMBER_MISMATCH";
    pub const DUPLICATE_CONTROL_NUMBER: &str = "DUPLICATE_CONTROL_NUMBER";
    pub const SEGMENT_COUNT_MISMATCH: &str = "SEGMENT_COUNT_MISMATCH";
    pub const TRUNCATED_FINAL_SEGMENT: &str = "TRUNCATED_FINAL_SEGMENT";
    pub const LEADING_EMPTY_SEGMENT: &str = "LEADING_EMPTY_SEGMENT";

    // parse
    pub const UNKNOWN_TRANSACTION_CODE: &str = "UNKNOWN_TRANSACTION_CODE";
    pub const MISSING_REQUIRED_SEGMENT: &str = "MISSING_REQUIRED_SEGMENT";
    pub const SHORT_SEGMENT: &str = "SHORT_SEGMENT";

    // field validation
    pub const FIELD_VALIDATION_ERROR: &str = "FIELD_VALIDATION_ERROR";

    // cross-field validation
    pub const BALANCE_MISMATCH: &str = "BALANCE_MISMATCH";
    pub const CONSISTENCY_CHECK_FAILED: &str = "CONSISTENCY_CHECK_FAILED";
    pub const CALCULATION_MISMATCH: &str = "CALCULATION_MISMATCH";
    pub const CALCULATION_ERROR: &str = "CALCULATION_ERROR";
    pub const LOGICAL_CHECK_FAILED: &str = "LOGICAL_CHECK_FAILED";
    pub const LOGICAL_VALIDATION_ERROR: &str = "LOGICAL_VALIDATION_ERROR";
    pub const CROSS_FIELD_VALIDATION_ERROR: &str = "CROSS_FIELD_VALIDATION_ERROR";

    // plugins
    pub const PLUGIN_OVERRIDE: &str = "PLUGIN_OVERRIDE";
    pub const PLUGIN_LOAD_FAILED: &str = "PLUGIN_LOAD_FAILED";
    pub const PLUGIN_INTERFACE_INVALID: &str = "PLUGIN_INTERFACE_INVALID";

    // custom rules
    pub const CUSTOM_VALIDATION_ERROR: &str = "CUSTOM_VALIDATION_ERROR";
}

#[test]
fn severity_ordering_is_most_severe_first() {
    assert!(Severity::Critical < Severity::Error);
    assert!(Severity::Error < Severity::Warning);
    assert!(Severity::Warning < Severity::Info);
}

#[test]
fn diagnostic_builder_roundtrip() {
    let diagnostic = Diagnostic::warning(codes::BALANCE_MISMATCH, "totals do not balance")
        .with_path("financial_info.total_paid")
        .with_value("500")
        .with_extra("difference", "50");
    assert_eq!(diagnostic.severity, Severity::Warning);
    assert_eq!(diagnostic.code, "BALANCE_MISMATCH");
    assert_eq!(diagnostic.path.as_deref(), Some("financial_info.total_paid"));
    assert_eq!(diagnostic.extras["difference"], "50");
    assert!(!diagnostic.is_blocking());

    let json = serde_json::to_value(&diagnostic).unwrap();
    let back: Diagnostic = serde_json::from_value(json).unwrap();
    assert_eq!(back, diagnostic);
}
