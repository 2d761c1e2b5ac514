use crate::assembler::assemble;
use crate::diagnostic::Diagnostic;
use crate::handler::{ErrorHandler, HandlerPolicy, ParseError};
use crate::interchange::Interchange;
use crate::registry::{default_registry, ParserRegistry};
use crate::tokenizer::tokenize;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entire parsed EDI document: every interchange with its functional
/// groups and typed transactions.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub interchanges: Vec<Interchange>,
}

impl Document {
    /// The canonical dictionary projection of the whole document. The
    /// projection preserves insertion order and round-trips through
    /// [Document::from_value].
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Rebuild a document from its canonical projection.
    pub fn from_value(value: Value) -> Result<Document, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// All transactions in document order.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.interchanges
            .iter()
            .flat_map(|i| i.functional_groups.iter())
            .flat_map(|g| g.transactions.iter())
    }
}

/// The result of parsing one document: the tree plus every diagnostic the
/// pipeline collected, in emission order.
#[derive(Debug)]
pub struct ParseOutcome {
    pub document: Document,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutcome {
    /// Whether any collected diagnostic is ERROR or CRITICAL.
    pub fn has_blocking_diagnostics(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_blocking)
    }
}

/// Parse a document with the default registry and the collect-everything
/// error policy. This is the main entry point to the crate.
pub fn parse(input: &str) -> Result<ParseOutcome, ParseError> {
    parse_with(input, &default_registry_snapshot(), HandlerPolicy::Collect)
}

/// Parse with the fail-fast policy: the first ERROR or CRITICAL diagnostic
/// aborts with [ParseError::FailFast].
pub fn strict_parse(input: &str) -> Result<ParseOutcome, ParseError> {
    parse_with(input, &default_registry_snapshot(), HandlerPolicy::FailFast)
}

/// Parse against a caller-owned registry snapshot under an explicit error
/// policy. Workers processing documents in parallel each take their own
/// snapshot and share nothing mutable.
pub fn parse_with(
    input: &str,
    registry: &ParserRegistry,
    policy: HandlerPolicy,
) -> Result<ParseOutcome, ParseError> {
    let mut handler = ErrorHandler::new(policy);
    let (segments, delimiters) = tokenize(input, &mut handler)?;
    let document = assemble(segments, delimiters, registry, &mut handler)?;
    Ok(ParseOutcome {
        document,
        diagnostics: handler.take_diagnostics(),
    })
}

fn default_registry_snapshot() -> ParserRegistry {
    match default_registry().read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

#[cfg(test)]
use crate::diagnostic::codes;
#[cfg(test)]
use crate::transaction::Payload;

#[cfg(test)]
const MINIMAL_835: &str = concat!(
    "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *241226*1430*U*00501*000000001*0*P*>~",
    "GS*HP*SENDER*RECEIVER*20241226*1430*000000001*X*005010X221A1~",
    "ST*835*0001~",
    "BPR*I*1000.00*C*ACH*CCP*01*123456789*DA*987654321*PAYERCO*20241226~",
    "TRN*1*TRACE123*1~",
    "SE*4*0001~",
    "GE*1*000000001~",
    "IEA*1*000000001~"
);

#[test]
fn parses_a_minimal_835_document() {
    let outcome = parse(MINIMAL_835).unwrap();
    assert!(!outcome.has_blocking_diagnostics());
    assert_eq!(outcome.document.interchanges.len(), 1);
    let interchange = &outcome.document.interchanges[0];
    assert_eq!(interchange.functional_groups.len(), 1);
    let transactions = &interchange.functional_groups[0].transactions;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].header.set_code, "835");
    match &transactions[0].payload {
        Payload::PaymentAdvice(advice) => {
            let financial = advice.financial_info.as_ref().unwrap();
            assert_eq!(financial.total_paid.to_string(), "1000.00");
            assert_eq!(financial.method, "ACH");
            assert_eq!(financial.date_iso.as_deref(), Some("2024-12-26"));
        }
        other => panic!("expected a payment advice, got {:?}", other),
    }
}

#[test]
fn projection_round_trips() {
    let outcome = parse(MINIMAL_835).unwrap();
    let projected = outcome.document.to_value();
    let restored = Document::from_value(projected.clone()).unwrap();
    assert_eq!(restored, outcome.document);
    assert_eq!(restored.to_value(), projected);
}

#[test]
fn parsing_twice_yields_identical_diagnostics() {
    let input = MINIMAL_835.replace("SE*4*0001", "SE*4*0002");
    let first = parse(&input).unwrap();
    let second = parse(&input).unwrap();
    assert_eq!(first.diagnostics, second.diagnostics);
    assert!(first
        .diagnostics
        .iter()
        .any(|d| d.code == codes::CONTROL_NUMBER_MISMATCH));
}

#[test]
fn strict_parse_aborts_on_blocking_diagnostics() {
    // an unregistered transaction code is a blocking diagnostic
    let input = MINIMAL_835
        .replace("ST*835*0001", "ST*850*0001")
        .replace("BPR*I*1000.00*C*ACH*CCP*01*123456789*DA*987654321*PAYERCO*20241226", "BEG*00*NE*PO1~");
    assert!(parse(&input).is_ok());
    match strict_parse(&input) {
        Err(ParseError::FailFast(diagnostic)) => {
            assert_eq!(diagnostic.code, codes::UNKNOWN_TRANSACTION_CODE)
        }
        other => panic!("expected fail-fast abort, got {:?}", other.map(|_| ())),
    }
}
