use crate::diagnostic::Diagnostic;
use thiserror::Error;

/// Fatal failures. Everything recoverable is a [Diagnostic] routed through
/// an [ErrorHandler]; this enum covers the few conditions where aborting the
/// current operation is the only safe option.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("input does not contain an ISA interchange header")]
    NoInterchangeHeader,
    /// Emitted by the fail-fast policy on the first blocking diagnostic.
    #[error("aborted on first blocking diagnostic: [{}] {}", .0.code, .0.message)]
    FailFast(Box<Diagnostic>),
}

/// How an [ErrorHandler] reacts to reported diagnostics.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum HandlerPolicy {
    /// Accumulate everything and keep going. The default.
    #[default]
    Collect,
    /// Like `Collect` but without the logging side channel.
    Silent,
    /// Abort the current top-level operation on the first ERROR or CRITICAL
    /// diagnostic. WARNING and INFO are still collected.
    FailFast,
}

/// Central sink for parse and validation diagnostics.
///
/// Components report findings here instead of returning errors, which keeps
/// a single pass over malformed input productive: the handler decides
/// whether processing continues.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    policy: HandlerPolicy,
    diagnostics: Vec<Diagnostic>,
}

impl ErrorHandler {
    pub fn new(policy: HandlerPolicy) -> ErrorHandler {
        ErrorHandler {
            policy,
            diagnostics: Vec::new(),
        }
    }

    pub fn collecting() -> ErrorHandler {
        ErrorHandler::new(HandlerPolicy::Collect)
    }

    pub fn policy(&self) -> HandlerPolicy {
        self.policy
    }

    /// Record a diagnostic. Under the fail-fast policy a blocking diagnostic
    /// is returned as `Err` so the caller can unwind the current operation;
    /// otherwise this always succeeds.
    pub fn report(&mut self, diagnostic: Diagnostic) -> Result<(), ParseError> {
        if self.policy == HandlerPolicy::Collect {
            tracing::debug!(
                code = %diagnostic.code,
                severity = %diagnostic.severity,
                "{}",
                diagnostic.message
            );
        }
        if self.policy == HandlerPolicy::FailFast && diagnostic.is_blocking() {
            self.diagnostics.push(diagnostic.clone());
            return Err(ParseError::FailFast(Box::new(diagnostic)));
        }
        self.diagnostics.push(diagnostic);
        Ok(())
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain collected diagnostics in emission order.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn has_blocking(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_blocking)
    }
}

#[cfg(test)]
use crate::diagnostic::codes;

#[test]
fn collect_policy_accumulates_blocking_diagnostics() {
    let mut handler = ErrorHandler::collecting();
    handler
        .report(Diagnostic::error(codes::MISSING_REQUIRED_SEGMENT, "no BPR"))
        .unwrap();
    handler
        .report(Diagnostic::warning(codes::CONTROL_NUMBER_MISMATCH, "0002 != 0001"))
        .unwrap();
    assert_eq!(handler.diagnostics().len(), 2);
    assert!(handler.has_blocking());
}

#[test]
fn fail_fast_aborts_on_first_blocking_diagnostic() {
    let mut handler = ErrorHandler::new(HandlerPolicy::FailFast);
    handler
        .report(Diagnostic::warning(codes::CONTROL_NUMBER_MISMATCH, "warn"))
        .unwrap();
    let result = handler.report(Diagnostic::error(codes::MISSING_REQUIRED_SEGMENT, "no BPR"));
    match result {
        Err(ParseError::FailFast(diagnostic)) => {
            assert_eq!(diagnostic.code, codes::MISSING_REQUIRED_SEGMENT)
        }
        other => panic!("expected fail-fast abort, got {:?}", other.map(|_| ())),
    }
    // the blocking diagnostic is still on record
    assert_eq!(handler.diagnostics().len(), 2);
}

#[test]
fn take_diagnostics_preserves_emission_order() {
    let mut handler = ErrorHandler::new(HandlerPolicy::Silent);
    handler.report(Diagnostic::info(codes::SHORT_SEGMENT, "a")).unwrap();
    handler.report(Diagnostic::info(codes::SHORT_SEGMENT, "b")).unwrap();
    let drained = handler.take_diagnostics();
    assert_eq!(
        drained.iter().map(|d| d.message.as_str()).collect::<Vec<_>>(),
        vec!["a", "b"]
    );
    assert!(handler.diagnostics().is_empty());
}
