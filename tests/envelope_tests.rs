// These tests exercise envelope assembly: pairing of the IEA/GE/SE
// trailers with their openers, control number verification, and recovery
// from out-of-order segments. Note that SE counts include the ST and SE
// segments themselves, effectively adding two to the count.

use edi_healthcare::{codes, parse, HandlerPolicy, ParseError, ParserRegistry, Payload, Severity};
use pretty_assertions::assert_eq;

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
fn empty_document_has_no_interchange_header() {
    assert!(matches!(parse(""), Err(ParseError::NoInterchangeHeader)));
}

#[test]
fn missing_interchange_is_fatal() {
    let input = "GS*HP*SENDER*RECEIVER*20241226*1430*1*X*005010X221A1~ST*835*0001~SE*2*0001~GE*1*1~";
    assert!(matches!(parse(input), Err(ParseError::NoInterchangeHeader)));
}

#[test]
fn one_transaction_per_st_segment() {
    let two = MINIMAL_835.replace(
        "GE*1*000000001~",
        concat!(
            "ST*835*0002~",
            "BPR*I*200.00*C*CHK~",
            "SE*3*0002~",
            "GE*2*000000001~"
        ),
    );
    let outcome = parse(&two).unwrap();
    assert_eq!(outcome.document.transactions().count(), 2);
    let controls: Vec<&str> = outcome
        .document
        .transactions()
        .map(|t| t.header.control_number.as_str())
        .collect();
    assert_eq!(controls, vec!["0001", "0002"]);
}

#[test]
fn control_number_mismatch_keeps_the_parsed_transaction() {
    let input = MINIMAL_835.replace("SE*4*0001~", "SE*4*0002~");
    let outcome = parse(&input).unwrap();

    let mismatches: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::CONTROL_NUMBER_MISMATCH)
        .collect();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].severity, Severity::Warning);

    // the document still contains the transaction with its parsed payload
    let transaction = outcome.document.transactions().next().unwrap();
    assert_eq!(transaction.header.control_number, "0001");
    match &transaction.payload {
        Payload::PaymentAdvice(advice) => {
            assert_eq!(
                advice.financial_info.as_ref().unwrap().total_paid.to_string(),
                "1000.00"
            );
        }
        other => panic!("expected a payment advice, got {:?}", other),
    }
}

#[test]
fn group_and_interchange_control_numbers_are_verified() {
    let input = MINIMAL_835
        .replace("GE*1*000000001~", "GE*1*000000009~")
        .replace("IEA*1*000000001~", "IEA*1*000000009~");
    let outcome = parse(&input).unwrap();
    let mismatches = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::CONTROL_NUMBER_MISMATCH)
        .count();
    assert_eq!(mismatches, 2);
}

#[test]
fn segment_count_claims_are_informational() {
    let input = MINIMAL_835.replace("SE*4*0001~", "SE*11*0001~");
    let outcome = parse(&input).unwrap();
    let counts: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::SEGMENT_COUNT_MISMATCH)
        .collect();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].severity, Severity::Info);
    assert!(!outcome.has_blocking_diagnostics());
}

#[test]
fn missing_trailers_recover_with_sequence_errors() {
    // the transaction and group never close before the next interchange opens
    let input = concat!(
        "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *241226*1430*U*00501*000000001*0*P*>~",
        "GS*HP*SENDER*RECEIVER*20241226*1430*000000001*X*005010X221A1~",
        "ST*835*0001~",
        "BPR*I*1000.00*C*ACH~",
        "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *241226*1430*U*00501*000000002*0*P*>~",
        "IEA*0*000000002~"
    );
    let outcome = parse(input).unwrap();
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.code == codes::ENVELOPE_SEQUENCE_ERROR));
    // both interchanges survive, and the open transaction was closed and parsed
    assert_eq!(outcome.document.interchanges.len(), 2);
    assert_eq!(outcome.document.transactions().count(), 1);
}

#[test]
fn stray_segments_buffer_into_the_innermost_scope() {
    let input = MINIMAL_835.replace(
        "GE*1*000000001~",
        "GE*1*000000001~PID*STRAY*SEGMENT~",
    );
    let outcome = parse(&input).unwrap();
    let interchange = &outcome.document.interchanges[0];
    assert_eq!(interchange.trailing.len(), 1);
    assert_eq!(interchange.trailing[0].tag, "PID");
}

#[test]
fn duplicate_control_numbers_warn() {
    let second = MINIMAL_835.to_string() + MINIMAL_835;
    let outcome = parse(&second).unwrap();
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.code == codes::DUPLICATE_CONTROL_NUMBER));
    assert_eq!(outcome.document.interchanges.len(), 2);
}

#[test]
fn newline_as_segment_terminator() {
    // when the byte after the component separator is a newline, newlines
    // terminate segments
    let input = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *241226*1430*U*00501*000000001*0*P*>\nGS*HP*SENDER*RECEIVER*20241226*1430*000000001*X*005010X221A1\nST*835*0001\nBPR*I*1000.00*C*ACH\nSE*3*0001\nGE*1*000000001\nIEA*1*000000001\n";
    let outcome = parse(input).unwrap();
    assert_eq!(outcome.document.transactions().count(), 1);
}

#[test]
fn unknown_transaction_codes_degrade_to_untyped_payloads() {
    let input = MINIMAL_835
        .replace("ST*835*0001~", "ST*850*0001~")
        .replace(
            "BPR*I*1000.00*C*ACH*CCP*01*123456789*DA*987654321*PAYERCO*20241226~",
            "BEG*00*NE*PO123~",
        )
        .replace("TRN*1*TRACE123*1~", "PO1*1*4*EA*8.60~");
    let outcome = parse(&input).unwrap();
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.code == codes::UNKNOWN_TRANSACTION_CODE));
    let transaction = outcome.document.transactions().next().unwrap();
    assert_eq!(transaction.header.set_code, "850");
    assert_eq!(transaction.payload, Payload::Untyped);
    let tags: Vec<&str> = transaction.segments.iter().map(|s| s.tag.as_str()).collect();
    assert_eq!(tags, vec!["BEG", "PO1"]);
}

#[test]
fn fail_fast_policy_stops_at_the_first_blocking_diagnostic() {
    let registry = ParserRegistry::with_builtins();
    let input = MINIMAL_835.replace(
        "BPR*I*1000.00*C*ACH*CCP*01*123456789*DA*987654321*PAYERCO*20241226~",
        "DTM*405*20241226~",
    );
    // without BPR the 835 fails envelope validation, which is blocking
    match edi_healthcare::parse_with(&input, &registry, HandlerPolicy::FailFast) {
        Err(ParseError::FailFast(diagnostic)) => {
            assert_eq!(diagnostic.code, codes::MISSING_REQUIRED_SEGMENT)
        }
        other => panic!("expected fail-fast abort, got {:?}", other.map(|_| ())),
    }
    // the collect policy keeps going on the same input
    let outcome = edi_healthcare::parse_with(&input, &registry, HandlerPolicy::Collect).unwrap();
    assert_eq!(outcome.document.transactions().count(), 1);
}
