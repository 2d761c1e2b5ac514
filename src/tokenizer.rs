use crate::diagnostic::{codes, Diagnostic};
use crate::handler::{ErrorHandler, ParseError};
use crate::segment::{Delimiters, RawSegment};

/// Byte offsets into the ISA segment where the delimiters live. The ISA
/// header is fixed-width, which is what makes delimiter auto-detection
/// possible: the element separator follows the tag immediately and the
/// component separator and segment terminator are the last two bytes.
const ELEMENT_DELIMITER_OFFSET: usize = 3;
const COMPONENT_DELIMITER_OFFSET: usize = 104;
const SEGMENT_TERMINATOR_OFFSET: usize = 105;

/// Split a raw document into segments using the delimiters declared in its
/// ISA header.
///
/// Carriage returns and line feeds between segments are ignored, empty
/// trailing elements are kept verbatim, and element interiors are never
/// trimmed. The only fatal condition is the absence of an ISA header;
/// everything else degrades to diagnostics on the handler.
pub fn tokenize(
    input: &str,
    handler: &mut ErrorHandler,
) -> Result<(Vec<RawSegment>, Delimiters), ParseError> {
    // Locate the header with the conventional delimiters, then re-confirm
    // the real ones from the header itself.
    let start = match locate_isa(input) {
        Some(start) => start,
        None => return Err(ParseError::NoInterchangeHeader),
    };
    let bytes = input.as_bytes();
    if bytes.len() < start + SEGMENT_TERMINATOR_OFFSET + 1 {
        return Err(ParseError::NoInterchangeHeader);
    }
    let delimiters = Delimiters {
        element: bytes[start + ELEMENT_DELIMITER_OFFSET] as char,
        component: bytes[start + COMPONENT_DELIMITER_OFFSET] as char,
        segment: bytes[start + SEGMENT_TERMINATOR_OFFSET] as char,
    };
    tracing::debug!(
        element = %delimiters.element,
        component = %delimiters.component,
        terminator = %delimiters.segment,
        "detected delimiters from ISA header"
    );

    let mut segments = Vec::new();
    let mut remainder = &input[start..];
    loop {
        match remainder.find(delimiters.segment) {
            Some(end) => {
                push_segment(&remainder[..end], delimiters, &mut segments, handler)?;
                remainder = &remainder[end + delimiters.segment.len_utf8()..];
            }
            None => {
                // No terminator before EOF. Emit whatever is buffered and warn.
                let trailing = remainder.trim_matches(|c: char| c.is_ascii_whitespace());
                if !trailing.is_empty() {
                    push_segment(trailing, delimiters, &mut segments, handler)?;
                    handler.report(
                        Diagnostic::warning(
                            codes::TRUNCATED_FINAL_SEGMENT,
                            "final segment is missing its terminator",
                        )
                        .with_value(trailing),
                    )?;
                }
                break;
            }
        }
    }
    Ok((segments, delimiters))
}

/// Find the start of the ISA header, skipping leading whitespace or line
/// noise. The tag must be followed by a non-alphanumeric byte, which is the
/// element separator.
fn locate_isa(input: &str) -> Option<usize> {
    let mut search_from = 0;
    while let Some(relative) = input[search_from..].find("ISA") {
        let start = search_from + relative;
        match input.as_bytes().get(start + 3) {
            Some(byte) if !byte.is_ascii_alphanumeric() => return Some(start),
            Some(_) => search_from = start + 3,
            None => return None,
        }
    }
    None
}

fn push_segment(
    raw: &str,
    delimiters: Delimiters,
    segments: &mut Vec<RawSegment>,
    handler: &mut ErrorHandler,
) -> Result<(), ParseError> {
    // Whitespace between the previous terminator and this tag is not data.
    let raw = raw.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let raw = raw.trim_end_matches(&['\r', '\n'][..]);
    if raw.is_empty() {
        return Ok(());
    }
    let mut parts = raw.split(delimiters.element);
    let tag = parts.next().unwrap_or("").trim().to_string();
    if tag.is_empty() {
        handler.report(
            Diagnostic::warning(
                codes::LEADING_EMPTY_SEGMENT,
                "segment with an empty tag was skipped",
            )
            .with_value(raw),
        )?;
        return Ok(());
    }
    let elements: Vec<String> = parts.map(|e| e.to_string()).collect();
    segments.push(RawSegment::new(tag, elements));
    Ok(())
}

#[cfg(test)]
const MINIMAL_ISA: &str = "ISA*00*          *00*          *ZZ*SENDERISA      *14*0073268795005  *020226*1534*U*00401*000000001*0*T*>~";

#[test]
fn detects_delimiters_from_the_isa_header() {
    let mut handler = ErrorHandler::collecting();
    let (segments, delimiters) = tokenize(MINIMAL_ISA, &mut handler).unwrap();
    assert_eq!(delimiters.element, '*');
    assert_eq!(delimiters.component, '>');
    assert_eq!(delimiters.segment, '~');
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].tag, "ISA");
    assert_eq!(segments[0].element(6), "SENDERISA");
    assert_eq!(segments[0].len(), 16);
}

#[test]
fn missing_isa_header_is_fatal() {
    let mut handler = ErrorHandler::collecting();
    let result = tokenize("GS*PO*A*B*20020226*1534*1*X*004010~", &mut handler);
    assert!(matches!(result, Err(ParseError::NoInterchangeHeader)));
}

#[test]
fn newlines_between_segments_are_ignored() {
    let input = format!("{}\r\nGS*HP*A*B*20241226*1430*1*X*005010X221A1~\nST*835*0001~", MINIMAL_ISA);
    let mut handler = ErrorHandler::collecting();
    let (segments, _) = tokenize(&input, &mut handler).unwrap();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[1].tag, "GS");
    assert_eq!(segments[2].tag, "ST");
    assert!(handler.diagnostics().is_empty());
}

#[test]
fn truncated_final_segment_is_emitted_with_a_warning() {
    let input = format!("{}GS*HP*A*B*20241226*1430*1*X*005010X221A1", MINIMAL_ISA);
    let mut handler = ErrorHandler::collecting();
    let (segments, _) = tokenize(&input, &mut handler).unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[1].tag, "GS");
    assert_eq!(handler.diagnostics()[0].code, codes::TRUNCATED_FINAL_SEGMENT);
}

#[test]
fn empty_tag_segments_are_skipped_with_a_diagnostic() {
    let input = format!("{}*A*B~GS*HP*A*B*20241226*1430*1*X*1~", MINIMAL_ISA);
    let mut handler = ErrorHandler::collecting();
    let (segments, _) = tokenize(&input, &mut handler).unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(handler.diagnostics()[0].code, codes::LEADING_EMPTY_SEGMENT);
}

#[test]
fn empty_trailing_elements_are_preserved() {
    let input = format!("{}BPR*I*1000.00*C*ACH*****~", MINIMAL_ISA);
    let mut handler = ErrorHandler::collecting();
    let (segments, _) = tokenize(&input, &mut handler).unwrap();
    assert_eq!(segments[1].len(), 9);
    assert_eq!(segments[1].element(9), "");
}
