use serde::{Deserialize, Serialize};

/// The three delimiters in force for one document, detected from the ISA
/// interchange header.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Delimiters {
    /// Separates elements within a segment. Conventionally `*`.
    pub element: char,
    /// Separates components within an element. Conventionally `:` or `^`.
    pub component: char,
    /// Terminates a segment. Conventionally `~`.
    pub segment: char,
}

impl Default for Delimiters {
    fn default() -> Delimiters {
        Delimiters {
            element: '*',
            component: ':',
            segment: '~',
        }
    }
}

/// One tokenized segment: a tag and its ordered elements, exactly as they
/// appeared on the wire. Immutable after tokenization.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RawSegment {
    pub tag: String,
    /// Elements after the tag. Interior whitespace and empty trailing
    /// elements are preserved verbatim.
    pub elements: Vec<String>,
}

impl RawSegment {
    pub fn new(tag: impl Into<String>, elements: Vec<String>) -> RawSegment {
        RawSegment {
            tag: tag.into(),
            elements,
        }
    }

    /// Access an element by its X12 position (1-based, so `element(1)` is
    /// the first element after the tag). Out-of-range positions read as the
    /// empty string; values are trimmed of surrounding whitespace.
    pub fn element(&self, position: usize) -> &str {
        if position == 0 {
            return &self.tag;
        }
        self.elements
            .get(position - 1)
            .map(|e| e.trim())
            .unwrap_or("")
    }

    /// Access one component of a composite element, split on the detected
    /// component delimiter. Missing components read as the empty string.
    pub fn component(&self, position: usize, index: usize, delimiter: char) -> &str {
        self.element(position)
            .split(delimiter)
            .nth(index)
            .unwrap_or("")
    }

    /// Number of elements after the tag.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    /// The first element, which on many segments (N1, DTM, REF, ...) acts
    /// as a qualifier for the rest.
    pub fn qualifier(&self) -> &str {
        self.element(1)
    }
}

#[test]
fn element_access_never_faults() {
    let segment = RawSegment::new(
        "CLP",
        vec!["CLAIM001".to_string(), "1".to_string(), " 500.00 ".to_string()],
    );
    assert_eq!(segment.element(0), "CLP");
    assert_eq!(segment.element(1), "CLAIM001");
    assert_eq!(segment.element(3), "500.00");
    assert_eq!(segment.element(4), "");
    assert_eq!(segment.element(99), "");
}

#[test]
fn composite_elements_split_on_the_component_delimiter() {
    let segment = RawSegment::new("SVC", vec!["HC:99213".to_string(), "500".to_string()]);
    assert_eq!(segment.component(1, 0, ':'), "HC");
    assert_eq!(segment.component(1, 1, ':'), "99213");
    assert_eq!(segment.component(1, 2, ':'), "");
    assert_eq!(segment.component(2, 0, ':'), "500");
}

#[test]
fn qualifier_reads_the_first_element() {
    let segment = RawSegment::new("N1", vec!["PR".to_string(), "PAYER".to_string()]);
    assert!(segment.is("N1"));
    assert_eq!(segment.qualifier(), "PR");
}
