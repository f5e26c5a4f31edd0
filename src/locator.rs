//! Element reference resolution
//!
//! Tries targeting modes in a fixed priority order and refuses to guess: a
//! reference that cannot be proven to address a region resolves to
//! `NotFound`, which callers treat as "zero changes". Only a line number
//! beyond the document is an outright error, because positional intent is
//! unambiguous and unambiguously wrong.

use crate::error::EngineError;
use crate::strategy::{ContentStrategy, Region};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Caller-supplied locator for the region to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementReference {
    /// Identifying marker: an id-like attribute, directive name, or
    /// component tag name
    #[serde(default)]
    pub identifier: Option<String>,

    /// Structural selector, resolved by the active strategy
    #[serde(default)]
    pub selector: Option<String>,

    /// Text expected to currently exist in the document
    #[serde(default)]
    pub content_hint: Option<String>,

    /// 1-indexed line number
    #[serde(default)]
    pub line_number: Option<usize>,

    /// Attribute name, when mutating an attribute rather than content
    #[serde(default)]
    pub attribute: Option<String>,
}

impl ElementReference {
    pub fn from_hint(hint: impl Into<String>) -> Self {
        Self {
            content_hint: Some(hint.into()),
            ..Default::default()
        }
    }

    pub fn from_selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Default::default()
        }
    }

    pub fn from_line(line_number: usize) -> Self {
        Self {
            line_number: Some(line_number),
            ..Default::default()
        }
    }

    /// True when no targeting mode is present at all.
    pub fn is_empty(&self) -> bool {
        self.identifier.is_none()
            && self.selector.is_none()
            && self.content_hint.is_none()
            && self.line_number.is_none()
    }
}

/// Which targeting mode produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateMode {
    Identifier,
    Selector,
    HintExact,
    HintDecoded,
    HintBetweenTags,
    Line,
}

/// A successfully resolved region.
#[derive(Debug, Clone)]
pub struct Located {
    pub region: Region,
    pub matched_text: String,
    pub mode: LocateMode,
}

/// Resolution result. Not finding anything is a value, not an error.
#[derive(Debug, Clone)]
pub enum LocateOutcome {
    Found(Located),
    NotFound,
}

impl LocateOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, LocateOutcome::Found(_))
    }
}

/// Resolve a reference against the current document text.
pub fn locate(
    content: &str,
    reference: &ElementReference,
    strategy: &dyn ContentStrategy,
) -> Result<LocateOutcome, EngineError> {
    if reference.is_empty() {
        return Err(EngineError::InvalidInput {
            message: "element reference has no targeting mode".into(),
        });
    }

    if let Some(ref ident) = reference.identifier {
        if let Some(region) = strategy.find_identifier(content, ident) {
            return Ok(found(content, region, LocateMode::Identifier));
        }
    }

    if let Some(ref selector) = reference.selector {
        let regions = strategy.resolve_selector(content, selector);
        if let Some(region) = regions.first() {
            return Ok(found(content, *region, LocateMode::Selector));
        }
        // Zero matches fall through to the next mode rather than failing
    }

    if let Some(ref hint) = reference.content_hint {
        if let Some(outcome) = locate_by_hint(content, hint) {
            return Ok(outcome);
        }
    }

    if let Some(line_number) = reference.line_number {
        return locate_by_line(content, line_number);
    }

    Ok(LocateOutcome::NotFound)
}

fn found(content: &str, region: Region, mode: LocateMode) -> LocateOutcome {
    LocateOutcome::Found(Located {
        region,
        matched_text: region.slice(content).to_string(),
        mode,
    })
}

fn locate_by_hint(content: &str, hint: &str) -> Option<LocateOutcome> {
    if hint.is_empty() {
        return None;
    }

    if let Some(start) = content.find(hint) {
        return Some(found(
            content,
            Region::new(start, start + hint.len()),
            LocateMode::HintExact,
        ));
    }

    // The hint usually comes from rendered output, so entities may differ
    // from the document's encoding in either direction
    let decoded = decode_entities(hint);
    if decoded != hint {
        if let Some(start) = content.find(&decoded) {
            return Some(found(
                content,
                Region::new(start, start + decoded.len()),
                LocateMode::HintDecoded,
            ));
        }
    }
    let encoded = encode_entities(hint);
    if encoded != hint {
        if let Some(start) = content.find(&encoded) {
            return Some(found(
                content,
                Region::new(start, start + encoded.len()),
                LocateMode::HintDecoded,
            ));
        }
    }

    // Last resort: the hint flanked by markup delimiters, with flexible
    // whitespace. Anything looser would be guessing.
    let flexible = hint
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    if flexible.is_empty() {
        return None;
    }
    let pattern = format!(r">\s*({})\s*<", flexible);
    if let Ok(re) = Regex::new(&pattern) {
        if let Some(caps) = re.captures(content) {
            let m = caps.get(1).expect("pattern has one group");
            return Some(found(
                content,
                Region::new(m.start(), m.end()),
                LocateMode::HintBetweenTags,
            ));
        }
    }

    None
}

fn locate_by_line(content: &str, line_number: usize) -> Result<LocateOutcome, EngineError> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let total = lines.len();
    if line_number == 0 || line_number > total {
        return Err(EngineError::OutOfRange {
            line: line_number,
            total,
        });
    }

    let mut offset = 0;
    for (i, line) in lines.iter().enumerate() {
        if i + 1 == line_number {
            let text = line.trim_end_matches(['\r', '\n']);
            return Ok(found(
                content,
                Region::new(offset, offset + text.len()),
                LocateMode::Line,
            ));
        }
        offset += line.len();
    }

    unreachable!("line number validated against line count");
}

/// Decode the common HTML entities an editor-facing hint may carry.
pub fn decode_entities(text: &str) -> String {
    let re = Regex::new(r"&(?:#x?[0-9a-fA-F]+|[a-zA-Z]+);").unwrap();
    re.replace_all(text, |caps: &regex::Captures| {
        let entity = caps.get(0).expect("whole match").as_str();
        match entity {
            "&amp;" => "&".to_string(),
            "&lt;" => "<".to_string(),
            "&gt;" => ">".to_string(),
            "&quot;" => "\"".to_string(),
            "&apos;" => "'".to_string(),
            "&nbsp;" => "\u{A0}".to_string(),
            _ => {
                let body = &entity[1..entity.len() - 1];
                let parsed = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = body.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                parsed
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| entity.to_string())
            }
        }
    })
    .into_owned()
}

/// Minimal encoding of text the document may store entity-escaped.
pub fn encode_entities(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{MarkupStrategy, PlainTextStrategy};

    #[test]
    fn test_exact_hint() {
        let s = PlainTextStrategy::new();
        let content = "Hello world";
        let outcome = locate(content, &ElementReference::from_hint("world"), &s).unwrap();
        match outcome {
            LocateOutcome::Found(located) => {
                assert_eq!(located.matched_text, "world");
                assert_eq!(located.mode, LocateMode::HintExact);
            }
            LocateOutcome::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_stale_hint_is_not_found() {
        let s = PlainTextStrategy::new();
        let outcome = locate("current text", &ElementReference::from_hint("old text"), &s).unwrap();
        assert!(!outcome.is_found());
    }

    #[test]
    fn test_hint_found_after_entity_encoding() {
        let s = MarkupStrategy::new();
        // The document stores the ampersand encoded; the editor saw it plain
        let content = "<p>Fish &amp; Chips</p>";
        let outcome = locate(content, &ElementReference::from_hint("Fish & Chips"), &s).unwrap();
        match outcome {
            LocateOutcome::Found(located) => {
                assert_eq!(located.matched_text, "Fish &amp; Chips");
                assert_eq!(located.mode, LocateMode::HintDecoded);
            }
            LocateOutcome::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_hint_found_after_entity_decoding() {
        let s = MarkupStrategy::new();
        let content = "<p>Fish & Chips</p>";
        let outcome = locate(
            content,
            &ElementReference::from_hint("Fish &amp; Chips"),
            &s,
        )
        .unwrap();
        match outcome {
            LocateOutcome::Found(located) => assert_eq!(located.matched_text, "Fish & Chips"),
            LocateOutcome::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_hint_between_tags_with_flexible_whitespace() {
        let s = MarkupStrategy::new();
        let content = "<h1>\n    Welcome   Home\n</h1>";
        let outcome = locate(content, &ElementReference::from_hint("Welcome Home"), &s).unwrap();
        match outcome {
            LocateOutcome::Found(located) => {
                assert_eq!(located.mode, LocateMode::HintBetweenTags);
                assert_eq!(located.matched_text, "Welcome   Home");
            }
            LocateOutcome::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_identifier_takes_priority_over_hint() {
        let s = MarkupStrategy::new();
        let content = r#"<p>shared</p><div id="target">shared</div>"#;
        let reference = ElementReference {
            identifier: Some("target".into()),
            content_hint: Some("shared".into()),
            ..Default::default()
        };
        let outcome = locate(content, &reference, &s).unwrap();
        match outcome {
            LocateOutcome::Found(located) => {
                assert_eq!(located.mode, LocateMode::Identifier);
                assert_eq!(located.matched_text, r#"<div id="target">shared</div>"#);
            }
            LocateOutcome::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_selector_mode() {
        let s = MarkupStrategy::new();
        let content = r#"<h1 id="t">A</h1>"#;
        let outcome = locate(content, &ElementReference::from_selector("#t"), &s).unwrap();
        match outcome {
            LocateOutcome::Found(located) => {
                assert_eq!(located.mode, LocateMode::Selector);
            }
            LocateOutcome::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_selector_zero_matches_falls_through_to_hint() {
        let s = MarkupStrategy::new();
        let content = "<p>target text</p>";
        let reference = ElementReference {
            selector: Some("#missing".into()),
            content_hint: Some("target text".into()),
            ..Default::default()
        };
        let outcome = locate(content, &reference, &s).unwrap();
        match outcome {
            LocateOutcome::Found(located) => assert_eq!(located.mode, LocateMode::HintExact),
            LocateOutcome::NotFound => panic!("expected fallback to hint"),
        }
    }

    #[test]
    fn test_line_mode() {
        let s = PlainTextStrategy::new();
        let content = "one\ntwo\nthree\n";
        let outcome = locate(content, &ElementReference::from_line(2), &s).unwrap();
        match outcome {
            LocateOutcome::Found(located) => {
                assert_eq!(located.matched_text, "two");
                assert_eq!(located.mode, LocateMode::Line);
            }
            LocateOutcome::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn test_line_out_of_range_is_an_error() {
        let s = PlainTextStrategy::new();
        let result = locate("one\ntwo", &ElementReference::from_line(10), &s);
        assert!(matches!(
            result,
            Err(EngineError::OutOfRange { line: 10, total: 2 })
        ));
    }

    #[test]
    fn test_empty_reference_is_invalid_input() {
        let s = PlainTextStrategy::new();
        let result = locate("content", &ElementReference::default(), &s);
        assert!(matches!(result, Err(EngineError::InvalidInput { .. })));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&lt;tag&gt;"), "<tag>");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("&unknown;"), "&unknown;");
        assert_eq!(decode_entities("no entities"), "no entities");
    }
}
