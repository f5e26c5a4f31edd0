//! Content mutation strategies
//!
//! One strategy per document format family. Each implements the same
//! capability contract; selection is sniff-based, offering the content to
//! every strategy in descending priority order. The plain-text strategy
//! accepts anything, so selection always succeeds.

mod markup;
mod plain_text;
mod template;

pub use markup::MarkupStrategy;
pub use plain_text::PlainTextStrategy;
pub use template::TemplateStrategy;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors a strategy can raise for malformed inputs.
///
/// A target that simply does not exist in the document is not an error; the
/// replacement result reports zero replacements instead.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("replacement pattern is empty")]
    EmptyPattern,

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("line {line} out of range (document has {total} lines)")]
    LineOutOfRange { line: usize, total: usize },
}

/// Hints available to `can_handle` beyond the raw content.
#[derive(Debug, Clone, Default)]
pub struct StrategyContext {
    /// Lowercased filename suffix after the first dot, e.g. `blade.php`
    pub extension: Option<String>,
}

impl StrategyContext {
    pub fn for_path(path: &Path) -> Self {
        let extension = path.file_name().and_then(|n| {
            let name = n.to_string_lossy().to_ascii_lowercase();
            name.split_once('.').map(|(_, ext)| ext.to_string())
        });
        Self { extension }
    }
}

/// How selector-targeted updates interpret the new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Replace the element's text content (markup-escaped)
    #[default]
    Text,
    /// Replace the element's inner markup verbatim
    Html,
    /// Replace the whole element
    Replace,
}

/// Per-call options visible to strategies.
#[derive(Debug, Clone)]
pub struct ReplaceOptions {
    pub case_sensitive: bool,
    pub regex: bool,
    pub update_mode: UpdateMode,
    /// Skip placeholder protection of directive/interpolation spans
    pub raw: bool,
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            regex: false,
            update_mode: UpdateMode::Text,
            raw: false,
        }
    }
}

/// Outcome of a replacement operation.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub content: String,
    /// Number of regions actually rewritten; zero means "not found"
    pub count: usize,
}

impl Replacement {
    pub fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_string(),
            count: 0,
        }
    }

    pub fn changed(content: String, count: usize) -> Self {
        Self { content, count }
    }
}

/// Result of structural validation after an edit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn push_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// A byte range inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl Region {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn slice<'a>(&self, content: &'a str) -> &'a str {
        &content[self.start..self.end]
    }
}

/// The capability contract every format strategy implements.
pub trait ContentStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Higher wins during selection.
    fn priority(&self) -> u8;

    fn can_handle(&self, content: &str, ctx: &StrategyContext) -> bool;

    /// Replace occurrences of `old` with `new` in editable text.
    fn replace_content(
        &self,
        content: &str,
        old: &str,
        new: &str,
        opts: &ReplaceOptions,
    ) -> Result<Replacement, StrategyError>;

    /// Replace content addressed by a structural selector.
    fn replace_by_selector(
        &self,
        content: &str,
        selector: &str,
        new: &str,
        opts: &ReplaceOptions,
    ) -> Result<Replacement, StrategyError>;

    /// Set (`Some`) or remove (`None`) an attribute on selected nodes.
    fn replace_attribute(
        &self,
        content: &str,
        selector: &str,
        attr: &str,
        value: Option<&str>,
    ) -> Result<Replacement, StrategyError>;

    /// Replace one line, 1-indexed. Out of range is an explicit error.
    fn replace_by_line(
        &self,
        content: &str,
        line_no: usize,
        new: &str,
    ) -> Result<Replacement, StrategyError> {
        replace_line(content, line_no, new)
    }

    fn validate(&self, content: &str) -> ValidationReport;

    /// Resolve an identifying marker (id attribute, directive name, component
    /// tag) to the region it labels.
    fn find_identifier(&self, _content: &str, _ident: &str) -> Option<Region> {
        None
    }

    /// Resolve a structural selector to the regions it addresses.
    fn resolve_selector(&self, _content: &str, _selector: &str) -> Vec<Region> {
        Vec::new()
    }
}

/// The full strategy set in dispatch order.
pub struct StrategySet {
    strategies: Vec<Box<dyn ContentStrategy>>,
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategySet {
    pub fn new() -> Self {
        let mut strategies: Vec<Box<dyn ContentStrategy>> = vec![
            Box::new(TemplateStrategy::new()),
            Box::new(MarkupStrategy::new()),
            Box::new(PlainTextStrategy::new()),
        ];
        strategies.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { strategies }
    }

    /// Pick the most specific applicable strategy. Never fails: the
    /// plain-text strategy accepts everything.
    pub fn select(&self, content: &str, ctx: &StrategyContext) -> &dyn ContentStrategy {
        self.strategies
            .iter()
            .find(|s| s.can_handle(content, ctx))
            .map(|s| s.as_ref())
            .unwrap_or_else(|| self.strategies.last().expect("set is never empty").as_ref())
    }
}

/// Shared line replacement used by every strategy.
pub fn replace_line(content: &str, line_no: usize, new: &str) -> Result<Replacement, StrategyError> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let total = lines.len();

    if line_no == 0 || line_no > total {
        return Err(StrategyError::LineOutOfRange {
            line: line_no,
            total,
        });
    }

    let mut out = String::with_capacity(content.len() + new.len());
    let mut count = 0;
    for (i, line) in lines.iter().enumerate() {
        if i + 1 == line_no {
            let ending = if line.ends_with("\r\n") {
                "\r\n"
            } else if line.ends_with('\n') {
                "\n"
            } else {
                ""
            };
            if line.trim_end_matches(['\r', '\n']) != new {
                count = 1;
            }
            out.push_str(new);
            out.push_str(ending);
        } else {
            out.push_str(line);
        }
    }

    Ok(Replacement::changed(out, count))
}
