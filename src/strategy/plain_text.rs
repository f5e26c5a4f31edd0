//! Plain-text strategy: the universal fallback

use super::{
    ContentStrategy, Region, ReplaceOptions, Replacement, StrategyContext, StrategyError,
    ValidationReport,
};
use regex::RegexBuilder;

/// Exact or pattern-based substring replacement with no format awareness.
///
/// Lowest priority; `can_handle` is unconditionally true so strategy
/// selection always terminates here.
pub struct PlainTextStrategy;

impl PlainTextStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Substring replace shared with the other strategies for their text runs.
pub(super) fn replace_text(
    content: &str,
    old: &str,
    new: &str,
    opts: &ReplaceOptions,
) -> Result<Replacement, StrategyError> {
    if old.is_empty() {
        return Err(StrategyError::EmptyPattern);
    }

    let pattern = if opts.regex {
        old.to_string()
    } else {
        regex::escape(old)
    };

    let re = RegexBuilder::new(&pattern)
        .case_insensitive(!opts.case_sensitive)
        .build()
        .map_err(|e| StrategyError::InvalidPattern(e.to_string()))?;

    let count = re.find_iter(content).count();
    if count == 0 {
        return Ok(Replacement::unchanged(content));
    }

    // The replacement string is taken literally even in regex mode; callers
    // supply editor-visible content, not capture templates.
    let replaced = re.replace_all(content, regex::NoExpand(new)).into_owned();
    Ok(Replacement::changed(replaced, count))
}

impl ContentStrategy for PlainTextStrategy {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn can_handle(&self, _content: &str, _ctx: &StrategyContext) -> bool {
        true
    }

    fn replace_content(
        &self,
        content: &str,
        old: &str,
        new: &str,
        opts: &ReplaceOptions,
    ) -> Result<Replacement, StrategyError> {
        replace_text(content, old, new, opts)
    }

    fn replace_by_selector(
        &self,
        content: &str,
        _selector: &str,
        _new: &str,
        _opts: &ReplaceOptions,
    ) -> Result<Replacement, StrategyError> {
        // Plain text has no structure to select into.
        Ok(Replacement::unchanged(content))
    }

    fn replace_attribute(
        &self,
        content: &str,
        _selector: &str,
        _attr: &str,
        _value: Option<&str>,
    ) -> Result<Replacement, StrategyError> {
        Ok(Replacement::unchanged(content))
    }

    fn validate(&self, _content: &str) -> ValidationReport {
        ValidationReport::ok()
    }

    fn find_identifier(&self, _content: &str, _ident: &str) -> Option<Region> {
        None
    }
}
