//! Markup strategy: span-preserving edits inside HTML/XML-like documents
//!
//! The tokenizer records byte spans for tags, attributes, text runs, and
//! comments instead of building a reserializing DOM. Edits splice only the
//! targeted span, so every byte outside the edited region survives
//! untouched, including malformed markup the parser merely tolerates.

use super::plain_text::replace_text;
use super::{
    ContentStrategy, Region, ReplaceOptions, Replacement, StrategyContext, StrategyError,
    UpdateMode, ValidationReport,
};
use regex::Regex;

/// Elements that never carry content and never get a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| name.eq_ignore_ascii_case(v))
}

#[derive(Debug, Clone)]
pub(super) struct AttrSpan {
    pub(super) name: String,
    pub(super) value: Option<String>,
    /// Byte range covering `name` through the end of the value (with quotes)
    pub(super) span: (usize, usize),
    /// Byte range of the value text inside its quotes, if any
    pub(super) value_span: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
enum Token {
    StartTag {
        name: String,
        attrs: Vec<AttrSpan>,
        span: (usize, usize),
        self_closing: bool,
    },
    EndTag {
        name: String,
        span: (usize, usize),
    },
    Text {
        span: (usize, usize),
    },
    Comment {
        span: (usize, usize),
    },
    /// Doctype, processing instruction, or other `<!`/`<?` declaration
    Decl {
        span: (usize, usize),
    },
}

impl Token {
    fn span(&self) -> (usize, usize) {
        match self {
            Token::StartTag { span, .. }
            | Token::EndTag { span, .. }
            | Token::Text { span }
            | Token::Comment { span }
            | Token::Decl { span } => *span,
        }
    }
}

/// One element reconstructed from the token stream.
#[derive(Debug, Clone)]
struct ElementSpan {
    name: String,
    attrs: Vec<AttrSpan>,
    start_tag: (usize, usize),
    inner: (usize, usize),
    outer: (usize, usize),
    parent: Option<usize>,
    has_content: bool,
}

/// Tokenize markup. Never fails: anything that does not scan as a tag stays
/// text.
fn tokenize(content: &str) -> Vec<Token> {
    let bytes = content.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] == b'<' {
            if let Some((token, end)) = scan_tag(content, pos) {
                if text_start < pos {
                    tokens.push(Token::Text {
                        span: (text_start, pos),
                    });
                }
                tokens.push(token);
                pos = end;
                text_start = pos;
                continue;
            }
        }
        pos += 1;
    }

    if text_start < bytes.len() {
        tokens.push(Token::Text {
            span: (text_start, bytes.len()),
        });
    }

    tokens
}

/// Scan one tag starting at `start` (which points at `<`). Returns the token
/// and the position just past it, or `None` when this `<` is ordinary text.
fn scan_tag(content: &str, start: usize) -> Option<(Token, usize)> {
    let bytes = content.as_bytes();
    let rest = &bytes[start..];

    if rest.starts_with(b"<!--") {
        let end = content[start + 4..]
            .find("-->")
            .map(|i| start + 4 + i + 3)
            .unwrap_or(content.len());
        return Some((
            Token::Comment {
                span: (start, end),
            },
            end,
        ));
    }

    if rest.starts_with(b"<!") || rest.starts_with(b"<?") {
        let end = content[start..]
            .find('>')
            .map(|i| start + i + 1)
            .unwrap_or(content.len());
        return Some((Token::Decl { span: (start, end) }, end));
    }

    if rest.starts_with(b"</") {
        let name_start = start + 2;
        let name_end = scan_name(bytes, name_start);
        if name_end == name_start {
            return None;
        }
        let end = content[name_end..]
            .find('>')
            .map(|i| name_end + i + 1)
            .unwrap_or(content.len());
        return Some((
            Token::EndTag {
                name: content[name_start..name_end].to_ascii_lowercase(),
                span: (start, end),
            },
            end,
        ));
    }

    if rest.len() > 1 && rest[1].is_ascii_alphabetic() {
        return Some(scan_start_tag(content, start));
    }

    None
}

fn scan_name(bytes: &[u8], start: usize) -> usize {
    let mut pos = start;
    while pos < bytes.len()
        && (bytes[pos].is_ascii_alphanumeric() || matches!(bytes[pos], b'-' | b'_' | b':' | b'.'))
    {
        pos += 1;
    }
    pos
}

fn scan_start_tag(content: &str, start: usize) -> (Token, usize) {
    let bytes = content.as_bytes();
    let name_end = scan_name(bytes, start + 1);
    let name = content[start + 1..name_end].to_ascii_lowercase();

    let mut attrs = Vec::new();
    let mut pos = name_end;
    let mut self_closing = false;

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        match bytes[pos] {
            b'>' => {
                pos += 1;
                break;
            }
            b'/' => {
                if pos + 1 < bytes.len() && bytes[pos + 1] == b'>' {
                    self_closing = true;
                    pos += 2;
                    break;
                }
                pos += 1;
            }
            _ => {
                let (attr, next) = scan_attr(content, pos);
                attrs.push(attr);
                pos = next;
            }
        }
    }

    (
        Token::StartTag {
            name,
            attrs,
            span: (start, pos),
            self_closing,
        },
        pos,
    )
}

pub(super) fn scan_attr(content: &str, start: usize) -> (AttrSpan, usize) {
    let bytes = content.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && !matches!(bytes[pos], b'=' | b'>' | b'/') {
        pos += 1;
    }
    let name = content[start..pos].to_ascii_lowercase();
    let name_end = pos;

    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }

    if pos >= bytes.len() || bytes[pos] != b'=' {
        // Boolean attribute
        return (
            AttrSpan {
                name,
                value: None,
                span: (start, name_end),
                value_span: None,
            },
            name_end,
        );
    }
    pos += 1;
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }

    if pos < bytes.len() && (bytes[pos] == b'"' || bytes[pos] == b'\'') {
        let quote = bytes[pos];
        let value_start = pos + 1;
        let mut value_end = value_start;
        while value_end < bytes.len() && bytes[value_end] != quote {
            value_end += 1;
        }
        let end = (value_end + 1).min(bytes.len());
        (
            AttrSpan {
                name,
                value: Some(content[value_start..value_end].to_string()),
                span: (start, end),
                value_span: Some((value_start, value_end)),
            },
            end,
        )
    } else {
        let value_start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' {
            pos += 1;
        }
        (
            AttrSpan {
                name,
                value: Some(content[value_start..pos].to_string()),
                span: (start, pos),
                value_span: Some((value_start, pos)),
            },
            pos,
        )
    }
}

/// Reconstruct element extents from the token stream, auto-closing elements
/// the document left open.
fn build_elements(content: &str, tokens: &[Token]) -> Vec<ElementSpan> {
    let mut elements: Vec<ElementSpan> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for token in tokens {
        match token {
            Token::StartTag {
                name,
                attrs,
                span,
                self_closing,
            } => {
                let complete = *self_closing || is_void(name);
                let element = ElementSpan {
                    name: name.clone(),
                    attrs: attrs.clone(),
                    start_tag: *span,
                    inner: (span.1, span.1),
                    outer: *span,
                    parent: stack.last().copied(),
                    has_content: !complete,
                };
                let idx = elements.len();
                elements.push(element);
                if !complete {
                    stack.push(idx);
                }
            }
            Token::EndTag { name, span } => {
                if let Some(found) = stack
                    .iter()
                    .rposition(|&i| elements[i].name.eq_ignore_ascii_case(name))
                {
                    // Implicitly close anything opened inside the match
                    while stack.len() > found + 1 {
                        let idx = stack.pop().expect("stack checked non-empty");
                        elements[idx].inner.1 = span.0;
                        elements[idx].outer.1 = span.0;
                    }
                    let idx = stack.pop().expect("stack checked non-empty");
                    elements[idx].inner.1 = span.0;
                    elements[idx].outer.1 = span.1;
                }
                // Stray closing tags are ignored here; validate() reports them
            }
            _ => {}
        }
    }

    while let Some(idx) = stack.pop() {
        elements[idx].inner.1 = content.len();
        elements[idx].outer.1 = content.len();
    }

    elements
}

#[derive(Debug, Clone, Default)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attr: Option<(String, Option<String>)>,
}

/// Parse a descendant chain of compound selectors, e.g. `div .hero`.
/// Whitespace is the only combinator.
fn parse_selector(selector: &str) -> Result<Vec<SimpleSelector>, StrategyError> {
    let parts: Vec<&str> = selector.split_whitespace().collect();
    if parts.is_empty() {
        return Err(StrategyError::InvalidSelector("empty selector".into()));
    }
    parts.iter().map(|p| parse_compound(p)).collect()
}

fn parse_compound(part: &str) -> Result<SimpleSelector, StrategyError> {
    let mut sel = SimpleSelector::default();
    let mut rest = part;

    if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        let end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
        sel.tag = Some(rest[..end].to_ascii_lowercase());
        rest = &rest[end..];
    }

    while !rest.is_empty() {
        if let Some(body) = rest.strip_prefix('#') {
            let end = body.find(['#', '.', '[']).unwrap_or(body.len());
            if end == 0 {
                return Err(StrategyError::InvalidSelector(part.to_string()));
            }
            sel.id = Some(body[..end].to_string());
            rest = &body[end..];
        } else if let Some(body) = rest.strip_prefix('.') {
            let end = body.find(['#', '.', '[']).unwrap_or(body.len());
            if end == 0 {
                return Err(StrategyError::InvalidSelector(part.to_string()));
            }
            sel.classes.push(body[..end].to_string());
            rest = &body[end..];
        } else if let Some(body) = rest.strip_prefix('[') {
            let close = body
                .find(']')
                .ok_or_else(|| StrategyError::InvalidSelector(part.to_string()))?;
            let inner = &body[..close];
            let (name, value) = match inner.split_once('=') {
                Some((n, v)) => (
                    n.trim().to_ascii_lowercase(),
                    Some(v.trim().trim_matches(['"', '\'']).to_string()),
                ),
                None => (inner.trim().to_ascii_lowercase(), None),
            };
            if name.is_empty() {
                return Err(StrategyError::InvalidSelector(part.to_string()));
            }
            sel.attr = Some((name, value));
            rest = &body[close + 1..];
        } else {
            return Err(StrategyError::InvalidSelector(part.to_string()));
        }
    }

    Ok(sel)
}

fn attr_value<'a>(el: &'a ElementSpan, name: &str) -> Option<&'a str> {
    el.attrs
        .iter()
        .find(|a| a.name == name)
        .and_then(|a| a.value.as_deref())
}

fn compound_matches(el: &ElementSpan, sel: &SimpleSelector) -> bool {
    if let Some(ref tag) = sel.tag {
        if !el.name.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(ref id) = sel.id {
        if attr_value(el, "id") != Some(id.as_str()) {
            return false;
        }
    }
    for class in &sel.classes {
        let has = attr_value(el, "class")
            .map(|v| v.split_whitespace().any(|c| c == class))
            .unwrap_or(false);
        if !has {
            return false;
        }
    }
    if let Some((ref name, ref value)) = sel.attr {
        match el.attrs.iter().find(|a| &a.name == name) {
            None => return false,
            Some(a) => {
                if let Some(expected) = value {
                    if a.value.as_deref() != Some(expected.as_str()) {
                        return false;
                    }
                }
            }
        }
    }
    true
}

fn chain_matches(elements: &[ElementSpan], idx: usize, chain: &[SimpleSelector]) -> bool {
    let last = match chain.last() {
        Some(l) => l,
        None => return false,
    };
    if !compound_matches(&elements[idx], last) {
        return false;
    }
    let mut remaining = chain.len() - 1;
    let mut cursor = elements[idx].parent;
    while remaining > 0 {
        match cursor {
            None => return false,
            Some(p) => {
                if compound_matches(&elements[p], &chain[remaining - 1]) {
                    remaining -= 1;
                }
                cursor = elements[p].parent;
            }
        }
    }
    true
}

fn matched_indices(elements: &[ElementSpan], chain: &[SimpleSelector]) -> Vec<usize> {
    (0..elements.len())
        .filter(|&i| chain_matches(elements, i, chain))
        .collect()
}

/// Drop matches nested inside another match so splices never overlap.
fn outermost(elements: &[ElementSpan], indices: Vec<usize>) -> Vec<usize> {
    indices
        .iter()
        .copied()
        .filter(|&i| {
            let span = elements[i].outer;
            !indices.iter().any(|&j| {
                j != i && elements[j].outer.0 <= span.0 && span.1 <= elements[j].outer.1
                    && (elements[j].outer != span)
            })
        })
        .collect()
}

pub(super) fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(super) fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// Apply non-overlapping `(span, replacement)` edits in one pass.
pub(super) fn splice_all(content: &str, mut edits: Vec<((usize, usize), String)>) -> String {
    edits.sort_by_key(|(span, _)| span.0);
    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for ((start, end), replacement) in edits {
        out.push_str(&content[cursor..start]);
        out.push_str(&replacement);
        cursor = end;
    }
    out.push_str(&content[cursor..]);
    out
}

/// DOM-aware strategy for HTML and XML-like fragments.
pub struct MarkupStrategy;

impl MarkupStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MarkupStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStrategy for MarkupStrategy {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn priority(&self) -> u8 {
        20
    }

    fn can_handle(&self, content: &str, ctx: &StrategyContext) -> bool {
        if let Some(ref ext) = ctx.extension {
            if matches!(ext.as_str(), "html" | "htm" | "xhtml" | "xml") {
                return true;
            }
        }
        let tag_re = Regex::new(r"(?s)</?[a-zA-Z][^>]*>").unwrap();
        tag_re.is_match(content)
    }

    fn replace_content(
        &self,
        content: &str,
        old: &str,
        new: &str,
        opts: &ReplaceOptions,
    ) -> Result<Replacement, StrategyError> {
        if old.is_empty() {
            return Err(StrategyError::EmptyPattern);
        }

        // Only text runs are eligible; tags, attributes, and comments are
        // never touched by a content replace.
        let tokens = tokenize(content);
        let mut out = String::with_capacity(content.len());
        let mut count = 0;
        for token in &tokens {
            let (start, end) = token.span();
            match token {
                Token::Text { .. } => {
                    let replaced = replace_text(&content[start..end], old, new, opts)?;
                    count += replaced.count;
                    out.push_str(&replaced.content);
                }
                _ => out.push_str(&content[start..end]),
            }
        }

        if count == 0 {
            return Ok(Replacement::unchanged(content));
        }
        Ok(Replacement::changed(out, count))
    }

    fn replace_by_selector(
        &self,
        content: &str,
        selector: &str,
        new: &str,
        opts: &ReplaceOptions,
    ) -> Result<Replacement, StrategyError> {
        let chain = parse_selector(selector)?;
        let tokens = tokenize(content);
        let elements = build_elements(content, &tokens);
        let matches = outermost(&elements, matched_indices(&elements, &chain));

        let mut edits = Vec::new();
        for idx in matches {
            let el = &elements[idx];
            match opts.update_mode {
                UpdateMode::Text => {
                    if !el.has_content {
                        continue;
                    }
                    edits.push((el.inner, escape_text(new)));
                }
                UpdateMode::Html => {
                    if !el.has_content {
                        continue;
                    }
                    edits.push((el.inner, new.to_string()));
                }
                UpdateMode::Replace => {
                    edits.push((el.outer, new.to_string()));
                }
            }
        }

        if edits.is_empty() {
            return Ok(Replacement::unchanged(content));
        }
        let count = edits.len();
        Ok(Replacement::changed(splice_all(content, edits), count))
    }

    fn replace_attribute(
        &self,
        content: &str,
        selector: &str,
        attr: &str,
        value: Option<&str>,
    ) -> Result<Replacement, StrategyError> {
        let chain = parse_selector(selector)?;
        let attr_name = attr.to_ascii_lowercase();
        let tokens = tokenize(content);
        let elements = build_elements(content, &tokens);

        let mut edits = Vec::new();
        for idx in matched_indices(&elements, &chain) {
            let el = &elements[idx];
            let existing = el.attrs.iter().find(|a| a.name == attr_name);

            match (existing, value) {
                (Some(a), Some(new_value)) => {
                    if a.value.as_deref() == Some(new_value) {
                        continue;
                    }
                    match a.value_span {
                        Some(span) => edits.push((span, escape_attr(new_value))),
                        // Boolean attribute gains a value
                        None => edits.push((
                            a.span,
                            format!("{}=\"{}\"", attr_name, escape_attr(new_value)),
                        )),
                    }
                }
                (Some(a), None) => {
                    // Remove the attribute along with its leading whitespace
                    let mut start = a.span.0;
                    let bytes = content.as_bytes();
                    while start > el.start_tag.0 + 1 && bytes[start - 1].is_ascii_whitespace() {
                        start -= 1;
                    }
                    edits.push(((start, a.span.1), String::new()));
                }
                (None, Some(new_value)) => {
                    let tag_end = el.start_tag.1;
                    let closer_len = if content[el.start_tag.0..tag_end].ends_with("/>") {
                        2
                    } else {
                        1
                    };
                    let mut insert_at = tag_end - closer_len;
                    let bytes = content.as_bytes();
                    while insert_at > el.start_tag.0 && bytes[insert_at - 1].is_ascii_whitespace() {
                        insert_at -= 1;
                    }
                    let mut text = format!(" {}=\"{}\"", attr_name, escape_attr(new_value));
                    if closer_len == 2 {
                        text.push(' ');
                    }
                    edits.push(((insert_at, insert_at), text));
                }
                (None, None) => {}
            }
        }

        if edits.is_empty() {
            return Ok(Replacement::unchanged(content));
        }
        let count = edits.len();
        Ok(Replacement::changed(splice_all(content, edits), count))
    }

    fn validate(&self, content: &str) -> ValidationReport {
        let mut report = ValidationReport::ok();
        let tokens = tokenize(content);
        let mut stack: Vec<String> = Vec::new();

        for token in &tokens {
            match token {
                Token::StartTag {
                    name, self_closing, ..
                } => {
                    if !*self_closing && !is_void(name) {
                        stack.push(name.clone());
                    }
                }
                Token::EndTag { name, .. } => {
                    if let Some(found) = stack.iter().rposition(|n| n.eq_ignore_ascii_case(name)) {
                        while stack.len() > found + 1 {
                            let inner = stack.pop().expect("stack checked non-empty");
                            report.push_warning(format!(
                                "implicitly closed <{}> before </{}>",
                                inner, name
                            ));
                        }
                        stack.pop();
                    } else {
                        report.push_error(format!("stray closing tag </{}>", name));
                    }
                }
                _ => {}
            }
        }

        while let Some(name) = stack.pop() {
            report.push_error(format!("unclosed tag <{}>", name));
        }

        report
    }

    fn find_identifier(&self, content: &str, ident: &str) -> Option<Region> {
        let tokens = tokenize(content);
        let elements = build_elements(content, &tokens);
        elements
            .iter()
            .find(|el| {
                attr_value(el, "id") == Some(ident)
                    || attr_value(el, "data-editable") == Some(ident)
            })
            .map(|el| Region::new(el.outer.0, el.outer.1))
    }

    fn resolve_selector(&self, content: &str, selector: &str) -> Vec<Region> {
        let chain = match parse_selector(selector) {
            Ok(chain) => chain,
            Err(_) => return Vec::new(),
        };
        let tokens = tokenize(content);
        let elements = build_elements(content, &tokens);
        matched_indices(&elements, &chain)
            .into_iter()
            .map(|i| Region::new(elements[i].outer.0, elements[i].outer.1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ReplaceOptions {
        ReplaceOptions::default()
    }

    fn opts_mode(mode: UpdateMode) -> ReplaceOptions {
        ReplaceOptions {
            update_mode: mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_replace_text_by_id_selector() {
        let s = MarkupStrategy::new();
        let result = s
            .replace_by_selector(r#"<h1 id="t">A</h1>"#, "#t", "B", &opts())
            .unwrap();
        assert_eq!(result.content, r#"<h1 id="t">B</h1>"#);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_content_replace_skips_tags_and_attributes() {
        let s = MarkupStrategy::new();
        let content = r#"<div class="title">title</div>"#;
        let result = s.replace_content(content, "title", "heading", &opts()).unwrap();
        assert_eq!(result.content, r#"<div class="title">heading</div>"#);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_content_replace_not_found() {
        let s = MarkupStrategy::new();
        let result = s
            .replace_content("<p>hello</p>", "absent", "x", &opts())
            .unwrap();
        assert_eq!(result.count, 0);
        assert_eq!(result.content, "<p>hello</p>");
    }

    #[test]
    fn test_selector_by_class() {
        let s = MarkupStrategy::new();
        let content = r#"<p class="lead big">old</p><p>keep</p>"#;
        let result = s.replace_by_selector(content, ".lead", "new", &opts()).unwrap();
        assert_eq!(result.content, r#"<p class="lead big">new</p><p>keep</p>"#);
    }

    #[test]
    fn test_descendant_selector() {
        let s = MarkupStrategy::new();
        let content = "<div><span>in</span></div><span>out</span>";
        let result = s
            .replace_by_selector(content, "div span", "X", &opts())
            .unwrap();
        assert_eq!(result.content, "<div><span>X</span></div><span>out</span>");
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_selector_zero_matches_is_no_op() {
        let s = MarkupStrategy::new();
        let content = "<p>text</p>";
        let result = s.replace_by_selector(content, "#missing", "x", &opts()).unwrap();
        assert_eq!(result.count, 0);
        assert_eq!(result.content, content);
    }

    #[test]
    fn test_update_mode_text_escapes() {
        let s = MarkupStrategy::new();
        let result = s
            .replace_by_selector("<p>x</p>", "p", "a < b & c", &opts_mode(UpdateMode::Text))
            .unwrap();
        assert_eq!(result.content, "<p>a &lt; b &amp; c</p>");
    }

    #[test]
    fn test_update_mode_html_is_verbatim() {
        let s = MarkupStrategy::new();
        let result = s
            .replace_by_selector(
                "<div>x</div>",
                "div",
                "<em>y</em>",
                &opts_mode(UpdateMode::Html),
            )
            .unwrap();
        assert_eq!(result.content, "<div><em>y</em></div>");
    }

    #[test]
    fn test_update_mode_replace_whole_node() {
        let s = MarkupStrategy::new();
        let result = s
            .replace_by_selector(
                r#"<a href="/old">x</a>"#,
                "a",
                r#"<a href="/new">y</a>"#,
                &opts_mode(UpdateMode::Replace),
            )
            .unwrap();
        assert_eq!(result.content, r#"<a href="/new">y</a>"#);
    }

    #[test]
    fn test_nested_match_edits_outermost_only() {
        let s = MarkupStrategy::new();
        let content = r#"<div class="x"><div class="x">deep</div></div>"#;
        let result = s
            .replace_by_selector(content, ".x", "flat", &opts())
            .unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(result.content, r#"<div class="x">flat</div>"#);
    }

    #[test]
    fn test_set_existing_attribute() {
        let s = MarkupStrategy::new();
        let content = r#"<img src="old.png" alt="pic">"#;
        let result = s
            .replace_attribute(content, "img", "src", Some("new.png"))
            .unwrap();
        assert_eq!(result.content, r#"<img src="new.png" alt="pic">"#);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_append_missing_attribute() {
        let s = MarkupStrategy::new();
        let result = s
            .replace_attribute("<a>link</a>", "a", "href", Some("/page"))
            .unwrap();
        assert_eq!(result.content, r#"<a href="/page">link</a>"#);
    }

    #[test]
    fn test_append_attribute_to_self_closing_tag() {
        let s = MarkupStrategy::new();
        let result = s
            .replace_attribute("<br />", "br", "class", Some("sep"))
            .unwrap();
        assert_eq!(result.content, r#"<br class="sep" />"#);
    }

    #[test]
    fn test_remove_attribute() {
        let s = MarkupStrategy::new();
        let content = r#"<p class="old" id="k">x</p>"#;
        let result = s.replace_attribute(content, "#k", "class", None).unwrap();
        assert_eq!(result.content, r#"<p id="k">x</p>"#);
    }

    #[test]
    fn test_attribute_same_value_is_no_op() {
        let s = MarkupStrategy::new();
        let content = r#"<img src="a.png">"#;
        let result = s.replace_attribute(content, "img", "src", Some("a.png")).unwrap();
        assert_eq!(result.count, 0);
        assert_eq!(result.content, content);
    }

    #[test]
    fn test_attribute_value_selector() {
        let s = MarkupStrategy::new();
        let content = r#"<input name="email"><input name="phone">"#;
        let result = s
            .replace_attribute(content, r#"[name=email]"#, "placeholder", Some("you@example.com"))
            .unwrap();
        assert_eq!(
            result.content,
            r#"<input name="email" placeholder="you@example.com"><input name="phone">"#
        );
    }

    #[test]
    fn test_malformed_markup_never_panics() {
        let s = MarkupStrategy::new();
        let samples = [
            "<div><p>unclosed",
            "</stray>",
            "<a href='broken",
            "< notatag <b>ok</b>",
            "<!-- unterminated comment",
            "<>",
        ];
        for sample in samples {
            let _ = s.replace_content(sample, "ok", "fine", &opts()).unwrap();
            let _ = s.validate(sample);
        }
    }

    #[test]
    fn test_validate_unclosed_tag() {
        let s = MarkupStrategy::new();
        let report = s.validate("<div><p>text</div>");
        // p is implicitly closed (warning), div/p bookkeeping must not error
        // on the balanced part; only truly unclosed tags are errors
        assert!(report.warnings.iter().any(|w| w.contains("<p>")));
        assert!(report.valid);

        let report = s.validate("<div><span>text");
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("<span>")));
        assert!(report.errors.iter().any(|e| e.contains("<div>")));
    }

    #[test]
    fn test_validate_stray_closing_tag() {
        let s = MarkupStrategy::new();
        let report = s.validate("text</p>");
        assert!(!report.valid);
        assert!(report.errors[0].contains("stray closing tag"));
    }

    #[test]
    fn test_void_elements_do_not_open_scope() {
        let s = MarkupStrategy::new();
        let report = s.validate(r#"<p>line one<br>line two<img src="x.png"></p>"#);
        assert!(report.valid, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_find_identifier() {
        let s = MarkupStrategy::new();
        let content = r#"<div id="hero"><p data-editable="intro">text</p></div>"#;

        let region = s.find_identifier(content, "intro").unwrap();
        assert_eq!(region.slice(content), r#"<p data-editable="intro">text</p>"#);

        let region = s.find_identifier(content, "hero").unwrap();
        assert!(region.slice(content).starts_with(r#"<div id="hero">"#));

        assert!(s.find_identifier(content, "absent").is_none());
    }

    #[test]
    fn test_resolve_selector_regions() {
        let s = MarkupStrategy::new();
        let content = "<ul><li>a</li><li>b</li></ul>";
        let regions = s.resolve_selector(content, "li");
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].slice(content), "<li>a</li>");
        assert_eq!(regions[1].slice(content), "<li>b</li>");
    }

    #[test]
    fn test_can_handle_sniffing() {
        let s = MarkupStrategy::new();
        let ctx = StrategyContext::default();
        assert!(s.can_handle("<p>hi</p>", &ctx));
        assert!(!s.can_handle("no markup here", &ctx));
        assert!(s.can_handle(
            "plain",
            &StrategyContext {
                extension: Some("html".into())
            }
        ));
    }
}
