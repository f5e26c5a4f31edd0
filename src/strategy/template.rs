//! Template strategy: directive-aware edits in templating-language documents
//!
//! Documents are tokenized into directive, interpolation (escaped and raw),
//! comment, and component-tag spans over a literal-text background. Content
//! replacement masks those spans with opaque placeholders before running the
//! naive replace and restores them afterwards, so an editor changing visible
//! text can never clip a directive or an interpolated expression.

use super::markup::{escape_attr, escape_text, scan_attr, splice_all};
use super::plain_text::replace_text;
use super::{
    ContentStrategy, Region, ReplaceOptions, Replacement, StrategyContext, StrategyError,
    UpdateMode, ValidationReport,
};
use regex::Regex;

/// Block-opening directives and the closers accepted for their family.
const BLOCK_FAMILIES: &[(&str, &[&str])] = &[
    ("if", &["endif"]),
    ("unless", &["endunless"]),
    ("for", &["endfor"]),
    ("foreach", &["endforeach"]),
    ("forelse", &["endforelse"]),
    ("while", &["endwhile"]),
    ("section", &["endsection", "show", "stop", "append", "overwrite"]),
    ("push", &["endpush"]),
    ("prepend", &["endprepend"]),
    ("php", &["endphp"]),
    ("isset", &["endisset"]),
    ("auth", &["endauth"]),
    ("guest", &["endguest"]),
    ("once", &["endonce"]),
    ("verbatim", &["endverbatim"]),
];

/// Middle-of-block directives that never open or close anything.
const BLOCK_MIDDLES: &[&str] = &["else", "elseif", "empty", "continue", "break"];

fn family_of_closer(name: &str) -> Option<&'static str> {
    BLOCK_FAMILIES
        .iter()
        .find(|(_, closers)| closers.contains(&name))
        .map(|(family, _)| *family)
}

fn is_opener(name: &str) -> bool {
    BLOCK_FAMILIES.iter().any(|(family, _)| *family == name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpanKind {
    Comment,
    Echo,
    RawEcho,
    Directive,
    ComponentOpen,
    ComponentClose,
}

/// One protected region of the document.
#[derive(Debug, Clone)]
struct ProtectedSpan {
    kind: SpanKind,
    start: usize,
    end: usize,
    /// Directive name or component tag name
    name: String,
    /// Trimmed interpolation expression, or directive argument text
    expr: String,
    self_closing: bool,
}

impl ProtectedSpan {
    fn text<'a>(&self, content: &'a str) -> &'a str {
        &content[self.start..self.end]
    }
}

#[derive(Debug, Default)]
struct TemplateScan {
    spans: Vec<ProtectedSpan>,
    errors: Vec<String>,
}

/// One matched pair of block directives.
#[derive(Debug, Clone)]
struct BlockSpan {
    family: String,
    /// First string literal in the opener's arguments, e.g. section name
    name: Option<String>,
    open: (usize, usize),
    close: (usize, usize),
}

/// Tokenize template syntax. Never fails; anything that does not scan as a
/// construct stays literal text, and unterminated delimiters are recorded.
fn scan(content: &str) -> TemplateScan {
    let bytes = content.as_bytes();
    let mut result = TemplateScan::default();
    let mut pos = 0;

    while pos < bytes.len() {
        // Constructs only ever start at these ASCII bytes, so slicing here
        // always lands on a char boundary
        if !matches!(bytes[pos], b'@' | b'{' | b'<') {
            pos += 1;
            continue;
        }
        let rest = &content[pos..];

        if rest.starts_with("@{{") {
            // Escaped interpolation renders literally; skip past the marker
            pos += 3;
            continue;
        }
        if rest.starts_with("@@") {
            pos += 2;
            continue;
        }

        if rest.starts_with("{{--") {
            match rest.find("--}}") {
                Some(i) => {
                    result.spans.push(ProtectedSpan {
                        kind: SpanKind::Comment,
                        start: pos,
                        end: pos + i + 4,
                        name: String::new(),
                        expr: rest[4..i].trim().to_string(),
                        self_closing: false,
                    });
                    pos += i + 4;
                }
                None => {
                    result.errors.push("unterminated comment '{{--'".into());
                    pos = bytes.len();
                }
            }
            continue;
        }

        if rest.starts_with("{!!") {
            match rest.find("!!}") {
                Some(i) => {
                    result.spans.push(ProtectedSpan {
                        kind: SpanKind::RawEcho,
                        start: pos,
                        end: pos + i + 3,
                        name: String::new(),
                        expr: rest[3..i].trim().to_string(),
                        self_closing: false,
                    });
                    pos += i + 3;
                }
                None => {
                    result.errors.push("unterminated raw output '{!!'".into());
                    pos = bytes.len();
                }
            }
            continue;
        }

        if rest.starts_with("{{") {
            match rest.find("}}") {
                Some(i) => {
                    result.spans.push(ProtectedSpan {
                        kind: SpanKind::Echo,
                        start: pos,
                        end: pos + i + 2,
                        name: String::new(),
                        expr: rest[2..i].trim().to_string(),
                        self_closing: false,
                    });
                    pos += i + 2;
                }
                None => {
                    result.errors.push("unterminated output '{{'".into());
                    pos = bytes.len();
                }
            }
            continue;
        }

        if bytes[pos] == b'@' {
            let preceded_by_word = pos > 0 && bytes[pos - 1].is_ascii_alphanumeric();
            if !preceded_by_word {
                if let Some((span, end)) = scan_directive(content, pos) {
                    let verbatim = span.name == "verbatim";
                    result.spans.push(span);
                    pos = end;
                    if verbatim {
                        // Literal region; resume scanning at its closer
                        if let Some(i) = content[pos..].find("@endverbatim") {
                            pos += i;
                        }
                    }
                    continue;
                }
            }
            pos += 1;
            continue;
        }

        if rest.starts_with("<x-") || rest.starts_with("</x-") {
            if let Some((span, end)) = scan_component(content, pos) {
                result.spans.push(span);
                pos = end;
                continue;
            }
        }

        pos += 1;
    }

    result
}

fn scan_directive(content: &str, start: usize) -> Option<(ProtectedSpan, usize)> {
    let bytes = content.as_bytes();
    let name_start = start + 1;
    if name_start >= bytes.len()
        || !(bytes[name_start].is_ascii_alphabetic() || bytes[name_start] == b'_')
    {
        return None;
    }
    let mut name_end = name_start;
    while name_end < bytes.len()
        && (bytes[name_end].is_ascii_alphanumeric() || bytes[name_end] == b'_')
    {
        name_end += 1;
    }
    let name = content[name_start..name_end].to_ascii_lowercase();

    let mut probe = name_end;
    while probe < bytes.len() && (bytes[probe] == b' ' || bytes[probe] == b'\t') {
        probe += 1;
    }

    let (end, expr) = if probe < bytes.len() && bytes[probe] == b'(' {
        match scan_balanced_parens(content, probe) {
            Some(args_end) => (args_end, content[probe + 1..args_end - 1].to_string()),
            None => (name_end, String::new()),
        }
    } else {
        (name_end, String::new())
    };

    Some((
        ProtectedSpan {
            kind: SpanKind::Directive,
            start,
            end,
            name,
            expr,
            self_closing: false,
        },
        end,
    ))
}

/// Consume a balanced parenthesized group starting at `open` (which points at
/// `(`), honoring quoted strings. Returns the index just past the closing
/// parenthesis, or `None` when unbalanced.
fn scan_balanced_parens(content: &str, open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut pos = open;
    let mut quote: Option<u8> = None;

    while pos < bytes.len() {
        let b = bytes[pos];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    pos += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(pos + 1);
                    }
                }
                _ => {}
            },
        }
        pos += 1;
    }
    None
}

fn scan_component(content: &str, start: usize) -> Option<(ProtectedSpan, usize)> {
    let bytes = content.as_bytes();
    let closing = content[start..].starts_with("</");
    let name_start = start + if closing { 2 } else { 1 };

    let mut name_end = name_start;
    while name_end < bytes.len()
        && (bytes[name_end].is_ascii_alphanumeric()
            || matches!(bytes[name_end], b'-' | b'_' | b'.' | b':'))
    {
        name_end += 1;
    }
    if name_end == name_start {
        return None;
    }
    let name = content[name_start..name_end].to_ascii_lowercase();

    // Quote-aware scan to the closing angle bracket
    let mut pos = name_end;
    let mut quote: Option<u8> = None;
    let mut self_closing = false;
    while pos < bytes.len() {
        let b = bytes[pos];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'>' => {
                    self_closing = pos > 0 && bytes[pos - 1] == b'/';
                    pos += 1;
                    break;
                }
                _ => {}
            },
        }
        pos += 1;
    }

    Some((
        ProtectedSpan {
            kind: if closing {
                SpanKind::ComponentClose
            } else {
                SpanKind::ComponentOpen
            },
            start,
            end: pos,
            name,
            expr: String::new(),
            self_closing,
        },
        pos,
    ))
}

/// Extract the first top-level string literal from directive arguments.
fn first_string_arg(args: &str) -> Option<String> {
    let bytes = args.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let b = bytes[pos];
        if b == b'\'' || b == b'"' {
            let quote = b;
            let start = pos + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end] != quote {
                if bytes[end] == b'\\' {
                    end += 1;
                }
                end += 1;
            }
            return Some(args[start..end.min(bytes.len())].to_string());
        }
        pos += 1;
    }
    None
}

/// True when directive arguments contain a top-level comma, which marks an
/// inline form like a section defined with its value in place.
fn has_toplevel_comma(args: &str) -> bool {
    let bytes = args.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for &b in bytes {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => return true,
                _ => {}
            },
        }
    }
    false
}

/// Pair block directives by family.
fn build_blocks(spans: &[ProtectedSpan]) -> (Vec<BlockSpan>, Vec<String>) {
    let mut blocks = Vec::new();
    let mut errors = Vec::new();
    let mut stack: Vec<(&str, Option<String>, (usize, usize))> = Vec::new();

    for span in spans {
        if span.kind != SpanKind::Directive {
            continue;
        }
        let name = span.name.as_str();

        if let Some(family) = family_of_closer(name) {
            match stack.iter().rposition(|(f, _, _)| *f == family) {
                Some(found) => {
                    while stack.len() > found + 1 {
                        let (inner, _, _) = stack.pop().expect("stack checked non-empty");
                        errors.push(format!("@{} closed while @{} is still open", family, inner));
                    }
                    let (_, block_name, open) = stack.pop().expect("stack checked non-empty");
                    blocks.push(BlockSpan {
                        family: family.to_string(),
                        name: block_name,
                        open,
                        close: (span.start, span.end),
                    });
                }
                None => errors.push(format!("@{} without a matching @{}", name, family)),
            }
        } else if is_opener(name) && !has_toplevel_comma(&span.expr) {
            stack.push((
                BLOCK_FAMILIES
                    .iter()
                    .find(|(f, _)| *f == name)
                    .map(|(f, _)| *f)
                    .expect("opener is in the family table"),
                first_string_arg(&span.expr),
                (span.start, span.end),
            ));
        } else if BLOCK_MIDDLES.contains(&name) && stack.is_empty() && name != "continue" && name != "break" {
            errors.push(format!("@{} outside of any block", name));
        }
    }

    for (family, _, _) in stack {
        errors.push(format!("unclosed @{}", family));
    }

    (blocks, errors)
}

const PLACEHOLDER_MARK: char = '\u{F8FF}';

fn placeholder(index: usize) -> String {
    format!("{}{}{}", PLACEHOLDER_MARK, index, PLACEHOLDER_MARK)
}

/// Substitute protected spans with opaque placeholders.
fn mask(content: &str, spans: &[ProtectedSpan]) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(content.len());
    let mut table = Vec::with_capacity(spans.len());
    let mut cursor = 0;

    for span in spans {
        masked.push_str(&content[cursor..span.start]);
        masked.push_str(&placeholder(table.len()));
        table.push(span.text(content).to_string());
        cursor = span.end;
    }
    masked.push_str(&content[cursor..]);

    (masked, table)
}

fn unmask(masked: &str, table: &[String]) -> String {
    let mut out = masked.to_string();
    for (i, original) in table.iter().enumerate() {
        out = out.replacen(&placeholder(i), original, 1);
    }
    out
}

/// Structural selector forms understood by this strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateSelector {
    Directive(String),
    Echo { raw: bool, expr: String },
    Component(String),
    Block { family: String, name: Option<String> },
}

fn parse_template_selector(selector: &str) -> Result<TemplateSelector, StrategyError> {
    let t = selector.trim();
    if t.is_empty() {
        return Err(StrategyError::InvalidSelector("empty selector".into()));
    }

    if let Some(rest) = t.strip_prefix('@') {
        let name: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            return Err(StrategyError::InvalidSelector(t.to_string()));
        }
        return Ok(TemplateSelector::Directive(name.to_ascii_lowercase()));
    }

    if let Some(inner) = t.strip_prefix("{!!").and_then(|s| s.strip_suffix("!!}")) {
        return Ok(TemplateSelector::Echo {
            raw: true,
            expr: inner.trim().to_string(),
        });
    }

    if let Some(inner) = t.strip_prefix("{{").and_then(|s| s.strip_suffix("}}")) {
        return Ok(TemplateSelector::Echo {
            raw: false,
            expr: inner.trim().to_string(),
        });
    }

    let bare = t.trim_matches(['<', '>', '/']);
    if bare.starts_with("x-") {
        return Ok(TemplateSelector::Component(bare.to_ascii_lowercase()));
    }

    if let Some((family, name)) = t.split_once(':') {
        let family = family.trim().to_ascii_lowercase();
        if is_opener(&family) {
            let name = name.trim();
            return Ok(TemplateSelector::Block {
                family,
                name: (!name.is_empty()).then(|| name.to_string()),
            });
        }
    }

    Err(StrategyError::InvalidSelector(t.to_string()))
}

/// Find the close tag paired with the component open at `spans[open_idx]`,
/// honoring nesting of the same component name.
fn matching_component_close(spans: &[ProtectedSpan], open_idx: usize) -> Option<usize> {
    let name = &spans[open_idx].name;
    let mut depth = 0usize;
    for (i, span) in spans.iter().enumerate().skip(open_idx + 1) {
        if span.name != *name {
            continue;
        }
        match span.kind {
            SpanKind::ComponentOpen if !span.self_closing => depth += 1,
            SpanKind::ComponentClose => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Directive-aware strategy for templating-language documents.
pub struct TemplateStrategy;

impl TemplateStrategy {
    pub fn new() -> Self {
        Self
    }

    fn selector_edits(
        &self,
        content: &str,
        selector: &str,
        new: &str,
        opts: &ReplaceOptions,
    ) -> Result<Vec<((usize, usize), String)>, StrategyError> {
        let parsed = parse_template_selector(selector)?;
        let scanned = scan(content);
        let mut edits: Vec<((usize, usize), String)> = Vec::new();

        match parsed {
            TemplateSelector::Directive(name) => {
                for span in scanned.spans.iter().filter(|s| {
                    s.kind == SpanKind::Directive && s.name == name
                }) {
                    edits.push(((span.start, span.end), new.to_string()));
                }
            }
            TemplateSelector::Echo { raw, expr } => {
                let kind = if raw { SpanKind::RawEcho } else { SpanKind::Echo };
                for span in scanned
                    .spans
                    .iter()
                    .filter(|s| s.kind == kind && s.expr == expr)
                {
                    edits.push(((span.start, span.end), new.to_string()));
                }
            }
            TemplateSelector::Component(name) => {
                let open_indices: Vec<usize> = scanned
                    .spans
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.kind == SpanKind::ComponentOpen && s.name == name)
                    .map(|(i, _)| i)
                    .collect();
                for open_idx in open_indices {
                    let open = &scanned.spans[open_idx];
                    match opts.update_mode {
                        UpdateMode::Replace => {
                            let end = if open.self_closing {
                                open.end
                            } else {
                                match matching_component_close(&scanned.spans, open_idx) {
                                    Some(close_idx) => scanned.spans[close_idx].end,
                                    None => continue,
                                }
                            };
                            edits.push(((open.start, end), new.to_string()));
                        }
                        UpdateMode::Text | UpdateMode::Html => {
                            if open.self_closing {
                                continue;
                            }
                            let Some(close_idx) = matching_component_close(&scanned.spans, open_idx)
                            else {
                                continue;
                            };
                            let body = (open.end, scanned.spans[close_idx].start);
                            let value = if opts.update_mode == UpdateMode::Text {
                                escape_text(new)
                            } else {
                                new.to_string()
                            };
                            edits.push((body, value));
                        }
                    }
                }
            }
            TemplateSelector::Block { family, name } => {
                let (blocks, _) = build_blocks(&scanned.spans);
                for block in blocks.iter().filter(|b| {
                    b.family == family && (name.is_none() || b.name == name)
                }) {
                    edits.push(((block.open.1, block.close.0), new.to_string()));
                }
            }
        }

        // Nested matches would overlap; keep the outermost of any pair
        edits.sort_by_key(|(span, _)| span.0);
        let mut kept: Vec<((usize, usize), String)> = Vec::new();
        for edit in edits {
            if kept
                .last()
                .map(|(prev, _)| edit.0.0 >= prev.1)
                .unwrap_or(true)
            {
                kept.push(edit);
            }
        }
        Ok(kept)
    }
}

impl Default for TemplateStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn priority(&self) -> u8 {
        30
    }

    fn can_handle(&self, content: &str, ctx: &StrategyContext) -> bool {
        if let Some(ref ext) = ctx.extension {
            if ext.ends_with("blade.php") {
                return true;
            }
        }
        if content.contains("{{") || content.contains("{!!") || content.contains("<x-") {
            return true;
        }
        let directive_re = Regex::new(
            r"(?:^|[^\w@])@(?:if|elseif|else|endif|unless|endunless|foreach|endforeach|for|endfor|forelse|endforelse|while|endwhile|section|endsection|yield|extends|include|auth|endauth|guest|endguest|push|endpush|isset|endisset|verbatim|endverbatim|php|endphp|csrf|method|once|endonce)\b",
        )
        .unwrap();
        directive_re.is_match(content)
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
        if opts.raw {
            return replace_text(content, old, new, opts);
        }

        let scanned = scan(content);

        // An old value that is itself a protected construct targets those
        // spans directly; masking would otherwise hide it from the replace.
        let target = old.trim();
        let wants_span = target.starts_with("{{")
            || target.starts_with("{!!")
            || target.starts_with('@');
        if wants_span {
            let mut edits = Vec::new();
            for span in &scanned.spans {
                let direct = span.text(content) == target;
                let normalized = match span.kind {
                    SpanKind::Echo => target
                        .strip_prefix("{{")
                        .and_then(|s| s.strip_suffix("}}"))
                        .map(|inner| inner.trim() == span.expr)
                        .unwrap_or(false),
                    SpanKind::RawEcho => target
                        .strip_prefix("{!!")
                        .and_then(|s| s.strip_suffix("!!}"))
                        .map(|inner| inner.trim() == span.expr)
                        .unwrap_or(false),
                    _ => false,
                };
                if direct || normalized {
                    edits.push(((span.start, span.end), new.to_string()));
                }
            }
            if !edits.is_empty() {
                let count = edits.len();
                return Ok(Replacement::changed(splice_all(content, edits), count));
            }
            // Fall through: the construct may appear in literal text only
        }

        let (masked, table) = mask(content, &scanned.spans);
        let replaced = replace_text(&masked, old, new, opts)?;
        if replaced.count == 0 {
            return Ok(Replacement::unchanged(content));
        }
        Ok(Replacement::changed(
            unmask(&replaced.content, &table),
            replaced.count,
        ))
    }

    fn replace_by_selector(
        &self,
        content: &str,
        selector: &str,
        new: &str,
        opts: &ReplaceOptions,
    ) -> Result<Replacement, StrategyError> {
        let edits = self.selector_edits(content, selector, new, opts)?;
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
        let name = match parse_template_selector(selector)? {
            TemplateSelector::Component(name) => name,
            _ => {
                return Err(StrategyError::InvalidSelector(format!(
                    "attribute updates target component tags, got '{}'",
                    selector
                )));
            }
        };
        let attr_name = attr.to_ascii_lowercase();

        let scanned = scan(content);
        let mut edits = Vec::new();

        for span in scanned
            .spans
            .iter()
            .filter(|s| s.kind == SpanKind::ComponentOpen && s.name == name)
        {
            let bytes = content.as_bytes();
            // Walk the attributes inside this open tag
            let mut pos = span.start + 1 + span.name.len();
            let tag_close = span.end;
            let mut existing = None;
            while pos < tag_close {
                while pos < tag_close && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                if pos >= tag_close || bytes[pos] == b'>' {
                    break;
                }
                if bytes[pos] == b'/' {
                    pos += 1;
                    continue;
                }
                let (attr_span, next) = scan_attr(content, pos);
                if next == pos {
                    break;
                }
                if attr_span.name.trim_start_matches(':') == attr_name {
                    existing = Some(attr_span);
                    break;
                }
                pos = next;
            }

            match (existing, value) {
                (Some(a), Some(new_value)) => {
                    if a.value.as_deref() == Some(new_value) {
                        continue;
                    }
                    match a.value_span {
                        Some(vspan) => edits.push((vspan, escape_attr(new_value))),
                        None => edits.push((
                            a.span,
                            format!("{}=\"{}\"", attr_name, escape_attr(new_value)),
                        )),
                    }
                }
                (Some(a), None) => {
                    let mut start = a.span.0;
                    while start > span.start && bytes[start - 1].is_ascii_whitespace() {
                        start -= 1;
                    }
                    edits.push(((start, a.span.1), String::new()));
                }
                (None, Some(new_value)) => {
                    let closer_len = if content[span.start..span.end].ends_with("/>") {
                        2
                    } else {
                        1
                    };
                    let mut insert_at = span.end - closer_len;
                    while insert_at > span.start && bytes[insert_at - 1].is_ascii_whitespace() {
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
        let scanned = scan(content);

        for error in &scanned.errors {
            report.push_error(error.clone());
        }

        let (_, block_errors) = build_blocks(&scanned.spans);
        for error in block_errors {
            report.push_error(error);
        }

        let dangerous =
            Regex::new(r"^\$_(GET|POST|REQUEST|COOKIE|SERVER|FILES|ENV)\b").unwrap();
        for span in &scanned.spans {
            if span.kind == SpanKind::RawEcho && dangerous.is_match(&span.expr) {
                report.push_error(format!(
                    "raw output of request data is not allowed: {{!! {} !!}}",
                    span.expr
                ));
            }
        }

        // Stray closers left in literal text
        let (masked, _) = mask(content, &scanned.spans);
        for closer in ["--}}", "!!}", "}}"] {
            if masked.contains(closer) {
                report.push_warning(format!("stray '{}' without an opening delimiter", closer));
                break;
            }
        }

        report
    }

    fn find_identifier(&self, content: &str, ident: &str) -> Option<Region> {
        let scanned = scan(content);
        let ident_lower = ident.to_ascii_lowercase();

        // A directive name labels every use; return the first
        if let Some(span) = scanned
            .spans
            .iter()
            .find(|s| s.kind == SpanKind::Directive && s.name == ident_lower)
        {
            return Some(Region::new(span.start, span.end));
        }

        // A component tag name, with or without its x- prefix
        let component = if ident_lower.starts_with("x-") {
            ident_lower
        } else {
            format!("x-{}", ident_lower)
        };
        let open_idx = scanned
            .spans
            .iter()
            .position(|s| s.kind == SpanKind::ComponentOpen && s.name == component)?;
        let open = &scanned.spans[open_idx];
        let end = if open.self_closing {
            open.end
        } else {
            matching_component_close(&scanned.spans, open_idx)
                .map(|i| scanned.spans[i].end)
                .unwrap_or(open.end)
        };
        Some(Region::new(open.start, end))
    }

    fn resolve_selector(&self, content: &str, selector: &str) -> Vec<Region> {
        match self.selector_edits(content, selector, "", &ReplaceOptions::default()) {
            Ok(edits) => edits
                .into_iter()
                .map(|((start, end), _)| Region::new(start, end))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
