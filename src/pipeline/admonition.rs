//! Admonitions: `!!! kind "Optional title"` callout blocks.
//!
//! ```text
//! !!! warning "Mind the gap"
//!     Indented body lines (4 spaces) are Markdown.
//!
//!     Blank lines inside the body are kept.
//! Next unindented line ends the block.
//! ```
//!
//! The scanner tracks fenced code blocks so a `!!!` line inside a code
//! sample is never rewritten. A line starting with `!!!` that does not match
//! the marker grammar passes through unchanged.
//!
//! Two renderings exist because the two converters read different dialects:
//! [`to_html_blocks`] wraps the body in styled `<div>`s for the HTML → PDF
//! path, and [`to_pandoc_divs`] emits pandoc fenced divs carrying a
//! `custom-style` for the DOCX path.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^!!!\s+(\w+)(?:\s+"([^"]*)")?"#).unwrap());

/// Callout category. Unknown words still form an admonition with the
/// generic style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmonitionKind {
    Warning,
    Note,
    Info,
    Tip,
    Danger,
    Other(String),
}

impl AdmonitionKind {
    fn parse(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "warning" => AdmonitionKind::Warning,
            "note" => AdmonitionKind::Note,
            "info" => AdmonitionKind::Info,
            "tip" => AdmonitionKind::Tip,
            "danger" => AdmonitionKind::Danger,
            other => AdmonitionKind::Other(other.to_string()),
        }
    }

    /// Lower-case name used in CSS classes.
    pub fn name(&self) -> &str {
        match self {
            AdmonitionKind::Warning => "warning",
            AdmonitionKind::Note => "note",
            AdmonitionKind::Info => "info",
            AdmonitionKind::Tip => "tip",
            AdmonitionKind::Danger => "danger",
            AdmonitionKind::Other(word) => word,
        }
    }

    /// Word-processor style name, e.g. `Admonition Warning`.
    pub fn style_name(&self) -> String {
        format!("Admonition {}", capitalize(self.name()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admonition {
    pub kind: AdmonitionKind,
    /// Explicit title, or the marker word capitalised.
    pub title: String,
    /// Body Markdown with one level of indentation removed.
    pub body: String,
}

/// Raw text or a parsed admonition, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Admonition(Admonition),
}

/// Split a document into text and admonition segments.
pub fn parse_segments(text: &str) -> Vec<Segment> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut segments = Vec::new();
    let mut pending = String::new();
    let mut fence: Option<(char, usize)> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let content = line.trim_end_matches(['\n', '\r']);

        if let Some((marker, len)) = fence {
            if fence_run(content).is_some_and(|(m, n, rest)| m == marker && n >= len && rest.trim().is_empty()) {
                fence = None;
            }
            pending.push_str(line);
            i += 1;
            continue;
        }
        if let Some((marker, len, _)) = fence_run(content) {
            fence = Some((marker, len));
            pending.push_str(line);
            i += 1;
            continue;
        }

        let Some(caps) = RE_MARKER.captures(content) else {
            pending.push_str(line);
            i += 1;
            continue;
        };
        let word = &caps[1];
        let title = caps
            .get(2)
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|| capitalize(word));

        // Body: indented or blank lines. Trailing blanks stay outside.
        let mut end = i + 1;
        let mut last_content = i;
        while end < lines.len() {
            let l = lines[end].trim_end_matches(['\n', '\r']);
            if l.trim().is_empty() {
                end += 1;
            } else if l.starts_with("    ") || l.starts_with('\t') {
                last_content = end;
                end += 1;
            } else {
                break;
            }
        }

        let body = lines[i + 1..last_content + 1]
            .iter()
            .map(|l| dedent(l.trim_end_matches(['\n', '\r'])))
            .collect::<Vec<_>>()
            .join("\n");

        if !pending.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut pending)));
        }
        segments.push(Segment::Admonition(Admonition {
            kind: AdmonitionKind::parse(word),
            title,
            body,
        }));
        i = last_content + 1;
    }

    if !pending.is_empty() {
        segments.push(Segment::Text(pending));
    }
    segments
}

/// Replace admonitions with HTML wrappers whose body is still Markdown.
///
/// Blank lines around the body let a CommonMark renderer treat the wrapper
/// tags as HTML blocks and parse the body as Markdown.
pub fn to_html_blocks(text: &str) -> String {
    render(text, |a, out| {
        out.push_str(&format!(
            "<div class=\"admonition admonition-{}\">\n<div class=\"admonition-title\">{}</div>\n<div class=\"admonition-content\">\n\n",
            a.kind.name(),
            escape_html(&a.title)
        ));
        out.push_str(&a.body);
        out.push_str("\n\n</div>\n</div>\n\n");
    })
}

/// Replace admonitions with pandoc fenced divs carrying a custom style.
pub fn to_pandoc_divs(text: &str) -> String {
    render(text, |a, out| {
        out.push_str(&format!(
            "::: {{custom-style=\"{}\"}}\n**{}**\n\n",
            a.kind.style_name(),
            a.title.replace('*', "\\*")
        ));
        out.push_str(&a.body);
        out.push_str("\n:::\n\n");
    })
}

fn render(text: &str, mut emit: impl FnMut(&Admonition, &mut String)) -> String {
    let segments = parse_segments(text);
    if !segments.iter().any(|s| matches!(s, Segment::Admonition(_))) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 256);
    for segment in &segments {
        match segment {
            Segment::Text(t) => {
                out.push_str(t);
                if !t.ends_with('\n') {
                    out.push('\n');
                }
            }
            Segment::Admonition(a) => {
                // The wrapper must start its own block.
                if !out.is_empty() && !out.ends_with("\n\n") {
                    out.push('\n');
                }
                emit(a, &mut out);
            }
        }
    }
    out
}

/// `(marker, run length, rest)` if the line opens or closes a code fence.
fn fence_run(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.len() - trimmed.trim_start_matches(marker).len();
    (run >= 3).then(|| (marker, run, &trimmed[run..]))
}

fn dedent(line: &str) -> &str {
    line.strip_prefix("    ")
        .or_else(|| line.strip_prefix('\t'))
        .unwrap_or(line)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
