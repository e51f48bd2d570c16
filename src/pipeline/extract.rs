//! Diagram extraction: find Mermaid fences in raw Markdown.
//!
//! ## Why a line scanner instead of a regex?
//!
//! A lazy `` ```mermaid\n(.*?)``` `` pattern has two problems: it matches
//! fences that merely *appear* inside another code block (a tutorial showing
//! Mermaid syntax), and its closing condition is "the next three backticks
//! anywhere", which can swallow inline code. Walking the text line by line
//! with an explicit state (outside, inside a foreign fence, inside a Mermaid
//! fence) keeps matches order-preserving and non-overlapping, and every
//! decision is visible in one `match`.
//!
//! ## Recognised syntax
//!
//! * Opening line: up to 3 spaces, three or more backticks, info string
//!   exactly `mermaid`.
//! * Closing line: the first following line that begins (after up to 3
//!   spaces) with three backticks.
//! * Fences with an empty body and unterminated fences produce no
//!   descriptor.

use std::ops::Range;

/// One Mermaid fence found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramDescriptor {
    /// Diagram definition with surrounding whitespace trimmed.
    pub source: String,
    /// 0-based discovery order.
    pub index: usize,
    /// Exact fence text, from the opening backticks to the end of the closing ones.
    pub original_match: String,
    /// Byte range of `original_match` in the scanned text.
    pub span: Range<usize>,
}

enum State {
    Outside,
    /// Inside a non-Mermaid fence opened by `len` repetitions of `marker`.
    Foreign { marker: char, len: usize },
    /// Inside a Mermaid fence; offsets of the opening backticks and of the body.
    Diagram { start: usize, body_start: usize },
}

/// Scan `text` for Mermaid fences, in document order.
///
/// Pure function: no diagrams is an empty `Vec`, never an error.
pub fn extract_diagrams(text: &str) -> Vec<DiagramDescriptor> {
    let mut found = Vec::new();
    let mut state = State::Outside;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let content = line.trim_end_matches(['\n', '\r']);

        state = match state {
            State::Outside => match open_fence(content) {
                Some((indent, marker, len, info)) => {
                    if marker == '`' && info == "mermaid" {
                        State::Diagram {
                            start: line_start + indent,
                            body_start: offset,
                        }
                    } else {
                        State::Foreign { marker, len }
                    }
                }
                None => State::Outside,
            },
            State::Foreign { marker, len } => {
                if closes_fence(content, marker, len) {
                    State::Outside
                } else {
                    State::Foreign { marker, len }
                }
            }
            State::Diagram { start, body_start } => {
                match strip_indent(content) {
                    Some((indent, rest)) if rest.starts_with("```") => {
                        let body = &text[body_start..line_start];
                        let end = line_start + indent + 3;
                        let source = body.trim();
                        if !source.is_empty() {
                            found.push(DiagramDescriptor {
                                source: source.to_string(),
                                index: found.len(),
                                original_match: text[start..end].to_string(),
                                span: start..end,
                            });
                        }
                        State::Outside
                    }
                    _ => State::Diagram { start, body_start },
                }
            }
        };
    }

    found
}

/// Leading indentation of at most 3 spaces, and the rest of the line.
fn strip_indent(line: &str) -> Option<(usize, &str)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    (indent <= 3).then(|| (indent, &line[indent..]))
}

/// `(indent, marker, run length, info string)` for a fence-opening line.
fn open_fence(line: &str) -> Option<(usize, char, usize, &str)> {
    let (indent, rest) = strip_indent(line)?;
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.len() - rest.trim_start_matches(marker).len();
    if len < 3 {
        return None;
    }
    let info = rest[len..].trim();
    // A backtick fence's info string may not itself contain backticks.
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some((indent, marker, len, info))
}

fn closes_fence(line: &str, marker: char, len: usize) -> bool {
    let Some((_, rest)) = strip_indent(line) else {
        return false;
    };
    let run = rest.len() - rest.trim_start_matches(marker).len();
    run >= len && rest[run..].trim().is_empty()
}
