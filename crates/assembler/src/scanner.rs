//! Incremental tag scanner.
//!
//! Finds `<tag attr="v">` start markers and `</tag>` end markers in a buffer
//! that keeps growing as deltas arrive. The scanner is stateless: the caller
//! passes the current buffer and, while a tag is open, that tag's name. A
//! marker is only reported once it is complete; [`TagScanner::held_len`]
//! reports how many trailing bytes might still grow into a marker so the
//! caller can keep them out of anything it renders.

use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

static ATTRIBUTE_RE: OnceLock<Regex> = OnceLock::new();

fn attribute_re() -> &'static Regex {
    ATTRIBUTE_RE.get_or_init(|| Regex::new(r#"(\w+)\s*=\s*"([^"]+)""#).expect("valid attribute pattern"))
}

/// What a recognized tag bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Reasoning,
    CodeInterpreter,
}

/// A group of tag names that all open the same kind of block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFamily {
    pub kind: BlockKind,
    pub tags: Vec<String>,
}

impl TagFamily {
    pub fn new(kind: BlockKind, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn reasoning(tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(BlockKind::Reasoning, tags)
    }

    pub fn code_interpreter(tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(BlockKind::CodeInterpreter, tags)
    }
}

/// A state change found in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A complete start marker. `before` is the buffer up to the marker,
    /// `after` everything following it.
    Open {
        kind: BlockKind,
        tag: String,
        attributes: BTreeMap<String, String>,
        before: String,
        after: String,
    },

    /// A complete end marker for the open tag.
    Close { content: String, leftover: String },
}

/// Incremental lexer over a fixed, priority-ordered set of tag families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagScanner {
    families: Vec<TagFamily>,
}

/// What follows `<tag` in the buffer.
#[derive(Debug, PartialEq, Eq)]
enum MarkerTail {
    /// The marker ends `len` bytes later.
    Complete(usize),
    /// The buffer ends before the marker could be decided.
    Incomplete,
    /// Not a start marker for this tag.
    NotMarker,
}

impl TagScanner {
    /// Families earlier in the list win when two markers start at the same offset.
    pub fn new(families: Vec<TagFamily>) -> Self {
        Self { families }
    }

    pub fn families(&self) -> &[TagFamily] {
        &self.families
    }

    /// Which family a tag name belongs to.
    pub fn kind_of(&self, tag: &str) -> Option<BlockKind> {
        self.families
            .iter()
            .find(|f| f.tags.iter().any(|t| t == tag))
            .map(|f| f.kind)
    }

    /// Look for the earliest complete start marker of any family.
    pub fn scan_open(&self, buffer: &str) -> Option<Transition> {
        let mut best: Option<(usize, usize, BlockKind, &str)> = None;

        for family in &self.families {
            for tag in &family.tags {
                if let Some((start, end)) = find_start_marker(buffer, tag) {
                    if best.is_none_or(|(s, ..)| start < s) {
                        best = Some((start, end, family.kind, tag.as_str()));
                    }
                }
            }
        }

        let (start, end, kind, tag) = best?;
        let attr_text = &buffer[start + 1 + tag.len()..end - 1];
        Some(Transition::Open {
            kind,
            tag: tag.to_string(),
            attributes: self.parse_attributes(attr_text),
            before: buffer[..start].to_string(),
            after: buffer[end..].to_string(),
        })
    }

    /// Look for the end marker of the open `tag`.
    ///
    /// Start markers inside an open block are never reported, so a nested
    /// `<tag>` stays part of the content.
    pub fn scan_close(&self, tag: &str, buffer: &str) -> Option<Transition> {
        let marker = format!("</{tag}>");
        let pos = buffer.find(&marker)?;
        Some(Transition::Close {
            content: buffer[..pos].to_string(),
            leftover: buffer[pos + marker.len()..].to_string(),
        })
    }

    /// Number of trailing bytes of `buffer` that could still become a marker.
    ///
    /// `open_tag` is the tag of the open block, or `None` while in plain text.
    pub fn held_len(&self, buffer: &str, open_tag: Option<&str>) -> usize {
        match open_tag {
            Some(tag) => held_end_marker(buffer, tag),
            None => self.held_start_marker(buffer),
        }
    }

    fn held_start_marker(&self, buffer: &str) -> usize {
        for (pos, _) in buffer.match_indices('<') {
            let rest = &buffer[pos + 1..];
            let viable = self.families.iter().flat_map(|f| &f.tags).any(|tag| {
                if tag.starts_with(rest) {
                    return true;
                }
                rest.starts_with(tag.as_str())
                    && marker_tail(&rest[tag.len()..]) == MarkerTail::Incomplete
            });
            if viable {
                return buffer.len() - pos;
            }
        }
        0
    }

    /// Extract `key="value"` pairs; anything else is ignored.
    pub fn parse_attributes(&self, text: &str) -> BTreeMap<String, String> {
        attribute_re()
            .captures_iter(text)
            .filter_map(|caps| Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string())))
            .collect()
    }
}

fn find_start_marker(buffer: &str, tag: &str) -> Option<(usize, usize)> {
    let needle = format!("<{tag}");
    let mut from = 0;
    while let Some(rel) = buffer[from..].find(&needle) {
        let start = from + rel;
        let after = start + needle.len();
        if let MarkerTail::Complete(len) = marker_tail(&buffer[after..]) {
            return Some((start, after + len));
        }
        from = start + 1;
    }
    None
}

/// A start marker continues with `>` directly, or with whitespace followed
/// by attribute text up to `>` on the same line.
fn marker_tail(rest: &str) -> MarkerTail {
    let mut chars = rest.char_indices();
    match chars.next() {
        None => MarkerTail::Incomplete,
        Some((_, '>')) => MarkerTail::Complete(1),
        Some((_, c)) if c.is_whitespace() => {
            for (i, c) in chars {
                match c {
                    '>' => return MarkerTail::Complete(i + 1),
                    '\n' => return MarkerTail::NotMarker,
                    _ => {}
                }
            }
            MarkerTail::Incomplete
        }
        Some(_) => MarkerTail::NotMarker,
    }
}

fn held_end_marker(buffer: &str, tag: &str) -> usize {
    let marker = format!("</{tag}>");
    (1..marker.len())
        .rev()
        .find(|&k| buffer.ends_with(&marker[..k]))
        .unwrap_or(0)
}
