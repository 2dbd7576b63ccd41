//! Typed segments of one assembled response.

use chatweave_core::execution::ExecutionOutput;
use chatweave_core::tool::{ToolCall, ToolResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One contiguous, typed segment of an assembled response.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    /// Plain prose; the only block that accumulates raw deltas.
    Text { content: String },

    /// A reasoning trace bounded by a reasoning tag.
    Reasoning(ReasoningBlock),

    /// A batch of tool invocations requested by the model.
    ToolCalls(ToolCallGroup),

    /// Code for the interpreter, plus its output once run.
    CodeInterpreter(CodeBlock),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningBlock {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub content: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ReasoningBlock {
    pub fn is_done(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Whole seconds between open and close markers.
    pub fn duration_secs(&self) -> Option<i64> {
        self.ended_at.map(|end| (end - self.started_at).num_seconds())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallGroup {
    pub calls: Vec<ToolCall>,

    /// `None` while the calls are pending.
    pub results: Option<Vec<ToolResult>>,
}

impl ToolCallGroup {
    pub fn pending(calls: Vec<ToolCall>) -> Self {
        Self { calls, results: None }
    }

    /// Name of the call a result belongs to, or empty when unknown.
    pub fn call_name(&self, tool_call_id: &str) -> &str {
        self.calls
            .iter()
            .find(|c| c.id == tool_call_id)
            .map(|c| c.name.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub content: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub output: Option<ExecutionOutput>,
}

impl CodeBlock {
    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Language hint from the `lang` attribute.
    pub fn lang(&self) -> &str {
        self.attributes.get("lang").map(String::as_str).unwrap_or("")
    }

    /// Whether the block asks for execution (`type="code"`).
    pub fn is_executable(&self) -> bool {
        self.attributes.get("type").is_some_and(|t| t == "code")
    }
}

impl ContentBlock {
    pub fn text(content: impl Into<String>) -> Self {
        ContentBlock::Text {
            content: content.into(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentBlock::Text { .. })
    }

    /// Structural equality that ignores timestamps and surrounding whitespace.
    pub fn equivalent(&self, other: &ContentBlock) -> bool {
        match (self, other) {
            (ContentBlock::Text { content: a }, ContentBlock::Text { content: b }) => a.trim() == b.trim(),
            (ContentBlock::Reasoning(a), ContentBlock::Reasoning(b)) => {
                a.tag == b.tag
                    && a.attributes == b.attributes
                    && a.content.trim() == b.content.trim()
                    && a.is_done() == b.is_done()
            }
            (ContentBlock::ToolCalls(a), ContentBlock::ToolCalls(b)) => a == b,
            (ContentBlock::CodeInterpreter(a), ContentBlock::CodeInterpreter(b)) => {
                a.tag == b.tag
                    && a.attributes == b.attributes
                    && a.content.trim() == b.content.trim()
                    && a.is_closed() == b.is_closed()
                    && a.output == b.output
            }
            _ => false,
        }
    }
}
