//! The per-response block list.
//!
//! A [`ContentAssembler`] is created for one completion, fed every text delta
//! and tool-call fragment in arrival order, and asked for a serialization
//! whenever the caller needs to broadcast or persist. The list is never
//! empty and, while streaming, only its last block receives content.

use crate::block::{CodeBlock, ContentBlock, ReasoningBlock, ToolCallGroup};
use crate::render::{self, RenderMode};
use crate::scanner::{BlockKind, TagScanner, Transition};
use chatweave_core::execution::ExecutionOutput;
use chatweave_core::tool::{ToolCall, ToolResult};
use chrono::Utc;
use tracing::trace;

/// What one [`ContentAssembler::append_delta`] call changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeltaOutcome {
    /// Number of tag transitions applied.
    pub transitions: usize,

    /// A non-empty code block just closed; the rest of the stream belongs to
    /// the code execution loop.
    pub code_ready: bool,
}

#[derive(Debug, Default, Clone)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

/// Ordered content blocks of one in-flight response.
#[derive(Debug, Clone)]
pub struct ContentAssembler {
    scanner: TagScanner,
    blocks: Vec<ContentBlock>,
    pending_calls: Vec<Option<ToolCallBuilder>>,
    code_closed: bool,

    /// Set by `end_stream`; no further bytes can complete a held marker.
    stream_ended: bool,
}

impl ContentAssembler {
    pub fn new(scanner: TagScanner) -> Self {
        Self::with_initial_text(scanner, "")
    }

    /// Start from content already stored for the message.
    pub fn with_initial_text(scanner: TagScanner, text: impl Into<String>) -> Self {
        Self {
            scanner,
            blocks: vec![ContentBlock::text(text)],
            pending_calls: Vec::new(),
            code_closed: false,
            stream_ended: false,
        }
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn tail(&self) -> Option<&ContentBlock> {
        self.blocks.last()
    }

    /// Append streamed text to the open block and apply every complete
    /// marker it produces.
    ///
    /// Each scanner pass yields at most one transition; passes repeat until
    /// the buffer holds no further complete marker. Once a code block has
    /// closed, deltas are ignored until [`ContentAssembler::open_text`].
    pub fn append_delta(&mut self, delta: &str) -> DeltaOutcome {
        if self.code_closed || delta.is_empty() {
            return DeltaOutcome::default();
        }
        self.stream_ended = false;

        let after_block = self.blocks.len() > 1;
        match self.blocks.last_mut() {
            Some(ContentBlock::Text { content }) => {
                if content.is_empty() && after_block {
                    content.push_str(delta.trim_start());
                } else {
                    content.push_str(delta);
                }
            }
            Some(ContentBlock::Reasoning(b)) if !b.is_done() => b.content.push_str(delta),
            Some(ContentBlock::CodeInterpreter(b)) if !b.is_closed() => b.content.push_str(delta),
            _ => self.blocks.push(ContentBlock::text(delta.trim_start())),
        }

        self.rescan()
    }

    fn rescan(&mut self) -> DeltaOutcome {
        let mut outcome = DeltaOutcome::default();
        loop {
            let transition = match self.blocks.last() {
                Some(ContentBlock::Text { content }) => self.scanner.scan_open(content),
                Some(ContentBlock::Reasoning(b)) if !b.is_done() => self.scanner.scan_close(&b.tag, &b.content),
                Some(ContentBlock::CodeInterpreter(b)) if !b.is_closed() => {
                    self.scanner.scan_close(&b.tag, &b.content)
                }
                _ => None,
            };
            let Some(transition) = transition else { break };

            outcome.transitions += 1;
            if self.apply(transition) {
                outcome.code_ready = true;
                break;
            }
        }
        outcome
    }

    /// Returns `true` when a non-empty code block closed.
    fn apply(&mut self, transition: Transition) -> bool {
        let now = Utc::now();
        match transition {
            Transition::Open { kind, tag, attributes, before, after } => {
                trace!(%tag, "tag opened");
                self.blocks.pop();
                let before = before.trim_end();
                if !before.is_empty() {
                    self.blocks.push(ContentBlock::text(before));
                }
                let block = match kind {
                    BlockKind::Reasoning => ContentBlock::Reasoning(ReasoningBlock {
                        tag,
                        attributes,
                        content: after,
                        started_at: now,
                        ended_at: None,
                    }),
                    BlockKind::CodeInterpreter => ContentBlock::CodeInterpreter(CodeBlock {
                        tag,
                        attributes,
                        content: after,
                        started_at: now,
                        ended_at: None,
                        output: None,
                    }),
                };
                self.blocks.push(block);
                false
            }
            Transition::Close { content, leftover } => {
                let content = content.trim();
                let leftover = leftover.trim();
                match self.blocks.last_mut() {
                    Some(ContentBlock::Reasoning(b)) if !content.is_empty() => {
                        trace!(tag = %b.tag, "reasoning closed");
                        b.content = content.to_string();
                        b.ended_at = Some(now);
                        self.blocks.push(ContentBlock::text(leftover));
                        false
                    }
                    Some(ContentBlock::CodeInterpreter(b)) if !content.is_empty() => {
                        trace!(tag = %b.tag, "code block closed");
                        b.content = content.to_string();
                        b.ended_at = Some(now);
                        self.code_closed = true;
                        true
                    }
                    _ => {
                        self.blocks.pop();
                        self.blocks.push(ContentBlock::text(leftover));
                        false
                    }
                }
            }
        }
    }

    /// Accumulate a streamed tool-call fragment at `index`.
    pub fn append_tool_call_fragment(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        if self.pending_calls.len() <= index {
            self.pending_calls.resize_with(index + 1, || None);
        }
        let builder = self.pending_calls[index].get_or_insert_with(ToolCallBuilder::default);
        if let Some(id) = id {
            if builder.id.is_empty() {
                builder.id = id.to_string();
            }
        }
        if let Some(name) = name {
            builder.name.push_str(name);
        }
        if let Some(arguments) = arguments {
            builder.arguments.push_str(arguments);
        }
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        self.pending_calls.iter().any(Option::is_some)
    }

    /// Drain accumulated tool calls in index order, skipping gaps.
    pub fn take_tool_calls(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.pending_calls)
            .into_iter()
            .enumerate()
            .filter_map(|(index, builder)| {
                builder.map(|b| ToolCall {
                    id: if b.id.is_empty() { format!("call_{index}") } else { b.id },
                    name: b.name,
                    arguments: b.arguments,
                })
            })
            .collect()
    }

    /// Terminal handling for one upstream stream: trim the trailing text and
    /// drop it when empty. Bytes held back as a possible marker are released.
    pub fn end_stream(&mut self) {
        self.stream_ended = true;
        if let Some(ContentBlock::Text { content }) = self.blocks.last_mut() {
            let trimmed = content.trim();
            if trimmed.len() != content.len() {
                *content = trimmed.to_string();
            }
        }
        self.close_trailing_empty_text();
    }

    /// Drop a trailing whitespace-only text block, keeping the list non-empty.
    pub fn close_trailing_empty_text(&mut self) {
        let trailing_empty = matches!(
            self.blocks.last(),
            Some(ContentBlock::Text { content }) if content.trim().is_empty()
        );
        if trailing_empty && self.blocks.len() > 1 {
            self.blocks.pop();
        }
    }

    /// Append a pending tool-call group as the new tail.
    pub fn push_tool_group(&mut self, calls: Vec<ToolCall>) {
        self.close_trailing_empty_text();
        self.blocks.push(ContentBlock::ToolCalls(ToolCallGroup::pending(calls)));
    }

    /// Attach results to the trailing tool-call group.
    pub fn attach_tool_results(&mut self, results: Vec<ToolResult>) -> bool {
        match self.blocks.last_mut() {
            Some(ContentBlock::ToolCalls(group)) => {
                group.results = Some(results);
                true
            }
            _ => false,
        }
    }

    /// The trailing code block, when the last stream ended on one that has
    /// not run yet.
    ///
    /// An unterminated block counts too: the stream may end before the
    /// closing marker arrives.
    pub fn code_tail(&self) -> Option<&CodeBlock> {
        match self.blocks.last() {
            Some(ContentBlock::CodeInterpreter(b)) if b.output.is_none() => Some(b),
            _ => None,
        }
    }

    /// Record execution output on the trailing code block.
    pub fn set_code_output(&mut self, output: ExecutionOutput) -> bool {
        match self.blocks.last_mut() {
            Some(ContentBlock::CodeInterpreter(b)) => {
                b.output = Some(output);
                true
            }
            _ => false,
        }
    }

    /// Start a fresh text block for the next model turn.
    pub fn open_text(&mut self) {
        self.code_closed = false;
        self.stream_ended = false;
        self.blocks.push(ContentBlock::text(""));
    }

    fn held_tail(&self) -> usize {
        if self.stream_ended {
            return 0;
        }
        match self.blocks.last() {
            Some(ContentBlock::Text { content }) => self.scanner.held_len(content, None),
            Some(ContentBlock::Reasoning(b)) if !b.is_done() => self.scanner.held_len(&b.content, Some(&b.tag)),
            Some(ContentBlock::CodeInterpreter(b)) if !b.is_closed() => {
                self.scanner.held_len(&b.content, Some(&b.tag))
            }
            _ => 0,
        }
    }

    /// Render the block list. While streaming, a partial marker at the tail
    /// is not shown.
    pub fn serialize(&self, mode: RenderMode) -> String {
        render::serialize(&self.blocks, mode, self.held_tail())
    }

    pub fn rendered(&self) -> String {
        self.serialize(RenderMode::Rendered)
    }

    pub fn raw(&self) -> String {
        self.serialize(RenderMode::Raw)
    }

    /// Whether two assemblers hold structurally equivalent blocks.
    pub fn equivalent(&self, other: &ContentAssembler) -> bool {
        self.blocks.len() == other.blocks.len()
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|(a, b)| a.equivalent(b))
    }
}
