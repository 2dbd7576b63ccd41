//! Decoding of `data:` frames from an OpenAI-compatible stream.
//!
//! Bytes arrive in arbitrary chunks; [`LineBuffer`] reassembles lines
//! (including multi-byte characters split across chunks) and
//! [`FrameDecoder`] turns each `data:` line into [`StreamEvent`]s.

use chatweave_core::provider::{StreamEvent, ToolCallDelta, Usage};
use serde::Deserialize;

/// Splits a byte stream into lines, buffering any incomplete tail.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Add bytes and return every line they complete (without the newline).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// What one line of the stream means.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Decoded events; a usage frame ends with [`StreamEvent::Done`].
    Events(Vec<StreamEvent>),
    /// The literal `[DONE]` marker.
    Done,
    /// Not a data line, or a data line with nothing in it.
    Ignored,
    /// A data line that is not valid frame JSON.
    Malformed(String),
}

/// Line buffering plus frame decoding.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineBuffer,
}

impl FrameDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.lines.push(bytes).iter().map(|l| decode_line(l)).collect()
    }

    pub fn finish(&mut self) -> Vec<Frame> {
        self.lines.finish().map(|l| decode_line(&l)).into_iter().collect()
    }
}

/// Decode a single stream line.
pub fn decode_line(line: &str) -> Frame {
    let Some(data) = line.strip_prefix("data:") else {
        return Frame::Ignored;
    };
    let data = data.trim();
    if data.is_empty() {
        return Frame::Ignored;
    }
    if data == "[DONE]" {
        return Frame::Done;
    }

    let frame: StreamFrame = match serde_json::from_str(data) {
        Ok(frame) => frame,
        Err(e) => return Frame::Malformed(e.to_string()),
    };

    let mut events = Vec::new();
    if let Some(model) = frame.selected_model_id {
        events.push(StreamEvent::SelectedModel(model));
    }
    if let Some(citations) = frame.citations {
        events.push(StreamEvent::Citations(citations));
    }
    if let Some(choice) = frame.choices.into_iter().next() {
        let tool_calls: Vec<ToolCallDelta> = choice
            .delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments,
                }
            })
            .collect();
        let content = choice.delta.content.filter(|c| !c.is_empty());
        if content.is_some() || !tool_calls.is_empty() {
            events.push(StreamEvent::Delta { content, tool_calls });
        }
    }
    if let Some(usage) = frame.usage {
        events.push(StreamEvent::Usage(Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }));
        events.push(StreamEvent::Done);
    }

    if events.is_empty() {
        Frame::Ignored
    } else {
        Frame::Events(events)
    }
}

// --- Streaming frame types (internal) ---

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<FrameUsage>,
    #[serde(default)]
    citations: Option<Vec<String>>,
    #[serde(default)]
    selected_model_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
