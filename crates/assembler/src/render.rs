//! Serialization of a block list.
//!
//! *Rendered* output turns non-text blocks into collapsible `<details>`
//! elements whose attributes carry machine-readable state (done flag,
//! duration, escaped JSON payloads). *Raw* output writes blocks back in
//! their original tag syntax for resubmission to the model; tool-call
//! groups are omitted there because they travel as structured messages.

use crate::block::{CodeBlock, ContentBlock, ReasoningBlock, ToolCallGroup};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Rendered,
    Raw,
}

/// Render `blocks`, hiding the last `held_tail` bytes of the final block.
pub fn serialize(blocks: &[ContentBlock], mode: RenderMode, held_tail: usize) -> String {
    let mut out = String::new();
    let last = blocks.len().saturating_sub(1);

    for (i, block) in blocks.iter().enumerate() {
        let held = if i == last { held_tail } else { 0 };
        match block {
            ContentBlock::Text { content } => {
                out.push_str(visible(content, held).trim());
                out.push('\n');
            }
            ContentBlock::Reasoning(b) => render_reasoning(&mut out, b, visible(&b.content, held), mode),
            ContentBlock::ToolCalls(g) => {
                if mode == RenderMode::Rendered {
                    render_tool_group(&mut out, g);
                }
            }
            ContentBlock::CodeInterpreter(b) => render_code(&mut out, b, visible(&b.content, held), mode),
        }
    }

    out.trim().to_string()
}

/// Escape text for use inside an HTML attribute.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn visible(content: &str, held: usize) -> &str {
    let end = content.len().saturating_sub(held);
    content.get(..end).unwrap_or(content)
}

fn raw_attributes(attributes: &BTreeMap<String, String>) -> String {
    attributes
        .iter()
        .fold(String::new(), |mut acc, (k, v)| {
            let _ = write!(acc, " {k}=\"{v}\"");
            acc
        })
}

fn render_reasoning(out: &mut String, block: &ReasoningBlock, content: &str, mode: RenderMode) {
    if mode == RenderMode::Raw {
        let _ = write!(
            out,
            "\n<{tag}{attrs}>{content}</{tag}>\n",
            tag = block.tag,
            attrs = raw_attributes(&block.attributes),
        );
        return;
    }

    let display = content
        .lines()
        .map(|line| {
            if line.starts_with('>') {
                line.to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    match block.duration_secs() {
        Some(duration) => {
            let _ = write!(
                out,
                "\n<details type=\"reasoning\" done=\"true\" duration=\"{duration}\">\n<summary>Thought for {duration} seconds</summary>\n{display}\n</details>\n"
            );
        }
        None => {
            let _ = write!(
                out,
                "\n<details type=\"reasoning\" done=\"false\">\n<summary>Thinking…</summary>\n{display}\n</details>\n"
            );
        }
    }
}

fn render_tool_group(out: &mut String, group: &ToolCallGroup) {
    let calls: Vec<_> = group
        .calls
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "type": "function",
                "function": { "name": c.name, "arguments": c.arguments },
            })
        })
        .collect();
    let calls_json = escape_html(&serde_json::Value::Array(calls).to_string());

    match &group.results {
        Some(results) => {
            let display: String = results
                .iter()
                .map(|r| format!("\n> {}: {}", group.call_name(&r.tool_call_id), r.content))
                .collect();
            let results_json = escape_html(&serde_json::to_string(results).unwrap_or_default());
            let _ = write!(
                out,
                "\n<details type=\"tool_calls\" done=\"true\" content=\"{calls_json}\" results=\"{results_json}\">\n<summary>Tool Executed</summary>\n{display}\n</details>\n"
            );
        }
        None => {
            let display: String = group
                .calls
                .iter()
                .map(|c| format!("\n> Executing {}", c.name))
                .collect();
            let _ = write!(
                out,
                "\n<details type=\"tool_calls\" done=\"false\" content=\"{calls_json}\">\n<summary>Tool Executing...</summary>\n{display}\n</details>\n"
            );
        }
    }
}

fn render_code(out: &mut String, block: &CodeBlock, content: &str, mode: RenderMode) {
    let lang = block.lang();
    let output = block
        .output
        .as_ref()
        .map(|o| serde_json::to_string(o).unwrap_or_default());

    match (mode, output) {
        (RenderMode::Raw, output) => {
            let _ = write!(
                out,
                "\n<{tag}{attrs}>\n{content}\n</{tag}>\n",
                tag = block.tag,
                attrs = raw_attributes(&block.attributes),
            );
            if let Some(output) = output {
                let _ = write!(out, "```output\n{output}\n```\n");
            }
        }
        (RenderMode::Rendered, Some(output)) => {
            let _ = write!(
                out,
                "\n<details type=\"code_interpreter\" done=\"true\" output=\"{}\">\n<summary>Analyzed</summary>\n```{lang}\n{content}\n```\n</details>\n",
                escape_html(&output)
            );
        }
        (RenderMode::Rendered, None) => {
            let _ = write!(
                out,
                "\n<details type=\"code_interpreter\" done=\"false\">\n<summary>Analyzing...</summary>\n```{lang}\n{content}\n```\n</details>\n"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatweave_core::execution::ExecutionOutput;
    use chatweave_core::tool::{ToolCall, ToolResult};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn closed_reasoning(content: &str, secs: i64) -> ContentBlock {
        let started_at = Utc::now();
        ContentBlock::Reasoning(ReasoningBlock {
            tag: "think".into(),
            attributes: BTreeMap::new(),
            content: content.into(),
            started_at,
            ended_at: Some(started_at + Duration::seconds(secs)),
        })
    }

    fn code(content: &str, output: Option<ExecutionOutput>) -> ContentBlock {
        let mut attributes = BTreeMap::new();
        attributes.insert("lang".to_string(), "python".to_string());
        attributes.insert("type".to_string(), "code".to_string());
        ContentBlock::CodeInterpreter(CodeBlock {
            tag: "code_interpreter".into(),
            attributes,
            content: content.into(),
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            output,
        })
    }

    #[test]
    fn escapes_attribute_characters() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;");
    }

    #[test]
    fn text_blocks_are_trimmed_and_joined() {
        let blocks = vec![ContentBlock::text("  Hello "), ContentBlock::text("world\n\n")];
        assert_eq!(serialize(&blocks, RenderMode::Rendered, 0), "Hello\nworld");
    }

    #[test]
    fn held_bytes_are_hidden() {
        let blocks = vec![ContentBlock::text("Hello <th")];
        assert_eq!(serialize(&blocks, RenderMode::Rendered, 3), "Hello");
    }

    #[test]
    fn finished_reasoning_renders_details() {
        let blocks = vec![
            ContentBlock::text("Hello"),
            closed_reasoning("step one\n> quoted", 2),
            ContentBlock::text("world"),
        ];
        assert_eq!(
            serialize(&blocks, RenderMode::Rendered, 0),
            "Hello\n\n<details type=\"reasoning\" done=\"true\" duration=\"2\">\n<summary>Thought for 2 seconds</summary>\n> step one\n> quoted\n</details>\nworld"
        );
    }

    #[test]
    fn open_reasoning_renders_thinking() {
        let blocks = vec![ContentBlock::Reasoning(ReasoningBlock {
            tag: "think".into(),
            attributes: BTreeMap::new(),
            content: "hmm".into(),
            started_at: Utc::now(),
            ended_at: None,
        })];
        assert_eq!(
            serialize(&blocks, RenderMode::Rendered, 0),
            "<details type=\"reasoning\" done=\"false\">\n<summary>Thinking…</summary>\n> hmm\n</details>"
        );
    }

    #[test]
    fn raw_reasoning_restores_tags() {
        let blocks = vec![ContentBlock::text("Hello"), closed_reasoning("pondering", 1)];
        assert_eq!(serialize(&blocks, RenderMode::Raw, 0), "Hello\n\n<think>pondering</think>");
    }

    #[test]
    fn tool_group_renders_pending_and_executed() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "weather".into(),
            arguments: r#"{"city":"Oslo"}"#.into(),
        };
        let mut group = ToolCallGroup::pending(vec![call]);
        let pending = serialize(&[ContentBlock::ToolCalls(group.clone())], RenderMode::Rendered, 0);
        assert!(pending.starts_with("<details type=\"tool_calls\" done=\"false\" content=\"[{&quot;"));
        assert!(pending.contains("<summary>Tool Executing...</summary>\n\n> Executing weather\n</details>"));

        group.results = Some(vec![ToolResult {
            tool_call_id: "call_1".into(),
            content: "sunny".into(),
        }]);
        let done = serialize(&[ContentBlock::ToolCalls(group)], RenderMode::Rendered, 0);
        assert!(done.contains("done=\"true\""));
        assert!(done.contains("results=\"[{&quot;tool_call_id&quot;:&quot;call_1&quot;"));
        assert!(done.contains("<summary>Tool Executed</summary>\n\n> weather: sunny\n</details>"));
    }

    #[test]
    fn raw_mode_omits_tool_groups() {
        let blocks = vec![
            ContentBlock::text("Checking"),
            ContentBlock::ToolCalls(ToolCallGroup::pending(vec![ToolCall::default()])),
        ];
        assert_eq!(serialize(&blocks, RenderMode::Raw, 0), "Checking");
    }

    #[test]
    fn code_block_without_output() {
        let blocks = vec![code("print(1)", None)];
        assert_eq!(
            serialize(&blocks, RenderMode::Rendered, 0),
            "<details type=\"code_interpreter\" done=\"false\">\n<summary>Analyzing...</summary>\n```python\nprint(1)\n```\n</details>"
        );
        assert_eq!(
            serialize(&blocks, RenderMode::Raw, 0),
            "<code_interpreter lang=\"python\" type=\"code\">\nprint(1)\n</code_interpreter>"
        );
    }

    #[test]
    fn code_block_with_output() {
        let output = ExecutionOutput {
            success: true,
            stdout: "1\n".into(),
            ..Default::default()
        };
        let blocks = vec![code("print(1)", Some(output))];
        let rendered = serialize(&blocks, RenderMode::Rendered, 0);
        assert!(rendered.starts_with("<details type=\"code_interpreter\" done=\"true\" output=\"{&quot;success&quot;:true"));
        assert!(rendered.contains("<summary>Analyzed</summary>"));

        let raw = serialize(&blocks, RenderMode::Raw, 0);
        assert!(raw.contains("</code_interpreter>\n```output\n{\"success\":true,\"stdout\":\"1\\n\""));
        assert!(raw.ends_with("```"));
    }
}
