//! Tool invocation: permissive argument parsing, dispatch through the
//! registry, and the resubmission turn that shows results to the model.
//!
//! Nothing here fails the batch. An unknown tool, unparsable arguments or
//! a tool error all become a result string the model can read.

use chatweave_core::error::ToolError;
use chatweave_core::message::Message;
use chatweave_core::tool::{ToolCall, ToolRegistry, ToolResult};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Parse model-written arguments into an object.
///
/// Accepts strict JSON first, then near-JSON with single quotes and
/// Python literals. Anything else, including a non-object, yields an
/// empty map.
pub fn parse_arguments(text: &str) -> Map<String, Value> {
    let text = text.trim();
    if text.is_empty() {
        return Map::new();
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return map;
    }
    match serde_json::from_str::<Value>(&normalize_near_json(text)) {
        Ok(Value::Object(map)) => map,
        _ => {
            debug!(arguments = %text, "Unparsable tool arguments, using none");
            Map::new()
        }
    }
}

/// Rewrite single-quoted strings and `True`/`False`/`None` outside of
/// strings into their JSON spelling.
fn normalize_near_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        match word.as_str() {
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            "None" => out.push_str("null"),
            _ => out.push_str(word),
        }
        word.clear();
    };

    for c in text.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
                if q == '\'' && c == '\'' {
                    out.push('\'');
                    continue;
                }
                out.push('\\');
                out.push(c);
                continue;
            }
            match c {
                '\\' => escaped = true,
                _ if c == q => {
                    out.push('"');
                    quote = None;
                }
                '"' => out.push_str("\\\""),
                _ => out.push(c),
            }
            continue;
        }

        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        flush(&mut word, &mut out);
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push('"');
            }
            _ => out.push(c),
        }
    }
    flush(&mut word, &mut out);
    out
}

/// Keep only the arguments named in `required`.
pub fn filter_required(arguments: Map<String, Value>, required: &[String]) -> Map<String, Value> {
    arguments
        .into_iter()
        .filter(|(k, _)| required.iter().any(|r| r == k))
        .collect()
}

/// Execute one call. Always produces a result.
pub async fn execute_call(registry: &ToolRegistry, call: &ToolCall) -> ToolResult {
    let content = match registry.get(&call.name) {
        None => {
            warn!(tool = %call.name, "Model requested an unknown tool");
            ToolError::NotFound(call.name.clone()).to_string()
        }
        Some(tool) => {
            let arguments = filter_required(parse_arguments(&call.arguments), &tool.required_parameters());
            match tool.execute(arguments).await {
                Ok(Value::String(s)) => s,
                Ok(value) => value.to_string(),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool execution failed");
                    e.to_string()
                }
            }
        }
    };

    ToolResult {
        tool_call_id: call.id.clone(),
        content,
    }
}

/// Execute a batch in order.
pub async fn execute_tool_calls(registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        results.push(execute_call(registry, call).await);
    }
    results
}

/// History for the next upstream request: the prior conversation, the
/// assistant turn so far with its tool calls, then one tool turn per result.
pub fn resubmission_messages(
    history: &[Message],
    raw_content: String,
    calls: Vec<ToolCall>,
    results: &[ToolResult],
) -> Vec<Message> {
    let mut messages = history.to_vec();
    messages.push(Message::assistant(raw_content).with_tool_calls(calls));
    messages.extend(
        results
            .iter()
            .map(|r| Message::tool_result(r.tool_call_id.clone(), r.content.clone())),
    );
    messages
}
