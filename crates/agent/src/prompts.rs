//! Prompt templates for post-completion tasks.

use chatweave_core::message::{Message, Role};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Number of trailing messages shown to the title task.
pub const TITLE_HISTORY: usize = 2;

/// Number of trailing messages shown to the tags task.
pub const TAGS_HISTORY: usize = 6;

pub const TITLE_PROMPT: &str = "### Task:
Generate a concise, 3-5 word title with an emoji summarizing the chat history.

### Guidelines:
- The title should clearly represent the main theme or subject of the conversation.
- Write the title in the chat's primary language; default to English if multilingual.
- Prioritize accuracy over excessive creativity; keep it clear and simple.

### Output:
JSON format: { \"title\": \"your concise title here\" }

### Chat History:
<chat_history>
{{MESSAGES}}
</chat_history>";

pub const TAGS_PROMPT: &str = "### Task:
Generate 1-3 broad tags categorizing the main themes of the chat history, along with 1-3 more specific subtopic tags.

### Guidelines:
- Start with high-level domains (e.g. Science, Technology, Health, Programming).
- Only include specific subtopics if they are strongly represented.
- Use the chat's primary language; default to English if multilingual.
- If content is too short (less than 3 messages) or too diverse, use only [\"General\"].

### Output:
JSON format: { \"tags\": [\"tag1\", \"tag2\", \"tag3\"] }

### Chat History:
<chat_history>
{{MESSAGES}}
</chat_history>";

static REASONING_DETAILS_RE: OnceLock<Regex> = OnceLock::new();

fn reasoning_details_re() -> &'static Regex {
    REASONING_DETAILS_RE.get_or_init(|| {
        Regex::new(r#"(?s)<details\s+type="reasoning"[^>]*>.*?</details>"#).expect("valid reasoning pattern")
    })
}

/// Remove rendered reasoning blocks from message content.
pub fn strip_reasoning(content: &str) -> String {
    reasoning_details_re().replace_all(content, "").trim().to_string()
}

/// Render the last `last_n` non-system messages as `ROLE: content` lines.
pub fn render_history(messages: &[Message], last_n: usize) -> String {
    let visible: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();
    let start = visible.len().saturating_sub(last_n);
    visible[start..]
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
                Role::System => "SYSTEM",
                Role::Tool => "TOOL",
            };
            format!("{role}: {}", strip_reasoning(&m.content))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn title_prompt(messages: &[Message]) -> String {
    TITLE_PROMPT.replace("{{MESSAGES}}", &render_history(messages, TITLE_HISTORY))
}

pub fn tags_prompt(messages: &[Message]) -> String {
    TAGS_PROMPT.replace("{{MESSAGES}}", &render_history(messages, TAGS_HISTORY))
}
