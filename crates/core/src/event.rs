//! Live chat events delivered to connected sessions.
//!
//! Every event is wrapped in an [`EventEnvelope`] addressing the chat and
//! message it belongs to. The event itself serializes as `{type, data}`.

use serde::{Deserialize, Serialize};

/// A citation attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub source: SourceName,
    pub document: Vec<String>,
    pub metadata: Vec<SourceMetadata>,
    pub distances: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source: String,
}

impl SourceCitation {
    /// A citation for a bare URL returned by the upstream.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            source: SourceName { name: url.clone() },
            document: vec![url.clone()],
            metadata: vec![SourceMetadata { source: url }],
            distances: vec![0.0],
        }
    }
}

/// Payload of a `chat:completion` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceCitation>>,
}

impl CompletionData {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn finished(content: impl Into<String>, title: Option<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: true,
            title,
            sources: None,
        }
    }

    pub fn sources(sources: Vec<SourceCitation>) -> Self {
        Self {
            sources: Some(sources),
            ..Default::default()
        }
    }
}

/// Captured result of a code execution, as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeExecutionResult {
    pub output: String,
    pub error: String,
    pub files: Vec<crate::execution::ProducedFile>,
}

/// Progress of one code execution, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeExecutionEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    pub language: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CodeExecutionResult>,
}

impl CodeExecutionEvent {
    pub fn python(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            kind: "code_execution".into(),
            id: id.into(),
            name: "Python Execution".into(),
            language: "Python".into(),
            code: code.into(),
            result: None,
        }
    }

    pub fn with_result(mut self, result: CodeExecutionResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// All live events a completion can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// Incremental or final completion state
    #[serde(rename = "chat:completion")]
    Completion(CompletionData),

    /// A progress/status entry
    #[serde(rename = "status")]
    Status(serde_json::Value),

    /// Content to append to the stored message
    #[serde(rename = "message")]
    Message { content: String },

    /// Content replacing the stored message
    #[serde(rename = "replace")]
    Replace { content: String },

    /// Code execution progress
    #[serde(rename = "source")]
    Source(CodeExecutionEvent),

    #[serde(rename = "chat:title")]
    Title(String),

    #[serde(rename = "chat:tags")]
    Tags(Vec<String>),

    /// The owning task was cancelled
    #[serde(rename = "task-cancelled")]
    TaskCancelled,
}

impl ChatEvent {
    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::Completion(_) => "chat:completion",
            ChatEvent::Status(_) => "status",
            ChatEvent::Message { .. } => "message",
            ChatEvent::Replace { .. } => "replace",
            ChatEvent::Source(_) => "source",
            ChatEvent::Title(_) => "chat:title",
            ChatEvent::Tags(_) => "chat:tags",
            ChatEvent::TaskCancelled => "task-cancelled",
        }
    }
}

/// An event addressed to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub chat_id: String,
    pub message_id: String,
    pub data: ChatEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_event_serializes_type_and_data() {
        let event = ChatEvent::Completion(CompletionData::content("Hello"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chat:completion");
        assert_eq!(json["data"]["content"], "Hello");
        assert!(json["data"].get("done").is_none());
    }

    #[test]
    fn cancelled_event_has_no_data() {
        let json = serde_json::to_value(ChatEvent::TaskCancelled).unwrap();
        assert_eq!(json, serde_json::json!({"type": "task-cancelled"}));
    }

    #[test]
    fn event_type_matches_wire_name() {
        let events = vec![
            ChatEvent::Completion(CompletionData::default()),
            ChatEvent::Status(serde_json::json!({"done": false})),
            ChatEvent::Message { content: "x".into() },
            ChatEvent::Replace { content: "x".into() },
            ChatEvent::Source(CodeExecutionEvent::python("id", "print(1)")),
            ChatEvent::Title("t".into()),
            ChatEvent::Tags(vec![]),
            ChatEvent::TaskCancelled,
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn code_execution_event_shape() {
        let event = CodeExecutionEvent::python("abc", "print(1)");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "code_execution");
        assert_eq!(json["name"], "Python Execution");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn url_citation_mirrors_url() {
        let c = SourceCitation::from_url("https://example.com");
        assert_eq!(c.source.name, "https://example.com");
        assert_eq!(c.document, vec!["https://example.com".to_string()]);
        assert_eq!(c.metadata[0].source, "https://example.com");
        assert_eq!(c.distances, vec![0.0]);
    }
}
