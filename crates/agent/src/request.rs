//! Inputs and outputs of one completion.

use chatweave_core::execution::StagedFile;
use chatweave_core::message::Message;
use chatweave_core::session::SessionId;
use serde::{Deserialize, Serialize};

/// A completion requested for one assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,

    #[serde(default = "default_stream")]
    pub stream: bool,

    pub chat_id: String,
    pub message_id: String,

    /// Session that issued the request; always receives live events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Files attached to the chat, staged for code execution.
    #[serde(default)]
    pub files: Vec<AttachedFile>,

    /// Images attached to the request, already base64 encoded.
    #[serde(default)]
    pub images: Vec<StagedFile>,

    #[serde(default)]
    pub features: Features,
}

fn default_stream() -> bool {
    true
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        chat_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            chat_id: chat_id.into(),
            message_id: message_id.into(),
            session_id: None,
            files: Vec::new(),
            images: Vec::new(),
            features: Features::default(),
        }
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session_id = Some(session);
        self
    }

    pub fn with_code_interpreter(mut self, enabled: bool) -> Self {
        self.features.code_interpreter = enabled;
        self
    }

    pub fn with_files(mut self, files: Vec<AttachedFile>) -> Self {
        self.files = files;
        self
    }
}

/// A reference to a stored file attached to the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    /// "file", "image", "collection", "web_search_results", ...
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub id: String,
    pub name: String,
}

fn default_kind() -> String {
    "file".into()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub code_interpreter: bool,
}

/// Optional work after a clean completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessFlags {
    #[serde(default)]
    pub title_generation: bool,
    #[serde(default)]
    pub tags_generation: bool,
}

/// What [`crate::ResponseOrchestrator::run_completion`] hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// A background task is assembling the streamed answer.
    Spawned { task_id: String },

    /// The upstream answered in one piece; it is already stored.
    Direct { content: String },
}
