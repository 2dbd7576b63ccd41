//! Durable storage traits for messages, chat metadata and artifacts.
//!
//! The completion pipeline only needs partial upserts keyed by
//! `(chat_id, message_id)`, a few chat-level fields, and a blob store for
//! files produced by code execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::StorageError;
use crate::event::SourceCitation;

/// The persisted state of one assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceCitation>,

    #[serde(default, rename = "selectedModelId", skip_serializing_if = "Option::is_none")]
    pub selected_model_id: Option<String>,

    #[serde(default, rename = "statusHistory", skip_serializing_if = "Vec::is_empty")]
    pub status_history: Vec<serde_json::Value>,
}

impl StoredMessage {
    /// Merge a partial update; absent fields are left untouched.
    pub fn apply(&mut self, patch: MessagePatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(sources) = patch.sources {
            self.sources = sources;
        }
        if let Some(model) = patch.selected_model_id {
            self.selected_model_id = Some(model);
        }
    }
}

/// A partial update to a [`StoredMessage`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub sources: Option<Vec<SourceCitation>>,
    pub selected_model_id: Option<String>,
}

impl MessagePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_sources(mut self, sources: Vec<SourceCitation>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn selected_model(model: impl Into<String>) -> Self {
        Self {
            selected_model_id: Some(model.into()),
            ..Default::default()
        }
    }
}

/// A file registered against a chat so later turns can reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFile {
    /// "image" or "file"
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    pub url: String,
}

/// A durable reference to an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Persistence of chat messages and chat-level metadata.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create or partially update a message.
    async fn upsert_message(
        &self,
        chat_id: &str,
        message_id: &str,
        patch: MessagePatch,
    ) -> std::result::Result<(), StorageError>;

    /// Fetch a message, if it exists.
    async fn get_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> std::result::Result<Option<StoredMessage>, StorageError>;

    /// Append a status entry to a message's status history.
    async fn add_message_status(
        &self,
        chat_id: &str,
        message_id: &str,
        status: serde_json::Value,
    ) -> std::result::Result<(), StorageError>;

    async fn chat_title(&self, chat_id: &str) -> std::result::Result<Option<String>, StorageError>;

    async fn set_chat_title(&self, chat_id: &str, title: &str) -> std::result::Result<(), StorageError>;

    async fn set_chat_tags(&self, chat_id: &str, tags: &[String]) -> std::result::Result<(), StorageError>;

    /// Register a produced file on the chat's file list.
    async fn add_chat_file(&self, chat_id: &str, file: ChatFile) -> std::result::Result<(), StorageError>;

    async fn chat_files(&self, chat_id: &str) -> std::result::Result<Vec<ChatFile>, StorageError>;
}

/// A blob store for input attachments and produced files.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> std::result::Result<ArtifactRef, StorageError>;

    async fn fetch(&self, id: &str) -> std::result::Result<Option<Vec<u8>>, StorageError>;
}
