//! In-memory stores for tests and ephemeral sessions.

use async_trait::async_trait;
use chatweave_core::error::StorageError;
use chatweave_core::storage::{
    ArtifactRef, ArtifactStore, ChatFile, MessagePatch, MessageStore, StoredMessage,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::artifact_url;

#[derive(Debug, Default)]
struct ChatRecord {
    title: Option<String>,
    tags: Vec<String>,
    files: Vec<ChatFile>,
    messages: HashMap<String, StoredMessage>,
}

/// Messages and chat metadata held in a map keyed by chat id.
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    chats: Arc<RwLock<HashMap<String, ChatRecord>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags last written for a chat.
    pub async fn chat_tags(&self, chat_id: &str) -> Vec<String> {
        self.chats
            .read()
            .await
            .get(chat_id)
            .map(|c| c.tags.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn upsert_message(
        &self,
        chat_id: &str,
        message_id: &str,
        patch: MessagePatch,
    ) -> Result<(), StorageError> {
        let mut chats = self.chats.write().await;
        chats
            .entry(chat_id.to_string())
            .or_default()
            .messages
            .entry(message_id.to_string())
            .or_default()
            .apply(patch);
        Ok(())
    }

    async fn get_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<StoredMessage>, StorageError> {
        Ok(self
            .chats
            .read()
            .await
            .get(chat_id)
            .and_then(|c| c.messages.get(message_id))
            .cloned())
    }

    async fn add_message_status(
        &self,
        chat_id: &str,
        message_id: &str,
        status: serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut chats = self.chats.write().await;
        chats
            .entry(chat_id.to_string())
            .or_default()
            .messages
            .entry(message_id.to_string())
            .or_default()
            .status_history
            .push(status);
        Ok(())
    }

    async fn chat_title(&self, chat_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.chats.read().await.get(chat_id).and_then(|c| c.title.clone()))
    }

    async fn set_chat_title(&self, chat_id: &str, title: &str) -> Result<(), StorageError> {
        self.chats
            .write()
            .await
            .entry(chat_id.to_string())
            .or_default()
            .title = Some(title.to_string());
        Ok(())
    }

    async fn set_chat_tags(&self, chat_id: &str, tags: &[String]) -> Result<(), StorageError> {
        self.chats
            .write()
            .await
            .entry(chat_id.to_string())
            .or_default()
            .tags = tags.to_vec();
        Ok(())
    }

    async fn add_chat_file(&self, chat_id: &str, file: ChatFile) -> Result<(), StorageError> {
        self.chats
            .write()
            .await
            .entry(chat_id.to_string())
            .or_default()
            .files
            .push(file);
        Ok(())
    }

    async fn chat_files(&self, chat_id: &str) -> Result<Vec<ChatFile>, StorageError> {
        Ok(self
            .chats
            .read()
            .await
            .get(chat_id)
            .map(|c| c.files.clone())
            .unwrap_or_default())
    }
}

/// Artifacts kept in memory under generated ids.
#[derive(Clone, Default)]
pub struct InMemoryArtifactStore {
    blobs: Arc<RwLock<HashMap<String, (String, Vec<u8>)>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an artifact under a known id, e.g. an input attachment.
    pub async fn insert(&self, id: impl Into<String>, name: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.write().await.insert(id.into(), (name.into(), bytes));
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> Result<ArtifactRef, StorageError> {
        let id = Uuid::new_v4().to_string();
        self.blobs
            .write()
            .await
            .insert(id.clone(), (name.to_string(), bytes));
        Ok(ArtifactRef {
            url: artifact_url(&id),
            id,
            name: name.to_string(),
        })
    }

    async fn fetch(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.read().await.get(id).map(|(_, bytes)| bytes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_creates_then_patches() {
        let store = InMemoryMessageStore::new();
        store
            .upsert_message("chat", "msg", MessagePatch::content("Hello"))
            .await
            .unwrap();
        store
            .upsert_message("chat", "msg", MessagePatch::selected_model("gpt-4o"))
            .await
            .unwrap();

        let msg = store.get_message("chat", "msg").await.unwrap().unwrap();
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.selected_model_id.as_deref(), Some("gpt-4o"));
        assert!(store.get_message("chat", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_history_appends() {
        let store = InMemoryMessageStore::new();
        store
            .add_message_status("chat", "msg", serde_json::json!({"action": "a"}))
            .await
            .unwrap();
        store
            .add_message_status("chat", "msg", serde_json::json!({"action": "b"}))
            .await
            .unwrap();
        let msg = store.get_message("chat", "msg").await.unwrap().unwrap();
        assert_eq!(msg.status_history.len(), 2);
        assert_eq!(msg.status_history[1]["action"], "b");
    }

    #[tokio::test]
    async fn chat_metadata() {
        let store = InMemoryMessageStore::new();
        assert!(store.chat_title("chat").await.unwrap().is_none());
        store.set_chat_title("chat", "Weather talk").await.unwrap();
        store
            .set_chat_tags("chat", &["weather".to_string(), "oslo".to_string()])
            .await
            .unwrap();
        store
            .add_chat_file(
                "chat",
                ChatFile {
                    kind: "image".into(),
                    id: "f1".into(),
                    name: "plot.png".into(),
                    url: "/api/v1/files/f1/content".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(store.chat_title("chat").await.unwrap().as_deref(), Some("Weather talk"));
        assert_eq!(store.chat_tags("chat").await, vec!["weather", "oslo"]);
        assert_eq!(store.chat_files("chat").await.unwrap()[0].name, "plot.png");
    }

    #[tokio::test]
    async fn artifacts_upload_and_fetch() {
        let store = InMemoryArtifactStore::new();
        let artifact = store.upload(b"png-bytes".to_vec(), "plot.png").await.unwrap();
        assert_eq!(artifact.name, "plot.png");
        assert_eq!(artifact.url, format!("/api/v1/files/{}/content", artifact.id));
        assert_eq!(store.fetch(&artifact.id).await.unwrap().unwrap(), b"png-bytes");
        assert!(store.fetch("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seeded_artifact_is_fetchable() {
        let store = InMemoryArtifactStore::new();
        store.insert("input-1", "data.csv", b"a,b".to_vec()).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.fetch("input-1").await.unwrap().unwrap(), b"a,b");
    }
}
