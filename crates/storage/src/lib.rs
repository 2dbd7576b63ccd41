//! Storage implementations for Chatweave.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FsArtifactStore;
pub use in_memory::{InMemoryArtifactStore, InMemoryMessageStore};

/// Public URL under which an artifact is served.
pub fn artifact_url(id: &str) -> String {
    format!("/api/v1/files/{id}/content")
}
