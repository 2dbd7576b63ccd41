//! File-based artifact store.
//!
//! Each artifact is written to `<dir>/<id>` with its original name kept in
//! a sidecar `<id>.name` file.

use async_trait::async_trait;
use chatweave_core::error::StorageError;
use chatweave_core::storage::{ArtifactRef, ArtifactStore};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::artifact_url;

pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Store artifacts under `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Original file name of a stored artifact.
    pub async fn name_of(&self, id: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.dir.join(format!("{id}.name"))).await {
            Ok(name) => Ok(Some(name)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    fn blob_path(&self, id: &str) -> Option<PathBuf> {
        // ids are generated uuids; anything else cannot name a stored blob
        Uuid::parse_str(id).ok().map(|_| self.dir.join(id))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> Result<ArtifactRef, StorageError> {
        let id = Uuid::new_v4().to_string();
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        tokio::fs::write(self.dir.join(&id), &bytes)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        tokio::fs::write(self.dir.join(format!("{id}.name")), name)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;

        debug!(id = %id, name, size = bytes.len(), "Stored artifact");
        Ok(ArtifactRef {
            url: artifact_url(&id),
            id,
            name: name.to_string(),
        })
    }

    async fn fetch(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let Some(path) = self.blob_path(id) else {
            return Ok(None);
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}
