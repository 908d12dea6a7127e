//! Filesystem storage
//!
//! Each blob is written as `<root>/<id>.<ext>` next to a `<root>/<id>.json`
//! metadata sidecar. Ids are UUIDs generated here; anything else is rejected
//! before touching the filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use guided_audio_core::{AssetMeta, AudioRef, AudioStorage, StorageError};

/// Blob store rooted at a directory
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Open (and create if needed) the storage root
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    fn blob_path(&self, id: &str, meta: &AssetMeta) -> PathBuf {
        self.root.join(format!("{}.{}", id, meta.extension()))
    }

    fn validate_id(id: &AudioRef) -> Result<&str, StorageError> {
        let raw = id.as_str();
        if uuid::Uuid::parse_str(raw).is_err() {
            return Err(StorageError::InvalidId(raw.to_string()));
        }
        Ok(raw)
    }

    async fn read_meta(&self, id: &str) -> Result<AssetMeta, StorageError> {
        let path = self.meta_path(id);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl AudioStorage for FsStorage {
    async fn save(&self, bytes: Vec<u8>, meta: AssetMeta) -> Result<AudioRef, StorageError> {
        let id = crate::new_id();

        // Blob first: a sidecar is only ever visible for a complete blob
        fs::write(self.blob_path(&id, &meta), &bytes).await?;
        fs::write(self.meta_path(&id), serde_json::to_vec(&meta)?).await?;

        tracing::debug!(id = %id, bytes = bytes.len(), kind = ?meta.kind, "Wrote blob");
        Ok(AudioRef::new(id))
    }

    async fn get(&self, id: &AudioRef) -> Result<Vec<u8>, StorageError> {
        let raw = Self::validate_id(id)?;
        let meta = self.read_meta(raw).await?;
        match fs::read(self.blob_path(raw, &meta)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(raw.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn meta(&self, id: &AudioRef) -> Result<AssetMeta, StorageError> {
        let raw = Self::validate_id(id)?;
        self.read_meta(raw).await
    }
}
