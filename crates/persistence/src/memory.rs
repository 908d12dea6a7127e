//! In-memory storage

use async_trait::async_trait;
use dashmap::DashMap;

use guided_audio_core::{AssetKind, AssetMeta, AudioRef, AudioStorage, StorageError};

struct StoredBlob {
    bytes: Vec<u8>,
    meta: AssetMeta,
}

/// Process-local blob store
#[derive(Default)]
pub struct InMemoryStorage {
    blobs: DashMap<AudioRef, StoredBlob>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Number of stored blobs of one kind
    pub fn count_kind(&self, kind: AssetKind) -> usize {
        self.blobs.iter().filter(|blob| blob.meta.kind == kind).count()
    }
}

#[async_trait]
impl AudioStorage for InMemoryStorage {
    async fn save(&self, bytes: Vec<u8>, meta: AssetMeta) -> Result<AudioRef, StorageError> {
        let id = AudioRef::new(crate::new_id());
        tracing::trace!(id = %id, bytes = bytes.len(), kind = ?meta.kind, "Stored blob");
        self.blobs.insert(id.clone(), StoredBlob { bytes, meta });
        Ok(id)
    }

    async fn get(&self, id: &AudioRef) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .get(id)
            .map(|blob| blob.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn meta(&self, id: &AudioRef) -> Result<AssetMeta, StorageError> {
        self.blobs
            .get(id)
            .map(|blob| blob.meta.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}
