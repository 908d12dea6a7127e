//! Storage layer for guided audio
//!
//! Provides [`AudioStorage`] implementations for:
//! - In-memory blobs (tests, single-process deployments)
//! - Filesystem blobs with JSON metadata sidecars

pub mod fs;
pub mod memory;

pub use fs::FsStorage;
pub use memory::InMemoryStorage;

use std::sync::Arc;

use guided_audio_config::{StorageBackend, StorageConfig};
use guided_audio_core::{AudioStorage, StorageError};

/// Create the storage backend selected in config
pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn AudioStorage>, StorageError> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory audio storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        StorageBackend::Filesystem => {
            let storage = FsStorage::open(&config.root).await?;
            tracing::info!(root = %config.root, "Using filesystem audio storage");
            Ok(Arc::new(storage))
        }
    }
}

/// Generate a fresh opaque id
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
