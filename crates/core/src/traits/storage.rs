//! Durable storage capability

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AudioRef, StorageError};

/// What a stored blob is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Synthesized narration for one segment
    Speech,
    /// Cached silence
    Silence,
    /// Final rendered meditation
    Asset,
}

/// Metadata saved alongside the bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub kind: AssetKind,
    pub content_type: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl AssetMeta {
    pub fn new(kind: AssetKind, content_type: impl Into<String>, duration_ms: Option<u64>) -> Self {
        Self {
            kind,
            content_type: content_type.into(),
            duration_ms,
            created_at: Utc::now(),
        }
    }

    pub fn wav(kind: AssetKind, duration_ms: Option<u64>) -> Self {
        Self::new(kind, "audio/wav", duration_ms)
    }

    /// File extension for the content type
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/mpeg" => "mp3",
            "audio/ogg" => "ogg",
            _ => "bin",
        }
    }
}

/// Stores and retrieves audio blobs by opaque reference
#[async_trait]
pub trait AudioStorage: Send + Sync {
    async fn save(&self, bytes: Vec<u8>, meta: AssetMeta) -> Result<AudioRef, StorageError>;

    async fn get(&self, id: &AudioRef) -> Result<Vec<u8>, StorageError>;

    async fn meta(&self, id: &AudioRef) -> Result<AssetMeta, StorageError>;
}
