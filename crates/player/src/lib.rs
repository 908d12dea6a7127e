//! Playback of a meditation while it is still being synthesized
//!
//! The engine walks the document segment by segment, playing each one as
//! soon as its audio exists and waiting on it otherwise. Output and
//! prefetch are capabilities supplied by the host.

pub mod engine;
pub mod prefetch;
pub mod session;

pub use engine::{AudioOutput, AudioPrefetcher, PlaybackEngine, PlaybackEvent, PlayerState};
pub use prefetch::StoragePrefetcher;
pub use session::{PlayerCommand, PlayerSession};

use guided_audio_core::StorageError;
use thiserror::Error;

/// Player errors
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Failed to load segment {index}: {reason}")]
    Load { index: usize, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
