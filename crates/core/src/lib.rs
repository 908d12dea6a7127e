//! Core traits and types for guided audio synthesis
//!
//! This crate provides foundational types used across all other crates:
//! - Script segments and the incrementally built document
//! - Timings and the derived timeline
//! - Opaque audio references (including error sentinels)
//! - Capability traits for speech synthesis and storage
//! - Error types

pub mod audio_ref;
pub mod error;
pub mod segment;
pub mod timing;
pub mod traits;
pub mod voice;

pub use audio_ref::AudioRef;
pub use error::{Error, Result, StorageError, SynthesisError};
pub use segment::{Document, Segment, SegmentKind};
pub use timing::{Timeline, Timing, TimingKind};
pub use traits::{AssetKind, AssetMeta, AudioStorage, SpeechSynthesizer};
pub use voice::VoiceSettings;

/// Re-exported so implementors of the capability traits share one token type
pub use tokio_util::sync::CancellationToken;
