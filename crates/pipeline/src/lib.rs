//! Incremental synthesis pipeline for guided meditations
//!
//! This crate turns a streamed script into one rendered audio asset:
//! - Incremental parsing of a partially formed document
//! - Bounded-concurrency speech generation with cached silence
//! - Timeline layout with gaps and a closing cue
//! - Sample-accurate composition of the final asset
//! - Orchestration with a structured event stream

pub mod composer;
pub mod events;
pub mod gate;
pub mod generator;
pub mod input;
pub mod orchestrator;
pub mod parser;
pub mod session;
pub mod timeline;
pub mod tts;
pub mod wav;

pub use composer::{AudioComposer, ComposeError, ComposedAsset, ComposerConfig};
pub use events::SynthesisEvent;
pub use gate::ConcurrencyGate;
pub use generator::{GeneratedAudio, SegmentGenerator, SilenceCache};
pub use input::text_chunks;
pub use orchestrator::{
    RunOutcome, RunState, SynthesisConfig, SynthesisHandle, SynthesisOrchestrator,
};
pub use parser::{IncrementalDocumentParser, ParseUpdate, RejectedSegment};
pub use session::{start_synthesis, SynthesisListener};
pub use timeline::{build_timeline, GapPolicy, TimelineBuilder};
pub use tts::{create_speech_synthesizer, HttpSpeechSynthesizer, StubSpeechSynthesizer};

use guided_audio_core::{StorageError, SynthesisError};
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Composition error: {0}")]
    Compose(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<SynthesisError> for PipelineError {
    fn from(err: SynthesisError) -> Self {
        match err {
            SynthesisError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Tts(other.to_string()),
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<hound::Error> for PipelineError {
    fn from(err: hound::Error) -> Self {
        PipelineError::Audio(err.to_string())
    }
}

impl From<ComposeError> for PipelineError {
    fn from(err: ComposeError) -> Self {
        PipelineError::Compose(err.to_string())
    }
}

impl From<PipelineError> for guided_audio_core::Error {
    fn from(err: PipelineError) -> Self {
        guided_audio_core::Error::Other(err.to_string())
    }
}
