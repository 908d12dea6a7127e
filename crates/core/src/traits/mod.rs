//! Capability traits for external collaborators

mod speech;
mod storage;

pub use speech::SpeechSynthesizer;
pub use storage::{AssetKind, AssetMeta, AudioStorage};
