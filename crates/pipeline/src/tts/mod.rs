//! Speech synthesis backends
//!
//! - `http`: OpenAI-compatible `/audio/speech` endpoint
//! - `stub`: deterministic local tone, for development and tests

mod http;
mod stub;

pub use http::HttpSpeechSynthesizer;
pub use stub::StubSpeechSynthesizer;

use std::sync::Arc;
use std::time::Duration;

use guided_audio_config::{TtsEngine, TtsSettings};
use guided_audio_core::SpeechSynthesizer;

use crate::PipelineError;

/// Create the configured speech backend
pub fn create_speech_synthesizer(
    settings: &TtsSettings,
) -> Result<Arc<dyn SpeechSynthesizer>, PipelineError> {
    match settings.engine {
        TtsEngine::Http => {
            let backend = HttpSpeechSynthesizer::new(
                settings.endpoint.clone(),
                settings.api_key.clone(),
                settings.model.clone(),
                Duration::from_millis(settings.request_timeout_ms),
            )?;
            tracing::info!(
                endpoint = %settings.endpoint,
                model = %settings.model,
                "Using HTTP speech backend"
            );
            Ok(Arc::new(backend))
        }
        TtsEngine::Stub => Ok(Arc::new(StubSpeechSynthesizer::new(settings.stub_sample_rate))),
    }
}
