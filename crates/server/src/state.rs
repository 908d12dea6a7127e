//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use guided_audio_config::Settings;
use guided_audio_core::{AudioStorage, SpeechSynthesizer};
use guided_audio_persistence::create_storage;
use guided_audio_pipeline::{create_speech_synthesizer, SynthesisConfig, SynthesisOrchestrator};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: SynthesisOrchestrator,
    pub storage: Arc<dyn AudioStorage>,
    /// Present when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Build state from explicit backends
    pub fn new(
        settings: Settings,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        storage: Arc<dyn AudioStorage>,
    ) -> Self {
        let config = SynthesisConfig::from_settings(&settings);
        let orchestrator = SynthesisOrchestrator::new(config, synthesizer, storage.clone());
        Self {
            settings: Arc::new(settings),
            orchestrator,
            storage,
            metrics: None,
        }
    }

    /// Build state with the backends selected in `settings`
    pub async fn from_settings(settings: Settings) -> Result<Self, ServerError> {
        let storage = create_storage(&settings.storage)
            .await
            .map_err(|e| ServerError::Startup(e.to_string()))?;
        let synthesizer = create_speech_synthesizer(&settings.tts)
            .map_err(|e| ServerError::Startup(e.to_string()))?;
        Ok(Self::new(settings, synthesizer, storage))
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
