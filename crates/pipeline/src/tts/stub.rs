//! Stub backend producing a quiet tone

use std::time::Duration;

use async_trait::async_trait;

use guided_audio_config::OutputEncoding;
use guided_audio_core::{CancellationToken, SpeechSynthesizer, SynthesisError, VoiceSettings};

use crate::wav;

/// Tone frequency of the stub voice
const STUB_TONE_HZ: f32 = 220.0;
const STUB_AMPLITUDE: f32 = 0.05;

/// Stub backend when no real engine is configured
///
/// Produces ~50ms of audio per character so timelines look realistic.
pub struct StubSpeechSynthesizer {
    sample_rate: u32,
    latency: Duration,
}

impl StubSpeechSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        tracing::warn!("Using stub speech backend - narration will be a placeholder tone");
        Self {
            sample_rate,
            latency: Duration::ZERO,
        }
    }

    /// Simulate backend latency per request
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn render(&self, text: &str) -> Vec<f32> {
        let len = text.chars().count() * (self.sample_rate as usize / 20);
        let step = 2.0 * std::f32::consts::PI * STUB_TONE_HZ / self.sample_rate as f32;
        (0..len).map(|i| (i as f32 * step).sin() * STUB_AMPLITUDE).collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for StubSpeechSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSettings,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        if !self.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }

        wav::encode(&self.render(text), self.sample_rate, OutputEncoding::Pcm16)
            .map_err(|e| SynthesisError::InvalidAudio(e.to_string()))
    }

    fn name(&self) -> &str {
        "stub"
    }
}
