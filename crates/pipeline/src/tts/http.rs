//! OpenAI-compatible speech endpoint

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use guided_audio_core::{CancellationToken, SpeechSynthesizer, SynthesisError, VoiceSettings};

use crate::PipelineError;

/// Longest error body kept in messages
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
}

/// Speech backend calling a `/v1/audio/speech` style endpoint for WAV output
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    default_model: String,
}

impl HttpSpeechSynthesizer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Tts(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            default_model: default_model.into(),
        })
    }

    async fn request(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>, SynthesisError> {
        let body = SpeechRequest {
            model: voice.model.as_deref().unwrap_or(&self.default_model),
            input: text,
            voice: &voice.voice,
            speed: voice.speed,
            response_format: "wav",
            instructions: voice.instructions.as_deref(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SynthesisError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            return Err(SynthesisError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Request(e.to_string()))?;

        if !bytes.starts_with(b"RIFF") {
            return Err(SynthesisError::InvalidAudio(format!(
                "Expected WAV, got {} bytes of something else",
                bytes.len()
            )));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let started = std::time::Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(SynthesisError::Cancelled),
            result = self.request(text, voice) => result,
        };

        match &result {
            Ok(bytes) => tracing::debug!(
                chars = text.len(),
                bytes = bytes.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Speech synthesized"
            ),
            Err(SynthesisError::Cancelled) => tracing::debug!("Speech request cancelled"),
            Err(e) => tracing::warn!(error = %e, "Speech request failed"),
        }
        result
    }

    fn name(&self) -> &str {
        "http"
    }
}
