//! Per-segment audio generation
//!
//! Speech goes through the speech backend, is measured from its WAV header
//! and saved to storage. Pause and sound segments resolve to cached silence.
//! Every failure is folded into an error-sentinel reference so a segment
//! always ends up with some `audio_ref`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use guided_audio_core::{
    AssetKind, AssetMeta, AudioRef, AudioStorage, CancellationToken, Segment, SegmentKind,
    SpeechSynthesizer, VoiceSettings,
};

use crate::{wav, PipelineError};

/// Outcome of generating one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAudio {
    pub audio_ref: AudioRef,
    pub duration_ms: Option<u64>,
}

impl GeneratedAudio {
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            audio_ref: AudioRef::error(reason),
            duration_ms: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.audio_ref.is_error()
    }
}

/// Silence assets keyed by whole seconds
///
/// Each key is created at most once, even under concurrent requests. The
/// cache belongs to one storage backend and can be shared across runs.
pub struct SilenceCache {
    storage: Arc<dyn AudioStorage>,
    sample_rate: u32,
    entries: Mutex<HashMap<u64, AudioRef>>,
}

impl SilenceCache {
    pub fn new(storage: Arc<dyn AudioStorage>, sample_rate: u32) -> Self {
        Self {
            storage,
            sample_rate,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Silence for `seconds`, rounded to whole seconds
    pub async fn get_or_create(&self, seconds: f64) -> Result<GeneratedAudio, PipelineError> {
        let key = seconds.max(0.0).round() as u64;
        let duration_ms = key * 1000;

        // Held across creation so a key is never written twice
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(&key) {
            metrics::counter!("guided_audio_silence_cache_hits_total").increment(1);
            return Ok(GeneratedAudio {
                audio_ref: existing.clone(),
                duration_ms: Some(duration_ms),
            });
        }

        let bytes = wav::silence(duration_ms, self.sample_rate)?;
        let audio_ref = self
            .storage
            .save(bytes, AssetMeta::wav(AssetKind::Silence, Some(duration_ms)))
            .await?;
        tracing::debug!(seconds = key, audio_ref = %audio_ref, "Created silence asset");

        entries.insert(key, audio_ref.clone());
        Ok(GeneratedAudio {
            audio_ref,
            duration_ms: Some(duration_ms),
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Generates audio for one segment at a time
pub struct SegmentGenerator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    storage: Arc<dyn AudioStorage>,
    silence: Arc<SilenceCache>,
    voice: VoiceSettings,
}

impl SegmentGenerator {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        storage: Arc<dyn AudioStorage>,
        silence: Arc<SilenceCache>,
        voice: VoiceSettings,
    ) -> Self {
        Self {
            synthesizer,
            storage,
            silence,
            voice,
        }
    }

    /// Generate audio for `segment`; never fails, errors become sentinels
    pub async fn generate(
        &self,
        index: usize,
        segment: &Segment,
        cancel: &CancellationToken,
    ) -> GeneratedAudio {
        let started = std::time::Instant::now();
        let kind = segment.type_name();
        let result = match &segment.kind {
            SegmentKind::Speech { text } => self.speech(text, cancel).await,
            SegmentKind::Pause { duration, .. } | SegmentKind::Sound { duration, .. } => {
                self.silence.get_or_create(*duration).await
            }
            _ => Err(PipelineError::InvalidSegment(format!(
                "{} segments carry no audio",
                kind
            ))),
        };

        match result {
            Ok(audio) => {
                metrics::counter!("guided_audio_segments_generated_total", "kind" => kind)
                    .increment(1);
                if segment.is_speech() {
                    metrics::histogram!("guided_audio_speech_generation_seconds")
                        .record(started.elapsed().as_secs_f64());
                }
                tracing::debug!(index, kind, audio_ref = %audio.audio_ref, "Segment audio ready");
                audio
            }
            Err(e) => {
                metrics::counter!("guided_audio_segments_failed_total", "kind" => kind)
                    .increment(1);
                tracing::warn!(index, kind, error = %e, "Segment generation failed");
                GeneratedAudio::failed(e)
            }
        }
    }

    async fn speech(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<GeneratedAudio, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let bytes = self.synthesizer.synthesize(text, &self.voice, cancel).await?;

        let duration_ms = match wav::duration_ms(&bytes) {
            Ok(ms) => Some(ms),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backend = self.synthesizer.name(),
                    "Could not measure speech duration"
                );
                None
            }
        };

        let audio_ref = self
            .storage
            .save(bytes, AssetMeta::wav(AssetKind::Speech, duration_ms))
            .await?;

        Ok(GeneratedAudio { audio_ref, duration_ms })
    }
}
