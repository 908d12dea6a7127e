//! Final asset composition
//!
//! Renders a timeline into one mono buffer at the output rate: speech is
//! decoded and resampled, pauses and gaps become exact silence, sound
//! segments use their audio when present, and the cue is a soft chime.
//! Rendering is CPU-bound and synchronous; callers run it on a blocking
//! thread and receive progress through a callback.

use std::collections::HashMap;

use thiserror::Error;

use guided_audio_config::{constants, AudioSettings, OutputEncoding};
use guided_audio_core::{Timeline, Timing, TimingKind};

use crate::wav;

/// Composition failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("Failed to decode audio for segment {index}: {reason}")]
    Decode { index: usize, reason: String },

    #[error("No audio supplied for segment {index}")]
    MissingSource { index: usize },

    #[error("Failed to encode output: {0}")]
    Encode(String),
}

/// Output format and cue sound
#[derive(Debug, Clone, PartialEq)]
pub struct ComposerConfig {
    pub sample_rate: u32,
    pub encoding: OutputEncoding,
    pub cue_frequency_hz: f32,
    pub cue_amplitude: f32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            sample_rate: constants::audio::SAMPLE_RATE,
            encoding: OutputEncoding::default(),
            cue_frequency_hz: constants::audio::CUE_FREQUENCY_HZ,
            cue_amplitude: constants::audio::CUE_AMPLITUDE,
        }
    }
}

impl From<&AudioSettings> for ComposerConfig {
    fn from(settings: &AudioSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            encoding: settings.encoding,
            ..Default::default()
        }
    }
}

/// Rendered asset
#[derive(Debug, Clone)]
pub struct ComposedAsset {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub sample_count: usize,
    pub duration_ms: u64,
}

/// Timeline renderer
#[derive(Debug, Clone, Default)]
pub struct AudioComposer {
    config: ComposerConfig,
}

impl AudioComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Render `timeline` using encoded audio per segment index
    ///
    /// `progress` receives non-decreasing values in 0..=100: the first half
    /// covers decoding and placement, the second half encoding.
    pub fn compose(
        &self,
        timeline: &Timeline,
        sources: &HashMap<usize, Vec<u8>>,
        mut progress: impl FnMut(u8),
    ) -> Result<ComposedAsset, ComposeError> {
        let rate = self.config.sample_rate;
        progress(0);

        let expected = wav::samples_for(timeline.total_duration_ms, rate);
        let mut rendered: Vec<f32> = Vec::with_capacity(expected);
        let total = timeline.timings.len().max(1);
        for (i, timing) in timeline.timings.iter().enumerate() {
            let block = self.render_timing(timing, sources)?;
            rendered.extend_from_slice(&block);
            progress(((i + 1) * 50 / total) as u8);
        }

        progress(50);
        let bytes = wav::encode(&rendered, rate, self.config.encoding)
            .map_err(|e| ComposeError::Encode(e.to_string()))?;
        progress(100);

        Ok(ComposedAsset {
            bytes,
            sample_rate: rate,
            sample_count: rendered.len(),
            duration_ms: timeline.total_duration_ms,
        })
    }

    fn render_timing(
        &self,
        timing: &Timing,
        sources: &HashMap<usize, Vec<u8>>,
    ) -> Result<Vec<f32>, ComposeError> {
        let rate = self.config.sample_rate;
        // Sample bounds come from absolute times so rounding never accumulates
        let len = wav::samples_for(timing.end_ms, rate) - wav::samples_for(timing.start_ms, rate);

        match (timing.kind, timing.segment_index) {
            (TimingKind::Gap, _) | (TimingKind::Pause, _) => Ok(vec![0.0; len]),
            (TimingKind::Cue, _) => Ok(self.chime(len)),
            (TimingKind::Sound, Some(index)) => match sources.get(&index) {
                Some(bytes) => Ok(wav::fit_to_length(self.decode(index, bytes)?, len)),
                None => Ok(vec![0.0; len]),
            },
            (TimingKind::Speech, Some(index)) => {
                let bytes = sources.get(&index).ok_or(ComposeError::MissingSource { index })?;
                // Measured durations are whole milliseconds; keep the grid exact
                Ok(wav::fit_to_length(self.decode(index, bytes)?, len))
            }
            (TimingKind::Sound, None) | (TimingKind::Speech, None) => Ok(vec![0.0; len]),
        }
    }

    /// Decode and resample to the output rate
    fn decode(&self, index: usize, bytes: &[u8]) -> Result<Vec<f32>, ComposeError> {
        let decoded = wav::decode(bytes).map_err(|e| ComposeError::Decode {
            index,
            reason: e.to_string(),
        })?;
        wav::resample(&decoded.samples, decoded.sample_rate, self.config.sample_rate).map_err(|e| {
            ComposeError::Decode {
                index,
                reason: e.to_string(),
            }
        })
    }

    /// Bell-like tone with a short attack and exponential decay
    fn chime(&self, len: usize) -> Vec<f32> {
        let rate = self.config.sample_rate as f32;
        let freq = self.config.cue_frequency_hz;
        let amplitude = self.config.cue_amplitude;
        let seconds = len as f32 / rate;

        (0..len)
            .map(|i| {
                let t = i as f32 / rate;
                let attack = (t / 0.01).min(1.0);
                let decay = (-4.0 * t / seconds.max(f32::EPSILON)).exp();
                let phase = 2.0 * std::f32::consts::PI * freq * t;
                // Fundamental plus a soft octave partial
                let tone = phase.sin() + 0.3 * (2.0 * phase).sin();
                amplitude * attack * decay * tone / 1.3
            })
            .collect()
    }
}
