//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants;
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Synthesis run configuration
    #[serde(default)]
    pub synthesis: SynthesisSettings,

    /// Text-to-speech backend
    #[serde(default)]
    pub tts: TtsSettings,

    /// Gap and cue policy
    #[serde(default)]
    pub timeline: TimelineSettings,

    /// Rendering of the final asset
    #[serde(default)]
    pub audio: AudioSettings,

    /// Storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.synthesis.max_concurrent_speech == 0 {
            return Err(ConfigError::InvalidValue {
                field: "synthesis.max_concurrent_speech".to_string(),
                message: "At least one concurrent speech task is required".to_string(),
            });
        }

        if self.synthesis.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "synthesis.event_channel_capacity".to_string(),
                message: "Event channel capacity must be positive".to_string(),
            });
        }

        if !(8_000..=192_000).contains(&self.audio.sample_rate) {
            return Err(ConfigError::InvalidValue {
                field: "audio.sample_rate".to_string(),
                message: format!("Unsupported sample rate {}", self.audio.sample_rate),
            });
        }

        if self.timeline.chars_per_second <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "timeline.chars_per_second".to_string(),
                message: "Speaking rate must be positive".to_string(),
            });
        }

        if self.tts.engine == TtsEngine::Http && self.tts.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "tts.endpoint".to_string(),
                message: "HTTP engine requires an endpoint".to_string(),
            });
        }

        if !(0.25..=4.0).contains(&self.tts.speed) {
            return Err(ConfigError::InvalidValue {
                field: "tts.speed".to_string(),
                message: "Speed must be within 0.25..=4.0".to_string(),
            });
        }

        if self.tts.engine == TtsEngine::Http && self.tts.api_key.is_none() {
            tracing::warn!("tts.api_key not set; speech requests will be sent unauthenticated");
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout for non-streaming routes (ms)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// CORS allowed origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    constants::timeouts::HTTP_REQUEST_MS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout(),
            cors_origins: Vec::new(),
        }
    }
}

/// Synthesis run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    /// Concurrent speech generation calls per run
    #[serde(default = "default_max_concurrent_speech")]
    pub max_concurrent_speech: usize,

    /// Buffered events per run
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_max_concurrent_speech() -> usize {
    constants::synthesis::MAX_CONCURRENT_SPEECH
}
fn default_event_channel_capacity() -> usize {
    constants::synthesis::EVENT_CHANNEL_CAPACITY
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            max_concurrent_speech: default_max_concurrent_speech(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// TTS engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    /// OpenAI-compatible HTTP speech endpoint
    Http,
    /// Deterministic local tone generator (testing/offline)
    #[default]
    Stub,
}

/// Text-to-speech backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    #[serde(default)]
    pub engine: TtsEngine,

    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,

    /// Bearer token (set via GUIDED_AUDIO__TTS__API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_tts_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_speed")]
    pub speed: f32,

    #[serde(default = "default_tts_timeout")]
    pub request_timeout_ms: u64,

    /// Sample rate of the stub engine's output
    #[serde(default = "default_stub_sample_rate")]
    pub stub_sample_rate: u32,
}

fn default_tts_endpoint() -> String {
    constants::endpoints::SPEECH_DEFAULT.to_string()
}
fn default_tts_model() -> String {
    "gpt-4o-mini-tts".to_string()
}
fn default_voice() -> String {
    "alloy".to_string()
}
fn default_speed() -> f32 {
    0.9
}
fn default_tts_timeout() -> u64 {
    constants::timeouts::TTS_REQUEST_MS
}
fn default_stub_sample_rate() -> u32 {
    22_050
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            engine: TtsEngine::default(),
            endpoint: default_tts_endpoint(),
            api_key: None,
            model: default_tts_model(),
            voice: default_voice(),
            speed: default_speed(),
            request_timeout_ms: default_tts_timeout(),
            stub_sample_rate: default_stub_sample_rate(),
        }
    }
}

impl TtsSettings {
    /// Default voice settings for runs that don't specify their own
    pub fn voice_settings(&self) -> guided_audio_core::VoiceSettings {
        guided_audio_core::VoiceSettings {
            voice: self.voice.clone(),
            speed: self.speed,
            model: Some(self.model.clone()),
            instructions: None,
        }
    }
}

/// Gap and cue policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineSettings {
    #[serde(default = "default_gap_ms")]
    pub default_gap_ms: u64,

    #[serde(default = "default_after_heading_gap_ms")]
    pub after_heading_gap_ms: u64,

    /// 0 disables the closing cue
    #[serde(default = "default_closing_cue_ms")]
    pub closing_cue_ms: u64,

    #[serde(default = "default_chars_per_second")]
    pub chars_per_second: f64,
}

fn default_gap_ms() -> u64 {
    constants::timeline::DEFAULT_GAP_MS
}
fn default_after_heading_gap_ms() -> u64 {
    constants::timeline::AFTER_HEADING_GAP_MS
}
fn default_closing_cue_ms() -> u64 {
    constants::timeline::CLOSING_CUE_MS
}
fn default_chars_per_second() -> f64 {
    constants::timeline::CHARS_PER_SECOND
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            default_gap_ms: default_gap_ms(),
            after_heading_gap_ms: default_after_heading_gap_ms(),
            closing_cue_ms: default_closing_cue_ms(),
            chars_per_second: default_chars_per_second(),
        }
    }
}

/// Output encoding of the final asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputEncoding {
    #[default]
    Pcm16,
    Float32,
}

/// Rendering of the final asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default)]
    pub encoding: OutputEncoding,
}

fn default_sample_rate() -> u32 {
    constants::audio::SAMPLE_RATE
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            encoding: OutputEncoding::default(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Filesystem,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory for the filesystem backend
    #[serde(default = "default_storage_root")]
    pub root: String,
}

fn default_storage_root() -> String {
    "data/audio".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_storage_root(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Expose Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/` and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (GUIDED_AUDIO__ prefix)
/// 2. config/{env}.* (if env specified)
/// 3. config/default.*
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from an explicit config directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default = dir.join("default");
    builder = builder.add_source(File::with_name(&default.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let layer = dir.join(env_name);
        builder = builder.add_source(File::with_name(&layer.to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("GUIDED_AUDIO")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.synthesis.max_concurrent_speech, 2);
        assert_eq!(settings.timeline.default_gap_ms, 2000);
        assert_eq!(settings.audio.sample_rate, 24_000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.synthesis.max_concurrent_speech = 0;
        assert!(settings.validate().is_err());

        settings.synthesis.max_concurrent_speech = 4;
        settings.audio.sample_rate = 1_000;
        assert!(settings.validate().is_err());

        settings.audio.sample_rate = 16_000;
        assert!(settings.validate().is_ok());

        settings.tts.engine = TtsEngine::Http;
        settings.tts.endpoint = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            concat!(
                "[server]\nport = 9001\n\n",
                "[timeline]\ndefault_gap_ms = 1500\nclosing_cue_ms = 0\n\n",
                "[tts]\nengine = \"stub\"\n",
            ),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("staging.toml"),
            "[synthesis]\nmax_concurrent_speech = 3\n",
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.server.port, 9001);
        assert_eq!(settings.timeline.default_gap_ms, 1500);
        assert_eq!(settings.timeline.closing_cue_ms, 0);
        assert_eq!(settings.timeline.after_heading_gap_ms, 3000);
        assert_eq!(settings.synthesis.max_concurrent_speech, 3);
    }

    #[test]
    fn test_load_missing_dir_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("absent"), None).unwrap();
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
    }
}
