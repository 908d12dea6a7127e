//! Configuration management for guided audio synthesis
//!
//! Supports loading configuration from:
//! - YAML/TOML/JSON files under `config/`
//! - Environment variables (GUIDED_AUDIO__ prefix, `__` separator)

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, AudioSettings, ObservabilityConfig, OutputEncoding,
    ServerConfig, Settings, StorageBackend, StorageConfig, SynthesisSettings, TimelineSettings,
    TtsEngine, TtsSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for guided_audio_core::Error {
    fn from(err: ConfigError) -> Self {
        guided_audio_core::Error::Config(err.to_string())
    }
}
