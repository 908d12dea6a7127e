//! Voice settings passed through to the TTS capability

use serde::{Deserialize, Serialize};

/// Voice/service options for speech synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Backend voice identifier
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Speaking rate (1.0 = normal)
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Backend model override
    #[serde(default)]
    pub model: Option<String>,
    /// Free-form style instructions forwarded to backends that accept them
    #[serde(default)]
    pub instructions: Option<String>,
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_speed() -> f32 {
    0.9
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            speed: default_speed(),
            model: None,
            instructions: None,
        }
    }
}
