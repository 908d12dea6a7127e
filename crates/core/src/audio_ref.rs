//! Opaque audio references

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking a reference produced by a failed generation
pub const ERROR_PREFIX: &str = "error:";

/// Opaque handle to stored audio bytes
///
/// References are produced by an [`AudioStorage`](crate::AudioStorage) and are
/// never interpreted except for the error sentinel form
/// `error:<timestamp>:<message>`, which marks a segment whose generation failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(String);

impl AudioRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an error sentinel carrying a timestamp and the failure message
    pub fn error(message: impl fmt::Display) -> Self {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Self(format!("{}{}:{}", ERROR_PREFIX, stamp, message))
    }

    pub fn is_error(&self) -> bool {
        self.0.starts_with(ERROR_PREFIX)
    }

    /// A reference that can be fetched from storage
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.is_error()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AudioRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AudioRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for AudioRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
