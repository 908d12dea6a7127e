//! Text-to-speech capability

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{SynthesisError, VoiceSettings};

/// Turns text into encoded audio bytes (WAV)
///
/// Implementations must observe `cancel` at their suspension points and return
/// [`SynthesisError::Cancelled`] once it fires. Retries are the implementor's
/// business; callers never retry.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}
