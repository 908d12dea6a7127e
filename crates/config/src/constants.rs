//! Centralized constants for guided audio
//!
//! Single source of truth for defaults shared across crates. Settings fall back
//! to these values when a field is absent.

/// Timeline layout defaults
pub mod timeline {
    /// Gap between two consecutive spoken segments (ms)
    pub const DEFAULT_GAP_MS: u64 = 2_000;

    /// Gap before the first segment of a new section (ms)
    pub const AFTER_HEADING_GAP_MS: u64 = 3_000;

    /// Closing chime appended to a completed timeline (ms)
    pub const CLOSING_CUE_MS: u64 = 1_500;

    /// Speaking-rate heuristic used until real audio is measured
    pub const CHARS_PER_SECOND: f64 = 15.0;
}

/// Audio rendering defaults
pub mod audio {
    /// Output sample rate (Hz)
    pub const SAMPLE_RATE: u32 = 24_000;

    /// Output channel count
    pub const CHANNELS: u16 = 1;

    /// Fundamental of the closing chime (Hz)
    pub const CUE_FREQUENCY_HZ: f32 = 528.0;

    /// Peak amplitude of the closing chime
    pub const CUE_AMPLITUDE: f32 = 0.25;
}

/// Synthesis pipeline defaults
pub mod synthesis {
    /// Concurrent speech generation calls per run
    pub const MAX_CONCURRENT_SPEECH: usize = 2;

    /// Buffered events per run before the producer waits
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;

    /// Share of overall progress attributed to segment generation (percent);
    /// composition covers the remainder
    pub const GENERATION_PROGRESS_SHARE: u8 = 50;
}

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// OpenAI-compatible speech endpoint
    pub const SPEECH_DEFAULT: &str = "https://api.openai.com/v1/audio/speech";
}

/// Timeouts (ms)
pub mod timeouts {
    /// TTS request timeout
    pub const TTS_REQUEST_MS: u64 = 60_000;

    /// HTTP request timeout for non-streaming routes
    pub const HTTP_REQUEST_MS: u64 = 30_000;
}
