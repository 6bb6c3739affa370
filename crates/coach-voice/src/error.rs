use thiserror::Error;

/// Message markers that identify a transient provider failure.
const RETRYABLE_MARKERS: &[&str] = &[
    "500 internal",
    "503",
    "service unavailable",
    "temporarily unavailable",
    "deadline exceeded",
    "timeout",
    "overloaded",
];

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Invalid synthesis request: {0}")]
    Invalid(String),

    /// No usable provider (missing credentials or nothing configured).
    #[error("Speech synthesis unavailable: {0}")]
    Unavailable(String),

    /// The requested model cannot synthesize speech. The message names the
    /// configuration knob to change.
    #[error("{0}")]
    UnsupportedModel(String),

    /// A provider rejected or failed the request. `message` is the
    /// provider's own text.
    #[error("{message}")]
    Upstream {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} timed out after {elapsed_ms}ms")]
    Timeout { provider: String, elapsed_ms: u64 },

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Synthesis task failed: {0}")]
    Task(String),
}

impl VoiceError {
    /// Returns `true` for failures worth retrying against the same provider
    /// (overload, timeouts, transient server errors).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Upstream {
                status, message, ..
            } => {
                if matches!(status, Some(429 | 500 | 502 | 503 | 504)) {
                    return true;
                }
                let lowered = message.to_lowercase();
                RETRYABLE_MARKERS
                    .iter()
                    .any(|marker| lowered.contains(marker))
            }
            _ => false,
        }
    }
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        Self::Audio(err.to_string())
    }
}
