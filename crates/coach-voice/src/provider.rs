//! The provider seam.

use crate::error::VoiceError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// A provider plus the model to ask it for, e.g. `gemini:gemini-2.5-flash-preview-tts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpeechTarget {
    pub provider: String,
    pub model: String,
}

impl SpeechTarget {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for SpeechTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// One synthesis call handed to a provider.
#[derive(Debug, Clone)]
pub struct SpeechInput {
    pub text: String,
    pub model: String,
    pub voice: Option<String>,
    pub language: Option<String>,
    /// Transport timeout the provider should apply to its own request.
    pub timeout: Duration,
}

/// Audio returned by a provider, already normalized to a browser-playable
/// container where possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// A remote (or mock) text-to-speech backend.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Provider name as used in `voice.provider_order`.
    fn name(&self) -> &str;

    /// `false` when the provider has no credential. Unconfigured providers
    /// are skipped by the orchestrator without counting as a failure.
    fn is_configured(&self) -> bool;

    async fn synthesize(&self, input: &SpeechInput) -> Result<SpeechAudio, VoiceError>;
}
