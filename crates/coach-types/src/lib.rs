//! Shared types for the interview coach.
//!
//! This crate provides the data model used across all coach crates: the
//! interview session record, transcript entries and their merge rule,
//! per-question progress status, and the transient audio chunk that flows
//! through the live bridge.
//!
//! No crate in the workspace depends on anything *except* `coach-types` for
//! cross-cutting type definitions. This keeps the dependency graph acyclic.

pub mod session;
pub mod transcript;

pub use session::{
    AppendOutcome, InterviewScore, InterviewSession, ProgressEvent, QuestionState,
    QuestionStatus, SessionError,
};
pub use transcript::{build_conversation_memory, merge_transcript_text, TranscriptEntry};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default sample rate for PCM16 audio exchanged with the upstream model.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// The party that produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    /// The interview coach (the model).
    Coach,
    /// The person practising the interview.
    Candidate,
    /// Coach feedback produced outside the question flow.
    CoachFeedback,
    /// System notices.
    System,
}

impl TranscriptRole {
    /// Returns the wire label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coach => "coach",
            Self::Candidate => "candidate",
            Self::CoachFeedback => "coach_feedback",
            Self::System => "system",
        }
    }

    /// Returns the human-readable label used in prompts and memory rollups.
    pub fn label(self) -> &'static str {
        match self {
            Self::Coach => "Coach",
            Self::Candidate => "Candidate",
            Self::CoachFeedback => "Coach feedback",
            Self::System => "System",
        }
    }
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk of microphone audio on its way to the upstream model.
///
/// Transient: never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveAudioChunk {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl LiveAudioChunk {
    /// Builds a little-endian PCM16 chunk at the given sample rate.
    pub fn pcm16(data: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            data,
            mime_type: format!("audio/pcm;rate={}", sample_rate),
        }
    }
}

/// Extracts the `rate=NNNN` parameter from an audio mime type.
///
/// Returns `fallback` when the parameter is missing or malformed.
pub fn parse_sample_rate(mime_type: Option<&str>, fallback: u32) -> u32 {
    let Some(mime) = mime_type else {
        return fallback;
    };
    let Some((_, rest)) = mime.split_once("rate=") else {
        return fallback;
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(fallback)
}

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&TranscriptRole::CoachFeedback).unwrap();
        assert_eq!(json, "\"coach_feedback\"");
        let role: TranscriptRole = serde_json::from_str("\"candidate\"").unwrap();
        assert_eq!(role, TranscriptRole::Candidate);
    }

    #[test]
    fn sample_rate_parsing() {
        assert_eq!(parse_sample_rate(Some("audio/pcm;rate=16000"), 24_000), 16_000);
        assert_eq!(parse_sample_rate(Some("audio/L16;codec=pcm;rate=22050"), 1), 22_050);
        assert_eq!(parse_sample_rate(Some("audio/wav"), 24_000), 24_000);
        assert_eq!(parse_sample_rate(Some("audio/pcm;rate=abc"), 8_000), 8_000);
        assert_eq!(parse_sample_rate(None, 24_000), 24_000);
    }

    #[test]
    fn pcm16_chunk_carries_rate() {
        let chunk = LiveAudioChunk::pcm16(vec![0, 1], 16_000);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
    }
}
