//! Speech synthesis for coach replies.
//!
//! Coach text is rendered to audio by one of several remote providers. The
//! [`SynthesisOrchestrator`] owns the latency policy: text is truncated to a
//! speakable length, each provider attempt runs under a short wait budget
//! followed by the remainder of the overall timeout, and a failing primary
//! can be hedged by racing its retries against the fallback chain.
//!
//! Providers sit behind the [`SpeechProvider`] trait so the orchestrator can
//! be exercised with scripted providers in tests. Synthesis runs on a small
//! bounded worker pool shared by every session.

pub mod audio;
pub mod config;
pub mod error;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod orchestrator;
pub mod provider;
pub mod text;

pub use config::{GeminiSpeechConfig, OpenAiSpeechConfig, OutputMode, VoiceConfig};
pub use error::VoiceError;
pub use orchestrator::{SynthesisOrchestrator, SynthesisRequest, SynthesisResult};
pub use provider::{SpeechAudio, SpeechInput, SpeechProvider, SpeechTarget};
pub use text::truncate_for_speech;
