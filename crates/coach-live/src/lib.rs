//! Realtime coaching over a streaming speech model.
//!
//! A [`LiveBridge`] exists for the duration of one client connection. It
//! owns the upstream model connection, relays microphone audio through a
//! bounded queue, and consumes model events on a single receive loop that
//! assembles streamed coach text into utterances, checks each finished
//! utterance against the interview questions, and writes it through to the
//! session record.
//!
//! The upstream model sits behind [`LiveConnector`]: [`GeminiLiveConnector`]
//! speaks the Gemini Live WebSocket protocol and [`MockLiveConnector`] plays
//! back scripted coach turns without credentials.

pub mod assembler;
pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod gemini;
pub mod guard;
pub mod mock;
pub mod upstream;

pub use assembler::UtteranceAssembler;
pub use bridge::{BridgeEvent, LiveBridge, LiveStatus};
pub use config::LiveConfig;
pub use error::LiveError;
pub use gemini::GeminiLiveConnector;
pub use guard::{GuardDecision, GuardThresholds, QuestionGuard};
pub use mock::MockLiveConnector;
pub use upstream::{
    ActivityState, LiveConnector, LiveSetup, ModelEvent, Outbound, UpstreamSession,
    UpstreamSink, UpstreamStream,
};
