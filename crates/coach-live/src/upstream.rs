//! The seam between the bridge and an upstream realtime model.

use crate::error::LiveError;
use async_trait::async_trait;
use coach_types::LiveAudioChunk;

/// Everything a connector needs to open a session.
#[derive(Debug, Clone)]
pub struct LiveSetup {
    pub interview_id: String,
    pub system_prompt: String,
    /// Interview questions, in order. Used by scripted connectors.
    pub questions: Vec<String>,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

/// Explicit voice-activity hint from a client that runs its own detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Start,
    End,
}

impl ActivityState {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            _ => None,
        }
    }
}

/// Messages sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Audio(LiveAudioChunk),
    /// A user text turn (rehydration, nudges, barge-in).
    Text { text: String, turn_complete: bool },
    Activity(ActivityState),
    AudioStreamEnd,
}

/// Events received from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    SetupComplete,
    /// Transcription of the model's own speech (a coach delta).
    OutputTranscript(String),
    /// Transcription of the candidate's speech.
    InputTranscript(String),
    /// Text part of a model turn (a coach delta).
    Text(String),
    Audio {
        data: Vec<u8>,
        mime_type: Option<String>,
    },
    TurnComplete,
    Interrupted,
}

#[async_trait]
pub trait UpstreamSink: Send {
    async fn send(&mut self, message: Outbound) -> Result<(), LiveError>;

    /// Releases the connection. Called at most once.
    async fn close(&mut self) -> Result<(), LiveError>;
}

#[async_trait]
pub trait UpstreamStream: Send {
    /// The next event. `None` is a clean end of stream; `Some(Err)` is a
    /// session failure. Must be cancel-safe.
    async fn next_event(&mut self) -> Option<Result<ModelEvent, LiveError>>;
}

/// An open upstream session split into its send and receive halves.
pub struct UpstreamSession {
    pub sink: Box<dyn UpstreamSink>,
    pub stream: Box<dyn UpstreamStream>,
}

#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Reported to the client as the session `mode` (`gemini` or `mock`).
    fn mode(&self) -> &'static str;

    /// A scripted connector ends its stream once the script is played out;
    /// that end is reported as `stream-complete` rather than a disconnect.
    fn scripted(&self) -> bool {
        false
    }

    async fn connect(&self, setup: LiveSetup) -> Result<UpstreamSession, LiveError>;
}
