use coach_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Interview not found: {0}")]
    NotFound(String),

    #[error("Session store error: {0}")]
    Store(StoreError),

    /// Missing credential or live model configuration.
    #[error("Live session unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Invalid(String),

    #[error("Failed to connect to live model: {0}")]
    Connect(String),

    /// The upstream connection failed mid-session.
    #[error("{0}")]
    Upstream(String),

    #[error("Unexpected live message: {0}")]
    Protocol(String),

    /// A send was attempted after the bridge closed.
    #[error("Live session is closed")]
    Closed,

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<StoreError> for LiveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

impl LiveError {
    /// Message shown to the client. Quota exhaustion is reported as a
    /// friendly retry-later notice.
    pub fn client_message(&self) -> String {
        let message = self.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("resource_exhausted") || lowered.contains("quota") || lowered.contains("429")
        {
            return "Gemini quota exceeded. Try again later.".to_string();
        }
        message
    }
}
