//! The interview session record.
//!
//! An `InterviewSession` is created once per interview and mutated for the
//! session's lifetime. All mutation goes through the methods here so the
//! record invariants hold no matter which caller writes:
//!
//! - `question_statuses.len() == questions.len()`
//! - `asked_question_index`, when set, is `< questions.len()` and never
//!   decreases (except through [`InterviewSession::reset`]).
//! - transcript entries are never empty, and consecutive same-role entries
//!   are merged.

use crate::transcript::{build_conversation_memory, merge_transcript_text, TranscriptEntry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the conversation memory rollup.
pub const MAX_MEMORY_CHARS: usize = 4000;

/// Progress state of a single interview question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionState {
    #[default]
    NotStarted,
    Started,
    Answered,
}

impl QuestionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Started => "started",
            Self::Answered => "answered",
        }
    }
}

impl std::str::FromStr for QuestionState {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "started" => Ok(Self::Started),
            "answered" => Ok(Self::Answered),
            other => Err(SessionError::InvalidStatus(other.to_string())),
        }
    }
}

/// A question status with the time it was last changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionStatus {
    pub status: QuestionState,
    pub updated_at: String,
}

impl QuestionStatus {
    pub fn new(status: QuestionState) -> Self {
        Self {
            status,
            updated_at: crate::now_rfc3339(),
        }
    }
}

/// One step in the progress or status history of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub index: usize,
    pub question: String,
    pub status: String,
    pub timestamp: String,
    pub source: String,
}

/// Interview feedback produced by the scoring collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewScore {
    pub overall_score: u32,
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

/// Errors raised by record mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("question index {index} out of range (questions: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid question status: {0}")]
    InvalidStatus(String),
}

/// What happened to an entry handed to [`InterviewSession::append_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored as a new transcript entry.
    Appended,
    /// Merged into the previous entry of the same role.
    Merged,
    /// Dropped because its text was empty after trimming.
    Skipped,
}

/// Durable state of one interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSession {
    pub interview_id: String,
    #[serde(default)]
    pub adapter: String,
    #[serde(default)]
    pub role_title: Option<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub resume_text: String,
    #[serde(default)]
    pub job_text: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub asked_question_index: Option<usize>,
    #[serde(default)]
    pub asked_question_history: Vec<ProgressEvent>,
    #[serde(default)]
    pub question_statuses: Vec<QuestionStatus>,
    #[serde(default)]
    pub question_status_history: Vec<ProgressEvent>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub conversation_memory: String,
    #[serde(default)]
    pub score: Option<InterviewScore>,
}

impl InterviewSession {
    /// Creates a fresh session with one `not_started` status per question.
    pub fn new(
        interview_id: impl Into<String>,
        adapter: impl Into<String>,
        questions: Vec<String>,
    ) -> Self {
        let now = crate::now_rfc3339();
        let mut session = Self {
            interview_id: interview_id.into(),
            adapter: adapter.into(),
            role_title: None,
            questions,
            focus_areas: Vec::new(),
            resume_text: String::new(),
            job_text: String::new(),
            created_at: now.clone(),
            updated_at: now,
            asked_question_index: None,
            asked_question_history: Vec::new(),
            question_statuses: Vec::new(),
            question_status_history: Vec::new(),
            transcript: Vec::new(),
            conversation_memory: String::new(),
            score: None,
        };
        session.ensure_question_statuses();
        session
    }

    /// Pads or trims `question_statuses` to match `questions`, and drops an
    /// out-of-range progress index. Returns `true` if anything changed.
    pub fn ensure_question_statuses(&mut self) -> bool {
        let mut changed = false;
        let len = self.questions.len();
        if self.question_statuses.len() < len {
            let missing = len - self.question_statuses.len();
            self.question_statuses
                .extend((0..missing).map(|_| QuestionStatus::new(QuestionState::NotStarted)));
            changed = true;
        }
        if self.question_statuses.len() > len {
            self.question_statuses.truncate(len);
            changed = true;
        }
        if matches!(self.asked_question_index, Some(index) if index >= len) {
            self.asked_question_index = len.checked_sub(1);
            changed = true;
        }
        changed
    }

    /// Stamps `updated_at` (and `created_at` if missing).
    pub fn touch(&mut self) {
        let now = crate::now_rfc3339();
        if self.created_at.is_empty() {
            self.created_at = now.clone();
        }
        self.updated_at = now;
    }

    /// Index of the first question that is not yet answered.
    pub fn next_unanswered_index(&self) -> Option<usize> {
        if self.question_statuses.is_empty() {
            return if self.questions.is_empty() { None } else { Some(0) };
        }
        self.question_statuses
            .iter()
            .position(|status| status.status != QuestionState::Answered)
    }

    /// Recomputes the bounded conversation memory from the transcript.
    pub fn refresh_memory(&mut self) {
        self.conversation_memory =
            build_conversation_memory(&self.transcript, None, Some(MAX_MEMORY_CHARS));
    }

    /// Appends a transcript entry, merging it into the previous entry when the
    /// role matches. Empty entries are dropped.
    pub fn append_entry(&mut self, entry: TranscriptEntry) -> AppendOutcome {
        let text = entry.text.trim();
        if text.is_empty() {
            return AppendOutcome::Skipped;
        }

        let text = text.to_string();
        let outcome = match self.transcript.last_mut() {
            Some(last) if last.role == entry.role => {
                last.text = merge_transcript_text(&last.text, &text);
                if last.timestamp.is_empty() {
                    last.timestamp = entry.timestamp;
                }
                AppendOutcome::Merged
            }
            _ => {
                self.transcript.push(TranscriptEntry {
                    role: entry.role,
                    text,
                    timestamp: entry.timestamp,
                });
                AppendOutcome::Appended
            }
        };
        self.refresh_memory();
        self.touch();
        outcome
    }

    /// Replaces the whole transcript (used when a client submits its own copy
    /// for scoring). Empty entries are dropped and same-role runs merged.
    pub fn replace_transcript(&mut self, transcript: Vec<TranscriptEntry>) {
        self.transcript.clear();
        for entry in transcript {
            self.append_entry(entry);
        }
        self.refresh_memory();
        self.touch();
    }

    /// Moves the progress index forward to `index`.
    ///
    /// Lower or equal indices are ignored; the index never decreases.
    /// Returns the resulting progress index.
    pub fn advance_progress(
        &mut self,
        index: usize,
        source: &str,
    ) -> Result<Option<usize>, SessionError> {
        let len = self.questions.len();
        if index >= len {
            return Err(SessionError::IndexOutOfRange { index, len });
        }
        if self.asked_question_index.map_or(true, |current| index > current) {
            self.asked_question_index = Some(index);
            self.asked_question_history.push(ProgressEvent {
                index,
                question: self.questions[index].clone(),
                status: "progressed".to_string(),
                timestamp: crate::now_rfc3339(),
                source: source.to_string(),
            });
            self.touch();
        }
        Ok(self.asked_question_index)
    }

    /// Sets the status of question `index`.
    ///
    /// Sources other than `"user"` may not downgrade an answered question and
    /// do not re-stamp an unchanged status. `started` and `answered` advance
    /// the progress index monotonically.
    pub fn update_question_status(
        &mut self,
        index: usize,
        status: QuestionState,
        source: &str,
    ) -> Result<QuestionStatus, SessionError> {
        self.ensure_question_statuses();
        let len = self.question_statuses.len();
        if index >= len {
            return Err(SessionError::IndexOutOfRange { index, len });
        }

        let current = self.question_statuses[index].clone();
        let from_user = source == "user";
        if !from_user
            && (current.status == status
                || (current.status == QuestionState::Answered && status != QuestionState::Answered))
        {
            return Ok(current);
        }

        let updated = QuestionStatus::new(status);
        self.question_statuses[index] = updated.clone();
        if matches!(status, QuestionState::Started | QuestionState::Answered)
            && self.asked_question_index.map_or(true, |current| index > current)
        {
            self.asked_question_index = Some(index);
            self.asked_question_history.push(ProgressEvent {
                index,
                question: self.questions[index].clone(),
                status: status.as_str().to_string(),
                timestamp: updated.updated_at.clone(),
                source: source.to_string(),
            });
        }
        self.question_status_history.push(ProgressEvent {
            index,
            question: self.questions[index].clone(),
            status: status.as_str().to_string(),
            timestamp: updated.updated_at.clone(),
            source: source.to_string(),
        });
        self.touch();
        Ok(updated)
    }

    /// Clears the transcript, memory, score, and progress. Question statuses
    /// are returned to `not_started`.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.conversation_memory.clear();
        self.score = None;
        self.asked_question_index = None;
        self.asked_question_history.clear();
        self.question_statuses = self
            .questions
            .iter()
            .map(|_| QuestionStatus::new(QuestionState::NotStarted))
            .collect();
        self.touch();
    }
}
