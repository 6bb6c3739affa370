//! JSON file store with per-interview write serialization.

use coach_types::{
    AppendOutcome, InterviewScore, InterviewSession, QuestionState, QuestionStatus,
    SessionError, TranscriptEntry,
};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors returned by [`SessionStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the interview ID.
    #[error("interview not found: {0}")]
    NotFound(String),

    /// A mutation violated a record invariant (e.g. index out of range).
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session record is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Inputs for a new interview record.
#[derive(Debug, Clone, Default)]
pub struct NewInterview {
    pub adapter: String,
    pub role_title: Option<String>,
    pub questions: Vec<String>,
    pub focus_areas: Vec<String>,
    pub resume_text: String,
    pub job_text: String,
}

/// File-backed session record store.
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    /// Opens (and creates if needed) the store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "session store opened");
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates and persists a new record with a generated interview ID.
    pub fn create(&self, new: NewInterview) -> Result<InterviewSession, StoreError> {
        let interview_id = uuid::Uuid::new_v4().simple().to_string();
        let mut session = InterviewSession::new(&interview_id, new.adapter, new.questions);
        session.role_title = new.role_title.filter(|title| !title.trim().is_empty());
        session.focus_areas = new.focus_areas;
        session.resume_text = new.resume_text;
        session.job_text = new.job_text;

        self.locked(&interview_id, || self.persist(&session))?;
        tracing::info!(
            interview_id = %interview_id,
            questions = session.questions.len(),
            "interview created"
        );
        Ok(session)
    }

    /// Loads a record, repairing the question status list if it drifted.
    pub fn get(&self, interview_id: &str) -> Result<InterviewSession, StoreError> {
        self.locked(interview_id, || {
            let mut session = self.load(interview_id)?;
            if session.ensure_question_statuses() {
                self.persist(&session)?;
            }
            Ok(session)
        })
    }

    /// Returns `true` if a record exists for the interview ID.
    pub fn exists(&self, interview_id: &str) -> bool {
        self.path_for(interview_id)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Applies `mutate` to the record under the per-ID lock and persists it.
    ///
    /// Nothing is written when `mutate` returns an error.
    pub fn update<T, F>(&self, interview_id: &str, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut InterviewSession) -> Result<T, SessionError>,
    {
        self.locked(interview_id, || {
            let mut session = self.load(interview_id)?;
            session.ensure_question_statuses();
            let value = mutate(&mut session)?;
            self.persist(&session)?;
            Ok(value)
        })
    }

    /// Appends a transcript entry using the same-role merge rule.
    pub fn append_transcript_entry(
        &self,
        interview_id: &str,
        entry: TranscriptEntry,
    ) -> Result<AppendOutcome, StoreError> {
        if entry.text.trim().is_empty() {
            return Ok(AppendOutcome::Skipped);
        }
        self.update(interview_id, |session| Ok(session.append_entry(entry)))
    }

    /// Replaces the transcript wholesale.
    pub fn replace_transcript(
        &self,
        interview_id: &str,
        transcript: Vec<TranscriptEntry>,
    ) -> Result<(), StoreError> {
        self.update(interview_id, |session| {
            session.replace_transcript(transcript);
            Ok(())
        })
    }

    /// Sets the status of one question. See
    /// [`InterviewSession::update_question_status`] for source rules.
    pub fn update_question_status(
        &self,
        interview_id: &str,
        index: usize,
        status: QuestionState,
        source: &str,
    ) -> Result<QuestionStatus, StoreError> {
        self.update(interview_id, |session| {
            session.update_question_status(index, status, source)
        })
    }

    /// Moves the progress index forward; never backwards.
    pub fn advance_question_index(
        &self,
        interview_id: &str,
        index: usize,
        source: &str,
    ) -> Result<Option<usize>, StoreError> {
        self.update(interview_id, |session| session.advance_progress(index, source))
    }

    pub fn set_score(&self, interview_id: &str, score: InterviewScore) -> Result<(), StoreError> {
        self.update(interview_id, |session| {
            session.score = Some(score);
            session.touch();
            Ok(())
        })
    }

    /// Clears transcript, memory, score, and progress for a fresh attempt.
    pub fn reset(&self, interview_id: &str) -> Result<InterviewSession, StoreError> {
        let session = self.update(interview_id, |session| {
            session.reset();
            Ok(session.clone())
        })?;
        tracing::info!(interview_id = %interview_id, "interview reset");
        Ok(session)
    }

    /// Runs `op` while holding the interview's write lock. The lock entry
    /// is dropped again once no other caller holds it, so the map only
    /// holds interviews with an operation in flight.
    fn locked<T>(
        &self,
        interview_id: &str,
        op: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                locks
                    .entry(interview_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            op()
        };
        drop(lock);

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(interview_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(interview_id);
        }
        result
    }

    /// Maps an ID to its record path. IDs that could escape the store
    /// directory are rejected.
    fn path_for(&self, interview_id: &str) -> Option<PathBuf> {
        let valid = !interview_id.is_empty()
            && interview_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.dir.join(format!("{}.json", interview_id)))
    }

    fn load(&self, interview_id: &str) -> Result<InterviewSession, StoreError> {
        let path = self
            .path_for(interview_id)
            .ok_or_else(|| StoreError::NotFound(interview_id.to_string()))?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(interview_id = %interview_id, "session record miss");
                return Err(StoreError::NotFound(interview_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    fn persist(&self, session: &InterviewSession) -> Result<(), StoreError> {
        let path = self
            .path_for(&session.interview_id)
            .ok_or_else(|| StoreError::NotFound(session.interview_id.clone()))?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(session)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        tracing::debug!(
            interview_id = %session.interview_id,
            bytes = body.len(),
            "session record persisted"
        );
        Ok(())
    }
}
