//! Interview lifecycle and turn-based HTTP handlers.

use crate::api::{with_store, ApiError};
use crate::turn::{self, CompletionReply, FeedbackReply, IntroReply, ModelOverrides, TurnReply};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Json, Path};
use coach_store::NewInterview;
use coach_types::transcript::truncate_chars;
use coach_types::{QuestionState, QuestionStatus, TranscriptEntry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cap on stored resume and job description text.
const MAX_DOCUMENT_CHARS: usize = 4000;

/// Request body for `POST /api/interviews`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateInterviewRequest {
    #[serde(default)]
    pub role_title: Option<String>,
    #[serde(default)]
    pub resume_text: String,
    #[serde(default)]
    pub job_text: String,
    /// Skips question generation when non-empty.
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(flatten)]
    pub overrides: ModelOverrides,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateInterviewResponse {
    pub interview_id: String,
    pub questions: Vec<String>,
    pub focus_areas: Vec<String>,
    pub question_statuses: Vec<QuestionStatus>,
    pub adapter: String,
}

#[derive(Debug, Serialize)]
pub struct InterviewSummary {
    pub interview_id: String,
    pub role_title: Option<String>,
    pub adapter: String,
    pub created_at: String,
    pub updated_at: String,
    pub asked_question_index: Option<usize>,
    pub questions: Vec<String>,
    pub focus_areas: Vec<String>,
    pub question_statuses: Vec<QuestionStatus>,
    pub overall_score: Option<u32>,
    pub summary: Option<String>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub overrides: ModelOverrides,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedbackRequest {
    /// Replaces the stored transcript before scoring.
    #[serde(default)]
    pub transcript: Option<Vec<TranscriptEntry>>,
    #[serde(flatten)]
    pub overrides: ModelOverrides,
}

#[derive(Debug, Deserialize)]
pub struct QuestionStatusRequest {
    pub status: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionStatusResponse {
    pub interview_id: String,
    pub question_statuses: Vec<QuestionStatus>,
    pub index: usize,
    pub status: QuestionState,
    pub updated_at: String,
    pub asked_question_index: Option<usize>,
}

/// Parses an optional JSON body; an empty body yields the default.
fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Handler for `POST /api/interviews`.
pub async fn create_interview_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateInterviewRequest>,
) -> Result<Json<CreateInterviewResponse>, ApiError> {
    let role_title = payload
        .role_title
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let resume_text = truncate_chars(payload.resume_text.trim(), MAX_DOCUMENT_CHARS);
    let job_text = truncate_chars(payload.job_text.trim(), MAX_DOCUMENT_CHARS);

    let supplied_questions = clean_list(payload.questions);
    let (questions, focus_areas) = if supplied_questions.is_empty() {
        state
            .text
            .generate_questions(
                &resume_text,
                &job_text,
                role_title.as_deref(),
                payload.overrides.text_model.as_deref().map(str::trim),
            )
            .await?
    } else {
        (supplied_questions, clean_list(payload.focus_areas))
    };

    let new = NewInterview {
        adapter: state.text.name().to_string(),
        role_title,
        questions,
        focus_areas,
        resume_text,
        job_text,
    };
    let session = with_store(&state, move |store| store.create(new)).await?;

    Ok(Json(CreateInterviewResponse {
        interview_id: session.interview_id,
        questions: session.questions,
        focus_areas: session.focus_areas,
        question_statuses: session.question_statuses,
        adapter: session.adapter,
    }))
}

/// Handler for `GET /api/interviews/{interview_id}`.
pub async fn get_interview_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<String>,
) -> Result<Json<InterviewSummary>, ApiError> {
    let session = with_store(&state, move |store| store.get(&interview_id)).await?;
    let score = session.score;
    Ok(Json(InterviewSummary {
        interview_id: session.interview_id,
        role_title: session.role_title,
        adapter: session.adapter,
        created_at: session.created_at,
        updated_at: session.updated_at,
        asked_question_index: session.asked_question_index,
        questions: session.questions,
        focus_areas: session.focus_areas,
        question_statuses: session.question_statuses,
        overall_score: score.as_ref().map(|s| s.overall_score),
        summary: score.as_ref().map(|s| s.summary.clone()),
        strengths: score.as_ref().map(|s| s.strengths.clone()).unwrap_or_default(),
        improvements: score.map(|s| s.improvements).unwrap_or_default(),
        transcript: session.transcript,
    }))
}

/// Handler for `POST /api/interviews/{interview_id}/intro`.
pub async fn intro_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<String>,
    body: Bytes,
) -> Result<Json<IntroReply>, ApiError> {
    let overrides: ModelOverrides = optional_json(&body)?;
    Ok(Json(turn::run_intro(&state, &interview_id, &overrides).await?))
}

/// Handler for `POST /api/interviews/{interview_id}/turn`.
pub async fn turn_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<String>,
    Json(payload): Json<TextRequest>,
) -> Result<Json<TurnReply>, ApiError> {
    Ok(Json(
        turn::run_turn(&state, &interview_id, &payload.text, &payload.overrides).await?,
    ))
}

/// Handler for `POST /api/interviews/{interview_id}/help`.
pub async fn help_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<String>,
    Json(payload): Json<TextRequest>,
) -> Result<Json<TurnReply>, ApiError> {
    Ok(Json(
        turn::run_help(&state, &interview_id, &payload.text, &payload.overrides).await?,
    ))
}

/// Handler for `POST /api/interviews/{interview_id}/feedback`.
pub async fn feedback_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<String>,
    body: Bytes,
) -> Result<Json<FeedbackReply>, ApiError> {
    let payload: FeedbackRequest = optional_json(&body)?;
    Ok(Json(
        turn::run_feedback(&state, &interview_id, payload.transcript, &payload.overrides).await?,
    ))
}

/// Handler for `POST /api/interviews/{interview_id}/turn-check`.
pub async fn turn_check_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<String>,
    Json(payload): Json<TextRequest>,
) -> Result<Json<CompletionReply>, ApiError> {
    Ok(Json(
        turn::run_turn_completion_check(&state, &interview_id, &payload.text, &payload.overrides)
            .await?,
    ))
}

/// Handler for `POST /api/interviews/{interview_id}/reset`.
pub async fn reset_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = with_store(&state, move |store| store.reset(&interview_id)).await?;
    Ok(Json(serde_json::json!({
        "interview_id": session.interview_id,
        "status": "reset",
    })))
}

/// Handler for `PUT /api/interviews/{interview_id}/questions/{index}/status`.
pub async fn question_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((interview_id, index)): Path<(String, usize)>,
    Json(payload): Json<QuestionStatusRequest>,
) -> Result<Json<QuestionStatusResponse>, ApiError> {
    let status: QuestionState = payload.status.trim().parse()?;
    let source = payload
        .source
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "user".to_string());

    let (entry, session) = with_store(&state, move |store| {
        let entry = store.update_question_status(&interview_id, index, status, &source)?;
        let session = store.get(&interview_id)?;
        Ok((entry, session))
    })
    .await?;

    Ok(Json(QuestionStatusResponse {
        interview_id: session.interview_id,
        question_statuses: session.question_statuses,
        index,
        status: entry.status,
        updated_at: entry.updated_at,
        asked_question_index: session.asked_question_index,
    }))
}
