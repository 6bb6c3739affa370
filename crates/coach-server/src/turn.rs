//! Turn-based voice orchestration for clients without a live connection.
//!
//! Each operation loads the session, asks the text generator for the
//! coach's side, writes the new entries through the store's merge rule,
//! and optionally synthesizes the reply. Synthesis failures never fail
//! the turn; the reply is returned without audio.

use crate::api::{with_store, ApiError};
use crate::prompts::{self, EMPTY_REPLY_FALLBACK};
use crate::text_model::TurnCompletion;
use crate::AppState;
use base64::Engine;
use coach_live::context::build_live_system_prompt;
use coach_types::{QuestionState, TranscriptEntry, TranscriptRole};
use coach_voice::{SpeechTarget, SynthesisRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-call model overrides. Blank values are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelOverrides {
    #[serde(default)]
    pub text_model: Option<String>,
    #[serde(default)]
    pub tts_model: Option<String>,
}

impl ModelOverrides {
    fn text_model(&self) -> Option<&str> {
        non_blank(self.text_model.as_deref())
    }

    fn tts_model(&self) -> Option<&str> {
        non_blank(self.tts_model.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required_text(text: &str) -> Result<String, ApiError> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return Err(ApiError::BadRequest("Text is required".to_string()));
    }
    Ok(cleaned.to_string())
}

fn reply_or_fallback(text: String) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        EMPTY_REPLY_FALLBACK.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct IntroReply {
    pub interview_id: String,
    pub coach: TranscriptEntry,
    pub coach_audio: Option<String>,
    pub coach_audio_mime: Option<String>,
}

/// A candidate utterance and the coach's answer to it.
#[derive(Debug, Serialize)]
pub struct TurnReply {
    pub interview_id: String,
    pub candidate: TranscriptEntry,
    pub coach: TranscriptEntry,
    pub coach_audio: Option<String>,
    pub coach_audio_mime: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackReply {
    pub interview_id: String,
    pub overall_score: u32,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub feedback: TranscriptEntry,
}

#[derive(Debug, Serialize)]
pub struct CompletionReply {
    pub interview_id: String,
    #[serde(flatten)]
    pub verdict: TurnCompletion,
}

/// Synthesizes `text` when server-side audio is enabled. A TTS model
/// override is tried first, ahead of the configured order.
pub async fn synthesize_reply(
    state: &AppState,
    interview_id: &str,
    text: &str,
    tts_model: Option<&str>,
) -> (Option<String>, Option<String>) {
    if !state.voice.enabled || !state.voice.output_mode.synthesizes_on_server() {
        return (None, None);
    }
    let Some(synthesizer) = &state.synthesizer else {
        return (None, None);
    };

    let mut request = SynthesisRequest::new(text);
    if let Some(model) = tts_model {
        let preferred = SpeechTarget::new("gemini", model);
        let mut order = vec![preferred.clone()];
        order.extend(
            synthesizer
                .default_targets()
                .iter()
                .filter(|target| **target != preferred)
                .cloned(),
        );
        request.provider_order = order;
    }

    match synthesizer.synthesize(request).await {
        Ok(result) => (
            Some(base64::engine::general_purpose::STANDARD.encode(&result.audio)),
            Some(result.mime_type),
        ),
        Err(e) => {
            tracing::warn!(interview_id = %interview_id, error = %e, "reply synthesis failed");
            (None, None)
        }
    }
}

async fn append(
    state: &Arc<AppState>,
    interview_id: &str,
    entry: &TranscriptEntry,
) -> Result<(), ApiError> {
    let id = interview_id.to_string();
    let entry = entry.clone();
    with_store(state, move |store| store.append_transcript_entry(&id, entry)).await?;
    Ok(())
}

/// Opens the interview with a greeting and the first question.
pub async fn run_intro(
    state: &Arc<AppState>,
    interview_id: &str,
    overrides: &ModelOverrides,
) -> Result<IntroReply, ApiError> {
    let id = interview_id.to_string();
    let session = with_store(state, move |store| store.get(&id)).await?;

    let system_prompt = build_live_system_prompt(&session);
    let text = state
        .text
        .intro(
            &system_prompt,
            session.role_title.as_deref(),
            &session.questions,
            overrides.text_model(),
        )
        .await?;
    let coach = TranscriptEntry::new(TranscriptRole::Coach, reply_or_fallback(text));
    append(state, interview_id, &coach).await?;

    if !session.questions.is_empty() {
        let id = interview_id.to_string();
        with_store(state, move |store| {
            store.update_question_status(&id, 0, QuestionState::Started, "intro")
        })
        .await?;
    }

    let (coach_audio, coach_audio_mime) =
        synthesize_reply(state, interview_id, &coach.text, overrides.tts_model()).await;
    tracing::info!(interview_id = %interview_id, "intro delivered");
    Ok(IntroReply {
        interview_id: interview_id.to_string(),
        coach,
        coach_audio,
        coach_audio_mime,
    })
}

/// Records a candidate answer and produces the coach's reply.
pub async fn run_turn(
    state: &Arc<AppState>,
    interview_id: &str,
    text: &str,
    overrides: &ModelOverrides,
) -> Result<TurnReply, ApiError> {
    let id = interview_id.to_string();
    let session = with_store(state, move |store| store.get(&id)).await?;
    let cleaned = required_text(text)?;

    let candidate = TranscriptEntry::new(TranscriptRole::Candidate, cleaned.clone());
    append(state, interview_id, &candidate).await?;

    let system_prompt = build_live_system_prompt(&session);
    let reply = state
        .text
        .coach_reply(&system_prompt, &cleaned, overrides.text_model())
        .await?;
    let coach = TranscriptEntry::new(TranscriptRole::Coach, reply_or_fallback(reply));
    append(state, interview_id, &coach).await?;

    let (coach_audio, coach_audio_mime) =
        synthesize_reply(state, interview_id, &coach.text, overrides.tts_model()).await;
    tracing::info!(
        interview_id = %interview_id,
        audio = coach_audio.is_some(),
        "voice turn complete"
    );
    Ok(TurnReply {
        interview_id: interview_id.to_string(),
        candidate,
        coach,
        coach_audio,
        coach_audio_mime,
    })
}

/// Answers a request for help with a draft stored as coach feedback.
pub async fn run_help(
    state: &Arc<AppState>,
    interview_id: &str,
    text: &str,
    overrides: &ModelOverrides,
) -> Result<TurnReply, ApiError> {
    let id = interview_id.to_string();
    let session = with_store(state, move |store| store.get(&id)).await?;
    let cleaned = required_text(text)?;

    let candidate = TranscriptEntry::new(TranscriptRole::Candidate, cleaned.clone());
    append(state, interview_id, &candidate).await?;

    let system_prompt = build_live_system_prompt(&session);
    let draft = state
        .text
        .help(&system_prompt, &cleaned, overrides.text_model())
        .await?;
    let coach = TranscriptEntry::new(TranscriptRole::CoachFeedback, reply_or_fallback(draft));
    append(state, interview_id, &coach).await?;

    let (coach_audio, coach_audio_mime) =
        synthesize_reply(state, interview_id, &coach.text, overrides.tts_model()).await;
    Ok(TurnReply {
        interview_id: interview_id.to_string(),
        candidate,
        coach,
        coach_audio,
        coach_audio_mime,
    })
}

/// Scores the interview. A supplied transcript replaces the stored one
/// first.
pub async fn run_feedback(
    state: &Arc<AppState>,
    interview_id: &str,
    transcript: Option<Vec<TranscriptEntry>>,
    overrides: &ModelOverrides,
) -> Result<FeedbackReply, ApiError> {
    let id = interview_id.to_string();
    let session = with_store(state, move |store| {
        if let Some(transcript) = transcript {
            store.replace_transcript(&id, transcript)?;
        }
        store.get(&id)
    })
    .await?;

    if session.transcript.is_empty() {
        return Err(ApiError::BadRequest("Transcript is required".to_string()));
    }

    let score = state
        .text
        .score(
            &session.transcript,
            session.role_title.as_deref(),
            &session.focus_areas,
            overrides.text_model(),
        )
        .await?;

    let feedback = TranscriptEntry::new(TranscriptRole::CoachFeedback, prompts::feedback_text(&score));
    let id = interview_id.to_string();
    let stored_score = score.clone();
    let stored_feedback = feedback.clone();
    with_store(state, move |store| {
        store.set_score(&id, stored_score)?;
        store.append_transcript_entry(&id, stored_feedback)
    })
    .await?;

    tracing::info!(
        interview_id = %interview_id,
        overall_score = score.overall_score,
        "interview scored"
    );
    Ok(FeedbackReply {
        interview_id: interview_id.to_string(),
        overall_score: score.overall_score,
        summary: score.summary,
        strengths: score.strengths,
        improvements: score.improvements,
        feedback,
    })
}

/// Classifies an in-progress answer so the client can decide whether to
/// keep listening. Nothing is written to the transcript.
pub async fn run_turn_completion_check(
    state: &Arc<AppState>,
    interview_id: &str,
    text: &str,
    overrides: &ModelOverrides,
) -> Result<CompletionReply, ApiError> {
    let id = interview_id.to_string();
    let session = with_store(state, move |store| store.get(&id)).await?;
    let cleaned = required_text(text)?;

    let verdict = state
        .text
        .turn_completion(
            prompts::current_question(&session),
            &cleaned,
            overrides.text_model(),
        )
        .await?;
    tracing::debug!(
        interview_id = %interview_id,
        status = ?verdict.status,
        confidence = verdict.confidence,
        "turn completion checked"
    );
    Ok(CompletionReply {
        interview_id: interview_id.to_string(),
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_overrides_are_ignored() {
        let overrides = ModelOverrides {
            text_model: Some("  ".into()),
            tts_model: Some(" tts-x ".into()),
        };
        assert_eq!(overrides.text_model(), None);
        assert_eq!(overrides.tts_model(), Some("tts-x"));
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(matches!(required_text(" \n "), Err(ApiError::BadRequest(m)) if m == "Text is required"));
        assert_eq!(required_text("  hi ").unwrap(), "hi");
    }

    #[test]
    fn empty_reply_uses_fallback() {
        assert_eq!(reply_or_fallback("   ".into()), EMPTY_REPLY_FALLBACK);
        assert_eq!(reply_or_fallback(" Good. ".into()), "Good.");
    }
}
