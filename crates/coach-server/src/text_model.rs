//! Text generation for question sets, coach replies, and scoring.
//!
//! [`TextGenerator`] is resolved once from configuration: the mock variant
//! returns scripted data and never fails, the Gemini variant calls the
//! `generateContent` REST endpoint. JSON payloads the model returns are
//! parsed leniently and fall back to fixed defaults field by field.

use crate::config::{Adapter, ModelsConfig};
use crate::prompts;
use coach_types::{InterviewScore, TranscriptEntry};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;

const TEXT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TextError {
    /// No credential for the configured backend.
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Upstream(String),
}

/// How far along a spoken answer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    NotAnswered,
    Partial,
    Complete,
}

impl Completion {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_answered" => Some(Self::NotAnswered),
            "partial" => Some(Self::Partial),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurnCompletion {
    pub status: Completion,
    pub confidence: f32,
}

/// Word-count and punctuation heuristic used by the mock adapter and when
/// the model's verdict cannot be parsed.
pub fn heuristic_completion(answer: &str) -> TurnCompletion {
    let trimmed = answer.trim();
    let words = trimmed.split_whitespace().count();
    if words == 0 {
        return TurnCompletion {
            status: Completion::NotAnswered,
            confidence: 0.9,
        };
    }
    let terminal = trimmed.ends_with(['.', '!', '?']);
    if terminal && words >= 12 {
        TurnCompletion {
            status: Completion::Complete,
            confidence: 0.8,
        }
    } else {
        TurnCompletion {
            status: Completion::Partial,
            confidence: 0.5,
        }
    }
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiText {
    api_base: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiText")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl GeminiText {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    fn resolve_model<'a>(&'a self, model_override: Option<&'a str>) -> &'a str {
        model_override
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.model)
    }

    async fn generate(&self, prompt: &str, model_override: Option<&str>) -> Result<String, TextError> {
        if self.api_key.trim().is_empty() {
            return Err(TextError::Unavailable(
                "GEMINI_API_KEY is required for the Gemini adapter.".to_string(),
            ));
        }
        let model = self.resolve_model(model_override);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            model
        );
        let started = Instant::now();
        tracing::info!(requested_model = %model, "text model call started");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(TEXT_TIMEOUT)
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(requested_model = %model, error = %e, "text model call failed");
                TextError::Upstream(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                requested_model = %model,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "text model call failed"
            );
            let message = format!("{} {}", status.as_u16(), error_message(&body));
            return Err(friendly_text_error(model, Some(status.as_u16()), message));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TextError::Upstream(e.to_string()))?;
        let effective_model = body["modelVersion"].as_str().unwrap_or(model);
        tracing::info!(
            requested_model = %model,
            effective_model = %effective_model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "text model call complete"
        );
        Ok(response_text(&body))
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Rewrites model-not-found failures into a message naming the knob to fix.
pub fn friendly_text_error(model: &str, status: Option<u16>, message: String) -> TextError {
    let lowered = message.to_lowercase();
    if status == Some(404) || lowered.contains("not found") || lowered.contains("not supported") {
        return TextError::Upstream(format!(
            "Text model '{}' is not supported for generateContent. \
             Set GEMINI_TEXT_MODEL to a supported text model.",
            model
        ));
    }
    TextError::Upstream(message)
}

/// Concatenates the visible text parts of the first candidate.
fn response_text(body: &Value) -> String {
    let Some(parts) = body["candidates"][0]["content"]["parts"].as_array() else {
        return String::new();
    };
    parts
        .iter()
        .filter(|p| !p["thought"].as_bool().unwrap_or(false))
        .filter_map(|p| p["text"].as_str())
        .collect()
}

/// Pulls the first JSON object out of a model reply, tolerating code
/// fences and surrounding prose.
pub fn extract_json(text: &str) -> Option<serde_json::Map<String, Value>> {
    let mut cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.starts_with("```") {
        cleaned = cleaned.trim_matches('`');
        if let Some(rest) = cleaned
            .get(..4)
            .filter(|tag| tag.eq_ignore_ascii_case("json"))
            .and_then(|_| cleaned.get(4..))
        {
            cleaned = rest.trim();
        }
    }
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn coerce_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Null | Value::String(_) | Value::Bool(false) => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub fn parse_questions(text: &str) -> (Vec<String>, Vec<String>) {
    let payload = extract_json(text).unwrap_or_default();
    let mut questions = coerce_list(payload.get("questions"));
    let mut focus_areas = coerce_list(payload.get("focus_areas"));
    if questions.is_empty() {
        questions = prompts::owned(&prompts::FALLBACK_QUESTIONS);
    }
    if focus_areas.is_empty() {
        focus_areas = prompts::owned(&prompts::FALLBACK_FOCUS_AREAS);
    }
    (questions, focus_areas)
}

pub fn parse_score(text: &str) -> InterviewScore {
    let payload = extract_json(text).unwrap_or_default();
    let overall_score = match payload.get("overall_score") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .map(|n| n.clamp(0.0, 100.0) as u32)
    .unwrap_or(prompts::FALLBACK_SCORE);

    let summary = payload
        .get("summary")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(prompts::FALLBACK_SUMMARY)
        .to_string();

    let mut strengths = coerce_list(payload.get("strengths"));
    if strengths.is_empty() {
        strengths = prompts::owned(&prompts::FALLBACK_STRENGTHS);
    }
    let mut improvements = coerce_list(payload.get("improvements"));
    if improvements.is_empty() {
        improvements = prompts::owned(&prompts::FALLBACK_IMPROVEMENTS);
    }

    InterviewScore {
        overall_score,
        summary,
        strengths,
        improvements,
    }
}

pub fn parse_completion(text: &str, answer: &str) -> TurnCompletion {
    let Some(payload) = extract_json(text) else {
        return heuristic_completion(answer);
    };
    let Some(status) = payload
        .get("status")
        .and_then(Value::as_str)
        .and_then(Completion::parse)
    else {
        return heuristic_completion(answer);
    };
    let confidence = payload
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.5);
    TurnCompletion { status, confidence }
}

/// The configured text backend.
#[derive(Debug, Clone)]
pub enum TextGenerator {
    Mock,
    Gemini(GeminiText),
}

impl TextGenerator {
    pub fn from_config(models: &ModelsConfig, client: reqwest::Client) -> Self {
        match models.adapter {
            Adapter::Mock => Self::Mock,
            Adapter::Gemini => Self::Gemini(GeminiText::new(
                &models.api_base,
                &models.api_key,
                &models.text_model,
                client,
            )),
        }
    }

    /// `mock` or `gemini`; stored on each interview record.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mock => Adapter::Mock.as_str(),
            Self::Gemini(_) => Adapter::Gemini.as_str(),
        }
    }

    pub async fn generate_questions(
        &self,
        resume_text: &str,
        job_text: &str,
        role_title: Option<&str>,
        model: Option<&str>,
    ) -> Result<(Vec<String>, Vec<String>), TextError> {
        match self {
            Self::Mock => Ok((
                prompts::owned(&prompts::MOCK_QUESTIONS),
                prompts::owned(&prompts::MOCK_FOCUS_AREAS),
            )),
            Self::Gemini(gemini) => {
                let prompt = prompts::questions_prompt(resume_text, job_text, role_title);
                let text = gemini.generate(&prompt, model).await?;
                Ok(parse_questions(&text))
            }
        }
    }

    pub async fn coach_reply(
        &self,
        system_prompt: &str,
        candidate_text: &str,
        model: Option<&str>,
    ) -> Result<String, TextError> {
        match self {
            Self::Mock => Ok(prompts::MOCK_VOICE_REPLY.to_string()),
            Self::Gemini(gemini) => {
                let prompt = prompts::coach_reply_prompt(system_prompt, candidate_text);
                gemini.generate(&prompt, model).await
            }
        }
    }

    pub async fn intro(
        &self,
        system_prompt: &str,
        role_title: Option<&str>,
        questions: &[String],
        model: Option<&str>,
    ) -> Result<String, TextError> {
        match self {
            Self::Mock => Ok(prompts::mock_intro(questions)),
            Self::Gemini(gemini) => {
                let prompt = prompts::intro_prompt(system_prompt, role_title);
                gemini.generate(&prompt, model).await
            }
        }
    }

    pub async fn help(
        &self,
        system_prompt: &str,
        request: &str,
        model: Option<&str>,
    ) -> Result<String, TextError> {
        match self {
            Self::Mock => Ok(prompts::MOCK_HELP_REPLY.to_string()),
            Self::Gemini(gemini) => {
                let prompt = prompts::help_prompt(system_prompt, request);
                gemini.generate(&prompt, model).await
            }
        }
    }

    pub async fn score(
        &self,
        transcript: &[TranscriptEntry],
        role_title: Option<&str>,
        focus_areas: &[String],
        model: Option<&str>,
    ) -> Result<InterviewScore, TextError> {
        match self {
            Self::Mock => Ok(prompts::mock_score()),
            Self::Gemini(gemini) => {
                let prompt = prompts::score_prompt(transcript, role_title, focus_areas);
                let text = gemini.generate(&prompt, model).await?;
                Ok(parse_score(&text))
            }
        }
    }

    pub async fn turn_completion(
        &self,
        question: Option<&str>,
        answer: &str,
        model: Option<&str>,
    ) -> Result<TurnCompletion, TextError> {
        match self {
            Self::Mock => Ok(heuristic_completion(answer)),
            Self::Gemini(gemini) => {
                let prompt = prompts::completion_prompt(question, answer);
                let text = gemini.generate(&prompt, model).await?;
                Ok(parse_completion(&text, answer))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_handles_fences_and_prose() {
        let fenced = "```json\n{\"questions\": [\"A?\"]}\n```";
        assert_eq!(extract_json(fenced).unwrap()["questions"][0], "A?");

        let prose = "Sure! Here you go: {\"a\": 1} Hope that helps.";
        assert_eq!(extract_json(prose).unwrap()["a"], 1);

        assert!(extract_json("no json here").is_none());
        assert!(extract_json("{not valid}").is_none());
        assert!(extract_json("").is_none());
    }

    #[test]
    fn questions_fall_back_per_field() {
        let (questions, focus) = parse_questions(r#"{"questions": ["Why us?"], "focus_areas": []}"#);
        assert_eq!(questions, vec!["Why us?".to_string()]);
        assert_eq!(focus, prompts::owned(&prompts::FALLBACK_FOCUS_AREAS));

        let (questions, _) = parse_questions("garbage");
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[0], prompts::FALLBACK_QUESTIONS[0]);
    }

    #[test]
    fn score_parsing_coerces_and_defaults() {
        let score = parse_score(
            r#"{"overall_score": "91", "summary": "Great.", "strengths": "Concise", "improvements": null}"#,
        );
        assert_eq!(score.overall_score, 91);
        assert_eq!(score.summary, "Great.");
        assert_eq!(score.strengths, vec!["Concise".to_string()]);
        assert_eq!(score.improvements, prompts::owned(&prompts::FALLBACK_IMPROVEMENTS));

        let fallback = parse_score(r#"{"overall_score": "high"}"#);
        assert_eq!(fallback.overall_score, 80);
        assert_eq!(fallback.summary, prompts::FALLBACK_SUMMARY);

        assert_eq!(parse_score(r#"{"overall_score": 140}"#).overall_score, 100);
    }

    #[test]
    fn completion_heuristic() {
        assert_eq!(heuristic_completion("   ").status, Completion::NotAnswered);
        assert_eq!(heuristic_completion("I led the").status, Completion::Partial);
        let long = "I led the migration of our hiring pipeline and cut time to fill by a third.";
        let verdict = heuristic_completion(long);
        assert_eq!(verdict.status, Completion::Complete);
        assert_eq!(verdict.confidence, 0.8);
    }

    #[test]
    fn completion_parses_model_verdict() {
        let verdict = parse_completion(r#"{"status": "complete", "confidence": 0.95}"#, "x");
        assert_eq!(verdict.status, Completion::Complete);
        assert!((verdict.confidence - 0.95).abs() < 1e-6);

        let fallback = parse_completion(r#"{"status": "maybe"}"#, "short");
        assert_eq!(fallback.status, Completion::Partial);
    }

    #[test]
    fn unsupported_model_error_names_the_knob() {
        let err = friendly_text_error("old-model", Some(404), "404 models/old-model is not found".into());
        assert_eq!(
            err.to_string(),
            "Text model 'old-model' is not supported for generateContent. \
             Set GEMINI_TEXT_MODEL to a supported text model."
        );
        let other = friendly_text_error("m", Some(500), "500 internal".into());
        assert_eq!(other.to_string(), "500 internal");
    }

    #[test]
    fn response_text_skips_thoughts() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "thinking...", "thought": true },
                        { "text": "Hello " },
                        { "text": "there." }
                    ]
                }
            }]
        });
        assert_eq!(response_text(&body), "Hello there.");
        assert_eq!(response_text(&json!({})), "");
    }

    #[tokio::test]
    async fn gemini_without_key_is_unavailable() {
        let generator = TextGenerator::Gemini(GeminiText::new(
            "http://127.0.0.1:9",
            "",
            "gemini-2.5-flash",
            reqwest::Client::new(),
        ));
        let err = generator.coach_reply("sys", "hi", None).await.unwrap_err();
        assert!(matches!(err, TextError::Unavailable(_)));
        assert_eq!(generator.name(), "gemini");
    }
}
