//! Integration tests for the interview HTTP surface, run against the mock
//! adapter with a temporary session store.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use coach_server::config::{Adapter, Config};
use coach_server::prompts::{MOCK_QUESTIONS, MOCK_VOICE_REPLY};
use coach_server::{app, build_state};
use coach_voice::OutputMode;
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot

fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.store.dir = dir.path().to_string_lossy().into_owned();
    config
}

fn test_app(config: &Config) -> Router {
    app(build_state(config).unwrap())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_interview(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/interviews",
        Some(json!({ "role_title": "Recruiter", "resume_text": "Ran hiring for 40 roles." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["interview_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_version() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn create_returns_mock_questions_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));

    let (status, created) = send(
        &app,
        "POST",
        "/api/interviews",
        Some(json!({ "role_title": "  Recruiter  " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["adapter"], "mock");
    assert_eq!(created["questions"].as_array().unwrap().len(), 4);
    assert_eq!(created["questions"][0], MOCK_QUESTIONS[0]);
    assert_eq!(created["focus_areas"][1], "Stakeholder alignment");
    let statuses = created["question_statuses"].as_array().unwrap();
    assert_eq!(statuses.len(), 4);
    assert!(statuses.iter().all(|s| s["status"] == "not_started"));

    let id = created["interview_id"].as_str().unwrap();
    let (status, summary) = send(&app, "GET", &format!("/api/interviews/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["interview_id"], id);
    assert_eq!(summary["role_title"], "Recruiter");
    assert!(summary["asked_question_index"].is_null());
    assert!(summary["overall_score"].is_null());
    assert_eq!(summary["strengths"], json!([]));
    assert_eq!(summary["transcript"], json!([]));
}

#[tokio::test]
async fn supplied_questions_skip_generation() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let (status, created) = send(
        &app,
        "POST",
        "/api/interviews",
        Some(json!({ "questions": ["Why this team?", "  "], "focus_areas": ["Clarity"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["questions"], json!(["Why this team?"]));
    assert_eq!(created["focus_areas"], json!(["Clarity"]));
}

#[tokio::test]
async fn turn_records_both_sides_and_returns_audio() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/api/interviews/{id}/turn"),
        Some(json!({ "text": "  I rebuilt our onboarding flow.  " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["interview_id"], id.as_str());
    assert_eq!(reply["candidate"]["role"], "candidate");
    assert_eq!(reply["candidate"]["text"], "I rebuilt our onboarding flow.");
    assert_eq!(reply["coach"]["role"], "coach");
    assert_eq!(reply["coach"]["text"], MOCK_VOICE_REPLY);
    assert!(!reply["coach_audio"].as_str().unwrap().is_empty());
    assert_eq!(reply["coach_audio_mime"], "audio/wav");

    let (_, summary) = send(&app, "GET", &format!("/api/interviews/{id}"), None).await;
    let roles: Vec<&str> = summary["transcript"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["candidate", "coach"]);
}

#[tokio::test]
async fn tts_override_falls_through_to_configured_order() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/api/interviews/{id}/turn"),
        Some(json!({ "text": "Hello.", "tts_model": "gemini-tts-x" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["coach_audio_mime"], "audio/wav");
}

#[tokio::test]
async fn empty_turn_text_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/interviews/{id}/turn"),
        Some(json!({ "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Text is required");

    let (_, summary) = send(&app, "GET", &format!("/api/interviews/{id}"), None).await;
    assert_eq!(summary["transcript"], json!([]));
}

#[tokio::test]
async fn unknown_interview_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));

    let (status, body) = send(&app, "GET", "/api/interviews/missing-id", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Interview not found");

    let (status, _) = send(
        &app,
        "POST",
        "/api/interviews/missing-id/turn",
        Some(json!({ "text": "Hi." })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/api/interviews/missing-id/reset", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn browser_output_mode_skips_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.voice.output_mode = OutputMode::Browser;
    let app = test_app(&config);
    let id = create_interview(&app).await;

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/api/interviews/{id}/turn"),
        Some(json!({ "text": "I cut time to hire." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply["coach_audio"].is_null());
    assert!(reply["coach_audio_mime"].is_null());
}

#[tokio::test]
async fn intro_asks_first_question_and_marks_it_started() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;

    let (status, reply) = send(&app, "POST", &format!("/api/interviews/{id}/intro"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        reply["coach"]["text"],
        format!("Welcome. Let's begin. {}", MOCK_QUESTIONS[0])
    );

    let (_, summary) = send(&app, "GET", &format!("/api/interviews/{id}"), None).await;
    assert_eq!(summary["asked_question_index"], 0);
    assert_eq!(summary["question_statuses"][0]["status"], "started");
}

#[tokio::test]
async fn help_is_stored_as_coach_feedback() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;

    let (status, reply) = send(
        &app,
        "POST",
        &format!("/api/interviews/{id}/help"),
        Some(json!({ "text": "Can you give me a draft?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["coach"]["role"], "coach_feedback");

    let (_, summary) = send(&app, "GET", &format!("/api/interviews/{id}"), None).await;
    assert_eq!(summary["transcript"][1]["role"], "coach_feedback");
}

#[tokio::test]
async fn feedback_scores_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;

    let (status, body) = send(&app, "POST", &format!("/api/interviews/{id}/feedback"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Transcript is required");

    send(
        &app,
        "POST",
        &format!("/api/interviews/{id}/turn"),
        Some(json!({ "text": "I reduced time-to-fill by 18%." })),
    )
    .await;

    let (status, feedback) =
        send(&app, "POST", &format!("/api/interviews/{id}/feedback"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feedback["overall_score"], 84);
    assert_eq!(feedback["strengths"][0], "Uses quantified impact");
    assert_eq!(feedback["feedback"]["role"], "coach_feedback");

    let (_, summary) = send(&app, "GET", &format!("/api/interviews/{id}"), None).await;
    assert_eq!(summary["overall_score"], 84);
    assert_eq!(
        summary["summary"],
        "Clear structure and concise metrics. Add a sharper closing that ties to the role."
    );
    let transcript = summary["transcript"].as_array().unwrap();
    assert_eq!(transcript.last().unwrap()["role"], "coach_feedback");
}

#[tokio::test]
async fn feedback_uses_supplied_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/interviews/{id}/feedback"),
        Some(json!({
            "transcript": [
                { "role": "coach", "text": "Tell me about a win.", "timestamp": "00:00" },
                { "role": "candidate", "text": "I cut time to hire.", "timestamp": "00:10" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, summary) = send(&app, "GET", &format!("/api/interviews/{id}"), None).await;
    let transcript = summary["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[0]["text"], "Tell me about a win.");
}

#[tokio::test]
async fn reset_clears_progress() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;

    send(&app, "POST", &format!("/api/interviews/{id}/intro"), None).await;
    send(
        &app,
        "POST",
        &format!("/api/interviews/{id}/turn"),
        Some(json!({ "text": "Answer." })),
    )
    .await;

    let (status, body) = send(&app, "POST", &format!("/api/interviews/{id}/reset"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "interview_id": id, "status": "reset" }));

    let (_, summary) = send(&app, "GET", &format!("/api/interviews/{id}"), None).await;
    assert_eq!(summary["transcript"], json!([]));
    assert!(summary["asked_question_index"].is_null());
    assert_eq!(summary["question_statuses"][0]["status"], "not_started");
}

#[tokio::test]
async fn question_status_updates_and_validation() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/interviews/{id}/questions/1/status"),
        Some(json!({ "status": "answered" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["index"], 1);
    assert_eq!(body["status"], "answered");
    assert_eq!(body["asked_question_index"], 1);
    assert_eq!(body["question_statuses"][1]["status"], "answered");
    assert!(!body["updated_at"].as_str().unwrap().is_empty());

    // Earlier questions never move progress backwards.
    let (_, body) = send(
        &app,
        "PUT",
        &format!("/api/interviews/{id}/questions/0/status"),
        Some(json!({ "status": "started" })),
    )
    .await;
    assert_eq!(body["asked_question_index"], 1);

    // A non-user source cannot downgrade an answered question.
    let (_, body) = send(
        &app,
        "PUT",
        &format!("/api/interviews/{id}/questions/1/status"),
        Some(json!({ "status": "started", "source": "live" })),
    )
    .await;
    assert_eq!(body["status"], "answered");

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/interviews/{id}/questions/9/status"),
        Some(json!({ "status": "started" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/interviews/{id}/questions/0/status"),
        Some(json!({ "status": "done" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid question status: done");
}

#[tokio::test]
async fn turn_check_classifies_answers() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(&test_config(&dir));
    let id = create_interview(&app).await;
    let uri = format!("/api/interviews/{id}/turn-check");

    let (status, partial) = send(&app, "POST", &uri, Some(json!({ "text": "So I was" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(partial["status"], "partial");
    assert_eq!(partial["interview_id"], id.as_str());

    let (_, complete) = send(
        &app,
        "POST",
        &uri,
        Some(json!({
            "text": "I set up weekly calibration with each hiring manager and cut time to fill by eighteen percent."
        })),
    )
    .await;
    assert_eq!(complete["status"], "complete");
    assert!(complete["confidence"].as_f64().unwrap() > 0.5);

    let (_, summary) = send(&app, "GET", &format!("/api/interviews/{id}"), None).await;
    assert_eq!(summary["transcript"], json!([]));
}

#[tokio::test]
async fn gemini_adapter_without_key_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.models.adapter = Adapter::Gemini;
    let app = test_app(&config);

    let (status, body) = send(&app, "POST", "/api/interviews", Some(json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "GEMINI_API_KEY is required for the Gemini adapter.");

    let (status, created) = send(
        &app,
        "POST",
        "/api/interviews",
        Some(json!({ "questions": ["Why us?"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["adapter"], "gemini");

    let id = created["interview_id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/interviews/{id}/turn"),
        Some(json!({ "text": "Because." })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
