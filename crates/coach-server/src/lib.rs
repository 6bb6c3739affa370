//! Interview coach server library logic.

pub mod api;
pub mod api_interviews;
pub mod api_ws;
pub mod config;
pub mod prompts;
pub mod text_model;
pub mod turn;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Extension, Json, Router,
};
use coach_live::{GeminiLiveConnector, LiveConfig, LiveConnector, MockLiveConnector};
use coach_store::{SessionStore, StoreError};
use coach_voice::{SynthesisOrchestrator, VoiceConfig};
use config::{Adapter, Config, ModelsConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use text_model::TextGenerator;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Upper bound on request bodies (resume and job text included).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Durable interview records.
    pub store: Arc<SessionStore>,
    /// Question generation, coach replies, and scoring.
    pub text: Arc<TextGenerator>,
    /// Upstream realtime model for live sessions.
    pub connector: Arc<dyn LiveConnector>,
    /// Shared speech synthesis pool; `None` when voice output is disabled.
    pub synthesizer: Option<Arc<SynthesisOrchestrator>>,
    pub voice: VoiceConfig,
    pub live: LiveConfig,
    pub models: ModelsConfig,
}

impl AppState {
    /// The synthesizer handed to live bridges for out-of-band speech. Only
    /// set when replies are synthesized server-side.
    pub fn live_synthesizer(&self) -> Option<Arc<SynthesisOrchestrator>> {
        if self.voice.enabled && self.voice.output_mode.synthesizes_on_server() {
            self.synthesizer.clone()
        } else {
            None
        }
    }
}

/// Builds shared state from configuration.
///
/// The mock adapter swaps in the scripted live connector and the mock
/// speech provider so the whole flow runs without credentials.
pub fn build_state(config: &Config) -> Result<AppState, StoreError> {
    let store = Arc::new(SessionStore::open(&config.store.dir)?);
    let client = reqwest::Client::new();

    let mut voice = config.voice.clone();
    let connector: Arc<dyn LiveConnector> = match config.models.adapter {
        Adapter::Mock => {
            voice.provider_order = vec!["mock".to_string()];
            Arc::new(MockLiveConnector::new(config.live.mock_chunks_per_reply))
        }
        Adapter::Gemini => Arc::new(GeminiLiveConnector::new(
            config.models.api_key.clone(),
            config.models.live_model.clone(),
            config.live.ws_base.clone(),
            config.live.client_activity_detection,
        )),
    };

    let synthesizer = if voice.enabled {
        let orchestrator = SynthesisOrchestrator::from_config(&voice, client.clone());
        if !orchestrator.has_configured_provider() {
            tracing::warn!("no speech provider has credentials; replies will be text only");
        }
        Some(Arc::new(orchestrator))
    } else {
        None
    };

    tracing::info!(
        adapter = config.models.adapter.as_str(),
        store_dir = %config.store.dir,
        voice_enabled = voice.enabled,
        output_mode = ?voice.output_mode,
        "application state initialized"
    );

    Ok(AppState {
        store,
        text: Arc::new(TextGenerator::from_config(&config.models, client)),
        connector,
        synthesizer,
        voice,
        live: config.live.clone(),
        models: config.models.clone(),
    })
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/interviews",
            post(api_interviews::create_interview_handler),
        )
        .route(
            "/api/interviews/{interview_id}",
            get(api_interviews::get_interview_handler),
        )
        .route(
            "/api/interviews/{interview_id}/intro",
            post(api_interviews::intro_handler),
        )
        .route(
            "/api/interviews/{interview_id}/turn",
            post(api_interviews::turn_handler),
        )
        .route(
            "/api/interviews/{interview_id}/help",
            post(api_interviews::help_handler),
        )
        .route(
            "/api/interviews/{interview_id}/feedback",
            post(api_interviews::feedback_handler),
        )
        .route(
            "/api/interviews/{interview_id}/turn-check",
            post(api_interviews::turn_check_handler),
        )
        .route(
            "/api/interviews/{interview_id}/reset",
            post(api_interviews::reset_handler),
        )
        .route(
            "/api/interviews/{interview_id}/questions/{index}/status",
            put(api_interviews::question_status_handler),
        )
        .route("/ws/live", get(api_ws::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
