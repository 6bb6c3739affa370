//! WebSocket transport for live coaching sessions.
//!
//! One socket carries at most one live bridge at a time. Client frames are
//! JSON text (`start`, `stop`, `audio`, `activity`, `ping`, `speak`,
//! `barge_in`) or raw binary PCM16 microphone audio. Bridge events are
//! relayed back as JSON text frames.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        ConnectInfo, Extension,
    },
    response::IntoResponse,
};
use base64::Engine;
use coach_live::{ActivityState, BridgeEvent, LiveBridge, LiveStatus};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long a stopped session's relay may take to drain its last events.
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Incoming client frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Start {
        #[serde(default)]
        interview_id: Option<String>,
    },
    Stop,
    Audio {
        data: String,
    },
    Activity {
        state: String,
    },
    Ping,
    Speak {
        text: String,
    },
    BargeIn,
}

/// Outgoing server frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Status {
        state: &'static str,
    },
    Session {
        interview_id: String,
        session_id: String,
        adapter: &'static str,
        live_model: String,
        mode: &'static str,
    },
    Transcript {
        role: &'static str,
        text: String,
        timestamp: String,
        is_final: bool,
    },
    Audio {
        encoding: String,
        sample_rate: u32,
        data: String,
    },
    Error {
        message: String,
    },
}

impl From<BridgeEvent> for ServerFrame {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Status(status) => ServerFrame::Status {
                state: status.as_str(),
            },
            BridgeEvent::Transcript { entry, is_final } => ServerFrame::Transcript {
                role: entry.role.as_str(),
                text: entry.text,
                timestamp: entry.timestamp,
                is_final,
            },
            BridgeEvent::Audio {
                encoding,
                sample_rate,
                data,
            } => ServerFrame::Audio {
                encoding,
                sample_rate,
                data: base64::engine::general_purpose::STANDARD.encode(data),
            },
            BridgeEvent::Error(message) => ServerFrame::Error { message },
        }
    }
}

async fn send_frame(tx: &mpsc::Sender<String>, frame: &ServerFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if tx.send(json).await.is_err() {
                tracing::debug!("client socket closed before frame was sent");
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize WebSocket frame: {}", e);
        }
    }
}

async fn send_status(tx: &mpsc::Sender<String>, status: LiveStatus) {
    send_frame(
        tx,
        &ServerFrame::Status {
            state: status.as_str(),
        },
    )
    .await;
}

async fn send_ws_error(tx: &mpsc::Sender<String>, message: impl Into<String>) {
    send_frame(
        tx,
        &ServerFrame::Error {
            message: message.into(),
        },
    )
    .await;
}

/// A running bridge and the task relaying its events to the socket.
struct LiveHandle {
    bridge: LiveBridge,
    relay: JoinHandle<()>,
}

impl LiveHandle {
    /// Stops the bridge and waits for the relay to forward its final events.
    async fn shutdown(self) {
        let LiveHandle { bridge, relay } = self;
        bridge.stop().await;
        drop(bridge);
        drain(relay).await;
    }
}

/// Waits for a relay whose bridge is gone to forward what is queued.
async fn drain(mut relay: JoinHandle<()>) {
    if tokio::time::timeout(RELAY_DRAIN_TIMEOUT, &mut relay)
        .await
        .is_err()
    {
        tracing::warn!("live event relay did not drain in time");
        relay.abort();
    }
}

async fn relay_events(mut events: mpsc::Receiver<BridgeEvent>, tx: mpsc::Sender<String>) {
    while let Some(event) = events.recv().await {
        let frame = ServerFrame::from(event);
        match serde_json::to_string(&frame) {
            Ok(json) => {
                if tx.send(json).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::error!("failed to serialize live event: {}", e),
        }
    }
}

/// Handler for `GET /ws/live`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(remote_addr = %addr, "live websocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn start_session(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<String>,
    interview_id: Option<String>,
) -> Option<LiveHandle> {
    let Some(interview_id) = interview_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
    else {
        send_ws_error(tx, "interview_id is required.").await;
        return None;
    };

    let store = Arc::clone(&state.store);
    let lookup_id = interview_id.clone();
    let exists = tokio::task::spawn_blocking(move || store.exists(&lookup_id))
        .await
        .unwrap_or(false);
    if !exists {
        send_ws_error(tx, "Interview not found.").await;
        return None;
    }

    let (events_tx, events_rx) = mpsc::channel(256);
    let bridge = LiveBridge::new(
        interview_id.clone(),
        Arc::clone(&state.store),
        Arc::clone(&state.connector),
        state.live_synthesizer(),
        state.live.clone(),
        events_tx,
    );
    let mode = bridge.mode();

    // Bridge events stay queued until the session frame has gone out.
    if let Err(e) = bridge.connect().await {
        tracing::warn!(interview_id = %interview_id, error = %e, "live session failed to start");
        send_ws_error(tx, e.client_message()).await;
        send_status(tx, LiveStatus::GeminiError).await;
        return None;
    }

    send_frame(
        tx,
        &ServerFrame::Session {
            interview_id: interview_id.clone(),
            session_id: format!("{}-{}", mode, uuid::Uuid::new_v4()),
            adapter: state.text.name(),
            live_model: state.models.live_model.clone(),
            mode,
        },
    )
    .await;
    let relay = tokio::spawn(relay_events(events_rx, tx.clone()));
    tracing::info!(interview_id = %interview_id, mode, "live session started");
    Some(LiveHandle { bridge, relay })
}

async fn handle_frame(
    state: &Arc<AppState>,
    tx: &mpsc::Sender<String>,
    live: &mut Option<LiveHandle>,
    frame: ClientFrame,
) {
    match frame {
        ClientFrame::Start { interview_id } => {
            if let Some(previous) = live.take() {
                previous.shutdown().await;
            }
            *live = start_session(state, tx, interview_id).await;
        }
        ClientFrame::Stop => match live.take() {
            Some(handle) => handle.shutdown().await,
            None => send_status(tx, LiveStatus::Stopped).await,
        },
        ClientFrame::Ping => send_status(tx, LiveStatus::Alive).await,
        ClientFrame::Audio { data } => {
            let Some(handle) = live.as_ref() else {
                return;
            };
            match base64::engine::general_purpose::STANDARD.decode(data.trim()) {
                Ok(bytes) => {
                    handle.bridge.send_audio(bytes);
                }
                Err(_) => send_ws_error(tx, "Invalid audio payload.").await,
            }
        }
        ClientFrame::Activity { state: activity } => {
            let Some(handle) = live.as_ref() else {
                return;
            };
            let Some(activity) = ActivityState::parse(activity.trim()) else {
                send_ws_error(tx, "Unknown activity state.").await;
                return;
            };
            if let Err(e) = handle.bridge.send_activity(activity) {
                send_ws_error(tx, e.client_message()).await;
            }
        }
        ClientFrame::Speak { text } => match live.as_ref() {
            Some(handle) => {
                if let Err(e) = handle.bridge.speak(&text) {
                    send_ws_error(tx, e.client_message()).await;
                }
            }
            None => send_ws_error(tx, "No live session. Send start first.").await,
        },
        ClientFrame::BargeIn => {
            if let Some(handle) = live.as_ref() {
                if let Err(e) = handle.bridge.barge_in() {
                    send_ws_error(tx, e.client_message()).await;
                }
            }
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded so a slow client cannot grow memory without limit.
    let (tx, mut rx) = mpsc::channel::<String>(256);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    send_status(&tx, LiveStatus::Connected).await;
    let mut live: Option<LiveHandle> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            AxumMessage::Text(text) => {
                let value = match serde_json::from_str::<serde_json::Value>(text.as_str()) {
                    Ok(value) => value,
                    Err(_) => {
                        send_ws_error(&tx, "Invalid JSON payload.").await;
                        continue;
                    }
                };
                match serde_json::from_value::<ClientFrame>(value) {
                    Ok(frame) => handle_frame(&state, &tx, &mut live, frame).await,
                    Err(_) => send_ws_error(&tx, "Unknown message type.").await,
                }
            }
            AxumMessage::Binary(data) => {
                if let Some(handle) = live.as_ref() {
                    handle.bridge.send_audio(data.to_vec());
                }
            }
            AxumMessage::Close(_) => break,
            _ => {}
        }
    }

    if let Some(handle) = live.take() {
        handle.bridge.stop().await;
        handle.relay.abort();
    }
    send_task.abort();
    tracing::debug!(remote_addr = %addr, "live websocket closed");
}
