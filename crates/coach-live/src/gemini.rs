//! Gemini Live (`BidiGenerateContent`) over WebSocket.

use crate::error::LiveError;
use crate::upstream::{
    ActivityState, LiveConnector, LiveSetup, ModelEvent, Outbound, UpstreamSession, UpstreamSink,
    UpstreamStream,
};
use async_trait::async_trait;
use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);
const ENDPOINT_PATH: &str =
    "/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub struct GeminiLiveConnector {
    api_key: String,
    model: String,
    ws_base: String,
    client_activity_detection: bool,
}

impl fmt::Debug for GeminiLiveConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiLiveConnector")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("ws_base", &self.ws_base)
            .field("client_activity_detection", &self.client_activity_detection)
            .finish()
    }
}

impl GeminiLiveConnector {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        ws_base: impl Into<String>,
        client_activity_detection: bool,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ws_base: ws_base.into(),
            client_activity_detection,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn setup_message(&self, setup: &LiveSetup) -> Value {
        setup_message(&self.model, &setup.system_prompt, self.client_activity_detection)
    }
}

/// Session setup: audio out, transcription in both directions.
pub fn setup_message(model: &str, system_prompt: &str, client_activity_detection: bool) -> Value {
    let mut setup = json!({
        "model": format!("models/{}", model),
        "generationConfig": { "responseModalities": ["AUDIO"] },
        "systemInstruction": { "parts": [{ "text": system_prompt }] },
        "inputAudioTranscription": {},
        "outputAudioTranscription": {},
    });
    if client_activity_detection {
        setup["realtimeInputConfig"] = json!({
            "automaticActivityDetection": { "disabled": true }
        });
    }
    json!({ "setup": setup })
}

/// Encodes an outbound message. Returns `None` for messages that must not
/// be sent in the current mode.
pub fn encode_outbound(message: &Outbound, client_activity_detection: bool) -> Option<Value> {
    let value = match message {
        Outbound::Audio(chunk) => json!({
            "realtimeInput": {
                "audio": {
                    "data": base64::engine::general_purpose::STANDARD.encode(&chunk.data),
                    "mimeType": chunk.mime_type,
                }
            }
        }),
        Outbound::Text {
            text,
            turn_complete,
        } => json!({
            "clientContent": {
                "turns": [{ "role": "user", "parts": [{ "text": text }] }],
                "turnComplete": turn_complete,
            }
        }),
        Outbound::Activity(_) if !client_activity_detection => return None,
        Outbound::Activity(ActivityState::Start) => {
            json!({ "realtimeInput": { "activityStart": {} } })
        }
        Outbound::Activity(ActivityState::End) => {
            json!({ "realtimeInput": { "activityEnd": {} } })
        }
        Outbound::AudioStreamEnd => json!({ "realtimeInput": { "audioStreamEnd": true } }),
    };
    Some(value)
}

/// Decodes one server message into bridge events, in emission order.
pub fn parse_server_message(value: &Value) -> Vec<ModelEvent> {
    let mut events = Vec::new();
    if value.get("setupComplete").is_some() {
        events.push(ModelEvent::SetupComplete);
    }
    let Some(content) = value.get("serverContent") else {
        return events;
    };

    if let Some(text) = content["outputTranscription"]["text"].as_str() {
        if !text.is_empty() {
            events.push(ModelEvent::OutputTranscript(text.to_string()));
        }
    }
    if let Some(text) = content["inputTranscription"]["text"].as_str() {
        if !text.is_empty() {
            events.push(ModelEvent::InputTranscript(text.to_string()));
        }
    }
    if let Some(parts) = content["modelTurn"]["parts"].as_array() {
        for part in parts {
            if part["thought"].as_bool() == Some(true) {
                continue;
            }
            if let Some(text) = part["text"].as_str() {
                if !text.is_empty() {
                    events.push(ModelEvent::Text(text.to_string()));
                }
            }
            let inline = &part["inlineData"];
            let Some(data) = inline["data"].as_str() else {
                continue;
            };
            match base64::engine::general_purpose::STANDARD.decode(data) {
                Ok(bytes) if !bytes.is_empty() => events.push(ModelEvent::Audio {
                    data: bytes,
                    mime_type: inline["mimeType"].as_str().map(str::to_string),
                }),
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "skipping undecodable audio part"),
            }
        }
    }
    if content["interrupted"].as_bool() == Some(true) {
        events.push(ModelEvent::Interrupted);
    }
    if content["turnComplete"].as_bool() == Some(true) {
        events.push(ModelEvent::TurnComplete);
    }
    events
}

enum Frame {
    Events(Vec<ModelEvent>),
    /// Close frame; `Some` carries an abnormal close reason.
    Closed(Option<String>),
    Ignore,
}

fn decode_frame(message: Message) -> Result<Frame, LiveError> {
    let value: Value = match message {
        Message::Text(text) => serde_json::from_str(text.as_str())
            .map_err(|e| LiveError::Protocol(e.to_string()))?,
        Message::Binary(data) => {
            serde_json::from_slice(&data).map_err(|e| LiveError::Protocol(e.to_string()))?
        }
        Message::Close(frame) => {
            let reason = frame.and_then(|f| {
                if f.code == CloseCode::Normal {
                    None
                } else {
                    Some(format!("{} {}", u16::from(f.code), f.reason.as_str()))
                }
            });
            return Ok(Frame::Closed(reason));
        }
        _ => return Ok(Frame::Ignore),
    };
    Ok(Frame::Events(parse_server_message(&value)))
}

struct GeminiSink {
    write: SplitSink<WsStream, Message>,
    client_activity_detection: bool,
}

#[async_trait]
impl UpstreamSink for GeminiSink {
    async fn send(&mut self, message: Outbound) -> Result<(), LiveError> {
        let Some(value) = encode_outbound(&message, self.client_activity_detection) else {
            tracing::debug!("activity hint ignored; server-side detection is active");
            return Ok(());
        };
        self.write
            .send(Message::Text(value.to_string().into()))
            .await
            .map_err(|e| LiveError::Upstream(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), LiveError> {
        let _ = self.write.send(Message::Close(None)).await;
        self.write
            .close()
            .await
            .map_err(|e| LiveError::Upstream(e.to_string()))
    }
}

struct GeminiStream {
    read: SplitStream<WsStream>,
    pending: VecDeque<ModelEvent>,
}

#[async_trait]
impl UpstreamStream for GeminiStream {
    async fn next_event(&mut self) -> Option<Result<ModelEvent, LiveError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            let message = match self.read.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(LiveError::Upstream(e.to_string()))),
            };
            match decode_frame(message) {
                Ok(Frame::Events(events)) => self.pending.extend(events),
                Ok(Frame::Ignore) => {}
                Ok(Frame::Closed(None)) => return None,
                Ok(Frame::Closed(Some(reason))) => return Some(Err(LiveError::Upstream(reason))),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    fn mode(&self) -> &'static str {
        "gemini"
    }

    async fn connect(&self, setup: LiveSetup) -> Result<UpstreamSession, LiveError> {
        if self.api_key.is_empty() {
            return Err(LiveError::Unavailable(
                "GEMINI_API_KEY is required for Gemini Live.".to_string(),
            ));
        }
        let url = format!(
            "{}{}?key={}",
            self.ws_base.trim_end_matches('/'),
            ENDPOINT_PATH,
            self.api_key
        );
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| LiveError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        write
            .send(Message::Text(self.setup_message(&setup).to_string().into()))
            .await
            .map_err(|e| LiveError::Connect(e.to_string()))?;

        let mut pending = VecDeque::new();
        let handshake = async {
            loop {
                let message = match read.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(LiveError::Connect(e.to_string())),
                    None => {
                        return Err(LiveError::Connect(
                            "connection closed during setup".to_string(),
                        ))
                    }
                };
                match decode_frame(message)? {
                    Frame::Events(events) => {
                        let ready = events.contains(&ModelEvent::SetupComplete);
                        pending.extend(
                            events
                                .into_iter()
                                .filter(|e| *e != ModelEvent::SetupComplete),
                        );
                        if ready {
                            return Ok(());
                        }
                    }
                    Frame::Ignore => {}
                    Frame::Closed(reason) => {
                        return Err(LiveError::Connect(
                            reason.unwrap_or_else(|| "closed during setup".to_string()),
                        ))
                    }
                }
            }
        };
        tokio::time::timeout(SETUP_TIMEOUT, handshake)
            .await
            .map_err(|_| LiveError::Connect("timed out waiting for setup".to_string()))??;

        tracing::info!(
            interview_id = %setup.interview_id,
            model = %self.model,
            "gemini live session established"
        );
        Ok(UpstreamSession {
            sink: Box::new(GeminiSink {
                write,
                client_activity_detection: self.client_activity_detection,
            }),
            stream: Box::new(GeminiStream { read, pending }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coach_types::LiveAudioChunk;

    #[test]
    fn setup_requests_audio_and_both_transcriptions() {
        let setup = setup_message("gemini-live", "Be a coach.", false);
        assert_eq!(setup["setup"]["model"], "models/gemini-live");
        assert_eq!(setup["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
        assert!(setup["setup"]["inputAudioTranscription"].is_object());
        assert!(setup["setup"]["outputAudioTranscription"].is_object());
        assert_eq!(
            setup["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be a coach."
        );
        assert!(setup["setup"].get("realtimeInputConfig").is_none());

        let manual = setup_message("m", "p", true);
        assert_eq!(
            manual["setup"]["realtimeInputConfig"]["automaticActivityDetection"]["disabled"],
            true
        );
    }

    #[test]
    fn outbound_encoding() {
        let audio = encode_outbound(
            &Outbound::Audio(LiveAudioChunk::pcm16(vec![1, 2, 3], 24_000)),
            false,
        )
        .unwrap();
        assert_eq!(audio["realtimeInput"]["audio"]["data"], "AQID");
        assert_eq!(audio["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=24000");

        let text = encode_outbound(
            &Outbound::Text {
                text: "hi".into(),
                turn_complete: true,
            },
            false,
        )
        .unwrap();
        assert_eq!(text["clientContent"]["turns"][0]["parts"][0]["text"], "hi");
        assert_eq!(text["clientContent"]["turnComplete"], true);

        assert!(encode_outbound(&Outbound::Activity(ActivityState::Start), false).is_none());
        let start = encode_outbound(&Outbound::Activity(ActivityState::Start), true).unwrap();
        assert!(start["realtimeInput"]["activityStart"].is_object());
    }

    #[test]
    fn server_content_events_in_order() {
        let message = json!({
            "serverContent": {
                "outputTranscription": { "text": "Tell me" },
                "inputTranscription": { "text": "I led" },
                "modelTurn": { "parts": [
                    { "text": "thinking", "thought": true },
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQI=" } }
                ]},
                "turnComplete": true
            }
        });
        assert_eq!(
            parse_server_message(&message),
            vec![
                ModelEvent::OutputTranscript("Tell me".into()),
                ModelEvent::InputTranscript("I led".into()),
                ModelEvent::Audio {
                    data: vec![1, 2],
                    mime_type: Some("audio/pcm;rate=24000".into())
                },
                ModelEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn setup_complete_and_interruptions() {
        assert_eq!(
            parse_server_message(&json!({ "setupComplete": {} })),
            vec![ModelEvent::SetupComplete]
        );
        assert_eq!(
            parse_server_message(&json!({ "serverContent": { "interrupted": true } })),
            vec![ModelEvent::Interrupted]
        );
        assert!(parse_server_message(&json!({ "usageMetadata": {} })).is_empty());
    }

    #[test]
    fn abnormal_close_is_an_error() {
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;

        let frame = Message::Close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: "RESOURCE_EXHAUSTED".into(),
        }));
        assert!(matches!(decode_frame(frame), Ok(Frame::Closed(Some(r))) if r.contains("RESOURCE_EXHAUSTED")));

        let normal = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        assert!(matches!(decode_frame(normal), Ok(Frame::Closed(None))));
    }
}
