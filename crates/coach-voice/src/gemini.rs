//! Gemini `generateContent` speech generation.

use crate::audio::{normalize_for_playback, reassemble_chunks};
use crate::config::GeminiSpeechConfig;
use crate::error::VoiceError;
use crate::provider::{SpeechAudio, SpeechInput, SpeechProvider};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;

const PROVIDER: &str = "gemini";

#[derive(Debug)]
pub struct GeminiSpeech {
    config: GeminiSpeechConfig,
    client: reqwest::Client,
}

impl GeminiSpeech {
    pub fn new(config: GeminiSpeechConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn request_body(&self, input: &SpeechInput) -> Value {
        let mut speech_config = serde_json::Map::new();
        let voice = input.voice.as_deref().unwrap_or(&self.config.voice);
        if !voice.is_empty() {
            speech_config.insert(
                "voiceConfig".to_string(),
                json!({ "prebuiltVoiceConfig": { "voiceName": voice } }),
            );
        }
        let language = input.language.as_deref().unwrap_or(&self.config.language);
        if !language.is_empty() {
            speech_config.insert("languageCode".to_string(), json!(language));
        }

        let mut generation_config = json!({ "responseModalities": ["AUDIO"] });
        if !speech_config.is_empty() {
            generation_config["speechConfig"] = Value::Object(speech_config);
        }
        json!({
            "contents": [{ "parts": [{ "text": input.text }] }],
            "generationConfig": generation_config,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

/// Extracts and reassembles inline audio from a `generateContent` response.
///
/// Returns the normalized audio, or `None` if the response carried none.
pub fn extract_audio(response: &Value) -> Result<Option<SpeechAudio>, VoiceError> {
    let parsed: GenerateResponse = serde_json::from_value(response.clone()).unwrap_or_default();
    let mut chunks = Vec::new();
    let mut mime_type: Option<String> = None;
    let inline = parsed
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.inline_data);
    for data in inline {
        let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(data.data.as_bytes())
        else {
            continue;
        };
        if bytes.is_empty() {
            continue;
        }
        chunks.push(bytes);
        if mime_type.is_none() {
            mime_type = data.mime_type.filter(|m| !m.is_empty());
        }
    }

    let Some((audio, mime_type)) = reassemble_chunks(chunks, mime_type) else {
        return Ok(None);
    };
    let (data, mime_type) = normalize_for_playback(audio, mime_type.as_deref())?;
    Ok(Some(SpeechAudio { data, mime_type }))
}

/// Rewrites model-not-found style failures into an actionable message.
pub fn friendly_error(model: &str, status: Option<u16>, message: String) -> VoiceError {
    let lowered = message.to_lowercase();
    if status == Some(404) || lowered.contains("not found") || lowered.contains("not supported") {
        return VoiceError::UnsupportedModel(format!(
            "TTS model '{}' is not supported for generateContent. \
             Set GEMINI_TTS_MODELS to a supported TTS model.",
            model
        ));
    }
    VoiceError::Upstream {
        provider: PROVIDER.to_string(),
        status,
        message,
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl SpeechProvider for GeminiSpeech {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn synthesize(&self, input: &SpeechInput) -> Result<SpeechAudio, VoiceError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            input.model
        );
        let started = Instant::now();
        tracing::info!(provider = PROVIDER, model = %input.model, "tts call started");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(input.timeout)
            .json(&self.request_body(input))
            .send()
            .await
            .map_err(|e| transport_error(e, started))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} {}", status.as_u16(), error_message(&body));
            tracing::warn!(
                provider = PROVIDER,
                model = %input.model,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "tts call failed"
            );
            return Err(friendly_error(&input.model, Some(status.as_u16()), message));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| transport_error(e, started))?;
        let audio = extract_audio(&body)?.ok_or_else(|| VoiceError::Upstream {
            provider: PROVIDER.to_string(),
            status: None,
            message: "No audio returned from the TTS model.".to_string(),
        })?;

        tracing::info!(
            provider = PROVIDER,
            model = %input.model,
            bytes = audio.data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tts call complete"
        );
        Ok(audio)
    }
}

fn transport_error(err: reqwest::Error, started: Instant) -> VoiceError {
    if err.is_timeout() {
        return VoiceError::Timeout {
            provider: PROVIDER.to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
    }
    VoiceError::Upstream {
        provider: PROVIDER.to_string(),
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm16_to_wav;

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn extracts_and_wraps_pcm_parts() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "ignored" },
                    { "inlineData": { "mimeType": "audio/L16;rate=24000", "data": b64(&[1, 0, 2, 0]) } },
                    { "inlineData": { "mimeType": "audio/L16;rate=24000", "data": b64(&[3, 0]) } }
                ]}
            }]
        });
        let audio = extract_audio(&response).unwrap().unwrap();
        assert_eq!(audio.mime_type, "audio/wav");
        assert!(audio.data.starts_with(b"RIFF"));
        // 44-byte header + 3 samples.
        assert_eq!(audio.data.len(), 44 + 6);
    }

    #[test]
    fn merges_wav_parts() {
        let one = pcm16_to_wav(&[1, 0], 24_000).unwrap();
        let two = pcm16_to_wav(&[2, 0, 3, 0], 24_000).unwrap();
        let response = json!({
            "candidates": [{ "content": { "parts": [
                { "inline_data": { "mime_type": "audio/wav", "data": b64(&one) } },
                { "inline_data": { "mime_type": "audio/wav", "data": b64(&two) } }
            ]}}]
        });
        let audio = extract_audio(&response).unwrap().unwrap();
        assert_eq!(audio.data.len(), 44 + 6);
    }

    #[test]
    fn empty_response_yields_none() {
        assert!(extract_audio(&json!({ "candidates": [] })).unwrap().is_none());
        assert!(extract_audio(&json!({ "unexpected": true })).unwrap().is_none());
    }

    #[test]
    fn unsupported_model_message_names_the_knob() {
        let err = friendly_error("gemini-x", Some(404), "404 models/gemini-x is not found".into());
        assert!(matches!(err, VoiceError::UnsupportedModel(_)));
        assert!(err.to_string().contains("GEMINI_TTS_MODELS"));

        let err = friendly_error("gemini-x", Some(503), "503 overloaded".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn request_body_carries_voice_and_language() {
        let speech = GeminiSpeech::new(GeminiSpeechConfig::default(), reqwest::Client::new());
        let body = speech.request_body(&SpeechInput {
            text: "Hello".into(),
            model: "m".into(),
            voice: Some("Puck".into()),
            language: None,
            timeout: std::time::Duration::from_secs(1),
        });
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
        assert_eq!(body["generationConfig"]["speechConfig"]["languageCode"], "en-US");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
    }
}
