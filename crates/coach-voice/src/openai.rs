//! OpenAI `/v1/audio/speech`.

use crate::audio::{format_to_mime, pcm16_to_wav, WAV_MIME};
use crate::config::OpenAiSpeechConfig;
use crate::error::VoiceError;
use crate::provider::{SpeechAudio, SpeechInput, SpeechProvider};
use async_trait::async_trait;
use coach_types::DEFAULT_SAMPLE_RATE;
use serde_json::json;
use std::time::Instant;

const PROVIDER: &str = "openai";

#[derive(Debug)]
pub struct OpenAiSpeech {
    config: OpenAiSpeechConfig,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    pub fn new(config: OpenAiSpeechConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

/// Ensures `wav` responses carry a RIFF header; raw PCM is wrapped as mono
/// 24 kHz.
pub fn normalize_response(audio: Vec<u8>, format: &str) -> Result<SpeechAudio, VoiceError> {
    let mime_type = format_to_mime(format);
    if mime_type != WAV_MIME || audio.starts_with(b"RIFF") {
        return Ok(SpeechAudio {
            data: audio,
            mime_type: mime_type.to_string(),
        });
    }
    Ok(SpeechAudio {
        data: pcm16_to_wav(&audio, DEFAULT_SAMPLE_RATE)?,
        mime_type: WAV_MIME.to_string(),
    })
}

#[async_trait]
impl SpeechProvider for OpenAiSpeech {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn synthesize(&self, input: &SpeechInput) -> Result<SpeechAudio, VoiceError> {
        let url = format!(
            "{}/v1/audio/speech",
            self.config.api_base.trim_end_matches('/')
        );
        let voice = input.voice.as_deref().unwrap_or(&self.config.voice);
        let started = Instant::now();
        tracing::info!(provider = PROVIDER, model = %input.model, "tts call started");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(input.timeout)
            .json(&json!({
                "model": input.model,
                "voice": voice,
                "input": input.text,
                "response_format": self.config.format,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoiceError::Timeout {
                        provider: PROVIDER.to_string(),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                } else {
                    VoiceError::Upstream {
                        provider: PROVIDER.to_string(),
                        status: None,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            tracing::warn!(
                provider = PROVIDER,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "tts call failed"
            );
            return Err(VoiceError::Upstream {
                provider: PROVIDER.to_string(),
                status: Some(status.as_u16()),
                message: format!("{} {}", status.as_u16(), message.trim()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| VoiceError::Upstream {
            provider: PROVIDER.to_string(),
            status: None,
            message: e.to_string(),
        })?;
        let audio = normalize_response(bytes.to_vec(), &self.config.format)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_pcm_is_wrapped_for_wav_format() {
        let audio = normalize_response(vec![0, 0, 1, 0], "wav").unwrap();
        assert_eq!(audio.mime_type, "audio/wav");
        assert!(audio.data.starts_with(b"RIFF"));
    }

    #[test]
    fn existing_wav_and_other_formats_pass_through() {
        let wav = pcm16_to_wav(&[0, 0], 24_000).unwrap();
        assert_eq!(normalize_response(wav.clone(), "wav").unwrap().data, wav);

        let mp3 = normalize_response(vec![0xff, 0xfb], "mp3").unwrap();
        assert_eq!(mp3.mime_type, "audio/mpeg");
        assert_eq!(mp3.data, vec![0xff, 0xfb]);
    }
}
