//! Credential-free provider that returns the shared mock tone.

use crate::audio::{mock_tone_wav, WAV_MIME};
use crate::error::VoiceError;
use crate::provider::{SpeechAudio, SpeechInput, SpeechProvider};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct MockSpeech;

#[async_trait]
impl SpeechProvider for MockSpeech {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn synthesize(&self, _input: &SpeechInput) -> Result<SpeechAudio, VoiceError> {
        Ok(SpeechAudio {
            data: mock_tone_wav().to_vec(),
            mime_type: WAV_MIME.to_string(),
        })
    }
}
