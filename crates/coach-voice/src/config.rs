use crate::provider::SpeechTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Where coach replies are turned into audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Synthesize on the server when a provider is available.
    #[default]
    Auto,
    /// Always synthesize on the server.
    Server,
    /// The client speaks replies with its own local TTS; the server never
    /// synthesizes.
    Browser,
}

impl OutputMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "server" => Some(Self::Server),
            "browser" => Some(Self::Browser),
            _ => None,
        }
    }

    pub fn synthesizes_on_server(self) -> bool {
        !matches!(self, Self::Browser)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_chars() -> usize {
    1800
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_wait_ms() -> u64 {
    2_500
}

fn default_workers() -> usize {
    2
}

fn default_provider_order() -> Vec<String> {
    vec!["gemini".to_string(), "openai".to_string()]
}

/// `[voice]` section: synthesis policy and provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub output_mode: OutputMode,

    /// Character cap applied before synthesis.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Overall budget for one provider attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Short budget after which a slow attempt is left running in the
    /// background while the rest of `timeout_ms` is awaited. `0` disables
    /// the two-stage wait.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,

    /// Extra attempts of the primary provider when hedging.
    #[serde(default)]
    pub primary_retry_count: u32,

    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Race primary retries against the fallback chain on a retryable
    /// primary failure. Doubles outbound calls while a provider is degraded.
    #[serde(default)]
    pub hedge_enabled: bool,

    /// Size of the shared synthesis worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Provider names in preference order (`gemini`, `openai`, `mock`).
    #[serde(default = "default_provider_order")]
    pub provider_order: Vec<String>,

    #[serde(default)]
    pub gemini: GeminiSpeechConfig,

    #[serde(default)]
    pub openai: OpenAiSpeechConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            output_mode: OutputMode::default(),
            max_chars: default_max_chars(),
            timeout_ms: default_timeout_ms(),
            wait_ms: default_wait_ms(),
            primary_retry_count: 0,
            retry_backoff_ms: 0,
            hedge_enabled: false,
            workers: default_workers(),
            provider_order: default_provider_order(),
            gemini: GeminiSpeechConfig::default(),
            openai: OpenAiSpeechConfig::default(),
        }
    }
}

impl VoiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Expands `provider_order` into concrete provider/model targets.
    ///
    /// Gemini contributes one target per configured model; other providers
    /// contribute one target each.
    pub fn default_targets(&self) -> Vec<SpeechTarget> {
        let mut targets = Vec::new();
        for name in &self.provider_order {
            match name.trim().to_ascii_lowercase().as_str() {
                "gemini" => targets.extend(
                    self.gemini
                        .models
                        .iter()
                        .map(|model| SpeechTarget::new("gemini", model)),
                ),
                "openai" => targets.push(SpeechTarget::new("openai", &self.openai.model)),
                "mock" => targets.push(SpeechTarget::new("mock", "tone")),
                other => tracing::warn!(provider = other, "unknown speech provider in order"),
            }
        }
        targets
    }
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_models() -> Vec<String> {
    vec![
        "gemini-2.5-flash-preview-tts".to_string(),
        "gemini-2.5-pro-preview-tts".to_string(),
    ]
}

fn default_gemini_voice() -> String {
    "Kore".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

/// `[voice.gemini]`: Gemini speech generation.
#[derive(Clone, Deserialize)]
pub struct GeminiSpeechConfig {
    #[serde(default = "default_gemini_api_base")]
    pub api_base: String,

    /// TTS models, tried in order.
    #[serde(default = "default_gemini_models")]
    pub models: Vec<String>,

    #[serde(default = "default_gemini_voice")]
    pub voice: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Read from `GEMINI_API_KEY`; never from the config file.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for GeminiSpeechConfig {
    fn default() -> Self {
        Self {
            api_base: default_gemini_api_base(),
            models: default_gemini_models(),
            voice: default_gemini_voice(),
            language: default_language(),
            api_key: String::new(),
        }
    }
}

impl fmt::Debug for GeminiSpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiSpeechConfig")
            .field("api_base", &self.api_base)
            .field("models", &self.models)
            .field("voice", &self.voice)
            .field("language", &self.language)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

fn default_openai_api_base() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini-tts".to_string()
}

fn default_openai_voice() -> String {
    "alloy".to_string()
}

fn default_openai_format() -> String {
    "wav".to_string()
}

/// `[voice.openai]`: OpenAI speech endpoint, used as a fallback.
#[derive(Clone, Deserialize)]
pub struct OpenAiSpeechConfig {
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    #[serde(default = "default_openai_voice")]
    pub voice: String,

    /// `wav`, `mp3`, `aac`, `opus`, or `flac`.
    #[serde(default = "default_openai_format")]
    pub format: String,

    /// Read from `OPENAI_API_KEY`; never from the config file.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for OpenAiSpeechConfig {
    fn default() -> Self {
        Self {
            api_base: default_openai_api_base(),
            model: default_openai_model(),
            voice: default_openai_voice(),
            format: default_openai_format(),
            api_key: String::new(),
        }
    }
}

impl fmt::Debug for OpenAiSpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSpeechConfig")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("format", &self.format)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
