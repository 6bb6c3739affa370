//! Server configuration loading from file and environment variables.

use coach_live::LiveConfig;
use coach_voice::{OutputMode, VoiceConfig};
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Session record storage.
    #[serde(default)]
    pub store: StoreConfig,

    /// Text and live model selection.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Realtime bridge tunables.
    #[serde(default)]
    pub live: LiveConfig,

    /// Speech synthesis policy and providers.
    #[serde(default)]
    pub voice: VoiceConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "coach_live=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one JSON record per interview.
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

/// Which backend generates questions, replies, and scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adapter {
    /// Scripted output; no credentials needed.
    #[default]
    Mock,
    Gemini,
}

impl Adapter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Gemini => "gemini",
        }
    }

    /// Unknown names fall back to the mock adapter.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Self::Gemini,
            _ => Self::Mock,
        }
    }
}

/// `[models]` section.
#[derive(Clone, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub adapter: Adapter,

    #[serde(default = "default_text_model")]
    pub text_model: String,

    #[serde(default = "default_live_model")]
    pub live_model: String,

    /// REST base for `generateContent`.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Read from `GEMINI_API_KEY`; never from the config file.
    #[serde(skip)]
    pub api_key: String,
}

impl fmt::Debug for ModelsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelsConfig")
            .field("adapter", &self.adapter)
            .field("text_model", &self.text_model)
            .field("live_model", &self.live_model)
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_dir() -> String {
    "session_store".to_string()
}

fn default_text_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_live_model() -> String {
    "gemini-2.5-flash-native-audio-preview-12-2025".to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            adapter: Adapter::default(),
            text_model: default_text_model(),
            live_model: default_live_model(),
            api_base: default_api_base(),
            api_key: String::new(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides.
///
/// Environment variable overrides:
/// - `COACH_HOST`, `COACH_PORT` override `server.*`
/// - `COACH_LOG_LEVEL`, `COACH_LOG_JSON` override `logging.*`
/// - `COACH_STORE_DIR` overrides `store.dir`
/// - `INTERVIEW_ADAPTER`, `GEMINI_TEXT_MODEL`, `GEMINI_LIVE_MODEL` override `models.*`
/// - `GEMINI_TTS_MODELS` (comma list), `VOICE_TTS_ENABLED`, `VOICE_OUTPUT_MODE`,
///   `VOICE_TTS_HEDGE`, `VOICE_TTS_TIMEOUT_MS`, `VOICE_TTS_WAIT_MS` override `voice.*`
/// - `GEMINI_API_KEY` and `OPENAI_API_KEY` are the only source of credentials
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Applies overrides from `lookup` (normally the process environment).
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(host) = var("COACH_HOST") {
        if let Ok(parsed) = host.trim().parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("COACH_PORT") {
        if let Ok(parsed) = port.trim().parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = var("COACH_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("COACH_LOG_JSON") {
        config.logging.json = truthy(&json);
    }
    if let Some(dir) = var("COACH_STORE_DIR") {
        config.store.dir = dir;
    }

    if let Some(adapter) = var("INTERVIEW_ADAPTER") {
        config.models.adapter = Adapter::parse(&adapter);
    }
    if let Some(model) = var("GEMINI_TEXT_MODEL") {
        config.models.text_model = model.trim().to_string();
    }
    if let Some(model) = var("GEMINI_LIVE_MODEL") {
        config.models.live_model = model.trim().to_string();
    }
    if let Some(key) = var("GEMINI_API_KEY") {
        config.models.api_key = key.trim().to_string();
        config.voice.gemini.api_key = key.trim().to_string();
    }
    if let Some(key) = var("OPENAI_API_KEY") {
        config.voice.openai.api_key = key.trim().to_string();
    }

    if let Some(models) = var("GEMINI_TTS_MODELS") {
        let models: Vec<String> = models
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        if !models.is_empty() {
            config.voice.gemini.models = models;
        }
    }
    if let Some(enabled) = var("VOICE_TTS_ENABLED") {
        config.voice.enabled = truthy(&enabled);
    }
    if let Some(mode) = var("VOICE_OUTPUT_MODE") {
        match OutputMode::parse(&mode) {
            Some(parsed) => config.voice.output_mode = parsed,
            None => tracing::warn!(value = %mode, "ignoring unknown VOICE_OUTPUT_MODE"),
        }
    }
    if let Some(hedge) = var("VOICE_TTS_HEDGE") {
        config.voice.hedge_enabled = truthy(&hedge);
    }
    if let Some(ms) = var("VOICE_TTS_TIMEOUT_MS") {
        if let Ok(parsed) = ms.trim().parse() {
            config.voice.timeout_ms = parsed;
        }
    }
    if let Some(ms) = var("VOICE_TTS_WAIT_MS") {
        if let Ok(parsed) = ms.trim().parse() {
            config.voice.wait_ms = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_file() {
        let config = load_config(Some("definitely-missing-coach-config.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.store.dir, "session_store");
        assert_eq!(config.models.text_model, "gemini-2.5-flash");
        assert_eq!(config.live.audio_queue_capacity, 12);
        assert_eq!(config.voice.max_chars, 1800);
        assert!(!config.voice.hedge_enabled);
    }

    #[test]
    fn file_sections_parse() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9100

            [models]
            adapter = "gemini"
            live_model = "live-x"

            [live]
            quiet_period_ms = 600

            [live.guard]
            min_overlap_ratio = 0.5

            [voice]
            output_mode = "browser"
            hedge_enabled = true
            primary_retry_count = 2

            [voice.gemini]
            models = ["tts-a"]
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.models.adapter, Adapter::Gemini);
        assert_eq!(config.models.live_model, "live-x");
        assert_eq!(config.models.text_model, "gemini-2.5-flash");
        assert_eq!(config.live.quiet_period_ms, 600);
        assert_eq!(config.live.guard.min_overlap_ratio, 0.5);
        assert_eq!(config.voice.output_mode, OutputMode::Browser);
        assert!(config.voice.hedge_enabled);
        assert_eq!(config.voice.gemini.models, vec!["tts-a".to_string()]);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("COACH_PORT", "9001"),
                ("COACH_LOG_JSON", "1"),
                ("INTERVIEW_ADAPTER", "Gemini"),
                ("GEMINI_API_KEY", " key-1 "),
                ("GEMINI_TTS_MODELS", "tts-a, tts-b,,"),
                ("VOICE_OUTPUT_MODE", "server"),
                ("VOICE_TTS_HEDGE", "true"),
                ("VOICE_TTS_WAIT_MS", "900"),
                ("COACH_HOST", "not-an-ip"),
            ]),
        );
        assert_eq!(config.server.port, 9001);
        assert!(config.logging.json);
        assert_eq!(config.models.adapter, Adapter::Gemini);
        assert_eq!(config.models.api_key, "key-1");
        assert_eq!(config.voice.gemini.api_key, "key-1");
        assert_eq!(config.voice.gemini.models, vec!["tts-a", "tts-b"]);
        assert_eq!(config.voice.output_mode, OutputMode::Server);
        assert!(config.voice.hedge_enabled);
        assert_eq!(config.voice.wait_ms, 900);
        assert_eq!(config.server.host, default_host());
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[("GEMINI_API_KEY", "sekrit"), ("OPENAI_API_KEY", "sekrit2")]),
        );
        let printed = format!("{:?}", config);
        assert!(!printed.contains("sekrit"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn unknown_adapter_falls_back_to_mock() {
        assert_eq!(Adapter::parse("other"), Adapter::Mock);
        assert_eq!(Adapter::parse(" GEMINI "), Adapter::Gemini);
    }
}
