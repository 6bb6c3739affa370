use crate::guard::GuardThresholds;
use coach_types::DEFAULT_SAMPLE_RATE;
use serde::Deserialize;
use std::time::Duration;

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_audio_queue_capacity() -> usize {
    12
}

fn default_quiet_period_ms() -> u64 {
    800
}

fn default_rehydrate_turns() -> usize {
    8
}

fn default_rehydrate_turn_chars() -> usize {
    240
}

fn default_mock_chunks_per_reply() -> usize {
    3
}

fn default_ws_base() -> String {
    "wss://generativelanguage.googleapis.com".to_string()
}

/// `[live]` section: realtime bridge tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_sample_rate")]
    pub input_sample_rate: u32,

    #[serde(default = "default_sample_rate")]
    pub output_sample_rate: u32,

    /// Pending microphone chunks before the newest is dropped.
    #[serde(default = "default_audio_queue_capacity")]
    pub audio_queue_capacity: usize,

    /// Silence after the last coach delta before the utterance is final.
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    /// Transcript turns summarized when reconnecting.
    #[serde(default = "default_rehydrate_turns")]
    pub rehydrate_turns: usize,

    #[serde(default = "default_rehydrate_turn_chars")]
    pub rehydrate_turn_chars: usize,

    /// Audio chunks the mock connector waits for before replying.
    #[serde(default = "default_mock_chunks_per_reply")]
    pub mock_chunks_per_reply: usize,

    /// The client runs its own voice-activity detection and sends explicit
    /// start/end hints; server-side detection is disabled upstream.
    #[serde(default)]
    pub client_activity_detection: bool,

    #[serde(default = "default_ws_base")]
    pub ws_base: String,

    #[serde(default)]
    pub guard: GuardThresholds,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: default_sample_rate(),
            output_sample_rate: default_sample_rate(),
            audio_queue_capacity: default_audio_queue_capacity(),
            quiet_period_ms: default_quiet_period_ms(),
            rehydrate_turns: default_rehydrate_turns(),
            rehydrate_turn_chars: default_rehydrate_turn_chars(),
            mock_chunks_per_reply: default_mock_chunks_per_reply(),
            client_activity_detection: false,
            ws_base: default_ws_base(),
            guard: GuardThresholds::default(),
        }
    }
}

impl LiveConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_thresholds_are_configurable() {
        let config: LiveConfig = toml::from_str(
            r#"
            quiet_period_ms = 500
            [guard]
            min_shared_tokens = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.quiet_period(), Duration::from_millis(500));
        assert_eq!(config.guard.min_shared_tokens, 5);
        assert_eq!(config.guard.min_overlap_ratio, 0.45);
        assert_eq!(config.audio_queue_capacity, 12);
    }
}
