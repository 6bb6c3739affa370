//! Provider racing, fallback, and latency budgets.

use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::gemini::GeminiSpeech;
use crate::mock::MockSpeech;
use crate::openai::OpenAiSpeech;
use crate::provider::{SpeechAudio, SpeechInput, SpeechProvider, SpeechTarget};
use crate::text::truncate_for_speech;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Text to synthesize plus per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct SynthesisRequest {
    pub text: String,
    /// Trailing instruction that must survive truncation if `text` ends with it.
    pub footer: Option<String>,
    pub voice: Option<String>,
    pub language: Option<String>,
    /// Overrides the configured per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Overrides the configured provider order when non-empty.
    pub provider_order: Vec<SpeechTarget>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Synthesized audio and the target that produced it.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: Vec<u8>,
    pub mime_type: String,
    pub provider: SpeechTarget,
}

#[derive(Debug, Clone, Copy)]
struct Budget {
    wait: Duration,
    timeout: Duration,
}

type Candidate = (SpeechTarget, Arc<dyn SpeechProvider>);

/// Aborts the attempt task when the awaiting path gives up on it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Shared across all sessions. Attempts run on a bounded worker pool so a
/// burst of synthesis requests cannot starve the live audio path.
pub struct SynthesisOrchestrator {
    providers: HashMap<String, Arc<dyn SpeechProvider>>,
    default_targets: Vec<SpeechTarget>,
    max_chars: usize,
    timeout: Duration,
    wait: Duration,
    retry_count: u32,
    retry_backoff: Duration,
    hedge_enabled: bool,
    workers: Arc<Semaphore>,
}

impl std::fmt::Debug for SynthesisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("SynthesisOrchestrator")
            .field("providers", &names)
            .field("default_targets", &self.default_targets)
            .field("timeout", &self.timeout)
            .field("wait", &self.wait)
            .field("hedge_enabled", &self.hedge_enabled)
            .finish()
    }
}

impl SynthesisOrchestrator {
    /// Builds an orchestrator over explicit providers, keyed by
    /// [`SpeechProvider::name`].
    pub fn new(config: &VoiceConfig, providers: Vec<Arc<dyn SpeechProvider>>) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self {
            providers,
            default_targets: config.default_targets(),
            max_chars: config.max_chars,
            timeout: config.timeout(),
            wait: config.wait(),
            retry_count: config.primary_retry_count,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            hedge_enabled: config.hedge_enabled,
            workers: Arc::new(Semaphore::new(config.workers.max(1))),
        }
    }

    /// Builds an orchestrator with the Gemini, OpenAI, and mock providers.
    pub fn from_config(config: &VoiceConfig, client: reqwest::Client) -> Self {
        let providers: Vec<Arc<dyn SpeechProvider>> = vec![
            Arc::new(GeminiSpeech::new(config.gemini.clone(), client.clone())),
            Arc::new(OpenAiSpeech::new(config.openai.clone(), client)),
            Arc::new(MockSpeech),
        ];
        Self::new(config, providers)
    }

    pub fn default_targets(&self) -> &[SpeechTarget] {
        &self.default_targets
    }

    /// `true` if at least one default target has a configured provider.
    pub fn has_configured_provider(&self) -> bool {
        self.default_targets.iter().any(|t| {
            self.providers
                .get(&t.provider)
                .is_some_and(|p| p.is_configured())
        })
    }

    /// Synthesizes `request.text`, trying targets in order.
    ///
    /// Fails only when every configured target has failed; the error is the
    /// last failure observed (or the first failure when a hedge race loses on
    /// both paths).
    pub async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<SynthesisResult, VoiceError> {
        let text = truncate_for_speech(&request.text, self.max_chars, request.footer.as_deref());
        if text.is_empty() {
            return Err(VoiceError::Invalid("text is required".to_string()));
        }

        let order = if request.provider_order.is_empty() {
            self.default_targets.clone()
        } else {
            request.provider_order
        };
        let candidates = self.resolve(order);
        let Some((primary, fallbacks)) = candidates.split_first() else {
            return Err(VoiceError::Unavailable(
                "no speech provider is configured".to_string(),
            ));
        };

        let timeout = request.timeout.unwrap_or(self.timeout);
        let budget = Budget {
            wait: self.wait.min(timeout),
            timeout,
        };
        let base = SpeechInput {
            text,
            model: String::new(),
            voice: request.voice,
            language: request.language,
            timeout,
        };

        match self.attempt(primary, &base, budget).await {
            Ok(audio) => Ok(finish(audio, primary)),
            Err(err) if self.should_hedge(&err, fallbacks.len()) => {
                self.hedge(primary, fallbacks, &base, budget, err).await
            }
            Err(err) => {
                if !fallbacks.is_empty() {
                    tracing::warn!(target_model = %primary.0, error = %err, "tts fallback");
                }
                self.run_chain(fallbacks, &base, budget, Some(err)).await
            }
        }
    }

    /// Keeps targets whose provider exists and has a credential. Skipped
    /// targets do not count as failures.
    fn resolve(&self, order: Vec<SpeechTarget>) -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(order.len());
        for target in order {
            match self.providers.get(&target.provider) {
                Some(provider) if provider.is_configured() => {
                    candidates.push((target, Arc::clone(provider)))
                }
                Some(_) => {
                    tracing::debug!(target_model = %target, "tts provider not configured, skipping")
                }
                None => tracing::warn!(target_model = %target, "unknown tts provider, skipping"),
            }
        }
        candidates
    }

    fn should_hedge(&self, err: &VoiceError, fallback_count: usize) -> bool {
        self.hedge_enabled && self.retry_count > 0 && fallback_count > 0 && err.is_retryable()
    }

    /// Tries `candidates` strictly in order.
    async fn run_chain(
        &self,
        candidates: &[Candidate],
        base: &SpeechInput,
        budget: Budget,
        mut last_error: Option<VoiceError>,
    ) -> Result<SynthesisResult, VoiceError> {
        for (index, candidate) in candidates.iter().enumerate() {
            match self.attempt(candidate, base, budget).await {
                Ok(audio) => return Ok(finish(audio, candidate)),
                Err(err) => {
                    if index + 1 < candidates.len() {
                        tracing::warn!(target_model = %candidate.0, error = %err, "tts fallback");
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            VoiceError::Unavailable("no speech provider is configured".to_string())
        }))
    }

    /// Races bounded retries of the primary against the fallback chain.
    /// The first success wins; the other path is dropped, which aborts its
    /// in-flight attempt.
    async fn hedge(
        &self,
        primary: &Candidate,
        fallbacks: &[Candidate],
        base: &SpeechInput,
        budget: Budget,
        first_error: VoiceError,
    ) -> Result<SynthesisResult, VoiceError> {
        tracing::warn!(
            target_model = %primary.0,
            retries = self.retry_count,
            fallbacks = fallbacks.len(),
            error = %first_error,
            "tts hedge"
        );
        let retry_path = self.retry_primary(primary, base, budget, first_error);
        let fallback_path = self.run_chain(fallbacks, base, budget, None);
        tokio::pin!(retry_path, fallback_path);

        tokio::select! {
            result = &mut retry_path => match result {
                Ok(found) => {
                    tracing::info!(winner = "primary_retry", target_model = %found.provider, "tts hedge winner");
                    Ok(found)
                }
                Err(err) => match fallback_path.await {
                    Ok(found) => {
                        tracing::info!(winner = "fallback_chain", target_model = %found.provider, "tts hedge winner");
                        Ok(found)
                    }
                    Err(_) => Err(err),
                },
            },
            result = &mut fallback_path => match result {
                Ok(found) => {
                    tracing::info!(winner = "fallback_chain", target_model = %found.provider, "tts hedge winner");
                    Ok(found)
                }
                Err(err) => match retry_path.await {
                    Ok(found) => {
                        tracing::info!(winner = "primary_retry", target_model = %found.provider, "tts hedge winner");
                        Ok(found)
                    }
                    Err(_) => Err(err),
                },
            },
        }
    }

    async fn retry_primary(
        &self,
        primary: &Candidate,
        base: &SpeechInput,
        budget: Budget,
        first_error: VoiceError,
    ) -> Result<SynthesisResult, VoiceError> {
        let mut last_error = first_error;
        for attempt in 1..=self.retry_count {
            if !self.retry_backoff.is_zero() {
                tokio::time::sleep(self.retry_backoff).await;
            }
            match self.attempt(primary, base, budget).await {
                Ok(audio) => return Ok(finish(audio, primary)),
                Err(err) => {
                    tracing::warn!(
                        target_model = %primary.0,
                        attempt,
                        retries = self.retry_count,
                        error = %err,
                        "tts retry failed"
                    );
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    /// Runs one provider call on the worker pool.
    ///
    /// The call is first awaited for the wait budget. If it is still running
    /// it is left in the background while the remainder of the timeout is
    /// awaited; after that it is aborted.
    async fn attempt(
        &self,
        candidate: &Candidate,
        base: &SpeechInput,
        budget: Budget,
    ) -> Result<SpeechAudio, VoiceError> {
        let (target, provider) = (candidate.0.clone(), Arc::clone(&candidate.1));
        let mut input = base.clone();
        input.model = target.model.clone();
        let workers = Arc::clone(&self.workers);
        let started = Instant::now();

        let mut task = AbortOnDrop(tokio::spawn(async move {
            let _permit = workers.acquire_owned().await.map_err(|_| {
                VoiceError::Unavailable("synthesis worker pool closed".to_string())
            })?;
            provider.synthesize(&input).await
        }));

        if !budget.wait.is_zero() && budget.wait < budget.timeout {
            match tokio::time::timeout(budget.wait, &mut task.0).await {
                Ok(joined) => return flatten(joined),
                Err(_) => tracing::info!(
                    target_model = %target,
                    wait_ms = budget.wait.as_millis() as u64,
                    "tts wait budget elapsed, continuing in background"
                ),
            }
        }

        let remaining = budget.timeout.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, &mut task.0).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(target_model = %target, elapsed_ms, "tts attempt abandoned");
                Err(VoiceError::Timeout {
                    provider: target.to_string(),
                    elapsed_ms,
                })
            }
        }
    }
}

fn flatten(
    joined: Result<Result<SpeechAudio, VoiceError>, tokio::task::JoinError>,
) -> Result<SpeechAudio, VoiceError> {
    joined.map_err(|e| VoiceError::Task(e.to_string()))?
}

fn finish(audio: SpeechAudio, candidate: &Candidate) -> SynthesisResult {
    SynthesisResult {
        audio: audio.data,
        mime_type: audio.mime_type,
        provider: candidate.0.clone(),
    }
}
