//! The per-connection live session bridge.

use crate::assembler::UtteranceAssembler;
use crate::config::LiveConfig;
use crate::context::{
    build_live_system_prompt, build_rehydrate_prompt, BARGE_IN_PROMPT, DEDUP_NUDGE,
    FALLBACK_ACKNOWLEDGMENT,
};
use crate::error::LiveError;
use crate::guard::{GuardDecision, QuestionGuard};
use crate::upstream::{
    ActivityState, LiveConnector, LiveSetup, ModelEvent, Outbound, UpstreamSession, UpstreamSink,
    UpstreamStream,
};
use coach_store::{SessionStore, StoreError};
use coach_types::{
    parse_sample_rate, InterviewSession, LiveAudioChunk, QuestionState, TranscriptEntry,
    TranscriptRole,
};
use coach_voice::{SynthesisOrchestrator, SynthesisRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Connection states reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Connected,
    GeminiConnected,
    Thinking,
    GeminiError,
    GeminiDisconnected,
    Stopped,
    StreamComplete,
    Alive,
}

impl LiveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::GeminiConnected => "gemini-connected",
            Self::Thinking => "thinking",
            Self::GeminiError => "gemini-error",
            Self::GeminiDisconnected => "gemini-disconnected",
            Self::Stopped => "stopped",
            Self::StreamComplete => "stream-complete",
            Self::Alive => "alive",
        }
    }
}

/// Events the bridge emits toward the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Status(LiveStatus),
    Transcript {
        entry: TranscriptEntry,
        is_final: bool,
    },
    Audio {
        encoding: String,
        sample_rate: u32,
        data: Vec<u8>,
    },
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Send,
    Receive,
    External,
}

#[derive(Default)]
struct Tasks {
    send: Option<JoinHandle<()>>,
    receive: Option<JoinHandle<()>>,
    speak: Option<JoinHandle<()>>,
}

struct Inner {
    interview_id: String,
    store: Arc<SessionStore>,
    connector: Arc<dyn LiveConnector>,
    synthesizer: Option<Arc<SynthesisOrchestrator>>,
    config: LiveConfig,
    guard: QuestionGuard,
    events: mpsc::Sender<BridgeEvent>,
    assembler: UtteranceAssembler,
    /// Set once, before any failure or stop is reported. Gates all sends.
    closed: AtomicBool,
    stopped: AtomicBool,
    /// Microphone audio; drops the newest chunk when full.
    outbound: mpsc::Sender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Outbound>>>,
    /// Activity hints and barge-in prompts; never drops and never waits.
    control: mpsc::UnboundedSender<Outbound>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    utterance_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    sink: tokio::sync::Mutex<Option<Box<dyn UpstreamSink>>>,
    tasks: Mutex<Tasks>,
}

/// Relays one client connection to the upstream model.
///
/// Microphone audio goes through a bounded queue drained by a send task; a
/// single receive task consumes model events, assembles coach utterances,
/// runs the question guard, and writes finished turns through to the
/// session store. Any send or receive failure tears the bridge down once.
pub struct LiveBridge {
    inner: Arc<Inner>,
}

impl LiveBridge {
    pub fn new(
        interview_id: impl Into<String>,
        store: Arc<SessionStore>,
        connector: Arc<dyn LiveConnector>,
        synthesizer: Option<Arc<SynthesisOrchestrator>>,
        config: LiveConfig,
        events: mpsc::Sender<BridgeEvent>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(config.audio_queue_capacity.max(1));
        let (control, control_rx) = mpsc::unbounded_channel();
        let (utterance_tx, utterance_rx) = mpsc::unbounded_channel();
        let inner = Inner {
            interview_id: interview_id.into(),
            store,
            connector,
            synthesizer,
            guard: QuestionGuard::new(config.guard),
            assembler: UtteranceAssembler::new(config.quiet_period(), utterance_tx),
            config,
            events,
            closed: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            control,
            control_rx: Mutex::new(Some(control_rx)),
            utterance_rx: Mutex::new(Some(utterance_rx)),
            sink: tokio::sync::Mutex::new(None),
            tasks: Mutex::new(Tasks::default()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn interview_id(&self) -> &str {
        &self.inner.interview_id
    }

    /// `gemini` or `mock`.
    pub fn mode(&self) -> &'static str {
        self.inner.connector.mode()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Opens the upstream session, restores context from the stored
    /// transcript, and starts the send and receive loops.
    pub async fn connect(&self) -> Result<(), LiveError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(LiveError::Closed);
        }
        let (Some(outbound_rx), Some(control_rx), Some(utterance_rx)) = (
            take(&inner.outbound_rx),
            take(&inner.control_rx),
            take(&inner.utterance_rx),
        ) else {
            return Err(LiveError::Protocol("bridge is already connected".to_string()));
        };

        let session = inner.load_session().await?;
        let setup = LiveSetup {
            interview_id: inner.interview_id.clone(),
            system_prompt: build_live_system_prompt(&session),
            questions: session.questions.clone(),
            input_sample_rate: inner.config.input_sample_rate,
            output_sample_rate: inner.config.output_sample_rate,
        };
        let UpstreamSession { mut sink, stream } = inner.connector.connect(setup).await?;

        if let Some(context) = build_rehydrate_prompt(
            &session,
            inner.config.rehydrate_turns,
            inner.config.rehydrate_turn_chars,
        ) {
            sink.send(Outbound::Text {
                text: context,
                turn_complete: true,
            })
            .await?;
            tracing::info!(
                interview_id = %inner.interview_id,
                turns = session.transcript.len(),
                "rehydrated live session"
            );
        }
        *inner.sink.lock().await = Some(sink);

        let send = tokio::spawn(Arc::clone(inner).send_loop(outbound_rx, control_rx));
        let receive = tokio::spawn(Arc::clone(inner).receive_loop(stream, utterance_rx));
        {
            let mut tasks = inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.send = Some(send);
            tasks.receive = Some(receive);
        }

        tracing::info!(
            interview_id = %inner.interview_id,
            mode = inner.connector.mode(),
            "live bridge connected"
        );
        inner
            .notify(BridgeEvent::Status(LiveStatus::GeminiConnected))
            .await;
        Ok(())
    }

    /// Queues a PCM16 microphone chunk. Never waits: when the queue is full
    /// the chunk is dropped and `false` is returned.
    pub fn send_audio(&self, data: Vec<u8>) -> bool {
        if self.is_closed() || data.is_empty() {
            return false;
        }
        let chunk = LiveAudioChunk::pcm16(data, self.inner.config.input_sample_rate);
        match self.inner.outbound.try_send(Outbound::Audio(chunk)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(interview_id = %self.inner.interview_id, "audio queue full, dropping chunk");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Forwards a client voice-activity hint behind any queued audio.
    /// Never waits on the upstream connection.
    pub fn send_activity(&self, state: ActivityState) -> Result<(), LiveError> {
        self.inner.send_control(Outbound::Activity(state))?;
        if state == ActivityState::End {
            self.inner.emit(BridgeEvent::Status(LiveStatus::Thinking));
        }
        Ok(())
    }

    /// Drops the pending coach utterance and any in-flight speech, then
    /// asks the model to stop and listen.
    pub fn barge_in(&self) -> Result<(), LiveError> {
        if self.is_closed() {
            return Err(LiveError::Closed);
        }
        self.inner.assembler.cancel();
        self.inner.abort_speech();
        self.inner.send_control(Outbound::Text {
            text: BARGE_IN_PROMPT.to_string(),
            turn_complete: true,
        })
    }

    /// Synthesizes `text` off the audio path and emits it as an audio event.
    /// A newer request replaces one still in flight.
    pub fn speak(&self, text: &str) -> Result<(), LiveError> {
        if self.is_closed() {
            return Err(LiveError::Closed);
        }
        let Some(synthesizer) = self.inner.synthesizer.clone() else {
            return Err(LiveError::Unavailable(
                "speech synthesis is disabled".to_string(),
            ));
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(LiveError::Invalid("text is required".to_string()));
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            match synthesizer.synthesize(SynthesisRequest::new(text)).await {
                Ok(result) => {
                    if inner.closed.load(Ordering::SeqCst) {
                        return;
                    }
                    tracing::debug!(
                        interview_id = %inner.interview_id,
                        target_model = %result.provider,
                        bytes = result.audio.len(),
                        "speech ready"
                    );
                    inner.emit(BridgeEvent::Audio {
                        encoding: encoding_for(&result.mime_type),
                        sample_rate: inner.config.output_sample_rate,
                        data: result.audio,
                    });
                }
                Err(e) => {
                    tracing::warn!(interview_id = %inner.interview_id, error = %e, "speech synthesis failed");
                    inner.emit(BridgeEvent::Error(e.to_string()));
                }
            }
        });
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = tasks.speak.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Stops the session. Returns `false` if it was already stopped; only
    /// the first call tears down and reports `stopped`.
    pub async fn stop(&self) -> bool {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        if !inner.closed.swap(true, Ordering::SeqCst) {
            inner.teardown(Origin::External, true).await;
        }
        inner.notify(BridgeEvent::Status(LiveStatus::Stopped)).await;
        tracing::info!(interview_id = %inner.interview_id, "live bridge stopped");
        true
    }
}

impl Drop for LiveBridge {
    fn drop(&mut self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.assembler.cancel();
        let tasks = std::mem::take(&mut *self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in [tasks.send, tasks.receive, tasks.speak].into_iter().flatten() {
            handle.abort();
        }
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}

/// Short encoding label for a synthesized audio mime type.
fn encoding_for(mime_type: &str) -> String {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    match essence.split('/').nth(1) {
        Some("wav" | "x-wav" | "wave") | None => "wav".to_string(),
        Some("mpeg") => "mp3".to_string(),
        Some(other) => other.to_string(),
    }
}

impl Inner {
    /// Delivers a transcript or audio event; dropped when the client is
    /// behind.
    fn emit(&self, event: BridgeEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(interview_id = %self.interview_id, "client event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Delivers a status or error event, waiting for room in the queue.
    async fn notify(&self, event: BridgeEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!(interview_id = %self.interview_id, "client gone before notice was delivered");
        }
    }

    fn send_control(&self, message: Outbound) -> Result<(), LiveError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LiveError::Closed);
        }
        self.control.send(message).map_err(|_| LiveError::Closed)
    }

    async fn with_store<T, F>(&self, op: F) -> Result<T, LiveError>
    where
        T: Send + 'static,
        F: FnOnce(&SessionStore, &str) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let interview_id = self.interview_id.clone();
        tokio::task::spawn_blocking(move || op(&store, &interview_id))
            .await
            .map_err(|e| LiveError::Task(e.to_string()))?
            .map_err(LiveError::from)
    }

    async fn load_session(&self) -> Result<InterviewSession, LiveError> {
        self.with_store(|store, id| store.get(id)).await
    }

    async fn send_upstream(&self, message: Outbound) -> Result<(), LiveError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LiveError::Closed);
        }
        let mut sink = self.sink.lock().await;
        match sink.as_mut() {
            Some(sink) => sink.send(message).await,
            None => Err(LiveError::Closed),
        }
    }

    fn abort_speech(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = tasks.speak.take() {
            handle.abort();
        }
    }

    /// Forwards queued audio and control messages upstream. A control
    /// message goes out only after the audio queued ahead of it.
    async fn send_loop(
        self: Arc<Self>,
        mut audio: mpsc::Receiver<Outbound>,
        mut control: mpsc::UnboundedReceiver<Outbound>,
    ) {
        loop {
            let message = tokio::select! {
                Some(message) = audio.recv() => message,
                Some(message) = control.recv() => {
                    while let Ok(queued) = audio.try_recv() {
                        if !self.forward(queued).await {
                            return;
                        }
                    }
                    message
                }
                else => return,
            };
            if !self.forward(message).await {
                return;
            }
        }
    }

    async fn forward(&self, message: Outbound) -> bool {
        match self.send_upstream(message).await {
            Ok(()) => true,
            Err(e) => {
                self.fail(e, Origin::Send).await;
                false
            }
        }
    }

    async fn receive_loop(
        self: Arc<Self>,
        mut stream: Box<dyn UpstreamStream>,
        mut utterances: mpsc::UnboundedReceiver<String>,
    ) {
        loop {
            let result = tokio::select! {
                event = stream.next_event() => match event {
                    Some(Ok(event)) => self.handle_event(event).await,
                    Some(Err(e)) => Err(e),
                    None => {
                        self.finish_stream().await;
                        return;
                    }
                },
                Some(text) = utterances.recv() => self.finalize_coach(text).await,
            };
            if let Err(e) = result {
                self.fail(e, Origin::Receive).await;
                return;
            }
        }
    }

    async fn handle_event(&self, event: ModelEvent) -> Result<(), LiveError> {
        match event {
            ModelEvent::SetupComplete => {}
            ModelEvent::OutputTranscript(delta) | ModelEvent::Text(delta) => {
                let partial = self.assembler.push_delta(&delta);
                if !partial.is_empty() {
                    self.emit(BridgeEvent::Transcript {
                        entry: TranscriptEntry::new(TranscriptRole::Coach, partial),
                        is_final: false,
                    });
                }
            }
            ModelEvent::InputTranscript(fragment) => {
                if let Some(text) = self.assembler.flush_now() {
                    self.finalize_coach(text).await?;
                }
                let entry = TranscriptEntry::new(TranscriptRole::Candidate, fragment.trim());
                if entry.text.is_empty() {
                    return Ok(());
                }
                let stored = entry.clone();
                self.with_store(move |store, id| store.append_transcript_entry(id, stored))
                    .await?;
                self.emit(BridgeEvent::Transcript {
                    entry,
                    is_final: true,
                });
            }
            ModelEvent::Audio { data, mime_type } => {
                self.emit(BridgeEvent::Audio {
                    encoding: "pcm16".to_string(),
                    sample_rate: parse_sample_rate(
                        mime_type.as_deref(),
                        self.config.output_sample_rate,
                    ),
                    data,
                });
            }
            ModelEvent::TurnComplete | ModelEvent::Interrupted => {
                if let Some(text) = self.assembler.flush_now() {
                    self.finalize_coach(text).await?;
                }
            }
        }
        Ok(())
    }

    /// Runs the question guard over a finished coach utterance and writes
    /// it through to the store.
    async fn finalize_coach(&self, text: String) -> Result<(), LiveError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let session = self.load_session().await?;
        let decision =
            self.guard
                .classify(&text, &session.questions, session.asked_question_index);

        let text = match decision {
            GuardDecision::Suppress(index) => {
                tracing::info!(
                    interview_id = %self.interview_id,
                    question_index = index,
                    "suppressed repeated question"
                );
                self.send_upstream(Outbound::Text {
                    text: DEDUP_NUDGE.to_string(),
                    turn_complete: true,
                })
                .await?;
                FALLBACK_ACKNOWLEDGMENT.to_string()
            }
            GuardDecision::Advance(index) => {
                let result = self
                    .with_store(move |store, id| {
                        store.update_question_status(id, index, QuestionState::Started, "live")
                    })
                    .await;
                match result {
                    Ok(_) => tracing::info!(
                        interview_id = %self.interview_id,
                        question_index = index,
                        "question progress advanced"
                    ),
                    Err(e) => tracing::warn!(
                        interview_id = %self.interview_id,
                        question_index = index,
                        error = %e,
                        "failed to advance question progress"
                    ),
                }
                text
            }
            GuardDecision::Pass => text,
        };

        let entry = TranscriptEntry::new(TranscriptRole::Coach, text);
        let stored = entry.clone();
        self.with_store(move |store, id| store.append_transcript_entry(id, stored))
            .await?;
        self.emit(BridgeEvent::Transcript {
            entry,
            is_final: true,
        });
        Ok(())
    }

    /// Clean upstream end of stream.
    async fn finish_stream(&self) {
        if let Some(text) = self.assembler.flush_now() {
            if let Err(e) = self.finalize_coach(text).await {
                tracing::warn!(interview_id = %self.interview_id, error = %e, "failed to store final utterance");
            }
        }
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let status = if self.connector.scripted() {
            LiveStatus::StreamComplete
        } else {
            LiveStatus::GeminiDisconnected
        };
        tracing::info!(interview_id = %self.interview_id, status = status.as_str(), "upstream stream ended");
        self.notify(BridgeEvent::Status(status)).await;
        self.teardown(Origin::Receive, false).await;
    }

    /// Reports a session failure once, then tears down.
    async fn fail(&self, err: LiveError, origin: Origin) {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(interview_id = %self.interview_id, error = %err, "error after close ignored");
            return;
        }
        tracing::error!(interview_id = %self.interview_id, error = %err, "live session failed");
        self.notify(BridgeEvent::Error(err.client_message())).await;
        self.notify(BridgeEvent::Status(LiveStatus::GeminiDisconnected))
            .await;
        self.teardown(origin, false).await;
    }

    /// Cancels sends, then receives, then speech, and releases the
    /// upstream connection. The task that called in is left to return on
    /// its own.
    async fn teardown(&self, origin: Origin, end_audio: bool) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        self.assembler.cancel();
        if let Some(handle) = tasks.send {
            if origin != Origin::Send {
                handle.abort();
            }
        }
        if let Some(handle) = tasks.receive {
            if origin != Origin::Receive {
                handle.abort();
            }
        }
        if let Some(handle) = tasks.speak {
            handle.abort();
        }

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if end_audio {
                if let Err(e) = sink.send(Outbound::AudioStreamEnd).await {
                    tracing::debug!(interview_id = %self.interview_id, error = %e, "audio stream end not sent");
                }
            }
            if let Err(e) = sink.close().await {
                tracing::debug!(interview_id = %self.interview_id, error = %e, "upstream close failed");
            }
        }
        tracing::debug!(interview_id = %self.interview_id, "live bridge torn down");
    }
}
