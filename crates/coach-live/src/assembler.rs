//! Coalescing streamed coach text into finished utterances.

use coach_types::merge_transcript_text;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Pending {
    buffer: String,
    /// Bumped on every push, flush, and cancel so a stale timer never emits.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Per-utterance text buffer with a quiet-period flush timer.
///
/// Each delta is merged into the buffer and restarts the timer. When the
/// timer fires without new deltas, the buffer is sent on the `finished`
/// channel handed to [`UtteranceAssembler::new`]. Callers can flush early
/// (end of model turn) or cancel (barge-in, stop); a cancelled buffer is
/// discarded whole.
#[derive(Debug)]
pub struct UtteranceAssembler {
    quiet_period: Duration,
    pending: Arc<Mutex<Pending>>,
    finished: mpsc::UnboundedSender<String>,
}

impl UtteranceAssembler {
    pub fn new(quiet_period: Duration, finished: mpsc::UnboundedSender<String>) -> Self {
        Self {
            quiet_period,
            pending: Arc::new(Mutex::new(Pending::default())),
            finished,
        }
    }

    /// Merges a delta into the buffer and restarts the quiet-period timer.
    /// Returns the buffered text so far.
    pub fn push_delta(&self, delta: &str) -> String {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.buffer = merge_transcript_text(&pending.buffer, delta);
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        if pending.buffer.is_empty() {
            return String::new();
        }

        let generation = pending.generation;
        let shared = Arc::clone(&self.pending);
        let finished = self.finished.clone();
        let quiet_period = self.quiet_period;
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let text = {
                let mut pending = shared.lock().unwrap_or_else(|e| e.into_inner());
                if pending.generation != generation {
                    return;
                }
                pending.generation += 1;
                pending.timer = None;
                std::mem::take(&mut pending.buffer)
            };
            if !text.is_empty() {
                let _ = finished.send(text);
            }
        }));
        pending.buffer.clone()
    }

    /// Takes the buffered utterance immediately, cancelling the timer.
    pub fn flush_now(&self) -> Option<String> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        let text = std::mem::take(&mut pending.buffer);
        (!text.is_empty()).then_some(text)
    }

    /// Discards the buffered utterance without emitting it.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .buffer
            .is_empty()
    }
}

impl Drop for UtteranceAssembler {
    fn drop(&mut self) {
        self.cancel();
    }
}
