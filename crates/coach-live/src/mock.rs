//! Scripted live connector for running without credentials.

use crate::error::LiveError;
use crate::upstream::{
    ActivityState, LiveConnector, LiveSetup, ModelEvent, Outbound, UpstreamSession, UpstreamSink,
    UpstreamStream,
};
use async_trait::async_trait;
use coach_voice::audio::mock_tone_pcm;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const CLOSING_LINE: &str = "Thanks. That wraps up our questions. Nice work today.";

/// Replies to every `chunks_per_reply` audio chunks (or an explicit end of
/// activity) with the next scripted coach line and a short tone. The stream
/// ends cleanly once the script is exhausted.
#[derive(Debug, Clone)]
pub struct MockLiveConnector {
    chunks_per_reply: usize,
    sent_texts: Arc<Mutex<Vec<String>>>,
}

impl MockLiveConnector {
    pub fn new(chunks_per_reply: usize) -> Self {
        Self {
            chunks_per_reply: chunks_per_reply.max(1),
            sent_texts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Text turns sent upstream across all sessions, oldest first.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent_texts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn script(questions: &[String]) -> VecDeque<String> {
    let mut lines = VecDeque::new();
    match questions.split_first() {
        Some((first, rest)) => {
            lines.push_back(format!("Welcome. Let's begin. {}", first));
            lines.extend(rest.iter().map(|q| format!("Thanks. {}", q)));
        }
        None => lines.push_back("Welcome. Tell me a little about yourself.".to_string()),
    }
    lines.push_back(CLOSING_LINE.to_string());
    lines
}

struct MockSink {
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    sent_texts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl UpstreamSink for MockSink {
    async fn send(&mut self, message: Outbound) -> Result<(), LiveError> {
        if let Outbound::Text { text, .. } = &message {
            self.sent_texts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(text.clone());
        }
        if let Some(outbound) = &self.outbound {
            // The script may have finished; late input is ignored.
            let _ = outbound.send(message);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LiveError> {
        self.outbound = None;
        Ok(())
    }
}

struct MockStream {
    inbound: mpsc::UnboundedReceiver<Outbound>,
    script: VecDeque<String>,
    chunks_per_reply: usize,
    chunks: usize,
    output_rate: u32,
    pending: VecDeque<ModelEvent>,
}

impl MockStream {
    fn queue_reply(&mut self) {
        let Some(line) = self.script.pop_front() else {
            return;
        };
        self.pending.extend(
            line.split_whitespace()
                .map(|word| ModelEvent::OutputTranscript(word.to_string())),
        );
        self.pending.push_back(ModelEvent::Audio {
            data: mock_tone_pcm().to_vec(),
            mime_type: Some(format!("audio/pcm;rate={}", self.output_rate)),
        });
        self.pending.push_back(ModelEvent::TurnComplete);
    }
}

#[async_trait]
impl UpstreamStream for MockStream {
    async fn next_event(&mut self) -> Option<Result<ModelEvent, LiveError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.script.is_empty() {
                return None;
            }
            match self.inbound.recv().await? {
                Outbound::Audio(_) => {
                    self.chunks += 1;
                    if self.chunks % self.chunks_per_reply == 0 {
                        self.queue_reply();
                    }
                }
                Outbound::Activity(ActivityState::End) => {
                    self.chunks = 0;
                    self.queue_reply();
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl LiveConnector for MockLiveConnector {
    fn mode(&self) -> &'static str {
        "mock"
    }

    fn scripted(&self) -> bool {
        true
    }

    async fn connect(&self, setup: LiveSetup) -> Result<UpstreamSession, LiveError> {
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::info!(interview_id = %setup.interview_id, "mock live session established");
        Ok(UpstreamSession {
            sink: Box::new(MockSink {
                outbound: Some(tx),
                sent_texts: Arc::clone(&self.sent_texts),
            }),
            stream: Box::new(MockStream {
                inbound: rx,
                script: script(&setup.questions),
                chunks_per_reply: self.chunks_per_reply,
                chunks: 0,
                output_rate: setup.output_sample_rate,
                pending: VecDeque::new(),
            }),
        })
    }
}
