//! Transcript entries, the same-role merge rule, and the conversation memory
//! rollup used to rebuild context after a reconnect.

use crate::TranscriptRole;
use serde::{Deserialize, Serialize};

/// Characters kept from the most recent coach/candidate turn in the memory header.
const MEMORY_HEADER_TURN_CHARS: usize = 240;

/// One finished utterance in the interview transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
}

impl TranscriptEntry {
    pub fn new(role: TranscriptRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: crate::now_rfc3339(),
        }
    }
}

/// Appends `incoming` to `previous` following the streaming-fragment rules.
///
/// No space is inserted when the fragment starts with punctuation or a
/// closing quote, when the previous text ends with a hyphen or whitespace, or
/// when a single alphanumeric character continues an alphanumeric word
/// (`"wha" + "t"`). Otherwise exactly one space separates the two.
pub fn merge_transcript_text(previous: &str, incoming: &str) -> String {
    let next = incoming.trim();
    if previous.is_empty() {
        return next.to_string();
    }
    if next.is_empty() {
        return previous.to_string();
    }

    let last = previous.chars().next_back().unwrap_or(' ');
    let first = next.chars().next().unwrap_or(' ');
    let starts_with_punct = matches!(first, ',' | '.' | ';' | ':' | '!' | '?' | ')');
    let starts_with_quote = matches!(first, '\'' | '\u{2019}' | '"' | '\u{201d}');
    let single_char_continuation =
        next.chars().count() == 1 && first.is_alphanumeric() && last.is_alphanumeric();

    if last == '-'
        || last.is_whitespace()
        || starts_with_punct
        || starts_with_quote
        || single_char_continuation
    {
        format!("{}{}", previous, next)
    } else {
        format!("{} {}", previous, next)
    }
}

/// Truncates `value` to `limit` characters, appending `...` when cut.
pub fn truncate_chars(value: &str, limit: usize) -> String {
    let cleaned = value.trim();
    if cleaned.chars().count() <= limit {
        return cleaned.to_string();
    }
    let cut: String = cleaned.chars().take(limit).collect();
    format!("{}...", cut.trim_end())
}

fn last_text_for(transcript: &[TranscriptEntry], role: TranscriptRole) -> Option<&str> {
    transcript
        .iter()
        .rev()
        .find(|entry| entry.role == role && !entry.text.trim().is_empty())
        .map(|entry| entry.text.trim())
}

/// Builds the bounded conversation memory string for a transcript.
///
/// The rollup leads with the last coach prompt and last candidate response,
/// followed by the labelled transcript lines. When the result exceeds
/// `max_chars`, the oldest lines are dropped so the memory always ends with
/// the most recent exchange and starts on a line boundary.
pub fn build_conversation_memory(
    transcript: &[TranscriptEntry],
    max_entries: Option<usize>,
    max_chars: Option<usize>,
) -> String {
    if transcript.is_empty() {
        return String::new();
    }

    let mut header = Vec::new();
    if let Some(text) = last_text_for(transcript, TranscriptRole::Coach) {
        header.push(format!(
            "Last coach prompt: {}",
            truncate_chars(text, MEMORY_HEADER_TURN_CHARS)
        ));
    }
    if let Some(text) = last_text_for(transcript, TranscriptRole::Candidate) {
        header.push(format!(
            "Last candidate response: {}",
            truncate_chars(text, MEMORY_HEADER_TURN_CHARS)
        ));
    }

    let start = max_entries
        .map(|limit| transcript.len().saturating_sub(limit))
        .unwrap_or(0);
    let lines: Vec<String> = transcript[start..]
        .iter()
        .filter(|entry| !entry.text.trim().is_empty())
        .map(|entry| format!("{}: {}", entry.role.label(), entry.text.trim()))
        .collect();

    let mut memory = lines.join("\n");
    if !header.is_empty() {
        memory = format!("{}\n\nTranscript:\n{}", header.join("\n"), memory);
    }

    if let Some(limit) = max_chars {
        let total = memory.chars().count();
        if total > limit {
            let tail: String = memory.chars().skip(total - limit).collect();
            memory = match tail.find('\n') {
                Some(pos) => tail[pos + 1..].trim_start().to_string(),
                None => tail,
            };
        }
    }
    memory
}
