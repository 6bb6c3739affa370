//! Detecting repeated interview questions in finished coach utterances.
//!
//! Streaming models sometimes re-ask a question after a reconnect or a long
//! pause. Every finished coach utterance that reads as a question is matched
//! against the interview questions:
//!
//! 1. exact or substring match after normalizing case, punctuation, and
//!    whitespace, or
//! 2. token overlap: tokens of at least `min_token_len` characters shared
//!    with the question reach `min(min_shared_tokens, question tokens)`, or
//!    the shared/question token ratio reaches `min_overlap_ratio`.
//!
//! The thresholds are configuration. They are known to over-match short
//! questions and still need calibration against real transcripts.

use serde::Deserialize;
use std::collections::HashSet;

/// Leading words or phrases that mark an utterance as a question even
/// without a question mark.
const QUESTION_LEADS: &[&str] = &[
    "what",
    "how",
    "why",
    "when",
    "where",
    "which",
    "who",
    "can you",
    "could you",
    "would you",
    "will you",
    "do you",
    "did you",
    "have you",
    "are you",
    "is there",
    "tell me",
    "describe",
    "walk me through",
    "share",
    "give me",
    "explain",
];

fn default_min_shared_tokens() -> usize {
    8
}

fn default_min_overlap_ratio() -> f64 {
    0.45
}

fn default_min_token_len() -> usize {
    3
}

/// `[live.guard]`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GuardThresholds {
    #[serde(default = "default_min_shared_tokens")]
    pub min_shared_tokens: usize,

    #[serde(default = "default_min_overlap_ratio")]
    pub min_overlap_ratio: f64,

    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
}

impl Default for GuardThresholds {
    fn default() -> Self {
        Self {
            min_shared_tokens: default_min_shared_tokens(),
            min_overlap_ratio: default_min_overlap_ratio(),
            min_token_len: default_min_token_len(),
        }
    }
}

/// What to do with a finished coach utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Repeats the question at the current progress index.
    Suppress(usize),
    /// Asks a question beyond the current progress index.
    Advance(usize),
    Pass,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionGuard {
    thresholds: GuardThresholds,
}

/// Lowercases, replaces punctuation with spaces, and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else if c == '\'' || c == '\u{2019}' {
                '\0'
            } else {
                ' '
            }
        })
        .filter(|c| *c != '\0')
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns `true` if the text contains `?` or opens with a question lead.
pub fn looks_like_question(text: &str) -> bool {
    if text.contains('?') {
        return true;
    }
    let normalized = normalize(text);
    QUESTION_LEADS.iter().any(|lead| {
        normalized == *lead
            || normalized
                .strip_prefix(lead)
                .is_some_and(|rest| rest.starts_with(' '))
    })
}

impl QuestionGuard {
    pub fn new(thresholds: GuardThresholds) -> Self {
        Self { thresholds }
    }

    fn tokens<'a>(&self, normalized: &'a str) -> HashSet<&'a str> {
        normalized
            .split(' ')
            .filter(|token| token.chars().count() >= self.thresholds.min_token_len)
            .collect()
    }

    /// Scores how strongly `text` restates `question`; `None` if it doesn't.
    fn score(&self, text_norm: &str, text_tokens: &HashSet<&str>, question: &str) -> Option<f64> {
        let question_norm = normalize(question);
        if question_norm.is_empty() {
            return None;
        }
        if text_norm == question_norm || text_norm.contains(&question_norm) {
            return Some(1.0);
        }

        let question_tokens = self.tokens(&question_norm);
        if question_tokens.is_empty() {
            return None;
        }
        let shared = question_tokens
            .iter()
            .filter(|token| text_tokens.contains(*token))
            .count();
        let total = question_tokens.len();
        let ratio = shared as f64 / total as f64;
        let required = self.thresholds.min_shared_tokens.min(total);

        if (shared > 0 && shared >= required) || ratio >= self.thresholds.min_overlap_ratio {
            Some(ratio)
        } else {
            None
        }
    }

    /// Returns the index of the question `text` restates, if any.
    ///
    /// When several questions match, the strongest wins; ties go to the
    /// earliest question.
    pub fn find_match(&self, text: &str, questions: &[String]) -> Option<usize> {
        if !looks_like_question(text) {
            return None;
        }
        let text_norm = normalize(text);
        if text_norm.is_empty() {
            return None;
        }
        let text_tokens = self.tokens(&text_norm);

        let mut best: Option<(usize, f64)> = None;
        for (index, question) in questions.iter().enumerate() {
            if let Some(score) = self.score(&text_norm, &text_tokens, question) {
                if best.map_or(true, |(_, current)| score > current) {
                    best = Some((index, score));
                }
            }
        }
        best.map(|(index, _)| index)
    }

    /// Classifies a finished coach utterance against the progress index.
    pub fn classify(&self, text: &str, questions: &[String], progress: Option<usize>) -> GuardDecision {
        match self.find_match(text, questions) {
            Some(index) if Some(index) == progress => GuardDecision::Suppress(index),
            Some(index) if progress.map_or(true, |current| index > current) => {
                GuardDecision::Advance(index)
            }
            _ => GuardDecision::Pass,
        }
    }
}
