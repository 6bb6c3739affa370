//! Prompts for the text model and the scripted mock adapter data.

use coach_types::{InterviewScore, InterviewSession, TranscriptEntry};

pub const MOCK_QUESTIONS: [&str; 4] = [
    "Walk me through a project where you improved the candidate experience.",
    "How do you prioritize when multiple hiring managers need updates?",
    "Describe a time you used data to influence a hiring decision.",
    "What would your 30-60-90 day plan look like for this role?",
];

pub const MOCK_FOCUS_AREAS: [&str; 3] = [
    "Structured storytelling",
    "Stakeholder alignment",
    "Metrics-driven impact",
];

pub const MOCK_VOICE_REPLY: &str =
    "Thanks for sharing. Can you add one measurable outcome to that answer?";

pub const MOCK_HELP_REPLY: &str = "Try structuring it around the situation, the action you took, \
and the result. Close with one number that shows the impact, then answer in your own words.";

/// Stored when the model returns an empty reply.
pub const EMPTY_REPLY_FALLBACK: &str = "Thanks. Let's continue.";

pub const FALLBACK_QUESTIONS: [&str; 4] = [
    "Walk me through a recent project that best reflects your strengths.",
    "How do you prioritize work when multiple stakeholders have competing needs?",
    "Describe a time you used data to influence a decision.",
    "What would your 30-60-90 day plan look like in this role?",
];

pub const FALLBACK_FOCUS_AREAS: [&str; 3] =
    ["Structured storytelling", "Impact metrics", "Role alignment"];

pub const FALLBACK_SCORE: u32 = 80;
pub const FALLBACK_SUMMARY: &str = "Solid responses. Focus on tighter outcomes and role alignment.";
pub const FALLBACK_STRENGTHS: [&str; 2] = ["Clear structure", "Role-relevant examples"];
pub const FALLBACK_IMPROVEMENTS: [&str; 2] = ["Add more quantified impact", "Close with role alignment"];

pub fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn mock_score() -> InterviewScore {
    InterviewScore {
        overall_score: 84,
        summary: "Clear structure and concise metrics. Add a sharper closing that ties to the role."
            .to_string(),
        strengths: owned(&[
            "Uses quantified impact",
            "Keeps answers focused",
            "Shows stakeholder awareness",
        ]),
        improvements: owned(&["Expand on technical depth", "Close with role alignment"]),
    }
}

/// Scripted opening line; matches the mock live connector's first turn.
pub fn mock_intro(questions: &[String]) -> String {
    match questions.first() {
        Some(first) => format!("Welcome. Let's begin. {}", first),
        None => "Welcome. Tell me a little about yourself.".to_string(),
    }
}

fn role_or_default(role_title: Option<&str>) -> &str {
    role_title
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("the target role")
}

pub fn coach_reply_prompt(system_prompt: &str, candidate_text: &str) -> String {
    format!("{}\n\nCandidate: {}\nCoach:", system_prompt, candidate_text)
}

pub fn intro_prompt(system_prompt: &str, role_title: Option<&str>) -> String {
    let role_line = match role_title.map(str::trim).filter(|r| !r.is_empty()) {
        Some(role) => format!("The candidate is preparing for the {} role. ", role),
        None => String::new(),
    };
    format!(
        "{}\n\nOpen the interview now. {}Greet the candidate in one short sentence, then ask \
         question 1. Do not ask the candidate to confirm readiness or the role.\nCoach:",
        system_prompt, role_line
    )
}

pub fn help_prompt(system_prompt: &str, request: &str) -> String {
    format!(
        "{}\n\nThe candidate asked for help with the current question: {}\n\
         Give a short draft answer grounded only in resume evidence, then ask them to answer \
         in their own words.\nCoach:",
        system_prompt, request
    )
}

pub fn questions_prompt(resume_text: &str, job_text: &str, role_title: Option<&str>) -> String {
    let resume = if resume_text.trim().is_empty() {
        "No resume text available."
    } else {
        resume_text
    };
    let job = if job_text.trim().is_empty() {
        "No job description text available."
    } else {
        job_text
    };
    format!(
        "You are an interview coach. Use the resume and job description to craft 4-6 interview \
         questions and 3-5 focus areas (rubric). Return JSON only.\n\n\
         Role title: {}\n\n\
         Resume:\n{}\n\n\
         Job description:\n{}\n\n\
         Return JSON with keys questions (array) and focus_areas (array).",
        role_or_default(role_title),
        resume,
        job
    )
}

pub fn score_prompt(
    transcript: &[TranscriptEntry],
    role_title: Option<&str>,
    focus_areas: &[String],
) -> String {
    let focus = if focus_areas.is_empty() {
        "clarity, confidence, relevance".to_string()
    } else {
        focus_areas.join(", ")
    };
    let transcript_text = if transcript.is_empty() {
        "No transcript provided.".to_string()
    } else {
        transcript
            .iter()
            .map(|e| format!("{}: {}", e.role.as_str(), e.text))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "You are an interview coach. Score the candidate interview on a 0-100 scale and provide \
         concise feedback. Return JSON only.\n\n\
         Role title: {}\n\
         Focus areas: {}\n\n\
         Transcript:\n{}\n\n\
         Return JSON with keys overall_score (0-100), summary (string), strengths (array), \
         improvements (array).",
        role_or_default(role_title),
        focus,
        transcript_text
    )
}

pub fn completion_prompt(question: Option<&str>, answer: &str) -> String {
    format!(
        "You are an interview coach listening to a candidate answer.\n\n\
         Question: {}\n\
         Answer so far: {}\n\n\
         Decide whether the candidate has finished answering. Return JSON only with keys \
         status (one of not_answered, partial, complete) and confidence (0-1).",
        question.unwrap_or("Unknown"),
        answer
    )
}

/// The question the candidate is currently answering, if any.
pub fn current_question(session: &InterviewSession) -> Option<&str> {
    session
        .asked_question_index
        .and_then(|i| session.questions.get(i))
        .map(String::as_str)
}

/// Stored as a `coach_feedback` transcript entry after scoring.
pub fn feedback_text(score: &InterviewScore) -> String {
    let mut text = format!("Score: {}/100. {}", score.overall_score, score.summary);
    if !score.strengths.is_empty() {
        text.push_str(&format!("\nStrengths: {}", score.strengths.join("; ")));
    }
    if !score.improvements.is_empty() {
        text.push_str(&format!("\nImprovements: {}", score.improvements.join("; ")));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intro_prompt_avoids_confirmation_language() {
        for role in [Some("Principal PM"), Some(""), None] {
            let prompt = intro_prompt("System.", role).to_lowercase();
            assert!(prompt.contains("do not ask the candidate to confirm readiness or the role"));
            assert!(!prompt.contains("confirm the role before proceeding"));
            assert!(!prompt.contains("confirm that you're ready"));
        }
    }

    #[test]
    fn coach_reply_prompt_shape() {
        assert_eq!(
            coach_reply_prompt("Be brief.", "I led a migration."),
            "Be brief.\n\nCandidate: I led a migration.\nCoach:"
        );
    }

    #[test]
    fn score_prompt_defaults() {
        let prompt = score_prompt(&[], None, &[]);
        assert!(prompt.contains("Role title: the target role"));
        assert!(prompt.contains("Focus areas: clarity, confidence, relevance"));
        assert!(prompt.contains("No transcript provided."));
    }

    #[test]
    fn feedback_text_lists_points() {
        let text = feedback_text(&mock_score());
        assert!(text.starts_with("Score: 84/100."));
        assert!(text.contains("Strengths: Uses quantified impact; Keeps answers focused"));
    }

    #[test]
    fn mock_intro_uses_first_question() {
        assert_eq!(
            mock_intro(&["Q1?".to_string()]),
            "Welcome. Let's begin. Q1?"
        );
        assert_eq!(mock_intro(&[]), "Welcome. Tell me a little about yourself.");
    }
}
