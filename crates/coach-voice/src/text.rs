//! Shortening coach text before synthesis.

const ELLIPSIS: &str = "...";

/// A cut is only taken at a sentence boundary this far into the cap.
const MIN_BOUNDARY_RATIO: f64 = 0.6;

/// Truncates `text` to roughly `max_chars` characters for speech.
///
/// Prefers the last sentence boundary (`.`, `!`, `?`) at or after 60% of the
/// cap; otherwise hard-cuts and appends `...`. When `footer` is given and the
/// source text ended with it, the footer is re-appended after truncation and
/// the body is trimmed further to make room.
pub fn truncate_for_speech(text: &str, max_chars: usize, footer: Option<&str>) -> String {
    let cleaned = text.trim();
    if max_chars == 0 || cleaned.chars().count() <= max_chars {
        return cleaned.to_string();
    }

    let footer = footer
        .map(str::trim)
        .filter(|f| !f.is_empty() && cleaned.ends_with(f));

    let Some(footer) = footer else {
        return truncate_body(cleaned, max_chars);
    };

    let body = cleaned[..cleaned.len() - footer.len()].trim_end();
    let footer_len = footer.chars().count();
    if footer_len + 1 >= max_chars {
        return truncate_body(footer, max_chars);
    }
    let body = truncate_body(body, max_chars - footer_len - 1);
    if body.is_empty() {
        footer.to_string()
    } else {
        format!("{} {}", body, footer)
    }
}

fn truncate_body(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let head: String = text.chars().take(max_chars).collect();
    let min_cut = (max_chars as f64 * MIN_BOUNDARY_RATIO).ceil() as usize;

    let boundary = head
        .char_indices()
        .enumerate()
        .filter(|(_, (_, c))| matches!(c, '.' | '!' | '?'))
        .filter(|(position, _)| position + 1 >= min_cut)
        .last()
        .map(|(_, (byte, c))| byte + c.len_utf8());

    match boundary {
        Some(end) => head[..end].trim_end().to_string(),
        None => format!("{}{}", head.trim_end(), ELLIPSIS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_for_speech("  Hello there.  ", 100, None), "Hello there.");
    }

    #[test]
    fn cuts_at_sentence_boundary_after_sixty_percent() {
        let first = "a".repeat(89) + ".";
        let text = format!("{} {}", first, "b".repeat(209));
        assert_eq!(text.chars().count(), 300);

        let out = truncate_for_speech(&text, 120, None);
        assert!(out.chars().count() <= 123);
        assert_eq!(out, first);
    }

    #[test]
    fn early_boundary_is_ignored_in_favor_of_hard_cut() {
        let text = format!("Hi. {}", "word ".repeat(60));
        let out = truncate_for_speech(&text, 100, None);
        assert!(out.ends_with("..."));
        assert!(out.chars().count() <= 103);
    }

    #[test]
    fn footer_is_reappended_within_budget() {
        let footer = "Answer out loud when ready.";
        let text = format!("{} {}", "Long context sentence. ".repeat(20), footer);
        let out = truncate_for_speech(&text, 120, Some(footer));
        assert!(out.ends_with(footer));
        assert!(out.chars().count() <= 123);
    }

    #[test]
    fn footer_ignored_when_text_does_not_end_with_it() {
        let text = "x".repeat(200);
        let out = truncate_for_speech(&text, 50, Some("Footer."));
        assert!(!out.contains("Footer."));
        assert_eq!(out.chars().count(), 53);
    }
}
