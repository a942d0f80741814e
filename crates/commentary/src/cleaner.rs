//! Post-processing of raw model output.

use regex::Regex;
use std::sync::LazyLock;

/// Echo detection ignores turns this short.
const MIN_ECHO_CHARS: usize = 10;

static PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(Here'?s?\s+(is\s+)?(my\s+)?commentary:?\s*)",
        r"(?i)^(My\s+commentary:?\s*)",
        r"(?i)^(Commentary:?\s*)",
        r"(?i)^(Response:?\s*)",
        r"(?i)^(As\s+.+?,?\s+(I\s+)?(think|say|comment|observe|note):?\s*)",
        r"(?i)^\*?(clears\s+throat|ahem)\*?\s*",
        r"(?i)^\(As\s+.*?\):?\s*",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static CHAT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\[)?(Speaker\s\()?[A-Za-z0-9_\s]{1,30}(\))?(\])?\s*:\s*.+")
        .expect("chat line pattern")
});

static DECORATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-=_*]{3,}$").expect("decorative line pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanOutcome {
    Text(String),
    /// Nothing usable survived cleaning.
    Empty,
    /// The response repeated the latest turn.
    Echo,
}

fn strip_quotes(text: &str) -> &str {
    const PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('\u{201C}', '\u{201D}'), ('\u{2018}', '\u{2019}')];
    for (open, close) in PAIRS {
        if text.chars().count() >= 2 && text.starts_with(open) && text.ends_with(close) {
            let inner = &text[open.len_utf8()..text.len() - close.len_utf8()];
            return inner.trim();
        }
    }
    text
}

fn is_speaker_line(line: &str, speakers: &[String]) -> bool {
    let lower = line.to_lowercase();
    speakers
        .iter()
        .filter(|s| !s.is_empty())
        .any(|s| lower.starts_with(&format!("{}:", s.to_lowercase())))
}

/// Turn a raw model response into displayable commentary.
///
/// `speakers` are the labels rendered into the transcript; `last_message` is
/// the text of the most recent turn.
pub fn clean_response(raw: &str, speakers: &[String], last_message: Option<&str>) -> CleanOutcome {
    if let Some(last) = last_message {
        let last = last.trim();
        if last.chars().count() > MIN_ECHO_CHARS && raw.contains(last) {
            return CleanOutcome::Echo;
        }
    }

    let mut cleaned = strip_quotes(raw.trim()).to_string();
    for prefix in PREFIXES.iter() {
        cleaned = prefix.replace(&cleaned, "").into_owned();
    }

    let kept: Vec<&str> = cleaned
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !CHAT_LINE.is_match(line))
        .filter(|line| !is_speaker_line(line, speakers))
        .filter(|line| !DECORATIVE.is_match(line))
        .collect();

    let joined = kept.join(" ");
    let joined = joined.trim();
    if joined.chars().count() < 2 {
        CleanOutcome::Empty
    } else {
        CleanOutcome::Text(joined.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speakers() -> Vec<String> {
        vec!["User".to_string(), "Aria".to_string()]
    }

    #[test]
    fn test_echo_of_last_turn_is_rejected() {
        let last = "The dragon breathes fire across the valley.";
        let raw = "Oh no! The dragon breathes fire across the valley. Again.";
        assert_eq!(clean_response(raw, &speakers(), Some(last)), CleanOutcome::Echo);
    }

    #[test]
    fn test_short_last_turn_never_counts_as_echo() {
        let out = clean_response("Yes. Finally, yes.", &speakers(), Some("Yes."));
        assert_eq!(out, CleanOutcome::Text("Yes. Finally, yes.".to_string()));
    }

    #[test]
    fn test_strips_quotes_and_prefixes() {
        assert_eq!(
            clean_response("\"Here's my commentary: Bold move.\"", &[], None),
            CleanOutcome::Text("Bold move.".to_string())
        );
        assert_eq!(
            clean_response("\u{201C}Well, that escalated.\u{201D}", &[], None),
            CleanOutcome::Text("Well, that escalated.".to_string())
        );
        assert_eq!(
            clean_response("(As Mimi): Called it.", &[], None),
            CleanOutcome::Text("Called it.".to_string())
        );
        assert_eq!(
            clean_response("*clears throat* Predictable.", &[], None),
            CleanOutcome::Text("Predictable.".to_string())
        );
        assert_eq!(
            clean_response("As Mimi, I think this is doomed.", &[], None),
            CleanOutcome::Text("this is doomed.".to_string())
        );
    }

    #[test]
    fn test_drops_transcript_and_decorative_lines() {
        let raw = "Speaker (Aria): I draw my sword.\n---\nSomeone is overcompensating.\naria: again?!";
        assert_eq!(
            clean_response(raw, &speakers(), None),
            CleanOutcome::Text("Someone is overcompensating.".to_string())
        );
    }

    #[test]
    fn test_lines_joined_with_space() {
        let raw = "This is fine.\n\nEverything is fine.";
        assert_eq!(
            clean_response(raw, &[], None),
            CleanOutcome::Text("This is fine. Everything is fine.".to_string())
        );
    }

    #[test]
    fn test_nothing_left_is_empty() {
        assert_eq!(clean_response("Aria: hello there", &speakers(), None), CleanOutcome::Empty);
        assert_eq!(clean_response("\"\"", &[], None), CleanOutcome::Empty);
        assert_eq!(clean_response("   ", &[], None), CleanOutcome::Empty);
    }
}
