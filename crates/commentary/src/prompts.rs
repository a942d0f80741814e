//! Prompt assembly for kibitzer commentary.
//!
//! The model sees the recent conversation as a labelled transcript plus an
//! identity block and a short rule list telling it to react, not continue.

use regex::{NoExpand, Regex};
use shared::chat::ConversationTurn;
use shared::settings::CommentaryStyle;

/// Label substituted for `{{user}}` in preset text.
const USER_LABEL: &str = "User";

/// Preset macros that mean nothing outside a real chat turn.
const BLANKED_PRESET_MACROS: &[&str] = &["original", "scenario", "persona", "mesExamples"];

/// Trailing window of the conversation rendered for the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    /// `Speaker (<name>): <text>` lines separated by blank lines, oldest first
    pub text: String,
    /// Distinct speaker labels in order of first appearance
    pub speakers: Vec<String>,
    /// Raw text of the most recent turn
    pub last_message: Option<String>,
}

impl Transcript {
    pub fn render(turns: &[ConversationTurn], max_turns: usize) -> Self {
        let start = turns.len().saturating_sub(max_turns.max(1));
        let window = &turns[start..];

        let mut speakers: Vec<String> = Vec::new();
        let lines: Vec<String> = window
            .iter()
            .map(|turn| {
                let label = turn.label();
                if !speakers.iter().any(|s| s == label) {
                    speakers.push(label.to_string());
                }
                format!("Speaker ({}): {}", label, turn.text)
            })
            .collect();

        Self {
            text: lines.join("\n\n"),
            speakers,
            last_message: window.last().map(|t| t.text.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Everything the assembler reads.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub transcript: &'a Transcript,
    /// Name the kibitzer answers to
    pub kibitzer_name: &'a str,
    /// Persona description; empty when no character is selected
    pub persona: &'a str,
    pub style: CommentaryStyle,
    pub custom_template: Option<&'a str>,
    pub preset_system_prompt: Option<&'a str>,
}

/// Replace every `{{key}}` (any letter case) with its value.
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for &(key, value) in vars {
        let pattern = format!(r"(?i)\{{\{{{}\}}\}}", regex::escape(key));
        if let Ok(re) = Regex::new(&pattern) {
            out = re.replace_all(&out, NoExpand(value)).into_owned();
        }
    }
    out
}

fn has_placeholder(template: &str, key: &str) -> bool {
    template
        .to_lowercase()
        .contains(&format!("{{{{{}}}}}", key.to_lowercase()))
}

fn common_vars<'a>(inputs: &'a PromptInputs<'a>) -> Vec<(&'static str, &'a str)> {
    vec![
        ("kibitzer_name", inputs.kibitzer_name),
        ("chat_log", inputs.transcript.text.as_str()),
        ("personality", inputs.persona),
        ("style", inputs.style.tone()),
    ]
}

fn substitute_preset(text: &str, inputs: &PromptInputs<'_>) -> String {
    let mut vars = common_vars(inputs);
    vars.push(("char", inputs.kibitzer_name));
    vars.push(("user", USER_LABEL));
    for &name in BLANKED_PRESET_MACROS {
        vars.push((name, ""));
    }
    substitute(text, &vars)
}

fn default_identity(inputs: &PromptInputs<'_>) -> String {
    let persona = inputs.persona.trim();
    if !persona.is_empty() {
        return format!(
            "You are {}.\n[Your Personality & Traits]\n{}",
            inputs.kibitzer_name, persona
        );
    }
    let tone = inputs.style.tone();
    if tone.is_empty() {
        format!("You are {}.", inputs.kibitzer_name)
    } else {
        format!("You are {}.\n[Your Style]\n{}", inputs.kibitzer_name, tone)
    }
}

/// Build the final prompt.
///
/// Identity comes from the preset, else the custom template, else the persona or
/// tone. A preset or template that places `{{chat_log}}` itself is already a
/// complete prompt and is returned after substitution.
pub fn assemble(inputs: &PromptInputs<'_>) -> String {
    let preset = inputs
        .preset_system_prompt
        .filter(|p| !p.trim().is_empty());
    let custom = inputs.custom_template.filter(|t| !t.trim().is_empty());

    let identity = if let Some(preset) = preset {
        let block = substitute_preset(preset, inputs);
        if has_placeholder(preset, "chat_log") {
            return block;
        }
        format!("You are {}.\n\n{}", inputs.kibitzer_name, block.trim())
    } else if let Some(template) = custom {
        let block = substitute(template, &common_vars(inputs));
        if has_placeholder(template, "chat_log") {
            return block;
        }
        format!("You are {}.\n\n{}", inputs.kibitzer_name, block.trim())
    } else {
        default_identity(inputs)
    };

    let name = inputs.kibitzer_name;
    format!(
        r#"### IDENTITY
{identity}

### TASK
You are watching the "Roleplay Log" below as an observer.
Your goal is to provide a single, short, in-character reaction to the events.

### RULES
1. React strictly according to your personality ({name}).
2. Do NOT participate in the roleplay. You are just watching it.
3. Do NOT repeat the dialogue from the log.
4. Keep the comment short (1-3 sentences).

### ROLEPLAY LOG
{log}

### RESPONSE
(As {name}, I will ignore the log format and only provide my in-character reaction):
"#,
        identity = identity,
        name = name,
        log = inputs.transcript.text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::new("Aria", false, "The gate creaks open."),
            ConversationTurn::new("Sam", true, "I step inside."),
            ConversationTurn::new("Aria", false, "A shadow moves."),
        ]
    }

    fn inputs<'a>(transcript: &'a Transcript) -> PromptInputs<'a> {
        PromptInputs {
            transcript,
            kibitzer_name: "Mimi",
            persona: "",
            style: CommentaryStyle::Snarky,
            custom_template: None,
            preset_system_prompt: None,
        }
    }

    #[test]
    fn test_substitution_case_insensitive() {
        assert_eq!(substitute("Hi {{KIBITZER_NAME}}", &[("kibitzer_name", "Mimi")]), "Hi Mimi");
        assert_eq!(
            substitute("{{Style}} and {{style}}", &[("style", "dry")]),
            "dry and dry"
        );
    }

    #[test]
    fn test_substitution_value_is_literal() {
        assert_eq!(substitute("cost: {{x}}", &[("x", "$1.00")]), "cost: $1.00");
    }

    #[test]
    fn test_transcript_window_oldest_first() {
        let t = Transcript::render(&turns(), 2);
        assert_eq!(t.text, "Speaker (User): I step inside.\n\nSpeaker (Aria): A shadow moves.");
        assert_eq!(t.speakers, vec!["User".to_string(), "Aria".to_string()]);
        assert_eq!(t.last_message.as_deref(), Some("A shadow moves."));
    }

    #[test]
    fn test_default_prompt_uses_tone_without_persona() {
        let t = Transcript::render(&turns(), 10);
        let prompt = assemble(&inputs(&t));
        assert!(prompt.contains("You are Mimi.\n[Your Style]\nTone: Witty"));
        assert!(prompt.contains("Keep the comment short (1-3 sentences)"));
        assert!(prompt.contains("Do NOT participate in the roleplay"));
        assert!(prompt.contains("Speaker (Aria): The gate creaks open."));
    }

    #[test]
    fn test_persona_wins_over_tone() {
        let t = Transcript::render(&turns(), 10);
        let mut i = inputs(&t);
        i.persona = "A theatre critic with opinions.";
        let prompt = assemble(&i);
        assert!(prompt.contains("[Your Personality & Traits]\nA theatre critic with opinions."));
        assert!(!prompt.contains("[Your Style]"));
    }

    #[test]
    fn test_custom_template_with_log_is_whole_prompt() {
        let t = Transcript::render(&turns(), 1);
        let mut i = inputs(&t);
        i.custom_template = Some("{{KIBITZER_NAME}} watches:\n{{chat_log}}\n{{style}}");
        let prompt = assemble(&i);
        assert_eq!(
            prompt,
            format!(
                "Mimi watches:\nSpeaker (Aria): A shadow moves.\n{}",
                CommentaryStyle::Snarky.tone()
            )
        );
    }

    #[test]
    fn test_custom_template_without_log_is_wrapped() {
        let t = Transcript::render(&turns(), 10);
        let mut i = inputs(&t);
        i.custom_template = Some("Grumpy gnome named {{kibitzer_name}}.");
        let prompt = assemble(&i);
        assert!(prompt.contains("You are Mimi.\n\nGrumpy gnome named Mimi."));
        assert!(prompt.contains("### ROLEPLAY LOG"));
    }

    #[test]
    fn test_preset_takes_priority_and_maps_macros() {
        let t = Transcript::render(&turns(), 10);
        let mut i = inputs(&t);
        i.custom_template = Some("ignored template");
        i.preset_system_prompt = Some("Write as {{char}} for {{user}}.{{scenario}}{{MesExamples}}");
        let prompt = assemble(&i);
        assert!(prompt.contains("Write as Mimi for User."));
        assert!(!prompt.contains("ignored template"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_empty_transcript_still_valid() {
        let t = Transcript::render(&[], 10);
        assert!(t.is_empty());
        assert_eq!(t.last_message, None);
        let prompt = assemble(&inputs(&t));
        assert!(prompt.contains("### IDENTITY"));
        assert!(prompt.contains("### ROLEPLAY LOG\n\n\n### RESPONSE"));
    }
}
