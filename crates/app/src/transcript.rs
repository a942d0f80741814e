//! Conversation loaded from a JSON file.

use anyhow::{Context, Result};
use commentary::ChatHost;
use parking_lot::RwLock;
use serde::Deserialize;
use shared::chat::{ConversationTurn, Persona};
use std::collections::HashMap;
use std::path::Path;

/// Accepts either a bare array of turns or an object with `turns` and
/// `characters` (id to persona).
#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Turns(Vec<ConversationTurn>),
    Full {
        #[serde(default)]
        turns: Vec<ConversationTurn>,
        #[serde(default)]
        characters: HashMap<String, Persona>,
    },
}

#[derive(Default)]
pub struct JsonTranscriptHost {
    turns: RwLock<Vec<ConversationTurn>>,
    characters: HashMap<String, Persona>,
}

impl JsonTranscriptHost {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading transcript {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing transcript {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: TranscriptFile = serde_json::from_str(raw)?;
        let (turns, characters) = match file {
            TranscriptFile::Turns(turns) => (turns, HashMap::new()),
            TranscriptFile::Full { turns, characters } => (turns, characters),
        };
        Ok(Self {
            turns: RwLock::new(turns),
            characters,
        })
    }

    pub fn push(&self, turn: ConversationTurn) {
        self.turns.write().push(turn);
    }

    pub fn clear(&self) {
        self.turns.write().clear();
    }
}

impl ChatHost for JsonTranscriptHost {
    fn transcript(&self) -> Vec<ConversationTurn> {
        self.turns.read().clone()
    }

    fn persona(&self, character_id: &str) -> Option<Persona> {
        self.characters.get(character_id).cloned()
    }
}

/// Parse a `Name: text` line typed at the prompt. Lines without a name are
/// attributed to the user.
pub fn parse_line(line: &str, user_name: &str) -> Option<ConversationTurn> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(':') {
        Some((name, text)) if !name.trim().is_empty() && !text.trim().is_empty() && name.len() <= 30 => {
            let name = name.trim();
            Some(ConversationTurn::new(name, name.eq_ignore_ascii_case(user_name), text.trim()))
        }
        _ => Some(ConversationTurn::new(user_name, true, line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_array_with_host_field_names() {
        let host = JsonTranscriptHost::from_json(
            r#"[{"name": "Aria", "is_user": false, "mes": "Hello."}, {"name": "Sam", "is_user": true, "mes": "Hi!"}]"#,
        )
        .unwrap();
        let turns = host.transcript();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "Hello.");
        assert_eq!(turns[1].label(), "User");
        assert!(host.persona("aria").is_none());
    }

    #[test]
    fn test_full_file_with_characters() {
        let host = JsonTranscriptHost::from_json(
            r#"{"turns": [], "characters": {"mimi": {"description": "A cat.", "personality": "Smug."}}}"#,
        )
        .unwrap();
        assert!(host.transcript().is_empty());
        assert_eq!(host.persona("mimi").unwrap().text(), "A cat.\nSmug.");

        host.push(ConversationTurn::new("Aria", false, "Onward."));
        assert_eq!(host.transcript().len(), 1);
        host.clear();
        assert!(host.transcript().is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        std::fs::write(&path, r#"[{"speaker_name": "Aria", "text": "Hm."}]"#).unwrap();
        assert_eq!(JsonTranscriptHost::load(&path).unwrap().transcript().len(), 1);
        assert!(JsonTranscriptHost::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("Aria: I draw my sword.", "Sam"),
            Some(ConversationTurn::new("Aria", false, "I draw my sword."))
        );
        assert_eq!(
            parse_line("sam: wait", "Sam"),
            Some(ConversationTurn::new("sam", true, "wait"))
        );
        assert_eq!(
            parse_line("I look around", "Sam"),
            Some(ConversationTurn::new("Sam", true, "I look around"))
        );
        assert_eq!(parse_line("   ", "Sam"), None);
    }
}
