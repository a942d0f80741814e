//! Prompt preset data owned by the host.
//!
//! Presets arrive as loosely structured JSON. Only the fields the kibitzer reads
//! are typed; anything else lands in `extra` so legacy single-string prompt fields
//! can still be looked up by name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    #[default]
    System,
    User,
    Assistant,
}

/// One prompt block of a preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptFragment {
    pub identifier: String,
    #[serde(default)]
    pub role: PromptRole,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PromptFragment {
    pub fn new(identifier: impl Into<String>, role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            role,
            content: content.into(),
            enabled: true,
        }
    }

    /// Enabled and carrying actual text.
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub identifier: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// `prompt_order` is either a flat list or a list of per-character groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptOrderEntry {
    Group {
        #[serde(default)]
        character_id: Value,
        order: Vec<OrderItem>,
    },
    Item(OrderItem),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prompts: Vec<PromptFragment>,
    #[serde(default)]
    pub prompt_order: Vec<PromptOrderEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Preset {
    pub fn fragment(&self, identifier: &str) -> Option<&PromptFragment> {
        self.prompts.iter().find(|p| p.identifier == identifier)
    }

    /// Non-empty string value of a top-level field outside the typed ones.
    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Declared ordering, flattened. When groups are used the first non-empty one wins.
    pub fn declared_order(&self) -> Vec<&OrderItem> {
        let mut flat = Vec::new();
        for entry in &self.prompt_order {
            match entry {
                PromptOrderEntry::Item(item) => flat.push(item),
                PromptOrderEntry::Group { order, .. } => {
                    if flat.is_empty() && !order.is_empty() {
                        return order.iter().collect();
                    }
                }
            }
        }
        flat
    }
}

/// Entry of a preset listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetSummary {
    pub id: String,
    pub display_name: String,
}

impl PresetSummary {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tavern_style_preset() {
        let json = r#"{
            "name": "Default",
            "temperature": 1.0,
            "prompts": [
                {"identifier": "main", "role": "system", "content": "Be vivid."},
                {"identifier": "chatHistory", "marker": true},
                {"identifier": "jailbreak", "content": "No limits.", "enabled": false}
            ],
            "prompt_order": [
                {"character_id": 100000, "order": [{"identifier": "main", "enabled": true}]}
            ],
            "system_prompt": "legacy text"
        }"#;
        let preset: Preset = serde_json::from_str(json).unwrap();
        assert_eq!(preset.prompts.len(), 3);
        assert!(preset.fragment("main").unwrap().is_usable());
        assert!(!preset.fragment("chatHistory").unwrap().is_usable());
        assert!(!preset.fragment("jailbreak").unwrap().enabled);
        assert_eq!(preset.text_field("system_prompt"), Some("legacy text"));
        assert_eq!(preset.declared_order().len(), 1);
    }

    #[test]
    fn test_flat_prompt_order() {
        let json = r#"{"prompt_order": [{"identifier": "b"}, {"identifier": "a", "enabled": false}]}"#;
        let preset: Preset = serde_json::from_str(json).unwrap();
        let order = preset.declared_order();
        assert_eq!(order[0].identifier, "b");
        assert!(!order[1].enabled);
    }
}
