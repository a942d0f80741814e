pub mod events;
pub mod preset;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::str::FromStr;

    fn default_true() -> bool {
        true
    }

    fn default_frequency() -> u32 {
        5
    }

    fn default_max_context() -> usize {
        10
    }

    fn default_max_tokens() -> u32 {
        150
    }

    fn default_temperature() -> f32 {
        0.8
    }

    fn default_timeout_secs() -> u64 {
        60
    }

    fn default_debounce_ms() -> u64 {
        1000
    }

    fn default_grace_ms() -> u64 {
        2000
    }

    fn default_startup_grace_ms() -> u64 {
        3000
    }

    /// Tone the kibitzer takes when no persona is configured.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum CommentaryStyle {
        None,
        #[default]
        Snarky,
        Supportive,
        Analytical,
        Chaotic,
    }

    impl CommentaryStyle {
        pub fn all() -> &'static [CommentaryStyle] {
            &[
                CommentaryStyle::None,
                CommentaryStyle::Snarky,
                CommentaryStyle::Supportive,
                CommentaryStyle::Analytical,
                CommentaryStyle::Chaotic,
            ]
        }

        /// Fixed tone line injected into prompts.
        pub fn tone(&self) -> &'static str {
            match self {
                CommentaryStyle::None => "",
                CommentaryStyle::Snarky => {
                    "Tone: Witty, slightly sardonic, entertaining but not mean-spirited."
                }
                CommentaryStyle::Supportive => {
                    "Tone: Enthusiastic, encouraging, cheering on the participants."
                }
                CommentaryStyle::Analytical => {
                    "Tone: Insightful, observant, focusing on choices and narrative."
                }
                CommentaryStyle::Chaotic => {
                    "Tone: Unpredictable, humorous, absurd, breaking the fourth wall."
                }
            }
        }
    }

    /// Where generation requests go.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum ApiMode {
        /// Delegate to the host's active connection profile
        #[default]
        Profile,
        /// Call the configured backend directly
        Custom,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum Backend {
        #[default]
        OpenAi,
        OpenRouter,
        Claude,
        Mistral,
        Cohere,
        Palm,
        Kobold,
        TextGen,
        Custom,
    }

    impl Backend {
        pub fn all() -> &'static [Backend] {
            &[
                Backend::OpenAi,
                Backend::OpenRouter,
                Backend::Claude,
                Backend::Mistral,
                Backend::Cohere,
                Backend::Palm,
                Backend::Kobold,
                Backend::TextGen,
                Backend::Custom,
            ]
        }

        pub fn as_str(&self) -> &'static str {
            match self {
                Backend::OpenAi => "openai",
                Backend::OpenRouter => "openrouter",
                Backend::Claude => "claude",
                Backend::Mistral => "mistral",
                Backend::Cohere => "cohere",
                Backend::Palm => "palm",
                Backend::Kobold => "kobold",
                Backend::TextGen => "textgen",
                Backend::Custom => "custom",
            }
        }

        /// Hosted services refuse unauthenticated calls; local servers usually don't care.
        pub fn requires_api_key(&self) -> bool {
            !matches!(self, Backend::Kobold | Backend::TextGen | Backend::Custom)
        }

        /// Kobold-style servers run whatever model they loaded.
        pub fn requires_model(&self) -> bool {
            !matches!(self, Backend::Kobold)
        }

        pub fn default_base_url(&self) -> Option<&'static str> {
            match self {
                Backend::OpenAi => Some("https://api.openai.com/v1"),
                Backend::OpenRouter => Some("https://openrouter.ai/api/v1"),
                Backend::Claude => Some("https://api.anthropic.com"),
                Backend::Mistral => Some("https://api.mistral.ai/v1"),
                Backend::Cohere => Some("https://api.cohere.ai/compatibility/v1"),
                Backend::Palm => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
                Backend::Kobold | Backend::TextGen | Backend::Custom => None,
            }
        }
    }

    impl fmt::Display for Backend {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for Backend {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let wanted = s.trim().to_ascii_lowercase();
            Backend::all()
                .iter()
                .copied()
                .find(|b| b.as_str() == wanted)
                .ok_or_else(|| format!("unknown backend: {}", s))
        }
    }

    /// A host API and model, as read from or applied to the host.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ApiSelection {
        pub backend: Backend,
        #[serde(default)]
        pub model: String,
        /// Endpoint override; only set for backends without a public default
        #[serde(default)]
        pub api_url: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct KibitzerSettings {
        #[serde(default = "default_true")]
        pub enabled: bool,
        /// Generate on every Nth qualifying message
        #[serde(default = "default_frequency")]
        pub frequency: u32,
        #[serde(default)]
        pub message_count: u32,

        #[serde(default)]
        pub character_id: Option<String>,
        #[serde(default)]
        pub character_name: String,
        #[serde(default)]
        pub character_personality: String,
        #[serde(default)]
        pub commentary_style: CommentaryStyle,
        #[serde(default)]
        pub custom_system_prompt: Option<String>,

        #[serde(default)]
        pub api_mode: ApiMode,
        /// Profile to switch to for commentary (profile mode). None = keep current.
        #[serde(default)]
        pub connection_profile: Option<String>,
        #[serde(default)]
        pub backend: Backend,
        #[serde(default)]
        pub api_url: String,
        #[serde(default)]
        pub api_key: Option<String>,
        #[serde(default)]
        pub model: String,
        #[serde(default)]
        pub selected_preset: Option<String>,

        /// Point the host at another API and model for commentary (profile mode).
        /// Takes priority over `connection_profile`.
        #[serde(default)]
        pub quick_api_enabled: bool,
        #[serde(default)]
        pub quick_api_backend: Option<Backend>,
        #[serde(default)]
        pub quick_api_model: String,
        #[serde(default)]
        pub quick_api_url: String,

        #[serde(default = "default_max_context")]
        pub max_context_messages: usize,
        #[serde(default = "default_max_tokens")]
        pub max_tokens: u32,
        #[serde(default = "default_temperature")]
        pub temperature: f32,
        #[serde(default = "default_timeout_secs")]
        pub request_timeout_secs: u64,
        #[serde(default = "default_debounce_ms")]
        pub trigger_debounce_ms: u64,
        #[serde(default = "default_grace_ms")]
        pub chat_load_grace_ms: u64,
        /// Messages arriving this soon after startup belong to the initial load
        #[serde(default = "default_startup_grace_ms")]
        pub startup_grace_ms: u64,
    }

    impl Default for KibitzerSettings {
        fn default() -> Self {
            Self {
                enabled: true,
                frequency: default_frequency(),
                message_count: 0,
                character_id: None,
                character_name: String::new(),
                character_personality: String::new(),
                commentary_style: CommentaryStyle::default(),
                custom_system_prompt: None,
                api_mode: ApiMode::default(),
                connection_profile: None,
                backend: Backend::default(),
                api_url: String::new(),
                api_key: None,
                model: String::new(),
                selected_preset: None,
                quick_api_enabled: false,
                quick_api_backend: None,
                quick_api_model: String::new(),
                quick_api_url: String::new(),
                max_context_messages: default_max_context(),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                request_timeout_secs: default_timeout_secs(),
                trigger_debounce_ms: default_debounce_ms(),
                chat_load_grace_ms: default_grace_ms(),
                startup_grace_ms: default_startup_grace_ms(),
            }
        }
    }

    impl KibitzerSettings {
        /// Clamp values a hand-edited file could get wrong.
        pub fn normalized(mut self) -> Self {
            self.frequency = self.frequency.max(1);
            self.max_context_messages = self.max_context_messages.max(1);
            self.message_count = self.message_count.min(self.frequency);
            self
        }

        /// Name shown in prompts, falling back to a generic label.
        pub fn display_name(&self) -> &str {
            let name = self.character_name.trim();
            if name.is_empty() {
                "Kibitzer"
            } else {
                name
            }
        }

        pub fn selected_preset(&self) -> Option<&str> {
            self.selected_preset
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
        }

        pub fn custom_template(&self) -> Option<&str> {
            self.custom_system_prompt
                .as_deref()
                .filter(|s| !s.trim().is_empty())
        }

        pub fn connection_profile(&self) -> Option<&str> {
            self.connection_profile
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
        }

        /// The quick API override, when it is enabled with a backend and a model.
        pub fn quick_api(&self) -> Option<ApiSelection> {
            if !self.quick_api_enabled {
                return None;
            }
            let backend = self.quick_api_backend?;
            let model = self.quick_api_model.trim();
            if model.is_empty() {
                return None;
            }
            let url = self.quick_api_url.trim();
            let api_url = (backend.default_base_url().is_none() && !url.is_empty())
                .then(|| url.to_string());
            Some(ApiSelection {
                backend,
                model: model.to_string(),
                api_url,
            })
        }
    }
}

pub mod chat {
    use serde::{Deserialize, Serialize};

    /// One message of the host conversation. Read-only to the kibitzer.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ConversationTurn {
        #[serde(alias = "name", default)]
        pub speaker_name: String,
        #[serde(default)]
        pub is_user: bool,
        #[serde(alias = "mes")]
        pub text: String,
    }

    impl ConversationTurn {
        pub fn new(speaker_name: impl Into<String>, is_user: bool, text: impl Into<String>) -> Self {
            Self {
                speaker_name: speaker_name.into(),
                is_user,
                text: text.into(),
            }
        }

        /// Label used when rendering the transcript.
        pub fn label(&self) -> &str {
            if self.is_user {
                "User"
            } else if self.speaker_name.trim().is_empty() {
                "Character"
            } else {
                self.speaker_name.trim()
            }
        }
    }

    /// Character card fields used as the kibitzer's persona.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Persona {
        #[serde(default)]
        pub description: String,
        #[serde(default)]
        pub personality: String,
    }

    impl Persona {
        /// Description followed by personality on its own line.
        pub fn text(&self) -> String {
            let mut out = self.description.trim().to_string();
            let personality = self.personality.trim();
            if !personality.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(personality);
            }
            out
        }
    }
}
