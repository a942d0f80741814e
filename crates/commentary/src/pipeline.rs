//! The commentary pipeline: decides when to speak, asks a backend, cleans the
//! answer and reports everything to the presentation layer as events.

use crate::cleaner::{clean_response, CleanOutcome};
use crate::error::CommentaryError;
use crate::host::{ApiControl, ChatHost, ConnectionProfiles, GenerationDelegate, SettingsStore};
use crate::presets::{extract_system_prompt, PresetResolver};
use crate::prompts::{assemble, PromptInputs, Transcript};
use parking_lot::Mutex;
use providers::{BackendConfig, BackendRouter, GenerationRequest};
use shared::chat::ConversationTurn;
use shared::events::CommentaryEvent;
use shared::settings::{ApiMode, ApiSelection, KibitzerSettings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const SILENT_PLACEHOLDER: &str = "*observes silently*";
pub const NO_RESPONSE_PLACEHOLDER: &str = "*stares silently* (No response)";

const STATUS_THINKING: &str = "Thinking...";
const STATUS_GENERATING: &str = "Generating...";
const STATUS_WATCHING: &str = "Watching...";
const STATUS_ERROR: &str = "Error!";
const STATUS_NO_CHAT: &str = "Waiting for the RP to start...";
const NEW_CHAT_MESSAGE: &str = "New chat! Waiting for something interesting...";

/// Result of one generation episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commentary {
    Spoken(String),
    /// Cleaning left nothing to say
    Silent,
    /// The model parroted the latest turn
    EchoRejected,
    /// The backend returned an empty response
    NoResponse,
    Failed { reason: String },
}

impl Commentary {
    /// What the bubble shows.
    pub fn display_text(&self) -> String {
        match self {
            Commentary::Spoken(text) => text.clone(),
            Commentary::Silent | Commentary::EchoRejected => SILENT_PLACEHOLDER.to_string(),
            Commentary::NoResponse => NO_RESPONSE_PLACEHOLDER.to_string(),
            Commentary::Failed { reason } => format!("*mumbles* (Error: {})", reason),
        }
    }
}

/// Why a trigger did or did not produce commentary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Disabled,
    /// Another generation is running; the trigger was dropped.
    Busy,
    /// Too soon after the previous message trigger.
    Debounced,
    /// A chat is still loading.
    Loading,
    /// The conversation has no turns yet.
    WaitingForChat,
    /// Counted towards the next commentary.
    Counted { count: u32, frequency: u32 },
    Generated(Commentary),
}

/// Holds the generating flag for one episode and clears it on drop.
struct GeneratingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> GeneratingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Host state to put back once an episode is over.
enum HostRestore<'a> {
    Nothing,
    Api(&'a dyn ApiControl, ApiSelection),
    Profile(&'a dyn ConnectionProfiles, String),
}

pub struct CommentaryPipeline {
    settings: Mutex<KibitzerSettings>,
    store: Arc<dyn SettingsStore>,
    chat: Arc<dyn ChatHost>,
    delegate: Option<Arc<dyn GenerationDelegate>>,
    profiles: Option<Arc<dyn ConnectionProfiles>>,
    api: Option<Arc<dyn ApiControl>>,
    presets: PresetResolver,
    events: UnboundedSender<CommentaryEvent>,
    generating: AtomicBool,
    last_trigger: Mutex<Option<Instant>>,
    grace_until: Mutex<Option<Instant>>,
}

impl CommentaryPipeline {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        chat: Arc<dyn ChatHost>,
        events: UnboundedSender<CommentaryEvent>,
    ) -> Self {
        let settings = store.load().unwrap_or_else(|e| {
            warn!("failed to load kibitzer settings, using defaults: {:#}", e);
            KibitzerSettings::default()
        });
        let startup_grace = Duration::from_millis(settings.startup_grace_ms);
        Self {
            settings: Mutex::new(settings.normalized()),
            store,
            chat,
            delegate: None,
            profiles: None,
            api: None,
            presets: PresetResolver::default(),
            events,
            generating: AtomicBool::new(false),
            last_trigger: Mutex::new(None),
            grace_until: Mutex::new(Some(Instant::now() + startup_grace)),
        }
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn GenerationDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ConnectionProfiles>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Lets the quick API override switch the host's API and model.
    pub fn with_api_control(mut self, api: Arc<dyn ApiControl>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_presets(mut self, presets: PresetResolver) -> Self {
        self.presets = presets;
        self
    }

    pub fn settings(&self) -> KibitzerSettings {
        self.settings.lock().clone()
    }

    /// Apply `f` to the settings and persist the result.
    pub fn update_settings(&self, f: impl FnOnce(&mut KibitzerSettings)) {
        let snapshot = {
            let mut settings = self.settings.lock();
            f(&mut settings);
            *settings = settings.clone().normalized();
            settings.clone()
        };
        self.persist(&snapshot);
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    pub fn presets(&self) -> &PresetResolver {
        &self.presets
    }

    /// A new message arrived in the host conversation.
    pub async fn on_message_received(&self) -> TriggerOutcome {
        let debounce = {
            let settings = self.settings.lock();
            if !settings.enabled {
                return TriggerOutcome::Disabled;
            }
            Duration::from_millis(settings.trigger_debounce_ms)
        };

        let now = Instant::now();
        if matches!(*self.grace_until.lock(), Some(until) if now < until) {
            debug!("ignoring message during chat load");
            return TriggerOutcome::Loading;
        }
        {
            let mut last = self.last_trigger.lock();
            if matches!(*last, Some(prev) if now.duration_since(prev) < debounce) {
                debug!("debounced duplicate trigger");
                return TriggerOutcome::Debounced;
            }
            *last = Some(now);
        }

        self.on_trigger(false).await
    }

    /// The host switched to another chat.
    pub fn on_chat_changed(&self) {
        let (snapshot, grace) = {
            let mut settings = self.settings.lock();
            settings.message_count = 0;
            (settings.clone(), Duration::from_millis(settings.chat_load_grace_ms))
        };
        self.persist(&snapshot);
        *self.grace_until.lock() = Some(Instant::now() + grace);

        self.emit(CommentaryEvent::Commentary(NEW_CHAT_MESSAGE.to_string()));
        self.emit(CommentaryEvent::status(STATUS_WATCHING));
    }

    /// Count a qualifying message, or force commentary right away.
    pub async fn on_trigger(&self, force: bool) -> TriggerOutcome {
        if !force && !self.settings.lock().enabled {
            return TriggerOutcome::Disabled;
        }
        let Some(_guard) = GeneratingGuard::acquire(&self.generating) else {
            debug!("generation already running, dropping trigger");
            return TriggerOutcome::Busy;
        };

        let turns = self.chat.transcript();
        if turns.is_empty() {
            self.emit(CommentaryEvent::status(STATUS_NO_CHAT));
            return TriggerOutcome::WaitingForChat;
        }

        if !force {
            let (snapshot, due) = {
                let mut settings = self.settings.lock();
                settings.message_count += 1;
                let due = settings.message_count >= settings.frequency;
                if due {
                    settings.message_count = 0;
                }
                (settings.clone(), due)
            };
            self.persist(&snapshot);
            if !due {
                debug!(count = snapshot.message_count, frequency = snapshot.frequency, "counted message");
                return TriggerOutcome::Counted {
                    count: snapshot.message_count,
                    frequency: snapshot.frequency,
                };
            }
        }

        let settings = self.settings();
        TriggerOutcome::Generated(self.generate(&settings, &turns).await)
    }

    async fn generate(&self, settings: &KibitzerSettings, turns: &[ConversationTurn]) -> Commentary {
        self.emit(CommentaryEvent::TypingStarted);
        self.emit(CommentaryEvent::status(STATUS_THINKING));

        let transcript = Transcript::render(turns, settings.max_context_messages);
        let raw = match settings.api_mode {
            ApiMode::Custom => self.request_custom(settings, &transcript).await,
            ApiMode::Profile => self.request_via_profile(settings, &transcript).await,
        };

        let commentary = match raw.and_then(|raw| interpret(&raw, &transcript)) {
            Ok(commentary) => commentary,
            Err(CommentaryError::EchoRejected) => {
                info!("response echoed the conversation, staying silent");
                Commentary::EchoRejected
            }
            Err(e) => {
                warn!("commentary generation failed: {}", e);
                Commentary::Failed { reason: e.to_string() }
            }
        };

        match &commentary {
            Commentary::Failed { reason } => {
                self.emit(CommentaryEvent::Failed {
                    reason: reason.clone(),
                    display: commentary.display_text(),
                });
                self.emit(CommentaryEvent::status(STATUS_ERROR));
            }
            other => {
                if let Commentary::Spoken(text) = other {
                    info!(chars = text.len(), "commentary generated");
                }
                self.emit(CommentaryEvent::Commentary(other.display_text()));
                self.emit(CommentaryEvent::status(STATUS_WATCHING));
            }
        }
        self.emit(CommentaryEvent::TypingStopped);
        commentary
    }

    async fn request_custom(
        &self,
        settings: &KibitzerSettings,
        transcript: &Transcript,
    ) -> Result<String, CommentaryError> {
        let config = BackendConfig::from_settings(settings);
        config.validate()?;

        let preset_prompt = match settings.selected_preset() {
            Some(id) => match self.presets.load_preset(id).await {
                Some(preset) => Some(extract_system_prompt(&preset)).filter(|p| !p.trim().is_empty()),
                None => {
                    warn!(preset = id, "preset not found, using default prompt");
                    None
                }
            },
            None => None,
        };

        let persona = self.persona_text(settings);
        let prompt = assemble(&PromptInputs {
            transcript,
            kibitzer_name: settings.display_name(),
            persona: &persona,
            style: settings.commentary_style,
            custom_template: settings.custom_template(),
            preset_system_prompt: preset_prompt.as_deref(),
        });

        self.emit(CommentaryEvent::status(STATUS_GENERATING));
        let router = BackendRouter::new(config);
        Ok(router.generate(&GenerationRequest::new(prompt)).await?)
    }

    async fn request_via_profile(
        &self,
        settings: &KibitzerSettings,
        transcript: &Transcript,
    ) -> Result<String, CommentaryError> {
        let delegate = self.delegate.as_ref().ok_or_else(|| {
            CommentaryError::Configuration("profile mode needs a host generation delegate".into())
        })?;

        let persona = self.persona_text(settings);
        let prompt = assemble(&PromptInputs {
            transcript,
            kibitzer_name: settings.display_name(),
            persona: &persona,
            style: settings.commentary_style,
            custom_template: settings.custom_template(),
            preset_system_prompt: None,
        });

        let restore = self.prepare_host(settings).await;

        self.emit(CommentaryEvent::status(STATUS_GENERATING));
        let limit = Duration::from_secs(settings.request_timeout_secs.max(1));
        let result = match tokio::time::timeout(limit, delegate.generate_quiet(&prompt)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(CommentaryError::host(e)),
            Err(_) => Err(CommentaryError::Timeout(limit)),
        };

        match restore {
            HostRestore::Nothing => {}
            HostRestore::Api(api, previous) => restore_api(api, &previous).await,
            HostRestore::Profile(profiles, previous) => restore_profile(profiles, &previous).await,
        }
        result
    }

    /// Point the host at the quick API override, or else at the configured
    /// connection profile. Failures here never stop the episode; generation
    /// then runs on whatever the host has active.
    async fn prepare_host(&self, settings: &KibitzerSettings) -> HostRestore<'_> {
        if let Some(target) = settings.quick_api() {
            match self.api.as_deref() {
                Some(api) => return self.apply_quick_api(api, target).await,
                None => warn!("host cannot switch APIs, ignoring the quick API override"),
            }
        }

        match (settings.connection_profile(), self.profiles.as_deref()) {
            (Some(target), Some(profiles)) => self.switch_profile(profiles, target).await,
            (Some(target), None) => {
                warn!(profile = target, "host has no connection profiles, keeping current");
                HostRestore::Nothing
            }
            (None, _) => HostRestore::Nothing,
        }
    }

    async fn apply_quick_api<'a>(
        &self,
        api: &'a dyn ApiControl,
        target: ApiSelection,
    ) -> HostRestore<'a> {
        let previous = match api.current_api().await {
            Ok(previous) => previous,
            Err(e) => {
                warn!("could not read the host API, keeping it: {:#}", e);
                return HostRestore::Nothing;
            }
        };
        if previous == target {
            return HostRestore::Nothing;
        }

        debug!(backend = %target.backend, model = %target.model, "applying quick API override");
        self.emit(CommentaryEvent::status(format!("Switching to {}...", target.backend)));
        if let Err(e) = api.apply_api(&target).await {
            warn!(backend = %target.backend, "failed to apply quick API override: {:#}", e);
        }
        // Restored even after a failed apply, which may have half-switched the host.
        HostRestore::Api(api, previous)
    }

    /// Switch to `target` unless it is already active.
    async fn switch_profile<'a>(
        &self,
        profiles: &'a dyn ConnectionProfiles,
        target: &str,
    ) -> HostRestore<'a> {
        let previous = match profiles.current().await {
            Ok(previous) => previous,
            Err(e) => {
                warn!("could not read the active connection profile: {:#}", e);
                String::new()
            }
        };
        if previous == target {
            return HostRestore::Nothing;
        }

        debug!(from = %previous, to = target, "switching connection profile");
        self.emit(CommentaryEvent::status(format!("Switching to {}...", target)));
        match profiles.switch(target).await {
            Ok(true) => HostRestore::Profile(profiles, previous),
            Ok(false) => {
                warn!(profile = target, "host refused the switch, generating on the current profile");
                HostRestore::Nothing
            }
            Err(e) => {
                warn!(profile = target, "profile switch failed, generating anyway: {:#}", e);
                HostRestore::Profile(profiles, previous)
            }
        }
    }

    /// Apply the quick API override and put the host straight back, without
    /// generating. Confirms the host accepts the configured API and model.
    pub async fn connect_quick_api(&self) -> Result<ApiSelection, CommentaryError> {
        let target = checked_quick_api(&self.settings())?;
        let api = self.api.as_deref().ok_or_else(|| {
            CommentaryError::Configuration("host cannot switch APIs".into())
        })?;
        let Some(_guard) = GeneratingGuard::acquire(&self.generating) else {
            return Err(CommentaryError::Busy);
        };

        let previous = api.current_api().await.map_err(CommentaryError::host)?;
        let applied = api.apply_api(&target).await;
        restore_api(api, &previous).await;
        applied.map_err(CommentaryError::host)?;

        info!(backend = %target.backend, model = %target.model, "quick API connected");
        Ok(target)
    }

    fn persona_text(&self, settings: &KibitzerSettings) -> String {
        let card = settings
            .character_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .and_then(|id| self.chat.persona(id))
            .map(|p| p.text())
            .filter(|t| !t.is_empty());
        card.unwrap_or_else(|| settings.character_personality.trim().to_string())
    }

    fn persist(&self, settings: &KibitzerSettings) {
        if let Err(e) = self.store.save(settings) {
            warn!("failed to save kibitzer settings: {:#}", e);
        }
    }

    fn emit(&self, event: CommentaryEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

fn interpret(raw: &str, transcript: &Transcript) -> Result<Commentary, CommentaryError> {
    if raw.trim().is_empty() {
        return Ok(Commentary::NoResponse);
    }
    match clean_response(raw, &transcript.speakers, transcript.last_message.as_deref()) {
        CleanOutcome::Text(text) => Ok(Commentary::Spoken(text)),
        CleanOutcome::Empty => Ok(Commentary::Silent),
        CleanOutcome::Echo => Err(CommentaryError::EchoRejected),
    }
}

/// The quick API override, or the first thing missing from it.
fn checked_quick_api(settings: &KibitzerSettings) -> Result<ApiSelection, CommentaryError> {
    let missing = CommentaryError::Configuration;
    if !settings.quick_api_enabled {
        return Err(missing("quick API is disabled".into()));
    }
    let Some(backend) = settings.quick_api_backend else {
        return Err(missing("no quick API backend selected".into()));
    };
    if settings.quick_api_model.trim().is_empty() {
        return Err(missing("no quick API model set".into()));
    }
    if backend.default_base_url().is_none() && settings.quick_api_url.trim().is_empty() {
        return Err(missing(format!("no quick API URL set for {}", backend)));
    }
    settings
        .quick_api()
        .ok_or_else(|| missing("quick API is incomplete".into()))
}

async fn restore_api(api: &dyn ApiControl, previous: &ApiSelection) {
    match api.apply_api(previous).await {
        Ok(()) => debug!(backend = %previous.backend, "restored host API"),
        Err(e) => warn!(backend = %previous.backend, "failed to restore host API: {:#}", e),
    }
}

async fn restore_profile(profiles: &dyn ConnectionProfiles, previous: &str) {
    if previous.is_empty() {
        warn!("no previous connection profile to restore");
        return;
    }
    match profiles.switch(previous).await {
        Ok(true) => debug!(profile = previous, "restored connection profile"),
        Ok(false) => warn!(profile = previous, "host refused to restore connection profile"),
        Err(e) => warn!(profile = previous, "failed to restore connection profile: {:#}", e),
    }
}
