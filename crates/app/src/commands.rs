use crate::cli::{Cli, Command, ConfigCommand};
use crate::profiles::ProfileBook;
use crate::store::{config_path, project_dirs, FileSettingsStore, API_KEY_ENV};
use crate::transcript::{parse_line, JsonTranscriptHost};
use anyhow::{bail, Context, Result};
use commentary::{
    CommentaryPipeline, ConnectionProfiles, DirectoryPresetSource, HttpPresetSource, PresetResolver,
    SettingsStore, TriggerOutcome,
};
use providers::{ModelCache, ModelCatalog};
use serde_json::Value;
use shared::events::CommentaryEvent;
use shared::settings::KibitzerSettings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Paths and URLs shared by every subcommand.
struct Sources {
    transcript: Option<PathBuf>,
    profiles: Option<PathBuf>,
    host_url: Option<String>,
    preset_dir: Option<PathBuf>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let Cli {
        command,
        settings,
        transcript,
        profiles,
        host_url,
        preset_dir,
    } = cli;

    let path = match settings.or_else(config_path) {
        Some(path) => path,
        None => bail!("no config directory available; pass --settings"),
    };
    let store = Arc::new(FileSettingsStore::new(path).with_key_override(std::env::var(API_KEY_ENV).ok()));
    let sources = Sources {
        transcript,
        profiles,
        host_url,
        preset_dir,
    };

    match command {
        Command::Config { action } => config(store.as_ref(), action),
        Command::Models { refresh } => models(refresh).await,
        Command::Profiles => {
            let Some(book) = load_profiles(&sources, &store.load()?)? else {
                bail!("no profiles file; pass --profiles");
            };
            let active = book.current().await?;
            for name in book.list().await? {
                let marker = if name == active { "*" } else { " " };
                println!("{} {}", marker, name);
            }
            Ok(())
        }
        Command::Presets => {
            let presets = preset_chain(&sources).list_presets().await;
            if presets.is_empty() {
                println!("No presets found.");
            }
            for preset in presets {
                println!("{}\t{}", preset.id, preset.display_name);
            }
            Ok(())
        }
        Command::Trigger => {
            let session = Session::open(store, &sources)?;
            report(&session.pipeline.on_trigger(false).await);
            session.finish().await
        }
        Command::Force => {
            let session = Session::open(store, &sources)?;
            report(&session.pipeline.on_trigger(true).await);
            session.finish().await
        }
        Command::Connect => {
            let session = Session::open(store, &sources)?;
            let target = session.pipeline.connect_quick_api().await?;
            println!("Ready: {} -> {}", target.backend, target.model);
            session.finish().await
        }
        Command::Watch { user } => {
            let session = Session::open(store, &sources)?;
            session.watch(&user).await?;
            session.finish().await
        }
    }
}

/// A pipeline wired to the CLI's hosts plus the task printing its events.
struct Session {
    pipeline: CommentaryPipeline,
    chat: Arc<JsonTranscriptHost>,
    printer: JoinHandle<()>,
}

impl Session {
    fn open(store: Arc<FileSettingsStore>, sources: &Sources) -> Result<Self> {
        let settings = store.load()?;
        let chat = Arc::new(match &sources.transcript {
            Some(path) => JsonTranscriptHost::load(path)?,
            None => JsonTranscriptHost::default(),
        });

        let (tx, rx) = unbounded_channel();
        let mut pipeline = CommentaryPipeline::new(store, chat.clone(), tx).with_presets(preset_chain(sources));
        if let Some(book) = load_profiles(sources, &settings)? {
            let book = Arc::new(book);
            pipeline = pipeline
                .with_delegate(book.clone())
                .with_profiles(book.clone())
                .with_api_control(book);
        }

        let printer = tokio::spawn(print_events(rx, settings.display_name().to_string()));
        Ok(Self {
            pipeline,
            chat,
            printer,
        })
    }

    async fn watch(&self, user: &str) -> Result<()> {
        info!("watching stdin; /force comments now, /new starts a new chat");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match line.trim() {
                "/force" => report(&self.pipeline.on_trigger(true).await),
                "/new" => {
                    self.chat.clear();
                    self.pipeline.on_chat_changed();
                }
                _ => {
                    if let Some(turn) = parse_line(&line, user) {
                        self.chat.push(turn);
                        report(&self.pipeline.on_message_received().await);
                    }
                }
            }
        }
        Ok(())
    }

    async fn finish(self) -> Result<()> {
        drop(self.pipeline);
        self.printer.await.context("event printer stopped")?;
        Ok(())
    }
}

fn load_profiles(sources: &Sources, settings: &KibitzerSettings) -> Result<Option<ProfileBook>> {
    let Some(path) = &sources.profiles else {
        return Ok(None);
    };
    let book = ProfileBook::load(path)?.with_limits(
        settings.max_tokens,
        settings.temperature,
        Duration::from_secs(settings.request_timeout_secs.max(1)),
    );
    Ok(Some(book))
}

fn preset_chain(sources: &Sources) -> PresetResolver {
    let mut resolver = PresetResolver::new();
    if let Some(url) = &sources.host_url {
        resolver = resolver
            .with_source(HttpPresetSource::post(url.clone()))
            .with_source(HttpPresetSource::get(url.clone()));
    }
    let dir = sources
        .preset_dir
        .clone()
        .or_else(|| project_dirs().map(|p| p.config_dir().join("presets")));
    if let Some(dir) = dir {
        resolver = resolver.with_source(DirectoryPresetSource::new(dir));
    }
    resolver
}

async fn print_events(mut rx: UnboundedReceiver<CommentaryEvent>, name: String) {
    while let Some(event) = rx.recv().await {
        match event {
            CommentaryEvent::Status(status) => info!("{}", status),
            CommentaryEvent::Commentary(text) => println!("{}: {}", name, text),
            CommentaryEvent::Failed { display, .. } => println!("{}: {}", name, display),
            CommentaryEvent::TypingStarted => debug!("{} is typing", name),
            CommentaryEvent::TypingStopped => debug!("{} stopped typing", name),
        }
    }
}

fn report(outcome: &TriggerOutcome) {
    match outcome {
        TriggerOutcome::Disabled => println!("Kibitzer is disabled."),
        TriggerOutcome::Busy => debug!("already generating"),
        TriggerOutcome::Debounced => debug!("debounced"),
        TriggerOutcome::Loading => debug!("chat still loading"),
        TriggerOutcome::WaitingForChat => debug!("no messages yet"),
        TriggerOutcome::Counted { count, frequency } => {
            info!("message {}/{} until next comment", count, frequency)
        }
        TriggerOutcome::Generated(commentary) => debug!(?commentary, "generation finished"),
    }
}

fn config(store: &dyn SettingsStore, action: ConfigCommand) -> Result<()> {
    match action {
        ConfigCommand::Show => {
            let mut settings = store.load()?;
            if settings.api_key.is_some() {
                settings.api_key = Some("********".into());
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ConfigCommand::Set { key, value } => {
            let updated = apply_setting(&store.load()?, &key, &value)?;
            store.save(&updated)?;
            println!("{} updated", key);
        }
    }
    Ok(())
}

/// Set one top-level settings field from command-line text.
fn apply_setting(settings: &KibitzerSettings, key: &str, raw: &str) -> Result<KibitzerSettings> {
    let mut value = serde_json::to_value(settings)?;
    let fields = value.as_object_mut().context("settings are not a JSON object")?;
    if !fields.contains_key(key) {
        bail!("unknown setting: {}", key);
    }

    let parsed = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let candidates = if parsed.is_string() {
        vec![parsed]
    } else {
        vec![parsed, Value::String(raw.to_string())]
    };

    for candidate in candidates {
        fields.insert(key.to_string(), candidate);
        if let Ok(updated) = serde_json::from_value::<KibitzerSettings>(Value::Object(fields.clone())) {
            return Ok(updated.normalized());
        }
    }
    bail!("invalid value for {}: {}", key, raw)
}

fn models_cache_path() -> Option<PathBuf> {
    project_dirs().map(|p| p.cache_dir().join("openrouter_models.json"))
}

fn read_model_cache(path: &Path) -> Option<ModelCache> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("ignoring unreadable model cache {}: {}", path.display(), e);
            None
        }
    }
}

fn write_model_cache(path: &Path, cache: &ModelCache) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string(cache)?)
        .with_context(|| format!("writing {}", path.display()))
}

async fn models(refresh: bool) -> Result<()> {
    let cache_path = models_cache_path();
    let cached = match (&cache_path, refresh) {
        (Some(path), false) => read_model_cache(path),
        _ => None,
    };

    let catalog = ModelCatalog::new().with_cache(cached);
    let models = catalog.models().await?;
    if let (Some(path), Some(snapshot)) = (&cache_path, catalog.snapshot()) {
        if let Err(e) = write_model_cache(path, &snapshot) {
            warn!("could not save model cache: {:#}", e);
        }
    }

    for model in models {
        println!("{}", model.label());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use providers::OpenRouterModel;
    use shared::settings::{ApiMode, Backend};

    #[test]
    fn test_apply_setting_types() {
        let base = KibitzerSettings::default();

        let s = apply_setting(&base, "frequency", "3").unwrap();
        assert_eq!(s.frequency, 3);

        let s = apply_setting(&base, "api_mode", "custom").unwrap();
        assert_eq!(s.api_mode, ApiMode::Custom);

        let s = apply_setting(&base, "backend", "openrouter").unwrap();
        assert_eq!(s.backend, Backend::OpenRouter);

        let s = apply_setting(&base, "character_name", "1984").unwrap();
        assert_eq!(s.character_name, "1984");

        let s = apply_setting(&base, "selected_preset", "Story Mode").unwrap();
        assert_eq!(s.selected_preset.as_deref(), Some("Story Mode"));

        let s = apply_setting(&base, "frequency", "0").unwrap();
        assert_eq!(s.frequency, 1);

        let s = apply_setting(&base, "quick_api_backend", "openrouter").unwrap();
        assert_eq!(s.quick_api_backend, Some(Backend::OpenRouter));

        let s = apply_setting(&base, "startup_grace_ms", "0").unwrap();
        assert_eq!(s.startup_grace_ms, 0);
    }

    #[test]
    fn test_apply_setting_rejects_bad_input() {
        let base = KibitzerSettings::default();
        assert!(apply_setting(&base, "no_such_field", "1").is_err());
        assert!(apply_setting(&base, "frequency", "often").is_err());
    }

    #[test]
    fn test_model_cache_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache/models.json");
        assert!(read_model_cache(&path).is_none());

        let model: OpenRouterModel =
            serde_json::from_str(r#"{"id": "a/model", "pricing": {"prompt": "0.000001"}}"#).unwrap();
        let cache = ModelCache {
            fetched_at: Utc::now(),
            models: vec![model],
        };
        write_model_cache(&path, &cache).unwrap();
        let read = read_model_cache(&path).unwrap();
        assert_eq!(read.models[0].id, "a/model");

        std::fs::write(&path, "garbage").unwrap();
        assert!(read_model_cache(&path).is_none());
    }
}
