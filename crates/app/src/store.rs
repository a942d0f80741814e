//! Settings file in the platform config directory.

use anyhow::{Context, Result};
use commentary::SettingsStore;
use parking_lot::Mutex;
use shared::settings::KibitzerSettings;
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_ENV: &str = "KIBITZER_API_KEY";

pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com.local", "Kibitzer", "Kibitzer")
}

pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|proj| proj.config_dir().join("settings.json"))
}

/// JSON settings on disk. An API key from the environment overrides the file
/// but is never written back.
pub struct FileSettingsStore {
    path: PathBuf,
    key_override: Option<String>,
    file_key: Mutex<Option<String>>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key_override: None,
            file_key: Mutex::new(None),
        }
    }

    pub fn with_key_override(mut self, key: Option<String>) -> Self {
        self.key_override = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<KibitzerSettings> {
        let mut settings = match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str::<KibitzerSettings>(&contents)
                .with_context(|| format!("parsing {}", self.path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KibitzerSettings::default(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        *self.file_key.lock() = settings.api_key.clone();
        if let Some(key) = &self.key_override {
            settings.api_key = Some(key.clone());
        }
        Ok(settings)
    }

    fn save(&self, settings: &KibitzerSettings) -> Result<()> {
        let mut on_disk = settings.clone();
        if self.key_override.is_some() && on_disk.api_key == self.key_override {
            on_disk.api_key = self.file_key.lock().clone();
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&on_disk)?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))
    }
}
