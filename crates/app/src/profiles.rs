//! Named connection profiles, each pointing at a backend.
//!
//! Stands in for the host's own connection manager: the pipeline can switch the
//! active profile or lay an API override over it, and quiet generation goes to
//! whichever of the two is in effect.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use commentary::{ApiControl, ConnectionProfiles, GenerationDelegate};
use parking_lot::Mutex;
use providers::{BackendConfig, BackendRouter, GenerationRequest};
use serde::{Deserialize, Serialize};
use shared::settings::{ApiSelection, Backend};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub backend: Backend,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    active: String,
    #[serde(default)]
    profiles: BTreeMap<String, ProfileEntry>,
}

pub struct ProfileBook {
    profiles: BTreeMap<String, ProfileEntry>,
    active: Mutex<String>,
    /// API and model laid over the active profile
    api_override: Mutex<Option<ApiSelection>>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl ProfileBook {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading profiles {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing profiles {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ProfileFile = serde_json::from_str(raw)?;
        Ok(Self {
            profiles: file.profiles,
            active: Mutex::new(file.active),
            api_override: Mutex::new(None),
            max_tokens: 150,
            temperature: 0.8,
            timeout: Duration::from_secs(60),
        })
    }

    /// Sampling limits applied to every profile.
    pub fn with_limits(mut self, max_tokens: u32, temperature: f32, timeout: Duration) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self.timeout = timeout;
        self
    }

    pub fn active(&self) -> String {
        self.active.lock().clone()
    }

    fn active_entry(&self) -> Result<ProfileEntry> {
        let name = self.active();
        match self.profiles.get(&name) {
            Some(entry) => Ok(entry.clone()),
            None => bail!("no active connection profile"),
        }
    }

    fn selection_of(entry: &ProfileEntry) -> ApiSelection {
        let url = entry.api_url.trim();
        ApiSelection {
            backend: entry.backend,
            model: entry.model.clone(),
            api_url: (!url.is_empty()).then(|| url.to_string()),
        }
    }

    /// Key for `backend`: the active profile's when it matches, else the first
    /// profile on the same backend that has one.
    fn key_for(&self, backend: Backend, active: &ProfileEntry) -> Option<String> {
        if active.backend == backend && active.api_key.is_some() {
            return active.api_key.clone();
        }
        self.profiles
            .values()
            .filter(|entry| entry.backend == backend)
            .find_map(|entry| entry.api_key.clone())
    }

    fn active_config(&self) -> Result<BackendConfig> {
        let entry = self.active_entry()?;
        let selection = self
            .api_override
            .lock()
            .clone()
            .unwrap_or_else(|| Self::selection_of(&entry));

        let mut config = BackendConfig::new(selection.backend)
            .with_url(selection.api_url.clone().unwrap_or_default())
            .with_model(selection.model.clone())
            .with_timeout(self.timeout);
        config.api_key = self.key_for(selection.backend, &entry);
        config.max_tokens = self.max_tokens;
        config.temperature = self.temperature;
        Ok(config)
    }
}

#[async_trait]
impl ConnectionProfiles for ProfileBook {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.profiles.keys().cloned().collect())
    }

    async fn current(&self) -> Result<String> {
        Ok(self.active())
    }

    async fn switch(&self, name: &str) -> Result<bool> {
        if !self.profiles.contains_key(name) {
            return Ok(false);
        }
        debug!(profile = name, "activating connection profile");
        *self.active.lock() = name.to_string();
        Ok(true)
    }
}

#[async_trait]
impl ApiControl for ProfileBook {
    async fn current_api(&self) -> Result<ApiSelection> {
        if let Some(selection) = self.api_override.lock().clone() {
            return Ok(selection);
        }
        Ok(Self::selection_of(&self.active_entry()?))
    }

    /// Selecting the active profile's own API drops the override.
    async fn apply_api(&self, selection: &ApiSelection) -> Result<()> {
        let own = self.active_entry().ok().map(|entry| Self::selection_of(&entry));
        let mut api_override = self.api_override.lock();
        if own.as_ref() == Some(selection) {
            debug!("clearing API override");
            *api_override = None;
        } else {
            debug!(backend = %selection.backend, model = %selection.model, "overriding API");
            *api_override = Some(selection.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationDelegate for ProfileBook {
    async fn generate_quiet(&self, prompt: &str) -> Result<String> {
        let router = BackendRouter::new(self.active_config()?);
        Ok(router.generate(&GenerationRequest::new(prompt)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::testing::MockServer;

    fn book(url: &str) -> ProfileBook {
        ProfileBook::from_json(&format!(
            r#"{{
                "active": "main",
                "profiles": {{
                    "main": {{"backend": "openai", "api_url": "{url}/v1", "api_key": "sk-main", "model": "gpt-4o"}},
                    "local": {{"backend": "kobold", "api_url": "{url}"}}
                }}
            }}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_switch_known_and_unknown() {
        let book = book("http://127.0.0.1:1");
        assert_eq!(book.list().await.unwrap(), vec!["local".to_string(), "main".to_string()]);
        assert!(book.switch("local").await.unwrap());
        assert_eq!(book.current().await.unwrap(), "local");
        assert!(!book.switch("missing").await.unwrap());
        assert_eq!(book.current().await.unwrap(), "local");
    }

    #[tokio::test]
    async fn test_generation_follows_active_profile() {
        let server = MockServer::start(200, r#"{"results": [{"text": "Heh."}]}"#).await;
        let book = book(&server.url).with_limits(80, 0.5, Duration::from_secs(5));
        book.switch("local").await.unwrap();

        assert_eq!(book.generate_quiet("prompt").await.unwrap(), "Heh.");
        let reqs = server.requests();
        assert_eq!(reqs[0].path, "/v1/generate");
        assert_eq!(reqs[0].json()["max_length"], 80);
    }

    #[tokio::test]
    async fn test_api_override_borrows_key_and_clears_on_restore() {
        let server = MockServer::start(200, r#"{"choices": [{"message": {"content": "Ha."}}]}"#).await;
        let book = book(&server.url);
        book.switch("local").await.unwrap();
        let own = book.current_api().await.unwrap();
        assert_eq!(own.backend, Backend::Kobold);

        let target = ApiSelection {
            backend: Backend::OpenAi,
            model: "gpt-4o-mini".into(),
            api_url: Some(format!("{}/v1", server.url)),
        };
        book.apply_api(&target).await.unwrap();
        assert_eq!(book.current_api().await.unwrap(), target);
        assert_eq!(book.generate_quiet("prompt").await.unwrap(), "Ha.");

        let req = &server.requests()[0];
        assert_eq!(req.path, "/v1/chat/completions");
        assert_eq!(req.header("authorization"), Some("Bearer sk-main"));
        assert_eq!(req.json()["model"], "gpt-4o-mini");

        book.apply_api(&own).await.unwrap();
        assert!(book.api_override.lock().is_none());
        assert_eq!(book.current_api().await.unwrap(), own);
    }

    #[tokio::test]
    async fn test_no_active_profile_fails() {
        let book = ProfileBook::from_json(r#"{"profiles": {}}"#).unwrap();
        assert!(book.generate_quiet("prompt").await.is_err());
    }
}
