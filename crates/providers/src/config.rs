use crate::error::ProviderError;
use shared::settings::{Backend, KibitzerSettings};
use std::time::Duration;

/// Everything an adapter needs to talk to one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub backend: Backend,
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl BackendConfig {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            api_url: String::new(),
            api_key: None,
            model: String::new(),
            max_tokens: 150,
            temperature: 0.8,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_settings(settings: &KibitzerSettings) -> Self {
        Self {
            backend: settings.backend,
            api_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.request_timeout_secs.max(1)),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn model(&self) -> &str {
        self.model.trim()
    }

    /// Configured URL, or the backend's public endpoint when none is set.
    pub fn base_url(&self) -> Result<String, ProviderError> {
        let configured = self.api_url.trim();
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }
        self.backend
            .default_base_url()
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::config(format!("no API URL configured for {}", self.backend))
            })
    }

    /// Checks URL, model and key before anything touches the network.
    pub fn validate(&self) -> Result<(), ProviderError> {
        self.base_url()?;
        if self.backend.requires_model() && self.model().is_empty() {
            return Err(ProviderError::config(format!(
                "no model configured for {}",
                self.backend
            )));
        }
        if self.backend.requires_api_key() && self.api_key().is_none() {
            return Err(ProviderError::config(format!(
                "no API key configured for {}",
                self.backend
            )));
        }
        Ok(())
    }
}
