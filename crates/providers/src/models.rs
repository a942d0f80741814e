//! OpenRouter model catalogue.
//!
//! The list is public (no key needed) and large, so it is cached for an hour
//! and the stale copy is served when a refresh fails.

use crate::error::{truncate_body, ProviderError};
use crate::router::shared_client;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::settings::Backend;
use std::time::Duration;
use tracing::{debug, warn};

pub const OPENROUTER_MODELS_URL: &str = "https://openrouter.ai/api/v1/models";
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per prompt token, as a decimal string
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRouterModel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub pricing: Option<ModelPricing>,
}

impl OpenRouterModel {
    /// Prompt price per million tokens, when the catalogue lists one.
    pub fn prompt_price_per_million(&self) -> Option<f64> {
        self.pricing
            .as_ref()
            .and_then(|p| p.prompt.trim().parse::<f64>().ok())
            .map(|per_token| per_token * 1_000_000.0)
    }

    /// `id ($x.xx/M)` label for pickers.
    pub fn label(&self) -> String {
        match self.prompt_price_per_million() {
            Some(price) => format!("{} (${:.2}/M)", self.id, price),
            None => self.id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    #[serde(default)]
    data: Vec<OpenRouterModel>,
}

/// Snapshot that callers may persist between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCache {
    pub fetched_at: DateTime<Utc>,
    pub models: Vec<OpenRouterModel>,
}

impl ModelCache {
    fn is_fresh(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.fetched_at);
        age.to_std().map(|age| age < ttl).unwrap_or(true)
    }
}

pub struct ModelCatalog {
    http: Client,
    url: String,
    ttl: Duration,
    cache: Mutex<Option<ModelCache>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::with_url(OPENROUTER_MODELS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            http: shared_client(),
            url: url.into(),
            ttl: CACHE_TTL,
            cache: Mutex::new(None),
        }
    }

    /// Seed from a previously persisted snapshot.
    pub fn with_cache(self, cache: Option<ModelCache>) -> Self {
        *self.cache.lock() = cache;
        self
    }

    pub fn snapshot(&self) -> Option<ModelCache> {
        self.cache.lock().clone()
    }

    /// Models sorted by id; cached copy when fresh, stale copy when a refresh fails.
    pub async fn models(&self) -> Result<Vec<OpenRouterModel>, ProviderError> {
        if let Some(cache) = self.cache.lock().as_ref() {
            if cache.is_fresh(self.ttl) && !cache.models.is_empty() {
                debug!(count = cache.models.len(), "using cached OpenRouter models");
                return Ok(cache.models.clone());
            }
        }

        match self.fetch().await {
            Ok(models) => {
                *self.cache.lock() = Some(ModelCache {
                    fetched_at: Utc::now(),
                    models: models.clone(),
                });
                Ok(models)
            }
            Err(e) => {
                let stale = self
                    .cache
                    .lock()
                    .as_ref()
                    .map(|c| c.models.clone())
                    .filter(|m| !m.is_empty());
                match stale {
                    Some(models) => {
                        warn!(error = %e, "model refresh failed, serving stale cache");
                        Ok(models)
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<OpenRouterModel>, ProviderError> {
        let resp = self
            .http
            .get(&self.url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, FETCH_TIMEOUT))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, FETCH_TIMEOUT))?;
        if !status.is_success() {
            return Err(ProviderError::Backend {
                backend: Backend::OpenRouter,
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        let list: ModelListResponse = crate::adapter::decode(Backend::OpenRouter, &body)?;
        let mut models = list.data;
        models.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(count = models.len(), "fetched OpenRouter models");
        Ok(models)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}
