//! Preset lookup across the places a host may keep them.
//!
//! Hosts expose presets differently depending on version and configuration, so
//! lookups walk an ordered chain of [`PresetSource`]s and a failing source only
//! costs a log line.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use providers::shared_client;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use shared::preset::{Preset, PresetSummary, PromptRole};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fragments that lead the system prompt, in this order.
const PRIORITY_FRAGMENTS: [&str; 4] = ["main", "nsfw", "jailbreak", "enhanceDefinitions"];

/// Single-string prompt fields of older preset formats.
const LEGACY_FIELDS: [&str; 4] = ["system_prompt", "main_prompt", "jailbreak_prompt", "nsfw_prompt"];

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait PresetSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn list(&self) -> Result<Vec<PresetSummary>>;

    /// `Ok(None)` when this source does not know `id`.
    async fn load(&self, id: &str) -> Result<Option<Preset>>;
}

/// Ordered chain of preset sources.
#[derive(Default, Clone)]
pub struct PresetResolver {
    sources: Vec<Arc<dyn PresetSource>>,
}

impl PresetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl PresetSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// First non-empty listing, sorted case-insensitively by display name.
    pub async fn list_presets(&self) -> Vec<PresetSummary> {
        for source in &self.sources {
            match source.list().await {
                Ok(mut presets) if !presets.is_empty() => {
                    presets.sort_by_key(|p| p.display_name.to_lowercase());
                    debug!(source = source.name(), count = presets.len(), "listed presets");
                    return presets;
                }
                Ok(_) => debug!(source = source.name(), "no presets from source"),
                Err(e) => warn!(source = source.name(), "preset listing failed: {:#}", e),
            }
        }
        Vec::new()
    }

    /// First source that has `id`. A miss everywhere is not an error.
    pub async fn load_preset(&self, id: &str) -> Option<Preset> {
        for source in &self.sources {
            match source.load(id).await {
                Ok(Some(preset)) => {
                    debug!(source = source.name(), preset = id, "loaded preset");
                    return Some(preset);
                }
                Ok(None) => {}
                Err(e) => warn!(source = source.name(), preset = id, "preset load failed: {:#}", e),
            }
        }
        None
    }
}

/// System prompt text of a preset; empty when it has none.
pub fn extract_system_prompt(preset: &Preset) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut used: Vec<&str> = Vec::new();

    for id in PRIORITY_FRAGMENTS {
        if let Some(fragment) = preset.fragment(id).filter(|f| f.is_usable()) {
            parts.push(fragment.content.trim());
            used.push(id);
        }
    }
    for fragment in &preset.prompts {
        if fragment.role == PromptRole::System
            && fragment.is_usable()
            && !used.contains(&fragment.identifier.as_str())
        {
            parts.push(fragment.content.trim());
        }
    }
    if !parts.is_empty() {
        return parts.join("\n\n");
    }

    if let Some(text) = LEGACY_FIELDS.iter().find_map(|key| preset.text_field(key)) {
        return text.trim().to_string();
    }

    preset
        .declared_order()
        .into_iter()
        .filter(|item| item.enabled)
        .filter_map(|item| preset.fragment(&item.identifier))
        .filter(|f| f.is_usable())
        .map(|f| f.content.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Presets registered directly by the host.
#[derive(Default)]
pub struct InMemoryPresets {
    presets: RwLock<HashMap<String, Preset>>,
}

impl InMemoryPresets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, preset: Preset) {
        self.presets.write().insert(id.into(), preset);
    }
}

#[async_trait]
impl PresetSource for InMemoryPresets {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<PresetSummary>> {
        Ok(self
            .presets
            .read()
            .iter()
            .map(|(id, p)| {
                let display = if p.name.trim().is_empty() { id.as_str() } else { p.name.as_str() };
                PresetSummary::new(id.clone(), display)
            })
            .collect())
    }

    async fn load(&self, id: &str) -> Result<Option<Preset>> {
        Ok(self.presets.read().get(id).cloned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchStyle {
    /// `POST {base}/presets/get` with `{"name": id}`
    Post,
    /// `GET {base}/presets?name=id`
    Get,
}

/// Presets served by the host's HTTP API.
pub struct HttpPresetSource {
    http: Client,
    base: String,
    style: FetchStyle,
}

impl HttpPresetSource {
    pub fn post(base: impl Into<String>) -> Self {
        Self::build(base.into(), FetchStyle::Post)
    }

    pub fn get(base: impl Into<String>) -> Self {
        Self::build(base.into(), FetchStyle::Get)
    }

    fn build(base: String, style: FetchStyle) -> Self {
        Self {
            http: shared_client(),
            base: base.trim_end_matches('/').to_string(),
            style,
        }
    }
}

fn summary_from(value: &Value) -> Option<PresetSummary> {
    match value {
        Value::String(name) if !name.trim().is_empty() => Some(PresetSummary::new(name, name)),
        Value::Object(map) => {
            let name = map.get("name").and_then(Value::as_str)?;
            let id = map.get("id").and_then(Value::as_str).unwrap_or(name);
            Some(PresetSummary::new(id, name))
        }
        _ => None,
    }
}

#[async_trait]
impl PresetSource for HttpPresetSource {
    fn name(&self) -> &str {
        match self.style {
            FetchStyle::Post => "http-post",
            FetchStyle::Get => "http-get",
        }
    }

    async fn list(&self) -> Result<Vec<PresetSummary>> {
        let url = format!("{}/presets", self.base);
        let items: Vec<Value> = self
            .http
            .get(&url)
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()?
            .json()
            .await
            .context("preset listing was not a JSON array")?;
        Ok(items.iter().filter_map(summary_from).collect())
    }

    async fn load(&self, id: &str) -> Result<Option<Preset>> {
        let request = match self.style {
            FetchStyle::Post => self
                .http
                .post(format!("{}/presets/get", self.base))
                .json(&serde_json::json!({ "name": id })),
            FetchStyle::Get => self
                .http
                .get(format!("{}/presets", self.base))
                .query(&[("name", id)]),
        };

        let response = request
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("fetching preset {}", id))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let preset = response
            .error_for_status()?
            .json::<Preset>()
            .await
            .with_context(|| format!("preset {} is not valid JSON", id))?;
        Ok(Some(preset))
    }
}

/// Local cache of presets stored as `<id>.json`.
pub struct DirectoryPresetSource {
    dir: PathBuf,
}

impl DirectoryPresetSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PresetSource for DirectoryPresetSource {
    fn name(&self) -> &str {
        "directory"
    }

    async fn list(&self) -> Result<Vec<PresetSummary>> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.dir.display())),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                out.push(PresetSummary::new(id, id));
            }
        }
        Ok(out)
    }

    async fn load(&self, id: &str) -> Result<Option<Preset>> {
        if id.contains(['/', '\\']) || id.starts_with('.') {
            return Ok(None);
        }
        let path = self.dir.join(format!("{}.json", id));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let preset = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(preset))
    }
}

/// Names scraped from the host UI. Can list but never load.
pub struct StaticPresetList {
    names: Vec<String>,
}

impl StaticPresetList {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PresetSource for StaticPresetList {
    fn name(&self) -> &str {
        "static"
    }

    async fn list(&self) -> Result<Vec<PresetSummary>> {
        Ok(self
            .names
            .iter()
            .filter(|n| !n.trim().is_empty())
            .map(|n| PresetSummary::new(n.as_str(), n.as_str()))
            .collect())
    }

    async fn load(&self, _id: &str) -> Result<Option<Preset>> {
        Ok(None)
    }
}
