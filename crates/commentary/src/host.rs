//! Capabilities the embedding host provides.
//!
//! The kibitzer never owns the conversation, the connection profiles or the
//! settings file; it reaches them through these traits.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::chat::{ConversationTurn, Persona};
use shared::settings::{ApiSelection, KibitzerSettings};

/// Read access to the active conversation.
pub trait ChatHost: Send + Sync {
    /// All turns of the active chat, oldest first.
    fn transcript(&self) -> Vec<ConversationTurn>;

    /// Character card for `character_id`, if the host knows it.
    fn persona(&self, character_id: &str) -> Option<Persona>;
}

/// The host's own quiet (non-streaming, not shown in chat) generation entry point.
#[async_trait]
pub trait GenerationDelegate: Send + Sync {
    async fn generate_quiet(&self, prompt: &str) -> Result<String>;
}

/// Named connection profiles of the host.
#[async_trait]
pub trait ConnectionProfiles: Send + Sync {
    async fn list(&self) -> Result<Vec<String>>;

    /// Name of the active profile; empty when none is active.
    async fn current(&self) -> Result<String>;

    /// Activate `name`. `Ok(false)` means the host refused.
    async fn switch(&self, name: &str) -> Result<bool>;
}

/// The host's active API and model, switched by the quick API override.
#[async_trait]
pub trait ApiControl: Send + Sync {
    async fn current_api(&self) -> Result<ApiSelection>;

    /// Point quiet generation at `selection`.
    async fn apply_api(&self, selection: &ApiSelection) -> Result<()>;
}

/// Flat settings persistence. Last write wins.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<KibitzerSettings>;
    fn save(&self, settings: &KibitzerSettings) -> Result<()>;
}

/// Settings kept in memory only.
#[derive(Default)]
pub struct MemorySettingsStore {
    settings: Mutex<KibitzerSettings>,
    saves: Mutex<usize>,
}

impl MemorySettingsStore {
    pub fn new(settings: KibitzerSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            saves: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> KibitzerSettings {
        self.settings.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<KibitzerSettings> {
        Ok(self.settings.lock().clone())
    }

    fn save(&self, settings: &KibitzerSettings) -> Result<()> {
        *self.settings.lock() = settings.clone();
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySettingsStore::default();
        let mut s = store.load().unwrap();
        s.frequency = 7;
        store.save(&s).unwrap();
        assert_eq!(store.snapshot().frequency, 7);
        assert_eq!(store.save_count(), 1);
    }
}
