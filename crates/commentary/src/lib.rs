//! Kibitzer commentary engine.
//!
//! [`CommentaryPipeline`] watches a host conversation and, every Nth message or
//! on demand, produces a short in-character reaction. Prompt text comes from
//! [`prompts`], optional host presets from [`presets`], and the response is
//! tidied by [`cleaner`] before it reaches the presentation layer.

pub mod cleaner;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod presets;
pub mod prompts;

pub use error::CommentaryError;
pub use host::{
    ApiControl, ChatHost, ConnectionProfiles, GenerationDelegate, MemorySettingsStore, SettingsStore,
};
pub use pipeline::{Commentary, CommentaryPipeline, TriggerOutcome};
pub use presets::{
    extract_system_prompt, DirectoryPresetSource, HttpPresetSource, InMemoryPresets, PresetResolver,
    PresetSource, StaticPresetList,
};
