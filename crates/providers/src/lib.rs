//! Backend adapters for commentary generation.
//!
//! Each backend family knows how to build its HTTP request and where the text
//! lives in its response; [`router::BackendRouter`] does the sending.

pub mod adapter;
pub mod anthropic;
pub mod config;
pub mod error;
pub mod kobold;
pub mod models;
pub mod openai;
pub mod router;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use adapter::{join_endpoint, BackendAdapter, GenerationRequest, HttpRequest};
pub use config::BackendConfig;
pub use error::ProviderError;
pub use models::{ModelCache, ModelCatalog, OpenRouterModel};
pub use router::{adapter_for, shared_client, BackendRouter};
