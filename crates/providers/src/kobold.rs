use crate::adapter::{decode, join_endpoint, BackendAdapter, GenerationRequest, HttpRequest};
use crate::config::BackendConfig;
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use shared::settings::Backend;

const GENERATE: &str = "/v1/generate";

#[derive(Debug, Serialize, Deserialize)]
struct KoboldRequest {
    prompt: String,
    max_length: u32,
}

#[derive(Debug, Deserialize)]
struct KoboldResponse {
    #[serde(default)]
    results: Vec<KoboldResult>,
}

#[derive(Debug, Deserialize)]
struct KoboldResult {
    #[serde(default)]
    text: String,
}

/// Raw-completion adapter for KoboldAI-style servers. No chat roles, so the
/// system text is prepended to the prompt.
pub struct KoboldAdapter {
    config: BackendConfig,
}

impl KoboldAdapter {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

impl BackendAdapter for KoboldAdapter {
    fn backend(&self) -> Backend {
        self.config.backend
    }

    fn build_request(&self, request: &GenerationRequest) -> Result<HttpRequest, ProviderError> {
        self.config.validate()?;
        let url = join_endpoint(&self.config.base_url()?, GENERATE);
        let prompt = match request.system() {
            Some(system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };
        HttpRequest::post_json(
            url,
            &KoboldRequest {
                prompt,
                max_length: self.config.max_tokens,
            },
        )
    }

    fn extract_text(&self, body: &str) -> Result<String, ProviderError> {
        let resp: KoboldResponse = decode(self.config.backend, body)?;
        Ok(resp
            .results
            .into_iter()
            .next()
            .map(|r| r.text)
            .unwrap_or_default())
    }
}
