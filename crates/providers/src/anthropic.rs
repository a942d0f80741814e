use crate::adapter::{decode, join_endpoint, BackendAdapter, GenerationRequest, HttpRequest};
use crate::config::BackendConfig;
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use shared::settings::Backend;

const MESSAGES: &str = "/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type", default)]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

pub struct AnthropicAdapter {
    config: BackendConfig,
}

impl AnthropicAdapter {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

impl BackendAdapter for AnthropicAdapter {
    fn backend(&self) -> Backend {
        self.config.backend
    }

    fn build_request(&self, request: &GenerationRequest) -> Result<HttpRequest, ProviderError> {
        self.config.validate()?;
        let url = join_endpoint(&self.config.base_url()?, MESSAGES);

        let body = AnthropicRequest {
            model: self.config.model().to_string(),
            max_tokens: self.config.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".into(),
                content: request.prompt.clone(),
            }],
            system: request.system().map(str::to_string),
        };

        let mut req = HttpRequest::post_json(url, &body)?;
        if let Some(key) = self.config.api_key() {
            req = req.header("x-api-key", key);
        }
        Ok(req.header("anthropic-version", ANTHROPIC_VERSION))
    }

    fn extract_text(&self, body: &str) -> Result<String, ProviderError> {
        let resp: AnthropicResponse = decode(self.config.backend, body)?;
        Ok(resp
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> AnthropicAdapter {
        AnthropicAdapter::new(
            BackendConfig::new(Backend::Claude)
                .with_key("sk-ant")
                .with_model("claude-3-5-haiku-latest"),
        )
    }

    #[test]
    fn test_build_request_default_endpoint() {
        let req = adapter()
            .build_request(&GenerationRequest::new("watch this"))
            .unwrap();
        assert_eq!(req.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(req.header_value("x-api-key"), Some("sk-ant"));
        assert_eq!(req.header_value("anthropic-version"), Some("2023-06-01"));
        assert_eq!(req.body["messages"][0]["role"], "user");
        assert_eq!(req.body["messages"][0]["content"], "watch this");
        assert!(req.body.get("system").is_none());
    }

    #[test]
    fn test_system_field_when_present() {
        let req = adapter()
            .build_request(&GenerationRequest::new("u").with_system("be terse"))
            .unwrap();
        assert_eq!(req.body["system"], "be terse");
    }

    #[test]
    fn test_requires_key() {
        let adapter = AnthropicAdapter::new(BackendConfig::new(Backend::Claude).with_model("m"));
        let err = adapter.build_request(&GenerationRequest::new("x")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_extract_text() {
        let body = r#"{"id":"msg_1","content":[{"type":"text","text":"Oh, dramatic."}]}"#;
        assert_eq!(adapter().extract_text(body).unwrap(), "Oh, dramatic.");
    }
}
