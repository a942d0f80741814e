use crate::adapter::{decode, join_endpoint, BackendAdapter, GenerationRequest, HttpRequest};
use crate::config::BackendConfig;
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use shared::settings::Backend;

const CHAT_COMPLETIONS: &str = "/chat/completions";

// Sent to OpenRouter for app attribution only.
const OPENROUTER_REFERER: &str = "http://localhost/kibitzer";
const OPENROUTER_TITLE: &str = "Kibitzer";

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ── Adapter ──────────────────────────────────────────────────────────

/// Chat-completions adapter shared by every OpenAI-compatible backend
/// (OpenAI, OpenRouter, Mistral, Cohere, PaLM, text-generation servers, custom).
pub struct OpenAIAdapter {
    config: BackendConfig,
}

impl OpenAIAdapter {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

impl BackendAdapter for OpenAIAdapter {
    fn backend(&self) -> Backend {
        self.config.backend
    }

    fn build_request(&self, request: &GenerationRequest) -> Result<HttpRequest, ProviderError> {
        self.config.validate()?;
        let url = join_endpoint(&self.config.base_url()?, CHAT_COMPLETIONS);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system() {
            messages.push(OpenAIMessage {
                role: "system".into(),
                content: system.to_string(),
            });
        }
        messages.push(OpenAIMessage {
            role: "user".into(),
            content: request.prompt.clone(),
        });

        let body = OpenAIRequest {
            model: self.config.model().to_string(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut req = HttpRequest::post_json(url, &body)?;
        if let Some(key) = self.config.api_key() {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        if self.config.backend == Backend::OpenRouter {
            req = req
                .header("HTTP-Referer", OPENROUTER_REFERER)
                .header("X-Title", OPENROUTER_TITLE);
        }
        Ok(req)
    }

    fn extract_text(&self, body: &str) -> Result<String, ProviderError> {
        let resp: OpenAIResponse = decode(self.config.backend, body)?;
        Ok(resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(backend: Backend) -> OpenAIAdapter {
        OpenAIAdapter::new(
            BackendConfig::new(backend)
                .with_url("https://api.example.com/v1")
                .with_key("sk-test")
                .with_model("gpt-4o-mini"),
        )
    }

    #[test]
    fn test_build_request_shape() {
        let req = adapter(Backend::OpenAi)
            .build_request(&GenerationRequest::new("comment please"))
            .unwrap();
        assert_eq!(req.url, "https://api.example.com/v1/chat/completions");
        assert_eq!(req.header_value("authorization"), Some("Bearer sk-test"));
        assert_eq!(req.body["model"], "gpt-4o-mini");
        assert_eq!(req.body["max_tokens"], 150);
        let messages = req.body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "comment please");
        assert!(req.header_value("X-Title").is_none());
    }

    #[test]
    fn test_system_message_first() {
        let req = adapter(Backend::Mistral)
            .build_request(&GenerationRequest::new("u").with_system("s"))
            .unwrap();
        let messages = req.body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "s");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn test_openrouter_attribution_headers() {
        let req = adapter(Backend::OpenRouter)
            .build_request(&GenerationRequest::new("x"))
            .unwrap();
        assert_eq!(req.header_value("X-Title"), Some("Kibitzer"));
        assert!(req.header_value("HTTP-Referer").is_some());
    }

    #[test]
    fn test_keyless_custom_backend_sends_no_auth() {
        let adapter = OpenAIAdapter::new(
            BackendConfig::new(Backend::Custom)
                .with_url("http://localhost:8080")
                .with_model("local"),
        );
        let req = adapter.build_request(&GenerationRequest::new("x")).unwrap();
        assert_eq!(req.url, "http://localhost:8080/chat/completions");
        assert!(req.header_value("Authorization").is_none());
    }

    #[test]
    fn test_extract_text() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Bold move."}}]}"#;
        assert_eq!(adapter(Backend::OpenAi).extract_text(body).unwrap(), "Bold move.");
        assert_eq!(
            adapter(Backend::OpenAi).extract_text(r#"{"choices":[]}"#).unwrap(),
            ""
        );
    }

    #[test]
    fn test_extract_text_malformed() {
        let err = adapter(Backend::OpenAi).extract_text("<html>").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }
}
