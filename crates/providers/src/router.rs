use crate::adapter::{BackendAdapter, GenerationRequest};
use crate::anthropic::AnthropicAdapter;
use crate::config::BackendConfig;
use crate::error::{truncate_body, ProviderError};
use crate::kobold::KoboldAdapter;
use crate::openai::OpenAIAdapter;
use reqwest::Client;
use shared::settings::Backend;
use std::sync::LazyLock;
use tracing::{debug, warn};

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Connection pool shared by every outbound call of the process.
pub fn shared_client() -> Client {
    SHARED_HTTP.clone()
}

/// Adapter for the configured backend.
pub fn adapter_for(config: &BackendConfig) -> Box<dyn BackendAdapter> {
    match config.backend {
        Backend::Claude => Box::new(AnthropicAdapter::new(config.clone())),
        Backend::Kobold => Box::new(KoboldAdapter::new(config.clone())),
        Backend::OpenAi
        | Backend::OpenRouter
        | Backend::Mistral
        | Backend::Cohere
        | Backend::Palm
        | Backend::TextGen
        | Backend::Custom => Box::new(OpenAIAdapter::new(config.clone())),
    }
}

/// Sends generation requests to one configured backend.
pub struct BackendRouter {
    http: Client,
    config: BackendConfig,
}

impl BackendRouter {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: shared_client(),
            config,
        }
    }

    pub fn with_client(config: BackendConfig, http: Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let adapter = adapter_for(&self.config);
        let outbound = adapter.build_request(request)?;
        debug!(backend = %self.config.backend, url = %outbound.url, "sending generation request");

        let mut builder = self
            .http
            .request(outbound.method, &outbound.url)
            .timeout(self.config.timeout)
            .json(&outbound.body);
        for (name, value) in &outbound.headers {
            builder = builder.header(*name, value);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout))?;

        if !status.is_success() {
            warn!(backend = %self.config.backend, status = status.as_u16(), "backend returned error status");
            return Err(ProviderError::Backend {
                backend: self.config.backend,
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        adapter.extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockServer;
    use std::time::Duration;

    #[test]
    fn test_adapter_selection() {
        for backend in Backend::all() {
            let adapter = adapter_for(&BackendConfig::new(*backend));
            assert_eq!(adapter.backend(), *backend);
        }
    }

    #[tokio::test]
    async fn test_generate_openai_compatible() {
        let server = MockServer::start(
            200,
            r#"{"choices":[{"message":{"content":"What a twist."}}]}"#,
        )
        .await;
        let router = BackendRouter::new(
            BackendConfig::new(Backend::TextGen)
                .with_url(format!("{}/v1", server.url))
                .with_model("local-model"),
        );

        let text = router
            .generate(&GenerationRequest::new("prompt text"))
            .await
            .unwrap();
        assert_eq!(text, "What a twist.");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/v1/chat/completions");
        assert_eq!(requests[0].json()["messages"][0]["content"], "prompt text");
    }

    #[tokio::test]
    async fn test_generate_anthropic_headers() {
        let server =
            MockServer::start(200, r#"{"content":[{"type":"text","text":"Hmm."}]}"#).await;
        let router = BackendRouter::new(
            BackendConfig::new(Backend::Claude)
                .with_url(server.url.clone())
                .with_key("sk-ant")
                .with_model("claude"),
        );
        let text = router.generate(&GenerationRequest::new("p")).await.unwrap();
        assert_eq!(text, "Hmm.");
        let req = &server.requests()[0];
        assert_eq!(req.path, "/v1/messages");
        assert_eq!(req.header("x-api-key"), Some("sk-ant"));
        assert_eq!(req.header("anthropic-version"), Some("2023-06-01"));
    }

    #[tokio::test]
    async fn test_non_success_status_truncates_body() {
        let server = MockServer::start(500, "x".repeat(1000)).await;
        let router = BackendRouter::new(
            BackendConfig::new(Backend::Custom)
                .with_url(server.url.clone())
                .with_model("m"),
        );
        let err = router.generate(&GenerationRequest::new("p")).await.unwrap_err();
        match err {
            ProviderError::Backend { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_configuration_error_before_network() {
        let server = MockServer::start(200, "{}").await;
        let router = BackendRouter::new(
            BackendConfig::new(Backend::OpenAi)
                .with_url(server.url.clone())
                .with_model("gpt"),
        );
        let err = router.generate(&GenerationRequest::new("p")).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let server = MockServer::start_with_delay(200, "{}", Duration::from_secs(5)).await;
        let router = BackendRouter::new(
            BackendConfig::new(Backend::Custom)
                .with_url(server.url.clone())
                .with_model("m")
                .with_timeout(Duration::from_millis(200)),
        );
        let err = router.generate(&GenerationRequest::new("p")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_shared_client_reused_across_routers() {
        let server = MockServer::start(200, r#"{"results":[{"text":"Again."}]}"#).await;
        let config = BackendConfig::new(Backend::Kobold).with_url(server.url.clone());
        let first = BackendRouter::new(config.clone());
        let second = BackendRouter::with_client(config, shared_client());

        assert_eq!(first.generate(&GenerationRequest::new("a")).await.unwrap(), "Again.");
        assert_eq!(second.generate(&GenerationRequest::new("b")).await.unwrap(), "Again.");
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let router = BackendRouter::new(
            BackendConfig::new(Backend::Custom)
                .with_url("http://127.0.0.1:1")
                .with_model("m"),
        );
        let err = router.generate(&GenerationRequest::new("p")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
