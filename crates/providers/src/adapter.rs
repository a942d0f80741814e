//! Common shape every backend adapter fills in.
//!
//! Adapters are pure: they turn a [`GenerationRequest`] into an [`HttpRequest`]
//! and a response body into text. Sending happens in the router.

use crate::error::{truncate_body, ProviderError};
use reqwest::Method;
use serde::Serialize;
use shared::settings::Backend;

/// One commentary call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Fully assembled instruction text
    pub prompt: String,
    /// Text for the backend's system slot, if any
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub(crate) fn system(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Request ready to hand to an HTTP client.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: serde_json::Value,
}

impl HttpRequest {
    pub(crate) fn post_json<T: Serialize>(url: String, body: &T) -> Result<Self, ProviderError> {
        let body = serde_json::to_value(body).map_err(|e| ProviderError::Encode(e.to_string()))?;
        Ok(Self {
            method: Method::POST,
            url,
            headers: Vec::new(),
            body,
        })
    }

    pub(crate) fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub trait BackendAdapter: Send + Sync {
    fn backend(&self) -> Backend;

    /// Validate configuration and build the outbound request.
    fn build_request(&self, request: &GenerationRequest) -> Result<HttpRequest, ProviderError>;

    /// Pull the generated text out of a successful response body.
    fn extract_text(&self, body: &str) -> Result<String, ProviderError>;
}

/// Append `suffix` to `base` unless it is already there.
///
/// A base ending in `/v1` is not doubled when the suffix itself starts with `/v1/`.
pub fn join_endpoint(base: &str, suffix: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.ends_with(suffix) {
        return base.to_string();
    }
    if let Some(rest) = suffix.strip_prefix("/v1") {
        if rest.starts_with('/') && base.ends_with("/v1") {
            return format!("{}{}", base, rest);
        }
    }
    format!("{}{}", base, suffix)
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    backend: Backend,
    body: &str,
) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse {
        backend,
        detail: format!("{} ({})", e, truncate_body(body)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_endpoint_appends_suffix() {
        assert_eq!(
            join_endpoint("https://api.example.com/v1", "/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            join_endpoint("https://api.example.com/v1/", "/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_join_endpoint_keeps_existing_suffix() {
        assert_eq!(
            join_endpoint("http://localhost:5000/v1/chat/completions", "/chat/completions"),
            "http://localhost:5000/v1/chat/completions"
        );
        assert_eq!(
            join_endpoint("https://api.anthropic.com/v1/messages/", "/v1/messages"),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn test_join_endpoint_no_double_version() {
        assert_eq!(
            join_endpoint("https://api.anthropic.com/v1", "/v1/messages"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            join_endpoint("http://localhost:5001/api", "/v1/generate"),
            "http://localhost:5001/api/v1/generate"
        );
    }

    #[test]
    fn test_blank_system_prompt_ignored() {
        let req = GenerationRequest::new("hi").with_system("   ");
        assert_eq!(req.system(), None);
    }
}
