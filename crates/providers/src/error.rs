use shared::settings::Backend;
use std::time::Duration;
use thiserror::Error;

/// Longest slice of a response body carried in an error.
pub const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Settings are incomplete; raised before any network I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Backend answered with a non-success status.
    #[error("{backend} error: {status}{}", detail_suffix(.body))]
    Backend {
        backend: Backend,
        status: u16,
        body: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("malformed {backend} response: {detail}")]
    MalformedResponse { backend: Backend, detail: String },

    #[error("failed to encode request: {0}")]
    Encode(String),
}

fn detail_suffix(body: &str) -> String {
    if body.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}", body)
    }
}

impl ProviderError {
    pub fn config(msg: impl Into<String>) -> Self {
        ProviderError::Configuration(msg.into())
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::Network(err.to_string())
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ProviderError::Configuration(_))
    }
}

/// First `MAX_ERROR_BODY_CHARS` characters of a response body.
pub fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_counts_chars() {
        let long = "é".repeat(500);
        let cut = truncate_body(&long);
        assert_eq!(cut.chars().count(), MAX_ERROR_BODY_CHARS);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn test_backend_error_display() {
        let err = ProviderError::Backend {
            backend: Backend::OpenAi,
            status: 401,
            body: "bad key".into(),
        };
        assert_eq!(err.to_string(), "openai error: 401\nbad key");

        let bare = ProviderError::Backend {
            backend: Backend::Claude,
            status: 500,
            body: "  ".into(),
        };
        assert_eq!(bare.to_string(), "claude error: 500");
    }

    #[test]
    fn test_timeout_display() {
        let err = ProviderError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "request timed out after 60s");
    }
}
