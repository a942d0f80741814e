use providers::ProviderError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommentaryError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A host collaborator (delegate, profiles, store) failed.
    #[error("host error: {0}")]
    Host(String),

    #[error("generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("a commentary is already being generated")]
    Busy,

    /// The model repeated the conversation instead of reacting to it.
    #[error("response echoed the conversation")]
    EchoRejected,
}

impl CommentaryError {
    pub fn host(err: anyhow::Error) -> Self {
        CommentaryError::Host(format!("{:#}", err))
    }
}
