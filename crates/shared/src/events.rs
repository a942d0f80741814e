//! Notifications sent from the commentary pipeline to the presentation layer.

use serde::{Deserialize, Serialize};

/// Status and result updates for whatever renders the kibitzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentaryEvent {
    /// Generation began; show a typing indicator
    TypingStarted,
    /// Short status line ("Thinking...", "Watching...")
    Status(String),
    /// Text to display in the bubble
    Commentary(String),
    /// Generation failed
    Failed {
        /// Underlying error message
        reason: String,
        /// In-character placeholder to display
        display: String,
    },
    /// Generation ended, successfully or not
    TypingStopped,
}

impl CommentaryEvent {
    pub fn status(text: impl Into<String>) -> Self {
        CommentaryEvent::Status(text.into())
    }

    /// Text the bubble should show for this event, if any.
    pub fn bubble_text(&self) -> Option<&str> {
        match self {
            CommentaryEvent::Commentary(text) => Some(text),
            CommentaryEvent::Failed { display, .. } => Some(display),
            _ => None,
        }
    }
}
