//! Chat event types

use crate::transcript::{Change, Message};
use std::sync::Arc;

/// How an exchange ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The stream ran to its end
    Completed,
    /// The user aborted; partial content was kept
    Cancelled,
    /// The request or stream failed; the failure text was written to the transcript
    Failed { reason: String },
}

impl ExchangeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExchangeOutcome::Completed)
    }
}

/// Events emitted while assembling replies
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A message was accepted and the request is being opened
    ExchangeStart {
        message: String,
        sources: Option<Vec<String>>,
    },

    /// A new entry was appended at `index`
    MessageAppended { index: usize, message: Arc<Message> },

    /// The entry at `index` was replaced by a new value
    MessageUpdated { index: usize, message: Arc<Message> },

    /// The streaming indicator flipped
    StreamingChanged { streaming: bool },

    /// A line could not be parsed and was skipped
    DecodeFailed { line: String, error: String },

    /// The exchange finished
    ExchangeEnd { outcome: ExchangeOutcome },

    /// The transcript was emptied
    Cleared,
}

impl ChatEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::ExchangeEnd { .. })
    }
}

impl From<Change> for ChatEvent {
    fn from(change: Change) -> Self {
        match change {
            Change::Appended { index, message } => ChatEvent::MessageAppended { index, message },
            Change::Updated { index, message } => ChatEvent::MessageUpdated { index, message },
        }
    }
}
