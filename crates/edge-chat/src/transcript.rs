//! Transcript state: ordered session history of messages.
//!
//! Entries are shared as `Arc<Message>` and never mutated in place. Every
//! update builds a new `Message` from the old one and swaps the slot, so a
//! snapshot handed to a renderer always holds fully consistent values.

use edge_api::{Citation, HistoryTurn, Meta, Role, StreamEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    /// Error reported by the backend in-stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create an assistant message with fixed content
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create the empty assistant entry that a reply streams into
    pub fn placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            citations: Some(Vec::new()),
            ..Default::default()
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Citations, or an empty slice if none were attached
    pub fn citations(&self) -> &[Citation] {
        self.citations.as_deref().unwrap_or(&[])
    }

    /// Reduce to the `{role, content}` pair sent as history
    pub fn to_history_turn(&self) -> HistoryTurn {
        HistoryTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }

    /// A copy of this message with its content replaced
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    /// Build the message that results from applying `event`, or `None` if the
    /// event leaves it unchanged.
    pub fn apply(&self, event: &StreamEvent) -> Option<Message> {
        match event {
            StreamEvent::Token { data } => {
                if data.is_empty() {
                    return None;
                }
                let mut content = String::with_capacity(self.content.len() + data.len());
                content.push_str(&self.content);
                content.push_str(data);
                Some(self.with_content(content))
            }
            StreamEvent::Citation { data } => Some(Self {
                citations: Some(data.clone()),
                ..self.clone()
            }),
            StreamEvent::Meta { tps, duration } => {
                if self.meta.is_some() {
                    tracing::debug!("ignoring repeated meta record");
                    return None;
                }
                Some(Self {
                    meta: Some(Meta {
                        tps: *tps,
                        duration: *duration,
                    }),
                    ..self.clone()
                })
            }
            StreamEvent::Error { message } => Some(Self {
                error: Some(message.clone()),
                ..self.clone()
            }),
            StreamEvent::Done => None,
            StreamEvent::Unknown => None,
        }
    }
}

/// A transcript slot that changed
#[derive(Debug, Clone)]
pub enum Change {
    Appended { index: usize, message: Arc<Message> },
    Updated { index: usize, message: Arc<Message> },
}

/// Ordered, append-only session history
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<Arc<Message>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Arc<Message>] {
        &self.entries
    }

    /// Cheap copy of the current entries
    pub fn snapshot(&self) -> Vec<Arc<Message>> {
        self.entries.clone()
    }

    pub fn last(&self) -> Option<&Arc<Message>> {
        self.entries.last()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The last `n` entries as history turns, oldest first
    pub fn history(&self, n: usize) -> Vec<HistoryTurn> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..]
            .iter()
            .map(|m| m.to_history_turn())
            .collect()
    }

    /// Append a user entry and its assistant placeholder together
    pub fn push_exchange(&mut self, user_text: impl Into<String>) -> [Change; 2] {
        let user = Arc::new(Message::user(user_text));
        let assistant = Arc::new(Message::placeholder());
        let first = self.entries.len();
        self.entries.push(Arc::clone(&user));
        self.entries.push(Arc::clone(&assistant));
        [
            Change::Appended {
                index: first,
                message: user,
            },
            Change::Appended {
                index: first + 1,
                message: assistant,
            },
        ]
    }

    /// Apply a stream event to the trailing assistant entry
    pub fn apply_to_last(&mut self, event: &StreamEvent) -> Option<Change> {
        let index = self.entries.len().checked_sub(1)?;
        let current = &self.entries[index];
        if !current.is_assistant() {
            tracing::warn!("stream record arrived with no assistant entry to apply it to");
            return None;
        }
        let next = Arc::new(current.apply(event)?);
        self.entries[index] = Arc::clone(&next);
        Some(Change::Updated {
            index,
            message: next,
        })
    }

    /// Replace the trailing assistant entry's content with `text`, or append
    /// a new assistant entry holding `fallback` if there is none.
    pub fn fail_last(&mut self, text: &str, fallback: &str) -> Change {
        match self.entries.last() {
            Some(last) if last.is_assistant() => {
                let index = self.entries.len() - 1;
                let next = Arc::new(last.with_content(text));
                self.entries[index] = Arc::clone(&next);
                Change::Updated {
                    index,
                    message: next,
                }
            }
            _ => {
                let message = Arc::new(Message::assistant(fallback));
                self.entries.push(Arc::clone(&message));
                Change::Appended {
                    index: self.entries.len() - 1,
                    message,
                }
            }
        }
    }
}
