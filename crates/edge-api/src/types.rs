//! Request and response bodies exchanged with the backend

use serde::{Deserialize, Serialize};

/// Who authored a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
}

impl Role {
    /// Get a human-readable name for this role
    pub fn name(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
        }
    }
}

/// A retrieved passage backing an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Document the passage came from
    pub source: String,
    /// Page number inside that document
    pub page: u32,
    /// Snippet of the passage
    pub text: String,
}

/// Generation performance summary
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Meta {
    /// Tokens per second
    pub tps: f64,
    /// Wall-clock generation time in seconds
    pub duration: f64,
}

/// One prior transcript entry sent as conversation context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message
    pub message: String,
    /// Most recent prior entries, oldest first
    pub history: Vec<HistoryTurn>,
    /// Documents to restrict retrieval to; `null` means all
    pub sources: Option<Vec<String>>,
}

impl ChatRequest {
    /// Create a request with no history and no scope
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            sources: None,
        }
    }

    /// Attach conversation history
    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }

    /// Scope retrieval to the given documents. An empty list is sent as `null`.
    pub fn with_sources(mut self, sources: Option<Vec<String>>) -> Self {
        self.sources = sources.filter(|s| !s.is_empty());
        self
    }
}

/// Body of `GET /health`. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    pub status: Option<String>,
    pub llm_loaded: Option<bool>,
    pub model_exists: Option<bool>,
}

impl HealthReport {
    /// The model file has not been downloaded yet. Absence of the field means it exists.
    pub fn model_missing(&self) -> bool {
        self.model_exists == Some(false)
    }

    /// The language model is loaded, or the backend reports a generic ok
    pub fn is_ready(&self) -> bool {
        self.llm_loaded == Some(true) || self.status.as_deref() == Some("ok")
    }
}

/// One entry of `GET /documents`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
}

/// Body returned by `POST /documents/upload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    pub chunks_count: u64,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_null_sources() {
        let req = ChatRequest::new("hi");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message": "hi", "history": [], "sources": null})
        );
    }

    #[test]
    fn test_chat_request_empty_sources_become_null() {
        let req = ChatRequest::new("hi").with_sources(Some(vec![]));
        assert_eq!(req.sources, None);

        let req = ChatRequest::new("hi").with_sources(Some(vec!["a.pdf".into()]));
        assert_eq!(req.sources, Some(vec!["a.pdf".to_string()]));
    }

    #[test]
    fn test_history_turn_roles_lowercase() {
        let turn = HistoryTurn {
            role: Role::Assistant,
            content: "x".into(),
        };
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }

    #[test]
    fn test_health_report_missing_fields() {
        let report: HealthReport = serde_json::from_str("{}").unwrap();
        assert!(!report.model_missing());
        assert!(!report.is_ready());
    }

    #[test]
    fn test_health_report_model_missing() {
        let report: HealthReport = serde_json::from_str(r#"{"model_exists": false}"#).unwrap();
        assert!(report.model_missing());
    }

    #[test]
    fn test_health_report_ready_variants() {
        let loaded: HealthReport = serde_json::from_str(r#"{"llm_loaded": true}"#).unwrap();
        assert!(loaded.is_ready());

        let ok: HealthReport =
            serde_json::from_str(r#"{"status": "ok", "llm_loaded": false}"#).unwrap();
        assert!(ok.is_ready());

        let starting: HealthReport =
            serde_json::from_str(r#"{"status": "starting", "llm_loaded": false}"#).unwrap();
        assert!(!starting.is_ready());
    }
}
