//! HTTP client for the backend service

use crate::error::{Error, Result};
use crate::types::{ChatRequest, DocumentInfo, HealthReport, UploadReceipt};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

/// Default backend address (local sidecar)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Per-request budget for a single health probe
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Extensions the backend knows how to chunk
pub const UPLOAD_EXTENSIONS: &[&str] = &["pdf", "txt"];

/// Raw response body of a chat request
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Client for the backend's REST endpoints
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client for the given base URL (e.g. "http://127.0.0.1:8000")
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| Error::InvalidConfig(format!("bad base URL '{}': {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Create a client from a host and port
    pub fn from_host_port(host: &str, port: u16) -> Result<Self> {
        Self::new(format!("http://{}:{}", host, port))
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn document_url(&self, filename: &str) -> String {
        format!(
            "{}/documents/{}",
            self.base_url,
            urlencoding::encode(filename)
        )
    }

    /// Probe `GET /health`
    pub async fn health(&self) -> Result<HealthReport> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response("/health", response).await);
        }

        Ok(response.json().await?)
    }

    /// Open `POST /chat` and hand back the body as a byte stream
    pub async fn chat(&self, request: &ChatRequest) -> Result<ByteStream> {
        tracing::debug!(
            history = request.history.len(),
            sources = ?request.sources,
            "opening chat stream"
        );

        let response = self
            .client
            .post(self.url("/chat"))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response("/chat", response).await);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from));
        Ok(Box::pin(stream))
    }

    /// List indexed documents
    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        let response = self.client.get(self.url("/documents")).send().await?;

        if !response.status().is_success() {
            return Err(Error::from_response("/documents", response).await);
        }

        Ok(response.json().await?)
    }

    /// Upload a file for indexing
    pub async fn upload_document(&self, path: &Path) -> Result<UploadReceipt> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::InvalidConfig(format!("'{}' has no file name", path.display()))
            })?;

        // The backend stores other types but indexes nothing from them
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !UPLOAD_EXTENSIONS.contains(&extension.as_str()) {
            return Err(Error::UnsupportedFileType(filename));
        }

        let data = tokio::fs::read(path).await?;
        tracing::info!("Uploading {} ({} bytes)", filename, data.len());

        let part = reqwest::multipart::Part::bytes(data).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/documents/upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response("/documents/upload", response).await);
        }

        Ok(response.json().await?)
    }

    /// Remove a document from disk and from the index
    pub async fn delete_document(&self, filename: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.document_url(filename))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response("/documents/{filename}", response).await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_base_url_normalized() {
        let client = BackendClient::new("http://127.0.0.1:8000/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");

        let client = BackendClient::from_host_port("localhost", 9000).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_bad_base_url() {
        let err = BackendClient::new("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_document_url_is_encoded() {
        let client = BackendClient::new(DEFAULT_BASE_URL).unwrap();
        assert_eq!(
            client.document_url("annual report #2.pdf"),
            "http://127.0.0.1:8000/documents/annual%20report%20%232.pdf"
        );
    }

    #[tokio::test]
    async fn test_health_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "llm_loaded": true,
                "model_exists": true
            })))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri()).unwrap();
        let report = client.health().await.expect("health");
        assert!(report.is_ready());
        assert!(!report.model_missing());
    }

    #[tokio::test]
    async fn test_health_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri()).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn test_chat_streams_body() {
        let server = MockServer::start().await;
        let body = "{\"type\":\"token\",\"data\":\"Hel\"}\n{\"type\":\"token\",\"data\":\"lo\"}\n{\"type\":\"done\"}\n";
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(body_json(serde_json::json!({
                "message": "hi",
                "history": [{"role": "user", "content": "earlier"}],
                "sources": ["a.pdf"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri()).unwrap();
        let request = ChatRequest::new("hi")
            .with_history(vec![crate::types::HistoryTurn {
                role: Role::User,
                content: "earlier".into(),
            }])
            .with_sources(Some(vec!["a.pdf".into()]));

        let mut stream = client.chat(&request).await.expect("chat");
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.expect("chunk"));
        }
        assert_eq!(String::from_utf8(collected).unwrap(), body);
    }

    #[tokio::test]
    async fn test_chat_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri()).unwrap();
        let result = client.chat(&ChatRequest::new("hi")).await;
        match result {
            Err(e) => assert!(matches!(e, Error::Status { status: 503, .. })),
            Ok(_) => panic!("expected status error"),
        }
    }

    #[tokio::test]
    async fn test_chat_unreachable() {
        // Nothing listens on the discard port
        let client = BackendClient::new("http://127.0.0.1:9").unwrap();
        let result = client.chat(&ChatRequest::new("hi")).await;
        match result {
            Err(e) => {
                assert!(matches!(e, Error::Http(_)));
                assert!(e.is_unreachable());
            }
            Ok(_) => panic!("expected connect error"),
        }
    }

    #[tokio::test]
    async fn test_list_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"filename": "a.pdf"},
                {"filename": "notes.txt"}
            ])))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri()).unwrap();
        let docs = client.list_documents().await.expect("list");
        let names: Vec<_> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "notes.txt"]);
    }

    #[tokio::test]
    async fn test_upload_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "filename": "notes.txt",
                "chunks_count": 3,
                "status": "indexed"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "some text").unwrap();

        let client = BackendClient::new(server.uri()).unwrap();
        let receipt = client.upload_document(&file).await.expect("upload");
        assert_eq!(receipt.filename, "notes.txt");
        assert_eq!(receipt.chunks_count, 3);
        assert_eq!(receipt.status, "indexed");
    }

    #[tokio::test]
    async fn test_upload_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/upload"))
            .respond_with(ResponseTemplate::new(500).set_body_string("parse error"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        std::fs::write(&file, "%PDF").unwrap();

        let client = BackendClient::new(server.uri()).unwrap();
        let err = client.upload_document(&file).await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));
        assert!(err.to_string().contains("parse error"));
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/upload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.docx");
        std::fs::write(&file, "PK").unwrap();
        let bare = dir.path().join("README");
        std::fs::write(&bare, "text").unwrap();

        let client = BackendClient::new(server.uri()).unwrap();
        let err = client.upload_document(&file).await.unwrap_err();
        assert!(matches!(&err, Error::UnsupportedFileType(name) if name == "report.docx"));
        assert!(err.to_string().contains(".pdf or .txt"));
        assert!(matches!(
            client.upload_document(&bare).await,
            Err(Error::UnsupportedFileType(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_extension_is_case_insensitive() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "filename": "SCAN.PDF",
                "chunks_count": 1,
                "status": "indexed"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("SCAN.PDF");
        std::fs::write(&file, "%PDF").unwrap();

        let client = BackendClient::new(server.uri()).unwrap();
        assert_eq!(client.upload_document(&file).await.unwrap().filename, "SCAN.PDF");
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let client = BackendClient::new(DEFAULT_BASE_URL).unwrap();
        let err = client
            .upload_document(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_delete_document() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/documents/report.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "deleted",
                "filename": "report.pdf"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri()).unwrap();
        client.delete_document("report.pdf").await.expect("delete");
    }
}
