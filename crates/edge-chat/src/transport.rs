//! Seams between the chat core and the backend

use async_trait::async_trait;
use edge_api::{BackendClient, ByteStream, ChatRequest, HealthReport};

/// Opens the raw reply stream for a chat request
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> edge_api::Result<ByteStream>;
}

/// Performs a single readiness probe
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> edge_api::Result<HealthReport>;
}

#[async_trait]
impl ChatTransport for BackendClient {
    async fn open(&self, request: &ChatRequest) -> edge_api::Result<ByteStream> {
        self.chat(request).await
    }
}

#[async_trait]
impl HealthProbe for BackendClient {
    async fn probe(&self) -> edge_api::Result<HealthReport> {
        self.health().await
    }
}
