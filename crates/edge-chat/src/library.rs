//! Indexed document set: listing, upload and deletion

use crate::error::Result;
use edge_api::{BackendClient, UploadReceipt};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Client-side view of the documents the backend has indexed
#[derive(Clone)]
pub struct DocumentLibrary {
    client: BackendClient,
    documents: Arc<RwLock<Vec<String>>>,
    uploading: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl DocumentLibrary {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            documents: Arc::new(RwLock::new(Vec::new())),
            uploading: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Filenames from the last successful refresh
    pub fn documents(&self) -> Vec<String> {
        self.documents.read().clone()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::Acquire)
    }

    /// Error from the most recent upload, if it failed
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    /// Reload the list from the backend. On failure the previous list is kept.
    pub async fn refresh(&self) -> Vec<String> {
        match self.client.list_documents().await {
            Ok(docs) => {
                let names: Vec<String> = docs.into_iter().map(|d| d.filename).collect();
                *self.documents.write() = names.clone();
                names
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to list documents");
                self.documents()
            }
        }
    }

    /// Upload a file for indexing, then refresh the list.
    pub async fn upload(&self, path: &Path) -> Result<UploadReceipt> {
        let _flag = UploadFlag::set(&self.uploading);
        self.clear_error();

        match self.client.upload_document(path).await {
            Ok(receipt) => {
                tracing::info!(
                    "Indexed {} ({} chunks)",
                    receipt.filename,
                    receipt.chunks_count
                );
                self.refresh().await;
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "upload failed");
                *self.last_error.lock() = Some(format!("Upload failed: {}", e));
                Err(e.into())
            }
        }
    }

    /// Delete a document, then refresh the list.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        let result = self.client.delete_document(filename).await;
        if let Err(e) = &result {
            tracing::warn!(filename, error = %e, "delete failed");
        }
        self.refresh().await;
        Ok(result?)
    }

    /// Names from `names` that are not in the current list
    pub fn unknown<'a>(&self, names: &'a [String]) -> Vec<&'a str> {
        let docs = self.documents.read();
        names
            .iter()
            .filter(|n| !docs.contains(n))
            .map(String::as_str)
            .collect()
    }
}

struct UploadFlag<'a>(&'a AtomicBool);

impl<'a> UploadFlag<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for UploadFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
