//! edge-api: wire layer for the edge RAG backend
//!
//! Typed request/response bodies, the newline-delimited event decoder used by
//! the chat stream, and a reqwest client for every backend endpoint.

pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{BackendClient, ByteStream, DEFAULT_BASE_URL, UPLOAD_EXTENSIONS};
pub use error::{Error, Result};
pub use stream::{LineDecoder, StreamEvent, decode_line};
pub use types::*;
