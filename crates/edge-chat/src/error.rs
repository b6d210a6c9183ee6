//! Error types for edge-chat

use thiserror::Error;

/// Result type alias using edge-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during chat operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Api(#[from] edge_api::Error),

    /// Another exchange is still in flight
    #[error("A reply is still streaming")]
    Busy,

    /// Nothing to send after trimming
    #[error("Message is empty")]
    EmptyMessage,

    /// The caller cancelled the exchange
    #[error("Request aborted")]
    Aborted,
}
