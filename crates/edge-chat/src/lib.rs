//! edge-chat: conversation runtime for the edge client
//!
//! This crate turns the backend's streamed chat records into transcript
//! updates, tracks whether the backend is ready to serve, and manages the
//! indexed document set.

pub mod assembler;
pub mod error;
pub mod events;
pub mod handle;
pub mod library;
pub mod readiness;
pub mod scope;
pub mod transcript;
pub mod transport;

pub use assembler::{AssemblerConfig, StreamAssembler};
pub use error::{Error, Result};
pub use events::{ChatEvent, ExchangeOutcome};
pub use handle::AssemblerHandle;
pub use library::DocumentLibrary;
pub use readiness::{ReadinessConfig, ReadinessMonitor, ReadinessState, classify};
pub use scope::{Scope, extract_mentions};
pub use transcript::{Change, Message, Transcript};
pub use transport::{ChatTransport, HealthProbe};
