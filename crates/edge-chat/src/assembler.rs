//! Stream assembler: turns one user message into a streamed assistant reply
//!
//! `send` appends the user entry and an empty assistant placeholder, opens
//! the chat stream and folds each decoded record into the placeholder. Only
//! one exchange may be in flight at a time.

use crate::error::{Error, Result};
use crate::events::{ChatEvent, ExchangeOutcome};
use crate::handle::{AssemblerHandle, ExchangeGuard};
use crate::transcript::{Message, Transcript};
use crate::transport::ChatTransport;
use edge_api::{ChatRequest, LineDecoder, decode_line};
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Assembler configuration
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Number of prior entries sent as history
    pub history_turns: usize,
    /// Written into the assistant placeholder when an exchange fails
    pub failure_message: String,
    /// Appended as a new assistant entry if the placeholder is gone
    pub fallback_failure_message: String,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            history_turns: 5,
            failure_message:
                "Connection failed. The AI engine might be reloading or busy. Please retry."
                    .to_string(),
            fallback_failure_message: "Connection failed. Please retry.".to_string(),
        }
    }
}

/// Builds assistant replies from the chat stream
#[derive(Clone)]
pub struct StreamAssembler {
    config: AssemblerConfig,
    transport: Arc<dyn ChatTransport>,
    transcript: Arc<RwLock<Transcript>>,
    event_tx: broadcast::Sender<ChatEvent>,
    handle: AssemblerHandle,
}

impl StreamAssembler {
    /// Create a new assembler with an empty transcript
    pub fn new(transport: Arc<dyn ChatTransport>, config: AssemblerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            transport,
            transcript: Arc::new(RwLock::new(Transcript::new())),
            event_tx,
            handle: AssemblerHandle::new(),
        }
    }

    /// Subscribe to chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    /// Get a handle for aborting and observing from outside
    pub fn handle(&self) -> AssemblerHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Abort the exchange in flight, if any
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_busy(&self) -> bool {
        self.handle.is_busy()
    }

    pub fn is_streaming(&self) -> bool {
        self.handle.is_streaming()
    }

    /// Current transcript entries
    pub fn snapshot(&self) -> Vec<Arc<Message>> {
        self.transcript.read().snapshot()
    }

    /// Empty the transcript. Refused while an exchange is in flight.
    pub fn clear(&self) -> Result<()> {
        if self.handle.is_busy() {
            return Err(Error::Busy);
        }
        self.transcript.write().clear();
        self.emit(ChatEvent::Cleared);
        Ok(())
    }

    /// Send a message and stream the reply into the transcript.
    ///
    /// Returns `Error::EmptyMessage` for blank text and `Error::Busy` if an
    /// exchange is already in flight; in both cases nothing is appended.
    /// Transport failures are not errors here: they are written into the
    /// transcript and reported as `ExchangeOutcome::Failed`.
    pub async fn send(
        &self,
        text: &str,
        sources: Option<Vec<String>>,
    ) -> Result<ExchangeOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let (guard, cancel) = self
            .handle
            .try_acquire(self.event_tx.clone())
            .ok_or(Error::Busy)?;

        let request = ChatRequest::new(text).with_sources(sources);
        self.emit(ChatEvent::ExchangeStart {
            message: text.to_string(),
            sources: request.sources.clone(),
        });

        let (history, changes) = {
            let mut transcript = self.transcript.write();
            let history = transcript.history(self.config.history_turns);
            (history, transcript.push_exchange(text))
        };
        for change in changes {
            self.emit(change.into());
        }
        let request = request.with_history(history);

        tracing::debug!(
            history = request.history.len(),
            sources = ?request.sources,
            "starting exchange"
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Aborted),
            result = self.run_exchange(&request, &guard) => result,
        };

        let outcome = match result {
            Ok(()) => ExchangeOutcome::Completed,
            Err(Error::Aborted) => {
                tracing::info!("exchange aborted, keeping partial reply");
                ExchangeOutcome::Cancelled
            }
            Err(e) => {
                tracing::warn!(error = %e, "exchange failed");
                let change = self.transcript.write().fail_last(
                    &self.config.failure_message,
                    &self.config.fallback_failure_message,
                );
                self.emit(change.into());
                ExchangeOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        drop(guard);
        self.emit(ChatEvent::ExchangeEnd {
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }

    async fn run_exchange(&self, request: &ChatRequest, guard: &ExchangeGuard) -> Result<()> {
        let mut stream = self.transport.open(request).await?;
        let mut decoder = LineDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for line in decoder.push(&chunk) {
                self.handle_line(&line, guard);
            }
        }

        // The backend may close without a trailing newline
        if let Some(line) = decoder.finish() {
            self.handle_line(&line, guard);
        }
        Ok(())
    }

    fn handle_line(&self, line: &str, guard: &ExchangeGuard) {
        let event = match decode_line(line) {
            None => return,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::warn!(line, error = %e, "skipping malformed stream record");
                self.emit(ChatEvent::DecodeFailed {
                    line: line.to_string(),
                    error: e.to_string(),
                });
                return;
            }
        };

        if event.is_terminal() {
            guard.end_streaming();
        }

        let change = self.transcript.write().apply_to_last(&event);
        if let Some(change) = change {
            self.emit(change.into());
        }
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }
}
