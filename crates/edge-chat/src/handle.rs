//! A cloneable handle for poking the assembler from external code.

use crate::events::ChatEvent;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// A cloneable handle for poking the assembler from external code.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct AssemblerHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) busy: Arc<AtomicBool>,
    pub(crate) streaming: Arc<AtomicBool>,
}

impl AssemblerHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            busy: Arc::new(AtomicBool::new(false)),
            streaming: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort the exchange in flight, if any.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Whether an exchange is in flight (from send until the stream closes).
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Whether a reply is still being produced. Clears as soon as `done` arrives,
    /// which may be before the connection closes.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Claim the single exchange slot. Returns `None` if one is already in flight.
    pub(crate) fn try_acquire(
        &self,
        events: broadcast::Sender<ChatEvent>,
    ) -> Option<(ExchangeGuard, CancellationToken)> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        let token = {
            let mut cancel = self.cancel.lock();
            *cancel = CancellationToken::new();
            cancel.clone()
        };

        self.streaming.store(true, Ordering::Release);
        let _ = events.send(ChatEvent::StreamingChanged { streaming: true });

        let guard = ExchangeGuard {
            handle: self.clone(),
            events,
        };
        Some((guard, token))
    }
}

/// Holds the exchange slot. Dropping it releases both flags on every exit path.
pub(crate) struct ExchangeGuard {
    handle: AssemblerHandle,
    events: broadcast::Sender<ChatEvent>,
}

impl ExchangeGuard {
    /// Clear the streaming flag while keeping the slot busy.
    pub(crate) fn end_streaming(&self) {
        if self.handle.streaming.swap(false, Ordering::AcqRel) {
            let _ = self
                .events
                .send(ChatEvent::StreamingChanged { streaming: false });
        }
    }
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        self.end_streaming();
        self.handle.busy.store(false, Ordering::Release);
    }
}
