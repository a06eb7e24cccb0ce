//! The Notifier (§4.2): best-effort wake-up for listeners after a producer
//! commits, or after a worker reschedules a failed event.
//!
//! Signals are never required for correctness — if every signal were
//! dropped, the [`crate::poller::Poller`] would still make progress.

use async_trait::async_trait;

use crate::error::DispatchError;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a payload-less signal on the configured channel. Best-effort:
    /// implementations should log and swallow transient failures rather
    /// than propagate them up through the worker loop.
    async fn notify(&self) -> Result<(), DispatchError>;
}

/// A notifier that does nothing — useful for tests and for deployments that
/// rely solely on the poller.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}
