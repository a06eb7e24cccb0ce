//! Error kinds for the dispatcher (§7 of the design).
//!
//! Only [`PublishError`] and the two [`DispatchError`] variants documented on
//! `Supervisor::start`/`Supervisor::stop` are meant to leave the crate.
//! Everything else is caught at a worker-loop boundary, logged, and folded
//! into row state instead of propagating.

use thiserror::Error;

/// Errors surfaced synchronously to a producer calling `publish_event`.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The event type was empty.
    #[error("event type must not be empty")]
    InvalidInput,
    /// The database was unreachable or the insert could not be serialized.
    #[error("storage unavailable: {0}")]
    StorageTransient(#[source] anyhow::Error),
}

/// Errors that occur while claiming, dispatching, or recording an event.
///
/// Most variants are handled internally by the worker loop; see the module
/// doc for the propagation policy.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler returned an error. Captured and stored on the row; never
    /// unwinds out of the worker loop.
    #[error("handler failed: {0}")]
    HandlerFailure(#[source] anyhow::Error),

    /// A transactional handler attempted a forbidden session operation
    /// (commit, rollback, or a raw `COMMIT`/`ROLLBACK` through the escape
    /// hatch). Treated as a `HandlerFailure`: the session is rolled back and
    /// the event retried.
    #[error("transactional handler attempted {0}, which is reserved for the dispatcher")]
    TransactionalViolation(&'static str),

    /// Database unreachable, serialization failure, or deadlock. The
    /// affected worker logs and backs off; any claim is left to stale
    /// recovery. Never crashes the process.
    #[error("transient storage error: {0}")]
    StorageTransient(#[source] anyhow::Error),

    /// Schema missing or permission denied. Surfaced from `Supervisor::start`;
    /// the system refuses to start.
    #[error("fatal storage error: {0}")]
    StorageFatal(#[source] anyhow::Error),

    /// The listener's database connection dropped. Handled internally with
    /// reconnect + backoff; never surfaced to a caller.
    #[error("listener disconnected: {0}")]
    ListenerDisconnect(#[source] anyhow::Error),
}

/// Outcome of `Supervisor::stop`.
///
/// `ShutdownTimeout` is not an error in the `std::error::Error` sense — it is
/// a warning-level result: the caller asked to wait, the wait expired, and
/// any still-running claims are left for stale-lock recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// All workers and the poller drained before the deadline (or the caller
    /// did not ask to wait).
    Clean,
    /// `wait_for_completion` was requested but `timeout` elapsed with work
    /// still in flight; the remaining tasks were abandoned.
    TimedOut,
}

pub(crate) fn truncate_error(err: &anyhow::Error) -> String {
    const LIMIT: usize = 2048;
    let message = err.to_string();
    if message.len() <= LIMIT {
        message
    } else {
        let mut truncated = message.chars().take(LIMIT).collect::<String>();
        truncated.push_str("…(truncated)");
        truncated
    }
}
