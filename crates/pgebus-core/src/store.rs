//! The Event Store contract (§4.1): the only component allowed to mutate
//! the `events` table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{DispatchError, PublishError};
use crate::event::{ClaimedEvent, EventId, TransactionHandle};

/// Owns the `events` table and the five mutation paths described in §4.1.
///
/// Every method commits before returning, so a successful call is durable
/// even if the caller crashes immediately after.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Ensure the configured schema exists (`CREATE SCHEMA IF NOT EXISTS`).
    /// Does not create tables — that is the operator's responsibility. A
    /// failure here is `StorageFatal` and should abort `Supervisor::start`.
    async fn ensure_schema(&self) -> Result<(), DispatchError>;

    /// Insert a new pending row. Fails with [`PublishError::InvalidInput`] if
    /// `event_type` is empty. The row is invisible to workers until the
    /// caller's own transaction commits. `max_attempts` is a per-row value
    /// (§3); callers source it from their own `Config::max_attempts` unless
    /// a particular event needs a different ceiling.
    async fn insert_pending(
        &self,
        event_type: &str,
        payload: Value,
        run_at: Option<DateTime<Utc>>,
        max_attempts: i32,
    ) -> Result<EventId, PublishError>;

    /// Atomically claim the single oldest-eligible pending row
    /// (`status = pending AND run_at <= now`, ordered by `(run_at, id)`),
    /// skipping rows already locked by another worker. Returns `None` if the
    /// queue is empty.
    async fn claim_one(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedEvent>, DispatchError>;

    /// Transition a `running` row to `done`, clearing the lock.
    async fn mark_done(&self, id: EventId) -> Result<(), DispatchError>;

    /// Transition a `running` row to `pending` (with `run_at` pushed out by
    /// `backoff`) or to `dead` if `attempts` has reached `max_attempts`.
    async fn mark_failed(
        &self,
        id: EventId,
        error: &str,
        now: DateTime<Utc>,
        backoff: Duration,
    ) -> Result<(), DispatchError>;

    /// Force any row stuck in `running` past `stale_after` back to
    /// `pending`, without incrementing `attempts`. Returns the number of
    /// rows recovered.
    async fn recover_stale(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<u64, DispatchError>;

    /// Open one transaction spanning a whole event dispatch, for handlers
    /// that declared `transactional = true`.
    async fn begin_session(&self) -> Result<Box<dyn TransactionHandle>, DispatchError>;
}
