//! In-memory test doubles for `pgebus-core`: an [`InMemoryEventStore`]
//! implementing the full `EventStore` contract against a `Mutex<Vec<Row>>`
//! instead of a real table, and a [`FakeClock`] for driving retry/backoff
//! timing deterministically.
//!
//! Neither type is meant to ship in a production binary; they exist so the
//! dispatcher's claim/dispatch/retry protocol can be exercised without a
//! Postgres instance.

use std::any::Any;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgebus_core::{
    ClaimedEvent, DispatchError, EventId, EventStatus, EventStore, PublishError, TransactionHandle,
};
use serde_json::Value;

#[derive(Debug, Clone)]
struct Row {
    id: EventId,
    event_type: String,
    payload: Value,
    status: EventStatus,
    attempt: i32,
    max_attempts: i32,
    run_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    worker_id: Option<String>,
    last_error: Option<String>,
}

/// An `EventStore` backed by a `Mutex<Vec<Row>>`. Claim ordering, the
/// pending/running/done/failed/dead transitions, and stale-lock recovery all
/// mirror the reference Postgres schema (§4.1); only the storage medium
/// differs.
pub struct InMemoryEventStore {
    rows: Mutex<Vec<Row>>,
    next_id: AtomicI64,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Snapshot of every row's `(event_type, status)`, oldest first. Handy
    /// for asserting on dead-lettering and retry counts in tests.
    pub fn snapshot_statuses(&self) -> Vec<(EventId, String, EventStatus)> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|row| (row.id, row.event_type.clone(), row.status))
            .collect()
    }

    pub fn attempts_for(&self, id: EventId) -> Option<i32> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.id == id)
            .map(|row| row.attempt)
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn ensure_schema(&self) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn insert_pending(
        &self,
        event_type: &str,
        payload: Value,
        run_at: Option<DateTime<Utc>>,
        max_attempts: i32,
    ) -> Result<EventId, PublishError> {
        if event_type.is_empty() {
            return Err(PublishError::InvalidInput);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = Row {
            id,
            event_type: event_type.to_string(),
            payload,
            status: EventStatus::Pending,
            attempt: 0,
            max_attempts,
            run_at: run_at.unwrap_or_else(Utc::now),
            claimed_at: None,
            worker_id: None,
            last_error: None,
        };
        self.rows.lock().unwrap().push(row);
        Ok(id)
    }

    async fn claim_one(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedEvent>, DispatchError> {
        let mut rows = self.rows.lock().unwrap();
        let candidate = rows
            .iter_mut()
            .filter(|row| row.status == EventStatus::Pending && row.run_at <= now)
            .min_by_key(|row| (row.run_at, row.id));

        let Some(row) = candidate else {
            return Ok(None);
        };

        row.status = EventStatus::Running;
        row.attempt += 1;
        row.claimed_at = Some(now);
        row.worker_id = Some(worker_id.to_string());

        Ok(Some(ClaimedEvent {
            id: row.id,
            event_type: row.event_type.clone(),
            payload: row.payload.clone(),
            attempt: row.attempt,
            max_attempts: row.max_attempts,
        }))
    }

    async fn mark_done(&self, id: EventId) -> Result<(), DispatchError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
            row.status = EventStatus::Done;
            row.claimed_at = None;
            row.worker_id = None;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: EventId,
        error: &str,
        now: DateTime<Utc>,
        backoff: Duration,
    ) -> Result<(), DispatchError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
            row.last_error = Some(error.to_string());
            row.claimed_at = None;
            row.worker_id = None;
            if row.attempt >= row.max_attempts {
                row.status = EventStatus::Dead;
            } else {
                row.status = EventStatus::Pending;
                row.run_at = now
                    + chrono::Duration::from_std(backoff)
                        .unwrap_or_else(|_| chrono::Duration::seconds(0));
            }
        }
        Ok(())
    }

    async fn recover_stale(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<u64, DispatchError> {
        let threshold = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
        let mut rows = self.rows.lock().unwrap();
        let mut recovered = 0u64;
        for row in rows.iter_mut() {
            if row.status == EventStatus::Running {
                if let Some(claimed_at) = row.claimed_at {
                    if now - claimed_at >= threshold {
                        row.status = EventStatus::Pending;
                        row.claimed_at = None;
                        row.worker_id = None;
                        recovered += 1;
                    }
                }
            }
        }
        Ok(recovered)
    }

    async fn begin_session(&self) -> Result<Box<dyn TransactionHandle>, DispatchError> {
        Ok(Box::new(InMemoryTransaction::default()))
    }
}

/// A recording, non-durable stand-in for a real transaction. `execute_raw`
/// appends to an internal log instead of touching any storage; `commit` and
/// `rollback` just record which happened so tests can assert on it.
#[derive(Default)]
pub struct InMemoryTransaction {
    pub statements: Vec<String>,
    pub committed: bool,
    pub rolled_back: bool,
}

#[async_trait]
impl TransactionHandle for InMemoryTransaction {
    async fn execute_raw(&mut self, sql: &str, _params: &[Value]) -> Result<u64, DispatchError> {
        self.statements.push(sql.to_string());
        Ok(1)
    }

    async fn query_raw(&mut self, _sql: &str, _params: &[Value]) -> Result<Vec<Value>, DispatchError> {
        Ok(Vec::new())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DispatchError> {
        self.committed = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), DispatchError> {
        self.rolled_back = true;
        Ok(())
    }
}

/// A `Clock` whose `now()` is set explicitly, so retry backoff and delayed
/// `run_at` scenarios can be advanced deterministically instead of waiting on
/// real time.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::seconds(0));
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }
}

impl pgebus_core::Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
