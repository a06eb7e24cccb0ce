//! The `Event` data model (§3) and the in-process types built around it.

use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DispatchError;

/// Opaque, monotonically-assignable primary key. Backed by a `bigserial` in
/// the reference Postgres schema.
pub type EventId = i64;

/// The five-state lifecycle from §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Pending,
    Running,
    Done,
    Failed,
    Dead,
}

impl EventStatus {
    /// The literal stored in the `status` column.
    pub fn as_sql(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Running => "running",
            EventStatus::Done => "done",
            EventStatus::Failed => "failed",
            EventStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EventStatus::Pending),
            "running" => Ok(EventStatus::Running),
            "done" => Ok(EventStatus::Done),
            "failed" => Ok(EventStatus::Failed),
            "dead" => Ok(EventStatus::Dead),
            other => Err(format!("unknown event status {other:?}")),
        }
    }
}

/// A row handed back by `claim_one`, already transitioned to `running`.
#[derive(Debug, Clone)]
pub struct ClaimedEvent {
    pub id: EventId,
    pub event_type: String,
    pub payload: Value,
    pub attempt: i32,
    pub max_attempts: i32,
}

/// Capability exposed to a transactional handler (§4.6 and §9's "sealed
/// session object"). Commit, rollback, and raw connection access are not
/// part of this surface; the dispatcher alone owns transaction boundaries.
pub struct HandlerSession<'a> {
    inner: &'a mut (dyn TransactionHandle + 'a),
}

impl<'a> HandlerSession<'a> {
    pub(crate) fn new(inner: &'a mut (dyn TransactionHandle + 'a)) -> Self {
        Self { inner }
    }

    /// Run a statement inside the event's transaction. Issuing a literal
    /// `COMMIT`/`ROLLBACK` here is rejected as a [`DispatchError::TransactionalViolation`] —
    /// those operations belong to the dispatcher.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DispatchError> {
        let trimmed = sql.trim_start();
        if trimmed.eq_ignore_ascii_case("commit") {
            return Err(DispatchError::TransactionalViolation("COMMIT"));
        }
        if trimmed.eq_ignore_ascii_case("rollback") {
            return Err(DispatchError::TransactionalViolation("ROLLBACK"));
        }
        self.inner.execute_raw(sql, params).await
    }

    /// Run a query and get back rows as JSON objects, inside the event's
    /// transaction.
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Value>, DispatchError> {
        self.inner.query_raw(sql, params).await
    }

    /// Escape hatch exposing the underlying connection for operations this
    /// wrapper doesn't model. Using it to commit, roll back, or otherwise
    /// manage the transaction voids the transactional contract (§9).
    pub fn unsafe_raw(&mut self) -> &mut dyn Any {
        self.inner.as_any_mut()
    }
}

/// The full authority over one event's transaction: everything a
/// [`HandlerSession`] can do, plus commit/rollback, reserved for the
/// dispatcher.
#[async_trait]
pub trait TransactionHandle: Send {
    async fn execute_raw(&mut self, sql: &str, params: &[Value]) -> Result<u64, DispatchError>;
    async fn query_raw(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Value>, DispatchError>;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    async fn commit(self: Box<Self>) -> Result<(), DispatchError>;
    async fn rollback(self: Box<Self>) -> Result<(), DispatchError>;
}

/// Per-dispatch context handed to every handler for one event (§3).
pub struct EventContext<'a> {
    pub event_id: EventId,
    pub event_type: String,
    pub attempt: i32,
    /// Non-null iff any handler matched for this event declared
    /// `transactional = true`.
    pub session: Option<HandlerSession<'a>>,
}

impl<'a> EventContext<'a> {
    pub fn is_transactional(&self) -> bool {
        self.session.is_some()
    }
}
