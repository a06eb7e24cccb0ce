//! PostgreSQL implementation of the `pgebus-core` traits: `PgEventStore`,
//! `PgNotifier`, and `PgListener`, plus a `publish_event` helper that wraps
//! insert-then-notify in one transaction.
//!
//! # Schema
//!
//! ```sql
//! CREATE SCHEMA IF NOT EXISTS pgebus;
//!
//! CREATE TABLE pgebus.events (
//!     id BIGSERIAL PRIMARY KEY,
//!     event_type TEXT NOT NULL,
//!     payload JSONB NOT NULL,
//!     status TEXT NOT NULL DEFAULT 'pending',
//!     run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     attempts INTEGER NOT NULL DEFAULT 0,
//!     max_attempts INTEGER NOT NULL DEFAULT 5,
//!     last_error TEXT,
//!     locked_at TIMESTAMPTZ,
//!     locked_by TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE INDEX idx_pgebus_events_ready ON pgebus.events (run_at, id)
//!     WHERE status = 'pending';
//! CREATE INDEX idx_pgebus_events_locked ON pgebus.events (locked_at)
//!     WHERE status = 'running';
//! ```
//!
//! Table creation is left to the operator/migration tooling; `ensure_schema`
//! only issues `CREATE SCHEMA IF NOT EXISTS`.

mod listener;
mod notifier;
mod session;
mod store;

pub use listener::PgListener;
pub use notifier::PgNotifier;
pub use session::PgTransactionHandle;
pub use store::PgEventStore;

use chrono::{DateTime, Utc};
use pgebus_core::{EventId, PublishError};
use serde_json::Value;
use sqlx::{Postgres, Transaction};

/// Insert a pending row and notify the configured channel, in the caller's
/// own transaction (§9's "global publish helper", reworked as a free
/// function rather than process-wide state).
///
/// The caller commits `tx`; the row and the notification both become
/// visible together.
pub async fn publish_event(
    tx: &mut Transaction<'_, Postgres>,
    channel: &str,
    schema: &str,
    event_type: &str,
    payload: Value,
    run_at: Option<DateTime<Utc>>,
    max_attempts: i32,
) -> Result<EventId, PublishError> {
    if event_type.is_empty() {
        return Err(PublishError::InvalidInput);
    }

    let run_at = run_at.unwrap_or_else(Utc::now);
    let row: (EventId,) = sqlx::query_as(&format!(
        "INSERT INTO {schema}.events (event_type, payload, run_at, max_attempts) VALUES ($1, $2, $3, $4) RETURNING id"
    ))
    .bind(event_type)
    .bind(&payload)
    .bind(run_at)
    .bind(max_attempts)
    .fetch_one(&mut **tx)
    .await
    .map_err(|err| PublishError::StorageTransient(err.into()))?;

    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(channel)
        .bind("")
        .execute(&mut **tx)
        .await
        .map_err(|err| PublishError::StorageTransient(err.into()))?;

    Ok(row.0)
}
