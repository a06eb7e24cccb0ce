use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgebus_core::{
    ClaimedEvent, DispatchError, EventId, EventStore, PublishError, TransactionHandle,
};
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::session::PgTransactionHandle;

/// PostgreSQL-backed `EventStore`, using `FOR UPDATE SKIP LOCKED` for
/// exclusive claims (§4.1).
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    schema: String,
}

impl PgEventStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn table(&self) -> String {
        format!("{}.events", self.schema)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn ensure_schema(&self) -> Result<(), DispatchError> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema))
            .execute(&self.pool)
            .await
            .map_err(|err| DispatchError::StorageFatal(err.into()))?;
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
        let run_at = run_at.unwrap_or_else(Utc::now);

        let row: (EventId,) = sqlx::query_as(&format!(
            "INSERT INTO {} (event_type, payload, run_at, max_attempts) VALUES ($1, $2, $3, $4) RETURNING id",
            self.table()
        ))
        .bind(event_type)
        .bind(&payload)
        .bind(run_at)
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| PublishError::StorageTransient(err.into()))?;

        Ok(row.0)
    }

    async fn claim_one(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedEvent>, DispatchError> {
        let row = sqlx::query(&format!(
            r#"
            WITH claimable AS (
                SELECT id
                FROM {table}
                WHERE status = 'pending' AND run_at <= $1
                ORDER BY run_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE {table}
            SET status = 'running',
                attempts = attempts + 1,
                locked_at = $1,
                locked_by = $2,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM claimable)
            RETURNING id, event_type, payload, attempts, max_attempts
            "#,
            table = self.table()
        ))
        .bind(now)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| DispatchError::StorageTransient(err.into()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ClaimedEvent {
            id: row.get("id"),
            event_type: row.get("event_type"),
            payload: row.get("payload"),
            attempt: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
        }))
    }

    async fn mark_done(&self, id: EventId) -> Result<(), DispatchError> {
        sqlx::query(&format!(
            "UPDATE {} SET status = 'done', locked_at = NULL, locked_by = NULL, updated_at = NOW() WHERE id = $1 AND status = 'running'",
            self.table()
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|err| DispatchError::StorageTransient(err.into()))?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: EventId,
        error: &str,
        now: DateTime<Utc>,
        backoff: Duration,
    ) -> Result<(), DispatchError> {
        let run_at = now
            + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::seconds(0));

        sqlx::query(&format!(
            r#"
            UPDATE {table}
            SET status = CASE WHEN attempts >= max_attempts THEN 'dead' ELSE 'pending' END,
                run_at = CASE WHEN attempts >= max_attempts THEN run_at ELSE $2 END,
                last_error = $3,
                locked_at = NULL,
                locked_by = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
            table = self.table()
        ))
        .bind(id)
        .bind(run_at)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|err| DispatchError::StorageTransient(err.into()))?;

        Ok(())
    }

    async fn recover_stale(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<u64, DispatchError> {
        let threshold = now
            - chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);

        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET status = 'pending',
                locked_at = NULL,
                locked_by = NULL,
                last_error = 'stale lock recovered',
                updated_at = NOW()
            WHERE status = 'running' AND locked_at < $1
            "#,
            self.table()
        ))
        .bind(threshold)
        .execute(&self.pool)
        .await
        .map_err(|err| DispatchError::StorageTransient(err.into()))?;

        Ok(result.rows_affected())
    }

    async fn begin_session(&self) -> Result<Box<dyn TransactionHandle>, DispatchError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| DispatchError::StorageTransient(err.into()))?;
        Ok(Box::new(PgTransactionHandle::new(tx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> PgPool {
        let url = std::env::var("PGEBUS_TEST_DATABASE_URL")
            .expect("set PGEBUS_TEST_DATABASE_URL to run postgres-backed tests");
        PgPool::connect(&url).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a live PostgreSQL instance; set PGEBUS_TEST_DATABASE_URL"]
    async fn claim_one_locks_out_concurrent_claimants() {
        let pool = test_pool().await;
        let store = PgEventStore::new(pool, "pgebus_test");
        store.ensure_schema().await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pgebus_test.events (
                id BIGSERIAL PRIMARY KEY,
                event_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 5,
                last_error TEXT,
                locked_at TIMESTAMPTZ,
                locked_by TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(store.pool())
        .await
        .unwrap();

        let now = Utc::now();
        store
            .insert_pending("demo.hello", serde_json::json!({}), None, 5)
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            store.claim_one("worker-a", now),
            store.claim_one("worker-b", now)
        );
        let winners = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(Option::is_some)
            .count();
        assert_eq!(winners, 1);
    }
}
