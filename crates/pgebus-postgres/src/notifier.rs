use async_trait::async_trait;
use pgebus_core::{DispatchError, Notifier};
use sqlx::PgPool;

/// Sends a best-effort `pg_notify` on the configured channel after a
/// successful insert or reschedule (§4.2). A failed notify never blocks the
/// caller's commit; the poller is always sufficient on its own.
pub struct PgNotifier {
    pool: PgPool,
    channel: String,
}

impl PgNotifier {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl Notifier for PgNotifier {
    async fn notify(&self) -> Result<(), DispatchError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind("")
            .execute(&self.pool)
            .await
            .map_err(|err| DispatchError::StorageTransient(err.into()))?;
        Ok(())
    }
}
