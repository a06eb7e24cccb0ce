use std::time::Duration;

use async_trait::async_trait;
use pgebus_core::{Listener, WakeSignal};
use sqlx::postgres::PgListener as SqlxPgListener;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Owns one dedicated `sqlx::postgres::PgListener` connection subscribed to
/// the configured channel (§4.3). Reconnects with a bounded backoff on any
/// connection failure; never reads or writes the `events` table.
pub struct PgListener {
    pool: PgPool,
    channel: String,
    reconnect_backoff: Duration,
}

impl PgListener {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
            reconnect_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }
}

#[async_trait]
impl Listener for PgListener {
    async fn run(&self, wake: WakeSignal, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let mut listener = match SqlxPgListener::connect_with(&self.pool).await {
                Ok(listener) => listener,
                Err(err) => {
                    warn!(error = %err, "listener connect failed, retrying");
                    tokio::time::sleep(self.reconnect_backoff).await;
                    continue;
                }
            };

            if let Err(err) = listener.listen(&self.channel).await {
                warn!(error = %err, "listener subscribe failed, reconnecting");
                tokio::time::sleep(self.reconnect_backoff).await;
                continue;
            }

            loop {
                tokio::select! {
                    notification = listener.try_recv() => {
                        match notification {
                            Ok(Some(_)) => wake.wake(),
                            Ok(None) => {}
                            Err(err) => {
                                warn!(error = %err, "listener connection dropped, reconnecting");
                                break;
                            }
                        }
                    }
                    _ = shutdown.cancelled() => return,
                }
            }

            tokio::time::sleep(self.reconnect_backoff).await;
        }
    }
}
