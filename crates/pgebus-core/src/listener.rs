//! The Listener collaborator contract (§4.3).
//!
//! The core crate only describes the obligation: own a dedicated
//! subscription, translate incoming signals into wakes, and reconnect on
//! failure without ever touching the `events` table. The concrete
//! implementation (a dedicated `sqlx::postgres::PgListener` connection) lives
//! in `pgebus-postgres`, since LISTEN/NOTIFY is Postgres-specific.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::wake::WakeSignal;

#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Run until `shutdown` is cancelled, calling `wake.wake()` for every
    /// signal observed. Implementations must never return early on a
    /// transient connection failure — reconnect with a bounded backoff
    /// instead, per §4.3.
    async fn run(&self, wake: WakeSignal, shutdown: CancellationToken);
}
