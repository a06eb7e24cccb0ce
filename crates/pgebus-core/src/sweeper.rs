//! The stale-lock sweep (§4.1, §8's restart-safety law): a timer that
//! periodically reclaims `running` rows whose lock has outlived
//! `stale_after`, independent of any worker crash being observed directly.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::store::EventStore;

/// Periodic call to [`EventStore::recover_stale`]. Runs alongside the
/// poller; a worker that crashes mid-handler leaves its row `running`
/// forever without this.
pub struct StaleSweeper<S: EventStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    stale_after: Duration,
}

impl<S: EventStore + ?Sized + 'static> StaleSweeper<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            interval,
            stale_after,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.store.recover_stale(self.clock.now(), self.stale_after).await {
                        Ok(0) => {}
                        Ok(recovered) => debug!(recovered, "stale lock sweep recovered rows"),
                        Err(err) => warn!(error = %err, "stale lock sweep failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    debug!("stale lock sweeper shutting down");
                    return;
                }
            }
        }
    }
}

