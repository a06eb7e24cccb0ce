//! The Poller (§4.4): a timer that emits the same wake event as the
//! Listener, so no push notification is ever required for correctness.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::wake::WakeSignal;

/// Periodic liveness tick. Wakes workers every `poll_interval` so that
/// delayed events (`run_at` passing with no producer active) and missed
/// NOTIFY signals are both recovered.
pub struct Poller {
    poll_interval: Duration,
    wake: WakeSignal,
}

impl Poller {
    pub fn new(poll_interval: Duration, wake: WakeSignal) -> Self {
        Self {
            poll_interval,
            wake,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("poll tick, waking workers");
                    self.wake.wake();
                }
                _ = shutdown.cancelled() => {
                    debug!("poller shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_wake_workers_at_the_configured_interval() {
        let (signal, mut rx) = crate::wake::WakeSignal::channel();
        let shutdown = CancellationToken::new();
        let poller = Poller::new(Duration::from_millis(10), signal);

        let shutdown_clone = shutdown.clone();
        let handle = tokio::spawn(poller.run(shutdown_clone));

        tokio::time::advance(Duration::from_millis(15)).await;
        tokio::time::timeout(Duration::from_millis(50), rx.woken())
            .await
            .expect("poller should have woken workers");

        shutdown.cancel();
        let _ = handle.await;
    }
}
