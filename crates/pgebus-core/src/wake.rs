//! The in-process wake signal shared by the Listener, the Poller, and every
//! Worker (§4.3/§4.4). Multiple rapid signals coalesce into a single wake,
//! mirroring the `tokio::sync::watch` pattern the wider corpus uses for a
//! Postgres LISTEN/NOTIFY bridge: a worker that is mid-drain when three
//! signals arrive only sees one pending wake the next time it checks.

use tokio::sync::watch;

/// Sender half, held by the Listener, the Poller, and `publish_event`-style
/// callers who want to wake workers immediately after an insert.
#[derive(Clone)]
pub struct WakeSignal {
    tx: watch::Sender<u64>,
}

impl WakeSignal {
    /// Create a new wake signal and its first receiver. Clone the receiver
    /// once per worker.
    pub fn channel() -> (WakeSignal, WakeReceiver) {
        let (tx, rx) = watch::channel(0);
        (WakeSignal { tx }, WakeReceiver { rx })
    }

    /// Wake everyone currently waiting (or about to wait) on a receiver.
    pub fn wake(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

/// Receiver half. Cheap to clone; each worker should hold its own.
#[derive(Clone)]
pub struct WakeReceiver {
    rx: watch::Receiver<u64>,
}

impl WakeReceiver {
    /// Wait until the generation counter changes from what this receiver
    /// last observed.
    pub async fn woken(&mut self) {
        // A closed sender (all producers dropped) should not spin the
        // worker loop; treat it the same as "no more wakes are coming" by
        // never resolving again once the channel is gone.
        let _ = self.rx.changed().await;
    }
}
