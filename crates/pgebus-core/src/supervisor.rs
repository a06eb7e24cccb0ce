//! The Lifecycle Supervisor (§4.7): `start()` / `stop(wait_for_completion,
//! timeout)` orchestration.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{DispatchError, StopOutcome};
use crate::listener::Listener;
use crate::notifier::{NoOpNotifier, Notifier};
use crate::poller::Poller;
use crate::router::Router;
use crate::store::EventStore;
use crate::sweeper::StaleSweeper;
use crate::wake::WakeSignal;
use crate::worker::Worker;

/// Assembles the Event Store, Router, Notifier, and an optional Listener
/// into a running dispatcher.
pub struct SupervisorBuilder<S: EventStore + ?Sized> {
    store: Arc<S>,
    router: Router,
    notifier: Arc<dyn Notifier>,
    listener: Option<Arc<dyn Listener>>,
    config: Config,
    clock: Arc<dyn Clock>,
}

impl<S: EventStore + ?Sized> SupervisorBuilder<S> {
    pub fn new(store: Arc<S>, router: Router) -> Self {
        Self {
            store,
            router,
            notifier: Arc::new(NoOpNotifier),
            listener: None,
            config: Config::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Supervisor<S> {
        Supervisor {
            store: self.store,
            router: Arc::new(self.router),
            notifier: self.notifier,
            listener: self.listener,
            config: self.config,
            clock: self.clock,
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }
}

/// A started (or startable) dispatcher. `start()` ensures the schema exists,
/// freezes the router, and launches the listener, poller, and worker pool.
/// `stop()` drains cooperatively and closes the listener last.
pub struct Supervisor<S: EventStore + ?Sized> {
    store: Arc<S>,
    router: Arc<Router>,
    notifier: Arc<dyn Notifier>,
    listener: Option<Arc<dyn Listener>>,
    config: Config,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl<S: EventStore + ?Sized + 'static> Supervisor<S> {
    pub fn builder(store: Arc<S>, router: Router) -> SupervisorBuilder<S> {
        SupervisorBuilder::new(store, router)
    }

    /// Ensure the schema exists, then launch the listener (if any), the
    /// poller, and `n_workers` worker tasks. Does not create tables.
    pub async fn start(&mut self) -> Result<(), DispatchError> {
        self.store.ensure_schema().await?;

        let (wake_signal, template_rx) = WakeSignal::channel();

        if let Some(listener) = &self.listener {
            let listener = listener.clone();
            let wake = wake_signal.clone();
            let shutdown = self.shutdown.clone();
            self.handles
                .push(tokio::spawn(async move { listener.run(wake, shutdown).await }));
        }

        let poller = Poller::new(self.config.poll_interval(), wake_signal.clone());
        let poller_shutdown = self.shutdown.clone();
        self.handles
            .push(tokio::spawn(poller.run(poller_shutdown)));

        let sweeper = StaleSweeper::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.poll_interval(),
            self.config.stale_after(),
        );
        let sweeper_shutdown = self.shutdown.clone();
        self.handles
            .push(tokio::spawn(sweeper.run(sweeper_shutdown)));

        for index in 0..self.config.n_workers {
            let worker = Worker {
                id: format!("worker-{index}"),
                store: self.store.clone(),
                router: self.router.clone(),
                notifier: self.notifier.clone(),
                backoff: self.config.backoff_policy(),
                clock: self.clock.clone(),
                wake: template_rx.clone(),
                shutdown: self.shutdown.clone(),
            };
            self.handles.push(tokio::spawn(worker.run()));
        }

        info!(n_workers = self.config.n_workers, "supervisor started");
        Ok(())
    }

    /// Signal shutdown. If `wait_for_completion`, wait up to `timeout` for
    /// in-flight events to finish before abandoning any stragglers (they
    /// become reclaimable via stale-lock recovery). Otherwise cancel
    /// cooperatively and return immediately.
    pub async fn stop(&mut self, wait_for_completion: bool, timeout: Duration) -> StopOutcome {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut self.handles);

        if !wait_for_completion {
            for handle in handles {
                handle.abort();
            }
            info!("supervisor stopped without waiting for in-flight events");
            return StopOutcome::Clean;
        }

        let join_all = futures_join_all(handles);
        match tokio::time::timeout(timeout, join_all).await {
            Ok(()) => {
                info!("supervisor stopped cleanly");
                StopOutcome::Clean
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "shutdown timed out with work in flight; abandoning remaining tasks for stale-lock recovery"
                );
                StopOutcome::TimedOut
            }
        }
    }
}

/// Join a set of handles without depending on the `futures` crate for one
/// call site.
async fn futures_join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}
