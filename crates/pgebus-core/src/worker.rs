//! The Worker loop (§4.6): wait-for-wake → attempt-claim → dispatch-handlers
//! → record-outcome, drained to empty before parking.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::backoff::BackoffPolicy;
use crate::clock::Clock;
use crate::error::truncate_error;
use crate::event::{EventContext, HandlerSession};
use crate::notifier::Notifier;
use crate::router::Router;
use crate::store::EventStore;
use crate::wake::WakeReceiver;

/// One cooperative worker in the pool. Workers share a store, a router, a
/// notifier, and a wake signal, but each has a distinct, stable id recorded
/// on every row it claims.
pub struct Worker<S: EventStore + ?Sized> {
    pub id: String,
    pub store: Arc<S>,
    pub router: Arc<Router>,
    pub notifier: Arc<dyn Notifier>,
    pub backoff: BackoffPolicy,
    pub clock: Arc<dyn Clock>,
    pub wake: WakeReceiver,
    pub shutdown: CancellationToken,
}

impl<S: EventStore + ?Sized> Worker<S> {
    /// Drain the queue, then wait for a wake or shutdown, repeating until
    /// shutdown is requested. Step 7 of §4.6: after any successful
    /// claim-and-dispatch, another claim is attempted immediately.
    pub async fn run(mut self) {
        info!(worker_id = %self.id, "worker starting");
        loop {
            self.drain().await;
            if self.shutdown.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = self.wake.woken() => {}
                _ = self.shutdown.cancelled() => break,
            }
        }
        info!(worker_id = %self.id, "worker stopped");
    }

    async fn drain(&mut self) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            match self.store.claim_one(&self.id, self.clock.now()).await {
                Ok(Some(claimed)) => self.dispatch(claimed).await,
                Ok(None) => {
                    debug!(worker_id = %self.id, "claim_one returned none, parking");
                    return;
                }
                Err(err) => {
                    warn!(worker_id = %self.id, error = %err, "claim_one failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, claimed: crate::event::ClaimedEvent) {
        let span = info_span!(
            "dispatch",
            event_id = claimed.id,
            event_type = %claimed.event_type,
            attempt = claimed.attempt,
        );
        self.dispatch_inner(claimed).instrument(span).await
    }

    async fn dispatch_inner(&self, claimed: crate::event::ClaimedEvent) {
        let handlers = self.router.match_type(&claimed.event_type);

        if handlers.is_empty() {
            // Empty-match policy (§4.5): a stray event type is a successful
            // no-op, not an error, so it never accumulates as a dead row.
            info!("no handlers registered for this event type, marking done");
            if let Err(err) = self.store.mark_done(claimed.id).await {
                error!(error = %err, "failed to mark an empty-match event done; leaving for stale recovery");
            }
            return;
        }

        let transactional = handlers.iter().any(|h| h.transactional);
        let mut session_handle = if transactional {
            match self.store.begin_session().await {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!(error = %err, "could not open a transactional session; leaving claim for stale recovery");
                    return;
                }
            }
        } else {
            None
        };

        let mut ctx = EventContext {
            event_id: claimed.id,
            event_type: claimed.event_type.clone(),
            attempt: claimed.attempt,
            session: session_handle
                .as_deref_mut()
                .map(|handle| HandlerSession::new(handle)),
        };

        let mut failure = None;
        for descriptor in handlers {
            if let Err(err) = descriptor.handler.call(&mut ctx, &claimed.payload).await {
                failure = Some(err);
                break;
            }
        }
        // Drop ctx (and its borrow of session_handle) before the worker
        // reclaims commit/rollback authority over the session.
        drop(ctx);

        match failure {
            None => {
                if let Some(session) = session_handle {
                    if let Err(err) = session.commit().await {
                        error!(error = %err, "commit failed after successful handlers; leaving for stale recovery");
                        return;
                    }
                }
                if let Err(err) = self.store.mark_done(claimed.id).await {
                    error!(error = %err, "mark_done failed; relying on stale-lock recovery");
                }
                info!("event completed");
            }
            Some(err) => {
                if let Some(session) = session_handle {
                    if let Err(rollback_err) = session.rollback().await {
                        warn!(error = %rollback_err, "rollback itself failed");
                    }
                }
                let backoff = self.backoff.delay_for_attempt(claimed.attempt);
                let message = truncate_error(&err);
                warn!(attempt = claimed.attempt, error = %message, "handler failed, scheduling retry");
                match self
                    .store
                    .mark_failed(claimed.id, &message, self.clock.now(), backoff)
                    .await
                {
                    Ok(()) => {
                        // §4.2: the notifier is also invoked after a handler
                        // reschedules, not only after a fresh insert.
                        if let Err(notify_err) = self.notifier.notify().await {
                            debug!(error = %notify_err, "best-effort notify after reschedule failed");
                        }
                    }
                    Err(store_err) => {
                        error!(error = %store_err, "mark_failed failed; relying on stale-lock recovery");
                    }
                }
            }
        }
    }
}
