//! End-to-end exercises of the claim/dispatch/retry protocol (§8's concrete
//! scenarios) against `pgebus-testing`'s in-memory store and fake clock, with
//! no real Postgres instance involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pgebus_testing::{FakeClock, InMemoryEventStore};
use serde_json::{json, Value};

use pgebus_core::Config;
use pgebus_core::{EventContext, EventStatus};
use pgebus_core::{Handler, RouterBuilder};
use pgebus_core::Supervisor;
use pgebus_core::EventStore;

struct RecordingHandler {
    payloads: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn call(&self, _ctx: &mut EventContext<'_>, payload: &Value) -> anyhow::Result<()> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

struct AlwaysFailHandler {
    message: &'static str,
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for AlwaysFailHandler {
    async fn call(&self, _ctx: &mut EventContext<'_>, _payload: &Value) -> anyhow::Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!(self.message))
    }
}

/// Scenario 1: happy path. A single worker dispatches a matching event
/// exactly once and the row ends `done`.
#[tokio::test]
async fn happy_path_dispatches_once_and_marks_done() {
    let store = Arc::new(InMemoryEventStore::new());
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let router = RouterBuilder::new()
        .on(
            "demo.hello",
            false,
            RecordingHandler {
                payloads: payloads.clone(),
            },
        )
        .build();

    let mut supervisor = Supervisor::builder(store.clone(), router)
        .with_config(Config {
            n_workers: 1,
            poll_interval_seconds: 0.01,
            ..Config::default()
        })
        .build();
    supervisor.start().await.unwrap();

    store
        .insert_pending("demo.hello", json!({"msg": "hi"}), None, 5)
        .await
        .unwrap();

    wait_until(Duration::from_secs(2), || {
        store
            .snapshot_statuses()
            .iter()
            .all(|(_, _, status)| *status == EventStatus::Done)
    })
    .await;

    supervisor
        .stop(true, Duration::from_secs(1))
        .await;

    assert_eq!(*payloads.lock().unwrap(), vec![json!({"msg": "hi"})]);
    let statuses = store.snapshot_statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].2, EventStatus::Done);
}

/// Scenario 2: retry then dead-letter. A handler that always fails exhausts
/// `max_attempts` and the row ends `dead`.
#[tokio::test(start_paused = true)]
async fn exhausting_retries_dead_letters_the_row() {
    let store = Arc::new(InMemoryEventStore::new());
    let clock = Arc::new(FakeClock::new(Utc::now()));
    let invocations = Arc::new(AtomicUsize::new(0));
    let router = RouterBuilder::new()
        .on(
            "flaky",
            false,
            AlwaysFailHandler {
                message: "boom",
                invocations: invocations.clone(),
            },
        )
        .build();

    let mut supervisor = Supervisor::builder(store.clone(), router)
        .with_clock(clock.clone())
        .with_config(Config {
            n_workers: 1,
            poll_interval_seconds: 0.05,
            backoff_base_seconds: 1,
            backoff_cap_seconds: 10,
            max_attempts: 3,
            ..Config::default()
        })
        .build();
    supervisor.start().await.unwrap();

    store
        .insert_pending("flaky", json!({}), None, 3)
        .await
        .unwrap();

    for _ in 0..40 {
        tokio::time::advance(Duration::from_millis(500)).await;
        clock.advance(Duration::from_millis(500));
        tokio::task::yield_now().await;
        if invocations.load(Ordering::SeqCst) >= 3 {
            break;
        }
    }

    supervisor.stop(false, Duration::from_millis(10)).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    let statuses = store.snapshot_statuses();
    assert_eq!(statuses[0].2, EventStatus::Dead);
}

/// Scenario 3: delayed execution. An event with a future `run_at` is not
/// claimed before that time, even with signals arriving continuously.
#[tokio::test]
async fn delayed_event_is_not_claimed_before_run_at() {
    let store = InMemoryEventStore::new();
    let now = Utc::now();
    store
        .insert_pending("demo.hello", json!({}), Some(now + chrono::Duration::seconds(5)), 5)
        .await
        .unwrap();

    assert!(store.claim_one("worker-1", now).await.unwrap().is_none());
    assert!(store
        .claim_one("worker-1", now + chrono::Duration::seconds(4))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .claim_one("worker-1", now + chrono::Duration::seconds(5))
        .await
        .unwrap()
        .is_some());
}

/// Scenario 4: concurrent claim exclusivity. Five concurrent claimants
/// against one pending row only ever see one winner.
#[tokio::test]
async fn concurrent_claims_against_one_row_have_exactly_one_winner() {
    let store = Arc::new(InMemoryEventStore::new());
    store
        .insert_pending("demo.hello", json!({}), None, 5)
        .await
        .unwrap();
    let now = Utc::now();

    let mut handles = Vec::new();
    for i in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim_one(&format!("worker-{i}"), now).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
}

/// Scenario 5: transactional grouping. Both handlers for one event share a
/// single non-null session; a failure in the second handler rolls the whole
/// dispatch back and the event is retried.
#[tokio::test]
async fn transactional_handlers_share_one_session_and_roll_back_together() {
    struct AssertTransactional {
        saw_session: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for AssertTransactional {
        async fn call(&self, ctx: &mut EventContext<'_>, _payload: &Value) -> anyhow::Result<()> {
            if ctx.is_transactional() {
                self.saw_session.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    let saw_session = Arc::new(AtomicUsize::new(0));
    let router = RouterBuilder::new()
        .on(
            "tx.evt",
            true,
            AssertTransactional {
                saw_session: saw_session.clone(),
            },
        )
        .on(
            "tx.evt",
            false,
            AlwaysFailHandler {
                message: "second handler always fails",
                invocations: Arc::new(AtomicUsize::new(0)),
            },
        )
        .build();

    let store = Arc::new(InMemoryEventStore::new());
    let mut supervisor = Supervisor::builder(store.clone(), router)
        .with_config(Config {
            n_workers: 1,
            poll_interval_seconds: 0.01,
            ..Config::default()
        })
        .build();
    supervisor.start().await.unwrap();

    store
        .insert_pending("tx.evt", json!({}), None, 5)
        .await
        .unwrap();

    wait_until(Duration::from_secs(2), || {
        saw_session.load(Ordering::SeqCst) >= 1
    })
    .await;
    wait_until(Duration::from_secs(2), || {
        store
            .snapshot_statuses()
            .iter()
            .any(|(_, _, status)| *status == EventStatus::Pending)
    })
    .await;

    supervisor.stop(false, Duration::from_millis(10)).await;

    assert_eq!(saw_session.load(Ordering::SeqCst), 1);
    let statuses = store.snapshot_statuses();
    assert_eq!(statuses[0].2, EventStatus::Pending);
}

/// Scenario 6: signal loss tolerance. With no listener wired up at all, the
/// poller alone dispatches the event within roughly one poll interval.
#[tokio::test]
async fn poller_alone_dispatches_without_a_listener() {
    let store = Arc::new(InMemoryEventStore::new());
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let router = RouterBuilder::new()
        .on(
            "demo.hello",
            false,
            RecordingHandler {
                payloads: payloads.clone(),
            },
        )
        .build();

    let mut supervisor = Supervisor::builder(store.clone(), router)
        .with_config(Config {
            n_workers: 1,
            poll_interval_seconds: 0.05,
            ..Config::default()
        })
        .build();
    supervisor.start().await.unwrap();

    store
        .insert_pending("demo.hello", json!({}), None, 5)
        .await
        .unwrap();

    wait_until(Duration::from_millis(500), || !payloads.lock().unwrap().is_empty()).await;

    supervisor.stop(false, Duration::from_millis(10)).await;

    assert_eq!(payloads.lock().unwrap().len(), 1);
}

async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(predicate(), "condition was not met within {timeout:?}");
}
