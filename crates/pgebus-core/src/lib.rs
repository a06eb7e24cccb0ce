//! # pgebus-core
//!
//! The dispatcher subsystem of a durable, at-least-once, PostgreSQL-backed
//! event bus: the protocol by which many concurrent workers claim pending
//! events exactly once, run registered handlers under a scoped transaction
//! policy, and persist outcomes with bounded retries and exponential
//! backoff.
//!
//! ## Architecture
//!
//! ```text
//! Producer                         Listener ──┐
//!     │ insert_pending + commit                │ wake
//!     ▼                                        ▼
//! EventStore ◀──────────── claim_one ────── Worker × N ──▶ Router ──▶ Handler(s)
//!     ▲                                        │
//!     └──────────── mark_done / mark_failed ───┘
//!                                        ▲
//!                                     Poller (same wake, fixed interval)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Claim is exclusive** — row-level locking with a skip-locked
//!    discipline means two workers never see the same pending row.
//! 2. **At-least-once, not exactly-once** — a crash mid-handler returns the
//!    row to `pending` via stale-lock recovery; handlers must be idempotent.
//! 3. **One event, one optional transaction** — if any matched handler
//!    declares `transactional = true`, all handlers for that event share a
//!    single transaction; the dispatcher alone commits or rolls it back.
//! 4. **Signals are an optimization** — the poller alone is sufficient for
//!    correctness; NOTIFY only lowers latency.
//! 5. **Nothing inside a handler can take the dispatcher down** — failures
//!    are recorded on the row and in logs; only `Supervisor::start`/`stop`
//!    return errors to a caller.
//!
//! ## What This Is Not
//!
//! This crate is **not**:
//! - A general message broker or streaming platform
//! - A saga/workflow engine
//! - A multi-backend abstraction (the design relies on PostgreSQL's
//!   row-level locking and LISTEN/NOTIFY; see `pgebus-postgres`)
//!
//! This crate **is**:
//! > The claim/dispatch/retry protocol that turns durable rows into
//! > handler invocations, at least once.

mod backoff;
mod clock;
mod config;
mod error;
mod event;
mod listener;
mod notifier;
mod poller;
mod router;
mod store;
mod supervisor;
mod sweeper;
mod wake;
mod worker;

pub use backoff::BackoffPolicy;
pub use clock::{Clock, SystemClock};
pub use config::{Config, DatabaseConfig};
pub use error::{DispatchError, PublishError, StopOutcome};
pub use event::{ClaimedEvent, EventContext, EventId, EventStatus, HandlerSession, TransactionHandle};
pub use listener::Listener;
pub use notifier::{NoOpNotifier, Notifier};
pub use poller::Poller;
pub use router::{Handler, HandlerDescriptor, Router, RouterBuilder};
pub use store::EventStore;
pub use supervisor::{Supervisor, SupervisorBuilder};
pub use sweeper::StaleSweeper;
pub use wake::{WakeReceiver, WakeSignal};

pub use async_trait::async_trait;
