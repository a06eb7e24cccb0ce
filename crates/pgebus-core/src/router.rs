//! Router lookup (§4.5): an exact-match, depth-first, immutable table from
//! event type to an ordered list of handler descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::event::EventContext;

/// A user-supplied asynchronous function executed in response to a matching
/// event. Handlers are looked up by exact path and run sequentially in
/// registration order inside the (optional) shared transaction.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut EventContext<'_>, payload: &Value) -> anyhow::Result<()>;
}

/// One registered handler: its fully-qualified path, whether it requires a
/// shared transaction, and the callable itself.
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub path: String,
    pub transactional: bool,
    pub handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("path", &self.path)
            .field("transactional", &self.transactional)
            .finish()
    }
}

/// Frozen, read-only mapping from event type to ordered handlers.
///
/// Built via [`RouterBuilder`] and never mutated after `start()`.
#[derive(Debug, Default)]
pub struct Router {
    table: HashMap<String, Vec<HandlerDescriptor>>,
}

impl Router {
    /// Handlers registered for `event_type`, in depth-first registration
    /// order. Empty if nothing matched — the worker treats that as a
    /// successful no-op, not an error (§4.5).
    pub fn match_type(&self, event_type: &str) -> &[HandlerDescriptor] {
        self.table
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Builds a [`Router`] by composing prefixed sub-registries depth-first.
///
/// Registering the same exact path twice appends to the existing handler
/// list rather than replacing it, so multiple handlers can share one event
/// type and still run in registration order (see `DESIGN.md` for why this
/// reading of the source's ambiguous behavior was chosen).
#[derive(Default)]
pub struct RouterBuilder {
    prefix: String,
    entries: Vec<(String, HandlerDescriptor)>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler at `path` (joined to any enclosing `nest` prefix
    /// with `.`).
    pub fn on(mut self, path: impl Into<String>, transactional: bool, handler: impl Handler + 'static) -> Self {
        let full_path = self.qualify(path.into());
        self.entries.push((
            full_path.clone(),
            HandlerDescriptor {
                path: full_path,
                transactional,
                handler: Arc::new(handler),
            },
        ));
        self
    }

    /// Compose a sub-registry under `prefix`, joined with `.`. Entries
    /// registered inside `build` are appended depth-first, preserving
    /// registration order across the whole tree.
    pub fn nest(mut self, prefix: impl Into<String>, build: impl FnOnce(RouterBuilder) -> RouterBuilder) -> Self {
        let nested_prefix = self.qualify(prefix.into());
        let nested = build(RouterBuilder {
            prefix: nested_prefix,
            entries: Vec::new(),
        });
        self.entries.extend(nested.entries);
        self
    }

    fn qualify(&self, path: String) -> String {
        if self.prefix.is_empty() {
            path
        } else {
            format!("{}.{}", self.prefix, path)
        }
    }

    /// Freeze the tree into a [`Router`].
    pub fn build(self) -> Router {
        let mut table: HashMap<String, Vec<HandlerDescriptor>> = HashMap::new();
        for (path, descriptor) in self.entries {
            table.entry(path).or_default().push(descriptor);
        }
        Router { table }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingHandler {
        order: Arc<AtomicUsize>,
        slot: Arc<std::sync::Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl Handler for RecordingHandler {
        async fn call(&self, _ctx: &mut EventContext<'_>, _payload: &Value) -> anyhow::Result<()> {
            let n = self.order.fetch_add(1, Ordering::SeqCst);
            self.slot.lock().unwrap().push(n);
            Ok(())
        }
    }

    #[test]
    fn exact_match_only() {
        struct NoOp;
        #[async_trait]
        impl Handler for NoOp {
            async fn call(&self, _ctx: &mut EventContext<'_>, _payload: &Value) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let router = RouterBuilder::new().on("demo.hello", false, NoOp).build();
        assert_eq!(router.match_type("demo.hello").len(), 1);
        assert_eq!(router.match_type("demo.hell").len(), 0);
        assert_eq!(router.match_type("demo.hello.extra").len(), 0);
    }

    #[test]
    fn nesting_joins_with_dots_depth_first() {
        struct NoOp;
        #[async_trait]
        impl Handler for NoOp {
            async fn call(&self, _ctx: &mut EventContext<'_>, _payload: &Value) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let router = RouterBuilder::new()
            .nest("billing", |b| b.on("invoice.created", false, NoOp))
            .build();

        assert_eq!(router.match_type("billing.invoice.created").len(), 1);
        assert_eq!(router.match_type("invoice.created").len(), 0);
    }

    #[tokio::test]
    async fn duplicate_registration_appends_in_order() {
        let order = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let router = RouterBuilder::new()
            .on(
                "tx.evt",
                false,
                RecordingHandler {
                    order: order.clone(),
                    slot: seen.clone(),
                },
            )
            .on(
                "tx.evt",
                false,
                RecordingHandler {
                    order: order.clone(),
                    slot: seen.clone(),
                },
            )
            .build();

        let handlers = router.match_type("tx.evt");
        assert_eq!(handlers.len(), 2);

        let payload = Value::Null;
        for desc in handlers {
            // Handlers never see a real session in this unit test; only the
            // registration-order contract is under test here.
            let mut ctx = EventContext {
                event_id: 1,
                event_type: "tx.evt".to_string(),
                attempt: 1,
                session: None,
            };
            desc.handler.call(&mut ctx, &payload).await.unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
