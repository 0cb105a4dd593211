//! Single owner of coordination event handlers
//!
//! Registration and firing go through one dispatcher so a handler list is
//! never mutated while it is being walked.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::backend::{CoordinationEvent, EventKind};

/// Receiver of coordination events, run to completion on the dispatch task
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &CoordinationEvent);
}

/// Handle returned by a watch registration, used to unwatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

struct Registration {
    id: WatchId,
    group: String,
    kind: EventKind,
    handler: Arc<dyn EventHandler>,
}

/// Handler registry keyed by (group, event kind)
#[derive(Default)]
pub struct Dispatcher {
    next_id: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; the flag is true when it is the first for its key.
    pub fn register(&self, group: &str, kind: EventKind, handler: Arc<dyn EventHandler>) -> (WatchId, bool) {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registrations = self.registrations.write();
        let first = !registrations
            .iter()
            .any(|r| r.group == group && r.kind == kind);
        registrations.push(Registration {
            id,
            group: group.to_string(),
            kind,
            handler,
        });
        (id, first)
    }

    /// Remove a handler; returns its key and whether it was the last one.
    pub fn unregister(&self, id: WatchId) -> Option<(String, EventKind, bool)> {
        let mut registrations = self.registrations.write();
        let index = registrations.iter().position(|r| r.id == id)?;
        let removed = registrations.remove(index);
        let last = !registrations
            .iter()
            .any(|r| r.group == removed.group && r.kind == removed.kind);
        Some((removed.group, removed.kind, last))
    }

    /// Number of handlers registered for a key
    pub fn handler_count(&self, group: &str, kind: EventKind) -> usize {
        self.registrations
            .read()
            .iter()
            .filter(|r| r.group == group && r.kind == kind)
            .count()
    }

    /// Invoke every matching handler in registration order.
    pub async fn dispatch(&self, event: &CoordinationEvent) -> usize {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.group == event.group() && r.kind == event.kind())
            .map(|r| r.handler.clone())
            .collect();

        debug!(?event, handlers = handlers.len(), "dispatching coordination event");
        for handler in &handlers {
            handler.handle(event).await;
        }
        handlers.len()
    }
}
