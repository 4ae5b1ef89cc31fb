//! Handler registry keyed by event kind.

use super::types::{EventHandler, EventKind, HandlerId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Registration {
    id: HandlerId,
    handler: Arc<dyn EventHandler>,
}

/// Outcome of removing one handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Removal {
    pub removed: bool,
    /// The kind has no handlers left.
    pub kind_now_empty: bool,
}

/// Handlers per kind, in registration order.
pub(crate) struct HandlerRegistry {
    handlers: RwLock<HashMap<EventKind, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler`. The flag is true when `kind` had no handlers before.
    pub(crate) fn insert(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> (HandlerId, bool) {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut handlers = self.handlers.write();
        let entry = handlers.entry(kind).or_default();
        let newly_active = entry.is_empty();
        entry.push(Registration { id, handler });
        (id, newly_active)
    }

    pub(crate) fn remove(&self, kind: EventKind, id: HandlerId) -> Removal {
        let mut handlers = self.handlers.write();
        let Some(entry) = handlers.get_mut(&kind) else {
            return Removal {
                removed: false,
                kind_now_empty: false,
            };
        };

        let before = entry.len();
        entry.retain(|r| r.id != id);
        let removed = entry.len() != before;
        let kind_now_empty = removed && entry.is_empty();
        if entry.is_empty() {
            handlers.remove(&kind);
        }
        Removal {
            removed,
            kind_now_empty,
        }
    }

    /// Drop every handler of `kind`, returning how many there were.
    pub(crate) fn remove_all(&self, kind: EventKind) -> usize {
        self.handlers
            .write()
            .remove(&kind)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Snapshot of the handlers for `kind`, in registration order.
    pub(crate) fn handlers_for(&self, kind: EventKind) -> Vec<(HandlerId, Arc<dyn EventHandler>)> {
        self.handlers
            .read()
            .get(&kind)
            .map(|entry| {
                entry
                    .iter()
                    .map(|r| (r.id, Arc::clone(&r.handler)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn has_handlers(&self, kind: EventKind) -> bool {
        self.handlers
            .read()
            .get(&kind)
            .is_some_and(|entry| !entry.is_empty())
    }

    /// Kinds with at least one handler.
    pub(crate) fn active_kinds(&self) -> Vec<EventKind> {
        let handlers = self.handlers.read();
        EventKind::ALL
            .into_iter()
            .filter(|kind| handlers.get(kind).is_some_and(|entry| !entry.is_empty()))
            .collect()
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handler_count() == 0
    }

    pub(crate) fn clear(&self) {
        self.handlers.write().clear();
    }
}
