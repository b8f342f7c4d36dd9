//! Live subscription routing.
//!
//! Maps server-assigned subscription ids to caller-supplied handlers.
//! Handlers are registered as a side effect of a successful `live` reply
//! and removed on a successful `kill` reply or when the connection
//! closes. The receive loop dispatches push events here.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::identifiers::SubscriptionId;
use crate::protocol::Notification;

// ============================================================================
// Types
// ============================================================================

/// Handler invoked for each push event of one subscription.
///
/// Runs on the connection's receive-loop task; a slow handler delays
/// delivery of subsequent replies and events on that connection, so keep
/// it fast and non-blocking.
pub type LiveHandler = Arc<dyn Fn(Notification) + Send + Sync>;

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Thread-safe map of active live subscriptions.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    /// Registered handlers, keyed by server-assigned subscription id.
    handlers: Mutex<FxHashMap<SubscriptionId, LiveHandler>>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("handlers_len", &self.handlers.lock().len())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `id`, replacing any previous handler.
    pub(crate) fn put(&self, id: SubscriptionId, handler: LiveHandler) {
        debug!(%id, "subscription registered");
        self.handlers.lock().insert(id, handler);
    }

    /// Removes the handler for `id`.
    pub(crate) fn remove(&self, id: &SubscriptionId) {
        if self.handlers.lock().remove(id).is_some() {
            debug!(%id, "subscription removed");
        }
    }

    /// Removes every handler. Called on connection close.
    pub(crate) fn clear(&self) {
        let count = {
            let mut handlers = self.handlers.lock();
            let count = handlers.len();
            handlers.clear();
            count
        };

        if count > 0 {
            debug!(count, "cleared subscriptions on close");
        }
    }

    /// Routes a push event to its handler.
    ///
    /// The handler is cloned out of the map and invoked without holding
    /// the lock. An event for an unregistered id is dropped with a
    /// diagnostic, never delivered to an unrelated handler.
    pub(crate) fn dispatch(&self, notification: Notification) {
        let handler = self.handlers.lock().get(&notification.id).cloned();

        match handler {
            Some(handler) => {
                trace!(id = %notification.id, action = %notification.action, "push event dispatched");
                handler(notification);
            }
            None => {
                warn!(id = %notification.id, "push event for unknown subscription, dropping");
            }
        }
    }

    /// Returns the number of registered subscriptions.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.handlers.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::protocol::Action;

    fn notification(id: &str) -> Notification {
        Notification {
            id: SubscriptionId::new(id),
            action: Action::Create,
            data: json!({"value": 1}),
        }
    }

    fn counting_handler() -> (LiveHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handler: LiveHandler = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    #[test]
    fn test_dispatch_invokes_registered_handler() {
        let registry = SubscriptionRegistry::new();
        let (handler, count) = counting_handler();

        registry.put(SubscriptionId::new("sub-1"), handler);
        registry.dispatch(notification("sub-1"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_unknown_id_is_dropped() {
        let registry = SubscriptionRegistry::new();
        let (handler, count) = counting_handler();
        registry.put(SubscriptionId::new("sub-1"), handler);

        // Must neither panic nor reach the unrelated handler.
        registry.dispatch(notification("sub-2"));

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_stops_delivery() {
        let registry = SubscriptionRegistry::new();
        let (handler, count) = counting_handler();
        let id = SubscriptionId::new("sub-1");

        registry.put(id.clone(), handler);
        registry.dispatch(notification("sub-1"));
        registry.remove(&id);
        registry.dispatch(notification("sub-1"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_clear_removes_everything() {
        let registry = SubscriptionRegistry::new();
        for n in 0..3 {
            let (handler, _) = counting_handler();
            registry.put(SubscriptionId::new(format!("sub-{n}")), handler);
        }

        assert_eq!(registry.len(), 3);
        registry.clear();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_put_replaces_existing_handler() {
        let registry = SubscriptionRegistry::new();
        let (first, first_count) = counting_handler();
        let (second, second_count) = counting_handler();
        let id = SubscriptionId::new("sub-1");

        registry.put(id.clone(), first);
        registry.put(id, second);
        registry.dispatch(notification("sub-1"));

        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }
}
