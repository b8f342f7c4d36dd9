//! Request/reply correlation.
//!
//! Bridges the asynchronous reply stream to per-call awaiters. A slot is
//! reserved for every request id strictly before the request frame is
//! transmitted, so a reply can never arrive before its slot exists. The
//! receive loop delivers into the slot; the caller awaits the paired
//! receiver with its own timeout.
//!
//! Replies may arrive in any order relative to request issuance; only id
//! matching decides which caller is woken.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::Reply;

// ============================================================================
// Types
// ============================================================================

/// Map of outstanding request ids to reply slots.
type SlotMap = FxHashMap<RequestId, oneshot::Sender<Result<Reply>>>;

// ============================================================================
// Correlator
// ============================================================================

/// Thread-safe store of outstanding requests.
///
/// Shared between the receive loop and every caller of the connection.
/// Each slot is consumed exactly once: by delivery, by the caller's
/// timeout cleanup, or by [`fail_all`](Self::fail_all) on close.
#[derive(Debug, Default)]
pub(crate) struct Correlator {
    /// Outstanding slots, keyed by request id.
    slots: Mutex<SlotMap>,
}

impl Correlator {
    /// Creates an empty correlator.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot for `id` and returns the receiver its reply will
    /// arrive on.
    ///
    /// Must be called before the request frame is transmitted.
    pub(crate) fn register(&self, id: RequestId) -> oneshot::Receiver<Result<Reply>> {
        let (tx, rx) = oneshot::channel();
        let previous = self.slots.lock().insert(id, tx);

        // Ids are UUID v4; a collision here means an id was reused while
        // still outstanding.
        if previous.is_some() {
            warn!(%id, "request id collided with an outstanding slot");
        }

        rx
    }

    /// Delivers an outcome into the slot for `id` and wakes its waiter.
    ///
    /// Called only from the receive loop. An unknown id is a protocol
    /// anomaly: logged and ignored, never fatal.
    pub(crate) fn deliver(&self, id: RequestId, outcome: Result<Reply>) {
        let slot = self.slots.lock().remove(&id);

        match slot {
            // The waiter may have timed out between lookup and send.
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => {
                warn!(%id, "reply for unknown request id, dropping");
            }
        }
    }

    /// Removes the slot for `id` without waking anyone.
    ///
    /// Used by callers to clean up after their own timeout; other
    /// callers' slots are untouched.
    pub(crate) fn discard(&self, id: RequestId) {
        if self.slots.lock().remove(&id).is_some() {
            debug!(%id, "discarded timed-out request slot");
        }
    }

    /// Fails every outstanding slot with [`Error::ConnectionClosed`].
    ///
    /// Called when the connection closes so no waiter stays blocked.
    pub(crate) fn fail_all(&self) {
        let pending: Vec<_> = {
            let mut slots = self.slots.lock();
            slots.drain().collect()
        };
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "failed outstanding requests on close");
        }
    }

    /// Returns the number of outstanding slots.
    #[must_use]
    pub(crate) fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_for(id: RequestId, value: serde_json::Value) -> Reply {
        Reply {
            id,
            result: Some(value),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_deliver_wakes_registered_waiter() {
        let correlator = Correlator::new();
        let id = RequestId::generate();

        let rx = correlator.register(id);
        correlator.deliver(id, Ok(reply_for(id, serde_json::json!(1))));

        let reply = rx.await.expect("slot delivered").expect("success");
        assert_eq!(reply.id, id);
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_delivery_matches_by_id() {
        let correlator = Correlator::new();
        let first = RequestId::generate();
        let second = RequestId::generate();

        let rx_first = correlator.register(first);
        let rx_second = correlator.register(second);

        // Replies arrive in the opposite order of issuance.
        correlator.deliver(second, Ok(reply_for(second, serde_json::json!("second"))));
        correlator.deliver(first, Ok(reply_for(first, serde_json::json!("first"))));

        let reply_first = rx_first.await.expect("delivered").expect("success");
        let reply_second = rx_second.await.expect("delivered").expect("success");

        assert_eq!(reply_first.id, first);
        assert_eq!(reply_first.result, Some(serde_json::json!("first")));
        assert_eq!(reply_second.id, second);
        assert_eq!(reply_second.result, Some(serde_json::json!("second")));
    }

    #[tokio::test]
    async fn test_deliver_unknown_id_is_ignored() {
        let correlator = Correlator::new();
        let id = RequestId::generate();

        // No slot registered; must not panic.
        correlator.deliver(id, Ok(reply_for(id, serde_json::json!(null))));
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn test_discard_removes_only_own_slot() {
        let correlator = Correlator::new();
        let kept = RequestId::generate();
        let dropped = RequestId::generate();

        let rx_kept = correlator.register(kept);
        let _rx_dropped = correlator.register(dropped);

        correlator.discard(dropped);
        assert_eq!(correlator.pending(), 1);

        correlator.deliver(kept, Ok(reply_for(kept, serde_json::json!(true))));
        let reply = rx_kept.await.expect("delivered").expect("success");
        assert_eq!(reply.id, kept);
    }

    #[tokio::test]
    async fn test_fail_all_releases_every_waiter() {
        let correlator = Correlator::new();
        let receivers: Vec<_> = (0..5)
            .map(|_| correlator.register(RequestId::generate()))
            .collect();

        correlator.fail_all();
        assert_eq!(correlator.pending(), 0);

        for rx in receivers {
            let outcome = rx.await.expect("slot failed");
            assert!(matches!(outcome, Err(Error::ConnectionClosed)));
        }
    }
}
