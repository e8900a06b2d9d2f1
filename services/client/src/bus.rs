//! services/client/src/bus.rs
//!
//! The cross-tab broadcast channel, generalized to an in-process
//! publish/subscribe bus. A browser host would ride this on storage
//! change events; here the transport is a subscriber registry, so a
//! desktop or server-rendered host can participate without a browser.
//!
//! Delivery contract: at-least-once, fire-and-forget, no ordering between
//! handlers of the same tab/process. Handlers must be idempotent. A
//! malformed payload is logged and dropped; it must never take down the
//! receiving side.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, warn};

//=========================================================================================
// Topics and Envelopes
//=========================================================================================

/// The notification topics the rest of the core publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SessionUpdated,
    SessionActivated,
    SessionDeactivated,
    ConversationUpdated,
    MetadataUpdated,
    ProgressUpdated,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::SessionUpdated => "session-updated",
            Topic::SessionActivated => "session-activated",
            Topic::SessionDeactivated => "session-deactivated",
            Topic::ConversationUpdated => "conversation-updated",
            Topic::MetadataUpdated => "metadata-updated",
            Topic::ProgressUpdated => "progress-updated",
        }
    }
}

/// What a subscriber receives: the topic, a monotonically increasing
/// sequence number (the "unique key" of the stored entry), and the
/// re-parsed payload.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: Topic,
    pub seq: u64,
    pub payload: serde_json::Value,
}

type Handler = Arc<dyn Fn(&BusMessage) + Send + Sync>;

//=========================================================================================
// The Bus
//=========================================================================================

#[derive(Default)]
struct BusInner {
    seq: AtomicU64,
    next_subscriber_id: AtomicU64,
    subscribers: Mutex<HashMap<Topic, Vec<(u64, Handler)>>>,
}

/// A cheaply clonable handle to the shared bus.
#[derive(Clone, Default)]
pub struct BroadcastBus {
    inner: Arc<BusInner>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a payload to every current subscriber of `topic`.
    ///
    /// Serialization failures are logged and dropped: publishing is
    /// fire-and-forget and must never propagate an error into the caller's
    /// event handling.
    pub fn publish<T: Serialize>(&self, topic: Topic, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(raw) => self.publish_raw(topic, &raw),
            Err(e) => {
                error!(topic = topic.as_str(), error = %e, "Dropping unserializable broadcast payload.");
            }
        }
    }

    /// Publishes an already-serialized payload, the form in which entries
    /// arrive from the shared storage medium. A payload that does not parse
    /// as JSON is logged and dropped before any handler runs.
    pub fn publish_raw(&self, topic: Topic, raw: &str) {
        let payload: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(topic = topic.as_str(), error = %e, "Dropping malformed broadcast payload.");
                return;
            }
        };

        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let message = BusMessage { topic, seq, payload };

        // Snapshot the handler list so handlers run outside the lock and may
        // themselves subscribe or publish.
        let handlers: Vec<Handler> = {
            let subscribers = self.inner.subscribers.lock().unwrap();
            subscribers
                .get(&topic)
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        debug!(topic = topic.as_str(), seq, receivers = handlers.len(), "Broadcast delivered.");
        for handler in handlers {
            handler(&message);
        }
    }

    /// Registers `handler` for `topic`. The returned guard deregisters the
    /// handler when dropped or explicitly unsubscribed.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&BusMessage) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
        }
    }
}

/// A registration handle; dropping it removes the handler from the bus.
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    /// Explicit form of the drop behavior.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut subscribers = inner.subscribers.lock().unwrap();
            if let Some(list) = subscribers.get_mut(&self.topic) {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
