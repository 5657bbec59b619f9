//! Best-effort fan-out of committed snapshots to live subscribers.
//!
//! Each subscriber owns a bounded [`mpsc`] channel. [`SubscriberNotifier::publish`]
//! never waits on a subscriber: it uses `try_send`, and a subscriber whose
//! channel is full or closed is removed from the registry. A removed
//! subscriber still drains whatever was already buffered, after which its
//! [`Subscription::recv`] returns `None`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cranewatch_core::snapshot::Snapshot;
use cranewatch_core::types::Timestamp;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

pub type SubscriberId = Uuid;

/// Default per-subscriber buffer, in snapshots.
const DEFAULT_BUFFER: usize = 16;

struct Subscriber {
    label: String,
    sender: mpsc::Sender<Arc<Snapshot>>,
    subscribed_at: Timestamp,
}

/// Receiving half handed to a subscriber.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<Snapshot>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next snapshot. `None` once the subscriber has been
    /// dropped from the registry and its buffer is empty.
    pub async fn recv(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv) for pull consumers.
    pub fn try_recv(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.try_recv().ok()
    }
}

/// Outcome of one [`SubscriberNotifier::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Registry of live snapshot subscribers.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared between the processor (publisher) and the HTTP layer (subscribers).
pub struct SubscriberNotifier {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    buffer: usize,
}

impl SubscriberNotifier {
    /// Create a notifier whose subscribers each buffer up to `buffer`
    /// snapshots before being considered too slow.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a new subscriber. `label` only shows up in logs.
    pub async fn subscribe(&self, label: impl Into<String>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = Uuid::now_v7();
        let label = label.into();
        tracing::debug!(subscriber_id = %id, label = %label, "Snapshot subscriber registered");
        self.subscribers.write().await.insert(
            id,
            Subscriber {
                label,
                sender,
                subscribed_at: Utc::now(),
            },
        );
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Returns whether it was still registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.write().await.remove(&id).is_some()
    }

    /// Deliver `snapshot` to every registered subscriber.
    ///
    /// Subscribers that are closed or whose buffer is full are dropped; the
    /// others are unaffected.
    pub async fn publish(&self, snapshot: Arc<Snapshot>) -> PublishReport {
        let mut report = PublishReport::default();
        let mut stale = Vec::new();

        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                match subscriber.sender.try_send(Arc::clone(&snapshot)) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscriber_id = %id,
                            label = %subscriber.label,
                            connected_secs = (Utc::now() - subscriber.subscribed_at).num_seconds(),
                            "Snapshot subscriber lagging, dropping it"
                        );
                        stale.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(
                            subscriber_id = %id,
                            label = %subscriber.label,
                            "Snapshot subscriber closed, dropping it"
                        );
                        stale.push(*id);
                    }
                }
            }
        }

        if !stale.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &stale {
                subscribers.remove(id);
            }
        }
        report.dropped = stale.len();

        tracing::trace!(
            sequence = snapshot.sequence,
            delivered = report.delivered,
            dropped = report.dropped,
            "Snapshot published"
        );
        report
    }

    /// Return the current number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Drop every subscriber. Their pending buffers still drain.
    ///
    /// Used during graceful shutdown so stream consumers see end-of-stream.
    pub async fn close_all(&self) {
        let mut subscribers = self.subscribers.write().await;
        let count = subscribers.len();
        subscribers.clear();
        tracing::info!(count, "Closed all snapshot subscribers");
    }
}

impl Default for SubscriberNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(sequence: u64) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            sequence,
            ..Snapshot::empty()
        })
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_noop() {
        let notifier = SubscriberNotifier::default();
        let report = notifier.publish(snapshot(1)).await;
        assert_eq!(report, PublishReport::default());
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_snapshot() {
        let notifier = SubscriberNotifier::default();
        let mut a = notifier.subscribe("a").await;
        let mut b = notifier.subscribe("b").await;

        let report = notifier.publish(snapshot(7)).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(a.recv().await.unwrap().sequence, 7);
        assert_eq!(b.recv().await.unwrap().sequence, 7);
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_without_affecting_others() {
        let notifier = SubscriberNotifier::new(1);
        let mut slow = notifier.subscribe("slow").await;
        let mut fast = notifier.subscribe("fast").await;

        notifier.publish(snapshot(1)).await;
        assert_eq!(fast.recv().await.unwrap().sequence, 1);

        // `slow` has not consumed snapshot 1, so its buffer is full.
        let report = notifier.publish(snapshot(2)).await;

        assert_eq!(report, PublishReport { delivered: 1, dropped: 1 });
        assert_eq!(notifier.subscriber_count().await, 1);
        assert_eq!(fast.recv().await.unwrap().sequence, 2);

        // The dropped subscriber drains what it had, then sees end-of-stream.
        assert_eq!(slow.recv().await.unwrap().sequence, 1);
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_subscriber_is_dropped_on_next_publish() {
        let notifier = SubscriberNotifier::default();
        let gone = notifier.subscribe("gone").await;
        drop(gone);

        let report = notifier.publish(snapshot(1)).await;

        assert_eq!(report, PublishReport { delivered: 0, dropped: 1 });
        assert_eq!(notifier.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_and_close_all() {
        let notifier = SubscriberNotifier::default();
        let a = notifier.subscribe("a").await;
        let mut b = notifier.subscribe("b").await;

        assert!(notifier.unsubscribe(a.id()).await);
        assert!(!notifier.unsubscribe(a.id()).await);
        assert_eq!(notifier.subscriber_count().await, 1);

        notifier.close_all().await;
        assert_eq!(notifier.subscriber_count().await, 0);
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn pull_consumer_uses_try_recv() {
        let notifier = SubscriberNotifier::default();
        let mut sub = notifier.subscribe("poller").await;

        assert!(sub.try_recv().is_none());
        notifier.publish(snapshot(3)).await;
        assert_eq!(sub.try_recv().unwrap().sequence, 3);
    }
}
