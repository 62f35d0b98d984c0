//! Push-based publish/subscribe primitive
//!
//! Every stream in the crate (listener events, conversation deliveries, new
//! conversations) goes through an `EventBus`: multiple independent
//! subscribers, delivery in registration order, cancellation by dropping the
//! subscription.

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Fan-out channel registry with automatic pruning of gone subscribers
pub struct EventBus<T> {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<T>>>,
    closed: Mutex<bool>,
}

impl<T: Clone> EventBus<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    /// Register a new subscriber. A subscription on a closed bus yields no
    /// events and ends immediately.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !*self.closed.lock() {
            self.subscribers.lock().push(tx);
        }
        Subscription { rx }
    }

    /// Deliver `event` to every live subscriber, in registration order.
    /// Subscribers whose receiver is gone are pruned. Returns how many
    /// subscribers received the event.
    pub fn publish(&self, event: &T) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    /// Number of currently registered subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// End every subscription and refuse new ones
    pub fn close(&self) {
        *self.closed.lock() = true;
        self.subscribers.lock().clear();
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's end of an `EventBus`. Dropping it cancels only this
/// subscription.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Receive the next event; `None` once the bus is closed
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking receive for draining in tests and diagnostics
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_subscribers_see_the_same_events() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(&1), 2);
        assert_eq!(bus.publish(&2), 2);

        assert_eq!(first.recv().await, Some(1));
        assert_eq!(first.recv().await, Some(2));
        assert_eq!(second.recv().await, Some(1));
        assert_eq!(second.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(first);
        assert_eq!(bus.publish(&7), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(second.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let bus = EventBus::new();
        let mut subscription = bus.subscribe();

        bus.close();
        assert_eq!(subscription.recv().await, None);

        let mut late = bus.subscribe();
        assert_eq!(bus.publish(&1), 0);
        assert_eq!(late.recv().await, None);
    }
}
