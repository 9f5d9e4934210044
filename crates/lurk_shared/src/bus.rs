//! # Typed Event Bus
//!
//! Publish/subscribe for one event type, one bus per component.
//!
//! ```text
//! ┌─────────────┐  publish(&E)  ┌─────────────┐ ──> closure listener (HUD, telemetry)
//! │  Component  │──────────────>│  EventBus   │ ──> closure listener
//! └─────────────┘               └─────────────┘ ──> bounded channel (network transport)
//! ```
//!
//! ## Guarantees
//!
//! - Each listener sees a published event **at most once**.
//! - A panicking listener is caught and logged; the publisher and the
//!   remaining listeners are unaffected.
//! - Listeners run outside the registry lock, so they may subscribe or
//!   unsubscribe from inside a callback.
//! - Channel subscribers never block the publisher: a full channel drops the
//!   event (logged), a disconnected one is pruned.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct BusInner<E> {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener<E>)>,
    channels: Vec<(SubscriptionId, Sender<E>)>,
}

impl<E> BusInner<E> {
    fn allocate_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// Typed publish/subscribe bus.
///
/// Cloning the bus yields another handle to the same listener registry.
pub struct EventBus<E> {
    /// Component name, used in logs.
    name: &'static str,
    inner: Arc<Mutex<BusInner<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<E> EventBus<E> {
    /// Creates an empty bus.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                listeners: Vec::new(),
                channels: Vec::new(),
            })),
        }
    }

    /// Registers a callback listener.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Registers a bounded channel subscriber (for the network transport).
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum undrained events before new ones are dropped.
    #[must_use]
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, EventReceiver<E>) {
        let (sender, receiver) = bounded(capacity.max(1));
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        inner.channels.push((id, sender));
        (id, EventReceiver { receiver })
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len() + inner.channels.len();
        inner.listeners.retain(|(sid, _)| *sid != id);
        inner.channels.retain(|(sid, _)| *sid != id);
        before != inner.listeners.len() + inner.channels.len()
    }

    /// Number of registered subscribers (callbacks and channels).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.listeners.len() + inner.channels.len()
    }

    /// Removes every subscriber.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.listeners.clear();
        inner.channels.clear();
    }
}

impl<E: Clone> EventBus<E> {
    /// Delivers `event` to every subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: &E) -> usize {
        // Snapshot under the lock, deliver outside it.
        let (listeners, channels): (Vec<_>, Vec<_>) = {
            let inner = self.inner.lock();
            (
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
                inner.channels.clone(),
            )
        };

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::error!(bus = self.name, "event listener panicked; continuing");
                }
            }
        }

        let mut disconnected = Vec::new();
        for (id, sender) in channels {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(bus = self.name, "subscriber channel full; event dropped");
                }
                Err(TrySendError::Disconnected(_)) => disconnected.push(id),
            }
        }

        if !disconnected.is_empty() {
            self.inner
                .lock()
                .channels
                .retain(|(id, _)| !disconnected.contains(id));
        }

        delivered
    }
}

/// Handle for receiving events from a channel subscription.
pub struct EventReceiver<E> {
    receiver: Receiver<E>,
}

impl<E> EventReceiver<E> {
    /// Receives all pending events (non-blocking).
    #[inline]
    pub fn drain(&self) -> Vec<E> {
        let mut events = Vec::with_capacity(self.receiver.len());
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Receives one event (non-blocking).
    #[inline]
    pub fn try_recv(&self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    /// Returns the number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Checks if there are pending events.
    #[inline]
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_each_listener_sees_event_once() {
        let bus: EventBus<u32> = EventBus::new("test");
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let h = Arc::clone(&hits);
        bus.subscribe(move |_| {
            h.fetch_add(10, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(&7), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus: EventBus<u32> = EventBus::new("test");
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe(|_| panic!("listener bug"));
        let h = Arc::clone(&hits);
        bus.subscribe(move |v| {
            h.fetch_add(*v as usize, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(&3), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe() {
        let bus: EventBus<u32> = EventBus::new("test");
        let id = bus.subscribe(|_| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish(&1), 0);
    }

    #[test]
    fn test_channel_subscriber() {
        let bus: EventBus<u32> = EventBus::new("test");
        let (_, receiver) = bus.subscribe_channel(2);

        bus.publish(&1);
        bus.publish(&2);
        bus.publish(&3); // dropped: channel full

        assert_eq!(receiver.pending_count(), 2);
        assert_eq!(receiver.drain(), vec![1, 2]);
        assert!(!receiver.has_events());
    }

    #[test]
    fn test_disconnected_channel_is_pruned() {
        let bus: EventBus<u32> = EventBus::new("test");
        let (_, receiver) = bus.subscribe_channel(4);
        drop(receiver);

        assert_eq!(bus.publish(&1), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
