//! Synchronous fan-out event bus.
//!
//! Observers (status badges, the settings panel, the endpoint switcher)
//! subscribe to a topic and receive every payload emitted on it afterwards.
//! Delivery happens inline on the emitting task, in subscription order, to
//! the subscribers registered when `emit` was called.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    topic: String,
    callback: Callback<T>,
}

struct Registry<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

/// Removal side of the registry, erased so [`Subscription`] is not generic.
trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

impl<T> Detach for Mutex<Registry<T>> {
    fn detach(&self, id: u64) -> bool {
        let mut registry = self.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.entries.len();
        registry.entries.retain(|entry| entry.id != id);
        before != registry.entries.len()
    }
}

pub struct EventBus<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register `callback` for `topic`. The returned handle must be used to
    /// detach; dropping it leaves the subscription in place.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push(Entry {
            id,
            topic: topic.to_string(),
            callback: Arc::new(callback),
        });
        drop(registry);

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        let bus: Weak<dyn Detach> = weak;
        Subscription {
            id,
            topic: topic.to_string(),
            bus,
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `payload` to every current subscriber of `topic` and return
    /// how many were invoked. A panicking subscriber is logged and skipped.
    pub fn emit(&self, topic: &str, payload: &T) -> usize {
        let targets: Vec<Callback<T>> = {
            let registry = self.lock();
            registry
                .entries
                .iter()
                .filter(|entry| entry.topic == topic)
                .map(|entry| Arc::clone(&entry.callback))
                .collect()
        };

        let mut delivered = 0;
        for callback in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!("Subscriber on topic '{}' panicked", topic),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.topic == topic)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`EventBus::subscribe`]. Holds only a weak reference to
/// the bus, so it never keeps the bus alive.
pub struct Subscription {
    id: u64,
    topic: String,
    bus: Weak<dyn Detach>,
    active: AtomicBool,
}

impl Subscription {
    /// Detach from the bus. Safe to call any number of times, and after the
    /// bus itself is gone.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            if !bus.detach(self.id) {
                tracing::debug!("Subscription {} on '{}' was already gone", self.id, self.topic);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && self.bus.strong_count() > 0
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn delivers_in_subscription_order() {
        let bus: EventBus<u32> = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let _a = bus.subscribe("t", {
            let seen = seen.clone();
            move |v| seen.lock().unwrap().push(("a", *v))
        });
        let _b = bus.subscribe("t", {
            let seen = seen.clone();
            move |v| seen.lock().unwrap().push(("b", *v))
        });
        let _other = bus.subscribe("other", {
            let seen = seen.clone();
            move |v| seen.lock().unwrap().push(("other", *v))
        });

        assert_eq!(bus.emit("t", &7), 2);
        assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn subscriber_added_during_delivery_misses_current_event() {
        let bus: EventBus<u32> = EventBus::new();
        let late_calls = Arc::new(StdMutex::new(Vec::new()));
        let late_handles = Arc::new(StdMutex::new(Vec::new()));

        let _first = bus.subscribe("t", {
            let bus = bus.clone();
            let late_calls = late_calls.clone();
            let late_handles = late_handles.clone();
            move |_| {
                let late_calls = late_calls.clone();
                let handle = bus.subscribe("t", move |v| late_calls.lock().unwrap().push(*v));
                late_handles.lock().unwrap().push(handle);
            }
        });

        assert_eq!(bus.emit("t", &1), 1);
        assert!(late_calls.lock().unwrap().is_empty());

        bus.emit("t", &2);
        assert_eq!(*late_calls.lock().unwrap(), vec![2]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus: EventBus<()> = EventBus::new();
        let count = Arc::new(StdMutex::new(0));
        let sub = bus.subscribe("t", {
            let count = count.clone();
            move |_| *count.lock().unwrap() += 1
        });

        bus.emit("t", &());
        sub.unsubscribe();
        sub.unsubscribe();
        bus.emit("t", &());

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(bus.subscriber_count("t"), 0);
        assert!(!sub.is_active());
    }

    #[test]
    fn dropping_handle_keeps_subscription() {
        let bus: EventBus<()> = EventBus::new();
        drop(bus.subscribe("t", |_| {}));
        assert_eq!(bus.subscriber_count("t"), 1);
    }

    #[test]
    fn unsubscribe_after_bus_dropped_is_harmless() {
        let bus: EventBus<()> = EventBus::new();
        let sub = bus.subscribe("t", |_| {});
        drop(bus);
        assert!(!sub.is_active());
        sub.unsubscribe();
    }

    #[test]
    fn panicking_subscriber_does_not_stop_delivery() {
        let bus: EventBus<()> = EventBus::new();
        let reached = Arc::new(AtomicBool::new(false));
        let _boom = bus.subscribe("t", |_| panic!("subscriber failure"));
        let _ok = bus.subscribe("t", {
            let reached = reached.clone();
            move |_| reached.store(true, Ordering::SeqCst)
        });

        assert_eq!(bus.emit("t", &()), 1);
        assert!(reached.load(Ordering::SeqCst));
    }
}
