use std::sync::{Arc, Mutex, MutexGuard};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifies one subscription on an [`Observable`], for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A single-writer observable value: a last-value cache plus a list of
/// subscriber callbacks, notified synchronously in registration order.
///
/// Only the owning service writes; consumers subscribe and read. Callbacks
/// are invoked outside the internal lock, so a subscriber may call `get`
/// from within its callback.
pub struct Observable<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    value: T,
    subscribers: Vec<(SubscriptionId, Callback<T>)>,
    next_id: u64,
    disposed: bool,
}

impl<T: Clone> Observable<T> {
    /// Create an observable seeded with an initial value.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value: initial,
                subscribers: Vec::new(),
                next_id: 0,
                disposed: false,
            }),
        }
    }

    /// The last value set (or the initial value).
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Replace the value and notify every subscriber, in registration order.
    pub fn set_value(&self, value: T) {
        let (value, callbacks) = {
            let mut inner = self.lock();
            inner.value = value.clone();
            if inner.disposed {
                return;
            }
            let callbacks: Vec<Callback<T>> =
                inner.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect();
            (value, callbacks)
        };
        for callback in callbacks {
            callback(&value);
        }
    }

    /// Register a callback, invoked on every subsequent `set_value`.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Remove one subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sub_id, _)| *sub_id != id);
        inner.subscribers.len() != before
    }

    /// Drop all subscribers and stop notifying. The cached value stays
    /// readable.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        inner.disposed = true;
        inner.subscribers.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // Single-writer discipline; a poisoned lock still holds a coherent T
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_get_returns_last_value() {
        let obs = Observable::new(1u32);
        assert_eq!(obs.get(), 1);
        obs.set_value(5);
        assert_eq!(obs.get(), 5);
    }

    #[test]
    fn test_notifies_in_registration_order() {
        let obs = Observable::new(0u32);
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            obs.subscribe(move |value| {
                order.lock().unwrap().push((tag, *value));
            });
        }

        obs.set_value(7);
        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec![("first", 7), ("second", 7), ("third", 7)]);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let obs = Observable::new(0u32);
        let hits = Arc::new(AtomicUsize::new(0));

        let id = {
            let hits = Arc::clone(&hits);
            obs.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        obs.set_value(1);
        assert!(obs.unsubscribe(id));
        assert!(!obs.unsubscribe(id));
        obs.set_value(2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_silences_subscribers_but_keeps_value() {
        let obs = Observable::new(0u32);
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            obs.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        obs.dispose();
        obs.set_value(9);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(obs.get(), 9);
    }

    #[test]
    fn test_subscriber_may_read_from_callback() {
        let obs = Arc::new(Observable::new(0u32));
        let seen = Arc::new(Mutex::new(None));
        {
            let inner = Arc::clone(&obs);
            let seen = Arc::clone(&seen);
            obs.subscribe(move |_| {
                *seen.lock().unwrap() = Some(inner.get());
            });
        }
        obs.set_value(3);
        assert_eq!(*seen.lock().unwrap(), Some(3));
    }
}
