//! Multicast subscription point for one event stream.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::telemetry::Event;

/// Callback registered on a provider
pub type Handler<T> = Arc<dyn Fn(&Event<T>) + Send + Sync>;

/// Handle returned by [`Provider::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Explicit subscriber registry for one event stream
///
/// `publish` snapshots the subscriber list before invoking anything, so
/// handlers may subscribe or unsubscribe (including themselves) while an event
/// is being delivered. A handler removed during delivery may still receive
/// that one in-flight event, never a later one.
pub struct Provider<T> {
    name: String,
    subscribers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
    next_id: AtomicU64,
}

impl<T: 'static> Provider<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a handler; it receives every event published after this call
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event<T>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Deliver `event` to every current subscriber, in subscription order
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, event: &Event<T>) -> usize {
        let snapshot: Vec<Handler<T>> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &snapshot {
            handler(event);
        }

        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{DataStamp, GpsCoords};
    use std::sync::atomic::AtomicUsize;

    fn event(value: u32) -> Event<u32> {
        Event::new(DataStamp::new(value as u64, GpsCoords::UNKNOWN), value)
    }

    #[test]
    fn test_publish_reaches_all_subscribers_in_order() {
        let provider = Provider::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            provider.subscribe(move |e: &Event<u32>| seen.lock().unwrap().push((tag, e.data)));
        }

        assert_eq!(provider.publish(&event(1)), 2);
        assert_eq!(provider.publish(&event(2)), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let provider: Provider<u32> = Provider::new("empty");
        assert_eq!(provider.publish(&event(1)), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let provider = Provider::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = provider.subscribe(move |_: &Event<u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        provider.publish(&event(1));
        assert!(provider.unsubscribe(id));
        assert!(!provider.unsubscribe(id), "second unsubscribe is a no-op");
        provider.publish(&event(2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(provider.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself_during_publish() {
        let provider = Arc::new(Provider::new("self-removing"));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&provider);
        let slot_in = Arc::clone(&slot);
        let calls_in = Arc::clone(&calls);
        let id = provider.subscribe(move |_: &Event<u32>| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            if let (Some(p), Some(id)) = (weak.upgrade(), *slot_in.lock().unwrap()) {
                p.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        provider.publish(&event(1));
        provider.publish(&event(2));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.subscriber_count(), 0);
    }

    #[test]
    fn test_concurrent_subscribe_and_publish() {
        let provider = Arc::new(Provider::new("concurrent"));
        let publisher = {
            let provider = Arc::clone(&provider);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    provider.publish(&event(i));
                }
            })
        };

        let ids: Vec<_> = (0..100)
            .map(|_| provider.subscribe(|_: &Event<u32>| {}))
            .collect();
        for id in ids {
            assert!(provider.unsubscribe(id));
        }

        publisher.join().unwrap();
        assert_eq!(provider.subscriber_count(), 0);
    }
}
