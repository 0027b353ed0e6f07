//! In-process event bus
//!
//! Publish/subscribe registry keyed by [`Selector`]. Two kinds of
//! registration exist:
//! - one-shot subscriptions (`subscribe`), removed atomically with their
//!   single invocation
//! - persistent consumers (`on`), invoked for every matching event
//!
//! Continuations are always invoked after the registry lock is released,
//! so they may publish or subscribe again on the same bus.

mod event;

pub use event::{Event, Selector};

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::logger;

type OnceFn<T> = Box<dyn FnOnce(Event<T>) + Send>;
type ConsumerFn<T> = Arc<dyn Fn(Event<T>) + Send + Sync>;

/// Handle returned by every registration, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Registration<T> {
    Once(OnceFn<T>),
    Consumer(ConsumerFn<T>),
}

impl<T> Registration<T> {
    fn invoke(self, event: Event<T>) {
        match self {
            Self::Once(continuation) => continuation(event),
            Self::Consumer(consumer) => consumer(event),
        }
    }
}

struct Entry<T> {
    id: SubscriptionId,
    registration: Registration<T>,
}

/// Selector-keyed publish/subscribe registry.
pub struct EventBus<T> {
    registry: Mutex<HashMap<Selector, Vec<Entry<T>>>>,
    next_id: AtomicU64,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Selector, Vec<Entry<T>>>> {
        // Continuations never run under the lock, so a poisoned registry is still consistent
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn register(&self, selector: Selector, registration: Registration<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id());
        self.registry()
            .entry(selector)
            .or_default()
            .push(Entry { id, registration });
        id
    }

    /// Remove a registration. Returns `false` if it already fired or never existed.
    pub fn unsubscribe(&self, selector: &Selector, id: SubscriptionId) -> bool {
        let mut registry = self.registry();
        let Some(entries) = registry.get_mut(selector) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            registry.remove(selector);
        }
        removed
    }

    /// Number of registrations currently waiting on `selector`.
    pub fn subscriber_count(&self, selector: &Selector) -> usize {
        self.registry().get(selector).map_or(0, Vec::len)
    }

    /// Detach every registration for `selector`, keeping consumers registered.
    fn take_recipients(&self, selector: &Selector) -> Vec<Registration<T>> {
        let mut registry = self.registry();
        let Some(entries) = registry.get_mut(selector) else {
            return Vec::new();
        };

        let mut recipients = Vec::with_capacity(entries.len());
        let mut kept = Vec::new();
        for entry in entries.drain(..) {
            match entry.registration {
                Registration::Once(continuation) => {
                    recipients.push(Registration::Once(continuation));
                }
                Registration::Consumer(consumer) => {
                    recipients.push(Registration::Consumer(Arc::clone(&consumer)));
                    kept.push(Entry {
                        id: entry.id,
                        registration: Registration::Consumer(consumer),
                    });
                }
            }
        }

        *entries = kept;
        if entries.is_empty() {
            registry.remove(selector);
        }
        recipients
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Register a continuation for the next event published on `selector`.
    pub fn subscribe<F>(&self, selector: impl Into<Selector>, continuation: F) -> SubscriptionId
    where
        F: FnOnce(Event<T>) + Send + 'static,
    {
        self.register(selector.into(), Registration::Once(Box::new(continuation)))
    }

    /// Register a consumer for every event published on `selector`.
    pub fn on<F>(&self, selector: impl Into<Selector>, consumer: F) -> SubscriptionId
    where
        F: Fn(Event<T>) + Send + Sync + 'static,
    {
        self.register(selector.into(), Registration::Consumer(Arc::new(consumer)))
    }

    /// Publish `data` on `selector`. Returns the number of recipients.
    pub fn publish(&self, selector: impl Into<Selector>, data: T) -> usize {
        self.send(Event::new(selector.into(), data))
    }

    /// Deliver a prepared event to everything registered on its selector.
    pub fn send(&self, event: Event<T>) -> usize {
        let mut recipients = self.take_recipients(event.selector());
        let count = recipients.len();
        let Some(last) = recipients.pop() else {
            return 0;
        };

        for recipient in recipients {
            deliver(recipient, event.clone());
        }
        deliver(last, event);
        count
    }

    /// Publish `data` on `selector` and route the first reply to `on_reply`.
    ///
    /// The reply subscription is registered before the request is
    /// published, so consumers may reply synchronously. Dropping the
    /// returned [`Exchange`] cancels the reply subscription if it has not
    /// fired yet.
    pub fn send_and_receive<F>(
        &self,
        selector: impl Into<Selector>,
        data: T,
        on_reply: F,
    ) -> Exchange<'_, T>
    where
        F: FnOnce(Event<T>) + Send + 'static,
    {
        let selector = selector.into();
        let reply_to = selector.reply_channel(self.next_id());
        let id = self.subscribe(reply_to.clone(), on_reply);
        let delivered = self.send(Event::new(selector, data).with_reply_to(reply_to.clone()));
        Exchange {
            bus: self,
            reply_to,
            id,
            delivered,
        }
    }

    /// Answer `request` on its reply channel. A request without one is ignored.
    pub fn reply(&self, request: &Event<T>, data: T) -> usize {
        match request.reply_to() {
            Some(reply_to) => self.send(Event::new(reply_to.clone(), data)),
            None => 0,
        }
    }
}

fn deliver<T>(recipient: Registration<T>, event: Event<T>) {
    let selector = event.selector().clone();
    if catch_unwind(AssertUnwindSafe(|| recipient.invoke(event))).is_err() {
        logger::log_error(&format!("Subscriber for '{selector}' panicked"));
    }
}

/// A request published by [`EventBus::send_and_receive`] awaiting its reply.
pub struct Exchange<'a, T> {
    bus: &'a EventBus<T>,
    reply_to: Selector,
    id: SubscriptionId,
    delivered: usize,
}

impl<T> Exchange<'_, T> {
    /// Consumers that received the request.
    pub const fn delivered(&self) -> usize {
        self.delivered
    }

    pub const fn reply_selector(&self) -> &Selector {
        &self.reply_to
    }
}

impl<T> Drop for Exchange<'_, T> {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.reply_to, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn test_subscription_receives_payload_once() {
        let bus = EventBus::new();
        let (tx, rx) = mpsc::channel();
        bus.subscribe("/a", move |event: Event<String>| {
            tx.send(event.into_data()).unwrap();
        });

        assert_eq!(bus.publish("/a", "first".to_string()), 1);
        assert_eq!(bus.publish("/a", "second".to_string()), 0);

        assert_eq!(rx.recv().unwrap(), "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_late_subscription_is_not_satisfied() {
        let bus: EventBus<u32> = EventBus::new();
        assert_eq!(bus.publish("/a", 1), 0);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe("/a", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(&Selector::from("/a")), 1);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus: EventBus<u32> = EventBus::new();
        assert_eq!(bus.publish("/nobody", 42), 0);
        assert_eq!(bus.subscriber_count(&Selector::from("/nobody")), 0);
    }

    #[test]
    fn test_selectors_are_isolated() {
        let bus = EventBus::new();
        let (tx, rx) = mpsc::channel();
        bus.subscribe("/a", move |event: Event<u32>| {
            tx.send(event.into_data()).unwrap();
        });
        assert_eq!(bus.publish("/b", 1), 0);
        assert_eq!(bus.publish("/a", 2), 1);
        assert_eq!(rx.recv().unwrap(), 2);
    }

    #[test]
    fn test_consumer_stays_registered() {
        let bus: EventBus<u32> = EventBus::new();
        let total = Arc::new(AtomicUsize::new(0));
        let sum = Arc::clone(&total);
        bus.on("/sum", move |event| {
            sum.fetch_add(*event.data() as usize, Ordering::SeqCst);
        });

        bus.publish("/sum", 2);
        bus.publish("/sum", 3);
        assert_eq!(total.load(Ordering::SeqCst), 5);
        assert_eq!(bus.subscriber_count(&Selector::from("/sum")), 1);
    }

    #[test]
    fn test_every_subscriber_gets_the_payload() {
        let bus: EventBus<String> = EventBus::new();
        let (tx, rx) = mpsc::channel();
        for _ in 0..3 {
            let tx = tx.clone();
            bus.subscribe("/fan", move |event| tx.send(event.into_data()).unwrap());
        }
        assert_eq!(bus.publish("/fan", "x".to_string()), 3);
        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec!["x", "x", "x"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus: EventBus<u32> = EventBus::new();
        let selector = Selector::from("/a");
        let id = bus.subscribe(selector.clone(), |_| panic!("cancelled subscription fired"));
        assert!(bus.unsubscribe(&selector, id));
        assert!(!bus.unsubscribe(&selector, id));
        assert_eq!(bus.publish(selector, 1), 0);
    }

    #[test]
    fn test_continuation_may_publish_reentrantly() {
        let bus: Arc<EventBus<u32>> = Arc::new(EventBus::new());
        let (tx, rx) = mpsc::channel();

        bus.subscribe("/second", move |event: Event<u32>| {
            tx.send(event.into_data()).unwrap();
        });
        let inner = Arc::clone(&bus);
        bus.subscribe("/first", move |event: Event<u32>| {
            inner.publish("/second", event.into_data() + 1);
        });

        assert_eq!(bus.publish("/first", 1), 1);
        assert_eq!(rx.recv().unwrap(), 2);
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_others() {
        let bus: EventBus<u32> = EventBus::new();
        let (tx, rx) = mpsc::channel();
        bus.subscribe("/a", |_| panic!("boom"));
        bus.subscribe("/a", move |event| tx.send(event.into_data()).unwrap());

        assert_eq!(bus.publish("/a", 9), 2);
        assert_eq!(rx.recv().unwrap(), 9);
    }

    #[test]
    fn test_send_and_receive_routes_reply() {
        let bus: Arc<EventBus<String>> = Arc::new(EventBus::new());
        let responder = Arc::clone(&bus);
        bus.on("/echo", move |event| {
            let answer = format!("echo: {}", event.data());
            responder.reply(&event, answer);
        });

        let (tx, rx) = mpsc::channel();
        let exchange = bus.send_and_receive("/echo", "hi".to_string(), move |event| {
            tx.send(event.into_data()).unwrap();
        });
        assert_eq!(exchange.delivered(), 1);
        assert_eq!(rx.recv().unwrap(), "echo: hi");
        // The consumer on the request selector must not see its own reply.
        assert_eq!(bus.subscriber_count(&Selector::from("/echo")), 1);
    }

    #[test]
    fn test_concurrent_exchanges_get_their_own_reply() {
        let bus: Arc<EventBus<u32>> = Arc::new(EventBus::new());
        let responder = Arc::clone(&bus);
        bus.on("/double", move |event| {
            responder.reply(&event, event.data() * 2);
        });

        let (tx, rx) = mpsc::channel();
        for n in 1..=3 {
            let tx = tx.clone();
            let _exchange = bus.send_and_receive("/double", n, move |event| {
                tx.send((n, event.into_data())).unwrap();
            });
        }
        drop(tx);
        for (n, doubled) in rx.iter() {
            assert_eq!(doubled, n * 2);
        }
    }

    #[test]
    fn test_dropped_exchange_cancels_reply() {
        let bus: EventBus<u32> = EventBus::new();
        let (tx, rx) = mpsc::channel();
        let reply_to = {
            let exchange = bus.send_and_receive("/slow", 1, move |event| {
                tx.send(event.into_data()).unwrap();
            });
            assert_eq!(exchange.delivered(), 0);
            exchange.reply_selector().clone()
        };
        assert_eq!(bus.subscriber_count(&reply_to), 0);
        assert_eq!(bus.publish(reply_to, 2), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reply_without_reply_channel_is_ignored() {
        let bus: EventBus<u32> = EventBus::new();
        let event = Event::new(Selector::from("/a"), 1);
        assert_eq!(bus.reply(&event, 2), 0);
    }

    #[test]
    fn test_concurrent_publishers_fire_subscription_once() {
        let bus: Arc<EventBus<u32>> = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&hits);
            bus.subscribe("/race", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let delivered: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|n| {
                    let bus = Arc::clone(&bus);
                    scope.spawn(move || bus.publish("/race", n))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(delivered, 100);
        assert_eq!(hits.load(Ordering::SeqCst), 100);
    }
}
