//! Synchronous publish/subscribe for engine streams.
//!
//! Subscribers run on the publishing thread, in subscription order. The
//! subscriber list is snapshotted before each notification so callbacks may
//! subscribe or unsubscribe (themselves or others) while a value is in flight.
//! A subscriber removed mid-notification is not called for that value.
//!
//! A publish issued from inside a callback is queued and delivered to every
//! subscriber once the current value has reached all of them, so each
//! subscriber sees values in publish order and ends on the newest.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

type Callback<T> = RefCell<Box<dyn FnMut(&T)>>;

struct Slot<T> {
    id: u64,
    active: Cell<bool>,
    callback: Callback<T>,
}

struct Subscribers<T> {
    next_id: Cell<u64>,
    slots: RefCell<Vec<Rc<Slot<T>>>>,
    publishing: Cell<bool>,
    pending: RefCell<VecDeque<T>>,
}

impl<T> Subscribers<T> {
    fn remove(&self, id: u64) {
        let mut slots = self.slots.borrow_mut();
        if let Some(index) = slots.iter().position(|slot| slot.id == id) {
            let slot = slots.remove(index);
            slot.active.set(false);
        }
    }

    fn deliver(&self, value: &T) {
        let snapshot: Vec<Rc<Slot<T>>> = self.slots.borrow().clone();
        for slot in snapshot {
            if slot.active.get() {
                let mut callback = slot.callback.borrow_mut();
                callback(value);
            }
        }
    }
}

/// Clears the publishing flag even if a callback panics.
struct PublishGuard<'a>(&'a Cell<bool>);

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Ordered list of subscribers for values of type `T`.
///
/// Cloning yields another handle to the same list.
pub struct Broadcast<T> {
    inner: Rc<Subscribers<T>>,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Broadcast<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Subscribers {
                next_id: Cell::new(0),
                slots: RefCell::new(Vec::new()),
                publishing: Cell::new(false),
                pending: RefCell::new(VecDeque::new()),
            }),
        }
    }

    /// Register `callback`. It stays registered until the returned
    /// subscription is unsubscribed or dropped.
    pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        self.inner.slots.borrow_mut().push(Rc::new(Slot {
            id,
            active: Cell::new(true),
            callback: RefCell::new(Box::new(callback)),
        }));

        let subscribers: Weak<Subscribers<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.remove(id);
            }
        })
    }

    /// Deliver `value` to every current subscriber.
    ///
    /// Called from inside a callback, the value is queued behind the one
    /// in flight.
    pub fn publish(&self, value: &T) {
        let inner = &self.inner;
        if inner.publishing.get() {
            inner.pending.borrow_mut().push_back(value.clone());
            return;
        }
        inner.publishing.set(true);
        let _guard = PublishGuard(&inner.publishing);

        inner.deliver(value);
        loop {
            let next = inner.pending.borrow_mut().pop_front();
            match next {
                Some(queued) => inner.deliver(&queued),
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Disposer returned by every subscribe call.
///
/// Dropping it unsubscribes; use [`Subscription::detach`] to keep the
/// subscriber registered for the lifetime of the stream.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Deregister exactly this subscriber.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// Keep the subscriber registered; the disposer is discarded.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnMut(&u32)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_for_factory = Rc::clone(&log);
        let factory = move |name: &str| -> Box<dyn FnMut(&u32)> {
            let log = Rc::clone(&log_for_factory);
            let name = name.to_string();
            Box::new(move |v: &u32| log.borrow_mut().push(format!("{name}:{v}")))
        };
        (log, factory)
    }

    #[test]
    fn publishes_in_subscription_order() {
        let (log, make) = recorder();
        let stream = Broadcast::<u32>::new();
        let a = stream.subscribe(make("a"));
        let b = stream.subscribe(make("b"));

        stream.publish(&1);
        assert_eq!(*log.borrow(), vec!["a:1", "b:1"]);

        drop(a);
        stream.publish(&2);
        assert_eq!(*log.borrow(), vec!["a:1", "b:1", "b:2"]);
        b.unsubscribe();
        assert!(stream.is_empty());
    }

    #[test]
    fn unsubscribe_removes_only_that_subscriber() {
        let (log, make) = recorder();
        let stream = Broadcast::<u32>::new();
        let a = stream.subscribe(make("a"));
        let _b = stream.subscribe(make("b"));
        let _c = stream.subscribe(make("c"));

        a.unsubscribe();
        stream.publish(&7);
        assert_eq!(*log.borrow(), vec!["b:7", "c:7"]);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn unsubscribe_during_notification_skips_removed_subscriber() {
        let (log, make) = recorder();
        let stream = Broadcast::<u32>::new();

        // "first" removes "second" while the value is in flight.
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let victim_in_cb = Rc::clone(&victim);
        let log_in_cb = Rc::clone(&log);
        let _first = stream.subscribe(move |v: &u32| {
            log_in_cb.borrow_mut().push(format!("first:{v}"));
            if let Some(sub) = victim_in_cb.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        *victim.borrow_mut() = Some(stream.subscribe(make("second")));
        let _third = stream.subscribe(make("third"));

        stream.publish(&1);
        assert_eq!(*log.borrow(), vec!["first:1", "third:1"]);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn subscriber_can_unsubscribe_itself() {
        let stream = Broadcast::<u32>::new();
        let calls = Rc::new(Cell::new(0));
        let own: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let own_in_cb = Rc::clone(&own);
        let calls_in_cb = Rc::clone(&calls);
        let sub = stream.subscribe(move |_| {
            calls_in_cb.set(calls_in_cb.get() + 1);
            // Take first: dropping the subscription runs its disposer.
            let taken = own_in_cb.borrow_mut().take();
            if let Some(sub) = taken {
                sub.unsubscribe();
            }
        });
        *own.borrow_mut() = Some(sub);

        stream.publish(&1);
        stream.publish(&2);
        assert_eq!(calls.get(), 1);
        assert!(stream.is_empty());
    }

    #[test]
    fn subscribe_during_notification_takes_effect_next_publish() {
        let (log, make) = recorder();
        let stream = Broadcast::<u32>::new();
        let added: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let stream_in_cb = stream.clone();
        let added_in_cb = Rc::clone(&added);
        let make = Rc::new(make);
        let make_in_cb = Rc::clone(&make);
        let _adder = stream.subscribe(move |_| {
            if added_in_cb.borrow().is_empty() {
                let sub = stream_in_cb.subscribe(make_in_cb("late"));
                added_in_cb.borrow_mut().push(sub);
            }
        });

        stream.publish(&1);
        assert!(log.borrow().is_empty());
        stream.publish(&2);
        assert_eq!(*log.borrow(), vec!["late:2"]);
    }

    #[test]
    fn nested_publish_reaches_everyone_after_current_value() {
        let (log, make) = recorder();
        let stream = Broadcast::<u32>::new();

        let stream_in_cb = stream.clone();
        let log_in_cb = Rc::clone(&log);
        let _first = stream.subscribe(move |v: &u32| {
            log_in_cb.borrow_mut().push(format!("first:{v}"));
            if *v == 1 {
                stream_in_cb.publish(&2);
            }
        });
        let _second = stream.subscribe(make("second"));

        stream.publish(&1);
        assert_eq!(
            *log.borrow(),
            vec!["first:1", "second:1", "first:2", "second:2"]
        );
    }

    #[test]
    fn nested_publishes_keep_their_order() {
        let stream = Broadcast::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let stream_in_cb = stream.clone();
        let seen_in_cb = Rc::clone(&seen);
        let _sub = stream.subscribe(move |v: &u32| {
            seen_in_cb.borrow_mut().push(*v);
            if *v == 1 {
                stream_in_cb.publish(&2);
                stream_in_cb.publish(&3);
            }
        });

        stream.publish(&1);
        stream.publish(&4);
        assert_eq!(*seen.borrow(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn panicking_subscriber_does_not_wedge_the_stream() {
        let stream = Broadcast::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_cb = Rc::clone(&seen);
        let _sub = stream.subscribe(move |v: &u32| {
            if *v == 1 {
                panic!("boom");
            }
            seen_in_cb.borrow_mut().push(*v);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| stream.publish(&1)));
        assert!(result.is_err());
        stream.publish(&2);
        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let stream = Broadcast::<u32>::new();
        let calls = Rc::new(Cell::new(0));
        let calls_in_cb = Rc::clone(&calls);
        stream
            .subscribe(move |_| calls_in_cb.set(calls_in_cb.get() + 1))
            .detach();

        stream.publish(&1);
        stream.publish(&2);
        assert_eq!(calls.get(), 2);
        assert_eq!(stream.len(), 1);
    }

    #[test]
    fn subscription_outliving_stream_is_harmless() {
        let stream = Broadcast::<u32>::new();
        let sub = stream.subscribe(|_| {});
        drop(stream);
        sub.unsubscribe();
    }
}
