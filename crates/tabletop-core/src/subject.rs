//! Listener fan-out with disposable subscriptions.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// A set of listeners notified in subscription order.
///
/// Single-threaded: callbacks run on the caller's event loop.
pub struct Subject<T> {
    inner: Rc<RefCell<Listeners<T>>>,
}

impl<T: 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    #[must_use = "dropping the subscription removes the listener"]
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push((id, Rc::new(listener)));
            id
        };
        let weak: Weak<RefCell<Listeners<T>>> = Rc::downgrade(&self.inner);
        Subscription {
            dispose: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Deliver `value` to every listener registered at the time of the call.
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    /// Returns the number of listeners that failed.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .borrow()
            .entries
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();

        let mut failures = 0;
        for callback in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                failures += 1;
                log::error!("Listener panicked while handling a message");
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`Subject::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_emit_reaches_all_listeners() {
        let subject = Subject::<u32>::new();
        let total = Rc::new(Cell::new(0));
        let t1 = total.clone();
        let t2 = total.clone();
        let _a = subject.subscribe(move |v| t1.set(t1.get() + v));
        let _b = subject.subscribe(move |v| t2.set(t2.get() + v * 10));

        subject.emit(&2);
        assert_eq!(total.get(), 22);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let subject = Subject::<u32>::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = subject.subscribe(move |_| h.set(h.get() + 1));
        subject.emit(&1);
        drop(sub);
        subject.emit(&1);
        assert_eq!(hits.get(), 1);
        assert!(subject.is_empty());
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let subject = Subject::<String>::new();
        let received = Rc::new(RefCell::new(Vec::new()));
        let r1 = received.clone();
        let r2 = received.clone();

        let _a = subject.subscribe(move |m: &String| r1.borrow_mut().push(format!("a:{m}")));
        let _bad = subject.subscribe(|_| panic!("listener failure"));
        let _b = subject.subscribe(move |m: &String| r2.borrow_mut().push(format!("b:{m}")));

        let failures = subject.emit(&"hello".to_string());
        assert_eq!(failures, 1);
        assert_eq!(*received.borrow(), vec!["a:hello", "b:hello"]);
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let subject = Subject::<u32>::new();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let hits = Rc::new(Cell::new(0));

        let s = slot.clone();
        let first = subject.subscribe(move |_| {
            // Disposes the second listener mid-dispatch
            s.borrow_mut().take();
        });
        let h = hits.clone();
        *slot.borrow_mut() = Some(subject.subscribe(move |_| h.set(h.get() + 1)));

        // Snapshot still includes the second listener for this round
        subject.emit(&1);
        assert_eq!(hits.get(), 1);
        assert_eq!(subject.len(), 1);

        subject.emit(&1);
        assert_eq!(hits.get(), 1);
        drop(first);
    }

    #[test]
    fn test_subscription_outlives_subject() {
        let subject = Subject::<u32>::new();
        let sub = subject.subscribe(|_| {});
        drop(subject);
        sub.unsubscribe();
    }
}
