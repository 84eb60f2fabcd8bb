// SPDX-License-Identifier: MPL-2.0

//! Single-threaded change notification.
//!
//! Listeners are owned by the notifier and removed when the [`Subscription`]
//! returned from [`Notifier::subscribe`] is dropped, so a subscriber that goes
//! away can never be called again.

use slab::Slab;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Listener<E> = Rc<RefCell<dyn FnMut(&E)>>;

pub struct Notifier<E> {
    listeners: Rc<RefCell<Slab<Listener<E>>>>,
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Slab::new())),
        }
    }
}

impl<E> fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl<E: 'static> Notifier<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` until the returned guard is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl FnMut(&E) + 'static) -> Subscription {
        let key = self
            .listeners
            .borrow_mut()
            .insert(Rc::new(RefCell::new(listener)));
        let listeners = Rc::clone(&self.listeners);

        Subscription {
            release: Some(Box::new(move || {
                let mut listeners = listeners.borrow_mut();
                if listeners.contains(key) {
                    listeners.remove(key);
                }
            })),
        }
    }

    /// Calls every listener registered at the time of the call.
    ///
    /// Listeners may subscribe or unsubscribe while being called. A listener
    /// that is already running (re-entrant emit) is skipped.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<(usize, Listener<E>)> = self
            .listeners
            .borrow()
            .iter()
            .map(|(key, listener)| (key, Rc::clone(listener)))
            .collect();

        for (key, listener) in snapshot {
            let still_registered = self
                .listeners
                .borrow()
                .get(key)
                .is_some_and(|current| Rc::ptr_eq(current, &listener));
            if !still_registered {
                continue;
            }

            match listener.try_borrow_mut() {
                Ok(mut call) => call(event),
                Err(_) => tracing::trace!(key, "skipping re-entrant listener"),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Explicitly unsubscribes. Equivalent to dropping the guard.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn dropping_subscription_stops_delivery() {
        let notifier = Notifier::<u32>::new();
        let seen = Rc::new(Cell::new(0));

        let counter = Rc::clone(&seen);
        let subscription = notifier.subscribe(move |value| counter.set(counter.get() + value));

        notifier.emit(&2);
        drop(subscription);
        notifier.emit(&5);

        assert_eq!(seen.get(), 2);
        assert!(notifier.is_empty());
    }

    #[test]
    fn listeners_run_in_subscription_order() {
        let notifier = Notifier::<()>::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&order);
        let _a = notifier.subscribe(move |()| first.borrow_mut().push("a"));
        let second = Rc::clone(&order);
        let _b = notifier.subscribe(move |()| second.borrow_mut().push("b"));

        notifier.emit(&());

        assert_eq!(*order.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let notifier = Rc::new(Notifier::<()>::new());
        let extra = Rc::new(RefCell::new(Vec::new()));

        let inner = Rc::clone(&notifier);
        let keep = Rc::clone(&extra);
        let _outer = notifier.subscribe(move |()| {
            keep.borrow_mut().push(inner.subscribe(|()| {}));
        });

        notifier.emit(&());

        assert_eq!(notifier.len(), 2);
        extra.borrow_mut().clear();
        assert_eq!(notifier.len(), 1);
    }

    #[test]
    fn explicit_unsubscribe_releases_listener() {
        let notifier = Notifier::<()>::new();
        let subscription = notifier.subscribe(|()| {});
        assert_eq!(notifier.len(), 1);
        subscription.unsubscribe();
        assert!(notifier.is_empty());
    }
}
