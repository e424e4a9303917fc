#![forbid(unsafe_code)]

//! Version-tracked shared values with change notification.
//!
//! Derived values in this crate keep their current snapshot in an
//! [`Observable`]. A rendering layer reads the snapshot with [`Observable::get`]
//! and learns about changes through [`Observable::subscribe`], which fires
//! synchronously inside the event reaction that changed the value.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op.
//! 4. Dropping a [`Subscription`] stops its callback before the next
//!    notification.
//! 5. Subscribers may read or write the observable from inside a callback;
//!    no borrow is held while callbacks run.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<T> = dyn Fn(&T);

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Callback<T>>>,
}

/// A shared, version-tracked value.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create an observable holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Clone out the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value, notifying subscribers if it changed.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.version = inner.version.wrapping_add(1);
        }
        self.notify();
    }

    /// Mutate the value in place, notifying subscribers if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    /// Number of changes applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Register a change callback. It stays registered while the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription::holding(strong)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn notify(&self) {
        let (snapshot, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            let callbacks: Vec<Rc<Callback<T>>> =
                inner.subscribers.iter().filter_map(Weak::upgrade).collect();
            (inner.value.clone(), callbacks)
        };
        for callback in callbacks {
            callback(&snapshot);
        }
    }
}

impl<T: Clone + PartialEq + std::fmt::Debug + 'static> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

/// RAII guard keeping a callback registered.
///
/// Dropping the guard releases the callback and then runs any cleanup
/// attached with [`Subscription::on_drop`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    hold: Option<Box<dyn Any>>,
    cleanup: Vec<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn holding(value: impl Any) -> Self {
        Self {
            hold: Some(Box::new(value)),
            cleanup: Vec::new(),
        }
    }

    /// A subscription that holds nothing.
    pub fn empty() -> Self {
        Self {
            hold: None,
            cleanup: Vec::new(),
        }
    }

    /// Attach cleanup to run when this subscription drops.
    #[must_use = "dropping a Subscription unsubscribes immediately"]
    pub fn on_drop(mut self, cleanup: impl FnOnce() + 'static) -> Self {
        self.cleanup.push(Box::new(cleanup));
        self
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hold.take();
        for cleanup in self.cleanup.drain(..) {
            cleanup();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.hold.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn set_bumps_version_only_on_change() {
        let obs = Observable::new(1);
        obs.set(1);
        assert_eq!(obs.version(), 0);
        obs.set(2);
        assert_eq!(obs.version(), 1);
        assert_eq!(obs.get(), 2);
    }

    #[test]
    fn subscribers_fire_in_order() {
        let obs = Observable::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let _a = obs.subscribe(move |v| l1.borrow_mut().push(("a", *v)));
        let l2 = Rc::clone(&log);
        let _b = obs.subscribe(move |v| l2.borrow_mut().push(("b", *v)));

        obs.set(5);
        assert_eq!(*log.borrow(), vec![("a", 5), ("b", 5)]);
    }

    #[test]
    fn dropped_subscription_stops_callback() {
        let obs = Observable::new(0);
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let sub = obs.subscribe(move |v| s.set(*v));
        obs.set(1);
        drop(sub);
        obs.set(2);
        assert_eq!(seen.get(), 1);
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn callback_may_read_and_write() {
        let obs = Observable::new(0);
        let inner = obs.clone();
        let _sub = obs.subscribe(move |v| {
            if *v < 3 {
                inner.set(inner.get() + 1);
            }
        });
        obs.set(1);
        assert_eq!(obs.get(), 3);
    }

    #[test]
    fn update_in_place() {
        let obs = Observable::new(vec![1]);
        obs.update(|v| v.push(2));
        assert_eq!(obs.get(), vec![1, 2]);
        assert_eq!(obs.version(), 1);
    }

    #[test]
    fn on_drop_cleanup_runs_after_release() {
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        let sub = Subscription::empty().on_drop(move || r.set(true));
        assert!(!ran.get());
        drop(sub);
        assert!(ran.get());
    }
}
