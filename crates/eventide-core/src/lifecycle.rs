#![forbid(unsafe_code)]

//! One-shot, cascading disposal signals.
//!
//! A [`Lifecycle`] is the disposal half of a scope. It fires its dispose
//! listeners exactly once, in registration order, and then forgets them.
//! Child lifecycles register themselves as a dispose listener on their parent
//! at construction, so disposing a parent cascades synchronously through the
//! whole subtree before `dispose()` returns.
//!
//! # Invariants
//!
//! 1. `is_disposed()` is monotonic: once true it never goes back.
//! 2. Every listener registered before disposal runs exactly once.
//! 3. Listeners registered after disposal are dropped without running.
//! 4. A child that disposes itself removes its registration from the parent,
//!    so long-lived parents do not accumulate dead listeners.
//! 5. The parent never owns the child: the cascade closure holds a `Weak`.
//!
//! # Failure Modes
//!
//! - A panicking dispose listener is caught and logged; the remaining
//!   listeners still run and `dispose()` returns normally.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

/// Key of a registered dispose listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisposeKey(u64);

impl DisposeKey {
    /// Raw key value.
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

type DisposeListener = Box<dyn FnOnce()>;

struct LifecycleInner {
    disposed: Cell<bool>,
    parent: Option<Weak<LifecycleInner>>,
    parent_key: Cell<Option<DisposeKey>>,
    listeners: RefCell<Vec<(DisposeKey, DisposeListener)>>,
    next_key: Cell<u64>,
    wakers: RefCell<Vec<(u64, Waker)>>,
    next_waiter: Cell<u64>,
}

/// A disposal signal node with optional parent.
///
/// Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Rc<LifecycleInner>,
}

impl Lifecycle {
    /// Create a root lifecycle.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parent_ref(None)
    }

    /// Create a lifecycle that is disposed whenever `parent` is.
    ///
    /// A child created under an already-disposed parent starts out disposed.
    #[must_use]
    pub fn child_of(parent: &Lifecycle) -> Self {
        let child = Self::with_parent_ref(Some(Rc::downgrade(&parent.inner)));
        if parent.is_disposed() {
            child.inner.disposed.set(true);
            return child;
        }

        let weak = Rc::downgrade(&child.inner);
        let key = parent.add_dispose_listener(move || {
            if let Some(inner) = weak.upgrade() {
                Lifecycle { inner }.dispose();
            }
        });
        child.inner.parent_key.set(key);
        child
    }

    fn with_parent_ref(parent: Option<Weak<LifecycleInner>>) -> Self {
        Self {
            inner: Rc::new(LifecycleInner {
                disposed: Cell::new(false),
                parent,
                parent_key: Cell::new(None),
                listeners: RefCell::new(Vec::new()),
                next_key: Cell::new(0),
                wakers: RefCell::new(Vec::new()),
                next_waiter: Cell::new(0),
            }),
        }
    }

    /// Whether this lifecycle has been disposed.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Whether this lifecycle was created with a parent.
    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.inner.parent.is_some()
    }

    /// Register a listener that runs once when this lifecycle disposes.
    ///
    /// Returns `None` (and drops the listener) if already disposed.
    pub fn add_dispose_listener(&self, listener: impl FnOnce() + 'static) -> Option<DisposeKey> {
        if self.is_disposed() {
            return None;
        }
        let key = DisposeKey(self.inner.next_key.get());
        self.inner.next_key.set(key.0.wrapping_add(1));
        self.inner
            .listeners
            .borrow_mut()
            .push((key, Box::new(listener)));
        Some(key)
    }

    /// Remove a previously registered listener without running it.
    pub fn remove_dispose_listener(&self, key: DisposeKey) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(k, _)| *k != key);
        listeners.len() != before
    }

    /// Register a listener bound to the returned hook.
    ///
    /// Dropping the hook deregisters the listener if it has not run yet.
    pub fn hook(&self, listener: impl FnOnce() + 'static) -> DisposeHook {
        DisposeHook {
            lifecycle: Rc::downgrade(&self.inner),
            key: self.add_dispose_listener(listener),
        }
    }

    /// Number of listeners waiting for disposal.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Dispose this lifecycle. Idempotent and non-panicking.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }

        let listeners = std::mem::take(&mut *self.inner.listeners.borrow_mut());
        for (key, listener) in listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(listener));
            if let Err(payload) = outcome {
                tracing::error!(
                    listener = key.id(),
                    panic = %panic_message(payload.as_ref()),
                    "dispose listener panicked"
                );
            }
        }

        let wakers = std::mem::take(&mut *self.inner.wakers.borrow_mut());
        for (_, waker) in wakers {
            waker.wake();
        }

        if let Some(key) = self.inner.parent_key.take()
            && let Some(parent) = self.inner.parent.as_ref().and_then(Weak::upgrade)
        {
            Lifecycle { inner: parent }.remove_dispose_listener(key);
        }
    }

    /// Future that completes once this lifecycle is disposed.
    #[must_use]
    pub fn disposed(&self) -> Disposed {
        Disposed {
            lifecycle: self.clone(),
            slot: None,
        }
    }

    /// Number of pending [`Disposed`] futures waiting on this lifecycle.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.inner.wakers.borrow().len()
    }

    /// Whether two handles point at the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Lifecycle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("disposed", &self.is_disposed())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Completion signal of a [`Lifecycle`].
///
/// A pending future owns one waker slot on the lifecycle. Re-polling
/// replaces the waker in that slot and dropping the future frees it.
#[must_use = "futures do nothing unless polled"]
pub struct Disposed {
    lifecycle: Lifecycle,
    slot: Option<u64>,
}

impl Future for Disposed {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let inner = &this.lifecycle.inner;
        if inner.disposed.get() {
            this.slot = None;
            return Poll::Ready(());
        }
        let mut wakers = inner.wakers.borrow_mut();
        let existing = this
            .slot
            .and_then(|slot| wakers.iter().position(|(id, _)| *id == slot));
        match existing {
            Some(index) => {
                let (_, waker) = &mut wakers[index];
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            }
            None => {
                let slot = inner.next_waiter.get();
                inner.next_waiter.set(slot.wrapping_add(1));
                wakers.push((slot, cx.waker().clone()));
                this.slot = Some(slot);
            }
        }
        Poll::Pending
    }
}

impl Drop for Disposed {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.lifecycle
                .inner
                .wakers
                .borrow_mut()
                .retain(|(id, _)| *id != slot);
        }
    }
}

impl std::fmt::Debug for Disposed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposed")
            .field("ready", &self.lifecycle.is_disposed())
            .finish()
    }
}

/// RAII registration of a dispose listener.
///
/// Dropping the hook removes the listener if the lifecycle is still alive and
/// has not fired. Use [`DisposeHook::keep`] to leave it registered.
#[must_use = "dropping the hook deregisters the dispose listener"]
pub struct DisposeHook {
    lifecycle: Weak<LifecycleInner>,
    key: Option<DisposeKey>,
}

impl DisposeHook {
    /// Whether the listener was actually registered.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.key.is_some()
    }

    /// Leave the listener registered for the rest of the lifecycle.
    pub fn keep(mut self) {
        self.key = None;
    }
}

impl Drop for DisposeHook {
    fn drop(&mut self) {
        if let Some(key) = self.key.take()
            && let Some(inner) = self.lifecycle.upgrade()
        {
            Lifecycle { inner }.remove_dispose_listener(key);
        }
    }
}

impl std::fmt::Debug for DisposeHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposeHook")
            .field("key", &self.key)
            .finish()
    }
}

/// Render a caught panic payload for logging.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
