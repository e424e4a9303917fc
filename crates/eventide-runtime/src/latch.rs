#![forbid(unsafe_code)]

//! Latches: derived reads that hold back some updates.
//!
//! Both latches are pull-based. Nothing is recomputed until someone reads
//! `value()`.
//!
//! - [`LastValidValueLatch`] keeps showing the last resolved upstream value
//!   while the upstream is pending or failed (e.g. a second query errors and
//!   the view keeps the first result).
//! - [`GatedLatch`] freezes its value while gated, and the gate is usually
//!   driven by events (e.g. hold the user's input on screen while a submit
//!   is in flight).

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::async_value::{AsyncSource, AsyncValue};
use crate::event::{EventRegistry, EventSubscription};
use crate::reactive::Binding;
use crate::tick;

/// Returns the most recent resolved value of an upstream getter.
pub struct LastValidValueLatch<T> {
    getter: Box<dyn Fn() -> AsyncValue<T>>,
    last: RefCell<Option<T>>,
}

impl<T: Clone + 'static> LastValidValueLatch<T> {
    /// Latch over `getter`, empty until the first resolved read.
    pub fn new(getter: impl Fn() -> AsyncValue<T> + 'static) -> Self {
        Self {
            getter: Box::new(getter),
            last: RefCell::new(None),
        }
    }

    /// Latch over `getter`, seeded with `initial`.
    pub fn with_initial(getter: impl Fn() -> AsyncValue<T> + 'static, initial: T) -> Self {
        Self {
            getter: Box::new(getter),
            last: RefCell::new(Some(initial)),
        }
    }

    /// Latch over an async source's snapshot.
    pub fn from_source(source: impl AsyncSource<T> + 'static) -> Self {
        Self::new(move || source.snapshot())
    }

    /// Latch over an async binding.
    pub fn from_binding(binding: Binding<AsyncValue<T>>) -> Self {
        Self::new(binding.into_getter())
    }

    /// Read the upstream, adopting it if resolved.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        if let AsyncValue::Resolved(value) = (self.getter)() {
            *self.last.borrow_mut() = Some(value.clone());
            return Some(value);
        }
        self.last.borrow().clone()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LastValidValueLatch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastValidValueLatch")
            .field("last", &self.last.borrow())
            .finish()
    }
}

struct GatedInner<T> {
    getter: Box<dyn Fn() -> T>,
    gated: Cell<bool>,
    held: RefCell<Option<T>>,
}

impl<T: Clone> GatedInner<T> {
    fn gate(&self) {
        let value = (self.getter)();
        *self.held.borrow_mut() = Some(value);
        self.gated.set(true);
    }

    fn open(&self) {
        self.gated.set(false);
    }
}

/// Follows a getter live while open; holds the gating-time value while gated.
///
/// Cloning yields another handle to the same latch.
pub struct GatedLatch<T> {
    inner: Rc<GatedInner<T>>,
}

impl<T> Clone for GatedLatch<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> GatedLatch<T> {
    /// Latch over `getter`, initially open.
    pub fn new(getter: impl Fn() -> T + 'static) -> Self {
        Self {
            inner: Rc::new(GatedInner {
                getter: Box::new(getter),
                gated: Cell::new(false),
                held: RefCell::new(None),
            }),
        }
    }

    /// Latch over a binding.
    pub fn from_binding(binding: Binding<T>) -> Self {
        Self::new(binding.into_getter())
    }

    /// Current value: live while open, held while gated.
    #[must_use]
    pub fn value(&self) -> T {
        if self.inner.gated.get()
            && let Some(held) = self.inner.held.borrow().as_ref()
        {
            return held.clone();
        }
        let value = (self.inner.getter)();
        *self.inner.held.borrow_mut() = Some(value.clone());
        value
    }

    /// Whether the latch is holding its value.
    #[must_use]
    pub fn is_gated(&self) -> bool {
        self.inner.gated.get()
    }

    /// Capture the current value and hold it.
    pub fn gate(&self) {
        self.inner.gate();
    }

    /// Resume following the getter.
    pub fn open(&self) {
        self.inner.open();
    }

    /// Drive the gate from `registry`: `mapper` returning `true` gates,
    /// `false` opens. The link lasts until the returned subscription drops
    /// (or the registry's scope disposes).
    ///
    /// A panicking `mapper` is logged and the event ignored.
    pub fn configure_with_event<E: 'static>(
        &self,
        registry: &EventRegistry<E>,
        mapper: impl Fn(&E) -> bool + 'static,
    ) -> EventSubscription<E> {
        let weak: Weak<GatedInner<T>> = Rc::downgrade(&self.inner);
        registry.subscribe(move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match tick::isolate("latch handler", || mapper(event)) {
                Some(true) => inner.gate(),
                Some(false) => inner.open(),
                None => {}
            }
        })
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for GatedLatch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedLatch")
            .field("gated", &self.inner.gated.get())
            .field("held", &self.inner.held.borrow())
            .finish()
    }
}
