#![forbid(unsafe_code)]

//! Values folded from events.
//!
//! A [`ReducedValue<T>`] starts from an initial value and replaces it with
//! `reducer(&current, &event)` every time one of its bound registries emits.
//! The update happens synchronously inside the event's dispatch, so a reader
//! never observes an intermediate state.
//!
//! ```
//! use eventide_runtime::{EventRegistry, ReducedValue};
//! use eventide_core::Scope;
//!
//! let scope = Scope::detached();
//! let clicked = EventRegistry::<()>::new(&scope);
//! let count = ReducedValue::builder()
//!     .add_reducer(&clicked, |n: &u32, _| n + 1)
//!     .build_in(&scope, 0);
//!
//! clicked.emit_once(());
//! clicked.emit_once(());
//! assert_eq!(count.value(), 2);
//! ```
//!
//! # Invariants
//!
//! 1. A reducer that panics is logged and treated as "no change"; later
//!    events and other reducers keep working.
//! 2. The bindings live until the scope the value was built in disposes.
//!    Afterwards the value is frozen.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use eventide_core::{DisposeHook, Scope};

use crate::async_value::{AsyncSource, AsyncValue};
use crate::event::EventRegistry;
use crate::reactive::{Binding, Observable, Subscription};
use crate::tick;

struct ReducedInner<T> {
    value: Observable<T>,
    scope: Scope,
    bindings: RefCell<Vec<Box<dyn Any>>>,
    _teardown: RefCell<Option<DisposeHook>>,
}

type Binder<T> = Box<dyn FnOnce(Weak<ReducedInner<T>>) -> Box<dyn Any>>;

/// Accumulates `(registry, reducer)` pairs for a [`ReducedValue`].
#[must_use = "call build() to start listening"]
pub struct ReducedValueBuilder<T> {
    binders: Vec<Binder<T>>,
}

impl<T: Clone + PartialEq + 'static> ReducedValueBuilder<T> {
    /// Fold events from `registry` through `reducer`.
    pub fn add_reducer<E: 'static>(
        mut self,
        registry: &EventRegistry<E>,
        reducer: impl Fn(&T, &E) -> T + 'static,
    ) -> Self {
        let registry = registry.clone();
        self.binders.push(Box::new(move |target: Weak<ReducedInner<T>>| {
            let name = registry.name().to_owned();
            let subscription = registry.subscribe(move |event: &E| {
                let Some(inner) = target.upgrade() else {
                    return;
                };
                let next = tick::isolate("reducer", || inner.value.with(|current| reducer(current, event)));
                match next {
                    Some(next) => inner.value.set(next),
                    None => tracing::trace!(registry = %name, "reducer skipped after panic"),
                }
            });
            Box::new(subscription)
        }));
        self
    }

    /// Number of bound reducers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.binders.len()
    }

    /// Whether no reducer has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }

    /// Start listening for the lifetime of the current scope.
    pub fn build(self, initial: T) -> ReducedValue<T> {
        self.build_in(&Scope::current(), initial)
    }

    /// Start listening for the lifetime of `scope`.
    pub fn build_in(self, scope: &Scope, initial: T) -> ReducedValue<T> {
        let inner = Rc::new(ReducedInner {
            value: Observable::new(initial),
            scope: scope.clone(),
            bindings: RefCell::new(Vec::new()),
            _teardown: RefCell::new(None),
        });
        if scope.is_disposed() {
            return ReducedValue { inner };
        }
        let bindings: Vec<Box<dyn Any>> = self
            .binders
            .into_iter()
            .map(|bind| bind(Rc::downgrade(&inner)))
            .collect();
        *inner.bindings.borrow_mut() = bindings;

        let weak = Rc::downgrade(&inner);
        let hook = scope.dispose_hook(move || {
            if let Some(inner) = weak.upgrade() {
                let dropped = std::mem::take(&mut *inner.bindings.borrow_mut());
                drop(dropped);
            }
        });
        *inner._teardown.borrow_mut() = Some(hook);
        ReducedValue { inner }
    }
}

impl<T> std::fmt::Debug for ReducedValueBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReducedValueBuilder")
            .field("reducers", &self.binders.len())
            .finish()
    }
}

/// A value derived by folding events.
///
/// Cloning yields another handle to the same value.
pub struct ReducedValue<T> {
    inner: Rc<ReducedInner<T>>,
}

impl<T> Clone for ReducedValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> ReducedValue<T> {
    /// Start a builder.
    pub fn builder() -> ReducedValueBuilder<T> {
        ReducedValueBuilder {
            binders: Vec::new(),
        }
    }

    /// Hold the latest event from `registry`.
    pub fn last_event_value(registry: &EventRegistry<T>, initial: T) -> Self {
        Self::last_event_value_filtered(registry, initial, |_| true)
    }

    /// Hold the latest event from `registry` that passes `filter`.
    pub fn last_event_value_filtered(
        registry: &EventRegistry<T>,
        initial: T,
        filter: impl Fn(&T) -> bool + 'static,
    ) -> Self {
        Self::last_mapped_event_value_filtered(registry, initial, T::clone, filter)
    }

    /// Hold `mapper(event)` for the latest event from `registry`.
    pub fn last_mapped_event_value<E: 'static>(
        registry: &EventRegistry<E>,
        initial: T,
        mapper: impl Fn(&E) -> T + 'static,
    ) -> Self {
        Self::last_mapped_event_value_filtered(registry, initial, mapper, |_| true)
    }

    /// Hold `mapper(event)` for the latest event passing `filter`; other
    /// events leave the value unchanged.
    pub fn last_mapped_event_value_filtered<E: 'static>(
        registry: &EventRegistry<E>,
        initial: T,
        mapper: impl Fn(&E) -> T + 'static,
        filter: impl Fn(&E) -> bool + 'static,
    ) -> Self {
        Self::builder()
            .add_reducer(registry, move |current, event| {
                if filter(event) {
                    mapper(event)
                } else {
                    current.clone()
                }
            })
            .build(initial)
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> T {
        self.inner.value.get()
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.value.with(f)
    }

    /// Number of changes applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.value.version()
    }

    /// Notify `callback` after each change.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.value.subscribe(callback)
    }

    /// Read binding to this value.
    #[must_use]
    pub fn as_binding(&self) -> Binding<T> {
        let this = self.clone();
        Binding::new(move || this.value())
    }

    /// Scope the value was built in.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// Whether the value is still listening to its registries.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        !self.inner.bindings.borrow().is_empty()
    }
}

impl<T: Clone + PartialEq + 'static> AsyncSource<T> for ReducedValue<T> {
    fn snapshot(&self) -> AsyncValue<T> {
        AsyncValue::Resolved(self.value())
    }

    fn watch(&self, on_change: Box<dyn Fn()>) -> Subscription {
        self.inner.value.subscribe(move |_| on_change())
    }
}

impl<T: Clone + PartialEq + std::fmt::Debug + 'static> std::fmt::Debug for ReducedValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReducedValue")
            .field("value", &self.value())
            .field("version", &self.version())
            .finish()
    }
}

/// The latest event of a registry, pending until the first one arrives.
pub struct LastEventValue<T> {
    value: ReducedValue<AsyncValue<T>>,
}

impl<T> Clone for LastEventValue<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> LastEventValue<T> {
    /// Track `registry` for the lifetime of its own scope.
    pub fn new(registry: &EventRegistry<T>) -> Self {
        Self::in_scope(registry, registry.scope())
    }

    /// Track `registry` until `scope` disposes.
    pub fn in_scope(registry: &EventRegistry<T>, scope: &Scope) -> Self {
        let value = ReducedValue::builder()
            .add_reducer(registry, |_, event: &T| AsyncValue::Resolved(event.clone()))
            .build_in(scope, AsyncValue::Pending);
        Self { value }
    }

    /// Pending, or the latest event.
    #[must_use]
    pub fn value(&self) -> AsyncValue<T> {
        self.value.value()
    }

    /// The latest event, if any arrived.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.value.value().into_value()
    }

    /// Whether at least one event arrived.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.value.with(AsyncValue::is_resolved)
    }

    /// Notify `callback` after each event.
    pub fn subscribe(&self, callback: impl Fn(&AsyncValue<T>) + 'static) -> Subscription {
        self.value.subscribe(callback)
    }
}

impl<T: Clone + PartialEq + 'static> AsyncSource<T> for LastEventValue<T> {
    fn snapshot(&self) -> AsyncValue<T> {
        self.value()
    }

    fn watch(&self, on_change: Box<dyn Fn()>) -> Subscription {
        self.value.subscribe(move |_| on_change())
    }
}

impl<T: Clone + PartialEq + std::fmt::Debug + 'static> std::fmt::Debug for LastEventValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastEventValue")
            .field("value", &self.value())
            .finish()
    }
}
