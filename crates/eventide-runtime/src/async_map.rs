#![forbid(unsafe_code)]

//! Lazily observed asynchronous derivations.
//!
//! An [`AsyncMap<I, O>`] turns an upstream [`AsyncSource<I>`] into an
//! [`AsyncMapState<O>`] by running an async mapper over each new resolved
//! input. The map does nothing while unobserved:
//!
//! - the first [`observe`](AsyncMap::observe) call subscribes to the
//!   upstream and samples it immediately;
//! - dropping the last observer drops the upstream subscription and forgets
//!   the last input, so the next observer re-samples from scratch.
//!
//! # Invariants
//!
//! 1. The mapper never runs while there are no observers.
//! 2. The mapper runs once per distinct resolved input; a pending or
//!    rejected upstream leaves the state untouched.
//! 3. Each mapper call is tagged with a generation. A settlement from a
//!    superseded call is dropped, so a slow early call cannot overwrite the
//!    result of a faster later one.
//! 4. A failed mapping keeps the previous value and sets `error`.
//!
//! # Failure Modes
//!
//! - Mapper returns `Err`, panics, or cannot be spawned: the state moves to
//!   errored with the matching [`Failure`].

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use eventide_core::{DisposeHook, Scope, ScopeError, panic_message};
use futures::future::{FutureExt, LocalBoxFuture};

use crate::async_value::{AsyncSource, AsyncValue};
use crate::error::Failure;
use crate::reactive::{Observable, Subscription};

/// Snapshot of an [`AsyncMap`].
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncMapState<O> {
    /// Latest successfully mapped value (kept across failures).
    pub value: Option<O>,
    /// Whether a mapping has succeeded (or an initial value was supplied).
    pub resolved: bool,
    /// Whether a mapper call is in flight.
    pub mapping: bool,
    /// Failure of the latest settled mapping, if it failed.
    pub error: Option<Failure>,
}

impl<O> AsyncMapState<O> {
    fn unresolved() -> Self {
        Self {
            value: None,
            resolved: false,
            mapping: false,
            error: None,
        }
    }

    /// Whether the latest settled mapping failed.
    #[must_use]
    pub fn errored(&self) -> bool {
        self.error.is_some()
    }
}

impl<O> Default for AsyncMapState<O> {
    fn default() -> Self {
        Self::unresolved()
    }
}

type Mapper<I, O> = Box<dyn Fn(I) -> LocalBoxFuture<'static, Result<O, Failure>>>;

struct AsyncMapInner<I, O> {
    scope: Scope,
    input: Rc<dyn AsyncSource<I>>,
    mapper: Mapper<I, O>,
    state: Observable<AsyncMapState<O>>,
    observers: Cell<usize>,
    upstream: RefCell<Option<Subscription>>,
    last_input: RefCell<Option<I>>,
    generation: Cell<u64>,
    mapper_calls: Cell<u64>,
    _teardown: RefCell<Option<DisposeHook>>,
}

impl<I, O> AsyncMapInner<I, O>
where
    I: Clone + PartialEq + 'static,
    O: Clone + PartialEq + 'static,
{
    fn start(self: &Rc<Self>) {
        if self.scope.is_disposed() {
            return;
        }
        let weak = Rc::downgrade(self);
        let upstream = self.input.watch(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.sync();
            }
        }));
        *self.upstream.borrow_mut() = Some(upstream);
        self.sync();
    }

    fn stop(&self) {
        let upstream = self.upstream.borrow_mut().take();
        drop(upstream);
        self.last_input.borrow_mut().take();
    }

    fn sync(self: &Rc<Self>) {
        let input = match self.input.snapshot() {
            AsyncValue::Resolved(input) => input,
            _ => {
                self.last_input.borrow_mut().take();
                return;
            }
        };
        if self.last_input.borrow().as_ref() == Some(&input) {
            return;
        }
        *self.last_input.borrow_mut() = Some(input.clone());
        self.map(input);
    }

    fn map(self: &Rc<Self>, input: I) {
        self.mapper_calls.set(self.mapper_calls.get() + 1);
        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);
        self.state.update(|s| s.mapping = true);

        let future = match catch_unwind(AssertUnwindSafe(|| (self.mapper)(input))) {
            Ok(future) => future,
            Err(payload) => {
                self.settle(generation, Err(Failure::Panicked(panic_message(payload.as_ref()))));
                return;
            }
        };
        let weak: Weak<Self> = Rc::downgrade(self);
        let task = async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(Failure::Panicked(panic_message(payload.as_ref()))),
            };
            if let Some(inner) = weak.upgrade() {
                inner.settle(generation, outcome);
            }
        };
        if let Err(err) = self.scope.spawn_local(task) {
            self.settle(generation, Err(err.into()));
        }
    }

    fn settle(&self, generation: u64, outcome: Result<O, Failure>) {
        if generation != self.generation.get() {
            tracing::trace!(generation, current = self.generation.get(), "stale mapping discarded");
            return;
        }
        match outcome {
            Ok(value) => self.state.set(AsyncMapState {
                value: Some(value),
                resolved: true,
                mapping: false,
                error: None,
            }),
            Err(error) => self.state.update(|s| {
                s.error = Some(error);
                s.mapping = false;
            }),
        }
    }
}

/// An observation-gated async derivation of an upstream value.
///
/// Cloning yields another handle to the same map.
pub struct AsyncMap<I, O> {
    inner: Rc<AsyncMapInner<I, O>>,
}

impl<I, O> Clone for AsyncMap<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<I, O> AsyncMap<I, O>
where
    I: Clone + PartialEq + 'static,
    O: Clone + PartialEq + 'static,
{
    /// Create a map in the current scope.
    ///
    /// # Errors
    ///
    /// [`ScopeError::NoCurrentScope`] outside of any entered scope.
    pub fn new<F>(
        input: impl AsyncSource<I> + 'static,
        mapper: impl Fn(I) -> F + 'static,
    ) -> Result<Self, ScopeError>
    where
        F: Future<Output = Result<O, Failure>> + 'static,
    {
        let scope = Scope::required_current()?;
        Ok(Self::in_scope(&scope, input, mapper))
    }

    /// Create a map anchored to `scope`.
    pub fn in_scope<F>(
        scope: &Scope,
        input: impl AsyncSource<I> + 'static,
        mapper: impl Fn(I) -> F + 'static,
    ) -> Self
    where
        F: Future<Output = Result<O, Failure>> + 'static,
    {
        let inner = Rc::new(AsyncMapInner {
            scope: scope.clone(),
            input: Rc::new(input),
            mapper: Box::new(move |i| mapper(i).boxed_local()),
            state: Observable::new(AsyncMapState::unresolved()),
            observers: Cell::new(0),
            upstream: RefCell::new(None),
            last_input: RefCell::new(None),
            generation: Cell::new(0),
            mapper_calls: Cell::new(0),
            _teardown: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        let hook = scope.dispose_hook(move || {
            if let Some(inner) = weak.upgrade() {
                inner.stop();
            }
        });
        *inner._teardown.borrow_mut() = Some(hook);
        Self { inner }
    }

    /// Start out resolved with `value`.
    #[must_use]
    pub fn with_initial(self, value: O) -> Self {
        self.inner.state.set(AsyncMapState {
            value: Some(value),
            resolved: true,
            mapping: false,
            error: None,
        });
        self
    }

    /// Observe state changes. The first observer activates the map; dropping
    /// the last one deactivates it.
    pub fn observe(&self, callback: impl Fn(&AsyncMapState<O>) + 'static) -> Subscription {
        let subscription = self.inner.state.subscribe(callback);
        let count = self.inner.observers.get() + 1;
        self.inner.observers.set(count);
        if count == 1 {
            self.inner.start();
        }
        let weak = Rc::downgrade(&self.inner);
        subscription.on_drop(move || {
            if let Some(inner) = weak.upgrade() {
                let count = inner.observers.get().saturating_sub(1);
                inner.observers.set(count);
                if count == 0 {
                    inner.stop();
                }
            }
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AsyncMapState<O> {
        self.inner.state.get()
    }

    /// Latest mapped value.
    #[must_use]
    pub fn value(&self) -> Option<O> {
        self.inner.state.with(|s| s.value.clone())
    }

    /// Whether a value is available.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.state.with(|s| s.resolved)
    }

    /// Whether a mapper call is in flight.
    #[must_use]
    pub fn is_mapping(&self) -> bool {
        self.inner.state.with(|s| s.mapping)
    }

    /// Failure of the latest settled mapping.
    #[must_use]
    pub fn error(&self) -> Option<Failure> {
        self.inner.state.with(|s| s.error.clone())
    }

    /// Whether the latest settled mapping failed.
    #[must_use]
    pub fn is_errored(&self) -> bool {
        self.inner.state.with(AsyncMapState::errored)
    }

    /// Number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.get()
    }

    /// Whether the map is currently following its upstream.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.upstream.borrow().is_some()
    }

    /// Total mapper invocations so far.
    #[must_use]
    pub fn mapper_calls(&self) -> u64 {
        self.inner.mapper_calls.get()
    }
}

impl<I, O> AsyncSource<O> for AsyncMap<I, O>
where
    I: Clone + PartialEq + 'static,
    O: Clone + PartialEq + 'static,
{
    fn snapshot(&self) -> AsyncValue<O> {
        self.inner.state.with(|s| match (&s.error, s.resolved) {
            (Some(err), _) => AsyncValue::Rejected(s.value.clone(), err.clone()),
            (None, true) => s
                .value
                .clone()
                .map_or(AsyncValue::Pending, AsyncValue::Resolved),
            (None, false) => AsyncValue::Pending,
        })
    }

    fn watch(&self, on_change: Box<dyn Fn()>) -> Subscription {
        self.observe(move |_| on_change())
    }
}

impl<I, O: Clone + PartialEq + std::fmt::Debug + 'static> std::fmt::Debug for AsyncMap<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMap")
            .field("state", &self.inner.state.get())
            .field("observers", &self.inner.observers.get())
            .finish()
    }
}
