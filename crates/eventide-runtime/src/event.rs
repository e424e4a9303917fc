#![forbid(unsafe_code)]

//! Typed, scoped event registries.
//!
//! An [`EventRegistry<T>`] delivers events to:
//!
//! - direct listeners registered with [`on`](EventRegistry::on) /
//!   [`subscribe`](EventRegistry::subscribe),
//! - pull consumers created by [`listen`](EventRegistry::listen) (a
//!   [`Stream`]),
//! - linked registries declared with [`link_to`](EventRegistry::link_to) and
//!   friends.
//!
//! Every emission goes through the root-tick dispatcher (see [`crate::tick`]):
//! a reaction that emits does not recurse, it queues onto the running tick.
//!
//! A registry is anchored to one [`Scope`]. When that scope disposes, every
//! listener and link is dropped and later emissions are silent no-ops.
//!
//! # Invariants
//!
//! 1. Listeners run in registration order.
//! 2. Listeners may register or remove listeners while being dispatched;
//!    dispatch iterates over a snapshot.
//! 3. Disposing the scope mid-dispatch stops delivery to the remaining
//!    listeners of that event.
//! 4. A registry keeps no history: a listener only sees events emitted after
//!    it registered.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::Location;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use eventide_core::{DisposeHook, DisposeKey, Lifecycle, Scope};
use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{FusedStream, Stream};

use crate::tick;

/// Identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw id value.
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

type Listener<T> = Rc<dyn Fn(&T)>;

struct RegistryInner<T> {
    scope: Scope,
    name: Cow<'static, str>,
    listeners: RefCell<Vec<(ListenerId, Listener<T>)>>,
    next_id: Cell<u64>,
    _teardown: RefCell<Option<DisposeHook>>,
}

impl<T: 'static> RegistryInner<T> {
    fn dispatch(&self, event: &T) {
        if self.scope.is_disposed() {
            return;
        }
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        tracing::trace!(registry = %self.name, listeners = snapshot.len(), "dispatching event");
        for listener in snapshot {
            if self.scope.is_disposed() {
                break;
            }
            tick::run_listener(|| listener(event));
        }
    }
}

/// A typed event bus anchored to a scope.
///
/// Cloning yields another handle to the same registry.
pub struct EventRegistry<T> {
    inner: Rc<RegistryInner<T>>,
}

impl<T> Clone for EventRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> EventRegistry<T> {
    /// Create a registry in `scope`, named after the caller's location.
    #[track_caller]
    #[must_use]
    pub fn new(scope: &Scope) -> Self {
        let location = Location::caller();
        Self::named(scope, format!("{}:{}", location.file(), location.line()))
    }

    /// Create a registry in the current ambient scope.
    #[track_caller]
    #[must_use]
    pub fn in_current() -> Self {
        Self::new(&Scope::current())
    }

    /// Create a registry with an explicit diagnostic name.
    #[must_use]
    pub fn named(scope: &Scope, name: impl Into<Cow<'static, str>>) -> Self {
        let inner = Rc::new(RegistryInner {
            scope: scope.clone(),
            name: name.into(),
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            _teardown: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        let hook = scope.dispose_hook(move || {
            if let Some(inner) = weak.upgrade() {
                let dropped = std::mem::take(&mut *inner.listeners.borrow_mut());
                tracing::trace!(registry = %inner.name, listeners = dropped.len(), "registry torn down");
            }
        });
        *inner._teardown.borrow_mut() = Some(hook);
        Self { inner }
    }

    /// Owning scope.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// Diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the owning scope has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.scope.is_disposed()
    }

    /// Number of registered listeners (including links and consumers).
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Emit `event`, starting a root tick or queueing onto the running one.
    ///
    /// A no-op once the owning scope is disposed.
    pub fn emit_once(&self, event: T) {
        if self.is_disposed() {
            tracing::trace!(registry = %self.inner.name, "emit after disposal ignored");
            return;
        }
        let inner = Rc::clone(&self.inner);
        tick::run_or_defer(&self.inner.name, Box::new(move || inner.dispatch(&event)));
    }

    /// Register a listener for the lifetime of the scope.
    ///
    /// Ignored (but still returns an id) once the scope is disposed.
    pub fn on(&self, listener: impl Fn(&T) + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_id.get());
        self.inner.next_id.set(id.0.wrapping_add(1));
        if !self.is_disposed() {
            self.inner
                .listeners
                .borrow_mut()
                .push((id, Rc::new(listener)));
        }
        id
    }

    /// Remove a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Register a listener that is removed when the guard drops.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> EventSubscription<T> {
        let id = self.on(listener);
        EventSubscription {
            registry: Rc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// A cheap handle that emits into this registry.
    #[must_use]
    pub fn emitter(&self) -> Emitter<T> {
        Emitter {
            registry: Rc::downgrade(&self.inner),
        }
    }

    /// Adapt a callback-style external source into this registry.
    ///
    /// `register` receives an [`Emitter`] and returns the source's unregister
    /// function. The unregister function runs when the scope disposes, or
    /// earlier through [`SourceHandle::unregister`]. If the scope is already
    /// disposed, `register` is not called.
    pub fn register_source<F, U>(&self, register: F) -> SourceHandle
    where
        F: FnOnce(Emitter<T>) -> U,
        U: FnOnce() + 'static,
    {
        if self.is_disposed() {
            return SourceHandle::noop();
        }
        let unregister = register(self.emitter());
        let slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>> =
            Rc::new(RefCell::new(Some(Box::new(unregister))));
        let on_dispose = Rc::clone(&slot);
        let key = self.inner.scope.on_dispose(move || {
            let taken = on_dispose.borrow_mut().take();
            if let Some(unregister) = taken {
                unregister();
            }
        });
        SourceHandle {
            slot,
            lifecycle: Some(self.inner.scope.lifecycle().clone()),
            key,
        }
    }

    /// Pull-based consumption, ending when the owning scope disposes.
    pub fn listen(&self) -> EventStream<T>
    where
        T: Clone,
    {
        self.listen_until(std::iter::empty())
    }

    /// Pull-based consumption that also ends when any of `stops` fires.
    pub fn listen_until(&self, stops: impl IntoIterator<Item = StopSignal>) -> EventStream<T>
    where
        T: Clone,
    {
        let mut signals: Vec<LocalBoxFuture<'static, ()>> =
            vec![self.inner.scope.lifecycle().disposed().boxed_local()];
        signals.extend(stops.into_iter().map(StopSignal::into_future));
        EventStream {
            registry: self.clone(),
            queue: Rc::new(RefCell::new(StreamQueue {
                items: VecDeque::new(),
                waiter: None,
            })),
            subscription: None,
            stops: signals,
            finished: false,
        }
    }

    /// Re-emit every event on `target`.
    pub fn link_to(&self, target: &EventRegistry<T>) -> ListenerId
    where
        T: Clone,
    {
        self.link(target, T::clone, |_| true)
    }

    /// Re-emit events passing `condition` on `target`.
    pub fn link_to_filtered(
        &self,
        target: &EventRegistry<T>,
        condition: impl Fn(&T) -> bool + 'static,
    ) -> ListenerId
    where
        T: Clone,
    {
        self.link(target, T::clone, condition)
    }

    /// Re-emit every event on `target`, transformed by `mapper`.
    pub fn link_to_with_mapper<U: 'static>(
        &self,
        target: &EventRegistry<U>,
        mapper: impl Fn(&T) -> U + 'static,
    ) -> ListenerId {
        self.link(target, mapper, |_| true)
    }

    /// Re-emit events passing `condition` on `target`, transformed by `mapper`.
    pub fn link_to_with_mapper_filtered<U: 'static>(
        &self,
        target: &EventRegistry<U>,
        mapper: impl Fn(&T) -> U + 'static,
        condition: impl Fn(&T) -> bool + 'static,
    ) -> ListenerId {
        self.link(target, mapper, condition)
    }

    fn link<U: 'static>(
        &self,
        target: &EventRegistry<U>,
        mapper: impl Fn(&T) -> U + 'static,
        condition: impl Fn(&T) -> bool + 'static,
    ) -> ListenerId {
        let target = target.clone();
        self.on(move |event| {
            if condition(event) {
                target.emit_once(mapper(event));
            }
        })
    }
}

impl<T> std::fmt::Debug for EventRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("name", &self.inner.name)
            .field("listeners", &self.inner.listeners.borrow().len())
            .field("disposed", &self.inner.scope.is_disposed())
            .finish()
    }
}

/// Weak emitting handle handed to external sources.
pub struct Emitter<T> {
    registry: Weak<RegistryInner<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Weak::clone(&self.registry),
        }
    }
}

impl<T: 'static> Emitter<T> {
    /// Emit into the registry if it is still alive.
    pub fn emit(&self, event: T) {
        if let Some(inner) = self.registry.upgrade() {
            EventRegistry { inner }.emit_once(event);
        }
    }
}

impl<T> std::fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("alive", &(self.registry.strong_count() > 0))
            .finish()
    }
}

/// RAII listener registration returned by [`EventRegistry::subscribe`].
#[must_use = "dropping the subscription removes the listener"]
pub struct EventSubscription<T> {
    registry: Weak<RegistryInner<T>>,
    id: Option<ListenerId>,
}

impl<T> EventSubscription<T> {
    /// The listener id.
    #[must_use]
    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    /// Keep the listener registered for the rest of the scope.
    pub fn detach(mut self) {
        self.id = None;
    }
}

impl<T> Drop for EventSubscription<T> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take()
            && let Some(inner) = self.registry.upgrade()
        {
            inner.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
        }
    }
}

impl<T> std::fmt::Debug for EventSubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("id", &self.id)
            .finish()
    }
}

/// Handle for an external source attached with
/// [`EventRegistry::register_source`].
///
/// Dropping the handle leaves the source attached until scope disposal.
pub struct SourceHandle {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
    lifecycle: Option<Lifecycle>,
    key: Option<DisposeKey>,
}

impl SourceHandle {
    fn noop() -> Self {
        Self {
            slot: Rc::new(RefCell::new(None)),
            lifecycle: None,
            key: None,
        }
    }

    /// Whether the source is still attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Detach the source now. Idempotent.
    pub fn unregister(&self) {
        if let (Some(lifecycle), Some(key)) = (&self.lifecycle, self.key) {
            lifecycle.remove_dispose_listener(key);
        }
        let taken = self.slot.borrow_mut().take();
        if let Some(unregister) = taken {
            unregister();
        }
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Additional condition that ends an [`EventStream`].
pub enum StopSignal {
    /// Stop when this scope disposes.
    Scope(Scope),
    /// Stop when this lifecycle disposes.
    Lifecycle(Lifecycle),
    /// Stop when this future completes.
    Future(LocalBoxFuture<'static, ()>),
}

impl StopSignal {
    /// Stop when `future` completes (e.g. an abort channel).
    pub fn future(future: impl std::future::Future<Output = ()> + 'static) -> Self {
        Self::Future(future.boxed_local())
    }

    fn into_future(self) -> LocalBoxFuture<'static, ()> {
        match self {
            Self::Scope(scope) => scope.lifecycle().disposed().boxed_local(),
            Self::Lifecycle(lifecycle) => lifecycle.disposed().boxed_local(),
            Self::Future(future) => future,
        }
    }
}

impl From<Scope> for StopSignal {
    fn from(scope: Scope) -> Self {
        Self::Scope(scope)
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scope(scope) => f.debug_tuple("Scope").field(scope).finish(),
            Self::Lifecycle(lifecycle) => f.debug_tuple("Lifecycle").field(lifecycle).finish(),
            Self::Future(_) => f.write_str("Future(..)"),
        }
    }
}

struct StreamQueue<T> {
    items: VecDeque<T>,
    waiter: Option<Waker>,
}

/// Pull-based view of a registry's events.
///
/// The stream attaches to the registry on first poll and buffers every event
/// until consumed (no backpressure). It ends when the owning scope disposes
/// or any stop signal fires; a stop wins over buffered events.
#[must_use = "streams do nothing unless polled"]
pub struct EventStream<T> {
    registry: EventRegistry<T>,
    queue: Rc<RefCell<StreamQueue<T>>>,
    subscription: Option<EventSubscription<T>>,
    stops: Vec<LocalBoxFuture<'static, ()>>,
    finished: bool,
}

impl<T: Clone + 'static> EventStream<T> {
    fn finish(&mut self) {
        self.finished = true;
        self.subscription.take();
        self.stops.clear();
        let mut queue = self.queue.borrow_mut();
        queue.items.clear();
        queue.waiter.take();
    }

    fn attach(&mut self) {
        let queue = Rc::clone(&self.queue);
        self.subscription = Some(self.registry.subscribe(move |event: &T| {
            let waiter = {
                let mut q = queue.borrow_mut();
                q.items.push_back(event.clone());
                q.waiter.take()
            };
            if let Some(waker) = waiter {
                waker.wake();
            }
        }));
    }
}

impl<T: Clone + 'static> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this
            .stops
            .iter_mut()
            .any(|stop| stop.poll_unpin(cx).is_ready())
        {
            this.finish();
            return Poll::Ready(None);
        }
        if this.subscription.is_none() {
            this.attach();
        }

        let mut queue = this.queue.borrow_mut();
        if let Some(item) = queue.items.pop_front() {
            return Poll::Ready(Some(item));
        }
        queue.waiter = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T: Clone + 'static> FusedStream for EventStream<T> {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl<T> std::fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("registry", &self.registry.inner.name)
            .field("buffered", &self.queue.borrow().items.len())
            .field("finished", &self.finished)
            .finish()
    }
}
