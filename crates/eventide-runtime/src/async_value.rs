#![forbid(unsafe_code)]

//! Values that may not be available yet.
//!
//! [`AsyncValue`] is the snapshot type shared by every derived value:
//! pending, resolved, or rejected (keeping the last good value, if any).
//! [`AsyncSource`] is the upstream contract that [`AsyncMap`](crate::AsyncMap)
//! observes: a synchronous snapshot plus a change notification.
//! [`PromiseValue`] tracks one spawned future; [`AsyncObservable`] follows a
//! spawned stream until its scope is disposed.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::pin;

use eventide_core::{Scope, panic_message};
use futures::{FutureExt, Stream, StreamExt};

use crate::error::Failure;
use crate::reactive::{Observable, Subscription};

/// Snapshot of a possibly-unavailable value.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncValue<T> {
    /// No value yet.
    Pending,
    /// A value is available.
    Resolved(T),
    /// Production failed; carries the previous value if there was one.
    Rejected(Option<T>, Failure),
}

impl<T> AsyncValue<T> {
    /// Whether a value is available.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Whether this snapshot carries an error.
    #[must_use]
    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Rejected(..))
    }

    /// The resolved value, or the value kept across a rejection.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Resolved(v) | Self::Rejected(Some(v), _) => Some(v),
            _ => None,
        }
    }

    /// Owned form of [`value`](Self::value).
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Resolved(v) | Self::Rejected(Some(v), _) => Some(v),
            _ => None,
        }
    }

    /// The error, if rejected.
    #[must_use]
    pub fn error(&self) -> Option<&Failure> {
        match self {
            Self::Rejected(_, err) => Some(err),
            _ => None,
        }
    }

    /// Transform the carried value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AsyncValue<U> {
        match self {
            Self::Pending => AsyncValue::Pending,
            Self::Resolved(v) => AsyncValue::Resolved(f(v)),
            Self::Rejected(v, err) => AsyncValue::Rejected(v.map(f), err),
        }
    }
}

impl<T> Default for AsyncValue<T> {
    fn default() -> Self {
        Self::Pending
    }
}

impl<T> From<Result<T, Failure>> for AsyncValue<T> {
    fn from(result: Result<T, Failure>) -> Self {
        match result {
            Ok(v) => Self::Resolved(v),
            Err(err) => Self::Rejected(None, err),
        }
    }
}

/// An upstream value that can be sampled and watched.
pub trait AsyncSource<T> {
    /// Current snapshot.
    fn snapshot(&self) -> AsyncValue<T>;

    /// Call `on_change` after every change until the subscription drops.
    fn watch(&self, on_change: Box<dyn Fn()>) -> Subscription;
}

impl<T: Clone + PartialEq + 'static> AsyncSource<T> for Observable<T> {
    fn snapshot(&self) -> AsyncValue<T> {
        AsyncValue::Resolved(self.get())
    }

    fn watch(&self, on_change: Box<dyn Fn()>) -> Subscription {
        self.subscribe(move |_| on_change())
    }
}

impl<T, S: AsyncSource<T> + ?Sized> AsyncSource<T> for std::rc::Rc<S> {
    fn snapshot(&self) -> AsyncValue<T> {
        (**self).snapshot()
    }

    fn watch(&self, on_change: Box<dyn Fn()>) -> Subscription {
        (**self).watch(on_change)
    }
}

/// Observable result of a spawned future.
///
/// Starts pending and moves once to resolved or rejected.
pub struct PromiseValue<T> {
    state: Observable<AsyncValue<T>>,
}

impl<T> Clone for PromiseValue<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> PromiseValue<T> {
    /// Spawn `future` on `scope` and track its outcome.
    ///
    /// If the scope has no spawner the value is rejected immediately. A
    /// panic inside the future settles as [`Failure::Panicked`].
    pub fn spawn(scope: &Scope, future: impl Future<Output = Result<T, Failure>> + 'static) -> Self {
        let state = Observable::new(AsyncValue::Pending);
        let target = state.clone();
        let task = async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => AsyncValue::from(result),
                Err(payload) => {
                    AsyncValue::Rejected(None, Failure::Panicked(panic_message(payload.as_ref())))
                }
            };
            target.set(outcome);
        };
        if let Err(err) = scope.spawn_local(task) {
            state.set(AsyncValue::Rejected(None, Failure::Scope(err)));
        }
        Self { state }
    }

    /// Current snapshot.
    #[must_use]
    pub fn get(&self) -> AsyncValue<T> {
        self.state.get()
    }

    /// Subscribe to the settlement.
    pub fn subscribe(&self, callback: impl Fn(&AsyncValue<T>) + 'static) -> Subscription {
        self.state.subscribe(callback)
    }
}

impl<T: Clone + PartialEq + 'static> AsyncSource<T> for PromiseValue<T> {
    fn snapshot(&self) -> AsyncValue<T> {
        self.state.get()
    }

    fn watch(&self, on_change: Box<dyn Fn()>) -> Subscription {
        self.state.subscribe(move |_| on_change())
    }
}

impl<T: Clone + PartialEq + std::fmt::Debug + 'static> std::fmt::Debug for PromiseValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseValue")
            .field("state", &self.state.get())
            .finish()
    }
}

/// Latest item of a spawned stream.
///
/// Starts resolved with the initial value and takes every item the stream
/// yields. The stream is dropped once it ends or the scope is disposed,
/// whichever comes first; the last value stays readable afterwards.
pub struct AsyncObservable<T> {
    state: Observable<AsyncValue<T>>,
}

impl<T> Clone for AsyncObservable<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> AsyncObservable<T> {
    /// Drive `stream` on `scope`'s spawner.
    ///
    /// On a disposed scope nothing is spawned and the initial value is kept.
    /// A missing spawner rejects with [`Failure::Scope`]; a panicking stream
    /// rejects with [`Failure::Panicked`]. Both keep the last value.
    pub fn spawn(scope: &Scope, stream: impl Stream<Item = T> + 'static, initial: T) -> Self {
        let state = Observable::new(AsyncValue::Resolved(initial));
        if scope.is_disposed() {
            return Self { state };
        }
        let target = state.clone();
        let lifecycle = scope.lifecycle().clone();
        let stop = lifecycle.disposed();
        let task = async move {
            let pump = async {
                let mut items = pin!(stream.take_until(stop));
                while let Some(item) = items.next().await {
                    if lifecycle.is_disposed() {
                        break;
                    }
                    target.set(AsyncValue::Resolved(item));
                }
            };
            if let Err(payload) = AssertUnwindSafe(pump).catch_unwind().await {
                let last = target.get().into_value();
                target.set(AsyncValue::Rejected(
                    last,
                    Failure::Panicked(panic_message(payload.as_ref())),
                ));
            }
        };
        if let Err(err) = scope.spawn_local(task) {
            let last = state.get().into_value();
            state.set(AsyncValue::Rejected(last, Failure::Scope(err)));
        }
        Self { state }
    }

    /// Current snapshot.
    #[must_use]
    pub fn get(&self) -> AsyncValue<T> {
        self.state.get()
    }

    /// Latest value, kept across a failure.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.state.get().into_value()
    }

    /// Why the stream stopped early, if it did.
    #[must_use]
    pub fn error(&self) -> Option<Failure> {
        self.state.get().error().cloned()
    }

    /// Subscribe to every new item.
    pub fn subscribe(&self, callback: impl Fn(&AsyncValue<T>) + 'static) -> Subscription {
        self.state.subscribe(callback)
    }
}

impl<T: Clone + PartialEq + 'static> AsyncSource<T> for AsyncObservable<T> {
    fn snapshot(&self) -> AsyncValue<T> {
        self.state.get()
    }

    fn watch(&self, on_change: Box<dyn Fn()>) -> Subscription {
        self.state.subscribe(move |_| on_change())
    }
}

impl<T: Clone + PartialEq + std::fmt::Debug + 'static> std::fmt::Debug for AsyncObservable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncObservable")
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_core::ScopeError;
    use futures::channel::{mpsc, oneshot};
    use futures::executor::LocalPool;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn accessors() {
        let v: AsyncValue<u8> = AsyncValue::Resolved(1);
        assert!(v.is_resolved());
        assert_eq!(v.value(), Some(&1));

        let r: AsyncValue<u8> = AsyncValue::Rejected(Some(1), Failure::Declined);
        assert!(!r.is_resolved());
        assert!(r.is_errored());
        assert_eq!(r.value(), Some(&1));
        assert_eq!(r.error(), Some(&Failure::Declined));

        let p: AsyncValue<u8> = AsyncValue::default();
        assert_eq!(p.clone().into_value(), None);
        assert_eq!(p.map(|x| x + 1), AsyncValue::Pending);
        assert_eq!(AsyncValue::Resolved(2).map(|x: u8| x * 2), AsyncValue::Resolved(4));
    }

    #[test]
    fn promise_resolves_when_future_completes() {
        let mut pool = LocalPool::new();
        let scope = Scope::detached().with_spawner(pool.spawner());
        let (tx, rx) = oneshot::channel::<u32>();
        let promise = PromiseValue::spawn(&scope, async move { rx.await.map_err(Failure::fault) });

        pool.run_until_stalled();
        assert_eq!(promise.get(), AsyncValue::Pending);

        tx.send(9).unwrap();
        pool.run_until_stalled();
        assert_eq!(promise.get(), AsyncValue::Resolved(9));
    }

    async fn explode() -> Result<u8, Failure> {
        panic!("kaboom")
    }

    #[test]
    fn promise_rejects_on_error_and_panic() {
        let mut pool = LocalPool::new();
        let scope = Scope::detached().with_spawner(pool.spawner());
        let failing = PromiseValue::<u8>::spawn(&scope, async { Err(Failure::msg("nope")) });
        let panicking = PromiseValue::spawn(&scope, explode());
        pool.run_until_stalled();

        assert_eq!(failing.get(), AsyncValue::Rejected(None, Failure::msg("nope")));
        assert_eq!(
            panicking.get(),
            AsyncValue::Rejected(None, Failure::Panicked("kaboom".into()))
        );
    }

    #[test]
    fn promise_without_spawner_rejects() {
        let scope = Scope::detached();
        let promise = PromiseValue::<u8>::spawn(&scope, async { Ok(1) });
        assert_eq!(
            promise.get(),
            AsyncValue::Rejected(None, Failure::Scope(ScopeError::NoSpawner))
        );
    }

    #[test]
    fn observable_is_always_resolved() {
        let obs = Observable::new("x");
        assert_eq!(obs.snapshot(), AsyncValue::Resolved("x"));
    }

    #[test]
    fn stream_values_replace_the_initial_one() {
        let mut pool = LocalPool::new();
        let scope = Scope::detached().with_spawner(pool.spawner());
        let (tx, rx) = mpsc::unbounded::<u32>();
        let latest = AsyncObservable::spawn(&scope, rx, 0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = latest.subscribe(move |v| s.borrow_mut().push(v.clone()));

        pool.run_until_stalled();
        assert_eq!(latest.get(), AsyncValue::Resolved(0));

        tx.unbounded_send(1).unwrap();
        pool.run_until_stalled();
        assert_eq!(latest.value(), Some(1));

        tx.unbounded_send(2).unwrap();
        tx.unbounded_send(3).unwrap();
        pool.run_until_stalled();
        assert_eq!(latest.snapshot(), AsyncValue::Resolved(3));
        assert_eq!(
            *seen.borrow(),
            vec![
                AsyncValue::Resolved(1),
                AsyncValue::Resolved(2),
                AsyncValue::Resolved(3)
            ]
        );

        drop(tx);
        pool.run_until_stalled();
        assert_eq!(latest.value(), Some(3));
        assert_eq!(latest.error(), None);
    }

    #[test]
    fn dispose_stops_the_stream() {
        let mut pool = LocalPool::new();
        let scope = Scope::detached().with_spawner(pool.spawner());
        let (tx, rx) = mpsc::unbounded::<u32>();
        let latest = AsyncObservable::spawn(&scope, rx, 0);

        tx.unbounded_send(1).unwrap();
        pool.run_until_stalled();
        assert_eq!(latest.value(), Some(1));
        assert_eq!(scope.lifecycle().waiter_count(), 1);

        scope.dispose();
        let _ = tx.unbounded_send(2);
        pool.run_until_stalled();

        assert_eq!(latest.get(), AsyncValue::Resolved(1));
        assert!(tx.is_closed());
        assert_eq!(scope.lifecycle().waiter_count(), 0);
    }

    #[test]
    fn disposed_scope_keeps_the_initial_value() {
        let mut pool = LocalPool::new();
        let scope = Scope::detached().with_spawner(pool.spawner());
        scope.dispose();
        let (tx, rx) = mpsc::unbounded::<u32>();
        let latest = AsyncObservable::spawn(&scope, rx, 5);

        assert!(tx.is_closed());
        pool.run_until_stalled();
        assert_eq!(latest.get(), AsyncValue::Resolved(5));
    }

    #[test]
    fn stream_without_spawner_rejects_with_initial_value() {
        let scope = Scope::detached();
        let latest = AsyncObservable::spawn(&scope, futures::stream::iter([1u8, 2]), 0);
        assert_eq!(
            latest.get(),
            AsyncValue::Rejected(Some(0), Failure::Scope(ScopeError::NoSpawner))
        );
    }

    #[test]
    fn panicking_stream_keeps_last_item() {
        let mut pool = LocalPool::new();
        let scope = Scope::detached().with_spawner(pool.spawner());
        let items = futures::stream::iter(1u32..).map(|v| {
            if v == 3 {
                panic!("stream bug");
            }
            v
        });
        let latest = AsyncObservable::spawn(&scope, items, 0);
        pool.run_until_stalled();

        assert_eq!(latest.value(), Some(2));
        assert_eq!(latest.error(), Some(Failure::Panicked("stream bug".into())));
    }
}
