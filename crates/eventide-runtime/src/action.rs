#![forbid(unsafe_code)]

//! Four-state wrappers around a unit of work.
//!
//! An [`Action<A, D>`] runs an executor with an argument of type `A`. The
//! executor either settles synchronously or hands back a future, which is
//! spawned on the action's scope. Either way the action moves through
//! [`ActionState`]:
//!
//! ```text
//! Initial ──run──► Running ──ok──► Success
//!                     │
//!                     └──declined / error / panic──► Failed
//! ```
//!
//! Settlement can fan out to event registries through the `triggers_*`
//! methods, and an action can be driven by events with [`Action::run_on`].
//!
//! # Invariants
//!
//! 1. `run` on a disposed scope returns `false` without touching state.
//! 2. Returning `false`, `Err(..)`, or panicking all land in `Failed`.
//! 3. When runs overlap, the one that settles last determines the final
//!    state, error, and argument.
//! 4. Triggers are dropped when the scope disposes; a settlement arriving
//!    afterwards updates state but emits nothing.
//! 5. A panicking trigger mapper or condition is logged and skipped; `run`
//!    never unwinds into its caller.
//!
//! # Failure Modes
//!
//! - No spawner on the scope chain for an async executor: the run settles
//!   as [`Failure::Scope`] immediately.
//! - The spawner drops the task before it settles: the returned [`Run`]
//!   resolves to `false` and the state stays `Running`.

use std::borrow::Cow;
use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::panic::{AssertUnwindSafe, Location, catch_unwind};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use eventide_core::{DisposeHook, Scope, panic_message};
use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};

use crate::config;
use crate::error::Failure;
use crate::event::{EventRegistry, ListenerId};
use crate::reactive::{Observable, Subscription};
use crate::tick;

/// Lifecycle state of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActionState {
    /// Never run.
    #[default]
    Initial,
    /// At least one run has not settled.
    Running,
    /// The last settled run succeeded.
    Success,
    /// The last settled run failed.
    Failed,
}

/// Values an executor may settle with.
///
/// `false` is a declared failure; `true` and `()` are success.
pub trait ActionOutcome<D> {
    /// Normalize into a result.
    fn into_outcome(self) -> Result<D, Failure>;
}

impl ActionOutcome<()> for bool {
    fn into_outcome(self) -> Result<(), Failure> {
        if self { Ok(()) } else { Err(Failure::Declined) }
    }
}

impl ActionOutcome<()> for () {
    fn into_outcome(self) -> Result<(), Failure> {
        Ok(())
    }
}

impl<D> ActionOutcome<D> for Result<D, Failure> {
    fn into_outcome(self) -> Result<D, Failure> {
        self
    }
}

/// What an executor hands back.
pub enum Execution<D> {
    /// Settled synchronously.
    Ready(Result<D, Failure>),
    /// Settles when the future completes.
    Pending(LocalBoxFuture<'static, Result<D, Failure>>),
}

impl<D: 'static> Execution<D> {
    /// Wrap a future whose output is any [`ActionOutcome`].
    pub fn pending<R: ActionOutcome<D>>(future: impl Future<Output = R> + 'static) -> Self {
        Self::Pending(future.map(|r| r.into_outcome()).boxed_local())
    }
}

impl From<bool> for Execution<()> {
    fn from(ok: bool) -> Self {
        Self::Ready(ok.into_outcome())
    }
}

impl From<()> for Execution<()> {
    fn from((): ()) -> Self {
        Self::Ready(Ok(()))
    }
}

impl<D> From<Result<D, Failure>> for Execution<D> {
    fn from(result: Result<D, Failure>) -> Self {
        Self::Ready(result)
    }
}

impl<D> std::fmt::Debug for Execution<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(Ok(_)) => f.write_str("Ready(Ok(..))"),
            Self::Ready(Err(err)) => f.debug_tuple("Ready").field(err).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Outcome handle returned by [`Action::run`].
///
/// Await it (it implements [`IntoFuture`]) or inspect it directly.
#[derive(Debug)]
#[must_use = "a pending run only reports its result when awaited"]
pub enum Run {
    /// The run settled synchronously.
    Settled(bool),
    /// The run continues on the scope's spawner.
    Pending(oneshot::Receiver<bool>),
}

impl Run {
    /// The result, if the run settled synchronously.
    #[must_use]
    pub fn settled(&self) -> Option<bool> {
        match self {
            Self::Settled(ok) => Some(*ok),
            Self::Pending(_) => None,
        }
    }

    /// Whether the run is still in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl IntoFuture for Run {
    type Output = bool;
    type IntoFuture = RunFuture;

    fn into_future(self) -> RunFuture {
        RunFuture { run: self }
    }
}

/// Future form of a [`Run`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct RunFuture {
    run: Run,
}

impl Future for RunFuture {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        match &mut self.get_mut().run {
            Run::Settled(ok) => Poll::Ready(*ok),
            Run::Pending(rx) => rx.poll_unpin(cx).map(|r| r.unwrap_or(false)),
        }
    }
}

type Executor<A, D> = Box<dyn Fn(A) -> Execution<D>>;
type DoneTrigger<A, D> = Rc<dyn Fn(&D, &A)>;
type FailedTrigger<A> = Rc<dyn Fn(&Failure, &A)>;

struct ActionInner<A, D> {
    scope: Scope,
    name: Cow<'static, str>,
    executor: Executor<A, D>,
    state: Observable<ActionState>,
    error: RefCell<Option<Failure>>,
    arg: RefCell<Option<A>>,
    done_triggers: RefCell<Vec<DoneTrigger<A, D>>>,
    failed_triggers: RefCell<Vec<FailedTrigger<A>>>,
    _teardown: RefCell<Option<DisposeHook>>,
}

impl<A: Clone + 'static, D: 'static> ActionInner<A, D> {
    fn settle(&self, arg: A, outcome: Result<D, Failure>) -> bool {
        *self.arg.borrow_mut() = Some(arg.clone());
        match outcome {
            Ok(data) => {
                self.error.borrow_mut().take();
                self.state.set(ActionState::Success);
                let triggers = self.done_triggers.borrow().clone();
                for trigger in triggers {
                    tick::isolate("action trigger", || trigger(&data, &arg));
                }
                true
            }
            Err(failure) => {
                if config::current().log_action_failures {
                    tracing::debug!(action = %self.name, error = %failure, "action failed");
                } else {
                    tracing::trace!(action = %self.name, error = %failure, "action failed");
                }
                *self.error.borrow_mut() = Some(failure.clone());
                self.state.set(ActionState::Failed);
                let triggers = self.failed_triggers.borrow().clone();
                for trigger in triggers {
                    tick::isolate("action trigger", || trigger(&failure, &arg));
                }
                false
            }
        }
    }
}

/// A runnable unit of work with observable state.
///
/// Cloning yields another handle to the same action.
pub struct Action<A, D = ()> {
    inner: Rc<ActionInner<A, D>>,
}

impl<A, D> Clone for Action<A, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: Clone + 'static, D: 'static> Action<A, D> {
    /// Create an action whose executor returns anything convertible into an
    /// [`Execution`]: `bool`, `()`, `Result<D, Failure>`, or an
    /// [`Execution::Pending`] future.
    #[track_caller]
    pub fn new<R>(scope: &Scope, executor: impl Fn(A) -> R + 'static) -> Self
    where
        R: Into<Execution<D>>,
    {
        let location = Location::caller();
        Self::with_executor(
            scope,
            format!("{}:{}", location.file(), location.line()).into(),
            Box::new(move |arg| executor(arg).into()),
        )
    }

    /// Create an action around an async executor.
    #[track_caller]
    pub fn new_async<F, R>(scope: &Scope, executor: impl Fn(A) -> F + 'static) -> Self
    where
        F: Future<Output = R> + 'static,
        R: ActionOutcome<D>,
    {
        let location = Location::caller();
        Self::with_executor(
            scope,
            format!("{}:{}", location.file(), location.line()).into(),
            Box::new(move |arg| Execution::pending(executor(arg))),
        )
    }

    fn with_executor(scope: &Scope, name: Cow<'static, str>, executor: Executor<A, D>) -> Self {
        let inner = Rc::new(ActionInner {
            scope: scope.clone(),
            name,
            executor,
            state: Observable::new(ActionState::Initial),
            error: RefCell::new(None),
            arg: RefCell::new(None),
            done_triggers: RefCell::new(Vec::new()),
            failed_triggers: RefCell::new(Vec::new()),
            _teardown: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        let hook = scope.dispose_hook(move || {
            if let Some(inner) = weak.upgrade() {
                inner.done_triggers.borrow_mut().clear();
                inner.failed_triggers.borrow_mut().clear();
            }
        });
        *inner._teardown.borrow_mut() = Some(hook);
        Self { inner }
    }

    /// Diagnostic name (the declaring source location).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Owning scope.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// Run the executor with `arg`.
    pub fn run(&self, arg: A) -> Run {
        let inner = &self.inner;
        if inner.scope.is_disposed() {
            tracing::trace!(action = %inner.name, "run after disposal ignored");
            return Run::Settled(false);
        }
        *inner.arg.borrow_mut() = Some(arg.clone());
        inner.state.set(ActionState::Running);

        let execution = match catch_unwind(AssertUnwindSafe(|| (inner.executor)(arg.clone()))) {
            Ok(execution) => execution,
            Err(payload) => Execution::Ready(Err(Failure::Panicked(panic_message(payload.as_ref())))),
        };

        let future = match execution {
            Execution::Ready(outcome) => return Run::Settled(inner.settle(arg, outcome)),
            Execution::Pending(future) => future,
        };

        let (tx, rx) = oneshot::channel();
        let task_inner = Rc::clone(inner);
        let task_arg = arg.clone();
        let task = async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(Failure::Panicked(panic_message(payload.as_ref()))),
            };
            let ok = task_inner.settle(task_arg, outcome);
            let _ = tx.send(ok);
        };
        match inner.scope.spawn_local(task) {
            Ok(()) => Run::Pending(rx),
            Err(err) => Run::Settled(inner.settle(arg, Err(err.into()))),
        }
    }

    /// Run on every event from `registry`, with the argument produced by
    /// `mapper`.
    pub fn run_on<E: 'static>(
        &self,
        registry: &EventRegistry<E>,
        mapper: impl Fn(&E) -> A + 'static,
    ) -> ListenerId {
        self.run_on_filtered(registry, mapper, |_| true)
    }

    /// Like [`run_on`](Self::run_on), skipping events where `filter` is false.
    pub fn run_on_filtered<E: 'static>(
        &self,
        registry: &EventRegistry<E>,
        mapper: impl Fn(&E) -> A + 'static,
        filter: impl Fn(&E) -> bool + 'static,
    ) -> ListenerId {
        let action = self.clone();
        registry.on(move |event| {
            if filter(event) {
                let _ = action.run(mapper(event));
            }
        })
    }

    /// Emit the result data on `target` after every successful run.
    pub fn triggers_done_event(&self, target: &EventRegistry<D>)
    where
        D: Clone,
    {
        self.triggers_done_event_if(target, |_| true);
    }

    /// Emit the result data on `target` after successful runs passing
    /// `condition`.
    pub fn triggers_done_event_if(
        &self,
        target: &EventRegistry<D>,
        condition: impl Fn(&D) -> bool + 'static,
    ) where
        D: Clone,
    {
        self.triggers_done_event_with_mapper_if(target, |data, _| data.clone(), condition);
    }

    /// Emit `mapper(data, arg)` on `target` after every successful run.
    pub fn triggers_done_event_with_mapper<E: 'static>(
        &self,
        target: &EventRegistry<E>,
        mapper: impl Fn(&D, &A) -> E + 'static,
    ) {
        self.triggers_done_event_with_mapper_if(target, mapper, |_| true);
    }

    /// Emit `mapper(data, arg)` on `target` after successful runs passing
    /// `condition`.
    pub fn triggers_done_event_with_mapper_if<E: 'static>(
        &self,
        target: &EventRegistry<E>,
        mapper: impl Fn(&D, &A) -> E + 'static,
        condition: impl Fn(&D) -> bool + 'static,
    ) {
        if self.inner.scope.is_disposed() {
            return;
        }
        let target = target.clone();
        self.inner
            .done_triggers
            .borrow_mut()
            .push(Rc::new(move |data, arg| {
                if condition(data) {
                    target.emit_once(mapper(data, arg));
                }
            }));
    }

    /// Emit `mapper(error, arg)` on `target` after every failed run.
    pub fn triggers_failed_event<E: 'static>(
        &self,
        target: &EventRegistry<E>,
        mapper: impl Fn(&Failure, &A) -> E + 'static,
    ) {
        self.triggers_failed_event_if(target, mapper, |_| true);
    }

    /// Emit `mapper(error, arg)` on `target` after failed runs passing
    /// `condition`.
    pub fn triggers_failed_event_if<E: 'static>(
        &self,
        target: &EventRegistry<E>,
        mapper: impl Fn(&Failure, &A) -> E + 'static,
        condition: impl Fn(&Failure) -> bool + 'static,
    ) {
        if self.inner.scope.is_disposed() {
            return;
        }
        let target = target.clone();
        self.inner
            .failed_triggers
            .borrow_mut()
            .push(Rc::new(move |failure, arg| {
                if condition(failure) {
                    target.emit_once(mapper(failure, arg));
                }
            }));
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ActionState {
        self.inner.state.get()
    }

    /// Whether a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ActionState::Running
    }

    /// Whether the last settled run failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state() == ActionState::Failed
    }

    /// Error of the last failed run; cleared by a success.
    #[must_use]
    pub fn error(&self) -> Option<Failure> {
        self.inner.error.borrow().clone()
    }

    /// Argument of the most recent run or settlement.
    ///
    /// The action keeps this value alive until the next run; large arguments
    /// are retained for as long as the action lives.
    #[must_use]
    pub fn arg(&self) -> Option<A> {
        self.inner.arg.borrow().clone()
    }

    /// Observe state transitions.
    pub fn watch(&self, callback: impl Fn(ActionState) + 'static) -> Subscription {
        self.inner.state.subscribe(move |state| callback(*state))
    }

    /// Number of registered done and failed triggers.
    #[must_use]
    pub fn trigger_count(&self) -> usize {
        self.inner.done_triggers.borrow().len() + self.inner.failed_triggers.borrow().len()
    }
}

impl<A, D> std::fmt::Debug for Action<A, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.inner.name)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::LocalPool;
    use std::cell::Cell;
    use tracing_test::traced_test;

    #[test]
    fn sync_success_and_declined() {
        let scope = Scope::detached();
        let action: Action<u32> = Action::new(&scope, |n: u32| n % 2 == 0);
        assert_eq!(action.state(), ActionState::Initial);

        assert_eq!(action.run(2).settled(), Some(true));
        assert_eq!(action.state(), ActionState::Success);
        assert_eq!(action.error(), None);

        assert_eq!(action.run(3).settled(), Some(false));
        assert!(action.is_failed());
        assert_eq!(action.error(), Some(Failure::Declined));
        assert_eq!(action.arg(), Some(3));
    }

    #[test]
    fn unit_executor_is_success() {
        let scope = Scope::detached();
        let action: Action<()> = Action::new(&scope, |()| ());
        assert_eq!(action.run(()).settled(), Some(true));
    }

    #[test]
    fn result_executor_carries_data() {
        let scope = Scope::detached();
        let done = EventRegistry::<String>::new(&scope);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        done.on(move |v: &String| s.borrow_mut().push(v.clone()));

        let action: Action<u8, String> = Action::new(&scope, |n: u8| {
            if n > 0 {
                Ok(format!("n={n}"))
            } else {
                Err(Failure::msg("zero"))
            }
        });
        action.triggers_done_event(&done);
        assert_eq!(action.run(4).settled(), Some(true));
        assert_eq!(action.run(0).settled(), Some(false));
        assert_eq!(action.error(), Some(Failure::msg("zero")));
        assert_eq!(*seen.borrow(), vec!["n=4"]);
    }

    #[test]
    fn executor_panic_becomes_failure() {
        let scope = Scope::detached();
        let action: Action<()> = Action::new(&scope, |()| -> bool { panic!("bad executor") });
        assert_eq!(action.run(()).settled(), Some(false));
        assert_eq!(action.error(), Some(Failure::Panicked("bad executor".into())));
    }

    #[test]
    fn disposed_scope_returns_false_without_transition() {
        let scope = Scope::detached();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let action: Action<()> = Action::new(&scope, move |()| c.set(c.get() + 1));
        scope.dispose();
        assert_eq!(action.run(()).settled(), Some(false));
        assert_eq!(action.state(), ActionState::Initial);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn triggers_fire_and_clear_on_dispose() {
        let scope = Scope::detached();
        let ok = EventRegistry::<u32>::new(&scope);
        let failed = EventRegistry::<String>::new(&scope);
        let ok_log = Rc::new(RefCell::new(Vec::new()));
        let failed_log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&ok_log);
        ok.on(move |v| l.borrow_mut().push(*v));
        let l = Rc::clone(&failed_log);
        failed.on(move |v: &String| l.borrow_mut().push(v.clone()));

        let action: Action<u32> = Action::new(&scope, |n: u32| n < 10);
        action.triggers_done_event_with_mapper_if(&ok, |(), arg| *arg * 2, |()| true);
        action.triggers_failed_event(&failed, |err, arg| format!("{arg}: {err}"));
        assert_eq!(action.trigger_count(), 2);

        let _ = action.run(1);
        let _ = action.run(11);
        assert_eq!(*ok_log.borrow(), vec![2]);
        assert_eq!(*failed_log.borrow(), vec!["11: declined"]);

        scope.dispose();
        assert_eq!(action.trigger_count(), 0);
    }

    #[test]
    fn failed_trigger_condition() {
        let scope = Scope::detached();
        let target = EventRegistry::<()>::new(&scope);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        target.on(move |()| h.set(h.get() + 1));

        let action: Action<bool> = Action::new(&scope, |ok: bool| {
            if ok { Ok(()) } else { Err(Failure::msg("loud")) }
        });
        action.triggers_failed_event_if(&target, |_, _| (), |err| !err.is_declined());
        let _ = action.run(false);
        let _ = action.run(true);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn run_on_maps_and_filters_events() {
        let scope = Scope::detached();
        let clicks = EventRegistry::<i32>::new(&scope);
        let args = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::clone(&args);
        let action: Action<String> = Action::new(&scope, move |s: String| a.borrow_mut().push(s));
        action.run_on_filtered(&clicks, |v| format!("v{v}"), |v| *v >= 0);
        clicks.emit_once(1);
        clicks.emit_once(-1);
        clicks.emit_once(2);
        assert_eq!(*args.borrow(), vec!["v1", "v2"]);
    }

    #[test]
    fn async_run_settles_on_spawner() {
        let mut pool = LocalPool::new();
        let scope = Scope::detached().with_spawner(pool.spawner());
        let (tx, rx) = oneshot::channel::<bool>();
        let rx = RefCell::new(Some(rx));
        let action: Action<()> = Action::new_async(&scope, move |()| {
            let rx = rx.borrow_mut().take();
            async move {
                match rx {
                    Some(rx) => rx.await.unwrap_or(false),
                    None => false,
                }
            }
        });

        let run = action.run(());
        assert!(run.is_pending());
        assert!(action.is_running());

        let result = Rc::new(Cell::new(None));
        let r = Rc::clone(&result);
        futures::task::LocalSpawnExt::spawn_local(&pool.spawner(), async move {
            r.set(Some(run.await));
        })
        .unwrap();

        pool.run_until_stalled();
        assert!(action.is_running());
        tx.send(true).unwrap();
        pool.run_until_stalled();
        assert_eq!(result.get(), Some(true));
        assert_eq!(action.state(), ActionState::Success);
    }

    #[test]
    fn async_without_spawner_fails_immediately() {
        let scope = Scope::detached();
        let action: Action<()> = Action::new_async(&scope, |()| async { true });
        assert_eq!(action.run(()).settled(), Some(false));
        assert_eq!(
            action.error(),
            Some(Failure::Scope(eventide_core::ScopeError::NoSpawner))
        );
    }

    #[test]
    fn watch_sees_transitions() {
        let scope = Scope::detached();
        let action: Action<bool> = Action::new(&scope, |ok: bool| ok);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = action.watch(move |state| s.borrow_mut().push(state));
        let _ = action.run(true);
        let _ = action.run(false);
        assert_eq!(
            *seen.borrow(),
            vec![
                ActionState::Running,
                ActionState::Success,
                ActionState::Running,
                ActionState::Failed
            ]
        );
    }

    #[test]
    #[traced_test]
    fn failures_are_logged() {
        let scope = Scope::detached();
        let action: Action<()> = Action::new(&scope, |()| false);
        let _ = action.run(());
        assert!(logs_contain("action failed"));
    }

    #[test]
    #[traced_test]
    fn panicking_trigger_stays_inside_run() {
        let scope = Scope::detached();
        let broken = EventRegistry::<u8>::new(&scope);
        let healthy = EventRegistry::<u8>::new(&scope);
        let seen = Rc::new(Cell::new(0_u8));
        let s = Rc::clone(&seen);
        healthy.on(move |v| s.set(*v));

        let action: Action<u8, u8> = Action::new(&scope, |n: u8| Ok::<u8, Failure>(n));
        action.triggers_done_event_with_mapper(&broken, |_, _| -> u8 { panic!("mapper bug") });
        action.triggers_done_event(&healthy);

        let outcome = catch_unwind(AssertUnwindSafe(|| action.run(7).settled()));
        assert_eq!(outcome.ok(), Some(Some(true)));
        assert_eq!(action.state(), ActionState::Success);
        assert_eq!(seen.get(), 7);
        assert!(logs_contain("action trigger"));
        assert!(logs_contain("mapper bug"));
    }

    #[test]
    fn panicking_failed_trigger_does_not_stop_the_executor() {
        let mut pool = LocalPool::new();
        let scope = Scope::detached().with_spawner(pool.spawner());
        let failed = EventRegistry::<()>::new(&scope);
        let action: Action<()> = Action::new_async(&scope, |()| async { false });
        action.triggers_failed_event_if(&failed, |_, _| (), |_| panic!("condition bug"));

        let later = Rc::new(Cell::new(false));
        let l = Rc::clone(&later);
        let _ = action.run(());
        futures::task::LocalSpawnExt::spawn_local(&pool.spawner(), async move { l.set(true) })
            .unwrap();

        pool.run_until_stalled();
        assert_eq!(action.state(), ActionState::Failed);
        assert!(later.get());
    }
}
