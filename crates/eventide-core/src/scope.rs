#![forbid(unsafe_code)]

//! Scopes: the unit of ownership for event registries and derived values.
//!
//! A [`Scope`] composes one [`Lifecycle`] and one [`Namespace`] with a
//! non-owning reference to its parent scope. Disposing a scope disposes its
//! lifecycle, which cascades to every child scope and clears the namespace,
//! all before `dispose()` returns.
//!
//! # Ambient scope
//!
//! Construction code that does not thread a scope through explicitly can ask
//! for [`Scope::current()`]. The current scope is the top of a thread-local
//! stack maintained by [`Scope::enter`] / [`Scope::declare_inside`]; when the
//! stack is empty it falls back to the thread's [`Scope::root()`]. Entries are
//! pushed and popped by an RAII guard, so the stack unwinds correctly on panic.
//!
//! # Async work
//!
//! A scope may carry a local spawner. [`Scope::spawn_local`] walks up the
//! parent chain to find one.
//!
//! # Invariants
//!
//! 1. A scope is disposed at or before its parent.
//! 2. A scope created under a disposed parent starts out disposed.
//! 3. `dispose()` is idempotent, never panics, and cascades synchronously.

use std::borrow::Cow;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::Location;
use std::rc::{Rc, Weak};

use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::error::ScopeError;
use crate::lifecycle::{DisposeHook, DisposeKey, Lifecycle};
use crate::namespace::Namespace;

thread_local! {
    static ROOT: Scope = Scope::build(None, Cow::Borrowed("root"));
    static CURRENT: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };
}

struct ScopeInner {
    label: Cow<'static, str>,
    parent: Option<Weak<ScopeInner>>,
    lifecycle: Lifecycle,
    namespace: Namespace,
    spawner: RefCell<Option<Rc<dyn LocalSpawn>>>,
}

/// A node combining a lifecycle and a namespace.
///
/// Cloning yields another handle to the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// The thread's root scope, default ancestor of unparented scopes.
    #[must_use]
    pub fn root() -> Scope {
        ROOT.with(Clone::clone)
    }

    /// The innermost entered scope, or the root scope.
    #[must_use]
    pub fn current() -> Scope {
        CURRENT
            .with(|stack| stack.borrow().last().cloned())
            .unwrap_or_else(Self::root)
    }

    /// The innermost entered scope.
    ///
    /// # Errors
    ///
    /// [`ScopeError::NoCurrentScope`] if no scope has been entered.
    pub fn required_current() -> Result<Scope, ScopeError> {
        CURRENT
            .with(|stack| stack.borrow().last().cloned())
            .ok_or(ScopeError::NoCurrentScope)
    }

    /// Create a child of `parent`, labelled with the caller's location.
    #[track_caller]
    #[must_use]
    pub fn new(parent: &Scope) -> Scope {
        Self::named(parent, caller_label(Location::caller()))
    }

    /// Create a child of `parent` with an explicit diagnostic label.
    #[must_use]
    pub fn named(parent: &Scope, label: impl Into<Cow<'static, str>>) -> Scope {
        Self::build(Some(parent), label.into())
    }

    /// Create a child of this scope.
    #[track_caller]
    #[must_use]
    pub fn child(&self) -> Scope {
        Self::named(self, caller_label(Location::caller()))
    }

    /// Create a root scope unrelated to the thread's root.
    #[track_caller]
    #[must_use]
    pub fn detached() -> Scope {
        Self::build(None, caller_label(Location::caller()))
    }

    fn build(parent: Option<&Scope>, label: Cow<'static, str>) -> Scope {
        let lifecycle = match parent {
            Some(p) => Lifecycle::child_of(&p.inner.lifecycle),
            None => Lifecycle::new(),
        };
        let namespace = Namespace::new(parent.map(|p| &p.inner.namespace), &lifecycle);
        let inner = Rc::new(ScopeInner {
            label,
            parent: parent.map(|p| Rc::downgrade(&p.inner)),
            lifecycle,
            namespace,
            spawner: RefCell::new(None),
        });
        // Cascaded disposal never goes through `Scope::dispose`.
        let weak = Rc::downgrade(&inner);
        inner.lifecycle.add_dispose_listener(move || {
            if let Some(inner) = weak.upgrade() {
                inner.spawner.borrow_mut().take();
            }
        });
        Scope { inner }
    }

    /// Diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Parent scope, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Scope { inner })
    }

    /// The owned lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    /// The owned namespace.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    /// Whether this scope has been disposed.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.lifecycle.is_disposed()
    }

    /// Dispose this scope and every descendant.
    pub fn dispose(&self) {
        if self.is_disposed() {
            return;
        }
        tracing::debug!(
            scope = %self.inner.label,
            listeners = self.inner.lifecycle.listener_count(),
            "disposing scope"
        );
        self.inner.lifecycle.dispose();
    }

    /// Run `listener` once when this scope disposes.
    pub fn on_dispose(&self, listener: impl FnOnce() + 'static) -> Option<DisposeKey> {
        self.inner.lifecycle.add_dispose_listener(listener)
    }

    /// Like [`on_dispose`](Self::on_dispose), deregistered when the hook drops.
    pub fn dispose_hook(&self, listener: impl FnOnce() + 'static) -> DisposeHook {
        self.inner.lifecycle.hook(listener)
    }

    /// Make this the current scope until the guard drops.
    #[must_use = "the scope is only current while the guard is alive"]
    pub fn enter(&self) -> CurrentScopeGuard {
        let depth = CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(self.clone());
            stack.len() - 1
        });
        CurrentScopeGuard {
            depth,
            _not_send: PhantomData,
        }
    }

    /// Run `f` with this scope as the current scope.
    pub fn declare_inside<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// Attach a local spawner used for async work in this subtree.
    ///
    /// Ignored once the scope is disposed.
    pub fn set_spawner(&self, spawner: impl LocalSpawn + 'static) {
        if self.is_disposed() {
            return;
        }
        *self.inner.spawner.borrow_mut() = Some(Rc::new(spawner));
    }

    /// Builder form of [`set_spawner`](Self::set_spawner).
    #[must_use]
    pub fn with_spawner(self, spawner: impl LocalSpawn + 'static) -> Self {
        self.set_spawner(spawner);
        self
    }

    /// The nearest spawner on the parent chain.
    #[must_use]
    pub fn spawner(&self) -> Option<Rc<dyn LocalSpawn>> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            let own = scope.inner.spawner.borrow().clone();
            if own.is_some() {
                return own;
            }
            current = scope.parent();
        }
        None
    }

    /// Spawn `future` on the nearest spawner.
    ///
    /// # Errors
    ///
    /// [`ScopeError::Spawn`] with `shutdown: true` once this scope is
    /// disposed, [`ScopeError::NoSpawner`] when no ancestor carries a
    /// spawner, or [`ScopeError::Spawn`] when the spawner refuses the task.
    pub fn spawn_local(&self, future: impl Future<Output = ()> + 'static) -> Result<(), ScopeError> {
        if self.is_disposed() {
            return Err(ScopeError::Spawn { shutdown: true });
        }
        let spawner = self.spawner().ok_or(ScopeError::NoSpawner)?;
        spawner.spawn_local(future)?;
        Ok(())
    }

    /// Whether two handles point at the same scope.
    #[must_use]
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("label", &self.inner.label)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// RAII guard returned by [`Scope::enter`].
///
/// Dropping the guard restores the stack to the depth it had before
/// `enter`. Scopes entered later and still on the stack are exited too, so an
/// out-of-order drop never leaves the wrong scope current.
#[must_use = "the scope is only current while the guard is alive"]
pub struct CurrentScopeGuard {
    depth: usize,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for CurrentScopeGuard {
    fn drop(&mut self) {
        let depth = self.depth;
        let _ = CURRENT.try_with(|stack| stack.borrow_mut().truncate(depth));
    }
}

impl std::fmt::Debug for CurrentScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentScopeGuard")
            .field("depth", &self.depth)
            .finish()
    }
}

fn caller_label(location: &'static Location<'static>) -> Cow<'static, str> {
    Cow::Owned(format!("{}:{}", location.file(), location.line()))
}
