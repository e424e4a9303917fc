#![forbid(unsafe_code)]

//! Chained object registry keyed by name or by type.
//!
//! Each [`Namespace`] has its own store; lookups check the local store first
//! and then walk up the parent chain. Registering in a child never touches the
//! parent, so a child can shadow a parent entry only for its own lookups.
//!
//! The store is cleared exactly once, when the owning lifecycle disposes.
//! Registrations after that point are ignored.
//!
//! There is deliberately no way to enumerate entries or children.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::lifecycle::Lifecycle;

type Entry = Rc<dyn Any>;

struct NamespaceInner {
    parent: Option<Namespace>,
    lifecycle: Lifecycle,
    by_name: RefCell<AHashMap<String, Entry>>,
    by_type: RefCell<AHashMap<TypeId, Entry>>,
}

/// Name/type keyed object registry chained to a parent namespace.
#[derive(Clone)]
pub struct Namespace {
    inner: Rc<NamespaceInner>,
}

impl Namespace {
    /// Create a namespace cleared when `lifecycle` disposes.
    #[must_use]
    pub fn new(parent: Option<&Namespace>, lifecycle: &Lifecycle) -> Self {
        let ns = Self {
            inner: Rc::new(NamespaceInner {
                parent: parent.cloned(),
                lifecycle: lifecycle.clone(),
                by_name: RefCell::new(AHashMap::new()),
                by_type: RefCell::new(AHashMap::new()),
            }),
        };
        let weak = Rc::downgrade(&ns.inner);
        lifecycle.add_dispose_listener(move || {
            if let Some(inner) = weak.upgrade() {
                inner.by_name.borrow_mut().clear();
                inner.by_type.borrow_mut().clear();
            }
        });
        ns
    }

    /// Parent namespace, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Namespace> {
        self.inner.parent.as_ref()
    }

    /// Whether this namespace has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Whether the local store (ignoring parents) holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.by_name.borrow().is_empty() && self.inner.by_type.borrow().is_empty()
    }

    /// Register `object` under `name`. Last write wins.
    pub fn add_object<T: Any>(&self, name: impl Into<String>, object: T) {
        self.add_shared(name, Rc::new(object));
    }

    /// Register an already shared object under `name`.
    pub fn add_shared<T: Any>(&self, name: impl Into<String>, object: Rc<T>) {
        if self.inner.lifecycle.is_disposed() {
            tracing::trace!("namespace disposed; ignoring named registration");
            return;
        }
        self.inner.by_name.borrow_mut().insert(name.into(), object);
    }

    /// Register `object` under its own type. Last write wins.
    pub fn add_object_by_type<T: Any>(&self, object: T) {
        if self.inner.lifecycle.is_disposed() {
            tracing::trace!("namespace disposed; ignoring typed registration");
            return;
        }
        self.inner
            .by_type
            .borrow_mut()
            .insert(TypeId::of::<T>(), Rc::new(object));
    }

    /// Remove the local entry for `name`.
    pub fn remove_object(&self, name: &str) -> bool {
        self.inner.by_name.borrow_mut().remove(name).is_some()
    }

    /// Remove the local entry for type `T`.
    pub fn remove_object_by_type<T: Any>(&self) -> bool {
        self.inner
            .by_type
            .borrow_mut()
            .remove(&TypeId::of::<T>())
            .is_some()
    }

    /// Find the nearest registration of `name`.
    ///
    /// Returns `None` if no namespace in the chain holds `name`, or if the
    /// nearest registration is not a `T`.
    #[must_use]
    pub fn find_object<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        let mut current = Some(self);
        while let Some(ns) = current {
            let local = ns.inner.by_name.borrow().get(name).cloned();
            if let Some(entry) = local {
                return entry.downcast::<T>().ok();
            }
            current = ns.parent();
        }
        None
    }

    /// Find the nearest registration for type `T`.
    #[must_use]
    pub fn find_object_by_type<T: Any>(&self) -> Option<Rc<T>> {
        let key = TypeId::of::<T>();
        let mut current = Some(self);
        while let Some(ns) = current {
            let local = ns.inner.by_type.borrow().get(&key).cloned();
            if let Some(entry) = local {
                return entry.downcast::<T>().ok();
            }
            current = ns.parent();
        }
        None
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("root", &self.is_root())
            .field("named", &self.inner.by_name.borrow().len())
            .field("typed", &self.inner.by_type.borrow().len())
            .finish()
    }
}
