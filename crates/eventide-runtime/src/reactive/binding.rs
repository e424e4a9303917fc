#![forbid(unsafe_code)]

//! Pull-style read handles over derived state.
//!
//! A [`Binding<T>`] wraps "how to read a `T` right now". Latches and views
//! take bindings so they do not care whether the value lives in an
//! [`Observable`], a [`ReducedValue`](crate::ReducedValue), or behind an
//! [`AsyncSource`]. Reads are never cached: every [`Binding::get`] re-reads
//! the source and re-applies any mapping.
//!
//! ```
//! use eventide_runtime::reactive::{Binding, Observable};
//!
//! let celsius = Observable::new(20.0_f64);
//! let fahrenheit = Binding::observe_with(&celsius, |c| c * 9.0 / 5.0 + 32.0);
//! assert_eq!(fahrenheit.get(), 68.0);
//!
//! celsius.set(100.0);
//! assert_eq!(fahrenheit.get(), 212.0);
//! ```
//!
//! # Failure Modes
//!
//! - A panicking read function panics in the caller of `get()`.

use std::rc::Rc;

use super::observable::Observable;
use crate::async_value::{AsyncSource, AsyncValue};

/// A shareable read function.
pub struct Binding<T> {
    read: Rc<dyn Fn() -> T>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            read: Rc::clone(&self.read),
        }
    }
}

impl<T: 'static> Binding<T> {
    /// Bind an arbitrary read function.
    pub fn new(read: impl Fn() -> T + 'static) -> Self {
        Self {
            read: Rc::new(read),
        }
    }

    /// Always read `value`.
    pub fn constant(value: T) -> Self
    where
        T: Clone,
    {
        Self::new(move || value.clone())
    }

    /// Read the current value of `source`.
    pub fn observe(source: &Observable<T>) -> Self
    where
        T: Clone + PartialEq,
    {
        let source = source.clone();
        Self::new(move || source.get())
    }

    /// Read `project(&value)` from `source` without cloning the value.
    pub fn observe_with<S: Clone + PartialEq + 'static>(
        source: &Observable<S>,
        project: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let source = source.clone();
        Self::new(move || source.with(&project))
    }

    /// Read two observables together.
    pub fn combine<A, B>(
        a: &Observable<A>,
        b: &Observable<B>,
        join: impl Fn(&A, &B) -> T + 'static,
    ) -> Self
    where
        A: Clone + PartialEq + 'static,
        B: Clone + PartialEq + 'static,
    {
        let (a, b) = (a.clone(), b.clone());
        Self::new(move || a.with(|x| b.with(|y| join(x, y))))
    }

    /// Read now.
    #[must_use]
    pub fn get(&self) -> T {
        (self.read)()
    }

    /// Post-process every read.
    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Binding<U> {
        Binding::new(move || f((self.read)()))
    }

    /// Read this binding and `other` as a pair.
    pub fn zip<U: 'static>(self, other: Binding<U>) -> Binding<(T, U)> {
        Binding::new(move || (self.get(), other.get()))
    }

    /// Unwrap into a plain closure.
    pub fn into_getter(self) -> impl Fn() -> T + 'static {
        move || (self.read)()
    }
}

impl<T: 'static> Binding<AsyncValue<T>> {
    /// Read the snapshot of an async source.
    pub fn from_source(source: impl AsyncSource<T> + 'static) -> Self {
        Self::new(move || source.snapshot())
    }

    /// Read the carried value, falling back to `fallback` while pending.
    pub fn value_or(self, fallback: T) -> Binding<T>
    where
        T: Clone,
    {
        self.map(move |snapshot| snapshot.into_value().unwrap_or_else(|| fallback.clone()))
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Binding").field(&self.get()).finish()
    }
}

/// [`Binding::observe`] shorthand.
///
/// ```
/// use eventide_runtime::{bind, reactive::Observable};
///
/// let name = Observable::new("ada");
/// assert_eq!(bind!(name).get(), "ada");
/// ```
#[macro_export]
macro_rules! bind {
    ($source:expr) => {
        $crate::reactive::Binding::observe(&$source)
    };
}

/// [`Binding::observe_with`] shorthand.
///
/// ```
/// use eventide_runtime::{bind_map, reactive::Observable};
///
/// let items = Observable::new(vec![1, 2, 3]);
/// assert_eq!(bind_map!(items, |v: &Vec<i32>| v.len()).get(), 3);
/// ```
#[macro_export]
macro_rules! bind_map {
    ($source:expr, $project:expr) => {
        $crate::reactive::Binding::observe_with(&$source, $project)
    };
}

/// [`Binding::combine`] shorthand.
///
/// ```
/// use eventide_runtime::{bind_map2, reactive::Observable};
///
/// let first = Observable::new("Ada");
/// let last = Observable::new("Lovelace");
/// let full = bind_map2!(first, last, |f: &&str, l: &&str| format!("{f} {l}"));
/// assert_eq!(full.get(), "Ada Lovelace");
/// ```
#[macro_export]
macro_rules! bind_map2 {
    ($a:expr, $b:expr, $join:expr) => {
        $crate::reactive::Binding::combine(&$a, &$b, $join)
    };
}
