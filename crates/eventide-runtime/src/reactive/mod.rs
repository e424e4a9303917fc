#![forbid(unsafe_code)]

//! The notification surface a rendering layer integrates with.
//!
//! Every derived value in this crate (action state, reduced values, async
//! maps, promises) keeps its current snapshot in an [`Observable`]. A view
//! reads the snapshot synchronously and subscribes for a callback whenever
//! event dispatch changes it. [`Binding`] is the read-only counterpart, used
//! where only "read the latest" is needed (latches, computed labels).
//!
//! Subscribers are held weakly by the observable and strongly by the
//! [`Subscription`] guard, so dropping the guard is all it takes to stop
//! listening.

pub mod binding;
pub mod observable;

pub use binding::Binding;
pub use observable::{Observable, Subscription};
