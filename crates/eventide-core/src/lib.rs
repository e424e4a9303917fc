#![forbid(unsafe_code)]

//! Ownership primitives for the eventide reactive runtime.
//!
//! - [`Lifecycle`]: one-shot, cascading disposal signal.
//! - [`Namespace`]: name/type keyed object registry chained to a parent.
//! - [`Scope`]: a lifecycle plus a namespace, with an ambient
//!   "current scope" stack and an optional local task spawner.
//!
//! Everything here is single-threaded (`Rc`-based) and cooperative.

pub mod error;
pub mod lifecycle;
pub mod namespace;
pub mod scope;

pub use error::ScopeError;
pub use lifecycle::{DisposeHook, DisposeKey, Disposed, Lifecycle, panic_message};
pub use namespace::Namespace;
pub use scope::{CurrentScopeGuard, Scope};
