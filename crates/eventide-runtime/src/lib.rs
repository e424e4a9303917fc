#![forbid(unsafe_code)]

//! Events, actions, and derived values for the eventide reactive runtime.
//!
//! Everything is anchored to an [`eventide_core::Scope`]. When the scope
//! disposes, the registries, actions, and derived values declared in it stop
//! reacting.
//!
//! | Type | Role |
//! |---|---|
//! | [`EventRegistry`] | typed event bus with root-tick dispatch, links, and pull streams |
//! | [`Action`] | four-state wrapper around sync or async work |
//! | [`ReducedValue`] | value folded from events |
//! | [`LastEventValue`] | latest event, pending until the first |
//! | [`PromiseValue`] | observable outcome of a spawned future |
//! | [`AsyncObservable`] | latest item of a spawned stream |
//! | [`AsyncMap`] | lazily observed async derivation |
//! | [`LastValidValueLatch`], [`GatedLatch`] | reads that hold back updates |
//!
//! Derived values keep their snapshot in a [`reactive::Observable`], which is
//! the notification hook for a rendering layer.

pub mod action;
pub mod async_map;
pub mod async_value;
pub mod config;
pub mod error;
pub mod event;
pub mod latch;
pub mod reactive;
pub mod reducer;
pub mod tick;

pub use action::{Action, ActionOutcome, ActionState, Execution, Run, RunFuture};
pub use async_map::{AsyncMap, AsyncMapState};
pub use async_value::{AsyncObservable, AsyncSource, AsyncValue, PromiseValue};
pub use config::{ConfigError, ConfigGuard, RuntimeConfig};
pub use error::Failure;
pub use event::{
    Emitter, EventRegistry, EventStream, EventSubscription, ListenerId, SourceHandle, StopSignal,
};
pub use latch::{GatedLatch, LastValidValueLatch};
pub use reactive::{Binding, Observable, Subscription};
pub use reducer::{LastEventValue, ReducedValue, ReducedValueBuilder};
pub use tick::TickStats;
