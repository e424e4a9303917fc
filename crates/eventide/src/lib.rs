#![forbid(unsafe_code)]

//! Eventide: scoped events, actions, and derived values.
//!
//! This crate re-exports the ownership primitives from `eventide-core` and,
//! with the default `runtime` feature, everything from `eventide-runtime`.
//!
//! ```
//! use eventide::prelude::*;
//!
//! let scope = Scope::detached();
//! let clicked = EventRegistry::<()>::named(&scope, "clicked");
//! let count = ReducedValue::builder()
//!     .add_reducer(&clicked, |n: &u32, ()| n + 1)
//!     .build_in(&scope, 0);
//!
//! clicked.emit_once(());
//! clicked.emit_once(());
//! clicked.emit_once(());
//! assert_eq!(count.value(), 3);
//!
//! scope.dispose();
//! clicked.emit_once(());
//! assert_eq!(count.value(), 3);
//! ```

pub use eventide_core::{
    CurrentScopeGuard, DisposeHook, Lifecycle, Namespace, Scope, ScopeError,
};

#[cfg(feature = "runtime")]
pub use eventide_runtime as runtime;
#[cfg(feature = "runtime")]
pub use eventide_runtime::{
    Action, ActionOutcome, ActionState, AsyncMap, AsyncMapState, AsyncObservable, AsyncSource,
    AsyncValue, Binding, ConfigError, ConfigGuard, Emitter, EventRegistry, EventStream,
    EventSubscription, Execution, Failure, GatedLatch, LastEventValue, LastValidValueLatch,
    ListenerId, Observable, PromiseValue, ReducedValue, ReducedValueBuilder, Run, RuntimeConfig,
    SourceHandle, StopSignal, Subscription, TickStats, bind, bind_map, bind_map2, config,
    reactive, tick,
};

/// Common imports.
pub mod prelude {
    pub use eventide_core::{Lifecycle, Namespace, Scope, ScopeError};

    #[cfg(feature = "runtime")]
    pub use eventide_runtime::{
        Action, ActionState, AsyncMap, AsyncObservable, AsyncSource, AsyncValue, Binding,
        EventRegistry, Failure, GatedLatch, LastEventValue, LastValidValueLatch, Observable,
        PromiseValue, ReducedValue, RuntimeConfig, StopSignal, Subscription,
    };
}
