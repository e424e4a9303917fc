#![forbid(unsafe_code)]

//! The root-tick dispatcher.
//!
//! Emitting an event while no tick is running starts a *root tick*: the
//! emission runs immediately, and every emission it causes (from listeners,
//! links, reducers, or action triggers) is appended to a pending queue instead
//! of recursing. The queue is drained front to back until empty, all before the
//! original `emit_once` returns.
//!
//! ```text
//! emit(E) ──► dispatch E ──► listener emits F ──► queue [F]
//!                         └► link emits G     ──► queue [F, G]
//!          ◄─ drain F (may queue H) ─ drain G ─ drain H ─ done
//! ```
//!
//! # Invariants
//!
//! 1. One external trigger produces one bounded synchronous batch.
//! 2. Stack depth does not grow with the length of a reaction chain.
//! 3. Reactions run in the order they were scheduled (breadth-first).
//! 4. At most `max_tick_reactions` deferred reactions run per tick; the rest
//!    are dropped with a warning.
//!
//! # Failure Modes
//!
//! - A panic that escapes a reaction resets the dispatcher before unwinding,
//!   so the next emission starts a fresh root tick.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use eventide_core::panic_message;
use web_time::Instant;

use crate::config;

type Reaction = Box<dyn FnOnce()>;

#[derive(Default)]
struct TickState {
    draining: bool,
    pending: VecDeque<Reaction>,
    last: TickStats,
}

thread_local! {
    static TICK: RefCell<TickState> = RefCell::new(TickState::default());
}

/// Summary of the most recent completed root tick on this thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Reactions executed, including the root emission.
    pub reactions: usize,
    /// Reactions dropped because the budget ran out.
    pub dropped: usize,
    /// Whether the reaction budget was exceeded.
    pub overflowed: bool,
    /// Wall-clock time spent in the tick.
    pub elapsed: Duration,
}

/// Whether a root tick is currently draining on this thread.
#[must_use]
pub fn is_ticking() -> bool {
    TICK.try_with(|t| t.borrow().draining).unwrap_or(false)
}

/// Stats for the last completed root tick on this thread.
#[must_use]
pub fn last_tick_stats() -> TickStats {
    TICK.try_with(|t| t.borrow().last).unwrap_or_default()
}

/// Number of reactions waiting in the current tick.
#[must_use]
pub fn pending_reactions() -> usize {
    TICK.try_with(|t| t.borrow().pending.len()).unwrap_or(0)
}

/// Run `reaction` now as a root tick, or queue it on the running tick.
pub(crate) fn run_or_defer(label: &str, reaction: Reaction) {
    let root = TICK.try_with(|t| {
        let mut state = t.borrow_mut();
        if state.draining {
            state.pending.push_back(reaction);
            None
        } else {
            state.draining = true;
            Some(reaction)
        }
    });
    let root = match root {
        Ok(Some(root)) => root,
        Ok(None) => {
            tracing::trace!(registry = label, "deferred into running tick");
            return;
        }
        Err(_) => return,
    };

    let _reset = DrainReset;
    let _span = tracing::trace_span!("root_tick", registry = label).entered();
    let started = Instant::now();
    let budget = config::current().max_tick_reactions;

    root();
    let mut reactions = 1_usize;
    let mut dropped = 0_usize;

    loop {
        let next = TICK.with(|t| t.borrow_mut().pending.pop_front());
        let Some(next) = next else {
            break;
        };
        if reactions > budget {
            dropped = TICK.with(|t| {
                let mut state = t.borrow_mut();
                let n = state.pending.len();
                state.pending.clear();
                n
            }) + 1;
            drop(next);
            tracing::warn!(
                registry = label,
                budget,
                dropped,
                "root tick exceeded its reaction budget; dropping remaining reactions"
            );
            break;
        }
        next();
        reactions += 1;
    }

    let stats = TickStats {
        reactions,
        dropped,
        overflowed: dropped > 0,
        elapsed: started.elapsed(),
    };
    tracing::trace!(
        registry = label,
        reactions,
        elapsed_us = stats.elapsed.as_micros() as u64,
        "root tick complete"
    );
    TICK.with(|t| t.borrow_mut().last = stats);
}

/// Clears the draining flag even if a reaction unwinds.
struct DrainReset;

impl Drop for DrainReset {
    fn drop(&mut self) {
        let _ = TICK.try_with(|t| {
            let mut state = t.borrow_mut();
            state.draining = false;
            state.pending.clear();
        });
    }
}

/// Run `f`, catching and logging a panic. Returns `None` if it panicked.
pub(crate) fn isolate<R>(context: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(
                context,
                panic = %panic_message(payload.as_ref()),
                "reaction panicked; continuing"
            );
            None
        }
    }
}

/// Run a plain listener, isolating panics when the config asks for it.
pub(crate) fn run_listener(f: impl FnOnce()) {
    if config::current().isolate_listener_panics {
        isolate("event listener", f);
    } else {
        f();
    }
}
