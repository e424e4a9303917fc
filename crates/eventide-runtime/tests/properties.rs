//! Property-based tests for disposal, dispatch order, and folding.

use std::cell::RefCell;
use std::rc::Rc;

use eventide_core::Scope;
use eventide_runtime::{EventRegistry, ReducedValue, RuntimeConfig, tick};
use proptest::prelude::*;

// ============================================================================
// Disposal
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Disposing n >= 1 times behaves exactly like disposing once.
    #[test]
    fn repeated_dispose_is_a_noop(times in 1_usize..8, listeners in 0_usize..6) {
        let parent = Scope::detached();
        let child = parent.child();
        let fired = Rc::new(RefCell::new(0_usize));
        for _ in 0..listeners {
            let f = Rc::clone(&fired);
            let _ = parent.on_dispose(move || *f.borrow_mut() += 1);
        }
        parent.namespace().add_object("k", 1_u8);

        for _ in 0..times {
            parent.dispose();
            prop_assert!(parent.is_disposed());
            prop_assert!(child.is_disposed());
            prop_assert_eq!(*fired.borrow(), listeners);
            prop_assert_eq!(parent.lifecycle().listener_count(), 0);
            prop_assert!(parent.namespace().is_empty());
        }
    }

    /// A registry never delivers after its scope disposed, however many
    /// events are emitted on either side of the disposal.
    #[test]
    fn no_delivery_after_disposal(before in 0_u32..20, after in 0_u32..20) {
        let scope = Scope::detached();
        let registry = EventRegistry::<u32>::named(&scope, "prop");
        let seen = Rc::new(RefCell::new(0_u32));
        let s = Rc::clone(&seen);
        registry.on(move |_| *s.borrow_mut() += 1);

        for v in 0..before {
            registry.emit_once(v);
        }
        scope.dispose();
        for v in 0..after {
            registry.emit_once(v);
        }
        prop_assert_eq!(*seen.borrow(), before);
    }
}

// ============================================================================
// Tick ordering
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A linear chain of linked registries delivers each hop exactly once, in
    /// order, inside one root tick.
    #[test]
    fn linked_chain_is_breadth_first(depth in 1_usize..40) {
        let scope = Scope::detached();
        let registries: Vec<EventRegistry<usize>> =
            (0..depth).map(|_| EventRegistry::named(&scope, "hop")).collect();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (i, registry) in registries.iter().enumerate() {
            let o = Rc::clone(&order);
            registry.on(move |_| o.borrow_mut().push(i));
        }
        for pair in registries.windows(2) {
            pair[0].link_to(&pair[1]);
        }

        registries[0].emit_once(0);
        prop_assert_eq!(order.borrow().clone(), (0..depth).collect::<Vec<_>>());
        prop_assert_eq!(tick::last_tick_stats().reactions, depth);
        prop_assert!(!tick::is_ticking());
    }

    /// A link cycle never runs more reactions than the configured budget
    /// allows, and the dispatcher is usable afterwards.
    #[test]
    fn cycles_respect_budget(budget in 1_usize..200) {
        let _cfg = RuntimeConfig { max_tick_reactions: budget, ..RuntimeConfig::default() }.install();
        let scope = Scope::detached();
        let a = EventRegistry::<u8>::named(&scope, "a");
        let b = EventRegistry::<u8>::named(&scope, "b");
        a.link_to(&b);
        b.link_to(&a);

        a.emit_once(0);
        let stats = tick::last_tick_stats();
        prop_assert!(stats.overflowed);
        prop_assert_eq!(stats.reactions, budget + 1);
        prop_assert!(!tick::is_ticking());
    }
}

// ============================================================================
// Folding
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A sum reducer equals the sum of the emitted events.
    #[test]
    fn sum_reducer_matches_fold(events in prop::collection::vec(-1000_i64..1000, 0..50)) {
        let scope = Scope::detached();
        let registry = EventRegistry::<i64>::named(&scope, "sum");
        let total = ReducedValue::builder()
            .add_reducer(&registry, |acc: &i64, e| acc + e)
            .build_in(&scope, 0);
        for e in &events {
            registry.emit_once(*e);
        }
        prop_assert_eq!(total.value(), events.iter().sum::<i64>());
    }

    /// A reducer that panics on some events behaves like a reducer that
    /// skips those events.
    #[test]
    fn panicking_reducer_skips_only_bad_events(events in prop::collection::vec(0_u8..10, 0..30)) {
        let scope = Scope::detached();
        let registry = EventRegistry::<u8>::named(&scope, "count");
        let count = ReducedValue::builder()
            .add_reducer(&registry, |n: &usize, e| {
                assert!(*e != 0, "zero event");
                n + 1
            })
            .build_in(&scope, 0);
        for e in &events {
            registry.emit_once(*e);
        }
        prop_assert_eq!(count.value(), events.iter().filter(|e| **e != 0).count());
    }
}
