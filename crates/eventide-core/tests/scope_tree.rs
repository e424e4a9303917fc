//! Disposal behaviour of whole scope trees.

use std::cell::RefCell;
use std::rc::Rc;

use eventide_core::{Lifecycle, Scope};
use proptest::prelude::*;
use tracing_test::traced_test;

// ============================================================================
// Helpers
// ============================================================================

/// Build a tree where node `i` (for `i > 0`) hangs off `parents[i - 1] % i`.
fn build_tree(parents: &[usize]) -> Vec<Scope> {
    let mut nodes = vec![Scope::detached()];
    for (i, p) in parents.iter().enumerate() {
        let parent = nodes[p % (i + 1)].clone();
        nodes.push(parent.child());
    }
    nodes
}

fn is_descendant(nodes: &[Scope], node: usize, ancestor: usize) -> bool {
    let mut cursor = Some(nodes[node].clone());
    while let Some(scope) = cursor {
        if scope.ptr_eq(&nodes[ancestor]) {
            return true;
        }
        cursor = scope.parent();
    }
    false
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn dispose_reaches_exactly_the_subtree(
        parents in prop::collection::vec(0usize..64, 1..24),
        target in 0usize..64,
    ) {
        let nodes = build_tree(&parents);
        let target = target % nodes.len();
        nodes[target].dispose();

        for i in 0..nodes.len() {
            prop_assert_eq!(nodes[i].is_disposed(), is_descendant(&nodes, i, target));
        }
    }

    #[test]
    fn listeners_fire_once_in_registration_order(count in 1usize..32) {
        let lifecycle = Lifecycle::new();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for i in 0..count {
            let f = Rc::clone(&fired);
            lifecycle.add_dispose_listener(move || f.borrow_mut().push(i));
        }
        lifecycle.dispose();
        lifecycle.dispose();
        prop_assert_eq!(fired.borrow().clone(), (0..count).collect::<Vec<_>>());
    }
}

// ============================================================================
// Logging
// ============================================================================

#[test]
#[traced_test]
fn panicking_listener_is_logged_and_the_rest_still_run() {
    let scope = Scope::named(&Scope::detached(), "settings");
    let after = Rc::new(RefCell::new(false));
    scope.on_dispose(|| panic!("listener blew up"));
    let a = Rc::clone(&after);
    scope.on_dispose(move || *a.borrow_mut() = true);

    scope.dispose();

    assert!(*after.borrow());
    assert!(logs_contain("disposing scope"));
    assert!(logs_contain("dispose listener panicked"));
    assert!(logs_contain("listener blew up"));
}

#[test]
fn dispose_events_reach_a_custom_layer() {
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    struct Capture {
        logs: Arc<Mutex<Vec<String>>>,
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Capture {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Message(String);

            impl tracing::field::Visit for Message {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if field.name() == "message" {
                        self.0 = format!("{value:?}");
                    }
                }
            }

            let mut message = Message(String::new());
            event.record(&mut message);
            if let Ok(mut logs) = self.logs.lock() {
                logs.push(format!("[{}] {}", event.metadata().level(), message.0));
            }
        }
    }

    let logs = Arc::new(Mutex::new(Vec::new()));
    {
        let _guard = tracing_subscriber::registry()
            .with(Capture {
                logs: Arc::clone(&logs),
            })
            .set_default();
        let root = Scope::detached();
        Scope::named(&root, "form").dispose();
    }

    let logs = logs.lock().unwrap();
    assert!(
        logs.iter().any(|line| line == "[DEBUG] disposing scope"),
        "captured: {logs:?}"
    );
}
