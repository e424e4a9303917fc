#![no_main]

use std::cell::Cell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use eventide_core::Scope;
use eventide_runtime::{EventRegistry, ListenerId, ReducedValue, RuntimeConfig, tick};
use libfuzzer_sys::fuzz_target;

const REGISTRIES: usize = 6;
const BUDGET: usize = 256;

#[derive(Debug, Arbitrary)]
enum Op {
    Emit { registry: u8, value: u8 },
    Link { from: u8, to: u8 },
    LinkFiltered { from: u8, to: u8, modulus: u8 },
    ReEmitListener { registry: u8, target: u8 },
    RemoveLast { registry: u8 },
    DisposeScope { scope: u8 },
}

struct Node {
    registry: EventRegistry<u8>,
    delivered: Rc<Cell<u64>>,
    listeners: Vec<ListenerId>,
}

fuzz_target!(|ops: Vec<Op>| {
    let _cfg = RuntimeConfig {
        max_tick_reactions: BUDGET,
        ..RuntimeConfig::default()
    }
    .install();

    let root = Scope::detached();
    let scopes: Vec<Scope> = (0..REGISTRIES).map(|_| root.child()).collect();
    let mut nodes: Vec<Node> = scopes
        .iter()
        .map(|scope| {
            let registry = EventRegistry::named(scope, "fuzz");
            let delivered = Rc::new(Cell::new(0));
            let d = Rc::clone(&delivered);
            registry.on(move |_| d.set(d.get() + 1));
            Node {
                registry,
                delivered,
                listeners: Vec::new(),
            }
        })
        .collect();
    let folded = ReducedValue::builder()
        .add_reducer(&nodes[0].registry, |n: &u64, _| n.wrapping_add(1))
        .build_in(&scopes[0], 0);

    let pick = |i: u8| usize::from(i) % REGISTRIES;

    for op in ops.into_iter().take(512) {
        match op {
            Op::Emit { registry, value } => {
                let i = pick(registry);
                let before: Vec<u64> = nodes.iter().map(|n| n.delivered.get()).collect();
                nodes[i].registry.emit_once(value);

                assert!(!tick::is_ticking());
                assert_eq!(tick::pending_reactions(), 0);
                let stats = tick::last_tick_stats();
                assert!(stats.reactions <= BUDGET + 1);

                for (n, prior) in nodes.iter().zip(before) {
                    if n.registry.is_disposed() {
                        assert_eq!(n.delivered.get(), prior);
                    }
                }
            }
            Op::Link { from, to } => {
                let target = nodes[pick(to)].registry.clone();
                let id = nodes[pick(from)].registry.link_to(&target);
                nodes[pick(from)].listeners.push(id);
            }
            Op::LinkFiltered { from, to, modulus } => {
                let target = nodes[pick(to)].registry.clone();
                let m = modulus.max(1);
                let id = nodes[pick(from)]
                    .registry
                    .link_to_filtered(&target, move |v| v % m == 0);
                nodes[pick(from)].listeners.push(id);
            }
            Op::ReEmitListener { registry, target } => {
                let target = nodes[pick(target)].registry.clone();
                let id = nodes[pick(registry)]
                    .registry
                    .on(move |v| target.emit_once(v.wrapping_add(1)));
                nodes[pick(registry)].listeners.push(id);
            }
            Op::RemoveLast { registry } => {
                let node = &mut nodes[pick(registry)];
                if let Some(id) = node.listeners.pop() {
                    node.registry.off(id);
                }
            }
            Op::DisposeScope { scope } => {
                let i = pick(scope);
                scopes[i].dispose();
                assert_eq!(nodes[i].registry.listener_count(), 0);
            }
        }
    }

    let frozen = folded.value();
    scopes[0].dispose();
    nodes[0].registry.emit_once(0);
    assert_eq!(folded.value(), frozen);

    // Links hold their targets; disposing the root breaks any cycles.
    root.dispose();
});
