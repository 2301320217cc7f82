// Property tests for the versioned heap and the compiled call protocol

use proptest::prelude::*;
use retrace::compiler::compile_source;
use retrace::compiler::node::{NodeId, NodeKind, Signal};
use retrace::memory::heap::GenerationId;
use retrace::memory::{Address, Heap, HeapValue, Value};

#[derive(Debug, Clone)]
enum Op {
    Alloc(i64),
    Write(usize, i64),
    Freeze,
    Restore,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<i64>().prop_map(Op::Alloc),
        3 => (0usize..32, any::<i64>()).prop_map(|(i, v)| Op::Write(i, v)),
        1 => Just(Op::Freeze),
        1 => Just(Op::Restore),
    ]
}

fn write_int(heap: &mut Heap, address: Address, value: i64) {
    match heap.write_for_mutation(address).unwrap() {
        HeapValue::Boxed(inner) => *inner = Value::Int(value),
        other => panic!("Expected a box, got {:?}", other),
    }
}

fn assert_visible(heap: &Heap, visible: &[(Address, i64)]) {
    for (address, value) in visible {
        assert_eq!(
            heap.read(*address).unwrap(),
            &HeapValue::Boxed(Value::Int(*value))
        );
        assert_eq!(heap.reference_count(*address).unwrap(), 1);
    }
}

proptest! {
    /// Restoring a generation brings back exactly the values visible when
    /// it was sealed, and nothing allocated after it
    #[test]
    fn generations_isolate_writes(ops in prop::collection::vec(op(), 1..80)) {
        let mut heap = Heap::new();
        let mut visible: Vec<(Address, i64)> = Vec::new();
        let mut frames: Vec<(GenerationId, Vec<(Address, i64)>)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(value) => {
                    let address = heap.allocate(HeapValue::Boxed(Value::Int(value)));
                    visible.push((address, value));
                }
                Op::Write(i, value) => {
                    if !visible.is_empty() {
                        let slot = i % visible.len();
                        write_int(&mut heap, visible[slot].0, value);
                        visible[slot].1 = value;
                    }
                }
                Op::Freeze => {
                    frames.push((heap.current_generation(), visible.clone()));
                    heap.new_generation();
                }
                Op::Restore => {
                    if let Some((generation, snapshot)) = frames.pop() {
                        heap.discard_newer_than(generation).unwrap();
                        prop_assert_eq!(heap.current_generation(), generation);
                        for (address, _) in &visible[snapshot.len()..] {
                            prop_assert!(heap.read(*address).is_err());
                        }
                        visible = snapshot;
                    }
                }
            }
            assert_visible(&heap, &visible);
        }
        heap.verify_chain().unwrap();
    }

    /// Collapsing keeps every visible value and is idempotent
    #[test]
    fn collapse_is_idempotent(ops in prop::collection::vec(op(), 1..60)) {
        let mut heap = Heap::new();
        let mut visible: Vec<(Address, i64)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(value) => {
                    let address = heap.allocate(HeapValue::Boxed(Value::Int(value)));
                    visible.push((address, value));
                }
                Op::Write(i, value) => {
                    if !visible.is_empty() {
                        let slot = i % visible.len();
                        write_int(&mut heap, visible[slot].0, value);
                        visible[slot].1 = value;
                    }
                }
                Op::Freeze | Op::Restore => {
                    heap.new_generation();
                }
            }
        }

        heap.collapse_to(GenerationId(0)).unwrap();
        prop_assert!(heap.generation_count() <= 2);
        assert_visible(&heap, &visible);

        let chain = heap.generation_chain();
        heap.collapse_to(GenerationId(0)).unwrap();
        prop_assert_eq!(heap.generation_chain(), chain);
        assert_visible(&heap, &visible);
        heap.verify_chain().unwrap();
    }

    /// Every retain is matched by a release; dropping the last owner frees
    /// the container and everything only it referenced
    #[test]
    fn reference_counts_are_conserved(
        items in prop::collection::vec(any::<i64>(), 0..12),
        extra in 0u32..5,
    ) {
        let mut heap = Heap::new();
        let children: Vec<Address> = items
            .iter()
            .map(|n| heap.allocate(HeapValue::Boxed(Value::Int(*n))))
            .collect();
        let list = heap.allocate(HeapValue::List(
            children.iter().map(|a| Value::Ref(*a)).collect(),
        ));
        let owner = Value::Ref(list);

        for _ in 0..extra {
            heap.retain(&owner).unwrap();
        }
        prop_assert_eq!(heap.reference_count(list).unwrap(), extra + 1);
        for _ in 0..extra {
            prop_assert_eq!(heap.release(&owner).unwrap(), 0);
        }

        // Releasing inside a frozen generation is undone by the rollback
        let sealed = heap.current_generation();
        heap.new_generation();
        prop_assert_eq!(heap.release(&owner).unwrap(), children.len() + 1);
        prop_assert!(heap.is_freed(list));
        for child in &children {
            prop_assert!(heap.is_freed(*child));
        }

        heap.discard_newer_than(sealed).unwrap();
        prop_assert_eq!(heap.reference_count(list).unwrap(), 1);
        for child in &children {
            prop_assert_eq!(heap.reference_count(*child).unwrap(), 1);
        }
    }

    /// Every argument of a call reports back with its own signal
    #[test]
    fn call_argument_signals_do_not_collide(positional in 0usize..6, named in 0usize..6) {
        let mut args: Vec<String> = (0..positional).map(|i| i.to_string()).collect();
        args.extend((0..named).map(|i| format!("k{} = {}", i, i)));
        let source = format!("fun main() {{ f({}); }}", args.join(", "));
        let program = compile_source(&source).unwrap();

        let call = program
            .nodes
            .iter()
            .position(|n| matches!(n.kind, NodeKind::Call { .. }))
            .unwrap();
        let mut signals: Vec<Signal> = program
            .children(NodeId(call as u32))
            .into_iter()
            .map(|(_, signal)| signal)
            .collect();
        prop_assert_eq!(signals.len(), positional + named + 1);
        signals.sort_by_key(|s| match s {
            Signal::Child(i) => *i,
            _ => u32::MAX,
        });
        signals.dedup();
        prop_assert_eq!(signals.len(), positional + named + 1);
        prop_assert!(signals.iter().all(|s| matches!(s, Signal::Child(_))));
    }
}
