mod proptest;

use super::{Heap, Pending, Value};
use crate::symbol::SymbolTable;

#[test]
fn liveness_preserved_across_collections() {
    let mut heap = Heap::new(24_000);

    let empty = heap.alloc_nil();
    let list = heap.push_root(empty);

    for i in (0..10_000i64).rev() {
        // One dead cell per element so the build outgrows the space and
        // forces collections along the way.
        heap.alloc_number(i);

        let element = heap.alloc_number(i);
        let pair = heap.alloc_pair(element, heap.root(list));
        heap.set_root(list, pair);
    }

    assert!(heap.stats().collections >= 1);

    let mut rest = heap.root(list);

    for expected in 0..10_000i64 {
        let Value::Pair { head, tail } = heap.get(rest) else {
            panic!("list truncated at element {expected}");
        };

        assert_eq!(heap.get(head), Value::Number(expected));
        rest = tail;
    }

    assert_eq!(heap.get(rest), Value::Nil);
}

#[test]
fn aliased_roots_relocate_to_one_cell() {
    let mut heap = Heap::new(64);

    let one = heap.alloc_number(1);
    let empty = heap.alloc_nil();
    let pair = heap.alloc_pair(one, empty);

    // Root the same pair through two different sources.
    heap.pending_push(Pending::Value(pair)).unwrap();
    heap.set_global_env(pair);

    heap.collect();

    let via_env = heap.global_env();
    let Some(Pending::Value(via_pending)) = heap.pending_pop() else {
        panic!("pending stack lost its slot");
    };

    assert_eq!(via_env, via_pending);
    assert!(matches!(heap.get(via_env), Value::Pair { .. }));
}

#[test]
fn space_reuse_is_bounded() {
    let mut heap = Heap::new(256);

    for _ in 0..10 {
        let collections_before = heap.stats().collections;
        let mut occupancy_before = heap.occupancy();

        while heap.stats().collections == collections_before {
            occupancy_before = heap.occupancy();
            heap.alloc_number(7);
        }

        // All of that garbage was unreachable, so the pass must not keep
        // any of it, and the reserved memory never grows.
        assert!(heap.occupancy() <= occupancy_before);
        assert_eq!(heap.capacity(), 256);
    }
}

#[test]
fn unreachable_cells_are_reclaimed_exactly() {
    let mut heap = Heap::new(128);

    let one = heap.alloc_number(1);
    let empty = heap.alloc_nil();
    let keep = heap.alloc_pair(one, empty);
    heap.push_root(keep);

    for _ in 0..20 {
        heap.alloc_number(9);
    }

    heap.collect();

    // Live: the global-environment nil, the pair and its two cells.
    let expected = (4 * size_of::<Value>()) as u64;
    assert_eq!(heap.stats().collections, 1);
    assert_eq!(heap.stats().avg_retained_bytes, expected);
}

#[test]
fn deep_tail_nesting_relocates_without_native_recursion() {
    let mut heap = Heap::new(1_100_000);

    let empty = heap.alloc_nil();
    let shared_nil = heap.push_root(empty);
    let chain = heap.push_root(empty);

    for _ in 0..1_000_000 {
        let pair = heap.alloc_pair(heap.root(shared_nil), heap.root(chain));
        heap.set_root(chain, pair);
    }

    assert_eq!(heap.stats().collections, 0);
    heap.collect();

    let mut depth = 0usize;
    let mut rest = heap.root(chain);

    while let Value::Pair { tail, .. } = heap.get(rest) {
        depth += 1;
        rest = tail;
    }

    assert_eq!(depth, 1_000_000);
    assert_eq!(heap.get(rest), Value::Nil);

    // Every head aliases the one shared nil cell.
    let Value::Pair { head, .. } = heap.get(heap.root(chain)) else {
        panic!()
    };
    assert_eq!(head, heap.root(shared_nil));
}

#[test]
fn deep_head_nesting_grows_the_trail_not_the_stack() {
    let mut heap = Heap::new(250_000);

    let empty = heap.alloc_nil();
    let shared_nil = heap.push_root(empty);
    let chain = heap.push_root(empty);

    for _ in 0..100_000 {
        let pair = heap.alloc_pair(heap.root(chain), heap.root(shared_nil));
        heap.set_root(chain, pair);
    }

    heap.collect();

    let mut depth = 0usize;
    let mut rest = heap.root(chain);

    while let Value::Pair { head, .. } = heap.get(rest) {
        depth += 1;
        rest = head;
    }

    assert_eq!(depth, 100_000);
    assert_eq!(heap.get(rest), Value::Nil);
}

#[test]
fn safepoint_collects_above_the_threshold_exactly_once() {
    let mut heap = Heap::new(1000);

    while heap.occupancy() <= 0.60 {
        heap.alloc_number(0);
    }

    heap.safepoint();
    assert_eq!(heap.stats().collections, 0);

    while heap.occupancy() <= Heap::SAFEPOINT_THRESHOLD {
        heap.alloc_number(0);
    }

    heap.safepoint();
    assert_eq!(heap.stats().collections, 1);

    // Nothing was rooted, so occupancy fell back below the threshold and
    // the next safepoint is a no-op.
    heap.safepoint();
    assert_eq!(heap.stats().collections, 1);
}

#[test]
fn exhausted_alloc_rescues_its_arguments() {
    let mut heap = Heap::new(8);

    let head = heap.alloc_number(5);
    let tail = heap.alloc_nil();

    while heap.occupancy() < 1.0 {
        heap.alloc_number(0);
    }

    // The space is full; this allocation collects, and `head`/`tail` are
    // only reachable as the allocation's own arguments.
    let pair = heap.alloc_pair(head, tail);

    assert_eq!(heap.stats().collections, 1);

    let Value::Pair { head, tail } = heap.get(pair) else {
        panic!("pair lost in collection");
    };
    assert_eq!(heap.get(head), Value::Number(5));
    assert_eq!(heap.get(tail), Value::Nil);
}

#[test]
fn cyclic_structures_relocate_as_one_copy() {
    let mut heap = Heap::new(64);

    let empty = heap.alloc_nil();
    let a = heap.alloc_pair(empty, empty);
    let b = heap.alloc_pair(a, empty);

    // Tie the knot: a's tail points back to b.
    heap.overwrite(
        a,
        Value::Pair {
            head: empty,
            tail: b,
        },
    );

    let a_root = heap.push_root(a);
    heap.collect();

    let a = heap.root(a_root);
    let Value::Pair { head, tail: b } = heap.get(a) else {
        panic!()
    };
    let Value::Pair { head: back, tail } = heap.get(b) else {
        panic!()
    };

    assert_eq!(back, a, "the cycle must close on the single new copy");
    assert_eq!(heap.get(head), Value::Nil);
    assert_eq!(heap.get(tail), heap.get(head));

    // Live: global nil, the shared nil, a and b.
    assert_eq!(
        heap.stats().avg_retained_bytes,
        (4 * size_of::<Value>()) as u64
    );
}

#[test]
fn shared_environment_stays_shared_across_collection() {
    let mut heap = Heap::new(4096);
    let mut symbols = SymbolTable::new();

    // ((x . 1)): one environment captured by many closures.
    let empty = heap.alloc_nil();
    let empty_id = heap.push_root(empty);
    let name = heap.alloc_atom(symbols.intern("x"));
    let one = heap.alloc_number(1);
    let binding = heap.alloc_pair(name, one);
    let env = heap.alloc_pair(binding, heap.root(empty_id));
    let env_id = heap.push_root(env);

    let closures: Vec<_> = (0..100)
        .map(|_| {
            let closure =
                heap.alloc_closure(heap.root(empty_id), heap.root(empty_id), heap.root(env_id));
            heap.push_root(closure)
        })
        .collect();

    heap.collect();

    let shared = heap.root(env_id);

    for id in closures {
        let Value::Closure { env, .. } = heap.get(heap.root(id)) else {
            panic!("closure lost in collection");
        };

        assert_eq!(env, shared, "captured environments must stay aliased");
    }
}
