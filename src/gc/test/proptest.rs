use proptest::prelude::*;

use crate::gc::{Heap, Value, ValueRef};

/// Host-side model of a heap structure, compared against the real thing
/// after collection.
#[derive(Clone, Debug)]
enum Shape {
    Nil,
    Number(i64),
    Boolean(bool),
    Character(char),
    Pair(Box<Shape>, Box<Shape>),
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        Just(Shape::Nil),
        any::<i64>().prop_map(Shape::Number),
        any::<bool>().prop_map(Shape::Boolean),
        any::<char>().prop_map(Shape::Character),
    ];

    leaf.prop_recursive(8, 128, 2, |inner| {
        (inner.clone(), inner).prop_map(|(head, tail)| Shape::Pair(Box::new(head), Box::new(tail)))
    })
}

fn build(heap: &mut Heap, shape: &Shape) -> ValueRef {
    match shape {
        Shape::Nil => heap.alloc_nil(),
        Shape::Number(n) => heap.alloc_number(*n),
        Shape::Boolean(b) => heap.alloc_boolean(*b),
        Shape::Character(c) => heap.alloc_character(*c),
        Shape::Pair(head, tail) => {
            let mark = heap.roots_mark();

            let head = build(heap, head);
            let head_id = heap.push_root(head);
            let tail = build(heap, tail);
            let pair = heap.alloc_pair(heap.root(head_id), tail);

            heap.roots_truncate(mark);
            pair
        }
    }
}

fn check(heap: &Heap, cell: ValueRef, shape: &Shape) {
    match shape {
        Shape::Nil => assert_eq!(heap.get(cell), Value::Nil),
        Shape::Number(n) => assert_eq!(heap.get(cell), Value::Number(*n)),
        Shape::Boolean(b) => assert_eq!(heap.get(cell), Value::Boolean(*b)),
        Shape::Character(c) => assert_eq!(heap.get(cell), Value::Character(*c)),
        Shape::Pair(expected_head, expected_tail) => {
            let Value::Pair { head, tail } = heap.get(cell) else {
                panic!("expected a pair, found {:?}", heap.get(cell));
            };

            check(heap, head, expected_head);
            check(heap, tail, expected_tail);
        }
    }
}

proptest! {
    #[test]
    fn collection_preserves_structure(shape in arb_shape()) {
        let mut heap = Heap::new(1 << 15);

        let built = build(&mut heap, &shape);
        let root = heap.push_root(built);

        for _ in 0..3 {
            heap.alloc_number(0);
            heap.collect();
        }

        check(&heap, heap.root(root), &shape);
    }
}
