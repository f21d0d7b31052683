use crate::{
    gc::{Heap, PrimitiveDef, Value, ValueRef},
    symbol::SymbolTable,
};

use super::list_length;

/// The native procedures every session starts with.
pub static PRIMITIVES: &[PrimitiveDef] = &[
    PrimitiveDef { name: "+", run: add },
    PrimitiveDef { name: "*", run: multiply },
    PrimitiveDef { name: "cons", run: cons },
    PrimitiveDef { name: "car", run: car },
    PrimitiveDef { name: "cdr", run: cdr },
    PrimitiveDef { name: "symbol?", run: is_symbol },
    PrimitiveDef { name: "number?", run: is_number },
];

/// Installs the primitives into the global environment, one
/// `(name . primitive)` binding per entry.
pub fn install(heap: &mut Heap, symbols: &mut SymbolTable) {
    for def in PRIMITIVES {
        let mark = heap.roots_mark();

        let name = heap.alloc_atom(symbols.intern(def.name));
        let name_id = heap.push_root(name);

        let primitive = heap.alloc(Value::Primitive(def));
        let binding = heap.alloc_pair(heap.root(name_id), primitive);
        let extended = heap.alloc_pair(binding, heap.global_env());
        heap.set_global_env(extended);

        heap.roots_truncate(mark);
    }
}

fn add(heap: &mut Heap, args: ValueRef) -> ValueRef {
    let mut sum = 0i64;
    let mut rest = args;

    while let Value::Pair { head, tail } = heap.get(rest) {
        let Value::Number(n) = heap.get(head) else {
            return heap.alloc_error("+: expected numbers");
        };

        sum = sum.wrapping_add(n);
        rest = tail;
    }

    heap.alloc_number(sum)
}

fn multiply(heap: &mut Heap, args: ValueRef) -> ValueRef {
    let mut product = 1i64;
    let mut rest = args;

    while let Value::Pair { head, tail } = heap.get(rest) {
        let Value::Number(n) = heap.get(head) else {
            return heap.alloc_error("*: expected numbers");
        };

        product = product.wrapping_mul(n);
        rest = tail;
    }

    heap.alloc_number(product)
}

fn cons(heap: &mut Heap, args: ValueRef) -> ValueRef {
    if list_length(heap, args) != 2 {
        return heap.alloc_error("cons: expected 2 args");
    }

    let Value::Pair { head, tail } = heap.get(args) else {
        unreachable!()
    };
    let Value::Pair { head: second, .. } = heap.get(tail) else {
        unreachable!()
    };

    heap.alloc_pair(head, second)
}

fn car(heap: &mut Heap, args: ValueRef) -> ValueRef {
    if list_length(heap, args) != 1 {
        return heap.alloc_error("car: expected 1 arg");
    }

    let Value::Pair { head: arg, .. } = heap.get(args) else {
        unreachable!()
    };

    match heap.get(arg) {
        Value::Pair { head, .. } => head,
        _ => heap.alloc_error("car: invalid type, expected pair"),
    }
}

fn cdr(heap: &mut Heap, args: ValueRef) -> ValueRef {
    if list_length(heap, args) != 1 {
        return heap.alloc_error("cdr: expected 1 arg");
    }

    let Value::Pair { head: arg, .. } = heap.get(args) else {
        unreachable!()
    };

    match heap.get(arg) {
        Value::Pair { tail, .. } => tail,
        _ => heap.alloc_error("cdr: invalid type, expected pair"),
    }
}

fn is_symbol(heap: &mut Heap, args: ValueRef) -> ValueRef {
    if list_length(heap, args) != 1 {
        return heap.alloc_error("symbol?: expected 1 arg");
    }

    let Value::Pair { head: arg, .. } = heap.get(args) else {
        unreachable!()
    };

    let result = matches!(heap.get(arg), Value::Atom(_));
    heap.alloc_boolean(result)
}

fn is_number(heap: &mut Heap, args: ValueRef) -> ValueRef {
    if list_length(heap, args) != 1 {
        return heap.alloc_error("number?: expected 1 arg");
    }

    let Value::Pair { head: arg, .. } = heap.get(args) else {
        unreachable!()
    };

    let result = matches!(heap.get(arg), Value::Number(_));
    heap.alloc_boolean(result)
}
