use itertools::Itertools;

use crate::{
    gc::{Heap, Value, ValueRef},
    symbol::SymbolTable,
};

/// Renders `value` in external syntax: proper lists as `(a b c)`, improper
/// tails as `(a . b)`, procedures and errors as unreadable `#<...>` forms.
pub fn to_string(heap: &Heap, symbols: &SymbolTable, value: ValueRef) -> String {
    match heap.get(value) {
        Value::Nil => "()".to_owned(),
        Value::Boolean(true) => "#t".to_owned(),
        Value::Boolean(false) => "#f".to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Character(c) => format!("#\\{c}"),
        Value::Atom(symbol) => symbols.resolve(symbol).to_owned(),
        Value::Error(message) => format!("#<error: {message}>"),
        Value::Primitive(def) => format!("#<primitive {}>", def.name),
        Value::Closure { .. } => "#<closure>".to_owned(),
        Value::Macro { .. } => "#<macro>".to_owned(),
        Value::Pair { head, tail } => {
            let mut elements = vec![to_string(heap, symbols, head)];
            let mut rest = tail;

            loop {
                match heap.get(rest) {
                    Value::Pair { head, tail } => {
                        elements.push(to_string(heap, symbols, head));
                        rest = tail;
                    }
                    Value::Nil => break,
                    _ => {
                        // Improper list; render the dotted tail.
                        let tail = to_string(heap, symbols, rest);
                        return format!("({} . {tail})", elements.iter().join(" "));
                    }
                }
            }

            format!("({})", elements.iter().join(" "))
        }
        Value::Forwarded(_) => unreachable!("printed a forwarding record"),
    }
}
