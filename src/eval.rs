mod primitives;


use crate::{
    gc::{Heap, Value, ValueRef},
    symbol::{Symbol, SymbolTable},
};

pub use primitives::install as install_primitives;

// Rooting discipline, used throughout this module and the machine: every
// function parks the references it holds across an allocating call in
// shadow-stack slots, and re-reads them through the slot afterwards.
// References merely *passed onward* need no slot: `Heap::alloc` rescues the
// fields of the value being allocated, and `eval` roots its own arguments
// before its first possible collection point.

/// Evaluates `expr` in `env`, an association list of `(name . value)`
/// pairs. Evaluation failures yield `Error` cells, not panics.
pub fn eval(heap: &mut Heap, symbols: &SymbolTable, expr: ValueRef, env: ValueRef) -> ValueRef {
    match heap.get(expr) {
        // Self-evaluating.
        Value::Nil
        | Value::Boolean(_)
        | Value::Number(_)
        | Value::Character(_)
        | Value::Error(_)
        | Value::Primitive(_)
        | Value::Closure { .. }
        | Value::Macro { .. } => expr,
        Value::Atom(symbol) => match lookup(heap, env, symbol) {
            Some(value) => value,
            None => heap.alloc_error("variable not found"),
        },
        Value::Pair { head, tail } => eval_combination(heap, symbols, expr, head, tail, env),
        Value::Forwarded(_) => unreachable!("evaluated a forwarding record"),
    }
}

/// Evaluates a `(head . tail)` form: a special form when `head` is one of
/// the well-known atoms, an application otherwise.
fn eval_combination(
    heap: &mut Heap,
    symbols: &SymbolTable,
    expr: ValueRef,
    head: ValueRef,
    tail: ValueRef,
    env: ValueRef,
) -> ValueRef {
    if let Value::Atom(symbol) = heap.get(head) {
        let wk = symbols.well_known();

        if symbol == wk.quote {
            return eval_quote(heap, tail);
        } else if symbol == wk.lambda {
            return eval_lambda(heap, tail, env, Constructor::Closure);
        } else if symbol == wk.macro_ {
            return eval_lambda(heap, tail, env, Constructor::Macro);
        } else if symbol == wk.if_ {
            return eval_if(heap, symbols, expr, env);
        } else if symbol == wk.begin {
            return eval_sequence(heap, symbols, tail, env);
        } else if symbol == wk.define {
            return heap.alloc_error("define is only allowed at top level");
        } else if symbol == wk.set_bang {
            return heap.alloc_error("set! is not supported");
        }
    }

    let mark = heap.roots_mark();
    let expr_id = heap.push_root(expr);
    let env_id = heap.push_root(env);

    let operator = eval(heap, symbols, head, env);
    let operator_id = heap.push_root(operator);

    let operands = match heap.get(heap.root(expr_id)) {
        Value::Pair { tail, .. } => tail,
        _ => unreachable!(),
    };

    let result = if let Value::Macro { .. } = heap.get(operator) {
        // Macros receive their operands unevaluated; the expansion is then
        // evaluated in the caller's environment.
        let expansion = apply(heap, symbols, heap.root(operator_id), operands);
        let expansion_id = heap.push_root(expansion);

        eval(heap, symbols, heap.root(expansion_id), heap.root(env_id))
    } else {
        let args = eval_list(heap, symbols, operands, heap.root(env_id));

        apply(heap, symbols, heap.root(operator_id), args)
    };

    heap.roots_truncate(mark);
    result
}

/// Applies a procedure to an already-evaluated argument list (for macros:
/// to the unevaluated operand list).
pub fn apply(heap: &mut Heap, symbols: &SymbolTable, procedure: ValueRef, args: ValueRef) -> ValueRef {
    let (params, body, captured) = match heap.get(procedure) {
        Value::Primitive(def) => return (def.run)(heap, args),
        Value::Closure { params, body, env } | Value::Macro { params, body, env } => {
            (params, body, env)
        }
        _ => return heap.alloc_error("cannot apply non-procedure"),
    };

    let mark = heap.roots_mark();
    let params_id = heap.push_root(params);
    let args_id = heap.push_root(args);
    let env_id = heap.push_root(captured);
    let body_id = heap.push_root(body);

    // Bind parameters to arguments, extending the captured environment.
    loop {
        match (heap.get(heap.root(params_id)), heap.get(heap.root(args_id))) {
            (Value::Nil, Value::Nil) => break,
            (
                Value::Pair {
                    head: param,
                    tail: rest_params,
                },
                Value::Pair {
                    head: arg,
                    tail: rest_args,
                },
            ) => {
                heap.set_root(params_id, rest_params);
                heap.set_root(args_id, rest_args);

                let binding = heap.alloc_pair(param, arg);
                let extended = heap.alloc_pair(binding, heap.root(env_id));
                heap.set_root(env_id, extended);
            }
            _ => {
                heap.roots_truncate(mark);
                return heap.alloc_error("incorrect number of arguments");
            }
        }
    }

    let result = eval_sequence(heap, symbols, heap.root(body_id), heap.root(env_id));

    heap.roots_truncate(mark);
    result
}

/// Evaluates every element of `list`, returning the list of results.
fn eval_list(heap: &mut Heap, symbols: &SymbolTable, list: ValueRef, env: ValueRef) -> ValueRef {
    match heap.get(list) {
        Value::Nil => list,
        Value::Pair { head, tail } => {
            let mark = heap.roots_mark();
            let tail_id = heap.push_root(tail);
            let env_id = heap.push_root(env);

            let value = eval(heap, symbols, head, env);
            let value_id = heap.push_root(value);

            let rest = eval_list(heap, symbols, heap.root(tail_id), heap.root(env_id));
            let pair = heap.alloc_pair(heap.root(value_id), rest);

            heap.roots_truncate(mark);
            pair
        }
        _ => heap.alloc_error("bad argument list"),
    }
}

/// Evaluates the expressions of `body` in order and returns the last
/// result.
fn eval_sequence(heap: &mut Heap, symbols: &SymbolTable, body: ValueRef, env: ValueRef) -> ValueRef {
    if let Value::Nil = heap.get(body) {
        return heap.alloc_error("empty body");
    }

    let mark = heap.roots_mark();
    let body_id = heap.push_root(body);
    let env_id = heap.push_root(env);

    let result = loop {
        match heap.get(heap.root(body_id)) {
            Value::Pair { head, tail } => {
                if let Value::Nil = heap.get(tail) {
                    break eval(heap, symbols, head, heap.root(env_id));
                }

                heap.set_root(body_id, tail);
                eval(heap, symbols, head, heap.root(env_id));
            }
            _ => break heap.alloc_error("bad body list"),
        }
    };

    heap.roots_truncate(mark);
    result
}

fn eval_quote(heap: &mut Heap, tail: ValueRef) -> ValueRef {
    match heap.get(tail) {
        Value::Pair { head, tail } if matches!(heap.get(tail), Value::Nil) => head,
        _ => heap.alloc_error("wrong number of arguments to special form: quote"),
    }
}

enum Constructor {
    Closure,
    Macro,
}

/// `(lambda (params ...) body ...)`, and the same shape for `macro`.
fn eval_lambda(heap: &mut Heap, tail: ValueRef, env: ValueRef, kind: Constructor) -> ValueRef {
    let Value::Pair { head: params, tail: body } = heap.get(tail) else {
        return heap.alloc_error("bad special form: lambda");
    };

    if !good_list(heap, params) || !params_are_atoms(heap, params) {
        return heap.alloc_error("lambda params must be a list of symbols");
    }

    if !good_list(heap, body) || matches!(heap.get(body), Value::Nil) {
        return heap.alloc_error("bad special form: lambda");
    }

    match kind {
        Constructor::Closure => heap.alloc_closure(params, body, env),
        Constructor::Macro => heap.alloc_macro(params, body, env),
    }
}

/// `(if test consequent alternate)`.
fn eval_if(heap: &mut Heap, symbols: &SymbolTable, expr: ValueRef, env: ValueRef) -> ValueRef {
    if !good_list(heap, expr) || list_length(heap, expr) != 4 {
        return heap.alloc_error("incorrect syntax for if");
    }

    let mark = heap.roots_mark();
    let expr_id = heap.push_root(expr);
    let env_id = heap.push_root(env);

    let test = nth_tail_head(heap, expr, 1);
    let condition = eval(heap, symbols, test, env);

    let branch_index = if is_truthy(heap.get(condition)) { 2 } else { 3 };
    let branch = nth_tail_head(heap, heap.root(expr_id), branch_index);

    let result = eval(heap, symbols, branch, heap.root(env_id));

    heap.roots_truncate(mark);
    result
}

/// Evaluates one top-level form, extending the global environment for
/// `(define name expr)` the way the startup code installs primitives.
pub fn eval_toplevel(heap: &mut Heap, symbols: &SymbolTable, expr: ValueRef) -> ValueRef {
    if let Value::Pair { head, tail } = heap.get(expr) {
        if matches!(heap.get(head), Value::Atom(s) if s == symbols.well_known().define) {
            return eval_define(heap, symbols, tail);
        }
    }

    eval(heap, symbols, expr, heap.global_env())
}

/// `(define name expr)` at the top level.
fn eval_define(heap: &mut Heap, symbols: &SymbolTable, tail: ValueRef) -> ValueRef {
    let shape = (|| {
        let Value::Pair { head: name, tail } = heap.get(tail) else {
            return None;
        };
        let Value::Atom(_) = heap.get(name) else {
            return None;
        };
        let Value::Pair { head: value_expr, tail } = heap.get(tail) else {
            return None;
        };
        let Value::Nil = heap.get(tail) else {
            return None;
        };

        Some((name, value_expr))
    })();

    let Some((name, value_expr)) = shape else {
        return heap.alloc_error("bad special form: define");
    };

    let mark = heap.roots_mark();
    let name_id = heap.push_root(name);

    let value = eval(heap, symbols, value_expr, heap.global_env());
    let value_id = heap.push_root(value);

    let binding = heap.alloc_pair(heap.root(name_id), heap.root(value_id));
    let extended = heap.alloc_pair(binding, heap.global_env());
    heap.set_global_env(extended);

    let value = heap.root(value_id);
    heap.roots_truncate(mark);
    value
}

/// Finds `symbol` in an association-list environment.
pub(crate) fn lookup(heap: &Heap, env: ValueRef, symbol: Symbol) -> Option<ValueRef> {
    let mut entry = env;

    loop {
        let Value::Pair { head: binding, tail } = heap.get(entry) else {
            return None;
        };

        if let Value::Pair { head: name, tail: value } = heap.get(binding) {
            if matches!(heap.get(name), Value::Atom(s) if s == symbol) {
                return Some(value);
            }
        }

        entry = tail;
    }
}

/// Everything is truthy except `#f`.
pub(crate) fn is_truthy(value: Value) -> bool {
    !matches!(value, Value::Boolean(false))
}

/// Whether `list` is a proper (`Nil`-terminated) chain of pairs.
pub(crate) fn good_list(heap: &Heap, mut list: ValueRef) -> bool {
    loop {
        match heap.get(list) {
            Value::Nil => return true,
            Value::Pair { tail, .. } => list = tail,
            _ => return false,
        }
    }
}

/// Length of a proper list.
pub(crate) fn list_length(heap: &Heap, mut list: ValueRef) -> usize {
    let mut length = 0;

    while let Value::Pair { tail, .. } = heap.get(list) {
        length += 1;
        list = tail;
    }

    length
}

fn params_are_atoms(heap: &Heap, mut params: ValueRef) -> bool {
    while let Value::Pair { head, tail } = heap.get(params) {
        if !matches!(heap.get(head), Value::Atom(_)) {
            return false;
        }

        params = tail;
    }

    true
}

/// The head after skipping `n` tails: element `n` of a proper list.
fn nth_tail_head(heap: &Heap, mut list: ValueRef, n: usize) -> ValueRef {
    for _ in 0..n {
        let Value::Pair { tail, .. } = heap.get(list) else {
            unreachable!("shape was validated before indexing");
        };

        list = tail;
    }

    let Value::Pair { head, .. } = heap.get(list) else {
        unreachable!("shape was validated before indexing");
    };

    head
}
