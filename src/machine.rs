#[cfg(test)]
mod test;

use log::trace;

use crate::{
    eval::{good_list, is_truthy, list_length, lookup},
    gc::{Heap, RootId, Value, ValueRef},
    symbol::SymbolTable,
};

/// Continuation points of the explicit-control evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Routine {
    Done,
    EvalDispatch,
    ApplyDispatch,
    EvSelfEval,
    EvVariable,
    EvQuoted,
    EvDefinition,
    EvDefinition1,
    EvIf,
    EvIfDecide,
    EvIfAlternate,
    EvIfConsequent,
    EvLambda,
    EvBegin,
    EvApplication,
    EvalArgs,
    EvalArgLoop,
    AccumulateArg,
    EvalLastArg,
    AccumulateLastArg,
    PrimitiveApply,
    CompoundApply,
    CompoundApplyCont,
    ExtendEnvLoop,
    EvSequence,
    EvSequenceCont,
    EvSequenceLastExp,
}

/// One save-stack entry. A `Value` entry's cell lives in the matching
/// shadow-stack slot, so every saved value is a precise root; routine
/// continuations are plain data and the collector never sees them.
#[derive(Clone, Copy, Debug)]
enum Saved {
    Value,
    Routine(Routine),
}

/// The save stack overflowed; the evaluation is abandoned.
struct Overflow;

struct Registers {
    expr: RootId,
    env: RootId,
    fun: RootId,
    argl: RootId,
    val: RootId,
    unev: RootId,
}

/// The register machine. Registers hold cells in shadow-stack slots, so
/// the whole machine state is rooted at every allocation it performs.
struct Machine<'a> {
    heap: &'a mut Heap,
    symbols: &'a SymbolTable,
    regs: Registers,
    stack: Vec<Saved>,
    pc: Routine,
    cont: Routine,
}

/// Evaluates one top-level form on the register machine. A top-level
/// `(define ...)` leaves its binding in the global environment.
pub fn eval(heap: &mut Heap, symbols: &SymbolTable, expr: ValueRef) -> ValueRef {
    let is_define = matches!(
        heap.get(expr),
        Value::Pair { head, .. }
            if matches!(heap.get(head), Value::Atom(s) if s == symbols.well_known().define)
    );

    let mark = heap.roots_mark();
    let global = heap.global_env();
    let regs = Registers {
        expr: heap.push_root(expr),
        env: heap.push_root(global),
        fun: heap.push_root(expr),
        argl: heap.push_root(expr),
        val: heap.push_root(expr),
        unev: heap.push_root(expr),
    };

    let mut machine = Machine {
        heap: &mut *heap,
        symbols,
        regs,
        stack: Vec::new(),
        pc: Routine::EvalDispatch,
        cont: Routine::Done,
    };
    machine.run();

    debug_assert!(machine.stack.is_empty());
    let (val, env) = (machine.regs.val, machine.regs.env);

    let result = heap.root(val);

    if is_define {
        let extended = heap.root(env);
        heap.set_global_env(extended);
    }

    heap.roots_truncate(mark);
    result
}

impl Machine<'_> {
    const STACK_LIMIT: usize = 128 * 1024;

    fn run(&mut self) {
        loop {
            trace!("pc = {:?}", self.pc);

            let step = match self.pc {
                Routine::Done => return,
                Routine::EvalDispatch => self.eval_dispatch(),
                Routine::ApplyDispatch => self.apply_dispatch(),
                Routine::EvSelfEval => self.ev_self_eval(),
                Routine::EvVariable => self.ev_variable(),
                Routine::EvQuoted => self.ev_quoted(),
                Routine::EvDefinition => self.ev_definition(),
                Routine::EvDefinition1 => self.ev_definition_1(),
                Routine::EvIf => self.ev_if(),
                Routine::EvIfDecide => self.ev_if_decide(),
                Routine::EvIfAlternate => self.ev_if_alternate(),
                Routine::EvIfConsequent => self.ev_if_consequent(),
                Routine::EvLambda => self.ev_lambda(),
                Routine::EvBegin => self.ev_begin(),
                Routine::EvApplication => self.ev_application(),
                Routine::EvalArgs => self.eval_args(),
                Routine::EvalArgLoop => self.eval_arg_loop(),
                Routine::AccumulateArg => self.accumulate_arg(),
                Routine::EvalLastArg => self.eval_last_arg(),
                Routine::AccumulateLastArg => self.accumulate_last_arg(),
                Routine::PrimitiveApply => self.primitive_apply(),
                Routine::CompoundApply => self.compound_apply(),
                Routine::CompoundApplyCont => self.compound_apply_cont(),
                Routine::ExtendEnvLoop => self.extend_env_loop(),
                Routine::EvSequence => self.ev_sequence(),
                Routine::EvSequenceCont => self.ev_sequence_cont(),
                Routine::EvSequenceLastExp => self.ev_sequence_last_exp(),
            };

            if step.is_err() {
                self.bailout();
            }
        }
    }

    // ----- registers -----

    fn expr(&self) -> ValueRef {
        self.heap.root(self.regs.expr)
    }
    fn env(&self) -> ValueRef {
        self.heap.root(self.regs.env)
    }
    fn fun(&self) -> ValueRef {
        self.heap.root(self.regs.fun)
    }
    fn argl(&self) -> ValueRef {
        self.heap.root(self.regs.argl)
    }
    fn val(&self) -> ValueRef {
        self.heap.root(self.regs.val)
    }
    fn unev(&self) -> ValueRef {
        self.heap.root(self.regs.unev)
    }

    fn set_expr(&mut self, value: ValueRef) {
        self.heap.set_root(self.regs.expr, value);
    }
    fn set_env(&mut self, value: ValueRef) {
        self.heap.set_root(self.regs.env, value);
    }
    fn set_fun(&mut self, value: ValueRef) {
        self.heap.set_root(self.regs.fun, value);
    }
    fn set_argl(&mut self, value: ValueRef) {
        self.heap.set_root(self.regs.argl, value);
    }
    fn set_val(&mut self, value: ValueRef) {
        self.heap.set_root(self.regs.val, value);
    }
    fn set_unev(&mut self, value: ValueRef) {
        self.heap.set_root(self.regs.unev, value);
    }

    // ----- save stack -----

    fn save_value(&mut self, value: ValueRef) -> Result<(), Overflow> {
        if self.stack.len() == Self::STACK_LIMIT {
            return Err(Overflow);
        }

        self.stack.push(Saved::Value);
        self.heap.push_root(value);
        Ok(())
    }

    fn save_routine(&mut self, routine: Routine) -> Result<(), Overflow> {
        if self.stack.len() == Self::STACK_LIMIT {
            return Err(Overflow);
        }

        self.stack.push(Saved::Routine(routine));
        Ok(())
    }

    fn restore_value(&mut self) -> ValueRef {
        match self.stack.pop() {
            Some(Saved::Value) => self.heap.pop_root(),
            entry => unreachable!("machine restored a value but found {entry:?}"),
        }
    }

    fn restore_routine(&mut self) -> Routine {
        match self.stack.pop() {
            Some(Saved::Routine(routine)) => routine,
            entry => unreachable!("machine restored a routine but found {entry:?}"),
        }
    }

    /// Abandons the evaluation after a save-stack overflow: unwinds the
    /// stack, reports an error value and halts.
    fn bailout(&mut self) {
        while let Some(entry) = self.stack.pop() {
            if matches!(entry, Saved::Value) {
                self.heap.pop_root();
            }
        }

        let error = self.heap.alloc_error("evaluation stack overflow");
        self.set_val(error);
        self.pc = Routine::Done;
    }

    /// Reports an evaluation error and returns to the continuation.
    fn fail(&mut self, message: &'static str) {
        let error = self.heap.alloc_error(message);
        self.set_val(error);
        self.pc = self.cont;
    }

    // ----- dispatch -----

    fn eval_dispatch(&mut self) -> Result<(), Overflow> {
        let expr = self.expr();
        let wk = self.symbols.well_known();

        match self.heap.get(expr) {
            Value::Nil
            | Value::Boolean(_)
            | Value::Number(_)
            | Value::Character(_)
            | Value::Error(_)
            | Value::Primitive(_)
            | Value::Closure { .. }
            | Value::Macro { .. } => self.pc = Routine::EvSelfEval,
            Value::Atom(_) => self.pc = Routine::EvVariable,
            Value::Pair { head, tail } => {
                let form = match self.heap.get(head) {
                    Value::Atom(symbol) => Some(symbol),
                    _ => None,
                };

                if form == Some(wk.quote) {
                    if !good_list(self.heap, expr) || list_length(self.heap, expr) != 2 {
                        self.fail("wrong number of arguments to special form: quote");
                    } else {
                        self.pc = Routine::EvQuoted;
                    }
                } else if form == Some(wk.set_bang) {
                    self.fail("set! is not supported");
                } else if form == Some(wk.define) {
                    if !good_list(self.heap, expr) || list_length(self.heap, expr) != 3 {
                        self.fail("bad special form: define");
                    } else {
                        self.pc = Routine::EvDefinition;
                    }
                } else if form == Some(wk.if_) {
                    if !good_list(self.heap, expr) || list_length(self.heap, expr) != 4 {
                        self.fail("incorrect syntax for if");
                    } else {
                        self.pc = Routine::EvIf;
                    }
                } else if form == Some(wk.lambda) {
                    if !good_list(self.heap, expr) || list_length(self.heap, expr) < 3 {
                        self.fail("bad special form: lambda");
                    } else {
                        self.pc = Routine::EvLambda;
                    }
                } else if form == Some(wk.begin) {
                    if !good_list(self.heap, expr) || list_length(self.heap, expr) < 2 {
                        self.fail("bad special form: begin");
                    } else {
                        self.pc = Routine::EvBegin;
                    }
                } else if good_list(self.heap, tail) {
                    self.pc = Routine::EvApplication;
                } else {
                    self.fail("unknown expression");
                }
            }
            Value::Forwarded(_) => unreachable!("evaluated a forwarding record"),
        }

        Ok(())
    }

    fn apply_dispatch(&mut self) -> Result<(), Overflow> {
        match self.heap.get(self.fun()) {
            Value::Primitive(_) => self.pc = Routine::PrimitiveApply,
            Value::Closure { .. } => self.pc = Routine::CompoundApply,
            _ => {
                self.cont = self.restore_routine();
                self.fail("cannot apply non-procedure");
            }
        }

        Ok(())
    }

    // ----- simple expressions -----

    fn ev_self_eval(&mut self) -> Result<(), Overflow> {
        let expr = self.expr();
        self.set_val(expr);
        self.pc = self.cont;

        Ok(())
    }

    fn ev_variable(&mut self) -> Result<(), Overflow> {
        let Value::Atom(symbol) = self.heap.get(self.expr()) else {
            unreachable!("dispatched a non-atom to ev_variable");
        };

        match lookup(self.heap, self.env(), symbol) {
            Some(value) => {
                self.set_val(value);
                self.pc = self.cont;
            }
            None => self.fail("variable not found"),
        }

        Ok(())
    }

    fn ev_quoted(&mut self) -> Result<(), Overflow> {
        // (quote <text>)
        let text = self.list_element(self.expr(), 1);
        self.set_val(text);
        self.pc = self.cont;

        Ok(())
    }

    // ----- define -----

    fn ev_definition(&mut self) -> Result<(), Overflow> {
        // (define <name> <expression>)
        let name = self.list_element(self.expr(), 1);

        if !matches!(self.heap.get(name), Value::Atom(_)) {
            self.fail("define: name must be a symbol");
            return Ok(());
        }

        self.set_unev(name);
        self.save_value(self.unev())?;

        let value_expr = self.list_element(self.expr(), 2);
        self.set_expr(value_expr);
        self.save_value(self.env())?;
        self.save_routine(self.cont)?;
        self.cont = Routine::EvDefinition1;
        self.pc = Routine::EvalDispatch;

        Ok(())
    }

    fn ev_definition_1(&mut self) -> Result<(), Overflow> {
        self.cont = self.restore_routine();
        let env = self.restore_value();
        self.set_env(env);
        let name = self.restore_value();
        self.set_unev(name);

        let binding = self.heap.alloc_pair(self.unev(), self.val());
        let extended = self.heap.alloc_pair(binding, self.env());
        self.set_env(extended);
        self.pc = self.cont;

        Ok(())
    }

    // ----- if -----

    fn ev_if(&mut self) -> Result<(), Overflow> {
        // (if <test> <consequent> <alternate>)
        self.save_value(self.expr())?;
        self.save_value(self.env())?;
        self.save_routine(self.cont)?;
        self.cont = Routine::EvIfDecide;

        let test = self.list_element(self.expr(), 1);
        self.set_expr(test);
        self.pc = Routine::EvalDispatch;

        Ok(())
    }

    fn ev_if_decide(&mut self) -> Result<(), Overflow> {
        self.cont = self.restore_routine();
        let env = self.restore_value();
        self.set_env(env);
        let expr = self.restore_value();
        self.set_expr(expr);

        self.pc = if is_truthy(self.heap.get(self.val())) {
            Routine::EvIfConsequent
        } else {
            Routine::EvIfAlternate
        };

        Ok(())
    }

    fn ev_if_alternate(&mut self) -> Result<(), Overflow> {
        let alternate = self.list_element(self.expr(), 3);
        self.set_expr(alternate);
        self.pc = Routine::EvalDispatch;

        Ok(())
    }

    fn ev_if_consequent(&mut self) -> Result<(), Overflow> {
        let consequent = self.list_element(self.expr(), 2);
        self.set_expr(consequent);
        self.pc = Routine::EvalDispatch;

        Ok(())
    }

    // ----- lambda -----

    fn ev_lambda(&mut self) -> Result<(), Overflow> {
        // (lambda (params ...) body ...)
        let params = self.list_element(self.expr(), 1);
        self.set_unev(params);

        let Value::Pair { tail, .. } = self.heap.get(self.expr()) else {
            unreachable!()
        };
        let Value::Pair { tail: body, .. } = self.heap.get(tail) else {
            unreachable!()
        };
        self.set_expr(body);

        if !good_list(self.heap, self.unev()) {
            self.fail("lambda params must be a list");
        } else {
            let closure = self.heap.alloc_closure(self.unev(), self.expr(), self.env());
            self.set_val(closure);
            self.pc = self.cont;
        }

        Ok(())
    }

    // ----- application -----

    fn ev_application(&mut self) -> Result<(), Overflow> {
        let Value::Pair { head, tail } = self.heap.get(self.expr()) else {
            unreachable!()
        };

        self.set_unev(tail);
        self.set_expr(head);
        self.save_routine(self.cont)?;
        self.save_value(self.env())?;
        self.save_value(self.unev())?;
        self.cont = Routine::EvalArgs;
        self.pc = Routine::EvalDispatch;

        Ok(())
    }

    fn eval_args(&mut self) -> Result<(), Overflow> {
        let unev = self.restore_value();
        self.set_unev(unev);
        let env = self.restore_value();
        self.set_env(env);

        let fun = self.val();
        self.set_fun(fun);

        if matches!(self.heap.get(self.unev()), Value::Nil) {
            // No operands; the saved continuation stays for the apply
            // routines to restore.
            let empty = self.heap.alloc_nil();
            self.set_argl(empty);
            self.pc = Routine::ApplyDispatch;
        } else {
            self.save_value(self.fun())?;
            let empty = self.heap.alloc_nil();
            self.set_argl(empty);
            self.pc = Routine::EvalArgLoop;
        }

        Ok(())
    }

    fn eval_arg_loop(&mut self) -> Result<(), Overflow> {
        self.save_value(self.argl())?;

        let Value::Pair { head, .. } = self.heap.get(self.unev()) else {
            unreachable!("operand list shape was checked at dispatch");
        };
        self.set_expr(head);

        if self.is_last_operand(self.unev()) {
            self.pc = Routine::EvalLastArg;
        } else {
            self.save_value(self.env())?;
            self.save_value(self.unev())?;
            self.cont = Routine::AccumulateArg;
            self.pc = Routine::EvalDispatch;
        }

        Ok(())
    }

    fn accumulate_arg(&mut self) -> Result<(), Overflow> {
        let unev = self.restore_value();
        self.set_unev(unev);
        let env = self.restore_value();
        self.set_env(env);
        let argl = self.restore_value();
        self.set_argl(argl);

        let extended = self.heap.alloc_pair(self.val(), self.argl());
        self.set_argl(extended);

        let Value::Pair { tail, .. } = self.heap.get(self.unev()) else {
            unreachable!()
        };
        self.set_unev(tail);
        self.pc = Routine::EvalArgLoop;

        Ok(())
    }

    fn eval_last_arg(&mut self) -> Result<(), Overflow> {
        self.cont = Routine::AccumulateLastArg;
        self.pc = Routine::EvalDispatch;

        Ok(())
    }

    fn accumulate_last_arg(&mut self) -> Result<(), Overflow> {
        let argl = self.restore_value();
        self.set_argl(argl);

        let extended = self.heap.alloc_pair(self.val(), self.argl());

        // The accumulation conses each evaluated operand onto the front,
        // so the finished list is reversed; put it back in call order
        // before anything observes it.
        let ordered = self.reverse_list(extended);
        self.set_argl(ordered);

        let fun = self.restore_value();
        self.set_fun(fun);
        self.pc = Routine::ApplyDispatch;

        Ok(())
    }

    fn primitive_apply(&mut self) -> Result<(), Overflow> {
        let Value::Primitive(def) = self.heap.get(self.fun()) else {
            unreachable!("apply_dispatch checked the tag");
        };

        let result = (def.run)(self.heap, self.argl());
        self.set_val(result);
        self.cont = self.restore_routine();
        self.pc = self.cont;

        Ok(())
    }

    fn compound_apply(&mut self) -> Result<(), Overflow> {
        let Value::Closure { params, env, .. } = self.heap.get(self.fun()) else {
            unreachable!("apply_dispatch checked the tag");
        };

        self.set_unev(params);
        self.set_env(env);
        self.pc = Routine::ExtendEnvLoop;

        Ok(())
    }

    fn extend_env_loop(&mut self) -> Result<(), Overflow> {
        match (self.heap.get(self.unev()), self.heap.get(self.argl())) {
            (Value::Nil, Value::Nil) => self.pc = Routine::CompoundApplyCont,
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
                self.set_unev(rest_params);
                self.set_argl(rest_args);

                let binding = self.heap.alloc_pair(param, arg);
                let extended = self.heap.alloc_pair(binding, self.env());
                self.set_env(extended);
            }
            _ => {
                self.cont = self.restore_routine();
                self.fail("incorrect number of arguments");
            }
        }

        Ok(())
    }

    fn compound_apply_cont(&mut self) -> Result<(), Overflow> {
        let Value::Closure { body, .. } = self.heap.get(self.fun()) else {
            unreachable!("apply_dispatch checked the tag");
        };

        self.set_unev(body);
        self.pc = Routine::EvSequence;

        Ok(())
    }

    // ----- sequences -----

    fn ev_begin(&mut self) -> Result<(), Overflow> {
        // (begin <action> ...)
        let Value::Pair { tail, .. } = self.heap.get(self.expr()) else {
            unreachable!()
        };

        self.set_unev(tail);
        self.save_routine(self.cont)?;
        self.pc = Routine::EvSequence;

        Ok(())
    }

    fn ev_sequence(&mut self) -> Result<(), Overflow> {
        let Value::Pair { head, .. } = self.heap.get(self.unev()) else {
            unreachable!("sequences are non-empty by construction");
        };
        self.set_expr(head);

        if self.is_last_operand(self.unev()) {
            self.pc = Routine::EvSequenceLastExp;
        } else {
            self.save_value(self.unev())?;
            self.save_value(self.env())?;
            self.cont = Routine::EvSequenceCont;
            self.pc = Routine::EvalDispatch;
        }

        Ok(())
    }

    fn ev_sequence_cont(&mut self) -> Result<(), Overflow> {
        let env = self.restore_value();
        self.set_env(env);
        let unev = self.restore_value();
        self.set_unev(unev);

        let Value::Pair { tail, .. } = self.heap.get(self.unev()) else {
            unreachable!()
        };
        self.set_unev(tail);
        self.pc = Routine::EvSequence;

        Ok(())
    }

    fn ev_sequence_last_exp(&mut self) -> Result<(), Overflow> {
        self.cont = self.restore_routine();
        self.pc = Routine::EvalDispatch;

        Ok(())
    }

    // ----- helpers -----

    fn is_last_operand(&self, list: ValueRef) -> bool {
        matches!(
            self.heap.get(list),
            Value::Pair { tail, .. } if matches!(self.heap.get(tail), Value::Nil)
        )
    }

    /// Element `n` of a proper list whose shape dispatch already checked.
    fn list_element(&self, mut list: ValueRef, n: usize) -> ValueRef {
        for _ in 0..n {
            let Value::Pair { tail, .. } = self.heap.get(list) else {
                unreachable!("shape was validated at dispatch");
            };

            list = tail;
        }

        let Value::Pair { head, .. } = self.heap.get(list) else {
            unreachable!("shape was validated at dispatch");
        };

        head
    }

    /// Reverses a proper list, keeping the cursor and the accumulator
    /// rooted across each allocation.
    fn reverse_list(&mut self, list: ValueRef) -> ValueRef {
        let mark = self.heap.roots_mark();
        let cursor = self.heap.push_root(list);

        let empty = self.heap.alloc_nil();
        let acc = self.heap.push_root(empty);

        loop {
            match self.heap.get(self.heap.root(cursor)) {
                Value::Pair { head, tail } => {
                    self.heap.set_root(cursor, tail);

                    let extended = self.heap.alloc_pair(head, self.heap.root(acc));
                    self.heap.set_root(acc, extended);
                }
                Value::Nil => break,
                _ => unreachable!("argument lists are proper by construction"),
            }
        }

        let reversed = self.heap.root(acc);
        self.heap.roots_truncate(mark);

        reversed
    }
}
