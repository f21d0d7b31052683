use std::fmt::{self, Debug, Formatter};
use std::ptr;

use crate::symbol::Symbol;

use super::Heap;

/// Reference to one cell of the currently active space.
///
/// A `ValueRef` held by mutator code stays valid across a collection only if
/// it is reachable from one of the root sources at the moment the collection
/// runs; the collector patches every rooted reference in place.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRef(u32);

impl ValueRef {
    pub(super) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("heap capacity exceeds the reference range"))
    }

    pub(super) fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for ValueRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ValueRef({})", self.0)
    }
}

/// The signature of a native primitive procedure: receives the evaluated
/// argument list (a proper list of cells) and returns the result cell.
pub type PrimitiveFn = fn(&mut Heap, ValueRef) -> ValueRef;

/// Descriptor of a native primitive. Lives in static storage, never in the
/// managed heap, and is therefore never relocated.
pub struct PrimitiveDef {
    pub name: &'static str,
    pub run: PrimitiveFn,
}

impl Debug for PrimitiveDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PrimitiveDef({})", self.name)
    }
}

impl PartialEq for PrimitiveDef {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }
}

impl Eq for PrimitiveDef {}

/// One heap cell: a fixed-footprint `Copy` variant.
///
/// Reference fields (`ValueRef`) always index the active space. `Atom`,
/// `Error` and `Primitive` payloads point outside the managed heap and are
/// copied verbatim by the collector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(i64),
    Character(char),
    Atom(Symbol),
    Error(&'static str),
    Primitive(&'static PrimitiveDef),
    Pair {
        head: ValueRef,
        tail: ValueRef,
    },
    Closure {
        params: ValueRef,
        body: ValueRef,
        env: ValueRef,
    },
    /// Same shape as `Closure`; applied to unevaluated operands.
    Macro {
        params: ValueRef,
        body: ValueRef,
        env: ValueRef,
    },
    /// Reserved for the collector: this cell has been evacuated and the
    /// payload records its destination in the target space. Mutator code
    /// never observes this variant.
    Forwarded(ValueRef),
}
