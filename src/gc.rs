mod collect;
mod roots;
mod space;
mod stats;
mod value;

#[cfg(test)]
mod test;

use log::{debug, error};

use crate::symbol::Symbol;

use roots::{PendingStack, RootSet, ShadowStack};
use space::Space;
use stats::Counters;

pub use roots::{Pending, PendingOverflow, RootId, RootMark};
pub use stats::HeapStats;
pub use value::{PrimitiveDef, PrimitiveFn, Value, ValueRef};

/// The managed heap: two equal-capacity semi-spaces, the root bridge and
/// the copying collector's bookkeeping.
///
/// Single-threaded by construction. Allocation bumps the active space;
/// when it runs out, a synchronous collection relocates everything
/// reachable from the roots into the other space and the two swap roles.
/// Mutator code must keep any reference it holds across an [`alloc`]
/// or [`safepoint`] call reachable from a root source (the global
/// environment, the pending-value stack or a shadow-stack slot), or the
/// reference is silently invalidated by the next collection.
///
/// [`alloc`]: Heap::alloc
/// [`safepoint`]: Heap::safepoint
pub struct Heap {
    active: Space,
    retired: Space,
    roots: RootSet,
    trail: Vec<collect::Site>,
    counters: Counters,
}

impl Heap {
    /// Occupancy fraction above which a safepoint collects proactively.
    pub const SAFEPOINT_THRESHOLD: f64 = 0.70;

    /// Capacity of the reader's pending-value stack.
    const PENDING_CAPACITY: usize = 1024;

    /// Builds a heap whose spaces hold `capacity` cells each. The global
    /// environment root starts out as the empty list.
    pub fn new(capacity: usize) -> Self {
        let mut active = Space::with_capacity(capacity);
        let global_env = active
            .bump(Value::Nil)
            .expect("a fresh space accepts at least one cell");

        Self {
            active,
            retired: Space::with_capacity(capacity),
            roots: RootSet {
                global_env,
                pending: PendingStack::new(Self::PENDING_CAPACITY),
                shadow: ShadowStack::new(),
            },
            trail: Vec::new(),
            counters: Counters::default(),
        }
    }

    // ----- allocation -----

    /// Stores `value` in a fresh cell of the active space. On exhaustion,
    /// collects once and retries; a second failure is fatal.
    ///
    /// The reference fields of `value` itself are rooted for the duration
    /// of a forced collection, so constructions like
    /// `heap.alloc_pair(head, tail)` stay safe at the exhaustion boundary
    /// even when `head` and `tail` are not otherwise rooted.
    pub fn alloc(&mut self, value: Value) -> ValueRef {
        self.counters.allocated_bytes += size_of::<Value>() as u64;

        if let Some(cell) = self.active.bump(value) {
            return cell;
        }

        let value = self.collect_rescuing(value);

        match self.active.bump(value) {
            Some(cell) => cell,
            None => self.oom(),
        }
    }

    pub fn alloc_nil(&mut self) -> ValueRef {
        self.alloc(Value::Nil)
    }

    pub fn alloc_boolean(&mut self, value: bool) -> ValueRef {
        self.alloc(Value::Boolean(value))
    }

    pub fn alloc_number(&mut self, value: i64) -> ValueRef {
        self.alloc(Value::Number(value))
    }

    pub fn alloc_character(&mut self, value: char) -> ValueRef {
        self.alloc(Value::Character(value))
    }

    pub fn alloc_atom(&mut self, symbol: Symbol) -> ValueRef {
        self.alloc(Value::Atom(symbol))
    }

    pub fn alloc_error(&mut self, message: &'static str) -> ValueRef {
        self.alloc(Value::Error(message))
    }

    pub fn alloc_pair(&mut self, head: ValueRef, tail: ValueRef) -> ValueRef {
        self.alloc(Value::Pair { head, tail })
    }

    pub fn alloc_closure(&mut self, params: ValueRef, body: ValueRef, env: ValueRef) -> ValueRef {
        self.alloc(Value::Closure { params, body, env })
    }

    pub fn alloc_macro(&mut self, params: ValueRef, body: ValueRef, env: ValueRef) -> ValueRef {
        self.alloc(Value::Macro { params, body, env })
    }

    /// Reads the cell behind `reference`.
    pub fn get(&self, reference: ValueRef) -> Value {
        let value = self.active.get(reference);
        debug_assert!(
            !matches!(value, Value::Forwarded(_)),
            "mutator read a forwarding record at {reference:?}"
        );

        value
    }

    // ----- safepoint controller -----

    /// Voluntary collection checkpoint. Callers guarantee that no
    /// unrooted partially-constructed value exists. Collects now if
    /// occupancy exceeds [`Self::SAFEPOINT_THRESHOLD`], bounding latency
    /// instead of waiting for exhaustion.
    pub fn safepoint(&mut self) {
        let occupancy = self.occupancy();
        debug!("{occupancy:.2} heap used");

        if occupancy > Self::SAFEPOINT_THRESHOLD {
            self.collect();
        }
    }

    // ----- diagnostics -----

    pub fn occupancy(&self) -> f64 {
        self.active.len() as f64 / self.active.capacity() as f64
    }

    /// Cells per space; constant for the lifetime of the heap.
    pub fn capacity(&self) -> usize {
        self.active.capacity()
    }

    pub fn stats(&self) -> HeapStats {
        let avg_retained_bytes = self
            .counters
            .retained_bytes
            .checked_div(self.counters.collections)
            .unwrap_or(0);

        HeapStats {
            occupancy: self.occupancy(),
            collections: self.counters.collections,
            avg_retained_bytes,
            total_allocated_bytes: self.counters.allocated_bytes,
        }
    }

    // ----- root bridge: global environment -----

    pub fn global_env(&self) -> ValueRef {
        self.roots.global_env
    }

    pub fn set_global_env(&mut self, env: ValueRef) {
        self.roots.global_env = env;
    }

    // ----- root bridge: pending-value stack -----

    pub fn pending_push(&mut self, slot: Pending) -> Result<(), PendingOverflow> {
        self.roots.pending.push(slot)
    }

    pub fn pending_pop(&mut self) -> Option<Pending> {
        self.roots.pending.pop()
    }

    pub fn pending_clear(&mut self) {
        self.roots.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.roots.pending.len()
    }

    // ----- root bridge: shadow stack -----

    /// Parks `value` in a fresh shadow-stack slot and returns its handle.
    pub fn push_root(&mut self, value: ValueRef) -> RootId {
        self.roots.shadow.push(value)
    }

    /// Drops the newest shadow-stack slot and returns its (patched) value.
    pub fn pop_root(&mut self) -> ValueRef {
        self.roots.shadow.pop()
    }

    pub fn root(&self, id: RootId) -> ValueRef {
        self.roots.shadow.get(id)
    }

    pub fn set_root(&mut self, id: RootId, value: ValueRef) {
        self.roots.shadow.set(id, value);
    }

    /// Opens a root frame; close it with [`Self::roots_truncate`]. The
    /// mark/truncate pair brackets a region of mutator code the way the
    /// recorded scan bounds bracketed the native stack in a conservative
    /// design: roots pushed in between are live only until the frame ends.
    pub fn roots_mark(&self) -> RootMark {
        RootMark(self.roots.shadow.len())
    }

    /// Drops every root pushed since `mark` was taken, invalidating their
    /// handles.
    pub fn roots_truncate(&mut self, mark: RootMark) {
        self.roots.shadow.truncate(mark);
    }

    // ----- internals -----

    /// Collects while keeping the reference fields of a not-yet-stored
    /// value alive, and returns the value with those fields patched.
    fn collect_rescuing(&mut self, value: Value) -> Value {
        let mark = self.roots_mark();

        let value = match value {
            Value::Pair { head, tail } => {
                let head = self.push_root(head);
                let tail = self.push_root(tail);
                self.collect();

                Value::Pair {
                    head: self.root(head),
                    tail: self.root(tail),
                }
            }
            Value::Closure { params, body, env } => {
                let params = self.push_root(params);
                let body = self.push_root(body);
                let env = self.push_root(env);
                self.collect();

                Value::Closure {
                    params: self.root(params),
                    body: self.root(body),
                    env: self.root(env),
                }
            }
            Value::Macro { params, body, env } => {
                let params = self.push_root(params);
                let body = self.push_root(body);
                let env = self.push_root(env);
                self.collect();

                Value::Macro {
                    params: self.root(params),
                    body: self.root(body),
                    env: self.root(env),
                }
            }
            Value::Forwarded(_) => unreachable!("mutator allocated a forwarding record"),
            leaf => {
                self.collect();
                leaf
            }
        };

        self.roots_truncate(mark);
        value
    }

    fn oom(&self) -> ! {
        error!(
            "heap exhausted: both spaces full after collection ({} cells per space)",
            self.capacity()
        );
        std::process::exit(2);
    }

    /// Overwrites a live cell in place. Only tests need this: the language
    /// has no mutation primitives, but the collector must still handle the
    /// cyclic structures mutation could create.
    #[cfg(test)]
    fn overwrite(&mut self, reference: ValueRef, value: Value) {
        self.active.set(reference, value);
    }
}
