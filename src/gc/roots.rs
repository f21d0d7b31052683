use super::value::ValueRef;

/// One slot of the reader's pending-value stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pending {
    /// An unmatched `(`; list construction collapses down to this marker.
    Open,
    /// A partially-assembled value. A root.
    Value(ValueRef),
}

/// The pending-value stack overflowed; the expression nests too deeply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingOverflow;

/// Bounded stack of values the reader is still assembling. Lives outside
/// the managed heap; every `Value` slot is a root.
pub(super) struct PendingStack {
    slots: Vec<Pending>,
    capacity: usize,
}

impl PendingStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    pub fn push(&mut self, slot: Pending) -> Result<(), PendingOverflow> {
        if self.slots.len() == self.capacity {
            return Err(PendingOverflow);
        }

        self.slots.push(slot);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Pending> {
        self.slots.pop()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, idx: usize) -> Pending {
        self.slots[idx]
    }

    pub fn set(&mut self, idx: usize, slot: Pending) {
        self.slots[idx] = slot;
    }
}

/// Handle to one shadow-stack slot. Stays valid until a
/// [`roots_truncate`](super::Heap::roots_truncate) call cuts the stack
/// below it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootId(pub(super) usize);

/// Watermark returned by [`roots_mark`](super::Heap::roots_mark); passing it
/// back to `roots_truncate` drops every root pushed since.
#[derive(Clone, Copy, Debug)]
pub struct RootMark(pub(super) usize);

/// The shadow stack: a growable arena of typed root slots. Mutator code
/// parks any reference it holds across an allocation or safepoint in a slot
/// here; the collector patches the slots in place.
pub(super) struct ShadowStack {
    slots: Vec<ValueRef>,
}

impl ShadowStack {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn push(&mut self, value: ValueRef) -> RootId {
        self.slots.push(value);
        RootId(self.slots.len() - 1)
    }

    pub fn pop(&mut self) -> ValueRef {
        self.slots.pop().expect("shadow stack underflow")
    }

    pub fn get(&self, id: RootId) -> ValueRef {
        self.slots[id.0]
    }

    pub fn set(&mut self, id: RootId, value: ValueRef) {
        self.slots[id.0] = value;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get_at(&self, idx: usize) -> ValueRef {
        self.slots[idx]
    }

    pub fn set_at(&mut self, idx: usize, value: ValueRef) {
        self.slots[idx] = value;
    }

    pub fn truncate(&mut self, mark: RootMark) {
        debug_assert!(mark.0 <= self.slots.len());
        self.slots.truncate(mark.0);
    }
}

/// The three root sources the collector trusts: the global environment
/// slot, the pending-value stack and the shadow stack. Pure data; the
/// tracing logic lives with the collector.
pub(super) struct RootSet {
    pub global_env: ValueRef,
    pub pending: PendingStack,
    pub shadow: ShadowStack,
}
