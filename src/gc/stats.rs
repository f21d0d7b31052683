/// Read-only heap diagnostics. See [`Heap::stats`](super::Heap::stats).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeapStats {
    /// Occupied fraction of the active space, in `0.0..=1.0`.
    pub occupancy: f64,
    /// Completed collection passes.
    pub collections: u64,
    /// Mean bytes retained per collection pass; 0 before the first pass.
    pub avg_retained_bytes: u64,
    /// Cumulative bytes handed out by the allocator.
    pub total_allocated_bytes: u64,
}

#[derive(Default)]
pub(super) struct Counters {
    pub collections: u64,
    pub retained_bytes: u64,
    pub allocated_bytes: u64,
}
