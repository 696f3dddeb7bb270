//! Aggregate counters for a simulation domain.
//!
//! [`DomainMetrics`] is a point-in-time snapshot assembled by
//! [`SimulationDomain::metrics`](crate::SimulationDomain::metrics). Gauges
//! describe the current state; cumulative counters include allocators that
//! have since been retired.

/// Snapshot of a domain's state and cumulative counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DomainMetrics {
    /// Allocators currently holding a buffer.
    pub live_allocators: usize,
    /// Live cluster entries across all allocators.
    pub live_clusters: usize,
    /// Live particles across all allocators.
    pub particle_count: usize,
    /// Sum of buffer capacities, in floats.
    pub buffer_floats: usize,
    /// Deferred actions waiting in the queue.
    pub pending_actions: usize,
    /// Streams still running.
    pub active_streams: usize,
    /// Filled tracking slots.
    pub tracked_emitters: usize,
    /// Cumulative allocations merged into an existing cluster.
    pub merges: u64,
    /// Cumulative compactions.
    pub compactions: u64,
    /// Cumulative buffer growths.
    pub growths: u64,
    /// Cumulative allocator retirements.
    pub retirements: u64,
    /// Cumulative allocations rejected for exceeding the maximum buffer size.
    pub rejected_allocations: u64,
    /// Cumulative buffer failures, including failed buffer creation.
    pub buffer_failures: u64,
    /// Cumulative tracking-slot evictions.
    pub evictions: u64,
}
