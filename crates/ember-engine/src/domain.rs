//! The per-domain simulation context.
//!
//! A [`SimulationDomain`] owns everything one simulation clock touches: the
//! per-type allocators and their buffers, the deferred action queue, the
//! running streams, and the emitter tracking table. Independent clocks (for
//! example a combat view and a slower campaign map) are independent domains
//! and never share state.
//!
//! # Tick order
//!
//! [`advance`](SimulationDomain::advance) adds `dt` to the clock, executes
//! every deferred action due at the new time (cluster deaths, stream bursts,
//! host callbacks), then refreshes the tracking table.
//!
//! # Resource release
//!
//! Buffers are created and released through the domain's [`BufferDevice`].
//! An allocator's buffer is released when its last cluster dies, and every
//! remaining buffer is released by [`teardown`](SimulationDomain::teardown),
//! which `Drop` also runs.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use indexmap::IndexMap;

use ember_arena::{
    AllocatorStats, ArenaError, BufferDevice, ClusterId, DeathOutcome, HostDevice,
    ParticleAllocator,
};
use ember_core::{
    AlwaysVisible, Emitter, GenerateRequest, ParticleType, SimTime, StreamId, TrackedEmitter,
    Visibility,
};

use crate::config::{ConfigError, EngineConfig};
use crate::metrics::DomainMetrics;
use crate::scheduler::DeferredQueue;
use crate::stream::{ParticleStream, StreamSpec};
use crate::tracking::EmitterBufferHandler;

// ── Identifiers and actions ─────────────────────────────────────

/// Identity of one allocator instance.
///
/// A type's allocator is retired when its last particle dies and recreated
/// on the next burst; the new instance gets a fresh id, so death actions
/// aimed at the old instance become no-ops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocatorId(pub u64);

impl fmt::Display for AllocatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "allocator {}", self.0)
    }
}

/// Host callback run by the deferred queue.
pub type Callback<D> = Box<dyn FnOnce(&mut SimulationDomain<D>)>;

/// An entry on the domain's deferred queue.
pub enum DeferredAction<D: BufferDevice> {
    /// Process the death of a cluster.
    ClusterDeath {
        /// Type whose allocator holds the cluster.
        particle_type: ParticleType,
        /// Allocator instance the cluster was registered with.
        allocator: AllocatorId,
        /// Cluster token.
        cluster: ClusterId,
    },
    /// Run the next burst of a stream.
    StreamBurst(StreamId),
    /// Run a host callback.
    Callback(Callback<D>),
}

impl<D: BufferDevice> fmt::Debug for DeferredAction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterDeath {
                particle_type,
                allocator,
                cluster,
            } => f
                .debug_struct("ClusterDeath")
                .field("particle_type", particle_type)
                .field("allocator", allocator)
                .field("cluster", cluster)
                .finish(),
            Self::StreamBurst(id) => f.debug_tuple("StreamBurst").field(id).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Result of a burst request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BurstOutcome {
    /// Particles were written to the type's buffer.
    Generated {
        /// Number of particles written.
        particles: usize,
    },
    /// The emitter was culled or declined to generate.
    Culled,
    /// Nothing was requested.
    Empty,
    /// The particles were generated but could not be stored.
    Dropped,
}

impl BurstOutcome {
    /// Whether the burst completed without loss. Culled and empty bursts
    /// count as success.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Dropped)
    }
}

/// One instanced draw the render collaborator should issue.
#[derive(Debug)]
pub struct DrawBatch<'a, B> {
    /// Render state of the batch.
    pub particle_type: ParticleType,
    /// Buffer holding the records.
    pub buffer: &'a B,
    /// Valid float range of `buffer`.
    pub range: Range<usize>,
    /// Instances in `range`.
    pub instance_count: usize,
}

struct TypeAllocator<B> {
    id: AllocatorId,
    allocator: ParticleAllocator<B>,
}

// ── SimulationDomain ────────────────────────────────────────────

/// Particle state driven by one simulation clock.
pub struct SimulationDomain<D: BufferDevice = HostDevice> {
    config: EngineConfig,
    device: D,
    now: SimTime,
    allocators: BTreeMap<ParticleType, TypeAllocator<D::Buffer>>,
    queue: DeferredQueue<DeferredAction<D>>,
    streams: IndexMap<StreamId, ParticleStream>,
    tracker: EmitterBufferHandler<Rc<dyn TrackedEmitter>>,
    visibility: Box<dyn Visibility>,
    next_allocator: u64,
    next_stream: u64,
    retired_stats: AllocatorStats,
    retirements: u64,
    creation_failures: u64,
    oversized_bursts: u64,
}

impl<D: BufferDevice> SimulationDomain<D> {
    /// Create a domain with its clock at zero.
    pub fn new(config: EngineConfig, device: D) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tracker: EmitterBufferHandler::new(
                config.tracking_capacity,
                config.remove_when_full_fraction,
            ),
            config,
            device,
            now: 0.0,
            allocators: BTreeMap::new(),
            queue: DeferredQueue::new(),
            streams: IndexMap::new(),
            visibility: Box::new(AlwaysVisible),
            next_allocator: 0,
            next_stream: 0,
            retired_stats: AllocatorStats::default(),
            retirements: 0,
            creation_failures: 0,
            oversized_bursts: 0,
        })
    }

    // ── Accessors ────────────────────────────────────────────────

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// The domain's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The buffer device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable access to the buffer device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The allocator for `particle_type`, if one is live.
    pub fn allocator(&self, particle_type: &ParticleType) -> Option<&ParticleAllocator<D::Buffer>> {
        self.allocators.get(particle_type).map(|t| &t.allocator)
    }

    /// Instance id of the live allocator for `particle_type`.
    pub fn allocator_id(&self, particle_type: &ParticleType) -> Option<AllocatorId> {
        self.allocators.get(particle_type).map(|t| t.id)
    }

    /// Live allocators in draw order.
    pub fn allocators(&self) -> impl Iterator<Item = &ParticleAllocator<D::Buffer>> + '_ {
        self.allocators.values().map(|t| &t.allocator)
    }

    /// Live particles across all types.
    pub fn particle_count(&self) -> usize {
        self.allocators
            .values()
            .map(|t| t.allocator.particle_count())
            .sum()
    }

    /// Deferred actions waiting to run.
    pub fn pending_actions(&self) -> usize {
        self.queue.len()
    }

    /// Whether `id` is still running.
    pub fn is_streaming(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    /// The emitter tracking table.
    pub fn tracker(&self) -> &EmitterBufferHandler<Rc<dyn TrackedEmitter>> {
        &self.tracker
    }

    /// Replace the culling predicate used by later bursts.
    pub fn set_visibility(&mut self, visibility: impl Visibility + 'static) {
        self.visibility = Box::new(visibility);
    }

    /// Batches to draw, ordered by [`ParticleType`].
    pub fn draw_batches(&self) -> impl Iterator<Item = DrawBatch<'_, D::Buffer>> + '_ {
        self.allocators.iter().map(|(ty, t)| DrawBatch {
            particle_type: *ty,
            buffer: t.allocator.buffer(),
            range: t.allocator.draw_range(),
            instance_count: t.allocator.instance_count(),
        })
    }

    /// Snapshot of gauges and cumulative counters.
    pub fn metrics(&self) -> DomainMetrics {
        let mut stats = self.retired_stats;
        let mut m = DomainMetrics {
            live_allocators: self.allocators.len(),
            pending_actions: self.queue.len(),
            active_streams: self.streams.len(),
            tracked_emitters: self.tracker.len(),
            retirements: self.retirements,
            evictions: self.tracker.evictions(),
            ..DomainMetrics::default()
        };
        for t in self.allocators.values() {
            m.live_clusters += t.allocator.clusters().len();
            m.particle_count += t.allocator.particle_count();
            m.buffer_floats += t.allocator.buffer_size();
            accumulate(&mut stats, t.allocator.stats());
        }
        m.merges = stats.merges;
        m.compactions = stats.compactions;
        m.growths = stats.growths;
        m.rejected_allocations = stats.rejected + self.oversized_bursts;
        m.buffer_failures = stats.buffer_failures + self.creation_failures;
        m
    }

    // ── Clock ────────────────────────────────────────────────────

    /// Advance the clock by `dt` seconds and run everything now due.
    ///
    /// Negative or non-finite `dt` is treated as zero.
    pub fn advance(&mut self, dt: SimTime) {
        if dt.is_finite() && dt > 0.0 {
            self.now += dt;
        }
        for (_, action) in self.queue.take_due(self.now) {
            self.execute(action);
        }
        self.tracker.update(self.now);
    }

    // ── Scheduling ───────────────────────────────────────────────

    /// Run `callback` `delay` seconds from now.
    pub fn schedule_after(
        &mut self,
        delay: SimTime,
        callback: impl FnOnce(&mut SimulationDomain<D>) + 'static,
    ) {
        self.schedule_at(self.now + delay.max(0.0), callback);
    }

    /// Run `callback` at absolute time `time`.
    ///
    /// A time that is not in the future runs on the next
    /// [`advance`](Self::advance).
    pub fn schedule_at(
        &mut self,
        time: SimTime,
        callback: impl FnOnce(&mut SimulationDomain<D>) + 'static,
    ) {
        self.queue
            .schedule_at(time, DeferredAction::Callback(Box::new(callback)));
    }

    fn execute(&mut self, action: DeferredAction<D>) {
        match action {
            DeferredAction::ClusterDeath {
                particle_type,
                allocator,
                cluster,
            } => self.cluster_death(particle_type, allocator, cluster),
            DeferredAction::StreamBurst(id) => self.stream_burst(id),
            DeferredAction::Callback(callback) => callback(self),
        }
    }

    // ── Bursts ───────────────────────────────────────────────────

    /// Generate `count` particles from `emitter` now.
    pub fn burst(&mut self, emitter: &mut dyn Emitter, count: usize) -> BurstOutcome {
        self.burst_from(emitter, count, 0)
    }

    /// Generate `count` particles numbered from `start_index`.
    pub fn burst_from(
        &mut self,
        emitter: &mut dyn Emitter,
        count: usize,
        start_index: usize,
    ) -> BurstOutcome {
        if count == 0 {
            return BurstOutcome::Empty;
        }
        let now = self.now;
        let particle_type = emitter.particle_type();
        if !self.burst_fits(particle_type, count) {
            log::warn!(
                "{particle_type:?}: dropping burst of {count} particles, exceeds max buffer size {}",
                self.config.allocator.max_buffer_size
            );
            self.oversized_bursts += 1;
            return BurstOutcome::Dropped;
        }

        let anchor = emitter.anchor();
        if anchor.is_some()
            && !self
                .visibility
                .is_visible(emitter.location(), emitter.render_radius())
        {
            return BurstOutcome::Culled;
        }
        let anchor_id = anchor.as_ref().map(|a| a.anchor_id());
        let newly_tracked = anchor_id.is_some_and(|a| self.tracker.slot_of(a).is_none());
        let tracking_slot = anchor.map(|a| self.tracker.track(a, now) as u32);

        let request = GenerateRequest {
            count,
            start_index,
            start_time: now,
            floats_per_particle: self.config.allocator.floats_per_particle,
            tracking_slot,
            visibility: self.visibility.as_ref(),
        };
        let Some(generated) = emitter.generate(&request) else {
            if let Some(anchor_id) = anchor_id.filter(|_| newly_tracked) {
                self.tracker.untrack(anchor_id);
            }
            return BurstOutcome::Culled;
        };
        let death_time = now + generated.max_lifetime.max(0.0);

        let Some(id) = self.ensure_allocator(particle_type) else {
            return BurstOutcome::Dropped;
        };
        let Some(slot) = self.allocators.get_mut(&particle_type) else {
            return BurstOutcome::Dropped;
        };
        let result = slot.allocator.allocate(&generated.records, now, death_time);
        let allocator_empty = slot.allocator.is_empty();

        let outcome = match result {
            Ok(Some(allocation)) => {
                if let Some(anchor_id) = anchor_id {
                    self.tracker.refresh(anchor_id, death_time);
                }
                if let Some(at) = allocation.death_at {
                    self.queue.schedule_at(
                        at,
                        DeferredAction::ClusterDeath {
                            particle_type,
                            allocator: id,
                            cluster: allocation.cluster,
                        },
                    );
                }
                BurstOutcome::Generated {
                    particles: allocation.particles,
                }
            }
            Ok(None) => BurstOutcome::Empty,
            Err(ArenaError::CapacityExceeded { .. }) => BurstOutcome::Dropped,
            Err(e) => {
                log::warn!("{particle_type:?}: dropping burst of {count} particles: {e}");
                BurstOutcome::Dropped
            }
        };
        if allocator_empty {
            self.retire(particle_type);
        }
        outcome
    }

    /// Whether `count` more particles of `particle_type` can fit below the
    /// maximum buffer size.
    fn burst_fits(&self, particle_type: ParticleType, count: usize) -> bool {
        let position = self
            .allocators
            .get(&particle_type)
            .map_or(0, |t| t.allocator.buffer_position());
        count
            .checked_mul(self.config.allocator.floats_per_particle)
            .and_then(|floats| floats.checked_add(position))
            .is_some_and(|end| end <= self.config.allocator.max_buffer_size)
    }

    /// Create the allocator for `particle_type` if it is not live.
    fn ensure_allocator(&mut self, particle_type: ParticleType) -> Option<AllocatorId> {
        if let Some(t) = self.allocators.get(&particle_type) {
            return Some(t.id);
        }
        let config = self.config.allocator;
        let created = self
            .device
            .create_buffer(config.initial_buffer_size)
            .map_err(ArenaError::from)
            .and_then(|buffer| ParticleAllocator::new(particle_type, config, buffer));
        match created {
            Ok(allocator) => {
                let id = AllocatorId(self.next_allocator);
                self.next_allocator += 1;
                log::debug!("{particle_type:?}: created {id}");
                self.allocators
                    .insert(particle_type, TypeAllocator { id, allocator });
                Some(id)
            }
            Err(e) => {
                self.creation_failures += 1;
                log::error!("{particle_type:?}: could not create allocator: {e}");
                None
            }
        }
    }

    // ── Deaths ───────────────────────────────────────────────────

    fn cluster_death(
        &mut self,
        particle_type: ParticleType,
        allocator: AllocatorId,
        cluster: ClusterId,
    ) {
        let Some(slot) = self
            .allocators
            .get_mut(&particle_type)
            .filter(|t| t.id == allocator)
        else {
            log::trace!("{particle_type:?}: death of {cluster} on retired {allocator}");
            return;
        };
        match slot.allocator.register_death(cluster, self.now) {
            DeathOutcome::Deferred { until } => self.queue.schedule_at(
                until,
                DeferredAction::ClusterDeath {
                    particle_type,
                    allocator,
                    cluster,
                },
            ),
            DeathOutcome::Retire { .. } => self.retire(particle_type),
            DeathOutcome::Stale
            | DeathOutcome::Removed { .. }
            | DeathOutcome::Compacted { .. } => {}
        }
    }

    /// Drop the allocator for `particle_type` and release its buffer.
    fn retire(&mut self, particle_type: ParticleType) {
        if let Some(t) = self.allocators.remove(&particle_type) {
            accumulate(&mut self.retired_stats, t.allocator.stats());
            self.retirements += 1;
            log::debug!("{particle_type:?}: retired {}", t.id);
            self.device.release_buffer(t.allocator.into_buffer());
        }
    }

    // ── Streams ──────────────────────────────────────────────────

    /// Start a repeating stream. The first burst runs on the next
    /// [`advance`](Self::advance).
    ///
    /// A stream that could never emit (zero particles per burst or a
    /// non-positive rate) is not started and `None` is returned.
    pub fn stream(&mut self, emitter: impl Emitter + 'static, spec: StreamSpec) -> Option<StreamId> {
        if !spec.is_valid() {
            log::warn!("ignoring stream that can never emit: {spec:?}");
            return None;
        }
        let id = StreamId(self.next_stream);
        self.next_stream += 1;
        let stream = ParticleStream::new(
            Box::new(emitter),
            spec,
            self.now,
            self.config.min_burst_delay,
        );
        self.streams.insert(id, stream);
        self.queue
            .schedule_at(self.now, DeferredAction::StreamBurst(id));
        Some(id)
    }

    /// Stop a stream early, running its when-finished hook.
    pub fn cancel_stream(&mut self, id: StreamId) -> bool {
        match self.streams.swap_remove(&id) {
            Some(stream) => {
                stream.finish();
                true
            }
            None => false,
        }
    }

    fn stream_burst(&mut self, id: StreamId) {
        let Some(mut stream) = self.streams.swap_remove(&id) else {
            return;
        };
        if stream.is_expired(self.now) || !stream.prepare() {
            log::trace!("{id} finished after {} bursts", stream.bursts());
            stream.finish();
            return;
        }
        let count = stream.particles_per_burst();
        let start = stream.next_burst();
        self.burst_from(stream.emitter_mut(), count, start);

        let next = self.now + stream.interval();
        self.streams.insert(id, stream);
        self.queue.schedule_at(next, DeferredAction::StreamBurst(id));
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Release every buffer and drop all pending work.
    ///
    /// Running streams end and their when-finished hooks run. The domain
    /// stays usable: the next burst creates fresh allocators.
    pub fn teardown(&mut self) {
        let types: Vec<ParticleType> = self.allocators.keys().copied().collect();
        for particle_type in types {
            self.retire(particle_type);
        }
        self.queue.clear();
        for (_, stream) in self.streams.drain(..) {
            stream.finish();
        }
        self.tracker.clear();
    }

    /// [`teardown`](Self::teardown), then rewind the clock to zero.
    pub fn reset(&mut self) {
        self.teardown();
        self.tracker = EmitterBufferHandler::new(
            self.config.tracking_capacity,
            self.config.remove_when_full_fraction,
        );
        self.now = 0.0;
    }
}

impl SimulationDomain<HostDevice> {
    /// Domain backed by host memory.
    pub fn headless(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::new(config, HostDevice::new())
    }
}

impl<D: BufferDevice> Drop for SimulationDomain<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<D: BufferDevice> fmt::Debug for SimulationDomain<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationDomain")
            .field("now", &self.now)
            .field("allocators", &self.allocators.len())
            .field("pending_actions", &self.queue.len())
            .field("streams", &self.streams.len())
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

fn accumulate(total: &mut AllocatorStats, s: AllocatorStats) {
    total.allocations += s.allocations;
    total.merges += s.merges;
    total.growths += s.growths;
    total.compactions += s.compactions;
    total.rejected += s.rejected;
    total.buffer_failures += s.buffer_failures;
}
