//! Per-type particle allocator.
//!
//! [`ParticleAllocator`] appends clusters of particle records to one
//! power-of-two buffer, coalesces adjacent clusters with compatible death
//! times, and compacts the buffer when deaths leave it sparsely filled.
//!
//! # Lifecycle
//!
//! ```text
//! EMPTY ──allocate──▶ HAS_LIVE_DATA ──death below fill fraction──▶ DEFRAGMENTING
//!                        ▲    │                                        │
//!                        │    └──last death──▶ EMPTY (Retire)          │
//!                        └─────────────────────────────────────────────┘
//! ```
//!
//! The allocator never schedules anything itself. [`allocate`] reports the
//! time at which a new cluster's death should be processed and the owner
//! calls [`register_death`] then, passing the [`ClusterId`] token. Tokens of
//! clusters discarded by a buffer failure resolve to [`DeathOutcome::Stale`].
//!
//! [`allocate`]: ParticleAllocator::allocate
//! [`register_death`]: ParticleAllocator::register_death

use ember_core::{ParticleType, SimTime};

use crate::buffer::ParticleBuffer;
use crate::cluster::{ClusterArena, ClusterEntry, ClusterId};
use crate::config::AllocatorConfig;
use crate::error::{ArenaError, BufferError};

/// Result of a successful [`ParticleAllocator::allocate`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Allocation {
    /// Cluster now holding the particles.
    pub cluster: ClusterId,
    /// Number of particles written.
    pub particles: usize,
    /// Whether the particles were merged into the previous cluster.
    pub merged: bool,
    /// When to call [`ParticleAllocator::register_death`] for a newly
    /// registered cluster: its death time plus the destruction delay.
    /// `None` on merge, since the existing death action still governs.
    pub death_at: Option<SimTime>,
}

/// Result of [`ParticleAllocator::register_death`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeathOutcome {
    /// The token no longer names a live cluster.
    Stale,
    /// The cluster's lifetime was extended by a merge; retry at `until`.
    Deferred {
        /// Death time plus destruction delay of the merged cluster.
        until: SimTime,
    },
    /// The cluster was removed.
    Removed {
        /// Particles released.
        particles: usize,
    },
    /// The cluster was removed and the buffer compacted.
    Compacted {
        /// Particles released.
        particles: usize,
    },
    /// No particles remain; the owner should release the buffer.
    Retire {
        /// Particles released.
        particles: usize,
    },
}

/// Cumulative counters for one allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Successful allocations.
    pub allocations: u64,
    /// Allocations merged into an existing cluster.
    pub merges: u64,
    /// Buffer growths.
    pub growths: u64,
    /// Compactions.
    pub compactions: u64,
    /// Allocations rejected for exceeding the maximum buffer size.
    pub rejected: u64,
    /// Buffer failures that reset the allocator to empty.
    pub buffer_failures: u64,
}

/// Growable particle buffer for one [`ParticleType`].
///
/// Invariants between calls:
/// - live clusters are sorted by offset and do not overlap;
/// - the sum of live cluster sizes is `particle_count * floats_per_particle`;
/// - `buffer_position <= buffer_size`, and `buffer_size` is a power of two
///   within `[initial_buffer_size, max_buffer_size]`.
#[derive(Debug)]
pub struct ParticleAllocator<B> {
    particle_type: ParticleType,
    config: AllocatorConfig,
    buffer: B,
    clusters: ClusterArena,
    buffer_position: usize,
    particle_count: usize,
    stats: AllocatorStats,
}

impl<B: ParticleBuffer> ParticleAllocator<B> {
    /// Create an empty allocator over `buffer`.
    ///
    /// The buffer is resized to `config.initial_buffer_size` if needed.
    pub fn new(
        particle_type: ParticleType,
        config: AllocatorConfig,
        mut buffer: B,
    ) -> Result<Self, ArenaError> {
        config.validate()?;
        if buffer.capacity() != config.initial_buffer_size {
            buffer.reallocate(config.initial_buffer_size, 0)?;
        }
        Ok(Self {
            particle_type,
            config,
            buffer,
            clusters: ClusterArena::new(),
            buffer_position: 0,
            particle_count: 0,
            stats: AllocatorStats::default(),
        })
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The type this allocator batches.
    pub fn particle_type(&self) -> ParticleType {
        self.particle_type
    }

    /// The allocator's configuration.
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Live particles.
    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    /// Append cursor in floats. Dead runs below it linger until compaction.
    pub fn buffer_position(&self) -> usize {
        self.buffer_position
    }

    /// Buffer capacity in floats.
    pub fn buffer_size(&self) -> usize {
        self.buffer.capacity()
    }

    /// The backing buffer.
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Live cluster entries.
    pub fn clusters(&self) -> &ClusterArena {
        &self.clusters
    }

    /// Resolve a cluster token.
    pub fn cluster(&self, id: ClusterId) -> Option<&ClusterEntry> {
        self.clusters.get(id)
    }

    /// Cumulative counters.
    pub fn stats(&self) -> AllocatorStats {
        self.stats
    }

    /// Float range the render collaborator should draw.
    pub fn draw_range(&self) -> std::ops::Range<usize> {
        0..self.buffer_position
    }

    /// Instances to draw, including dead records not yet compacted away.
    pub fn instance_count(&self) -> usize {
        self.buffer_position / self.config.floats_per_particle
    }

    /// Whether no particles are live.
    pub fn is_empty(&self) -> bool {
        self.particle_count == 0
    }

    /// Consume the allocator, returning the buffer for release.
    pub fn into_buffer(self) -> B {
        self.buffer
    }

    // ── Allocation ───────────────────────────────────────────────

    /// Append a block of particle records.
    ///
    /// `records` must hold a whole number of particles. An empty block is
    /// a no-op returning `Ok(None)`. If the buffer cannot grow far enough,
    /// nothing is written and `CapacityExceeded` is returned. A buffer
    /// failure resets the allocator to empty and is returned as
    /// `ArenaError::Buffer`.
    pub fn allocate(
        &mut self,
        records: &[f32],
        generation_time: SimTime,
        death_time: SimTime,
    ) -> Result<Option<Allocation>, ArenaError> {
        let fpp = self.config.floats_per_particle;
        if records.is_empty() {
            return Ok(None);
        }
        if records.len() % fpp != 0 {
            return Err(ArenaError::RecordSizeMismatch {
                len: records.len(),
                floats_per_particle: fpp,
            });
        }

        let required = self.buffer_position + records.len();
        if required > self.buffer.capacity() {
            let Some(new_size) = self.config.grown_size(required) else {
                self.stats.rejected += 1;
                log::warn!(
                    "{:?}: dropping {} particles, {} floats exceed the maximum buffer size {}",
                    self.particle_type,
                    records.len() / fpp,
                    required,
                    self.config.max_buffer_size
                );
                return Err(ArenaError::CapacityExceeded {
                    requested: required,
                    capacity: self.config.max_buffer_size,
                });
            };
            let old_size = self.buffer.capacity();
            if let Err(e) = self.buffer.reallocate(new_size, self.buffer_position) {
                return Err(self.reset_after_failure("grow", e));
            }
            self.stats.growths += 1;
            log::debug!(
                "{:?}: grew buffer {} -> {} floats",
                self.particle_type,
                old_size,
                new_size
            );
        }

        if let Err(e) = self.buffer.write(self.buffer_position, records) {
            return Err(self.reset_after_failure("write", e));
        }
        let entry = ClusterEntry {
            offset: self.buffer_position,
            size_in_floats: records.len(),
            generation_time,
            death_time,
        };
        self.buffer_position = required;
        self.particle_count += records.len() / fpp;
        self.stats.allocations += 1;
        Ok(Some(self.register_creation(entry)))
    }

    /// Record a freshly written run, merging it into the last cluster when
    /// it is adjacent, the merged size stays within `max_coalesce_floats`,
    /// and it dies no later than the last cluster's death time plus the
    /// destruction delay.
    fn register_creation(&mut self, entry: ClusterEntry) -> Allocation {
        let particles = entry.size_in_floats / self.config.floats_per_particle;
        let mergeable = self.clusters.last().and_then(|(id, last)| {
            let adjacent = last.end() == entry.offset;
            let fits =
                last.size_in_floats + entry.size_in_floats <= self.config.max_coalesce_floats;
            let compatible = entry.death_time <= last.death_time + self.config.destruction_delay;
            (adjacent && fits && compatible).then_some(id)
        });

        if let Some(id) = mergeable {
            if self.clusters.absorb(id, &entry) {
                self.stats.merges += 1;
                log::trace!("{:?}: merged {particles} particles into {id}", self.particle_type);
                return Allocation {
                    cluster: id,
                    particles,
                    merged: true,
                    death_at: None,
                };
            }
        }

        let id = self.clusters.insert(entry);
        Allocation {
            cluster: id,
            particles,
            merged: false,
            death_at: Some(entry.death_time + self.config.destruction_delay),
        }
    }

    // ── Death and compaction ─────────────────────────────────────

    /// Process the scheduled death of a cluster at simulation time `now`.
    ///
    /// If a merge pushed the cluster's death past `now`, nothing is removed
    /// and the new time is returned as [`DeathOutcome::Deferred`].
    pub fn register_death(&mut self, id: ClusterId, now: SimTime) -> DeathOutcome {
        let Some(entry) = self.clusters.get(id) else {
            return DeathOutcome::Stale;
        };
        let until = entry.death_time + self.config.destruction_delay;
        if until > now {
            return DeathOutcome::Deferred { until };
        }

        let Some(entry) = self.clusters.remove(id) else {
            return DeathOutcome::Stale;
        };
        let fpp = self.config.floats_per_particle;
        let particles = entry.size_in_floats / fpp;
        self.particle_count = self.particle_count.saturating_sub(particles);

        if self.particle_count == 0 {
            self.buffer_position = 0;
            log::debug!("{:?}: last cluster died, retiring", self.particle_type);
            return DeathOutcome::Retire { particles };
        }

        let written = (self.buffer_position / fpp) as f32;
        if (self.particle_count as f32) < self.config.refactor_fill_fraction * written {
            return match self.defragment() {
                Ok(()) => DeathOutcome::Compacted { particles },
                Err(_) => DeathOutcome::Retire { particles },
            };
        }
        DeathOutcome::Removed { particles }
    }

    /// Pack live clusters from offset 0 and shrink the buffer to the
    /// smallest permitted power of two holding them.
    ///
    /// Copies only live records. A failed map or resize resets the
    /// allocator to empty.
    pub fn defragment(&mut self) -> Result<(), ArenaError> {
        let before = self.buffer_position;
        let view = match self.buffer.map(before) {
            Ok(view) => view,
            Err(e) => return Err(self.reset_after_failure("map", e)),
        };
        let packed = self.clusters.relocate(|from, to, len| {
            view.copy_within(from..from + len, to);
        });
        self.buffer_position = packed;

        let target = self.config.compacted_size(packed);
        if target != self.buffer.capacity() {
            if let Err(e) = self.buffer.reallocate(target, packed) {
                return Err(self.reset_after_failure("shrink", e));
            }
        }
        self.stats.compactions += 1;
        log::debug!(
            "{:?}: compacted {} -> {} floats, buffer now {} floats",
            self.particle_type,
            before,
            packed,
            self.buffer.capacity()
        );
        Ok(())
    }

    /// Discard every cluster after a buffer failure.
    fn reset_after_failure(&mut self, op: &str, err: BufferError) -> ArenaError {
        log::error!(
            "{:?}: buffer {op} failed ({err}); discarding {} particles",
            self.particle_type,
            self.particle_count
        );
        self.clusters.clear();
        self.buffer_position = 0;
        self.particle_count = 0;
        self.stats.buffer_failures += 1;
        ArenaError::Buffer(err)
    }
}
