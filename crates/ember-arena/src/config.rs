//! Allocator configuration parameters.

use crate::error::ArenaError;

/// Configuration for a [`ParticleAllocator`](crate::ParticleAllocator).
///
/// Sizes are in floats. Validated at allocator construction; all values are
/// immutable after creation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AllocatorConfig {
    /// Width of one particle record in floats.
    pub floats_per_particle: usize,

    /// Buffer size of a freshly created allocator.
    ///
    /// Default: 4096. Must be a power of two.
    pub initial_buffer_size: usize,

    /// Upper bound on buffer growth.
    ///
    /// Default: 2^29. Must be a power of two and at least
    /// `initial_buffer_size`. Allocations that would need more are rejected.
    pub max_buffer_size: usize,

    /// Compaction threshold.
    ///
    /// When a death leaves fewer live particles than this fraction of the
    /// particles written since the last compaction, the buffer is compacted.
    /// Default: 0.5.
    pub refactor_fill_fraction: f32,

    /// Largest cluster, in floats, that coalescing may produce.
    ///
    /// Caps how many short-lived particles can be kept alive by merging them
    /// into a long-lived cluster. Default: 512 particles' worth.
    pub max_coalesce_floats: usize,

    /// Grace period, in seconds, between a cluster's death time and the
    /// reclamation of its records.
    ///
    /// Also the coalescing window: a new cluster may merge into its
    /// predecessor if it dies no later than the predecessor's death time
    /// plus this delay. Default: 3.0.
    pub destruction_delay: f32,
}

impl AllocatorConfig {
    /// Default initial buffer size in floats.
    pub const DEFAULT_INITIAL_BUFFER_SIZE: usize = 4096;

    /// Default maximum buffer size in floats.
    pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1 << 29;

    /// Default compaction threshold.
    pub const DEFAULT_REFACTOR_FILL_FRACTION: f32 = 0.5;

    /// Default coalescing cap, in particles.
    pub const DEFAULT_MAX_COALESCE_PARTICLES: usize = 512;

    /// Default grace period in seconds.
    pub const DEFAULT_DESTRUCTION_DELAY: f32 = 3.0;

    /// Create a config for records of `floats_per_particle` floats.
    ///
    /// Uses default values for all other parameters.
    pub fn new(floats_per_particle: usize) -> Self {
        Self {
            floats_per_particle,
            initial_buffer_size: Self::DEFAULT_INITIAL_BUFFER_SIZE,
            max_buffer_size: Self::DEFAULT_MAX_BUFFER_SIZE,
            refactor_fill_fraction: Self::DEFAULT_REFACTOR_FILL_FRACTION,
            max_coalesce_floats: Self::DEFAULT_MAX_COALESCE_PARTICLES * floats_per_particle,
            destruction_delay: Self::DEFAULT_DESTRUCTION_DELAY,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.floats_per_particle == 0 {
            return Err(invalid("floats_per_particle must be at least 1"));
        }
        if !self.initial_buffer_size.is_power_of_two() {
            return Err(invalid(format!(
                "initial_buffer_size must be a power of two (got {})",
                self.initial_buffer_size
            )));
        }
        if !self.max_buffer_size.is_power_of_two() {
            return Err(invalid(format!(
                "max_buffer_size must be a power of two (got {})",
                self.max_buffer_size
            )));
        }
        if self.initial_buffer_size > self.max_buffer_size {
            return Err(invalid(format!(
                "initial_buffer_size {} exceeds max_buffer_size {}",
                self.initial_buffer_size, self.max_buffer_size
            )));
        }
        if !(0.0..=1.0).contains(&self.refactor_fill_fraction) {
            return Err(invalid(format!(
                "refactor_fill_fraction must be within [0, 1] (got {})",
                self.refactor_fill_fraction
            )));
        }
        if !self.destruction_delay.is_finite() || self.destruction_delay < 0.0 {
            return Err(invalid(format!(
                "destruction_delay must be finite and non-negative (got {})",
                self.destruction_delay
            )));
        }
        Ok(())
    }

    /// Buffer size needed to hold `required` floats, or `None` if even the
    /// maximum size is too small.
    pub fn grown_size(&self, required: usize) -> Option<usize> {
        if required > self.max_buffer_size {
            return None;
        }
        Some(self.clamp_power_of_two(required))
    }

    /// Smallest permitted buffer size holding `used` floats.
    ///
    /// Never below `initial_buffer_size`; callers guarantee
    /// `used <= max_buffer_size`.
    pub fn compacted_size(&self, used: usize) -> usize {
        self.clamp_power_of_two(used)
    }

    fn clamp_power_of_two(&self, n: usize) -> usize {
        n.max(self.initial_buffer_size)
            .checked_next_power_of_two()
            .map_or(self.max_buffer_size, |size| size.min(self.max_buffer_size))
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::new(ember_core::RecordLayout::default().floats_per_particle())
    }
}

fn invalid(reason: impl Into<String>) -> ArenaError {
    ArenaError::InvalidConfig {
        reason: reason.into(),
    }
}
