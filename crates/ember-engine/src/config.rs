//! Domain configuration, validation, and error types.
//!
//! [`EngineConfig`] is the input to
//! [`SimulationDomain::new`](crate::SimulationDomain::new).
//! [`validate()`](EngineConfig::validate) checks structural invariants once,
//! at construction; every allocator the domain creates later shares the
//! validated [`AllocatorConfig`].

use std::error::Error;
use std::fmt;

use ember_arena::{AllocatorConfig, ArenaError};
use ember_core::SimTime;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`EngineConfig::validate()`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Allocator configuration is invalid.
    Arena(ArenaError),
    /// The tracking table must hold at least one slot.
    InvalidTrackingCapacity {
        /// The configured capacity.
        configured: usize,
    },
    /// The eviction fraction must lie in `(0, 1]`.
    InvalidEvictionFraction {
        /// The invalid value.
        value: f32,
    },
    /// The minimum burst delay must be finite and positive.
    InvalidBurstDelay {
        /// The invalid value.
        value: SimTime,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arena(e) => write!(f, "arena: {e}"),
            Self::InvalidTrackingCapacity { configured } => {
                write!(f, "tracking_capacity must be at least 1, got {configured}")
            }
            Self::InvalidEvictionFraction { value } => {
                write!(f, "remove_when_full_fraction must be in (0, 1], got {value}")
            }
            Self::InvalidBurstDelay { value } => {
                write!(f, "min_burst_delay must be finite and positive, got {value}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for ConfigError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

// ── EngineConfig ───────────────────────────────────────────────────

/// Configuration for one [`SimulationDomain`](crate::SimulationDomain).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    /// Shared by every per-type allocator in the domain.
    pub allocator: AllocatorConfig,
    /// Slots in the emitter tracking table. Default: 1024.
    pub tracking_capacity: usize,
    /// Fraction of the stalest tracked emitters evicted when the table is
    /// full. Default: 0.5.
    pub remove_when_full_fraction: f32,
    /// Lower bound on the interval between stream bursts, in seconds.
    /// Default: 1/60.
    pub min_burst_delay: SimTime,
}

impl EngineConfig {
    /// Default tracking table size.
    pub const DEFAULT_TRACKING_CAPACITY: usize = 1024;

    /// Default eviction fraction.
    pub const DEFAULT_REMOVE_WHEN_FULL_FRACTION: f32 = 0.5;

    /// Default minimum burst interval.
    pub const DEFAULT_MIN_BURST_DELAY: SimTime = 1.0 / 60.0;

    /// Create a config around an allocator config, with default engine
    /// parameters.
    pub fn new(allocator: AllocatorConfig) -> Self {
        Self {
            allocator,
            tracking_capacity: Self::DEFAULT_TRACKING_CAPACITY,
            remove_when_full_fraction: Self::DEFAULT_REMOVE_WHEN_FULL_FRACTION,
            min_burst_delay: Self::DEFAULT_MIN_BURST_DELAY,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.allocator.validate()?;
        if self.tracking_capacity == 0 {
            return Err(ConfigError::InvalidTrackingCapacity {
                configured: self.tracking_capacity,
            });
        }
        let frac = self.remove_when_full_fraction;
        if !(frac > 0.0 && frac <= 1.0) {
            return Err(ConfigError::InvalidEvictionFraction { value: frac });
        }
        let delay = self.min_burst_delay;
        if !delay.is_finite() || delay <= 0.0 {
            return Err(ConfigError::InvalidBurstDelay { value: delay });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(AllocatorConfig::default())
    }
}
