//! Arena-specific error types.

use std::error::Error;
use std::fmt;

/// Errors reported by a [`ParticleBuffer`](crate::ParticleBuffer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// A mapped view of the buffer could not be acquired.
    MapFailed {
        /// Backend-specific description.
        reason: String,
    },
    /// A write or map touched floats beyond the buffer's capacity.
    OutOfRange {
        /// First float touched.
        offset: usize,
        /// Number of floats touched.
        len: usize,
        /// Buffer capacity in floats.
        capacity: usize,
    },
    /// The backend could not provide storage of the requested size.
    AllocationFailed {
        /// Requested capacity in floats.
        requested: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MapFailed { reason } => write!(f, "failed to map buffer: {reason}"),
            Self::OutOfRange {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "buffer access out of range: {len} floats at offset {offset}, capacity {capacity}"
            ),
            Self::AllocationFailed { requested } => {
                write!(f, "failed to allocate buffer of {requested} floats")
            }
        }
    }
}

impl Error for BufferError {}

/// Errors that can occur during allocator operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The allocation does not fit even after growing to the maximum size.
    CapacityExceeded {
        /// Floats the buffer would need to hold.
        requested: usize,
        /// Maximum buffer size in floats.
        capacity: usize,
    },
    /// The record block is not a whole number of particles.
    RecordSizeMismatch {
        /// Length of the record block in floats.
        len: usize,
        /// Expected floats per particle.
        floats_per_particle: usize,
    },
    /// The backing buffer failed; the allocator has been reset to empty.
    Buffer(BufferError),
    /// Allocator configuration is invalid.
    InvalidConfig {
        /// Description of which invariant was violated.
        reason: String,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded {
                requested,
                capacity,
            } => write!(
                f,
                "particle buffer capacity exceeded: requested {requested} floats, capacity {capacity} floats"
            ),
            Self::RecordSizeMismatch {
                len,
                floats_per_particle,
            } => write!(
                f,
                "record block of {len} floats is not a multiple of {floats_per_particle} floats per particle"
            ),
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::InvalidConfig { reason } => write!(f, "invalid allocator config: {reason}"),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Buffer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for ArenaError {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_error_is_source_of_arena_error() {
        let err = ArenaError::from(BufferError::MapFailed {
            reason: "lost context".into(),
        });
        assert_eq!(err.to_string(), "buffer: failed to map buffer: lost context");
        assert!(err.source().is_some());
    }

    #[test]
    fn capacity_exceeded_mentions_both_sizes() {
        let err = ArenaError::CapacityExceeded {
            requested: 10,
            capacity: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("10") && msg.contains('8'));
        assert!(err.source().is_none());
    }
}
