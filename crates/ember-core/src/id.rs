//! Strongly-typed identifiers and the [`SimTime`] alias.

use std::fmt;

/// Simulation time in seconds, as read from a domain's monotonic clock.
pub type SimTime = f32;

/// Identifies a texture the particles sample when rendered.
///
/// The value is opaque to the engine; render collaborators typically
/// store the GPU texture name here. Ordering is by numeric value so that
/// batches sharing a texture end up adjacent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpriteId(pub u32);

impl fmt::Display for SpriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SpriteId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Render layer a batch is drawn on. Lower layers draw first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderLayer(pub u16);

impl fmt::Display for RenderLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer {}", self.0)
    }
}

impl From<u16> for RenderLayer {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Optional location scope restricting where a batch is visible
/// (for example a map region the player is currently in).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a tracked emitter within a tracking table.
///
/// Chosen by the host; two anchors with the same id are treated as the
/// same emitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(pub u64);

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "anchor {}", self.0)
    }
}

/// Handle to a repeating particle stream registered with a domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_ids_order_numerically() {
        assert!(SpriteId(1) < SpriteId(2));
        assert_eq!(SpriteId::from(7), SpriteId(7));
    }

    #[test]
    fn display_formats() {
        assert_eq!(RenderLayer(3).to_string(), "layer 3");
        assert_eq!(AnchorId(9).to_string(), "anchor 9");
        assert_eq!(StreamId(2).to_string(), "stream 2");
    }
}
