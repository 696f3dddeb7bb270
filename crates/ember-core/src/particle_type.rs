//! The render-state key particles are batched under.
//!
//! Every particle belongs to exactly one [`ParticleType`]. Particles that
//! share a type share a GPU buffer and are drawn with a single instanced
//! draw call, so the type captures everything that would otherwise force
//! a pipeline state change: texture, blend equation, and layer.

use crate::id::{RenderLayer, ScopeId, SpriteId};

/// Blend equation applied when a batch is composited.
///
/// Factors and ops are GL enum values so that render collaborators can
/// pass them straight through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlendState {
    /// Source blend factor.
    pub src_factor: u32,
    /// Destination blend factor.
    pub dst_factor: u32,
    /// Blend operation (add, subtract, reverse-subtract, ...).
    pub op: u32,
}

impl BlendState {
    /// `GL_ONE`.
    pub const ONE: u32 = 0x0001;
    /// `GL_SRC_ALPHA`.
    pub const SRC_ALPHA: u32 = 0x0302;
    /// `GL_ONE_MINUS_SRC_ALPHA`.
    pub const ONE_MINUS_SRC_ALPHA: u32 = 0x0303;
    /// `GL_FUNC_ADD`.
    pub const FUNC_ADD: u32 = 0x8006;
    /// `GL_FUNC_SUBTRACT`.
    pub const FUNC_SUBTRACT: u32 = 0x800A;
    /// `GL_FUNC_REVERSE_SUBTRACT`.
    pub const FUNC_REVERSE_SUBTRACT: u32 = 0x800B;

    /// Additive blending (`SRC_ALPHA`, `ONE`, `ADD`). The default for emitters.
    pub const ADDITIVE: Self = Self {
        src_factor: Self::SRC_ALPHA,
        dst_factor: Self::ONE,
        op: Self::FUNC_ADD,
    };

    /// Standard alpha blending (`SRC_ALPHA`, `ONE_MINUS_SRC_ALPHA`, `ADD`).
    pub const ALPHA: Self = Self {
        src_factor: Self::SRC_ALPHA,
        dst_factor: Self::ONE_MINUS_SRC_ALPHA,
        op: Self::FUNC_ADD,
    };

    /// Create a blend state from raw factors and op.
    pub const fn new(src_factor: u32, dst_factor: u32, op: u32) -> Self {
        Self {
            src_factor,
            dst_factor,
            op,
        }
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::ADDITIVE
    }
}

/// Immutable grouping key for particles sharing GPU state.
///
/// Equality and ordering are structural. The derived order compares, in
/// sequence: render layer, sprite (untextured first), blend source factor,
/// blend destination factor, blend op, and scope (unscoped first). Iterating
/// types in this order groups batches by layer and keeps texture and blend
/// switches to a minimum within a layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleType {
    layer: RenderLayer,
    sprite: Option<SpriteId>,
    blend: BlendState,
    scope: Option<ScopeId>,
}

impl ParticleType {
    /// Create a new particle type.
    pub fn new(
        sprite: Option<SpriteId>,
        blend: BlendState,
        layer: RenderLayer,
        scope: Option<ScopeId>,
    ) -> Self {
        Self {
            layer,
            sprite,
            blend,
            scope,
        }
    }

    /// Texture sampled by this batch, or `None` for the built-in particle.
    pub fn sprite(&self) -> Option<SpriteId> {
        self.sprite
    }

    /// Blend equation for this batch.
    pub fn blend(&self) -> BlendState {
        self.blend
    }

    /// Layer this batch is drawn on.
    pub fn layer(&self) -> RenderLayer {
        self.layer
    }

    /// Location scope, if the batch is only visible in one location.
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(layer: u16, sprite: Option<u32>, blend: BlendState, scope: Option<u64>) -> ParticleType {
        ParticleType::new(
            sprite.map(SpriteId),
            blend,
            RenderLayer(layer),
            scope.map(ScopeId),
        )
    }

    #[test]
    fn layer_dominates_ordering() {
        let low = ty(0, Some(9), BlendState::ALPHA, Some(4));
        let high = ty(1, None, BlendState::ADDITIVE, None);
        assert!(low < high);
    }

    #[test]
    fn untextured_sorts_before_textured() {
        let plain = ty(0, None, BlendState::ALPHA, None);
        let textured = ty(0, Some(0), BlendState::ADDITIVE, None);
        assert!(plain < textured);
    }

    #[test]
    fn sprite_sorts_before_blend() {
        let a = ty(0, Some(1), BlendState::ALPHA, None);
        let b = ty(0, Some(2), BlendState::ADDITIVE, None);
        assert!(a < b);
    }

    #[test]
    fn blend_fields_break_ties_in_order() {
        let a = ty(0, None, BlendState::new(1, 5, 5), None);
        let b = ty(0, None, BlendState::new(2, 0, 0), None);
        let c = ty(0, None, BlendState::new(2, 1, 0), None);
        let d = ty(0, None, BlendState::new(2, 1, 1), None);
        assert!(a < b && b < c && c < d);
    }

    #[test]
    fn unscoped_sorts_first_and_equality_is_structural() {
        let unscoped = ty(0, None, BlendState::ADDITIVE, None);
        let scoped = ty(0, None, BlendState::ADDITIVE, Some(0));
        assert!(unscoped < scoped);
        assert_eq!(scoped, ty(0, None, BlendState::ADDITIVE, Some(0)));
    }

    #[test]
    fn default_blend_is_additive() {
        assert_eq!(BlendState::default(), BlendState::ADDITIVE);
    }
}
