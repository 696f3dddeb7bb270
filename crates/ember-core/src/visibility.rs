//! Visibility predicates used to cull emitters before generation.

/// Opaque predicate deciding whether an emitter is worth generating for.
///
/// Emitters consult it with their own location and render radius; an
/// emitter that is not visible produces no records at all.
pub trait Visibility {
    /// Whether a circle of `radius` centred on `location` may be on screen.
    fn is_visible(&self, location: [f32; 2], radius: f32) -> bool;
}

/// Accepts every emitter.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysVisible;

impl Visibility for AlwaysVisible {
    fn is_visible(&self, _location: [f32; 2], _radius: f32) -> bool {
        true
    }
}

/// Axis-aligned view rectangle in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Lower-left corner.
    pub min: [f32; 2],
    /// Upper-right corner.
    pub max: [f32; 2],
}

impl Viewport {
    /// Create a viewport from its lower-left corner and size.
    pub fn from_origin_size(origin: [f32; 2], size: [f32; 2]) -> Self {
        Self {
            min: origin,
            max: [origin[0] + size[0], origin[1] + size[1]],
        }
    }
}

impl Visibility for Viewport {
    fn is_visible(&self, location: [f32; 2], radius: f32) -> bool {
        location[0] >= self.min[0] - radius
            && location[0] <= self.max[0] + radius
            && location[1] >= self.min[1] - radius
            && location[1] <= self.max[1] + radius
    }
}
