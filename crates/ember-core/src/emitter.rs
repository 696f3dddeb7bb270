//! Emitter capability traits.
//!
//! An emitter is anything that can describe where its particles come from,
//! which render state they need, and how to fill one particle record. The
//! engine never inspects record contents: it asks an [`Emitter`] to
//! [`generate`](Emitter::generate) a flat block of records and then manages
//! that block's storage and lifetime.
//!
//! Emitters whose particles should follow them after generation expose a
//! [`TrackedEmitter`] through [`Emitter::anchor`]. The engine copies the
//! anchor's live position into a bounded tracking table every frame and
//! hands the emitter the slot index to embed in its records.

use std::rc::Rc;

use crate::id::{AnchorId, RenderLayer, ScopeId, SimTime, SpriteId};
use crate::particle_type::{BlendState, ParticleType};
use crate::visibility::Visibility;

/// Render radius used when an emitter does not override it.
pub const DEFAULT_RENDER_RADIUS: f32 = 500.0;

/// Parameters of one generation request.
pub struct GenerateRequest<'a> {
    /// Number of particles to generate.
    pub count: usize,
    /// Index of the first particle, counted across a stream's bursts.
    pub start_index: usize,
    /// Simulation time at generation.
    pub start_time: SimTime,
    /// Floats per particle record.
    pub floats_per_particle: usize,
    /// Tracking slot assigned to the emitter's anchor, if any.
    pub tracking_slot: Option<u32>,
    /// Culling predicate for this frame.
    pub visibility: &'a dyn Visibility,
}

/// Per-particle context handed to [`Emitter::init_particle`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleInit {
    /// Simulation time at generation.
    pub start_time: SimTime,
    /// Tracking slot the particle should follow, if any.
    pub tracking_slot: Option<u32>,
}

impl ParticleInit {
    /// The tracking slot encoded as a record float: the slot index, or `-1.0`.
    pub fn tracking_value(&self) -> f32 {
        self.tracking_slot.map_or(-1.0, |slot| slot as f32)
    }
}

/// Records produced by a successful generation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedRecords {
    /// Flat record data, `count * floats_per_particle` floats.
    pub records: Vec<f32>,
    /// Longest lifetime of any generated particle, in seconds.
    pub max_lifetime: f32,
}

/// A live position the tracking table can follow.
///
/// Methods take `&self`: hosts that move the emitter typically keep the
/// position in a `Cell` and share the anchor through an `Rc`.
pub trait TrackedEmitter {
    /// Stable identity of this anchor.
    fn anchor_id(&self) -> AnchorId;

    /// Current world-space location.
    fn location(&self) -> [f32; 2];

    /// Current facing of the emitter's x-axis, in degrees.
    fn x_dir(&self) -> f32 {
        0.0
    }

    /// Per-emitter flag forwarded to the GPU alongside the transform.
    fn render_flag(&self) -> f32 {
        0.0
    }
}

impl<T: TrackedEmitter + ?Sized> TrackedEmitter for Rc<T> {
    fn anchor_id(&self) -> AnchorId {
        (**self).anchor_id()
    }

    fn location(&self) -> [f32; 2] {
        (**self).location()
    }

    fn x_dir(&self) -> f32 {
        (**self).x_dir()
    }

    fn render_flag(&self) -> f32 {
        (**self).render_flag()
    }
}

/// Capability interface for anything that produces particle records.
///
/// Only [`location`](Emitter::location) and
/// [`init_particle`](Emitter::init_particle) are required; every render-state
/// accessor has a default matching the common case (untextured, additive,
/// default layer, unscoped).
pub trait Emitter {
    /// World-space location, used for culling.
    fn location(&self) -> [f32; 2];

    /// Facing of the emitter's x-axis, in degrees.
    fn x_dir(&self) -> f32 {
        0.0
    }

    /// Texture sampled by the particles, or `None` for the built-in particle.
    fn sprite(&self) -> Option<SpriteId> {
        None
    }

    /// Blend equation for the particles.
    fn blend_state(&self) -> BlendState {
        BlendState::ADDITIVE
    }

    /// Layer the particles are drawn on.
    fn render_layer(&self) -> RenderLayer {
        RenderLayer::default()
    }

    /// Location scope the particles are restricted to.
    fn scope(&self) -> Option<ScopeId> {
        None
    }

    /// Distance beyond the visible area at which the emitter is culled.
    fn render_radius(&self) -> f32 {
        DEFAULT_RENDER_RADIUS
    }

    /// Live anchor the particles follow after generation, if any.
    fn anchor(&self) -> Option<Rc<dyn TrackedEmitter>> {
        None
    }

    /// Called once before a batch of `count` particles starting at `start`
    /// is initialised. Returning `false` skips the batch.
    fn pre_init(&mut self, _start: usize, _count: usize) -> bool {
        true
    }

    /// Fill one particle record and return that particle's lifetime.
    ///
    /// `record` is exactly `floats_per_particle` floats, zero-initialised.
    fn init_particle(&mut self, index: usize, init: &ParticleInit, record: &mut [f32]) -> f32;

    /// The batching key for particles from this emitter.
    fn particle_type(&self) -> ParticleType {
        ParticleType::new(
            self.sprite(),
            self.blend_state(),
            self.render_layer(),
            self.scope(),
        )
    }

    /// Produce `request.count` records, or `None` if the emitter is culled
    /// or the record block would overflow `usize`.
    fn generate(&mut self, request: &GenerateRequest<'_>) -> Option<GeneratedRecords> {
        let width = request.floats_per_particle;
        if width == 0 {
            return None;
        }
        if !request
            .visibility
            .is_visible(self.location(), self.render_radius())
        {
            return None;
        }
        if !self.pre_init(request.start_index, request.count) {
            return None;
        }

        let len = request.count.checked_mul(width)?;
        let init = ParticleInit {
            start_time: request.start_time,
            tracking_slot: request.tracking_slot,
        };
        let mut records = vec![0.0; len];
        let mut max_lifetime = 0.0f32;
        for (i, record) in records.chunks_exact_mut(width).enumerate() {
            let life = self.init_particle(request.start_index + i, &init, record);
            max_lifetime = max_lifetime.max(life);
        }
        Some(GeneratedRecords {
            records,
            max_lifetime,
        })
    }
}

impl<E: Emitter + ?Sized> Emitter for Box<E> {
    fn location(&self) -> [f32; 2] {
        (**self).location()
    }

    fn x_dir(&self) -> f32 {
        (**self).x_dir()
    }

    fn sprite(&self) -> Option<SpriteId> {
        (**self).sprite()
    }

    fn blend_state(&self) -> BlendState {
        (**self).blend_state()
    }

    fn render_layer(&self) -> RenderLayer {
        (**self).render_layer()
    }

    fn scope(&self) -> Option<ScopeId> {
        (**self).scope()
    }

    fn render_radius(&self) -> f32 {
        (**self).render_radius()
    }

    fn anchor(&self) -> Option<Rc<dyn TrackedEmitter>> {
        (**self).anchor()
    }

    fn pre_init(&mut self, start: usize, count: usize) -> bool {
        (**self).pre_init(start, count)
    }

    fn init_particle(&mut self, index: usize, init: &ParticleInit, record: &mut [f32]) -> f32 {
        (**self).init_particle(index, init, record)
    }

    fn generate(&mut self, request: &GenerateRequest<'_>) -> Option<GeneratedRecords> {
        (**self).generate(request)
    }
}

/// Default-valued emitter built around an initialisation closure.
///
/// ```
/// use ember_core::{BlendState, Emitter, SimpleEmitter, SpriteId};
///
/// let emitter = SimpleEmitter::new([10.0, 20.0], |_i, init, record: &mut [f32]| {
///     record[0] = init.start_time;
///     2.5
/// })
/// .with_sprite(SpriteId(3))
/// .with_blend(BlendState::ALPHA);
/// assert_eq!(emitter.sprite(), Some(SpriteId(3)));
/// ```
pub struct SimpleEmitter<F> {
    location: [f32; 2],
    x_dir: f32,
    sprite: Option<SpriteId>,
    blend: BlendState,
    layer: RenderLayer,
    scope: Option<ScopeId>,
    render_radius: f32,
    anchor: Option<Rc<dyn TrackedEmitter>>,
    init: F,
}

impl<F> SimpleEmitter<F>
where
    F: FnMut(usize, &ParticleInit, &mut [f32]) -> f32,
{
    /// Create an emitter at `location` with default render state.
    pub fn new(location: [f32; 2], init: F) -> Self {
        Self {
            location,
            x_dir: 0.0,
            sprite: None,
            blend: BlendState::ADDITIVE,
            layer: RenderLayer::default(),
            scope: None,
            render_radius: DEFAULT_RENDER_RADIUS,
            anchor: None,
            init,
        }
    }

    /// Move the emitter.
    pub fn set_location(&mut self, location: [f32; 2]) {
        self.location = location;
    }

    /// Set the facing, in degrees.
    pub fn with_x_dir(mut self, x_dir: f32) -> Self {
        self.x_dir = x_dir;
        self
    }

    /// Sample `sprite` instead of the built-in particle.
    pub fn with_sprite(mut self, sprite: SpriteId) -> Self {
        self.sprite = Some(sprite);
        self
    }

    /// Use `blend` instead of additive blending.
    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = blend;
        self
    }

    /// Draw on `layer`.
    pub fn with_layer(mut self, layer: RenderLayer) -> Self {
        self.layer = layer;
        self
    }

    /// Restrict the particles to `scope`.
    pub fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Override the culling radius.
    pub fn with_render_radius(mut self, radius: f32) -> Self {
        self.render_radius = radius;
        self
    }

    /// Make the particles follow `anchor` after generation.
    pub fn with_anchor(mut self, anchor: Rc<dyn TrackedEmitter>) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

impl<F> Emitter for SimpleEmitter<F>
where
    F: FnMut(usize, &ParticleInit, &mut [f32]) -> f32,
{
    fn location(&self) -> [f32; 2] {
        match &self.anchor {
            Some(anchor) => anchor.location(),
            None => self.location,
        }
    }

    fn x_dir(&self) -> f32 {
        self.x_dir
    }

    fn sprite(&self) -> Option<SpriteId> {
        self.sprite
    }

    fn blend_state(&self) -> BlendState {
        self.blend
    }

    fn render_layer(&self) -> RenderLayer {
        self.layer
    }

    fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    fn render_radius(&self) -> f32 {
        self.render_radius
    }

    fn anchor(&self) -> Option<Rc<dyn TrackedEmitter>> {
        self.anchor.clone()
    }

    fn init_particle(&mut self, index: usize, init: &ParticleInit, record: &mut [f32]) -> f32 {
        (self.init)(index, init, record)
    }
}
