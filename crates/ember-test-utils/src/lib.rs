//! Test utilities and mock types for Ember development.
//!
//! Provides mock emitters ([`CountingEmitter`], [`MovingAnchor`]), a
//! fault-injecting buffer device ([`FaultyDevice`]), an allocator invariant
//! check, and a logging bootstrap for tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{DeviceState, FaultyBuffer, FaultyDevice};

use std::cell::Cell;
use std::rc::Rc;

use ember_arena::{ParticleAllocator, ParticleBuffer};
use ember_core::{
    AnchorId, BlendState, Emitter, ParticleInit, RenderLayer, SpriteId, TrackedEmitter,
};

/// Install `env_logger` for the current test binary.
///
/// Safe to call from every test; only the first call installs the logger.
/// Output is captured per test and filtered by `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Emitter producing records `[index, start_time, tracking_value, 0, ...]`
/// with a fixed lifetime, counting how many particles it initialised.
pub struct CountingEmitter {
    pub location: [f32; 2],
    pub lifetime: f32,
    pub sprite: Option<SpriteId>,
    pub blend: BlendState,
    pub layer: RenderLayer,
    pub anchor: Option<Rc<dyn TrackedEmitter>>,
    pub initialised: usize,
}

impl CountingEmitter {
    pub fn new(lifetime: f32) -> Self {
        Self {
            location: [0.0, 0.0],
            lifetime,
            sprite: None,
            blend: BlendState::ADDITIVE,
            layer: RenderLayer::default(),
            anchor: None,
            initialised: 0,
        }
    }

    pub fn with_layer(mut self, layer: u16) -> Self {
        self.layer = RenderLayer(layer);
        self
    }

    pub fn with_sprite(mut self, sprite: u32) -> Self {
        self.sprite = Some(SpriteId(sprite));
        self
    }

    pub fn with_anchor(mut self, anchor: Rc<dyn TrackedEmitter>) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

impl Emitter for CountingEmitter {
    fn location(&self) -> [f32; 2] {
        self.location
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

    fn anchor(&self) -> Option<Rc<dyn TrackedEmitter>> {
        self.anchor.clone()
    }

    fn init_particle(&mut self, index: usize, init: &ParticleInit, record: &mut [f32]) -> f32 {
        let values = [index as f32, init.start_time, init.tracking_value()];
        for (dst, src) in record.iter_mut().zip(values) {
            *dst = src;
        }
        self.initialised += 1;
        self.lifetime
    }
}

/// Tracked emitter whose position can be moved through a shared reference.
#[derive(Debug)]
pub struct MovingAnchor {
    id: AnchorId,
    location: Cell<[f32; 2]>,
    x_dir: Cell<f32>,
}

impl MovingAnchor {
    pub fn new(id: u64) -> Rc<Self> {
        Rc::new(Self {
            id: AnchorId(id),
            location: Cell::new([0.0, 0.0]),
            x_dir: Cell::new(0.0),
        })
    }

    pub fn move_to(&self, location: [f32; 2]) {
        self.location.set(location);
    }

    pub fn face(&self, degrees: f32) {
        self.x_dir.set(degrees);
    }
}

impl TrackedEmitter for MovingAnchor {
    fn anchor_id(&self) -> AnchorId {
        self.id
    }

    fn location(&self) -> [f32; 2] {
        self.location.get()
    }

    fn x_dir(&self) -> f32 {
        self.x_dir.get()
    }
}

/// Panic unless the allocator's cluster set is sorted, non-overlapping,
/// consistent with its particle count, and its buffer size is a permitted
/// power of two.
pub fn assert_allocator_invariants<B: ParticleBuffer>(alloc: &ParticleAllocator<B>) {
    let config = alloc.config();
    let mut cursor = 0;
    let mut total = 0;
    for (id, entry) in alloc.clusters().iter() {
        assert!(
            entry.offset >= cursor,
            "{id} at offset {} overlaps the previous cluster ending at {cursor}",
            entry.offset
        );
        cursor = entry.end();
        total += entry.size_in_floats;
    }
    assert!(cursor <= alloc.buffer_position());
    assert_eq!(total, alloc.particle_count() * config.floats_per_particle);
    assert!(alloc.buffer_position() <= alloc.buffer_size());
    assert!(alloc.buffer_size().is_power_of_two());
    assert!(alloc.buffer_size() >= config.initial_buffer_size);
    assert!(alloc.buffer_size() <= config.max_buffer_size);
}
