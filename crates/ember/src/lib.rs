//! Ember: batched particle buffers for large numbers of short-lived particles.
//!
//! This is the facade crate re-exporting the public API of the Ember
//! sub-crates. For most users, adding `ember` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use ember::prelude::*;
//!
//! let mut domain = SimulationDomain::headless(EngineConfig::default()).unwrap();
//!
//! // Every particle lives for two seconds and records its index.
//! let mut sparks = SimpleEmitter::new([0.0, 0.0], |i, _init, record: &mut [f32]| {
//!     record[0] = i as f32;
//!     2.0
//! });
//! let outcome = domain.burst(&mut sparks, 16);
//! assert_eq!(outcome, BurstOutcome::Generated { particles: 16 });
//!
//! // One draw batch per particle type.
//! let batch = domain.draw_batches().next().unwrap();
//! assert_eq!(batch.instance_count, 16);
//!
//! // Death time plus the destruction delay reclaims the cluster.
//! domain.advance(5.0);
//! assert_eq!(domain.particle_count(), 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `ember-core` | IDs, `ParticleType`, `RecordLayout`, emitter traits |
//! | [`arena`] | `ember-arena` | Buffer protocol, cluster arena, `ParticleAllocator` |
//! | [`engine`] | `ember-engine` | `SimulationDomain`, scheduler, tracking table, streams |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`ember-core`).
pub use ember_core as types;

/// Buffers, clusters and allocators (`ember-arena`).
///
/// Implement [`arena::ParticleBuffer`] and [`arena::BufferDevice`] to back
/// allocators with GPU memory; [`arena::HostDevice`] keeps them in host
/// memory.
pub use ember_arena as arena;

/// Simulation domains (`ember-engine`).
///
/// [`engine::SimulationDomain`] drives allocators, streams and the
/// tracking table from one clock.
pub use ember_engine as engine;

/// Common imports for typical Ember usage.
///
/// ```rust
/// use ember::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use ember_core::{
        AnchorId, BlendState, Emitter, ParticleInit, ParticleType, RecordLayout, RenderLayer,
        SimTime, SimpleEmitter, SpriteId, StreamId, TrackedEmitter, Viewport, Visibility,
    };

    // Arena
    pub use ember_arena::{AllocatorConfig, BufferDevice, HostDevice, ParticleBuffer};

    // Engine
    pub use ember_engine::{
        BurstOutcome, DomainMetrics, EngineConfig, SimulationDomain, StreamSpec,
    };
}
