//! Core types and traits for the Ember particle engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the allocator and the simulation domain:
//! identifiers, the [`ParticleType`] batching key, the per-particle
//! [`RecordLayout`], and the emitter capability traits through which
//! external configuration code produces particle records.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod emitter;
pub mod error;
pub mod id;
pub mod layout;
pub mod particle_type;
pub mod visibility;

pub use emitter::{
    Emitter, GenerateRequest, GeneratedRecords, ParticleInit, SimpleEmitter, TrackedEmitter,
};
pub use error::LayoutError;
pub use id::{AnchorId, RenderLayer, ScopeId, SimTime, SpriteId, StreamId};
pub use layout::RecordLayout;
pub use particle_type::{BlendState, ParticleType};
pub use visibility::{AlwaysVisible, Viewport, Visibility};
