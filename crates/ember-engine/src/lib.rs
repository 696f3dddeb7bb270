//! Simulation domain for the Ember particle engine.
//!
//! A [`SimulationDomain`] ties one simulation clock to the per-type
//! [`ParticleAllocator`](ember_arena::ParticleAllocator)s, a
//! [`DeferredQueue`] of time-ordered actions, repeating
//! [`ParticleStream`]s, and the [`EmitterBufferHandler`] that exposes
//! moving emitters to the GPU.
//!
//! Everything is single-threaded and tick-driven: all mutation happens
//! inside [`SimulationDomain::advance`] or an explicit burst call, never
//! while a buffer is bound for drawing.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod metrics;
pub mod scheduler;
pub mod stream;
pub mod tracking;

pub use config::{ConfigError, EngineConfig};
pub use domain::{AllocatorId, BurstOutcome, Callback, DeferredAction, DrawBatch, SimulationDomain};
pub use metrics::DomainMetrics;
pub use scheduler::DeferredQueue;
pub use stream::{BeforeGenerating, ParticleStream, StreamSpec, WhenFinished};
pub use tracking::{EmitterBufferHandler, FLOATS_PER_SLOT};
