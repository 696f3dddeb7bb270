//! Growable particle buffers with cluster coalescing and compaction.
//!
//! One [`ParticleAllocator`] owns the buffer for one
//! [`ParticleType`](ember_core::ParticleType). Particles are appended in
//! clusters: contiguous runs of records that die together. The allocator
//! grows its buffer in powers of two, merges adjacent clusters with
//! compatible lifetimes, and compacts the buffer once deaths have thinned
//! it out.
//!
//! # Architecture
//!
//! ```text
//! ParticleAllocator<B: ParticleBuffer>
//! ├── B (power-of-two float buffer, append cursor = buffer_position)
//! └── ClusterArena
//!     ├── slots: Vec<Slot>          (entries addressed by generational ClusterId)
//!     └── by_offset: BTreeMap       (offset → ClusterId, rebuilt on compaction)
//! ```
//!
//! Buffers are reached only through the [`ParticleBuffer`] trait, an explicit
//! write / map / reallocate protocol where every step returns `Result`. A
//! failed map or reallocation resets the allocator to empty instead of
//! propagating a crash. [`HostDevice`] provides an in-memory implementation.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod allocator;
pub mod buffer;
pub mod cluster;
pub mod config;
pub mod error;

pub use allocator::{Allocation, AllocatorStats, DeathOutcome, ParticleAllocator};
pub use buffer::{BufferDevice, HostBuffer, HostDevice, ParticleBuffer};
pub use cluster::{ClusterArena, ClusterEntry, ClusterId};
pub use config::AllocatorConfig;
pub use error::{ArenaError, BufferError};
