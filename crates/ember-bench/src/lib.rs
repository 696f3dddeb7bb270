//! Benchmark profiles and utilities for the Ember particle engine.
//!
//! - [`bench_config`]: default-layout allocator config with a small
//!   initial buffer, so benchmarks exercise growth.
//! - [`records`]: a record block of `particles` particles.
//! - [`churn`]: a domain loaded with overlapping short-lived bursts.
//! - [`FixedAnchor`]: a stationary tracked emitter.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use ember_arena::AllocatorConfig;
use ember_core::{AnchorId, SimpleEmitter, TrackedEmitter};
use ember_engine::{EngineConfig, SimulationDomain};

/// Floats per particle of the default record layout.
pub const FLOATS_PER_PARTICLE: usize = 39;

/// Allocator config with the default layout and a 4096-float start.
pub fn bench_config() -> AllocatorConfig {
    AllocatorConfig::new(FLOATS_PER_PARTICLE)
}

/// A block of `particles` default-layout records.
pub fn records(particles: usize) -> Vec<f32> {
    vec![0.5; particles * FLOATS_PER_PARTICLE]
}

/// Domain after `bursts` bursts of `per_burst` particles, one every
/// 1/60 s, with lifetimes cycling through 0.5 to 2.5 s.
pub fn churn(bursts: usize, per_burst: usize) -> SimulationDomain {
    let mut domain = match SimulationDomain::headless(EngineConfig::new(bench_config())) {
        Ok(domain) => domain,
        Err(e) => panic!("bench config must be valid: {e}"),
    };
    for i in 0..bursts {
        let lifetime = 0.5 + (i % 5) as f32 * 0.5;
        let mut emitter = SimpleEmitter::new([0.0, 0.0], move |_, _, record: &mut [f32]| {
            record[0] = 1.0;
            lifetime
        });
        domain.burst(&mut emitter, per_burst);
        domain.advance(1.0 / 60.0);
    }
    domain
}

/// Tracked emitter that never moves.
pub struct FixedAnchor(pub u64);

impl TrackedEmitter for FixedAnchor {
    fn anchor_id(&self) -> AnchorId {
        AnchorId(self.0)
    }

    fn location(&self) -> [f32; 2] {
        [self.0 as f32, 0.0]
    }
}
