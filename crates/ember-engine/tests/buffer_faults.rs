//! Integration tests: buffer failures degrade to dropped particles.
//!
//! A failed map, resize or buffer creation must never panic. The affected
//! allocator is reset to empty, its buffer released, and later deaths that
//! still reference it become no-ops.

use ember_arena::AllocatorConfig;
use ember_core::{AnchorId, Emitter};
use ember_engine::{BurstOutcome, EngineConfig, SimulationDomain};
use ember_test_utils::{init_logging, CountingEmitter, FaultyDevice, MovingAnchor};

fn config(allocator: AllocatorConfig) -> EngineConfig {
    EngineConfig::new(allocator)
}

#[test]
fn map_failure_during_compaction_resets_allocator() {
    init_logging();
    let device = FaultyDevice::new();
    let state = device.state();
    let mut domain = SimulationDomain::new(
        config(AllocatorConfig {
            initial_buffer_size: 64,
            refactor_fill_fraction: 1.0,
            max_coalesce_floats: 0,
            ..AllocatorConfig::new(4)
        }),
        device,
    )
    .unwrap();

    let mut short = CountingEmitter::new(1.0);
    let mut long = CountingEmitter::new(50.0);
    domain.burst(&mut short, 2);
    domain.burst(&mut long, 2);
    assert_eq!(domain.particle_count(), 4);

    state.fail_next_map();
    domain.advance(4.0);

    assert_eq!(domain.particle_count(), 0);
    assert!(domain.allocator(&short.particle_type()).is_none());
    assert_eq!(state.live_buffers(), 0);
    let metrics = domain.metrics();
    assert_eq!(metrics.buffer_failures, 1);
    assert_eq!(metrics.retirements, 1);

    // The long-lived cluster's death now targets a retired allocator.
    domain.burst(&mut short, 1);
    domain.advance(60.0);
    assert_eq!(domain.particle_count(), 0);
    assert_eq!(state.created(), 2);
}

#[test]
fn resize_failure_during_growth_drops_burst() {
    init_logging();
    let device = FaultyDevice::new();
    let state = device.state();
    let mut domain = SimulationDomain::new(
        config(AllocatorConfig {
            initial_buffer_size: 64,
            ..AllocatorConfig::new(4)
        }),
        device,
    )
    .unwrap();
    let mut emitter = CountingEmitter::new(5.0);

    state.fail_next_reallocate();
    assert_eq!(domain.burst(&mut emitter, 20), BurstOutcome::Dropped);
    assert_eq!(domain.particle_count(), 0);
    assert_eq!(state.live_buffers(), 0);

    assert_eq!(
        domain.burst(&mut emitter, 20),
        BurstOutcome::Generated { particles: 20 }
    );
    assert_eq!(domain.metrics().growths, 1);
}

#[test]
fn buffer_creation_failure_drops_burst() {
    init_logging();
    let device = FaultyDevice::new();
    let state = device.state();
    let mut domain = SimulationDomain::new(EngineConfig::default(), device).unwrap();
    let mut emitter = CountingEmitter::new(5.0);

    state.fail_next_create();
    let outcome = domain.burst(&mut emitter, 3);
    assert_eq!(outcome, BurstOutcome::Dropped);
    assert!(!outcome.is_success());
    assert_eq!(domain.metrics().buffer_failures, 1);
    assert_eq!(domain.pending_actions(), 0);
}

#[test]
fn dropped_anchored_burst_does_not_extend_tracking() {
    init_logging();
    let device = FaultyDevice::new();
    let state = device.state();
    let mut domain = SimulationDomain::new(EngineConfig::default(), device).unwrap();
    let mut emitter = CountingEmitter::new(5.0).with_anchor(MovingAnchor::new(3));

    state.fail_next_create();
    assert_eq!(domain.burst(&mut emitter, 3), BurstOutcome::Dropped);
    let slot = domain.tracker().slot_of(AnchorId(3)).unwrap();
    assert_eq!(domain.tracker().staleness(slot), Some(0.0));

    domain.advance(0.1);
    assert!(domain.tracker().is_empty());
}

#[test]
fn dropping_domain_releases_every_buffer() {
    init_logging();
    let device = FaultyDevice::new();
    let state = device.state();
    {
        let mut domain = SimulationDomain::new(EngineConfig::default(), device).unwrap();
        let mut a = CountingEmitter::new(10.0);
        let mut b = CountingEmitter::new(10.0).with_sprite(4);
        let mut c = CountingEmitter::new(10.0).with_layer(2);
        domain.burst(&mut a, 1);
        domain.burst(&mut b, 1);
        domain.burst(&mut c, 1);
        assert_eq!(state.live_buffers(), 3);
    }
    assert_eq!(state.live_buffers(), 0);
    assert_eq!(state.released(), 3);
}
