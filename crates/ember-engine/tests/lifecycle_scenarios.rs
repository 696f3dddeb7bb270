//! Integration tests: allocator lifecycle driven through a domain.
//!
//! Each test exercises one end-to-end behaviour: deaths firing exactly once,
//! coalescing, compaction, growth, and the tracking table under pressure.

use ember_arena::AllocatorConfig;
use ember_core::{AnchorId, Emitter, Viewport};
use ember_engine::{BurstOutcome, EngineConfig, SimulationDomain, FLOATS_PER_SLOT};
use ember_test_utils::{assert_allocator_invariants, init_logging, CountingEmitter, MovingAnchor};

fn domain(allocator: AllocatorConfig) -> SimulationDomain {
    init_logging();
    SimulationDomain::headless(EngineConfig::new(allocator)).unwrap()
}

fn small(fpp: usize) -> AllocatorConfig {
    AllocatorConfig {
        initial_buffer_size: 256,
        ..AllocatorConfig::new(fpp)
    }
}

// ── Deaths ───────────────────────────────────────────────────────────

#[test]
fn cluster_death_fires_exactly_once() {
    let mut domain = domain(small(4));
    let mut short = CountingEmitter::new(5.0);
    let mut long = CountingEmitter::new(100.0);
    let ty = short.particle_type();

    assert_eq!(
        domain.burst(&mut short, 10),
        BurstOutcome::Generated { particles: 10 }
    );
    domain.burst(&mut long, 3);
    assert_eq!(domain.allocator(&ty).unwrap().clusters().len(), 2);

    domain.advance(7.5);
    assert_eq!(domain.particle_count(), 13);

    // Death time 5 plus the 3 s destruction delay.
    domain.advance(0.5);
    assert_eq!(domain.particle_count(), 3);

    for _ in 0..10 {
        domain.advance(1.0);
        assert_eq!(domain.particle_count(), 3);
    }
    assert_allocator_invariants(domain.allocator(&ty).unwrap());
}

// ── Coalescing ───────────────────────────────────────────────────────

#[test]
fn compatible_bursts_coalesce_into_one_cluster() {
    let fpp = 6;
    let mut domain = domain(small(fpp));
    let mut first = CountingEmitter::new(5.0);
    let mut second = CountingEmitter::new(5.0);

    domain.burst(&mut first, 10);
    domain.burst(&mut second, 4);

    let alloc = domain.allocator(&first.particle_type()).unwrap();
    let entries: Vec<_> = alloc.clusters().iter().map(|(_, e)| *e).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].size_in_floats, 14 * fpp);
    assert_eq!(domain.metrics().merges, 1);
    // Only the first cluster's death is scheduled.
    assert_eq!(domain.pending_actions(), 1);

    domain.advance(8.0);
    assert_eq!(domain.particle_count(), 0);
}

#[test]
fn merged_cluster_lives_until_latest_member_dies() {
    let mut domain = domain(small(4));
    let mut early = CountingEmitter::new(2.0);
    let mut later = CountingEmitter::new(4.0);

    domain.burst(&mut early, 2);
    domain.burst(&mut later, 2);
    assert_eq!(domain.metrics().live_clusters, 1);

    // First death action fires at 5 but the merged run dies at 4 + 3.
    domain.advance(5.0);
    assert_eq!(domain.particle_count(), 4);
    domain.advance(2.0);
    assert_eq!(domain.particle_count(), 0);
    assert_eq!(domain.pending_actions(), 0);
}

// ── Compaction ───────────────────────────────────────────────────────

#[test]
fn killing_middle_cluster_compacts_and_shrinks() {
    let fpp = 5;
    let mut domain = domain(AllocatorConfig {
        initial_buffer_size: 256,
        refactor_fill_fraction: 0.9,
        max_coalesce_floats: 0,
        ..AllocatorConfig::new(fpp)
    });
    let mut outer = CountingEmitter::new(50.0);
    let mut middle = CountingEmitter::new(5.0);
    let ty = outer.particle_type();

    domain.burst_from(&mut outer, 100, 0);
    domain.burst_from(&mut middle, 50, 0);
    domain.burst_from(&mut outer, 100, 1000);
    assert_eq!(domain.allocator(&ty).unwrap().buffer_size(), 2048);

    domain.advance(8.0);

    let alloc = domain.allocator(&ty).unwrap();
    let offsets: Vec<usize> = alloc.clusters().iter().map(|(_, e)| e.offset).collect();
    assert_eq!(offsets, vec![0, 100 * fpp]);
    assert_eq!(alloc.buffer_position(), 200 * fpp);
    assert_eq!(alloc.buffer_size(), 1024);
    let records = alloc.buffer().as_slice();
    assert_eq!(records[99 * fpp], 99.0);
    assert_eq!(records[100 * fpp], 1000.0);
    assert_eq!(records[199 * fpp], 1099.0);
    assert_eq!(domain.metrics().compactions, 1);
    assert_allocator_invariants(alloc);
}

// ── Growth ───────────────────────────────────────────────────────────

#[test]
fn growth_to_smallest_power_of_two() {
    let mut domain = domain(AllocatorConfig {
        initial_buffer_size: 1024,
        ..AllocatorConfig::new(42)
    });
    let mut emitter = CountingEmitter::new(10.0);
    let ty = emitter.particle_type();

    domain.burst(&mut emitter, 30);
    assert_eq!(domain.allocator(&ty).unwrap().buffer_size(), 2048);

    domain.burst(&mut emitter, 5);
    let alloc = domain.allocator(&ty).unwrap();
    assert_eq!(alloc.buffer_position(), 1470);
    assert_eq!(alloc.buffer_size(), 2048);
    assert_eq!(domain.metrics().growths, 1);
}

#[test]
fn oversized_burst_is_dropped_without_writing() {
    let mut domain = domain(AllocatorConfig {
        initial_buffer_size: 16,
        max_buffer_size: 64,
        ..AllocatorConfig::new(4)
    });
    let mut emitter = CountingEmitter::new(10.0);
    assert_eq!(domain.burst(&mut emitter, 20), BurstOutcome::Dropped);
    assert_eq!(domain.particle_count(), 0);
    let metrics = domain.metrics();
    assert_eq!(metrics.rejected_allocations, 1);
    assert_eq!(metrics.live_allocators, 0);
    assert_eq!(domain.device().live_buffers(), 0);
}

#[test]
fn burst_too_large_to_size_is_dropped() {
    let mut domain = domain(AllocatorConfig {
        initial_buffer_size: 16,
        max_buffer_size: 64,
        ..AllocatorConfig::new(4)
    });
    let mut emitter = CountingEmitter::new(1.0);
    assert_eq!(
        domain.burst(&mut emitter, usize::MAX / 2),
        BurstOutcome::Dropped
    );
    assert_eq!(emitter.initialised, 0);
    assert_eq!(domain.metrics().rejected_allocations, 1);
    assert_eq!(domain.device().live_buffers(), 0);

    // A burst that would push a live buffer past its maximum is dropped
    // before any record is generated.
    assert_eq!(
        domain.burst(&mut emitter, 10),
        BurstOutcome::Generated { particles: 10 }
    );
    assert_eq!(domain.burst(&mut emitter, 8), BurstOutcome::Dropped);
    assert_eq!(emitter.initialised, 10);
    assert_eq!(domain.particle_count(), 10);
    assert_eq!(domain.metrics().rejected_allocations, 2);
}

// ── Tracking ─────────────────────────────────────────────────────────

#[test]
fn stalest_tracked_emitter_evicted_first() {
    init_logging();
    let config = EngineConfig {
        tracking_capacity: 4,
        ..EngineConfig::new(small(4))
    };
    let mut domain = SimulationDomain::headless(config).unwrap();

    for id in 1..=5u64 {
        let mut emitter =
            CountingEmitter::new(id as f32).with_anchor(MovingAnchor::new(id));
        domain.burst(&mut emitter, 1);
        assert!(domain.tracker().len() <= 4);
    }

    let tracker = domain.tracker();
    assert_eq!(tracker.slot_of(AnchorId(1)), None);
    assert!(tracker.slot_of(AnchorId(5)).is_some());
    assert!(tracker.slot_of(AnchorId(4)).is_some());
    assert_eq!(domain.metrics().evictions, 2);
}

#[test]
fn anchored_particles_carry_slot_and_follow_anchor() {
    let mut domain = domain(small(4));
    let anchor = MovingAnchor::new(9);
    let mut tracked = CountingEmitter::new(2.0).with_anchor(anchor.clone());
    let mut plain = CountingEmitter::new(2.0);

    domain.burst(&mut tracked, 1);
    domain.burst(&mut plain, 1);
    let ty = plain.particle_type();
    let records = domain.allocator(&ty).unwrap().buffer().as_slice();
    assert_eq!(records[2], 0.0);
    assert_eq!(records[4 + 2], -1.0);

    anchor.move_to([3.0, 4.0]);
    anchor.face(180.0);
    domain.advance(0.5);
    let tracker = domain.tracker();
    assert_eq!(tracker.upload_range(), 0..FLOATS_PER_SLOT);
    assert_eq!(&tracker.transfer()[..2], &[3.0, 4.0]);
    assert!((tracker.transfer()[2] - std::f32::consts::PI).abs() < 1e-6);

    // The anchor is released once its last particle has died.
    domain.advance(2.0);
    assert!(domain.tracker().is_empty());
    assert_eq!(domain.tracker().upload_range(), 0..0);
}

#[test]
fn culled_anchored_burst_keeps_live_tracked_emitter() {
    init_logging();
    let config = EngineConfig {
        tracking_capacity: 1,
        ..EngineConfig::new(small(4))
    };
    let mut domain = SimulationDomain::headless(config).unwrap();
    domain.set_visibility(Viewport::from_origin_size([0.0, 0.0], [10.0, 10.0]));

    let mut live = CountingEmitter::new(10.0).with_anchor(MovingAnchor::new(1));
    domain.burst(&mut live, 2);
    assert_eq!(domain.tracker().slot_of(AnchorId(1)), Some(0));

    let mut offscreen = CountingEmitter::new(10.0).with_anchor(MovingAnchor::new(2));
    offscreen.location = [5000.0, 0.0];
    assert_eq!(domain.burst(&mut offscreen, 2), BurstOutcome::Culled);

    let tracker = domain.tracker();
    assert_eq!(tracker.slot_of(AnchorId(1)), Some(0));
    assert_eq!(tracker.slot_of(AnchorId(2)), None);
    assert_eq!(domain.metrics().evictions, 0);
}
