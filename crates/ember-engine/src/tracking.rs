//! Bounded table of emitters whose live position is exposed to the GPU.
//!
//! Particles that follow a moving emitter store a slot index instead of
//! emitter state. Each frame [`EmitterBufferHandler::update`] copies every
//! tracked emitter's transform into a flat transfer buffer of
//! [`FLOATS_PER_SLOT`] floats per slot, which the render collaborator
//! uploads as a uniform block.
//!
//! Slots are handed out smallest-index-first so the filled set stays dense
//! and the upload range `[0, FLOATS_PER_SLOT * (highest_filled + 1))` stays
//! short. When every slot is taken, the stalest fraction of tracked emitters
//! (ordered by the death time of their last particle) is evicted.

use std::collections::BTreeSet;
use std::ops::Range;

use indexmap::IndexMap;
use smallvec::SmallVec;

use ember_core::{AnchorId, SimTime, TrackedEmitter};

/// Floats written per slot: x, y, x-direction in radians, render flag.
pub const FLOATS_PER_SLOT: usize = 4;

struct Slot<E> {
    emitter: E,
    staleness: SimTime,
}

/// Fixed-capacity slot table for tracked emitters.
///
/// Every index in `[0, capacity)` is either free or filled, never both.
pub struct EmitterBufferHandler<E> {
    slots: Vec<Option<Slot<E>>>,
    free: BTreeSet<usize>,
    by_anchor: IndexMap<AnchorId, usize>,
    transfer: Vec<f32>,
    remove_when_full_fraction: f32,
    evictions: u64,
}

impl<E: TrackedEmitter> EmitterBufferHandler<E> {
    /// Create a table of `capacity` slots (at least one).
    ///
    /// `remove_when_full_fraction` is clamped to `(0, 1]`; at least one slot
    /// is evicted whenever the table is full.
    pub fn new(capacity: usize, remove_when_full_fraction: f32) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).collect(),
            by_anchor: IndexMap::with_capacity(capacity),
            transfer: vec![0.0; capacity * FLOATS_PER_SLOT],
            remove_when_full_fraction: remove_when_full_fraction.clamp(f32::MIN_POSITIVE, 1.0),
            evictions: 0,
        }
    }

    /// Total slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Filled slots.
    pub fn len(&self) -> usize {
        self.by_anchor.len()
    }

    /// Whether no slot is filled.
    pub fn is_empty(&self) -> bool {
        self.by_anchor.is_empty()
    }

    /// Free slots.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Cumulative number of emitters evicted to make room.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Slot currently assigned to `anchor`.
    pub fn slot_of(&self, anchor: AnchorId) -> Option<usize> {
        self.by_anchor.get(&anchor).copied()
    }

    /// Staleness of the emitter in `slot`.
    pub fn staleness(&self, slot: usize) -> Option<SimTime> {
        self.slots.get(slot)?.as_ref().map(|s| s.staleness)
    }

    /// Filled slot indices, in tracking order.
    pub fn filled(&self) -> impl Iterator<Item = usize> + '_ {
        self.by_anchor.values().copied()
    }

    /// Assign a slot to `emitter`, or return its existing slot.
    ///
    /// `staleness` is the death time of the emitter's last particle; an
    /// already-tracked emitter keeps the later of the old and new values.
    /// Evicts the stalest emitters first if the table is full.
    pub fn track(&mut self, emitter: E, staleness: SimTime) -> usize {
        let anchor = emitter.anchor_id();
        if let Some(&index) = self.by_anchor.get(&anchor) {
            if let Some(slot) = self.slots[index].as_mut() {
                slot.staleness = slot.staleness.max(staleness);
                slot.emitter = emitter;
            }
            return index;
        }

        let index = match self.free.pop_first() {
            Some(index) => index,
            None => self.evict(),
        };
        self.slots[index] = Some(Slot { emitter, staleness });
        self.by_anchor.insert(anchor, index);
        index
    }

    /// Push the staleness of a tracked emitter forward to `staleness`.
    ///
    /// Returns `false` if `anchor` is not tracked.
    pub fn refresh(&mut self, anchor: AnchorId, staleness: SimTime) -> bool {
        let Some(&index) = self.by_anchor.get(&anchor) else {
            return false;
        };
        match self.slots[index].as_mut() {
            Some(slot) => {
                slot.staleness = slot.staleness.max(staleness);
                true
            }
            None => false,
        }
    }

    /// Free the slot held by `anchor`.
    pub fn untrack(&mut self, anchor: AnchorId) -> bool {
        match self.by_anchor.swap_remove(&anchor) {
            Some(index) => {
                self.slots[index] = None;
                self.free.insert(index);
                true
            }
            None => false,
        }
    }

    /// Write every tracked transform into the transfer buffer, then free
    /// the slots of emitters whose last particle died before `now`.
    pub fn update(&mut self, now: SimTime) {
        let mut expired: SmallVec<[AnchorId; 16]> = SmallVec::new();
        for (&anchor, &index) in &self.by_anchor {
            let Some(slot) = self.slots[index].as_ref() else {
                continue;
            };
            let [x, y] = slot.emitter.location();
            let base = index * FLOATS_PER_SLOT;
            self.transfer[base] = x;
            self.transfer[base + 1] = y;
            self.transfer[base + 2] = slot.emitter.x_dir().to_radians();
            self.transfer[base + 3] = slot.emitter.render_flag();
            if slot.staleness < now {
                expired.push(anchor);
            }
        }
        for anchor in expired {
            self.untrack(anchor);
        }
        if !self.by_anchor.is_empty() {
            log::trace!("tracking {} emitters", self.by_anchor.len());
        }
    }

    /// Highest filled slot index, or `None` if the table is empty.
    pub fn highest_filled(&self) -> Option<usize> {
        self.by_anchor.values().copied().max()
    }

    /// Float range of the transfer buffer that must be uploaded.
    pub fn upload_range(&self) -> Range<usize> {
        0..self
            .highest_filled()
            .map_or(0, |h| (h + 1) * FLOATS_PER_SLOT)
    }

    /// The whole transfer buffer.
    pub fn transfer(&self) -> &[f32] {
        &self.transfer
    }

    /// Free every slot.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.free = (0..self.slots.len()).collect();
        self.by_anchor.clear();
    }

    /// Evict the stalest `ceil(fraction * filled)` emitters (at least one)
    /// and claim the smallest freed slot.
    fn evict(&mut self) -> usize {
        let mut candidates: SmallVec<[(SimTime, usize, AnchorId); 32]> = self
            .by_anchor
            .iter()
            .filter_map(|(&anchor, &index)| {
                self.slots[index]
                    .as_ref()
                    .map(|slot| (slot.staleness, index, anchor))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let filled = candidates.len();
        let count = ((self.remove_when_full_fraction * filled as f32).ceil() as usize)
            .clamp(1, filled.max(1));
        for &(_, _, anchor) in candidates.iter().take(count) {
            self.untrack(anchor);
        }
        self.evictions += count.min(filled) as u64;
        log::debug!("tracking table full, evicted {count} of {filled} emitters");

        // Capacity is at least one, so a full table always frees a slot.
        self.free.pop_first().unwrap_or(0)
    }
}

impl<E> std::fmt::Debug for EmitterBufferHandler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterBufferHandler")
            .field("capacity", &self.slots.len())
            .field("filled", &self.by_anchor.len())
            .field("evictions", &self.evictions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Anchor {
        id: u64,
        location: Cell<[f32; 2]>,
        x_dir: f32,
    }

    impl TrackedEmitter for Anchor {
        fn anchor_id(&self) -> AnchorId {
            AnchorId(self.id)
        }
        fn location(&self) -> [f32; 2] {
            self.location.get()
        }
        fn x_dir(&self) -> f32 {
            self.x_dir
        }
        fn render_flag(&self) -> f32 {
            1.0
        }
    }

    fn anchor(id: u64) -> Rc<Anchor> {
        Rc::new(Anchor {
            id,
            location: Cell::new([id as f32, 0.0]),
            x_dir: 90.0,
        })
    }

    fn assert_partitioned(handler: &EmitterBufferHandler<Rc<Anchor>>) {
        let filled: BTreeSet<usize> = handler.filled().collect();
        assert_eq!(filled.len(), handler.len());
        assert!(filled.is_disjoint(&handler.free));
        assert_eq!(filled.len() + handler.free.len(), handler.capacity());
    }

    #[test]
    fn assigns_smallest_free_index() {
        let mut h = EmitterBufferHandler::new(8, 0.5);
        assert_eq!(h.track(anchor(1), 1.0), 0);
        assert_eq!(h.track(anchor(2), 1.0), 1);
        assert_eq!(h.track(anchor(3), 1.0), 2);
        assert!(h.untrack(AnchorId(2)));
        assert_eq!(h.track(anchor(4), 1.0), 1);
        assert_partitioned(&h);
    }

    #[test]
    fn tracking_twice_reuses_slot_and_keeps_later_staleness() {
        let mut h = EmitterBufferHandler::new(4, 0.5);
        let a = anchor(7);
        assert_eq!(h.track(a.clone(), 5.0), 0);
        assert_eq!(h.track(a.clone(), 2.0), 0);
        assert_eq!(h.staleness(0), Some(5.0));
        assert!(h.refresh(AnchorId(7), 9.0));
        assert_eq!(h.staleness(0), Some(9.0));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn evicts_stalest_first_when_full() {
        let mut h = EmitterBufferHandler::new(4, 0.5);
        for id in 1..=4 {
            h.track(anchor(id), id as f32);
        }
        let slot = h.track(anchor(5), 5.0);
        assert!(h.len() <= 4);
        assert_eq!(h.slot_of(AnchorId(1)), None);
        assert_eq!(h.slot_of(AnchorId(2)), None);
        assert!(h.slot_of(AnchorId(3)).is_some());
        assert!(h.slot_of(AnchorId(4)).is_some());
        assert_eq!(h.slot_of(AnchorId(5)), Some(slot));
        assert_eq!(slot, 0);
        assert_eq!(h.evictions(), 2);
        assert_partitioned(&h);
    }

    #[test]
    fn eviction_claims_smallest_freed_slot() {
        let mut h = EmitterBufferHandler::new(4, 0.5);
        for (id, staleness) in [(1, 4.0), (2, 3.0), (3, 1.0), (4, 2.0)] {
            h.track(anchor(id), staleness);
        }
        assert_eq!(h.track(anchor(5), 5.0), 2);
        assert_eq!(h.free_count(), 1);
        assert_eq!(h.track(anchor(6), 5.0), 3);
        assert_partitioned(&h);
    }

    #[test]
    fn equally_fresh_full_table_still_makes_progress() {
        let mut h = EmitterBufferHandler::new(1, 0.01);
        h.track(anchor(1), 1.0);
        assert_eq!(h.track(anchor(2), 1.0), 0);
        assert_eq!(h.slot_of(AnchorId(1)), None);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn update_writes_transforms_then_frees_expired() {
        let mut h = EmitterBufferHandler::new(4, 0.5);
        let moving = anchor(1);
        h.track(moving.clone(), 10.0);
        h.track(anchor(2), 1.0);
        moving.location.set([3.0, 4.0]);

        h.update(2.0);
        assert_eq!(&h.transfer()[0..4], &[3.0, 4.0, 90f32.to_radians(), 1.0]);
        assert_eq!(&h.transfer()[4..6], &[2.0, 0.0]);
        assert_eq!(h.slot_of(AnchorId(2)), None);
        assert_eq!(h.slot_of(AnchorId(1)), Some(0));
        assert_partitioned(&h);
    }

    #[test]
    fn staleness_equal_to_now_survives_update() {
        let mut h = EmitterBufferHandler::new(2, 0.5);
        h.track(anchor(1), 2.0);
        h.update(2.0);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn highest_filled_bounds_upload() {
        let mut h = EmitterBufferHandler::new(8, 0.5);
        assert_eq!(h.highest_filled(), None);
        assert_eq!(h.upload_range(), 0..0);
        h.track(anchor(1), 1.0);
        h.track(anchor(2), 1.0);
        h.track(anchor(3), 1.0);
        h.untrack(AnchorId(2));
        assert_eq!(h.highest_filled(), Some(2));
        assert_eq!(h.upload_range(), 0..12);
    }

    #[test]
    fn clear_frees_all() {
        let mut h = EmitterBufferHandler::new(3, 0.5);
        h.track(anchor(1), 1.0);
        h.track(anchor(2), 1.0);
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.free_count(), 3);
        assert_partitioned(&h);
    }

    proptest! {
        #[test]
        fn slots_stay_partitioned(
            ops in prop::collection::vec((0u64..12, 0.0f32..10.0, 0u8..4), 1..100),
        ) {
            let mut h = EmitterBufferHandler::new(5, 0.5);
            let mut now = 0.0;
            for (id, staleness, op) in ops {
                match op {
                    0 | 1 => {
                        let slot = h.track(anchor(id), now + staleness);
                        prop_assert!(slot < 5);
                        prop_assert_eq!(h.slot_of(AnchorId(id)), Some(slot));
                    }
                    2 => {
                        h.untrack(AnchorId(id));
                    }
                    _ => {
                        now += 1.0;
                        h.update(now);
                    }
                }
                prop_assert!(h.len() <= 5);
                assert_partitioned(&h);
            }
        }
    }
}
