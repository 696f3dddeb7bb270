//! Cluster bookkeeping: a generational slot arena plus an offset index.
//!
//! Entries live in a `Vec` of slots addressed by [`ClusterId`]. The
//! offset-ordered view is a separate `BTreeMap<offset, ClusterId>` that is
//! updated on every insert and removal and rebuilt wholesale by
//! [`ClusterArena::relocate`] after compaction. Entry offsets are never used
//! as keys of a container while they are being rewritten.
//!
//! Removing an entry bumps its slot's generation, so a [`ClusterId`] held by
//! a pending death action resolves to `None` once its cluster is gone.

use std::collections::BTreeMap;
use std::fmt;

use ember_core::SimTime;

/// Stable token for one cluster entry.
///
/// Valid until the entry is removed or the arena is cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct ClusterId {
    index: u32,
    generation: u32,
}

impl ClusterId {
    /// Slot index inside the arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation this token was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster {}v{}", self.index, self.generation)
    }
}

/// Metadata for one contiguous run of particle records sharing a death.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterEntry {
    /// First float of the run within the allocator's buffer.
    pub offset: usize,
    /// Length of the run in floats.
    pub size_in_floats: usize,
    /// Simulation time the earliest particle in the run was generated.
    pub generation_time: SimTime,
    /// Simulation time the last particle in the run dies.
    pub death_time: SimTime,
}

impl ClusterEntry {
    /// One past the last float of the run.
    pub fn end(&self) -> usize {
        self.offset + self.size_in_floats
    }
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    entry: Option<ClusterEntry>,
}

/// Live cluster entries of one allocator.
#[derive(Clone, Debug, Default)]
pub struct ClusterArena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    by_offset: BTreeMap<usize, ClusterId>,
    total_floats: usize,
}

impl ClusterArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    /// Whether no entries are live.
    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    /// Sum of `size_in_floats` over all live entries.
    pub fn total_floats(&self) -> usize {
        self.total_floats
    }

    /// Insert a new entry and return its token.
    ///
    /// The caller guarantees the entry does not overlap a live one.
    pub fn insert(&mut self, entry: ClusterEntry) -> ClusterId {
        let id = match self.free_list.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                ClusterId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ClusterId {
                    index,
                    generation: 0,
                }
            }
        };
        self.by_offset.insert(entry.offset, id);
        self.total_floats += entry.size_in_floats;
        id
    }

    /// Resolve a token, or `None` if its entry is gone.
    pub fn get(&self, id: ClusterId) -> Option<&ClusterEntry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    /// Whether `id` still names a live entry.
    pub fn contains(&self, id: ClusterId) -> bool {
        self.get(id).is_some()
    }

    /// The entry with the highest offset.
    pub fn last(&self) -> Option<(ClusterId, &ClusterEntry)> {
        let (_, &id) = self.by_offset.last_key_value()?;
        self.get(id).map(|entry| (id, entry))
    }

    /// Extend a live entry by an adjacent run that starts at its end.
    ///
    /// Grows `size_in_floats`, pulls `generation_time` down and pushes
    /// `death_time` up. Returns `false` if `id` is stale.
    pub fn absorb(&mut self, id: ClusterId, tail: &ClusterEntry) -> bool {
        let Some(entry) = self.get_mut(id) else {
            return false;
        };
        debug_assert_eq!(entry.end(), tail.offset);
        entry.size_in_floats += tail.size_in_floats;
        entry.generation_time = entry.generation_time.min(tail.generation_time);
        entry.death_time = entry.death_time.max(tail.death_time);
        self.total_floats += tail.size_in_floats;
        true
    }

    /// Remove a live entry, invalidating its token.
    pub fn remove(&mut self, id: ClusterId) -> Option<ClusterEntry> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.by_offset.remove(&entry.offset);
        self.total_floats -= entry.size_in_floats;
        Some(entry)
    }

    /// Live entries in increasing offset order.
    pub fn iter(&self) -> impl Iterator<Item = (ClusterId, &ClusterEntry)> + '_ {
        self.by_offset
            .values()
            .filter_map(move |&id| self.get(id).map(|entry| (id, entry)))
    }

    /// Pack live entries contiguously from offset 0, in offset order.
    ///
    /// `mv(old_offset, new_offset, len)` is called for every entry whose
    /// offset changes, in increasing offset order, so copying forward within
    /// one buffer is safe. Returns the packed length in floats.
    pub fn relocate(&mut self, mut mv: impl FnMut(usize, usize, usize)) -> usize {
        let order: Vec<ClusterId> = self.by_offset.values().copied().collect();
        self.by_offset.clear();
        let mut cursor = 0;
        for id in order {
            let Some(entry) = self.get_mut(id) else {
                continue;
            };
            let new_offset = cursor;
            if entry.offset != new_offset {
                mv(entry.offset, new_offset, entry.size_in_floats);
                entry.offset = new_offset;
            }
            cursor += entry.size_in_floats;
            self.by_offset.insert(new_offset, id);
        }
        cursor
    }

    /// Remove every entry, invalidating all outstanding tokens.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
            }
        }
        self.by_offset.clear();
        self.total_floats = 0;
    }

    fn get_mut(&mut self, id: ClusterId) -> Option<&mut ClusterEntry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }
}
