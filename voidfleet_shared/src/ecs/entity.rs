//! Entity handles and the index allocator behind them.

use std::{collections::VecDeque, fmt};

use serde::{Deserialize, Serialize};

/// Opaque entity id.
///
/// An arena index plus a generation counter. Freed indices are recycled with a
/// bumped generation, so a stale handle never resolves to the entity that
/// reused its slot. On the wire the id is a single `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot. Stable for the lifetime of the entity; use it for instance buffers.
    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }

    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl From<u64> for EntityId {
    fn from(bits: u64) -> Self {
        Self::from_bits(bits)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.to_bits()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Hands out entity ids and tracks which are alive.
///
/// Freed indices go to the back of a FIFO so a slot rests for as long as
/// possible before it is reused.
#[derive(Debug, Default)]
pub(crate) struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: VecDeque<u32>,
    live: usize,
}

impl EntityAllocator {
    pub fn alloc(&mut self) -> EntityId {
        self.live += 1;
        if let Some(index) = self.free.pop_front() {
            let slot = index as usize;
            self.alive[slot] = true;
            return EntityId::new(index, self.generations[slot]);
        }

        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        EntityId::new(index, 0)
    }

    /// Releases an entity. Returns false for stale or unknown ids.
    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let slot = id.index as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push_back(id.index);
        self.live -= 1;
        true
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        let slot = id.index as usize;
        slot < self.alive.len() && self.alive[slot] && self.generations[slot] == id.generation
    }

    pub fn len(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycled_index_bumps_generation() {
        let mut alloc = EntityAllocator::default();
        let a = alloc.alloc();
        assert!(alloc.free(a));
        assert!(!alloc.free(a), "double free must be rejected");

        let b = alloc.alloc();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(!alloc.is_alive(a));
        assert!(alloc.is_alive(b));
        assert_eq!(alloc.len(), 1);
    }

    #[test]
    fn id_bits_roundtrip_through_json() {
        let id = EntityId::new(7, 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, id.to_bits().to_string());
        assert_eq!(serde_json::from_str::<EntityId>(&json).unwrap(), id);
    }
}
