//! Entity identifiers, allocation, and per-entity metadata.
//!
//! An [`EntityId`] is an opaque `u32` handle. IDs are assigned monotonically
//! and never recycled: once an entity is destroyed its id stays dead forever,
//! so a stale handle can always be detected with [`EntityAllocator::is_alive`].

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// An opaque entity identifier. Carries no data itself; all state lives in
/// components keyed by this id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Construct an `EntityId` from a raw index. Mostly useful in tests;
    /// real ids come from [`EntityAllocator::allocate`].
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw `u32` representation.
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityMeta
// ---------------------------------------------------------------------------

/// Per-entity metadata record.
///
/// The child list is deliberately absent: parent/child adjacency is a derived
/// structure maintained by the hierarchy index, not authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Display name for editors and diagnostics.
    pub name: String,
    /// Parent entity, `None` for roots.
    pub parent: Option<EntityId>,
}

impl EntityMeta {
    /// A root entity with the given display name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
        }
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Hands out [`EntityId`]s monotonically and tracks which are alive.
///
/// Destroyed ids are never reused; the `alive` bitmap is indexed by the raw
/// id, so staleness checks are a single slot read.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Whether each ever-allocated slot is currently alive.
    alive: Vec<bool>,
    /// Count of live entities, kept in sync with `alive`.
    live: usize,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh [`EntityId`]. Ids increase monotonically.
    pub fn allocate(&mut self) -> EntityId {
        let raw = self.alive.len() as u32;
        self.alive.push(true);
        self.live += 1;
        EntityId(raw)
    }

    /// Mark an entity dead. Returns `false` if the id was never allocated or
    /// is already dead.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        match self.alive.get_mut(id.0 as usize) {
            Some(slot) if *slot => {
                *slot = false;
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// Whether `id` refers to a currently live entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.alive.get(id.0 as usize).copied().unwrap_or(false)
    }

    /// Number of currently live entities.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of id slots ever allocated (live or dead). Bounds the one
    /// acceptable linear scan: index rebuild.
    pub fn slot_count(&self) -> usize {
        self.alive.len()
    }

    /// Iterate all currently live ids in ascending order.
    pub fn iter_live(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(i, _)| EntityId(i as u32))
    }

    /// Forget everything. Used by world teardown.
    pub fn clear(&mut self) {
        self.alive.clear();
        self.live = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
