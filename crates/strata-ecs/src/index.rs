//! Derived, incrementally-maintained index structures.
//!
//! None of these are authoritative: the component registry's store and the
//! entity metadata table are the source of truth, and the
//! [`IndexEventAdapter`](crate::adapter::IndexEventAdapter) keeps these
//! structures in sync through event application. Query code reads only from
//! here; it never scans the store.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::entity::EntityId;
use crate::registry::KindId;

// ---------------------------------------------------------------------------
// EntityIndex
// ---------------------------------------------------------------------------

/// Flat set of currently-live entity ids.
#[derive(Debug, Default, Clone)]
pub struct EntityIndex {
    live: HashSet<EntityId>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: EntityId) {
        self.live.insert(entity);
    }

    pub fn remove(&mut self, entity: EntityId) -> bool {
        self.live.remove(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.live.contains(&entity)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// All live ids, sorted for deterministic output.
    pub fn to_sorted_vec(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.live.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.live.iter().copied()
    }

    pub fn clear(&mut self) {
        self.live.clear();
    }
}

// ---------------------------------------------------------------------------
// HierarchyIndex
// ---------------------------------------------------------------------------

/// Parent/child adjacency derived from entity metadata.
///
/// `set_parent` is atomic: the child is removed from its previous parent's
/// child set before it is inserted under the new one, so an entity can never
/// appear under two parents.
#[derive(Debug, Default, Clone)]
pub struct HierarchyIndex {
    parent: HashMap<EntityId, EntityId>,
    children: HashMap<EntityId, BTreeSet<EntityId>>,
}

impl HierarchyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or clear, with `None`) the parent of `child`.
    pub fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) {
        if let Some(old) = self.parent.remove(&child) {
            if let Some(siblings) = self.children.get_mut(&old) {
                siblings.remove(&child);
                if siblings.is_empty() {
                    self.children.remove(&old);
                }
            }
        }
        if let Some(new_parent) = parent {
            self.parent.insert(child, new_parent);
            self.children.entry(new_parent).or_default().insert(child);
        }
    }

    /// The recorded parent of `entity`, if any.
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.parent.get(&entity).copied()
    }

    /// Direct children of `entity`, ascending.
    pub fn children(&self, entity: EntityId) -> Vec<EntityId> {
        self.children
            .get(&entity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every link touching `entity`: its own parent link, and the
    /// parent links of its direct children (they become roots).
    pub fn remove(&mut self, entity: EntityId) {
        self.set_parent(entity, None);
        if let Some(orphans) = self.children.remove(&entity) {
            for child in orphans {
                self.parent.remove(&child);
            }
        }
    }

    /// Every transitive child of `entity`, breadth-first.
    ///
    /// A revisited node means the adjacency contains a cycle; the revisit is
    /// reported and skipped rather than looping forever.
    pub fn descendants(&self, entity: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut visited: HashSet<EntityId> = HashSet::new();
        visited.insert(entity);
        let mut frontier: VecDeque<EntityId> = VecDeque::new();
        frontier.push_back(entity);

        while let Some(current) = frontier.pop_front() {
            if let Some(children) = self.children.get(&current) {
                for &child in children {
                    if !visited.insert(child) {
                        tracing::warn!(
                            entity = %entity,
                            at = %child,
                            "hierarchy cycle detected during descendant traversal"
                        );
                        continue;
                    }
                    out.push(child);
                    frontier.push_back(child);
                }
            }
        }
        out
    }

    /// The chain of parents from `entity` to its root, nearest first.
    /// Cycle-capped the same way as [`descendants`](Self::descendants).
    pub fn ancestors(&self, entity: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut visited: HashSet<EntityId> = HashSet::new();
        visited.insert(entity);
        let mut current = entity;
        while let Some(parent) = self.parent(current) {
            if !visited.insert(parent) {
                tracing::warn!(
                    entity = %entity,
                    at = %parent,
                    "hierarchy cycle detected during ancestor traversal"
                );
                break;
            }
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Number of child->parent links. Used by consistency stats.
    pub fn relationship_count(&self) -> usize {
        self.parent.len()
    }

    /// Iterate all `(child, parent)` links.
    pub fn iter_links(&self) -> impl Iterator<Item = (EntityId, EntityId)> + '_ {
        self.parent.iter().map(|(c, p)| (*c, *p))
    }

    pub fn clear(&mut self) {
        self.parent.clear();
        self.children.clear();
    }
}

// ---------------------------------------------------------------------------
// ComponentIndex
// ---------------------------------------------------------------------------

/// Per-kind membership sets with AND/OR set queries.
#[derive(Debug, Default, Clone)]
pub struct ComponentIndex {
    by_kind: HashMap<KindId, HashSet<EntityId>>,
}

impl ComponentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: KindId, entity: EntityId) {
        self.by_kind.entry(kind).or_default().insert(entity);
    }

    pub fn remove(&mut self, kind: KindId, entity: EntityId) -> bool {
        match self.by_kind.get_mut(&kind) {
            Some(set) => {
                let removed = set.remove(&entity);
                if set.is_empty() {
                    self.by_kind.remove(&kind);
                }
                removed
            }
            None => false,
        }
    }

    pub fn has(&self, kind: KindId, entity: EntityId) -> bool {
        self.by_kind
            .get(&kind)
            .is_some_and(|set| set.contains(&entity))
    }

    /// Entities carrying `kind`, sorted.
    pub fn entities(&self, kind: KindId) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .by_kind
            .get(&kind)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Number of entities carrying `kind`.
    pub fn count(&self, kind: KindId) -> usize {
        self.by_kind.get(&kind).map_or(0, HashSet::len)
    }

    /// Intersection query: entities carrying *all* of `kinds`, sorted.
    ///
    /// Walks the smallest candidate set and membership-tests the rest, so the
    /// cost is O(smallest-set * remaining-kinds), never a scan over all
    /// entities. An empty `kinds` slice yields an empty result.
    pub fn with_all(&self, kinds: &[KindId]) -> Vec<EntityId> {
        if kinds.is_empty() {
            return Vec::new();
        }
        let mut sets = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self.by_kind.get(kind) {
                Some(set) => sets.push(set),
                // One empty operand makes the whole intersection empty.
                None => return Vec::new(),
            }
        }
        sets.sort_unstable_by_key(|set| set.len());
        let (smallest, rest) = sets.split_first().expect("kinds is non-empty");

        let mut out: Vec<EntityId> = smallest
            .iter()
            .copied()
            .filter(|entity| rest.iter().all(|set| set.contains(entity)))
            .collect();
        out.sort_unstable();
        out
    }

    /// Union query: entities carrying *any* of `kinds`, sorted, deduplicated.
    pub fn with_any(&self, kinds: &[KindId]) -> Vec<EntityId> {
        let mut union: HashSet<EntityId> = HashSet::new();
        for kind in kinds {
            if let Some(set) = self.by_kind.get(kind) {
                union.extend(set.iter().copied());
            }
        }
        let mut out: Vec<EntityId> = union.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Kinds currently holding at least one entity.
    pub fn kinds(&self) -> impl Iterator<Item = KindId> + '_ {
        self.by_kind.keys().copied()
    }

    pub fn clear(&mut self) {
        self.by_kind.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
