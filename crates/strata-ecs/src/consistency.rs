//! Development-time auditor that diff-checks every derived structure against
//! the authoritative store.
//!
//! The checker only reports; it never repairs. The repair path is an explicit
//! [`World::rebuild_indices`](crate::world::World::rebuild_indices) call by
//! the developer once the report has been read.

use crate::world::World;

/// Summary counters gathered during a check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsistencyStats {
    /// Live entities according to the allocator.
    pub entities_in_world: usize,
    /// Entities according to the entity index.
    pub entities_in_index: usize,
    /// Registered component kinds.
    pub component_types: usize,
    /// Component instances across all kinds.
    pub total_components: usize,
    /// Child-to-parent links in the hierarchy index.
    pub hierarchy_relationships: usize,
}

/// Result of one [`check_consistency`] run.
#[derive(Debug, Clone)]
pub struct ConsistencyReport {
    /// True iff `errors` is empty. Warnings do not affect this.
    pub is_consistent: bool,
    /// Index/store divergences. Each one means a derived structure lies.
    pub errors: Vec<String>,
    /// Suspicious but non-divergent conditions.
    pub warnings: Vec<String>,
    pub stats: ConsistencyStats,
}

/// Audit all of a world's derived state. Read-only; never panics.
pub fn check_consistency(world: &World) -> ConsistencyReport {
    let mut errors = world.validate_indices();
    let mut warnings = Vec::new();

    // Every live entity must carry a metadata record.
    for entity in world.allocator().iter_live() {
        if !world.metadata().contains_key(&entity) {
            errors.push(format!("live entity {entity} has no metadata record"));
        }
    }
    for entity in world.metadata().keys() {
        if !world.allocator().is_alive(*entity) {
            errors.push(format!("metadata record exists for dead entity {entity}"));
        }
    }

    // The spatial grid is caller-maintained, so a stale entry is plausible
    // after a missed removal. Stale position data cannot corrupt membership
    // queries, hence a warning rather than an error.
    for (entity, position) in world.spatial().iter_tracked() {
        if !world.allocator().is_alive(entity) {
            warnings.push(format!(
                "spatial grid tracks dead entity {entity} at {position}"
            ));
        }
    }

    let stats = ConsistencyStats {
        entities_in_world: world.allocator().live_count(),
        entities_in_index: world.adapter().entities().len(),
        component_types: world.registry().kind_count(),
        total_components: world.registry().total_component_count(),
        hierarchy_relationships: world.adapter().hierarchy().relationship_count(),
    };
    if stats.entities_in_world != stats.entities_in_index {
        errors.push(format!(
            "entity count mismatch: {} in world, {} in index",
            stats.entities_in_world, stats.entities_in_index
        ));
    }

    if !errors.is_empty() {
        tracing::warn!(
            errors = errors.len(),
            warnings = warnings.len(),
            "consistency check failed"
        );
    }

    ConsistencyReport {
        is_consistent: errors.is_empty(),
        errors,
        warnings,
        stats,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
