//! Event-driven synchronization between the primary store and the derived
//! indices.
//!
//! The adapter owns the three structural indices and applies each lifecycle
//! event to them incrementally. The world calls [`apply`] synchronously
//! inside every mutating operation, so a query issued right after a mutation
//! always observes the post-mutation state -- there is no suspension point
//! between "component added" and "index updated".
//!
//! [`apply`]: IndexEventAdapter::apply

use std::collections::HashMap;

use crate::entity::{EntityAllocator, EntityId, EntityMeta};
use crate::events::EcsEvent;
use crate::index::{ComponentIndex, EntityIndex, HierarchyIndex};
use crate::registry::ComponentRegistry;

/// Two-state synchronization engine: **detached** (initial) applies nothing;
/// **attached** applies every event it is handed. Both transitions are
/// idempotent -- a redundant call is logged and ignored.
#[derive(Debug, Default)]
pub struct IndexEventAdapter {
    entities: EntityIndex,
    hierarchy: HierarchyIndex,
    components: ComponentIndex,
    attached: bool,
}

impl IndexEventAdapter {
    /// Create a detached adapter with empty indices.
    pub fn new() -> Self {
        Self::default()
    }

    // -- attach / detach ----------------------------------------------------

    /// Start applying events. Idempotent.
    pub fn attach(&mut self) {
        if self.attached {
            tracing::warn!("index adapter already attached");
            return;
        }
        self.attached = true;
    }

    /// Stop applying events. The indices are left as-is (not cleared) so a
    /// later [`rebuild`](Self::rebuild) can compare old against fresh state.
    /// Idempotent.
    pub fn detach(&mut self) {
        if !self.attached {
            tracing::warn!("index adapter already detached");
            return;
        }
        self.attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    // -- index access -------------------------------------------------------

    pub fn entities(&self) -> &EntityIndex {
        &self.entities
    }

    pub fn hierarchy(&self) -> &HierarchyIndex {
        &self.hierarchy
    }

    pub fn components(&self) -> &ComponentIndex {
        &self.components
    }

    // -- incremental application --------------------------------------------

    /// Apply one event to the indices. No-op while detached.
    ///
    /// `component:updated` is intentionally not indexed: an update can never
    /// change set membership.
    pub fn apply(&mut self, event: &EcsEvent) {
        if !self.attached {
            return;
        }
        match event {
            EcsEvent::EntityCreated { entity, parent } => {
                self.entities.insert(*entity);
                if parent.is_some() {
                    self.hierarchy.set_parent(*entity, *parent);
                }
            }
            EcsEvent::EntityUpdated { entity, parent } => {
                self.hierarchy.set_parent(*entity, *parent);
            }
            EcsEvent::EntityDestroyed { entity } => {
                self.entities.remove(*entity);
                self.hierarchy.remove(*entity);
            }
            EcsEvent::WorldCleared => {
                self.entities.clear();
                self.hierarchy.clear();
                self.components.clear();
            }
            EcsEvent::ComponentAdded { entity, kind, .. } => {
                self.components.insert(*kind, *entity);
            }
            EcsEvent::ComponentUpdated { .. } => {}
            EcsEvent::ComponentRemoved { entity, kind } => {
                self.components.remove(*kind, *entity);
            }
        }
    }

    // -- rebuild / validation -----------------------------------------------

    /// Discard all three indices and reconstruct them from an authoritative
    /// scan of the allocator, metadata table, and component store.
    ///
    /// This is the one place a bounded linear scan over every entity slot is
    /// acceptable: it is an explicit, infrequent recovery operation, not a
    /// query path. Works whether attached or detached.
    pub fn rebuild(
        &mut self,
        allocator: &EntityAllocator,
        metadata: &HashMap<EntityId, EntityMeta>,
        registry: &ComponentRegistry,
    ) {
        tracing::debug!(
            entities = allocator.live_count(),
            kinds = registry.kind_count(),
            "rebuilding indices from store scan"
        );
        self.entities.clear();
        self.hierarchy.clear();
        self.components.clear();

        for entity in allocator.iter_live() {
            self.entities.insert(entity);
            if let Some(parent) = metadata.get(&entity).and_then(|m| m.parent) {
                self.hierarchy.set_parent(entity, Some(parent));
            }
        }
        for kind in registry.kind_ids() {
            for entity in registry.entities_with(kind) {
                self.components.insert(kind, entity);
            }
        }
    }

    /// Read-only diff of the indices against the same authoritative scan
    /// that [`rebuild`](Self::rebuild) uses. Returns human-readable
    /// discrepancy strings; an empty list means consistent. Never panics.
    pub fn validate(
        &self,
        allocator: &EntityAllocator,
        metadata: &HashMap<EntityId, EntityMeta>,
        registry: &ComponentRegistry,
    ) -> Vec<String> {
        let mut errors = Vec::new();

        // Entity index vs allocator.
        for entity in allocator.iter_live() {
            if !self.entities.contains(entity) {
                errors.push(format!("entity {entity} is live but missing from entity index"));
            }
        }
        for entity in self.entities.iter() {
            if !allocator.is_alive(entity) {
                errors.push(format!("entity index contains dead entity {entity}"));
            }
        }

        // Hierarchy index vs metadata.
        for entity in allocator.iter_live() {
            let authoritative = metadata.get(&entity).and_then(|m| m.parent);
            let indexed = self.hierarchy.parent(entity);
            if authoritative != indexed {
                errors.push(format!(
                    "hierarchy parent of {entity} is {indexed:?}, metadata says {authoritative:?}"
                ));
            }
            if let Some(parent) = authoritative {
                if !self.hierarchy.children(parent).contains(&entity) {
                    errors.push(format!(
                        "entity {entity} missing from child set of parent {parent}"
                    ));
                }
            }
        }
        for (child, parent) in self.hierarchy.iter_links() {
            if !allocator.is_alive(child) {
                errors.push(format!(
                    "hierarchy links dead child {child} under {parent}"
                ));
            }
        }

        // Component index vs store, both directions.
        for kind in registry.kind_ids() {
            let name = registry.kind_name(kind).unwrap_or("?");
            for entity in registry.entities_with(kind) {
                if !self.components.has(kind, entity) {
                    errors.push(format!(
                        "store holds ({entity}, '{name}') but component index does not"
                    ));
                }
            }
            let stored = registry.entities_with(kind).len();
            let indexed = self.components.count(kind);
            if stored != indexed {
                errors.push(format!(
                    "component index for '{name}' has {indexed} entities, store has {stored}"
                ));
            }
        }
        for kind in self.components.kinds() {
            if registry.kind_name(kind).is_none() {
                errors.push(format!("component index references unknown kind {kind:?}"));
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ComponentDescriptor, Schema};
    use serde_json::json;

    fn fixture() -> (EntityAllocator, HashMap<EntityId, EntityMeta>, ComponentRegistry) {
        let mut allocator = EntityAllocator::new();
        let mut metadata = HashMap::new();
        let mut registry = ComponentRegistry::new();
        registry
            .register(ComponentDescriptor::unmanaged(
                "Tag",
                Schema::default(),
                json!({}),
            ))
            .unwrap();

        let root = allocator.allocate();
        metadata.insert(root, EntityMeta::named("root"));
        let child = allocator.allocate();
        let mut meta = EntityMeta::named("child");
        meta.parent = Some(root);
        metadata.insert(child, meta);
        registry.add_component(child, "Tag", None).unwrap();

        (allocator, metadata, registry)
    }

    fn events_for_fixture(registry: &ComponentRegistry) -> Vec<EcsEvent> {
        let tag = registry.kind_id("Tag").unwrap();
        vec![
            EcsEvent::EntityCreated {
                entity: EntityId::new(0),
                parent: None,
            },
            EcsEvent::EntityCreated {
                entity: EntityId::new(1),
                parent: Some(EntityId::new(0)),
            },
            EcsEvent::ComponentAdded {
                entity: EntityId::new(1),
                kind: tag,
                data: json!({}),
            },
        ]
    }

    #[test]
    fn detached_adapter_applies_nothing() {
        let (_, _, registry) = fixture();
        let mut adapter = IndexEventAdapter::new();
        for event in events_for_fixture(&registry) {
            adapter.apply(&event);
        }
        assert!(adapter.entities().is_empty());
    }

    #[test]
    fn attached_adapter_tracks_events() {
        let (allocator, metadata, registry) = fixture();
        let mut adapter = IndexEventAdapter::new();
        adapter.attach();
        for event in events_for_fixture(&registry) {
            adapter.apply(&event);
        }
        assert!(adapter.validate(&allocator, &metadata, &registry).is_empty());
        assert_eq!(adapter.hierarchy().parent(EntityId::new(1)), Some(EntityId::new(0)));
    }

    #[test]
    fn attach_and_detach_are_idempotent() {
        let mut adapter = IndexEventAdapter::new();
        adapter.attach();
        adapter.attach(); // logged, ignored
        assert!(adapter.is_attached());
        adapter.detach();
        adapter.detach(); // logged, ignored
        assert!(!adapter.is_attached());
    }

    #[test]
    fn rebuild_matches_incremental_state() {
        let (allocator, metadata, registry) = fixture();

        let mut incremental = IndexEventAdapter::new();
        incremental.attach();
        for event in events_for_fixture(&registry) {
            incremental.apply(&event);
        }

        let mut rebuilt = IndexEventAdapter::new();
        rebuilt.rebuild(&allocator, &metadata, &registry);

        assert!(rebuilt.validate(&allocator, &metadata, &registry).is_empty());
        assert_eq!(
            incremental.entities().to_sorted_vec(),
            rebuilt.entities().to_sorted_vec()
        );
        let tag = registry.kind_id("Tag").unwrap();
        assert_eq!(
            incremental.components().entities(tag),
            rebuilt.components().entities(tag)
        );
    }

    #[test]
    fn validate_reports_divergence() {
        let (allocator, metadata, registry) = fixture();
        let mut adapter = IndexEventAdapter::new();
        adapter.rebuild(&allocator, &metadata, &registry);
        assert!(adapter.validate(&allocator, &metadata, &registry).is_empty());

        // Sabotage: drop a live entity from the index behind the adapter's back.
        adapter.entities.remove(EntityId::new(1));
        let errors = adapter.validate(&allocator, &metadata, &registry);
        assert!(!errors.is_empty());
        assert!(errors.iter().any(|e| e.contains("missing from entity index")));
    }

    #[test]
    fn destroy_event_clears_entity_and_hierarchy() {
        let (_, _, registry) = fixture();
        let mut adapter = IndexEventAdapter::new();
        adapter.attach();
        for event in events_for_fixture(&registry) {
            adapter.apply(&event);
        }
        let tag = registry.kind_id("Tag").unwrap();
        adapter.apply(&EcsEvent::ComponentRemoved {
            entity: EntityId::new(1),
            kind: tag,
        });
        adapter.apply(&EcsEvent::EntityDestroyed {
            entity: EntityId::new(1),
        });

        assert!(!adapter.entities().contains(EntityId::new(1)));
        assert!(adapter.hierarchy().children(EntityId::new(0)).is_empty());
        assert_eq!(adapter.components().count(tag), 0);
    }
}
