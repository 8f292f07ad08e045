//! The world context: one self-contained entity universe.
//!
//! `World` owns the allocator, entity metadata, component registry, index
//! adapter, spatial grid, and event bus, and is the only type that wires them
//! together. There is no global instance; construct as many independent
//! worlds as needed and pass them by reference.
//!
//! Every mutation follows the same sequence: write the authoritative state,
//! apply the resulting event to the index adapter synchronously, then queue
//! the same event on the batched bus for external subscribers. Queries issued
//! immediately after a mutation therefore always see the post-mutation
//! indices, while subscribers see a coalesced batch on the next
//! [`flush`](World::flush).

use std::collections::HashMap;

use glam::Vec3;
use serde_json::Value;

use crate::adapter::IndexEventAdapter;
use crate::entity::{EntityAllocator, EntityId, EntityMeta};
use crate::events::{BatchedEventBus, BusConfig, EcsEvent, EventKind, SubscriberId};
use crate::registry::{ComponentDescriptor, ComponentRegistry, KindId};
use crate::spatial::{Aabb, SpatialGrid, DEFAULT_CELL_SIZE};
use crate::EcsError;

/// Construction-time knobs for a [`World`].
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Spatial grid cell edge length, world units.
    pub spatial_cell_size: f32,
    /// Event bus coalescing and backpressure settings.
    pub bus: BusConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            spatial_cell_size: DEFAULT_CELL_SIZE,
            bus: BusConfig::default(),
        }
    }
}

/// A single entity universe. See the module docs for the mutation pipeline.
#[derive(Debug)]
pub struct World {
    allocator: EntityAllocator,
    metadata: HashMap<EntityId, EntityMeta>,
    registry: ComponentRegistry,
    adapter: IndexEventAdapter,
    spatial: SpatialGrid,
    bus: BatchedEventBus,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let mut adapter = IndexEventAdapter::new();
        adapter.attach();
        Self {
            allocator: EntityAllocator::new(),
            metadata: HashMap::new(),
            registry: ComponentRegistry::new(),
            adapter,
            spatial: SpatialGrid::new(config.spatial_cell_size),
            bus: BatchedEventBus::with_config(config.bus),
        }
    }

    /// Apply an event to the indices, then queue it for subscribers. Every
    /// mutation funnels through here so the two paths can never diverge.
    fn route(&mut self, event: EcsEvent) {
        self.adapter.apply(&event);
        self.bus.emit(event);
    }

    // -- registration -------------------------------------------------------

    /// Register a component kind. See [`ComponentRegistry::register`].
    pub fn register_component(&mut self, descriptor: ComponentDescriptor) -> Result<KindId, EcsError> {
        self.registry.register(descriptor)
    }

    /// Fail fast on dangling requires/conflicts references. Call once after
    /// the startup registration list has run.
    pub fn validate_registrations(&self) -> Result<(), EcsError> {
        self.registry.validate_registrations()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create a root entity with a display name.
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        self.create_entity_with_parent(name, None)
    }

    /// Create an entity under `parent`. A dead or unknown parent is logged
    /// and the entity is created as a root instead.
    pub fn create_entity_with_parent(
        &mut self,
        name: impl Into<String>,
        parent: Option<EntityId>,
    ) -> EntityId {
        let parent = match parent {
            Some(p) if !self.allocator.is_alive(p) => {
                tracing::warn!(parent = %p, "create_entity: parent not alive, creating root");
                None
            }
            other => other,
        };
        let entity = self.allocator.allocate();
        let mut meta = EntityMeta::named(name);
        meta.parent = parent;
        self.metadata.insert(entity, meta);
        self.route(EcsEvent::EntityCreated { entity, parent });
        entity
    }

    /// Destroy an entity: components are removed first (with their events and
    /// on-remove hooks), then metadata, spatial tracking, and index entries.
    /// Its children become roots. Returns `false` for a dead or unknown id.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        if !self.allocator.is_alive(entity) {
            tracing::warn!(%entity, "destroy_entity: not alive");
            return false;
        }
        for kind in self.registry.remove_all_for_entity(entity) {
            self.route(EcsEvent::ComponentRemoved { entity, kind });
        }
        // Children survive as roots; their metadata must agree with the
        // hierarchy index, which drops the links on EntityDestroyed.
        for child in self.adapter.hierarchy().children(entity) {
            if let Some(meta) = self.metadata.get_mut(&child) {
                meta.parent = None;
            }
        }
        self.metadata.remove(&entity);
        self.spatial.remove(entity);
        self.allocator.deallocate(entity);
        self.route(EcsEvent::EntityDestroyed { entity });
        true
    }

    /// Reparent an entity (`None` makes it a root). Self-parenting and dead
    /// ids are logged no-ops.
    pub fn set_parent(&mut self, entity: EntityId, parent: Option<EntityId>) -> bool {
        if !self.allocator.is_alive(entity) {
            tracing::warn!(%entity, "set_parent: entity not alive");
            return false;
        }
        if let Some(p) = parent {
            if p == entity {
                tracing::warn!(%entity, "set_parent: entity cannot parent itself");
                return false;
            }
            if !self.allocator.is_alive(p) {
                tracing::warn!(%entity, parent = %p, "set_parent: parent not alive");
                return false;
            }
        }
        if let Some(meta) = self.metadata.get_mut(&entity) {
            meta.parent = parent;
        }
        self.route(EcsEvent::EntityUpdated { entity, parent });
        true
    }

    /// Tear down the whole world. Subscribers stay registered and receive a
    /// single `world:cleared` event on the next flush.
    pub fn clear(&mut self) {
        self.registry.clear_storage();
        self.allocator.clear();
        self.metadata.clear();
        self.spatial.clear();
        self.route(EcsEvent::WorldCleared);
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Display name of a live entity.
    pub fn entity_name(&self, entity: EntityId) -> Option<&str> {
        self.metadata.get(&entity).map(|m| m.name.as_str())
    }

    /// Rename a live entity.
    pub fn set_entity_name(&mut self, entity: EntityId, name: impl Into<String>) -> bool {
        match self.metadata.get_mut(&entity) {
            Some(meta) => {
                meta.name = name.into();
                true
            }
            None => false,
        }
    }

    /// All live entities whose display name matches exactly, sorted.
    pub fn find_entities_by_name(&self, name: &str) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self
            .metadata
            .iter()
            .filter(|(_, meta)| meta.name == name)
            .map(|(id, _)| *id)
            .collect();
        out.sort_unstable();
        out
    }

    // -- component lifecycle ------------------------------------------------

    /// Add a component by kind name. Invalid `initial` data falls back to the
    /// kind's defaults with a logged warning. Returns `false` for a dead
    /// entity or a registry-level no-op.
    pub fn add_component(
        &mut self,
        entity: EntityId,
        kind: &str,
        initial: Option<&Value>,
    ) -> bool {
        if !self.allocator.is_alive(entity) {
            tracing::warn!(%entity, kind, "add_component: entity not alive");
            return false;
        }
        match self.registry.add_component(entity, kind, initial) {
            Some((kind, data)) => {
                self.route(EcsEvent::ComponentAdded { entity, kind, data });
                true
            }
            None => false,
        }
    }

    /// Merge `patch` onto an existing component. The merged record is
    /// re-validated; an invalid merge is rejected and storage is untouched.
    pub fn update_component(&mut self, entity: EntityId, kind: &str, patch: &Value) -> bool {
        match self.registry.update_component(entity, kind, patch) {
            Some((kind, data)) => {
                self.route(EcsEvent::ComponentUpdated { entity, kind, data });
                true
            }
            None => false,
        }
    }

    /// Remove a component. `false` when absent or the kind is non-removable.
    pub fn remove_component(&mut self, entity: EntityId, kind: &str) -> bool {
        match self.registry.remove_component(entity, kind) {
            Some(kind) => {
                self.route(EcsEvent::ComponentRemoved { entity, kind });
                true
            }
            None => false,
        }
    }

    pub fn get_component_data(&self, entity: EntityId, kind: &str) -> Option<Value> {
        self.registry.get_component_data(entity, kind)
    }

    pub fn has_component(&self, entity: EntityId, kind: &str) -> bool {
        self.registry.has_component(entity, kind)
    }

    // -- query surface ------------------------------------------------------
    //
    // All membership queries read the derived indices, never the store.

    /// Every live entity, sorted.
    pub fn list_all_entities(&self) -> Vec<EntityId> {
        self.adapter.entities().to_sorted_vec()
    }

    pub fn entity_count(&self) -> usize {
        self.adapter.entities().len()
    }

    /// Entities carrying `kind`, sorted. Unknown kinds yield an empty list.
    pub fn list_entities_with_component(&self, kind: &str) -> Vec<EntityId> {
        match self.registry.kind_id(kind) {
            Some(id) => self.adapter.components().entities(id),
            None => Vec::new(),
        }
    }

    /// Entities carrying *all* of `kinds`, sorted. Any unknown kind makes
    /// the intersection empty.
    pub fn list_entities_with_components(&self, kinds: &[&str]) -> Vec<EntityId> {
        let mut ids = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self.registry.kind_id(kind) {
                Some(id) => ids.push(id),
                None => return Vec::new(),
            }
        }
        self.adapter.components().with_all(&ids)
    }

    /// Entities carrying *any* of `kinds`, sorted. Unknown kinds contribute
    /// nothing.
    pub fn list_entities_with_any_component(&self, kinds: &[&str]) -> Vec<EntityId> {
        let ids: Vec<KindId> = kinds
            .iter()
            .filter_map(|kind| self.registry.kind_id(kind))
            .collect();
        self.adapter.components().with_any(&ids)
    }

    pub fn get_parent(&self, entity: EntityId) -> Option<EntityId> {
        self.adapter.hierarchy().parent(entity)
    }

    /// Direct children, ascending.
    pub fn get_children(&self, entity: EntityId) -> Vec<EntityId> {
        self.adapter.hierarchy().children(entity)
    }

    /// All transitive children, breadth-first.
    pub fn get_descendants(&self, entity: EntityId) -> Vec<EntityId> {
        self.adapter.hierarchy().descendants(entity)
    }

    /// Parent chain, nearest first.
    pub fn get_ancestors(&self, entity: EntityId) -> Vec<EntityId> {
        self.adapter.hierarchy().ancestors(entity)
    }

    /// Live entities with no parent, sorted.
    pub fn get_root_entities(&self) -> Vec<EntityId> {
        let hierarchy = self.adapter.hierarchy();
        let mut roots: Vec<EntityId> = self
            .adapter
            .entities()
            .iter()
            .filter(|&e| hierarchy.parent(e).is_none())
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Registered kind names, sorted.
    pub fn get_component_types(&self) -> Vec<&str> {
        self.registry.kind_names()
    }

    /// Number of entities carrying `kind`. Unknown kinds count zero.
    pub fn get_component_count(&self, kind: &str) -> usize {
        match self.registry.kind_id(kind) {
            Some(id) => self.adapter.components().count(id),
            None => 0,
        }
    }

    // -- spatial ------------------------------------------------------------
    //
    // Position updates are too frequent for the event bus; callers push them
    // straight into the grid, typically once per simulation step.

    /// Record an entity's world position. Dead ids are logged no-ops.
    pub fn update_entity_position(&mut self, entity: EntityId, position: Vec3) {
        if !self.allocator.is_alive(entity) {
            tracing::warn!(%entity, "update_entity_position: entity not alive");
            return;
        }
        self.spatial.update_position(entity, position);
    }

    pub fn query_spatial_bounds(&self, bounds: Aabb) -> Vec<EntityId> {
        self.spatial.query_bounds(bounds)
    }

    pub fn query_spatial_radius(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        self.spatial.query_radius(center, radius)
    }

    pub fn spatial(&self) -> &SpatialGrid {
        &self.spatial
    }

    // -- events -------------------------------------------------------------

    /// Subscribe to one event kind. The handler runs on every flush that
    /// delivers a matching event.
    pub fn on_event(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&EcsEvent) + 'static,
    ) -> SubscriberId {
        self.bus.on(kind, handler)
    }

    /// Drop a subscription.
    pub fn off_event(&mut self, id: SubscriberId) {
        self.bus.off(id);
    }

    /// Deliver all pending events. Call once per frame from the host loop.
    pub fn flush_events(&mut self) {
        self.bus.flush();
    }

    pub fn pending_event_count(&self) -> usize {
        self.bus.pending_count()
    }

    pub fn subscription_count(&self) -> usize {
        self.bus.subscription_count()
    }

    // -- index maintenance --------------------------------------------------

    /// Throw away the derived indices and rebuild them from the store.
    /// Explicit recovery operation; the only sanctioned full scan.
    pub fn rebuild_indices(&mut self) {
        self.adapter
            .rebuild(&self.allocator, &self.metadata, &self.registry);
    }

    /// Diff the indices against the store. Empty means consistent.
    pub fn validate_indices(&self) -> Vec<String> {
        self.adapter
            .validate(&self.allocator, &self.metadata, &self.registry)
    }

    pub(crate) fn adapter(&self) -> &IndexEventAdapter {
        &self.adapter
    }

    pub(crate) fn allocator(&self) -> &EntityAllocator {
        &self.allocator
    }

    pub(crate) fn metadata(&self) -> &HashMap<EntityId, EntityMeta> {
        &self.metadata
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
