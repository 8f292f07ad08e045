//! Strata ECS -- event-synchronized entity indexing and component registry.
//!
//! This crate is the query core of the Strata engine. Component data lives in
//! a bit-packed or associative store behind a schema-validated registry;
//! everything a collaborator asks about the world (which entities exist, who
//! parents whom, who carries which components, what is near this point) is
//! answered from derived indices kept in sync by an event adapter, never by
//! scanning the store.
//!
//! # Quick Start
//!
//! ```
//! use strata_ecs::prelude::*;
//! use serde_json::json;
//!
//! let mut world = World::new();
//! world.register_component(ComponentDescriptor::packed(
//!     "Transform",
//!     vec![PackedField::f32_lanes("position", 3)],
//!     json!({ "position": [0.0, 0.0, 0.0] }),
//! ))?;
//! world.validate_registrations()?;
//!
//! let player = world.create_entity("player");
//! world.add_component(player, "Transform", Some(&json!({ "position": [1.0, 2.0, 3.0] })));
//!
//! assert_eq!(world.list_entities_with_component("Transform"), vec![player]);
//! assert!(world.validate_indices().is_empty());
//! # Ok::<(), strata_ecs::EcsError>(())
//! ```

#![deny(unsafe_code)]

pub mod adapter;
pub mod consistency;
pub mod entity;
pub mod events;
pub mod index;
pub mod pool;
pub mod registry;
pub mod spatial;
pub mod store;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Only registration-time structural mistakes surface here; runtime
/// validation failures fall back to defaults or reject the single operation
/// with a logged warning (see the registry docs).
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// A kind's default data fails its own schema. Registration-time bug.
    #[error("default data for kind '{kind}' fails its own schema: {details}")]
    InvalidDefault {
        kind: String,
        details: String,
    },

    /// A requires/conflicts list names a kind that was never registered.
    #[error("kind '{kind}' {list} unregistered kind '{reference}'")]
    UnresolvedKindReference {
        kind: String,
        reference: String,
        list: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::adapter::IndexEventAdapter;
    pub use crate::consistency::{check_consistency, ConsistencyReport, ConsistencyStats};
    pub use crate::entity::{EntityAllocator, EntityId, EntityMeta};
    pub use crate::events::{BatchedEventBus, BusConfig, EcsEvent, EventKind, SubscriberId};
    pub use crate::index::{ComponentIndex, EntityIndex, HierarchyIndex};
    pub use crate::pool::{ObjectPool, PoolStats, VecPool};
    pub use crate::registry::{
        ComponentDescriptor, ComponentRegistry, KindId, Schema, SchemaField, ValueKind,
    };
    pub use crate::spatial::{Aabb, SpatialGrid};
    pub use crate::store::{ComponentStorage, PackedField, ScalarType};
    pub use crate::world::{World, WorldConfig};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
