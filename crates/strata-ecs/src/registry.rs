//! Component kind registration and the mutating component API.
//!
//! Kinds are registered explicitly at startup from a static call list (no
//! directory scanning, no reflection). Each kind carries a stable string
//! identifier, a storage layout chosen once at registration, default data,
//! dependency/incompatibility lists, and optional lifecycle callbacks.
//!
//! Error policy: invalid *input* data is recoverable -- it is logged and the
//! kind's default data is used instead (or the single operation is rejected,
//! for updates). Invalid *registration* (a default that fails its own schema,
//! a dependency on a kind that was never registered) is a programming error
//! and fails fast with [`EcsError`].

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::entity::EntityId;
use crate::store::{ComponentStorage, PackedField, PackedStore, SparseStore};
use crate::EcsError;

// ---------------------------------------------------------------------------
// KindId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindId(pub(crate) u32);

impl fmt::Debug for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KindId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Schema (unmanaged kinds)
// ---------------------------------------------------------------------------

/// Expected JSON shape of one field of an unmanaged kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Integer,
    Bool,
    String,
    Array,
    Object,
    /// Accept anything. Useful for opaque blobs the core never interprets.
    Any,
}

impl ValueKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            ValueKind::Number => value.is_number(),
            ValueKind::Integer => value.is_i64() || value.is_u64(),
            ValueKind::Bool => value.is_boolean(),
            ValueKind::String => value.is_string(),
            ValueKind::Array => value.is_array(),
            ValueKind::Object => value.is_object(),
            ValueKind::Any => true,
        }
    }
}

/// One declared field of an unmanaged kind's schema.
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: String,
    pub kind: ValueKind,
    pub required: bool,
}

impl SchemaField {
    pub fn required(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Declared shape for an unmanaged kind. Unknown fields are allowed (the
/// record is free-form beyond what is declared); declared fields type-check.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    fn validate(&self, value: &Value) -> Result<(), String> {
        let Some(object) = value.as_object() else {
            return Err(format!("expected an object, got {}", json_type_name(value)));
        };
        for field in &self.fields {
            match object.get(&field.name) {
                None if field.required => {
                    return Err(format!("missing required field '{}'", field.name));
                }
                None => {}
                Some(v) if field.kind.matches(v) => {}
                Some(v) => {
                    return Err(format!(
                        "field '{}' expected {:?}, got {}",
                        field.name,
                        field.kind,
                        json_type_name(v)
                    ));
                }
            }
        }
        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// KindLayout
// ---------------------------------------------------------------------------

/// Storage strategy for a kind, fixed at registration.
#[derive(Debug, Clone)]
pub enum KindLayout {
    /// Bit-packed parallel scalar columns; the field list is the schema.
    Packed(Vec<PackedField>),
    /// Associative per-entity record with a declared (possibly open) schema.
    Unmanaged(Schema),
}

impl KindLayout {
    /// Validate candidate data against this layout.
    ///
    /// Packed layouts accept partial records (missing fields are filled from
    /// defaults by the caller) but reject unknown fields and wrong shapes.
    fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            KindLayout::Packed(fields) => {
                let Some(object) = value.as_object() else {
                    return Err(format!("expected an object, got {}", json_type_name(value)));
                };
                for (name, provided) in object {
                    let Some(field) = fields.iter().find(|f| &f.name == name) else {
                        return Err(format!("unknown field '{name}' for packed layout"));
                    };
                    if field.lanes == 1 {
                        if !provided.is_number() {
                            return Err(format!(
                                "field '{name}' expected a number, got {}",
                                json_type_name(provided)
                            ));
                        }
                    } else {
                        let ok = provided.as_array().is_some_and(|a| {
                            a.len() == field.lanes && a.iter().all(Value::is_number)
                        });
                        if !ok {
                            return Err(format!(
                                "field '{name}' expected an array of {} numbers",
                                field.lanes
                            ));
                        }
                    }
                }
                Ok(())
            }
            KindLayout::Unmanaged(schema) => schema.validate(value),
        }
    }

    /// Registration-time check for default data: it must validate, and for
    /// packed layouts it must be *complete* (every field present) because
    /// column writes always store the full record.
    fn validate_default(&self, default: &Value) -> Result<(), String> {
        self.validate(default)?;
        if let KindLayout::Packed(fields) = self {
            let object = default.as_object().expect("validated above");
            for field in fields {
                if !object.contains_key(&field.name) {
                    return Err(format!(
                        "packed default must include field '{}'",
                        field.name
                    ));
                }
            }
        }
        Ok(())
    }

    fn build_storage(&self) -> ComponentStorage {
        match self {
            KindLayout::Packed(fields) => ComponentStorage::Packed(PackedStore::new(fields.clone())),
            KindLayout::Unmanaged(_) => ComponentStorage::Sparse(SparseStore::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentDescriptor
// ---------------------------------------------------------------------------

/// Lifecycle callback invoked with the entity and the record involved.
pub type LifecycleHook = Box<dyn FnMut(EntityId, &Value)>;

/// Static registration record for a component kind.
pub struct ComponentDescriptor {
    pub(crate) id: String,
    pub(crate) layout: KindLayout,
    pub(crate) default_data: Value,
    pub(crate) requires: Vec<String>,
    pub(crate) conflicts: Vec<String>,
    pub(crate) removable: bool,
    pub(crate) on_add: Option<LifecycleHook>,
    pub(crate) on_remove: Option<LifecycleHook>,
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id)
            .field("layout", &self.layout)
            .field("removable", &self.removable)
            .field("requires", &self.requires)
            .field("conflicts", &self.conflicts)
            .finish()
    }
}

impl ComponentDescriptor {
    /// A bit-packed kind with the given field layout and default record.
    pub fn packed(id: impl Into<String>, fields: Vec<PackedField>, default_data: Value) -> Self {
        Self::with_layout(id, KindLayout::Packed(fields), default_data)
    }

    /// An unmanaged (associative) kind with a declared schema.
    pub fn unmanaged(id: impl Into<String>, schema: Schema, default_data: Value) -> Self {
        Self::with_layout(id, KindLayout::Unmanaged(schema), default_data)
    }

    fn with_layout(id: impl Into<String>, layout: KindLayout, default_data: Value) -> Self {
        Self {
            id: id.into(),
            layout,
            default_data,
            requires: Vec::new(),
            conflicts: Vec::new(),
            removable: true,
            on_add: None,
            on_remove: None,
        }
    }

    /// Kinds that must already be present on an entity before this one.
    pub fn requires(mut self, kinds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.requires = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Kinds that must be absent from an entity for this one to be added.
    pub fn conflicts(mut self, kinds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.conflicts = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the kind as not removable via `remove_component`. Entity
    /// teardown still clears it.
    pub fn non_removable(mut self) -> Self {
        self.removable = false;
        self
    }

    /// Callback invoked after the record is written.
    pub fn on_add(mut self, hook: impl FnMut(EntityId, &Value) + 'static) -> Self {
        self.on_add = Some(Box::new(hook));
        self
    }

    /// Callback invoked before the record is cleared, with the last data.
    pub fn on_remove(mut self, hook: impl FnMut(EntityId, &Value) + 'static) -> Self {
        self.on_remove = Some(Box::new(hook));
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

struct KindEntry {
    descriptor: ComponentDescriptor,
    storage: ComponentStorage,
}

/// Catalogue of component kinds plus the primary store behind them.
///
/// All mutating calls return the information the world needs to emit exactly
/// one event per successful mutation; the registry itself never talks to the
/// bus or the indices.
pub struct ComponentRegistry {
    by_name: HashMap<String, KindId>,
    kinds: Vec<KindEntry>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("kinds", &self.kinds.len())
            .finish()
    }
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            kinds: Vec::new(),
        }
    }

    // -- registration -------------------------------------------------------

    /// Register a kind.
    ///
    /// Duplicate registration of the same identifier is logged and ignored
    /// (the existing id is returned). A default record that fails the kind's
    /// own schema is a registration-time bug and returns
    /// [`EcsError::InvalidDefault`].
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Result<KindId, EcsError> {
        if let Some(&existing) = self.by_name.get(&descriptor.id) {
            tracing::warn!(kind = %descriptor.id, "duplicate kind registration ignored");
            return Ok(existing);
        }
        if let Err(details) = descriptor.layout.validate_default(&descriptor.default_data) {
            return Err(EcsError::InvalidDefault {
                kind: descriptor.id.clone(),
                details,
            });
        }
        let id = KindId(self.kinds.len() as u32);
        let storage = descriptor.layout.build_storage();
        self.by_name.insert(descriptor.id.clone(), id);
        self.kinds.push(KindEntry {
            descriptor,
            storage,
        });
        Ok(id)
    }

    /// Startup-time check that every `requires`/`conflicts` reference names a
    /// registered kind. Fails fast: an unresolved structural dependency is a
    /// programming error, not a runtime condition.
    pub fn validate_registrations(&self) -> Result<(), EcsError> {
        for entry in &self.kinds {
            for (list, names) in [
                ("requires", &entry.descriptor.requires),
                ("conflicts", &entry.descriptor.conflicts),
            ] {
                for name in names {
                    if !self.by_name.contains_key(name) {
                        return Err(EcsError::UnresolvedKindReference {
                            kind: entry.descriptor.id.clone(),
                            reference: name.clone(),
                            list,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    // -- lookups ------------------------------------------------------------

    /// Resolve a kind id from its stable string identifier.
    pub fn kind_id(&self, name: &str) -> Option<KindId> {
        self.by_name.get(name).copied()
    }

    /// The stable string identifier of a kind.
    pub fn kind_name(&self, id: KindId) -> Option<&str> {
        self.kinds
            .get(id.0 as usize)
            .map(|e| e.descriptor.id.as_str())
    }

    /// All registered kind identifiers, sorted.
    pub fn kind_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// All kind ids, in registration order.
    pub fn kind_ids(&self) -> impl Iterator<Item = KindId> + '_ {
        (0..self.kinds.len() as u32).map(KindId)
    }

    /// Number of registered kinds.
    pub fn kind_count(&self) -> usize {
        self.kinds.len()
    }

    // -- mutating component API ---------------------------------------------

    /// Add a component to an entity.
    ///
    /// `initial` is validated against the kind's schema; invalid input is
    /// logged and the kind's default data is used instead. Valid partial
    /// input is merged over the default. Returns the stored record so the
    /// caller can emit `component:added`, or `None` if the operation was a
    /// no-op (unknown kind, already present, dependency violation).
    pub fn add_component(
        &mut self,
        entity: EntityId,
        kind: &str,
        initial: Option<&Value>,
    ) -> Option<(KindId, Value)> {
        let Some(id) = self.kind_id(kind) else {
            tracing::warn!(%entity, kind, "add_component: unknown kind");
            return None;
        };
        if self.kinds[id.0 as usize].storage.contains(entity) {
            tracing::warn!(%entity, kind, "add_component: already present, use update_component");
            return None;
        }

        // Dependency and incompatibility checks against the live store.
        let (requires, conflicts) = {
            let d = &self.kinds[id.0 as usize].descriptor;
            (d.requires.clone(), d.conflicts.clone())
        };
        for required in &requires {
            if !self.has_component(entity, required) {
                tracing::warn!(%entity, kind, required, "add_component: missing required kind");
                return None;
            }
        }
        for conflicting in &conflicts {
            if self.has_component(entity, conflicting) {
                tracing::warn!(%entity, kind, conflicting, "add_component: conflicting kind present");
                return None;
            }
        }

        let entry = &mut self.kinds[id.0 as usize];
        let mut data = entry.descriptor.default_data.clone();
        if let Some(init) = initial {
            match entry.descriptor.layout.validate(init) {
                Ok(()) => data = merge_shallow(data, init),
                Err(details) => {
                    tracing::warn!(
                        %entity,
                        kind,
                        error = %details,
                        "add_component: invalid data, falling back to defaults"
                    );
                }
            }
        }

        entry.storage.write(entity, data.clone());
        if let Some(hook) = entry.descriptor.on_add.as_mut() {
            hook(entity, &data);
        }
        Some((id, data))
    }

    /// Merge partial data onto an existing record and re-validate the merged
    /// result. Rejects (and leaves storage untouched) if the merged record is
    /// invalid. Returns the new record for the `component:updated` event.
    pub fn update_component(
        &mut self,
        entity: EntityId,
        kind: &str,
        patch: &Value,
    ) -> Option<(KindId, Value)> {
        let Some(id) = self.kind_id(kind) else {
            tracing::warn!(%entity, kind, "update_component: unknown kind");
            return None;
        };
        let entry = &mut self.kinds[id.0 as usize];
        let Some(existing) = entry.storage.read(entity) else {
            tracing::warn!(%entity, kind, "update_component: no such component");
            return None;
        };

        let merged = merge_shallow(existing, patch);
        if let Err(details) = entry.descriptor.layout.validate(&merged) {
            tracing::warn!(
                %entity,
                kind,
                error = %details,
                "update_component: merged record invalid, rejecting"
            );
            return None;
        }
        entry.storage.write(entity, merged.clone());
        Some((id, merged))
    }

    /// Remove a component. No-op (returns `None`) if the kind is unknown,
    /// not present, or marked non-removable.
    pub fn remove_component(&mut self, entity: EntityId, kind: &str) -> Option<KindId> {
        let Some(id) = self.kind_id(kind) else {
            tracing::debug!(%entity, kind, "remove_component: unknown kind");
            return None;
        };
        let entry = &mut self.kinds[id.0 as usize];
        if !entry.descriptor.removable {
            tracing::warn!(%entity, kind, "remove_component: kind is non-removable");
            return None;
        }
        if !entry.storage.contains(entity) {
            return None;
        }
        let last = entry.storage.read(entity).unwrap_or(Value::Null);
        entry.storage.remove(entity);
        if let Some(hook) = entry.descriptor.on_remove.as_mut() {
            hook(entity, &last);
        }
        Some(id)
    }

    /// Entity teardown: clear every record for `entity`, regardless of the
    /// removable flag. Returns the cleared kinds in registration order so
    /// the caller can emit one `component:removed` per kind.
    pub fn remove_all_for_entity(&mut self, entity: EntityId) -> Vec<KindId> {
        let mut removed = Vec::new();
        for (index, entry) in self.kinds.iter_mut().enumerate() {
            if entry.storage.contains(entity) {
                let last = entry.storage.read(entity).unwrap_or(Value::Null);
                entry.storage.remove(entity);
                if let Some(hook) = entry.descriptor.on_remove.as_mut() {
                    hook(entity, &last);
                }
                removed.push(KindId(index as u32));
            }
        }
        removed
    }

    /// Drop every stored record but keep all registrations.
    pub fn clear_storage(&mut self) {
        for entry in &mut self.kinds {
            entry.storage.clear();
        }
    }

    // -- pure reads ---------------------------------------------------------

    /// The stored record for `(entity, kind)`, if any.
    pub fn get_component_data(&self, entity: EntityId, kind: &str) -> Option<Value> {
        let id = self.kind_id(kind)?;
        self.kinds[id.0 as usize].storage.read(entity)
    }

    /// Whether the store holds a record for `(entity, kind)`.
    pub fn has_component(&self, entity: EntityId, kind: &str) -> bool {
        self.kind_id(kind)
            .is_some_and(|id| self.kinds[id.0 as usize].storage.contains(entity))
    }

    /// Direct store scan of the ids carrying `kind`. Query code should go
    /// through the component index instead; this is the authoritative source
    /// used by rebuild and validation.
    pub fn entities_with(&self, id: KindId) -> Vec<EntityId> {
        self.kinds
            .get(id.0 as usize)
            .map(|e| e.storage.entity_ids())
            .unwrap_or_default()
    }

    /// Number of records stored for a kind.
    pub fn component_count(&self, kind: &str) -> usize {
        self.kind_id(kind)
            .map_or(0, |id| self.kinds[id.0 as usize].storage.count())
    }

    /// Total records across all kinds.
    pub fn total_component_count(&self) -> usize {
        self.kinds.iter().map(|e| e.storage.count()).sum()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow object merge: keys of `patch` override keys of `base`. Non-object
/// inputs fall back to the patch value wholesale.
fn merge_shallow(base: Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
            Value::Object(base)
        }
        (_, patch) => patch.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn transform_descriptor() -> ComponentDescriptor {
        ComponentDescriptor::packed(
            "Transform",
            vec![
                PackedField::f32_lanes("position", 3),
                PackedField::f32_lanes("scale", 3),
            ],
            json!({ "position": [0.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0] }),
        )
    }

    fn sound_descriptor() -> ComponentDescriptor {
        ComponentDescriptor::unmanaged(
            "Sound",
            Schema::new(vec![
                SchemaField::required("clip", ValueKind::String),
                SchemaField::optional("volume", ValueKind::Number),
            ]),
            json!({ "clip": "silence", "volume": 1.0 }),
        )
    }

    fn e(raw: u32) -> EntityId {
        EntityId::new(raw)
    }

    #[test]
    fn duplicate_registration_is_idempotent() {
        let mut reg = ComponentRegistry::new();
        let a = reg.register(transform_descriptor()).unwrap();
        let b = reg.register(transform_descriptor()).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.kind_count(), 1);
    }

    #[test]
    fn invalid_default_fails_registration() {
        let mut reg = ComponentRegistry::new();
        let bad = ComponentDescriptor::packed(
            "Broken",
            vec![PackedField::f32_lanes("position", 3)],
            json!({ "position": "not numbers" }),
        );
        assert!(matches!(
            reg.register(bad),
            Err(EcsError::InvalidDefault { .. })
        ));
    }

    #[test]
    fn incomplete_packed_default_fails_registration() {
        let mut reg = ComponentRegistry::new();
        let bad = ComponentDescriptor::packed(
            "Broken",
            vec![
                PackedField::f32_lanes("position", 3),
                PackedField::f32("mass"),
            ],
            json!({ "position": [0.0, 0.0, 0.0] }),
        );
        assert!(reg.register(bad).is_err());
    }

    #[test]
    fn unresolved_requires_fails_validation() {
        let mut reg = ComponentRegistry::new();
        reg.register(transform_descriptor().requires(["RigidBody"]))
            .unwrap();
        assert!(matches!(
            reg.validate_registrations(),
            Err(EcsError::UnresolvedKindReference { .. })
        ));
    }

    #[test]
    fn add_with_valid_partial_data_merges_over_default() {
        let mut reg = ComponentRegistry::new();
        reg.register(transform_descriptor()).unwrap();

        let (_, data) = reg
            .add_component(e(0), "Transform", Some(&json!({ "position": [1.0, 2.0, 3.0] })))
            .unwrap();
        assert_eq!(data["position"], json!([1.0, 2.0, 3.0]));
        assert_eq!(data["scale"], json!([1.0, 1.0, 1.0]), "default fills gaps");
    }

    #[test]
    fn add_with_invalid_data_falls_back_to_default() {
        let mut reg = ComponentRegistry::new();
        reg.register(transform_descriptor()).unwrap();

        let (_, data) = reg
            .add_component(e(0), "Transform", Some(&json!({ "position": "oops" })))
            .unwrap();
        assert_eq!(data["position"], json!([0.0, 0.0, 0.0]));
        assert_eq!(
            reg.get_component_data(e(0), "Transform").unwrap(),
            data,
            "stored record equals the validated default"
        );
    }

    #[test]
    fn integer_field_default_survives_fallback_exactly() {
        let mut reg = ComponentRegistry::new();
        reg.register(ComponentDescriptor::packed(
            "RigidBody",
            vec![PackedField::f32("mass"), PackedField::i32("body_type")],
            json!({ "mass": 1.0, "body_type": 0 }),
        ))
        .unwrap();

        reg.add_component(e(0), "RigidBody", Some(&json!({ "mass": "heavy" })))
            .unwrap();
        assert_eq!(
            reg.get_component_data(e(0), "RigidBody").unwrap(),
            json!({ "mass": 1.0, "body_type": 0 }),
            "fallback record must be Value-equal to the default, integers included"
        );
    }

    #[test]
    fn add_twice_is_rejected() {
        let mut reg = ComponentRegistry::new();
        reg.register(transform_descriptor()).unwrap();
        assert!(reg.add_component(e(0), "Transform", None).is_some());
        assert!(reg.add_component(e(0), "Transform", None).is_none());
    }

    #[test]
    fn requires_and_conflicts_are_enforced() {
        let mut reg = ComponentRegistry::new();
        reg.register(transform_descriptor()).unwrap();
        reg.register(sound_descriptor()).unwrap();
        reg.register(
            ComponentDescriptor::unmanaged("Static", Schema::default(), json!({}))
                .requires(["Transform"])
                .conflicts(["Sound"]),
        )
        .unwrap();
        reg.validate_registrations().unwrap();

        // Missing Transform.
        assert!(reg.add_component(e(1), "Static", None).is_none());

        reg.add_component(e(1), "Transform", None).unwrap();
        reg.add_component(e(1), "Sound", None).unwrap();
        // Conflicting Sound present.
        assert!(reg.add_component(e(1), "Static", None).is_none());

        reg.remove_component(e(1), "Sound").unwrap();
        assert!(reg.add_component(e(1), "Static", None).is_some());
    }

    #[test]
    fn update_validates_merged_result() {
        let mut reg = ComponentRegistry::new();
        reg.register(sound_descriptor()).unwrap();
        reg.add_component(e(0), "Sound", None).unwrap();

        // Valid patch merges.
        let (_, merged) = reg
            .update_component(e(0), "Sound", &json!({ "volume": 0.25 }))
            .unwrap();
        assert_eq!(merged["volume"], json!(0.25));
        assert_eq!(merged["clip"], json!("silence"));

        // Patch that breaks the merged record is rejected, storage untouched.
        assert!(reg
            .update_component(e(0), "Sound", &json!({ "clip": 99 }))
            .is_none());
        assert_eq!(
            reg.get_component_data(e(0), "Sound").unwrap()["clip"],
            json!("silence")
        );
    }

    #[test]
    fn update_absent_component_is_rejected() {
        let mut reg = ComponentRegistry::new();
        reg.register(sound_descriptor()).unwrap();
        assert!(reg
            .update_component(e(0), "Sound", &json!({ "volume": 0.5 }))
            .is_none());
    }

    #[test]
    fn non_removable_kind_survives_remove_but_not_teardown() {
        let mut reg = ComponentRegistry::new();
        reg.register(
            ComponentDescriptor::unmanaged("Core", Schema::default(), json!({})).non_removable(),
        )
        .unwrap();
        reg.add_component(e(0), "Core", None).unwrap();

        assert!(reg.remove_component(e(0), "Core").is_none());
        assert!(reg.has_component(e(0), "Core"));

        let removed = reg.remove_all_for_entity(e(0));
        assert_eq!(removed.len(), 1);
        assert!(!reg.has_component(e(0), "Core"));
    }

    #[test]
    fn lifecycle_hooks_fire() {
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let added = log.clone();
        let removed = log.clone();

        let mut reg = ComponentRegistry::new();
        reg.register(
            sound_descriptor()
                .on_add(move |entity, data| {
                    added
                        .borrow_mut()
                        .push(format!("add {entity} {}", data["clip"]));
                })
                .on_remove(move |entity, _| removed.borrow_mut().push(format!("remove {entity}"))),
        )
        .unwrap();

        reg.add_component(e(3), "Sound", Some(&json!({ "clip": "boom" })))
            .unwrap();
        reg.remove_component(e(3), "Sound").unwrap();

        assert_eq!(
            log.borrow().as_slice(),
            ["add 3 \"boom\"".to_owned(), "remove 3".to_owned()]
        );
    }

    #[test]
    fn reads_on_unknown_kind_are_empty_not_errors() {
        let reg = ComponentRegistry::new();
        assert_eq!(reg.get_component_data(e(0), "Nope"), None);
        assert!(!reg.has_component(e(0), "Nope"));
        assert_eq!(reg.component_count("Nope"), 0);
    }
}
