//! Component storage strategies.
//!
//! A component kind stores its data in one of two ways, chosen once at
//! registration time:
//!
//! - [`PackedStore`] — one parallel scalar column per field lane, indexed by
//!   the raw entity id. Cache-friendly bulk layout for fixed-shape kinds
//!   (transforms, velocities, ...).
//! - [`SparseStore`] — an associative `EntityId -> Value` map for unmanaged
//!   kinds whose shape is free-form.
//!
//! Both sides expose the same contains/read/write/remove surface through the
//! [`ComponentStorage`] enum, so the registry never branches on layout
//! outside this module.

use std::collections::HashMap;

use serde_json::Value;

use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// Packed field layout
// ---------------------------------------------------------------------------

/// Scalar element type of a packed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    F32,
    I32,
}

/// One fixed-layout field of a packed kind.
///
/// `lanes == 1` means the JSON value is a bare number; `lanes > 1` means a
/// JSON array with exactly that many numeric elements (e.g. a position is
/// `{ "lanes": 3, "ty": F32 }`).
#[derive(Debug, Clone)]
pub struct PackedField {
    pub name: String,
    pub ty: ScalarType,
    pub lanes: usize,
}

impl PackedField {
    /// Shorthand for a single-lane `f32` field.
    pub fn f32(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ScalarType::F32,
            lanes: 1,
        }
    }

    /// Shorthand for a multi-lane `f32` field (vectors, quaternions, colors).
    pub fn f32_lanes(name: impl Into<String>, lanes: usize) -> Self {
        Self {
            name: name.into(),
            ty: ScalarType::F32,
            lanes,
        }
    }

    /// Shorthand for a single-lane `i32` field.
    pub fn i32(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ScalarType::I32,
            lanes: 1,
        }
    }
}

/// A column of scalars, `lanes` values per entity slot.
#[derive(Debug, Clone)]
enum Column {
    F32(Vec<f32>),
    I32(Vec<i32>),
}

impl Column {
    fn new(ty: ScalarType) -> Self {
        match ty {
            ScalarType::F32 => Column::F32(Vec::new()),
            ScalarType::I32 => Column::I32(Vec::new()),
        }
    }

    fn grow_to(&mut self, len: usize) {
        match self {
            Column::F32(v) => {
                if v.len() < len {
                    v.resize(len, 0.0);
                }
            }
            Column::I32(v) => {
                if v.len() < len {
                    v.resize(len, 0);
                }
            }
        }
    }

    fn clear(&mut self) {
        match self {
            Column::F32(v) => v.clear(),
            Column::I32(v) => v.clear(),
        }
    }
}

// ---------------------------------------------------------------------------
// PackedStore
// ---------------------------------------------------------------------------

/// Fixed-layout storage: one scalar column per field, indexed by entity id,
/// plus a presence bitmap.
#[derive(Debug, Clone)]
pub struct PackedStore {
    fields: Vec<PackedField>,
    columns: Vec<Column>,
    present: Vec<bool>,
    count: usize,
}

impl PackedStore {
    /// Create a store for the given field layout.
    pub fn new(fields: Vec<PackedField>) -> Self {
        let columns = fields.iter().map(|f| Column::new(f.ty)).collect();
        Self {
            fields,
            columns,
            present: Vec::new(),
            count: 0,
        }
    }

    /// The field layout this store was built with.
    pub fn fields(&self) -> &[PackedField] {
        &self.fields
    }

    fn slot(&self, entity: EntityId) -> usize {
        entity.to_raw() as usize
    }

    fn grow_to(&mut self, slot: usize) {
        if self.present.len() <= slot {
            self.present.resize(slot + 1, false);
        }
        for (field, column) in self.fields.iter().zip(self.columns.iter_mut()) {
            column.grow_to((slot + 1) * field.lanes);
        }
    }

    /// Write a full, already-validated record for `entity`. Every field of
    /// the layout must be present in `data`; callers merge against defaults
    /// before writing.
    pub fn write(&mut self, entity: EntityId, data: &Value) {
        let slot = self.slot(entity);
        self.grow_to(slot);
        if !self.present[slot] {
            self.present[slot] = true;
            self.count += 1;
        }
        for (field, column) in self.fields.iter().zip(self.columns.iter_mut()) {
            let value = &data[&field.name];
            let base = slot * field.lanes;
            match column {
                Column::F32(col) => {
                    for lane in 0..field.lanes {
                        col[base + lane] = lane_f64(value, field.lanes, lane) as f32;
                    }
                }
                Column::I32(col) => {
                    for lane in 0..field.lanes {
                        col[base + lane] = lane_f64(value, field.lanes, lane) as i32;
                    }
                }
            }
        }
    }

    /// Reassemble the record for `entity` from the columns.
    pub fn read(&self, entity: EntityId) -> Option<Value> {
        let slot = self.slot(entity);
        if !self.present.get(slot).copied().unwrap_or(false) {
            return None;
        }
        let mut object = serde_json::Map::with_capacity(self.fields.len());
        for (field, column) in self.fields.iter().zip(self.columns.iter()) {
            let base = slot * field.lanes;
            // I32 lanes must come back as JSON integers, not floats, so the
            // reassembled record stays `Value`-equal to what was validated.
            let value = match column {
                Column::F32(col) => lanes_to_value(
                    (0..field.lanes)
                        .map(|lane| float_value(f64::from(col[base + lane])))
                        .collect(),
                    field.lanes,
                ),
                Column::I32(col) => lanes_to_value(
                    (0..field.lanes)
                        .map(|lane| Value::from(col[base + lane]))
                        .collect(),
                    field.lanes,
                ),
            };
            object.insert(field.name.clone(), value);
        }
        Some(Value::Object(object))
    }

    /// Clear the record for `entity`. Returns `false` if nothing was stored.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        let slot = self.slot(entity);
        match self.present.get_mut(slot) {
            Some(p) if *p => {
                *p = false;
                self.count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Whether a record exists for `entity`.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.present
            .get(self.slot(entity))
            .copied()
            .unwrap_or(false)
    }

    /// Number of stored records.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Iterate ids with a stored record, ascending.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.present
            .iter()
            .enumerate()
            .filter(|(_, p)| **p)
            .map(|(i, _)| EntityId::new(i as u32))
    }

    /// Drop all records but keep the layout.
    pub fn clear(&mut self) {
        self.present.clear();
        self.count = 0;
        for column in &mut self.columns {
            column.clear();
        }
    }
}

/// Read lane `lane` out of a JSON value that is either a bare number
/// (`lanes == 1`) or an array of numbers.
fn lane_f64(value: &Value, lanes: usize, lane: usize) -> f64 {
    if lanes == 1 {
        value.as_f64().unwrap_or(0.0)
    } else {
        value
            .get(lane)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn lanes_to_value(mut collected: Vec<Value>, lanes: usize) -> Value {
    if lanes == 1 {
        collected.pop().unwrap_or(Value::Null)
    } else {
        Value::Array(collected)
    }
}

// ---------------------------------------------------------------------------
// SparseStore
// ---------------------------------------------------------------------------

/// Associative storage for unmanaged kinds: the record is kept verbatim.
#[derive(Debug, Clone, Default)]
pub struct SparseStore {
    records: HashMap<EntityId, Value>,
}

impl SparseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, entity: EntityId, data: Value) {
        self.records.insert(entity, data);
    }

    pub fn read(&self, entity: EntityId) -> Option<&Value> {
        self.records.get(&entity)
    }

    pub fn remove(&mut self, entity: EntityId) -> bool {
        self.records.remove(&entity).is_some()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.records.contains_key(&entity)
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.records.keys().copied()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

// ---------------------------------------------------------------------------
// ComponentStorage
// ---------------------------------------------------------------------------

/// Tagged union over the two storage strategies.
#[derive(Debug, Clone)]
pub enum ComponentStorage {
    Packed(PackedStore),
    Sparse(SparseStore),
}

impl ComponentStorage {
    /// Store (or overwrite) a full validated record.
    pub fn write(&mut self, entity: EntityId, data: Value) {
        match self {
            ComponentStorage::Packed(store) => store.write(entity, &data),
            ComponentStorage::Sparse(store) => store.write(entity, data),
        }
    }

    /// Resolve the record for `entity`, owned. Packed records are
    /// reassembled from columns; sparse records are cloned.
    pub fn read(&self, entity: EntityId) -> Option<Value> {
        match self {
            ComponentStorage::Packed(store) => store.read(entity),
            ComponentStorage::Sparse(store) => store.read(entity).cloned(),
        }
    }

    pub fn remove(&mut self, entity: EntityId) -> bool {
        match self {
            ComponentStorage::Packed(store) => store.remove(entity),
            ComponentStorage::Sparse(store) => store.remove(entity),
        }
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        match self {
            ComponentStorage::Packed(store) => store.contains(entity),
            ComponentStorage::Sparse(store) => store.contains(entity),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            ComponentStorage::Packed(store) => store.count(),
            ComponentStorage::Sparse(store) => store.count(),
        }
    }

    /// Ids with a stored record, collected. Order is ascending for packed
    /// stores and unspecified for sparse ones.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        match self {
            ComponentStorage::Packed(store) => store.entities().collect(),
            ComponentStorage::Sparse(store) => store.entities().collect(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            ComponentStorage::Packed(store) => store.clear(),
            ComponentStorage::Sparse(store) => store.clear(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transform_store() -> PackedStore {
        PackedStore::new(vec![
            PackedField::f32_lanes("position", 3),
            PackedField::f32_lanes("scale", 3),
            PackedField::f32("opacity"),
        ])
    }

    #[test]
    fn packed_write_read_roundtrip() {
        let mut store = transform_store();
        let e = EntityId::new(4);
        store.write(
            e,
            &json!({ "position": [1.0, 2.0, 3.0], "scale": [1.0, 1.0, 1.0], "opacity": 0.5 }),
        );

        let back = store.read(e).unwrap();
        assert_eq!(back["position"], json!([1.0, 2.0, 3.0]));
        assert_eq!(back["opacity"], json!(0.5));
        assert!(store.contains(e));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn packed_remove_clears_presence_only() {
        let mut store = transform_store();
        let a = EntityId::new(0);
        let b = EntityId::new(9);
        let record = json!({ "position": [0.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0], "opacity": 1.0 });
        store.write(a, &record);
        store.write(b, &record);

        assert!(store.remove(a));
        assert!(!store.remove(a));
        assert!(!store.contains(a));
        assert!(store.contains(b));
        assert_eq!(store.count(), 1);
        assert_eq!(store.entities().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn i32_fields_round_trip_as_integers() {
        let mut store = PackedStore::new(vec![
            PackedField::i32("body_type"),
            PackedField::f32("mass"),
        ]);
        let e = EntityId::new(0);
        store.write(e, &json!({ "body_type": 2, "mass": 1.0 }));

        let back = store.read(e).unwrap();
        assert_eq!(back["body_type"], json!(2), "must be an integer, not 2.0");
        assert!(back["body_type"].is_i64());
        assert_eq!(back["mass"], json!(1.0));
    }

    #[test]
    fn packed_read_absent_is_none() {
        let store = transform_store();
        assert_eq!(store.read(EntityId::new(3)), None);
    }

    #[test]
    fn packed_overwrite_keeps_count() {
        let mut store = transform_store();
        let e = EntityId::new(1);
        store.write(
            e,
            &json!({ "position": [1.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0], "opacity": 1.0 }),
        );
        store.write(
            e,
            &json!({ "position": [5.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0], "opacity": 1.0 }),
        );
        assert_eq!(store.count(), 1);
        assert_eq!(store.read(e).unwrap()["position"], json!([5.0, 0.0, 0.0]));
    }

    #[test]
    fn sparse_roundtrip_and_remove() {
        let mut store = SparseStore::new();
        let e = EntityId::new(2);
        store.write(e, json!({ "clip": "explosion", "volume": 0.8 }));
        assert_eq!(store.read(e).unwrap()["clip"], json!("explosion"));
        assert!(store.remove(e));
        assert!(!store.contains(e));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn storage_enum_delegates() {
        let mut storage = ComponentStorage::Packed(transform_store());
        let e = EntityId::new(0);
        storage.write(
            e,
            json!({ "position": [1.0, 2.0, 3.0], "scale": [1.0, 1.0, 1.0], "opacity": 1.0 }),
        );
        assert!(storage.contains(e));
        assert_eq!(storage.entity_ids(), vec![e]);
        storage.clear();
        assert_eq!(storage.count(), 0);
    }
}
