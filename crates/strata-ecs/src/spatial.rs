//! Uniform-grid spatial index for proximity and region queries.
//!
//! Entity positions are hashed into cubic cells keyed by floored integer
//! coordinates. Region queries touch only the cells overlapping the query
//! volume, so cost scales with the volume searched rather than the number of
//! entities in the world.

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::entity::EntityId;

/// Default cell edge length in world units.
pub const DEFAULT_CELL_SIZE: f32 = 10.0;

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Whether `point` lies inside the box (inclusive on all faces).
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

type CellKey = (i32, i32, i32);

/// Hash grid over entity positions.
///
/// Not self-maintaining: the world forwards position changes here explicitly
/// (positions are packed scalar data, and data updates do not flow through
/// the membership event stream).
#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<CellKey, HashSet<EntityId>>,
    /// Reverse map so updates and removals need no search.
    positions: HashMap<EntityId, Vec3>,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

impl SpatialGrid {
    /// A grid with the given cell edge length. Sizes that are not positive
    /// and finite fall back to [`DEFAULT_CELL_SIZE`].
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            tracing::warn!(cell_size, "invalid grid cell size, using default");
            DEFAULT_CELL_SIZE
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn key_for(&self, position: Vec3) -> CellKey {
        let scaled = (position / self.cell_size).floor();
        (scaled.x as i32, scaled.y as i32, scaled.z as i32)
    }

    /// Record or move an entity's position. Cheap when the entity stays in
    /// the same cell.
    pub fn update_position(&mut self, entity: EntityId, position: Vec3) {
        let new_key = self.key_for(position);
        if let Some(old) = self.positions.insert(entity, position) {
            let old_key = self.key_for(old);
            if old_key == new_key {
                return;
            }
            self.evict(old_key, entity);
        }
        self.cells.entry(new_key).or_default().insert(entity);
    }

    /// Drop an entity from the grid. No-op for untracked entities.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        match self.positions.remove(&entity) {
            Some(position) => {
                let key = self.key_for(position);
                self.evict(key, entity);
                true
            }
            None => false,
        }
    }

    fn evict(&mut self, key: CellKey, entity: EntityId) {
        if let Some(cell) = self.cells.get_mut(&key) {
            cell.remove(&entity);
            if cell.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    /// Last position recorded for `entity`, if tracked.
    pub fn position(&self, entity: EntityId) -> Option<Vec3> {
        self.positions.get(&entity).copied()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate every tracked entity with its recorded position.
    pub fn iter_tracked(&self) -> impl Iterator<Item = (EntityId, Vec3)> + '_ {
        self.positions.iter().map(|(e, p)| (*e, *p))
    }

    /// Number of occupied cells. Diagnostics only.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Entities whose position lies inside `bounds`, sorted.
    ///
    /// Visits each cell overlapping the box, then point-tests candidates to
    /// filter out the corners of boundary cells.
    pub fn query_bounds(&self, bounds: Aabb) -> Vec<EntityId> {
        let lo = self.key_for(bounds.min);
        let hi = self.key_for(bounds.max);
        let mut out = Vec::new();
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                for z in lo.2..=hi.2 {
                    let Some(cell) = self.cells.get(&(x, y, z)) else {
                        continue;
                    };
                    for &entity in cell {
                        if bounds.contains(self.positions[&entity]) {
                            out.push(entity);
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    /// Entities within `radius` of `center` (inclusive), sorted. Candidates
    /// come from the bounding box of the sphere and are distance-tested.
    pub fn query_radius(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        if !(radius.is_finite() && radius >= 0.0) {
            tracing::warn!(radius, "invalid radius query, returning empty");
            return Vec::new();
        }
        let extent = Vec3::splat(radius);
        let bounds = Aabb::new(center - extent, center + extent);
        let lo = self.key_for(bounds.min);
        let hi = self.key_for(bounds.max);
        let r2 = radius * radius;

        let mut out = Vec::new();
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                for z in lo.2..=hi.2 {
                    let Some(cell) = self.cells.get(&(x, y, z)) else {
                        continue;
                    };
                    for &entity in cell {
                        if self.positions[&entity].distance_squared(center) <= r2 {
                            out.push(entity);
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.positions.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn e(raw: u32) -> EntityId {
        EntityId::new(raw)
    }

    #[test]
    fn update_then_query_bounds() {
        let mut grid = SpatialGrid::new(10.0);
        grid.update_position(e(1), Vec3::new(1.0, 1.0, 1.0));
        grid.update_position(e(2), Vec3::new(25.0, 0.0, 0.0));
        grid.update_position(e(3), Vec3::new(-5.0, 0.0, 0.0));

        let found = grid.query_bounds(Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)));
        assert_eq!(found, vec![e(1), e(3)]);
    }

    #[test]
    fn moving_entity_changes_cell() {
        let mut grid = SpatialGrid::new(10.0);
        grid.update_position(e(1), Vec3::ZERO);
        grid.update_position(e(1), Vec3::new(100.0, 0.0, 0.0));

        assert!(grid
            .query_bounds(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)))
            .is_empty());
        assert_eq!(
            grid.query_radius(Vec3::new(100.0, 0.0, 0.0), 1.0),
            vec![e(1)]
        );
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn radius_query_is_spherical_not_cubic() {
        let mut grid = SpatialGrid::new(10.0);
        // Inside the bounding cube of the sphere but outside the sphere.
        grid.update_position(e(1), Vec3::new(9.0, 9.0, 9.0));
        grid.update_position(e(2), Vec3::new(5.0, 0.0, 0.0));

        assert_eq!(grid.query_radius(Vec3::ZERO, 10.0), vec![e(2)]);
    }

    #[test]
    fn radius_is_inclusive_at_boundary() {
        let mut grid = SpatialGrid::new(10.0);
        grid.update_position(e(1), Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(grid.query_radius(Vec3::ZERO, 10.0), vec![e(1)]);
    }

    #[test]
    fn negative_coordinates_floor_correctly() {
        let mut grid = SpatialGrid::new(10.0);
        grid.update_position(e(1), Vec3::new(-0.5, 0.0, 0.0));
        grid.update_position(e(2), Vec3::new(0.5, 0.0, 0.0));
        // Straddles the cell boundary at x = 0.
        let found = grid.query_bounds(Aabb::new(
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ));
        assert_eq!(found, vec![e(1), e(2)]);
    }

    #[test]
    fn remove_untracked_is_noop() {
        let mut grid = SpatialGrid::new(10.0);
        assert!(!grid.remove(e(9)));
        grid.update_position(e(9), Vec3::ZERO);
        assert!(grid.remove(e(9)));
        assert!(grid.is_empty());
        assert_eq!(grid.occupied_cells(), 0);
    }

    #[test]
    fn bad_cell_size_falls_back_to_default() {
        let grid = SpatialGrid::new(0.0);
        assert_eq!(grid.cell_size(), DEFAULT_CELL_SIZE);
        let grid = SpatialGrid::new(f32::NAN);
        assert_eq!(grid.cell_size(), DEFAULT_CELL_SIZE);
    }

    #[test]
    fn invalid_radius_returns_empty() {
        let mut grid = SpatialGrid::new(10.0);
        grid.update_position(e(1), Vec3::ZERO);
        assert!(grid.query_radius(Vec3::ZERO, -1.0).is_empty());
        assert!(grid.query_radius(Vec3::ZERO, f32::NAN).is_empty());
    }
}
