//! Spatial Broad Phase
//!
//! Uniform grid over the arena. Entities are re-inserted every tick and
//! queries return candidates from overlapping cells only, so collision
//! tests stay near-linear instead of all-pairs. Results are sorted and
//! deduplicated to keep iteration order independent of insertion order.

use crate::core::vec2::Vec2;

/// Broad-phase entity category, used to filter queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityTag {
    /// A participant's avatar.
    Player,
    /// A live projectile.
    Projectile,
}

#[derive(Clone, Debug)]
struct Entry<T> {
    payload: T,
    tag: EntityTag,
    position: Vec2,
    radius: f32,
}

/// Uniform spatial hash grid.
#[derive(Clone, Debug)]
pub struct SpatialGrid<T> {
    cell_size: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<Entry<T>>>,
}

impl<T: Copy + Ord> SpatialGrid<T> {
    /// Build a grid covering `width` x `height` with square cells of
    /// `cell_size`.
    pub fn new(width: f32, height: f32, cell_size: f32) -> Self {
        let cols = (width / cell_size).ceil().max(1.0) as usize;
        let rows = (height / cell_size).ceil().max(1.0) as usize;
        Self {
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
        }
    }

    /// Remove all entries, keeping cell allocations for the next tick.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    fn cell_index(&self, col: usize, row: usize) -> usize {
        row * self.cols + col
    }

    /// Cell range overlapped by a circle, clamped to the grid. Positions
    /// outside the grid land in the nearest border cell.
    fn cell_range(&self, position: Vec2, radius: f32) -> (usize, usize, usize, usize) {
        let clamp_col = |x: f32| {
            ((x / self.cell_size).floor().max(0.0) as usize).min(self.cols - 1)
        };
        let clamp_row = |y: f32| {
            ((y / self.cell_size).floor().max(0.0) as usize).min(self.rows - 1)
        };
        (
            clamp_col(position.x - radius),
            clamp_col(position.x + radius),
            clamp_row(position.y - radius),
            clamp_row(position.y + radius),
        )
    }

    /// Insert an entity into every cell its circle overlaps.
    pub fn insert(&mut self, payload: T, tag: EntityTag, position: Vec2, radius: f32) {
        let (c0, c1, r0, r1) = self.cell_range(position, radius);
        for row in r0..=r1 {
            for col in c0..=c1 {
                let idx = self.cell_index(col, row);
                self.cells[idx].push(Entry {
                    payload,
                    tag,
                    position,
                    radius,
                });
            }
        }
    }

    /// Candidates whose circles intersect the query circle, optionally
    /// restricted to one tag. Sorted and deduplicated.
    pub fn query(&self, position: Vec2, radius: f32, tag: Option<EntityTag>) -> Vec<T> {
        let (c0, c1, r0, r1) = self.cell_range(position, radius);
        let mut hits = Vec::new();
        for row in r0..=r1 {
            for col in c0..=c1 {
                for entry in &self.cells[self.cell_index(col, row)] {
                    if tag.is_some_and(|t| t != entry.tag) {
                        continue;
                    }
                    let reach = radius + entry.radius;
                    if entry.position.distance_squared(position) <= reach * reach {
                        hits.push(entry.payload);
                    }
                }
            }
        }
        hits.sort_unstable();
        hits.dedup();
        hits
    }
}
