//! Fog-of-war polygons stored as grid-coordinate vertices.

use crate::grid::{GridLayout, GridPosition, PixelPosition};
use kurbo::{BezPath, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Minimum vertex count of a renderable polygon.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Vertices closer than this (in grid units) are treated as duplicates.
const DUPLICATE_EPSILON: f64 = 1e-9;

/// An admin-editable polygon hiding part of the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogShape {
    pub id: String,
    #[serde(default)]
    pub points: Vec<GridPosition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FogShape {
    /// Create a new fog shape with a fresh id.
    pub fn new(points: Vec<GridPosition>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            points,
            extra: Map::new(),
        }
    }

    /// Whether the polygon has enough vertices to draw.
    pub fn is_renderable(&self) -> bool {
        self.points.len() >= MIN_POLYGON_POINTS
    }

    /// Pixel vertices for rendering; empty when the polygon is degenerate.
    pub fn render_points(&self, layout: &GridLayout) -> Vec<PixelPosition> {
        if !self.is_renderable() {
            return Vec::new();
        }
        self.points.iter().map(|p| layout.to_pixel(*p)).collect()
    }

    /// Non-zero winding hit test in grid space.
    pub fn contains(&self, point: GridPosition) -> bool {
        if !self.is_renderable() {
            return false;
        }
        self.path().contains(point.to_point())
    }

    fn path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut iter = self.points.iter();
        if let Some(first) = iter.next() {
            path.move_to(first.to_point());
            for p in iter {
                path.line_to(p.to_point());
            }
            path.close_path();
        }
        path
    }

    /// Move one vertex. Returns false if the index is out of range.
    pub fn move_point(&mut self, index: usize, position: GridPosition) -> bool {
        match self.points.get_mut(index) {
            Some(p) => {
                *p = position;
                true
            }
            None => false,
        }
    }

    /// Insert a vertex after `index` (use `len - 1` to append).
    pub fn insert_point(&mut self, index: usize, position: GridPosition) -> bool {
        if self.points.is_empty() && index == 0 {
            self.points.push(position);
            return true;
        }
        if index >= self.points.len() {
            return false;
        }
        self.points.insert(index + 1, position);
        true
    }

    /// Remove a vertex. Refuses to drop a renderable polygon below
    /// [`MIN_POLYGON_POINTS`].
    pub fn remove_point(&mut self, index: usize) -> bool {
        if index >= self.points.len() || self.points.len() <= MIN_POLYGON_POINTS {
            return false;
        }
        self.points.remove(index);
        true
    }

    /// Collapse duplicate vertices in place. See [`collapse_duplicates`].
    pub fn cleanup(&mut self) {
        self.points = collapse_duplicates(&self.points);
    }
}

fn same_position(a: &GridPosition, b: &GridPosition) -> bool {
    (a.x - b.x).abs() <= DUPLICATE_EPSILON && (a.y - b.y).abs() <= DUPLICATE_EPSILON
}

/// Remove vertices that repeat an earlier position, keeping first
/// occurrences in order. If fewer than [`MIN_POLYGON_POINTS`] would
/// survive, the input points are returned unchanged.
pub fn collapse_duplicates(points: &[GridPosition]) -> Vec<GridPosition> {
    let mut kept: Vec<GridPosition> = Vec::with_capacity(points.len());
    for p in points {
        if !kept.iter().any(|k| same_position(k, p)) {
            kept.push(*p);
        }
    }
    if kept.len() < MIN_POLYGON_POINTS {
        return points.to_vec();
    }
    kept
}
