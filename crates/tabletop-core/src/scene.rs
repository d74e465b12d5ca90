//! The shared scene: maps, grid, initiative, markers and fog.

use crate::fog::FogShape;
use crate::grid::{GridLayout, GridPosition, GridSettings, PixelPosition};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use uuid::Uuid;

/// Where an element sits, in the units it was stored in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    Grid(GridPosition),
    Pixel(PixelPosition),
}

impl Anchor {
    fn from_stored(position: Point, use_grid_coordinates: bool) -> Self {
        if use_grid_coordinates {
            Anchor::Grid(position.into())
        } else {
            Anchor::Pixel(position.into())
        }
    }

    /// The raw stored point, in whichever units the anchor uses.
    pub fn stored_point(self) -> Point {
        match self {
            Anchor::Grid(g) => g.to_point(),
            Anchor::Pixel(p) => p.to_point(),
        }
    }

    /// Resolve to pixels against the current grid.
    pub fn to_pixel(self, layout: &GridLayout) -> PixelPosition {
        match self {
            Anchor::Grid(g) => layout.to_pixel(g),
            Anchor::Pixel(p) => p,
        }
    }
}

fn stored_from_pixel(pixel: PixelPosition, use_grid_coordinates: bool, layout: &GridLayout) -> Point {
    if use_grid_coordinates {
        layout.to_grid(pixel).to_point()
    } else {
        pixel.to_point()
    }
}

fn default_scale() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// A map image placed in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLayer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub position: Point,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub use_grid_coordinates: bool,
    #[serde(default)]
    pub use_grid_scaling: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MapLayer {
    pub fn new(name: impl Into<String>, file_path: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            file_path,
            position: Point::ZERO,
            scale: 1.0,
            rotation: 0.0,
            use_grid_coordinates: true,
            use_grid_scaling: false,
            extra: Map::new(),
        }
    }

    pub fn anchor(&self) -> Anchor {
        Anchor::from_stored(self.position, self.use_grid_coordinates)
    }

    pub fn pixel_position(&self, layout: &GridLayout) -> PixelPosition {
        self.anchor().to_pixel(layout)
    }

    /// Store a pixel position in this layer's own units.
    pub fn set_pixel_position(&mut self, pixel: PixelPosition, layout: &GridLayout) {
        self.position = stored_from_pixel(pixel, self.use_grid_coordinates, layout);
    }

    pub fn effective_scale(&self, layout: &GridLayout) -> f64 {
        layout.effective_scale(self.scale, self.use_grid_scaling)
    }
}

/// Shape of an area-of-effect marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerShape {
    #[default]
    Circle,
    Square,
    Cone,
    Line,
}

/// An area-of-effect indicator placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AoeMarker {
    pub id: String,
    #[serde(default)]
    pub shape: MarkerShape,
    #[serde(default)]
    pub position: Point,
    /// Extent in cells when grid coordinates are used, pixels otherwise.
    #[serde(default = "default_scale")]
    pub size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub use_grid_coordinates: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AoeMarker {
    pub fn new(shape: MarkerShape, position: GridPosition, size: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            shape,
            position: position.to_point(),
            size,
            color: None,
            rotation: 0.0,
            use_grid_coordinates: true,
            extra: Map::new(),
        }
    }

    pub fn anchor(&self) -> Anchor {
        Anchor::from_stored(self.position, self.use_grid_coordinates)
    }

    pub fn pixel_position(&self, layout: &GridLayout) -> PixelPosition {
        self.anchor().to_pixel(layout)
    }

    pub fn set_pixel_position(&mut self, pixel: PixelPosition, layout: &GridLayout) {
        self.position = stored_from_pixel(pixel, self.use_grid_coordinates, layout);
    }

    /// Marker extent in pixels.
    pub fn pixel_size(&self, layout: &GridLayout) -> f64 {
        if self.use_grid_coordinates {
            self.size * layout.cell_size().width
        } else {
            self.size
        }
    }
}

/// One combatant in the initiative order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiativeEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub initiative: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InitiativeEntry {
    pub fn new(name: impl Into<String>, initiative: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            initiative,
            extra: Map::new(),
        }
    }
}

/// The synchronized unit shared between the admin and viewers.
///
/// Always broadcast in full; fields this client does not model are kept
/// in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default)]
    pub maps: Vec<MapLayer>,
    #[serde(default)]
    pub active_map_id: Option<String>,
    #[serde(default)]
    pub grid_settings: GridSettings,
    #[serde(default)]
    pub initiative_order: Vec<InitiativeEntry>,
    #[serde(default)]
    pub markers: Vec<AoeMarker>,
    #[serde(default)]
    pub fog_of_war: Vec<FogShape>,
    #[serde(default = "default_true")]
    pub show_current_player: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl Scene {
    /// Create an empty scene with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            folder: None,
            maps: Vec::new(),
            active_map_id: None,
            grid_settings: GridSettings::default(),
            initiative_order: Vec::new(),
            markers: Vec::new(),
            fog_of_war: Vec::new(),
            show_current_player: true,
            extra: Map::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn map(&self, id: &str) -> Option<&MapLayer> {
        self.maps.iter().find(|m| m.id == id)
    }

    pub fn map_mut(&mut self, id: &str) -> Option<&mut MapLayer> {
        self.maps.iter_mut().find(|m| m.id == id)
    }

    pub fn active_map(&self) -> Option<&MapLayer> {
        self.active_map_id.as_deref().and_then(|id| self.map(id))
    }

    /// Make a map active. Returns false if no map has that id.
    pub fn set_active_map(&mut self, id: &str) -> bool {
        if self.map(id).is_none() {
            return false;
        }
        self.active_map_id = Some(id.to_string());
        true
    }

    /// Append a map; the first map added becomes active.
    pub fn add_map(&mut self, map: MapLayer) {
        if self.active_map().is_none() {
            self.active_map_id = Some(map.id.clone());
        }
        self.maps.push(map);
    }

    /// Remove a map. If it was active, the first remaining map takes over.
    pub fn remove_map(&mut self, id: &str) -> Option<MapLayer> {
        let index = self.maps.iter().position(|m| m.id == id)?;
        let removed = self.maps.remove(index);
        if self.active_map_id.as_deref() == Some(id) {
            self.active_map_id = self.maps.first().map(|m| m.id.clone());
        }
        Some(removed)
    }

    pub fn marker_mut(&mut self, id: &str) -> Option<&mut AoeMarker> {
        self.markers.iter_mut().find(|m| m.id == id)
    }

    pub fn fog_shape_mut(&mut self, id: &str) -> Option<&mut FogShape> {
        self.fog_of_war.iter_mut().find(|f| f.id == id)
    }

    /// Drag-and-drop reorder of the initiative list.
    pub fn move_initiative(&mut self, from: usize, to: usize) -> bool {
        let len = self.initiative_order.len();
        if from >= len || to >= len {
            return false;
        }
        let entry = self.initiative_order.remove(from);
        self.initiative_order.insert(to, entry);
        true
    }

    /// Sort by initiative, highest first. Ties keep their current order.
    pub fn sort_initiative(&mut self) {
        self.initiative_order
            .sort_by(|a, b| b.initiative.partial_cmp(&a.initiative).unwrap_or(Ordering::Equal));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridSettings;
    use kurbo::Size;

    fn layout() -> GridLayout {
        GridLayout::new(GridSettings::fixed(25, 13), Size::new(1000.0, 650.0))
    }

    #[test]
    fn test_first_map_becomes_active() {
        let mut scene = Scene::new("Dungeon");
        let a = MapLayer::new("A", None);
        let b = MapLayer::new("B", None);
        let a_id = a.id.clone();
        scene.add_map(a);
        scene.add_map(b);
        assert_eq!(scene.active_map().map(|m| m.id.as_str()), Some(a_id.as_str()));
    }

    #[test]
    fn test_remove_active_map_reassigns() {
        let mut scene = Scene::new("Dungeon");
        let a = MapLayer::new("A", None);
        let b = MapLayer::new("B", None);
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        scene.add_map(a);
        scene.add_map(b);

        assert!(scene.remove_map(&a_id).is_some());
        assert_eq!(scene.active_map_id.as_deref(), Some(b_id.as_str()));

        scene.remove_map(&b_id);
        assert!(scene.active_map_id.is_none());
        assert!(scene.remove_map("missing").is_none());
    }

    #[test]
    fn test_set_active_map_unknown() {
        let mut scene = Scene::new("Dungeon");
        assert!(!scene.set_active_map("nope"));
    }

    #[test]
    fn test_map_anchor_grid_vs_pixel() {
        let layout = layout();
        let mut map = MapLayer::new("A", None);
        map.position = Point::new(2.5, 1.0);
        assert_eq!(map.pixel_position(&layout), PixelPosition::new(100.0, 50.0));

        map.use_grid_coordinates = false;
        assert_eq!(map.pixel_position(&layout), PixelPosition::new(2.5, 1.0));
    }

    #[test]
    fn test_set_pixel_position_stores_grid_units() {
        let layout = layout();
        let mut map = MapLayer::new("A", None);
        map.set_pixel_position(PixelPosition::new(120.0, 75.0), &layout);
        assert!((map.position.x - 3.0).abs() < 1e-9);
        assert!((map.position.y - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_marker_pixel_size() {
        let layout = layout();
        let mut marker = AoeMarker::new(MarkerShape::Circle, GridPosition::new(1.0, 1.0), 4.0);
        assert!((marker.pixel_size(&layout) - 160.0).abs() < 1e-9);
        marker.use_grid_coordinates = false;
        assert!((marker.pixel_size(&layout) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_move_initiative() {
        let mut scene = Scene::new("Fight");
        for (name, init) in [("a", 10.0), ("b", 15.0), ("c", 5.0)] {
            scene.initiative_order.push(InitiativeEntry::new(name, init));
        }
        assert!(scene.move_initiative(0, 2));
        let names: Vec<_> = scene.initiative_order.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b", "c", "a"]);
        assert!(!scene.move_initiative(0, 3));
    }

    #[test]
    fn test_sort_initiative_stable_descending() {
        let mut scene = Scene::new("Fight");
        for (name, init) in [("a", 10.0), ("b", 15.0), ("c", 10.0), ("d", 20.0)] {
            scene.initiative_order.push(InitiativeEntry::new(name, init));
        }
        scene.sort_initiative();
        let names: Vec<_> = scene.initiative_order.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["d", "b", "a", "c"]);
    }

    #[test]
    fn test_backend_scene_json() {
        let json = r#"{
            "id": "s1",
            "name": "Cave",
            "maps": [{"id": "m1", "name": "cave.png", "position": {"x": 1, "y": 2}, "useGridCoordinates": true, "opacity": 0.4}],
            "activeMapId": "m1",
            "gridSettings": {"showGrid": true, "gridSize": 50},
            "initiativeOrder": [{"id": "i1", "name": "Goblin", "initiative": 12, "hp": 7}],
            "showCurrentPlayer": false,
            "images": []
        }"#;
        let scene = Scene::from_json(json).unwrap();
        assert_eq!(scene.active_map().unwrap().name, "cave.png");
        assert!(!scene.show_current_player);
        assert_eq!(scene.maps[0].extra.get("opacity"), Some(&serde_json::json!(0.4)));
        assert!(scene.extra.contains_key("images"));

        let value: Value = serde_json::from_str(&scene.to_json().unwrap()).unwrap();
        assert_eq!(value["initiativeOrder"][0]["hp"], 7);
        assert_eq!(value["maps"][0]["position"]["y"], 2.0);
        assert_eq!(value["activeMapId"], "m1");
    }
}
