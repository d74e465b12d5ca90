//! Pixel placement of every scene layer against one grid.

use crate::grid::{CellSize, GridLayout, PixelPosition};
use crate::scene::{MarkerShape, Scene};

/// Where the active map image goes.
#[derive(Debug, Clone, PartialEq)]
pub struct MapPlacement {
    pub id: String,
    pub file_path: Option<String>,
    pub position: PixelPosition,
    pub scale: f64,
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPlacement {
    pub id: String,
    pub shape: MarkerShape,
    pub position: PixelPosition,
    /// Size in pixels.
    pub size: f64,
    pub rotation: f64,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FogPlacement {
    pub id: String,
    pub points: Vec<PixelPosition>,
}

/// Everything a view needs to draw one frame of the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneLayout {
    pub cell: CellSize,
    pub show_grid: bool,
    pub map: Option<MapPlacement>,
    pub markers: Vec<MarkerPlacement>,
    /// Renderable fog polygons only; degenerate shapes are skipped.
    pub fog: Vec<FogPlacement>,
}

impl SceneLayout {
    /// Resolve all layers. Every layer reads the same cell size from `grid`.
    pub fn compute(scene: &Scene, grid: &GridLayout) -> Self {
        let map = scene.active_map().map(|map| MapPlacement {
            id: map.id.clone(),
            file_path: map.file_path.clone(),
            position: map.pixel_position(grid),
            scale: map.effective_scale(grid),
            rotation: map.rotation,
        });

        let markers = scene
            .markers
            .iter()
            .map(|marker| MarkerPlacement {
                id: marker.id.clone(),
                shape: marker.shape,
                position: marker.pixel_position(grid),
                size: marker.pixel_size(grid),
                rotation: marker.rotation,
                color: marker.color.clone(),
            })
            .collect();

        let fog = scene
            .fog_of_war
            .iter()
            .filter(|shape| shape.is_renderable())
            .map(|shape| FogPlacement {
                id: shape.id.clone(),
                points: shape.render_points(grid),
            })
            .collect();

        Self {
            cell: grid.cell_size(),
            show_grid: grid.settings().show_grid,
            map,
            markers,
            fog,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fog::FogShape;
    use crate::grid::{GridPosition, GridSettings};
    use crate::scene::{AoeMarker, MapLayer};
    use kurbo::{Point, Size};

    fn scene() -> Scene {
        let mut scene = Scene::new("Ruins");
        scene.grid_settings = GridSettings::fixed(25, 13);
        let mut map = MapLayer::new("Ruins", Some("ruins.jpg".to_string()));
        map.position = Point::new(2.5, 1.0);
        map.scale = 2.0;
        map.use_grid_scaling = true;
        scene.add_map(map);
        scene
            .markers
            .push(AoeMarker::new(MarkerShape::Circle, GridPosition::new(5.0, 2.0), 1.0));
        scene.fog_of_war.push(FogShape::new(vec![
            GridPosition::new(0.0, 0.0),
            GridPosition::new(1.0, 0.0),
            GridPosition::new(1.0, 1.0),
        ]));
        scene
            .fog_of_war
            .push(FogShape::new(vec![GridPosition::new(3.0, 3.0), GridPosition::new(4.0, 4.0)]));
        scene
    }

    #[test]
    fn test_layers_share_cell_size() {
        let scene = scene();
        let grid = GridLayout::new(scene.grid_settings.clone(), Size::new(1000.0, 650.0));
        let layout = SceneLayout::compute(&scene, &grid);

        assert_eq!(layout.cell, CellSize::new(40.0, 50.0));
        let map = layout.map.unwrap();
        assert_eq!(map.position, PixelPosition::new(100.0, 50.0));
        // 2.0 stored * (40 / 50) grid factor
        assert!((map.scale - 1.6).abs() < 1e-12);

        assert_eq!(layout.markers[0].position, PixelPosition::new(200.0, 100.0));
        assert_eq!(layout.fog.len(), 1);
        assert_eq!(
            layout.fog[0].points,
            vec![
                PixelPosition::new(0.0, 0.0),
                PixelPosition::new(40.0, 0.0),
                PixelPosition::new(40.0, 50.0),
            ]
        );
    }

    #[test]
    fn test_resize_moves_everything_together() {
        let scene = scene();
        let mut grid = GridLayout::new(scene.grid_settings.clone(), Size::new(1000.0, 650.0));
        assert!(grid.resize(Size::new(500.0, 325.0)));
        let layout = SceneLayout::compute(&scene, &grid);
        assert_eq!(layout.map.unwrap().position, PixelPosition::new(50.0, 25.0));
        assert_eq!(layout.markers[0].position, PixelPosition::new(100.0, 50.0));
        assert_eq!(layout.fog[0].points[1], PixelPosition::new(20.0, 0.0));
    }

    #[test]
    fn test_no_active_map() {
        let layout = SceneLayout::compute(
            &Scene::new("Empty"),
            &GridLayout::new(GridSettings::default(), Size::new(800.0, 600.0)),
        );
        assert!(layout.map.is_none());
        assert!(layout.markers.is_empty());
        assert!(layout.fog.is_empty());
    }
}
