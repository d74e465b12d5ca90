//! Grid/pixel coordinate model shared by every scene layer.
//!
//! Maps, fog-of-war vertices and area markers store positions in grid
//! cells and are converted to pixels against one [`GridLayout`] at render
//! time, so all layers stay aligned under viewport resizes and grid changes.

use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference cell width used for grid-relative scaling.
pub const BASE_CELL_SIZE: f64 = 50.0;

/// Absolute cell size used when a scene does not configure one.
pub const DEFAULT_GRID_SIZE: f64 = 50.0;

/// Cell counts used when fixed-grid mode is enabled without counts.
pub const DEFAULT_GRID_CELLS_X: u32 = 25;
pub const DEFAULT_GRID_CELLS_Y: u32 = 13;

const DEFAULT_GRID_COLOR: &str = "#000000";
const DEFAULT_GRID_OPACITY: f64 = 0.5;

/// A position in grid-cell units. Fractional values are valid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: f64,
    pub y: f64,
}

impl GridPosition {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_point(self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl From<Point> for GridPosition {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y)
    }
}

/// A viewport-relative position in pixels. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPosition {
    pub x: f64,
    pub y: f64,
}

impl PixelPosition {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_point(self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl From<Point> for PixelPosition {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y)
    }
}

/// Pixel dimensions of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub width: f64,
    pub height: f64,
}

impl CellSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub const fn square(size: f64) -> Self {
        Self::new(size, size)
    }
}

/// Convert a pixel position to grid units. No snapping.
pub fn pixel_to_grid(pixel: PixelPosition, cell: CellSize) -> GridPosition {
    GridPosition::new(pixel.x / cell.width, pixel.y / cell.height)
}

/// Convert a grid position to pixels. Inverse of [`pixel_to_grid`].
pub fn grid_to_pixel(grid: GridPosition, cell: CellSize) -> PixelPosition {
    PixelPosition::new(grid.x * cell.width, grid.y * cell.height)
}

/// How the cell size is derived. Exactly one mode is active at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridMode {
    /// The viewport is divided into a constant number of cells.
    Fixed { cells_x: u32, cells_y: u32 },
    /// Every cell is `size` pixels square.
    Absolute { size: f64 },
}

impl Default for GridMode {
    fn default() -> Self {
        GridMode::Absolute { size: DEFAULT_GRID_SIZE }
    }
}

/// Grid configuration as carried inside a scene.
///
/// The active [`GridMode`] is derived from the wire fields. The fields of
/// the inactive mode and any keys this client does not know are kept as
/// received, so a settings object survives a decode/encode cycle and a
/// mode toggle back and forth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GridSettingsWire", into = "GridSettingsWire")]
pub struct GridSettings {
    pub show_grid: bool,
    mode: GridMode,
    /// `gridSize` as stored; the absolute size to return to from fixed mode.
    grid_size: f64,
    /// `gridCellsX`/`gridCellsY` as stored, kept while absolute mode is active.
    grid_cells: (Option<f64>, Option<f64>),
    pub color: String,
    pub opacity: f64,
    pub extra: Map<String, Value>,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            show_grid: true,
            mode: GridMode::default(),
            grid_size: DEFAULT_GRID_SIZE,
            grid_cells: (None, None),
            color: DEFAULT_GRID_COLOR.to_string(),
            opacity: DEFAULT_GRID_OPACITY,
            extra: Map::new(),
        }
    }
}

impl GridSettings {
    /// Absolute-size grid.
    pub fn absolute(size: f64) -> Self {
        let mut settings = Self::default();
        settings.set_mode(GridMode::Absolute { size });
        settings
    }

    /// Fixed cell-count grid. Counts below 1 are raised to 1.
    pub fn fixed(cells_x: u32, cells_y: u32) -> Self {
        let mut settings = Self::default();
        settings.set_mode(GridMode::Fixed { cells_x, cells_y });
        settings
    }

    pub fn mode(&self) -> GridMode {
        self.mode
    }

    /// Switch modes. The other mode's stored values are left untouched.
    pub fn set_mode(&mut self, mode: GridMode) {
        self.mode = match mode {
            GridMode::Fixed { cells_x, cells_y } => {
                let (cells_x, cells_y) = (cells_x.max(1), cells_y.max(1));
                self.grid_cells = (Some(f64::from(cells_x)), Some(f64::from(cells_y)));
                GridMode::Fixed { cells_x, cells_y }
            }
            GridMode::Absolute { size } => {
                self.grid_size = size;
                GridMode::Absolute { size }
            }
        };
    }

    /// Leave fixed mode and go back to the stored absolute size.
    pub fn use_absolute(&mut self) {
        self.mode = absolute_mode(self.grid_size);
    }

    /// Enter fixed mode with the stored cell counts.
    pub fn use_fixed(&mut self) {
        self.mode = GridMode::Fixed {
            cells_x: cell_count(self.grid_cells.0, DEFAULT_GRID_CELLS_X),
            cells_y: cell_count(self.grid_cells.1, DEFAULT_GRID_CELLS_Y),
        };
    }

    /// Derive the cell size for a viewport.
    pub fn cell_size(&self, viewport: Size) -> CellSize {
        match self.mode {
            GridMode::Fixed { cells_x, cells_y } => CellSize::new(
                viewport.width / f64::from(cells_x.max(1)),
                viewport.height / f64::from(cells_y.max(1)),
            ),
            GridMode::Absolute { size } => CellSize::square(size),
        }
    }
}

/// Flat object layout used on the wire.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridSettingsWire {
    #[serde(default = "default_true")]
    show_grid: bool,
    #[serde(default = "default_grid_size")]
    grid_size: f64,
    #[serde(default)]
    use_fixed_grid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grid_cells_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grid_cells_y: Option<f64>,
    #[serde(default = "default_grid_color")]
    grid_color: String,
    #[serde(default = "default_grid_opacity")]
    grid_opacity: f64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

fn default_grid_size() -> f64 {
    DEFAULT_GRID_SIZE
}

fn default_grid_color() -> String {
    DEFAULT_GRID_COLOR.to_string()
}

fn default_grid_opacity() -> f64 {
    DEFAULT_GRID_OPACITY
}

fn cell_count(raw: Option<f64>, fallback: u32) -> u32 {
    match raw {
        Some(v) if v.is_finite() => v.round().clamp(1.0, f64::from(u32::MAX)) as u32,
        _ => fallback,
    }
}

fn absolute_mode(size: f64) -> GridMode {
    if size.is_finite() && size > 0.0 {
        GridMode::Absolute { size }
    } else {
        GridMode::default()
    }
}

impl From<GridSettingsWire> for GridSettings {
    fn from(wire: GridSettingsWire) -> Self {
        let mut settings = Self {
            show_grid: wire.show_grid,
            mode: absolute_mode(wire.grid_size),
            grid_size: wire.grid_size,
            grid_cells: (wire.grid_cells_x, wire.grid_cells_y),
            color: wire.grid_color,
            opacity: wire.grid_opacity,
            extra: wire.extra,
        };
        if wire.use_fixed_grid {
            settings.use_fixed();
        }
        settings
    }
}

impl From<GridSettings> for GridSettingsWire {
    fn from(settings: GridSettings) -> Self {
        Self {
            show_grid: settings.show_grid,
            grid_size: settings.grid_size,
            use_fixed_grid: matches!(settings.mode, GridMode::Fixed { .. }),
            grid_cells_x: settings.grid_cells.0,
            grid_cells_y: settings.grid_cells.1,
            grid_color: settings.color,
            grid_opacity: settings.opacity,
            extra: settings.extra,
        }
    }
}

/// The current grid transform: settings plus viewport, with the derived
/// cell size cached. Every layer reads positions through one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    settings: GridSettings,
    viewport: Size,
    cell: CellSize,
}

impl GridLayout {
    pub fn new(settings: GridSettings, viewport: Size) -> Self {
        let viewport = sanitize_viewport(viewport);
        let cell = settings.cell_size(viewport);
        Self {
            settings,
            viewport,
            cell,
        }
    }

    /// Handle a viewport resize. Returns true if the cell size changed.
    pub fn resize(&mut self, viewport: Size) -> bool {
        self.viewport = sanitize_viewport(viewport);
        self.recompute()
    }

    /// Replace the grid configuration. Returns true if the cell size changed.
    pub fn set_settings(&mut self, settings: GridSettings) -> bool {
        self.settings = settings;
        self.recompute()
    }

    fn recompute(&mut self) -> bool {
        let cell = self.settings.cell_size(self.viewport);
        let changed = cell != self.cell;
        self.cell = cell;
        changed
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn cell_size(&self) -> CellSize {
        self.cell
    }

    pub fn to_pixel(&self, grid: GridPosition) -> PixelPosition {
        grid_to_pixel(grid, self.cell)
    }

    pub fn to_grid(&self, pixel: PixelPosition) -> GridPosition {
        pixel_to_grid(pixel, self.cell)
    }

    /// Ratio of the current cell width to [`BASE_CELL_SIZE`].
    pub fn grid_scale_factor(&self) -> f64 {
        self.cell.width / BASE_CELL_SIZE
    }

    /// Final render scale for an element. Grid-relative elements grow and
    /// shrink with the cell size; others use their stored scale verbatim.
    pub fn effective_scale(&self, stored: f64, grid_relative: bool) -> f64 {
        if grid_relative {
            stored * self.grid_scale_factor()
        } else {
            stored
        }
    }
}

// Zero-sized viewports would yield zero-width cells.
fn sanitize_viewport(viewport: Size) -> Size {
    let clamp = |v: f64| if v.is_finite() && v >= 1.0 { v } else { 1.0 };
    Size::new(clamp(viewport.width), clamp(viewport.height))
}
