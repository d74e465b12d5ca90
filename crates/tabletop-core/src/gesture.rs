//! Pointer drag sessions with throttled broadcasts.
//!
//! Local state follows the pointer on every move; the outbound broadcast is
//! rate limited and the final position is always sent on release.

use crate::grid::{CellSize, GridLayout, PixelPosition, grid_to_pixel, pixel_to_grid};
use crate::scene::Anchor;
use std::time::Duration;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// Broadcast interval while dragging a map.
pub const MAP_DRAG_THROTTLE: Duration = Duration::from_millis(50);
/// Broadcast interval while dragging a fog vertex (about 30 fps).
pub const FOG_DRAG_THROTTLE: Duration = Duration::from_millis(32);

/// Lets at most one event through per interval.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether an event at `now` may pass. Records it if so.
    pub fn ready(&mut self, now: Instant) -> bool {
        let pass = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if pass {
            self.last = Some(now);
        }
        pass
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Result of one pointer move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragUpdate {
    /// New position in the dragged element's own units.
    pub position: Anchor,
    /// Whether this move should be sent to other clients.
    pub broadcast: bool,
}

/// State of one drag gesture, from press to release.
///
/// Pointer deltas are measured from a base point. A grid change mid-drag
/// goes through [`rescale`](Self::rescale), which moves the base to the
/// current position so the element does not jump.
#[derive(Debug, Clone)]
pub struct DragSession {
    origin: Anchor,
    base_pointer: PixelPosition,
    base: Anchor,
    cell: CellSize,
    throttle: Throttle,
    last_pointer: PixelPosition,
    last: Anchor,
}

impl DragSession {
    /// Begin a drag. `origin` is the element position when the pointer went down.
    pub fn start(
        pointer: PixelPosition,
        origin: Anchor,
        layout: &GridLayout,
        throttle: Duration,
        now: Instant,
    ) -> Self {
        let mut throttle = Throttle::new(throttle);
        // The press itself counts as the first emission.
        throttle.ready(now);
        Self {
            origin,
            base_pointer: pointer,
            base: origin,
            cell: layout.cell_size(),
            throttle,
            last_pointer: pointer,
            last: origin,
        }
    }

    pub fn origin(&self) -> Anchor {
        self.origin
    }

    /// Latest position produced by the gesture.
    pub fn position(&self) -> Anchor {
        self.last
    }

    /// The grid changed under the gesture. Later deltas use the new cell
    /// size, starting from where the element is now.
    pub fn rescale(&mut self, layout: &GridLayout) {
        self.base_pointer = self.last_pointer;
        self.base = self.last;
        self.cell = layout.cell_size();
    }

    /// Follow the pointer.
    pub fn update(&mut self, pointer: PixelPosition, now: Instant) -> DragUpdate {
        self.last_pointer = pointer;
        self.last = self.resolve(pointer);
        DragUpdate {
            position: self.last,
            broadcast: self.throttle.ready(now),
        }
    }

    /// End the gesture at `pointer`. The result is always broadcast.
    pub fn finish(self, pointer: PixelPosition) -> Anchor {
        self.resolve(pointer)
    }

    fn resolve(&self, pointer: PixelPosition) -> Anchor {
        let dx = pointer.x - self.base_pointer.x;
        let dy = pointer.y - self.base_pointer.y;
        match self.base {
            Anchor::Pixel(p) => Anchor::Pixel(PixelPosition::new(p.x + dx, p.y + dy)),
            Anchor::Grid(g) => {
                let base = grid_to_pixel(g, self.cell);
                Anchor::Grid(pixel_to_grid(
                    PixelPosition::new(base.x + dx, base.y + dy),
                    self.cell,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridPosition, GridSettings};
    use kurbo::Size;

    fn layout() -> GridLayout {
        GridLayout::new(GridSettings::absolute(50.0), Size::new(1000.0, 650.0))
    }

    #[test]
    fn test_throttle_interval() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(MAP_DRAG_THROTTLE);
        assert!(throttle.ready(t0));
        assert!(!throttle.ready(t0 + Duration::from_millis(20)));
        assert!(!throttle.ready(t0 + Duration::from_millis(49)));
        assert!(throttle.ready(t0 + Duration::from_millis(50)));
        assert!(!throttle.ready(t0 + Duration::from_millis(60)));
    }

    #[test]
    fn test_drag_grid_origin() {
        let t0 = Instant::now();
        let origin = Anchor::Grid(GridPosition::new(2.0, 3.0));
        let mut drag = DragSession::start(
            PixelPosition::new(100.0, 100.0),
            origin,
            &layout(),
            MAP_DRAG_THROTTLE,
            t0,
        );

        let update = drag.update(PixelPosition::new(125.0, 150.0), t0 + Duration::from_millis(10));
        assert_eq!(update.position, Anchor::Grid(GridPosition::new(2.5, 4.0)));
        assert!(!update.broadcast);

        let update = drag.update(PixelPosition::new(150.0, 150.0), t0 + Duration::from_millis(60));
        assert_eq!(update.position, Anchor::Grid(GridPosition::new(3.0, 4.0)));
        assert!(update.broadcast);
    }

    #[test]
    fn test_drag_pixel_origin() {
        let t0 = Instant::now();
        let mut drag = DragSession::start(
            PixelPosition::new(10.0, 10.0),
            Anchor::Pixel(PixelPosition::new(300.0, 200.0)),
            &layout(),
            FOG_DRAG_THROTTLE,
            t0,
        );
        let update = drag.update(PixelPosition::new(20.0, 5.0), t0 + Duration::from_millis(40));
        assert_eq!(update.position, Anchor::Pixel(PixelPosition::new(310.0, 195.0)));
        assert!(update.broadcast);
    }

    #[test]
    fn test_finish_reports_final_position() {
        let t0 = Instant::now();
        let mut drag = DragSession::start(
            PixelPosition::new(0.0, 0.0),
            Anchor::Grid(GridPosition::new(0.0, 0.0)),
            &layout(),
            MAP_DRAG_THROTTLE,
            t0,
        );
        // Throttled moves still track locally.
        for i in 1..5 {
            let update = drag.update(PixelPosition::new(i as f64 * 10.0, 0.0), t0 + Duration::from_millis(i));
            assert!(!update.broadcast);
        }
        assert_eq!(drag.position(), Anchor::Grid(GridPosition::new(0.8, 0.0)));
        let end = drag.finish(PixelPosition::new(100.0, 50.0));
        assert_eq!(end, Anchor::Grid(GridPosition::new(2.0, 1.0)));
    }

    #[test]
    fn test_rescale_keeps_element_in_place() {
        let t0 = Instant::now();
        let mut drag = DragSession::start(
            PixelPosition::new(100.0, 100.0),
            Anchor::Grid(GridPosition::new(2.0, 3.0)),
            &layout(),
            MAP_DRAG_THROTTLE,
            t0,
        );
        let update = drag.update(PixelPosition::new(150.0, 100.0), t0);
        assert_eq!(update.position, Anchor::Grid(GridPosition::new(3.0, 3.0)));

        // Cells double in size mid-drag.
        drag.rescale(&GridLayout::new(GridSettings::absolute(100.0), Size::new(1000.0, 650.0)));
        assert_eq!(drag.position(), Anchor::Grid(GridPosition::new(3.0, 3.0)));

        let update = drag.update(PixelPosition::new(250.0, 100.0), t0 + Duration::from_millis(60));
        assert_eq!(update.position, Anchor::Grid(GridPosition::new(4.0, 3.0)));
        assert_eq!(drag.origin(), Anchor::Grid(GridPosition::new(2.0, 3.0)));
        assert_eq!(
            drag.finish(PixelPosition::new(150.0, 200.0)),
            Anchor::Grid(GridPosition::new(3.0, 4.0))
        );
    }
}
