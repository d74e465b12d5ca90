//! Local scene state and the bridge to the scene socket.
//!
//! Inbound snapshots replace the local scene wholesale; local edits produce a
//! full `scene_update` for the caller to send. There is no merge step: the
//! last full snapshot applied wins.

use crate::fog::collapse_duplicates;
use crate::gesture::{DragSession, FOG_DRAG_THROTTLE, MAP_DRAG_THROTTLE};
use crate::grid::{GridLayout, PixelPosition};
use crate::protocol::Message;
use crate::scene::{Anchor, Scene};
use thiserror::Error;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// Errors from local scene edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unknown map: {0}")]
    UnknownMap(String),
    #[error("Unknown fog shape: {0}")]
    UnknownFogShape(String),
    #[error("Fog shape {shape} has no point {index}")]
    PointOutOfRange { shape: String, index: usize },
    #[error("A drag gesture is already in progress")]
    DragInProgress,
}

/// Viewer-side presentation flags driven by admin broadcasts.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    /// Viewer shows a blank screen.
    pub blank: bool,
    /// Viewer output is rotated 180 degrees.
    pub rotated: bool,
    /// Marker the admin asked viewers to highlight.
    pub highlighted_marker: Option<String>,
    /// Display scale multiplier pushed by the admin.
    pub display_scale: f64,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            blank: false,
            rotated: false,
            highlighted_marker: None,
            display_scale: 1.0,
        }
    }
}

/// What a drag gesture is moving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragTarget {
    Map { id: String },
    FogPoint { shape_id: String, index: usize },
}

#[derive(Debug, Clone)]
struct ActiveDrag {
    target: DragTarget,
    gesture: DragSession,
}

/// Owns the local scene, viewer flags and the gesture in progress.
#[derive(Debug, Clone, Default)]
pub struct SceneSession {
    scene: Scene,
    viewer: ViewerState,
    drag: Option<ActiveDrag>,
}

impl SceneSession {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            viewer: ViewerState::default(),
            drag: None,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn viewer(&self) -> &ViewerState {
        &self.viewer
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn drag_target(&self) -> Option<&DragTarget> {
        self.drag.as_ref().map(|d| &d.target)
    }

    /// Apply an inbound message. Returns true if local state changed.
    pub fn apply(&mut self, message: &Message) -> bool {
        match message {
            Message::SceneUpdate { scene } => {
                self.scene = (**scene).clone();
                true
            }
            Message::BlankViewer => replace(&mut self.viewer.blank, true),
            Message::UnblankViewer => replace(&mut self.viewer.blank, false),
            Message::RotateViewer => replace(&mut self.viewer.rotated, true),
            Message::UnrotateViewer => replace(&mut self.viewer.rotated, false),
            Message::HighlightMarker { marker_id } => {
                replace(&mut self.viewer.highlighted_marker, Some(marker_id.clone()))
            }
            Message::DisplayScaleUpdate { scale } => {
                if !scale.is_finite() || *scale <= 0.0 {
                    log::warn!("Ignoring invalid display scale {}", scale);
                    return false;
                }
                replace(&mut self.viewer.display_scale, *scale)
            }
            _ => false,
        }
    }

    /// Apply a local edit and return the snapshot to broadcast.
    pub fn mutate(&mut self, edit: impl FnOnce(&mut Scene)) -> Message {
        edit(&mut self.scene);
        self.snapshot()
    }

    /// Full `scene_update` for the current scene.
    ///
    /// Fog polygons go out with duplicate vertices collapsed. The local
    /// copy keeps them so an in-progress vertex drag keeps its index.
    pub fn snapshot(&self) -> Message {
        let mut scene = self.scene.clone();
        for shape in &mut scene.fog_of_war {
            shape.points = collapse_duplicates(&shape.points);
        }
        Message::scene_update(scene)
    }

    /// The grid transform changed (resize or new grid settings).
    pub fn relayout(&mut self, layout: &GridLayout) {
        if let Some(drag) = &mut self.drag {
            drag.gesture.rescale(layout);
        }
    }

    /// Start dragging a map layer.
    pub fn begin_map_drag(
        &mut self,
        map_id: &str,
        pointer: PixelPosition,
        layout: &GridLayout,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.drag.is_some() {
            return Err(SessionError::DragInProgress);
        }
        let map = self
            .scene
            .map(map_id)
            .ok_or_else(|| SessionError::UnknownMap(map_id.to_string()))?;
        let gesture = DragSession::start(pointer, map.anchor(), layout, MAP_DRAG_THROTTLE, now);
        self.drag = Some(ActiveDrag {
            target: DragTarget::Map {
                id: map_id.to_string(),
            },
            gesture,
        });
        Ok(())
    }

    /// Start dragging one vertex of a fog polygon.
    pub fn begin_fog_point_drag(
        &mut self,
        shape_id: &str,
        index: usize,
        pointer: PixelPosition,
        layout: &GridLayout,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.drag.is_some() {
            return Err(SessionError::DragInProgress);
        }
        let shape = self
            .scene
            .fog_of_war
            .iter()
            .find(|f| f.id == shape_id)
            .ok_or_else(|| SessionError::UnknownFogShape(shape_id.to_string()))?;
        let point = shape
            .points
            .get(index)
            .copied()
            .ok_or_else(|| SessionError::PointOutOfRange {
                shape: shape_id.to_string(),
                index,
            })?;
        let gesture = DragSession::start(pointer, Anchor::Grid(point), layout, FOG_DRAG_THROTTLE, now);
        self.drag = Some(ActiveDrag {
            target: DragTarget::FogPoint {
                shape_id: shape_id.to_string(),
                index,
            },
            gesture,
        });
        Ok(())
    }

    /// Pointer moved. Updates the scene locally and returns a snapshot when
    /// the throttle allows a broadcast.
    pub fn drag_to(&mut self, pointer: PixelPosition, now: Instant) -> Option<Message> {
        let mut drag = self.drag.take()?;
        let update = drag.gesture.update(pointer, now);
        if !self.place(&drag.target, update.position) {
            log::warn!("Drag target {:?} disappeared, cancelling gesture", drag.target);
            return None;
        }
        self.drag = Some(drag);
        update.broadcast.then(|| self.snapshot())
    }

    /// Pointer released. Always returns the final snapshot while a gesture
    /// was active; fog polygons are cleaned up first.
    pub fn end_drag(&mut self, pointer: PixelPosition) -> Option<Message> {
        let drag = self.drag.take()?;
        let target = drag.target;
        let position = drag.gesture.finish(pointer);
        if !self.place(&target, position) {
            log::warn!("Drag target {:?} disappeared before release", target);
            return None;
        }
        if let DragTarget::FogPoint { shape_id, .. } = &target {
            if let Some(shape) = self.scene.fog_shape_mut(shape_id) {
                shape.cleanup();
            }
        }
        Some(self.snapshot())
    }

    /// Abort the gesture and put the element back where it started.
    pub fn cancel_drag(&mut self) -> Option<Message> {
        let drag = self.drag.take()?;
        self.place(&drag.target, drag.gesture.origin())
            .then(|| self.snapshot())
    }

    fn place(&mut self, target: &DragTarget, position: Anchor) -> bool {
        match target {
            DragTarget::Map { id } => match self.scene.map_mut(id) {
                Some(map) => {
                    map.position = position.stored_point();
                    true
                }
                None => false,
            },
            DragTarget::FogPoint { shape_id, index } => {
                let Anchor::Grid(point) = position else {
                    return false;
                };
                self.scene
                    .fog_shape_mut(shape_id)
                    .is_some_and(|shape| shape.move_point(*index, point))
            }
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
