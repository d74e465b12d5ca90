//! Tabletop Core Library
//!
//! Platform-agnostic scene model, grid transforms and realtime scene
//! synchronization for the tabletop admin and viewer clients.

#[cfg(not(target_arch = "wasm32"))]
pub mod api;
pub mod audio;
pub mod connection;
pub mod fog;
pub mod gesture;
pub mod grid;
pub mod layout;
pub mod protocol;
pub mod scene;
pub mod session;
pub mod storage;
pub mod subject;
pub mod transport;

#[cfg(not(target_arch = "wasm32"))]
pub use api::{ApiClient, ApiError};
pub use audio::{AudioBackend, AudioError, AudioGraph, EffectPlayback, Soundboard};
pub use connection::{ConnectionConfig, ConnectionManager, reconnect_delay};
pub use fog::{FogShape, collapse_duplicates};
pub use gesture::{DragSession, DragUpdate, Throttle};
pub use grid::{CellSize, GridLayout, GridMode, GridPosition, GridSettings, PixelPosition};
pub use layout::SceneLayout;
pub use protocol::{ConnectionStatus, Message};
pub use scene::{AoeMarker, Anchor, InitiativeEntry, MapLayer, MarkerShape, Scene};
pub use session::{SceneSession, SessionError, ViewerState};
pub use storage::{PreferenceStore, Preferences, Role, StorageError, UserProfile};
pub use subject::{Subject, Subscription};
pub use transport::{PlatformTransport, Transport, TransportError, TransportEvent};
