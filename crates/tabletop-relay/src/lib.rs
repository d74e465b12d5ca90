//! Tabletop relay server.
//!
//! Fans scene snapshots and viewer controls out between the admin and
//! viewer clients of a local session, and keeps an in-memory library of
//! saved scenes and uploaded maps.
//!
//! ## Endpoints
//!
//! - `GET /ws`: scene socket (see [`ws`])
//! - `GET /scenes/list`, `POST /scenes/save`, `GET /scenes/load/{id}`
//! - `PUT /scenes/{id}`, `DELETE /scenes/{id}`
//! - `POST /scenes/folder`, `PUT /scenes/folder/{path}`, `DELETE /scenes/folder/{path}`
//! - `GET /maps/list`, `POST /maps/upload`, `GET /maps/file/{path}`

pub mod error;
pub mod maps;
pub mod scenes;
pub mod ws;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tabletop_core::scene::Scene;
use tokio::sync::{RwLock, broadcast};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::RelayError;

const CHANNEL_CAPACITY: usize = 256;
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Who a relayed frame goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    All,
    /// Everyone but the sender.
    Others,
}

/// An encoded frame on its way to connected clients.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub from: String,
    pub delivery: Delivery,
    pub text: String,
}

impl Broadcast {
    pub fn reaches(&self, peer_id: &str) -> bool {
        match self.delivery {
            Delivery::All => true,
            Delivery::Others => self.from != peer_id,
        }
    }
}

/// Shared application state
pub struct AppState {
    tx: broadcast::Sender<Broadcast>,
    /// Last `scene_update` seen, replayed to new clients.
    current_scene: RwLock<Option<Scene>>,
    pub scenes: DashMap<String, Scene>,
    /// Scene folders created explicitly, possibly still empty.
    pub folders: DashSet<String>,
    pub maps: DashMap<String, maps::StoredMap>,
}

impl AppState {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            current_scene: RwLock::new(None),
            scenes: DashMap::new(),
            folders: DashSet::new(),
            maps: DashMap::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.tx.subscribe()
    }

    pub fn broadcast(&self, message: Broadcast) {
        // No receivers just means nobody is connected.
        let _ = self.tx.send(message);
    }

    pub async fn current_scene(&self) -> Option<Scene> {
        self.current_scene.read().await.clone()
    }

    pub async fn set_current_scene(&self, scene: Scene) {
        *self.current_scene.write().await = Some(scene);
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the relay router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .route("/scenes/list", get(scenes::list_scenes))
        .route("/scenes/save", post(scenes::save_scene))
        .route("/scenes/load/{id}", get(scenes::load_scene))
        .route("/scenes/folder", post(scenes::create_folder))
        .route(
            "/scenes/folder/{*path}",
            put(scenes::rename_folder).delete(scenes::delete_folder),
        )
        .route(
            "/scenes/{id}",
            put(scenes::update_scene).delete(scenes::delete_scene),
        )
        .route("/maps/list", get(maps::list_maps))
        .route("/maps/upload", post(maps::upload_map))
        .route("/maps/file/{*path}", get(maps::get_map_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "Tabletop Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}
