//! Headless client loop.
//!
//! Connects to the scene socket, mirrors whatever the relay broadcasts into a
//! [`SceneSession`], and logs the layout a viewer would draw. In the admin
//! role the configured scene is pushed once the socket opens.

use crate::config::AppConfig;
use kurbo::Size;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tabletop_core::api::{ApiClient, ApiError};
use tabletop_core::connection::{ConnectionConfig, ConnectionManager};
use tabletop_core::grid::GridLayout;
use tabletop_core::layout::SceneLayout;
use tabletop_core::protocol::{ConnectionStatus, Message};
use tabletop_core::scene::Scene;
use tabletop_core::session::SceneSession;
use tabletop_core::storage::{FileStorage, Preferences, StorageError};
use tabletop_core::subject::Subscription;
use tabletop_core::transport::{NativeTransport, Transport};
use thiserror::Error;

/// Main loop interval.
const TICK: Duration = Duration::from_millis(16);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Preferences error: {0}")]
    Storage(#[from] StorageError),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("Failed to read scene file {path}: {source}")]
    SceneFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid scene JSON: {0}")]
    SceneJson(#[from] serde_json::Error),
}

/// Main application struct.
pub struct App<T: Transport = NativeTransport> {
    config: AppConfig,
    manager: ConnectionManager<T>,
    session: SceneSession,
    grid: GridLayout,
    layout: SceneLayout,
    preferences: Preferences<FileStorage>,
    /// Messages delivered by the connection listener, drained each tick.
    inbox: Rc<RefCell<Vec<Message>>>,
    _listener: Subscription,
    pending_scene: Option<Scene>,
}

impl App<NativeTransport> {
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        Self::with_transport(config, NativeTransport::new())
    }
}

impl<T: Transport> App<T> {
    pub fn with_transport(config: AppConfig, transport: T) -> Result<Self, AppError> {
        let store = match &config.config_dir {
            Some(dir) => FileStorage::new(dir.clone())?,
            None => FileStorage::default_location()?,
        };
        let preferences = Preferences::new(store);
        if let Some(token) = &config.token {
            preferences.set_auth_token(token)?;
        }
        // Only the admin's display scale is stored; a viewer just shows it.
        if config.is_admin() {
            if let Some(scale) = config.display_scale {
                preferences.set_display_scale(scale)?;
            }
        }

        let pending_scene = if config.is_admin() {
            load_initial_scene(&config, &preferences)?
        } else {
            if config.scene.is_some() || config.load_scene.is_some() {
                log::warn!("Ignoring scene source: only the admin role pushes scenes");
            }
            None
        };

        let mut session = SceneSession::default();
        let scale = match config.display_scale {
            Some(scale) => scale,
            None => preferences.display_scale()?,
        };
        session.apply(&Message::DisplayScaleUpdate { scale });

        let grid = GridLayout::new(session.scene().grid_settings.clone(), config.viewport);
        let layout = SceneLayout::compute(session.scene(), &grid);

        let manager = ConnectionManager::new(transport, ConnectionConfig::with_url(&config.server));
        let inbox: Rc<RefCell<Vec<Message>>> = Rc::default();
        let sink = Rc::clone(&inbox);
        let listener = manager.add_listener(move |message| sink.borrow_mut().push(message.clone()));

        Ok(Self {
            config,
            manager,
            session,
            grid,
            layout,
            preferences,
            inbox,
            _listener: listener,
            pending_scene,
        })
    }

    pub fn session(&self) -> &SceneSession {
        &self.session
    }

    pub fn layout(&self) -> &SceneLayout {
        &self.layout
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    pub fn manager(&self) -> &ConnectionManager<T> {
        &self.manager
    }

    pub fn preferences(&self) -> &Preferences<FileStorage> {
        &self.preferences
    }

    /// Run until `--exit-after` elapses, or forever.
    pub fn run(&mut self) {
        let started = Instant::now();
        self.start(started);
        loop {
            let now = Instant::now();
            self.tick(now);
            if self
                .config
                .run_limit()
                .is_some_and(|limit| now.duration_since(started) >= limit)
            {
                break;
            }
            std::thread::sleep(TICK);
        }
        self.stop();
    }

    /// Connect, and queue the admin scene so it goes out right after open.
    pub fn start(&mut self, now: Instant) {
        self.manager.init(now);
        if let Some(scene) = self.pending_scene.take() {
            log::info!("Pushing scene '{}' ({})", scene.name, scene.id);
            let update = self.session.mutate(|current| *current = scene);
            self.relayout();
            self.manager.send(&update, now);
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.manager.poll(now);
        let messages = std::mem::take(&mut *self.inbox.borrow_mut());
        for message in &messages {
            self.handle_message(message);
        }
    }

    /// Manual retry, e.g. after the connection gave up.
    pub fn reconnect(&mut self, now: Instant) {
        self.manager.reconnect(now);
    }

    pub fn stop(&mut self) {
        self.manager.teardown();
    }

    /// Viewport changed; every layer is placed again.
    /// A drag in progress keeps its element under the pointer.
    pub fn resize(&mut self, viewport: Size) {
        if self.grid.resize(viewport) {
            self.relayout();
        }
    }

    fn handle_message(&mut self, message: &Message) {
        if let Message::ConnectionStatus { status } = message {
            match status {
                ConnectionStatus::Failed => {
                    log::error!("Connection failed; call reconnect to try again")
                }
                other => log::info!("Connection {}", other),
            }
            return;
        }

        if !self.session.apply(message) {
            return;
        }

        match message {
            Message::SceneUpdate { .. } => self.relayout(),
            Message::DisplayScaleUpdate { scale } => {
                log::info!("Display scale {}", scale);
                if self.config.is_admin() {
                    if let Err(e) = self.preferences.set_display_scale(*scale) {
                        log::warn!("Failed to store display scale: {}", e);
                    }
                }
            }
            _ => {
                let viewer = self.session.viewer();
                log::info!(
                    "Viewer blank={} rotated={} highlight={}",
                    viewer.blank,
                    viewer.rotated,
                    viewer.highlighted_marker.as_deref().unwrap_or("-")
                );
            }
        }
    }

    fn relayout(&mut self) {
        self.grid
            .set_settings(self.session.scene().grid_settings.clone());
        self.session.relayout(&self.grid);
        self.layout = SceneLayout::compute(self.session.scene(), &self.grid);

        let scene = self.session.scene();
        log::info!(
            "Scene '{}': cell {:.1}x{:.1}, {} markers, {} fog shapes",
            scene.name,
            self.layout.cell.width,
            self.layout.cell.height,
            self.layout.markers.len(),
            self.layout.fog.len()
        );
        if let Some(map) = &self.layout.map {
            log::info!(
                "Map {} at ({:.1}, {:.1}) scale {:.3} rotation {}",
                map.file_path.as_deref().unwrap_or(&map.id),
                map.position.x,
                map.position.y,
                map.scale,
                map.rotation
            );
        }
    }
}

fn load_initial_scene(
    config: &AppConfig,
    preferences: &Preferences<FileStorage>,
) -> Result<Option<Scene>, AppError> {
    if let Some(path) = &config.scene {
        let json = std::fs::read_to_string(path).map_err(|source| AppError::SceneFile {
            path: path.clone(),
            source,
        })?;
        return Ok(Some(Scene::from_json(&json)?));
    }
    if let Some(id) = &config.load_scene {
        let mut client = ApiClient::new(config.api.clone())?;
        if let Some(token) = preferences.auth_token()? {
            client = client.with_token(token);
        }
        let scene = client.load_scene(id).map_err(|e| {
            log::error!("{}", e.user_message("Failed to load scene"));
            e
        })?;
        return Ok(Some(scene));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tabletop_core::grid::GridSettings;
    use tabletop_core::scene::MapLayer;
    use tabletop_core::transport::{TransportError, TransportEvent};

    #[derive(Default)]
    struct Wire {
        opens: usize,
        sent: Vec<String>,
        events: Vec<TransportEvent>,
    }

    #[derive(Clone, Default)]
    struct ScriptedTransport(Rc<RefCell<Wire>>);

    impl Transport for ScriptedTransport {
        fn open(&mut self, _url: &str) -> Result<(), TransportError> {
            self.0.borrow_mut().opens += 1;
            Ok(())
        }

        fn send(&mut self, text: &str) -> Result<(), TransportError> {
            self.0.borrow_mut().sent.push(text.to_string());
            Ok(())
        }

        fn close(&mut self, _code: u16) {}

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            std::mem::take(&mut self.0.borrow_mut().events)
        }
    }

    impl ScriptedTransport {
        fn push(&self, event: TransportEvent) {
            self.0.borrow_mut().events.push(event);
        }

        fn deliver(&self, message: &Message) {
            self.push(TransportEvent::Message(message.to_json().unwrap()));
        }
    }

    fn config(dir: &tempfile::TempDir, args: &[&str]) -> AppConfig {
        let mut argv = vec!["tabletop", "--config-dir", dir.path().to_str().unwrap()];
        argv.extend_from_slice(args);
        AppConfig::try_parse_from(argv).unwrap()
    }

    fn crypt() -> Scene {
        let mut scene = Scene::new("Crypt");
        scene.grid_settings = GridSettings::fixed(10, 5);
        let mut map = MapLayer::new("Crypt", Some("maps/crypt.png".to_string()));
        map.position = kurbo::Point::new(2.0, 1.0);
        scene.add_map(map);
        scene
    }

    #[test]
    fn test_viewer_follows_scene_updates() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::default();
        let mut app =
            App::with_transport(config(&dir, &["--viewport", "1000x500"]), transport.clone())
                .unwrap();
        let now = Instant::now();
        app.start(now);
        transport.push(TransportEvent::Opened);
        transport.deliver(&Message::scene_update(crypt()));
        app.tick(now);

        assert_eq!(app.status(), ConnectionStatus::Connected);
        assert_eq!(app.session().scene().name, "Crypt");
        let map = app.layout().map.as_ref().unwrap();
        // 10x5 cells over 1000x500 gives 100px cells.
        assert_eq!((map.position.x, map.position.y), (200.0, 100.0));
        assert!(transport.0.borrow().sent.is_empty());
    }

    #[test]
    fn test_resize_moves_layers() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::default();
        let mut app =
            App::with_transport(config(&dir, &["--viewport", "1000x500"]), transport.clone())
                .unwrap();
        let now = Instant::now();
        app.start(now);
        transport.push(TransportEvent::Opened);
        transport.deliver(&Message::scene_update(crypt()));
        app.tick(now);

        app.resize(Size::new(500.0, 250.0));
        let map = app.layout().map.as_ref().unwrap();
        assert_eq!((map.position.x, map.position.y), (100.0, 50.0));
    }

    #[test]
    fn test_admin_pushes_scene_after_open() {
        let dir = tempfile::tempdir().unwrap();
        let scene_path = dir.path().join("crypt.json");
        std::fs::write(&scene_path, crypt().to_json().unwrap()).unwrap();

        let transport = ScriptedTransport::default();
        let mut app = App::with_transport(
            config(
                &dir,
                &["--role", "admin", "--scene", scene_path.to_str().unwrap()],
            ),
            transport.clone(),
        )
        .unwrap();
        let now = Instant::now();
        app.start(now);
        assert_eq!(app.manager().queued(), 1);
        assert!(transport.0.borrow().sent.is_empty());

        transport.push(TransportEvent::Opened);
        app.tick(now);
        let sent = transport.0.borrow().sent.clone();
        assert_eq!(sent.len(), 1);
        match Message::parse(&sent[0]).unwrap() {
            Message::SceneUpdate { scene } => assert_eq!(scene.name, "Crypt"),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_viewer_ignores_scene_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::default();
        let mut app = App::with_transport(
            config(&dir, &["--scene", "does-not-exist.json"]),
            transport.clone(),
        )
        .unwrap();
        app.start(Instant::now());
        assert_eq!(app.manager().queued(), 0);
    }

    #[test]
    fn test_missing_scene_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = App::with_transport(
            config(&dir, &["--role", "admin", "--scene", "does-not-exist.json"]),
            ScriptedTransport::default(),
        );
        assert!(matches!(result, Err(AppError::SceneFile { .. })));
    }

    #[test]
    fn test_preferences_persist() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::default();
        let mut app = App::with_transport(
            config(&dir, &["--token", "secret", "--display-scale", "1.5"]),
            transport.clone(),
        )
        .unwrap();
        assert_eq!(app.session().viewer().display_scale, 1.5);

        let now = Instant::now();
        app.start(now);
        transport.push(TransportEvent::Opened);
        transport.deliver(&Message::DisplayScaleUpdate { scale: 2.0 });
        transport.deliver(&Message::BlankViewer);
        app.tick(now);

        assert!(app.session().viewer().blank);
        assert_eq!(app.session().viewer().display_scale, 2.0);
        drop(app);

        // The token is kept; a viewer never stores the display scale.
        let reopened = Preferences::new(FileStorage::new(dir.path().to_path_buf()).unwrap());
        assert_eq!(reopened.auth_token().unwrap().as_deref(), Some("secret"));
        assert_eq!(reopened.display_scale().unwrap(), 1.0);
    }

    #[test]
    fn test_admin_persists_display_scale() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::default();
        let mut app = App::with_transport(
            config(&dir, &["--role", "admin", "--display-scale", "1.5"]),
            transport.clone(),
        )
        .unwrap();
        assert_eq!(app.preferences().display_scale().unwrap(), 1.5);

        let now = Instant::now();
        app.start(now);
        transport.push(TransportEvent::Opened);
        transport.deliver(&Message::DisplayScaleUpdate { scale: 0.75 });
        app.tick(now);
        drop(app);

        let reopened = Preferences::new(FileStorage::new(dir.path().to_path_buf()).unwrap());
        assert_eq!(reopened.display_scale().unwrap(), 0.75);

        // A later viewer run on the same machine starts from the stored value.
        let viewer = App::with_transport(config(&dir, &[]), ScriptedTransport::default()).unwrap();
        assert_eq!(viewer.session().viewer().display_scale, 0.75);
    }

    #[test]
    fn test_manual_reconnect_opens_again() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::default();
        let mut app = App::with_transport(config(&dir, &[]), transport.clone()).unwrap();
        let now = Instant::now();
        app.start(now);
        transport.push(TransportEvent::Opened);
        app.tick(now);
        assert_eq!(transport.0.borrow().opens, 1);

        app.reconnect(now);
        assert_eq!(transport.0.borrow().opens, 2);
        assert_eq!(app.status(), ConnectionStatus::Connecting);

        transport.push(TransportEvent::Opened);
        app.tick(now);
        assert_eq!(app.status(), ConnectionStatus::Connected);
    }
}
