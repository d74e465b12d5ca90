//! Sound effect playback with guaranteed release of audio resources.
//!
//! Each played effect gets its own [`AudioGraph`] (source, gain, output).
//! The graph is owned by an [`EffectPlayback`] guard that stops and closes
//! it exactly once, whichever way the playback ends.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Failed to create audio graph: {0}")]
    Create(String),
    #[error("Failed to start playback: {0}")]
    Start(String),
}

/// Per-effect audio resources.
pub trait AudioGraph {
    fn start(&mut self) -> Result<(), AudioError>;
    fn stop(&mut self);
    /// Release the underlying context. Called exactly once.
    fn close(&mut self);
}

/// Creates audio graphs for effects.
pub trait AudioBackend {
    type Graph: AudioGraph;

    fn create(&mut self, source: &str, volume: f32) -> Result<Self::Graph, AudioError>;
}

/// A playing effect. Dropping it stops playback and closes the graph.
pub struct EffectPlayback<G: AudioGraph> {
    graph: Option<G>,
}

impl<G: AudioGraph> EffectPlayback<G> {
    /// Take ownership of `graph` and start it. If starting fails the graph
    /// is released before the error is returned.
    pub fn start(graph: G) -> Result<Self, AudioError> {
        let mut playback = Self { graph: Some(graph) };
        if let Some(graph) = playback.graph.as_mut() {
            graph.start()?;
        }
        Ok(playback)
    }

    pub fn is_active(&self) -> bool {
        self.graph.is_some()
    }

    /// Stop now instead of at drop.
    pub fn stop(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.stop();
            graph.close();
        }
    }
}

impl<G: AudioGraph> Drop for EffectPlayback<G> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Soundboard: at most one playback per effect id.
pub struct Soundboard<B: AudioBackend> {
    backend: B,
    active: HashMap<String, EffectPlayback<B::Graph>>,
}

impl<B: AudioBackend> Soundboard<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_playing(&self, effect_id: &str) -> bool {
        self.active.contains_key(effect_id)
    }

    pub fn playing(&self) -> usize {
        self.active.len()
    }

    /// Play an effect, restarting it if it is already playing.
    pub fn play(&mut self, effect_id: &str, source: &str, volume: f32) -> Result<(), AudioError> {
        self.stop(effect_id);
        let graph = self.backend.create(source, volume.clamp(0.0, 1.0))?;
        let playback = EffectPlayback::start(graph)?;
        log::debug!("Playing effect {} ({})", effect_id, source);
        self.active.insert(effect_id.to_string(), playback);
        Ok(())
    }

    /// Returns false if the effect was not playing.
    pub fn stop(&mut self, effect_id: &str) -> bool {
        match self.active.remove(effect_id) {
            Some(mut playback) => {
                playback.stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (_, mut playback) in self.active.drain() {
            playback.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        started: Vec<String>,
        stopped: Vec<String>,
        closed: Vec<String>,
    }

    struct FakeGraph {
        source: String,
        fail_start: bool,
        log: Rc<RefCell<Log>>,
    }

    impl AudioGraph for FakeGraph {
        fn start(&mut self) -> Result<(), AudioError> {
            if self.fail_start {
                return Err(AudioError::Start("decode error".to_string()));
            }
            self.log.borrow_mut().started.push(self.source.clone());
            Ok(())
        }

        fn stop(&mut self) {
            self.log.borrow_mut().stopped.push(self.source.clone());
        }

        fn close(&mut self) {
            self.log.borrow_mut().closed.push(self.source.clone());
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        log: Rc<RefCell<Log>>,
    }

    impl AudioBackend for FakeBackend {
        type Graph = FakeGraph;

        fn create(&mut self, source: &str, _volume: f32) -> Result<FakeGraph, AudioError> {
            if source.is_empty() {
                return Err(AudioError::Create("empty source".to_string()));
            }
            Ok(FakeGraph {
                source: source.to_string(),
                fail_start: source.ends_with(".bad"),
                log: self.log.clone(),
            })
        }
    }

    #[test]
    fn test_drop_releases_once() {
        let log = Rc::new(RefCell::new(Log::default()));
        let graph = FakeGraph {
            source: "thunder.mp3".to_string(),
            fail_start: false,
            log: log.clone(),
        };
        let mut playback = EffectPlayback::start(graph).unwrap();
        playback.stop();
        assert!(!playback.is_active());
        drop(playback);
        assert_eq!(log.borrow().closed, vec!["thunder.mp3"]);
        assert_eq!(log.borrow().stopped.len(), 1);
    }

    #[test]
    fn test_failed_start_still_closes() {
        let log = Rc::new(RefCell::new(Log::default()));
        let graph = FakeGraph {
            source: "broken.bad".to_string(),
            fail_start: true,
            log: log.clone(),
        };
        assert!(EffectPlayback::start(graph).is_err());
        assert_eq!(log.borrow().closed, vec!["broken.bad"]);
        assert!(log.borrow().started.is_empty());
    }

    #[test]
    fn test_soundboard_restart_and_stop_all() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let mut board = Soundboard::new(backend);

        board.play("rain", "rain.ogg", 0.5).unwrap();
        board.play("rain", "rain.ogg", 0.5).unwrap();
        board.play("wind", "wind.ogg", 2.0).unwrap();
        assert_eq!(board.playing(), 2);
        assert_eq!(log.borrow().closed, vec!["rain.ogg"]);

        assert!(board.stop("wind"));
        assert!(!board.stop("wind"));
        board.stop_all();
        assert_eq!(board.playing(), 0);
        assert_eq!(log.borrow().closed.len(), 3);
        assert_eq!(log.borrow().started.len(), 3);
    }

    #[test]
    fn test_soundboard_errors() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let mut board = Soundboard::new(backend);
        assert!(matches!(board.play("x", "", 1.0), Err(AudioError::Create(_))));
        assert!(matches!(board.play("y", "y.bad", 1.0), Err(AudioError::Start(_))));
        assert!(!board.is_playing("y"));
        assert_eq!(log.borrow().closed, vec!["y.bad"]);
    }

    #[test]
    fn test_dropping_soundboard_releases_everything() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        {
            let mut board = Soundboard::new(backend);
            board.play("a", "a.ogg", 1.0).unwrap();
            board.play("b", "b.ogg", 1.0).unwrap();
        }
        assert_eq!(log.borrow().closed.len(), 2);
    }
}
