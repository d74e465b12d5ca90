//! Reconnecting scene-socket client.
//!
//! [`ConnectionManager`] owns at most one live [`Transport`], queues outbound
//! frames while the link is down, retries with exponential backoff and sends
//! a heartbeat while connected. It does no IO of its own: the owner calls
//! [`ConnectionManager::poll`] from its event loop with the current time.
//!
//! State transitions:
//! - `disconnected` -> `connecting` on `init`, `reconnect`, `send`, or a
//!   due reconnect timer
//! - `connecting` -> `connected` once the transport opens (queue flushed first)
//! - `connecting`/`connected` -> `error` on a transport error
//! - `connected` -> `disconnected` on close; only abnormal codes reconnect
//! - any -> `failed` once the retry budget is spent

use crate::protocol::{ConnectionStatus, Message};
use crate::subject::{Subject, Subscription};
use crate::transport::{CLOSE_CLIENT_RESET, CLOSE_NORMAL, Transport, TransportEvent};
use std::collections::VecDeque;
use std::time::Duration;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// Default scene socket endpoint.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// Connection manager settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub url: String,
    /// Automatic attempts before giving up with `failed`.
    pub max_reconnect_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            max_reconnect_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl ConnectionConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Wait before reconnect attempt `attempt` (1-indexed): `min(base * 2^attempt, max)`.
pub fn reconnect_delay(attempt: u32, config: &ConnectionConfig) -> Duration {
    config
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(config.max_delay)
}

/// Single-socket client with queueing, backoff and heartbeat.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    config: ConnectionConfig,
    status: ConnectionStatus,
    /// Serialized frames waiting for an open link, oldest first.
    queue: VecDeque<String>,
    attempts: u32,
    reconnect_at: Option<Instant>,
    next_heartbeat: Option<Instant>,
    /// Set by `teardown`; suppresses automatic reconnects.
    manual_close: bool,
    listeners: Subject<Message>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, config: ConnectionConfig) -> Self {
        Self {
            transport,
            config,
            status: ConnectionStatus::Disconnected,
            queue: VecDeque::new(),
            attempts: 0,
            reconnect_at: None,
            next_heartbeat: None,
            manual_close: false,
            listeners: Subject::new(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Number of frames waiting to be sent.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// When the next automatic reconnect fires, if one is scheduled.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Receive every inbound message plus local `connection_status` updates.
    #[must_use = "dropping the subscription removes the listener"]
    pub fn add_listener(&self, listener: impl Fn(&Message) + 'static) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Start the connection.
    pub fn init(&mut self, now: Instant) {
        self.manual_close = false;
        self.connect(now);
    }

    /// Manual disconnect. Clears both timers and closes with a normal code.
    pub fn teardown(&mut self) {
        log::info!("Disconnecting from {}", self.config.url);
        self.manual_close = true;
        self.reconnect_at = None;
        self.next_heartbeat = None;
        self.transport.close(CLOSE_NORMAL);
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Manual reconnect. Resets the retry budget, including after `failed`.
    pub fn reconnect(&mut self, now: Instant) {
        log::info!("Manual reconnect requested");
        self.attempts = 0;
        self.reconnect_at = None;
        self.next_heartbeat = None;
        self.manual_close = false;
        if matches!(
            self.status,
            ConnectionStatus::Connected | ConnectionStatus::Connecting
        ) {
            self.transport.close(CLOSE_NORMAL);
            self.status = ConnectionStatus::Disconnected;
        }
        self.connect(now);
    }

    /// Send now if connected; otherwise queue and make sure a connection
    /// attempt is underway. The frame is serialized immediately.
    pub fn send(&mut self, message: &Message, now: Instant) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                log::error!("Failed to serialize outbound message: {}", e);
                return;
            }
        };

        if self.status == ConnectionStatus::Connected {
            if let Err(e) = self.transport.send(&text) {
                log::warn!("Send failed, requeueing: {}", e);
                self.queue.push_front(text);
                self.reset_link(now);
            }
            return;
        }

        self.queue.push_back(text);
        log::debug!("Queued message ({} pending)", self.queue.len());

        let idle = matches!(
            self.status,
            ConnectionStatus::Disconnected | ConnectionStatus::Error
        );
        if idle && self.reconnect_at.is_none() {
            self.manual_close = false;
            self.connect(now);
        }
    }

    /// Drive the state machine: transport events, reconnect timer, heartbeat.
    pub fn poll(&mut self, now: Instant) {
        for event in self.transport.poll_events() {
            self.handle_event(event, now);
        }

        if self.reconnect_at.is_some_and(|at| now >= at) {
            self.reconnect_at = None;
            log::info!(
                "Reconnect attempt {}/{}",
                self.attempts,
                self.config.max_reconnect_attempts
            );
            self.connect(now);
        }

        if self.status == ConnectionStatus::Connected
            && self.next_heartbeat.is_some_and(|at| now >= at)
        {
            self.heartbeat(now);
        }
    }

    fn connect(&mut self, now: Instant) {
        if matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return;
        }
        log::info!("Connecting to {}", self.config.url);
        self.set_status(ConnectionStatus::Connecting);
        if let Err(e) = self.transport.open(&self.config.url) {
            log::error!("Failed to open socket: {}", e);
            self.fail(now);
        }
    }

    fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Opened => self.on_open(now),
            TransportEvent::Message(text) => match Message::parse(&text) {
                Ok(message) => {
                    self.listeners.emit(&message);
                }
                Err(e) => {
                    let preview: String = text.chars().take(100).collect();
                    log::warn!("Dropping malformed message ({}): {}", e, preview);
                }
            },
            TransportEvent::Closed { code } => self.on_close(code, now),
            TransportEvent::Error(e) => {
                log::error!("Socket error: {}", e);
                if matches!(
                    self.status,
                    ConnectionStatus::Connecting | ConnectionStatus::Connected
                ) {
                    self.transport.close(CLOSE_CLIENT_RESET);
                    self.fail(now);
                }
            }
        }
    }

    fn on_open(&mut self, now: Instant) {
        if self.status != ConnectionStatus::Connecting {
            log::debug!("Ignoring open event in state {}", self.status);
            return;
        }
        log::info!("Connected to {}", self.config.url);
        self.attempts = 0;
        self.reconnect_at = None;

        while let Some(text) = self.queue.pop_front() {
            if let Err(e) = self.transport.send(&text) {
                log::warn!("Flush failed, requeueing: {}", e);
                self.queue.push_front(text);
                self.reset_link(now);
                return;
            }
        }

        self.next_heartbeat = Some(now + self.config.heartbeat_interval);
        self.set_status(ConnectionStatus::Connected);
    }

    fn on_close(&mut self, code: u16, now: Instant) {
        if !matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return;
        }
        log::info!("Socket closed with code {}", code);
        self.next_heartbeat = None;
        self.set_status(ConnectionStatus::Disconnected);
        if code != CLOSE_NORMAL && !self.manual_close {
            self.schedule_reconnect(now);
        }
    }

    fn heartbeat(&mut self, now: Instant) {
        let ping = match Message::Ping.to_json() {
            Ok(ping) => ping,
            Err(_) => return,
        };
        match self.transport.send(&ping) {
            Ok(()) => {
                self.next_heartbeat = Some(now + self.config.heartbeat_interval);
            }
            Err(e) => {
                log::warn!("Heartbeat failed, resetting link: {}", e);
                self.reset_link(now);
            }
        }
    }

    /// Force-close a link that can no longer send and treat it as an
    /// abnormal close.
    fn reset_link(&mut self, now: Instant) {
        self.transport.close(CLOSE_CLIENT_RESET);
        self.on_close(CLOSE_CLIENT_RESET, now);
    }

    fn fail(&mut self, now: Instant) {
        self.next_heartbeat = None;
        self.set_status(ConnectionStatus::Error);
        self.schedule_reconnect(now);
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if self.reconnect_at.is_some() {
            return;
        }
        if self.attempts >= self.config.max_reconnect_attempts {
            log::error!(
                "Giving up after {} reconnect attempts",
                self.config.max_reconnect_attempts
            );
            self.set_status(ConnectionStatus::Failed);
            return;
        }
        self.attempts += 1;
        let delay = reconnect_delay(self.attempts, &self.config);
        log::info!("Reconnecting in {} ms", delay.as_millis());
        self.reconnect_at = Some(now + delay);
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        log::debug!("Connection status {} -> {}", self.status, status);
        self.status = status;
        self.listeners.emit(&Message::status(status));
    }
}
