//! Socket transports used by the connection manager.
//!
//! A transport is a thin, non-blocking wrapper around one WebSocket. Events
//! are collected as they happen and drained with [`Transport::poll_events`].

#[cfg(not(target_arch = "wasm32"))]
mod native;

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeTransport;

#[cfg(target_arch = "wasm32")]
pub use wasm::WasmTransport;

use thiserror::Error;

/// Close code for an intentional, clean shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the peer sent no status.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code reported when the link dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code used when the client tears down a broken link itself
/// (failed heartbeat or send).
pub const CLOSE_CLIENT_RESET: u16 = 4000;

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Already open")]
    AlreadyOpen,
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Transport error: {0}")]
    Other(String),
}

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed { code: u16 },
    Error(String),
}

/// A single WebSocket link.
pub trait Transport {
    /// Start opening a socket. Completion is reported as [`TransportEvent::Opened`].
    fn open(&mut self, url: &str) -> Result<(), TransportError>;

    /// Send a text frame on the open socket.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close the socket. Events still queued for it are discarded.
    fn close(&mut self, code: u16);

    /// Drain events collected since the last call.
    fn poll_events(&mut self) -> Vec<TransportEvent>;
}

/// Platform-specific transport type.
#[cfg(target_arch = "wasm32")]
pub type PlatformTransport = WasmTransport;

#[cfg(not(target_arch = "wasm32"))]
pub type PlatformTransport = NativeTransport;
