//! Tabletop client application.
//!
//! A headless admin/viewer shell: connection manager, scene session and
//! layout wired together behind a command line.

#[cfg(not(target_arch = "wasm32"))]
mod app;
#[cfg(not(target_arch = "wasm32"))]
mod config;

#[cfg(not(target_arch = "wasm32"))]
pub use app::{App, AppError};
#[cfg(not(target_arch = "wasm32"))]
pub use config::AppConfig;
