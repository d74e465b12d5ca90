//! Tabletop relay server binary.
//!
//! Listens on `TABLETOP_RELAY_ADDR` (default `0.0.0.0:8000`).

use std::{net::SocketAddr, sync::Arc};
use tabletop_relay::{AppState, app};
use tracing::info;

const DEFAULT_ADDR: &str = "0.0.0.0:8000";

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabletop_relay=info,tower_http=info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var("TABLETOP_RELAY_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let state = Arc::new(AppState::new());

    info!("Tabletop relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await
}
