//! JSON message envelope exchanged over the scene socket.
//!
//! Every frame is an object with a `type` tag and a type-specific payload:
//! ```json
//! { "type": "scene_update", "scene": { "id": "...", "maps": [] } }
//! { "type": "ping" }
//! { "type": "highlight_marker", "markerId": "..." }
//! ```

use crate::scene::Scene;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Connection status as shown in the status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
    /// Reconnect attempts exhausted; only a manual reconnect leaves this state.
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A message on the scene socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Full scene snapshot; replaces the receiver's scene wholesale.
    SceneUpdate { scene: Box<Scene> },
    /// Local status notification from the connection manager.
    ConnectionStatus { status: ConnectionStatus },
    /// Heartbeat. No response expected.
    Ping,
    HighlightMarker {
        #[serde(rename = "markerId")]
        marker_id: String,
    },
    BlankViewer,
    UnblankViewer,
    RotateViewer,
    UnrotateViewer,
    DisplayScaleUpdate { scale: f64 },
    RippleEffect {
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    LightningEffect {
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    ShakeEffect {
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    /// Any message type this client does not know.
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn scene_update(scene: Scene) -> Self {
        Message::SceneUpdate {
            scene: Box::new(scene),
        }
    }

    pub fn status(status: ConnectionStatus) -> Self {
        Message::ConnectionStatus { status }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether the relay should forward this message to other clients.
    pub fn is_broadcast(&self) -> bool {
        !matches!(
            self,
            Message::ConnectionStatus { .. } | Message::Ping | Message::Unknown
        )
    }
}
