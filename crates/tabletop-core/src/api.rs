//! Blocking client for the backend's scene and map endpoints.
//!
//! Failures are returned to the caller to show as a notification; nothing
//! is retried and nothing here touches the scene socket.

use crate::scene::Scene;
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, multipart};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default backend base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Server returned {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Status { status: u16, detail: Option<String> },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Text for a user-facing notification: the server's detail when it
    /// sent one, `fallback` otherwise.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Status {
                detail: Some(detail),
                ..
            } => detail.clone(),
            _ => fallback.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Extract the `detail` of an error body.
///
/// Accepts a plain string detail or a list of validation errors with
/// `msg` fields.
pub fn parse_error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}

/// Scene folder entry from `/scenes/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFolder {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub parent: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneList {
    #[serde(default)]
    pub folders: Vec<SceneFolder>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// A map file known to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub name: String,
    #[serde(default)]
    pub folder: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapList {
    #[serde(default)]
    pub maps: Vec<MapEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedMap {
    pub filename: String,
    #[serde(default)]
    pub folder: String,
}

/// Acknowledgement for scene writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSaved {
    #[serde(default)]
    pub message: String,
    /// Id assigned by the server, when it reports one.
    #[serde(default)]
    pub id: Option<String>,
}

/// Backend HTTP client.
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn list_scenes(&self) -> ApiResult<SceneList> {
        self.execute(self.request(Method::GET, "/scenes/list"))
    }

    pub fn save_scene(&self, scene: &Scene) -> ApiResult<SceneSaved> {
        self.execute(self.request(Method::POST, "/scenes/save").json(scene))
    }

    pub fn load_scene(&self, id: &str) -> ApiResult<Scene> {
        self.execute(self.request(Method::GET, &format!("/scenes/load/{id}")))
    }

    pub fn update_scene(&self, id: &str, scene: &Scene) -> ApiResult<SceneSaved> {
        self.execute(self.request(Method::PUT, &format!("/scenes/{id}")).json(scene))
    }

    pub fn list_maps(&self) -> ApiResult<MapList> {
        self.execute(self.request(Method::GET, "/maps/list"))
    }

    /// Upload a map image, optionally into `folder`.
    pub fn upload_map(&self, path: &Path, folder: Option<&str>) -> ApiResult<UploadedMap> {
        let mut form = multipart::Form::new().file("file", path)?;
        if let Some(folder) = folder {
            form = form.text("folder", folder.to_string());
        }
        self.execute(self.request(Method::POST, "/maps/upload").multipart(form))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("{} {}", method, url);
        let request = self.client.request(method, url);
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let detail = parse_error_detail(&body);
            log::warn!("Request failed with {}: {:?}", status, detail);
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response.json::<T>()?)
    }
}
