//! In-memory map uploads: `/maps/*`.

use crate::AppState;
use crate::error::RelayError;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An uploaded map image.
#[derive(Debug, Clone)]
pub struct StoredMap {
    pub name: String,
    pub folder: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEntry {
    pub name: String,
    pub folder: String,
}

#[derive(Debug, Serialize)]
pub struct MapListing {
    pub maps: Vec<MapEntry>,
}

#[derive(Debug, Serialize)]
pub struct Uploaded {
    pub filename: String,
    pub folder: String,
}

fn map_key(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

pub async fn list_maps(State(state): State<Arc<AppState>>) -> Json<MapListing> {
    let mut maps: Vec<MapEntry> = state
        .maps
        .iter()
        .map(|e| MapEntry {
            name: e.value().name.clone(),
            folder: e.value().folder.clone(),
        })
        .collect();
    maps.sort_by(|a, b| a.folder.cmp(&b.folder).then_with(|| a.name.cmp(&b.name)));
    Json(MapListing { maps })
}

/// Multipart fields: `file` (required, with a file name) and `folder`.
pub async fn upload_map(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Uploaded>, RelayError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut folder = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::BadRequest(e.body_text()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| RelayError::BadRequest("File name is required".to_string()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| RelayError::BadRequest(e.body_text()))?;
                file = Some((name, bytes));
            }
            Some("folder") => {
                folder = field
                    .text()
                    .await
                    .map_err(|e| RelayError::BadRequest(e.body_text()))?
                    .trim_matches('/')
                    .to_string();
            }
            _ => {}
        }
    }

    let (name, data) = file.ok_or_else(|| RelayError::BadRequest("File is required".to_string()))?;
    info!("Uploaded map {} ({} bytes) to '{}'", name, data.len(), folder);
    state.maps.insert(
        map_key(&folder, &name),
        StoredMap {
            name: name.clone(),
            folder: folder.clone(),
            data,
        },
    );
    Ok(Json(Uploaded {
        filename: name,
        folder,
    }))
}

/// Serve an uploaded map by `folder/name`. A path that misses falls back
/// to the first map with the same file name in any folder.
pub async fn get_map_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, RelayError> {
    let path = path.trim_matches('/');
    let data = match state.maps.get(path) {
        Some(entry) => entry.value().data.clone(),
        None => {
            let name = path.rsplit('/').next().unwrap_or(path);
            let mut matches: Vec<(String, Bytes)> = state
                .maps
                .iter()
                .filter(|e| e.value().name == name)
                .map(|e| (e.key().clone(), e.value().data.clone()))
                .collect();
            matches.sort_by(|a, b| a.0.cmp(&b.0));
            let (key, data) = matches.into_iter().next().ok_or_else(|| {
                warn!("Map file not found: {}", path);
                RelayError::FileNotFound
            })?;
            debug!("Map {} served from {}", path, key);
            data
        }
    };
    Ok(([(header::CONTENT_TYPE, content_type(path))], data).into_response())
}

fn content_type(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("dungeons/cave.PNG"), "image/png");
        assert_eq!(content_type("field.jpeg"), "image/jpeg");
        assert_eq!(content_type("notes"), "application/octet-stream");
    }

    #[test]
    fn test_map_key() {
        assert_eq!(map_key("", "cave.png"), "cave.png");
        assert_eq!(map_key("dungeons", "cave.png"), "dungeons/cave.png");
    }
}
