//! In-memory scene library: `/scenes/*`.

use crate::AppState;
use crate::error::RelayError;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tabletop_core::scene::Scene;
use tracing::info;
use uuid::Uuid;

/// Folder entry in the scene listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub path: String,
    pub parent: String,
}

#[derive(Debug, Serialize)]
pub struct SceneListing {
    pub folders: Vec<FolderEntry>,
    pub scenes: Vec<Scene>,
}

/// `POST /scenes/folder` body.
#[derive(Debug, Deserialize)]
pub struct FolderCreate {
    pub folder_name: String,
    #[serde(default)]
    pub parent_folder: Option<String>,
}

/// `PUT /scenes/folder/{path}` body.
#[derive(Debug, Deserialize)]
pub struct FolderRename {
    pub new_name: String,
}

/// Every folder path in `paths`, parents included.
fn expand<'a>(paths: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    let mut all = BTreeSet::new();
    for path in paths {
        let mut prefix = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            all.insert(prefix.clone());
        }
    }
    all
}

/// Every folder implied by the given folder paths, parents included.
fn folders_of<'a>(paths: impl Iterator<Item = &'a str>) -> Vec<FolderEntry> {
    expand(paths)
        .into_iter()
        .map(|path| {
            let (parent, name) = match path.rsplit_once('/') {
                Some((parent, name)) => (parent.to_string(), name.to_string()),
                None => (String::new(), path.clone()),
            };
            FolderEntry {
                name,
                kind: "folder",
                path,
                parent,
            }
        })
        .collect()
}

/// Created folders plus those the saved scenes live in.
fn known_folders(state: &AppState) -> BTreeSet<String> {
    let scene_folders: Vec<String> = state
        .scenes
        .iter()
        .filter_map(|e| e.value().folder.clone())
        .collect();
    let created: Vec<String> = state.folders.iter().map(|f| f.key().clone()).collect();
    expand(scene_folders.iter().chain(created.iter()).map(String::as_str))
}

/// `path` itself or anything below it.
fn within(path: &str, folder: &str) -> bool {
    path == folder
        || path
            .strip_prefix(folder)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn valid_folder_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && name != "." && name != ".."
}

pub async fn list_scenes(State(state): State<Arc<AppState>>) -> Json<SceneListing> {
    let mut scenes: Vec<Scene> = state.scenes.iter().map(|e| e.value().clone()).collect();
    scenes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    let known = known_folders(&state);
    let folders = folders_of(known.iter().map(String::as_str));
    Json(SceneListing { folders, scenes })
}

pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FolderCreate>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    let Json(request) = body.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    let name = request.folder_name.trim();
    if !valid_folder_name(name) {
        return Err(RelayError::BadRequest("Folder name is required".to_string()));
    }
    let path = match request.parent_folder.as_deref().map(|p| p.trim_matches('/')) {
        Some(parent) if !parent.is_empty() => format!("{parent}/{name}"),
        _ => name.to_string(),
    };
    if known_folders(&state).contains(&path) {
        return Err(RelayError::BadRequest("Folder already exists".to_string()));
    }
    info!("Created scene folder {}", path);
    state.folders.insert(path);
    Ok(Json(json!({ "message": "Folder created successfully" })))
}

/// Removes the folder, its subfolders and every scene inside them.
pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<Value>, RelayError> {
    let path = path.trim_matches('/').to_string();
    if !known_folders(&state).contains(&path) {
        return Err(RelayError::FolderNotFound);
    }
    state.folders.retain(|f| !within(f, &path));
    let before = state.scenes.len();
    state
        .scenes
        .retain(|_, scene| !scene.folder.as_deref().is_some_and(|f| within(f, &path)));
    info!(
        "Deleted scene folder {} with {} scenes",
        path,
        before - state.scenes.len()
    );
    Ok(Json(json!({ "message": "Folder deleted successfully" })))
}

/// Renames the last segment of `path`; subfolders and scenes move along.
pub async fn rename_folder(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    body: Result<Json<FolderRename>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    let Json(request) = body.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    let path = path.trim_matches('/').to_string();
    let known = known_folders(&state);
    if !known.contains(&path) {
        return Err(RelayError::FolderNotFound);
    }
    let new_name = request.new_name.trim();
    if !valid_folder_name(new_name) {
        return Err(RelayError::BadRequest("New name is required".to_string()));
    }
    let renamed = match path.rsplit_once('/') {
        Some((parent, _)) => format!("{parent}/{new_name}"),
        None => new_name.to_string(),
    };
    if known.contains(&renamed) {
        return Err(RelayError::BadRequest(format!(
            "A folder named '{new_name}' already exists"
        )));
    }

    let moved = |folder: &str| format!("{renamed}{}", &folder[path.len()..]);
    let created: Vec<String> = state
        .folders
        .iter()
        .map(|f| f.key().clone())
        .filter(|f| within(f, &path))
        .collect();
    for folder in created {
        state.folders.remove(&folder);
        state.folders.insert(moved(&folder));
    }
    for mut entry in state.scenes.iter_mut() {
        let target = entry.value().folder.as_deref().filter(|f| within(f, &path)).map(moved);
        if let Some(target) = target {
            entry.value_mut().folder = Some(target);
        }
    }
    info!("Renamed scene folder {} to {}", path, renamed);
    Ok(Json(json!({ "message": "Folder renamed successfully" })))
}

pub async fn save_scene(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Scene>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    let Json(mut scene) = body.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    scene.id = Uuid::new_v4().to_string();
    let id = scene.id.clone();
    info!("Saved scene {} ({})", scene.name, id);
    state.scenes.insert(id.clone(), scene);
    Ok(Json(json!({ "message": "Scene saved successfully", "id": id })))
}

pub async fn load_scene(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Scene>, RelayError> {
    state
        .scenes
        .get(&id)
        .map(|entry| Json(entry.value().clone()))
        .ok_or(RelayError::SceneNotFound)
}

pub async fn update_scene(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<Scene>, JsonRejection>,
) -> Result<Json<Value>, RelayError> {
    let Json(mut scene) = body.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    let mut entry = state.scenes.get_mut(&id).ok_or(RelayError::SceneNotFound)?;
    scene.id = id.clone();
    *entry = scene;
    Ok(Json(json!({ "message": "Scene updated successfully", "id": id })))
}

pub async fn delete_scene(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RelayError> {
    state.scenes.remove(&id).ok_or(RelayError::SceneNotFound)?;
    info!("Deleted scene {}", id);
    Ok(Json(json!({ "message": "Scene deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folders_include_parents() {
        let folders = folders_of(["campaign/act1", "campaign", "oneshots"].into_iter());
        let paths: Vec<&str> = folders.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["campaign", "campaign/act1", "oneshots"]);
        assert_eq!(folders[1].name, "act1");
        assert_eq!(folders[1].parent, "campaign");
        assert_eq!(folders[0].parent, "");
    }

    #[test]
    fn test_within() {
        assert!(within("campaign", "campaign"));
        assert!(within("campaign/act1", "campaign"));
        assert!(!within("campaigns", "campaign"));
        assert!(!within("oneshots", "campaign"));
    }

    #[test]
    fn test_valid_folder_name() {
        assert!(valid_folder_name("act1"));
        assert!(!valid_folder_name(""));
        assert!(!valid_folder_name("a/b"));
        assert!(!valid_folder_name(".."));
    }
}
