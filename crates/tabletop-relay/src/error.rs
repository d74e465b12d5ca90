//! HTTP error responses in the backend's `{"detail": ...}` shape.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Scene not found")]
    SceneNotFound,
    #[error("Folder not found")]
    FolderNotFound,
    #[error("File not found")]
    FileNotFound,
    #[error("{0}")]
    BadRequest(String),
}

impl RelayError {
    fn status(&self) -> StatusCode {
        match self {
            RelayError::SceneNotFound | RelayError::FolderNotFound | RelayError::FileNotFound => {
                StatusCode::NOT_FOUND
            }
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
