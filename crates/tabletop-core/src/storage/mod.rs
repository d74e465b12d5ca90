//! Client-side preference persistence.
//!
//! The session token, the signed-in user and the admin display scale
//! survive restarts. Backends only deal in string values; [`Preferences`]
//! layers the typed accessors on top.

mod memory;

#[cfg(not(target_arch = "wasm32"))]
mod file;

#[cfg(target_arch = "wasm32")]
mod local;

pub use memory::MemoryStorage;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(target_arch = "wasm32")]
pub use local::LocalStorage;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Key holding the bearer token.
pub const TOKEN_KEY: &str = "token";
/// Key holding the signed-in user as JSON.
pub const USER_KEY: &str = "user";
/// Key holding the admin display scale.
pub const DISPLAY_SCALE_KEY: &str = "displayScale";

/// Display scale used when nothing valid is stored.
pub const DEFAULT_DISPLAY_SCALE: f64 = 1.0;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A flat string key/value store.
///
/// Note: On native platforms, implementations must be Send + Sync.
/// On WASM, these bounds are relaxed since it's single-threaded.
#[cfg(not(target_arch = "wasm32"))]
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// A flat string key/value store (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait PreferenceStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Account role as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Viewer,
}

/// The signed-in user as cached after login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn new(id: u64, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role,
            extra: Map::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Typed access to the persisted client state.
pub struct Preferences<S: PreferenceStore> {
    store: S,
}

impl<S: PreferenceStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn auth_token(&self) -> StorageResult<Option<String>> {
        self.store.get(TOKEN_KEY)
    }

    pub fn set_auth_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(TOKEN_KEY, token)
    }

    pub fn user(&self) -> StorageResult<Option<UserProfile>> {
        match self.store.get(USER_KEY)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn set_user(&self, user: &UserProfile) -> StorageResult<()> {
        let json =
            serde_json::to_string(user).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.set(USER_KEY, &json)
    }

    /// Forget the token and the cached user (logout).
    pub fn clear_session(&self) -> StorageResult<()> {
        self.store.remove(TOKEN_KEY)?;
        self.store.remove(USER_KEY)
    }

    /// Stored display scale, or [`DEFAULT_DISPLAY_SCALE`] when unset or unusable.
    pub fn display_scale(&self) -> StorageResult<f64> {
        let Some(raw) = self.store.get(DISPLAY_SCALE_KEY)? else {
            return Ok(DEFAULT_DISPLAY_SCALE);
        };
        match raw.trim().parse::<f64>() {
            Ok(scale) if valid_scale(scale) => Ok(scale),
            _ => {
                log::warn!("Ignoring stored display scale {:?}", raw);
                Ok(DEFAULT_DISPLAY_SCALE)
            }
        }
    }

    /// Persist the display scale. Only finite positive values are accepted.
    pub fn set_display_scale(&self, scale: f64) -> StorageResult<()> {
        if !valid_scale(scale) {
            return Err(StorageError::InvalidValue {
                key: DISPLAY_SCALE_KEY.to_string(),
                value: scale.to_string(),
            });
        }
        self.store.set(DISPLAY_SCALE_KEY, &scale.to_string())
    }
}

fn valid_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0
}
