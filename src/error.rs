//! Error types for depot
//!
//! All modules use `DepotResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

use crate::auth::Access;

/// Result type alias for depot operations
pub type DepotResult<T> = Result<T, DepotError>;

/// All errors that can occur in depot
#[derive(Error, Debug)]
pub enum DepotError {
    // Request errors
    #[error("Path {path} resolves outside of repository {repository}")]
    PathSecurity { repository: String, path: String },

    #[error("Unsupported file suffix: {0}")]
    UnsupportedSuffix(String),

    #[error("Not allowed to update released file: {0}")]
    ReleaseImmutable(PathBuf),

    #[error("Access denied, {required} access required")]
    AccessDenied { required: Access },

    // Storage errors
    #[error("Could not read {path}: {reason}")]
    StorageRead { path: PathBuf, reason: String },

    #[error("Failed to save file {path}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upstream {url} failed after responding: {reason}")]
    Upstream { url: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Storage directory {0} is not writable")]
    StorageNotWritable(PathBuf),

    #[error("The name 'local' is reserved for the local repository")]
    ReservedRepositoryName,

    #[error("Duplicate remote repository name: {0}")]
    DuplicateRepositoryName(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DepotError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a storage read error
    pub fn storage_read(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StorageRead {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is the client's fault (HTTP 4xx) rather than ours
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedSuffix(_) | Self::ReleaseImmutable(_) | Self::AccessDenied { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Run: depot config show"),
            Self::StorageNotWritable(_) => {
                Some("Check ownership and permissions of the storage directory")
            }
            Self::ReservedRepositoryName => Some("Rename the remote in [[remote]]"),
            _ => None,
        }
    }
}
