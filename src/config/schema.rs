//! Configuration schema for depot
//!
//! Configuration is stored at `~/.config/depot/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::auth::Access;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Artifact storage settings
    pub storage: StorageConfig,

    /// Remote mirror fetch settings
    pub fetch: FetchConfig,

    /// Remote mirrors, consulted in order for release artifacts
    #[serde(rename = "remote")]
    pub remotes: Vec<RemoteConfig>,

    /// Authentication settings
    pub auth: AuthConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port to bind
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Artifact storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the on-disk repository tree; each repository gets a
    /// subdirectory named after it, `local` being the writable one
    pub root: PathBuf,

    /// In-memory content cache budget in MiB
    pub cache_capacity_mb: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("depot")
                .join("storage"),
            cache_capacity_mb: 256,
        }
    }
}

/// Remote mirror fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds, so a hung mirror cannot stall
    /// fallback to the next one
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// A single remote mirror
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Repository name, also the local slot directory under the storage root
    pub name: String,

    /// Base URL artifacts are fetched from
    pub url: String,

    /// Optional basic-auth username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Optional basic-auth password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Access level granted to requests without credentials
    pub default_access: Access,

    /// Users per access level: `[auth.users.write]` maps username to password
    pub users: BTreeMap<Access, BTreeMap<String, String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_access: Access::Read,
            users: BTreeMap::new(),
        }
    }
}
