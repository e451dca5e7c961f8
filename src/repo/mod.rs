//! Artifact resolution, caching, and snapshot-versioning engine
//!
//! The modules here implement the repository core: path containment
//! ([`paths`]), file content with digests ([`content`]), the single-flight
//! content cache ([`cache`]), the snapshot write protocol ([`snapshot`]),
//! sequential mirror fallback ([`fetch`]), and the request orchestration
//! that ties them together ([`engine`]).

pub mod cache;
pub mod content;
pub mod engine;
pub mod fetch;
pub mod paths;
pub mod snapshot;

use crate::config::schema::RemoteConfig;
use crate::error::{DepotError, DepotResult};

/// Name of the single writable repository; reserved in configuration
pub const LOCAL_REPOSITORY: &str = "local";

/// A configured read-only remote mirror
#[derive(Debug, Clone)]
pub struct RemoteRepository {
    pub name: String,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RemoteRepository {
    /// Validate and convert configured remotes, preserving their order.
    ///
    /// Rejects the reserved `local` name and duplicate names; both would
    /// alias another repository's slot directory on disk.
    pub fn from_config(remotes: &[RemoteConfig]) -> DepotResult<Vec<RemoteRepository>> {
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::with_capacity(remotes.len());
        for remote in remotes {
            if remote.name == LOCAL_REPOSITORY {
                return Err(DepotError::ReservedRepositoryName);
            }
            if !seen.insert(remote.name.clone()) {
                return Err(DepotError::DuplicateRepositoryName(remote.name.clone()));
            }
            result.push(RemoteRepository {
                name: remote.name.clone(),
                url: remote.url.clone(),
                username: remote.username.clone(),
                password: remote.password.clone(),
            });
        }
        Ok(result)
    }
}
