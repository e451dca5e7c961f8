//! Read and write orchestration
//!
//! The engine owns no request state; per request it combines the path
//! resolver, snapshot protocol, content cache, and mirror fetcher into the
//! repository's unified view: local first, then the remote slots, then a
//! live mirror fetch for release artifacts. Snapshot reads never leave the
//! local repository.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::auth::{Access, Authenticator, Principal};
use crate::error::{DepotError, DepotResult};
use crate::repo::cache::ContentCache;
use crate::repo::content::StoredFile;
use crate::repo::fetch::{set_modified, MirrorFetcher};
use crate::repo::paths::{accepted_suffix, is_metadata, is_snapshot, PathResolver};
use crate::repo::{snapshot, RemoteRepository, LOCAL_REPOSITORY};

/// A readable artifact plus its derived content type
#[derive(Debug, Clone)]
pub struct ArtifactView {
    pub file: Arc<StoredFile>,
    pub content_type: &'static str,
}

/// Result of a PUT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// New file stored
    Created,
    /// Existing snapshot replaced
    Replaced,
    /// Metadata document accepted and thrown away
    Discarded,
}

/// Methods a caller may use on a path
#[derive(Debug, Clone, Copy)]
pub struct AllowedMethods {
    pub write: bool,
}

impl AllowedMethods {
    pub fn header_value(&self) -> &'static str {
        if self.write {
            "OPTIONS, HEAD, GET, PUT"
        } else {
            "OPTIONS, HEAD, GET"
        }
    }
}

/// Orchestrates artifact resolution, caching, and the snapshot protocol
pub struct ResolutionEngine {
    resolver: PathResolver,
    remotes: Vec<RemoteRepository>,
    cache: Arc<ContentCache>,
    fetcher: MirrorFetcher,
}

impl ResolutionEngine {
    pub fn new(
        storage_root: impl Into<std::path::PathBuf>,
        remotes: Vec<RemoteRepository>,
        cache_capacity_bytes: u64,
        fetch_timeout: Duration,
    ) -> Self {
        let resolver = PathResolver::new(storage_root);
        let cache = Arc::new(ContentCache::new(cache_capacity_bytes));
        let fetcher = MirrorFetcher::new(resolver.clone(), cache.clone(), fetch_timeout);
        Self {
            resolver,
            remotes,
            cache,
            fetcher,
        }
    }

    /// Resolve a GET or HEAD request. `Ok(None)` is a plain not-found;
    /// metadata documents are always not-found by design.
    pub async fn read(
        &self,
        relative: &str,
        principal: &Principal,
    ) -> DepotResult<Option<ArtifactView>> {
        Authenticator::assert(principal, Access::Read)?;
        if is_metadata(relative) {
            return Ok(None);
        }

        let snapshot_version = is_snapshot(relative);
        let mut candidates = vec![self.resolver.resolve(LOCAL_REPOSITORY, relative)?];
        if !snapshot_version {
            for remote in &self.remotes {
                candidates.push(self.resolver.resolve(&remote.name, relative)?);
            }
        }

        for candidate in &candidates {
            if tokio::fs::try_exists(candidate).await.unwrap_or(false) {
                info!("Reading {} locally", relative);
                return Ok(Some(self.view(candidate, relative).await?));
            }
        }

        // snapshot misses never fall back to the network
        if snapshot_version {
            return Ok(None);
        }
        match self.fetcher.fetch(relative, &self.remotes).await? {
            Some(fetched) => Ok(Some(self.view(&fetched, relative).await?)),
            None => Ok(None),
        }
    }

    /// Report the methods a caller may use; `Ok(None)` for metadata paths
    pub fn allowed_methods(
        &self,
        relative: &str,
        principal: &Principal,
    ) -> DepotResult<Option<AllowedMethods>> {
        Authenticator::assert(principal, Access::Read)?;
        if is_metadata(relative) {
            return Ok(None);
        }
        Ok(Some(AllowedMethods {
            write: principal.access >= Access::Write,
        }))
    }

    /// Store an uploaded artifact under the local repository.
    ///
    /// Snapshot uploads go through the rewrite protocol and prune stale
    /// siblings; release uploads are write-once.
    pub async fn write(
        &self,
        relative: &str,
        principal: &Principal,
        content: Vec<u8>,
    ) -> DepotResult<WriteOutcome> {
        Authenticator::assert(principal, Access::Write)?;
        let save_path = self.resolver.resolve(LOCAL_REPOSITORY, relative)?;
        if is_metadata(relative) {
            return Ok(WriteOutcome::Discarded);
        }

        let file_name = save_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DepotError::UnsupportedSuffix(relative.to_string()))?
            .to_string();
        let suffix = accepted_suffix(&file_name)
            .ok_or_else(|| DepotError::UnsupportedSuffix(file_name.clone()))?;

        let version_dir = save_path
            .parent()
            .ok_or_else(|| DepotError::Internal(format!("no parent for {}", relative)))?
            .to_path_buf();

        if is_snapshot(relative) {
            let staged = snapshot::stage(&file_name, suffix, Utc::now());
            let target = version_dir.join(&staged.file_name);
            let existed = tokio::fs::try_exists(&target).await.unwrap_or(false);

            let saved = self.save(&target, content, staged.modified).await;
            if staged.cleanup {
                // each timestamped build replaces the previous build's
                // whole artifact set
                self.prune_other_builds(&version_dir, staged.modified).await;
            }
            saved?;

            info!("Saved path {} to {}", relative, target.display());
            Ok(if existed {
                WriteOutcome::Replaced
            } else {
                WriteOutcome::Created
            })
        } else {
            if tokio::fs::try_exists(&save_path).await.unwrap_or(false) {
                return Err(DepotError::ReleaseImmutable(save_path));
            }
            self.save(&save_path, content, Utc::now()).await?;
            info!("Saved path {} to {}", relative, save_path.display());
            Ok(WriteOutcome::Created)
        }
    }

    /// Serve a file through the content cache
    async fn view(&self, path: &Path, relative: &str) -> DepotResult<ArtifactView> {
        let file = self.cache.get(path).await?;
        Ok(ArtifactView {
            file,
            content_type: content_type(relative),
        })
    }

    /// Stage-and-flush write: parents created, content written whole, mtime
    /// stamped, cache entry dropped so readers observe the new bytes
    async fn save(
        &self,
        target: &Path,
        content: Vec<u8>,
        modified: DateTime<Utc>,
    ) -> DepotResult<()> {
        let result = async {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DepotError::StorageWrite {
                        path: target.to_path_buf(),
                        source: e,
                    })?;
            }
            tokio::fs::write(target, content)
                .await
                .map_err(|e| DepotError::StorageWrite {
                    path: target.to_path_buf(),
                    source: e,
                })?;
            set_modified(target, modified).map_err(|e| DepotError::StorageWrite {
                path: target.to_path_buf(),
                source: e,
            })
        }
        .await;
        self.cache.invalidate(target);
        result
    }

    /// Delete every file in the version directory whose modification time
    /// differs from the just-written build timestamp. Failures are logged
    /// and skipped; cleanup never fails the upload itself.
    async fn prune_other_builds(&self, version_dir: &Path, modified: DateTime<Utc>) {
        let mut entries = match tokio::fs::read_dir(version_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to list files in {}: {}", version_dir.display(), e);
                return;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read entry in {}: {}", version_dir.display(), e);
                    break;
                }
            };
            let path = entry.path();
            let entry_modified: DateTime<Utc> = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(time) => time.into(),
                Err(e) => {
                    error!("Failed to get modified time for {}: {}", path.display(), e);
                    continue;
                }
            };
            if entry_modified != modified {
                self.cache.invalidate(&path);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    error!("Failed to delete {}: {}", path.display(), e);
                } else {
                    info!("Pruned stale snapshot file {}", path.display());
                }
            }
        }
    }
}

/// Content type from the final filename extension only
fn content_type(relative: &str) -> &'static str {
    match relative.rsplit_once('.').map(|(_, extension)| extension) {
        Some("jar") => "application/java-archive",
        Some("sha1") | Some("md5") => "text/plain",
        Some("xml") | Some("pom") => "text/xml",
        _ => "application/octet-stream",
    }
}
