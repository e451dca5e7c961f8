//! Single-flight content cache
//!
//! Maps absolute storage paths to loaded [`StoredFile`]s. Concurrent
//! callers for the same path share one in-flight load instead of each
//! hitting the disk; resolved entries live in a byte-budget LRU and are
//! recomputed transparently after eviction. `invalidate` removes an entry
//! unconditionally so the next `get` re-reads, and also de-registers any
//! in-flight load so a late completion cannot resurrect stale content.
//!
//! Loads run on detached tasks: a caller that disconnects mid-request does
//! not abort work other waiters share.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{DepotError, DepotResult};
use crate::repo::content::StoredFile;

/// Reads file content on a cache miss; swapped out in tests
#[async_trait]
pub trait ContentLoader: Send + Sync + 'static {
    async fn load(&self, path: &Path) -> DepotResult<StoredFile>;
}

/// Default loader backed by the filesystem
pub struct FsLoader;

#[async_trait]
impl ContentLoader for FsLoader {
    async fn load(&self, path: &Path) -> DepotResult<StoredFile> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| DepotError::storage_read(path, e.to_string()))?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| DepotError::storage_read(path, e.to_string()))?;
        let modified: DateTime<Utc> = metadata
            .modified()
            .map_err(|e| DepotError::storage_read(path, e.to_string()))?
            .into();
        Ok(StoredFile::new(path, content, modified))
    }
}

/// Load failure broadcast to all waiters of a shared load
#[derive(Debug, Clone)]
struct LoadError {
    reason: String,
}

type LoadResult = Result<Arc<StoredFile>, LoadError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

enum Entry {
    /// A load is running; waiters await the shared future. The id ties the
    /// running task to this entry so invalidation wins races with completion.
    InFlight { id: u64, load: SharedLoad },
    Resolved(Arc<StoredFile>),
}

struct CacheInner {
    entries: HashMap<PathBuf, Entry>,
    /// Resolved paths, least recently used first
    lru: Vec<PathBuf>,
    used_bytes: u64,
    next_id: u64,
}

impl CacheInner {
    /// Record a resolved entry and evict least-recently-used resolved
    /// entries until the byte budget holds again
    fn publish(&mut self, path: PathBuf, file: Arc<StoredFile>, capacity_bytes: u64) {
        self.used_bytes += file.len() as u64;
        self.entries.insert(path.clone(), Entry::Resolved(file));
        self.lru.push(path);
        while self.used_bytes > capacity_bytes {
            if self.lru.is_empty() {
                break;
            }
            let oldest = self.lru.remove(0);
            if let Some(Entry::Resolved(evicted)) = self.entries.remove(&oldest) {
                self.used_bytes -= evicted.len() as u64;
                debug!("Evicted {} from content cache", oldest.display());
            }
        }
    }

    fn touch(&mut self, path: &Path) {
        if let Some(pos) = self.lru.iter().position(|p| p == path) {
            let entry = self.lru.remove(pos);
            self.lru.push(entry);
        }
    }

    fn remove(&mut self, path: &Path) {
        if let Some(Entry::Resolved(file)) = self.entries.remove(path) {
            self.used_bytes -= file.len() as u64;
        }
        self.lru.retain(|p| p != path);
    }
}

/// Single-flight, softly evicted cache of file content keyed by path
pub struct ContentCache {
    loader: Arc<dyn ContentLoader>,
    capacity_bytes: u64,
    inner: Arc<Mutex<CacheInner>>,
}

impl ContentCache {
    pub fn new(capacity_bytes: u64) -> Self {
        Self::with_loader(capacity_bytes, Arc::new(FsLoader))
    }

    pub fn with_loader(capacity_bytes: u64, loader: Arc<dyn ContentLoader>) -> Self {
        Self {
            loader,
            capacity_bytes,
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                lru: Vec::new(),
                used_bytes: 0,
                next_id: 0,
            })),
        }
    }

    /// Get the content for a path, loading it at most once concurrently
    pub async fn get(&self, path: &Path) -> DepotResult<Arc<StoredFile>> {
        let load = {
            let mut inner = self.inner.lock();
            match inner.entries.get(path) {
                Some(Entry::Resolved(file)) => {
                    let file = file.clone();
                    inner.touch(path);
                    return Ok(file);
                }
                Some(Entry::InFlight { load, .. }) => load.clone(),
                None => self.start_load(&mut inner, path),
            }
        };

        load.await.map_err(|e| DepotError::StorageRead {
            path: path.to_path_buf(),
            reason: e.reason,
        })
    }

    /// Unconditionally drop any entry for a path.
    ///
    /// Called after every write or fetch; the next `get` is guaranteed to
    /// re-read from disk.
    pub fn invalidate(&self, path: &Path) {
        let mut inner = self.inner.lock();
        inner.remove(path);
    }

    /// Start a detached load task and register it, returning the shared
    /// future waiters should await. The lock is held by the caller.
    fn start_load(&self, inner: &mut CacheInner, path: &Path) -> SharedLoad {
        let id = inner.next_id;
        inner.next_id += 1;

        let loader = self.loader.clone();
        let shared_inner = self.inner.clone();
        let capacity_bytes = self.capacity_bytes;
        let task_path = path.to_path_buf();
        let handle = tokio::spawn(async move {
            let result = loader.load(&task_path).await;
            let mut inner = shared_inner.lock();
            // only the entry registered for this task may be replaced;
            // invalidation in the meantime removed it
            let current = matches!(
                inner.entries.get(&task_path),
                Some(Entry::InFlight { id: entry_id, .. }) if *entry_id == id
            );
            match result {
                Ok(file) => {
                    let file = Arc::new(file);
                    if current {
                        inner.entries.remove(&task_path);
                        inner.publish(task_path, file.clone(), capacity_bytes);
                    }
                    Ok(file)
                }
                Err(e) => {
                    if current {
                        inner.entries.remove(&task_path);
                    }
                    error!("Could not read {}: {}", task_path.display(), e);
                    Err(LoadError {
                        reason: e.to_string(),
                    })
                }
            }
        });

        let load: SharedLoad = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(LoadError {
                    reason: format!("load task failed: {}", e),
                }),
            }
        }
        .boxed()
        .shared();

        inner.entries.insert(
            path.to_path_buf(),
            Entry::InFlight {
                id,
                load: load.clone(),
            },
        );
        load
    }
}
