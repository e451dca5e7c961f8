//! Sequential mirror fallback fetch
//!
//! Tries each configured remote in order and persists the first 2xx body
//! into that mirror's local slot directory. Fallback is deliberately
//! sequential so a release read produces at most one outbound request at a
//! time and never mixes partial results from two mirrors. The agent carries
//! a global per-request timeout so a hung mirror cannot stall fallback.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::auth::basic_header;
use crate::error::{DepotError, DepotResult};
use crate::repo::cache::ContentCache;
use crate::repo::paths::PathResolver;
use crate::repo::RemoteRepository;

/// Outcome of one mirror attempt, produced on the blocking pool
enum Attempt {
    /// Non-2xx or transport error; try the next mirror
    Miss(String),
    /// 2xx with a fully read body
    Hit {
        last_modified: Option<String>,
        body: Vec<u8>,
    },
    /// 2xx but the body could not be read to the end
    Broken(String),
}

/// Fetches release artifacts from remote mirrors and persists them locally
pub struct MirrorFetcher {
    agent: ureq::Agent,
    resolver: PathResolver,
    cache: Arc<ContentCache>,
}

impl MirrorFetcher {
    pub fn new(resolver: PathResolver, cache: Arc<ContentCache>, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            agent,
            resolver,
            cache,
        }
    }

    /// Try each remote in order; the first 2xx response wins.
    ///
    /// On success returns the local slot path the body was persisted to.
    /// `Ok(None)` means every mirror missed.
    pub async fn fetch(
        &self,
        relative: &str,
        remotes: &[RemoteRepository],
    ) -> DepotResult<Option<PathBuf>> {
        for remote in remotes {
            // containment check before any network or disk work
            let target = self.resolver.resolve(&remote.name, relative)?;
            let url = join_url(&remote.url, relative);
            info!("Downloading {} from remote {}", relative, url);

            match self.attempt(remote, &url).await? {
                Attempt::Miss(reason) => {
                    warn!("Remote {} missed for {}: {}", remote.name, relative, reason);
                }
                Attempt::Broken(reason) => {
                    return Err(DepotError::Upstream { url, reason });
                }
                Attempt::Hit {
                    last_modified,
                    body,
                } => {
                    let saved = self.persist(&target, body, last_modified).await;
                    // the slot may hold leftovers from a failed attempt,
                    // so the cache entry goes regardless of the outcome
                    self.cache.invalidate(&target);
                    saved?;
                    return Ok(Some(target));
                }
            }
        }
        Ok(None)
    }

    /// One blocking HTTP GET, run on the blocking pool
    async fn attempt(&self, remote: &RemoteRepository, url: &str) -> DepotResult<Attempt> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let authorization = match (&remote.username, &remote.password) {
            (Some(username), Some(password)) => Some(basic_header(username, password)),
            _ => None,
        };

        tokio::task::spawn_blocking(move || {
            let mut request = agent.get(&url);
            if let Some(header) = &authorization {
                request = request.header("Authorization", header);
            }
            let mut response = match request.call() {
                Ok(response) => response,
                Err(e) => return Attempt::Miss(e.to_string()),
            };
            let status = response.status();
            if !status.is_success() {
                return Attempt::Miss(format!("status code {}", status));
            }
            let last_modified = response
                .headers()
                .get("Last-Modified")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            match response.body_mut().read_to_vec() {
                Ok(body) => Attempt::Hit {
                    last_modified,
                    body,
                },
                Err(e) => Attempt::Broken(e.to_string()),
            }
        })
        .await
        .map_err(|e| DepotError::Internal(format!("fetch task failed: {}", e)))
    }

    /// Write the fetched body into the mirror's slot and stamp its mtime
    /// from the Last-Modified header when one was sent
    async fn persist(
        &self,
        target: &PathBuf,
        body: Vec<u8>,
        last_modified: Option<String>,
    ) -> DepotResult<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DepotError::StorageWrite {
                    path: target.clone(),
                    source: e,
                })?;
        }
        tokio::fs::write(target, body)
            .await
            .map_err(|e| DepotError::StorageWrite {
                path: target.clone(),
                source: e,
            })?;

        let modified = last_modified
            .as_deref()
            .and_then(parse_http_date)
            .unwrap_or_else(Utc::now);
        if let Err(e) = set_modified(target, modified) {
            error!("Failed to set modified time on {}: {}", target.display(), e);
        }
        Ok(())
    }
}

/// Join a mirror base URL with a repository-relative path
fn join_url(base: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Parse an RFC 1123 HTTP date such as `Thu, 15 Jun 2023 12:00:00 GMT`
pub fn parse_http_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Stamp a file's modification time
pub fn set_modified(path: &std::path::Path, modified: DateTime<Utc>) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.set_modified(modified.into())
}
