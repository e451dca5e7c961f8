//! Stored file content with digests
//!
//! A [`StoredFile`] is an immutable snapshot of an artifact's bytes plus
//! the metadata served alongside them. Writes stage the full content in
//! memory first; nothing here performs partial writes.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// File bytes plus the metadata served with them.
///
/// `sha256` is the identity digest served as the HTTP `ETag`; `sha1` is the
/// digest Maven clients exchange in integrity sidecars.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub modified: DateTime<Utc>,
    pub sha256: String,
    pub sha1: String,
}

impl StoredFile {
    pub fn new(path: impl Into<PathBuf>, content: Vec<u8>, modified: DateTime<Utc>) -> Self {
        let sha256 = hex::encode(Sha256::digest(&content));
        let sha1 = hex::encode(Sha1::digest(&content));
        Self {
            path: path.into(),
            content,
            modified,
            sha256,
            sha1,
        }
    }

    /// The quoted ETag value for HTTP responses
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.sha256)
    }

    /// `Last-Modified` in RFC 1123 format, always UTC
    pub fn http_last_modified(&self) -> String {
        http_date(self.modified)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Format a timestamp as an RFC 1123 HTTP date in UTC
pub fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
