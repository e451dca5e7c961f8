//! Path containment and artifact-path facts
//!
//! Artifact paths arrive as POSIX-style relative strings
//! (`<group>/<artifact>/<version>/<filename>`). Everything here is pure;
//! the containment check in particular must run before any filesystem
//! access so a traversal attempt never touches the disk.

use std::path::{Component, Path, PathBuf};

use tracing::error;

use crate::error::{DepotError, DepotResult};

/// Suffixes accepted on upload, release or snapshot
pub const ACCEPTED_SUFFIXES: [&str; 6] = [
    ".jar",
    ".jar.md5",
    ".jar.sha1",
    ".pom",
    ".pom.md5",
    ".pom.sha1",
];

/// Maps repository-relative artifact paths to absolute storage locations
#[derive(Debug, Clone)]
pub struct PathResolver {
    storage_root: PathBuf,
}

impl PathResolver {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }

    /// Resolve `storage_root/<repository>/<relative>`.
    ///
    /// The relative path is normalized lexically (the target may not exist
    /// yet, so the filesystem cannot be consulted). Absolute components and
    /// `..` hops that would climb out of the repository directory fail with
    /// [`DepotError::PathSecurity`].
    pub fn resolve(&self, repository: &str, relative: &str) -> DepotResult<PathBuf> {
        let mut depth: u32 = 0;
        let mut resolved = self.storage_root.join(repository);
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(self.violation(repository, relative));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(self.violation(repository, relative));
                }
            }
        }
        Ok(resolved)
    }

    fn violation(&self, repository: &str, relative: &str) -> DepotError {
        error!(
            "Path {} did not resolve inside of {}",
            relative,
            self.storage_root.join(repository).display()
        );
        DepotError::PathSecurity {
            repository: repository.to_string(),
            path: relative.to_string(),
        }
    }
}

/// Whether the version directory of the path is a mutable snapshot version
pub fn is_snapshot(relative: &str) -> bool {
    Path::new(relative)
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .is_some_and(|version| version.ends_with("-SNAPSHOT"))
}

/// Whether the path names a repository metadata document or one of its
/// hash sidecars; those are deliberately unsupported
pub fn is_metadata(relative: &str) -> bool {
    relative.ends_with("maven-metadata.xml")
        || relative.ends_with("maven-metadata.xml.sha1")
        || relative.ends_with("maven-metadata.xml.md5")
}

/// The accepted upload suffix of a filename, if any
pub fn accepted_suffix(file_name: &str) -> Option<&'static str> {
    ACCEPTED_SUFFIXES
        .iter()
        .find(|suffix| file_name.ends_with(**suffix))
        .copied()
}
