use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Number of hex chars of the path hash kept in identifiers.
const HASH_LEN: usize = 16;

/// Stable identifier for an absolute working directory.
///
/// The same path always produces the same key; distinct paths produce
/// distinct keys via a SHA-256 prefix of the path string. The basename is
/// carried alongside the hash so record files and session names stay
/// recognizable to a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirKey {
    path: PathBuf,
    hash: String,
    basename: String,
}

impl DirKey {
    /// Derive the key for an absolute, normalized directory path.
    pub fn for_path(path: &Path) -> Result<Self> {
        if !path.is_absolute() {
            return Err(Error::InvalidPath {
                path: path.to_path_buf(),
                reason: "path must be absolute".into(),
            });
        }
        if path
            .components()
            .any(|c| matches!(c, Component::CurDir | Component::ParentDir))
        {
            return Err(Error::InvalidPath {
                path: path.to_path_buf(),
                reason: "path must not contain `.` or `..` components".into(),
            });
        }

        let path_str = path.to_string_lossy();
        let mut hasher = Sha256::new();
        hasher.update(path_str.as_bytes());
        let hash = format!("{:x}", hasher.finalize())[..HASH_LEN].to_string();

        let basename = path
            .file_name()
            .map(|n| sanitize(&n.to_string_lossy()))
            .unwrap_or_else(|| "root".to_string());

        Ok(DirKey {
            path: path.to_path_buf(),
            hash,
            basename,
        })
    }

    /// The directory this key was derived from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the persisted record for this directory.
    pub fn record_name(&self) -> String {
        format!("session_{}_{}.json", self.hash, self.basename)
    }

    /// Deterministic tmux session name for this directory.
    ///
    /// Includes a hash prefix so two directories sharing a basename never
    /// collide on session name.
    pub fn session_name(&self) -> String {
        format!("{}-{}", self.basename, &self.hash[..6])
    }
}

/// Replace characters tmux or the filesystem treat specially.
///
/// tmux targets use `:` and `.` as separators, so neither may appear in a
/// session name; path separators may not appear in a record name.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | '.' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}
