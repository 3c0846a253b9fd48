use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};
use crate::key::DirKey;
use crate::snapshot::TopologySnapshot;

/// One JSON record per directory key, replaced atomically on save.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default record directory, `~/.tmux-here`.
    pub fn default_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".tmux-here"))
            .ok_or_else(|| Error::Persistence {
                reason: "could not determine home directory".into(),
                source: None,
            })
    }

    pub fn record_path(&self, key: &DirKey) -> PathBuf {
        self.dir.join(key.record_name())
    }

    /// Persist a snapshot, replacing any prior record for this key.
    ///
    /// The record is written to a temp file in the same directory and
    /// renamed into place, so a failed write never leaves a partial record
    /// behind for a later read.
    pub fn write(&self, key: &DirKey, snapshot: &TopologySnapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::persistence(format!("failed to create {}", self.dir.display()), e))?;

        let json = serde_json::to_vec_pretty(snapshot).map_err(|e| Error::Persistence {
            reason: format!("failed to serialize snapshot: {e}"),
            source: None,
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::persistence("failed to create temp record", e))?;
        tmp.write_all(&json)
            .map_err(|e| Error::persistence("failed to write record", e))?;

        let path = self.record_path(key);
        tmp.persist(&path)
            .map_err(|e| Error::persistence(format!("failed to replace {}", path.display()), e.error))?;
        debug!(record = %path.display(), "snapshot written");
        Ok(path)
    }

    /// Load the snapshot for a key, or `NotFound` when none was saved.
    pub fn read(&self, key: &DirKey) -> Result<TopologySnapshot> {
        let path = self.record_path(key);
        if !path.exists() {
            return Err(Error::NotFound {
                dir: key.path().to_path_buf(),
            });
        }
        let json = fs::read_to_string(&path)
            .map_err(|e| Error::persistence(format!("failed to read {}", path.display()), e))?;
        let snapshot: TopologySnapshot =
            serde_json::from_str(&json).map_err(|e| Error::Persistence {
                reason: format!("corrupt record {}: {e}", path.display()),
                source: None,
            })?;
        // Well-formed JSON can still violate the topology invariants;
        // replaying such a record is never safe.
        snapshot.validate().map_err(|reason| Error::Persistence {
            reason: format!("corrupt record {}: {reason}", path.display()),
            source: None,
        })?;
        Ok(snapshot)
    }
}
