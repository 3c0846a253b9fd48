use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the capture/restore engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The directory used to derive a key was not absolute/normalized.
    #[error("invalid directory path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// Save was requested but no tmux session is bound to this terminal.
    #[error("no active tmux session to capture")]
    NoActiveSession,

    /// Restore was requested but no record exists for the directory.
    #[error("no saved session for {dir}")]
    NotFound { dir: PathBuf },

    /// The tmux server is unreachable or rejected an operation.
    #[error("tmux: {reason}")]
    Gateway { reason: String },

    /// A tmux invocation did not complete within the per-call timeout.
    #[error("tmux did not respond within {timeout_ms}ms: {command}")]
    GatewayTimeout { command: String, timeout_ms: u64 },

    /// Reading or writing the persisted record failed.
    #[error("persistence: {reason}")]
    Persistence {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl Error {
    pub fn gateway(reason: impl Into<String>) -> Self {
        Error::Gateway {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>, source: std::io::Error) -> Self {
        Error::Persistence {
            reason: reason.into(),
            source: Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
