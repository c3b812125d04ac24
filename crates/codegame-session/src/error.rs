//! Error types for the session layer.

use std::path::PathBuf;

/// Errors that can occur while loading or saving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session file exists for the requested server and username.
    #[error("no session file at {}", .0.display())]
    NotFound(PathBuf),

    /// The session is missing required fields, or the file on disk is
    /// not a valid session record.
    #[error("invalid session: {0}")]
    Invalid(String),

    /// The platform has no per-user data directory (no home directory).
    #[error("could not determine the local data directory")]
    NoDataDir,

    /// Reading or writing the session file failed.
    #[error("session file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
