//! Error types for the media ingest engine.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the media ingest engine.
#[derive(Error, Debug)]
pub enum Error {
    // Pattern errors
    #[error("Missing metadata field: {field}")]
    MissingMetadata { field: String },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Path traversal rejected in resolved path: {0}")]
    PathTraversal(String),

    // Naming errors
    #[error("No free name for {name} after {attempts} attempts")]
    CollisionExhausted { name: String, attempts: usize },

    // Filter errors
    #[error("Filter '{filter}' failed: {message}")]
    FilterInternal { filter: String, message: String },

    // IO errors
    #[error("Transient IO error: {0}")]
    TransientIo(String),

    #[error("IO error: {0}")]
    FatalIo(String),

    #[error("Stale hash cache entry: {0}")]
    CacheInconsistency(String),

    // File system errors
    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    // Preset errors
    #[error("Invalid preset: {0}")]
    InvalidPreset(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    // Lifecycle errors
    #[error("Invalid status transition for {path}: {from} -> {to}")]
    InvalidTransition {
        path: String,
        from: String,
        to: String,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Map a raw IO error into the transient or fatal class.
    pub fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::ResourceBusy => Error::TransientIo(err.to_string()),
            _ => Error::FatalIo(err.to_string()),
        }
    }

    /// Whether the operation that produced this error may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransientIo(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ResourceBusy
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_from_io_classification() {
        let timeout = Error::from_io(io::Error::new(io::ErrorKind::TimedOut, "slow disk"));
        assert!(matches!(timeout, Error::TransientIo(_)));
        assert!(timeout.is_transient());

        let denied = Error::from_io(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(matches!(denied, Error::FatalIo(_)));
        assert!(!denied.is_transient());
    }

    #[test]
    fn test_raw_io_transient() {
        let err: Error = io::Error::new(io::ErrorKind::Interrupted, "signal").into();
        assert!(err.is_transient());
    }
}
