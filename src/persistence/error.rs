//! Error types for persistence operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing or reading index files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error (file operations, mapping)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format error (truncated header, bad field values)
    #[error("format error: {0}")]
    Format(String),

    /// The file on disk does not match the size or layout recomputed from its contents.
    #[error("index corruption in {}: expected {expected} bytes, found {actual}", path.display())]
    Corruption {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Resource not found (index file, store file)
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Invalid configuration stored alongside an index
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidConfig(format!("json error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_message_names_file() {
        let err = PersistenceError::Corruption {
            path: PathBuf::from("/tmp/lsh/store.bin.lshstore62"),
            expected: 48,
            actual: 40,
        };
        let msg = err.to_string();
        assert!(msg.contains("store.bin.lshstore62"));
        assert!(msg.contains("expected 48 bytes, found 40"));
    }
}
