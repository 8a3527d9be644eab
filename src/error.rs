//! Error types for bitlsh.

use crate::persistence::PersistenceError;
use thiserror::Error;

/// Errors that can occur while building vectors, hashing, or querying an index.
#[derive(Debug, Error)]
pub enum Error {
    /// Two vectors (or a vector and an index) disagree on type or dimension.
    #[error("incompatible vectors: expected {expected}, found {found}")]
    IncompatibleVectors { expected: String, found: String },

    /// Binary vector dimensions must be a positive multiple of 64.
    #[error("dimension should be a positive multiple of 64, got {0}")]
    InvalidDimension(usize),

    /// A word permutation has the wrong length or is not a bijection.
    #[error("invalid permutation: {0}")]
    InvalidPermutation(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Failure in the on-disk index layer.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// I/O error while talking to the backing vector store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Dimension mismatch between two vectors.
    pub(crate) fn dimension_mismatch(expected: usize, found: usize) -> Self {
        Error::IncompatibleVectors {
            expected: format!("dimension {expected}"),
            found: format!("dimension {found}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_message() {
        let err = Error::dimension_mismatch(128, 64);
        assert_eq!(
            err.to_string(),
            "incompatible vectors: expected dimension 128, found dimension 64"
        );
    }

    #[test]
    fn test_persistence_error_converts() {
        let err: Error = PersistenceError::NotFound("x.lshstore62".to_string()).into();
        assert!(matches!(err, Error::Persistence(PersistenceError::NotFound(_))));
    }
}
