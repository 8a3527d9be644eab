//! Disk persistence for LSH indexes.
//!
//! An index over a vector store is two files in an `lsh/` directory beside
//! the store:
//! - the hash file (`.lsh<K><d>`): the hash parameters and the K projection
//!   vectors, read back bit-identically;
//! - the bucket file (`.lshstore<K><d>`): an immutable, memory-mapped map
//!   from bucket code to vector store offsets.
//!
//! Both are built once, written atomically and never updated in place. A
//! changed vector store means deleting the files
//! ([`remove_index_files`]) and building again.
//!
//! See [`format`] for file naming and primitive encodings and
//! [`bucket_index`] for the bucket file layout.

pub mod bucket_index;
pub mod error;
pub mod format;

pub use bucket_index::{BucketMap, Offsets, PersistentBucketIndex};
pub use error::{PersistenceError, PersistenceResult};

use std::path::Path;
use tracing::debug;

/// Delete every index file built for `store_path`, for any hash parameters.
///
/// Returns the number of files removed.
pub fn remove_index_files(store_path: &Path) -> PersistenceResult<usize> {
    let files = format::index_files_for(store_path)?;
    for file in &files {
        std::fs::remove_file(file)?;
        debug!(path = %file.display(), "removed index file");
    }
    Ok(files.len())
}
