//! bitlsh: approximate nearest neighbour search over binary vectors.
//!
//! Retrieves semantically similar items from a large vector collection
//! without scanning it linearly:
//!
//! - `vectors/`: binary spatter codes with weighted superposition
//! - `hash/`: random-hyperplane LSH with multi-probe candidate codes
//! - `persistence/`: memory-mapped bucket index and file naming
//! - `vector_store/`: positional access to the (key, vector) collection
//! - `store/`: build, persist, reload and query; per-store cache
//!
//! ```rust,no_run
//! use bitlsh::{BinaryVector, FileVectorStore, LshConfig, LshStore, LshStoreRegistry, VectorStore};
//!
//! # fn main() -> bitlsh::Result<()> {
//! let store = FileVectorStore::<BinaryVector>::open("index/termvectors.bin")?;
//! let registry = LshStoreRegistry::new();
//! let index = registry.get_or_build(&store, &LshConfig::new(8, 2)?)?;
//!
//! let query = BinaryVector::zero(store.dimension())?;
//! for hit in index.search(&query, 10)? {
//!     println!("{} {:.3}", hit.key, hit.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Critical Nuances
//!
//! ## Superposition Precision
//!
//! Weights are rounded to whole votes when the first superposed weight is
//! integral, and to hundredths otherwise. Mixing `1.0` first and `0.5` later
//! rounds the `0.5` up to a full vote.
//!
//! ## Overlap Reads Bits, Not Votes
//!
//! Similarity and hashing look only at the elemental bits. A semantic
//! vector that has not been normalized still carries the bits it had before
//! its first superposition.
//!
//! ## Rebuilding Is the Only Update
//!
//! Index files are immutable. When the vector store changes, delete the
//! index files ([`persistence::remove_index_files`]), evict the registry
//! entries ([`LshStoreRegistry::invalidate`]) and build again.

pub mod config;
pub mod error;
pub mod hash;
pub mod persistence;
pub mod store;
pub mod vector_store;
pub mod vectors;

pub use config::{LshConfig, MAX_NUM_HASHES};
pub use error::{Error, Result};
pub use hash::LocalitySensitiveHash;
pub use persistence::{PersistenceError, PersistentBucketIndex};
pub use store::{
    InMemoryLshStore, LshStore, LshStoreRegistry, PersistedLshStore, SearchHit, SimilarVectors,
};
pub use vector_store::{FileVectorStore, VectorStore, VectorStoreReader};
pub use vectors::{BinaryVector, Vector, VectorType};
