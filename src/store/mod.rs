//! LSH stores: a hash, a bucket map and the vector store it points into.
//!
//! Building scans the vector store once, hashes every vector and records its
//! offset under its bucket code. A query hashes the query vector, expands the
//! code to every code within `max_bits_diff` flips, collects the offsets of
//! those buckets and reads the candidates back from the vector store.
//!
//! Two variants share the query path through [`LshStore`]:
//! - [`InMemoryLshStore`]: bucket map in a `BTreeMap`, rebuilt every time;
//! - [`PersistedLshStore`]: bucket map memory-mapped from disk and reused
//!   across processes.
//!
//! [`LshStoreRegistry`] caches persisted stores per (store file, K, d).

mod in_memory;
mod persisted;
mod registry;

pub use in_memory::InMemoryLshStore;
pub use persisted::PersistedLshStore;
pub use registry::{LshStoreRegistry, RegistryKey};

use crate::error::Result;
use crate::hash::LocalitySensitiveHash;
use crate::vector_store::{VectorStore, VectorStoreReader};
use crate::vectors::Vector;
use tracing::debug;

type StoreVector<S> = <S as VectorStore>::Vector;
type StoreReader<S> = <S as VectorStore>::Reader;

/// A scored candidate returned by [`LshStore::search`].
#[derive(Debug, Clone)]
pub struct SearchHit<V> {
    pub key: String,
    pub vector: V,
    /// Overlap with the query, in `[-1, 1]`.
    pub score: f64,
}

/// Query interface shared by in-memory and persisted stores.
pub trait LshStore {
    type Store: VectorStore;

    fn vector_store(&self) -> &Self::Store;

    fn lsh(&self) -> &LocalitySensitiveHash<StoreVector<Self::Store>>;

    /// Offsets stored under `code`, in build order.
    fn bucket(&self, code: u16) -> Box<dyn Iterator<Item = u64> + '_>;

    /// Bucket codes present, ascending.
    fn keys(&self) -> Vec<u16>;

    /// Number of non-empty buckets.
    fn bucket_count(&self) -> usize;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offsets of every candidate for `query`, bucket by bucket.
    fn candidate_offsets(&self, query: &StoreVector<Self::Store>) -> Result<Vec<u64>> {
        let codes = self.lsh().similar_hashes(query)?;
        Ok(codes.into_iter().flat_map(|c| self.bucket(c)).collect())
    }

    /// Lazily read every candidate for `query` from the vector store.
    ///
    /// Fails with [`Error::IncompatibleVectors`](crate::Error::IncompatibleVectors)
    /// before touching the vector store if `query` has the wrong dimension.
    /// The backing reader is dropped as soon as the iterator is exhausted or
    /// hits an error.
    fn similar(
        &self,
        query: &StoreVector<Self::Store>,
    ) -> Result<SimilarVectors<'_, StoreReader<Self::Store>>> {
        let codes = self.lsh().similar_hashes(query)?;
        debug!(
            base = codes.first().copied().unwrap_or_default(),
            probes = codes.len(),
            "expanded query bucket"
        );
        let reader = self.vector_store().open_reader()?;
        let offsets = codes.into_iter().flat_map(move |c| self.bucket(c));
        Ok(SimilarVectors {
            offsets: Box::new(offsets),
            reader: Some(reader),
        })
    }

    /// The `k` candidates with the highest overlap with `query`, best first.
    fn search(
        &self,
        query: &StoreVector<Self::Store>,
        k: usize,
    ) -> Result<Vec<SearchHit<StoreVector<Self::Store>>>> {
        let mut hits = Vec::new();
        for candidate in self.similar(query)? {
            let (key, vector) = candidate?;
            let score = query.overlap(&vector)?;
            hits.push(SearchHit { key, vector, score });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Lazy iterator over the candidates of one query.
pub struct SimilarVectors<'a, R: VectorStoreReader> {
    offsets: Box<dyn Iterator<Item = u64> + 'a>,
    reader: Option<R>,
}

impl<R: VectorStoreReader> SimilarVectors<'_, R> {
    /// True once the backing reader has been released.
    pub fn is_finished(&self) -> bool {
        self.reader.is_none()
    }
}

impl<R: VectorStoreReader> Iterator for SimilarVectors<'_, R> {
    type Item = Result<(String, R::Vector)>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let Some(offset) = self.offsets.next() else {
            self.reader = None;
            return None;
        };
        match reader.read_at(offset) {
            Ok(entry) => Some(Ok(entry)),
            Err(e) => {
                self.reader = None;
                Some(Err(e))
            }
        }
    }
}
