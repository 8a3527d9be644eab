use super::{LshStore, StoreVector};
use crate::config::LshConfig;
use crate::error::{Error, Result};
use crate::hash::LocalitySensitiveHash;
use crate::persistence::BucketMap;
use crate::vector_store::{VectorStore, VectorStoreReader};
use std::time::Instant;
use tracing::info;

/// LSH store whose bucket map lives in memory.
pub struct InMemoryLshStore<S: VectorStore> {
    store: S,
    lsh: LocalitySensitiveHash<S::Vector>,
    buckets: BucketMap,
    len: usize,
}

impl<S: VectorStore> InMemoryLshStore<S> {
    /// Draw fresh projections for `config` and index every vector in `store`.
    pub fn build(store: S, config: LshConfig) -> Result<Self> {
        let lsh = LocalitySensitiveHash::new(config, store.dimension())?;
        Self::build_with(store, lsh)
    }

    /// Index every vector in `store` with existing projections.
    pub fn build_with(store: S, lsh: LocalitySensitiveHash<S::Vector>) -> Result<Self> {
        if lsh.dimension() != store.dimension() {
            return Err(Error::dimension_mismatch(lsh.dimension(), store.dimension()));
        }
        let start = Instant::now();
        let mut buckets = BucketMap::new();
        let mut len = 0;

        let mut reader = store.open_reader()?;
        for entry in reader.entries() {
            let entry = entry?;
            let code = lsh.hash(&entry.vector)?;
            buckets.entry(code).or_default().push(entry.offset);
            len += 1;
        }

        info!(
            store = %store.path().display(),
            vectors = len,
            buckets = buckets.len(),
            num_hashes = lsh.num_hashes(),
            max_bits_diff = lsh.max_bits_diff(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built LSH bucket map"
        );
        Ok(Self {
            store,
            lsh,
            buckets,
            len,
        })
    }

    pub fn buckets(&self) -> &BucketMap {
        &self.buckets
    }

    pub fn into_parts(self) -> (S, LocalitySensitiveHash<S::Vector>, BucketMap) {
        (self.store, self.lsh, self.buckets)
    }
}

impl<S: VectorStore> LshStore for InMemoryLshStore<S> {
    type Store = S;

    fn vector_store(&self) -> &S {
        &self.store
    }

    fn lsh(&self) -> &LocalitySensitiveHash<StoreVector<S>> {
        &self.lsh
    }

    fn bucket(&self, code: u16) -> Box<dyn Iterator<Item = u64> + '_> {
        match self.buckets.get(&code) {
            Some(offsets) => Box::new(offsets.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn keys(&self) -> Vec<u16> {
        self.buckets.keys().copied().collect()
    }

    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn len(&self) -> usize {
        self.len
    }
}
