//! Shared cache of persisted LSH stores.
//!
//! One registry value is created by the application and handed to whoever
//! needs an index. For each (absolute store path, K, maxBitsDiff) it holds at
//! most one [`PersistedLshStore`]. Concurrent first requests for the same key
//! are single-flighted: one caller builds, the others block on that key's
//! slot and receive the same `Arc`. Requests for different keys never wait
//! on each other's builds. Separate registries share index files safely,
//! since [`PersistedLshStore::build`] itself serializes builds per index.

use super::PersistedLshStore;
use crate::config::LshConfig;
use crate::error::Result;
use crate::vector_store::VectorStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Cache key: the store file and the parameters baked into the index files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub path: PathBuf,
    pub num_hashes: usize,
    pub max_bits_diff: usize,
}

impl RegistryKey {
    pub fn new(store_path: &Path, config: &LshConfig) -> Result<Self> {
        Ok(Self {
            path: std::path::absolute(store_path)?,
            num_hashes: config.num_hashes,
            max_bits_diff: config.max_bits_diff,
        })
    }
}

type Slot<S> = Arc<Mutex<Option<Arc<PersistedLshStore<S>>>>>;

/// Per-key cache of persisted stores.
pub struct LshStoreRegistry<S: VectorStore> {
    slots: Mutex<HashMap<RegistryKey, Slot<S>>>,
}

impl<S: VectorStore> Default for LshStoreRegistry<S> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<S: VectorStore + Clone> LshStoreRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached store for `store` and `config`, opening or building it on a miss.
    pub fn get_or_build(
        &self,
        store: &S,
        config: &LshConfig,
    ) -> Result<Arc<PersistedLshStore<S>>> {
        config.validate()?;
        let key = RegistryKey::new(store.path(), config)?;
        let slot = Arc::clone(self.slots.lock().entry(key.clone()).or_default());

        let mut cached = slot.lock();
        if let Some(existing) = cached.as_ref() {
            debug!(store = %key.path.display(), suffix = %config.file_suffix(), "LSH store cache hit");
            return Ok(Arc::clone(existing));
        }
        debug!(store = %key.path.display(), suffix = %config.file_suffix(), "LSH store cache miss");
        let built = Arc::new(PersistedLshStore::build(store.clone(), *config)?);
        *cached = Some(Arc::clone(&built));
        Ok(built)
    }

    /// Cached store, if one has been built; never builds.
    pub fn get(&self, store_path: &Path, config: &LshConfig) -> Result<Option<Arc<PersistedLshStore<S>>>> {
        let key = RegistryKey::new(store_path, config)?;
        let slot = match self.slots.lock().get(&key) {
            Some(slot) => Arc::clone(slot),
            None => return Ok(None),
        };
        let cached = slot.lock();
        Ok(cached.as_ref().map(Arc::clone))
    }

    /// Evict every entry whose store lives under `dir` (or is `dir`).
    ///
    /// Evicted stores are released once their last outside handle is
    /// dropped. Returns the number of evicted entries.
    pub fn invalidate(&self, dir: &Path) -> Result<usize> {
        let dir = std::path::absolute(dir)?;
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, _| !key.path.starts_with(&dir));
        let evicted = before - slots.len();
        debug!(dir = %dir.display(), evicted, "invalidated LSH stores");
        Ok(evicted)
    }

    /// Evict everything.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
