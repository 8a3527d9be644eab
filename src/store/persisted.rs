use super::{InMemoryLshStore, LshStore, StoreVector};
use crate::config::LshConfig;
use crate::error::Result;
use crate::hash::LocalitySensitiveHash;
use crate::persistence::format::{bucket_file_path, hash_file_path};
use crate::persistence::PersistentBucketIndex;
use crate::vector_store::VectorStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// LSH store whose bucket map is memory-mapped from the `lsh/` directory
/// next to the vector store.
pub struct PersistedLshStore<S: VectorStore> {
    store: S,
    lsh: LocalitySensitiveHash<S::Vector>,
    index: PersistentBucketIndex,
}

impl<S: VectorStore> std::fmt::Debug for PersistedLshStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedLshStore")
            .field("store", &self.store.path())
            .field("config", self.lsh.config())
            .field("index", &self.index)
            .finish()
    }
}

struct IndexPaths {
    hash: PathBuf,
    buckets: PathBuf,
}

impl IndexPaths {
    fn new(store_path: &Path, config: &LshConfig) -> Result<Self> {
        Ok(Self {
            hash: hash_file_path(store_path, config)?,
            buckets: bucket_file_path(store_path, config)?,
        })
    }
}

/// One lock per index file pair, shared by every builder and opener in the
/// process whatever registry (if any) they came through.
static INDEX_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

fn index_lock(paths: &IndexPaths) -> Result<Arc<Mutex<()>>> {
    let key = std::path::absolute(&paths.buckets)?;
    let locks = INDEX_LOCKS.get_or_init(Default::default);
    Ok(Arc::clone(locks.lock().entry(key).or_default()))
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl<S: VectorStore> PersistedLshStore<S> {
    /// Open the index files for `config` if both exist.
    ///
    /// Returns `Ok(None)` when there is nothing to open. If only one of the
    /// two files is present it is deleted, since it cannot be used without
    /// the other. Waits while another thread of this process is building
    /// the same index.
    pub fn open(store: S, config: LshConfig) -> Result<Option<Self>> {
        config.validate()?;
        let lock = index_lock(&IndexPaths::new(store.path(), &config)?)?;
        let _guard = lock.lock();
        Ok(Self::open_parts(&store, &config)?.map(|(lsh, index)| Self { store, lsh, index }))
    }

    /// Open the index for `config`, building and persisting it first if
    /// needed.
    ///
    /// Builds of the same index within one process are serialized: the
    /// first caller builds, later callers wait and open its files. Separate
    /// processes are not coordinated.
    pub fn build(store: S, config: LshConfig) -> Result<Self> {
        config.validate()?;
        let lock = index_lock(&IndexPaths::new(store.path(), &config)?)?;
        let _guard = lock.lock();
        match Self::open_parts(&store, &config)? {
            Some((lsh, index)) => Ok(Self { store, lsh, index }),
            None => Self::write_files(InMemoryLshStore::build(store, config)?),
        }
    }

    fn open_parts(
        store: &S,
        config: &LshConfig,
    ) -> Result<Option<(LocalitySensitiveHash<S::Vector>, PersistentBucketIndex)>> {
        let paths = IndexPaths::new(store.path(), config)?;
        match (has_content(&paths.hash), has_content(&paths.buckets)) {
            (true, true) => {
                let lsh = LocalitySensitiveHash::load(&paths.hash, config, store.dimension())?;
                let index = PersistentBucketIndex::open(&paths.buckets)?;
                debug!(
                    store = %store.path().display(),
                    buckets = index.len(),
                    "opened persisted LSH index"
                );
                Ok(Some((lsh, index)))
            }
            (false, false) => Ok(None),
            _ => {
                warn!(
                    store = %store.path().display(),
                    suffix = %config.file_suffix(),
                    "found an incomplete LSH index, discarding it"
                );
                remove_if_present(&paths.hash)?;
                remove_if_present(&paths.buckets)?;
                Ok(None)
            }
        }
    }

    /// Write an in-memory store's projections and buckets to disk and reopen
    /// them read-only, replacing any index already there.
    pub fn persist(memory: InMemoryLshStore<S>) -> Result<Self> {
        let paths = IndexPaths::new(memory.vector_store().path(), memory.lsh().config())?;
        let lock = index_lock(&paths)?;
        let _guard = lock.lock();
        Self::write_files(memory)
    }

    /// Caller holds the index lock.
    fn write_files(memory: InMemoryLshStore<S>) -> Result<Self> {
        let start = Instant::now();
        let (store, lsh, buckets) = memory.into_parts();
        let paths = IndexPaths::new(store.path(), lsh.config())?;

        lsh.save(&paths.hash)?;
        let index = match PersistentBucketIndex::persist(&paths.buckets, &buckets) {
            Ok(index) => index,
            Err(e) => {
                if let Err(cleanup) = remove_if_present(&paths.hash) {
                    warn!(
                        path = %paths.hash.display(),
                        error = %cleanup,
                        "failed to remove hash file after a failed build"
                    );
                }
                return Err(e.into());
            }
        };

        info!(
            store = %store.path().display(),
            buckets = index.len(),
            bytes = index.size_bytes(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "persisted LSH index"
        );
        Ok(Self { store, lsh, index })
    }

    pub fn index(&self) -> &PersistentBucketIndex {
        &self.index
    }

    pub fn config(&self) -> &LshConfig {
        self.lsh.config()
    }
}

impl<S: VectorStore> LshStore for PersistedLshStore<S> {
    type Store = S;

    fn vector_store(&self) -> &S {
        &self.store
    }

    fn lsh(&self) -> &LocalitySensitiveHash<StoreVector<S>> {
        &self.lsh
    }

    fn bucket(&self, code: u16) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.index.get(code))
    }

    fn keys(&self) -> Vec<u16> {
        self.index.keys().collect()
    }

    fn bucket_count(&self) -> usize {
        self.index.len()
    }

    fn len(&self) -> usize {
        self.index.num_offsets()
    }
}
