//! Positional access to the (key, vector) pairs an index is built over.
//!
//! The index never holds vectors itself. It records the byte offset of each
//! entry in the backing store and, at query time, seeks there and reads the
//! key and vector back. Anything that can do that implements
//! [`VectorStore`]; [`FileVectorStore`] is the file-backed implementation.

mod file;

pub use file::{FileVectorStore, FileVectorStoreReader, FileVectorStoreWriter};

use crate::error::Result;
use crate::vectors::Vector;
use std::path::Path;

/// One entry of a store: its offset (position of the key field), key and vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry<V> {
    pub offset: u64,
    pub key: String,
    pub vector: V,
}

/// Sequential and seek-based reads over a vector store.
pub trait VectorStoreReader {
    type Vector: Vector;

    fn dimension(&self) -> usize;

    /// Position the reader at an entry offset.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Read the key at the current position.
    fn read_key(&mut self) -> Result<String>;

    /// Read the vector at the current position (directly after its key).
    fn read_vector(&mut self) -> Result<Self::Vector>;

    /// Position the reader before the first entry.
    fn rewind(&mut self) -> Result<()>;

    /// Read the entry at the current position, or `None` past the last one.
    fn next_entry(&mut self) -> Result<Option<StoreEntry<Self::Vector>>>;

    /// Read the entry at `offset`.
    fn read_at(&mut self, offset: u64) -> Result<(String, Self::Vector)> {
        self.seek(offset)?;
        let key = self.read_key()?;
        let vector = self.read_vector()?;
        Ok((key, vector))
    }

    /// Scan every entry from the start of the store.
    fn entries(&mut self) -> Entries<'_, Self>
    where
        Self: Sized,
    {
        Entries {
            reader: self,
            started: false,
            done: false,
        }
    }
}

/// A vector store that can hand out independent readers.
pub trait VectorStore: Send + Sync {
    type Vector: Vector;
    type Reader: VectorStoreReader<Vector = Self::Vector>;

    /// File the store lives in; index files are named after it.
    fn path(&self) -> &Path;

    fn dimension(&self) -> usize;

    fn open_reader(&self) -> Result<Self::Reader>;
}

/// Full scan over a reader. Stops after the first error.
pub struct Entries<'a, R: VectorStoreReader> {
    reader: &'a mut R,
    started: bool,
    done: bool,
}

impl<R: VectorStoreReader> Iterator for Entries<'_, R> {
    type Item = Result<StoreEntry<R::Vector>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            if let Err(e) = self.reader.rewind() {
                self.done = true;
                return Some(Err(e));
            }
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
