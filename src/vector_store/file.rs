//! File-backed vector store.
//!
//! ```text
//! header:  VInt len + UTF-8  "-vectortype BINARY -dimension 512"
//! entry:   VInt len + UTF-8 key | encoded vector (dimension / 8 bytes)
//! ```
//!
//! Entries follow each other with no padding or index; an entry's offset is
//! the position of its key's length prefix.

use super::{StoreEntry, VectorStore, VectorStoreReader};
use crate::error::{Error, Result};
use crate::persistence::format::{read_vint_str, write_vint_str, TempFileGuard};
use crate::persistence::PersistenceError;
use crate::vectors::{Vector, VectorType};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

fn header_string(vector_type: VectorType, dimension: usize) -> String {
    format!("-vectortype {vector_type} -dimension {dimension}")
}

fn parse_header(header: &str) -> Result<(VectorType, usize)> {
    let mut vector_type = None;
    let mut dimension = None;
    let mut tokens = header.split_whitespace();
    while let Some(flag) = tokens.next() {
        let value = tokens.next();
        match (flag, value) {
            ("-vectortype", Some(v)) => vector_type = Some(v.parse::<VectorType>()?),
            ("-dimension", Some(v)) => {
                dimension = Some(v.parse::<usize>().map_err(|_| {
                    PersistenceError::Format(format!("bad dimension {v:?} in store header"))
                })?)
            }
            _ => {}
        }
    }
    match (vector_type, dimension) {
        (Some(t), Some(d)) => Ok((t, d)),
        _ => Err(PersistenceError::Format(format!("incomplete store header {header:?}")).into()),
    }
}

/// Handle to a vector store file; cheap to clone, opens a reader per scan.
#[derive(Debug)]
pub struct FileVectorStore<V> {
    path: PathBuf,
    dimension: usize,
    data_start: u64,
    _vector: PhantomData<fn() -> V>,
}

impl<V> Clone for FileVectorStore<V> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            dimension: self.dimension,
            data_start: self.data_start,
            _vector: PhantomData,
        }
    }
}

impl<V: Vector> FileVectorStore<V> {
    /// Open an existing store and check its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::from(PersistenceError::NotFound(path.display().to_string()))
            }
            _ => Error::from(e),
        })?;
        let mut reader = BufReader::new(file);
        let header = read_vint_str(&mut reader)?;
        let (vector_type, dimension) = parse_header(&header)?;
        if vector_type != V::VECTOR_TYPE {
            return Err(Error::IncompatibleVectors {
                expected: V::VECTOR_TYPE.to_string(),
                found: vector_type.to_string(),
            });
        }
        V::zero_vector(dimension)?;
        let data_start = reader.stream_position()?;
        Ok(Self {
            path: path.to_path_buf(),
            dimension,
            data_start,
            _vector: PhantomData,
        })
    }

    /// Write `entries` to a new store at `path` and open it.
    pub fn create<'a, I, K>(path: impl AsRef<Path>, dimension: usize, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, &'a V)>,
        K: AsRef<str>,
    {
        let mut writer = FileVectorStoreWriter::create(path, dimension)?;
        for (key, vector) in entries {
            writer.write(key.as_ref(), vector)?;
        }
        writer.finish()
    }
}

impl<V: Vector> VectorStore for FileVectorStore<V> {
    type Vector = V;
    type Reader = FileVectorStoreReader<V>;

    fn path(&self) -> &Path {
        &self.path
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn open_reader(&self) -> Result<FileVectorStoreReader<V>> {
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        let mut reader = FileVectorStoreReader {
            reader: BufReader::new(file),
            dimension: self.dimension,
            data_start: self.data_start,
            len,
            _vector: PhantomData,
        };
        reader.rewind()?;
        Ok(reader)
    }
}

/// Buffered reader over one store file.
#[derive(Debug)]
pub struct FileVectorStoreReader<V> {
    reader: BufReader<File>,
    dimension: usize,
    data_start: u64,
    len: u64,
    _vector: PhantomData<fn() -> V>,
}

impl<V: Vector> VectorStoreReader for FileVectorStoreReader<V> {
    type Vector = V;

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset < self.data_start || offset >= self.len {
            return Err(PersistenceError::Format(format!(
                "offset {offset} is outside the entry region {}..{}",
                self.data_start, self.len
            ))
            .into());
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read_key(&mut self) -> Result<String> {
        Ok(read_vint_str(&mut self.reader)?)
    }

    fn read_vector(&mut self) -> Result<V> {
        V::read_from(self.dimension, &mut self.reader)
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(self.data_start))?;
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<StoreEntry<V>>> {
        let offset = self.reader.stream_position()?;
        if offset >= self.len {
            return Ok(None);
        }
        let key = self.read_key()?;
        let vector = self.read_vector()?;
        Ok(Some(StoreEntry {
            offset,
            key,
            vector,
        }))
    }
}

/// Appends entries to a new store file; the file appears under its final
/// name only once [`finish`](Self::finish) succeeds.
pub struct FileVectorStoreWriter<V> {
    path: PathBuf,
    writer: BufWriter<File>,
    guard: TempFileGuard,
    dimension: usize,
    position: u64,
    count: usize,
    _vector: PhantomData<fn() -> V>,
}

impl<V: Vector> FileVectorStoreWriter<V> {
    pub fn create(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        V::zero_vector(dimension)?;
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let (guard, file) = TempFileGuard::create(&path)?;
        let mut writer = BufWriter::new(file);
        let position = write_vint_str(&mut writer, &header_string(V::VECTOR_TYPE, dimension))?;
        Ok(Self {
            path,
            writer,
            guard,
            dimension,
            position: position as u64,
            count: 0,
            _vector: PhantomData,
        })
    }

    /// Append an entry and return its offset.
    pub fn write(&mut self, key: &str, vector: &V) -> Result<u64> {
        if vector.dimension() != self.dimension {
            return Err(Error::dimension_mismatch(self.dimension, vector.dimension()));
        }
        let offset = self.position;
        let key_bytes = write_vint_str(&mut self.writer, key)?;
        vector.write_to(&mut self.writer)?;
        self.position += (key_bytes + V::encoded_len(self.dimension)) as u64;
        self.count += 1;
        Ok(offset)
    }

    /// Flush, move the file into place and open it.
    pub fn finish(self) -> Result<FileVectorStore<V>> {
        let Self {
            path,
            guard,
            writer,
            count,
            ..
        } = self;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        guard.persist(&path)?;
        debug!(path = %path.display(), entries = count, "wrote vector store");
        FileVectorStore::open(&path)
    }
}
