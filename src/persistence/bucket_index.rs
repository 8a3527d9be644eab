//! Immutable, memory-mapped map from bucket code to vector store offsets.
//!
//! # Format
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ header length (8B) = 8 + 10 · numBuckets     │
//! ├──────────────────────────────────────────────┤
//! │ per bucket, ascending code:                  │
//! │   code (2B) │ absolute start of its data (8B)│
//! ├──────────────────────────────────────────────┤
//! │ offsets (8B each), bucket by bucket          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. A bucket's data ends where the next one's
//! starts, or at end of file for the last bucket, so the file size is fully
//! determined by the map it was built from.
//!
//! The file is sized up front, filled through a writable mapping under a
//! temporary name, renamed into place, then mapped read-only. Lookups are a
//! binary search over the header followed by a lazy walk over the data.

use crate::persistence::error::{PersistenceError, PersistenceResult};
use crate::persistence::format::TempFileGuard;
use memmap2::{Mmap, MmapMut};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::slice::ChunksExact;
use tracing::debug;

/// In-memory bucket map: code to offsets, codes ascending.
pub type BucketMap = BTreeMap<u16, Vec<u64>>;

const HEADER_LEN_BYTES: usize = 8;
const ENTRY_BYTES: usize = 10;
const OFFSET_BYTES: usize = 8;

/// Exact file size for `map`.
pub fn expected_size(map: &BucketMap) -> u64 {
    let offsets: usize = map.values().map(Vec::len).sum();
    (HEADER_LEN_BYTES + ENTRY_BYTES * map.len() + OFFSET_BYTES * offsets) as u64
}

/// Read-only bucket index backed by a memory map.
///
/// The mapping is released when the index is dropped. Any number of threads
/// may read it concurrently.
pub struct PersistentBucketIndex {
    path: PathBuf,
    mmap: Mmap,
    num_buckets: usize,
}

impl std::fmt::Debug for PersistentBucketIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentBucketIndex")
            .field("path", &self.path)
            .field("num_buckets", &self.num_buckets)
            .field("bytes", &self.mmap.len())
            .finish()
    }
}

impl PersistentBucketIndex {
    /// Write `map` to `path` and open the result.
    ///
    /// A non-empty file already at `path` must have exactly the size `map`
    /// requires, otherwise this fails with [`PersistenceError::Corruption`]
    /// and leaves the file alone. An empty file is treated as absent.
    pub fn persist(path: &Path, map: &BucketMap) -> PersistenceResult<Self> {
        let expected = expected_size(map);
        match fs::metadata(path) {
            Ok(meta) if meta.len() > 0 && meta.len() != expected => {
                return Err(PersistenceError::Corruption {
                    path: path.to_path_buf(),
                    expected,
                    actual: meta.len(),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (guard, file) = TempFileGuard::create(path)?;
        file.set_len(expected)?;
        {
            // SAFETY: the temporary file was just created by us and is not
            // visible under its final name until the rename below.
            let mut mmap = unsafe { MmapMut::map_mut(&file)? };
            encode_into(&mut mmap, map);
            mmap.flush()?;
        }
        drop(file);
        guard.persist(path)?;

        debug!(
            path = %path.display(),
            buckets = map.len(),
            bytes = expected,
            "wrote bucket index"
        );
        Self::open(path)
    }

    /// Map an existing index file read-only and validate its header.
    pub fn open(path: &Path) -> PersistenceResult<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();
        if len < HEADER_LEN_BYTES as u64 {
            return Err(PersistenceError::Format(format!(
                "{}: {len} bytes is shorter than the header length field",
                path.display()
            )));
        }

        // SAFETY: index files are immutable once renamed into place; they
        // are only ever replaced by a rename, never rewritten in place.
        let mmap = unsafe { Mmap::map(&file)? };
        let index = Self {
            path: path.to_path_buf(),
            num_buckets: 0,
            mmap,
        };
        index.validated()
    }

    fn validated(mut self) -> PersistenceResult<Self> {
        let len = self.mmap.len();
        let header_len = self.read_u64(0);
        let header_ok = header_len >= HEADER_LEN_BYTES as u64
            && (header_len - HEADER_LEN_BYTES as u64) % ENTRY_BYTES as u64 == 0
            && header_len <= len as u64;
        if !header_ok {
            return Err(self.format_error(format!(
                "header length {header_len} does not fit a {len}-byte file"
            )));
        }
        let header_len = header_len as usize;
        if (len - header_len) % OFFSET_BYTES != 0 {
            return Err(self.format_error(format!(
                "data region of {} bytes is not a whole number of offsets",
                len - header_len
            )));
        }
        self.num_buckets = (header_len - HEADER_LEN_BYTES) / ENTRY_BYTES;

        let mut previous: Option<(u16, usize)> = None;
        for i in 0..self.num_buckets {
            let code = self.code_at(i);
            let start = self.start_at(i);
            let start_ok = start >= header_len
                && start <= len
                && (start - header_len) % OFFSET_BYTES == 0
                && previous.map_or(start == header_len, |(_, s)| start >= s);
            let order_ok = previous.map_or(true, |(c, _)| code > c);
            if !start_ok || !order_ok {
                return Err(self.format_error(format!(
                    "bucket entry {i} (code {code}, start {start}) is out of order"
                )));
            }
            previous = Some((code, start));
        }
        if self.num_buckets == 0 && len != header_len {
            return Err(PersistenceError::Corruption {
                path: self.path.clone(),
                expected: header_len as u64,
                actual: len as u64,
            });
        }
        Ok(self)
    }

    fn format_error(&self, detail: String) -> PersistenceError {
        PersistenceError::Format(format!("{}: {detail}", self.path.display()))
    }

    fn read_u64(&self, at: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.mmap[at..at + 8]);
        u64::from_be_bytes(buf)
    }

    fn entry_at(&self, i: usize) -> usize {
        HEADER_LEN_BYTES + i * ENTRY_BYTES
    }

    fn code_at(&self, i: usize) -> u16 {
        let at = self.entry_at(i);
        u16::from_be_bytes([self.mmap[at], self.mmap[at + 1]])
    }

    fn start_at(&self, i: usize) -> usize {
        self.read_u64(self.entry_at(i) + 2) as usize
    }

    fn bucket_range(&self, i: usize) -> (usize, usize) {
        let start = self.start_at(i);
        let end = if i + 1 < self.num_buckets {
            self.start_at(i + 1)
        } else {
            self.mmap.len()
        };
        (start, end)
    }

    fn find(&self, code: u16) -> Option<usize> {
        let (mut lo, mut hi) = (0, self.num_buckets);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.code_at(mid).cmp(&code) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    /// Offsets stored under `code`; empty if the bucket is absent.
    pub fn get(&self, code: u16) -> Offsets<'_> {
        let data: &[u8] = match self.find(code) {
            Some(i) => {
                let (start, end) = self.bucket_range(i);
                &self.mmap[start..end]
            }
            None => &[],
        };
        Offsets {
            chunks: data.chunks_exact(OFFSET_BYTES),
        }
    }

    /// Bucket codes present, ascending.
    pub fn keys(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.num_buckets).map(|i| self.code_at(i))
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.num_buckets
    }

    pub fn is_empty(&self) -> bool {
        self.num_buckets == 0
    }

    /// Total number of offsets across all buckets.
    pub fn num_offsets(&self) -> usize {
        let header_len = HEADER_LEN_BYTES + self.num_buckets * ENTRY_BYTES;
        (self.mmap.len() - header_len) / OFFSET_BYTES
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Copy the whole index back into memory.
    pub fn to_map(&self) -> BucketMap {
        self.keys().map(|code| (code, self.get(code).collect())).collect()
    }

    /// Release the mapping.
    pub fn close(self) {
        debug!(path = %self.path.display(), "closing bucket index");
    }
}

fn encode_into(buf: &mut [u8], map: &BucketMap) {
    let header_len = HEADER_LEN_BYTES + ENTRY_BYTES * map.len();
    buf[..HEADER_LEN_BYTES].copy_from_slice(&(header_len as u64).to_be_bytes());

    let mut entry = HEADER_LEN_BYTES;
    let mut data = header_len;
    for (code, offsets) in map {
        buf[entry..entry + 2].copy_from_slice(&code.to_be_bytes());
        buf[entry + 2..entry + ENTRY_BYTES].copy_from_slice(&(data as u64).to_be_bytes());
        entry += ENTRY_BYTES;
        for offset in offsets {
            buf[data..data + OFFSET_BYTES].copy_from_slice(&offset.to_be_bytes());
            data += OFFSET_BYTES;
        }
    }
}

/// Lazy iterator over the offsets of one bucket.
#[derive(Debug, Clone)]
pub struct Offsets<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for Offsets<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let chunk = self.chunks.next()?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        Some(u64::from_be_bytes(buf))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Offsets<'_> {}
