//! On-disk naming and primitive encodings shared by the index files.
//!
//! # File Layout
//!
//! Index files live in an `lsh/` directory next to the vector store they
//! were built from, and carry the hash parameters in their names:
//!
//! ```text
//! <dir>/
//! ├── vectors.bin                 # vector store
//! └── lsh/
//!     ├── vectors.bin.lsh62       # projections (K = 6, maxBitsDiff = 2)
//!     └── vectors.bin.lshstore62  # bucket index
//! ```
//!
//! All integers are big-endian.
//!
//! # Atomic Writes
//!
//! Files are written under a temporary name in the target directory and
//! renamed into place once complete, so an interrupted build leaves either
//! the old file or none at all. Every write gets its own temporary name, so
//! concurrent writers of the same target never share one.

use crate::config::LshConfig;
use crate::persistence::error::{PersistenceError, PersistenceResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Directory, next to the vector store, holding its index files.
pub const INDEX_DIR: &str = "lsh";

/// Extension of the projections file, before the parameter suffix.
pub const HASH_FILE_EXTENSION: &str = "lsh";

/// Extension of the bucket index file, before the parameter suffix.
pub const BUCKET_FILE_EXTENSION: &str = "lshstore";

fn store_file_name(store_path: &Path) -> PersistenceResult<&str> {
    store_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PersistenceError::NotFound(format!(
                "vector store path has no usable file name: {}",
                store_path.display()
            ))
        })
}

/// `lsh/` directory next to `store_path`.
pub fn index_dir(store_path: &Path) -> PathBuf {
    store_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(INDEX_DIR)
}

/// `<dir>/lsh/<store>.lsh<K><d>`
pub fn hash_file_path(store_path: &Path, config: &LshConfig) -> PersistenceResult<PathBuf> {
    let name = store_file_name(store_path)?;
    Ok(index_dir(store_path).join(format!(
        "{name}.{HASH_FILE_EXTENSION}{}",
        config.file_suffix()
    )))
}

/// `<dir>/lsh/<store>.lshstore<K><d>`
pub fn bucket_file_path(store_path: &Path, config: &LshConfig) -> PersistenceResult<PathBuf> {
    let name = store_file_name(store_path)?;
    Ok(index_dir(store_path).join(format!(
        "{name}.{BUCKET_FILE_EXTENSION}{}",
        config.file_suffix()
    )))
}

/// Every index file in `lsh/` that belongs to `store_path`, for any parameters.
pub fn index_files_for(store_path: &Path) -> PersistenceResult<Vec<PathBuf>> {
    let name = store_file_name(store_path)?;
    let prefix = format!("{name}.{HASH_FILE_EXTENSION}");
    let dir = index_dir(store_path);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(&prefix) && !n.ends_with(TEMP_SUFFIX));
        if matches && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

const TEMP_SUFFIX: &str = ".tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sibling of `path` named `<file>.<pid>.<n>.tmp`, unique within this
/// process and across processes sharing the directory.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    name.push(format!(".{}.{n}{TEMP_SUFFIX}", std::process::id()));
    PathBuf::from(name)
}

/// Removes a temporary file unless disarmed.
pub(crate) struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    /// Create a fresh temporary file next to `target`, open for reading and
    /// writing. Never opens a file another writer is using.
    pub(crate) fn create(target: &Path) -> io::Result<(Self, File)> {
        let mut attempts = 0;
        loop {
            let path = temp_path(target);
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => return Ok((Self { path, armed: true }, file)),
                // Left over from a crashed process that had our pid.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempts < 8 => {
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Rename the temporary file to `target` and stop guarding it.
    pub(crate) fn persist(mut self, target: &Path) -> PersistenceResult<()> {
        fs::rename(&self.path, target)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove temporary index file");
            }
        }
    }
}

/// Write `path` through a buffered temporary file and rename it into place.
pub fn write_atomic<F, E>(path: &Path, write: F) -> Result<(), E>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), E>,
    E: From<io::Error> + From<PersistenceError>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let (guard, file) = TempFileGuard::create(path)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    guard.persist(path)?;
    Ok(())
}

pub fn write_u16<W: Write>(w: &mut W, value: u16) -> io::Result<()> {
    w.write_all(&value.to_be_bytes())
}

pub fn write_u32<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_be_bytes())
}

pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// String with a `u16` byte-length prefix.
pub fn write_short_str<W: Write>(w: &mut W, s: &str) -> PersistenceResult<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| PersistenceError::Format(format!("string of {} bytes is too long", s.len())))?;
    write_u16(w, len)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

pub fn read_short_str<R: Read>(r: &mut R) -> PersistenceResult<String> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| PersistenceError::Format(format!("invalid UTF-8: {e}")))
}

/// Variable-length unsigned integer: 7 bits per byte, low bits first, high
/// bit set on every byte but the last.
pub fn write_vint<W: Write>(w: &mut W, mut value: u32) -> io::Result<usize> {
    let mut written = 0;
    while value >= 0x80 {
        w.write_all(&[(value as u8 & 0x7F) | 0x80])?;
        value >>= 7;
        written += 1;
    }
    w.write_all(&[value as u8])?;
    Ok(written + 1)
}

pub fn read_vint<R: Read>(r: &mut R) -> PersistenceResult<u32> {
    let mut value = 0u32;
    for shift in (0..35).step_by(7) {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        value |= u32::from(byte[0] & 0x7F) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(PersistenceError::Format("variable-length integer is too long".to_string()))
}

/// String with a VInt byte-length prefix; returns bytes written.
pub fn write_vint_str<W: Write>(w: &mut W, s: &str) -> PersistenceResult<usize> {
    let len = u32::try_from(s.len())
        .map_err(|_| PersistenceError::Format(format!("string of {} bytes is too long", s.len())))?;
    let prefix = write_vint(w, len)?;
    w.write_all(s.as_bytes())?;
    Ok(prefix + s.len())
}

pub fn read_vint_str<R: Read>(r: &mut R) -> PersistenceResult<String> {
    let len = read_vint(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| PersistenceError::Format(format!("invalid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let config = LshConfig::new(6, 2).unwrap();
        let store = Path::new("/data/index/vectors.bin");
        assert_eq!(
            hash_file_path(store, &config).unwrap(),
            PathBuf::from("/data/index/lsh/vectors.bin.lsh62")
        );
        assert_eq!(
            bucket_file_path(store, &config).unwrap(),
            PathBuf::from("/data/index/lsh/vectors.bin.lshstore62")
        );
    }

    #[test]
    fn test_relative_store_name() {
        let config = LshConfig::new(4, 1).unwrap();
        assert_eq!(
            hash_file_path(Path::new("vectors.bin"), &config).unwrap(),
            PathBuf::from("lsh/vectors.bin.lsh41")
        );
    }

    #[test]
    fn test_vint_boundaries() {
        for value in [0u32, 1, 127, 128, 300, 16_383, 16_384, u32::MAX] {
            let mut buf = Vec::new();
            let n = write_vint(&mut buf, value).unwrap();
            assert_eq!(n, buf.len());
            assert_eq!(read_vint(&mut buf.as_slice()).unwrap(), value);
        }
        let mut buf = Vec::new();
        write_vint(&mut buf, 300).unwrap();
        assert_eq!(buf, vec![0xAC, 0x02]);
    }

    #[test]
    fn test_short_str_is_length_prefixed() {
        let mut buf = Vec::new();
        write_short_str(&mut buf, "BINARY").unwrap();
        assert_eq!(&buf[..2], &[0, 6]);
        assert_eq!(read_short_str(&mut buf.as_slice()).unwrap(), "BINARY");
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let result = write_atomic(&path, |w| -> PersistenceResult<()> {
            w.write_all(b"partial")?;
            Err(PersistenceError::Format("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        write_atomic::<_, PersistenceError>(&path, |w| Ok(w.write_all(b"done")?)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"done");
    }

    #[test]
    fn test_temp_paths_are_distinct() {
        let path = Path::new("/data/lsh/v.bin.lsh62");
        let a = temp_path(path);
        let b = temp_path(path);
        assert_ne!(a, b);
        assert_eq!(a.parent(), path.parent());
        assert!(a.to_str().unwrap().ends_with(TEMP_SUFFIX));
    }

    #[test]
    fn test_concurrent_write_atomic_never_mixes_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.bin");
        let barrier = std::sync::Barrier::new(4);
        std::thread::scope(|s| {
            for t in 0..4u8 {
                let (path, barrier) = (&path, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    for _ in 0..20 {
                        write_atomic::<_, PersistenceError>(path, |w| {
                            Ok(w.write_all(&[t; 4096])?)
                        })
                        .unwrap();
                    }
                });
            }
        });

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 4096);
        assert!(bytes.iter().all(|&b| b == bytes[0]));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_index_files_for_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("vectors.bin");
        let lsh = index_dir(&store);
        fs::create_dir_all(&lsh).unwrap();
        for name in ["vectors.bin.lsh62", "vectors.bin.lshstore62", "other.bin.lsh62"] {
            fs::write(lsh.join(name), b"x").unwrap();
        }
        let files = index_files_for(&store).unwrap();
        assert_eq!(files.len(), 2);
        assert!(index_files_for(&dir.path().join("missing").join("v.bin"))
            .unwrap()
            .is_empty());
    }
}
