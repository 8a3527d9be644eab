//! Tests for the on-disk bucket index: byte layout, reopen, and refusal to
//! overwrite a file that disagrees with the map being written.

use bitlsh::persistence::{BucketMap, PersistenceError, PersistentBucketIndex};
use std::fs;

fn sample_map() -> BucketMap {
    let mut map = BucketMap::new();
    map.insert(1, vec![10, 20]);
    map.insert(5, vec![30]);
    map
}

fn be_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_be_bytes(bytes[at..at + 8].try_into().unwrap())
}

#[test]
fn two_bucket_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx.lshstore41");
    let index = PersistentBucketIndex::persist(&path, &sample_map()).unwrap();

    let bytes = fs::read(&path).unwrap();
    // 8-byte header length, 2 × (2-byte code + 8-byte start), 3 × 8-byte offsets.
    assert_eq!(bytes.len(), 8 + 2 * 10 + 3 * 8);
    assert_eq!(be_u64(&bytes, 0), 28);
    assert_eq!(u16::from_be_bytes([bytes[8], bytes[9]]), 1);
    assert_eq!(be_u64(&bytes, 10), 28);
    assert_eq!(u16::from_be_bytes([bytes[18], bytes[19]]), 5);
    assert_eq!(be_u64(&bytes, 20), 44);
    assert_eq!(be_u64(&bytes, 28), 10);
    assert_eq!(be_u64(&bytes, 36), 20);
    assert_eq!(be_u64(&bytes, 44), 30);

    assert_eq!(index.get(1).collect::<Vec<_>>(), vec![10, 20]);
    assert_eq!(index.get(5).collect::<Vec<_>>(), vec![30]);
    assert_eq!(index.get(2).count(), 0);
    assert_eq!(index.keys().collect::<Vec<_>>(), vec![1, 5]);
}

#[test]
fn reopened_index_answers_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");
    PersistentBucketIndex::persist(&path, &sample_map())
        .unwrap()
        .close();

    let index = PersistentBucketIndex::open(&path).unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.num_offsets(), 3);
    assert_eq!(index.to_map(), sample_map());
}

#[test]
fn mismatched_existing_file_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");
    fs::write(&path, [7u8; 12]).unwrap();

    match PersistentBucketIndex::persist(&path, &sample_map()) {
        Err(PersistenceError::Corruption {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 52);
            assert_eq!(actual, 12);
        }
        other => panic!("expected corruption, got {other:?}"),
    }
    assert_eq!(fs::read(&path).unwrap(), vec![7u8; 12]);
}

#[test]
fn same_size_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");
    fs::write(&path, [0u8; 52]).unwrap();

    let index = PersistentBucketIndex::persist(&path, &sample_map()).unwrap();
    assert_eq!(index.get(1).collect::<Vec<_>>(), vec![10, 20]);
}

#[test]
fn offsets_iterator_reports_exact_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");
    let mut map = BucketMap::new();
    map.insert(0x7FFF, (0..100).collect());
    let index = PersistentBucketIndex::persist(&path, &map).unwrap();

    let offsets = index.get(0x7FFF);
    assert_eq!(offsets.len(), 100);
    assert_eq!(offsets.last(), Some(99));
}

#[test]
fn no_temp_file_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");
    PersistentBucketIndex::persist(&path, &sample_map()).unwrap();

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("idx")]);
}
