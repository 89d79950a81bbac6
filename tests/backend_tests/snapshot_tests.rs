//! Tests for keyspace snapshots
//!
//! These tests verify:
//! - SAVE without a snapshot path is a no-op
//! - SAVE followed by open restores strings, sets and TTLs
//! - Corrupted snapshots are rejected
//! - BGSAVE eventually writes the file
//! - Overlapping saves never corrupt the file

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use entitykv::backend::{Backend, KeyType, MemoryBackend, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use entitykv::EntityKvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn populated_backend(path: &Path) -> MemoryBackend {
    let mut backend = MemoryBackend::with_snapshot_path(path);
    backend.set("urn:Widget:1", b"{\"id\":\"1\"}").unwrap();
    backend.set("seq:Widget", b"7").unwrap();
    backend.set_add("ids:Widget", "1").unwrap();
    backend.set_add("ids:Widget", "2").unwrap();
    backend.set("session", b"token").unwrap();
    backend.expire("session", 100).unwrap();
    backend
}

fn wait_for_file(path: &Path) -> bool {
    for _ in 0..200 {
        if path.exists() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

// =============================================================================
// Save / Restore Tests
// =============================================================================

#[test]
fn test_save_without_path_is_noop() {
    let mut backend = MemoryBackend::new();
    backend.set("k", b"v").unwrap();

    backend.save().unwrap();
    backend.save_async().unwrap();

    assert!(backend.snapshot_path().is_none());
}

#[test]
fn test_save_and_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.ekv");

    let mut backend = populated_backend(&path);
    backend.save().unwrap();
    assert!(path.exists());

    let mut restored = MemoryBackend::open(&path).unwrap();

    assert_eq!(restored.len(), 4);
    assert_eq!(
        restored.get("urn:Widget:1").unwrap(),
        Some(b"{\"id\":\"1\"}".to_vec())
    );
    assert_eq!(restored.increment("seq:Widget").unwrap(), 8);
    assert_eq!(restored.key_type("ids:Widget").unwrap(), KeyType::Set);
    assert_eq!(
        restored.set_members("ids:Widget").unwrap(),
        vec!["1".to_string(), "2".to_string()]
    );

    let ttl = restored.ttl("session").unwrap();
    assert!(ttl > 90 && ttl <= 100, "ttl was {}", ttl);
    assert_eq!(restored.ttl("urn:Widget:1").unwrap(), -1);
}

#[test]
fn test_open_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never-written.ekv");

    let backend = MemoryBackend::open(&path).unwrap();

    assert!(backend.is_empty());
    assert_eq!(backend.snapshot_path(), Some(path.as_path()));
}

#[test]
fn test_save_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("dump.ekv");

    let mut backend = MemoryBackend::with_snapshot_path(&path);
    backend.set("k", b"v").unwrap();
    backend.save().unwrap();

    assert!(path.exists());
}

#[test]
fn test_snapshot_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.ekv");

    populated_backend(&path).save().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], SNAPSHOT_MAGIC);
    assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), SNAPSHOT_VERSION);
}

#[test]
fn test_resave_overwrites_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.ekv");

    let mut backend = populated_backend(&path);
    backend.save().unwrap();
    backend.flush_db().unwrap();
    backend.set("only", b"one").unwrap();
    backend.save().unwrap();

    let mut restored = MemoryBackend::open(&path).unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored.get("only").unwrap(), Some(b"one".to_vec()));
}

#[test]
fn test_save_async_writes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bg.ekv");

    let mut backend = populated_backend(&path);
    backend.save_async().unwrap();

    assert!(wait_for_file(&path), "background save never landed");
}

#[test]
fn test_concurrent_saves_leave_valid_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.ekv");
    let backend = populated_backend(&path);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mut backend = backend.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    if i == 0 {
                        backend.save_async().unwrap();
                    }
                    backend.save().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut restored = MemoryBackend::open(&path).unwrap();
    assert_eq!(restored.len(), 4);
    assert_eq!(
        restored.set_members("ids:Widget").unwrap(),
        vec!["1".to_string(), "2".to_string()]
    );
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_checksum_mismatch_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.ekv");
    populated_backend(&path).save().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let result = MemoryBackend::open(&path);
    assert!(matches!(result, Err(EntityKvError::SnapshotCorrupted(_))));
}

#[test]
fn test_bad_magic_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.ekv");
    populated_backend(&path).save().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[0..4].copy_from_slice(b"NOPE");
    fs::write(&path, &bytes).unwrap();

    let result = MemoryBackend::open(&path);
    assert!(matches!(result, Err(EntityKvError::SnapshotCorrupted(_))));
}

#[test]
fn test_truncated_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.ekv");
    fs::write(&path, b"EKV").unwrap();

    let result = MemoryBackend::open(&path);
    assert!(matches!(result, Err(EntityKvError::SnapshotCorrupted(_))));
}
