//! Keyspace snapshots
//!
//! ## File Format
//! ```text
//! ┌───────────┬─────────────┬──────────┬──────────┬──────────────────┐
//! │ Magic (4) │ Version (2) │ CRC (4)  │ Len (8)  │ bincode payload  │
//! └───────────┴─────────────┴──────────┴──────────┴──────────────────┘
//! ```
//! All integers little-endian. The CRC covers the payload only.
//! Snapshots are written to `{path}.tmp` and renamed into place.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EntityKvError, Result};

/// Magic bytes at the start of every snapshot file
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"EKVS";

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_SIZE: usize = 4 + 2 + 4 + 8;

/// A stored value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum StoredValue {
    String(Vec<u8>),
    Set(BTreeSet<String>),
}

/// One persisted key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SnapshotEntry {
    pub key: String,
    pub value: StoredValue,
    /// Absolute expiry, unix millis
    pub expires_at_ms: Option<u64>,
}

/// Write a snapshot atomically
pub(crate) fn write_snapshot(path: &Path, entries: &[SnapshotEntry]) -> Result<()> {
    let payload = bincode::serialize(entries)
        .map_err(|e| EntityKvError::Encode(format!("snapshot: {}", e)))?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = tmp_path_for(path);
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(SNAPSHOT_MAGIC)?;
        writer.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.write_all(&(payload.len() as u64).to_le_bytes())?;
        writer.write_all(&payload)?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| EntityKvError::Io(e.into_error()))?
            .sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Read and verify a snapshot
pub(crate) fn read_snapshot(path: &Path) -> Result<Vec<SnapshotEntry>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    if bytes.len() < HEADER_SIZE {
        return Err(EntityKvError::SnapshotCorrupted(format!(
            "file too short: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[0..4] != SNAPSHOT_MAGIC {
        return Err(EntityKvError::SnapshotCorrupted("bad magic".to_string()));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != SNAPSHOT_VERSION {
        return Err(EntityKvError::SnapshotCorrupted(format!(
            "unsupported version {}",
            version
        )));
    }

    let crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[10..18]);
    let len = u64::from_le_bytes(len_bytes) as usize;

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != len {
        return Err(EntityKvError::SnapshotCorrupted(format!(
            "payload length mismatch: header says {}, found {}",
            len,
            payload.len()
        )));
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != crc {
        return Err(EntityKvError::SnapshotCorrupted("checksum mismatch".to_string()));
    }

    bincode::deserialize(payload).map_err(|e| EntityKvError::SnapshotCorrupted(e.to_string()))
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
