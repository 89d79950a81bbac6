//! In-memory backend
//!
//! A complete keyspace behind a `parking_lot::RwLock`. Clones share the same
//! keyspace, so the server hands one clone to every connection.
//!
//! ## Expiry
//! Expiry is lazy: reads treat an expired key as absent, writes purge it
//! before acting. Deadlines are wall-clock unix millis so EXPIREAT and
//! snapshots agree on them.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{EntityKvError, Result};

use super::pattern::glob_match;
use super::snapshot::{read_snapshot, write_snapshot, SnapshotEntry, StoredValue};
use super::{Backend, KeyType, TTL_KEY_MISSING, TTL_NO_EXPIRY};

/// A key's value plus its optional deadline
#[derive(Debug, Clone)]
struct Slot {
    value: StoredValue,
    expires_at_ms: Option<u64>,
}

impl Slot {
    fn new(value: StoredValue) -> Self {
        Self {
            value,
            expires_at_ms: None,
        }
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at_ms, Some(deadline) if deadline <= now_ms)
    }
}

type Keyspace = HashMap<String, Slot>;

#[derive(Default)]
struct Shared {
    keyspace: RwLock<Keyspace>,
    snapshot_path: Option<PathBuf>,
    commands: AtomicU64,
    /// Held while a snapshot file is written; saves share one temp path
    save_lock: Mutex<()>,
}

/// In-process implementation of [`Backend`]
#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    /// Create an empty, purely in-memory backend (SAVE is a no-op)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty backend that saves to `path`
    pub fn with_snapshot_path(path: impl Into<PathBuf>) -> Self {
        Self::from_parts(Keyspace::new(), Some(path.into()))
    }

    /// Open a snapshot-backed backend, restoring `path` if it exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut keyspace = Keyspace::new();

        if path.exists() {
            let now = now_ms();
            let entries = read_snapshot(&path)?;
            let total = entries.len();
            for entry in entries {
                let slot = Slot {
                    value: entry.value,
                    expires_at_ms: entry.expires_at_ms,
                };
                if !slot.is_expired(now) {
                    keyspace.insert(entry.key, slot);
                }
            }
            tracing::info!(
                "Restored {} of {} keys from snapshot {}",
                keyspace.len(),
                total,
                path.display()
            );
        }

        Ok(Self::from_parts(keyspace, Some(path)))
    }

    /// Build from config: snapshot-backed if a snapshot path is set
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.snapshot_path {
            Some(path) => Self::open(path.clone()),
            None => Ok(Self::new()),
        }
    }

    fn from_parts(keyspace: Keyspace, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                keyspace: RwLock::new(keyspace),
                snapshot_path,
                commands: AtomicU64::new(0),
                save_lock: Mutex::new(()),
            }),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = now_ms();
        self.shared
            .keyspace
            .read()
            .values()
            .filter(|slot| !slot.is_expired(now))
            .count()
    }

    /// True if no live keys exist
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total primitives executed across all clones
    pub fn commands_processed(&self) -> u64 {
        self.shared.commands.load(Ordering::Relaxed)
    }

    /// Snapshot file, if configured
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.shared.snapshot_path.as_deref()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn record(&self) {
        self.shared.commands.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot_entries(&self) -> Vec<SnapshotEntry> {
        let now = now_ms();
        self.shared
            .keyspace
            .read()
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(key, slot)| SnapshotEntry {
                key: key.clone(),
                value: slot.value.clone(),
                expires_at_ms: slot.expires_at_ms,
            })
            .collect()
    }

    /// Apply a deadline (unix millis); a deadline in the past deletes the key
    fn set_deadline(&self, key: &str, deadline_ms: i64) -> i64 {
        let now = now_ms();
        let mut keyspace = self.shared.keyspace.write();
        purge_expired(&mut keyspace, key, now);

        if deadline_ms <= now as i64 {
            return keyspace.remove(key).is_some() as i64;
        }
        match keyspace.get_mut(key) {
            Some(slot) => {
                slot.expires_at_ms = Some(deadline_ms as u64);
                1
            }
            None => 0,
        }
    }
}

impl Backend for MemoryBackend {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.record();
        let keyspace = self.shared.keyspace.read();
        match live(&keyspace, key, now_ms()).map(|slot| &slot.value) {
            Some(StoredValue::String(bytes)) => Ok(Some(bytes.clone())),
            Some(StoredValue::Set(_)) => Err(wrong_type()),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.record();
        self.shared
            .keyspace
            .write()
            .insert(key.to_string(), Slot::new(StoredValue::String(value.to_vec())));
        Ok(())
    }

    fn set_if_not_exists(&mut self, key: &str, value: &[u8]) -> Result<i64> {
        self.record();
        let mut keyspace = self.shared.keyspace.write();
        purge_expired(&mut keyspace, key, now_ms());

        if keyspace.contains_key(key) {
            return Ok(0);
        }
        keyspace.insert(key.to_string(), Slot::new(StoredValue::String(value.to_vec())));
        Ok(1)
    }

    fn get_and_set(&mut self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.record();
        let mut keyspace = self.shared.keyspace.write();
        purge_expired(&mut keyspace, key, now_ms());

        let previous = match keyspace.get(key).map(|slot| &slot.value) {
            Some(StoredValue::String(bytes)) => Some(bytes.clone()),
            Some(StoredValue::Set(_)) => return Err(wrong_type()),
            None => None,
        };
        keyspace.insert(key.to_string(), Slot::new(StoredValue::String(value.to_vec())));
        Ok(previous)
    }

    fn exists(&mut self, key: &str) -> Result<i64> {
        self.record();
        let keyspace = self.shared.keyspace.read();
        Ok(live(&keyspace, key, now_ms()).is_some() as i64)
    }

    fn delete(&mut self, keys: &[String]) -> Result<i64> {
        self.record();
        let now = now_ms();
        let mut keyspace = self.shared.keyspace.write();

        let mut removed = 0;
        for key in keys {
            purge_expired(&mut keyspace, key, now);
            if keyspace.remove(key.as_str()).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn increment_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.record();
        let mut keyspace = self.shared.keyspace.write();
        purge_expired(&mut keyspace, key, now_ms());

        let (current, expires_at_ms) = match keyspace.get(key) {
            Some(Slot {
                value: StoredValue::String(bytes),
                expires_at_ms,
            }) => (parse_integer(bytes)?, *expires_at_ms),
            Some(Slot {
                value: StoredValue::Set(_),
                ..
            }) => return Err(wrong_type()),
            None => (0, None),
        };

        let updated = current.checked_add(delta).ok_or_else(|| {
            EntityKvError::Backend("increment or decrement would overflow".to_string())
        })?;

        keyspace.insert(
            key.to_string(),
            Slot {
                value: StoredValue::String(updated.to_string().into_bytes()),
                expires_at_ms,
            },
        );
        Ok(updated)
    }

    fn decrement_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        let negated = delta.checked_neg().ok_or_else(|| {
            EntityKvError::Backend("decrement would overflow".to_string())
        })?;
        self.increment_by(key, negated)
    }

    fn expire(&mut self, key: &str, seconds: i64) -> Result<i64> {
        self.record();
        let deadline = (now_ms() as i64).saturating_add(seconds.saturating_mul(1000));
        Ok(self.set_deadline(key, deadline))
    }

    fn expire_at(&mut self, key: &str, unix_timestamp: i64) -> Result<i64> {
        self.record();
        Ok(self.set_deadline(key, unix_timestamp.saturating_mul(1000)))
    }

    fn ttl(&mut self, key: &str) -> Result<i64> {
        self.record();
        let now = now_ms();
        let keyspace = self.shared.keyspace.read();
        Ok(match live(&keyspace, key, now) {
            None => TTL_KEY_MISSING,
            Some(Slot {
                expires_at_ms: None,
                ..
            }) => TTL_NO_EXPIRY,
            // Round to the nearest second
            Some(Slot {
                expires_at_ms: Some(deadline),
                ..
            }) => ((deadline - now + 500) / 1000) as i64,
        })
    }

    fn keys_matching(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.record();
        let now = now_ms();
        // Patterns are matched after the read lock is released
        let live: Vec<String> = self
            .shared
            .keyspace
            .read()
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        let mut keys: Vec<String> = live
            .into_iter()
            .filter(|key| glob_match(pattern, key))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn multi_get(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.record();
        let now = now_ms();
        let keyspace = self.shared.keyspace.read();
        Ok(keys
            .iter()
            .map(|key| match live(&keyspace, key, now).map(|slot| &slot.value) {
                Some(StoredValue::String(bytes)) => Some(bytes.clone()),
                _ => None,
            })
            .collect())
    }

    fn set_add(&mut self, set_key: &str, member: &str) -> Result<()> {
        self.record();
        let mut keyspace = self.shared.keyspace.write();
        purge_expired(&mut keyspace, set_key, now_ms());

        let slot = keyspace
            .entry(set_key.to_string())
            .or_insert_with(|| Slot::new(StoredValue::Set(BTreeSet::new())));
        match &mut slot.value {
            StoredValue::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            StoredValue::String(_) => Err(wrong_type()),
        }
    }

    fn set_remove(&mut self, set_key: &str, member: &str) -> Result<()> {
        self.record();
        let mut keyspace = self.shared.keyspace.write();
        purge_expired(&mut keyspace, set_key, now_ms());

        let now_empty = match keyspace.get_mut(set_key).map(|slot| &mut slot.value) {
            Some(StoredValue::Set(members)) => {
                members.remove(member);
                members.is_empty()
            }
            Some(StoredValue::String(_)) => return Err(wrong_type()),
            None => false,
        };
        if now_empty {
            keyspace.remove(set_key);
        }
        Ok(())
    }

    fn set_members(&mut self, set_key: &str) -> Result<Vec<String>> {
        self.record();
        let keyspace = self.shared.keyspace.read();
        match live(&keyspace, set_key, now_ms()).map(|slot| &slot.value) {
            Some(StoredValue::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(StoredValue::String(_)) => Err(wrong_type()),
            None => Ok(Vec::new()),
        }
    }

    fn key_type(&mut self, key: &str) -> Result<KeyType> {
        self.record();
        let keyspace = self.shared.keyspace.read();
        Ok(match live(&keyspace, key, now_ms()).map(|slot| &slot.value) {
            Some(StoredValue::String(_)) => KeyType::String,
            Some(StoredValue::Set(_)) => KeyType::Set,
            None => KeyType::None,
        })
    }

    fn random_key(&mut self) -> Result<Option<String>> {
        self.record();
        let now = now_ms();
        let keyspace = self.shared.keyspace.read();
        let keys: Vec<&String> = keyspace
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(key, _)| key)
            .collect();
        if keys.is_empty() {
            return Ok(None);
        }
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as usize)
            .unwrap_or(0);
        Ok(Some(keys[seed % keys.len()].clone()))
    }

    fn save(&mut self) -> Result<()> {
        self.record();
        let Some(path) = self.shared.snapshot_path.clone() else {
            tracing::debug!("SAVE ignored: no snapshot path configured");
            return Ok(());
        };

        let _saving = self.shared.save_lock.lock();
        let entries = self.snapshot_entries();
        write_snapshot(&path, &entries)?;
        tracing::info!("Saved {} keys to {}", entries.len(), path.display());
        Ok(())
    }

    fn save_async(&mut self) -> Result<()> {
        self.record();
        let Some(path) = self.shared.snapshot_path.clone() else {
            tracing::debug!("BGSAVE ignored: no snapshot path configured");
            return Ok(());
        };

        // Copy under the read lock, write outside it
        let entries = self.snapshot_entries();
        let shared = Arc::clone(&self.shared);
        std::thread::Builder::new()
            .name("entitykv-bgsave".to_string())
            .spawn(move || {
                let _saving = shared.save_lock.lock();
                match write_snapshot(&path, &entries) {
                    Ok(()) => tracing::info!(
                        "Background save of {} keys to {} finished",
                        entries.len(),
                        path.display()
                    ),
                    Err(e) => {
                        tracing::error!("Background save to {} failed: {}", path.display(), e)
                    }
                }
            })?;
        Ok(())
    }

    fn flush_db(&mut self) -> Result<()> {
        self.record();
        self.shared.keyspace.write().clear();
        Ok(())
    }

    fn flush_all(&mut self) -> Result<()> {
        // Single database: same as FLUSHDB
        self.flush_db()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn live<'k>(keyspace: &'k Keyspace, key: &str, now_ms: u64) -> Option<&'k Slot> {
    keyspace.get(key).filter(|slot| !slot.is_expired(now_ms))
}

fn purge_expired(keyspace: &mut Keyspace, key: &str, now_ms: u64) {
    if keyspace.get(key).is_some_and(|slot| slot.is_expired(now_ms)) {
        keyspace.remove(key);
    }
}

fn parse_integer(bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| EntityKvError::Backend("value is not an integer or out of range".to_string()))
}

fn wrong_type() -> EntityKvError {
    EntityKvError::Backend(
        "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    )
}
