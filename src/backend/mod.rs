//! Backend Module
//!
//! The key-value primitives the typed layer is built from.
//!
//! ## Contract
//! Every method is one atomic request/response against the store. Methods
//! that signal success with an integer return the raw code unchanged
//! (`1` = success for SETNX/EXISTS/EXPIRE, `-2`/`-1` TTL sentinels); the
//! typed layer converts them to booleans and options at its boundary.
//!
//! ## Implementations
//! - [`MemoryBackend`]: in-process keyspace with TTLs and snapshots
//! - [`RemoteBackend`](crate::network::RemoteBackend): TCP client for `entitykv-server`

mod memory;
mod pattern;
mod snapshot;

pub use memory::MemoryBackend;
pub use pattern::glob_match;
pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

use serde::{Deserialize, Serialize};

use crate::error::{EntityKvError, Result};
use crate::keys::Entity;
use crate::store::TypedStore;

/// `ttl` result when the key does not exist
pub const TTL_KEY_MISSING: i64 = -2;

/// `ttl` result when the key exists without an expiry
pub const TTL_NO_EXPIRY: i64 = -1;

/// Structural kind of a stored key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyType {
    None = 0x00,
    String = 0x01,
    List = 0x02,
    Set = 0x03,
    SortedSet = 0x04,
    Hash = 0x05,
}

impl KeyType {
    /// Parse the wire byte for a key type
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(KeyType::None),
            0x01 => Ok(KeyType::String),
            0x02 => Ok(KeyType::List),
            0x03 => Ok(KeyType::Set),
            0x04 => Ok(KeyType::SortedSet),
            0x05 => Ok(KeyType::Hash),
            _ => Err(EntityKvError::Protocol(format!(
                "Unknown key type: 0x{:02x}",
                byte
            ))),
        }
    }

    /// Lowercase name as printed by the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::None => "none",
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::SortedSet => "zset",
            KeyType::Hash => "hash",
        }
    }
}

/// Raw key-value store primitives
pub trait Backend {
    /// GET: payload stored at `key`, `None` if absent
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    /// SET: overwrite `key` (clears any TTL)
    fn set(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// SETNX: 1 if the key was created, 0 if it already existed
    fn set_if_not_exists(&mut self, key: &str, value: &[u8]) -> Result<i64>;

    /// GETSET: store `value`, return the previous payload
    fn get_and_set(&mut self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>>;

    /// EXISTS: 1 if the key exists, 0 otherwise
    fn exists(&mut self, key: &str) -> Result<i64>;

    /// DEL: number of keys removed
    fn delete(&mut self, keys: &[String]) -> Result<i64>;

    /// INCRBY: add `delta` to an integer key (absent = 0), return the new value
    fn increment_by(&mut self, key: &str, delta: i64) -> Result<i64>;

    /// DECRBY: subtract `delta` from an integer key (absent = 0)
    fn decrement_by(&mut self, key: &str, delta: i64) -> Result<i64>;

    /// EXPIRE: 1 if the timeout was set, 0 if the key does not exist
    fn expire(&mut self, key: &str, seconds: i64) -> Result<i64>;

    /// EXPIREAT: like `expire` with an absolute unix timestamp (seconds)
    fn expire_at(&mut self, key: &str, unix_timestamp: i64) -> Result<i64>;

    /// TTL: remaining seconds, [`TTL_NO_EXPIRY`] or [`TTL_KEY_MISSING`]
    fn ttl(&mut self, key: &str) -> Result<i64>;

    /// KEYS: every key matching a glob pattern
    fn keys_matching(&mut self, pattern: &str) -> Result<Vec<String>>;

    /// MGET: one slot per requested key, `None` for absent or non-string keys
    fn multi_get(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// SADD
    fn set_add(&mut self, set_key: &str, member: &str) -> Result<()>;

    /// SREM (an emptied set is removed)
    fn set_remove(&mut self, set_key: &str, member: &str) -> Result<()>;

    /// SMEMBERS
    fn set_members(&mut self, set_key: &str) -> Result<Vec<String>>;

    /// TYPE
    fn key_type(&mut self, key: &str) -> Result<KeyType>;

    /// RANDOMKEY: `None` when the keyspace is empty
    fn random_key(&mut self) -> Result<Option<String>>;

    /// SAVE: persist synchronously
    fn save(&mut self) -> Result<()>;

    /// BGSAVE: persist in the background
    fn save_async(&mut self) -> Result<()>;

    /// FLUSHDB
    fn flush_db(&mut self) -> Result<()>;

    /// FLUSHALL
    fn flush_all(&mut self) -> Result<()>;

    /// INCR
    fn increment(&mut self, key: &str) -> Result<i64> {
        self.increment_by(key, 1)
    }

    /// DECR
    fn decrement(&mut self, key: &str) -> Result<i64> {
        self.decrement_by(key, 1)
    }

    /// Borrow this connection as a typed entity store for `T`
    fn typed<T: Entity>(&mut self) -> TypedStore<'_, T, Self>
    where
        Self: Sized,
    {
        TypedStore::new(self)
    }
}
