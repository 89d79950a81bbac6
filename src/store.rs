//! Typed Entity Store
//!
//! CRUD over a [`Backend`] for one entity type `T`. Every compound operation
//! is a plain sequence of backend calls; nothing here is transactional.
//!
//! ## Ordering Rules
//! - **store** = track id, then write payload. A failure in between leaves a
//!   phantom id in the index, which `get_all` skips and `prune_index` removes.
//!   The reverse order could leave a payload that `get_all` never finds.
//! - **delete** = untrack id, then remove payload.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut backend = MemoryBackend::new();
//! let mut widgets = backend.typed::<Widget>();
//!
//! widgets.store(&Widget { id: 7, name: "a".into() })?;
//! assert_eq!(widgets.get_all()?.len(), 1);
//! widgets.delete_by_id(7)?;
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::backend::{Backend, KeyType};
use crate::codec::{Codec, JsonCodec};
use crate::error::{EntityKvError, Result};
use crate::index::IdIndex;
use crate::keys::{entity_id, Entity, KeyScheme};

/// Success code returned by SETNX / EXISTS / EXPIRE
const SUCCESS: i64 = 1;

/// Entity store for type `T`, borrowing a backend connection
pub struct TypedStore<'a, T, B: ?Sized, C = JsonCodec> {
    /// Connection owned by the caller
    backend: &'a mut B,

    /// Payload codec
    codec: C,

    /// Key naming rules
    keys: KeyScheme,

    /// `ids:{T}`
    index: IdIndex,

    /// `seq:{T}`
    sequence_key: String,

    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Entity, B: Backend + ?Sized> TypedStore<'a, T, B> {
    /// Typed store with the JSON codec and default key scheme
    pub fn new(backend: &'a mut B) -> Self {
        Self::with_parts(backend, JsonCodec, KeyScheme::default())
    }
}

impl<'a, T: Entity, B: Backend + ?Sized, C: Codec> TypedStore<'a, T, B, C> {
    /// Typed store with an explicit codec and key scheme
    pub fn with_parts(backend: &'a mut B, codec: C, keys: KeyScheme) -> Self {
        let index = IdIndex::new(keys.id_index_key_for::<T>());
        let sequence_key = keys.sequence_key_for::<T>();
        Self {
            backend,
            codec,
            keys,
            index,
            sequence_key,
            _marker: PhantomData,
        }
    }

    /// Swap the payload codec
    pub fn with_codec<C2: Codec>(self, codec: C2) -> TypedStore<'a, T, B, C2> {
        TypedStore::with_parts(self.backend, codec, self.keys)
    }

    /// Swap the key scheme
    pub fn with_key_scheme(self, keys: KeyScheme) -> Self {
        Self::with_parts(self.backend, self.codec, keys)
    }

    // =========================================================================
    // Key Accessors
    // =========================================================================

    /// Canonical key for an id of `T`
    pub fn urn_for_id(&self, id: impl fmt::Display) -> String {
        self.keys.urn_for::<T>(id)
    }

    /// Key of the per-type sequence counter
    pub fn sequence_key(&self) -> &str {
        &self.sequence_key
    }

    /// Key of the per-type id-index set
    pub fn id_index_key(&self) -> &str {
        self.index.key()
    }

    /// The underlying connection
    pub fn backend(&mut self) -> &mut B {
        &mut *self.backend
    }

    // =========================================================================
    // Key-Addressed Operations
    // =========================================================================

    /// Fetch and decode the value at `key`; `None` if absent
    pub fn get(&mut self, key: &str) -> Result<Option<T>> {
        let payload = self.backend.get(key)?;
        self.codec.decode_optional(payload.as_deref())
    }

    /// Track the value's id, then overwrite `key`
    pub fn set(&mut self, key: &str, value: &T) -> Result<()> {
        let (id, payload) = self.prepare_write(key, value)?;
        self.index.track(self.backend, &id)?;
        self.backend.set(key, &payload)
    }

    /// `set` followed by a relative expiry
    pub fn set_with_expiry(&mut self, key: &str, value: &T, expire_in: Duration) -> Result<()> {
        self.set(key, value)?;
        self.expire_in(key, expire_in)?;
        Ok(())
    }

    /// Track the value's id, then write only if `key` is absent.
    /// Returns true if the key was created.
    pub fn set_if_absent(&mut self, key: &str, value: &T) -> Result<bool> {
        let (id, payload) = self.prepare_write(key, value)?;
        self.index.track(self.backend, &id)?;
        let code = self.backend.set_if_not_exists(key, &payload)?;
        Ok(code == SUCCESS)
    }

    /// Atomically replace the value at `key`, returning the previous one
    pub fn get_and_set(&mut self, key: &str, value: &T) -> Result<Option<T>> {
        require_key(key)?;
        let payload = self.codec.encode(value)?;
        let previous = self.backend.get_and_set(key, &payload)?;
        self.codec.decode_optional(previous.as_deref())
    }

    /// True if `key` exists
    pub fn contains_key(&mut self, key: &str) -> Result<bool> {
        Ok(self.backend.exists(key)? == SUCCESS)
    }

    /// Delete one key; false if it did not exist
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.backend.delete(&[key.to_string()])? > 0)
    }

    /// Delete many keys; returns how many existed
    pub fn remove_keys(&mut self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.backend.delete(keys)?.max(0) as u64)
    }

    /// Untrack and delete many entities; returns how many payloads existed
    pub fn remove_entities(&mut self, entities: &[T]) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }

        let mut urns = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = entity_id(entity)?;
            self.index.untrack(self.backend, &id)?;
            urns.push(self.keys.urn_for::<T>(&id));
        }
        self.remove_keys(&urns)
    }

    // =========================================================================
    // Counters
    // =========================================================================

    pub fn increment(&mut self, key: &str) -> Result<i64> {
        self.backend.increment(key)
    }

    pub fn increment_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.backend.increment_by(key, delta)
    }

    pub fn decrement(&mut self, key: &str) -> Result<i64> {
        self.backend.decrement(key)
    }

    pub fn decrement_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.backend.decrement_by(key, delta)
    }

    /// Overwrite the per-type sequence
    pub fn set_sequence(&mut self, value: i64) -> Result<()> {
        self.backend
            .set(&self.sequence_key, value.to_string().as_bytes())
    }

    /// Allocate the next id from the per-type sequence (1 on first use)
    pub fn next_sequence(&mut self) -> Result<i64> {
        self.backend.increment(&self.sequence_key)
    }

    /// Advance the per-type sequence by `step` and return the new value
    pub fn next_sequence_by(&mut self, step: i64) -> Result<i64> {
        self.backend.increment_by(&self.sequence_key, step)
    }

    // =========================================================================
    // Expiry
    // =========================================================================

    /// Expire `key` after `duration` (rounded up to whole seconds).
    /// False if the key does not exist.
    pub fn expire_in(&mut self, key: &str, duration: Duration) -> Result<bool> {
        let seconds = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        Ok(self.backend.expire(key, seconds)? == SUCCESS)
    }

    /// Expire `key` at an absolute time. False if the key does not exist.
    pub fn expire_at(&mut self, key: &str, at: SystemTime) -> Result<bool> {
        let timestamp = at
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Ok(self.backend.expire_at(key, timestamp)? == SUCCESS)
    }

    /// Remaining time to live; `None` if the key is missing or never expires
    pub fn time_to_live(&mut self, key: &str) -> Result<Option<Duration>> {
        let seconds = self.backend.ttl(key)?;
        Ok(u64::try_from(seconds).ok().map(Duration::from_secs))
    }

    // =========================================================================
    // Bulk Reads
    // =========================================================================

    /// Decode every value whose key matches a glob pattern.
    ///
    /// A raw scan can match keys that hold something other than a `T` (the
    /// type's own sequence counter, for one). Those payloads are skipped.
    pub fn keys_matching(&mut self, pattern: &str) -> Result<Vec<T>> {
        let keys = self.backend.keys_matching(pattern)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let payloads = self.backend.multi_get(&keys)?;
        let mut found = Vec::with_capacity(payloads.len());
        for (key, payload) in keys.iter().zip(payloads) {
            let Some(payload) = payload else { continue };
            match self.codec.decode(&payload) {
                Ok(value) => found.push(value),
                Err(e) => tracing::debug!(
                    "{}: skipping {} matched by {}: {}",
                    T::type_name(),
                    key,
                    pattern,
                    e
                ),
            }
        }
        Ok(found)
    }

    /// Batched fetch. Absent keys are dropped, so the result can be shorter
    /// than `keys`; present values keep their relative order.
    pub fn multi_get(&mut self, keys: &[String]) -> Result<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let payloads = self.backend.multi_get(keys)?;
        let mut found = Vec::with_capacity(payloads.len());
        for payload in payloads.into_iter().flatten() {
            found.push(self.codec.decode(&payload)?);
        }
        Ok(found)
    }

    // =========================================================================
    // Id-Addressed Operations
    // =========================================================================

    pub fn get_by_id(&mut self, id: impl fmt::Display) -> Result<Option<T>> {
        let urn = self.keys.urn_for::<T>(id);
        self.get(&urn)
    }

    pub fn get_by_ids<I: fmt::Display>(&mut self, ids: &[I]) -> Result<Vec<T>> {
        let urns: Vec<String> = ids.iter().map(|id| self.keys.urn_for::<T>(id)).collect();
        self.multi_get(&urns)
    }

    /// Every live entity of `T` reachable from the id index
    pub fn get_all(&mut self) -> Result<Vec<T>> {
        let ids = self.index.all_tracked(self.backend)?;
        let entities = self.get_by_ids(&ids)?;

        if entities.len() < ids.len() {
            tracing::debug!(
                "{}: skipped {} indexed ids with no payload",
                T::type_name(),
                ids.len() - entities.len()
            );
        }
        Ok(entities)
    }

    /// Ids currently in the index (may include ids whose payload is gone)
    pub fn tracked_ids(&mut self) -> Result<Vec<String>> {
        self.index.all_tracked(self.backend)
    }

    /// Write an entity under its urn and track its id
    pub fn store(&mut self, entity: &T) -> Result<()> {
        let urn = self.keys.urn_for_entity(entity)?;
        self.set(&urn, entity)
    }

    /// `store` followed by a relative expiry on the payload
    pub fn store_with_expiry(&mut self, entity: &T, expire_in: Duration) -> Result<()> {
        let urn = self.keys.urn_for_entity(entity)?;
        self.set_with_expiry(&urn, entity, expire_in)
    }

    /// Store each entity in order; an empty slice makes no backend calls
    pub fn store_all(&mut self, entities: &[T]) -> Result<()> {
        for entity in entities {
            self.store(entity)?;
        }
        if !entities.is_empty() {
            tracing::debug!("{}: stored {} entities", T::type_name(), entities.len());
        }
        Ok(())
    }

    pub fn delete(&mut self, entity: &T) -> Result<()> {
        let id = entity_id(entity)?;
        self.delete_by_id(id)
    }

    /// Untrack the id, then remove its payload
    pub fn delete_by_id(&mut self, id: impl fmt::Display) -> Result<()> {
        let id = id.to_string();
        self.index.untrack(self.backend, &id)?;
        self.backend.delete(&[self.keys.urn_for::<T>(&id)])?;
        Ok(())
    }

    /// Untrack every id, then remove all payloads in one call.
    /// An empty slice makes no backend calls.
    pub fn delete_by_ids<I: fmt::Display>(&mut self, ids: &[I]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut urns = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.to_string();
            self.index.untrack(self.backend, &id)?;
            urns.push(self.keys.urn_for::<T>(&id));
        }
        self.backend.delete(&urns)?;
        Ok(())
    }

    /// Remove every tracked payload, then the index itself
    pub fn delete_all(&mut self) -> Result<()> {
        let ids = self.index.all_tracked(self.backend)?;
        if !ids.is_empty() {
            let urns: Vec<String> = ids.iter().map(|id| self.keys.urn_for::<T>(id)).collect();
            let removed = self.backend.delete(&urns)?;
            tracing::debug!(
                "{}: deleted {} of {} tracked entities",
                T::type_name(),
                removed,
                ids.len()
            );
        }
        self.index.clear(self.backend)
    }

    /// Drop index entries whose payload no longer exists (expired, or deleted
    /// through raw keys). Returns the number of ids pruned.
    pub fn prune_index(&mut self) -> Result<usize> {
        let ids = self.index.all_tracked(self.backend)?;

        let mut pruned = 0;
        for id in &ids {
            let urn = self.keys.urn_for::<T>(id);
            if self.backend.exists(&urn)? != SUCCESS {
                self.index.untrack(self.backend, id)?;
                pruned += 1;
            }
        }

        if pruned > 0 {
            tracing::debug!("{}: pruned {} orphaned ids", T::type_name(), pruned);
        }
        Ok(pruned)
    }

    // =========================================================================
    // Introspection / Administration
    // =========================================================================

    pub fn key_type(&mut self, key: &str) -> Result<KeyType> {
        self.backend.key_type(key)
    }

    pub fn random_key(&mut self) -> Result<Option<String>> {
        self.backend.random_key()
    }

    pub fn save(&mut self) -> Result<()> {
        self.backend.save()
    }

    pub fn save_async(&mut self) -> Result<()> {
        self.backend.save_async()
    }

    pub fn flush_db(&mut self) -> Result<()> {
        self.backend.flush_db()
    }

    pub fn flush_all(&mut self) -> Result<()> {
        self.backend.flush_all()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Validate and encode before touching the backend
    fn prepare_write(&self, key: &str, value: &T) -> Result<(String, Vec<u8>)> {
        require_key(key)?;
        let id = entity_id(value)?;
        let payload = self.codec.encode(value)?;
        Ok((id, payload))
    }
}

fn require_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(EntityKvError::InvalidArgument("key must not be empty".to_string()));
    }
    Ok(())
}
