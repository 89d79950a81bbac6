//! Tests for the id index
//!
//! These tests verify:
//! - IdIndex track / untrack / clear
//! - Ids are tracked before payloads are written
//! - Phantom ids are skipped by get_all and removed by prune_index

use entitykv::backend::{Backend, KeyType, MemoryBackend};
use entitykv::index::IdIndex;
use entitykv::keys::Entity;
use entitykv::store::TypedStore;
use entitykv::{EntityKvError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Widget {
    id: String,
    name: String,
}

impl Entity for Widget {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Delegates to a MemoryBackend but fails every SET
struct FailingWrites {
    inner: MemoryBackend,
}

impl Backend for FailingWrites {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&mut self, _key: &str, _value: &[u8]) -> Result<()> {
        Err(EntityKvError::Network("connection reset".to_string()))
    }

    fn set_if_not_exists(&mut self, key: &str, value: &[u8]) -> Result<i64> {
        self.inner.set_if_not_exists(key, value)
    }

    fn get_and_set(&mut self, key: &str, value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get_and_set(key, value)
    }

    fn exists(&mut self, key: &str) -> Result<i64> {
        self.inner.exists(key)
    }

    fn delete(&mut self, keys: &[String]) -> Result<i64> {
        self.inner.delete(keys)
    }

    fn increment_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.inner.increment_by(key, delta)
    }

    fn decrement_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.inner.decrement_by(key, delta)
    }

    fn expire(&mut self, key: &str, seconds: i64) -> Result<i64> {
        self.inner.expire(key, seconds)
    }

    fn expire_at(&mut self, key: &str, unix_timestamp: i64) -> Result<i64> {
        self.inner.expire_at(key, unix_timestamp)
    }

    fn ttl(&mut self, key: &str) -> Result<i64> {
        self.inner.ttl(key)
    }

    fn keys_matching(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys_matching(pattern)
    }

    fn multi_get(&mut self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.inner.multi_get(keys)
    }

    fn set_add(&mut self, set_key: &str, member: &str) -> Result<()> {
        self.inner.set_add(set_key, member)
    }

    fn set_remove(&mut self, set_key: &str, member: &str) -> Result<()> {
        self.inner.set_remove(set_key, member)
    }

    fn set_members(&mut self, set_key: &str) -> Result<Vec<String>> {
        self.inner.set_members(set_key)
    }

    fn key_type(&mut self, key: &str) -> Result<KeyType> {
        self.inner.key_type(key)
    }

    fn random_key(&mut self) -> Result<Option<String>> {
        self.inner.random_key()
    }

    fn save(&mut self) -> Result<()> {
        self.inner.save()
    }

    fn save_async(&mut self) -> Result<()> {
        self.inner.save_async()
    }

    fn flush_db(&mut self) -> Result<()> {
        self.inner.flush_db()
    }

    fn flush_all(&mut self) -> Result<()> {
        self.inner.flush_all()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn widget(id: &str) -> Widget {
    Widget {
        id: id.to_string(),
        name: format!("widget-{}", id),
    }
}

// =============================================================================
// IdIndex Tests
// =============================================================================

#[test]
fn test_track_and_untrack() {
    let mut backend = MemoryBackend::new();
    let index = IdIndex::new("ids:Thing");

    index.track(&mut backend, "a").unwrap();
    index.track(&mut backend, "b").unwrap();
    index.track(&mut backend, "a").unwrap();
    assert_eq!(
        index.all_tracked(&mut backend).unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );

    index.untrack(&mut backend, "a").unwrap();
    index.untrack(&mut backend, "never-tracked").unwrap();
    assert_eq!(index.all_tracked(&mut backend).unwrap(), vec!["b".to_string()]);
}

#[test]
fn test_clear_removes_set() {
    let mut backend = MemoryBackend::new();
    let index = IdIndex::new("ids:Thing");
    index.track(&mut backend, "a").unwrap();

    index.clear(&mut backend).unwrap();

    assert!(index.all_tracked(&mut backend).unwrap().is_empty());
    assert_eq!(backend.exists(index.key()).unwrap(), 0);
}

#[test]
fn test_untracking_last_id_removes_set() {
    let mut backend = MemoryBackend::new();
    let index = IdIndex::new("ids:Thing");
    index.track(&mut backend, "only").unwrap();

    index.untrack(&mut backend, "only").unwrap();

    assert_eq!(backend.key_type("ids:Thing").unwrap(), KeyType::None);
}

#[test]
fn test_indexes_are_independent() {
    let mut backend = MemoryBackend::new();
    let widgets = IdIndex::new("ids:Widget");
    let gadgets = IdIndex::new("ids:Gadget");

    widgets.track(&mut backend, "1").unwrap();

    assert!(gadgets.all_tracked(&mut backend).unwrap().is_empty());
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_id_tracked_even_when_payload_write_fails() {
    let mut backend = FailingWrites {
        inner: MemoryBackend::new(),
    };
    let mut widgets: TypedStore<'_, Widget, FailingWrites> = TypedStore::new(&mut backend);

    let err = widgets.store(&widget("1")).unwrap_err();
    assert!(matches!(err, EntityKvError::Network(_)));

    assert_eq!(widgets.tracked_ids().unwrap(), vec!["1".to_string()]);
    assert_eq!(widgets.get_by_id("1").unwrap(), None);
    assert!(widgets.get_all().unwrap().is_empty());
}

#[test]
fn test_delete_untracks_before_removing_payload() {
    let mut backend = MemoryBackend::new();
    let mut widgets = backend.typed::<Widget>();
    widgets.store(&widget("1")).unwrap();

    widgets.delete_by_id("1").unwrap();

    assert!(widgets.tracked_ids().unwrap().is_empty());
    assert_eq!(widgets.backend().exists("urn:Widget:1").unwrap(), 0);
}

// =============================================================================
// Drift / Prune Tests
// =============================================================================

#[test]
fn test_get_all_skips_phantom_ids() {
    let mut backend = MemoryBackend::new();
    let mut widgets = backend.typed::<Widget>();
    widgets.store_all(&[widget("1"), widget("2")]).unwrap();

    // Payload removed behind the store's back
    widgets.remove("urn:Widget:2").unwrap();

    assert_eq!(widgets.get_all().unwrap(), vec![widget("1")]);
    assert_eq!(widgets.tracked_ids().unwrap().len(), 2);
}

#[test]
fn test_prune_index_removes_phantom_ids() {
    let mut backend = MemoryBackend::new();
    let mut widgets = backend.typed::<Widget>();
    widgets
        .store_all(&[widget("1"), widget("2"), widget("3")])
        .unwrap();
    widgets.remove("urn:Widget:1").unwrap();
    widgets.remove("urn:Widget:3").unwrap();

    assert_eq!(widgets.prune_index().unwrap(), 2);
    assert_eq!(widgets.tracked_ids().unwrap(), vec!["2".to_string()]);
    assert_eq!(widgets.prune_index().unwrap(), 0);
}

#[test]
fn test_prune_after_failed_write() {
    let mut backend = FailingWrites {
        inner: MemoryBackend::new(),
    };
    let mut widgets: TypedStore<'_, Widget, FailingWrites> = TypedStore::new(&mut backend);
    assert!(widgets.store(&widget("1")).is_err());

    assert_eq!(widgets.prune_index().unwrap(), 1);
    assert!(widgets.tracked_ids().unwrap().is_empty());
}

#[test]
fn test_prune_on_empty_index() {
    let mut backend = MemoryBackend::new();
    let mut widgets = backend.typed::<Widget>();

    assert_eq!(widgets.prune_index().unwrap(), 0);
}
