//! Id-Index Maintainer
//!
//! Keeps the per-type set of stored ids (`ids:{Type}`) in step with stores
//! and deletes. The set is derived state: it can hold ids whose payload has
//! expired or been deleted behind the store's back, but every id the typed
//! store writes is tracked *before* its payload is written.

use crate::backend::Backend;
use crate::error::Result;

/// Handle on one type's id-index set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdIndex {
    key: String,
}

impl IdIndex {
    /// Index stored under `key`
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The backend key holding the set
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Add an id (one SADD)
    pub fn track<B: Backend + ?Sized>(&self, backend: &mut B, id: &str) -> Result<()> {
        backend.set_add(&self.key, id)
    }

    /// Remove an id (one SREM)
    pub fn untrack<B: Backend + ?Sized>(&self, backend: &mut B, id: &str) -> Result<()> {
        backend.set_remove(&self.key, id)
    }

    /// Every tracked id
    pub fn all_tracked<B: Backend + ?Sized>(&self, backend: &mut B) -> Result<Vec<String>> {
        backend.set_members(&self.key)
    }

    /// Drop the whole index
    pub fn clear<B: Backend + ?Sized>(&self, backend: &mut B) -> Result<()> {
        backend.delete(std::slice::from_ref(&self.key))?;
        Ok(())
    }
}
