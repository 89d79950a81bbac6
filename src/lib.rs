//! # EntityKV
//!
//! A typed entity store layered on a key-value store that only understands
//! byte strings, sets and a few atomic primitives:
//! - Get/set typed values by key or by entity id
//! - Enumerate "all stored entities of type T" through a per-type id index
//! - Per-type sequences for numeric ids
//! - Expiry and TTL inspection
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TypedStore<T>                              │
//! │        (CRUD, sequences, expiry, bulk reads)                 │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//!  ┌───────────┐     ┌─────────────┐    ┌─────────────┐
//!  │ KeyScheme │     │   IdIndex   │    │    Codec    │
//!  │ (urn/seq) │     │ (ids:{T})   │    │ (JSON/bin)  │
//!  └───────────┘     └──────┬──────┘    └─────────────┘
//!                           │
//!                           ▼
//!        ┌────────────────────────────────────────┐
//!        │          Backend (primitives)          │
//!        │   MemoryBackend  |  RemoteBackend ─TCP─┼──► Server
//!        └────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod keys;
pub mod backend;
pub mod index;
pub mod store;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EntityKvError, Result};
pub use config::Config;
pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use keys::{Entity, KeyScheme};
pub use backend::{Backend, KeyType, MemoryBackend};
pub use index::IdIndex;
pub use store::TypedStore;
pub use network::RemoteBackend;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of EntityKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
