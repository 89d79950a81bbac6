//! Key / Identity Derivation
//!
//! Maps a typed entity (or a type plus an id) to the canonical keys it lives
//! under in the backing store.
//!
//! ## Key Layout (default scheme)
//! ```text
//! urn:{TypeName}:{id}    payload of one entity
//! seq:{TypeName}         integer sequence counter
//! ids:{TypeName}         set of ids currently stored for the type
//! ```
//!
//! Derivation is pure: same scheme, type and id always give the same key.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EntityKvError, Result};

/// A value that can be stored by a [`TypedStore`](crate::store::TypedStore)
///
/// The only structural requirement is a string-convertible identity.
pub trait Entity: Serialize + DeserializeOwned {
    /// Identity type; rendered with `Display` when building keys
    type Id: fmt::Display;

    /// The entity's identity
    fn id(&self) -> Self::Id;

    /// Name used in derived keys. Two types with different names never share
    /// keys. Defaults to the unqualified Rust type name.
    fn type_name() -> &'static str
    where
        Self: Sized,
    {
        short_type_name::<Self>()
    }
}

/// Unqualified type name, without module path or generic arguments
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Prefixes used for derived keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    urn_prefix: String,
    sequence_prefix: String,
    id_index_prefix: String,
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self::new("urn", "seq", "ids")
    }
}

impl KeyScheme {
    /// Separator between key segments
    pub const SEPARATOR: char = ':';

    /// Create a scheme with custom prefixes
    pub fn new(
        urn_prefix: impl Into<String>,
        sequence_prefix: impl Into<String>,
        id_index_prefix: impl Into<String>,
    ) -> Self {
        Self {
            urn_prefix: urn_prefix.into(),
            sequence_prefix: sequence_prefix.into(),
            id_index_prefix: id_index_prefix.into(),
        }
    }

    /// `urn:{type}:{id}`
    pub fn urn_for<T: Entity>(&self, id: impl fmt::Display) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.urn_prefix,
            T::type_name(),
            id,
            sep = Self::SEPARATOR
        )
    }

    /// Urn of an entity, failing fast if it has no id
    pub fn urn_for_entity<T: Entity>(&self, entity: &T) -> Result<String> {
        let id = entity_id(entity)?;
        Ok(self.urn_for::<T>(id))
    }

    /// `seq:{type}`
    pub fn sequence_key_for<T: Entity>(&self) -> String {
        format!("{}{}{}", self.sequence_prefix, Self::SEPARATOR, T::type_name())
    }

    /// `ids:{type}`
    pub fn id_index_key_for<T: Entity>(&self) -> String {
        format!("{}{}{}", self.id_index_prefix, Self::SEPARATOR, T::type_name())
    }

    /// Sequence key for a type known only by name (CLI use)
    pub fn sequence_key_for_name(&self, type_name: &str) -> String {
        format!("{}{}{}", self.sequence_prefix, Self::SEPARATOR, type_name)
    }

    /// Id-index key for a type known only by name (CLI use)
    pub fn id_index_key_for_name(&self, type_name: &str) -> String {
        format!("{}{}{}", self.id_index_prefix, Self::SEPARATOR, type_name)
    }
}

/// Render an entity's id, rejecting empty ids
pub fn entity_id<T: Entity>(entity: &T) -> Result<String> {
    let id = entity.id().to_string();
    if id.is_empty() {
        return Err(EntityKvError::MissingId {
            type_name: T::type_name(),
        });
    }
    Ok(id)
}
