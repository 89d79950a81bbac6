//! Entity payload codecs
//!
//! Turn a typed value into the byte string stored under its key, and back.
//!
//! - [`JsonCodec`] (default): JSON text, UTF-8 encoded
//! - [`BincodeCodec`]: compact binary, for payloads no one reads by hand
//!
//! Both satisfy `decode(encode(v)) == v`. Decode failures are always
//! returned to the caller.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EntityKvError, Result};

/// Converts typed values to payload bytes and back
pub trait Codec {
    /// Encode a value into payload bytes
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode payload bytes into a value
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;

    /// Decode a payload that may be absent; absence decodes to `None`
    fn decode_optional<T: DeserializeOwned>(&self, bytes: Option<&[u8]>) -> Result<Option<T>> {
        bytes.map(|b| self.decode(b)).transpose()
    }
}

/// JSON text codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let text = serde_json::to_string(value).map_err(|e| EntityKvError::Encode(e.to_string()))?;
        Ok(text.into_bytes())
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| EntityKvError::Decode(format!("payload is not UTF-8: {}", e)))?;
        serde_json::from_str(text).map_err(|e| EntityKvError::Decode(e.to_string()))
    }
}

/// Binary codec backed by bincode
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| EntityKvError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| EntityKvError::Decode(e.to_string()))
    }
}
