use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Serialize to deterministic bincode bytes
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    bincode::serialize(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Deserialize from bincode bytes
pub fn from_bytes<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CoreError> {
    bincode::deserialize(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
}

/// Encode a value as the hex string of its bincode bytes.
///
/// This is the form a block travels in inside a request message.
pub fn to_hex_blob<T: Serialize>(value: &T) -> Result<String, CoreError> {
    Ok(hex::encode(to_bytes(value)?))
}

/// Decode a value from a hex-encoded bincode blob
pub fn from_hex_blob<T: DeserializeOwned>(blob: &str) -> Result<T, CoreError> {
    let bytes = hex::decode(blob)?;
    from_bytes(&bytes)
}
