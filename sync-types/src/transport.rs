//! Transport-safe values.
//!
//! The channel to the sync backend cannot carry raw binary. Values that cross
//! it are held as MessagePack values in which every binary buffer has been
//! replaced by the plain sequence of its byte values.

use rmpv::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::SyncError;

/// A value that is safe to hand to the channel.
///
/// Construction always applies [`make_transport_safe`], so a
/// `TransportValue` never contains [`Value::Binary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportValue(Value);

impl TransportValue {
    /// Serialize `value` into transport-safe form.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, SyncError> {
        let bytes = rmp_serde::to_vec_named(value).map_err(SyncError::Serialization)?;
        let raw = rmpv::decode::read_value(&mut bytes.as_slice())
            .map_err(|e| SyncError::TransportValue(e.to_string()))?;
        Ok(Self(make_transport_safe(raw)))
    }

    /// Wrap an existing value, converting any binary it contains.
    pub fn from_value(value: Value) -> Self {
        Self(make_transport_safe(value))
    }

    /// Decode back into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &self.0)
            .map_err(|e| SyncError::TransportValue(e.to_string()))?;
        rmp_serde::from_slice(&bytes).map_err(SyncError::Deserialization)
    }

    /// Borrow the underlying value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Recursively replace binary buffers with integer sequences.
///
/// Idempotent: a value without binary buffers is returned unchanged.
pub fn make_transport_safe(value: Value) -> Value {
    match value {
        Value::Binary(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
        Value::Array(items) => Value::Array(items.into_iter().map(make_transport_safe).collect()),
        Value::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (make_transport_safe(k), make_transport_safe(v)))
                .collect(),
        ),
        other => other,
    }
}
