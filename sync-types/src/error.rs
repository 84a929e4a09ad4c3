//! Error types for sitesync wire types.

use thiserror::Error;

/// Errors that can occur encoding or decoding sitesync wire types.
#[derive(Debug, Error)]
pub enum SyncError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Invalid record action code
    #[error("invalid record action: {0}")]
    InvalidAction(u8),

    /// Category name not known to this build
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    /// Transport-safe value conversion failed
    #[error("transport value error: {0}")]
    TransportValue(String),
}
