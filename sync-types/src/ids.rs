//! Identity and ordering types for sitesync.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an [`ObjectId`] in bytes.
pub const OBJECT_ID_LEN: usize = 16;

/// Length of a freshly generated [`Seed`] in bytes.
pub const SEED_LEN: usize = 32;

/// A stable cross-device identifier for one synced object.
///
/// 16 bytes of random data. Assigned at most once per local object and
/// used as the only dedupe/merge key between devices.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Create a new random ObjectId.
    pub fn random() -> Self {
        let mut bytes = [0u8; OBJECT_ID_LEN];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    /// Create an ObjectId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; OBJECT_ID_LEN]>::try_from(bytes).ok().map(Self)
    }

    /// Get the raw bytes of this ObjectId.
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_string()[..8])
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = deserializer.deserialize_bytes(ByteVisitor)?;
        Self::from_bytes(&bytes)
            .ok_or_else(|| de::Error::invalid_length(bytes.len(), &"16 bytes"))
    }
}

/// Identifier of this installation in the sync chain.
///
/// An opaque byte sequence handed out by the backend during the bootstrap
/// handshake. Attached to every outbound record.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(Vec<u8>);

impl DeviceId {
    /// Create a DeviceId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Get the raw bytes of this DeviceId.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self)
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_bytes(ByteVisitor).map(Self)
    }
}

/// The sync chain seed.
///
/// Generated by the sync backend and persisted by the engine. Zeroed on
/// drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed(Vec<u8>);

impl Seed {
    /// Create a new random seed of [`SEED_LEN`] bytes.
    pub fn random() -> Self {
        let mut bytes = vec![0u8; SEED_LEN];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    /// Create a Seed from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Get the raw bytes of this Seed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed([{} bytes REDACTED])", self.0.len())
    }
}

impl Serialize for Seed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_bytes(ByteVisitor).map(Self)
    }
}

/// The last fetch boundary requested from the backend, in Unix seconds.
///
/// Only the poll scheduler moves it. It is a wall-clock value, so it can go
/// backwards if the local clock does.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Watermark(u64);

impl Watermark {
    /// Create a new Watermark at the given Unix timestamp (seconds).
    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the timestamp of this Watermark.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// A Watermark that fetches everything the backend has.
    pub fn zero() -> Self {
        Self(0)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Watermark({})", self.0)
    }
}

/// Accepts a binary buffer or a plain sequence of integers.
///
/// Records that went through the transport-safe conversion carry their
/// byte ids as integer sequences, so both shapes must decode.
struct ByteVisitor;

impl<'de> Visitor<'de> for ByteVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a byte buffer or a sequence of byte values")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(bytes)
    }
}
