//! Channel messages exchanged between the engine and the sync backend.
//!
//! Category fields are carried as plain strings: the backend may name
//! categories this build does not know, and such messages must be ignored
//! rather than fail to decode.

use serde::{Deserialize, Serialize};

use crate::{
    Category, DeviceId, Seed, ServerCategory, SyncError, SyncRecord, TransportValue, Watermark,
};

/// All messages that cross the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelMessage {
    /// Backend asks for stored identity (bootstrap step 1).
    GetInitData,
    /// Engine answers with stored identity and backend config.
    GotInitData(GotInitData),
    /// Backend hands over identity to persist.
    SaveInitData(SaveInitData),
    /// Backend is ready; the engine starts.
    Ready(Ready),
    /// Push locally built records.
    SendRecords(SendRecords),
    /// Delete a whole category on the backend.
    DeleteCategory(DeleteCategory),
    /// Ask for records newer than a watermark.
    FetchRecords(FetchRecords),
    /// Backend asks for the local counterparts of remote records.
    GetExistingObjects(GetExistingObjects),
    /// Engine answers with (record, local counterpart) pairs.
    ResolveRecords(ResolveRecords),
    /// Backend's final records, to apply locally.
    ResolvedRecords(ResolvedRecords),
    /// Backend failed to set up.
    SyncSetupError(SyncNotice),
    /// Backend diagnostic output.
    SyncDebug(SyncNotice),
}

impl ChannelMessage {
    /// Serialize to a MessagePack frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        rmp_serde::to_vec_named(self).map_err(SyncError::Serialization)
    }

    /// Deserialize from a MessagePack frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        rmp_serde::from_slice(bytes).map_err(SyncError::Deserialization)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelMessage::GetInitData => "GET_INIT_DATA",
            ChannelMessage::GotInitData(_) => "GOT_INIT_DATA",
            ChannelMessage::SaveInitData(_) => "SAVE_INIT_DATA",
            ChannelMessage::Ready(_) => "READY",
            ChannelMessage::SendRecords(_) => "SEND_RECORDS",
            ChannelMessage::DeleteCategory(_) => "DELETE_CATEGORY",
            ChannelMessage::FetchRecords(_) => "FETCH_RECORDS",
            ChannelMessage::GetExistingObjects(_) => "GET_EXISTING_OBJECTS",
            ChannelMessage::ResolveRecords(_) => "RESOLVE_RECORDS",
            ChannelMessage::ResolvedRecords(_) => "RESOLVED_RECORDS",
            ChannelMessage::SyncSetupError(_) => "SYNC_SETUP_ERROR",
            ChannelMessage::SyncDebug(_) => "SYNC_DEBUG",
        }
    }
}

/// Backend settings forwarded to the sync backend at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfig {
    /// Backend API version.
    pub api_version: String,
    /// Backend server URL, if not the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// Verbose backend diagnostics.
    #[serde(default)]
    pub debug: bool,
}

/// Stored identity plus backend config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GotInitData {
    /// Stored seed, if any.
    pub seed: Option<Seed>,
    /// Stored device id, if any.
    pub device_id: Option<DeviceId>,
    /// Backend config.
    pub config: InitConfig,
}

/// Identity the backend wants persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveInitData {
    /// Sync chain seed.
    pub seed: Seed,
    /// This installation's device id.
    pub device_id: DeviceId,
}

/// Backend readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ready {
    /// True when this installation has just joined the chain.
    pub is_first_run: bool,
}

/// Locally built records for one server category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRecords {
    /// Server category name.
    pub category: String,
    /// Records to push.
    pub records: Vec<SyncRecord>,
}

impl SendRecords {
    /// Create a send request.
    pub fn new(category: ServerCategory, records: Vec<SyncRecord>) -> Self {
        Self {
            category: category.as_str().to_string(),
            records,
        }
    }
}

/// Bulk delete of one record-level category.
///
/// Carries the record-level name, since `PREFERENCES` holds both site
/// settings and devices and only the former may be cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCategory {
    /// Record-level category name.
    pub category: String,
}

impl DeleteCategory {
    /// Create a delete request.
    pub fn new(category: Category) -> Self {
        Self {
            category: category.as_str().to_string(),
        }
    }
}

/// Pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRecords {
    /// Server category names to fetch.
    pub categories: Vec<String>,
    /// Return records newer than this.
    pub since: Watermark,
}

impl FetchRecords {
    /// Create a fetch request.
    pub fn new(categories: &[ServerCategory], since: Watermark) -> Self {
        Self {
            categories: categories.iter().map(|c| c.as_str().to_string()).collect(),
            since,
        }
    }
}

/// Remote records whose local counterparts the backend needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetExistingObjects {
    /// Server category name.
    pub category: String,
    /// Remote records.
    pub records: Vec<SyncRecord>,
}

/// A remote record next to its local counterpart, both transport-safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvePair {
    /// The remote record.
    pub record: TransportValue,
    /// The local object as a record, if one exists.
    pub existing: Option<TransportValue>,
}

/// Answer to [`GetExistingObjects`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRecords {
    /// Server category name.
    pub category: String,
    /// One pair per requested record, in request order.
    pub pairs: Vec<ResolvePair>,
}

/// Records the backend decided on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecords {
    /// Server category name.
    pub category: String,
    /// Records to apply locally.
    pub records: Vec<SyncRecord>,
}

/// Free-form text from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNotice {
    /// Message text.
    pub message: String,
}
