//! Sync records: the write-once unit exchanged with the backend.

use serde::{Deserialize, Serialize};

use crate::{Category, DeviceId, ObjectId, SyncError};

/// What a record does to its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum RecordAction {
    /// The object is new.
    Create = 0,
    /// The object changed.
    Update = 1,
    /// The object was removed.
    Delete = 2,
}

impl From<RecordAction> for u8 {
    fn from(action: RecordAction) -> Self {
        action as u8
    }
}

impl TryFrom<u8> for RecordAction {
    type Error = SyncError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RecordAction::Create),
            1 => Ok(RecordAction::Update),
            2 => Ok(RecordAction::Delete),
            _ => Err(SyncError::InvalidAction(value)),
        }
    }
}

/// Page fields shared by bookmark and history records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteFields {
    /// Page URL.
    pub location: String,
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// User-supplied title, if renamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_title: Option<String>,
    /// Favicon URL (bookmarks only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// Last visit, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_time: Option<u64>,
    /// Creation time, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<u64>,
}

/// A bookmark or bookmark folder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkPayload {
    /// The bookmarked page.
    pub site: SiteFields,
    /// Whether this is a folder rather than a page.
    #[serde(default)]
    pub is_folder: bool,
    /// Folder id (folders only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<i64>,
    /// Id of the containing folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<i64>,
}

/// Per-site preferences, with enum fields in their integer wire form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettingPayload {
    /// Host pattern the settings apply to.
    pub host_pattern: String,
    /// Page zoom level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_level: Option<f64>,
    /// Shields on or off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shields_up: Option<bool>,
    /// Ad control code (0..=2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_control: Option<u8>,
    /// Cookie control code (0..=1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_control: Option<u8>,
    /// Safe browsing on or off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_browsing: Option<bool>,
    /// Script blocking on or off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_script: Option<bool>,
    /// HTTPS upgrade on or off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_everywhere: Option<bool>,
    /// Fingerprinting protection on or off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprinting_protection: Option<bool>,
    /// Whether the site takes part in payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_payments: Option<bool>,
    /// Whether the site is shown in the payments table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_payments_shown: Option<bool>,
}

/// A device in the sync chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePayload {
    /// Human-readable device name.
    pub name: String,
}

/// Record body, keyed on the wire by its category name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordPayload {
    /// Bookmark or bookmark folder.
    Bookmark(BookmarkPayload),
    /// History entry.
    HistorySite(SiteFields),
    /// Per-site preferences.
    SiteSetting(SiteSettingPayload),
    /// Device name.
    Device(DevicePayload),
}

impl RecordPayload {
    /// The category implied by this payload.
    pub fn category(&self) -> Category {
        match self {
            RecordPayload::Bookmark(_) => Category::Bookmark,
            RecordPayload::HistorySite(_) => Category::HistorySite,
            RecordPayload::SiteSetting(_) => Category::SiteSetting,
            RecordPayload::Device(_) => Category::Device,
        }
    }
}

/// One create/update/delete of one object.
///
/// Wire shape: `{action, deviceId, objectId, <category>: payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// What happened to the object.
    pub action: RecordAction,
    /// Device that produced the record.
    pub device_id: DeviceId,
    /// Cross-device id of the object.
    pub object_id: ObjectId,
    /// Category-specific body.
    #[serde(flatten)]
    pub payload: RecordPayload,
}

impl SyncRecord {
    /// Create a new record.
    pub fn new(
        action: RecordAction,
        device_id: DeviceId,
        object_id: ObjectId,
        payload: RecordPayload,
    ) -> Self {
        Self {
            action,
            device_id,
            object_id,
            payload,
        }
    }

    /// The category of this record.
    pub fn category(&self) -> Category {
        self.payload.category()
    }
}
