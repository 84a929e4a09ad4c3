//! Record building.
//!
//! Turns local objects into [`SyncRecord`]s and mutation events into the
//! steps the dispatcher must take. Filtering happens here: objects outside
//! the synced schema build to `None` and are dropped by the caller.

use sitesync_types::{
    BookmarkPayload, Category, DeviceId, DevicePayload, ObjectId, RecordAction, RecordPayload,
    SiteFields, SiteSettingPayload, SyncRecord,
};
use thiserror::Error;

use crate::model::{LocalObject, Mutation, ObjectPath, Site, SiteSettings, SiteTag};

/// Errors building a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A local enum string has no wire code.
    #[error("unknown {field} value: {value}")]
    UnknownEnumValue {
        /// Field name.
        field: &'static str,
        /// The unrecognized string.
        value: String,
    },

    /// The object has no object id.
    #[error("object has no object id")]
    MissingObjectId,
}

/// Ad handling for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdControl {
    /// `showBraveAds`, code 0.
    ShowBraveAds,
    /// `blockAds`, code 1.
    BlockAds,
    /// `allowAdsAndTracking`, code 2.
    AllowAdsAndTracking,
}

impl AdControl {
    /// Parse the local string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "showBraveAds" => Some(AdControl::ShowBraveAds),
            "blockAds" => Some(AdControl::BlockAds),
            "allowAdsAndTracking" => Some(AdControl::AllowAdsAndTracking),
            _ => None,
        }
    }

    /// Map a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AdControl::ShowBraveAds),
            1 => Some(AdControl::BlockAds),
            2 => Some(AdControl::AllowAdsAndTracking),
            _ => None,
        }
    }

    /// The local string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdControl::ShowBraveAds => "showBraveAds",
            AdControl::BlockAds => "blockAds",
            AdControl::AllowAdsAndTracking => "allowAdsAndTracking",
        }
    }

    /// The wire code.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Cookie handling for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieControl {
    /// `block3rdPartyCookie`, code 0.
    Block3rdPartyCookie,
    /// `allowAllCookies`, code 1.
    AllowAllCookies,
}

impl CookieControl {
    /// Parse the local string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "block3rdPartyCookie" => Some(CookieControl::Block3rdPartyCookie),
            "allowAllCookies" => Some(CookieControl::AllowAllCookies),
            _ => None,
        }
    }

    /// Map a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CookieControl::Block3rdPartyCookie),
            1 => Some(CookieControl::AllowAllCookies),
            _ => None,
        }
    }

    /// The local string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            CookieControl::Block3rdPartyCookie => "block3rdPartyCookie",
            CookieControl::AllowAllCookies => "allowAllCookies",
        }
    }

    /// The wire code.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// What the dispatcher must do for one mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Build a record from the object currently at `path`.
    Live {
        /// Record action.
        action: RecordAction,
        /// Object to read.
        path: ObjectPath,
    },
    /// Build a DELETE record from an object no longer held locally.
    Removed(LocalObject),
    /// Delete a whole record-level category.
    DeleteCategory(Category),
}

/// Map a mutation to its step.
pub fn plan(mutation: &Mutation) -> Step {
    match mutation {
        Mutation::AddSite { index } => Step::Live {
            action: RecordAction::Create,
            path: ObjectPath::Site(*index),
        },
        Mutation::UpdateSite { index } => Step::Live {
            action: RecordAction::Update,
            path: ObjectPath::Site(*index),
        },
        Mutation::RemoveSite { site } => Step::Removed(LocalObject::Site(site.clone())),
        Mutation::AddSiteSetting { host_pattern } => Step::Live {
            action: RecordAction::Create,
            path: ObjectPath::SiteSetting(host_pattern.clone()),
        },
        Mutation::UpdateSiteSetting { host_pattern } => Step::Live {
            action: RecordAction::Update,
            path: ObjectPath::SiteSetting(host_pattern.clone()),
        },
        Mutation::RemoveSiteSetting {
            host_pattern,
            settings,
        } => Step::Removed(LocalObject::SiteSetting {
            host_pattern: host_pattern.clone(),
            settings: settings.clone(),
        }),
        Mutation::ClearHistory => Step::DeleteCategory(Category::HistorySite),
        Mutation::ClearSiteSettings => Step::DeleteCategory(Category::SiteSetting),
    }
}

/// The category a site syncs under, or `None` if it does not sync.
///
/// Untagged sites are history; sites tagged as bookmarks or folders are
/// bookmarks; anything else stays local.
pub fn site_category(site: &Site) -> Option<Category> {
    if site.has_tag(SiteTag::Bookmark) || site.has_tag(SiteTag::BookmarkFolder) {
        Some(Category::Bookmark)
    } else if site.tags.is_empty() {
        Some(Category::HistorySite)
    } else {
        None
    }
}

/// Whether `object` syncs under `category`.
pub fn is_syncable(category: Category, object: &LocalObject) -> bool {
    match object {
        LocalObject::Site(site) => site_category(site) == Some(category),
        LocalObject::SiteSetting { settings, .. } => {
            category == Category::SiteSetting && settings.has_synced_fields()
        }
        LocalObject::Device(_) => category == Category::Device,
    }
}

/// Builds records stamped with this device's id.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    device_id: DeviceId,
}

impl RecordBuilder {
    /// Create a builder for `device_id`.
    pub fn new(device_id: DeviceId) -> Self {
        Self { device_id }
    }

    /// The device id stamped on every record.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Build a record for any local object.
    pub fn build(
        &self,
        action: RecordAction,
        object: &LocalObject,
    ) -> Result<Option<SyncRecord>, BuildError> {
        match object {
            LocalObject::Site(site) => self.build_site(action, site),
            LocalObject::SiteSetting {
                host_pattern,
                settings,
            } => self.build_site_setting(action, host_pattern, settings),
            LocalObject::Device(device) => Ok(Some(self.record(
                action,
                device.object_id,
                RecordPayload::Device(DevicePayload {
                    name: device.name.clone(),
                }),
            ))),
        }
    }

    /// Build a bookmark or history record, or `None` if the site does not sync.
    pub fn build_site(
        &self,
        action: RecordAction,
        site: &Site,
    ) -> Result<Option<SyncRecord>, BuildError> {
        let Some(category) = site_category(site) else {
            return Ok(None);
        };
        let object_id = site.object_id.ok_or(BuildError::MissingObjectId)?;

        let payload = match category {
            Category::Bookmark => RecordPayload::Bookmark(BookmarkPayload {
                site: SiteFields {
                    location: site.location.clone(),
                    title: site.title.clone(),
                    custom_title: site.custom_title.clone(),
                    favicon: site.favicon.clone(),
                    last_accessed_time: site.last_accessed_time,
                    creation_time: site.creation_time,
                },
                is_folder: site.has_tag(SiteTag::BookmarkFolder),
                folder_id: site.folder_id,
                parent_folder_id: site.parent_folder_id,
            }),
            _ => RecordPayload::HistorySite(SiteFields {
                location: site.location.clone(),
                title: site.title.clone(),
                custom_title: site.custom_title.clone(),
                favicon: None,
                last_accessed_time: site.last_accessed_time,
                creation_time: site.creation_time,
            }),
        };

        Ok(Some(self.record(action, object_id, payload)))
    }

    /// Build a site-setting record, or `None` if no synced field is set.
    pub fn build_site_setting(
        &self,
        action: RecordAction,
        host_pattern: &str,
        settings: &SiteSettings,
    ) -> Result<Option<SyncRecord>, BuildError> {
        if !settings.has_synced_fields() {
            return Ok(None);
        }
        let object_id = settings.object_id.ok_or(BuildError::MissingObjectId)?;

        let ad_control = settings
            .ad_control
            .as_deref()
            .map(|value| {
                AdControl::parse(value)
                    .map(|v| v.code())
                    .ok_or_else(|| BuildError::UnknownEnumValue {
                        field: "adControl",
                        value: value.to_string(),
                    })
            })
            .transpose()?;
        let cookie_control = settings
            .cookie_control
            .as_deref()
            .map(|value| {
                CookieControl::parse(value)
                    .map(|v| v.code())
                    .ok_or_else(|| BuildError::UnknownEnumValue {
                        field: "cookieControl",
                        value: value.to_string(),
                    })
            })
            .transpose()?;

        let payload = SiteSettingPayload {
            host_pattern: host_pattern.to_string(),
            zoom_level: settings.zoom_level,
            shields_up: settings.shields_up,
            ad_control,
            cookie_control,
            safe_browsing: settings.safe_browsing,
            no_script: settings.no_script,
            https_everywhere: settings.https_everywhere,
            fingerprinting_protection: settings.fingerprinting_protection,
            ledger_payments: settings.ledger_payments,
            ledger_payments_shown: settings.ledger_payments_shown,
        };

        Ok(Some(self.record(
            action,
            object_id,
            RecordPayload::SiteSetting(payload),
        )))
    }

    /// Build the CREATE record announcing this device.
    pub fn build_device(&self, object_id: ObjectId, name: &str) -> SyncRecord {
        self.record(
            RecordAction::Create,
            object_id,
            RecordPayload::Device(DevicePayload {
                name: name.to_string(),
            }),
        )
    }

    fn record(
        &self,
        action: RecordAction,
        object_id: ObjectId,
        payload: RecordPayload,
    ) -> SyncRecord {
        SyncRecord::new(action, self.device_id.clone(), object_id, payload)
    }
}
