//! Local domain model.
//!
//! These are the browser-side objects the engine reads and asks the owning
//! application to update. They are not wire types: a [`Site`] carries tags
//! and a [`SiteSettings`] carries local-only fields that never sync.

use serde::{Deserialize, Serialize};
use sitesync_types::{DeviceId, ObjectId};

/// A tag on a site entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteTag {
    /// A bookmarked page.
    Bookmark,
    /// A bookmark folder.
    BookmarkFolder,
    /// Any tag the engine does not sync (reading list, pinned, ...).
    #[serde(other)]
    Other,
}

/// One entry in the site collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// Page URL.
    pub location: String,
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// User-supplied title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_title: Option<String>,
    /// Favicon URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// Tags; empty for plain history entries.
    #[serde(default)]
    pub tags: Vec<SiteTag>,
    /// Cross-device id, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<ObjectId>,
    /// Folder id (folders only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<i64>,
    /// Containing folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<i64>,
    /// Last visit, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_time: Option<u64>,
    /// Creation time, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<u64>,
}

impl Site {
    /// Whether the site carries `tag`.
    pub fn has_tag(&self, tag: SiteTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Preferences for one host pattern.
///
/// `ad_control` and `cookie_control` hold their local string forms
/// (`"blockAds"`, `"allowAllCookies"`, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    /// Cross-device id, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<ObjectId>,
    /// Page zoom level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_level: Option<f64>,
    /// Shields on or off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shields_up: Option<bool>,
    /// Ad control, local string form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_control: Option<String>,
    /// Cookie control, local string form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_control: Option<String>,
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
    /// Site takes part in payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_payments: Option<bool>,
    /// Site shown in the payments table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_payments_shown: Option<bool>,

    // Local only.
    /// Mixed content allowed. Never synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_insecure_content: Option<bool>,
    /// Notification permission. Never synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications_permission: Option<bool>,
    /// Plugin permission. Never synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash: Option<bool>,
}

impl SiteSettings {
    /// Whether any field of the synced schema is set.
    pub fn has_synced_fields(&self) -> bool {
        self.zoom_level.is_some()
            || self.shields_up.is_some()
            || self.ad_control.is_some()
            || self.cookie_control.is_some()
            || self.safe_browsing.is_some()
            || self.no_script.is_some()
            || self.https_everywhere.is_some()
            || self.fingerprinting_protection.is_some()
            || self.ledger_payments.is_some()
            || self.ledger_payments_shown.is_some()
    }

    /// Overwrite the synced fields and id with those of `remote`, keeping
    /// local-only fields.
    pub fn merge_synced(&mut self, remote: SiteSettings) {
        let SiteSettings {
            run_insecure_content,
            notifications_permission,
            flash,
            ..
        } = std::mem::replace(self, remote);
        self.run_insecure_content = run_insecure_content;
        self.notifications_permission = notifications_permission;
        self.flash = flash;
    }
}

/// A device in the sync chain, as known locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDevice {
    /// Cross-device id of the device record.
    pub object_id: ObjectId,
    /// The device's id in the chain.
    pub device_id: DeviceId,
    /// Human-readable name.
    pub name: String,
}

/// Address of one mutable local object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectPath {
    /// Entry in the site collection.
    Site(usize),
    /// Settings for a host pattern.
    SiteSetting(String),
}

/// A local object, owned.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalObject {
    /// Entry in the site collection.
    Site(Site),
    /// Settings for a host pattern.
    SiteSetting {
        /// Host pattern.
        host_pattern: String,
        /// The settings.
        settings: SiteSettings,
    },
    /// A device.
    Device(LocalDevice),
}

impl LocalObject {
    /// The object's cross-device id, if assigned.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            LocalObject::Site(site) => site.object_id,
            LocalObject::SiteSetting { settings, .. } => settings.object_id,
            LocalObject::Device(device) => Some(device.object_id),
        }
    }

    /// Copy of the object carrying `object_id`.
    pub fn with_object_id(mut self, object_id: ObjectId) -> Self {
        match &mut self {
            LocalObject::Site(site) => site.object_id = Some(object_id),
            LocalObject::SiteSetting { settings, .. } => settings.object_id = Some(object_id),
            LocalObject::Device(device) => device.object_id = object_id,
        }
        self
    }
}

/// A domain mutation event, as published on the application's bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mutation {
    /// A site was added at `index`.
    AddSite {
        /// Index in the site collection.
        index: usize,
    },
    /// The site at `index` changed.
    UpdateSite {
        /// Index in the site collection.
        index: usize,
    },
    /// A site was removed; the event carries its last state.
    RemoveSite {
        /// The removed site.
        site: Site,
    },
    /// Settings for a new host pattern.
    #[serde(rename_all = "camelCase")]
    AddSiteSetting {
        /// Host pattern.
        host_pattern: String,
    },
    /// Settings for a host pattern changed.
    #[serde(rename_all = "camelCase")]
    UpdateSiteSetting {
        /// Host pattern.
        host_pattern: String,
    },
    /// Settings for a host pattern were removed.
    #[serde(rename_all = "camelCase")]
    RemoveSiteSetting {
        /// Host pattern.
        host_pattern: String,
        /// The removed settings.
        settings: SiteSettings,
    },
    /// All history was cleared.
    ClearHistory,
    /// All site settings were cleared.
    ClearSiteSettings,
}

/// A persistence request the engine issues to the owning application.
///
/// Upserts are keyed by object id: applying the same update twice leaves
/// local state as the first application left it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LocalUpdate {
    /// Attach an object id to the object at `path`.
    #[serde(rename_all = "camelCase")]
    SetObjectId {
        /// Target object.
        path: ObjectPath,
        /// Id to attach.
        object_id: ObjectId,
    },
    /// Insert or replace the site carrying the same object id.
    UpsertSite {
        /// The site; its object id is always set.
        site: Site,
    },
    /// Remove the site with this object id.
    #[serde(rename_all = "camelCase")]
    RemoveSite {
        /// Id of the site.
        object_id: ObjectId,
    },
    /// Insert or merge settings for a host pattern.
    #[serde(rename_all = "camelCase")]
    UpsertSiteSettings {
        /// Host pattern.
        host_pattern: String,
        /// Settings; their object id is always set.
        settings: SiteSettings,
    },
    /// Remove the settings with this object id.
    #[serde(rename_all = "camelCase")]
    RemoveSiteSettings {
        /// Id of the settings.
        object_id: ObjectId,
    },
    /// Insert or rename a device.
    UpsertDevice {
        /// The device.
        device: LocalDevice,
    },
    /// Remove the device with this object id.
    #[serde(rename_all = "camelCase")]
    RemoveDevice {
        /// Id of the device record.
        object_id: ObjectId,
    },
}

/// Whether the object at a path carries an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectSlot {
    /// Nothing mutable lives at the path.
    Missing,
    /// An object lives there without an id.
    Unassigned,
    /// An object lives there with this id.
    Assigned(ObjectId),
}

/// Read access to local state.
///
/// Implementations return owned snapshots; the engine never holds borrows
/// across awaits.
pub trait LocalView {
    /// Site at `index`.
    fn site(&self, index: usize) -> Option<Site>;

    /// All sites with their indices, in index order.
    fn sites(&self) -> Vec<(usize, Site)>;

    /// Settings for `host_pattern`.
    fn site_settings(&self, host_pattern: &str) -> Option<SiteSettings>;

    /// All site settings, keyed by host pattern.
    fn all_site_settings(&self) -> Vec<(String, SiteSettings)>;

    /// All known devices.
    fn devices(&self) -> Vec<LocalDevice>;

    /// The object at `path`.
    fn object_at(&self, path: &ObjectPath) -> Option<LocalObject> {
        match path {
            ObjectPath::Site(index) => self.site(*index).map(LocalObject::Site),
            ObjectPath::SiteSetting(host_pattern) => {
                self.site_settings(host_pattern)
                    .map(|settings| LocalObject::SiteSetting {
                        host_pattern: host_pattern.clone(),
                        settings,
                    })
            }
        }
    }

    /// Id state of the object at `path`.
    fn slot(&self, path: &ObjectPath) -> ObjectSlot {
        match self.object_at(path).map(|object| object.object_id()) {
            None => ObjectSlot::Missing,
            Some(None) => ObjectSlot::Unassigned,
            Some(Some(id)) => ObjectSlot::Assigned(id),
        }
    }
}
