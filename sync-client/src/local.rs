//! Local state access.
//!
//! The owning application keeps the browser state. The engine reads it
//! through [`LocalView`] and asks for changes with [`LocalState::request`],
//! without waiting for them to land.

use serde::{Deserialize, Serialize};
use sitesync_core::{LocalDevice, LocalUpdate, LocalView, ObjectPath, Site, SiteSettings};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Local state as seen by the engine.
pub trait LocalState: LocalView + Send + Sync {
    /// Issue a persistence request. Fire-and-forget.
    fn request(&self, update: LocalUpdate);
}

/// A serializable copy of local state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSnapshot {
    /// Site collection by index.
    #[serde(default)]
    pub sites: BTreeMap<usize, Site>,
    /// Site settings by host pattern.
    #[serde(default)]
    pub site_settings: BTreeMap<String, SiteSettings>,
    /// Known devices.
    #[serde(default)]
    pub devices: Vec<LocalDevice>,
}

impl LocalSnapshot {
    /// Apply one update. Upserts are keyed by object id, so applying the
    /// same update twice changes nothing the second time.
    pub fn apply(&mut self, update: LocalUpdate) {
        match update {
            LocalUpdate::SetObjectId { path, object_id } => match path {
                ObjectPath::Site(index) => {
                    if let Some(site) = self.sites.get_mut(&index) {
                        site.object_id.get_or_insert(object_id);
                    }
                }
                ObjectPath::SiteSetting(host_pattern) => {
                    if let Some(settings) = self.site_settings.get_mut(&host_pattern) {
                        settings.object_id.get_or_insert(object_id);
                    }
                }
            },
            LocalUpdate::UpsertSite { site } => {
                let existing = self
                    .sites
                    .iter()
                    .find(|(_, s)| s.object_id.is_some() && s.object_id == site.object_id)
                    .map(|(index, _)| *index);
                let index = existing.unwrap_or_else(|| {
                    self.sites.keys().next_back().map_or(0, |last| last + 1)
                });
                self.sites.insert(index, site);
            }
            LocalUpdate::RemoveSite { object_id } => {
                self.sites.retain(|_, site| site.object_id != Some(object_id));
            }
            LocalUpdate::UpsertSiteSettings {
                host_pattern,
                settings,
            } => {
                // The same object may have moved to another host pattern.
                self.site_settings.retain(|host, s| {
                    host == &host_pattern
                        || s.object_id.is_none()
                        || s.object_id != settings.object_id
                });
                self.site_settings
                    .entry(host_pattern)
                    .or_default()
                    .merge_synced(settings);
            }
            LocalUpdate::RemoveSiteSettings { object_id } => {
                self.site_settings
                    .retain(|_, settings| settings.object_id != Some(object_id));
            }
            LocalUpdate::UpsertDevice { device } => {
                match self
                    .devices
                    .iter_mut()
                    .find(|d| d.object_id == device.object_id)
                {
                    Some(existing) => *existing = device,
                    None => self.devices.push(device),
                }
            }
            LocalUpdate::RemoveDevice { object_id } => {
                self.devices.retain(|device| device.object_id != object_id);
            }
        }
    }
}

impl LocalView for LocalSnapshot {
    fn site(&self, index: usize) -> Option<Site> {
        self.sites.get(&index).cloned()
    }

    fn sites(&self) -> Vec<(usize, Site)> {
        self.sites
            .iter()
            .map(|(index, site)| (*index, site.clone()))
            .collect()
    }

    fn site_settings(&self, host_pattern: &str) -> Option<SiteSettings> {
        self.site_settings.get(host_pattern).cloned()
    }

    fn all_site_settings(&self) -> Vec<(String, SiteSettings)> {
        self.site_settings
            .iter()
            .map(|(host, settings)| (host.clone(), settings.clone()))
            .collect()
    }

    fn devices(&self) -> Vec<LocalDevice> {
        self.devices.clone()
    }
}

/// In-memory local state.
///
/// Requests apply immediately unless writes are deferred, in which case
/// they queue until [`flush`](Self::flush).
#[derive(Debug, Default, Clone)]
pub struct MemoryLocalState {
    inner: Arc<Mutex<MemoryLocalInner>>,
}

#[derive(Debug, Default)]
struct MemoryLocalInner {
    snapshot: LocalSnapshot,
    defer_writes: bool,
    queued: VecDeque<LocalUpdate>,
    requests: Vec<LocalUpdate>,
}

impl MemoryLocalState {
    /// Create empty local state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create local state from a snapshot.
    pub fn from_snapshot(snapshot: LocalSnapshot) -> Self {
        let state = Self::default();
        state.with(|inner| inner.snapshot = snapshot);
        state
    }

    /// Put a site at `index`, as the application would.
    pub fn insert_site(&self, index: usize, site: Site) {
        self.with(|inner| {
            inner.snapshot.sites.insert(index, site);
        });
    }

    /// Remove the site at `index`, returning it.
    pub fn remove_site(&self, index: usize) -> Option<Site> {
        self.with(|inner| inner.snapshot.sites.remove(&index))
    }

    /// Put settings for `host_pattern`, as the application would.
    pub fn insert_site_settings(&self, host_pattern: &str, settings: SiteSettings) {
        self.with(|inner| {
            inner
                .snapshot
                .site_settings
                .insert(host_pattern.to_string(), settings);
        });
    }

    /// Hold requests until [`flush`](Self::flush) instead of applying them.
    pub fn defer_writes(&self, defer: bool) {
        self.with(|inner| inner.defer_writes = defer);
    }

    /// Apply all queued requests.
    pub fn flush(&self) {
        self.with(|inner| {
            while let Some(update) = inner.queued.pop_front() {
                inner.snapshot.apply(update);
            }
        });
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<LocalUpdate> {
        self.with(|inner| inner.requests.clone())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> LocalSnapshot {
        self.with(|inner| inner.snapshot.clone())
    }

    fn with<R>(&self, f: impl FnOnce(&mut MemoryLocalInner) -> R) -> R {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut inner)
    }
}

impl LocalView for MemoryLocalState {
    fn site(&self, index: usize) -> Option<Site> {
        self.with(|inner| inner.snapshot.site(index))
    }

    fn sites(&self) -> Vec<(usize, Site)> {
        self.with(|inner| inner.snapshot.sites())
    }

    fn site_settings(&self, host_pattern: &str) -> Option<SiteSettings> {
        self.with(|inner| inner.snapshot.site_settings(host_pattern))
    }

    fn all_site_settings(&self) -> Vec<(String, SiteSettings)> {
        self.with(|inner| inner.snapshot.all_site_settings())
    }

    fn devices(&self) -> Vec<LocalDevice> {
        self.with(|inner| inner.snapshot.devices())
    }
}

impl LocalState for MemoryLocalState {
    fn request(&self, update: LocalUpdate) {
        self.with(|inner| {
            inner.requests.push(update.clone());
            if inner.defer_writes {
                inner.queued.push_back(update);
            } else {
                inner.snapshot.apply(update);
            }
        });
    }
}
