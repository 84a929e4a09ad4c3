//! Record dispatch.
//!
//! Turns domain mutations into outbound channel messages. Records are
//! batched per server category; a category-level delete flushes the
//! batches before it so the backend sees changes in the order they happened.

use sitesync_core::{
    is_syncable, plan, site_category, CategoryFilter, LocalDevice, LocalObject, LocalUpdate,
    Mutation, ObjectIdRegistry, ObjectPath, RecordBuilder, Step,
};
use sitesync_types::{
    Category, ChannelMessage, DeleteCategory, ObjectId, RecordAction, SendRecords, ServerCategory,
    SyncRecord,
};

use crate::local::LocalState;

/// Builds outbound messages for one device.
#[derive(Debug)]
pub struct RecordDispatcher {
    builder: RecordBuilder,
    registry: ObjectIdRegistry,
    filter: CategoryFilter,
}

impl RecordDispatcher {
    /// Create a dispatcher for the device `builder` stamps.
    pub fn new(builder: RecordBuilder, filter: CategoryFilter) -> Self {
        Self {
            builder,
            registry: ObjectIdRegistry::new(),
            filter,
        }
    }

    /// Translate a batch of mutations.
    pub fn dispatch(
        &mut self,
        local: &dyn LocalState,
        mutations: &[Mutation],
    ) -> Vec<ChannelMessage> {
        self.registry.settle(local);
        let mut batch = Batch::default();

        for mutation in mutations {
            match plan(mutation) {
                Step::Live { action, path } => {
                    if let Some(record) = self.build_live(local, action, &path) {
                        batch.record(record);
                    }
                }
                Step::Removed(object) => {
                    if let Some(record) = self.build_removed(&object) {
                        batch.record(record);
                    }
                }
                Step::DeleteCategory(category) => {
                    if self.filter.allows(category) {
                        batch.delete_category(category);
                    } else {
                        tracing::debug!("Skipping delete of disabled category {}", category);
                    }
                }
            }
        }

        batch.finish()
    }

    /// Announce this device and assign ids to every synced site that has none.
    pub fn first_run_backfill(
        &mut self,
        local: &dyn LocalState,
        device_name: &str,
    ) -> Vec<ChannelMessage> {
        let mut batch = Batch::default();
        batch.record(self.announce_device(local, device_name));

        let mut assigned = 0usize;
        for (index, site) in local.sites() {
            if site.object_id.is_some() {
                continue;
            }
            match site_category(&site) {
                Some(category) if self.filter.allows(category) => {}
                _ => continue,
            }
            let path = ObjectPath::Site(index);
            if let Some(record) = self.build_live(local, RecordAction::Create, &path) {
                batch.record(record);
                assigned += 1;
            }
        }
        tracing::info!("First-run backfill: {} sites", assigned);

        batch.finish()
    }

    /// Re-send every synced site setting, assigning ids where missing.
    pub fn site_settings_backfill(&mut self, local: &dyn LocalState) -> Vec<ChannelMessage> {
        let mut batch = Batch::default();
        if !self.filter.allows(Category::SiteSetting) {
            return batch.finish();
        }

        for (host_pattern, settings) in local.all_site_settings() {
            if !settings.has_synced_fields() {
                continue;
            }
            let path = ObjectPath::SiteSetting(host_pattern.clone());
            let Some(assignment) = self.registry.get_or_create(local, &path) else {
                continue;
            };
            let object_id = assignment.object_id();
            if let Some(request) = assignment.into_request() {
                local.request(request);
            }
            let object = LocalObject::SiteSetting {
                host_pattern,
                settings,
            }
            .with_object_id(object_id);
            if let Some(record) = self.build(RecordAction::Update, &object) {
                batch.record(record);
            }
        }

        batch.finish()
    }

    /// This device's record. The device keeps the object id it already has
    /// locally; a new one is handed to local state for persistence.
    fn announce_device(&self, local: &dyn LocalState, name: &str) -> SyncRecord {
        let device_id = self.builder.device_id();
        let object_id = local
            .devices()
            .into_iter()
            .find(|device| &device.device_id == device_id)
            .map(|device| device.object_id)
            .unwrap_or_else(ObjectId::random);

        local.request(LocalUpdate::UpsertDevice {
            device: LocalDevice {
                object_id,
                device_id: device_id.clone(),
                name: name.to_string(),
            },
        });
        self.builder.build_device(object_id, name)
    }

    fn build_live(
        &mut self,
        local: &dyn LocalState,
        action: RecordAction,
        path: &ObjectPath,
    ) -> Option<SyncRecord> {
        let Some(object) = local.object_at(path) else {
            tracing::debug!("Skipping {:?}: no object at {:?}", action, path);
            return None;
        };
        let category = self.category_of(&object)?;

        let object_id = if action == RecordAction::Create {
            let assignment = self.registry.get_or_create(local, path)?;
            let object_id = assignment.object_id();
            if let Some(request) = assignment.into_request() {
                local.request(request);
            }
            object_id
        } else {
            match object.object_id().or_else(|| self.registry.pending(path)) {
                Some(id) => id,
                None => {
                    tracing::debug!("Skipping {} update at {:?}: no object id", category, path);
                    return None;
                }
            }
        };

        self.build(action, &object.with_object_id(object_id))
    }

    fn build_removed(&mut self, object: &LocalObject) -> Option<SyncRecord> {
        let category = self.category_of(object)?;
        if object.object_id().is_none() {
            tracing::debug!("Skipping {} delete: no object id", category);
            return None;
        }
        self.build(RecordAction::Delete, object)
    }

    /// The object's category if it syncs and its category is enabled.
    fn category_of(&self, object: &LocalObject) -> Option<Category> {
        let category = match object {
            LocalObject::Site(site) => site_category(site)?,
            LocalObject::SiteSetting { .. } => Category::SiteSetting,
            LocalObject::Device(_) => Category::Device,
        };
        if !is_syncable(category, object) {
            return None;
        }
        if !self.filter.allows(category) {
            tracing::debug!("Skipping record for disabled category {}", category);
            return None;
        }
        Some(category)
    }

    fn build(&self, action: RecordAction, object: &LocalObject) -> Option<SyncRecord> {
        match self.builder.build(action, object) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Dropping record: {}", e);
                None
            }
        }
    }
}

/// Accumulates records per server category, in first-seen order.
#[derive(Debug, Default)]
struct Batch {
    open: Vec<(ServerCategory, Vec<SyncRecord>)>,
    messages: Vec<ChannelMessage>,
}

impl Batch {
    fn record(&mut self, record: SyncRecord) {
        let server = record.category().server_category();
        match self.open.iter_mut().find(|(category, _)| *category == server) {
            Some((_, records)) => records.push(record),
            None => self.open.push((server, vec![record])),
        }
    }

    fn delete_category(&mut self, category: Category) {
        self.flush();
        self.messages
            .push(ChannelMessage::DeleteCategory(DeleteCategory::new(category)));
    }

    fn flush(&mut self) {
        for (category, records) in self.open.drain(..) {
            self.messages
                .push(ChannelMessage::SendRecords(SendRecords::new(category, records)));
        }
    }

    fn finish(mut self) -> Vec<ChannelMessage> {
        self.flush();
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryLocalState;
    use sitesync_core::{LocalView, Site, SiteSettings, SiteTag};
    use sitesync_types::{DeviceId, RecordPayload};

    fn dispatcher() -> RecordDispatcher {
        RecordDispatcher::new(
            RecordBuilder::new(DeviceId::from_bytes(&[0])),
            CategoryFilter {
                bookmarks: true,
                history: true,
                site_settings: true,
            },
        )
    }

    fn bookmark(object_id: Option<ObjectId>) -> Site {
        Site {
            location: "https://example.com/".into(),
            title: "Example".into(),
            tags: vec![SiteTag::Bookmark],
            object_id,
            ..Default::default()
        }
    }

    fn records(messages: &[ChannelMessage]) -> Vec<(String, SyncRecord)> {
        messages
            .iter()
            .filter_map(|message| match message {
                ChannelMessage::SendRecords(send) => Some(send),
                _ => None,
            })
            .flat_map(|send| {
                send.records
                    .iter()
                    .map(move |record| (send.category.clone(), record.clone()))
            })
            .collect()
    }

    #[test]
    fn add_bookmark_assigns_id_and_creates() {
        let local = MemoryLocalState::new();
        local.insert_site(3, bookmark(None));

        let messages = dispatcher().dispatch(&local, &[Mutation::AddSite { index: 3 }]);

        let sent = records(&messages);
        assert_eq!(sent.len(), 1);
        let (category, record) = &sent[0];
        assert_eq!(category, "BOOKMARKS");
        assert_eq!(record.action, RecordAction::Create);
        assert_eq!(record.object_id.as_bytes().len(), 16);
        match &record.payload {
            RecordPayload::Bookmark(bookmark) => assert!(!bookmark.is_folder),
            other => panic!("Expected bookmark, got {:?}", other),
        }
        assert_eq!(local.site(3).unwrap().object_id, Some(record.object_id));
    }

    #[test]
    fn repeated_add_before_persistence_reuses_id() {
        let local = MemoryLocalState::new();
        local.insert_site(0, bookmark(None));
        local.defer_writes(true);
        let mut dispatcher = dispatcher();

        let first = dispatcher.dispatch(&local, &[Mutation::AddSite { index: 0 }]);
        let second = dispatcher.dispatch(&local, &[Mutation::UpdateSite { index: 0 }]);

        let first_id = records(&first)[0].1.object_id;
        let second_id = records(&second)[0].1.object_id;
        assert_eq!(first_id, second_id);
        assert_eq!(local.requests().len(), 1);
    }

    #[test]
    fn update_without_id_is_skipped() {
        let local = MemoryLocalState::new();
        local.insert_site(0, bookmark(None));

        let messages = dispatcher().dispatch(&local, &[Mutation::UpdateSite { index: 0 }]);
        assert!(messages.is_empty());
        assert!(local.requests().is_empty());
    }

    #[test]
    fn missing_object_is_skipped() {
        let local = MemoryLocalState::new();
        let messages = dispatcher().dispatch(&local, &[Mutation::AddSite { index: 7 }]);
        assert!(messages.is_empty());
    }

    #[test]
    fn non_syncable_site_gets_no_id() {
        let local = MemoryLocalState::new();
        let mut site = bookmark(None);
        site.tags = vec![SiteTag::Other];
        local.insert_site(0, site);

        let messages = dispatcher().dispatch(&local, &[Mutation::AddSite { index: 0 }]);

        assert!(messages.is_empty());
        assert!(local.site(0).unwrap().object_id.is_none());
    }

    #[test]
    fn remove_builds_delete() {
        let local = MemoryLocalState::new();
        let id = ObjectId::random();

        let messages = dispatcher().dispatch(
            &local,
            &[Mutation::RemoveSite {
                site: bookmark(Some(id)),
            }],
        );

        let sent = records(&messages);
        assert_eq!(sent[0].1.action, RecordAction::Delete);
        assert_eq!(sent[0].1.object_id, id);
    }

    #[test]
    fn batches_per_server_category_and_keeps_order_around_deletes() {
        let local = MemoryLocalState::new();
        local.insert_site(0, bookmark(None));
        local.insert_site(1, bookmark(None));
        let mut history = bookmark(None);
        history.tags.clear();
        local.insert_site(2, history);

        let messages = dispatcher().dispatch(
            &local,
            &[
                Mutation::AddSite { index: 0 },
                Mutation::AddSite { index: 2 },
                Mutation::AddSite { index: 1 },
                Mutation::ClearHistory,
                Mutation::UpdateSite { index: 2 },
            ],
        );

        let kinds: Vec<_> = messages
            .iter()
            .map(|m| match m {
                ChannelMessage::SendRecords(send) => {
                    format!("{}:{}", send.category, send.records.len())
                }
                ChannelMessage::DeleteCategory(delete) => format!("delete:{}", delete.category),
                other => other.kind().to_string(),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "BOOKMARKS:2",
                "HISTORY_SITES:1",
                "delete:historySite",
                "HISTORY_SITES:1"
            ]
        );
    }

    #[test]
    fn disabled_category_is_dropped() {
        let local = MemoryLocalState::new();
        let mut history = bookmark(None);
        history.tags.clear();
        local.insert_site(0, history);
        let mut dispatcher = RecordDispatcher::new(
            RecordBuilder::new(DeviceId::from_bytes(&[0])),
            CategoryFilter::default(),
        );

        let messages = dispatcher.dispatch(
            &local,
            &[Mutation::AddSite { index: 0 }, Mutation::ClearHistory],
        );

        assert!(messages.is_empty());
        assert!(local.site(0).unwrap().object_id.is_none());
    }

    #[test]
    fn unknown_enum_value_drops_record() {
        let local = MemoryLocalState::new();
        local.insert_site_settings(
            "https://a.com",
            SiteSettings {
                ad_control: Some("blockEverything".into()),
                ..Default::default()
            },
        );

        let messages = dispatcher().dispatch(
            &local,
            &[Mutation::AddSiteSetting {
                host_pattern: "https://a.com".into(),
            }],
        );
        assert!(messages.is_empty());
    }

    #[test]
    fn first_run_announces_device_and_backfills_sites() {
        let local = MemoryLocalState::new();
        local.insert_site(0, bookmark(None));
        local.insert_site(1, bookmark(Some(ObjectId::random())));
        let mut other = bookmark(None);
        other.tags = vec![SiteTag::Other];
        local.insert_site(2, other);

        let messages = dispatcher().first_run_backfill(&local, "laptop");
        let sent = records(&messages);

        assert_eq!(sent.len(), 2);
        let device = sent
            .iter()
            .find(|(_, r)| r.category() == Category::Device)
            .unwrap();
        assert_eq!(device.0, "PREFERENCES");
        assert_eq!(device.1.action, RecordAction::Create);
        assert_eq!(
            local.devices(),
            vec![LocalDevice {
                object_id: device.1.object_id,
                device_id: DeviceId::from_bytes(&[0]),
                name: "laptop".into(),
            }]
        );
        let site = sent
            .iter()
            .find(|(_, r)| r.category() == Category::Bookmark)
            .unwrap();
        assert_eq!(local.site(0).unwrap().object_id, Some(site.1.object_id));
    }

    #[test]
    fn repeated_first_run_keeps_device_object_id() {
        let local = MemoryLocalState::new();
        let mut dispatcher = dispatcher();

        let first = records(&dispatcher.first_run_backfill(&local, "laptop"));
        let second = records(&dispatcher.first_run_backfill(&local, "renamed laptop"));

        assert_eq!(first[0].1.object_id, second[0].1.object_id);
        let devices = local.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "renamed laptop");
    }

    #[test]
    fn site_settings_backfill_sends_updates() {
        let local = MemoryLocalState::new();
        local.insert_site_settings(
            "https://a.com",
            SiteSettings {
                shields_up: Some(false),
                ..Default::default()
            },
        );
        local.insert_site_settings("https://b.com", SiteSettings::default());

        let messages = dispatcher().site_settings_backfill(&local);
        let sent = records(&messages);

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "PREFERENCES");
        assert_eq!(sent[0].1.action, RecordAction::Update);
        let assigned = |host: &str| local.site_settings(host).unwrap().object_id.is_some();
        assert!(assigned("https://a.com"));
        assert!(!assigned("https://b.com"));
    }
}
