//! Inbound record resolution.
//!
//! Remote records are paired with their local counterparts (matched by
//! object id) for the backend's merge policy, and the backend's final
//! decisions are turned into [`LocalUpdate`]s.

use sitesync_types::{
    Category, ObjectId, RecordAction, RecordPayload, ResolvePair, ServerCategory, SyncError,
    SyncRecord, TransportValue,
};
use thiserror::Error;

use crate::builder::{is_syncable, AdControl, BuildError, CookieControl, RecordBuilder};
use crate::model::{LocalDevice, LocalObject, LocalUpdate, LocalView, Site, SiteSettings, SiteTag};

/// Errors resolving inbound records.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A record does not belong to the collection it arrived under.
    #[error("{found} record in {expected} batch")]
    CategoryMismatch {
        /// Collection named by the message.
        expected: ServerCategory,
        /// Category of the record.
        found: Category,
    },

    /// A wire enum code has no local string.
    #[error("unknown {field} code: {code}")]
    UnknownEnumCode {
        /// Field name.
        field: &'static str,
        /// The unrecognized code.
        code: u8,
    },

    /// Building the local counterpart failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Transport-safe encoding failed.
    #[error(transparent)]
    Encoding(#[from] SyncError),
}

/// Find the local object of `category` carrying `object_id`.
pub fn find_local<V: LocalView + ?Sized>(
    view: &V,
    category: Category,
    object_id: &ObjectId,
) -> Option<LocalObject> {
    match category {
        Category::Bookmark | Category::HistorySite => view
            .sites()
            .into_iter()
            .find(|(_, site)| site.object_id.as_ref() == Some(object_id))
            .map(|(_, site)| LocalObject::Site(site)),
        Category::SiteSetting => view
            .all_site_settings()
            .into_iter()
            .find(|(_, settings)| settings.object_id.as_ref() == Some(object_id))
            .map(|(host_pattern, settings)| LocalObject::SiteSetting {
                host_pattern,
                settings,
            }),
        Category::Device => view
            .devices()
            .into_iter()
            .find(|device| &device.object_id == object_id)
            .map(LocalObject::Device),
    }
}

/// Pairs remote records with local state.
#[derive(Debug, Clone)]
pub struct RecordResolver {
    builder: RecordBuilder,
}

impl RecordResolver {
    /// Create a resolver building local records with `builder`.
    pub fn new(builder: RecordBuilder) -> Self {
        Self { builder }
    }

    /// The local counterpart of `record`, as a CREATE record from this device.
    ///
    /// `None` if nothing local matches or the match no longer syncs.
    pub fn get_existing_object<V: LocalView + ?Sized>(
        &self,
        view: &V,
        record: &SyncRecord,
    ) -> Result<Option<SyncRecord>, ResolveError> {
        let category = record.category();
        let Some(object) = find_local(view, category, &record.object_id) else {
            return Ok(None);
        };
        if !is_syncable(category, &object) {
            return Ok(None);
        }
        Ok(self.builder.build(RecordAction::Create, &object)?)
    }

    /// Pair each record with its local counterpart, both transport-safe.
    ///
    /// Output order follows input order.
    pub fn resolve_incoming<V: LocalView + ?Sized>(
        &self,
        view: &V,
        category: ServerCategory,
        records: &[SyncRecord],
    ) -> Result<Vec<ResolvePair>, ResolveError> {
        records
            .iter()
            .map(|record| {
                let found = record.category();
                if found.server_category() != category {
                    return Err(ResolveError::CategoryMismatch {
                        expected: category,
                        found,
                    });
                }
                let existing = self
                    .get_existing_object(view, record)?
                    .map(|local| TransportValue::encode(&local))
                    .transpose()?;
                Ok(ResolvePair {
                    record: TransportValue::encode(record)?,
                    existing,
                })
            })
            .collect()
    }
}

/// Translate a resolved record into the local update that applies it.
pub fn local_update(record: &SyncRecord) -> Result<LocalUpdate, ResolveError> {
    let object_id = record.object_id;

    if record.action == RecordAction::Delete {
        return Ok(match record.category() {
            Category::Bookmark | Category::HistorySite => LocalUpdate::RemoveSite { object_id },
            Category::SiteSetting => LocalUpdate::RemoveSiteSettings { object_id },
            Category::Device => LocalUpdate::RemoveDevice { object_id },
        });
    }

    let update = match &record.payload {
        RecordPayload::Bookmark(bookmark) => LocalUpdate::UpsertSite {
            site: Site {
                location: bookmark.site.location.clone(),
                title: bookmark.site.title.clone(),
                custom_title: bookmark.site.custom_title.clone(),
                favicon: bookmark.site.favicon.clone(),
                tags: vec![if bookmark.is_folder {
                    SiteTag::BookmarkFolder
                } else {
                    SiteTag::Bookmark
                }],
                object_id: Some(object_id),
                folder_id: bookmark.folder_id,
                parent_folder_id: bookmark.parent_folder_id,
                last_accessed_time: bookmark.site.last_accessed_time,
                creation_time: bookmark.site.creation_time,
            },
        },
        RecordPayload::HistorySite(fields) => LocalUpdate::UpsertSite {
            site: Site {
                location: fields.location.clone(),
                title: fields.title.clone(),
                custom_title: fields.custom_title.clone(),
                object_id: Some(object_id),
                last_accessed_time: fields.last_accessed_time,
                creation_time: fields.creation_time,
                ..Default::default()
            },
        },
        RecordPayload::SiteSetting(payload) => {
            let ad_control = payload
                .ad_control
                .map(|code| {
                    AdControl::from_code(code)
                        .map(|v| v.as_str().to_string())
                        .ok_or(ResolveError::UnknownEnumCode {
                            field: "adControl",
                            code,
                        })
                })
                .transpose()?;
            let cookie_control = payload
                .cookie_control
                .map(|code| {
                    CookieControl::from_code(code)
                        .map(|v| v.as_str().to_string())
                        .ok_or(ResolveError::UnknownEnumCode {
                            field: "cookieControl",
                            code,
                        })
                })
                .transpose()?;

            LocalUpdate::UpsertSiteSettings {
                host_pattern: payload.host_pattern.clone(),
                settings: SiteSettings {
                    object_id: Some(object_id),
                    zoom_level: payload.zoom_level,
                    shields_up: payload.shields_up,
                    ad_control,
                    cookie_control,
                    safe_browsing: payload.safe_browsing,
                    no_script: payload.no_script,
                    https_everywhere: payload.https_everywhere,
                    fingerprinting_protection: payload.fingerprinting_protection,
                    ledger_payments: payload.ledger_payments,
                    ledger_payments_shown: payload.ledger_payments_shown,
                    ..Default::default()
                },
            }
        }
        RecordPayload::Device(device) => LocalUpdate::UpsertDevice {
            device: LocalDevice {
                object_id,
                device_id: record.device_id.clone(),
                name: device.name.clone(),
            },
        },
    };

    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_types::{BookmarkPayload, DeviceId, SiteFields, SiteSettingPayload};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct State {
        sites: BTreeMap<usize, Site>,
        settings: BTreeMap<String, SiteSettings>,
        devices: Vec<LocalDevice>,
    }

    impl LocalView for State {
        fn site(&self, index: usize) -> Option<Site> {
            self.sites.get(&index).cloned()
        }
        fn sites(&self) -> Vec<(usize, Site)> {
            self.sites.iter().map(|(i, s)| (*i, s.clone())).collect()
        }
        fn site_settings(&self, host_pattern: &str) -> Option<SiteSettings> {
            self.settings.get(host_pattern).cloned()
        }
        fn all_site_settings(&self) -> Vec<(String, SiteSettings)> {
            self.settings
                .iter()
                .map(|(h, s)| (h.clone(), s.clone()))
                .collect()
        }
        fn devices(&self) -> Vec<LocalDevice> {
            self.devices.clone()
        }
    }

    fn local_device() -> DeviceId {
        DeviceId::from_bytes(&[0])
    }

    fn remote_device() -> DeviceId {
        DeviceId::from_bytes(&[7])
    }

    fn resolver() -> RecordResolver {
        RecordResolver::new(RecordBuilder::new(local_device()))
    }

    fn bookmark_record(object_id: ObjectId, title: &str) -> SyncRecord {
        SyncRecord::new(
            RecordAction::Update,
            remote_device(),
            object_id,
            RecordPayload::Bookmark(BookmarkPayload {
                site: SiteFields {
                    location: "https://example.com/".into(),
                    title: title.into(),
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
    }

    fn state_with_bookmark(object_id: ObjectId) -> State {
        let mut state = State::default();
        state.sites.insert(
            4,
            Site {
                location: "https://example.com/".into(),
                title: "Local title".into(),
                tags: vec![SiteTag::Bookmark],
                object_id: Some(object_id),
                ..Default::default()
            },
        );
        state
    }

    #[test]
    fn existing_object_is_found_by_object_id() {
        let id = ObjectId::random();
        let state = state_with_bookmark(id);

        let existing = resolver()
            .get_existing_object(&state, &bookmark_record(id, "Remote title"))
            .unwrap()
            .unwrap();

        assert_eq!(existing.action, RecordAction::Create);
        assert_eq!(existing.device_id, local_device());
        assert_eq!(existing.object_id, id);
        match existing.payload {
            RecordPayload::Bookmark(bookmark) => assert_eq!(bookmark.site.title, "Local title"),
            other => panic!("Expected bookmark, got {:?}", other),
        }
    }

    #[test]
    fn no_match_yields_none() {
        let state = state_with_bookmark(ObjectId::random());
        let existing = resolver()
            .get_existing_object(&state, &bookmark_record(ObjectId::random(), "x"))
            .unwrap();
        assert!(existing.is_none());
    }

    #[test]
    fn match_that_no_longer_syncs_yields_none() {
        let id = ObjectId::random();
        let mut state = state_with_bookmark(id);
        state.sites.get_mut(&4).unwrap().tags = vec![SiteTag::Other];

        let existing = resolver()
            .get_existing_object(&state, &bookmark_record(id, "x"))
            .unwrap();
        assert!(existing.is_none());
    }

    #[test]
    fn resolve_incoming_pairs_in_order() {
        let known = ObjectId::random();
        let state = state_with_bookmark(known);
        let records = vec![
            bookmark_record(ObjectId::random(), "new"),
            bookmark_record(known, "changed"),
        ];

        let pairs = resolver()
            .resolve_incoming(&state, ServerCategory::Bookmarks, &records)
            .unwrap();

        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].existing.is_none());
        let existing: SyncRecord = pairs[1].existing.as_ref().unwrap().decode().unwrap();
        assert_eq!(existing.object_id, known);
        let remote: SyncRecord = pairs[1].record.decode().unwrap();
        assert_eq!(remote, records[1]);
    }

    #[test]
    fn resolve_incoming_rejects_foreign_category() {
        let state = State::default();
        let records = vec![bookmark_record(ObjectId::random(), "x")];

        let result = resolver().resolve_incoming(&state, ServerCategory::Preferences, &records);
        assert!(matches!(
            result,
            Err(ResolveError::CategoryMismatch {
                expected: ServerCategory::Preferences,
                found: Category::Bookmark,
            })
        ));
    }

    #[test]
    fn device_lookup_uses_device_list() {
        let id = ObjectId::random();
        let mut state = State::default();
        state.devices.push(LocalDevice {
            object_id: id,
            device_id: remote_device(),
            name: "phone".into(),
        });
        let record = SyncRecord::new(
            RecordAction::Update,
            remote_device(),
            id,
            RecordPayload::Device(sitesync_types::DevicePayload {
                name: "tablet".into(),
            }),
        );

        let existing = resolver().get_existing_object(&state, &record).unwrap().unwrap();
        assert_eq!(existing.category(), Category::Device);
    }

    #[test]
    fn bookmark_becomes_tagged_site() {
        let id = ObjectId::random();
        let update = local_update(&bookmark_record(id, "Remote")).unwrap();

        match update {
            LocalUpdate::UpsertSite { site } => {
                assert_eq!(site.tags, vec![SiteTag::Bookmark]);
                assert_eq!(site.object_id, Some(id));
                assert_eq!(site.title, "Remote");
            }
            other => panic!("Expected UpsertSite, got {:?}", other),
        }
    }

    #[test]
    fn site_setting_codes_become_strings() {
        let id = ObjectId::random();
        let record = SyncRecord::new(
            RecordAction::Create,
            remote_device(),
            id,
            RecordPayload::SiteSetting(SiteSettingPayload {
                host_pattern: "https://a.com".into(),
                ad_control: Some(2),
                cookie_control: Some(0),
                ..Default::default()
            }),
        );

        match local_update(&record).unwrap() {
            LocalUpdate::UpsertSiteSettings {
                host_pattern,
                settings,
            } => {
                assert_eq!(host_pattern, "https://a.com");
                assert_eq!(settings.ad_control.as_deref(), Some("allowAdsAndTracking"));
                assert_eq!(
                    settings.cookie_control.as_deref(),
                    Some("block3rdPartyCookie")
                );
            }
            other => panic!("Expected UpsertSiteSettings, got {:?}", other),
        }
    }

    #[test]
    fn unknown_code_rejects_record() {
        let record = SyncRecord::new(
            RecordAction::Create,
            remote_device(),
            ObjectId::random(),
            RecordPayload::SiteSetting(SiteSettingPayload {
                host_pattern: "https://a.com".into(),
                cookie_control: Some(5),
                ..Default::default()
            }),
        );

        assert!(matches!(
            local_update(&record),
            Err(ResolveError::UnknownEnumCode {
                field: "cookieControl",
                code: 5
            })
        ));
    }

    #[test]
    fn deletes_map_by_category() {
        let id = ObjectId::random();
        let mut record = bookmark_record(id, "x");
        record.action = RecordAction::Delete;
        assert_eq!(
            local_update(&record).unwrap(),
            LocalUpdate::RemoveSite { object_id: id }
        );

        let device = SyncRecord::new(
            RecordAction::Delete,
            remote_device(),
            id,
            RecordPayload::Device(sitesync_types::DevicePayload { name: "x".into() }),
        );
        assert_eq!(
            local_update(&device).unwrap(),
            LocalUpdate::RemoveDevice { object_id: id }
        );
    }
}
