//! Object id assignment.
//!
//! The first time a local object takes part in sync it gets a random
//! [`ObjectId`]. Assignment is optimistic: the id is returned at once and a
//! [`LocalUpdate::SetObjectId`] request is handed back for the caller to
//! issue, without waiting for the local state to reflect it.
//!
//! Until it does, a second lookup of the same object would still see no id.
//! The registry remembers in-flight assignments per [`ObjectPath`] and hands
//! the pending id back instead of minting another one.
//!
//! Entries are keyed by path, not by object. If a site is removed and a new
//! one takes its index before the pending `SetObjectId` lands, the new site
//! inherits the pending id. [`ObjectIdRegistry::settle`] only drops entries
//! whose slot is gone or assigned, so callers that reuse indices must settle
//! after removals.

use std::collections::HashMap;

use sitesync_types::ObjectId;

use crate::model::{LocalUpdate, LocalView, ObjectPath, ObjectSlot};

/// Outcome of [`ObjectIdRegistry::get_or_create`].
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// The object already carried this id.
    Existing(ObjectId),
    /// An assignment for this object is still in flight.
    Pending(ObjectId),
    /// A fresh id; `request` must be issued to persist it.
    New {
        /// The new id.
        object_id: ObjectId,
        /// Persistence request for the owning application.
        request: LocalUpdate,
    },
}

impl Assignment {
    /// The assigned id, whatever its origin.
    pub fn object_id(&self) -> ObjectId {
        match self {
            Assignment::Existing(id) | Assignment::Pending(id) => *id,
            Assignment::New { object_id, .. } => *object_id,
        }
    }

    /// The persistence request, if this assignment needs one.
    pub fn into_request(self) -> Option<LocalUpdate> {
        match self {
            Assignment::New { request, .. } => Some(request),
            _ => None,
        }
    }
}

/// Assigns object ids and tracks assignments not yet visible locally.
#[derive(Debug, Default)]
pub struct ObjectIdRegistry {
    pending: HashMap<ObjectPath, ObjectId>,
}

impl ObjectIdRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the id of the object at `path`, assigning one if it has none.
    ///
    /// Returns `None` when nothing mutable lives at `path`.
    pub fn get_or_create<V: LocalView + ?Sized>(
        &mut self,
        view: &V,
        path: &ObjectPath,
    ) -> Option<Assignment> {
        match view.slot(path) {
            ObjectSlot::Missing => {
                self.pending.remove(path);
                None
            }
            ObjectSlot::Assigned(id) => {
                self.pending.remove(path);
                Some(Assignment::Existing(id))
            }
            ObjectSlot::Unassigned => {
                if let Some(id) = self.pending.get(path) {
                    return Some(Assignment::Pending(*id));
                }
                let object_id = ObjectId::random();
                self.pending.insert(path.clone(), object_id);
                Some(Assignment::New {
                    object_id,
                    request: LocalUpdate::SetObjectId {
                        path: path.clone(),
                        object_id,
                    },
                })
            }
        }
    }

    /// The in-flight id for `path`, if any. Never mints one.
    pub fn pending(&self, path: &ObjectPath) -> Option<ObjectId> {
        self.pending.get(path).copied()
    }

    /// Drop in-flight entries whose object now carries an id or is gone.
    pub fn settle<V: LocalView + ?Sized>(&mut self, view: &V) {
        self.pending
            .retain(|path, _| view.slot(path) == ObjectSlot::Unassigned);
    }

    /// Number of assignments not yet visible locally.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocalDevice, Site, SiteSettings};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Sites {
        sites: BTreeMap<usize, Site>,
        settings: BTreeMap<String, SiteSettings>,
    }

    impl Sites {
        fn apply(&mut self, update: LocalUpdate) {
            if let LocalUpdate::SetObjectId { path, object_id } = update {
                match path {
                    ObjectPath::Site(index) => {
                        if let Some(site) = self.sites.get_mut(&index) {
                            site.object_id = Some(object_id);
                        }
                    }
                    ObjectPath::SiteSetting(host) => {
                        if let Some(settings) = self.settings.get_mut(&host) {
                            settings.object_id = Some(object_id);
                        }
                    }
                }
            }
        }
    }

    impl LocalView for Sites {
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
            Vec::new()
        }
    }

    fn view_with_site(index: usize) -> Sites {
        let mut view = Sites::default();
        view.sites.insert(
            index,
            Site {
                location: "https://example.com/".into(),
                ..Default::default()
            },
        );
        view
    }

    /// Assignment without the in-flight table.
    fn assign_without_tracking(view: &dyn LocalView, path: &ObjectPath) -> Option<ObjectId> {
        match view.slot(path) {
            ObjectSlot::Missing => None,
            ObjectSlot::Assigned(id) => Some(id),
            ObjectSlot::Unassigned => Some(ObjectId::random()),
        }
    }

    #[test]
    fn untracked_assignment_mints_two_ids() {
        let view = view_with_site(0);
        let path = ObjectPath::Site(0);

        // Persistence has not landed between the two calls.
        let first = assign_without_tracking(&view, &path).unwrap();
        let second = assign_without_tracking(&view, &path).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn in_flight_assignment_is_reused() {
        let view = view_with_site(0);
        let path = ObjectPath::Site(0);
        let mut registry = ObjectIdRegistry::new();

        let first = registry.get_or_create(&view, &path).unwrap();
        let second = registry.get_or_create(&view, &path).unwrap();

        assert!(matches!(first, Assignment::New { .. }));
        assert_eq!(second, Assignment::Pending(first.object_id()));
        assert_eq!(registry.pending(&path), Some(first.object_id()));
        assert!(second.into_request().is_none());
    }

    #[test]
    fn assigned_object_is_idempotent() {
        let mut view = view_with_site(2);
        let path = ObjectPath::Site(2);
        let mut registry = ObjectIdRegistry::new();

        let assignment = registry.get_or_create(&view, &path).unwrap();
        let id = assignment.object_id();
        view.apply(assignment.into_request().unwrap());

        let again = registry.get_or_create(&view, &path).unwrap();
        assert_eq!(again, Assignment::Existing(id));
        assert_eq!(registry.pending_len(), 0);
    }

    #[test]
    fn new_assignment_requests_persistence() {
        let view = view_with_site(1);
        let mut registry = ObjectIdRegistry::new();

        let assignment = registry.get_or_create(&view, &ObjectPath::Site(1)).unwrap();
        let id = assignment.object_id();

        assert_eq!(
            assignment.into_request(),
            Some(LocalUpdate::SetObjectId {
                path: ObjectPath::Site(1),
                object_id: id,
            })
        );
    }

    #[test]
    fn missing_object_yields_nothing() {
        let view = Sites::default();
        let mut registry = ObjectIdRegistry::new();

        assert!(registry
            .get_or_create(&view, &ObjectPath::Site(9))
            .is_none());
        assert!(registry
            .get_or_create(&view, &ObjectPath::SiteSetting("https://a.com".into()))
            .is_none());
        assert_eq!(registry.pending_len(), 0);
    }

    #[test]
    fn reused_index_inherits_pending_id_until_settled() {
        let mut view = view_with_site(0);
        let path = ObjectPath::Site(0);
        let mut registry = ObjectIdRegistry::new();
        let first = registry.get_or_create(&view, &path).unwrap().object_id();

        // Replaced before the assignment landed.
        view.sites.insert(0, Site::default());
        assert_eq!(
            registry.get_or_create(&view, &path),
            Some(Assignment::Pending(first))
        );

        let mut registry = ObjectIdRegistry::new();
        registry.get_or_create(&view, &path).unwrap();
        view.sites.remove(&0);
        registry.settle(&view);
        view.sites.insert(0, Site::default());
        assert!(matches!(
            registry.get_or_create(&view, &path),
            Some(Assignment::New { .. })
        ));
    }

    #[test]
    fn settle_drops_reflected_and_vanished_entries() {
        let mut view = view_with_site(0);
        view.sites.insert(1, Site::default());
        view.settings
            .insert("https://a.com".into(), SiteSettings::default());
        let mut registry = ObjectIdRegistry::new();

        let a = registry.get_or_create(&view, &ObjectPath::Site(0)).unwrap();
        registry.get_or_create(&view, &ObjectPath::Site(1)).unwrap();
        registry
            .get_or_create(&view, &ObjectPath::SiteSetting("https://a.com".into()))
            .unwrap();
        assert_eq!(registry.pending_len(), 3);

        view.apply(a.into_request().unwrap());
        view.sites.remove(&1);
        registry.settle(&view);

        assert_eq!(registry.pending_len(), 1);
    }
}
