//! # sync-core
//!
//! Pure sync logic for sitesync (no I/O, instant tests).
//!
//! This crate decides what to send and what to apply without touching the
//! channel, the disk, or a clock:
//! - [`ObjectIdRegistry`] - assigns object ids, tracking in-flight assignments
//! - [`RecordBuilder`] - local objects and mutations to records
//! - [`WatermarkTracker`] - fetch requests and watermark advance
//! - [`RecordResolver`] - pairs remote records with local objects
//!
//! The actual I/O is performed by `sync-client`, which issues the
//! [`LocalUpdate`]s and messages these types hand back.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod watermark;

pub use builder::{
    is_syncable, plan, site_category, AdControl, BuildError, CookieControl, RecordBuilder, Step,
};
pub use model::{
    LocalDevice, LocalObject, LocalUpdate, LocalView, Mutation, ObjectPath, ObjectSlot, Site,
    SiteSettings, SiteTag,
};
pub use registry::{Assignment, ObjectIdRegistry};
pub use resolver::{find_local, local_update, RecordResolver, ResolveError};
pub use watermark::{CategoryFilter, WatermarkTracker};
