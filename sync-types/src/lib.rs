//! # sync-types
//!
//! Wire format types for the sitesync browser state sync protocol.
//!
//! This crate provides the foundational types used across all sitesync crates:
//! - [`ObjectId`], [`DeviceId`], [`Seed`], [`Watermark`] - Identity and ordering types
//! - [`Category`], [`ServerCategory`] - Sync domains
//! - [`SyncRecord`] - Create/update/delete of one synced object
//! - [`ChannelMessage`] - Messages exchanged with the sync backend
//! - [`TransportValue`] - Binary-free values for the channel edge
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod category;
mod error;
mod ids;
mod messages;
mod record;
mod transport;

pub use category::{Category, ServerCategory};
pub use error::SyncError;
pub use ids::{DeviceId, ObjectId, Seed, Watermark, OBJECT_ID_LEN, SEED_LEN};
pub use messages::{
    ChannelMessage, DeleteCategory, FetchRecords, GetExistingObjects, GotInitData, InitConfig,
    Ready, ResolvePair, ResolveRecords, ResolvedRecords, SaveInitData, SendRecords, SyncNotice,
};
pub use record::{
    BookmarkPayload, DevicePayload, RecordAction, RecordPayload, SiteFields, SiteSettingPayload,
    SyncRecord,
};
pub use transport::{make_transport_safe, TransportValue};
