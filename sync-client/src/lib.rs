//! # sitesync-client
//!
//! Sync engine for sitesync.
//!
//! This is the library a browser embeds to keep bookmarks, history and
//! site settings in step with a sync backend.
//!
//! ## Features
//!
//! - **Single-writer actor**: channel frames and mutations are handled one at a time
//! - **Optimistic id assignment**: objects get ids without waiting for persistence
//! - **Channel Abstraction**: Pluggable backend channel (mock for tests)
//! - **Pure Core**: Uses sitesync-core for side-effect-free record logic
//!
//! ## Example
//!
//! ```ignore
//! use sitesync_client::{EngineConfig, JsonFileStore, SyncEngine, SystemClock};
//!
//! let handle = SyncEngine::start(
//!     EngineConfig::default(),
//!     channel,
//!     local_state,
//!     Arc::new(JsonFileStore::in_dir(&data_dir)),
//!     Arc::new(SystemClock),
//!     bus.subscribe(),
//! );
//!
//! // Later
//! handle.stop().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod local;
pub mod poller;
pub mod store;

pub use channel::{Channel, ChannelError, MockChannel};
pub use clock::{Clock, SystemClock};
pub use config::{BackendConfig, ConfigError, EngineConfig};
pub use dispatcher::RecordDispatcher;
pub use engine::{EngineError, EngineHandle, EngineStatus, SyncEngine};
pub use local::{LocalSnapshot, LocalState, MemoryLocalState};
pub use poller::{spawn_poll_task, PollHandle};
pub use store::{
    JsonFileStore, MemoryStateStore, PersistedState, StateStore, StoreError, STATE_FILE,
};
