//! Persisted engine state.
//!
//! The engine owns three values across restarts: the sync seed, this
//! installation's device id, and the last fetch watermark. Everything else
//! is re-derived from local state at start-up.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sitesync_types::{DeviceId, Seed, Watermark};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// File name used by [`JsonFileStore::in_dir`].
pub const STATE_FILE: &str = "sync-state.json";

/// State the engine persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Sync chain seed.
    #[serde(default)]
    pub seed: Option<Seed>,
    /// This installation's device id.
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    /// Last fetch boundary.
    #[serde(default)]
    pub last_fetch_watermark: Watermark,
}

/// State store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the state file failed.
    #[error("state file {path}: {source}")]
    Io {
        /// Path to the state file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The state file is not valid JSON.
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        /// Path to the state file.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// Forced failure (tests).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for [`PersistedState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the stored state; a store that was never written loads as default.
    async fn load(&self) -> Result<PersistedState, StoreError>;

    /// Persist identity handed over by the backend.
    async fn save_init_data(&self, seed: &Seed, device_id: &DeviceId) -> Result<(), StoreError>;

    /// Persist the fetch watermark.
    async fn save_watermark(&self, watermark: Watermark) -> Result<(), StoreError>;

    /// Forget everything.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    state: PersistedState,
    fail_next_save: Option<String>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `state`.
    pub fn with_state(state: PersistedState) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().state = state;
        store
    }

    /// Current contents.
    pub fn snapshot(&self) -> PersistedState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Cause the next save to fail with the given error.
    pub fn fail_next_save(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_save = Some(error.to_string());
    }

    fn update(&self, f: impl FnOnce(&mut PersistedState)) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_save.take() {
            return Err(StoreError::Unavailable(error));
        }
        f(&mut inner.state);
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<PersistedState, StoreError> {
        Ok(self.snapshot())
    }

    async fn save_init_data(&self, seed: &Seed, device_id: &DeviceId) -> Result<(), StoreError> {
        self.update(|state| {
            state.seed = Some(seed.clone());
            state.device_id = Some(device_id.clone());
        })
    }

    async fn save_watermark(&self, watermark: Watermark) -> Result<(), StoreError> {
        self.update(|state| state.last_fetch_watermark = watermark)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.update(|state| *state = PersistedState::default())
    }
}

/// JSON file store, readable only by its owner on Unix.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles from the engine and the poll task.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Store at an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Store at [`STATE_FILE`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(STATE_FILE))
    }

    /// The state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<PersistedState, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedState::default())
            }
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            source: e,
        })
    }

    async fn write(&self, state: &PersistedState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let contents = serde_json::to_string_pretty(state).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            source: e,
        })?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| self.io_error(e))?;
        set_file_permissions_0600(&self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    async fn update(&self, f: impl FnOnce(&mut PersistedState) + Send) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.read().await?;
        f(&mut state);
        self.write(&state).await
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<PersistedState, StoreError> {
        self.read().await
    }

    async fn save_init_data(&self, seed: &Seed, device_id: &DeviceId) -> Result<(), StoreError> {
        let seed = seed.clone();
        let device_id = device_id.clone();
        self.update(move |state| {
            state.seed = Some(seed);
            state.device_id = Some(device_id);
        })
        .await
    }

    async fn save_watermark(&self, watermark: Watermark) -> Result<(), StoreError> {
        self.update(move |state| state.last_fetch_watermark = watermark)
            .await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_default() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());

        let state = store.load().await.unwrap();
        assert_eq!(state, PersistedState::default());
    }

    #[tokio::test]
    async fn init_data_and_watermark_roundtrip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        let seed = Seed::from_bytes(&[0x42; 32]);
        let device_id = DeviceId::from_bytes(&[3]);

        store.save_init_data(&seed, &device_id).await.unwrap();
        store
            .save_watermark(Watermark::new(1_700_000_000))
            .await
            .unwrap();

        let reopened = JsonFileStore::in_dir(dir.path());
        let state = reopened.load().await.unwrap();
        assert_eq!(state.seed, Some(seed));
        assert_eq!(state.device_id, Some(device_id));
        assert_eq!(state.last_fetch_watermark, Watermark::new(1_700_000_000));
    }

    #[tokio::test]
    async fn clear_removes_state() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        store.save_watermark(Watermark::new(5)).await.unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(store.load().await.unwrap(), PersistedState::default());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        tokio::fs::write(store.path(), "{not json").await.unwrap();

        assert!(matches!(
            store.load().await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn state_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        store.save_watermark(Watermark::new(1)).await.unwrap();

        let perms = tokio::fs::metadata(store.path()).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "file should be 0600");
    }

    #[tokio::test]
    async fn memory_store_forced_failure() {
        let store = MemoryStateStore::new();
        store.fail_next_save("disk full");

        assert!(store.save_watermark(Watermark::new(9)).await.is_err());
        store.save_watermark(Watermark::new(9)).await.unwrap();
        assert_eq!(store.snapshot().last_fetch_watermark, Watermark::new(9));
    }
}
