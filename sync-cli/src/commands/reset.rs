//! Forget persisted sync state.

use anyhow::{Context, Result};
use sitesync_client::{JsonFileStore, StateStore};
use std::path::Path;

/// Run the reset command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let store = JsonFileStore::in_dir(data_dir);
    store
        .clear()
        .await
        .with_context(|| format!("Failed to clear {}", store.path().display()))?;

    println!("Sync state cleared.");
    println!();
    println!("The backend will hand over a new identity on next start.");
    Ok(())
}
