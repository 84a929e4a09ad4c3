//! Show persisted sync state.

use anyhow::{Context, Result};
use sitesync_client::{JsonFileStore, StateStore};
use std::path::Path;

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let store = JsonFileStore::in_dir(data_dir);
    let state = store
        .load()
        .await
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    println!("=== sitesync status ===");
    println!();

    match &state.device_id {
        Some(device_id) => {
            println!("Identity:");
            println!("  Device ID: {}", hex::encode(device_id.as_bytes()));
            let seed = if state.seed.is_some() {
                "stored"
            } else {
                "missing"
            };
            println!("  Seed:      {}", seed);
        }
        None => {
            println!("Identity: NOT ESTABLISHED");
            println!();
            println!("The backend hands over an identity on first start.");
        }
    }

    println!();
    println!("Fetch:");
    if state.last_fetch_watermark.value() == 0 {
        println!("  Last fetch: never");
    } else {
        println!(
            "  Last fetch: {} ({})",
            state.last_fetch_watermark,
            format_timestamp(state.last_fetch_watermark.value())
        );
    }
    println!("  State file: {}", store.path().display());

    Ok(())
}

/// Format a Unix timestamp relative to now.
fn format_timestamp(ts: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let diff = now.saturating_sub(ts);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
