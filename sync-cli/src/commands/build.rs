//! Dry-run record building.
//!
//! Loads a local-state snapshot, runs mutation events through the
//! dispatcher and prints the channel messages it would send. Nothing is
//! sent and the snapshot file is left untouched.

use anyhow::{Context, Result};
use sitesync_client::{JsonFileStore, LocalSnapshot, MemoryLocalState, RecordDispatcher, StateStore};
use sitesync_core::{Mutation, RecordBuilder};
use sitesync_types::{ChannelMessage, DeviceId};
use std::path::{Path, PathBuf};

/// Inputs for the build command.
#[derive(Debug)]
pub struct BuildOptions {
    /// Snapshot of local state (JSON).
    pub state: PathBuf,
    /// Hex device id overriding the persisted one.
    pub device_id: Option<String>,
    /// Include the first-run backfill.
    pub first_run: bool,
    /// Mutation events, one JSON object each.
    pub mutations: Vec<String>,
    /// Engine config file.
    pub config: PathBuf,
}

/// Run the build command.
pub async fn run(data_dir: &Path, options: &BuildOptions) -> Result<()> {
    let messages = plan_messages(data_dir, options).await?;
    for message in &messages {
        println!("{}", serde_json::to_string_pretty(message)?);
    }
    eprintln!("{} message(s)", messages.len());
    Ok(())
}

/// Build the messages without printing them.
pub async fn plan_messages(data_dir: &Path, options: &BuildOptions) -> Result<Vec<ChannelMessage>> {
    let config = super::config::load(&options.config)?;
    let device_id = resolve_device_id(data_dir, options.device_id.as_deref()).await?;

    let contents = tokio::fs::read_to_string(&options.state)
        .await
        .with_context(|| format!("Failed to read {}", options.state.display()))?;
    let snapshot: LocalSnapshot =
        serde_json::from_str(&contents).context("Invalid local-state snapshot")?;

    let mutations = options
        .mutations
        .iter()
        .map(|json| {
            serde_json::from_str::<Mutation>(json)
                .with_context(|| format!("Invalid mutation: {}", json))
        })
        .collect::<Result<Vec<_>>>()?;

    let local = MemoryLocalState::from_snapshot(snapshot);
    let mut dispatcher = RecordDispatcher::new(RecordBuilder::new(device_id), config.categories);

    let mut messages = Vec::new();
    if options.first_run {
        messages.extend(dispatcher.first_run_backfill(&local, &config.device_name));
    }
    messages.extend(dispatcher.dispatch(&local, &mutations));

    let assigned = local.requests().len();
    if assigned > 0 {
        tracing::info!("{} object id(s) would be assigned", assigned);
    }
    Ok(messages)
}

async fn resolve_device_id(data_dir: &Path, hex_id: Option<&str>) -> Result<DeviceId> {
    if let Some(hex_id) = hex_id {
        let bytes = hex::decode(hex_id).context("Device id must be hex")?;
        anyhow::ensure!(!bytes.is_empty(), "Device id must not be empty");
        return Ok(DeviceId::from_bytes(&bytes));
    }

    let state = JsonFileStore::in_dir(data_dir).load().await?;
    state.device_id.context(
        "No device id established. Pass --device-id or let the backend hand one over first.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_core::{Site, SiteTag};
    use sitesync_types::{RecordAction, RecordPayload, Seed};
    use tempfile::tempdir;

    fn write_snapshot(dir: &Path) -> PathBuf {
        let mut snapshot = LocalSnapshot::default();
        snapshot.sites.insert(
            3,
            Site {
                location: "https://example.com/".into(),
                tags: vec![SiteTag::Bookmark],
                ..Default::default()
            },
        );
        let path = dir.join("snapshot.json");
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
        path
    }

    fn options(dir: &Path, device_id: Option<&str>) -> BuildOptions {
        BuildOptions {
            state: write_snapshot(dir),
            device_id: device_id.map(str::to_string),
            first_run: false,
            mutations: vec![r#"{"type":"addSite","index":3}"#.to_string()],
            config: dir.join("sitesync.toml"),
        }
    }

    #[tokio::test]
    async fn added_bookmark_builds_one_create() {
        let dir = tempdir().unwrap();
        let messages = plan_messages(dir.path(), &options(dir.path(), Some("0a0b0c")))
            .await
            .unwrap();

        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ChannelMessage::SendRecords(send) => {
                assert_eq!(send.category, "BOOKMARKS");
                assert_eq!(send.records.len(), 1);
                assert_eq!(send.records[0].action, RecordAction::Create);
                assert_eq!(
                    send.records[0].device_id,
                    DeviceId::from_bytes(&[10, 11, 12])
                );
                assert!(matches!(
                    &send.records[0].payload,
                    RecordPayload::Bookmark(bookmark) if !bookmark.is_folder
                ));
            }
            other => panic!("Expected SendRecords, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn persisted_device_id_is_used() {
        let dir = tempdir().unwrap();
        JsonFileStore::in_dir(dir.path())
            .save_init_data(&Seed::from_bytes(&[1; 32]), &DeviceId::from_bytes(&[5]))
            .await
            .unwrap();

        let messages = plan_messages(dir.path(), &options(dir.path(), None))
            .await
            .unwrap();
        match &messages[0] {
            ChannelMessage::SendRecords(send) => {
                assert_eq!(send.records[0].device_id, DeviceId::from_bytes(&[5]));
            }
            other => panic!("Expected SendRecords, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_device_id_is_an_error() {
        let dir = tempdir().unwrap();
        let result = plan_messages(dir.path(), &options(dir.path(), None)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn bad_mutation_is_an_error() {
        let dir = tempdir().unwrap();
        let mut options = options(dir.path(), Some("01"));
        options.mutations = vec!["{\"type\":\"explode\"}".to_string()];

        assert!(plan_messages(dir.path(), &options).await.is_err());
    }
}
