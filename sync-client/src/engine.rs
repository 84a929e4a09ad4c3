//! The sync engine.
//!
//! A single actor task owns all engine state. It handles channel frames,
//! mutation batches and shutdown one at a time, so resolution and record
//! building never race for the same object.
//!
//! # Lifecycle
//!
//! 1. `GET_INIT_DATA`: answer with stored identity and backend config
//! 2. `SAVE_INIT_DATA`: persist the identity the backend chose
//! 3. `READY`: start-up backfill, then start polling
//!
//! Mutations that arrive before `READY` are dropped; the start-up backfill
//! covers them.

use sitesync_core::{
    local_update, Mutation, RecordBuilder, RecordResolver, ResolveError, WatermarkTracker,
};
use sitesync_types::{
    ChannelMessage, DeviceId, GetExistingObjects, GotInitData, Ready, ResolveRecords,
    ResolvedRecords, SaveInitData, ServerCategory, SyncError,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use crate::channel::{Channel, ChannelError};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::dispatcher::RecordDispatcher;
use crate::local::LocalState;
use crate::poller::{spawn_poll_task, PollHandle};
use crate::store::{PersistedState, StateStore, StoreError};

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Records cannot be sent before a device id is established.
    #[error("no device id established")]
    NoDeviceId,

    /// Persisted state error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Frame encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] SyncError),

    /// Inbound record resolution failed.
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// The engine task panicked or was aborted.
    #[error("engine task failed: {0}")]
    TaskFailed(String),
}

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Waiting for the bootstrap handshake.
    Starting,
    /// Syncing.
    Ready {
        /// Whether `READY` announced a first run.
        is_first_run: bool,
    },
    /// Disabled by configuration.
    Disabled,
    /// Shut down.
    Stopped,
}

/// Entry point.
pub struct SyncEngine;

impl SyncEngine {
    /// Start the engine actor.
    ///
    /// The engine owns `mutations` from here on; stopping it drops the
    /// subscription.
    pub fn start(
        config: EngineConfig,
        channel: Arc<dyn Channel>,
        local: Arc<dyn LocalState>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        mutations: broadcast::Receiver<Mutation>,
    ) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(EngineStatus::Starting);

        let actor = EngineActor {
            config,
            channel,
            local,
            store,
            clock,
            status: status_tx,
            state: PersistedState::default(),
            running: None,
        };
        let task = tokio::spawn(actor.run(shutdown_rx, mutations));

        EngineHandle {
            shutdown: Some(shutdown_tx),
            task,
            status: status_rx,
        }
    }
}

/// Handle to a running engine.
///
/// Dropping the handle aborts the engine.
#[derive(Debug)]
pub struct EngineHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), EngineError>>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    /// Stop the engine and wait for it to wind down.
    ///
    /// On return the mutation subscription is dropped, the channel is no
    /// longer read and the poll task is cancelled.
    pub async fn stop(mut self) -> Result<(), EngineError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(EngineError::TaskFailed(e.to_string())),
        }
    }

    /// Current status.
    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// State that exists once `READY` has been handled.
struct Running {
    dispatcher: RecordDispatcher,
    resolver: RecordResolver,
    poller: PollHandle,
}

struct EngineActor {
    config: EngineConfig,
    channel: Arc<dyn Channel>,
    local: Arc<dyn LocalState>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    status: watch::Sender<EngineStatus>,
    state: PersistedState,
    running: Option<Running>,
}

enum Event {
    Shutdown,
    Frame(Result<Vec<u8>, ChannelError>),
    Mutations(Result<Vec<Mutation>, RecvError>),
}

impl EngineActor {
    async fn run(
        mut self,
        mut shutdown: oneshot::Receiver<()>,
        mutations: broadcast::Receiver<Mutation>,
    ) -> Result<(), EngineError> {
        if !self.config.enabled {
            tracing::info!("Sync disabled by configuration");
            let _ = self.status.send(EngineStatus::Disabled);
            return Ok(());
        }

        self.state = match self.store.load().await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("Failed to load sync state: {}", e);
                let _ = self.status.send(EngineStatus::Stopped);
                return Err(e.into());
            }
        };
        tracing::info!(
            "Sync engine started (device id: {}, watermark: {})",
            if self.state.device_id.is_some() { "set" } else { "none" },
            self.state.last_fetch_watermark
        );

        let mut mutations = Some(mutations);

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => Event::Shutdown,
                result = next_mutations(&mut mutations) => Event::Mutations(result),
                result = self.channel.recv() => Event::Frame(result),
            };

            match event {
                Event::Shutdown => break,
                Event::Mutations(Ok(batch)) => self.on_mutations(&batch).await,
                Event::Mutations(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!("Mutation bus lagged, {} events lost", skipped);
                }
                Event::Mutations(Err(RecvError::Closed)) => {
                    tracing::info!("Mutation bus closed");
                    mutations = None;
                }
                Event::Frame(Ok(frame)) => self.on_frame(&frame).await,
                Event::Frame(Err(ChannelError::Closed)) => {
                    tracing::info!("Channel closed");
                    break;
                }
                Event::Frame(Err(e)) => {
                    tracing::warn!("Channel receive failed: {}", e);
                    break;
                }
            }
        }

        if let Some(running) = self.running.take() {
            running.poller.cancel();
        }
        drop(mutations);
        let _ = self.status.send(EngineStatus::Stopped);
        tracing::info!("Sync engine stopped");
        Ok(())
    }

    async fn on_mutations(&mut self, batch: &[Mutation]) {
        let Some(running) = self.running.as_mut() else {
            tracing::debug!("Dropping {} mutations received before READY", batch.len());
            return;
        };
        let messages = running.dispatcher.dispatch(self.local.as_ref(), batch);
        if let Err(e) = self.send_records(messages).await {
            tracing::warn!("Failed to send records: {}", e);
        }
    }

    async fn on_frame(&mut self, frame: &[u8]) {
        let message = match ChannelMessage::from_bytes(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame ({} bytes): {}", frame.len(), e);
                return;
            }
        };

        let kind = message.kind();
        tracing::debug!("Received {}", kind);
        match self.handle_message(message).await {
            Ok(()) => {}
            Err(EngineError::NoDeviceId) => {
                tracing::error!("{} refused: no device id established", kind);
            }
            Err(e) => tracing::warn!("Failed to handle {}: {}", kind, e),
        }
    }

    async fn handle_message(&mut self, message: ChannelMessage) -> Result<(), EngineError> {
        match message {
            ChannelMessage::GetInitData => {
                let reply = ChannelMessage::GotInitData(GotInitData {
                    seed: self.state.seed.clone(),
                    device_id: self.state.device_id.clone(),
                    config: self.config.backend.init_config(),
                });
                self.send(&reply).await
            }
            ChannelMessage::SaveInitData(init) => self.on_save_init_data(init).await,
            ChannelMessage::Ready(ready) => self.on_ready(ready).await,
            ChannelMessage::GetExistingObjects(request) => {
                self.on_get_existing_objects(request).await
            }
            ChannelMessage::ResolvedRecords(resolved) => {
                self.on_resolved_records(resolved);
                Ok(())
            }
            ChannelMessage::SyncSetupError(notice) => {
                tracing::error!("Sync setup failed: {}", notice.message);
                Ok(())
            }
            ChannelMessage::SyncDebug(notice) => {
                tracing::debug!("Backend: {}", notice.message);
                Ok(())
            }
            other => {
                tracing::debug!("Ignoring outbound-only message {}", other.kind());
                Ok(())
            }
        }
    }

    async fn on_save_init_data(&mut self, init: SaveInitData) -> Result<(), EngineError> {
        if let Some(existing) = &self.state.device_id {
            if existing != &init.device_id {
                tracing::warn!("Ignoring SAVE_INIT_DATA with a different device id");
                return Ok(());
            }
        }

        self.store.save_init_data(&init.seed, &init.device_id).await?;
        self.state.seed = Some(init.seed);
        self.state.device_id = Some(init.device_id);
        tracing::info!("Sync identity saved");
        Ok(())
    }

    async fn on_ready(&mut self, ready: Ready) -> Result<(), EngineError> {
        if self.running.is_some() {
            tracing::debug!("Ignoring repeated READY");
            return Ok(());
        }
        let device_id = self.device_id()?;

        let running = self.start_running(device_id);
        let running = self.running.insert(running);

        let local = self.local.as_ref();
        let device_name = &self.config.device_name;
        let mut messages = Vec::new();
        if ready.is_first_run {
            let backfill = running.dispatcher.first_run_backfill(local, device_name);
            messages.extend(backfill);
        }
        messages.extend(running.dispatcher.site_settings_backfill(local));

        let _ = self.status.send(EngineStatus::Ready {
            is_first_run: ready.is_first_run,
        });
        tracing::info!("Sync ready (first run: {})", ready.is_first_run);

        self.send_records(messages).await
    }

    /// The established device id. Nothing is built or sent without one.
    fn device_id(&self) -> Result<DeviceId, EngineError> {
        self.state.device_id.clone().ok_or(EngineError::NoDeviceId)
    }

    fn start_running(&self, device_id: DeviceId) -> Running {
        let builder = RecordBuilder::new(device_id);
        let tracker = WatermarkTracker::new(
            self.state.last_fetch_watermark,
            self.config.categories.fetch_categories(),
        );

        Running {
            dispatcher: RecordDispatcher::new(builder.clone(), self.config.categories),
            resolver: RecordResolver::new(builder),
            poller: spawn_poll_task(
                self.channel.clone(),
                self.store.clone(),
                self.clock.clone(),
                tracker,
                self.config.fetch_interval(),
            ),
        }
    }

    async fn on_get_existing_objects(
        &mut self,
        request: GetExistingObjects,
    ) -> Result<(), EngineError> {
        let Some(running) = self.running.as_ref() else {
            tracing::warn!("Ignoring GET_EXISTING_OBJECTS before READY");
            return Ok(());
        };
        let Some(category) = parse_category(&request.category) else {
            return Ok(());
        };

        let pairs = running
            .resolver
            .resolve_incoming(self.local.as_ref(), category, &request.records)?;
        let reply = ChannelMessage::ResolveRecords(ResolveRecords {
            category: request.category,
            pairs,
        });
        self.send(&reply).await
    }

    fn on_resolved_records(&self, resolved: ResolvedRecords) {
        let Some(category) = parse_category(&resolved.category) else {
            return;
        };

        let mut applied = 0usize;
        for record in &resolved.records {
            if record.category().server_category() != category {
                tracing::warn!(
                    "Skipping {} record in {} batch",
                    record.category(),
                    category
                );
                continue;
            }
            match local_update(record) {
                Ok(update) => {
                    self.local.request(update);
                    applied += 1;
                }
                Err(e) => tracing::warn!("Skipping resolved record: {}", e),
            }
        }
        tracing::debug!(
            "Applied {}/{} resolved {} records",
            applied,
            resolved.records.len(),
            category
        );
    }

    async fn send_records(&self, messages: Vec<ChannelMessage>) -> Result<(), EngineError> {
        if messages.is_empty() {
            return Ok(());
        }
        for message in &messages {
            if let Err(e) = self.send(message).await {
                tracing::warn!("Failed to send {}: {}", message.kind(), e);
            }
        }
        Ok(())
    }

    async fn send(&self, message: &ChannelMessage) -> Result<(), EngineError> {
        let frame = message.to_bytes()?;
        self.channel.send(&frame).await?;
        tracing::debug!("Sent {}", message.kind());
        Ok(())
    }
}

/// Wait for the next mutation and drain whatever else is queued.
///
/// Never resolves once the bus is gone.
async fn next_mutations(
    mutations: &mut Option<broadcast::Receiver<Mutation>>,
) -> Result<Vec<Mutation>, RecvError> {
    let Some(rx) = mutations.as_mut() else {
        return std::future::pending().await;
    };

    let mut batch = vec![rx.recv().await?];
    loop {
        match rx.try_recv() {
            Ok(mutation) => batch.push(mutation),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!("Mutation bus lagged, {} events lost", skipped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    Ok(batch)
}

fn parse_category(name: &str) -> Option<ServerCategory> {
    match name.parse::<ServerCategory>() {
        Ok(category) => Some(category),
        Err(_) => {
            tracing::warn!("Ignoring message for unknown category {:?}", name);
            None
        }
    }
}
