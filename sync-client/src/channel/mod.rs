//! Channel abstraction for sitesync.
//!
//! The engine talks to the sync backend over an ordered, reliable,
//! point-to-point message channel. Frames are opaque bytes here; encoding
//! is [`ChannelMessage::to_bytes`](sitesync_types::ChannelMessage::to_bytes).
//!
//! # Design
//!
//! - `send()` transmits one frame, fire-and-forget
//! - `recv()` waits for the next frame and must be cancel-safe, since the
//!   engine races it against mutations and shutdown
//! - `close()` tears the channel down; pending and later `recv()` calls
//!   return [`ChannelError::Closed`]

mod mock;

pub use mock::MockChannel;

use async_trait::async_trait;
use thiserror::Error;

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel is closed.
    #[error("channel closed")]
    Closed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Message channel to the sync backend.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send one frame.
    async fn send(&self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Receive the next frame.
    ///
    /// Cancel-safe: dropping the future loses no frame.
    async fn recv(&self) -> Result<Vec<u8>, ChannelError>;

    /// Close the channel.
    async fn close(&self) -> Result<(), ChannelError>;
}
