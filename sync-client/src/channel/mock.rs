//! Mock channel for testing.
//!
//! Plays the backend side: tests push inbound messages and inspect what the
//! engine sent.

use super::{Channel, ChannelError};
use async_trait::async_trait;
use sitesync_types::ChannelMessage;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// Mock channel for testing.
#[derive(Debug)]
pub struct MockChannel {
    inner: Arc<Mutex<MockChannelInner>>,
    inbound: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    sent_notify: Arc<Notify>,
}

#[derive(Debug)]
struct MockChannelInner {
    inbound_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    sent_frames: Vec<Vec<u8>>,
    fail_next_send: Option<String>,
}

impl MockChannel {
    /// Create a new mock channel.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(MockChannelInner {
                inbound_tx: Some(tx),
                sent_frames: Vec::new(),
                fail_next_send: None,
            })),
            inbound: Arc::new(tokio::sync::Mutex::new(rx)),
            sent_notify: Arc::new(Notify::new()),
        }
    }

    /// Queue a raw frame for the next `recv()`.
    pub fn push_frame(&self, frame: Vec<u8>) {
        let inner = self.inner.lock().unwrap();
        if let Some(tx) = &inner.inbound_tx {
            let _ = tx.send(frame);
        }
    }

    /// Queue a message for the next `recv()`.
    pub fn push(&self, message: &ChannelMessage) {
        self.push_frame(message.to_bytes().unwrap());
    }

    /// All frames sent so far.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.sent_frames.clone()
    }

    /// All messages sent so far, decoded.
    pub fn sent_messages(&self) -> Vec<ChannelMessage> {
        self.sent_frames()
            .iter()
            .map(|frame| ChannelMessage::from_bytes(frame).unwrap())
            .collect()
    }

    /// Sent messages of one kind (see [`ChannelMessage::kind`]).
    pub fn sent_of_kind(&self, kind: &str) -> Vec<ChannelMessage> {
        self.sent_messages()
            .into_iter()
            .filter(|message| message.kind() == kind)
            .collect()
    }

    /// Wait until at least `count` messages of `kind` have been sent.
    pub async fn wait_for_sent(&self, kind: &str, count: usize) -> Vec<ChannelMessage> {
        loop {
            let notified = self.sent_notify.notified();
            let matching = self.sent_of_kind(kind);
            if matching.len() >= count {
                return matching;
            }
            notified.await;
        }
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Whether close() has been called.
    pub fn is_closed(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.inbound_tx.is_none()
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockChannel {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            inbound: Arc::clone(&self.inbound),
            sent_notify: Arc::clone(&self.sent_notify),
        }
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&self, frame: &[u8]) -> Result<(), ChannelError> {
        {
            let mut inner = self.inner.lock().unwrap();

            if inner.inbound_tx.is_none() {
                return Err(ChannelError::Closed);
            }

            // Check for forced failure
            if let Some(error) = inner.fail_next_send.take() {
                return Err(ChannelError::SendFailed(error));
            }

            inner.sent_frames.push(frame.to_vec());
        }
        self.sent_notify.notify_waiters();
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        let mut inbound = self.inbound.lock().await;
        inbound.recv().await.ok_or(ChannelError::Closed)
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        inner.inbound_tx = None;
        Ok(())
    }
}
