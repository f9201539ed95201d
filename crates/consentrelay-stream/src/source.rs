//! Inbound side: one subscription per worker.

use std::time::Duration;

use async_trait::async_trait;

use crate::StreamError;

/// A message pulled from the input topic, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    /// Milliseconds since the epoch, if the broker reported one.
    pub timestamp: Option<i64>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A consumer-group member owned by exactly one worker.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait at most `timeout` for the next message.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, StreamError>;

    /// Mark `message` as processed so the next commit includes it.
    fn store_offset(&mut self, message: &InboundMessage) -> Result<(), StreamError>;

    /// Commit stored offsets synchronously and leave the group.
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// Creates the per-worker subscriptions. All of them join the same group.
pub trait SourceFactory: Send + Sync {
    fn subscribe(&self, worker_id: usize) -> Result<Box<dyn MessageSource>, StreamError>;
}
