//! Outbound side: the producer shared by all workers.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

/// A record for the output topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub key: Option<Vec<u8>>,
    pub timestamp: Option<i64>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The local send buffer is full; retrying later may succeed.
    #[error("send queue full")]
    QueueFull,
    #[error("send rejected: {0}")]
    Rejected(String),
}

/// Resolves once the broker acknowledged (or refused) a record.
pub type DeliveryReceipt = BoxFuture<'static, Result<(), String>>;

#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Enqueue `record` without waiting for the broker.
    fn try_send(&self, record: &OutboundRecord) -> Result<DeliveryReceipt, SendError>;

    /// Wait up to `timeout` for outstanding records. Returns how many remain.
    async fn flush(&self, timeout: Duration) -> usize;

    /// Release the producer. Later sends are rejected.
    fn close(&self);
}
