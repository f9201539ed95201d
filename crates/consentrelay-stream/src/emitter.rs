//! Emission: publish one record and wait for its delivery outcome.
//!
//! A full send buffer is retried after a fixed backoff until the record is
//! accepted or shutdown begins. The acknowledgment wait has no timeout. It is
//! only cut short by shutdown, in which case the outcome is unknown and the
//! caller must not store the offset.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::shutdown::Shutdown;
use crate::sink::{MessageSink, OutboundRecord, SendError};

/// Result of handling one source message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Nothing to publish for this message.
    NotApplicable,
    Success,
    Failure(String),
}

impl DeliveryOutcome {
    /// Whether the source offset may be stored for commit.
    pub fn is_committable(&self) -> bool {
        matches!(self, Self::NotApplicable | Self::Success)
    }
}

/// Shutdown interrupted a publish; delivery status is unknown.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("publish abandoned on shutdown")]
pub struct Abandoned;

pub struct Emitter {
    sink: Arc<dyn MessageSink>,
    retry_interval: Duration,
}

impl Emitter {
    pub fn new(sink: Arc<dyn MessageSink>, retry_interval: Duration) -> Self {
        Self {
            sink,
            retry_interval,
        }
    }

    pub async fn publish(
        &self,
        record: &OutboundRecord,
        shutdown: &Shutdown,
    ) -> Result<DeliveryOutcome, Abandoned> {
        let mut retries = 0u32;
        let receipt = loop {
            match self.sink.try_send(record) {
                Ok(receipt) => break receipt,
                Err(SendError::QueueFull) => {
                    retries += 1;
                    debug!(retries, "send queue full, backing off");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return Err(Abandoned),
                        _ = tokio::time::sleep(self.retry_interval) => {}
                    }
                }
                Err(SendError::Rejected(reason)) => {
                    return Ok(DeliveryOutcome::Failure(reason));
                }
            }
        };
        if retries > 0 {
            info!(retries, "record accepted after queue-full retries");
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(Abandoned),
            ack = receipt => Ok(match ack {
                Ok(()) => DeliveryOutcome::Success,
                Err(reason) => DeliveryOutcome::Failure(reason),
            }),
        }
    }

    /// Flush outstanding records in up to `rounds` rounds of `timeout` each.
    /// Returns the number of records still undelivered.
    pub async fn drain(&self, timeout: Duration, rounds: u32) -> usize {
        let rounds = rounds.max(1);
        let mut remaining = 0;
        for round in 1..=rounds {
            remaining = self.sink.flush(timeout).await;
            if remaining == 0 {
                debug!(round, "producer flushed");
                return 0;
            }
            info!(round, rounds, remaining, "waiting for outstanding deliveries");
        }
        warn!(remaining, "producer not fully flushed, records may be lost");
        remaining
    }

    pub fn close(&self) {
        self.sink.close();
    }
}
