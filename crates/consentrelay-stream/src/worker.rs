//! Ingestion worker: pull, process, publish, and store the offset, one
//! message at a time.
//!
//! An offset is stored only when the message's outcome is `Success` or
//! `NotApplicable`. A delivery `Failure` asks the coordinator to shut the
//! whole pipeline down and stops this worker without storing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::emitter::{Abandoned, DeliveryOutcome, Emitter};
use crate::processor::{Processed, RecordProcessor};
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::sink::OutboundRecord;
use crate::source::{InboundMessage, MessageSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: u64,
    pub committed: u64,
    pub dropped: u64,
    pub failed: u64,
}

enum Flow {
    Continue,
    Stop,
}

pub struct Worker {
    id: usize,
    source: Box<dyn MessageSource>,
    processor: Arc<dyn RecordProcessor>,
    emitter: Arc<Emitter>,
    shutdown: Shutdown,
    poll_interval: Duration,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(
        id: usize,
        source: Box<dyn MessageSource>,
        processor: Arc<dyn RecordProcessor>,
        emitter: Arc<Emitter>,
        shutdown: Shutdown,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            source,
            processor,
            emitter,
            shutdown,
            poll_interval,
            stats: WorkerStats::default(),
        }
    }

    /// Run until shutdown begins or a delivery fails, then commit and leave
    /// the group.
    pub async fn run(mut self) -> WorkerStats {
        info!(worker = self.id, "worker started");

        loop {
            let polled = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                polled = self.source.poll(self.poll_interval) => polled,
            };

            let message = match polled {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    warn!(worker = self.id, error = %e, "poll failed");
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
            };

            self.stats.received += 1;
            if let Flow::Stop = self.handle(&message).await {
                break;
            }
        }

        if let Err(e) = self.source.close().await {
            warn!(worker = self.id, error = %e, "closing subscription failed");
        }
        info!(
            worker = self.id,
            received = self.stats.received,
            committed = self.stats.committed,
            dropped = self.stats.dropped,
            "worker stopped"
        );
        self.stats
    }

    async fn handle(&mut self, message: &InboundMessage) -> Flow {
        let key = message
            .key
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        debug!(
            worker = self.id,
            key = %key,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "message received"
        );

        let Some(payload) = message.payload.as_deref() else {
            warn!(worker = self.id, offset = message.offset, "empty payload, dropped");
            self.stats.dropped += 1;
            return Flow::Continue;
        };

        let outcome = match self.processor.process(payload).await {
            Processed::Malformed(reason) => {
                warn!(
                    worker = self.id,
                    key = %key,
                    partition = message.partition,
                    offset = message.offset,
                    reason = %reason,
                    "malformed notification, dropped"
                );
                self.stats.dropped += 1;
                return Flow::Continue;
            }
            Processed::Skipped(reason) => {
                debug!(worker = self.id, offset = message.offset, reason = %reason, "nothing to publish");
                DeliveryOutcome::NotApplicable
            }
            Processed::Emit(payload) => {
                let record = OutboundRecord {
                    key: message.key.clone(),
                    timestamp: message.timestamp,
                    payload,
                };
                match self.emitter.publish(&record, &self.shutdown).await {
                    Ok(outcome) => outcome,
                    Err(Abandoned) => {
                        info!(
                            worker = self.id,
                            offset = message.offset,
                            "delivery abandoned on shutdown"
                        );
                        return Flow::Stop;
                    }
                }
            }
        };

        match outcome {
            DeliveryOutcome::Failure(reason) => {
                error!(
                    worker = self.id,
                    key = %key,
                    partition = message.partition,
                    offset = message.offset,
                    reason = %reason,
                    "delivery failed"
                );
                self.stats.failed += 1;
                self.shutdown
                    .trigger(ShutdownReason::DeliveryFailed { worker: self.id });
                Flow::Stop
            }
            DeliveryOutcome::NotApplicable | DeliveryOutcome::Success => {
                match self.source.store_offset(message) {
                    Ok(()) => self.stats.committed += 1,
                    Err(e) => warn!(
                        worker = self.id,
                        offset = message.offset,
                        error = %e,
                        "storing offset failed"
                    ),
                }
                Flow::Continue
            }
        }
    }
}
