//! Stream processing for consentrelay: consumer workers, the shared emitter,
//! and the shutdown coordinator.
//!
//! The broker is reached through two seams, [`SourceFactory`] for inbound
//! subscriptions and [`MessageSink`] for outbound records. The Kafka
//! implementations live behind the `kafka` feature.

pub mod emitter;
mod error;
pub mod pipeline;
pub mod processor;
pub mod shutdown;
pub mod sink;
pub mod source;
pub mod worker;

#[cfg(feature = "kafka")]
pub mod kafka;

#[cfg(test)]
pub(crate) mod testing;

pub use emitter::{Abandoned, DeliveryOutcome, Emitter};
pub use error::StreamError;
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport};
pub use processor::{Processed, RecordProcessor};
pub use shutdown::{Phase, Shutdown, ShutdownReason};
pub use sink::{DeliveryReceipt, MessageSink, OutboundRecord, SendError};
pub use source::{InboundMessage, MessageSource, SourceFactory};
pub use worker::{Worker, WorkerStats};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaSink, KafkaSourceFactory};
