//! Kafka adapters built on rdkafka.
//!
//! Offsets are stored explicitly after each handled message and committed by
//! the client's auto-commit timer, plus one synchronous commit when a worker
//! leaves the group.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::{debug, info, warn};

use consentrelay_core::config::{AppConfig, KafkaConfig};

use crate::sink::{DeliveryReceipt, MessageSink, OutboundRecord, SendError};
use crate::source::{InboundMessage, MessageSource, SourceFactory};
use crate::StreamError;

const AUTO_COMMIT_INTERVAL_MS: &str = "5000";

/// Connection settings shared by consumers and the producer.
fn base_config(kafka: &KafkaConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &kafka.bootstrap_servers)
        .set("security.protocol", &kafka.security_protocol);

    let ssl = &kafka.ssl;
    for (key, value) in [
        ("ssl.ca.location", &ssl.ca_location),
        ("ssl.certificate.location", &ssl.certificate_location),
        ("ssl.key.location", &ssl.key_location),
        ("ssl.key.password", &ssl.key_password),
    ] {
        if !value.is_empty() {
            config.set(key, value);
        }
    }
    config
}

fn consumer_config(app: &AppConfig, worker_id: usize) -> ClientConfig {
    let mut config = base_config(&app.kafka);
    config
        .set("group.id", &app.app.name)
        .set("client.id", worker_id.to_string())
        .set("enable.auto.commit", "true")
        .set("enable.auto.offset.store", "false")
        .set("auto.commit.interval.ms", AUTO_COMMIT_INTERVAL_MS)
        .set("auto.offset.reset", "earliest")
        .set("broker.address.family", "v4")
        .set("enable.partition.eof", "false");
    config
}

fn producer_config(app: &AppConfig) -> ClientConfig {
    let mut config = base_config(&app.kafka);
    config.set("client.id", &app.app.name);
    config
}

// ── Source ──

/// Subscribes one `StreamConsumer` per worker to the input topic.
pub struct KafkaSourceFactory {
    config: AppConfig,
}

impl KafkaSourceFactory {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl SourceFactory for KafkaSourceFactory {
    fn subscribe(&self, worker_id: usize) -> Result<Box<dyn MessageSource>, StreamError> {
        let consumer: StreamConsumer = consumer_config(&self.config, worker_id).create()?;
        let topic = self.config.kafka.input_topic.as_str();
        consumer
            .subscribe(&[topic])
            .map_err(|e| StreamError::Subscribe(format!("{topic}: {e}")))?;
        info!(worker = worker_id, topic, "subscribed");
        Ok(Box::new(KafkaSource {
            worker: worker_id,
            consumer,
        }))
    }
}

struct KafkaSource {
    worker: usize,
    consumer: StreamConsumer,
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, StreamError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(e)) => Err(StreamError::Receive(e.to_string())),
            Ok(Ok(message)) => Ok(Some(InboundMessage {
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec),
                timestamp: message.timestamp().to_millis(),
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
            })),
        }
    }

    fn store_offset(&mut self, message: &InboundMessage) -> Result<(), StreamError> {
        // The stored offset is the next one to read.
        self.consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)
            .map_err(|e| StreamError::Commit(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        let committed = match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => {
                debug!(worker = self.worker, "offsets committed");
                Ok(())
            }
            // Nothing stored since the last commit.
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => Ok(()),
            Err(e) => Err(StreamError::Commit(e.to_string())),
        };
        self.consumer.unsubscribe();
        info!(worker = self.worker, "unsubscribed");
        committed
    }
}

// ── Sink ──

/// Producer for the output topic, shared by all workers.
///
/// `close` drops the producer, which purges whatever is still queued.
pub struct KafkaSink {
    producer: Mutex<Option<FutureProducer>>,
    topic: String,
}

impl KafkaSink {
    pub fn new(config: &AppConfig) -> Result<Self, StreamError> {
        let producer: FutureProducer = producer_config(config).create()?;
        Ok(Self {
            producer: Mutex::new(Some(producer)),
            topic: config.kafka.output_topic.clone(),
        })
    }

    /// The live producer, or `None` once closed.
    fn producer(&self) -> Option<FutureProducer> {
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MessageSink for KafkaSink {
    fn try_send(&self, record: &OutboundRecord) -> Result<DeliveryReceipt, SendError> {
        let Some(producer) = self.producer() else {
            return Err(SendError::Rejected("producer closed".to_string()));
        };
        let mut future_record =
            FutureRecord::<[u8], [u8]>::to(&self.topic).payload(record.payload.as_slice());
        if let Some(key) = record.key.as_deref() {
            future_record = future_record.key(key);
        }
        if let Some(timestamp) = record.timestamp {
            future_record = future_record.timestamp(timestamp);
        }

        match producer.send_result(future_record) {
            Ok(delivery) => Ok(delivery
                .map(|result| match result {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err((e, _message))) => Err(e.to_string()),
                    Err(_canceled) => Err("delivery canceled".to_string()),
                })
                .boxed()),
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                Err(SendError::QueueFull)
            }
            Err((e, _)) => Err(SendError::Rejected(e.to_string())),
        }
    }

    async fn flush(&self, timeout: Duration) -> usize {
        let Some(producer) = self.producer() else {
            return 0;
        };
        let fallback = producer.clone();
        let flushed = tokio::task::spawn_blocking(move || {
            let result = producer.flush(timeout);
            (result, producer.in_flight_count())
        })
        .await;
        match flushed {
            Ok((Ok(()), _)) => 0,
            Ok((Err(e), remaining)) => {
                debug!(error = %e, remaining, "flush incomplete");
                usize::try_from(remaining).unwrap_or_default()
            }
            Err(e) => {
                warn!(error = %e, "flush task failed");
                usize::try_from(fallback.in_flight_count()).unwrap_or_default()
            }
        }
    }

    fn close(&self) {
        let producer = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(producer) = producer else {
            return;
        };
        let remaining = producer.in_flight_count();
        if remaining > 0 {
            warn!(remaining, "producer closed with records in flight");
        }
        drop(producer);
        info!(topic = %self.topic, "producer closed");
    }
}
