use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("subscription failed: {0}")]
    Subscribe(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("offset commit failed: {0}")]
    Commit(String),

    #[cfg(feature = "kafka")]
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}
