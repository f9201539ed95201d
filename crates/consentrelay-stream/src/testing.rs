//! In-memory source and sink doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;

use crate::sink::{DeliveryReceipt, MessageSink, OutboundRecord, SendError};
use crate::source::{InboundMessage, MessageSource, SourceFactory};
use crate::StreamError;

pub const TOPIC: &str = "consent-notifications";

/// Observable broker interactions, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Polled { worker: usize, offset: i64 },
    PollFailed { worker: usize },
    Stored { worker: usize, offset: i64 },
    Sent,
    Closed { worker: usize },
}

pub type Journal = Arc<Mutex<Vec<Event>>>;

pub fn message(offset: i64, payload: &[u8]) -> InboundMessage {
    InboundMessage {
        key: Some(format!("key-{offset}").into_bytes()),
        payload: Some(payload.to_vec()),
        timestamp: Some(1_700_000_000_000 + offset),
        topic: TOPIC.to_string(),
        partition: 0,
        offset,
    }
}

/// A message without a value, as left behind by a tombstone.
pub fn empty_message(offset: i64) -> InboundMessage {
    InboundMessage {
        payload: None,
        ..message(offset, b"")
    }
}

// ── Source ──

#[derive(Default)]
struct Topic {
    pending: VecDeque<InboundMessage>,
    stored: Vec<i64>,
    /// Polls that fail before the next message is handed out.
    poll_errors: usize,
}

/// Hands out subscriptions that all drain one shared partition.
pub struct MemorySourceFactory {
    topic: Arc<Mutex<Topic>>,
    journal: Journal,
    fail_subscribe: bool,
}

impl MemorySourceFactory {
    pub fn new(journal: Journal, messages: Vec<InboundMessage>) -> Self {
        Self {
            topic: Arc::new(Mutex::new(Topic {
                pending: messages.into(),
                ..Topic::default()
            })),
            journal,
            fail_subscribe: false,
        }
    }

    pub fn failing(journal: Journal) -> Self {
        Self {
            fail_subscribe: true,
            ..Self::new(journal, Vec::new())
        }
    }

    pub fn with_poll_errors(self, count: usize) -> Self {
        self.topic.lock().unwrap().poll_errors = count;
        self
    }

    pub fn stored(&self) -> Vec<i64> {
        self.topic.lock().unwrap().stored.clone()
    }

    pub fn pending(&self) -> usize {
        self.topic.lock().unwrap().pending.len()
    }
}

impl SourceFactory for MemorySourceFactory {
    fn subscribe(&self, worker_id: usize) -> Result<Box<dyn MessageSource>, StreamError> {
        if self.fail_subscribe {
            return Err(StreamError::Subscribe("broker unavailable".into()));
        }
        Ok(Box::new(MemorySource {
            worker: worker_id,
            topic: Arc::clone(&self.topic),
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct MemorySource {
    worker: usize,
    topic: Arc<Mutex<Topic>>,
    journal: Journal,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, StreamError> {
        let next = {
            let mut topic = self.topic.lock().unwrap();
            if topic.poll_errors > 0 {
                topic.poll_errors -= 1;
                drop(topic);
                self.journal
                    .lock()
                    .unwrap()
                    .push(Event::PollFailed { worker: self.worker });
                return Err(StreamError::Receive("broker transport failure".into()));
            }
            topic.pending.pop_front()
        };
        match next {
            Some(message) => {
                self.journal.lock().unwrap().push(Event::Polled {
                    worker: self.worker,
                    offset: message.offset,
                });
                Ok(Some(message))
            }
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    fn store_offset(&mut self, message: &InboundMessage) -> Result<(), StreamError> {
        self.topic.lock().unwrap().stored.push(message.offset);
        self.journal.lock().unwrap().push(Event::Stored {
            worker: self.worker,
            offset: message.offset,
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Closed { worker: self.worker });
        Ok(())
    }
}

// ── Sink ──

/// What the sink does with the next `try_send` call.
#[derive(Debug, Clone)]
pub enum Step {
    QueueFull,
    Ack,
    Nack(String),
    Reject(String),
    /// Accept but never acknowledge.
    Hang,
}

/// Sink that follows a script and acknowledges everything once it runs out.
pub struct ScriptedSink {
    script: Mutex<VecDeque<Step>>,
    delivered: Mutex<Vec<OutboundRecord>>,
    attempts: Mutex<usize>,
    hanging: Mutex<usize>,
    closed: Mutex<bool>,
    journal: Journal,
}

impl ScriptedSink {
    pub fn new(journal: Journal, script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delivered: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
            hanging: Mutex::new(0),
            closed: Mutex::new(false),
            journal,
        }
    }

    pub fn delivered(&self) -> Vec<OutboundRecord> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl MessageSink for ScriptedSink {
    fn try_send(&self, record: &OutboundRecord) -> Result<DeliveryReceipt, SendError> {
        *self.attempts.lock().unwrap() += 1;
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ack);
        match step {
            Step::QueueFull => Err(SendError::QueueFull),
            Step::Reject(reason) => Err(SendError::Rejected(reason)),
            Step::Ack => {
                self.journal.lock().unwrap().push(Event::Sent);
                self.delivered.lock().unwrap().push(record.clone());
                Ok(futures::future::ready(Ok(())).boxed())
            }
            Step::Nack(reason) => {
                self.journal.lock().unwrap().push(Event::Sent);
                Ok(futures::future::ready(Err(reason)).boxed())
            }
            Step::Hang => {
                self.journal.lock().unwrap().push(Event::Sent);
                *self.hanging.lock().unwrap() += 1;
                Ok(futures::future::pending().boxed())
            }
        }
    }

    async fn flush(&self, _timeout: Duration) -> usize {
        *self.hanging.lock().unwrap()
    }

    fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
