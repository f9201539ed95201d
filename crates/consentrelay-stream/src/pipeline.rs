//! The running service: a fixed pool of workers sharing one emitter.
//!
//! `run` spawns the workers, waits for shutdown, joins every worker, drains
//! the producer in bounded rounds and closes it.

use std::sync::Arc;
use std::time::Duration;

use consentrelay_core::config::KafkaConfig;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::emitter::Emitter;
use crate::processor::RecordProcessor;
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::sink::MessageSink;
use crate::source::SourceFactory;
use crate::worker::{Worker, WorkerStats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub retry_interval: Duration,
    pub flush_timeout: Duration,
    pub flush_rounds: u32,
}

impl From<&KafkaConfig> for PipelineConfig {
    fn from(kafka: &KafkaConfig) -> Self {
        Self {
            workers: kafka.num_consumers,
            poll_interval: kafka.poll_interval(),
            retry_interval: kafka.queue_full_backoff(),
            flush_timeout: kafka.flush_timeout(),
            flush_rounds: kafka.flush_rounds,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub reason: Option<ShutdownReason>,
    /// Per-worker statistics, ordered by worker id.
    pub workers: Vec<(usize, WorkerStats)>,
    /// Records still unacknowledged after the final flush.
    pub undelivered: usize,
}

impl PipelineReport {
    pub fn totals(&self) -> WorkerStats {
        self.workers
            .iter()
            .fold(WorkerStats::default(), |mut acc, (_, s)| {
                acc.received += s.received;
                acc.committed += s.committed;
                acc.dropped += s.dropped;
                acc.failed += s.failed;
                acc
            })
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    processor: Arc<dyn RecordProcessor>,
    emitter: Arc<Emitter>,
    sources: Arc<dyn SourceFactory>,
    shutdown: Shutdown,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        processor: Arc<dyn RecordProcessor>,
        sink: Arc<dyn MessageSink>,
        sources: Arc<dyn SourceFactory>,
        shutdown: Shutdown,
    ) -> Self {
        let emitter = Arc::new(Emitter::new(sink, config.retry_interval));
        Self {
            config,
            processor,
            emitter,
            sources,
            shutdown,
        }
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub async fn run(self) -> PipelineReport {
        info!(workers = self.config.workers, "starting pipeline");

        let mut workers = JoinSet::new();
        for id in 1..=self.config.workers {
            let sources = Arc::clone(&self.sources);
            let processor = Arc::clone(&self.processor);
            let emitter = Arc::clone(&self.emitter);
            let shutdown = self.shutdown.clone();
            let poll_interval = self.config.poll_interval;

            workers.spawn(async move {
                let source = match sources.subscribe(id) {
                    Ok(source) => source,
                    Err(e) => {
                        error!(worker = id, error = %e, "subscription failed");
                        shutdown.trigger(ShutdownReason::WorkerFailed { worker: id });
                        return (id, WorkerStats::default());
                    }
                };
                let stats = Worker::new(id, source, processor, emitter, shutdown, poll_interval)
                    .run()
                    .await;
                (id, stats)
            });
        }

        let mut finished = Vec::with_capacity(self.config.workers);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                joined = workers.join_next() => match joined {
                    Some(Ok(done)) => finished.push(done),
                    Some(Err(e)) => {
                        error!(error = %e, "worker task failed");
                        self.shutdown.trigger(ShutdownReason::WorkerPanicked);
                    }
                    None => break,
                },
            }
        }

        let reason = self.shutdown.reason();
        info!(reason = ?reason, "draining pipeline");

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(done) => finished.push(done),
                Err(e) => error!(error = %e, "worker task failed"),
            }
        }
        finished.sort_by_key(|(id, _)| *id);

        let undelivered = self
            .emitter
            .drain(self.config.flush_timeout, self.config.flush_rounds)
            .await;
        if undelivered > 0 {
            warn!(undelivered, "closing producer with undelivered records");
        }
        self.emitter.close();
        self.shutdown.mark_stopped();

        let report = PipelineReport {
            reason,
            workers: finished,
            undelivered,
        };
        let totals = report.totals();
        info!(
            received = totals.received,
            committed = totals.committed,
            dropped = totals.dropped,
            failed = totals.failed,
            undelivered,
            "pipeline stopped"
        );
        report
    }
}
