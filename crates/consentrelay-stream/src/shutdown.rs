//! Shutdown coordinator: `Running → Draining → Stopped`.
//!
//! The phase lives in a `watch` channel. Workers and the emitter's retry loop
//! race their blocking calls against [`Shutdown::cancelled`]. The first
//! trigger wins and its reason is kept.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Operating-system signal, e.g. `SIGTERM`.
    Signal(&'static str),
    /// A worker received a negative delivery acknowledgment.
    DeliveryFailed { worker: usize },
    /// A worker could not subscribe.
    WorkerFailed { worker: usize },
    /// A worker task panicked.
    WorkerPanicked,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "received {name}"),
            Self::DeliveryFailed { worker } => write!(f, "delivery failed on worker {worker}"),
            Self::WorkerFailed { worker } => write!(f, "worker {worker} failed to start"),
            Self::WorkerPanicked => write!(f, "a worker panicked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining(ShutdownReason),
    Stopped,
}

/// Cloneable handle to the process-wide shutdown state.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Phase>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Phase::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn phase(&self) -> Phase {
        self.tx.borrow().clone()
    }

    /// Begin draining. Returns `false` if shutdown was already under way.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let started = self.tx.send_if_modified(|phase| {
            if *phase != Phase::Running {
                return false;
            }
            *phase = Phase::Draining(reason.clone());
            true
        });
        if started {
            info!(%reason, "shutdown triggered");
        } else {
            debug!(%reason, "shutdown already in progress");
        }
        started
    }

    pub fn is_draining(&self) -> bool {
        *self.tx.borrow() != Phase::Running
    }

    /// Reason recorded by the first trigger.
    pub fn reason(&self) -> Option<ShutdownReason> {
        match &*self.tx.borrow() {
            Phase::Draining(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Resolves once the phase has left `Running`.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|phase| *phase != Phase::Running).await;
    }

    pub fn mark_stopped(&self) {
        self.tx.send_replace(Phase::Stopped);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
