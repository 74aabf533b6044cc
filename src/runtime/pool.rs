//! Bounded pool for blocking work.
//!
//! # Responsibilities
//! - Run blocking closures (file reads) off the async workers
//! - Cap concurrent blocking tasks at `max_blocking`
//! - Cap callers waiting for a slot at `queue_depth`, rejecting the rest
//!
//! # Design Decisions
//! - Backpressure via semaphore, the same way connection slots are limited
//! - A full queue is an immediate error (mapped to 503), never an unbounded wait
//! - Dropping a waiting caller releases its queue slot

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Semaphore, TryAcquireError};

use crate::config::WorkerConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("blocking pool saturated ({waiting} callers waiting)")]
    Saturated { waiting: usize },

    #[error("blocking pool closed")]
    Closed,

    #[error("blocking task panicked")]
    Panicked,

    #[error("blocking task cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_blocking: usize,
    queue_depth: usize,
}

/// Holds a queue slot; releases it on drop.
struct QueueSlot(Arc<AtomicUsize>);

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BlockingPool {
    pub fn new(max_blocking: usize, queue_depth: usize) -> Self {
        let max_blocking = max_blocking.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_blocking)),
            waiting: Arc::new(AtomicUsize::new(0)),
            max_blocking,
            queue_depth,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.max_blocking, config.queue_depth)
    }

    pub fn max_blocking(&self) -> usize {
        self.max_blocking
    }

    /// Tasks currently running.
    pub fn in_use(&self) -> usize {
        self.max_blocking - self.permits.available_permits()
    }

    /// Callers waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Refuse new work; running tasks finish.
    pub fn close(&self) {
        self.permits.close();
    }

    pub async fn run<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => {
                let waiting = self.waiting.fetch_add(1, Ordering::SeqCst);
                let _slot = QueueSlot(self.waiting.clone());
                if waiting >= self.queue_depth {
                    tracing::warn!(
                        waiting,
                        queue_depth = self.queue_depth,
                        "Blocking pool saturated, rejecting task"
                    );
                    return Err(PoolError::Saturated { waiting });
                }
                self.permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| PoolError::Closed)?
            }
        };

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| {
            if e.is_panic() {
                tracing::error!("Blocking task panicked");
                PoolError::Panicked
            } else {
                PoolError::Cancelled
            }
        })
    }
}
