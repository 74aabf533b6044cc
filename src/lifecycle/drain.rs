//! Outstanding shutdown work tracking.
//!
//! # Responsibilities
//! - Count work that must finish before the process exits
//! - Let shutdown wait for that count to reach zero, within a budget
//!
//! Consumers of the shutdown event take a [`DrainGuard`] and hold it until their
//! cleanup is done.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

static DRAIN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct Inner {
    active: AtomicU64,
    idle: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct DrainTracker {
    inner: Arc<Inner>,
}

impl DrainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a piece of outstanding work. Dropping the guard completes it.
    pub fn track(&self, label: impl Into<String>) -> DrainGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        let guard = DrainGuard {
            inner: Arc::clone(&self.inner),
            id: DRAIN_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            label: label.into(),
        };
        tracing::trace!(drain_id = guard.id, label = %guard.label, "Drain guard taken");
        guard
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until every guard is dropped. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.idle.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

/// Outstanding work. Decrements the tracker when dropped.
#[derive(Debug)]
pub struct DrainGuard {
    inner: Arc<Inner>,
    id: u64,
    label: String,
}

impl DrainGuard {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
        tracing::trace!(drain_id = self.id, label = %self.label, "Drain guard released");
    }
}
