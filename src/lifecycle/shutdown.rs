//! Shutdown coordination.
//!
//! # Responsibilities
//! - Stop and join watcher threads
//! - Fire the `Shutdown` lifecycle event and the cooperative cancellation broadcast
//! - Wait for shutdown consumers within a bounded budget
//! - Tell the daemon wrapper we are done, then release the server loop
//!
//! # Design Decisions
//! - Runs at most once: the first caller wins a compare-and-swap on the state,
//!   later callers return immediately
//! - A drain timeout is a warning, never an error

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::lifecycle::drain::{DrainGuard, DrainTracker};
use crate::lifecycle::events::LifecycleEvent;
use crate::lifecycle::manager::{LifecycleManager, LifecycleSubject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    Running = 0,
    ShuttingDown = 1,
    Drained = 2,
    Terminated = 3,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::ShuttingDown,
            2 => ShutdownState::Drained,
            _ => ShutdownState::Terminated,
        }
    }
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("could not write pid file {path:?}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A background worker that must be stopped and joined before exit.
pub trait Stoppable: Send {
    fn name(&self) -> &str;

    /// Stop the worker and wait for its thread to finish.
    fn stop(&mut self);
}

/// Integration with whatever supervises the process.
pub trait DaemonNotifier: Send + Sync {
    fn terminated(&self);
}

/// Writes our pid at startup, removes the file on clean exit.
#[derive(Debug)]
pub struct PidFileNotifier {
    path: PathBuf,
}

impl PidFileNotifier {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, ShutdownError> {
        let path = path.into();
        std::fs::write(&path, format!("{}\n", std::process::id())).map_err(|source| {
            ShutdownError::PidFile {
                path: path.clone(),
                source,
            }
        })?;
        tracing::debug!(path = %path.display(), "Pid file written");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DaemonNotifier for PidFileNotifier {
    fn terminated(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Pid file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Could not remove pid file"),
        }
    }
}

pub struct ShutdownCoordinator {
    state: AtomicU8,
    lifecycle: Arc<LifecycleManager>,
    watchers: Mutex<Vec<Box<dyn Stoppable>>>,
    notifier: OnceLock<Arc<dyn DaemonNotifier>>,
    cancel: broadcast::Sender<()>,
    drain: DrainTracker,
    timeout: Duration,
    stopped: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new(lifecycle: Arc<LifecycleManager>, timeout: Duration) -> Self {
        let (cancel, _) = broadcast::channel(1);
        let (stopped, _) = watch::channel(false);
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            lifecycle,
            watchers: Mutex::new(Vec::new()),
            notifier: OnceLock::new(),
            cancel,
            drain: DrainTracker::new(),
            timeout,
            stopped,
        }
    }

    pub fn with_notifier(self, notifier: Arc<dyn DaemonNotifier>) -> Self {
        self.set_notifier(notifier);
        self
    }

    /// Install the daemon notifier. Only the first one is kept.
    pub fn set_notifier(&self, notifier: Arc<dyn DaemonNotifier>) -> bool {
        let installed = self.notifier.set(notifier).is_ok();
        if !installed {
            tracing::warn!("Daemon notifier already installed, ignoring");
        }
        installed
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Cooperative cancellation, fired once during shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.cancel.subscribe()
    }

    /// Hold this until shutdown-time cleanup is finished.
    pub fn drain_guard(&self, label: impl Into<String>) -> DrainGuard {
        self.drain.track(label)
    }

    pub fn register_watcher(&self, watcher: Box<dyn Stoppable>) {
        tracing::debug!(watcher = watcher.name(), "Watcher registered for shutdown");
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(watcher);
    }

    /// Resolves once shutdown has finished; immediately if it already has.
    pub async fn stopped(&self) {
        let mut rx = self.stopped.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Run the shutdown sequence. Returns false if it was already started.
    pub async fn shutdown(&self) -> bool {
        if self
            .state
            .compare_exchange(
                ShutdownState::Running as u8,
                ShutdownState::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::debug!("Shutdown already in progress");
            return false;
        }

        tracing::info!("Shutting down...");

        let watchers = std::mem::take(
            &mut *self.watchers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !watchers.is_empty() {
            let joined = tokio::task::spawn_blocking(move || {
                for mut watcher in watchers {
                    tracing::debug!(watcher = watcher.name(), "Stopping watcher");
                    watcher.stop();
                }
            })
            .await;
            if joined.is_err() {
                tracing::error!("Watcher failed to stop cleanly");
            }
        }

        self.lifecycle
            .notify(LifecycleEvent::Shutdown, "server", &LifecycleSubject::None);
        let _ = self.cancel.send(());

        let outstanding = self.drain.active_count();
        if outstanding > 0 {
            tracing::info!(outstanding, "Waiting for shutdown consumers to finish");
        }
        if !self.drain.wait_idle(self.timeout).await {
            tracing::warn!(
                timeout_secs = self.timeout.as_secs(),
                outstanding = self.drain.active_count(),
                "Shutdown consumers did not finish in time, continuing"
            );
        }
        self.state
            .store(ShutdownState::Drained as u8, Ordering::SeqCst);

        if let Some(notifier) = self.notifier.get() {
            notifier.terminated();
        }

        self.state
            .store(ShutdownState::Terminated as u8, Ordering::SeqCst);
        let _ = self.stopped.send(true);
        tracing::info!("Goodbye!");
        true
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::lifecycle::manager::CallbackError;

    struct CountingWatcher(Arc<AtomicUsize>);

    impl Stoppable for CountingWatcher {
        fn name(&self) -> &str {
            "counting"
        }

        fn stop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn coordinator(timeout: Duration) -> (ShutdownCoordinator, Arc<AtomicUsize>) {
        let lifecycle = Arc::new(LifecycleManager::new());
        let events = Arc::new(AtomicUsize::new(0));
        let counted = events.clone();
        lifecycle.subscribe(
            &[LifecycleEvent::Shutdown],
            Arc::new(
                move |_: LifecycleEvent, _: &str, _: &LifecycleSubject| -> Result<(), CallbackError> {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            ),
        );
        (ShutdownCoordinator::new(lifecycle, timeout), events)
    }

    #[tokio::test]
    async fn second_shutdown_is_a_no_op() {
        let (coordinator, events) = coordinator(Duration::from_secs(1));
        let stops = Arc::new(AtomicUsize::new(0));
        coordinator.register_watcher(Box::new(CountingWatcher(stops.clone())));

        assert!(coordinator.shutdown().await);
        assert!(!coordinator.shutdown().await);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(events.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let (coordinator, _) = coordinator(Duration::from_secs(1));
        let mut rx = coordinator.subscribe();

        coordinator.shutdown().await;
        assert!(rx.try_recv().is_ok());
        coordinator.stopped().await;
    }

    #[tokio::test]
    async fn drain_timeout_does_not_block_forever() {
        let (coordinator, _) = coordinator(Duration::from_millis(50));
        let _stuck = coordinator.drain_guard("stuck");

        let finished = tokio::time::timeout(Duration::from_secs(2), coordinator.shutdown()).await;
        assert_eq!(finished.ok(), Some(true));
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }

    #[tokio::test]
    async fn pid_file_removed_on_termination() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("bootstrapd.pid");
        let notifier = PidFileNotifier::create(&pid_path).unwrap();
        assert!(pid_path.exists());

        let (coordinator, _) = coordinator(Duration::from_secs(1));
        let coordinator = coordinator.with_notifier(Arc::new(notifier));
        coordinator.shutdown().await;

        assert!(!pid_path.exists());
    }
}
