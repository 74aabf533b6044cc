//! Watched folder observer.
//!
//! # Responsibilities
//! - Watch one folder with the native backend, or by polling when configured
//! - Hand new and modified files to a [`WatchedFolderHandler`] on a dedicated thread
//! - Move accepted files into the uploads folder ([`MoveToFolder`])
//! - Stop and join cleanly at shutdown
//!
//! # Design Decisions
//! - notify delivers into a std channel; dropping the watcher closes the channel,
//!   which ends the dispatch thread
//! - A panicking handler is logged; the dispatch thread keeps running

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::{Config, Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::WatchedConfig;
use crate::lifecycle::shutdown::Stoppable;
use crate::routing::contributor::panic_message;

/// Receives files that appeared or changed in the watched folder.
pub trait WatchedFolderHandler: Send + Sync {
    fn on_file(&self, path: &Path);
}

impl<F> WatchedFolderHandler for F
where
    F: Fn(&Path) + Send + Sync,
{
    fn on_file(&self, path: &Path) {
        self(path)
    }
}

/// Moves files with an accepted extension into `target`.
#[derive(Debug, Clone)]
pub struct MoveToFolder {
    target: PathBuf,
    extensions: Vec<String>,
}

impl MoveToFolder {
    pub fn new<I, S>(target: impl Into<PathBuf>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            target: target.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }

    fn move_file(&self, path: &Path) -> std::io::Result<PathBuf> {
        let name = path
            .file_name()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"))?;
        std::fs::create_dir_all(&self.target)?;
        let destination = self.target.join(name);

        // rename fails across filesystems
        if std::fs::rename(path, &destination).is_err() {
            std::fs::copy(path, &destination)?;
            std::fs::remove_file(path)?;
        }
        Ok(destination)
    }
}

impl WatchedFolderHandler for MoveToFolder {
    fn on_file(&self, path: &Path) {
        if !self.accepts(path) {
            tracing::debug!(path = %path.display(), "Ignoring file of unsupported type in watched folder");
            return;
        }
        match self.move_file(path) {
            Ok(destination) => tracing::info!(
                from = %path.display(),
                to = %destination.display(),
                "Moved file from watched folder"
            ),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "Could not move file from watched folder"),
        }
    }
}

pub struct FolderWatcher {
    folder: PathBuf,
    watcher: Option<Box<dyn Watcher + Send>>,
    thread: Option<JoinHandle<()>>,
}

impl FolderWatcher {
    /// Start watching `folder`, creating it if needed.
    pub fn start(
        folder: &Path,
        config: &WatchedConfig,
        handler: Arc<dyn WatchedFolderHandler>,
    ) -> Result<Self, notify::Error> {
        std::fs::create_dir_all(folder).map_err(notify::Error::io)?;

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher: Box<dyn Watcher + Send> = if config.poll {
            let interval = Duration::from_secs(config.poll_interval_secs.max(1));
            Box::new(PollWatcher::new(tx, Config::default().with_poll_interval(interval))?)
        } else {
            Box::new(RecommendedWatcher::new(tx, Config::default())?)
        };
        watcher.watch(folder, RecursiveMode::NonRecursive)?;

        let thread = thread::Builder::new()
            .name("watched-folder".to_string())
            .spawn(move || dispatch(rx, handler))
            .map_err(notify::Error::io)?;

        tracing::info!(path = %folder.display(), polling = config.poll, "Watched folder observer started");
        Ok(Self {
            folder: folder.to_path_buf(),
            watcher: Some(watcher),
            thread: Some(thread),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

fn dispatch(rx: mpsc::Receiver<notify::Result<Event>>, handler: Arc<dyn WatchedFolderHandler>) {
    for result in rx {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "Watch error");
                continue;
            }
        };
        if !(event.kind.is_create() || event.kind.is_modify()) {
            continue;
        }

        for path in event.paths.iter().filter(|p| p.is_file()) {
            tracing::debug!(path = %path.display(), "Watched folder change detected");
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler.on_file(path))) {
                tracing::error!(
                    path = %path.display(),
                    error = %panic_message(panic.as_ref()),
                    "Watched folder handler panicked"
                );
            }
        }
    }
    tracing::debug!("Watched folder dispatch thread exiting");
}

impl Stoppable for FolderWatcher {
    fn name(&self) -> &str {
        "watched-folder"
    }

    fn stop(&mut self) {
        // dropping the watcher closes the channel and ends the thread
        drop(self.watcher.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Watched folder thread panicked");
            }
            tracing::info!(path = %self.folder.display(), "Watched folder observer stopped");
        }
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn polling() -> WatchedConfig {
        WatchedConfig {
            enabled: true,
            poll: true,
            poll_interval_secs: 1,
        }
    }

    #[test]
    fn new_files_reach_handler() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel::<PathBuf>();
        let tx = std::sync::Mutex::new(tx);
        let handler: Arc<dyn WatchedFolderHandler> = Arc::new(move |path: &Path| {
            let _ = tx.lock().unwrap().send(path.to_path_buf());
        });

        let mut watcher = FolderWatcher::start(dir.path(), &polling(), handler).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        std::fs::write(dir.path().join("job.gcode"), "G28").unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = None;
        while Instant::now() < deadline {
            if let Ok(path) = rx.recv_timeout(Duration::from_millis(200)) {
                seen = Some(path);
                break;
            }
        }
        assert_eq!(seen.and_then(|p| p.file_name().map(|n| n.to_owned())), Some("job.gcode".into()));

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[test]
    fn move_to_folder_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let watched = dir.path().join("watched");
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&watched).unwrap();
        std::fs::write(watched.join("part.GCODE"), "G1").unwrap();
        std::fs::write(watched.join("notes.txt"), "hi").unwrap();

        let handler = MoveToFolder::new(&uploads, ["gcode", "gco"]);
        handler.on_file(&watched.join("part.GCODE"));
        handler.on_file(&watched.join("notes.txt"));

        assert!(uploads.join("part.GCODE").is_file());
        assert!(!watched.join("part.GCODE").exists());
        assert!(watched.join("notes.txt").is_file());
        assert!(!uploads.join("notes.txt").exists());
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let handler: Arc<dyn WatchedFolderHandler> = Arc::new(|_: &Path| {});
        let mut watcher = FolderWatcher::start(&dir.path().join("sub"), &polling(), handler).unwrap();
        assert!(dir.path().join("sub").is_dir());

        watcher.stop();
        watcher.stop();
    }
}
