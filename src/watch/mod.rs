//! Filesystem watching.

pub mod folder;

pub use folder::{FolderWatcher, MoveToFolder, WatchedFolderHandler};
