//! Preemptive cache subsystem.
//!
//! # Data Flow
//! ```text
//! Live traffic:
//!     → recorder.rs (successful GETs on preemptive routes)
//!     → store.rs (per-route entries, merged by request)
//!
//! After startup (once):
//!     store.rs → replay.rs (prune, order, plugin checks)
//!     → same axum Router as live traffic (tower oneshot)
//! ```

pub mod recorder;
pub mod replay;
pub mod store;

pub use recorder::{record_preemptive, RecorderState};
pub use replay::{PreemptiveCacheReplayer, ReplayReport, X_PREEMPTIVE_RECORDING};
pub use store::{CacheReplayEntry, PreemptiveCacheStore};
