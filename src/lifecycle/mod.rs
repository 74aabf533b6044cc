//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Claim port → Assemble routes → Release claim → Bind → Startup event
//!     → AfterStartup event → Preemptive replay
//!
//! Events (events.rs, manager.rs):
//!     Plugin registry / bootstrap → LifecycleManager → subscribers in order
//!
//! Shutdown (shutdown.rs, drain.rs):
//!     Signal or exit → Stop watchers → Shutdown event → Cancel broadcast
//!     → Drain (bounded) → Daemon notifier → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown; a second one forces exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: port claim first, heavy init second, full listener last
//! - Shutdown runs once, whoever triggers it
//! - Shutdown has a budget: stragglers are logged and left behind

pub mod drain;
pub mod events;
pub mod heartbeat;
pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use drain::{DrainGuard, DrainTracker};
pub use events::LifecycleEvent;
pub use heartbeat::Heartbeat;
pub use manager::{
    CallbackError, LifecycleCallback, LifecycleManager, LifecycleSubject, NotifyReport, SubscriptionId,
};
pub use shutdown::{
    DaemonNotifier, PidFileNotifier, ShutdownCoordinator, ShutdownError, ShutdownState, Stoppable,
};
pub use signals::spawn_signal_handler;
pub use startup::{Bootstrap, RunningServer, StartupError};
