//! Server bootstrap and lifecycle orchestration.
//!
//! Claims the listen port with a placeholder server, assembles the protected
//! route table, hands the port over to the full service, fans out lifecycle
//! events, replays the preemptive cache and shuts everything down in order.

// Core subsystems
pub mod config;
pub mod context;
pub mod http;
pub mod net;
pub mod routing;

// Lifecycle and background work
pub mod cache;
pub mod lifecycle;
pub mod plugins;
pub mod runtime;
pub mod watch;

// Cross-cutting concerns
pub mod observability;
pub mod security;

pub use config::schema::BootstrapConfig;
pub use context::AppContext;
pub use http::HttpServer;
pub use lifecycle::{Bootstrap, ShutdownCoordinator, StartupError};
