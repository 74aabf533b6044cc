//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BootstrapConfig (validated, immutable)
//!     → CLI overrides applied in main.rs
//!     → shared via Arc inside AppContext
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AccessConfig, ApiKeyConfig, BootstrapConfig, FolderConfig, FolderKind, ObservabilityConfig,
    PreemptiveCacheConfig, ServerConfig, ShutdownConfig, WatchedConfig, WorkerConfig,
};
