//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::security::access_control::Capability;

/// Root configuration for the bootstrap server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Listen address and request limits.
    pub server: ServerConfig,

    /// Base folders for served and recorded data.
    pub folders: FolderConfig,

    /// Static API keys mapped to capabilities.
    pub access: AccessConfig,

    /// Preemptive cache replay settings.
    pub preemptive_cache: PreemptiveCacheConfig,

    /// Shutdown budget and daemon integration.
    pub shutdown: ShutdownConfig,

    /// Blocking worker pool sizing.
    pub workers: WorkerConfig,

    /// Watched folder observer.
    pub watched: WatchedConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind. `None` picks `::` when IPv6 is available, `0.0.0.0` otherwise.
    pub host: Option<String>,

    /// Port to bind (0 lets the OS choose).
    pub port: u16,

    /// Restrict `::` to IPv6 only instead of dual-stack.
    pub v6_only: bool,

    /// Default maximum request body size in bytes.
    pub max_body_size: usize,

    /// Maximum body size for file uploads in bytes.
    pub upload_max_size: usize,

    /// Skip the `X-Frame-Options` header.
    pub allow_framing: bool,

    /// Folder holding placeholder assets (favicon).
    pub static_folder: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 5000,
            v6_only: false,
            max_body_size: 100 * 1024,
            upload_max_size: 1024 * 1024 * 1024,
            allow_framing: false,
            static_folder: None,
        }
    }
}

/// Folder layout. Relative sub-folders resolve against `base`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FolderConfig {
    pub base: PathBuf,
    pub uploads: PathBuf,
    pub logs: PathBuf,
    pub timelapse: PathBuf,
    pub watched: PathBuf,
    pub data: PathBuf,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            base: PathBuf::from("./data"),
            uploads: PathBuf::from("uploads"),
            logs: PathBuf::from("logs"),
            timelapse: PathBuf::from("timelapse"),
            watched: PathBuf::from("watched"),
            data: PathBuf::from("data"),
        }
    }
}

/// Which configured folder a route or watcher refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderKind {
    Uploads,
    Logs,
    Timelapse,
    Watched,
    Data,
}

impl FolderConfig {
    /// Resolve a folder against the base directory.
    pub fn resolve(&self, kind: FolderKind) -> PathBuf {
        let sub = match kind {
            FolderKind::Uploads => &self.uploads,
            FolderKind::Logs => &self.logs,
            FolderKind::Timelapse => &self.timelapse,
            FolderKind::Watched => &self.watched,
            FolderKind::Data => &self.data,
        };
        if sub.is_absolute() {
            sub.clone()
        } else {
            self.base.join(sub)
        }
    }
}

/// Access configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    /// API keys accepted via `X-Api-Key` or `Authorization: Bearer`.
    pub api_keys: Vec<ApiKeyConfig>,
}

/// A single API key and the capabilities it grants.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    /// Identity name for logging.
    pub name: String,

    /// The secret key.
    pub key: String,

    /// Capabilities granted to this key.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// Preemptive cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreemptiveCacheConfig {
    /// Replay recorded requests after startup.
    pub enabled: bool,

    /// Entries not accessed for this many days are pruned.
    pub until_days: u64,

    /// Route roots that are never recorded.
    pub exceptions: Vec<String>,
}

impl Default for PreemptiveCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            until_days: 7,
            exceptions: Vec::new(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Maximum time to wait for shutdown consumers to drain.
    pub timeout_secs: u64,

    /// Pid file written at startup and removed on clean exit.
    pub pid_file: Option<PathBuf>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            pid_file: None,
        }
    }
}

/// Blocking worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent blocking tasks.
    pub max_blocking: usize,

    /// Tasks allowed to wait for a worker before rejecting.
    pub queue_depth: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_blocking: 8,
            queue_depth: 64,
        }
    }
}

/// Watched folder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchedConfig {
    /// Enable the watched folder observer.
    pub enabled: bool,

    /// Use the polling backend instead of the OS-native one.
    pub poll: bool,

    /// Poll interval in seconds (polling backend only).
    pub poll_interval_secs: u64,
}

impl Default for WatchedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll: false,
            poll_interval_secs: 2,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format: "json" or "text".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Heartbeat log interval in seconds (0 disables).
    pub heartbeat_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
            heartbeat_secs: 15 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = BootstrapConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.max_body_size, 100 * 1024);
        assert_eq!(config.shutdown.timeout_secs, 15);
        assert_eq!(config.preemptive_cache.until_days, 7);
    }

    #[test]
    fn relative_folders_resolve_against_base() {
        let mut folders = FolderConfig::default();
        folders.base = PathBuf::from("/srv/app");
        folders.logs = PathBuf::from("/var/log/app");

        assert_eq!(folders.resolve(FolderKind::Uploads), PathBuf::from("/srv/app/uploads"));
        assert_eq!(folders.resolve(FolderKind::Logs), PathBuf::from("/var/log/app"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: BootstrapConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [[access.api_keys]]
            name = "ops"
            key = "secret"
            capabilities = ["files_download", "custom_thing"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_body_size, 100 * 1024);
        assert_eq!(config.access.api_keys.len(), 1);
        assert_eq!(config.access.api_keys[0].capabilities[0], Capability::FilesDownload);
        assert_eq!(
            config.access.api_keys[0].capabilities[1],
            Capability::Custom("custom_thing".to_string())
        );
    }
}
