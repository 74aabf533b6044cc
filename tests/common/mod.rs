//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bootstrapd::config::{ApiKeyConfig, BootstrapConfig};
use bootstrapd::lifecycle::RunningServer;
use bootstrapd::plugins::StaticPluginRegistry;
use bootstrapd::security::Capability;
use bootstrapd::{AppContext, Bootstrap};

/// Loopback, OS-chosen port, no watcher, short shutdown budget.
pub fn test_config(base: &Path) -> BootstrapConfig {
    let mut config = BootstrapConfig::default();
    config.folders.base = base.to_path_buf();
    config.server.host = Some("127.0.0.1".into());
    config.server.port = 0;
    config.watched.enabled = false;
    config.shutdown.timeout_secs = 2;
    config.observability.heartbeat_secs = 0;
    config
}

pub fn api_key(name: &str, key: &str, capabilities: &[Capability]) -> ApiKeyConfig {
    ApiKeyConfig {
        name: name.into(),
        key: key.into(),
        capabilities: capabilities.to_vec(),
    }
}

/// Client without connection pooling, so every request opens a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub async fn start(config: BootstrapConfig, plugins: Arc<StaticPluginRegistry>) -> RunningServer {
    let context = AppContext::new(config, plugins);
    Bootstrap::new(context).start().await.unwrap()
}

pub fn url(server: &RunningServer, path: &str) -> String {
    format!("http://{}{}", server.local_addr(), path)
}

/// Poll until the after-startup task (including preemptive replay) is done.
pub async fn wait_after_startup(server: &RunningServer) {
    for _ in 0..250 {
        if server.after_startup_done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("after-startup work did not finish");
}
