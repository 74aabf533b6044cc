//! Shared application context.
//!
//! Built once at startup and passed around by `Arc`; there are no globals.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::store::PreemptiveCacheStore;
use crate::config::{BootstrapConfig, FolderKind};
use crate::lifecycle::manager::LifecycleManager;
use crate::lifecycle::shutdown::ShutdownCoordinator;
use crate::plugins::StaticPluginRegistry;
use crate::runtime::pool::BlockingPool;
use crate::security::access_control::{AnonymousResolver, ApiKeyResolver, IdentityResolver};

/// Marker file present while a startup is in progress.
pub const INCOMPLETE_STARTUP_MARKER: &str = ".incomplete_startup";

/// Preemptive cache persistence file, inside the data folder.
pub const PREEMPTIVE_CACHE_FILE: &str = "preemptive_cache.json";

pub struct AppContext {
    pub config: BootstrapConfig,
    pub plugins: Arc<StaticPluginRegistry>,
    pub lifecycle: Arc<LifecycleManager>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub pool: BlockingPool,
    pub cache: PreemptiveCacheStore,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppContext {
    /// Wire the shared services together. The plugin registry reports its
    /// state changes to the lifecycle manager, which forwards them to the
    /// sink that was installed before it.
    pub fn new(config: BootstrapConfig, plugins: Arc<StaticPluginRegistry>) -> Arc<Self> {
        let lifecycle = Arc::new(match plugins.sink() {
            Some(upstream) => LifecycleManager::with_upstream(upstream),
            None => LifecycleManager::new(),
        });
        plugins.set_sink(lifecycle.clone());

        let shutdown = Arc::new(ShutdownCoordinator::new(
            lifecycle.clone(),
            Duration::from_secs(config.shutdown.timeout_secs),
        ));

        let identity: Arc<dyn IdentityResolver> = if config.access.api_keys.is_empty() {
            Arc::new(AnonymousResolver)
        } else {
            ApiKeyResolver::new(&config.access.api_keys).into_shared()
        };

        let cache_path = config.folders.resolve(FolderKind::Data).join(PREEMPTIVE_CACHE_FILE);
        let cache = PreemptiveCacheStore::load_from_file(&cache_path).unwrap_or_else(|e| {
            tracing::error!(path = %cache_path.display(), error = %e, "Could not load preemptive cache, starting empty");
            PreemptiveCacheStore::new(Some(cache_path.clone()))
        });

        Arc::new(Self {
            pool: BlockingPool::from_config(&config.workers),
            config,
            plugins,
            lifecycle,
            shutdown,
            cache,
            identity,
        })
    }

    pub fn folder(&self, kind: FolderKind) -> PathBuf {
        self.config.folders.resolve(kind)
    }

    pub fn startup_marker(&self) -> PathBuf {
        self.folder(FolderKind::Data).join(INCOMPLETE_STARTUP_MARKER)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown)
            .field("pool", &self.pool)
            .finish()
    }
}
