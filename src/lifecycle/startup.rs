//! Startup orchestration.
//!
//! # Responsibilities
//! - Claim the port with the placeholder server before anything heavy runs
//! - Assemble the route table (built-ins plus plugin contributions)
//! - Hand the port over to the full service and fire the startup events
//! - Start background work: after-startup tasks, preemptive replay, heartbeat,
//!   watched folder
//!
//! # Design Decisions
//! - Fail fast: address and bind errors abort before any other work
//! - The placeholder is stopped strictly before the full service binds
//! - Everything after the handover is best effort and logged, never fatal

use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cache::recorder::RecorderState;
use crate::cache::replay::PreemptiveCacheReplayer;
use crate::config::{ConfigError, FolderKind};
use crate::context::AppContext;
use crate::http::handlers::NotFoundHandler;
use crate::http::server::HttpServer;
use crate::lifecycle::events::LifecycleEvent;
use crate::lifecycle::heartbeat::Heartbeat;
use crate::lifecycle::manager::{CallbackError, LifecycleSubject};
use crate::lifecycle::shutdown::{PidFileNotifier, ShutdownError};
use crate::lifecycle::signals::spawn_signal_handler;
use crate::net::address::{AddressError, ListenAddress};
use crate::net::claim::{PlaceholderRules, PortClaimServer};
use crate::net::listener::{self, BindError};
use crate::plugins::{PluginInfo, PluginRegistry};
use crate::routing::builtin::{register_builtin, DOWNLOAD_DOMAINS};
use crate::routing::contributor::{apply_contributions, panic_message};
use crate::routing::dispatch::Dispatcher;
use crate::routing::router::{RouteError, RouteTableBuilder};
use crate::watch::folder::{FolderWatcher, MoveToFolder, WatchedFolderHandler};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    #[error("could not prepare {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Runs the startup sequence for an [`AppContext`].
pub struct Bootstrap {
    context: Arc<AppContext>,
    watched_handler: Option<Arc<dyn WatchedFolderHandler>>,
}

impl Bootstrap {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self {
            context,
            watched_handler: None,
        }
    }

    /// Replace the default watched folder handler (move into uploads).
    pub fn with_watched_handler(mut self, handler: Arc<dyn WatchedFolderHandler>) -> Self {
        self.watched_handler = Some(handler);
        self
    }

    /// Start, install signal handlers and serve until shutdown completes.
    pub async fn run(self) -> Result<(), StartupError> {
        let server = self.start().await?;
        spawn_signal_handler(server.context.shutdown.clone());
        server.wait().await;
        Ok(())
    }

    /// Bring the server up. Returns once the full service accepts connections.
    pub async fn start(self) -> Result<RunningServer, StartupError> {
        let context = self.context;
        let config = &context.config;

        let marker = context.startup_marker();
        mark_startup_incomplete(&marker)?;

        let mut address = ListenAddress::new(config.server.host.as_deref(), config.server.port, config.server.v6_only)?;
        let rules = PlaceholderRules::defaults(config.server.static_folder.as_deref());
        let mut claim = PortClaimServer::bind(&address, rules)?;
        if address.port() == 0 {
            address = address.with_port(claim.local_addr().port());
        }

        // heavy init runs while the placeholder answers
        let server = assemble(&context)?;
        let router = server.router();

        let stopped = tokio::task::spawn_blocking(move || claim.stop()).await;
        if stopped.is_err() {
            tracing::error!("Placeholder server failed to stop cleanly");
        }

        let listener = listener::bind(&address)?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| StartupError::Bind(BindError::Io(e)))?;

        let shutdown = &context.shutdown;
        let server_task = tokio::spawn(server.run(
            listener,
            shutdown.subscribe(),
            shutdown.drain_guard("http-server"),
        ));

        announce_startup(&context, &address);
        subscribe_shutdown_hooks(&context);

        if config.watched.enabled {
            let handler = self.watched_handler.unwrap_or_else(|| default_watched_handler(&context));
            match FolderWatcher::start(&context.folder(FolderKind::Watched), &config.watched, handler) {
                Ok(watcher) => shutdown.register_watcher(Box::new(watcher)),
                Err(e) => tracing::error!(error = %e, "Could not start watched folder observer"),
            }
        }

        let after_startup = tokio::spawn(after_startup(context.clone(), address.clone(), marker, router));

        tokio::spawn(
            Heartbeat::new(Duration::from_secs(config.observability.heartbeat_secs)).run(shutdown.subscribe()),
        );

        if let Some(path) = &config.shutdown.pid_file {
            shutdown.set_notifier(Arc::new(PidFileNotifier::create(path)?));
        }

        Ok(RunningServer {
            context,
            address,
            local_addr,
            server: server_task,
            after_startup,
        })
    }
}

/// A started server.
pub struct RunningServer {
    context: Arc<AppContext>,
    address: ListenAddress,
    local_addr: SocketAddr,
    server: JoinHandle<Result<(), std::io::Error>>,
    after_startup: JoinHandle<()>,
}

impl RunningServer {
    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// The configured address, with an OS-chosen port filled in.
    pub fn address(&self) -> &ListenAddress {
        &self.address
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn after_startup_done(&self) -> bool {
        self.after_startup.is_finished()
    }

    /// Run the shutdown sequence and wait for the server to stop.
    pub async fn shutdown(self) {
        self.context.shutdown.shutdown().await;
        self.wait().await;
    }

    /// Wait until shutdown has completed and the server loop has ended.
    /// A server loop that ends on its own runs the shutdown sequence.
    pub async fn wait(mut self) {
        let coordinator = self.context.shutdown.clone();
        let exited = tokio::select! {
            _ = coordinator.stopped() => None,
            result = &mut self.server => Some(result),
        };
        let result = match exited {
            Some(result) => {
                tracing::warn!("HTTP server exited, shutting down");
                coordinator.shutdown().await;
                result
            }
            None => (&mut self.server).await,
        };
        self.after_startup.abort();
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
            Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        }
    }
}

fn mark_startup_incomplete(marker: &std::path::Path) -> Result<(), StartupError> {
    let io_err = |source| StartupError::Io {
        path: marker.to_path_buf(),
        source,
    };

    if marker.exists() {
        tracing::warn!(
            path = %marker.display(),
            "Previous startup did not complete, the server may have crashed during startup"
        );
    }
    if let Some(parent) = marker.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(marker, b"").map_err(io_err)
}

/// Build the route table and the service around it.
fn assemble(context: &AppContext) -> Result<HttpServer, StartupError> {
    let config = &context.config;

    let mut builder = RouteTableBuilder::new(config.server.max_body_size);
    register_builtin(&mut builder, config, &context.pool)?;
    apply_contributions(&mut builder, &context.plugins.enabled_plugins());
    let table = builder.build(Arc::new(NotFoundHandler));

    let recorder = config.preemptive_cache.enabled.then(|| {
        RecorderState::new(
            context.cache.clone(),
            table.clone(),
            config.preemptive_cache.exceptions.clone(),
        )
    });

    let dispatcher = Dispatcher::new(table, context.identity.clone());
    Ok(HttpServer::new(dispatcher, recorder, config.server.allow_framing))
}

fn default_watched_handler(context: &AppContext) -> Arc<dyn WatchedFolderHandler> {
    let extensions = DOWNLOAD_DOMAINS
        .iter()
        .find(|domain| domain.folder == FolderKind::Uploads)
        .map(|domain| domain.extensions.to_vec())
        .unwrap_or_default();
    Arc::new(MoveToFolder::new(context.folder(FolderKind::Uploads), extensions))
}

fn call_plugin(plugin: &str, hook: &'static str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(plugin = %plugin, hook, error = %panic_message(panic.as_ref()), "Error while calling plugin");
    }
}

/// Fire `Startup`, call startup hooks, and cover plugins enabled later.
fn announce_startup(context: &Arc<AppContext>, address: &ListenAddress) {
    let host = address.host().to_string();
    let port = address.port();

    context.lifecycle.notify(
        LifecycleEvent::Startup,
        "server",
        &LifecycleSubject::Server {
            host: host.clone(),
            port,
        },
    );

    for info in context.plugins.enabled_plugins() {
        if let Some(hook) = info.active().and_then(|p| p.startup()) {
            call_plugin(&info.id, "on_startup", || hook.on_startup(&host, port));
        }
    }

    let late = move |_event: LifecycleEvent, id: &str, subject: &LifecycleSubject| -> Result<(), CallbackError> {
        let Some(plugin) = subject.plugin().and_then(PluginInfo::active) else {
            return Ok(());
        };
        if let Some(hook) = plugin.startup() {
            call_plugin(id, "on_startup", || hook.on_startup(&host, port));
            call_plugin(id, "on_after_startup", || hook.on_after_startup());
        }
        Ok(())
    };
    context.lifecycle.subscribe(&[LifecycleEvent::Enabled], Arc::new(late));
}

/// Persist the preemptive cache and call shutdown hooks on `Shutdown`.
fn subscribe_shutdown_hooks(context: &Arc<AppContext>) {
    let cache = context.cache.clone();
    let plugins = context.plugins.clone();

    let on_shutdown = move |_event: LifecycleEvent, _id: &str, _subject: &LifecycleSubject| -> Result<(), CallbackError> {
        for info in plugins.enabled_plugins() {
            if let Some(hook) = info.active().and_then(|p| p.shutdown()) {
                call_plugin(&info.id, "on_shutdown", || hook.on_shutdown());
            }
        }
        cache
            .save_to_file()
            .map_err(|e| CallbackError::new(format!("could not save preemptive cache: {e}")))
    };
    context
        .lifecycle
        .subscribe(&[LifecycleEvent::Shutdown], Arc::new(on_shutdown));
}

async fn after_startup(context: Arc<AppContext>, address: ListenAddress, marker: PathBuf, router: Router) {
    tracing::info!("Listening on {}", address);

    context
        .lifecycle
        .notify(LifecycleEvent::AfterStartup, "server", &LifecycleSubject::None);
    for info in context.plugins.enabled_plugins() {
        if let Some(hook) = info.active().and_then(|p| p.startup()) {
            call_plugin(&info.id, "on_after_startup", || hook.on_after_startup());
        }
    }

    if let Err(e) = std::fs::remove_file(&marker) {
        tracing::warn!(path = %marker.display(), error = %e, "Could not remove startup marker");
    }

    let preemptive = &context.config.preemptive_cache;
    if !preemptive.enabled {
        return;
    }

    let registry: Arc<dyn PluginRegistry> = context.plugins.clone();
    let replayer = PreemptiveCacheReplayer::new(preemptive.until_days, registry);
    let mut shutdown = context.shutdown.subscribe();
    tokio::select! {
        _ = replayer.run_once(&context.cache, router) => {}
        _ = shutdown.recv() => {
            tracing::info!("Preemptive caching interrupted by shutdown");
        }
    }
}
