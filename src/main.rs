//! bootstrapd
//!
//! Brings the server up in a fixed order and takes it down again on exit.
//!
//! # Startup Sequence
//!
//! ```text
//!  config + CLI ──▶ logging/metrics ──▶ placeholder claims host:port
//!                                              │
//!                       heavy init, routes ◀───┘
//!                              │
//!                placeholder stops ──▶ full service binds host:port
//!                              │
//!            Startup / AfterStartup events ──▶ preemptive replay
//!                              │
//!           SIGTERM/SIGINT ──▶ shutdown coordinator ──▶ exit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use bootstrapd::config::{load_config, validation::validate_config, BootstrapConfig, ConfigError};
use bootstrapd::observability::{logging, metrics};
use bootstrapd::plugins::StaticPluginRegistry;
use bootstrapd::{AppContext, Bootstrap, StartupError};

#[derive(Debug, Parser)]
#[command(name = "bootstrapd", version, about = "Server bootstrap and lifecycle orchestration")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(long)]
    port: Option<u16>,

    /// Bind IPv6 only when listening on ::
    #[arg(long)]
    v6_only: bool,

    /// Base folder for uploads, logs and data
    #[arg(long)]
    basedir: Option<PathBuf>,
}

fn load(args: &Args) -> Result<BootstrapConfig, StartupError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => BootstrapConfig::default(),
    };

    if let Some(host) = &args.host {
        config.server.host = Some(host.clone());
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.v6_only {
        config.server.v6_only = true;
    }
    if let Some(basedir) = &args.basedir {
        config.folders.base = basedir.clone();
    }

    validate_config(&config).map_err(|errors| StartupError::Config(ConfigError::Validation(errors)))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bootstrapd: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "bootstrapd starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        host = ?config.server.host,
        port = config.server.port,
        base = %config.folders.base.display(),
        "Configuration loaded"
    );

    let context = AppContext::new(config, Arc::new(StaticPluginRegistry::new()));
    match Bootstrap::new(context).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Could not start server");
            eprintln!("bootstrapd: {e}");
            ExitCode::FAILURE
        }
    }
}
