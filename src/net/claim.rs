//! Placeholder server that holds the port during startup.
//!
//! # Responsibilities
//! - Bind the final host/port before any heavy initialization runs
//! - Serve a fixed set of canned responses from a dedicated thread
//! - Release the socket synchronously on [`PortClaimServer::stop`]
//!
//! # Design Decisions
//! - Own current-thread runtime on its own OS thread, so startup work on the main
//!   runtime can block without starving the placeholder
//! - Every response closes the connection; stop never waits on keep-alive clients
//!   for longer than [`STOP_GRACE`]
//! - `stop()` joins the thread, and the listener is dropped before the thread ends,
//!   so the port is free once `stop()` returns

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::http::response::TRANSPARENT_GIF;
use crate::net::address::ListenAddress;
use crate::net::listener::{self, BindError};

/// How long open placeholder connections may linger after stop.
pub const STOP_GRACE: Duration = Duration::from_millis(500);

/// Path of the status pixel the placeholder page polls.
pub const STATUS_PIXEL_PATH: &str = "/intermediary.gif";

const PLACEHOLDER_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Starting up...</title>
</head>
<body>
<p>The server is starting up, this page will reload once it is ready.</p>
<script>
(function poll() {
    var img = new Image();
    img.onload = function () { window.location.reload(); };
    img.onerror = function () { setTimeout(poll, 1000); };
    img.src = "/online.gif?" + Date.now();
})();
</script>
</body>
</html>
"#;

/// A canned response: exact path, payload and optional content type.
#[derive(Debug, Clone)]
pub struct PlaceholderRule {
    pub path: String,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl PlaceholderRule {
    pub fn new(path: impl Into<String>, body: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
            content_type: content_type.map(str::to_string),
        }
    }
}

/// The static rule table served while the port is claimed.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderRules(Arc<Vec<PlaceholderRule>>);

impl PlaceholderRules {
    pub fn new(rules: Vec<PlaceholderRule>) -> Self {
        Self(Arc::new(rules))
    }

    /// Placeholder page, favicon and status pixel.
    ///
    /// The favicon is read from `static_folder/favicon.png`; a missing file serves an
    /// empty body, the same as a missing asset would.
    pub fn defaults(static_folder: Option<&Path>) -> Self {
        let favicon = static_folder
            .map(|dir| dir.join("favicon.png"))
            .and_then(|path| match std::fs::read(&path) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "No favicon for placeholder server");
                    None
                }
            })
            .unwrap_or_default();

        Self::new(vec![
            PlaceholderRule::new("/", PLACEHOLDER_PAGE, Some("text/html")),
            PlaceholderRule::new("/favicon.ico", favicon, Some("image/png")),
            PlaceholderRule::new(STATUS_PIXEL_PATH, TRANSPARENT_GIF, Some("image/gif")),
        ])
    }

    fn lookup(&self, path: &str) -> Option<&PlaceholderRule> {
        self.0.iter().find(|rule| rule.path == path)
    }
}

/// Minimal listener holding the final address until the full server takes over.
pub struct PortClaimServer {
    local_addr: SocketAddr,
    stop_tx: Option<watch::Sender<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl PortClaimServer {
    /// Bind the exact final address and start serving the placeholder rules.
    pub fn bind(address: &ListenAddress, rules: PlaceholderRules) -> Result<Self, BindError> {
        let listener = listener::bind_std(address)?;
        let local_addr = listener.local_addr().map_err(BindError::Io)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let thread = thread::Builder::new()
            .name("port-claim".to_string())
            .spawn(move || serve(listener, rules, stop_rx))
            .map_err(BindError::Io)?;

        tracing::info!(
            address = %address.with_port(local_addr.port()),
            "Placeholder server started"
        );

        Ok(Self {
            local_addr,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop serving and release the socket. Returns once the port can be rebound.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        tracing::info!("Shutting down placeholder server...");
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
        if thread.join().is_err() {
            tracing::error!("Placeholder server thread panicked");
        }
        tracing::info!("Placeholder server shut down");
    }
}

impl Drop for PortClaimServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(listener: std::net::TcpListener, rules: PlaceholderRules, stop_rx: watch::Receiver<bool>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Could not start placeholder runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match TcpListener::from_std(listener) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, "Could not register placeholder listener");
                return;
            }
        };

        let app = Router::new().fallback(placeholder_handler).with_state(rules);

        let mut graceful_rx = stop_rx.clone();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = graceful_rx.wait_for(|stopped| *stopped).await;
            })
            .into_future();

        let mut grace_rx = stop_rx;
        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Error in placeholder server");
                }
            }
            _ = async move {
                let _ = grace_rx.wait_for(|stopped| *stopped).await;
                tokio::time::sleep(STOP_GRACE).await;
            } => {
                tracing::warn!("Placeholder connections still open after grace period, closing them");
            }
        }
    });

    runtime.shutdown_timeout(STOP_GRACE);
}

async fn placeholder_handler(
    State(rules): State<PlaceholderRules>,
    method: Method,
    uri: Uri,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

    if method != Method::GET {
        return (StatusCode::NOT_IMPLEMENTED, headers, "Unsupported method").into_response();
    }

    match rules.lookup(uri.path()) {
        Some(rule) => {
            if let Some(value) = rule
                .content_type
                .as_deref()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
            {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (StatusCode::OK, headers, rule.body.clone()).into_response()
        }
        None => (StatusCode::NOT_FOUND, headers, "Not found").into_response(),
    }
}
