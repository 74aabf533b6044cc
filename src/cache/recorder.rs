//! Records page requests for later preemptive replay.
//!
//! Only successful `GET`s on routes flagged `preemptive` are recorded. Replays
//! and configured exception roots are skipped.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request},
    middleware::Next,
    response::Response,
};

use percent_encoding::percent_decode_str;

use crate::cache::replay::X_PREEMPTIVE_RECORDING;
use crate::cache::store::{CacheReplayEntry, PreemptiveCacheStore};
use crate::routing::router::{RouteMatch, RouteTable};

/// Route option enabling recording.
pub const PREEMPTIVE_OPTION: &str = "preemptive";

/// Route option naming the UI plugin that serves the route.
pub const PLUGIN_OPTION: &str = "plugin";

#[derive(Clone)]
pub struct RecorderState {
    store: PreemptiveCacheStore,
    table: Arc<RouteTable>,
    exceptions: Arc<Vec<String>>,
}

impl RecorderState {
    pub fn new(store: PreemptiveCacheStore, table: Arc<RouteTable>, exceptions: Vec<String>) -> Self {
        Self {
            store,
            table,
            exceptions: Arc::new(exceptions),
        }
    }

    /// The entry to record for `request`, if it qualifies.
    fn candidate(&self, request: &Request<Body>) -> Option<(String, CacheReplayEntry)> {
        if request.method() != Method::GET || request.headers().contains_key(X_PREEMPTIVE_RECORDING) {
            return None;
        }

        // matched like the dispatcher does, replayed with the raw path
        let raw_path = request.uri().path();
        let path = percent_decode_str(raw_path).decode_utf8().ok()?;
        if self.exceptions.iter().any(|root| path.starts_with(root.as_str())) {
            return None;
        }

        let RouteMatch::Matched { entry: route, .. } = self.table.match_route(&Method::GET, &path) else {
            return None;
        };
        if !route.flag(PREEMPTIVE_OPTION) {
            return None;
        }

        let host = request.headers().get(header::HOST)?.to_str().ok()?;
        let mut entry = CacheReplayEntry::new(format!("http://{host}/"), raw_path);
        if let Some(query) = request.uri().query() {
            entry = entry.with_query(query);
        }
        if let Some(lang) = request
            .headers()
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
        {
            entry = entry.with_header(header::ACCEPT_LANGUAGE.as_str(), lang);
        }
        if let Some(plugin) = route.option(PLUGIN_OPTION).and_then(|v| v.as_str()) {
            entry = entry.with_plugin(plugin);
        }

        Some((path.to_string(), entry))
    }
}

pub async fn record_preemptive(
    State(state): State<RecorderState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let candidate = state.candidate(&request);
    let response = next.run(request).await;

    if let Some((route, entry)) = candidate {
        if response.status().is_success() {
            state.store.record(&route, entry);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use axum::Router;
    use tower::ServiceExt;

    use crate::routing::router::{handler_fn, RouteSpec, RouteTableBuilder};

    fn app(store: PreemptiveCacheStore) -> Router {
        let ok = handler_fn(|_| async { "page".into_response() });
        let mut builder = RouteTableBuilder::new(1024);
        builder
            .register(RouteSpec::get("/", ok.clone()).option(PREEMPTIVE_OPTION, true))
            .unwrap();
        builder
            .register(
                RouteSpec::get("/plugin/theme/", ok.clone())
                    .option(PREEMPTIVE_OPTION, true)
                    .option(PLUGIN_OPTION, "theme"),
            )
            .unwrap();
        builder
            .register(RouteSpec::get("/pages/([^/]+)", ok.clone()).option(PREEMPTIVE_OPTION, true))
            .unwrap();
        builder.register(RouteSpec::get("/api/status", ok)).unwrap();
        let table = builder.build(handler_fn(|_| async { "fallback".into_response() }));

        let state = RecorderState::new(store, table, vec!["/plugin/theme/".into()]);
        Router::new()
            .fallback(|| async { "served" })
            .layer(axum::middleware::from_fn_with_state(state, record_preemptive))
    }

    fn get(path: &str) -> axum::http::request::Builder {
        Request::builder()
            .uri(path)
            .header(header::HOST, "printer.local:5000")
    }

    #[tokio::test]
    async fn records_flagged_routes_only() {
        let store = PreemptiveCacheStore::new(None);
        let app = app(store.clone());

        app.clone()
            .oneshot(get("/?l10n=de").body(Body::empty()).unwrap())
            .await
            .unwrap();
        app.clone()
            .oneshot(get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let entries = store.entries("/");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].base_url, "http://printer.local:5000/");
        assert_eq!(entries[0].query_string, "l10n=de");
        assert!(store.entries("/api/status").is_empty());
    }

    #[tokio::test]
    async fn skips_replays_and_exceptions() {
        let store = PreemptiveCacheStore::new(None);
        let app = app(store.clone());

        app.clone()
            .oneshot(
                get("/")
                    .header(X_PREEMPTIVE_RECORDING, "_default")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        app.oneshot(get("/plugin/theme/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(store.route_count(), 0);
    }

    #[tokio::test]
    async fn encoded_paths_match_decoded_routes() {
        let store = PreemptiveCacheStore::new(None);
        let app = app(store.clone());

        app.oneshot(get("/pages/my%20page").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let entries = store.entries("/pages/my page");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/pages/my%20page");
    }
}
