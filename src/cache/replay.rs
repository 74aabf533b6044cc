//! Preemptive cache replay.
//!
//! # Responsibilities
//! - Prune stale and non-HTTP entries from the store
//! - Replay the rest through the live router, most general routes first
//! - Skip entries whose UI plugin is gone, disabled or opted out
//!
//! # Design Decisions
//! - Runs at most once per replayer, after the full server is listening
//! - Each replay is its own task: a panicking handler fails one entry, not the run
//! - Replays carry [`X_PREEMPTIVE_RECORDING`] so they are not recorded again

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Method, Request},
    Router,
};
use tower::ServiceExt;
use url::Url;

use crate::cache::store::{now_secs, CacheReplayEntry, PreemptiveCacheStore};
use crate::observability::metrics;
use crate::plugins::PluginRegistry;
use crate::routing::contributor::panic_message;

/// Marks a request as a replay; the value is the UI view (`_default` or plugin id).
pub const X_PREEMPTIVE_RECORDING: &str = "x-preemptive-recording";

const DEFAULT_VIEW: &str = "_default";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// True for entries accessed after `cutoff` (seconds since the epoch).
pub fn is_fresh(entry: &CacheReplayEntry, cutoff: u64) -> bool {
    entry.timestamp > cutoff
}

/// True for entries whose base URL is http or https.
pub fn has_http_base(entry: &CacheReplayEntry) -> bool {
    Url::parse(&entry.base_url)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Routes by `(slash count, route)`, entries by count descending.
pub fn replay_order(
    data: BTreeMap<String, Vec<CacheReplayEntry>>,
) -> Vec<(String, Vec<CacheReplayEntry>)> {
    let mut routes: Vec<_> = data.into_iter().collect();
    routes.sort_by(|(a, _), (b, _)| {
        let depth = |r: &str| r.matches('/').count();
        depth(a).cmp(&depth(b)).then_with(|| a.cmp(b))
    });
    for (_, entries) in routes.iter_mut() {
        entries.sort_by(|a, b| b.count.cmp(&a.count));
    }
    routes
}

pub struct PreemptiveCacheReplayer {
    ran: AtomicBool,
    retention: Duration,
    plugins: Arc<dyn PluginRegistry>,
}

impl PreemptiveCacheReplayer {
    pub fn new(until_days: u64, plugins: Arc<dyn PluginRegistry>) -> Self {
        Self {
            ran: AtomicBool::new(false),
            retention: Duration::from_secs(until_days.saturating_mul(24 * 60 * 60)),
            plugins,
        }
    }

    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::SeqCst)
    }

    /// Prune the store and return the entries to replay, in replay order.
    pub fn select(&self, store: &PreemptiveCacheStore) -> Vec<(String, Vec<CacheReplayEntry>)> {
        let cutoff = now_secs().saturating_sub(self.retention.as_secs());
        let kept = store.clean_all_data(|_, entries| {
            entries
                .into_iter()
                .filter(|e| is_fresh(e, cutoff) && has_http_base(e))
                .collect()
        });
        replay_order(kept)
    }

    /// Replay the store through `app`. Returns `None` if it already ran.
    pub async fn run_once(&self, store: &PreemptiveCacheStore, app: Router) -> Option<ReplayReport> {
        if self.ran.swap(true, Ordering::SeqCst) {
            tracing::debug!("Preemptive cache already replayed");
            return None;
        }

        let mut report = ReplayReport::default();
        for (route, entries) in self.select(store) {
            for entry in entries {
                if let Some(plugin) = entry.plugin.as_deref() {
                    if !self.plugin_allows(plugin) {
                        report.skipped += 1;
                        metrics::record_replay("skipped");
                        continue;
                    }
                }

                if Self::replay(&route, &entry, app.clone()).await {
                    report.replayed += 1;
                    metrics::record_replay("replayed");
                } else {
                    report.failed += 1;
                    metrics::record_replay("failed");
                }
            }
        }

        tracing::info!(
            replayed = report.replayed,
            skipped = report.skipped,
            failed = report.failed,
            "Preemptive caching done"
        );
        Some(report)
    }

    fn plugin_allows(&self, plugin: &str) -> bool {
        let checked = catch_unwind(AssertUnwindSafe(|| {
            let Some(info) = self.plugins.plugin_info(plugin).filter(|i| i.enabled) else {
                return Err("it is not installed or enabled");
            };
            let Some(implementation) = info.implementation.as_ref() else {
                return Err("it is not installed or enabled");
            };
            let Some(ui) = implementation.ui() else {
                return Err("it is not a UI plugin");
            };
            if !ui.preemptive_caching_enabled() {
                return Err("it has disabled preemptive caching");
            }
            Ok(())
        }));

        match checked {
            Ok(Ok(())) => true,
            Ok(Err(reason)) => {
                tracing::info!(plugin = %plugin, reason, "Not preemptively caching plugin");
                false
            }
            Err(panic) => {
                tracing::error!(
                    plugin = %plugin,
                    error = %panic_message(panic.as_ref()),
                    "Error while checking if plugin has preemptive caching enabled, skipping entry"
                );
                false
            }
        }
    }

    async fn replay(route: &str, entry: &CacheReplayEntry, app: Router) -> bool {
        let view = entry.plugin.as_deref().unwrap_or(DEFAULT_VIEW);
        let request = match build_request(entry, view) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(route = %route, error = %e, "Could not build preemptive cache request");
                return false;
            }
        };

        tracing::info!(route = %route, view, path = %entry.path, "Preemptively caching");
        let start = Instant::now();
        match tokio::spawn(app.oneshot(request)).await {
            Ok(Ok(response)) if !response.status().is_server_error() => {
                tracing::info!(route = %route, elapsed_ms = start.elapsed().as_millis() as u64, "... done");
                true
            }
            Ok(Ok(response)) => {
                tracing::error!(route = %route, status = %response.status(), "Preemptive caching request failed");
                false
            }
            Ok(Err(never)) => match never {},
            Err(e) => {
                tracing::error!(route = %route, error = %e, "Error while preemptively caching");
                false
            }
        }
    }
}

/// Entry fields merged with its additional request data.
fn build_request(entry: &CacheReplayEntry, view: &str) -> Result<Request<Body>, axum::http::Error> {
    let extra = &entry.additional_request_data;
    let text = |key: &str| extra.get(key).and_then(|v| v.as_str());

    let method = text("method").unwrap_or(&entry.method);
    let path = text("path").unwrap_or(&entry.path);
    let query = text("query_string").unwrap_or(&entry.query_string);

    let uri = if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    };

    let mut builder = Request::builder()
        .method(Method::from_bytes(method.as_bytes())?)
        .uri(uri);

    if let Some(host) = Url::parse(&entry.base_url).ok().and_then(|u| {
        u.host_str()
            .map(|h| u.port().map_or_else(|| h.to_string(), |p| format!("{h}:{p}")))
    }) {
        builder = builder.header(header::HOST, host);
    }

    let extra_headers = extra
        .get("headers")
        .and_then(|v| v.as_object())
        .into_iter()
        .flatten()
        .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)));

    for (name, value) in entry
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(extra_headers)
    {
        builder = builder.header(HeaderName::from_bytes(name.as_bytes())?, HeaderValue::from_str(value)?);
    }

    builder
        .header(X_PREEMPTIVE_RECORDING, view)
        .body(Body::empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, count: u64) -> CacheReplayEntry {
        let mut e = CacheReplayEntry::new("http://localhost:5000/", path);
        e.count = count;
        e
    }

    #[test]
    fn routes_ordered_by_depth_then_name() {
        let mut data = BTreeMap::new();
        data.insert("/a/b".to_string(), vec![entry("/a/b", 50)]);
        data.insert("/b".to_string(), vec![entry("/b", 1)]);
        data.insert("/a".to_string(), vec![entry("/a", 5), entry("/a", 9)]);

        let ordered = replay_order(data);
        let routes: Vec<_> = ordered.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(routes, vec!["/a", "/b", "/a/b"]);

        let counts: Vec<_> = ordered[0].1.iter().map(|e| e.count).collect();
        assert_eq!(counts, vec![9, 5]);
    }

    #[test]
    fn scheme_filter() {
        assert!(has_http_base(&entry("/", 1)));
        let mut ftp = entry("/", 1);
        ftp.base_url = "ftp://host/".into();
        assert!(!has_http_base(&ftp));
        ftp.base_url = String::new();
        assert!(!has_http_base(&ftp));
    }

    #[test]
    fn freshness_is_strict() {
        let mut e = entry("/", 1);
        e.timestamp = 100;
        assert!(is_fresh(&e, 99));
        assert!(!is_fresh(&e, 100));
    }

    #[test]
    fn request_merges_additional_data() {
        let mut e = entry("/", 1).with_query("l10n=de").with_header("accept-language", "de");
        e.additional_request_data.insert("path".into(), "/override".into());
        e.additional_request_data.insert(
            "headers".into(),
            serde_json::json!({ "x-extra": "1" }),
        );

        let request = build_request(&e, "theme").unwrap();
        assert_eq!(request.uri(), "/override?l10n=de");
        assert_eq!(request.headers()["host"], "localhost:5000");
        assert_eq!(request.headers()["accept-language"], "de");
        assert_eq!(request.headers()["x-extra"], "1");
        assert_eq!(request.headers()[X_PREEMPTIVE_RECORDING], "theme");
    }
}
