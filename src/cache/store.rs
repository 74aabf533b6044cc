//! Recorded requests for preemptive cache replay.
//!
//! # Responsibilities
//! - Keep recorded requests per route in memory
//! - Merge repeated requests into one entry (count + last access)
//! - Persist to and load from a JSON file
//!
//! # Design Decisions
//! - `DashMap` behind an `Arc`: cheap clones, recording never blocks other routes
//! - Persistence happens on pruning and at shutdown, not on every record

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn default_method() -> String {
    "GET".to_string()
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheReplayEntry {
    pub base_url: String,
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub query_string: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// UI plugin that served the page, `None` for the default UI.
    #[serde(default)]
    pub plugin: Option<String>,
    /// Last access, seconds since the epoch. 0 means unknown.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub count: u64,
    /// Overrides applied on replay (`method`, `path`, `query_string`, `headers`).
    #[serde(default)]
    pub additional_request_data: BTreeMap<String, serde_json::Value>,
}

impl CacheReplayEntry {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            method: default_method(),
            query_string: String::new(),
            headers: BTreeMap::new(),
            plugin: None,
            timestamp: now_secs(),
            count: 1,
            additional_request_data: BTreeMap::new(),
        }
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query_string = query.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Same request, ignoring bookkeeping fields.
    pub fn same_request(&self, other: &Self) -> bool {
        self.base_url == other.base_url
            && self.path == other.path
            && self.method == other.method
            && self.query_string == other.query_string
            && self.headers == other.headers
            && self.plugin == other.plugin
            && self.additional_request_data == other.additional_request_data
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreemptiveCacheStore {
    inner: Arc<DashMap<String, Vec<CacheReplayEntry>>>,
    persistence_path: Option<PathBuf>,
}

impl PreemptiveCacheStore {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Load from `path` if it exists; an absent file is an empty store.
    pub fn load_from_file(path: &Path) -> std::io::Result<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, Vec<CacheReplayEntry>> = serde_json::from_reader(reader)?;
            for (route, entries) in map {
                store.inner.insert(route, entries);
            }
            tracing::info!(routes = store.inner.len(), path = %path.display(), "Loaded preemptive cache entries");
        }
        Ok(store)
    }

    pub fn save_to_file(&self) -> std::io::Result<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        let map = self.snapshot();
        serde_json::to_writer_pretty(writer, &map)?;
        tracing::debug!(routes = map.len(), path = %path.display(), "Saved preemptive cache entries");
        Ok(())
    }

    /// Record an access of `route`. A repeat of a known request bumps its count.
    pub fn record(&self, route: &str, entry: CacheReplayEntry) {
        let mut entries = self.inner.entry(route.to_string()).or_default();
        match entries.iter_mut().find(|e| e.same_request(&entry)) {
            Some(existing) => {
                existing.count += 1;
                existing.timestamp = existing.timestamp.max(entry.timestamp);
            }
            None => {
                tracing::debug!(route = %route, path = %entry.path, "Recording new preemptive cache entry");
                entries.push(CacheReplayEntry {
                    count: entry.count.max(1),
                    ..entry
                });
            }
        }
    }

    pub fn entries(&self, route: &str) -> Vec<CacheReplayEntry> {
        self.inner.get(route).map(|r| r.value().clone()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<CacheReplayEntry>> {
        self.inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn route_count(&self) -> usize {
        self.inner.len()
    }

    /// Replace every route's entries with `filter(route, entries)`, drop routes
    /// left empty, persist, and return what is left.
    pub fn clean_all_data<F>(&self, filter: F) -> BTreeMap<String, Vec<CacheReplayEntry>>
    where
        F: Fn(&str, Vec<CacheReplayEntry>) -> Vec<CacheReplayEntry>,
    {
        let before = self.inner.len();
        let mut kept = BTreeMap::new();

        for (route, entries) in self.snapshot() {
            let remaining = filter(&route, entries);
            if remaining.is_empty() {
                self.inner.remove(&route);
            } else {
                self.inner.insert(route.clone(), remaining.clone());
                kept.insert(route, remaining);
            }
        }

        tracing::info!(before, after = kept.len(), "Cleaned preemptive cache");
        if let Err(e) = self.save_to_file() {
            tracing::error!(error = %e, "Failed to save preemptive cache");
        }
        kept
    }
}
