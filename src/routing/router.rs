//! Route table assembly and lookup.
//!
//! # Responsibilities
//! - Collect route registrations and body size overrides at startup
//! - Reject duplicate `(pattern, method)` pairs, keeping the first
//! - Freeze into an immutable [`RouteTable`] with a catch-all fallback
//!
//! # Design Decisions
//! - Immutable after [`RouteTableBuilder::build`] (shared via `Arc`, no locks)
//! - Entries sorted once by specificity; lookup is a linear scan
//! - A path that matches only under other methods is a 405, not a fallback

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{HeaderMap, Method},
    response::Response,
};
use thiserror::Error;

use crate::routing::chain::ValidatorChain;
use crate::routing::matcher::RoutePattern;
use crate::security::access_control::{AccessValidator, Identity};
use crate::security::limits::{BodySizeLimits, BodySizeOverride};
use crate::security::path_validation::PathValidator;

/// Everything a handler gets once validation has passed.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: Method,
    /// Decoded URL path.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub captures: Vec<String>,
    pub body: Bytes,
    pub identity: Identity,
    /// Filesystem target for rooted routes, the URL path otherwise.
    pub target: PathBuf,
}

#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: RouteRequest) -> Response;
}

/// Adapter for async closures.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RouteHandler for FnHandler<F>
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn handle(&self, request: RouteRequest) -> Response {
        (self.0)(request).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RouteHandler>
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route {method} {pattern} is already registered")]
    Duplicate { pattern: String, method: Method },

    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A route registration before it is compiled.
#[derive(Clone)]
pub struct RouteSpec {
    pub pattern: String,
    pub method: Method,
    pub handler: Arc<dyn RouteHandler>,
    pub access: Vec<Arc<dyn AccessValidator>>,
    pub path: Vec<Arc<dyn PathValidator>>,
    pub options: BTreeMap<String, serde_json::Value>,
    pub target_root: Option<PathBuf>,
    /// Protected routes also receive contributed access validators.
    pub protected: bool,
}

impl RouteSpec {
    pub fn new(method: Method, pattern: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self {
            pattern: pattern.into(),
            method,
            handler,
            access: Vec::new(),
            path: Vec::new(),
            options: BTreeMap::new(),
            target_root: None,
            protected: false,
        }
    }

    pub fn get(pattern: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        Self::new(Method::GET, pattern, handler)
    }

    /// `GET` on exactly `path`; regex metacharacters in it match themselves.
    pub fn get_exact(path: &str, handler: Arc<dyn RouteHandler>) -> Self {
        Self::get(regex::escape(path), handler)
    }

    pub fn access(mut self, validator: Arc<dyn AccessValidator>) -> Self {
        self.access.push(validator);
        self
    }

    pub fn path(mut self, validator: Arc<dyn PathValidator>) -> Self {
        self.path.push(validator);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn target_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.target_root = Some(root.into());
        self
    }

    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }
}

pub struct RouteEntry {
    pattern: RoutePattern,
    method: Method,
    handler: Arc<dyn RouteHandler>,
    options: BTreeMap<String, serde_json::Value>,
    chain: ValidatorChain,
    target_root: Option<PathBuf>,
    protected: bool,
}

impl RouteEntry {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn handler(&self) -> &Arc<dyn RouteHandler> {
        &self.handler
    }

    pub fn chain(&self) -> &ValidatorChain {
        &self.chain
    }

    pub fn target_root(&self) -> Option<&std::path::Path> {
        self.target_root.as_deref()
    }

    pub fn option(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }

    /// True if the boolean option `key` is set.
    pub fn flag(&self, key: &str) -> bool {
        self.option(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern.as_str())
            .field("method", &self.method)
            .field("chain", &self.chain)
            .field("target_root", &self.target_root)
            .finish()
    }
}

pub struct RouteTableBuilder {
    entries: Vec<RouteEntry>,
    limits: BodySizeLimits,
}

impl RouteTableBuilder {
    pub fn new(default_body_limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limits: BodySizeLimits::new(default_body_limit),
        }
    }

    /// Register a route. Duplicates and bad patterns are logged and rejected;
    /// the table keeps whatever was registered first.
    pub fn register(&mut self, spec: RouteSpec) -> Result<(), RouteError> {
        if self.contains(&spec.pattern, &spec.method) {
            tracing::warn!(
                pattern = %spec.pattern,
                method = %spec.method,
                "Duplicate route registration ignored"
            );
            return Err(RouteError::Duplicate {
                pattern: spec.pattern,
                method: spec.method,
            });
        }

        let pattern = RoutePattern::new(&spec.pattern).map_err(|source| {
            tracing::warn!(pattern = %spec.pattern, error = %source, "Invalid route pattern");
            RouteError::InvalidPattern {
                pattern: spec.pattern.clone(),
                source,
            }
        })?;

        tracing::debug!(pattern = %spec.pattern, method = %spec.method, "Route registered");
        self.entries.push(RouteEntry {
            pattern,
            method: spec.method,
            handler: spec.handler,
            options: spec.options,
            chain: ValidatorChain::new(spec.access, spec.path),
            target_root: spec.target_root,
            protected: spec.protected,
        });
        Ok(())
    }

    pub fn contains(&self, pattern: &str, method: &Method) -> bool {
        self.entries
            .iter()
            .any(|e| e.pattern.as_str() == pattern && e.method == *method)
    }

    pub fn add_body_size(&mut self, rule: BodySizeOverride) {
        self.limits.push(rule);
    }

    pub fn body_limits(&self) -> &BodySizeLimits {
        &self.limits
    }

    /// Append `validator` to every protected route's access chain.
    pub fn append_access_validator(&mut self, validator: Arc<dyn AccessValidator>) {
        for entry in self.entries.iter_mut().filter(|e| e.protected) {
            entry.chain.push_access(validator.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the table. `fallback` answers everything no route matches.
    pub fn build(mut self, fallback: Arc<dyn RouteHandler>) -> Arc<RouteTable> {
        // stable sort keeps registration order among equals
        self.entries
            .sort_by(|a, b| a.pattern.cmp_specificity(&b.pattern));

        tracing::info!(routes = self.entries.len(), "Route table built");
        Arc::new(RouteTable {
            entries: self.entries,
            fallback,
            limits: self.limits,
        })
    }
}

/// Result of a route lookup.
pub enum RouteMatch<'a> {
    Matched {
        entry: &'a RouteEntry,
        captures: Vec<String>,
    },
    /// The path exists but not for this method.
    MethodNotAllowed,
    Fallback,
}

pub struct RouteTable {
    entries: Vec<RouteEntry>,
    fallback: Arc<dyn RouteHandler>,
    limits: BodySizeLimits,
}

impl RouteTable {
    pub fn match_route(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        let mut path_matched = false;

        for entry in &self.entries {
            let Some(captures) = entry.pattern.captures(path) else {
                continue;
            };
            if entry.method == *method {
                return RouteMatch::Matched { entry, captures };
            }
            path_matched = true;
        }

        if path_matched {
            RouteMatch::MethodNotAllowed
        } else {
            RouteMatch::Fallback
        }
    }

    pub fn fallback(&self) -> &Arc<dyn RouteHandler> {
        &self.fallback
    }

    pub fn limits(&self) -> &BodySizeLimits {
        &self.limits
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn find(&self, pattern: &str, method: &Method) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .find(|e| e.pattern.as_str() == pattern && e.method == *method)
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("entries", &self.entries)
            .field("limits", &self.limits)
            .finish()
    }
}
