//! Request dispatch through the frozen route table.
//!
//! # Data Flow
//! ```text
//! Request
//!     → percent-decode path (400 on bad encoding)
//!     → match route (405 if only other methods match, fallback if none)
//!     → Content-Length vs body limit (413)
//!     → access chain (401/403)
//!     → resolve target, path chain (404/400)
//!     → read body with the same limit (413)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Each stage short-circuits; later stages never run after a deny
//! - The fallback has empty chains but still honors the body limit

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;

use crate::http::response::Rejection;
use crate::observability::metrics;
use crate::routing::router::{RouteHandler, RouteMatch, RouteRequest, RouteTable};
use crate::security::access_control::IdentityResolver;

#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
    identity: Arc<dyn IdentityResolver>,
}

impl Dispatcher {
    pub fn new(table: Arc<RouteTable>, identity: Arc<dyn IdentityResolver>) -> Self {
        Self { table, identity }
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let response = match self.process(request).await {
            Ok(response) => response,
            Err(rejection) => {
                metrics::record_rejection(rejection.metric_reason());
                rejection.into_response()
            }
        };
        metrics::record_request(response.status().as_u16(), start);
        response
    }

    async fn process(&self, request: Request<Body>) -> Result<Response, Rejection> {
        let (parts, body) = request.into_parts();

        let path = percent_decode_str(parts.uri.path())
            .decode_utf8()
            .map_err(|_| Rejection::new(StatusCode::BAD_REQUEST, "Invalid path encoding"))?
            .into_owned();

        let (entry, captures) = match self.table.match_route(&parts.method, &path) {
            RouteMatch::Matched { entry, captures } => (Some(entry), captures),
            RouteMatch::MethodNotAllowed => {
                tracing::debug!(method = %parts.method, path = %path, "Method not allowed");
                return Err(Rejection::method_not_allowed());
            }
            RouteMatch::Fallback => (None, Vec::new()),
        };

        let limit = self.table.limits().resolve(&parts.method, &path);
        if let Some(length) = content_length(&parts.headers) {
            if length > limit {
                tracing::debug!(path = %path, length, limit, "Declared body exceeds limit");
                return Err(Rejection::payload_too_large());
            }
        }

        let identity = self.identity.resolve(&parts.headers);

        let (handler, target): (&Arc<dyn RouteHandler>, PathBuf) = match entry {
            Some(entry) => {
                entry.chain().check_access(&identity).inspect_err(|r| {
                    tracing::debug!(path = %path, status = %r.status, "Access denied");
                })?;

                let target = match (entry.target_root(), captures.first()) {
                    (Some(root), Some(capture)) => root.join(capture),
                    (Some(root), None) => root.to_path_buf(),
                    (None, _) => PathBuf::from(&path),
                };
                entry.chain().check_path(&target).inspect_err(|r| {
                    tracing::debug!(path = %path, status = %r.status, "Path rejected");
                })?;

                (entry.handler(), target)
            }
            None => (self.table.fallback(), PathBuf::from(&path)),
        };

        let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
            tracing::debug!(path = %path, limit, error = %e, "Request body rejected");
            Rejection::payload_too_large()
        })?;

        let request = RouteRequest {
            method: parts.method,
            path,
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            captures,
            body,
            identity,
            target,
        };
        Ok(handler.handle(request).await)
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
