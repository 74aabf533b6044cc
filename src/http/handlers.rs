//! Built-in route handlers.
//!
//! # Responsibilities
//! - Serve fixed payloads (online status files, landing page)
//! - Serve files from a validated target path through the blocking pool
//! - Answer everything else with a 404
//!
//! # Design Decisions
//! - File reads never run on the async workers; a saturated pool is a 503
//! - Handlers trust the path chain: by the time they run the target is allowed

use std::path::PathBuf;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::response::{content_type_for, Rejection};
use crate::routing::router::{RouteHandler, RouteRequest};
use crate::runtime::pool::{BlockingPool, PoolError};

/// Fixed body with a fixed content type.
#[derive(Debug, Clone)]
pub struct StaticDataHandler {
    body: Bytes,
    content_type: &'static str,
}

impl StaticDataHandler {
    pub fn new(body: impl Into<Bytes>, content_type: &'static str) -> Self {
        Self {
            body: body.into(),
            content_type,
        }
    }
}

#[async_trait]
impl RouteHandler for StaticDataHandler {
    async fn handle(&self, _request: RouteRequest) -> Response {
        (
            [(header::CONTENT_TYPE, self.content_type)],
            self.body.clone(),
        )
            .into_response()
    }
}

/// Serves `request.target` as a download.
#[derive(Debug, Clone)]
pub struct FileDownloadHandler {
    pool: BlockingPool,
}

enum ReadOutcome {
    Found(Vec<u8>),
    Missing,
    Failed(std::io::Error),
}

fn read_file(path: PathBuf) -> ReadOutcome {
    if !path.is_file() {
        return ReadOutcome::Missing;
    }
    match std::fs::read(&path) {
        Ok(data) => ReadOutcome::Found(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ReadOutcome::Missing,
        Err(e) => ReadOutcome::Failed(e),
    }
}

impl FileDownloadHandler {
    pub fn new(pool: BlockingPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RouteHandler for FileDownloadHandler {
    async fn handle(&self, request: RouteRequest) -> Response {
        let target = request.target;
        let path = target.clone();

        let data = match self.pool.run(move || read_file(path)).await {
            Ok(ReadOutcome::Found(data)) => data,
            Ok(ReadOutcome::Missing) => return Rejection::not_found().into_response(),
            Ok(ReadOutcome::Failed(e)) => {
                tracing::error!(path = %target.display(), error = %e, "Failed to read file");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response();
            }
            Err(PoolError::Saturated { .. }) | Err(PoolError::Closed) => {
                return Rejection::busy().into_response();
            }
            Err(e) => {
                tracing::error!(path = %target.display(), error = %e, "File read task failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response();
            }
        };

        let mut response = (
            [(header::CONTENT_TYPE, content_type_for(&target))],
            data,
        )
            .into_response();

        if let Some(name) = target.file_name().and_then(|n| n.to_str()) {
            if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name.replace('"', ""))) {
                response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
            }
        }
        response
    }
}

/// Catch-all: nothing here.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundHandler;

#[async_trait]
impl RouteHandler for NotFoundHandler {
    async fn handle(&self, _request: RouteRequest) -> Response {
        Rejection::not_found().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method};

    use crate::security::access_control::Identity;

    fn request(target: PathBuf) -> RouteRequest {
        RouteRequest {
            method: Method::GET,
            path: "/downloads/logs/x.log".into(),
            query: None,
            headers: HeaderMap::new(),
            captures: vec![],
            body: Bytes::new(),
            identity: Identity::anonymous(),
            target,
        }
    }

    #[tokio::test]
    async fn serves_existing_file_as_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serial.log");
        std::fs::write(&path, "Send: M105").unwrap();

        let handler = FileDownloadHandler::new(BlockingPool::new(1, 1));
        let response = handler.handle(request(path)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"serial.log\""
        );
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Send: M105");
    }

    #[tokio::test]
    async fn missing_file_and_directory_are_404() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileDownloadHandler::new(BlockingPool::new(1, 1));

        let response = handler.handle(request(dir.path().join("nope.log"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handler.handle(request(dir.path().to_path_buf())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn closed_pool_is_503() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "x").unwrap();

        let pool = BlockingPool::new(1, 1);
        pool.close();
        let response = FileDownloadHandler::new(pool).handle(request(path)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn static_data() {
        let response = StaticDataHandler::new("online\n", "text/plain")
            .handle(request(PathBuf::from("/online.txt")))
            .await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"online\n");
    }
}
