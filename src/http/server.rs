//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum Router around the route dispatcher
//! - Wire up middleware (preemptive recording, response headers, tracing, request ID)
//! - Serve on an already bound listener until the shutdown broadcast fires
//!
//! # Design Decisions
//! - The dispatcher is the router's only handler (a fallback), so route
//!   matching stays in the frozen [`RouteTable`](crate::routing::RouteTable)
//! - The serve task holds a drain guard: shutdown waits for in-flight requests
//!   within its budget

use std::future::IntoFuture;

use axum::{
    body::Body,
    http::{HeaderName, Request},
    middleware, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::cache::recorder::{record_preemptive, RecorderState};
use crate::lifecycle::drain::DrainGuard;
use crate::routing::Dispatcher;
use crate::security::headers;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The full service, ready to serve once the port is handed over.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(dispatcher: Dispatcher, recorder: Option<RecorderState>, allow_framing: bool) -> Self {
        Self {
            router: build_router(dispatcher, recorder, allow_framing),
        }
    }

    /// A handle on the router, for in-process requests (preemptive replay).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
        guard: DrainGuard,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::debug!("HTTP server received shutdown signal");
            })
            .into_future()
            .await;

        tracing::info!("HTTP server stopped");
        drop(guard);
        result
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(dispatcher: Dispatcher, recorder: Option<RecorderState>, allow_framing: bool) -> Router {
    let mut router = Router::new().fallback(move |request: Request<Body>| {
        let dispatcher = dispatcher.clone();
        async move { dispatcher.dispatch(request).await }
    });

    if let Some(state) = recorder {
        router = router.layer(middleware::from_fn_with_state(state, record_preemptive));
    }

    headers::apply(router, allow_framing)
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::http::handlers::NotFoundHandler;
    use crate::routing::RouteTableBuilder;
    use crate::security::access_control::AnonymousResolver;

    fn dispatcher() -> Dispatcher {
        let table = RouteTableBuilder::new(1024).build(Arc::new(NotFoundHandler));
        Dispatcher::new(table, Arc::new(AnonymousResolver))
    }

    #[tokio::test]
    async fn every_response_carries_request_id_and_headers() {
        let app = build_router(dispatcher(), None, false);
        let response = app
            .oneshot(Request::get("/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(response.headers()["x-frame-options"], "sameorigin");
        assert_eq!(response.headers()["x-robots-tag"], "noindex, nofollow, noimageindex");
    }

    #[tokio::test]
    async fn incoming_request_id_is_propagated() {
        let app = build_router(dispatcher(), None, true);
        let response = app
            .oneshot(
                Request::get("/")
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[X_REQUEST_ID], "abc-123");
        assert!(!response.headers().contains_key("x-frame-options"));
    }
}
