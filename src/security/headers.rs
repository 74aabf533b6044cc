//! Response header transforms.
//!
//! # Responsibilities
//! - Keep the service out of search indexes (`X-Robots-Tag`)
//! - Disable content sniffing (`X-Content-Type-Options`)
//! - Deny cross-origin framing unless explicitly allowed (`X-Frame-Options`)
//!
//! # Design Decisions
//! - Applied as tower layers on the outermost router, so handlers, the fallback
//!   and preemptive replays all get the same headers
//! - Headers are overridden, never appended

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

pub const X_ROBOTS_TAG: HeaderName = HeaderName::from_static("x-robots-tag");

const ROBOTS: &str = "noindex, nofollow, noimageindex";

/// Wrap `router` with the response header transforms.
pub fn apply<S>(router: Router<S>, allow_framing: bool) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = router
        .layer(SetResponseHeaderLayer::overriding(
            X_ROBOTS_TAG,
            HeaderValue::from_static(ROBOTS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    if allow_framing {
        router
    } else {
        router.layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("sameorigin"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    async fn headers_for(allow_framing: bool) -> axum::http::HeaderMap {
        let app = apply(Router::new().route("/", get(|| async { "ok" })), allow_framing);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.headers().clone()
    }

    #[tokio::test]
    async fn security_headers_present() {
        let headers = headers_for(false).await;
        assert_eq!(headers["x-robots-tag"], "noindex, nofollow, noimageindex");
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "sameorigin");
    }

    #[tokio::test]
    async fn framing_can_be_allowed() {
        let headers = headers_for(true).await;
        assert!(headers.get("x-frame-options").is_none());
        assert_eq!(headers["x-content-type-options"], "nosniff");
    }
}
