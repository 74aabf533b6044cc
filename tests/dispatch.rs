//! Request dispatch through the assembled route table, over real HTTP.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use bootstrapd::http::Rejection;
use bootstrapd::plugins::{Plugin, PluginInfo, StaticPluginRegistry};
use bootstrapd::routing::{
    handler_fn, AccessValidatorContributor, ContributorError, RouteContributor, RouteSpec,
};
use bootstrapd::security::{AccessValidator, Capability, Identity, PathCheck};

mod common;

const FULL_KEY: &str = "full-key";
const FILES_ONLY_KEY: &str = "files-only";

/// Contributes a duplicate route and a route whose access chain denies first.
struct Demo {
    path_calls: Arc<AtomicUsize>,
}

impl RouteContributor for Demo {
    fn routes(&self) -> Result<Vec<RouteSpec>, ContributorError> {
        let counter = self.path_calls.clone();
        Ok(vec![
            RouteSpec::get("/hello", handler_fn(|_| async { "first".into_response() })),
            RouteSpec::get("/hello", handler_fn(|_| async { "second".into_response() })),
            RouteSpec::get("/guarded", handler_fn(|_| async { "reached".into_response() }))
                .access(Arc::new(|_: &Identity| -> Result<(), Rejection> {
                    Err(Rejection::new(StatusCode::FORBIDDEN, "Denied"))
                }))
                .access(Arc::new(|_: &Identity| -> Result<(), Rejection> { Ok(()) }))
                .path(Arc::new(PathCheck::new(StatusCode::NOT_FOUND, move |_: &Path| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                }))),
        ])
    }
}

impl Plugin for Demo {
    fn routes(&self) -> Option<&dyn RouteContributor> {
        Some(self)
    }
}

/// Blocks every protected route for callers named "blocked".
struct Blocker;

impl AccessValidatorContributor for Blocker {
    fn access_validator(&self) -> Result<Arc<dyn AccessValidator>, ContributorError> {
        Ok(Arc::new(|identity: &Identity| -> Result<(), Rejection> {
            if identity.name() == Some("blocked") {
                Err(Rejection::new(StatusCode::FORBIDDEN, "Blocked"))
            } else {
                Ok(())
            }
        }))
    }
}

impl Plugin for Blocker {
    fn access_validator(&self) -> Option<&dyn AccessValidatorContributor> {
        Some(self)
    }
}

fn seed_folders(base: &Path) {
    let logs = base.join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("serial.log"), "Recv: ok").unwrap();
    std::fs::write(logs.join(".secret.log"), "hidden").unwrap();
    std::fs::write(logs.join("notes.txt"), "not a log").unwrap();

    let timelapse = base.join("timelapse");
    std::fs::create_dir_all(&timelapse).unwrap();
    std::fs::write(base.join("escape.mp4"), "outside").unwrap();
    std::fs::create_dir_all(base.join("uploads")).unwrap();
    std::fs::write(base.join("escape.gcode"), "outside").unwrap();
}

async fn start(base: &Path, path_calls: Arc<AtomicUsize>) -> bootstrapd::lifecycle::RunningServer {
    seed_folders(base);
    let mut config = common::test_config(base);
    config.server.max_body_size = 16;
    config.access.api_keys = vec![
        common::api_key("admin", FULL_KEY, &[Capability::LoggingManage, Capability::TimelapseList]),
        common::api_key("uploader", FILES_ONLY_KEY, &[Capability::FilesDownload]),
        common::api_key("blocked", "blocked-key", &[Capability::LoggingManage]),
    ];

    let registry = StaticPluginRegistry::new()
        .with_plugin(PluginInfo::new("demo", Arc::new(Demo { path_calls })))
        .with_plugin(PluginInfo::new("blocker", Arc::new(Blocker)));
    common::start(config, Arc::new(registry)).await
}

#[tokio::test]
async fn access_chain_statuses() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path(), Arc::default()).await;
    let client = common::client();
    let log = common::url(&server, "/downloads/logs/serial.log");

    let anonymous = client.get(&log).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);

    let wrong_capability = client
        .get(&log)
        .header("x-api-key", FILES_ONLY_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_capability.status(), 403);

    let blocked = client
        .get(&log)
        .header("x-api-key", "blocked-key")
        .send()
        .await
        .unwrap();
    assert_eq!(blocked.status(), 403);

    let allowed = client
        .get(&log)
        .header("authorization", format!("Bearer {FULL_KEY}"))
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
    assert_eq!(allowed.text().await.unwrap(), "Recv: ok");

    server.shutdown().await;
}

#[tokio::test]
async fn path_chain_statuses() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path(), Arc::default()).await;
    let client = common::client();

    let get = |path: &str| {
        client
            .get(common::url(&server, path))
            .header("x-api-key", FULL_KEY)
            .send()
    };

    assert_eq!(get("/downloads/logs/.secret.log").await.unwrap().status(), 404);
    assert_eq!(get("/downloads/logs/notes.txt").await.unwrap().status(), 404);
    assert_eq!(get("/downloads/logs/missing.log").await.unwrap().status(), 404);
    assert_eq!(get("/downloads/timelapse/..%2Fescape.mp4").await.unwrap().status(), 400);

    let escape = client
        .get(common::url(&server, "/downloads/files/local/..%2Fescape.gcode"))
        .header("x-api-key", FILES_ONLY_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(escape.status(), 404);
    assert_ne!(escape.text().await.unwrap(), "outside");

    server.shutdown().await;
}

#[tokio::test]
async fn access_deny_never_reaches_path_validators() {
    let dir = tempfile::tempdir().unwrap();
    let path_calls = Arc::new(AtomicUsize::new(0));
    let server = start(dir.path(), path_calls.clone()).await;

    let response = common::client()
        .get(common::url(&server, "/plugin/demo/guarded"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(path_calls.load(Ordering::SeqCst), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn duplicate_registration_keeps_first_handler() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path(), Arc::default()).await;

    let response = common::client()
        .get(common::url(&server, "/plugin/demo/hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "first");

    server.shutdown().await;
}

#[tokio::test]
async fn body_limits_and_methods() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(dir.path(), Arc::default()).await;
    let client = common::client();
    let payload = "x".repeat(64);

    let too_large = client
        .post(common::url(&server, "/api/settings"))
        .body(payload.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(too_large.status(), 413);

    // uploads have their own, larger limit; the fallback answers 404
    let upload = client
        .post(common::url(&server, "/api/files/local"))
        .body(payload)
        .send()
        .await
        .unwrap();
    assert_eq!(upload.status(), 404);

    let wrong_method = client
        .post(common::url(&server, "/downloads/logs/serial.log"))
        .header("x-api-key", FULL_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_method.status(), 405);

    server.shutdown().await;
}
