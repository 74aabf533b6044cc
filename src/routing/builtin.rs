//! Built-in routes.
//!
//! # Responsibilities
//! - Declare the protected download domains in one table
//! - Turn each domain into a route with its access and path chains
//! - Register the public status routes and default body size overrides
//!
//! # Design Decisions
//! - A domain is data (pattern, capability, folder, extensions, policy); the
//!   validator wiring is derived from it, never written per route
//! - Hidden files and unknown types answer 404 so their existence does not leak

use std::path::Path;
use std::sync::Arc;

use axum::http::{Method, StatusCode};

use crate::cache::recorder::PREEMPTIVE_OPTION;
use crate::config::{BootstrapConfig, FolderKind};
use crate::http::handlers::{FileDownloadHandler, StaticDataHandler};
use crate::http::response::TRANSPARENT_GIF;
use crate::routing::router::{RouteError, RouteSpec, RouteTableBuilder};
use crate::runtime::pool::BlockingPool;
use crate::security::access_control::{Capability, RequireCapability};
use crate::security::limits::BodySizeOverride;
use crate::security::path_validation::{AllowedExtensions, NotHidden, WithinRoot};

/// A protected download area.
#[derive(Debug, Clone)]
pub struct DownloadDomain {
    pub name: &'static str,
    pub pattern: &'static str,
    pub capability: Capability,
    pub folder: FolderKind,
    pub extensions: &'static [&'static str],
    /// Status for targets that resolve outside the folder.
    pub outside_root: StatusCode,
}

pub const DOWNLOAD_DOMAINS: [DownloadDomain; 3] = [
    DownloadDomain {
        name: "files",
        pattern: "/downloads/files/local/(.*)",
        capability: Capability::FilesDownload,
        folder: FolderKind::Uploads,
        extensions: &["gcode", "gco", "g", "stl"],
        outside_root: StatusCode::NOT_FOUND,
    },
    DownloadDomain {
        name: "logs",
        pattern: "/downloads/logs/([^/]*)",
        capability: Capability::LoggingManage,
        folder: FolderKind::Logs,
        extensions: &["log"],
        outside_root: StatusCode::BAD_REQUEST,
    },
    DownloadDomain {
        name: "timelapse",
        pattern: "/downloads/timelapse/(.*)",
        capability: Capability::TimelapseList,
        folder: FolderKind::Timelapse,
        extensions: &["mpg", "mpeg", "mp4", "m4v", "mkv", "jpg"],
        outside_root: StatusCode::BAD_REQUEST,
    },
];

/// Upload size limit for the file upload API.
pub const UPLOAD_PATTERN: &str = "/api/files/([^/]*)";

/// Language pack uploads.
pub const LANGUAGE_PATTERN: &str = "/api/languages";
pub const LANGUAGE_MAX_SIZE: usize = 5 * 1024 * 1024;

const LANDING_PAGE: &str = "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>bootstrapd</title></head>\n<body><p>Server is up.</p></body></html>\n";

impl DownloadDomain {
    /// The route for this domain, rooted at `root`.
    /// Every domain is confined to its folder.
    pub fn route(&self, root: &Path, pool: BlockingPool) -> RouteSpec {
        RouteSpec::get(self.pattern, Arc::new(FileDownloadHandler::new(pool)))
            .access(Arc::new(RequireCapability::new(self.capability.clone())))
            .path(Arc::new(NotHidden::new(StatusCode::NOT_FOUND).relative_to(root)))
            .path(Arc::new(AllowedExtensions::new(
                self.extensions.iter().copied(),
                StatusCode::NOT_FOUND,
            )))
            .path(Arc::new(WithinRoot::new(root, self.outside_root)))
            .option("domain", self.name)
            .target_root(root)
            .protected()
    }
}

/// Every built-in route, in registration order.
pub fn builtin_routes(config: &BootstrapConfig, pool: &BlockingPool) -> Vec<RouteSpec> {
    let mut routes: Vec<RouteSpec> = DOWNLOAD_DOMAINS
        .iter()
        .map(|domain| domain.route(&config.folders.resolve(domain.folder), pool.clone()))
        .collect();

    routes.push(RouteSpec::get_exact(
        "/online.txt",
        Arc::new(StaticDataHandler::new("online\n", "text/plain")),
    ));
    routes.push(RouteSpec::get_exact(
        "/online.gif",
        Arc::new(StaticDataHandler::new(TRANSPARENT_GIF, "image/gif")),
    ));
    routes.push(
        RouteSpec::get("/", Arc::new(StaticDataHandler::new(LANDING_PAGE, "text/html")))
            .option(PREEMPTIVE_OPTION, true),
    );
    routes
}

/// Body size overrides that ship with the server.
pub fn default_body_sizes(config: &BootstrapConfig) -> Result<Vec<BodySizeOverride>, regex::Error> {
    Ok(vec![
        BodySizeOverride::new(Method::POST, UPLOAD_PATTERN, config.server.upload_max_size)?,
        BodySizeOverride::new(Method::POST, LANGUAGE_PATTERN, LANGUAGE_MAX_SIZE)?,
    ])
}

/// Register the built-in routes and body size overrides on `builder`.
pub fn register_builtin(
    builder: &mut RouteTableBuilder,
    config: &BootstrapConfig,
    pool: &BlockingPool,
) -> Result<(), RouteError> {
    for spec in builtin_routes(config, pool) {
        builder.register(spec)?;
    }

    let rules = default_body_sizes(config).map_err(|source| RouteError::InvalidPattern {
        pattern: UPLOAD_PATTERN.to_string(),
        source,
    })?;
    for rule in rules {
        builder.add_body_size(rule);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::router::RouteMatch;

    fn config(base: &Path) -> BootstrapConfig {
        let mut config = BootstrapConfig::default();
        config.folders.base = base.to_path_buf();
        config
    }

    #[test]
    fn domains_become_protected_rooted_routes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let pool = BlockingPool::new(1, 1);

        let mut builder = RouteTableBuilder::new(config.server.max_body_size);
        register_builtin(&mut builder, &config, &pool).unwrap();
        let table = builder.build(Arc::new(crate::http::handlers::NotFoundHandler));

        let logs = table.find("/downloads/logs/([^/]*)", &Method::GET).unwrap();
        assert_eq!(logs.chain().access_len(), 1);
        assert_eq!(logs.chain().path_len(), 3);
        assert_eq!(logs.target_root(), Some(dir.path().join("logs").as_path()));

        for domain in &DOWNLOAD_DOMAINS {
            let route = table.find(domain.pattern, &Method::GET).unwrap();
            assert_eq!(route.chain().path_len(), 3, "{} is not confined", domain.name);
        }

        let online = table.find(&regex::escape("/online.txt"), &Method::GET).unwrap();
        assert_eq!(online.chain().access_len(), 0);
        assert_eq!(online.chain().path_len(), 0);
    }

    #[test]
    fn default_overrides_apply_to_uploads() {
        let config = BootstrapConfig::default();
        let mut builder = RouteTableBuilder::new(config.server.max_body_size);
        register_builtin(&mut builder, &config, &BlockingPool::new(1, 1)).unwrap();
        let limits = builder.body_limits();

        assert_eq!(
            limits.resolve(&Method::POST, "/api/files/local"),
            config.server.upload_max_size
        );
        assert_eq!(limits.resolve(&Method::POST, "/api/languages"), LANGUAGE_MAX_SIZE);
        assert_eq!(limits.resolve(&Method::GET, "/api/files/local"), config.server.max_body_size);
    }

    #[test]
    fn log_pattern_does_not_cross_folders() {
        let config = BootstrapConfig::default();
        let mut builder = RouteTableBuilder::new(1024);
        register_builtin(&mut builder, &config, &BlockingPool::new(1, 1)).unwrap();
        let table = builder.build(Arc::new(crate::http::handlers::NotFoundHandler));

        assert!(matches!(
            table.match_route(&Method::GET, "/downloads/logs/sub/x.log"),
            RouteMatch::Fallback
        ));
        assert!(matches!(
            table.match_route(&Method::POST, "/downloads/logs/x.log"),
            RouteMatch::MethodNotAllowed
        ));
    }

    #[test]
    fn static_files_match_their_exact_name() {
        let config = BootstrapConfig::default();
        let mut builder = RouteTableBuilder::new(1024);
        register_builtin(&mut builder, &config, &BlockingPool::new(1, 1)).unwrap();
        let table = builder.build(Arc::new(crate::http::handlers::NotFoundHandler));

        assert!(matches!(
            table.match_route(&Method::GET, "/online.txt"),
            RouteMatch::Matched { .. }
        ));
        for path in ["/onlineXtxt", "/online_gif"] {
            assert!(matches!(table.match_route(&Method::GET, path), RouteMatch::Fallback), "{path}");
        }
    }
}
