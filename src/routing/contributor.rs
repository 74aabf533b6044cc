//! Plugin contributions to the route table.
//!
//! # Responsibilities
//! - Mount contributed routes under `/plugin/{id}/`
//! - Accept contributed body size overrides for body-carrying methods only
//! - Append contributed access validators to protected routes
//!
//! # Design Decisions
//! - A contributor that errors or panics is logged and skipped; assembly goes on
//! - Contributors run in registry order, after the built-in routes

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;

use crate::cache::recorder::PLUGIN_OPTION;
use crate::plugins::PluginInfo;
use crate::routing::router::{RouteSpec, RouteTableBuilder};
use crate::security::access_control::AccessValidator;
use crate::security::limits::{is_body_method, BodySizeLimits, BodySizeOverride};

#[derive(Debug, Error)]
pub enum ContributorError {
    #[error("{0}")]
    Failed(String),

    #[error("contributor panicked: {0}")]
    Panicked(String),
}

impl ContributorError {
    pub fn failed(message: impl Into<String>) -> Self {
        ContributorError::Failed(message.into())
    }
}

/// Extra routes. Patterns are relative to `/plugin/{id}/`.
pub trait RouteContributor: Send + Sync {
    fn routes(&self) -> Result<Vec<RouteSpec>, ContributorError>;
}

/// A body size rule contributed by a plugin.
#[derive(Debug, Clone)]
pub struct BodySizeRule {
    pub method: Method,
    /// Relative to `/plugin/{id}/`.
    pub pattern: String,
    pub limit: usize,
}

pub trait BodySizeContributor: Send + Sync {
    /// `current` holds the limits registered so far.
    fn body_sizes(&self, current: &BodySizeLimits) -> Result<Vec<BodySizeRule>, ContributorError>;
}

pub trait AccessValidatorContributor: Send + Sync {
    fn access_validator(&self) -> Result<Arc<dyn AccessValidator>, ContributorError>;
}

/// What contributors added, for the startup log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ContributionReport {
    pub routes: usize,
    pub body_sizes: usize,
    pub access_validators: usize,
    pub failures: usize,
}

/// `/plugin/{id}/` + `pattern`, with the id escaped for the regex.
pub fn plugin_prefixed(id: &str, pattern: &str) -> String {
    format!(
        "/plugin/{}/{}",
        regex::escape(id),
        pattern.trim_start_matches('/')
    )
}

fn guarded<T>(
    plugin: &str,
    hook: &'static str,
    f: impl FnOnce() -> Result<T, ContributorError>,
) -> Option<T> {
    let result = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        Err(ContributorError::Panicked(panic_message(panic.as_ref())))
    });

    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(plugin = %plugin, hook, error = %e, "Error while retrieving contribution, skipping it");
            None
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Apply every enabled plugin's contributions to `builder`.
pub fn apply_contributions(builder: &mut RouteTableBuilder, plugins: &[PluginInfo]) -> ContributionReport {
    let mut report = ContributionReport::default();

    for info in plugins {
        let Some(plugin) = info.active() else {
            continue;
        };

        if let Some(contributor) = plugin.routes() {
            match guarded(&info.id, "routes", || contributor.routes()) {
                Some(routes) => {
                    for mut spec in routes {
                        spec.pattern = plugin_prefixed(&info.id, &spec.pattern);
                        if plugin.ui().is_some() {
                            spec.options
                                .entry(PLUGIN_OPTION.to_string())
                                .or_insert_with(|| info.id.clone().into());
                        }
                        if builder.register(spec).is_ok() {
                            report.routes += 1;
                        }
                    }
                }
                None => report.failures += 1,
            }
        }

        if let Some(contributor) = plugin.body_sizes() {
            match guarded(&info.id, "body_sizes", || contributor.body_sizes(builder.body_limits())) {
                Some(rules) => {
                    for rule in rules {
                        if !is_body_method(&rule.method) {
                            tracing::warn!(
                                plugin = %info.id,
                                method = %rule.method,
                                pattern = %rule.pattern,
                                "Ignoring body size override for method without body"
                            );
                            continue;
                        }
                        let pattern = plugin_prefixed(&info.id, &rule.pattern);
                        match BodySizeOverride::new(rule.method, &pattern, rule.limit) {
                            Ok(rule) => {
                                builder.add_body_size(rule);
                                report.body_sizes += 1;
                            }
                            Err(e) => {
                                tracing::warn!(plugin = %info.id, pattern = %pattern, error = %e, "Invalid body size pattern");
                            }
                        }
                    }
                }
                None => report.failures += 1,
            }
        }

        if let Some(contributor) = plugin.access_validator() {
            match guarded(&info.id, "access_validator", || contributor.access_validator()) {
                Some(validator) => {
                    builder.append_access_validator(validator);
                    report.access_validators += 1;
                }
                None => report.failures += 1,
            }
        }
    }

    tracing::info!(
        routes = report.routes,
        body_sizes = report.body_sizes,
        access_validators = report.access_validators,
        failures = report.failures,
        "Plugin contributions applied"
    );
    report
}
