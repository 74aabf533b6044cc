//! Request body size limits.
//!
//! # Responsibilities
//! - Resolve the maximum body size for a `(method, path)` pair
//! - Hold per-route overrides on top of a global default
//!
//! # Design Decisions
//! - Overrides are checked in registration order, first match wins
//! - Patterns are anchored regexes, the same dialect routes use
//! - Only body-carrying methods may be overridden by contributors

use axum::http::Method;
use regex::Regex;

/// Methods that carry a request body.
pub const BODY_METHODS: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

pub fn is_body_method(method: &Method) -> bool {
    BODY_METHODS.contains(method)
}

/// A single `(method, pattern, limit)` rule.
#[derive(Debug, Clone)]
pub struct BodySizeOverride {
    method: Method,
    pattern: Regex,
    limit: usize,
}

impl BodySizeOverride {
    pub fn new(method: Method, pattern: &str, limit: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            method,
            pattern: Regex::new(&format!("^(?:{pattern})$"))?,
            limit,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The pattern as written, without the anchors.
    pub fn pattern(&self) -> &str {
        let raw = self.pattern.as_str();
        raw.strip_prefix("^(?:")
            .and_then(|p| p.strip_suffix(")$"))
            .unwrap_or(raw)
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == *method && self.pattern.is_match(path)
    }
}

/// Global default plus ordered overrides.
#[derive(Debug, Clone)]
pub struct BodySizeLimits {
    default: usize,
    overrides: Vec<BodySizeOverride>,
}

impl BodySizeLimits {
    pub fn new(default: usize) -> Self {
        Self {
            default,
            overrides: Vec::new(),
        }
    }

    pub fn push(&mut self, rule: BodySizeOverride) {
        tracing::debug!(
            method = %rule.method,
            pattern = rule.pattern(),
            limit = rule.limit,
            "Body size override registered"
        );
        self.overrides.push(rule);
    }

    pub fn default_limit(&self) -> usize {
        self.default
    }

    pub fn overrides(&self) -> &[BodySizeOverride] {
        &self.overrides
    }

    /// Limit for a request; the default when no override matches.
    pub fn resolve(&self, method: &Method, path: &str) -> usize {
        self.overrides
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| rule.limit)
            .unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_override_wins() {
        let mut limits = BodySizeLimits::new(100);
        limits.push(BodySizeOverride::new(Method::POST, "/api/files/([^/]*)", 1000).unwrap());
        limits.push(BodySizeOverride::new(Method::POST, "/api/files/.*", 5).unwrap());

        assert_eq!(limits.resolve(&Method::POST, "/api/files/local"), 1000);
        assert_eq!(limits.resolve(&Method::POST, "/api/files/local/sub"), 5);
    }

    #[test]
    fn falls_back_to_default() {
        let mut limits = BodySizeLimits::new(100);
        limits.push(BodySizeOverride::new(Method::POST, "/api/languages", 5000).unwrap());

        assert_eq!(limits.resolve(&Method::PUT, "/api/languages"), 100);
        assert_eq!(limits.resolve(&Method::POST, "/api/languages/extra"), 100);
        assert_eq!(limits.resolve(&Method::POST, "/api/languages"), 5000);
    }

    #[test]
    fn pattern_round_trips_without_anchors() {
        let rule = BodySizeOverride::new(Method::PATCH, "/x/(.*)", 1).unwrap();
        assert_eq!(rule.pattern(), "/x/(.*)");
    }

    #[test]
    fn body_methods() {
        assert!(is_body_method(&Method::DELETE));
        assert!(!is_body_method(&Method::GET));
    }
}
