//! Access validation.
//!
//! # Responsibilities
//! - Resolve the caller's identity from request headers
//! - Decide allow/deny for a required capability
//!
//! Authentication policy lives in the [`IdentityResolver`] implementation; the
//! validators only see the resolved [`Identity`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ApiKeyConfig;
use crate::http::response::Rejection;

/// Header carrying an API key.
pub const X_API_KEY: &str = "x-api-key";

/// A permission a route can require.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Capability {
    FilesDownload,
    TimelapseList,
    LoggingManage,
    Webcam,
    System,
    /// Plugin-defined capability.
    Custom(String),
}

impl Capability {
    pub fn as_str(&self) -> &str {
        match self {
            Capability::FilesDownload => "files_download",
            Capability::TimelapseList => "timelapse_list",
            Capability::LoggingManage => "logging_manage",
            Capability::Webcam => "webcam",
            Capability::System => "system",
            Capability::Custom(name) => name,
        }
    }
}

impl From<String> for Capability {
    fn from(value: String) -> Self {
        match value.as_str() {
            "files_download" => Capability::FilesDownload,
            "timelapse_list" => Capability::TimelapseList,
            "logging_manage" => Capability::LoggingManage,
            "webcam" => Capability::Webcam,
            "system" => Capability::System,
            _ => Capability::Custom(value),
        }
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is making a request and what they may do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    name: Option<String>,
    capabilities: HashSet<Capability>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            name: Some(name.into()),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }
}

/// One link of an access chain.
pub trait AccessValidator: Send + Sync {
    fn validate(&self, identity: &Identity) -> Result<(), Rejection>;
}

impl<F> AccessValidator for F
where
    F: Fn(&Identity) -> Result<(), Rejection> + Send + Sync,
{
    fn validate(&self, identity: &Identity) -> Result<(), Rejection> {
        self(identity)
    }
}

/// Requires a capability: 401 for anonymous callers, 403 for identified ones.
#[derive(Debug, Clone)]
pub struct RequireCapability {
    required: Capability,
}

impl RequireCapability {
    pub fn new(required: Capability) -> Self {
        Self { required }
    }

    pub fn required(&self) -> &Capability {
        &self.required
    }
}

impl AccessValidator for RequireCapability {
    fn validate(&self, identity: &Identity) -> Result<(), Rejection> {
        if identity.has(&self.required) {
            Ok(())
        } else if identity.is_anonymous() {
            Err(Rejection::new(StatusCode::UNAUTHORIZED, "Authentication required"))
        } else {
            Err(Rejection::new(StatusCode::FORBIDDEN, "Insufficient permissions"))
        }
    }
}

/// Turns request headers into an [`Identity`].
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Identity;
}

/// Everyone is anonymous.
#[derive(Debug, Clone, Default)]
pub struct AnonymousResolver;

impl IdentityResolver for AnonymousResolver {
    fn resolve(&self, _headers: &HeaderMap) -> Identity {
        Identity::anonymous()
    }
}

/// Static API keys from configuration, via `X-Api-Key` or `Authorization: Bearer`.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyResolver {
    keys: HashMap<String, Identity>,
}

impl ApiKeyResolver {
    pub fn new(keys: &[ApiKeyConfig]) -> Self {
        Self {
            keys: keys
                .iter()
                .map(|k| {
                    (
                        k.key.clone(),
                        Identity::named(k.name.clone(), k.capabilities.iter().cloned()),
                    )
                })
                .collect(),
        }
    }

    pub fn into_shared(self) -> Arc<dyn IdentityResolver> {
        Arc::new(self)
    }
}

impl IdentityResolver for ApiKeyResolver {
    fn resolve(&self, headers: &HeaderMap) -> Identity {
        let presented = headers
            .get(X_API_KEY)
            .and_then(|v| v.to_str().ok())
            .or_else(|| {
                headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
            });

        presented
            .and_then(|key| self.keys.get(key.trim()))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn require_capability_distinguishes_401_and_403() {
        let validator = RequireCapability::new(Capability::FilesDownload);

        let anon = validator.validate(&Identity::anonymous()).unwrap_err();
        assert_eq!(anon.status, StatusCode::UNAUTHORIZED);

        let user = Identity::named("bob", [Capability::Webcam]);
        assert_eq!(validator.validate(&user).unwrap_err().status, StatusCode::FORBIDDEN);

        let admin = Identity::named("alice", [Capability::FilesDownload]);
        assert!(validator.validate(&admin).is_ok());
    }

    #[test]
    fn api_key_resolver_accepts_both_headers() {
        let resolver = ApiKeyResolver::new(&[ApiKeyConfig {
            name: "ops".into(),
            key: "k1".into(),
            capabilities: vec![Capability::System],
        }]);

        let mut headers = HeaderMap::new();
        headers.insert(X_API_KEY, HeaderValue::from_static("k1"));
        assert_eq!(resolver.resolve(&headers).name(), Some("ops"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer k1"));
        assert!(resolver.resolve(&headers).has(&Capability::System));

        let mut headers = HeaderMap::new();
        headers.insert(X_API_KEY, HeaderValue::from_static("wrong"));
        assert!(resolver.resolve(&headers).is_anonymous());
    }

    #[test]
    fn capability_string_round_trip() {
        assert_eq!(Capability::from("webcam".to_string()), Capability::Webcam);
        assert_eq!(String::from(Capability::Custom("x".into())), "x");
    }
}
