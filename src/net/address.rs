//! Listen address resolution.
//!
//! # Responsibilities
//! - Pick a default host (`::` when IPv6 works, `0.0.0.0` otherwise)
//! - Refuse IPv6 configurations on hosts without IPv6
//! - Resolve host names to a single socket address
//! - Format the URLs the server is reachable on

use std::net::{IpAddr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::sync::OnceLock;

use thiserror::Error;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 5000;

/// Errors raised while building or resolving a [`ListenAddress`].
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("IPv6 host address {0:?} configured but system doesn't support IPv6")]
    Ipv6Unsupported(String),

    #[error("IPv6 only mode configured but system doesn't support IPv6")]
    V6OnlyUnsupported,

    #[error("host name {0:?} contains non-ASCII characters and cannot be resolved")]
    NonAsciiHost(String),

    #[error("could not resolve host {host:?}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host {0:?} resolved to no addresses")]
    NoAddresses(String),
}

/// Whether this machine can open IPv6 sockets. Checked once.
pub fn has_ipv6() -> bool {
    static HAS_V6: OnceLock<bool> = OnceLock::new();
    *HAS_V6.get_or_init(|| std::net::TcpListener::bind((Ipv6Addr::LOCALHOST, 0)).is_ok())
}

/// The host/port pair both the placeholder and the full server bind to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    host: String,
    port: u16,
    v6_only: bool,
}

impl ListenAddress {
    /// Build a listen address, probing the platform for IPv6 support.
    pub fn new(host: Option<&str>, port: u16, v6_only: bool) -> Result<Self, AddressError> {
        Self::with_ipv6_support(host, port, v6_only, has_ipv6())
    }

    fn with_ipv6_support(
        host: Option<&str>,
        port: u16,
        v6_only: bool,
        ipv6: bool,
    ) -> Result<Self, AddressError> {
        if v6_only && !ipv6 {
            return Err(AddressError::V6OnlyUnsupported);
        }

        let host = match host.map(str::trim) {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']').to_string(),
            _ if ipv6 => "::".to_string(),
            _ => "0.0.0.0".to_string(),
        };

        if host.contains(':') && !ipv6 {
            return Err(AddressError::Ipv6Unsupported(host));
        }

        Ok(Self { host, port, v6_only })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn v6_only(&self) -> bool {
        self.v6_only
    }

    /// Same host and stack mode on a different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    /// `::` without `v6_only` accepts IPv4 and IPv6 on one socket.
    pub fn is_dual_stack(&self) -> bool {
        self.host == "::" && !self.v6_only
    }

    /// Resolve to the socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddressError> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        if !self.host.is_ascii() {
            return Err(AddressError::NonAsciiHost(self.host.clone()));
        }

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| AddressError::Resolve {
                host: self.host.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| AddressError::NoAddresses(self.host.clone()))
    }

    /// URLs the server is reachable on, for logging.
    pub fn urls(&self) -> Vec<String> {
        let port = self.port;
        if self.host == "::" {
            if self.v6_only {
                vec![format!("http://[::]:{port}")]
            } else {
                vec![format!("http://0.0.0.0:{port}"), format!("http://[::]:{port}")]
            }
        } else if self.host.contains(':') {
            vec![format!("http://[{}]:{port}", self.host)]
        } else {
            vec![format!("http://{}:{port}", self.host)]
        }
    }
}

impl std::fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.urls().join(" and "))
    }
}
