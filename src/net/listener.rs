//! TCP listener binding shared by the placeholder and the full server.
//!
//! # Responsibilities
//! - Resolve the configured [`ListenAddress`]
//! - Create the socket close-on-exec so spawned children cannot hold the port
//! - Set `IPV6_V6ONLY` explicitly (dual-stack only for `::`)
//! - Classify bind failures (port taken, host encoding, resolution)

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

use crate::net::address::{AddressError, ListenAddress};

const BACKLOG: i32 = 128;

/// Error type for bind operations.
#[derive(Debug)]
pub enum BindError {
    /// Another socket already listens on the address.
    AddressInUse(SocketAddr),
    /// Host name cannot be encoded for the platform resolver.
    UnsupportedEncoding(String),
    /// Address could not be built or resolved.
    Address(AddressError),
    /// Any other socket failure.
    Io(io::Error),
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindError::AddressInUse(addr) => write!(f, "Address {} is already in use", addr),
            BindError::UnsupportedEncoding(host) => write!(
                f,
                "Host name {:?} contains non-ASCII characters; use an IP address or an ASCII host name",
                host
            ),
            BindError::Address(e) => write!(f, "Invalid listen address: {}", e),
            BindError::Io(e) => write!(f, "Failed to bind: {}", e),
        }
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BindError::Address(e) => Some(e),
            BindError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AddressError> for BindError {
    fn from(e: AddressError) -> Self {
        match e {
            AddressError::NonAsciiHost(host) => BindError::UnsupportedEncoding(host),
            other => BindError::Address(other),
        }
    }
}

/// Bind a non-blocking std listener on the exact configured address.
///
/// The returned socket is already listening, so the port is claimed the moment this
/// function returns.
pub fn bind_std(address: &ListenAddress) -> Result<std::net::TcpListener, BindError> {
    let addr = address.socket_addr()?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(BindError::Io)?;

    mark_close_on_exec(&socket).map_err(BindError::Io)?;

    // Lets the full server rebind while placeholder connections sit in TIME_WAIT.
    #[cfg(unix)]
    socket.set_reuse_address(true).map_err(BindError::Io)?;

    if addr.is_ipv6() {
        socket
            .set_only_v6(!address.is_dual_stack())
            .map_err(BindError::Io)?;
    }

    socket.bind(&addr.into()).map_err(|e| classify(e, addr))?;
    socket.listen(BACKLOG).map_err(|e| classify(e, addr))?;
    socket.set_nonblocking(true).map_err(BindError::Io)?;

    let listener: std::net::TcpListener = socket.into();

    tracing::debug!(
        address = %addr,
        dual_stack = address.is_dual_stack(),
        "Listener bound"
    );

    Ok(listener)
}

/// Bind a tokio listener. Must be called inside a runtime.
pub fn bind(address: &ListenAddress) -> Result<TcpListener, BindError> {
    let listener = bind_std(address)?;
    TcpListener::from_std(listener).map_err(BindError::Io)
}

fn classify(e: io::Error, addr: SocketAddr) -> BindError {
    if e.kind() == io::ErrorKind::AddrInUse {
        BindError::AddressInUse(addr)
    } else {
        BindError::Io(e)
    }
}

#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
fn mark_close_on_exec(socket: &Socket) -> io::Result<()> {
    socket.set_cloexec(true)
}

#[cfg(windows)]
fn mark_close_on_exec(socket: &Socket) -> io::Result<()> {
    socket.set_no_inherit(true)
}

#[cfg(not(any(
    all(unix, not(any(target_os = "solaris", target_os = "illumos"))),
    windows
)))]
fn mark_close_on_exec(_socket: &Socket) -> io::Result<()> {
    tracing::warn!("Close-on-exec not supported on this platform, child processes may inherit the listener");
    Ok(())
}
