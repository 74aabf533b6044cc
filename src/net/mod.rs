//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenAddress (address.rs)
//!     → listener.rs (close-on-exec socket, v6only flag, bind + listen)
//!     → claim.rs (placeholder server owns the socket during startup)
//!     → stop() returns, socket closed
//!     → listener.rs binds again for the full server
//! ```
//!
//! # Design Decisions
//! - Exactly one owner of the port at any instant: stop-then-bind, never overlapping
//! - Bind errors are classified so bootstrap can print a useful diagnostic
//! - Sockets are never inheritable by child processes

pub mod address;
pub mod claim;
pub mod listener;

pub use address::{AddressError, ListenAddress};
pub use claim::{PlaceholderRule, PlaceholderRules, PortClaimServer};
pub use listener::BindError;
