//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after route match):
//!     → limits.rs (resolve body size limit, 413 on overflow)
//!     → access_control.rs (identity → access chain, 401/403)
//!     → path_validation.rs (resolved target → path chain, 404/400)
//!     → Pass to handler
//! Outgoing response:
//!     → headers.rs (robots, nosniff, framing)
//! ```
//!
//! # Design Decisions
//! - Fail closed: the first deny in a chain ends the request
//! - Validators are plain traits, composed per route by the routing table

pub mod access_control;
pub mod headers;
pub mod limits;
pub mod path_validation;

pub use access_control::{
    AccessValidator, AnonymousResolver, ApiKeyResolver, Capability, Identity, IdentityResolver,
    RequireCapability,
};
pub use limits::{BodySizeLimits, BodySizeOverride, BODY_METHODS};
pub use path_validation::{AllowedExtensions, NotHidden, PathCheck, PathValidator, WithinRoot};
