//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Assembly (at startup):
//!     builtin.rs (declarative download domains, status files, body overrides)
//!     + contributor.rs (plugin routes, body sizes, access validators)
//!     → router.rs (RouteTableBuilder: dedup, compile patterns)
//!     → Freeze as immutable RouteTable
//!
//! Incoming Request:
//!     → dispatch.rs (decode, match, limit, access chain, path chain)
//!     → handler or fallback
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Anchored regex patterns, most specific first
//! - First registration of a `(pattern, method)` pair wins

pub mod builtin;
pub mod chain;
pub mod contributor;
pub mod dispatch;
pub mod matcher;
pub mod router;

pub use builtin::{register_builtin, DownloadDomain, DOWNLOAD_DOMAINS};
pub use chain::ValidatorChain;
pub use contributor::{
    apply_contributions, AccessValidatorContributor, BodySizeContributor, BodySizeRule,
    ContributionReport, ContributorError, RouteContributor,
};
pub use dispatch::Dispatcher;
pub use matcher::RoutePattern;
pub use router::{
    handler_fn, RouteEntry, RouteError, RouteHandler, RouteMatch, RouteRequest, RouteSpec,
    RouteTable, RouteTableBuilder,
};
