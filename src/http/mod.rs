//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (listener handed over from the placeholder)
//!     → server.rs (request ID, tracing, response headers, recording)
//!     → routing::dispatch (validator chains)
//!     → handlers.rs (static data, file downloads, 404)
//!     → response.rs (rejections, content types)
//!     → Send to client
//! ```

pub mod handlers;
pub mod response;
pub mod server;

pub use handlers::{FileDownloadHandler, NotFoundHandler, StaticDataHandler};
pub use response::{Rejection, TRANSPARENT_GIF};
pub use server::{build_router, HttpServer, X_REQUEST_ID};
