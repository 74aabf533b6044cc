//! Response helpers shared by the placeholder and the full server.
//!
//! # Responsibilities
//! - Canned payloads (status pixel)
//! - Map request rejections to HTTP responses
//! - Guess content types for served files

use std::path::Path;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// 1x1 transparent GIF.
pub const TRANSPARENT_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3b,
];

/// A request stopped before its handler ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub reason: &'static str,
}

impl Rejection {
    pub const fn new(status: StatusCode, reason: &'static str) -> Self {
        Self { status, reason }
    }

    pub const fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }

    pub const fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    pub const fn payload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
    }

    pub const fn busy() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Server busy, try again later")
    }

    /// Short label for metrics.
    pub fn metric_reason(&self) -> &'static str {
        match self.status.as_u16() {
            400 => "bad_path",
            401 => "unauthorized",
            403 => "forbidden",
            404 => "not_found",
            405 => "method_not_allowed",
            413 => "payload_too_large",
            503 => "busy",
            _ => "other",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status, self.reason).into_response()
    }
}

/// Content type by file extension, `application/octet-stream` when unknown.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("log") | Some("txt") | Some("gcode") | Some("gco") | Some("g") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mpg") | Some("mpeg") => "video/mpeg",
        Some("mkv") => "video/x-matroska",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}
