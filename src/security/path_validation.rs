//! Path validation for file-serving routes.
//!
//! # Responsibilities
//! - Reject hidden files and unknown file types
//! - Keep resolved paths inside their root folder
//!
//! # Design Decisions
//! - Each validator carries its own deny status (404 hides existence, 400 flags
//!   a malformed request)
//! - Root containment normalizes `..` first and then canonicalizes the longest
//!   existing ancestor, so neither traversal nor symlinked roots slip through

use std::path::{Component, Path, PathBuf};

use axum::http::StatusCode;

use crate::http::response::Rejection;

/// One link of a path chain.
pub trait PathValidator: Send + Sync {
    fn validate(&self, path: &Path) -> Result<(), Rejection>;
}

/// Wraps a predicate with the status to use on deny.
pub struct PathCheck<F> {
    status: StatusCode,
    predicate: F,
}

impl<F> PathCheck<F>
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    pub fn new(status: StatusCode, predicate: F) -> Self {
        Self { status, predicate }
    }
}

impl<F> PathValidator for PathCheck<F>
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn validate(&self, path: &Path) -> Result<(), Rejection> {
        if (self.predicate)(path) {
            Ok(())
        } else {
            Err(deny(self.status))
        }
    }
}

fn deny(status: StatusCode) -> Rejection {
    match status {
        StatusCode::NOT_FOUND => Rejection::not_found(),
        StatusCode::BAD_REQUEST => Rejection::new(status, "Invalid path"),
        StatusCode::FORBIDDEN => Rejection::new(status, "Forbidden"),
        _ => Rejection::new(status, "Path rejected"),
    }
}

/// True if any component starts with a dot.
pub fn is_hidden_path(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(|n| n.starts_with('.')),
        _ => false,
    })
}

/// Rejects hidden files and folders.
#[derive(Debug, Clone)]
pub struct NotHidden {
    status: StatusCode,
    root: Option<PathBuf>,
}

impl NotHidden {
    pub fn new(status: StatusCode) -> Self {
        Self { status, root: None }
    }

    /// Only inspect the part of the path below `root`.
    pub fn relative_to(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

impl PathValidator for NotHidden {
    fn validate(&self, path: &Path) -> Result<(), Rejection> {
        let inspected = self
            .root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);

        if is_hidden_path(inspected) {
            Err(deny(self.status))
        } else {
            Ok(())
        }
    }
}

/// Only allows the listed extensions (case-insensitive, without the dot).
#[derive(Debug, Clone)]
pub struct AllowedExtensions {
    extensions: Vec<String>,
    status: StatusCode,
}

impl AllowedExtensions {
    pub fn new<I, S>(extensions: I, status: StatusCode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            status,
        }
    }
}

impl PathValidator for AllowedExtensions {
    fn validate(&self, path: &Path) -> Result<(), Rejection> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext {
            Some(ext) if self.extensions.iter().any(|allowed| *allowed == ext) => Ok(()),
            _ => Err(deny(self.status)),
        }
    }
}

/// Requires the path to resolve inside `root`.
#[derive(Debug, Clone)]
pub struct WithinRoot {
    root: PathBuf,
    status: StatusCode,
}

impl WithinRoot {
    pub fn new(root: impl Into<PathBuf>, status: StatusCode) -> Self {
        Self {
            root: root.into(),
            status,
        }
    }
}

impl PathValidator for WithinRoot {
    fn validate(&self, path: &Path) -> Result<(), Rejection> {
        let root = resolve(&self.root);
        if resolve(path).starts_with(&root) {
            Ok(())
        } else {
            Err(deny(self.status))
        }
    }
}

/// Canonicalize the longest existing ancestor and append the rest.
fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let normalized = normalize(&absolute);

    let mut existing = normalized.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(mut canonical) = std::fs::canonicalize(existing) {
            canonical.extend(rest.iter().rev());
            return canonical;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_components_detected() {
        assert!(is_hidden_path(Path::new("/srv/uploads/.secret/file.gcode")));
        assert!(is_hidden_path(Path::new(".env")));
        assert!(!is_hidden_path(Path::new("/srv/uploads/file.gcode")));
        assert!(!is_hidden_path(Path::new("../up/file.gcode")));
    }

    #[test]
    fn not_hidden_ignores_hidden_root() {
        let validator = NotHidden::new(StatusCode::NOT_FOUND).relative_to("/tmp/.tmpabc");
        assert!(validator.validate(Path::new("/tmp/.tmpabc/file.gcode")).is_ok());
        assert!(validator.validate(Path::new("/tmp/.tmpabc/.hidden.gcode")).is_err());
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let validator = AllowedExtensions::new([".log"], StatusCode::NOT_FOUND);
        assert!(validator.validate(Path::new("serial.LOG")).is_ok());
        assert_eq!(
            validator.validate(Path::new("serial.txt")).unwrap_err().status,
            StatusCode::NOT_FOUND
        );
        assert!(validator.validate(Path::new("noext")).is_err());
    }

    #[test]
    fn within_root_blocks_traversal() {
        let validator = WithinRoot::new("/srv/logs", StatusCode::BAD_REQUEST);
        assert!(validator.validate(Path::new("/srv/logs/app.log")).is_ok());

        let err = validator.validate(Path::new("/srv/logs/../etc/passwd")).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn within_root_follows_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.log");
        std::fs::write(&file, "x").unwrap();

        let validator = WithinRoot::new(dir.path(), StatusCode::BAD_REQUEST);
        assert!(validator.validate(&file).is_ok());
    }

    #[test]
    fn within_root_accepts_missing_file_under_real_root() {
        let dir = tempfile::tempdir().unwrap();
        let validator = WithinRoot::new(dir.path(), StatusCode::BAD_REQUEST);
        assert!(validator.validate(&dir.path().join("not-yet.log")).is_ok());
        assert!(validator.validate(&dir.path().join("../escape.log")).is_err());
    }

    #[test]
    fn path_check_uses_given_status() {
        let check = PathCheck::new(StatusCode::FORBIDDEN, |p: &Path| p.starts_with("/public"));
        assert!(check.validate(Path::new("/public/x")).is_ok());
        assert_eq!(check.validate(Path::new("/private")).unwrap_err().status, StatusCode::FORBIDDEN);
    }
}
