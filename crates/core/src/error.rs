//! Crate-wide error type. Every error carries a stable `code`, a path-sanitized
//! `user_message`, and a `developer_message` with the detail that should never
//! reach a client directly (spec §7).

use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    IndexNotFound,
    IndexCorrupt,
    InvalidPath,
    InvalidInput,
    PathTraversal,
    SymlinkNotAllowed,
    PermissionDenied,
    FileNotFound,
    ProjectNotDetected,
    EmbeddingFailed,
    EmbeddingDimensionMismatch,
    ExtractionFailed,
    ResourceLimit,
    Cancelled,
    Unknown,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(thiserror::Error, Debug)]
#[error("{code}: {user_message}")]
pub struct Error {
    pub code: ErrorCode,
    pub user_message: String,
    pub developer_message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(code: ErrorCode, user_message: impl Into<String>) -> Self {
        let user_message = user_message.into();
        Self { code, developer_message: user_message.clone(), user_message, cause: None }
    }

    pub fn with_developer(mut self, dev: impl Into<String>) -> Self {
        self.developer_message = dev.into();
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn resource_limit(which: &str) -> Self {
        Self::new(ErrorCode::ResourceLimit, format!("resource limit exceeded: {which}"))
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, msg)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "operation cancelled")
    }
}

/// Replace the user's home directory and any absolute prefix before `~` with
/// `~`, and otherwise strip the directory leading up to a project root so
/// error messages never leak the host filesystem layout.
pub fn sanitize_path_for_user(path: &Path) -> String {
    let s = path.to_string_lossy();
    if let Some(home) = dirs_home() {
        if let Ok(rest) = path.strip_prefix(&home) {
            return format!("~/{}", rest.display());
        }
    }
    s.into_owned()
}

fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

pub type Result<T> = std::result::Result<T, Error>;
