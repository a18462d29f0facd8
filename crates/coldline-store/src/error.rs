use std::path::Path;

use url::Url;

/// Errors from addressable store and archive filesystem operations.
///
/// `NotFound` and `AlreadyExists` are kept apart from generic I/O failures
/// because callers branch on them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The source file or URI does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The destination is already present; refusing to overwrite it.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A bucket operation needed content on the other side of the tier
    /// boundary (e.g. putting a bucket that is not on local disk).
    #[error("bucket {bucket} is not {expected}")]
    WrongSide {
        bucket: String,
        expected: &'static str,
    },

    /// A non-recursive delete hit a directory with entries.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The URI cannot address anything in this store.
    #[error("invalid URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// No backend is registered for the URI scheme.
    #[error("unsupported scheme: {0}")]
    Unsupported(String),

    /// The backing technology reported a failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error from the underlying storage backend or the local filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found_uri(uri: &Url) -> Self {
        Self::NotFound(uri.to_string())
    }

    pub fn not_found_path(path: &Path) -> Self {
        Self::NotFound(path.display().to_string())
    }

    pub fn exists_uri(uri: &Url) -> Self {
        Self::AlreadyExists(uri.to_string())
    }

    pub fn exists_path(path: &Path) -> Self {
        Self::AlreadyExists(path.display().to_string())
    }

    pub fn invalid_uri(uri: &Url, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
