use coldline_store::StoreError;
use coldline_types::{BucketFormat, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot export bucket {bucket} as {format}")]
    Unexportable { bucket: String, format: BucketFormat },

    #[error("bucket {bucket} cannot be imported: {reason}")]
    Import { bucket: String, reason: String },

    #[error("packaging failed for {path}: {reason}")]
    Packaging { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// True when the error came from a destination that was already present.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_already_exists())
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
