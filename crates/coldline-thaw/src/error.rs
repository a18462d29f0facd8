use std::path::PathBuf;

use coldline_archive::ArchiveError;
use coldline_store::StoreError;
use thiserror::Error;

/// Why a bucket was not thawed, or why a batch could not start.
#[derive(Debug, Error)]
pub enum ThawError {
    #[error("bucket {bucket} is already thawed at {}", path.display())]
    AlreadyThawed { bucket: String, path: PathBuf },

    #[error("transfer of bucket {bucket} failed: {source}")]
    TransferFailed {
        bucket: String,
        #[source]
        source: StoreError,
    },

    #[error("import of bucket {bucket} failed: {source}")]
    ImportFailed {
        bucket: String,
        #[source]
        source: ArchiveError,
    },

    #[error("no thaw location for bucket {bucket}: {reason}")]
    LocationLookup { bucket: String, reason: String },

    #[error("invalid thaw filter: {0}")]
    InvalidFilter(String),

    #[error("listing archived buckets failed: {0}")]
    Listing(#[source] ArchiveError),
}

impl ThawError {
    pub fn is_already_thawed(&self) -> bool {
        matches!(self, Self::AlreadyThawed { .. })
    }
}

pub type ThawResult<T> = Result<T, ThawError>;
