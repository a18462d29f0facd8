use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced while constructing or parsing coldline types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid bucket name {name:?}: {reason}")]
    InvalidBucketName { name: String, reason: String },

    #[error("time range is inverted: earliest {earliest} is after latest {latest}")]
    InvertedRange {
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("unknown bucket format: {0}")]
    UnknownFormat(String),

    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}
