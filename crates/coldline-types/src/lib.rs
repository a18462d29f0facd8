//! Foundation types for coldline.
//!
//! Every other coldline crate depends on `coldline-types`. The types here
//! describe *what* moves between storage tiers; none of them perform I/O.
//!
//! # Key Types
//!
//! - [`Bucket`]: immutable unit of indexed data (index, name, range, format, location)
//! - [`BucketLocation`]: either a local directory or a store-relative URI
//! - [`BucketKey`]: stable identity used for per-bucket locking
//! - [`TimeRange`]: inclusive `[earliest, latest]` window
//! - [`BucketFormat`]: archive layout tag, plus [`FormatPriority`] for negotiation

pub mod bucket;
pub mod error;
pub mod format;
pub mod range;

pub use bucket::{parse_bucket_name, Bucket, BucketKey, BucketLocation};
pub use error::TypeError;
pub use format::{BucketFormat, FormatPriority};
pub use range::TimeRange;
