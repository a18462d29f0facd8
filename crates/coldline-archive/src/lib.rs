//! Archive layout, packaging and archiving for coldline.
//!
//! # Layout
//!
//! ```text
//! <archive_path>/<cluster>/<server>/<index>/<bucket-name>/<format-dir>/
//! ```
//!
//! Bucket names carry their time range (`db_<latest>_<earliest>_<id>`), so
//! the [`ArchiveBucketLister`] can filter without reading bucket contents.
//!
//! # Components
//!
//! - [`ArchiverConfig`] -- TOML-persisted archiver settings
//! - [`ArchivePaths`] -- destination and staging URIs for the layout
//! - [`BucketPackager`] -- streamed `.tar.zst` containers for the packed format
//! - [`format`] -- per-format export and import of bucket directories
//! - [`BucketArchiver`] -- archives local buckets in every configured format
//! - [`ArchiveBucketLister`] -- time-range listing of archived buckets

pub mod archiver;
pub mod config;
pub mod error;
pub mod format;
pub mod lister;
pub mod packager;
pub mod paths;

pub use archiver::{ArchiveReport, BucketArchiver, FailedFormat};
pub use config::ArchiverConfig;
pub use error::{ArchiveError, ArchiveResult};
pub use format::ExportSource;
pub use lister::ArchiveBucketLister;
pub use packager::{BucketPackager, PackedBucket};
pub use paths::ArchivePaths;
