//! Collaborators the thawer is built from.
//!
//! Each seam is a trait so the thawer can run against the archive-backed
//! implementations in this crate or against test doubles.

use std::path::PathBuf;

use coldline_archive::ArchiveBucketLister;
use coldline_types::{Bucket, TimeRange};

use crate::error::{ThawError, ThawResult};

/// Lists archived buckets whose time range overlaps a window.
pub trait ListsBucketsFiltered: Send + Sync {
    /// Buckets of every index.
    fn list_in_range(&self, range: &TimeRange) -> ThawResult<Vec<Bucket>>;

    fn list_in_range_for_index(&self, index: &str, range: &TimeRange)
        -> ThawResult<Vec<Bucket>>;
}

/// Says where a bucket lives (or would live) in the hot tier.
pub trait ThawLocationProvider: Send + Sync {
    /// The local directory for `bucket`. The directory need not exist.
    /// Fails with [`ThawError::LocationLookup`] when none can be determined.
    fn location_for(&self, bucket: &Bucket) -> ThawResult<PathBuf>;
}

/// Copies one archived bucket into the hot tier.
pub trait GetsBucketsFromArchive: Send + Sync {
    /// Returns the hot-tier copy. Fails with [`ThawError::TransferFailed`]
    /// when the bytes could not be fetched and [`ThawError::ImportFailed`]
    /// when they could not be turned into a local bucket.
    fn get_bucket_from_archive(&self, bucket: &Bucket) -> ThawResult<Bucket>;
}

impl ListsBucketsFiltered for ArchiveBucketLister {
    fn list_in_range(&self, range: &TimeRange) -> ThawResult<Vec<Bucket>> {
        ArchiveBucketLister::list_in_range(self, range).map_err(ThawError::Listing)
    }

    fn list_in_range_for_index(
        &self,
        index: &str,
        range: &TimeRange,
    ) -> ThawResult<Vec<Bucket>> {
        ArchiveBucketLister::list_in_range_for_index(self, index, range)
            .map_err(ThawError::Listing)
    }
}
