use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use coldline_archive::{format, ArchiverConfig, BucketPackager};
use coldline_store::{ArchiveFileSystem, StoreError};
use coldline_types::{Bucket, BucketFormat, BucketLocation};
use tracing::{debug, warn};

use crate::error::{ThawError, ThawResult};
use crate::traits::{GetsBucketsFromArchive, ThawLocationProvider};

/// Retrieves archived buckets through an [`ArchiveFileSystem`].
///
/// A bucket is fetched into `<transfer_dir>/<index>/<name>` (staged at
/// `.<name>.part` next to it), then imported into the directory the
/// location provider names for it.
pub struct ArchiveBucketRetriever {
    fs: Arc<dyn ArchiveFileSystem>,
    locations: Arc<dyn ThawLocationProvider>,
    packager: BucketPackager,
    transfer_dir: PathBuf,
}

impl ArchiveBucketRetriever {
    pub fn new(
        fs: Arc<dyn ArchiveFileSystem>,
        locations: Arc<dyn ThawLocationProvider>,
        packager: BucketPackager,
        transfer_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs,
            locations,
            packager,
            transfer_dir: transfer_dir.into(),
        }
    }

    pub fn from_config(
        fs: Arc<dyn ArchiveFileSystem>,
        locations: Arc<dyn ThawLocationProvider>,
        config: &ArchiverConfig,
    ) -> Self {
        Self::new(
            fs,
            locations,
            BucketPackager::new(config.packaging_dir()),
            config.transfer_dir(),
        )
    }

    pub fn transfer_dir(&self) -> &Path {
        &self.transfer_dir
    }

    fn transfer(&self, bucket: &Bucket) -> Result<PathBuf, StoreError> {
        let dir = self.transfer_dir.join(bucket.index());
        let fetched = dir.join(bucket.name());
        let staged = dir.join(format!(".{}.part", bucket.name()));
        // Leftovers of an interrupted retrieval of this bucket.
        for stale in [&fetched, &staged] {
            if stale.exists() {
                fs::remove_dir_all(stale)?;
            }
        }
        fs::create_dir_all(&dir)?;
        self.fs.get_bucket(bucket, &staged, &fetched)?;
        Ok(fetched)
    }
}

impl GetsBucketsFromArchive for ArchiveBucketRetriever {
    fn get_bucket_from_archive(&self, bucket: &Bucket) -> ThawResult<Bucket> {
        let dest = self.locations.location_for(bucket)?;

        let fetched = self
            .transfer(bucket)
            .map_err(|source| ThawError::TransferFailed {
                bucket: bucket.to_string(),
                source,
            })?;
        debug!(bucket = %bucket, path = %fetched.display(), "transferred bucket");

        if let Err(source) = format::import(bucket, &fetched, &dest, &self.packager) {
            if fetched.exists() {
                if let Err(e) = fs::remove_dir_all(&fetched) {
                    warn!(path = %fetched.display(), error = %e, "could not remove transfer directory");
                }
            }
            return Err(ThawError::ImportFailed {
                bucket: bucket.to_string(),
                source,
            });
        }

        Ok(bucket.relocated(BucketFormat::NativeBucket, BucketLocation::Local(dest)))
    }
}

impl std::fmt::Debug for ArchiveBucketRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBucketRetriever")
            .field("packager", &self.packager)
            .field("transfer_dir", &self.transfer_dir)
            .finish()
    }
}
