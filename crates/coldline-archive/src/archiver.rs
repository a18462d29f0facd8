use std::sync::Arc;

use coldline_lock::BucketLocker;
use coldline_store::ArchiveFileSystem;
use coldline_types::{Bucket, BucketFormat, BucketLocation};
use tracing::{info, warn};

use crate::config::ArchiverConfig;
use crate::error::{ArchiveError, ArchiveResult};
use crate::format;
use crate::packager::BucketPackager;
use crate::paths::ArchivePaths;

/// A format that could not be archived.
#[derive(Debug)]
pub struct FailedFormat {
    pub format: BucketFormat,
    pub error: ArchiveError,
}

/// Outcome of archiving one bucket in every configured format.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    /// Archived copies, located in the archive.
    pub archived: Vec<Bucket>,
    pub failed: Vec<FailedFormat>,
}

impl ArchiveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Copies local buckets into the archive layout.
pub struct BucketArchiver {
    fs: Arc<dyn ArchiveFileSystem>,
    locker: Arc<BucketLocker>,
    paths: ArchivePaths,
    packager: BucketPackager,
    formats: Vec<BucketFormat>,
}

impl BucketArchiver {
    pub fn new(
        fs: Arc<dyn ArchiveFileSystem>,
        locker: Arc<BucketLocker>,
        paths: ArchivePaths,
        packager: BucketPackager,
        formats: Vec<BucketFormat>,
    ) -> Self {
        Self {
            fs,
            locker,
            paths,
            packager,
            formats,
        }
    }

    pub fn from_config(
        fs: Arc<dyn ArchiveFileSystem>,
        locker: Arc<BucketLocker>,
        config: &ArchiverConfig,
    ) -> ArchiveResult<Self> {
        config.validate()?;
        Ok(Self::new(
            fs,
            locker,
            ArchivePaths::from_config(config)?,
            BucketPackager::new(config.packaging_dir()),
            config.archive_formats.clone(),
        ))
    }

    pub fn paths(&self) -> &ArchivePaths {
        &self.paths
    }

    /// Archive `bucket` in every configured format.
    ///
    /// Formats are independent: one failing does not stop the others.
    pub fn archive(&self, bucket: &Bucket) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        for &format in &self.formats {
            match self.archive_format(bucket, format) {
                Ok(archived) => {
                    info!(bucket = %bucket, format = %format, "archived");
                    report.archived.push(archived);
                }
                Err(error) => {
                    warn!(bucket = %bucket, format = %format, error = %error, "archive failed");
                    report.failed.push(FailedFormat { format, error });
                }
            }
        }
        report
    }

    /// Archive `bucket` in one format, returning the archived copy.
    ///
    /// Serialized with other writers of the same destination.
    pub fn archive_format(
        &self,
        bucket: &Bucket,
        format: BucketFormat,
    ) -> ArchiveResult<Bucket> {
        let dst = self.paths.format_uri(bucket, format)?;
        let temp = self.paths.temp_uri(&dst);

        self.locker.call_under_key(dst.as_str(), || -> ArchiveResult<Bucket> {
            let source = format::export(bucket, format, &self.packager)?;
            let export =
                bucket.relocated(format, BucketLocation::Local(source.dir().to_path_buf()));

            let outcome = self.fs.put_bucket(&export, &temp, &dst);
            if let Err(e) = self.fs.clean_bucket_transaction(&export, &temp) {
                warn!(temp = %temp, error = %e, "staging cleanup failed");
            }
            if let Err(e) = source.cleanup() {
                warn!(bucket = %bucket, error = %e, "export scratch cleanup failed");
            }
            outcome?;
            Ok(bucket.relocated(format, BucketLocation::Remote(dst.clone())))
        })
    }
}

impl std::fmt::Debug for BucketArchiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketArchiver")
            .field("paths", &self.paths)
            .field("formats", &self.formats)
            .finish()
    }
}
