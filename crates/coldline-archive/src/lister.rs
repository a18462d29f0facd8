use std::sync::Arc;

use coldline_store::{uri, ArchiveFileSystem};
use coldline_types::{
    parse_bucket_name, Bucket, BucketFormat, BucketLocation, FormatPriority, TimeRange,
};
use tracing::debug;

use crate::error::ArchiveResult;
use crate::paths::ArchivePaths;

/// Lists archived buckets by walking the archive layout.
///
/// Directory names that do not parse as bucket names are skipped. When a
/// bucket is archived in several formats, one is picked per the configured
/// [`FormatPriority`].
pub struct ArchiveBucketLister {
    fs: Arc<dyn ArchiveFileSystem>,
    paths: ArchivePaths,
    priority: FormatPriority,
}

impl ArchiveBucketLister {
    pub fn new(
        fs: Arc<dyn ArchiveFileSystem>,
        paths: ArchivePaths,
        priority: FormatPriority,
    ) -> Self {
        Self { fs, paths, priority }
    }

    /// Names of all archived indexes, sorted.
    pub fn indexes(&self) -> ArchiveResult<Vec<String>> {
        let mut names: Vec<String> = self
            .fs
            .list(self.paths.server_root())?
            .iter()
            .filter_map(uri::file_name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Buckets of every index overlapping `range`.
    pub fn list_in_range(&self, range: &TimeRange) -> ArchiveResult<Vec<Bucket>> {
        let mut buckets = Vec::new();
        for index in self.indexes()? {
            buckets.extend(self.list_in_range_for_index(&index, range)?);
        }
        Ok(buckets)
    }

    /// Buckets of `index` overlapping `range`, sorted by name.
    pub fn list_in_range_for_index(
        &self,
        index: &str,
        range: &TimeRange,
    ) -> ArchiveResult<Vec<Bucket>> {
        let mut buckets = Vec::new();
        for bucket_uri in self.fs.list(&self.paths.index_uri(index)?)? {
            let Some(name) = uri::file_name(&bucket_uri) else {
                continue;
            };
            let bucket_range = match parse_bucket_name(&name) {
                Ok(r) => r,
                Err(e) => {
                    debug!(uri = %bucket_uri, error = %e, "skipping non-bucket entry");
                    continue;
                }
            };
            if !bucket_range.overlaps(range) {
                continue;
            }

            let available = self.formats_of(&bucket_uri)?;
            let Some(format) = self.priority.choose(&available) else {
                debug!(uri = %bucket_uri, "bucket has no archived formats");
                continue;
            };
            let location = uri::child(&bucket_uri, format.dir_name())?;
            buckets.push(Bucket::new(
                index,
                name,
                format,
                BucketLocation::Remote(location),
                bucket_range,
            )?);
        }
        buckets.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(buckets)
    }

    fn formats_of(&self, bucket_uri: &url::Url) -> ArchiveResult<Vec<BucketFormat>> {
        let mut formats: Vec<BucketFormat> = self
            .fs
            .list(bucket_uri)?
            .iter()
            .filter_map(uri::file_name)
            .map(|dir| BucketFormat::from_dir_name(&dir))
            .collect();
        formats.sort();
        formats.dedup();
        Ok(formats)
    }
}

impl std::fmt::Debug for ArchiveBucketLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBucketLister")
            .field("paths", &self.paths)
            .field("priority", &self.priority)
            .finish()
    }
}
