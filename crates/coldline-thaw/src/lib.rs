//! Batch retrieval ("thawing") of archived buckets into the hot tier.
//!
//! [`BucketThawer`] lists candidates through [`ListsBucketsFiltered`],
//! skips buckets whose [`ThawLocationProvider`] location already exists,
//! and retrieves the rest through [`GetsBucketsFromArchive`] while holding
//! the bucket's lock. Results come back as a [`ThawReport`]: one bucket's
//! failure is recorded there and never aborts the batch.
//!
//! The archive-backed collaborators are [`ArchiveBucketLister`]
//! (re-exported from `coldline-archive`), [`ArchiveBucketRetriever`] and
//! [`ThawDirectory`].
//!
//! [`ArchiveBucketLister`]: coldline_archive::ArchiveBucketLister

pub mod config;
pub mod error;
pub mod location;
pub mod report;
pub mod retriever;
pub mod thawer;
pub mod traits;

pub use config::{CheckFailurePolicy, ThawConfig};
pub use error::{ThawError, ThawResult};
pub use location::ThawDirectory;
pub use report::{FailedBucket, ThawReport};
pub use retriever::ArchiveBucketRetriever;
pub use thawer::{BucketThawer, ThawFilter};
pub use traits::{GetsBucketsFromArchive, ListsBucketsFiltered, ThawLocationProvider};

#[cfg(test)]
mod tests {
    use super::*;
    use coldline_archive::{ArchiveBucketLister, ArchivePaths, BucketArchiver, BucketPackager};
    use coldline_lock::BucketLocker;
    use coldline_store::{ArchiveFileSystem, LocalFileStore, TransactionalArchive};
    use coldline_types::{Bucket, BucketFormat, FormatPriority};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use url::Url;

    fn hot_bucket(root: &Path, name: &str) -> Bucket {
        let dir = root.join("hot/main").join(name);
        fs::create_dir_all(dir.join("rawdata")).unwrap();
        fs::write(dir.join("rawdata/journal.gz"), b"journal").unwrap();
        fs::write(dir.join("1.tsidx"), b"tsidx").unwrap();
        fs::write(dir.join("Hosts.data"), b"hosts").unwrap();
        Bucket::local("main", &dir, BucketFormat::NativeBucket).unwrap()
    }

    /// Archive two buckets in `format`, thaw them back, and check the copies.
    fn round_trip(format: BucketFormat) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let archive_root = Url::from_directory_path(root.join("archive")).unwrap();
        let staging = Url::from_directory_path(root.join("staging")).unwrap();

        let fs: Arc<dyn ArchiveFileSystem> = Arc::new(TransactionalArchive::new(
            Arc::new(LocalFileStore::filesystem()),
            staging.clone(),
        ));
        let paths = ArchivePaths::new(&archive_root, "cluster", "server", staging).unwrap();
        let locker = Arc::new(BucketLocker::new());
        let packager = BucketPackager::new(root.join("packaging"));

        let archiver = BucketArchiver::new(
            Arc::clone(&fs),
            Arc::clone(&locker),
            paths.clone(),
            packager.clone(),
            vec![format],
        );
        for name in ["db_200_100_1", "db_400_300_2"] {
            let report = archiver.archive(&hot_bucket(root, name));
            assert!(report.is_complete(), "{:?}", report.failed);
        }

        let thaw_dir = root.join("thawed");
        let locations = Arc::new(ThawDirectory::without_root().with_index_dir("main", &thaw_dir));
        let lister = ArchiveBucketLister::new(Arc::clone(&fs), paths, FormatPriority::default());
        let retriever = ArchiveBucketRetriever::new(
            fs,
            locations.clone(),
            packager,
            root.join("transfer"),
        );
        let thawer = BucketThawer::new(
            Arc::new(lister),
            Arc::new(retriever),
            locations,
            locker,
        );

        let report = thawer.thaw_buckets(&ThawFilter::all()).unwrap();
        assert!(report.is_complete(), "{:?}", report.failed);
        assert_eq!(report.thawed.len(), 2);
        for thawed in &report.thawed {
            assert_eq!(thawed.format(), BucketFormat::NativeBucket);
            let dir = thawed.local_path().unwrap();
            assert!(dir.is_dir());
            assert_eq!(dir.parent(), Some(thaw_dir.as_path()));
            assert!(fs::read_dir(dir).unwrap().count() > 2);
            assert_eq!(fs::read(dir.join("rawdata/journal.gz")).unwrap(), b"journal");
        }

        // A second batch finds everything in place.
        let again = thawer.thaw_buckets(&ThawFilter::all()).unwrap();
        assert!(again.thawed.is_empty());
        assert!(again.failed.iter().all(|f| f.error.is_already_thawed()));
    }

    #[test]
    fn native_round_trip() {
        round_trip(BucketFormat::NativeBucket);
    }

    #[test]
    fn packed_round_trip() {
        round_trip(BucketFormat::PackedContainer);
    }
}
