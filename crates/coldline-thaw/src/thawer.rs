use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use chrono::{DateTime, Utc};
use coldline_lock::BucketLocker;
use coldline_types::{Bucket, TimeRange};
use tracing::{debug, error, info, warn};

use crate::config::{CheckFailurePolicy, ThawConfig};
use crate::error::{ThawError, ThawResult};
use crate::report::{BucketOutcome, ThawReport};
use crate::traits::{GetsBucketsFromArchive, ListsBucketsFiltered, ThawLocationProvider};

/// Which archived buckets a batch thaws.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThawFilter {
    index: Option<String>,
    range: TimeRange,
}

impl ThawFilter {
    /// `None` for `index` means every index; a missing bound is open.
    pub fn new(
        index: Option<String>,
        earliest: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
    ) -> ThawResult<Self> {
        let open = TimeRange::unbounded();
        let range = TimeRange::new(
            earliest.unwrap_or(open.earliest()),
            latest.unwrap_or(open.latest()),
        )
        .map_err(|e| ThawError::InvalidFilter(e.to_string()))?;
        if matches!(&index, Some(name) if name.is_empty()) {
            return Err(ThawError::InvalidFilter("empty index name".into()));
        }
        Ok(Self { index, range })
    }

    /// Every archived bucket.
    pub fn all() -> Self {
        Self {
            index: None,
            range: TimeRange::unbounded(),
        }
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn range(&self) -> &TimeRange {
        &self.range
    }
}

/// Brings archived buckets back into the hot tier, one batch at a time.
///
/// Each candidate is checked against its thaw location first. Buckets that
/// are already there are reported as [`ThawError::AlreadyThawed`]; the rest
/// are retrieved under the bucket's lock, where the location is checked
/// again so that a caller who waited on a concurrent thaw of the same
/// bucket does not fetch it a second time.
///
/// Batches never fail because one bucket failed. Every failure ends up in
/// [`ThawReport::failed`] and the batch moves on.
pub struct BucketThawer {
    lister: Arc<dyn ListsBucketsFiltered>,
    retriever: Arc<dyn GetsBucketsFromArchive>,
    locations: Arc<dyn ThawLocationProvider>,
    locker: Arc<BucketLocker>,
    policy: CheckFailurePolicy,
}

impl BucketThawer {
    pub fn new(
        lister: Arc<dyn ListsBucketsFiltered>,
        retriever: Arc<dyn GetsBucketsFromArchive>,
        locations: Arc<dyn ThawLocationProvider>,
        locker: Arc<BucketLocker>,
    ) -> Self {
        Self {
            lister,
            retriever,
            locations,
            locker,
            policy: CheckFailurePolicy::default(),
        }
    }

    pub fn with_check_failure_policy(mut self, policy: CheckFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn from_config(
        lister: Arc<dyn ListsBucketsFiltered>,
        retriever: Arc<dyn GetsBucketsFromArchive>,
        locations: Arc<dyn ThawLocationProvider>,
        locker: Arc<BucketLocker>,
        config: &ThawConfig,
    ) -> Self {
        Self::new(lister, retriever, locations, locker)
            .with_check_failure_policy(config.check_failure_policy)
    }

    /// Archived buckets matching `filter`.
    pub fn candidates(&self, filter: &ThawFilter) -> ThawResult<Vec<Bucket>> {
        match filter.index() {
            Some(index) => self.lister.list_in_range_for_index(index, filter.range()),
            None => self.lister.list_in_range(filter.range()),
        }
    }

    /// Thaw every bucket matching `filter`, one after another.
    ///
    /// Only a failure to list candidates is returned as `Err`.
    pub fn thaw_buckets(&self, filter: &ThawFilter) -> ThawResult<ThawReport> {
        let candidates = self.candidates(filter)?;
        debug!(count = candidates.len(), "thawing buckets");
        let mut report = ThawReport::default();
        for bucket in &candidates {
            report.absorb(self.thaw_bucket(bucket));
        }
        Ok(report)
    }

    /// Like [`BucketThawer::thaw_buckets`], with up to `workers` buckets
    /// in flight. The report lists buckets in candidate order.
    pub fn thaw_buckets_parallel(
        &self,
        filter: &ThawFilter,
        workers: usize,
    ) -> ThawResult<ThawReport> {
        let candidates = self.candidates(filter)?;
        let workers = workers.max(1).min(candidates.len());
        debug!(count = candidates.len(), workers, "thawing buckets in parallel");

        let next = AtomicUsize::new(0);
        let outcomes: Mutex<Vec<(usize, BucketOutcome)>> =
            Mutex::new(Vec::with_capacity(candidates.len()));
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(bucket) = candidates.get(i) else {
                        break;
                    };
                    let outcome = self.thaw_bucket(bucket);
                    outcomes
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((i, outcome));
                });
            }
        });

        let mut outcomes = outcomes.into_inner().unwrap_or_else(PoisonError::into_inner);
        outcomes.sort_by_key(|(i, _)| *i);
        let mut report = ThawReport::default();
        for (_, outcome) in outcomes {
            report.absorb(outcome);
        }
        Ok(report)
    }

    fn thaw_bucket(&self, bucket: &Bucket) -> BucketOutcome {
        let mut outcome = BucketOutcome::default();
        match self.thawed_at(bucket) {
            Ok(Some(path)) => {
                warn!(bucket = %bucket, path = %path.display(), "bucket is already thawed");
                outcome.fail(bucket, already_thawed(bucket, path));
                return outcome;
            }
            Ok(None) => {}
            Err(e) => {
                error!(bucket = %bucket, error = %e, "could not check whether bucket is thawed");
                outcome.fail(bucket, e);
                if self.policy == CheckFailurePolicy::Skip {
                    return outcome;
                }
            }
        }

        self.locker.call_under_shared_lock(bucket, |bucket| {
            if let Ok(Some(path)) = self.thawed_at(bucket) {
                warn!(
                    bucket = %bucket,
                    path = %path.display(),
                    "bucket was thawed while waiting for its lock"
                );
                outcome.fail(bucket, already_thawed(bucket, path));
                return;
            }
            match self.retriever.get_bucket_from_archive(bucket) {
                Ok(thawed) => {
                    info!(bucket = %bucket, location = ?thawed.location(), "thawed bucket");
                    outcome.thawed = Some(thawed);
                }
                Err(e) => {
                    warn!(bucket = %bucket, error = %e, "failed to thaw bucket");
                    outcome.fail(bucket, e);
                }
            }
        });
        outcome
    }

    /// The bucket's thaw location, if something is already there.
    fn thawed_at(&self, bucket: &Bucket) -> ThawResult<Option<PathBuf>> {
        let path = self.locations.location_for(bucket)?;
        Ok(path.exists().then_some(path))
    }
}

fn already_thawed(bucket: &Bucket, path: PathBuf) -> ThawError {
    ThawError::AlreadyThawed {
        bucket: bucket.to_string(),
        path,
    }
}

impl std::fmt::Debug for BucketThawer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketThawer")
            .field("locker", &self.locker)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::ThawDirectory;
    use coldline_archive::ArchiveError;
    use coldline_store::StoreError;
    use coldline_types::{BucketFormat, BucketLocation};
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use std::sync::Barrier;
    use std::time::Duration;

    fn bucket(index: &str, name: &str) -> Bucket {
        let uri = format!("hdfs://nn/archive/{index}/{name}/native");
        Bucket::from_name(
            index,
            name,
            BucketFormat::NativeBucket,
            BucketLocation::Remote(url::Url::parse(&uri).unwrap()),
        )
        .unwrap()
    }

    #[derive(Default)]
    struct FakeLister {
        buckets: Vec<Bucket>,
        calls: Mutex<Vec<Option<String>>>,
        broken: bool,
    }

    impl FakeLister {
        fn with(buckets: Vec<Bucket>) -> Self {
            Self {
                buckets,
                ..Self::default()
            }
        }
    }

    impl ListsBucketsFiltered for FakeLister {
        fn list_in_range(&self, range: &TimeRange) -> ThawResult<Vec<Bucket>> {
            self.calls.lock().unwrap().push(None);
            if self.broken {
                return Err(ThawError::Listing(ArchiveError::Config("offline".into())));
            }
            Ok(self
                .buckets
                .iter()
                .filter(|b| b.range().overlaps(range))
                .cloned()
                .collect())
        }

        fn list_in_range_for_index(
            &self,
            index: &str,
            range: &TimeRange,
        ) -> ThawResult<Vec<Bucket>> {
            self.calls.lock().unwrap().push(Some(index.to_string()));
            Ok(self
                .buckets
                .iter()
                .filter(|b| b.index() == index && b.range().overlaps(range))
                .cloned()
                .collect())
        }
    }

    /// Materializes buckets in its thaw directory, with instrumentation.
    struct FakeRetriever {
        locations: ThawDirectory,
        fail_transfer: HashSet<String>,
        fail_import: HashSet<String>,
        delay: Duration,
        barrier: Option<Barrier>,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeRetriever {
        fn new(root: &Path) -> Self {
            Self {
                locations: ThawDirectory::new(root),
                fail_transfer: HashSet::new(),
                fail_import: HashSet::new(),
                delay: Duration::ZERO,
                barrier: None,
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    impl GetsBucketsFromArchive for FakeRetriever {
        fn get_bucket_from_archive(&self, bucket: &Bucket) -> ThawResult<Bucket> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait();
            }
            thread::sleep(self.delay);

            let result = if self.fail_transfer.contains(bucket.name()) {
                Err(ThawError::TransferFailed {
                    bucket: bucket.to_string(),
                    source: StoreError::NotFound(bucket.name().to_string()),
                })
            } else if self.fail_import.contains(bucket.name()) {
                Err(ThawError::ImportFailed {
                    bucket: bucket.to_string(),
                    source: ArchiveError::Import {
                        bucket: bucket.to_string(),
                        reason: "empty".into(),
                    },
                })
            } else {
                let dest = self.locations.location_for(bucket).unwrap();
                fs::create_dir_all(dest.join("rawdata")).unwrap();
                fs::write(dest.join("1.tsidx"), b"t").unwrap();
                Ok(bucket.relocated(BucketFormat::NativeBucket, BucketLocation::Local(dest)))
            };
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    /// Fails lookups for the named buckets.
    struct FlakyLocations {
        inner: ThawDirectory,
        broken: HashSet<String>,
    }

    impl ThawLocationProvider for FlakyLocations {
        fn location_for(&self, bucket: &Bucket) -> ThawResult<PathBuf> {
            if self.broken.contains(bucket.name()) {
                return Err(ThawError::LocationLookup {
                    bucket: bucket.to_string(),
                    reason: "lookup timed out".into(),
                });
            }
            self.inner.location_for(bucket)
        }
    }

    fn thawer(
        lister: Arc<FakeLister>,
        retriever: Arc<FakeRetriever>,
        locations: Arc<dyn ThawLocationProvider>,
    ) -> BucketThawer {
        BucketThawer::new(lister, retriever, locations, Arc::new(BucketLocker::new()))
    }

    fn names(buckets: &[Bucket]) -> Vec<&str> {
        buckets.iter().map(|b| b.name()).collect()
    }

    fn three_buckets() -> Vec<Bucket> {
        vec![
            bucket("main", "db_200_100_1"),
            bucket("main", "db_400_300_2"),
            bucket("main", "db_600_500_3"),
        ]
    }

    #[test]
    fn already_thawed_bucket_does_not_stop_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let retriever = Arc::new(FakeRetriever::new(tmp.path()));
        let thawer = thawer(
            Arc::new(FakeLister::with(three_buckets())),
            Arc::clone(&retriever),
            Arc::new(ThawDirectory::new(tmp.path())),
        );
        fs::create_dir_all(tmp.path().join("main/db_400_300_2")).unwrap();

        let report = thawer.thaw_buckets(&ThawFilter::all()).unwrap();
        assert_eq!(names(&report.thawed), vec!["db_200_100_1", "db_600_500_3"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].bucket.name(), "db_400_300_2");
        assert!(report.failed[0].error.is_already_thawed());
        assert_eq!(report.errors().count(), 0);
        assert_eq!(retriever.calls(), 2);
    }

    #[test]
    fn transfer_and_import_failures_are_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let mut retriever = FakeRetriever::new(tmp.path());
        retriever.fail_transfer.insert("db_200_100_1".into());
        retriever.fail_import.insert("db_400_300_2".into());
        let thawer = thawer(
            Arc::new(FakeLister::with(three_buckets())),
            Arc::new(retriever),
            Arc::new(ThawDirectory::new(tmp.path())),
        );

        let report = thawer.thaw_buckets(&ThawFilter::all()).unwrap();
        assert_eq!(names(&report.thawed), vec!["db_600_500_3"]);
        assert!(matches!(report.failed[0].error, ThawError::TransferFailed { .. }));
        assert!(matches!(report.failed[1].error, ThawError::ImportFailed { .. }));
        assert!(!report.is_complete());
    }

    #[test]
    fn filter_selects_index_and_range() {
        let tmp = tempfile::tempdir().unwrap();
        let mut buckets = three_buckets();
        buckets.push(bucket("web", "db_450_350_9"));
        let lister = Arc::new(FakeLister::with(buckets));
        let thawer = thawer(
            Arc::clone(&lister),
            Arc::new(FakeRetriever::new(tmp.path())),
            Arc::new(ThawDirectory::new(tmp.path())),
        );

        let web = ThawFilter::new(Some("web".into()), None, None).unwrap();
        let report = thawer.thaw_buckets(&web).unwrap();
        assert_eq!(names(&report.thawed), vec!["db_450_350_9"]);

        let window = ThawFilter::new(
            None,
            DateTime::from_timestamp(250, 0),
            DateTime::from_timestamp(320, 0),
        )
        .unwrap();
        let report = thawer.thaw_buckets(&window).unwrap();
        assert_eq!(names(&report.thawed), vec!["db_400_300_2"]);

        assert_eq!(*lister.calls.lock().unwrap(), vec![Some("web".to_string()), None]);
    }

    #[test]
    fn malformed_filters_are_rejected() {
        let inverted = ThawFilter::new(
            None,
            DateTime::from_timestamp(500, 0),
            DateTime::from_timestamp(100, 0),
        );
        assert!(matches!(inverted, Err(ThawError::InvalidFilter(_))));
        assert!(matches!(
            ThawFilter::new(Some(String::new()), None, None),
            Err(ThawError::InvalidFilter(_))
        ));
    }

    #[test]
    fn listing_failure_fails_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let lister = FakeLister {
            broken: true,
            ..FakeLister::default()
        };
        let thawer = thawer(
            Arc::new(lister),
            Arc::new(FakeRetriever::new(tmp.path())),
            Arc::new(ThawDirectory::new(tmp.path())),
        );
        assert!(matches!(
            thawer.thaw_buckets(&ThawFilter::all()),
            Err(ThawError::Listing(_))
        ));
    }

    fn flaky_thawer(
        root: &Path,
        policy: CheckFailurePolicy,
    ) -> (Arc<FakeRetriever>, BucketThawer) {
        let retriever = Arc::new(FakeRetriever::new(root));
        let locations = FlakyLocations {
            inner: ThawDirectory::new(root),
            broken: HashSet::from(["db_400_300_2".to_string()]),
        };
        let thawer = thawer(
            Arc::new(FakeLister::with(three_buckets())),
            Arc::clone(&retriever),
            Arc::new(locations),
        )
        .with_check_failure_policy(policy);
        (retriever, thawer)
    }

    #[test]
    fn failed_check_skips_retrieval_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, thawer) = flaky_thawer(tmp.path(), CheckFailurePolicy::Skip);

        let report = thawer.thaw_buckets(&ThawFilter::all()).unwrap();
        assert_eq!(names(&report.thawed), vec!["db_200_100_1", "db_600_500_3"]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].error, ThawError::LocationLookup { .. }));
        assert_eq!(retriever.calls(), 2);
    }

    #[test]
    fn failed_check_can_still_retrieve() {
        let tmp = tempfile::tempdir().unwrap();
        let (retriever, thawer) = flaky_thawer(tmp.path(), CheckFailurePolicy::Retrieve);

        let report = thawer.thaw_buckets(&ThawFilter::all()).unwrap();
        assert_eq!(report.thawed.len(), 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].bucket.name(), "db_400_300_2");
        assert_eq!(retriever.calls(), 3);
    }

    #[test]
    fn same_bucket_is_never_retrieved_concurrently() {
        let tmp = tempfile::tempdir().unwrap();
        let mut retriever = FakeRetriever::new(tmp.path());
        retriever.delay = Duration::from_millis(50);
        let retriever = Arc::new(retriever);
        let same = bucket("main", "db_200_100_1");
        let thawer = thawer(
            Arc::new(FakeLister::with(vec![same.clone(); 4])),
            Arc::clone(&retriever),
            Arc::new(ThawDirectory::new(tmp.path())),
        );

        let report = thawer.thaw_buckets_parallel(&ThawFilter::all(), 4).unwrap();
        assert_eq!(retriever.peak(), 1);
        assert_eq!(retriever.calls(), 1);
        assert_eq!(report.thawed.len(), 1);
        assert_eq!(report.failed.len(), 3);
        assert!(report.failed.iter().all(|f| f.error.is_already_thawed()));
    }

    #[test]
    fn distinct_buckets_are_retrieved_concurrently() {
        let tmp = tempfile::tempdir().unwrap();
        let mut retriever = FakeRetriever::new(tmp.path());
        // Both retrievals must be inside the handler at once to pass.
        retriever.barrier = Some(Barrier::new(2));
        let retriever = Arc::new(retriever);
        let thawer = thawer(
            Arc::new(FakeLister::with(three_buckets()[..2].to_vec())),
            Arc::clone(&retriever),
            Arc::new(ThawDirectory::new(tmp.path())),
        );

        let report = thawer.thaw_buckets_parallel(&ThawFilter::all(), 2).unwrap();
        assert_eq!(retriever.peak(), 2);
        assert_eq!(names(&report.thawed), vec!["db_200_100_1", "db_400_300_2"]);
    }

    #[test]
    fn parallel_report_keeps_candidate_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut retriever = FakeRetriever::new(tmp.path());
        retriever.fail_transfer.insert("db_200_100_1".into());
        let thawer = thawer(
            Arc::new(FakeLister::with(three_buckets())),
            Arc::new(retriever),
            Arc::new(ThawDirectory::new(tmp.path())),
        );
        fs::create_dir_all(tmp.path().join("main/db_600_500_3")).unwrap();

        let report = thawer.thaw_buckets_parallel(&ThawFilter::all(), 8).unwrap();
        assert_eq!(names(&report.thawed), vec!["db_400_300_2"]);
        let failed: Vec<_> = report.failed.iter().map(|f| f.bucket.name()).collect();
        assert_eq!(failed, vec!["db_200_100_1", "db_600_500_3"]);
    }

    #[test]
    fn empty_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let thawer = thawer(
            Arc::new(FakeLister::default()),
            Arc::new(FakeRetriever::new(tmp.path())),
            Arc::new(ThawDirectory::new(tmp.path())),
        );
        let report = thawer.thaw_buckets_parallel(&ThawFilter::all(), 4).unwrap();
        assert!(report.thawed.is_empty() && report.is_complete());
    }
}
