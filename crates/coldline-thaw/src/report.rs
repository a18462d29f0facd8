use coldline_types::Bucket;

use crate::error::ThawError;

/// A bucket that did not make it into the hot tier, and why.
#[derive(Debug)]
pub struct FailedBucket {
    pub bucket: Bucket,
    pub error: ThawError,
}

/// Outcome of one thaw batch. Both lists are always populated as far as
/// the batch got; a failure never hides the successes.
#[derive(Debug, Default)]
pub struct ThawReport {
    /// Hot-tier copies of the buckets retrieved in this batch.
    pub thawed: Vec<Bucket>,
    pub failed: Vec<FailedBucket>,
}

impl ThawReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failures other than buckets that were already in the hot tier.
    pub fn errors(&self) -> impl Iterator<Item = &FailedBucket> {
        self.failed.iter().filter(|f| !f.error.is_already_thawed())
    }

    pub(crate) fn absorb(&mut self, outcome: BucketOutcome) {
        self.thawed.extend(outcome.thawed);
        self.failed.extend(outcome.failed);
    }
}

/// What happened to a single candidate.
#[derive(Debug, Default)]
pub(crate) struct BucketOutcome {
    pub(crate) thawed: Option<Bucket>,
    pub(crate) failed: Vec<FailedBucket>,
}

impl BucketOutcome {
    pub(crate) fn fail(&mut self, bucket: &Bucket, error: ThawError) {
        self.failed.push(FailedBucket {
            bucket: bucket.clone(),
            error,
        });
    }
}
