use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What to do with a bucket whose "already thawed" check failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckFailurePolicy {
    /// Record the failure and leave the bucket alone for this batch.
    #[default]
    Skip,
    /// Record the failure, then retrieve anyway.
    Retrieve,
}

/// Thaw settings, the `[thaw]` table of the CLI configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThawConfig {
    pub check_failure_policy: CheckFailurePolicy,
    /// Worker threads for parallel batches.
    pub workers: usize,
    /// Default thaw root; buckets land in `<thaw_root>/<index>/<name>`.
    pub thaw_root: Option<PathBuf>,
    /// Per-index thaw directories; buckets land in `<dir>/<name>`.
    pub index_dirs: BTreeMap<String, PathBuf>,
}

impl Default for ThawConfig {
    fn default() -> Self {
        Self {
            check_failure_policy: CheckFailurePolicy::Skip,
            workers: 4,
            thaw_root: None,
            index_dirs: BTreeMap::new(),
        }
    }
}
