use std::collections::HashMap;
use std::path::{Path, PathBuf};

use coldline_types::Bucket;

use crate::config::ThawConfig;
use crate::error::{ThawError, ThawResult};
use crate::traits::ThawLocationProvider;

/// Hot-tier directories for thawed buckets.
///
/// An index with its own directory thaws into `<dir>/<name>`. Every other
/// index thaws into `<root>/<index>/<name>`, if a root is set.
#[derive(Clone, Debug, Default)]
pub struct ThawDirectory {
    root: Option<PathBuf>,
    index_dirs: HashMap<String, PathBuf>,
}

impl ThawDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            index_dirs: HashMap::new(),
        }
    }

    /// Only indexes given with [`ThawDirectory::with_index_dir`] resolve.
    pub fn without_root() -> Self {
        Self::default()
    }

    pub fn with_index_dir(mut self, index: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.index_dirs.insert(index.into(), dir.into());
        self
    }

    pub fn from_config(config: &ThawConfig) -> Self {
        Self {
            root: config.thaw_root.clone(),
            index_dirs: config
                .index_dirs
                .iter()
                .map(|(index, dir)| (index.clone(), dir.clone()))
                .collect(),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

impl ThawLocationProvider for ThawDirectory {
    fn location_for(&self, bucket: &Bucket) -> ThawResult<PathBuf> {
        if let Some(dir) = self.index_dirs.get(bucket.index()) {
            return Ok(dir.join(bucket.name()));
        }
        match &self.root {
            Some(root) => Ok(root.join(bucket.index()).join(bucket.name())),
            None => Err(ThawError::LocationLookup {
                bucket: bucket.to_string(),
                reason: format!("no thaw directory configured for index {}", bucket.index()),
            }),
        }
    }
}
