use std::fs;
use std::path::{Path, PathBuf};

use coldline_types::{BucketFormat, FormatPriority};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ArchiveError, ArchiveResult};

/// Directory name of the default staging root under `archive_path`.
pub const DEFAULT_STAGING_DIR: &str = ".coldline-staging";

/// Archiver settings, persisted as TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    /// Formats every bucket is archived in.
    pub archive_formats: Vec<BucketFormat>,
    pub cluster_name: String,
    pub server_name: String,
    /// Format chosen when a bucket is archived in several; first listed wins.
    pub bucket_format_priority: Vec<BucketFormat>,
    /// Root URI of the archive tier.
    pub archive_path: Url,
    /// Root URI for staging writes. Defaults to `<archive_path>/.coldline-staging`.
    pub staging_path: Option<Url>,
    /// Local scratch space for packaging and thaw transfers.
    pub local_root: PathBuf,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            archive_formats: vec![BucketFormat::NativeBucket],
            cluster_name: "cluster".into(),
            server_name: "server".into(),
            bucket_format_priority: FormatPriority::default().formats().to_vec(),
            archive_path: Url::parse("file:///var/lib/coldline/archive")
                .expect("static URL is valid"),
            staging_path: None,
            local_root: PathBuf::from("/var/lib/coldline/work"),
        }
    }
}

impl ArchiverConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> ArchiveResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ArchiveResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ArchiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration, creating the parent directory.
    pub fn save(&self, path: &Path) -> ArchiveResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> ArchiveResult<String> {
        toml::to_string_pretty(self).map_err(|e| ArchiveError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ArchiveResult<()> {
        if self.cluster_name.is_empty() || self.cluster_name.contains('/') {
            return Err(ArchiveError::Config(format!(
                "cluster_name {:?} must be a non-empty path segment",
                self.cluster_name
            )));
        }
        if self.server_name.is_empty() || self.server_name.contains('/') {
            return Err(ArchiveError::Config(format!(
                "server_name {:?} must be a non-empty path segment",
                self.server_name
            )));
        }
        if self.archive_formats.is_empty() {
            return Err(ArchiveError::Config("archive_formats is empty".into()));
        }
        if self.archive_formats.contains(&BucketFormat::Unknown) {
            return Err(ArchiveError::Config(
                "archive_formats cannot contain unknown".into(),
            ));
        }
        if self.archive_path.cannot_be_a_base() {
            return Err(ArchiveError::Config(format!(
                "archive_path {} is not hierarchical",
                self.archive_path
            )));
        }
        Ok(())
    }

    /// Effective staging root.
    pub fn staging_uri(&self) -> ArchiveResult<Url> {
        match &self.staging_path {
            Some(uri) => Ok(uri.clone()),
            None => Ok(coldline_store::uri::child(
                &self.archive_path,
                DEFAULT_STAGING_DIR,
            )?),
        }
    }

    pub fn format_priority(&self) -> FormatPriority {
        FormatPriority::new(self.bucket_format_priority.clone())
    }

    /// Scratch directory for packed containers.
    pub fn packaging_dir(&self) -> PathBuf {
        self.local_root.join("packaging")
    }

    /// Scratch directory for buckets in transit from the archive.
    pub fn transfer_dir(&self) -> PathBuf {
        self.local_root.join("transfer")
    }
}
