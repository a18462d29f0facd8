use coldline_store::uri;
use coldline_types::{Bucket, BucketFormat};
use url::Url;

use crate::config::ArchiverConfig;
use crate::error::ArchiveResult;

/// Archive layout:
/// `<archive_path>/<cluster>/<server>/<index>/<bucket-name>/<format-dir>/`.
///
/// Staging locations mirror the destination path under the staging root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchivePaths {
    server_root: Url,
    staging_root: Url,
}

impl ArchivePaths {
    pub fn new(
        archive_root: &Url,
        cluster: &str,
        server: &str,
        staging_root: Url,
    ) -> ArchiveResult<Self> {
        Ok(Self {
            server_root: uri::join(archive_root, [cluster, server])?,
            staging_root,
        })
    }

    pub fn from_config(config: &ArchiverConfig) -> ArchiveResult<Self> {
        Self::new(
            &config.archive_path,
            &config.cluster_name,
            &config.server_name,
            config.staging_uri()?,
        )
    }

    /// Directory holding one directory per index.
    pub fn server_root(&self) -> &Url {
        &self.server_root
    }

    pub fn staging_root(&self) -> &Url {
        &self.staging_root
    }

    pub fn index_uri(&self, index: &str) -> ArchiveResult<Url> {
        Ok(uri::child(&self.server_root, index)?)
    }

    pub fn bucket_uri(&self, index: &str, name: &str) -> ArchiveResult<Url> {
        Ok(uri::join(&self.server_root, [index, name])?)
    }

    /// Destination of `bucket` archived in `format`.
    pub fn format_uri(&self, bucket: &Bucket, format: BucketFormat) -> ArchiveResult<Url> {
        Ok(uri::join(
            &self.server_root,
            [bucket.index(), bucket.name(), format.dir_name()],
        )?)
    }

    /// Staging location for a write whose destination is `dst`.
    pub fn temp_uri(&self, dst: &Url) -> Url {
        uri::staging_uri(&self.staging_root, dst)
    }
}
