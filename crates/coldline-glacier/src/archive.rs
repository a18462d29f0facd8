use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use coldline_archive::BucketPackager;
use coldline_store::{ArchiveFileSystem, ByteStream, StoreError, StoreResult};
use coldline_types::Bucket;
use tracing::{info, warn};
use url::Url;

use crate::client::DeepArchiveClient;

/// Archive filesystem that writes through a warm tier and ships a packed
/// copy of every bucket to a deep-archive vault.
///
/// Tiering operations:
/// - `put_bucket` writes to the warm tier, then packs and uploads the
///   bucket with the destination path as archive id.
/// - `get_bucket` reads from the warm tier and falls back to the vault when
///   the warm copy is gone.
/// - `delete` removes the warm copy and the vault archive.
///
/// Everything else is forwarded to the warm tier unchanged.
pub struct GlacierArchive {
    warm: Arc<dyn ArchiveFileSystem>,
    client: Arc<dyn DeepArchiveClient>,
    packager: BucketPackager,
    vault: String,
}

impl GlacierArchive {
    pub fn new(
        warm: Arc<dyn ArchiveFileSystem>,
        client: Arc<dyn DeepArchiveClient>,
        packager: BucketPackager,
        vault: impl Into<String>,
    ) -> Self {
        Self {
            warm,
            client,
            packager,
            vault: vault.into(),
        }
    }

    pub fn warm(&self) -> &Arc<dyn ArchiveFileSystem> {
        &self.warm
    }

    pub fn vault(&self) -> &str {
        &self.vault
    }

    /// Vault archive id for a destination in the warm tier.
    pub fn archive_id(uri: &Url) -> &str {
        uri.path()
    }

    fn ship_to_vault(&self, bucket: &Bucket, dir: &Path, dst: &Url) -> StoreResult<()> {
        let packed = self
            .packager
            .pack_into_scratch(dir, bucket.name())
            .map_err(crate::GlacierError::from)?;
        let uploaded = self
            .client
            .upload(&self.vault, Self::archive_id(dst), packed.container());
        let scratch = packed.dir().to_path_buf();
        if let Err(e) = packed.close() {
            warn!(path = %scratch.display(), error = %e, "packaging scratch cleanup failed");
        }
        uploaded?;
        info!(bucket = %bucket, vault = %self.vault, "shipped bucket to vault");
        Ok(())
    }

    fn restore_from_vault(
        &self,
        bucket: &Bucket,
        remote: &Url,
        temp: &Path,
        dst: &Path,
    ) -> StoreResult<()> {
        let container = container_beside(temp);
        self.client
            .download(&self.vault, Self::archive_id(remote), &container)?;

        if temp.exists() {
            fs::remove_dir_all(temp)?;
        }
        let unpacked = self.packager.unpack(&container, temp);
        if let Err(e) = fs::remove_file(&container) {
            warn!(path = %container.display(), error = %e, "container cleanup failed");
        }
        unpacked.map_err(crate::GlacierError::from)?;

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(temp, dst)?;
        info!(bucket = %bucket, vault = %self.vault, "restored bucket from vault");
        Ok(())
    }
}

/// `<temp>.vault.tar.zst`, next to the temp directory.
fn container_beside(temp: &Path) -> PathBuf {
    let mut name = temp.as_os_str().to_os_string();
    name.push(".vault.");
    name.push(coldline_archive::packager::CONTAINER_EXTENSION);
    PathBuf::from(name)
}

impl ArchiveFileSystem for GlacierArchive {
    fn put(&self, local: &Path, remote: &Url) -> StoreResult<()> {
        self.warm.put(local, remote)
    }

    fn put_atomically(&self, local: &Path, remote: &Url) -> StoreResult<()> {
        self.warm.put_atomically(local, remote)
    }

    fn get(&self, remote: &Url, local: &Path) -> StoreResult<()> {
        self.warm.get(remote, local)
    }

    fn list(&self, uri: &Url) -> StoreResult<Vec<Url>> {
        self.warm.list(uri)
    }

    fn open(&self, uri: &Url) -> StoreResult<ByteStream> {
        self.warm.open(uri)
    }

    fn mkdirs(&self, uri: &Url) -> StoreResult<()> {
        self.warm.mkdirs(uri)
    }

    fn rename(&self, from: &Url, to: &Url) -> StoreResult<()> {
        self.warm.rename(from, to)
    }

    fn exists(&self, uri: &Url) -> StoreResult<bool> {
        self.warm.exists(uri)
    }

    fn delete(&self, uri: &Url) -> StoreResult<bool> {
        let warm = self.warm.delete(uri)?;
        let vault = self.client.delete(&self.vault, Self::archive_id(uri))?;
        Ok(warm || vault)
    }

    fn put_bucket(&self, bucket: &Bucket, temp: &Url, dst: &Url) -> StoreResult<()> {
        self.warm.put_bucket(bucket, temp, dst)?;
        let dir = bucket.local_path().ok_or_else(|| StoreError::WrongSide {
            bucket: bucket.to_string(),
            expected: "on local disk",
        })?;
        self.ship_to_vault(bucket, dir, dst)
    }

    fn get_bucket(&self, bucket: &Bucket, temp: &Path, dst: &Path) -> StoreResult<()> {
        match self.warm.get_bucket(bucket, temp, dst) {
            Err(StoreError::NotFound(missing)) => {
                let remote = bucket.uri().ok_or_else(|| StoreError::NotFound(missing))?;
                warn!(bucket = %bucket, "warm copy missing, restoring from vault");
                self.restore_from_vault(bucket, remote, temp, dst)
            }
            other => other,
        }
    }

    fn clean_file_transaction(&self, src: &Url, temp: &Url) -> StoreResult<()> {
        self.warm.clean_file_transaction(src, temp)
    }

    fn clean_bucket_transaction(&self, bucket: &Bucket, temp: &Url) -> StoreResult<()> {
        self.warm.clean_bucket_transaction(bucket, temp)
    }
}

impl std::fmt::Debug for GlacierArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlacierArchive")
            .field("vault", &self.vault)
            .field("packager", &self.packager)
            .finish()
    }
}
