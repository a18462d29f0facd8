use std::fs;
use std::path::Path;
use std::sync::Arc;

use coldline_types::Bucket;
use tracing::{debug, info};
use url::Url;

use crate::archive::ArchiveFileSystem;
use crate::error::{StoreError, StoreResult};
use crate::traits::{AddressableStore, ByteStream};
use crate::uri;

/// Archive filesystem with a staging protocol on top of an
/// [`AddressableStore`].
///
/// `put_atomically` assembles data under `staging_root` and publishes it
/// with a single rename, so an observer of the destination sees nothing or
/// the complete data. A crash between copy and rename leaves only the
/// staging area dirty; the next attempt for the same destination wipes it
/// before copying.
pub struct TransactionalArchive {
    store: Arc<dyn AddressableStore>,
    staging_root: Url,
    reclaim_staging: bool,
}

impl TransactionalArchive {
    pub fn new(store: Arc<dyn AddressableStore>, staging_root: Url) -> Self {
        Self {
            store,
            staging_root,
            reclaim_staging: false,
        }
    }

    /// Make the clean hooks delete the temp location. Off by default: the
    /// hooks are no-ops and staging leftovers are reclaimed by the next
    /// attempt for the same destination.
    pub fn with_staging_reclaim(mut self, reclaim: bool) -> Self {
        self.reclaim_staging = reclaim;
        self
    }

    pub fn store(&self) -> &Arc<dyn AddressableStore> {
        &self.store
    }

    pub fn staging_root(&self) -> &Url {
        &self.staging_root
    }

    /// Staging location used by [`ArchiveFileSystem::put_atomically`] for `remote`.
    pub fn staging_uri_for(&self, remote: &Url) -> Url {
        uri::staging_uri(&self.staging_root, remote)
    }

    fn ensure_absent(&self, remote: &Url) -> StoreResult<()> {
        if self.store.exists(remote)? {
            return Err(StoreError::exists_uri(remote));
        }
        Ok(())
    }

    fn mkdirs_parent(&self, remote: &Url) -> StoreResult<()> {
        if let Some(parent) = uri::parent(remote) {
            self.store.mkdirs(&parent)?;
        }
        Ok(())
    }

    /// Copy `local` into a freshly wiped staging location for `remote`.
    fn put_to_staging(&self, local: &Path, remote: &Url) -> StoreResult<Url> {
        let staging = self.staging_uri_for(remote);
        if self.store.delete(&staging, true)? {
            debug!(staging = %staging, "removed stale staging data");
        }
        match self.put(local, &staging) {
            Err(StoreError::AlreadyExists(_)) => Err(StoreError::Transport(format!(
                "staging location {staging} survived deletion"
            ))),
            other => other,
        }?;
        Ok(staging)
    }

    /// Mkdirs `dst`'s parent and atomically rename into place.
    fn publish(&self, staging: &Url, dst: &Url) -> StoreResult<()> {
        self.mkdirs_parent(dst)?;
        self.store.rename(staging, dst)
    }

    fn reclaim(&self, temp: &Url) -> StoreResult<()> {
        if self.reclaim_staging && self.store.delete(temp, true)? {
            debug!(temp = %temp, "reclaimed staging location");
        }
        Ok(())
    }
}

impl ArchiveFileSystem for TransactionalArchive {
    fn put(&self, local: &Path, remote: &Url) -> StoreResult<()> {
        if !local.exists() {
            return Err(StoreError::not_found_path(local));
        }
        self.ensure_absent(remote)?;
        self.store.copy_local_to_remote(local, remote)
    }

    fn put_atomically(&self, local: &Path, remote: &Url) -> StoreResult<()> {
        self.ensure_absent(remote)?;
        let staging = self.put_to_staging(local, remote)?;
        self.publish(&staging, remote)?;
        info!(uri = %remote, "published atomically");
        Ok(())
    }

    fn get(&self, remote: &Url, local: &Path) -> StoreResult<()> {
        if local.exists() {
            return Err(StoreError::exists_path(local));
        }
        self.store.copy_remote_to_local(remote, local)
    }

    fn list(&self, uri: &Url) -> StoreResult<Vec<Url>> {
        self.store.list_children(uri)
    }

    fn open(&self, uri: &Url) -> StoreResult<ByteStream> {
        self.store.open_for_read(uri)
    }

    fn mkdirs(&self, uri: &Url) -> StoreResult<()> {
        self.store.mkdirs(uri)
    }

    fn rename(&self, from: &Url, to: &Url) -> StoreResult<()> {
        self.publish(from, to)
    }

    fn exists(&self, uri: &Url) -> StoreResult<bool> {
        self.store.exists(uri)
    }

    fn delete(&self, uri: &Url) -> StoreResult<bool> {
        self.store.delete(uri, true)
    }

    fn put_bucket(&self, bucket: &Bucket, temp: &Url, dst: &Url) -> StoreResult<()> {
        let dir = bucket.local_path().ok_or_else(|| StoreError::WrongSide {
            bucket: bucket.to_string(),
            expected: "on local disk",
        })?;
        if !dir.is_dir() {
            return Err(StoreError::not_found_path(dir));
        }
        self.ensure_absent(dst)?;

        self.store.delete(temp, true)?;
        self.store.copy_local_to_remote(dir, temp)?;
        debug!(bucket = %bucket, temp = %temp, "staged bucket");
        self.publish(temp, dst)?;
        info!(bucket = %bucket, uri = %dst, "archived bucket");
        Ok(())
    }

    fn get_bucket(&self, bucket: &Bucket, temp: &Path, dst: &Path) -> StoreResult<()> {
        let remote = bucket.uri().ok_or_else(|| StoreError::WrongSide {
            bucket: bucket.to_string(),
            expected: "in an archive",
        })?;
        if dst.exists() {
            return Err(StoreError::exists_path(dst));
        }

        if temp.exists() {
            fs::remove_dir_all(temp)?;
        }
        self.store.copy_remote_to_local(remote, temp)?;
        debug!(bucket = %bucket, temp = %temp.display(), "fetched bucket to staging");
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(temp, dst)?;
        Ok(())
    }

    fn clean_file_transaction(&self, _src: &Url, temp: &Url) -> StoreResult<()> {
        self.reclaim(temp)
    }

    fn clean_bucket_transaction(&self, _bucket: &Bucket, temp: &Url) -> StoreResult<()> {
        self.reclaim(temp)
    }
}

impl std::fmt::Debug for TransactionalArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalArchive")
            .field("staging_root", &self.staging_root.as_str())
            .field("reclaim_staging", &self.reclaim_staging)
            .finish()
    }
}
