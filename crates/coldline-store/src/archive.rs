use std::path::Path;

use coldline_types::Bucket;
use url::Url;

use crate::error::StoreResult;
use crate::traits::ByteStream;

/// Transactional filesystem contract consumed by archiving and thawing.
///
/// Writes never expose partial data at their destination and never
/// overwrite: an occupied destination fails with
/// [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists).
/// Transport errors propagate unchanged; retry policy belongs to the caller.
///
/// Implemented by [`TransactionalArchive`](crate::TransactionalArchive) and by
/// tiering decorators that wrap one, which makes them interchangeable.
pub trait ArchiveFileSystem: Send + Sync {
    /// Copy `local` to `remote`.
    fn put(&self, local: &Path, remote: &Url) -> StoreResult<()>;

    /// Copy `local` to `remote` through a staging location and a final
    /// atomic rename.
    fn put_atomically(&self, local: &Path, remote: &Url) -> StoreResult<()>;

    /// Copy `remote` to `local`. Never overwrites local state.
    fn get(&self, remote: &Url, local: &Path) -> StoreResult<()>;

    /// Immediate children of `uri`; empty when there are none.
    fn list(&self, uri: &Url) -> StoreResult<Vec<Url>>;

    /// Stream the contents of `uri`. The caller drops the stream to release it.
    fn open(&self, uri: &Url) -> StoreResult<ByteStream>;

    fn mkdirs(&self, uri: &Url) -> StoreResult<()>;

    /// Move `from` to `to`, creating `to`'s parent first.
    fn rename(&self, from: &Url, to: &Url) -> StoreResult<()>;

    fn exists(&self, uri: &Url) -> StoreResult<bool>;

    /// Recursively delete `uri`. Returns `true` if anything was removed.
    fn delete(&self, uri: &Url) -> StoreResult<bool>;

    /// Stage the local bucket directory at `temp`, then rename it to `dst`.
    fn put_bucket(&self, bucket: &Bucket, temp: &Url, dst: &Url) -> StoreResult<()>;

    /// Copy the archived bucket to the local `temp` directory, then rename
    /// it to `dst`.
    fn get_bucket(&self, bucket: &Bucket, temp: &Path, dst: &Path) -> StoreResult<()>;

    /// Post-transaction hook for file transfers. Advisory: callers log a
    /// failure here and keep the primary outcome.
    fn clean_file_transaction(&self, _src: &Url, _temp: &Url) -> StoreResult<()> {
        Ok(())
    }

    /// Post-transaction hook for bucket transfers. Advisory, like
    /// [`ArchiveFileSystem::clean_file_transaction`].
    fn clean_bucket_transaction(&self, _bucket: &Bucket, _temp: &Url) -> StoreResult<()> {
        Ok(())
    }
}
