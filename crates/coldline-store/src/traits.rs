use std::io::Read;
use std::path::Path;

use url::Url;

use crate::error::StoreResult;

/// A readable byte stream handed out by [`AddressableStore::open_for_read`].
/// The caller owns it and releases the underlying handle by dropping it.
pub type ByteStream = Box<dyn Read + Send>;

/// Minimal capability set of one backing technology (distributed
/// filesystem, object store, local disk).
///
/// All implementations must satisfy these invariants:
/// - The store owns no bucket state; it only moves bytes.
/// - `rename` is atomic at the backing store: an observer sees either the
///   source or the destination, never a partially moved tree.
/// - Errors are returned immediately. Implementations never retry.
/// - A missing source is reported as [`StoreError::NotFound`], an occupied
///   destination as [`StoreError::AlreadyExists`].
///
/// [`StoreError::NotFound`]: crate::StoreError::NotFound
/// [`StoreError::AlreadyExists`]: crate::StoreError::AlreadyExists
pub trait AddressableStore: Send + Sync {
    /// Copy a local file or directory tree to `remote`, creating missing
    /// parent directories.
    fn copy_local_to_remote(&self, local: &Path, remote: &Url) -> StoreResult<()>;

    /// Copy a remote file or directory tree to `local`, creating missing
    /// parent directories.
    fn copy_remote_to_local(&self, remote: &Url, local: &Path) -> StoreResult<()>;

    /// Immediate children of `uri`, sorted.
    ///
    /// Returns an empty list when `uri` is absent or an empty directory, and
    /// `[uri]` when it names a file.
    fn list_children(&self, uri: &Url) -> StoreResult<Vec<Url>>;

    /// Open a remote file for streaming reads.
    fn open_for_read(&self, uri: &Url) -> StoreResult<ByteStream>;

    /// Create `uri` and all missing ancestors. Succeeds if it already exists.
    fn mkdirs(&self, uri: &Url) -> StoreResult<()>;

    /// Delete `uri`. Returns `true` if something was removed.
    ///
    /// A non-recursive delete of a non-empty directory fails.
    fn delete(&self, uri: &Url, recursive: bool) -> StoreResult<bool>;

    /// Atomically move `from` to `to`. The parent of `to` must exist.
    fn rename(&self, from: &Url, to: &Url) -> StoreResult<()>;

    /// Check whether anything exists at `uri`.
    fn exists(&self, uri: &Url) -> StoreResult<bool>;
}
