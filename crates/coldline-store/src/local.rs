//! Local-disk backend.
//!
//! [`LocalFileStore`] maps every URI's path under a root directory and
//! ignores scheme and authority, so `hdfs://nn/archive/x` and
//! `file:///archive/x` land on the same file. With a root of `/` it is the
//! identity mapping for `file://` URIs; with a scratch root it emulates a
//! remote hierarchy on local disk.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::{AddressableStore, ByteStream};
use crate::uri;

#[derive(Clone, Debug)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Identity mapping for `file://` URIs.
    pub fn filesystem() -> Self {
        Self::new("/")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path backing `uri`.
    pub fn resolve(&self, uri: &Url) -> StoreResult<PathBuf> {
        Ok(self.root.join(uri::relative_path(uri)?))
    }
}

impl AddressableStore for LocalFileStore {
    fn copy_local_to_remote(&self, local: &Path, remote: &Url) -> StoreResult<()> {
        if !local.exists() {
            return Err(StoreError::not_found_path(local));
        }
        let target = self.resolve(remote)?;
        copy_tree(local, &target)?;
        debug!(from = %local.display(), to = %remote, "copied local to store");
        Ok(())
    }

    fn copy_remote_to_local(&self, remote: &Url, local: &Path) -> StoreResult<()> {
        let source = self.resolve(remote)?;
        if !source.exists() {
            return Err(StoreError::not_found_uri(remote));
        }
        copy_tree(&source, local)?;
        debug!(from = %remote, to = %local.display(), "copied store to local");
        Ok(())
    }

    fn list_children(&self, uri: &Url) -> StoreResult<Vec<Url>> {
        let path = self.resolve(uri)?;
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if meta.is_file() {
            return Ok(vec![uri.clone()]);
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names.iter().map(|name| uri::child(uri, name)).collect()
    }

    fn open_for_read(&self, uri: &Url) -> StoreResult<ByteStream> {
        let path = self.resolve(uri)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::not_found_uri(uri)),
            Err(e) => Err(e.into()),
        }
    }

    fn mkdirs(&self, uri: &Url) -> StoreResult<()> {
        fs::create_dir_all(self.resolve(uri)?)?;
        Ok(())
    }

    fn delete(&self, uri: &Url, recursive: bool) -> StoreResult<bool> {
        let path = self.resolve(uri)?;
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !meta.is_dir() {
            fs::remove_file(&path)?;
        } else if recursive {
            fs::remove_dir_all(&path)?;
        } else if fs::read_dir(&path)?.next().is_some() {
            return Err(StoreError::DirectoryNotEmpty(uri.to_string()));
        } else {
            fs::remove_dir(&path)?;
        }
        debug!(uri = %uri, recursive, "deleted");
        Ok(true)
    }

    fn rename(&self, from: &Url, to: &Url) -> StoreResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if !source.exists() {
            return Err(StoreError::not_found_uri(from));
        }
        if target.exists() {
            return Err(StoreError::exists_uri(to));
        }
        match target.parent() {
            Some(parent) if !parent.exists() => {
                return Err(StoreError::NotFound(parent.display().to_string()));
            }
            _ => {}
        }
        fs::rename(&source, &target)?;
        debug!(from = %from, to = %to, "renamed");
        Ok(())
    }

    fn exists(&self, uri: &Url) -> StoreResult<bool> {
        Ok(self.resolve(uri)?.exists())
    }
}

/// Copy a file or a directory tree from `src` to `dst`, creating `dst`'s
/// parents.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    if src.is_file() {
        fs::copy(src, dst)?;
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let out = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&out)?;
        } else {
            fs::copy(entry.path(), &out)?;
        }
    }
    Ok(())
}
