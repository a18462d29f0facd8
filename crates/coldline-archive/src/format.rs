//! Per-format export into, and import out of, the archive layout.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use coldline_store::StoreError;
use coldline_types::{Bucket, BucketFormat};
use tracing::debug;

use crate::error::{ArchiveError, ArchiveResult};
use crate::packager::{BucketPackager, PackedBucket};

/// Local directory holding a bucket's content in one archive format.
#[derive(Debug)]
pub enum ExportSource {
    /// The bucket directory itself.
    InPlace(PathBuf),
    /// A container packed for this export alone.
    Packed(PackedBucket),
}

impl ExportSource {
    pub fn dir(&self) -> &Path {
        match self {
            Self::InPlace(dir) => dir,
            Self::Packed(packed) => packed.dir(),
        }
    }

    /// Remove the directory if it was produced for this export.
    pub fn cleanup(self) -> io::Result<()> {
        match self {
            Self::InPlace(_) => Ok(()),
            Self::Packed(packed) => packed.close(),
        }
    }
}

/// Prepare `bucket` for archiving in `format`.
///
/// A bucket already in `format` is exported as is. A native bucket can be
/// packed into a container. Every other combination is unexportable.
pub fn export(
    bucket: &Bucket,
    format: BucketFormat,
    packager: &BucketPackager,
) -> ArchiveResult<ExportSource> {
    let unexportable = || ArchiveError::Unexportable {
        bucket: bucket.to_string(),
        format,
    };
    let dir = bucket.local_path().ok_or_else(unexportable)?;

    match (bucket.format(), format) {
        (from, to) if from == to && to != BucketFormat::Unknown => {
            Ok(ExportSource::InPlace(dir.to_path_buf()))
        }
        (BucketFormat::NativeBucket, BucketFormat::PackedContainer) => Ok(ExportSource::Packed(
            packager.pack_into_scratch(dir, bucket.name())?,
        )),
        _ => Err(unexportable()),
    }
}

/// Turn a fetched archive directory into a native bucket at `dest`.
///
/// `fetched` is consumed. `dest` appears complete or not at all: packed
/// content is unpacked next to it and renamed into place.
pub fn import(
    bucket: &Bucket,
    fetched: &Path,
    dest: &Path,
    packager: &BucketPackager,
) -> ArchiveResult<()> {
    if dest.exists() {
        return Err(StoreError::exists_path(dest).into());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    match bucket.format() {
        BucketFormat::NativeBucket => {
            ensure_populated(bucket, fetched)?;
            fs::rename(fetched, dest)?;
        }
        BucketFormat::PackedContainer => {
            let container = BucketPackager::find_container(fetched)?;
            let unpacking = sibling(dest, "importing");
            if unpacking.exists() {
                fs::remove_dir_all(&unpacking)?;
            }
            packager.unpack(&container, &unpacking)?;
            ensure_populated(bucket, &unpacking)?;
            fs::rename(&unpacking, dest)?;
            fs::remove_dir_all(fetched)?;
        }
        BucketFormat::Unknown => {
            return Err(ArchiveError::Import {
                bucket: bucket.to_string(),
                reason: "unknown format".into(),
            });
        }
    }
    debug!(bucket = %bucket, dest = %dest.display(), "imported bucket");
    Ok(())
}

fn ensure_populated(bucket: &Bucket, dir: &Path) -> ArchiveResult<()> {
    if !dir.is_dir() || fs::read_dir(dir)?.next().is_none() {
        return Err(ArchiveError::Import {
            bucket: bucket.to_string(),
            reason: format!("{} has no content", dir.display()),
        });
    }
    Ok(())
}

/// `<parent>/.<name>.<tag>`
fn sibling(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{tag}"))
}
