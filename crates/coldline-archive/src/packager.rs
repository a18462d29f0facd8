//! Compressed tar containers for the packed bucket format.
//!
//! A packed bucket is a single `<bucket-name>.tar.zst`: a tar stream of
//! every directory and regular file under the bucket directory, with paths
//! relative to it, compressed as one zstd frame carrying a content
//! checksum. Packing and unpacking both stream, so no bucket file is ever
//! held in memory whole.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tar::{Archive, Builder, EntryType};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ArchiveError, ArchiveResult};

/// File extension of packed containers.
pub const CONTAINER_EXTENSION: &str = "tar.zst";

const DEFAULT_LEVEL: i32 = 3;

#[derive(Clone, Debug)]
pub struct BucketPackager {
    scratch_dir: PathBuf,
    level: i32,
}

/// A container in a scratch directory of its own.
///
/// The directory is removed by [`close`](Self::close) or on drop. Every
/// pack gets a fresh directory, so concurrent packs of buckets that share
/// a name never touch each other's output.
#[derive(Debug)]
pub struct PackedBucket {
    dir: TempDir,
    container: PathBuf,
}

impl PackedBucket {
    /// Directory holding nothing but the container.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn container(&self) -> &Path {
        &self.container
    }

    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

impl BucketPackager {
    /// A packager writing containers under `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            level: DEFAULT_LEVEL,
        }
    }

    /// Set the zstd compression level.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Container file name for a bucket.
    pub fn container_name(bucket_name: &str) -> String {
        format!("{bucket_name}.{CONTAINER_EXTENSION}")
    }

    /// Pack `bucket_dir` into a fresh directory under the scratch root.
    pub fn pack_into_scratch(
        &self,
        bucket_dir: &Path,
        bucket_name: &str,
    ) -> ArchiveResult<PackedBucket> {
        fs::create_dir_all(&self.scratch_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{bucket_name}."))
            .tempdir_in(&self.scratch_dir)?;
        let container = dir.path().join(Self::container_name(bucket_name));
        self.pack(bucket_dir, &container)?;
        Ok(PackedBucket { dir, container })
    }

    /// Write a container of `bucket_dir` to `out`.
    pub fn pack(&self, bucket_dir: &Path, out: &Path) -> ArchiveResult<()> {
        if !bucket_dir.is_dir() {
            return Err(packaging(bucket_dir, "not a directory"));
        }

        let mut encoder = zstd::Encoder::new(BufWriter::new(File::create(out)?), self.level)?;
        encoder.include_checksum(true)?;
        let mut tar = Builder::new(encoder);
        tar.follow_symlinks(false);

        let mut entries = 0usize;
        for entry in WalkDir::new(bucket_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| packaging(bucket_dir, e))?;
            let relative = entry
                .path()
                .strip_prefix(bucket_dir)
                .map_err(|e| packaging(entry.path(), e))?;
            if entry.file_type().is_dir() {
                tar.append_dir(relative, entry.path())?;
            } else if entry.file_type().is_file() {
                tar.append_path_with_name(entry.path(), relative)?;
            } else {
                debug!(path = %entry.path().display(), "skipping special file");
                continue;
            }
            entries += 1;
        }

        let mut file = tar.into_inner()?.finish()?;
        file.flush()?;
        debug!(
            bucket_dir = %bucket_dir.display(),
            out = %out.display(),
            entries,
            "packed bucket"
        );
        Ok(())
    }

    /// Unpack the container at `container` into `dest`, creating it.
    ///
    /// Only directories and regular files are accepted, and no entry may
    /// leave `dest`.
    pub fn unpack(&self, container: &Path, dest: &Path) -> ArchiveResult<()> {
        let corrupt = |e: io::Error| packaging(container, e);
        let decoder = zstd::Decoder::new(File::open(container)?).map_err(corrupt)?;
        let mut archive = Archive::new(decoder);

        fs::create_dir_all(dest)?;
        let mut entries = 0usize;
        for entry in archive.entries().map_err(corrupt)? {
            let mut entry = entry.map_err(corrupt)?;
            let name = entry.path().map_err(corrupt)?.into_owned();
            let relative = checked_relative(&name).ok_or_else(|| {
                packaging(
                    container,
                    format!("entry path {} escapes the bucket", name.display()),
                )
            })?;
            let target = dest.join(relative);

            match entry.header().entry_type() {
                EntryType::Directory => fs::create_dir_all(&target)?,
                EntryType::Regular => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    entry.unpack(&target).map_err(corrupt)?;
                }
                other => {
                    return Err(packaging(
                        container,
                        format!("unsupported entry {} ({other:?})", name.display()),
                    ));
                }
            }
            entries += 1;
        }
        // The frame checksum is only checked once the decoder hits the end.
        io::copy(&mut archive.into_inner(), &mut io::sink()).map_err(corrupt)?;

        debug!(
            container = %container.display(),
            dest = %dest.display(),
            entries,
            "unpacked bucket"
        );
        Ok(())
    }

    /// Locate the single container inside a packed bucket directory.
    pub fn find_container(packed_dir: &Path) -> ArchiveResult<PathBuf> {
        let suffix = format!(".{CONTAINER_EXTENSION}");
        let mut found = Vec::new();
        for entry in fs::read_dir(packed_dir)? {
            let path = entry?.path();
            let is_container = path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(&suffix))
                .unwrap_or(false);
            if is_container && path.is_file() {
                found.push(path);
            }
        }
        match found.len() {
            1 => Ok(found.remove(0)),
            n => Err(packaging(
                packed_dir,
                format!("expected one container, found {n}"),
            )),
        }
    }
}

fn packaging(path: &Path, reason: impl ToString) -> ArchiveError {
    ArchiveError::Packaging {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// `name` if it stays below the destination, `None` otherwise.
fn checked_relative(name: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => out.push(part),
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn bucket_dir(root: &Path) -> PathBuf {
        let dir = root.join("db_200_100_1");
        fs::create_dir_all(dir.join("rawdata")).unwrap();
        fs::create_dir_all(dir.join("empty")).unwrap();
        fs::write(dir.join("rawdata/journal.gz"), vec![7u8; 64 * 1024]).unwrap();
        fs::write(dir.join("1.tsidx"), b"tsidx").unwrap();
        fs::write(dir.join("bloomfilter"), b"").unwrap();
        dir
    }

    #[test]
    fn pack_and_unpack_recreate_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let src = bucket_dir(tmp.path());
        let packager = BucketPackager::new(tmp.path().join("scratch"));

        let packed = packager.pack_into_scratch(&src, "db_200_100_1").unwrap();
        let container = BucketPackager::find_container(packed.dir()).unwrap();
        assert_eq!(container, packed.container());
        assert!(container.ends_with("db_200_100_1.tar.zst"));

        let dest = tmp.path().join("restored");
        packager.unpack(&container, &dest).unwrap();
        assert_eq!(
            fs::read(dest.join("rawdata/journal.gz")).unwrap(),
            vec![7u8; 64 * 1024]
        );
        assert_eq!(fs::read(dest.join("1.tsidx")).unwrap(), b"tsidx");
        assert!(fs::read(dest.join("bloomfilter")).unwrap().is_empty());
        assert!(dest.join("empty").is_dir());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 4);
    }

    #[test]
    fn every_pack_gets_its_own_scratch_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let src = bucket_dir(tmp.path());
        let packager = BucketPackager::new(tmp.path().join("scratch")).with_level(1);

        let first = packager.pack_into_scratch(&src, "db_200_100_1").unwrap();
        let second = packager.pack_into_scratch(&src, "db_200_100_1").unwrap();
        assert_ne!(first.dir(), second.dir());

        let first_dir = first.dir().to_path_buf();
        first.close().unwrap();
        assert!(!first_dir.exists());
        assert!(second.container().is_file());

        let second_dir = second.dir().to_path_buf();
        drop(second);
        assert!(!second_dir.exists());
    }

    #[test]
    fn concurrent_packs_of_one_name_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let main = bucket_dir(&tmp.path().join("main"));
        let web = tmp.path().join("web/db_200_100_1");
        fs::create_dir_all(&web).unwrap();
        fs::write(web.join("Hosts.data"), b"web hosts").unwrap();
        let packager = Arc::new(BucketPackager::new(tmp.path().join("scratch")));

        let handles: Vec<_> = [main, web]
            .into_iter()
            .map(|src| {
                let packager = Arc::clone(&packager);
                thread::spawn(move || {
                    let packed = packager.pack_into_scratch(&src, "db_200_100_1").unwrap();
                    let out = src.with_extension("restored");
                    packager.unpack(packed.container(), &out).unwrap();
                    fs::read_dir(out).unwrap().count()
                })
            })
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(counts, vec![4, 1]);
    }

    #[test]
    fn pack_rejects_files() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f");
        fs::write(&file, b"x").unwrap();
        let packager = BucketPackager::new(tmp.path());
        assert!(matches!(
            packager.pack(&file, &tmp.path().join("out")),
            Err(ArchiveError::Packaging { .. })
        ));
    }

    #[test]
    fn corruption_is_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let src = bucket_dir(tmp.path());
        let packager = BucketPackager::new(tmp.path());
        let container = tmp.path().join("c.tar.zst");
        packager.pack(&src, &container).unwrap();
        let good = fs::read(&container).unwrap();

        let mut flipped = good.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0xFF;
        fs::write(&container, &flipped).unwrap();
        let err = packager.unpack(&container, &tmp.path().join("a")).unwrap_err();
        assert!(matches!(err, ArchiveError::Packaging { .. }), "{err}");

        fs::write(&container, &good[..good.len() / 2]).unwrap();
        let err = packager.unpack(&container, &tmp.path().join("b")).unwrap_err();
        assert!(matches!(err, ArchiveError::Packaging { .. }), "{err}");

        fs::write(&container, b"PK\x03\x04 zip").unwrap();
        assert!(packager.unpack(&container, &tmp.path().join("c")).is_err());
    }

    /// Tar with one regular file whose raw header name is `name`.
    fn raw_tar(name: &[u8]) -> Vec<u8> {
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_entry_type(EntryType::Regular);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_cksum();
        let mut builder = Builder::new(Vec::new());
        builder.append(&header, &b"evil"[..]).unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn entries_cannot_escape_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let packager = BucketPackager::new(tmp.path());
        let dest = tmp.path().join("out/bucket");

        for name in [&b"../escaped"[..], b"/abs/escaped"] {
            let container = tmp.path().join("evil.tar.zst");
            fs::write(&container, zstd::encode_all(&raw_tar(name)[..], 1).unwrap()).unwrap();
            let err = packager.unpack(&container, &dest).unwrap_err();
            assert!(err.to_string().contains("escapes"), "{err}");
        }
        assert!(!tmp.path().join("out/escaped").exists());

        assert_eq!(
            checked_relative(Path::new("rawdata/journal.gz")),
            Some(PathBuf::from("rawdata/journal.gz"))
        );
        assert!(checked_relative(Path::new("")).is_none());
    }

    #[test]
    fn find_container_requires_exactly_one() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(BucketPackager::find_container(tmp.path()).is_err());
        fs::write(tmp.path().join("a.tar.zst"), b"").unwrap();
        fs::write(tmp.path().join("b.tar.zst"), b"").unwrap();
        assert!(BucketPackager::find_container(tmp.path()).is_err());
    }
}
