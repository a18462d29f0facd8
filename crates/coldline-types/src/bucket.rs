use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TypeError;
use crate::format::BucketFormat;
use crate::range::{epoch_secs, TimeRange};

/// Where a bucket's content lives. Exactly one of the two.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketLocation {
    /// A directory on the local (hot tier) filesystem.
    Local(PathBuf),
    /// A location inside an archive store.
    Remote(Url),
}

/// Stable identity used to serialize work on one bucket.
///
/// Two [`Bucket`] values describing the same data in different formats or
/// at different locations share a key, so a thaw of one excludes a thaw of
/// the other.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub index: String,
    pub name: String,
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.name)
    }
}

/// An immutable unit of indexed data.
///
/// A retrieval never mutates a bucket; it produces a new value describing
/// the hot-tier copy (see [`Bucket::relocated`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    index: String,
    name: String,
    format: BucketFormat,
    location: BucketLocation,
    range: TimeRange,
}

impl Bucket {
    /// Create a bucket with an explicit time range.
    pub fn new(
        index: impl Into<String>,
        name: impl Into<String>,
        format: BucketFormat,
        location: BucketLocation,
        range: TimeRange,
    ) -> Result<Self, TypeError> {
        let index = index.into();
        let name = name.into();
        if index.is_empty() {
            return Err(TypeError::EmptyField("index"));
        }
        if name.is_empty() {
            return Err(TypeError::EmptyField("bucket name"));
        }
        if name.contains('/') {
            return Err(TypeError::InvalidBucketName {
                name,
                reason: "must not contain '/'".into(),
            });
        }
        Ok(Self {
            index,
            name,
            format,
            location,
            range,
        })
    }

    /// Create a bucket whose time range is encoded in its name
    /// (`db_<latest>_<earliest>_<id>`).
    pub fn from_name(
        index: impl Into<String>,
        name: impl Into<String>,
        format: BucketFormat,
        location: BucketLocation,
    ) -> Result<Self, TypeError> {
        let name = name.into();
        let range = parse_bucket_name(&name)?;
        Self::new(index, name, format, location, range)
    }

    /// Create a bucket for a local directory, taking the name from the
    /// directory's final component.
    pub fn local(
        index: impl Into<String>,
        dir: impl Into<PathBuf>,
        format: BucketFormat,
    ) -> Result<Self, TypeError> {
        let dir = dir.into();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TypeError::InvalidBucketName {
                name: dir.display().to_string(),
                reason: "path has no final component".into(),
            })?;
        Self::from_name(index, name, format, BucketLocation::Local(dir))
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> BucketFormat {
        self.format
    }

    pub fn location(&self) -> &BucketLocation {
        &self.location
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn key(&self) -> BucketKey {
        BucketKey {
            index: self.index.clone(),
            name: self.name.clone(),
        }
    }

    /// The local directory, if this bucket lives on the hot tier.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.location {
            BucketLocation::Local(path) => Some(path),
            BucketLocation::Remote(_) => None,
        }
    }

    /// The archive URI, if this bucket lives in an archive store.
    pub fn uri(&self) -> Option<&Url> {
        match &self.location {
            BucketLocation::Remote(uri) => Some(uri),
            BucketLocation::Local(_) => None,
        }
    }

    /// A new bucket value with the same identity at another location and
    /// possibly in another format.
    pub fn relocated(&self, format: BucketFormat, location: BucketLocation) -> Bucket {
        Bucket {
            index: self.index.clone(),
            name: self.name.clone(),
            format,
            location,
            range: self.range,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.index, self.name, self.format)
    }
}

/// Parse the time range out of a bucket directory name.
///
/// Accepted shapes: `db_<latest>_<earliest>_<id>` and the replicated
/// variant `rb_<latest>_<earliest>_<id>[_<guid>]`, with epoch seconds.
pub fn parse_bucket_name(name: &str) -> Result<TimeRange, TypeError> {
    let invalid = |reason: &str| TypeError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = name.split('_');
    match parts.next() {
        Some("db") | Some("rb") => {}
        _ => return Err(invalid("expected a 'db_' or 'rb_' prefix")),
    }
    let latest = parts
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| invalid("latest time is not an integer"))?;
    let earliest = parts
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| invalid("earliest time is not an integer"))?;
    match parts.next() {
        Some(id) if !id.is_empty() => {}
        _ => return Err(invalid("missing bucket id")),
    }

    TimeRange::new(epoch_secs(earliest)?, epoch_secs(latest)?)
}
