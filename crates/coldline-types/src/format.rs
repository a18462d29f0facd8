use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Archive layout of a bucket.
///
/// The same tag selects how a bucket is exported into the archive and how
/// it is imported back into the hot tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketFormat {
    /// The bucket directory exactly as the indexer wrote it.
    NativeBucket,
    /// A single compressed container holding the whole bucket directory.
    PackedContainer,
    /// Anything the archive holds that coldline cannot interpret.
    Unknown,
}

impl BucketFormat {
    /// All formats, in declaration order.
    pub const ALL: [BucketFormat; 3] = [
        BucketFormat::NativeBucket,
        BucketFormat::PackedContainer,
        BucketFormat::Unknown,
    ];

    /// Directory name used for this format inside an archived bucket.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::NativeBucket => "native",
            Self::PackedContainer => "packed",
            Self::Unknown => "unknown",
        }
    }

    /// Inverse of [`BucketFormat::dir_name`]. Unrecognized names map to
    /// [`BucketFormat::Unknown`].
    pub fn from_dir_name(name: &str) -> Self {
        match name {
            "native" => Self::NativeBucket,
            "packed" => Self::PackedContainer,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeBucket => "native_bucket",
            Self::PackedContainer => "packed_container",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BucketFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketFormat {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native_bucket" | "native" => Ok(Self::NativeBucket),
            "packed_container" | "packed" => Ok(Self::PackedContainer),
            "unknown" => Ok(Self::Unknown),
            _ => Err(TypeError::UnknownFormat(s.to_string())),
        }
    }
}

/// Ordered preference list for format negotiation.
///
/// When a bucket is archived in several formats, the first format in this
/// list that the bucket actually has wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatPriority(Vec<BucketFormat>);

impl FormatPriority {
    pub fn new(formats: Vec<BucketFormat>) -> Self {
        let mut seen = Vec::with_capacity(formats.len());
        for format in formats {
            if !seen.contains(&format) {
                seen.push(format);
            }
        }
        Self(seen)
    }

    pub fn formats(&self) -> &[BucketFormat] {
        &self.0
    }

    /// Pick the preferred format among `available`.
    ///
    /// Falls back to the first available format (in declaration order) when
    /// none of the prioritized formats is present. Returns `None` only when
    /// `available` is empty.
    pub fn choose(&self, available: &[BucketFormat]) -> Option<BucketFormat> {
        self.0
            .iter()
            .copied()
            .find(|f| available.contains(f))
            .or_else(|| available.iter().copied().min())
    }
}

impl Default for FormatPriority {
    fn default() -> Self {
        Self(vec![BucketFormat::NativeBucket, BucketFormat::PackedContainer])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_names_round_trip() {
        for format in BucketFormat::ALL {
            assert_eq!(BucketFormat::from_dir_name(format.dir_name()), format);
        }
        assert_eq!(BucketFormat::from_dir_name("csv"), BucketFormat::Unknown);
    }

    #[test]
    fn parse_accepts_short_and_long_names() {
        assert_eq!("native".parse::<BucketFormat>().unwrap(), BucketFormat::NativeBucket);
        assert_eq!(
            "PACKED_CONTAINER".parse::<BucketFormat>().unwrap(),
            BucketFormat::PackedContainer
        );
        assert!(matches!(
            "csv".parse::<BucketFormat>(),
            Err(TypeError::UnknownFormat(_))
        ));
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&BucketFormat::PackedContainer).unwrap();
        assert_eq!(json, "\"packed_container\"");
    }

    #[test]
    fn first_listed_format_wins() {
        let priority = FormatPriority::new(vec![
            BucketFormat::PackedContainer,
            BucketFormat::NativeBucket,
        ]);
        let chosen = priority.choose(&[BucketFormat::NativeBucket, BucketFormat::PackedContainer]);
        assert_eq!(chosen, Some(BucketFormat::PackedContainer));
    }

    #[test]
    fn falls_back_to_available_format() {
        let priority = FormatPriority::new(vec![BucketFormat::NativeBucket]);
        assert_eq!(
            priority.choose(&[BucketFormat::Unknown]),
            Some(BucketFormat::Unknown)
        );
        assert_eq!(priority.choose(&[]), None);
    }

    #[test]
    fn duplicates_are_dropped() {
        let priority = FormatPriority::new(vec![
            BucketFormat::NativeBucket,
            BucketFormat::NativeBucket,
            BucketFormat::Unknown,
        ]);
        assert_eq!(
            priority.formats(),
            &[BucketFormat::NativeBucket, BucketFormat::Unknown]
        );
    }
}
