//! Declared deviations of a storage implementation from the protocol.
//!
//! A [`QuirkMatrix`] is built once per run from configuration and shared
//! read-only. Quirks are purely additive: each one independently switches a
//! set of assertions to its alternate expectation.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConformError, Result};

/// A named, documented deviation from the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quirk {
    /// Checksum based integrity checks are not supported
    ChecksumsNotSupported,
    /// User Content-Type is dropped when the key ends with `/`
    ContentTypeNotSetForKeysWithTrailingSlash,
    /// CopyObject returns an empty ETag
    EtagEmptyAfterCopyObject,
    /// GetObject with `partNumber` is not supported
    GetObjectPartNotSupported,
    /// `x-amz-mp-parts-count` is never returned
    GetObjectPartcountNotSupported,
    /// Keys are listed in UTF-16 code unit order
    KeysAreSortedInUtf16BinaryOrder,
    /// Keys containing U+0001 are rejected
    KeysWithCodepointMinRejected,
    /// Keys containing code points above U+FFFF are rejected
    KeysWithCodepointsOutsideBmpRejected,
    /// Keys are not strictly validated as UTF-8
    KeysWithInvalidUtf8NotRejected,
    /// Keys containing a null byte are accepted
    KeysWithNullNotRejected,
    /// Keys containing a null byte are truncated at the null
    KeysWithNullAreTruncated,
    /// Keys with slashes create implicit parent directory objects
    KeysWithSlashesCreateImplicitObjects,
    /// Part count and part sizes are not preserved after completing an upload
    MultipartSizesNotKept,
    /// Conditional put with `If-Match: <etag>` is not supported
    PutObjectIfMatchEtagNotSupported,
    /// Conditional put with `If-None-Match: <etag>` is not supported
    PutObjectIfNoneMatchEtagNotSupported,
    /// Conditional put with `If-None-Match: *` is not supported
    PutObjectIfNoneMatchStarNotSupported,
    /// The storage class specified by the client is not retained
    StorageClassNotKept,
}

impl Quirk {
    /// Every known quirk, in name order.
    pub const ALL: [Quirk; 17] = [
        Quirk::ChecksumsNotSupported,
        Quirk::ContentTypeNotSetForKeysWithTrailingSlash,
        Quirk::EtagEmptyAfterCopyObject,
        Quirk::GetObjectPartNotSupported,
        Quirk::GetObjectPartcountNotSupported,
        Quirk::KeysAreSortedInUtf16BinaryOrder,
        Quirk::KeysWithCodepointMinRejected,
        Quirk::KeysWithCodepointsOutsideBmpRejected,
        Quirk::KeysWithInvalidUtf8NotRejected,
        Quirk::KeysWithNullNotRejected,
        Quirk::KeysWithNullAreTruncated,
        Quirk::KeysWithSlashesCreateImplicitObjects,
        Quirk::MultipartSizesNotKept,
        Quirk::PutObjectIfMatchEtagNotSupported,
        Quirk::PutObjectIfNoneMatchEtagNotSupported,
        Quirk::PutObjectIfNoneMatchStarNotSupported,
        Quirk::StorageClassNotKept,
    ];

    /// The configuration name of the quirk.
    pub fn name(&self) -> &'static str {
        match self {
            Quirk::ChecksumsNotSupported => "CHECKSUMS_NOT_SUPPORTED",
            Quirk::ContentTypeNotSetForKeysWithTrailingSlash => {
                "CONTENT_TYPE_NOT_SET_FOR_KEYS_WITH_TRAILING_SLASH"
            }
            Quirk::EtagEmptyAfterCopyObject => "ETAG_EMPTY_AFTER_COPY_OBJECT",
            Quirk::GetObjectPartNotSupported => "GET_OBJECT_PART_NOT_SUPPORTED",
            Quirk::GetObjectPartcountNotSupported => "GET_OBJECT_PARTCOUNT_NOT_SUPPORTED",
            Quirk::KeysAreSortedInUtf16BinaryOrder => "KEYS_ARE_SORTED_IN_UTF16_BINARY_ORDER",
            Quirk::KeysWithCodepointMinRejected => "KEYS_WITH_CODEPOINT_MIN_REJECTED",
            Quirk::KeysWithCodepointsOutsideBmpRejected => {
                "KEYS_WITH_CODEPOINTS_OUTSIDE_BMP_REJECTED"
            }
            Quirk::KeysWithInvalidUtf8NotRejected => "KEYS_WITH_INVALID_UTF8_NOT_REJECTED",
            Quirk::KeysWithNullNotRejected => "KEYS_WITH_NULL_NOT_REJECTED",
            Quirk::KeysWithNullAreTruncated => "KEYS_WITH_NULL_ARE_TRUNCATED",
            Quirk::KeysWithSlashesCreateImplicitObjects => {
                "KEYS_WITH_SLASHES_CREATE_IMPLICIT_OBJECTS"
            }
            Quirk::MultipartSizesNotKept => "MULTIPART_SIZES_NOT_KEPT",
            Quirk::PutObjectIfMatchEtagNotSupported => "PUT_OBJECT_IF_MATCH_ETAG_NOT_SUPPORTED",
            Quirk::PutObjectIfNoneMatchEtagNotSupported => {
                "PUT_OBJECT_IF_NONE_MATCH_ETAG_NOT_SUPPORTED"
            }
            Quirk::PutObjectIfNoneMatchStarNotSupported => {
                "PUT_OBJECT_IF_NONE_MATCH_STAR_NOT_SUPPORTED"
            }
            Quirk::StorageClassNotKept => "STORAGE_CLASS_NOT_KEPT",
        }
    }

    /// One-line description for reports and `--help` output.
    pub fn description(&self) -> &'static str {
        match self {
            Quirk::ChecksumsNotSupported => {
                "the server does not support checksum based data integrity checks"
            }
            Quirk::ContentTypeNotSetForKeysWithTrailingSlash => {
                "the server drops user specified Content-Type values when the key ends with '/'"
            }
            Quirk::EtagEmptyAfterCopyObject => "after copying an object, an empty ETag is returned",
            Quirk::GetObjectPartNotSupported => {
                "the server does not support downloading individual parts"
            }
            Quirk::GetObjectPartcountNotSupported => {
                "the server does not return x-amz-mp-parts-count"
            }
            Quirk::KeysAreSortedInUtf16BinaryOrder => {
                "the server returns keys in UTF-16 binary order instead of UTF-8"
            }
            Quirk::KeysWithCodepointMinRejected => "the server rejects keys containing U+0001",
            Quirk::KeysWithCodepointsOutsideBmpRejected => {
                "the server rejects keys containing code points greater than U+FFFF"
            }
            Quirk::KeysWithInvalidUtf8NotRejected => {
                "the server does not perform strict UTF-8 validation of keys"
            }
            Quirk::KeysWithNullNotRejected => {
                "the server does not reject keys containing null bytes"
            }
            Quirk::KeysWithNullAreTruncated => {
                "the server truncates keys at the first null byte"
            }
            Quirk::KeysWithSlashesCreateImplicitObjects => {
                "keys with slashes create implicit directory objects"
            }
            Quirk::MultipartSizesNotKept => {
                "the size and number of uploaded parts are not preserved"
            }
            Quirk::PutObjectIfMatchEtagNotSupported => {
                "the server does not support If-Match: <etag> on PutObject"
            }
            Quirk::PutObjectIfNoneMatchEtagNotSupported => {
                "the server does not support If-None-Match: <etag> on PutObject"
            }
            Quirk::PutObjectIfNoneMatchStarNotSupported => {
                "the server does not support If-None-Match: * on PutObject"
            }
            Quirk::StorageClassNotKept => {
                "the server does not retain the storage class specified by the client"
            }
        }
    }
}

impl fmt::Display for Quirk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses a quirk name, ignoring ASCII case and surrounding whitespace.
impl FromStr for Quirk {
    type Err = ConformError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Quirk::ALL
            .iter()
            .copied()
            .find(|q| q.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConformError::UnknownQuirk {
                name: name.to_string(),
            })
    }
}

/// An immutable set of quirks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuirkSet(BTreeSet<Quirk>);

impl QuirkSet {
    /// The empty set: a fully compliant server.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The deviations of AWS S3 itself.
    pub fn aws() -> Self {
        [Quirk::PutObjectIfNoneMatchEtagNotSupported].into_iter().collect()
    }

    /// A named preset. Only `aws` is known.
    pub fn preset(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::aws()),
            _ => Err(ConformError::UnknownPreset {
                name: name.to_string(),
            }),
        }
    }

    /// Parses a list of quirk names; the first unknown name is an error.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<Quirk>())
            .collect()
    }

    /// Membership test.
    pub fn contains(&self, quirk: Quirk) -> bool {
        self.0.contains(&quirk)
    }

    /// A copy of this set with `quirk` added.
    pub fn with(&self, quirk: Quirk) -> Self {
        let mut set = self.0.clone();
        set.insert(quirk);
        Self(set)
    }

    /// The union of two sets.
    pub fn union(&self, other: &QuirkSet) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Quirks in name order.
    pub fn iter(&self) -> impl Iterator<Item = Quirk> + '_ {
        self.0.iter().copied()
    }

    /// Number of quirks.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no quirk is declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Quirk> for QuirkSet {
    fn from_iter<T: IntoIterator<Item = Quirk>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The quirks declared for the storage service under test.
#[derive(Debug, Clone, Default)]
pub struct QuirkMatrix {
    quirks: QuirkSet,
}

impl QuirkMatrix {
    /// Creates a matrix from a quirk set.
    pub fn new(quirks: QuirkSet) -> Self {
        Self { quirks }
    }

    /// The declared quirks.
    pub fn quirks(&self) -> &QuirkSet {
        &self.quirks
    }

    /// Whether the service under test has `quirk`.
    pub fn has(&self, quirk: Quirk) -> bool {
        self.quirks.contains(quirk)
    }

    /// `alternate` if `quirk` is declared, `baseline` otherwise.
    pub fn resolve_expectation<T>(&self, baseline: T, alternate: T, quirk: Quirk) -> T {
        if self.has(quirk) {
            alternate
        } else {
            baseline
        }
    }

    /// The first quirk in `skip_for` that is declared, if any.
    pub fn skipping_quirk(&self, skip_for: &[Quirk]) -> Option<Quirk> {
        skip_for.iter().copied().find(|q| self.has(*q))
    }

    /// Whether a scenario marked with `skip_for` must be skipped.
    pub fn should_skip(&self, skip_for: &[Quirk]) -> bool {
        self.skipping_quirk(skip_for).is_some()
    }
}
