//! Object keys as opaque byte strings.

use std::fmt;

/// An object key.
///
/// Keys are raw bytes and are not assumed to be valid UTF-8: malformed keys
/// are exactly what several conformance scenarios send. `ObjectKey` has no
/// `Ord` implementation; ordering goes through
/// [`crate::key_order::OrderingDiscipline`] so that the active discipline is
/// always explicit.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ObjectKey(Vec<u8>);

impl ObjectKey {
    /// Wraps raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the key, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty key (used as the "match everything" prefix).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Byte-wise prefix test.
    pub fn starts_with(&self, prefix: &ObjectKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// The key as text, if it is valid UTF-8.
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Returns a new key with `suffix` appended.
    pub fn join(&self, suffix: impl AsRef<[u8]>) -> ObjectKey {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(suffix.as_ref());
        ObjectKey(bytes)
    }
}

impl From<&str> for ObjectKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for ObjectKey {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<Vec<u8>> for ObjectKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ObjectKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for ObjectKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Valid UTF-8 runs are written with Rust escapes for control characters;
/// bytes that are not part of a valid sequence are written as `\xNN`.
impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => return write!(f, "{}", valid.escape_debug()),
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    write!(
                        f,
                        "{}",
                        std::str::from_utf8(valid).unwrap_or_default().escape_debug()
                    )?;
                    let bad = err.error_len().unwrap_or(after.len());
                    for byte in &after[..bad] {
                        write!(f, "\\x{:02X}", byte)?;
                    }
                    rest = &after[bad..];
                }
            }
        }
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}
