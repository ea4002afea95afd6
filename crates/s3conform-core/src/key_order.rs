//! Key ordering disciplines and UTF-8 validity classification.
//!
//! The protocol lists keys in UTF-8 binary order. Some servers order by
//! UTF-16 code units instead, which only differs once supplementary-plane
//! characters (encoded as surrogate pairs, 0xD800..0xDFFF) meet BMP
//! characters above the surrogate block (0xE000..0xFFFF).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::key::ObjectKey;

/// Unsigned lexicographic byte comparison.
pub fn compare_utf8_binary(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Compares two keys as sequences of UTF-16 code units.
///
/// Bytes that are not part of a valid UTF-8 sequence each become one lone
/// low surrogate `0xDC00 | byte`, so the order stays total over arbitrary
/// byte strings.
pub fn compare_utf16_binary(a: &[u8], b: &[u8]) -> Ordering {
    utf16_units(a).cmp(&utf16_units(b))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                units.extend(valid.encode_utf16());
                return units;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                units.extend(std::str::from_utf8(valid).unwrap_or_default().encode_utf16());
                let bad = err.error_len().unwrap_or(after.len());
                units.extend(after[..bad].iter().map(|b| 0xDC00 | u16::from(*b)));
                rest = &after[bad..];
            }
        }
    }
}

/// The order in which a server returns keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderingDiscipline {
    /// Byte order of the UTF-8 encoding, as the protocol specifies
    #[default]
    Utf8Binary,
    /// Code unit order of the UTF-16 encoding
    Utf16Binary,
}

impl OrderingDiscipline {
    /// Compares two keys under this discipline.
    pub fn compare(&self, a: &ObjectKey, b: &ObjectKey) -> Ordering {
        match self {
            OrderingDiscipline::Utf8Binary => compare_utf8_binary(a.as_bytes(), b.as_bytes()),
            OrderingDiscipline::Utf16Binary => compare_utf16_binary(a.as_bytes(), b.as_bytes()),
        }
    }
}

/// Returns `keys` sorted under `discipline`. The sort is stable.
pub fn sort(keys: impl IntoIterator<Item = ObjectKey>, discipline: OrderingDiscipline) -> Vec<ObjectKey> {
    let mut keys: Vec<ObjectKey> = keys.into_iter().collect();
    keys.sort_by(|a, b| discipline.compare(a, b));
    keys
}

/// Validity class of a byte string interpreted as UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Utf8Class {
    /// Well-formed UTF-8 (the null byte included)
    Valid,
    /// A code point encoded with more bytes than needed, e.g. `C0 80`
    OverlongEncoding,
    /// A UTF-16 surrogate (U+D800..U+DFFF) encoded directly
    EncodesSurrogate,
    /// A multi-byte sequence cut short by the end of input or a non-continuation byte
    TruncatedSequence,
    /// A stray continuation byte or one of `F8..FF`
    InvalidLeadByte,
    /// A sequence that decodes above U+10FFFF
    OutOfRange,
}

impl Utf8Class {
    /// True only for [`Utf8Class::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Utf8Class::Valid)
    }
}

/// Classifies `bytes`, reporting the first defect from left to right.
pub fn classify_utf8(bytes: &[u8]) -> Utf8Class {
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        if lead < 0x80 {
            i += 1;
            continue;
        }
        let (width, min, mut cp) = match lead {
            0xC0..=0xDF => (2, 0x80, u32::from(lead & 0x1F)),
            0xE0..=0xEF => (3, 0x800, u32::from(lead & 0x0F)),
            0xF0..=0xF7 => (4, 0x10000, u32::from(lead & 0x07)),
            _ => return Utf8Class::InvalidLeadByte,
        };
        for offset in 1..width {
            match bytes.get(i + offset) {
                Some(b) if b & 0xC0 == 0x80 => cp = (cp << 6) | u32::from(b & 0x3F),
                _ => return Utf8Class::TruncatedSequence,
            }
        }
        if cp < min {
            return Utf8Class::OverlongEncoding;
        }
        if (0xD800..=0xDFFF).contains(&cp) {
            return Utf8Class::EncodesSurrogate;
        }
        if cp > 0x10FFFF {
            return Utf8Class::OutOfRange;
        }
        i += width;
    }
    Utf8Class::Valid
}
