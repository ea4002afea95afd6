//! Non-validating UTF-8 encoding of code points, and the characters the key
//! scenarios are built from.
//!
//! `char` cannot hold surrogates, and `String` cannot hold overlong forms, so
//! adversarial keys are assembled from raw bytes produced here.

/// U+0001, the smallest code point most servers accept in a key.
pub const CODEPOINT_MIN: u32 = 0x0001;
/// The last code point before the surrogate block that scenarios use.
pub const BEFORE_SURROGATES: u32 = 0xD7FB;
/// ARABIC LETTER TCHEHEH ISOLATED FORM, just past the surrogate block.
pub const AFTER_SURROGATES: u32 = 0xFB80;
/// LATIN SMALL LIGATURE FF.
pub const FF_LIGATURE: u32 = 0xFB00;
/// CLAPPING HANDS SIGN, outside the Basic Multilingual Plane.
pub const CLAPPING_HANDS: u32 = 0x1F44F;
/// OPEN HANDS SIGN, the code point following [`CLAPPING_HANDS`].
pub const OPEN_HANDS: u32 = 0x1F450;
/// High surrogate of [`CLAPPING_HANDS`] in UTF-16.
pub const CLAPPING_HANDS_HIGH_SURROGATE: u32 = 0xD83D;
/// Low surrogate of [`CLAPPING_HANDS`] in UTF-16.
pub const CLAPPING_HANDS_LOW_SURROGATE: u32 = 0xDC4F;
/// NKO LETTER N.
pub const NKO_N: u32 = 0x07D2;
/// DEVANAGARI LETTER HA.
pub const DEVANAGARI_HA: u32 = 0x0939;
/// The largest Unicode code point.
pub const CODEPOINT_MAX: u32 = 0x10FFFF;

/// Smallest number of bytes the UTF-8 bit layout needs for `cp`.
pub fn minimal_width(cp: u32) -> usize {
    match cp {
        0..=0x7F => 1,
        0x80..=0x7FF => 2,
        0x800..=0xFFFF => 3,
        _ => 4,
    }
}

/// Encodes `cp` in its shortest UTF-8 bit layout without validating it.
///
/// Surrogates and values above U+10FFFF are encoded as if they were ordinary
/// code points. Only the low 21 bits of `cp` are used.
pub fn raw_utf8(cp: u32) -> Vec<u8> {
    let cp = cp & 0x1F_FFFF;
    encode(cp, minimal_width(cp))
}

/// Encodes `cp` using exactly `width` bytes, producing an overlong form when
/// `width` exceeds the minimal width.
///
/// Returns `None` if `width` is outside `1..=4` or too small to hold `cp`.
pub fn raw_utf8_with_width(cp: u32, width: usize) -> Option<Vec<u8>> {
    if !(1..=4).contains(&width) || width < minimal_width(cp) || cp > 0x1F_FFFF {
        return None;
    }
    Some(encode(cp, width))
}

/// UTF-16 surrogate pair for a supplementary-plane code point.
pub fn surrogate_pair(cp: u32) -> Option<(u32, u32)> {
    if !(0x10000..=CODEPOINT_MAX).contains(&cp) {
        return None;
    }
    let v = cp - 0x10000;
    Some((0xD800 | (v >> 10), 0xDC00 | (v & 0x3FF)))
}

fn encode(cp: u32, width: usize) -> Vec<u8> {
    let lead_marker: u8 = match width {
        1 => return vec![cp as u8],
        2 => 0xC0,
        3 => 0xE0,
        _ => 0xF0,
    };
    let mut out = vec![0u8; width];
    let mut rest = cp;
    for slot in out.iter_mut().skip(1).rev() {
        *slot = 0x80 | (rest & 0x3F) as u8;
        rest >>= 6;
    }
    out[0] = lead_marker | rest as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_utf8_matches_std_for_scalar_values() {
        for cp in [0x41, NKO_N, DEVANAGARI_HA, FF_LIGATURE, AFTER_SURROGATES, CLAPPING_HANDS] {
            let expected = char::from_u32(cp).unwrap().to_string().into_bytes();
            assert_eq!(raw_utf8(cp), expected, "U+{:04X}", cp);
        }
    }

    #[test]
    fn test_raw_utf8_encodes_surrogates() {
        assert_eq!(raw_utf8(CLAPPING_HANDS_HIGH_SURROGATE), vec![0xED, 0xA0, 0xBD]);
        assert_eq!(raw_utf8(CLAPPING_HANDS_LOW_SURROGATE), vec![0xED, 0xB1, 0x8F]);
    }

    #[test]
    fn test_overlong_forms() {
        assert_eq!(raw_utf8_with_width(0, 2), Some(vec![0xC0, 0x80]));
        assert_eq!(raw_utf8_with_width(u32::from(b'a'), 2), Some(vec![0xC1, 0xA1]));
        assert_eq!(raw_utf8_with_width(0, 3), Some(vec![0xE0, 0x80, 0x80]));
    }

    #[test]
    fn test_width_too_small_is_rejected() {
        assert_eq!(raw_utf8_with_width(CLAPPING_HANDS, 3), None);
        assert_eq!(raw_utf8_with_width(0x41, 5), None);
        assert_eq!(raw_utf8_with_width(0x41, 0), None);
    }

    #[test]
    fn test_surrogate_pair_of_clapping_hands() {
        assert_eq!(
            surrogate_pair(CLAPPING_HANDS),
            Some((CLAPPING_HANDS_HIGH_SURROGATE, CLAPPING_HANDS_LOW_SURROGATE))
        );
        assert_eq!(surrogate_pair(0xFFFF), None);
    }

    #[test]
    fn test_codepoint_max_encoding() {
        assert_eq!(raw_utf8(CODEPOINT_MAX), vec![0xF4, 0x8F, 0xBF, 0xBF]);
    }
}
