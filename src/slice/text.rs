//! Textual interchange forms for [`Slice`].
//!
//! Covers:
//! - constructors from ASCII and UTF-8 strings
//! - the human-readable escape rendering (`escape` / `unescape`)
//! - lowercase hex (`to_hex` / `from_hex`, parser accepts mixed case)
//! - Base64 with the standard alphabet (`to_base64` / `from_base64`)
//!
//! The escape rendering is the logging format: printable ASCII passes
//! through, everything else (and `'<'` itself, to keep the form
//! unambiguous) becomes `<HH>` with two uppercase hex digits.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::{Slice, SliceError};

const HEX_LOWER: &[u8; 16] = b"0123456789abcdef";
const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

#[inline]
fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Slice {
    // ── String constructors ──────────────────────────────────────────────────

    /// Encodes an ASCII string as one byte per character.  Fails on the first
    /// character outside the ASCII range; a zero-length input yields `Empty`.
    pub fn from_ascii(text: &str) -> Result<Slice, SliceError> {
        if let Some(position) = text.bytes().position(|b| b >= 0x80) {
            return Err(SliceError::NonAscii { position });
        }
        Ok(Slice::copy_of(text.as_bytes()))
    }

    /// Encodes a string as its UTF-8 bytes.  A zero-length input yields
    /// `Empty`; `Nil` is never produced from an actual string.
    pub fn from_utf8(text: &str) -> Slice {
        Slice::copy_of(text.as_bytes())
    }

    // ── Escape rendering ─────────────────────────────────────────────────────

    /// Human-readable ASCII rendering.  Bytes below `0x20`, at or above
    /// `0x7F`, and the byte `'<'` are emitted as `<HH>` with uppercase hex
    /// digits; every other byte passes through literally.
    ///
    /// `Nil` and `Empty` both render as the empty string.
    pub fn escape(&self) -> String {
        let bytes = self.as_bytes();
        let mut out = String::with_capacity(bytes.len());
        for &b in bytes {
            if b < 0x20 || b >= 0x7F || b == b'<' {
                out.push('<');
                out.push(HEX_UPPER[usize::from(b >> 4)] as char);
                out.push(HEX_UPPER[usize::from(b & 0x0F)] as char);
                out.push('>');
            } else {
                out.push(b as char);
            }
        }
        out
    }

    /// Strict inverse of [`Slice::escape`] on well-formed input: `<HH>`
    /// groups collapse to one byte, everything else is taken literally.
    /// A `<` without two hex digits and a closing `>` fails.
    pub fn unescape(text: &str) -> Result<Slice, SliceError> {
        let src = text.as_bytes();
        let mut out = Vec::with_capacity(src.len());
        let mut i = 0;
        while i < src.len() {
            let b = src[i];
            if b == b'<' {
                let malformed = SliceError::BadEscape { position: i };
                if i + 3 >= src.len() || src[i + 3] != b'>' {
                    return Err(malformed);
                }
                let hi = hex_digit(src[i + 1]).ok_or_else(|| malformed.clone())?;
                let lo = hex_digit(src[i + 2]).ok_or(malformed)?;
                out.push((hi << 4) | lo);
                i += 4;
            } else {
                out.push(b);
                i += 1;
            }
        }
        Ok(Slice::from_vec(out))
    }

    // ── Hex ──────────────────────────────────────────────────────────────────

    /// Two lowercase hex characters per byte, no separators.
    pub fn to_hex(&self) -> String {
        let bytes = self.as_bytes();
        let mut out = String::with_capacity(bytes.len() * 2);
        for &b in bytes {
            out.push(HEX_LOWER[usize::from(b >> 4)] as char);
            out.push(HEX_LOWER[usize::from(b & 0x0F)] as char);
        }
        out
    }

    /// Parses a hex string: even length, digits in either case.  A
    /// zero-length input yields `Empty`.
    pub fn from_hex(text: &str) -> Result<Slice, SliceError> {
        let src = text.as_bytes();
        if src.len() % 2 != 0 {
            return Err(SliceError::BadHex { position: src.len() - 1 });
        }
        let mut out = Vec::with_capacity(src.len() / 2);
        for (i, pair) in src.chunks_exact(2).enumerate() {
            let hi = hex_digit(pair[0]).ok_or(SliceError::BadHex { position: i * 2 })?;
            let lo = hex_digit(pair[1]).ok_or(SliceError::BadHex { position: i * 2 + 1 })?;
            out.push((hi << 4) | lo);
        }
        Ok(Slice::from_vec(out))
    }

    // ── Base64 ───────────────────────────────────────────────────────────────

    /// Standard-alphabet Base64 with padding.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.as_bytes())
    }

    /// Parses standard-alphabet Base64.  A zero-length input yields `Empty`.
    pub fn from_base64(text: &str) -> Result<Slice, SliceError> {
        BASE64
            .decode(text)
            .map(Slice::from_vec)
            .map_err(|_| SliceError::BadBase64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Escape ───────────────────────────────────────────────────────────────

    #[test]
    fn escape_control_high_and_angle_bytes() {
        // "A" ++ 0x00 ++ "<"  →  A<00><3C>
        let s = Slice::from_vec(vec![b'A', 0x00, b'<']);
        assert_eq!(s.escape(), "A<00><3C>");
        assert_eq!(Slice::unescape("A<00><3C>").unwrap(), s);
    }

    #[test]
    fn escape_boundaries() {
        // 0x1F escapes, 0x20 (space) does not; 0x7E passes, 0x7F escapes.
        assert_eq!(Slice::from_vec(vec![0x1F, 0x20, 0x7E, 0x7F]).escape(), "<1F> ~<7F>");
        assert_eq!(Slice::copy_of(&[0xFF]).escape(), "<FF>");
        assert_eq!(Slice::nil().escape(), "");
        assert_eq!(Slice::empty().escape(), "");
    }

    #[test]
    fn unescape_rejects_malformed() {
        assert!(Slice::unescape("<0").is_err()); // truncated
        assert!(Slice::unescape("<00").is_err()); // missing '>'
        assert!(Slice::unescape("a<0G>").is_err()); // bad digit
        assert!(Slice::unescape("<<00>").is_err()); // '<' not opening a group
        assert_eq!(Slice::unescape("").unwrap(), Slice::empty());
    }

    #[test]
    fn escape_roundtrip_all_bytes() {
        let all: Vec<u8> = (0..=255).collect();
        let s = Slice::from_vec(all);
        assert_eq!(Slice::unescape(&s.escape()).unwrap(), s);
    }

    // ── Hex ──────────────────────────────────────────────────────────────────

    #[test]
    fn hex_roundtrip_lowercase_out_mixed_case_in() {
        let s = Slice::copy_of(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(s.to_hex(), "deadbeef");
        assert_eq!(Slice::from_hex("deadbeef").unwrap(), s);
        assert_eq!(Slice::from_hex("DeAdBeEf").unwrap(), s);
    }

    #[test]
    fn hex_rejects_odd_length_and_bad_digits() {
        assert!(Slice::from_hex("abc").is_err());
        assert!(Slice::from_hex("zz").is_err());
        assert_eq!(Slice::from_hex("").unwrap(), Slice::empty());
    }

    // ── Base64 ───────────────────────────────────────────────────────────────

    #[test]
    fn base64_roundtrip() {
        let s = Slice::copy_of(b"hello world");
        assert_eq!(s.to_base64(), "aGVsbG8gd29ybGQ=");
        assert_eq!(Slice::from_base64("aGVsbG8gd29ybGQ=").unwrap(), s);
        assert_eq!(Slice::from_base64("").unwrap(), Slice::empty());
        assert!(Slice::from_base64("!!!").is_err());
    }

    // ── String constructors ──────────────────────────────────────────────────

    #[test]
    fn ascii_constructor_rejects_high_chars() {
        assert_eq!(Slice::from_ascii("abc").unwrap().as_bytes(), b"abc");
        assert!(Slice::from_ascii("café").is_err());
        let empty = Slice::from_ascii("").unwrap();
        assert!(empty.has_value() && empty.is_empty());
    }

    #[test]
    fn utf8_constructor_takes_encoded_bytes() {
        assert_eq!(Slice::from_utf8("café").as_bytes(), "café".as_bytes());
        assert!(Slice::from_utf8("").has_value());
    }
}
