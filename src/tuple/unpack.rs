//! Element scanner and decoders.
//!
//! Two layers: [`element_end`] walks one encoded element without decoding
//! its payload (the lazy view's index builder), and [`decode_element`]
//! materializes the value.  The decoder is permissive on input (a
//! non-minimal integer payload decodes arithmetically) while the writer
//! only ever emits canonical form.

use crate::slice::Slice;

use super::types::{tag, Element, TupleError};

/// Returns the exclusive end offset of the element whose tag byte is at
/// `pos`.  Fails on an unknown tag, a truncated integer payload, or a
/// string with no terminator.
pub(crate) fn element_end(data: &[u8], pos: usize) -> Result<usize, TupleError> {
    let t = data[pos];
    match t {
        tag::NIL | tag::INT_ZERO => Ok(pos + 1),
        tag::BYTES | tag::TEXT => {
            let mut i = pos + 1;
            while i < data.len() {
                if data[i] != 0x00 {
                    i += 1;
                } else if data.get(i + 1) == Some(&0xFF) {
                    // Escaped zero, still inside the payload.
                    i += 2;
                } else {
                    // Unescaped zero: the terminator.
                    return Ok(i + 1);
                }
            }
            Err(TupleError::Unterminated { offset: pos })
        }
        _ if (tag::NEG_INT_8..=tag::POS_INT_8).contains(&t) => {
            let width = usize::from(t.abs_diff(tag::INT_ZERO));
            let end = pos + 1 + width;
            if end > data.len() {
                return Err(TupleError::Truncated { offset: pos });
            }
            Ok(end)
        }
        _ => Err(TupleError::UnknownTag { tag: t, offset: pos }),
    }
}

/// Collapses `0x00 0xFF` pairs back to single zeros.  `payload` excludes the
/// tag and the terminator.
fn unescape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        out.push(payload[i]);
        // A zero inside the payload is always followed by its 0xFF escape;
        // the scanner already established that.
        i += if payload[i] == 0x00 { 2 } else { 1 };
    }
    out
}

/// Big-endian accumulation of an integer payload.
#[inline]
fn read_be(payload: &[u8]) -> u64 {
    payload.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Decodes the element whose tag byte is at `pos`; returns the value and the
/// exclusive end offset.
pub(crate) fn decode_element(data: &[u8], pos: usize) -> Result<(Element, usize), TupleError> {
    let end = element_end(data, pos)?;
    let t = data[pos];
    let element = match t {
        tag::NIL => Element::Nil,
        tag::INT_ZERO => Element::Int(0),
        tag::BYTES => {
            let payload = unescape(&data[pos + 1..end - 1]);
            Element::Bytes(Slice::from_vec(payload))
        }
        tag::TEXT => {
            let payload = unescape(&data[pos + 1..end - 1]);
            let text = String::from_utf8(payload)
                .map_err(|_| TupleError::InvalidUtf8 { offset: pos })?;
            Element::Text(text)
        }
        _ if t > tag::INT_ZERO => {
            let magnitude = read_be(&data[pos + 1..end]);
            let value = i64::try_from(magnitude).map_err(|_| TupleError::IntOverflow)?;
            Element::Int(value)
        }
        _ => {
            // Negative: the payload is the one's complement of the magnitude
            // over its width, so invert against the all-ones value.
            let width = usize::from(tag::INT_ZERO - t);
            let magnitude = super::pack::ones(width) - read_be(&data[pos + 1..end]);
            let value = 0i64
                .checked_sub_unsigned(magnitude)
                .ok_or(TupleError::IntOverflow)?;
            Element::Int(value)
        }
    };
    Ok((element, end))
}

/// Decodes every element of an encoded tuple.  The encoding must partition
/// exactly: trailing bytes that do not start an element are an error.
pub(crate) fn decode_all(data: &[u8]) -> Result<Vec<Element>, TupleError> {
    let mut elements = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let (element, end) = decode_element(data, pos)?;
        elements.push(element);
        pos = end;
    }
    Ok(elements)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Scanner ──────────────────────────────────────────────────────────────

    #[test]
    fn scanner_spans_each_kind() {
        assert_eq!(element_end(&[0x00], 0).unwrap(), 1);
        assert_eq!(element_end(&[0x14], 0).unwrap(), 1);
        assert_eq!(element_end(&[0x15, 0x7B], 0).unwrap(), 2);
        assert_eq!(element_end(&[0x13, 0xFE], 0).unwrap(), 2);
        // "ab" text: tag a b terminator
        assert_eq!(element_end(b"\x02ab\x00", 0).unwrap(), 4);
        // Escaped zero inside the payload does not terminate.
        assert_eq!(element_end(&[0x01, 0x00, 0xFF, 0x2A, 0x00], 0).unwrap(), 5);
    }

    #[test]
    fn scanner_rejects_malformed() {
        assert_eq!(
            element_end(&[0x15], 0),
            Err(TupleError::Truncated { offset: 0 })
        );
        assert_eq!(
            element_end(&[0x0C, 0x00, 0x00], 0),
            Err(TupleError::Truncated { offset: 0 })
        );
        assert_eq!(
            element_end(b"\x02ab", 0),
            Err(TupleError::Unterminated { offset: 0 })
        );
        // A trailing 0x00 0xFF escape with no terminator after it.
        assert_eq!(
            element_end(&[0x01, 0x00, 0xFF], 0),
            Err(TupleError::Unterminated { offset: 0 })
        );
        assert_eq!(
            element_end(&[0x42], 0),
            Err(TupleError::UnknownTag { tag: 0x42, offset: 0 })
        );
    }

    // ── Decoders ─────────────────────────────────────────────────────────────

    #[test]
    fn decode_strings_unescapes() {
        let (el, end) = decode_element(&[0x01, 0x7B, 0x00, 0xFF, 0x2A, 0x00], 0).unwrap();
        assert_eq!(el, Element::Bytes(Slice::copy_of(&[0x7B, 0x00, 0x2A])));
        assert_eq!(end, 6);

        let (el, _) = decode_element(b"\x02hello world\x00", 0).unwrap();
        assert_eq!(el, Element::Text("hello world".into()));
    }

    #[test]
    fn decode_rejects_invalid_utf8_in_text() {
        // 0x80 alone is not valid UTF-8; fine in a bytes element.
        assert!(decode_element(&[0x02, 0x80, 0x00], 0).is_err());
        assert!(decode_element(&[0x01, 0x80, 0x00], 0).is_ok());
    }

    #[test]
    fn decode_integers_both_signs() {
        let cases: &[(&[u8], i64)] = &[
            (&[0x14], 0),
            (&[0x15, 0x7B], 123),
            (&[0x13, 0xFE], -1),
            (&[0x13, 0x00], -255),
            (&[0x12, 0xFE, 0xFF], -256),
            (&[0x18, 0x7F, 0xFF, 0xFF, 0xFF], i64::from(i32::MAX)),
            (&[0x10, 0x7F, 0xFF, 0xFF, 0xFF], i64::from(i32::MIN)),
            (
                &[0x1C, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
                i64::MAX,
            ),
            (
                &[0x0C, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
                i64::MIN,
            ),
        ];
        for (bytes, expected) in cases {
            let (el, end) = decode_element(bytes, 0).unwrap();
            assert_eq!(el, Element::Int(*expected), "decoding {bytes:02X?}");
            assert_eq!(end, bytes.len());
        }
    }

    #[test]
    fn decode_is_permissive_about_width() {
        // A zero-padded positive payload is non-canonical but decodes.
        let (el, _) = decode_element(&[0x16, 0x00, 0x7B], 0).unwrap();
        assert_eq!(el, Element::Int(123));
    }

    #[test]
    fn decode_rejects_unsigned_overflow() {
        // 2^64 - 1 does not fit i64.
        assert_eq!(
            decode_element(&[0x1C, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 0),
            Err(TupleError::IntOverflow)
        );
        // -(2^63 + 1) does not fit either: payload 2^64-1 - (2^63+1).
        let mag: u64 = (1u64 << 63) + 1;
        let payload = (u64::MAX - mag).to_be_bytes();
        let mut bytes = vec![0x0C];
        bytes.extend_from_slice(&payload);
        assert_eq!(decode_element(&bytes, 0), Err(TupleError::IntOverflow));
    }

    // ── Whole-tuple decode ───────────────────────────────────────────────────

    #[test]
    fn decode_all_partitions_exactly() {
        let elements = decode_all(b"\x02hello\x00\x15\x7B\x14").unwrap();
        assert_eq!(
            elements,
            vec![
                Element::Text("hello".into()),
                Element::Int(123),
                Element::Int(0)
            ]
        );
        assert_eq!(decode_all(&[]).unwrap(), Vec::new());
        // A dangling tag after the last whole element is an error.
        assert!(decode_all(&[0x14, 0x15]).is_err());
    }
}
