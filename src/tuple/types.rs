//! Tuple element values, wire-format type tags, and codec errors.
//!
//! Covers:
//! - the tag byte table (the wire format's one-byte element headers)
//! - [`Element`], the decoded value of one tuple position
//! - cross-kind ordering (by tag rank) and within-kind ordering (by value)
//! - [`FromElement`], the coercion step behind the typed accessors
//! - [`TupleError`], the codec's failure taxonomy

use core::cmp::Ordering;
use core::fmt;

use crate::slice::Slice;

// ─────────────────────────────────────────────────────────────────────────────
// Type tags (wire format, exact values)
// ─────────────────────────────────────────────────────────────────────────────

/// The leading byte of each encoded element.  Tag order is element order:
/// sorting encoded tuples bytewise sorts them by their decoded values.
pub(crate) mod tag {
    /// Nil element; no payload.
    pub const NIL: u8 = 0x00;
    /// Byte string; zero-escaped payload, `0x00` terminator.
    pub const BYTES: u8 = 0x01;
    /// Unicode string; zero-escaped UTF-8 payload, `0x00` terminator.
    pub const TEXT: u8 = 0x02;
    /// Negative integer of 8 big-endian payload bytes (one's complement of
    /// the magnitude).  Tags `0x0C..=0x13` are widths 8 down to 1.
    pub const NEG_INT_8: u8 = 0x0C;
    /// Integer zero; no payload.
    pub const INT_ZERO: u8 = 0x14;
    /// Positive integer of 8 big-endian payload bytes.  Tags `0x15..=0x1C`
    /// are widths 1 up to 8.
    pub const POS_INT_8: u8 = 0x1C;
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failures produced while encoding, indexing, or decoding tuples.
///
/// The first four variants are codec errors (malformed bytes), `IntOverflow`
/// is arithmetic, `WrongType` is a coercion failure, and `IndexOutOfRange`
/// is a programmer error.  Clone-able so a lazily built element index can
/// memoize its failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleError {
    /// A tag byte outside the supported table.
    UnknownTag { tag: u8, offset: usize },
    /// An integer payload runs past the end of the encoded bytes.
    Truncated { offset: usize },
    /// A byte-string or text element has no unescaped `0x00` terminator.
    Unterminated { offset: usize },
    /// A text element's unescaped payload is not valid UTF-8.
    InvalidUtf8 { offset: usize },
    /// An integer does not fit the 64-bit signed range (decode or coercion).
    IntOverflow,
    /// Requested decoding to an incompatible type.
    WrongType { expected: &'static str, found: &'static str },
    /// Element index outside the tuple (after negative-index adjustment).
    IndexOutOfRange { index: isize, len: usize },
}

impl fmt::Display for TupleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TupleError::UnknownTag { tag, offset } => {
                write!(f, "unknown type tag 0x{tag:02X} at offset {offset}")
            }
            TupleError::Truncated { offset } => {
                write!(f, "encoded element truncated at offset {offset}")
            }
            TupleError::Unterminated { offset } => {
                write!(f, "string element starting at offset {offset} has no terminator")
            }
            TupleError::InvalidUtf8 { offset } => {
                write!(f, "text element starting at offset {offset} is not valid UTF-8")
            }
            TupleError::IntOverflow => write!(f, "integer outside the 64-bit signed range"),
            TupleError::WrongType { expected, found } => {
                write!(f, "cannot decode {found} element as {expected}")
            }
            TupleError::IndexOutOfRange { index, len } => {
                write!(f, "element index {index} out of range for tuple of {len} elements")
            }
        }
    }
}

impl std::error::Error for TupleError {}

/// Adjusts a possibly negative element index against `len`.  Negative
/// indices count from the end, so `-1` is the last element.
pub(crate) fn resolve_index(index: isize, len: usize) -> Result<usize, TupleError> {
    let n = len as isize;
    let i = if index < 0 { index + n } else { index };
    if i < 0 || i >= n {
        return Err(TupleError::IndexOutOfRange { index, len });
    }
    Ok(i as usize)
}

// ─────────────────────────────────────────────────────────────────────────────
// Element
// ─────────────────────────────────────────────────────────────────────────────

/// The decoded value of one tuple position.
///
/// Integers are held uniformly as `i64`, which is what makes the "similar
/// value" equality fall out for free: an `int` and a `long` holding 123
/// decode to the same element.  Booleans ride the integer dialect (`false`
/// packs as the zero tag, `true` as `1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    /// The absent value.
    Nil,
    /// An opaque byte string.
    Bytes(Slice),
    /// A unicode string, compared ordinally.
    Text(String),
    /// A signed 64-bit integer.
    Int(i64),
}

impl Element {
    /// Rank of the element kind, matching tag-byte order on the wire.
    #[inline]
    fn kind_rank(&self) -> u8 {
        match self {
            Element::Nil => 0,
            Element::Bytes(_) => 1,
            Element::Text(_) => 2,
            Element::Int(_) => 3,
        }
    }

    /// Human-readable kind name, used in coercion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Element::Nil => "nil",
            Element::Bytes(_) => "bytes",
            Element::Text(_) => "text",
            Element::Int(_) => "int",
        }
    }
}

impl Ord for Element {
    /// The decoded-value order that the wire encoding preserves: kinds sort
    /// by tag rank, byte strings and text sort bytewise, integers sort
    /// numerically.
    fn cmp(&self, other: &Element) -> Ordering {
        match (self, other) {
            (Element::Nil, Element::Nil) => Ordering::Equal,
            (Element::Bytes(a), Element::Bytes(b)) => a.cmp(b),
            (Element::Text(a), Element::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Element::Int(a), Element::Int(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Element) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Value-to-element conversions used by the tuple builders.

impl From<i64> for Element {
    fn from(v: i64) -> Element {
        Element::Int(v)
    }
}

impl From<i32> for Element {
    fn from(v: i32) -> Element {
        Element::Int(i64::from(v))
    }
}

impl From<u32> for Element {
    fn from(v: u32) -> Element {
        Element::Int(i64::from(v))
    }
}

impl From<bool> for Element {
    fn from(v: bool) -> Element {
        Element::Int(i64::from(v))
    }
}

impl From<&str> for Element {
    fn from(v: &str) -> Element {
        Element::Text(v.to_owned())
    }
}

impl From<String> for Element {
    fn from(v: String) -> Element {
        Element::Text(v)
    }
}

impl From<Slice> for Element {
    fn from(v: Slice) -> Element {
        Element::Bytes(v)
    }
}

impl From<&[u8]> for Element {
    fn from(v: &[u8]) -> Element {
        Element::Bytes(Slice::copy_of(v))
    }
}

impl<T: Into<Element>> From<Option<T>> for Element {
    fn from(v: Option<T>) -> Element {
        match v {
            Some(inner) => inner.into(),
            None => Element::Nil,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed coercions
// ─────────────────────────────────────────────────────────────────────────────

/// The coercion step applied by the typed accessors (`get`, `first`,
/// `last`): widening is implicit in the `i64` representation, narrowing is
/// range-checked, and a kind mismatch is a [`TupleError::WrongType`].
pub trait FromElement: Sized {
    fn from_element(element: &Element) -> Result<Self, TupleError>;
}

#[inline]
fn wrong_type(expected: &'static str, found: &Element) -> TupleError {
    TupleError::WrongType { expected, found: found.kind_name() }
}

impl FromElement for i64 {
    fn from_element(element: &Element) -> Result<i64, TupleError> {
        match element {
            Element::Int(v) => Ok(*v),
            other => Err(wrong_type("int", other)),
        }
    }
}

impl FromElement for i32 {
    fn from_element(element: &Element) -> Result<i32, TupleError> {
        let wide = i64::from_element(element)?;
        i32::try_from(wide).map_err(|_| TupleError::IntOverflow)
    }
}

impl FromElement for u64 {
    fn from_element(element: &Element) -> Result<u64, TupleError> {
        let wide = i64::from_element(element)?;
        u64::try_from(wide).map_err(|_| TupleError::IntOverflow)
    }
}

impl FromElement for u32 {
    fn from_element(element: &Element) -> Result<u32, TupleError> {
        let wide = i64::from_element(element)?;
        u32::try_from(wide).map_err(|_| TupleError::IntOverflow)
    }
}

impl FromElement for bool {
    /// `Nil` reads as `false`; integers read as "non-zero".
    fn from_element(element: &Element) -> Result<bool, TupleError> {
        match element {
            Element::Nil => Ok(false),
            Element::Int(v) => Ok(*v != 0),
            other => Err(wrong_type("bool", other)),
        }
    }
}

impl FromElement for String {
    fn from_element(element: &Element) -> Result<String, TupleError> {
        match element {
            Element::Text(s) => Ok(s.clone()),
            other => Err(wrong_type("text", other)),
        }
    }
}

impl FromElement for Slice {
    fn from_element(element: &Element) -> Result<Slice, TupleError> {
        match element {
            Element::Bytes(s) => Ok(s.clone()),
            other => Err(wrong_type("bytes", other)),
        }
    }
}

impl FromElement for Element {
    fn from_element(element: &Element) -> Result<Element, TupleError> {
        Ok(element.clone())
    }
}

impl<T: FromElement> FromElement for Option<T> {
    /// `Nil` decodes to `None`; anything else must coerce to `T`.
    fn from_element(element: &Element) -> Result<Option<T>, TupleError> {
        match element {
            Element::Nil => Ok(None),
            other => T::from_element(other).map(Some),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Cross-kind order matches tag order ───────────────────────────────────

    #[test]
    fn kinds_sort_by_tag_rank() {
        let nil = Element::Nil;
        let bytes = Element::Bytes(Slice::copy_of(&[0xFF]));
        let text = Element::Text("".into());
        let int = Element::Int(i64::MIN);
        assert!(nil < bytes);
        assert!(bytes < text);
        assert!(text < int);
    }

    #[test]
    fn within_kind_order_is_by_value() {
        assert!(Element::Int(-2) < Element::Int(-1));
        assert!(Element::Int(-1) < Element::Int(0));
        assert!(Element::Int(0) < Element::Int(1));
        assert!(Element::Text("a".into()) < Element::Text("ab".into()));
        assert!(
            Element::Bytes(Slice::copy_of(b"a")) < Element::Bytes(Slice::copy_of(&[0x80]))
        );
    }

    // ── Similar-value equality ───────────────────────────────────────────────

    #[test]
    fn widths_do_not_matter_for_integer_equality() {
        // i32 and i64 holding the same value build the same element.
        assert_eq!(Element::from(123i32), Element::from(123i64));
        assert_eq!(Element::from(true), Element::Int(1));
        assert_eq!(Element::from(false), Element::Int(0));
    }

    // ── Coercions ────────────────────────────────────────────────────────────

    #[test]
    fn narrowing_is_range_checked() {
        assert_eq!(i32::from_element(&Element::Int(123)).unwrap(), 123);
        assert_eq!(
            i32::from_element(&Element::Int(i64::from(i32::MAX) + 1)),
            Err(TupleError::IntOverflow)
        );
        assert_eq!(u64::from_element(&Element::Int(-1)), Err(TupleError::IntOverflow));
    }

    #[test]
    fn kind_mismatch_is_wrong_type() {
        let err = i64::from_element(&Element::Text("123".into())).unwrap_err();
        assert_eq!(err, TupleError::WrongType { expected: "int", found: "text" });
    }

    #[test]
    fn option_routes_nil() {
        assert_eq!(Option::<i64>::from_element(&Element::Nil).unwrap(), None);
        assert_eq!(Option::<i64>::from_element(&Element::Int(7)).unwrap(), Some(7));
        assert_eq!(Element::from(None::<i64>), Element::Nil);
    }

    #[test]
    fn bool_reads_nil_and_integers() {
        assert_eq!(bool::from_element(&Element::Nil).unwrap(), false);
        assert_eq!(bool::from_element(&Element::Int(0)).unwrap(), false);
        assert_eq!(bool::from_element(&Element::Int(2)).unwrap(), true);
        assert!(bool::from_element(&Element::Text("t".into())).is_err());
    }
}
