//! Order-preserving tuple codec.
//!
//! Packs heterogeneous, ordered sequences of typed elements into byte
//! strings whose lexicographic byte order matches the natural ordering of
//! the decoded tuples.  This is the key format: every index, range scan,
//! and layer prefix is a packed tuple, so `pack(a) < pack(b)` bytewise iff
//! `a < b` element-wise.
//!
//! Two physical forms:
//! - [`Tuple`]: decoded element values, cheap to build and inspect
//! - [`SlicedTuple`]: an encoded slice plus a lazy boundary index,
//!   decoding elements only on demand
//!
//! Round-trip law: `Tuple::unpack(t.pack()) == t` for every supported
//! tuple.  The writer emits canonical (shortest) encodings; the decoder is
//! permissive about non-minimal integer payloads.

mod pack;
mod sliced;
mod types;
mod unpack;

pub use pack::TupleWriter;
pub use sliced::SlicedTuple;
pub use types::{Element, FromElement, TupleError};

use crate::slice::Slice;

use types::resolve_index;

// ─────────────────────────────────────────────────────────────────────────────
// Tuple (constructed form)
// ─────────────────────────────────────────────────────────────────────────────

/// An ordered sequence of decoded elements.
///
/// Equality is structural with "similar value" semantics (integers compare
/// by value regardless of the width they were built from; strings compare
/// ordinally), and the derived order is element-wise lexicographic, the
/// same order the packed bytes sort in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tuple {
    elements: Vec<Element>,
}

impl Tuple {
    /// The empty tuple.
    pub fn new() -> Tuple {
        Tuple { elements: Vec::new() }
    }

    pub fn from_elements(elements: Vec<Element>) -> Tuple {
        Tuple { elements }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[inline]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    // ── Building ─────────────────────────────────────────────────────────────

    /// Appends an element in place.
    pub fn push(&mut self, element: impl Into<Element>) {
        self.elements.push(element.into());
    }

    /// Chainable append: `Tuple::new().with("k").with(1)`.
    pub fn with(mut self, element: impl Into<Element>) -> Tuple {
        self.push(element);
        self
    }

    /// A new tuple holding this tuple's elements plus `element`.
    pub fn append(&self, element: impl Into<Element>) -> Tuple {
        self.clone().with(element)
    }

    /// A new tuple holding this tuple's elements then `other`'s.
    pub fn concat(&self, other: &Tuple) -> Tuple {
        let mut elements = Vec::with_capacity(self.len() + other.len());
        elements.extend_from_slice(&self.elements);
        elements.extend_from_slice(&other.elements);
        Tuple { elements }
    }

    /// The sub-range `[from, to)` of elements.  Negative bounds count from
    /// the end and bounds are clamped; an empty range yields the empty
    /// tuple.
    pub fn range(&self, from: isize, to: isize) -> Tuple {
        let count = self.len() as isize;
        let clamp = |bound: isize| -> usize {
            let b = if bound < 0 { bound + count } else { bound };
            b.clamp(0, count) as usize
        };
        let (lo, hi) = (clamp(from), clamp(to));
        if lo >= hi {
            return Tuple::new();
        }
        Tuple { elements: self.elements[lo..hi].to_vec() }
    }

    // ── Element access ───────────────────────────────────────────────────────

    /// Element at `index`; negative indices count from the end.
    pub fn get(&self, index: isize) -> Result<&Element, TupleError> {
        let i = resolve_index(index, self.len())?;
        Ok(&self.elements[i])
    }

    /// Element at `index` coerced to `T`.
    pub fn get_as<T: FromElement>(&self, index: isize) -> Result<T, TupleError> {
        T::from_element(self.get(index)?)
    }

    /// Coerced first element; fails on an empty tuple.
    pub fn first<T: FromElement>(&self) -> Result<T, TupleError> {
        self.get_as(0)
    }

    /// Coerced last element; fails on an empty tuple.
    pub fn last<T: FromElement>(&self) -> Result<T, TupleError> {
        self.get_as(-1)
    }

    // ── Codec ────────────────────────────────────────────────────────────────

    /// Encodes every element in order into an independent slice.
    pub fn pack(&self) -> Slice {
        let mut w = TupleWriter::with_capacity(self.len() * 4);
        for element in &self.elements {
            w.write_element(element);
        }
        w.into_slice()
    }

    /// Decodes a packed encoding.  The bytes must partition exactly into
    /// element encodings.
    pub fn unpack(data: &Slice) -> Result<Tuple, TupleError> {
        Ok(Tuple { elements: unpack::decode_all(data.as_bytes())? })
    }

    /// Packs into the lazy form.
    pub fn to_sliced(&self) -> SlicedTuple {
        SlicedTuple::new(self.pack())
    }
}

impl FromIterator<Element> for Tuple {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Tuple {
        Tuple { elements: iter.into_iter().collect() }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Round trips ──────────────────────────────────────────────────────────

    #[test]
    fn pack_unpack_round_trip() {
        let samples = vec![
            Tuple::new(),
            Tuple::new().with("hello world"),
            Tuple::new().with("hello world").with(123),
            Tuple::new().with(Element::Nil).with("").with(0).with(-256),
            Tuple::new()
                .with("hello world")
                .with(123)
                .with(false)
                .with(&[0x7B, 0x01, 0x42, 0x00, 0x2A][..]),
            Tuple::new().with(i64::MIN).with(i64::MAX),
            Tuple::new().with("strings with \u{0} zeros \u{0}\u{0} inside"),
        ];
        for t in samples {
            assert_eq!(Tuple::unpack(&t.pack()).unwrap(), t, "round-tripping {t:?}");
        }
    }

    // ── Order preservation ───────────────────────────────────────────────────

    #[test]
    fn packed_order_matches_tuple_order() {
        // Ascending by element-wise order; their packings must ascend too.
        let ordered = vec![
            Tuple::new(),
            Tuple::new().with(Element::Nil),
            Tuple::new().with(&[0x00][..]),
            Tuple::new().with("a"),
            Tuple::new().with("a").with(-1),
            Tuple::new().with("a").with(0),
            Tuple::new().with("a").with(0).with(0),
            Tuple::new().with("a").with(1),
            Tuple::new().with("ab"),
            Tuple::new().with("b"),
            Tuple::new().with(-300),
            Tuple::new().with(-1),
            Tuple::new().with(0),
            Tuple::new().with(255),
            Tuple::new().with(256),
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} < {:?}", pair[0], pair[1]);
            assert!(
                pair[0].pack() < pair[1].pack(),
                "pack({:?}) < pack({:?})",
                pair[0],
                pair[1]
            );
        }
    }

    // ── Structure ────────────────────────────────────────────────────────────

    #[test]
    fn append_and_concat() {
        let ab = Tuple::new().with("a").with("b");
        assert_eq!(ab.append(3).len(), 3);
        assert_eq!(ab.len(), 2); // append does not mutate
        let cd = Tuple::new().with("c").with("d");
        let all = ab.concat(&cd);
        assert_eq!(all.get_as::<String>(3).unwrap(), "d");
    }

    #[test]
    fn range_follows_indexing_rules() {
        let t = Tuple::new().with(0).with(1).with(2).with(3);
        assert_eq!(t.range(1, 3), Tuple::new().with(1).with(2));
        assert_eq!(t.range(-2, 4), Tuple::new().with(2).with(3));
        assert_eq!(t.range(2, 2), Tuple::new());
        assert_eq!(t.range(0, 99), t);
    }

    #[test]
    fn negative_indexing_law() {
        let t = Tuple::new().with("x").with(7).with(Element::Nil);
        let count = t.len() as isize;
        for k in 1..=count {
            assert_eq!(t.get(-k).unwrap(), t.get(count - k).unwrap());
        }
    }

    #[test]
    fn first_last_and_empty_failures() {
        let t = Tuple::new().with("x").with(7);
        assert_eq!(t.first::<String>().unwrap(), "x");
        assert_eq!(t.last::<i64>().unwrap(), 7);
        assert!(Tuple::new().first::<i64>().is_err());
        assert!(Tuple::new().last::<i64>().is_err());
    }

    // ── Equality / hashing ───────────────────────────────────────────────────

    #[test]
    fn similar_value_equality() {
        let a = Tuple::new().with(123i32).with("s");
        let b = Tuple::new().with(123i64).with("s");
        assert_eq!(a, b);
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn element_order_matters() {
        assert_ne!(
            Tuple::new().with(1).with(2),
            Tuple::new().with(2).with(1)
        );
    }
}
