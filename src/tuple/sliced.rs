//! Lazy tuple view over an encoded slice.
//!
//! A [`SlicedTuple`] keeps the packed bytes and an index of element start
//! offsets; payloads are decoded only when asked.  The index is a flat
//! array built exactly once, on the first size-or-element call: the view
//! goes from "unindexed" to "indexed" and is immutable thereafter, so it
//! may be shared freely across threads.

use std::sync::OnceLock;

use crate::slice::Slice;

use super::pack::TupleWriter;
use super::types::{resolve_index, Element, FromElement, TupleError};
use super::unpack::{decode_element, element_end};
use super::Tuple;

type Index = Result<Box<[usize]>, TupleError>;

/// A tuple that has not been decoded: the encoded slice plus a lazily built
/// boundary index.  `index[i]..index[i + 1]` spans exactly the encoding of
/// element `i`; the boundaries partition the slice with no trailing bytes.
#[derive(Debug, Clone, Default)]
pub struct SlicedTuple {
    data: Slice,
    index: OnceLock<Index>,
}

impl SlicedTuple {
    /// Wraps an encoded slice without validating it.  Malformed bytes are
    /// reported by the first call that needs the index.
    pub fn new(data: Slice) -> SlicedTuple {
        SlicedTuple { data, index: OnceLock::new() }
    }

    /// The canonical empty tuple.
    pub fn empty() -> SlicedTuple {
        SlicedTuple::new(Slice::empty())
    }

    /// The raw encoded bytes of the whole tuple.
    #[inline]
    pub fn packed(&self) -> &Slice {
        &self.data
    }

    /// Hands the encoded bytes back out.
    pub fn into_slice(self) -> Slice {
        self.data
    }

    /// Walks the encoding once and caches the element boundaries.  The walk
    /// is idempotent; a malformed encoding is memoized as the error every
    /// later call reports.
    fn index(&self) -> Result<&[usize], TupleError> {
        let built = self.index.get_or_init(|| {
            let bytes = self.data.as_bytes();
            let mut offsets = vec![0usize];
            let mut pos = 0;
            while pos < bytes.len() {
                pos = element_end(bytes, pos)?;
                offsets.push(pos);
            }
            Ok(offsets.into_boxed_slice())
        });
        match built {
            Ok(offsets) => Ok(offsets),
            Err(e) => Err(e.clone()),
        }
    }

    /// Number of elements.  First call indexes the slice.
    pub fn len(&self) -> Result<usize, TupleError> {
        Ok(self.index()?.len() - 1)
    }

    pub fn is_empty(&self) -> Result<bool, TupleError> {
        Ok(self.len()? == 0)
    }

    /// Byte span of element `index` (already resolved to a forward index).
    fn span(&self, i: usize) -> Result<(usize, usize), TupleError> {
        let offsets = self.index()?;
        Ok((offsets[i], offsets[i + 1]))
    }

    /// Decodes element `index`.  Negative indices count from the end.
    pub fn get(&self, index: isize) -> Result<Element, TupleError> {
        let i = resolve_index(index, self.len()?)?;
        let (start, _) = self.span(i)?;
        let (element, _) = decode_element(self.data.as_bytes(), start)?;
        Ok(element)
    }

    /// The raw encoded bytes of element `index`, tag and terminator
    /// included, as a zero-copy window into the packed slice.
    pub fn get_slice(&self, index: isize) -> Result<Slice, TupleError> {
        let i = resolve_index(index, self.len()?)?;
        let (start, end) = self.span(i)?;
        let window = self
            .data
            .substring_len(start, end - start)
            .expect("index offsets lie inside the packed slice");
        Ok(window)
    }

    /// Decodes element `index` and coerces it to `T`.
    pub fn get_as<T: FromElement>(&self, index: isize) -> Result<T, TupleError> {
        T::from_element(&self.get(index)?)
    }

    /// Coerced first element; fails on an empty tuple.
    pub fn first<T: FromElement>(&self) -> Result<T, TupleError> {
        self.get_as(0)
    }

    /// Coerced last element; fails on an empty tuple.
    pub fn last<T: FromElement>(&self) -> Result<T, TupleError> {
        self.get_as(-1)
    }

    // ── Structural operations ────────────────────────────────────────────────

    /// Returns a tuple holding this tuple's elements plus `element`, without
    /// re-encoding the prefix: the packed bytes are spliced as-is and only
    /// the new element is encoded.
    pub fn append(&self, element: impl Into<Element>) -> SlicedTuple {
        let mut w = TupleWriter::with_capacity(self.data.len() + 8);
        w.write_raw(self.data.as_bytes());
        w.write_element(&element.into());
        SlicedTuple::new(w.into_slice())
    }

    /// Concatenates two encoded tuples bytewise.
    pub fn concat(&self, other: &SlicedTuple) -> SlicedTuple {
        SlicedTuple::new(self.data.concat(other.packed()))
    }

    /// The sub-range `[from, to)` of elements as a zero-copy window over the
    /// same encoding.  Negative bounds count from the end; bounds are
    /// clamped to the tuple.  An empty range yields the canonical empty
    /// tuple; the full range returns the same packed bytes.
    pub fn range(&self, from: isize, to: isize) -> Result<SlicedTuple, TupleError> {
        let count = self.len()?;
        let clamp = |bound: isize| -> usize {
            let b = if bound < 0 { bound + count as isize } else { bound };
            b.clamp(0, count as isize) as usize
        };
        let (lo, hi) = (clamp(from), clamp(to));
        if lo >= hi {
            return Ok(SlicedTuple::empty());
        }
        let offsets = self.index()?;
        let window = self
            .data
            .substring_len(offsets[lo], offsets[hi] - offsets[lo])
            .expect("index offsets lie inside the packed slice");
        Ok(SlicedTuple::new(window))
    }

    /// Materializes every element into a constructed [`Tuple`].
    pub fn to_tuple(&self) -> Result<Tuple, TupleError> {
        let count = self.len()?;
        let mut elements = Vec::with_capacity(count);
        for i in 0..count {
            let (start, _) = self.span(i)?;
            let (element, _) = decode_element(self.data.as_bytes(), start)?;
            elements.push(element);
        }
        Ok(Tuple::from_elements(elements))
    }
}

impl From<Tuple> for SlicedTuple {
    fn from(tuple: Tuple) -> SlicedTuple {
        SlicedTuple::new(tuple.pack())
    }
}

impl PartialEq for SlicedTuple {
    /// Bytewise equality of the packed form.  The writer is canonical, so
    /// for encodings this crate produced this coincides with structural
    /// equality of the decoded tuples.
    fn eq(&self, other: &SlicedTuple) -> bool {
        self.data.as_bytes() == other.data.as_bytes()
    }
}

impl Eq for SlicedTuple {}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
