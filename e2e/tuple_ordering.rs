//! E2E: order preservation and round-trip laws over a diverse sample set.
//!
//! The codec's defining property: for any two supported tuples,
//! `pack(a) < pack(b)` bytewise exactly when `a < b` element-wise.  The
//! sample set crosses kinds, widths, shared prefixes, embedded zeros, and
//! the signed integer extremes.

use ordkey::{Element, Slice, Tuple};

fn samples() -> Vec<Tuple> {
    let mut out = vec![
        Tuple::new(),
        Tuple::new().with(Element::Nil),
        Tuple::new().with(Element::Nil).with(Element::Nil),
        Tuple::new().with(&[][..]),
        Tuple::new().with(&[0x00][..]),
        Tuple::new().with(&[0x00, 0x00][..]),
        Tuple::new().with(&[0x00, 0x01][..]),
        Tuple::new().with(&[0x01][..]),
        Tuple::new().with(&[0xFF][..]),
        Tuple::new().with(""),
        Tuple::new().with("\u{0}"),
        Tuple::new().with("a"),
        Tuple::new().with("a").with(Element::Nil),
        Tuple::new().with("a").with(&[0x00][..]),
        Tuple::new().with("a").with("b"),
        Tuple::new().with("a").with(i64::MIN),
        Tuple::new().with("a").with(-1),
        Tuple::new().with("a").with(0),
        Tuple::new().with("a").with(1),
        Tuple::new().with("a").with(i64::MAX),
        Tuple::new().with("ab"),
        Tuple::new().with("b"),
        Tuple::new().with("hello world").with(123).with(false),
    ];
    let ints: &[i64] = &[
        i64::MIN,
        i64::MIN + 1,
        -4_294_967_296,
        i64::from(i32::MIN),
        -65_536,
        -256,
        -255,
        -1,
        0,
        1,
        255,
        256,
        65_535,
        65_536,
        i64::from(i32::MAX),
        4_294_967_296,
        i64::MAX - 1,
        i64::MAX,
    ];
    out.extend(ints.iter().map(|&v| Tuple::new().with(v)));
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// The order-preservation law
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn pack_order_agrees_with_tuple_order_on_all_pairs() {
    let tuples = samples();
    let packed: Vec<Slice> = tuples.iter().map(Tuple::pack).collect();
    for i in 0..tuples.len() {
        for j in 0..tuples.len() {
            assert_eq!(
                tuples[i].cmp(&tuples[j]),
                packed[i].cmp(&packed[j]),
                "order disagreement between {:?} and {:?}",
                tuples[i],
                tuples[j],
            );
        }
    }
}

#[test]
fn packed_comparison_is_antisymmetric_and_transitive() {
    let packed: Vec<Slice> = samples().iter().map(Tuple::pack).collect();
    for a in &packed {
        for b in &packed {
            assert_eq!(a.cmp(b), b.cmp(a).reverse());
            for c in &packed {
                if a.cmp(b) == b.cmp(c) {
                    assert_eq!(a.cmp(c), a.cmp(b), "transitivity violated");
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Round trips and indexing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn every_sample_round_trips() {
    for t in samples() {
        let packed = t.pack();
        assert_eq!(Tuple::unpack(&packed).unwrap(), t, "round-tripping {t:?}");
        // Through the lazy view as well.
        let sliced = t.to_sliced();
        assert_eq!(sliced.to_tuple().unwrap(), t);
        assert_eq!(sliced.len().unwrap(), t.len());
    }
}

#[test]
fn negative_indexing_agrees_with_forward_indexing() {
    for t in samples() {
        let sliced = t.to_sliced();
        let count = t.len() as isize;
        for k in 1..=count {
            assert_eq!(t.get(-k).unwrap(), t.get(count - k).unwrap());
            assert_eq!(sliced.get(-k).unwrap(), sliced.get(count - k).unwrap());
        }
    }
}

#[test]
fn equal_tuples_pack_identically() {
    let tuples = samples();
    for a in &tuples {
        for b in &tuples {
            if a == b {
                assert_eq!(a.pack(), b.pack());
            }
        }
    }
}
