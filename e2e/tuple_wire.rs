//! E2E: tuple wire format, byte for byte.
//!
//! Pins the exact encodings other client implementations must agree on:
//! string tagging and termination, zero-byte escaping, and the
//! order-preserving one's-complement integer forms at their width
//! boundaries.  Every pinned encoding is also decoded back.

use ordkey::{Element, Slice, SlicedTuple, Tuple};

fn hex_of(t: &Tuple) -> String {
    t.pack().to_hex()
}

// ─────────────────────────────────────────────────────────────────────────────
// Strings and composites
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn text_element() {
    let t = Tuple::new().with("hello world");
    assert_eq!(hex_of(&t), "0268656c6c6f20776f726c6400");
    assert_eq!(Tuple::unpack(&t.pack()).unwrap(), t);
}

#[test]
fn text_then_small_int() {
    let t = Tuple::new().with("hello world").with(123);
    assert_eq!(hex_of(&t), "0268656c6c6f20776f726c6400157b");
}

#[test]
fn false_rides_the_zero_tag() {
    let t = Tuple::new().with("hello world").with(123).with(false);
    assert_eq!(hex_of(&t), "0268656c6c6f20776f726c6400157b14");
}

#[test]
fn bytes_with_embedded_zero() {
    let t = Tuple::new()
        .with("hello world")
        .with(123)
        .with(false)
        .with(&[0x7B, 0x01, 0x42, 0x00, 0x2A][..]);
    assert_eq!(
        hex_of(&t),
        "0268656c6c6f20776f726c6400157b14017b014200ff2a00"
    );
    assert_eq!(Tuple::unpack(&t.pack()).unwrap(), t);
}

// ─────────────────────────────────────────────────────────────────────────────
// Integer width boundaries
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn int32_extremes() {
    assert_eq!(hex_of(&Tuple::new().with(i32::MAX)), "187fffffff");
    // One's complement of 2^31 over 4 bytes: 2^32 - 1 - 2^31 = 0x7FFFFFFF.
    assert_eq!(hex_of(&Tuple::new().with(i32::MIN)), "107fffffff");
}

#[test]
fn int64_extremes() {
    assert_eq!(hex_of(&Tuple::new().with(i64::MAX)), "1c7fffffffffffffff");
    assert_eq!(hex_of(&Tuple::new().with(i64::MIN)), "0c7fffffffffffffff");
}

#[test]
fn small_negative_widths() {
    assert_eq!(hex_of(&Tuple::new().with(-1)), "13fe");
    assert_eq!(hex_of(&Tuple::new().with(-255)), "1300");
    // |-256| needs two bytes, so the tag drops to 0x12 and the payload is
    // 0xFFFF - 0x0100 = 0xFEFF.
    assert_eq!(hex_of(&Tuple::new().with(-256)), "12feff");
}

#[test]
fn integer_vectors_decode_to_their_values() {
    let cases: &[(&str, i64)] = &[
        ("14", 0),
        ("157b", 123),
        ("13fe", -1),
        ("1300", -255),
        ("12feff", -256),
        ("187fffffff", i64::from(i32::MAX)),
        ("107fffffff", i64::from(i32::MIN)),
        ("1c7fffffffffffffff", i64::MAX),
        ("0c7fffffffffffffff", i64::MIN),
    ];
    for (hex, expected) in cases {
        let t = Tuple::unpack(&Slice::from_hex(hex).unwrap()).unwrap();
        assert_eq!(t.first::<i64>().unwrap(), *expected, "decoding {hex}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lazy view over a pinned encoding
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn sliced_view_reads_the_pinned_composite() {
    let packed =
        Slice::from_hex("0268656c6c6f20776f726c6400157b14017b014200ff2a00").unwrap();
    let t = SlicedTuple::new(packed);
    assert_eq!(t.len().unwrap(), 4);
    assert_eq!(t.get_as::<String>(0).unwrap(), "hello world");
    assert_eq!(t.get_as::<i64>(1).unwrap(), 123);
    assert_eq!(t.get(2).unwrap(), Element::Int(0));
    assert_eq!(
        t.get_as::<Slice>(3).unwrap().as_bytes(),
        &[0x7B, 0x01, 0x42, 0x00, 0x2A]
    );
    // Raw element windows, tag and terminator included.
    assert_eq!(t.get_slice(0).unwrap().to_hex(), "0268656c6c6f20776f726c6400");
    assert_eq!(t.get_slice(3).unwrap().to_hex(), "017b014200ff2a00");
}

#[test]
fn malformed_encodings_are_rejected() {
    for hex in ["42", "15", "02616263", "0161", "1c7fffffffffffff"] {
        let bytes = Slice::from_hex(hex).unwrap();
        assert!(Tuple::unpack(&bytes).is_err(), "expected rejection of {hex}");
    }
}
