//! E2E: slice interchange forms and comparison laws.
//!
//! Round-trips every textual form over awkward byte strings, and checks
//! the equality/ordering/hash laws that keep stored keys consistent
//! across client implementations.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use ordkey::Slice;

fn awkward_inputs() -> Vec<Vec<u8>> {
    vec![
        vec![],
        vec![0x00],
        vec![0xFF],
        vec![0x00, 0xFF, 0x00],
        b"hello world".to_vec(),
        b"<angle<brackets>>".to_vec(),
        (0u8..=255).collect(),
        vec![0x7F; 3],
        b"A\x00<".to_vec(),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Round trips
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn escape_hex_base64_round_trip() -> anyhow::Result<()> {
    for bytes in awkward_inputs() {
        let s = Slice::from_vec(bytes);
        assert_eq!(Slice::unescape(&s.escape())?, s);
        assert_eq!(Slice::from_hex(&s.to_hex())?, s);
        assert_eq!(Slice::from_base64(&s.to_base64())?, s);
    }
    Ok(())
}

#[test]
fn hex_output_is_lowercase() {
    let s = Slice::copy_of(&[0xAB, 0xCD, 0x0F]);
    assert_eq!(s.to_hex(), "abcd0f");
    assert!(s.to_hex().chars().all(|c| !c.is_ascii_uppercase()));
}

#[test]
fn pinned_escape_rendering() {
    // "A" ++ 0x00 ++ "<"
    let s = Slice::from_vec(vec![b'A', 0x00, b'<']);
    assert_eq!(s.escape(), "A<00><3C>");
    assert_eq!(Slice::unescape("A<00><3C>").unwrap(), s);
    // Malformed escapes fail rather than guessing.
    assert!(Slice::unescape("A<00").is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Comparison laws
// ─────────────────────────────────────────────────────────────────────────────

fn law_samples() -> Vec<Slice> {
    let mut out = vec![Slice::nil(), Slice::empty()];
    out.extend(awkward_inputs().into_iter().map(Slice::from_vec));
    out.push(Slice::copy_of(b"hello"));
    out.push(Slice::copy_of(b"hello world extended"));
    out
}

#[test]
fn compare_agrees_with_unsigned_lexicographic_bytes() {
    for a in law_samples() {
        for b in law_samples() {
            if a.has_value() && b.has_value() {
                assert_eq!(a.cmp(&b), a.as_bytes().cmp(b.as_bytes()));
            }
        }
    }
}

#[test]
fn compare_is_a_total_order() {
    let samples = law_samples();
    for a in &samples {
        for b in &samples {
            assert_eq!(a.cmp(b), b.cmp(a).reverse());
            for c in &samples {
                if a.cmp(b) == b.cmp(c) {
                    assert_eq!(a.cmp(c), a.cmp(b));
                }
            }
        }
    }
}

#[test]
fn equality_implies_equal_hashes() {
    fn hash_of(s: &Slice) -> u64 {
        let mut h = DefaultHasher::new();
        s.hash(&mut h);
        h.finish()
    }
    let samples = law_samples();
    for a in &samples {
        assert_eq!(a, a); // reflexive
        for b in &samples {
            assert_eq!(a == b, b == a); // symmetric
            if a == b {
                assert_eq!(hash_of(a), hash_of(b));
                assert_eq!(a.fnv32(), b.fnv32());
            }
        }
    }
}

#[test]
fn windows_compare_by_content_not_identity() {
    let backing = Slice::copy_of(b"xxhelloxx");
    let window = backing.substring_len(2, 5).unwrap();
    let fresh = Slice::copy_of(b"hello");
    assert_eq!(window, fresh);
    assert_eq!(window.cmp(&fresh), std::cmp::Ordering::Equal);
    assert_eq!(window.fnv32(), fresh.fnv32());
    // Detaching the window changes nothing observable.
    assert_eq!(window.memoize(), fresh);
}
