//! Filepath: src/key.rs
//!
//! Key ordering for the trees.
//!
//! Keys are opaque byte sequences. Two keys are "equal" exactly when the
//! comparator returns [`Ordering::Equal`]; the trees never look at key bytes
//! any other way.
//!
//! # Ordering Rule
//!
//! ```text
//! 1. Walk both sequences from index 0
//! 2. First mismatching byte decides (smaller byte is Less)
//! 3. No mismatch over the shared prefix: shorter sequence is Less
//! 4. Same length, same bytes: Equal
//! ```
//!
//! [`Lexicographic`] applies the rule to bytes as unsigned `0..=255`.
//! [`SignedLexicographic`] applies it to bytes reinterpreted as `i8`, for
//! data that was already ordered that way by another system.

use std::cmp::Ordering;

// ============================================================================
//  KeyComparator
// ============================================================================

/// A total order over byte-sequence keys.
///
/// Implementations must be pure: the same pair of inputs always produces the
/// same result, no matter which thread asks or how often. Trees call the
/// comparator concurrently and without synchronization.
pub trait KeyComparator: Send + Sync {
    /// Compare `a` against `b`.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Any `Fn(&[u8], &[u8]) -> Ordering` closure is a comparator.
impl<F> KeyComparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync,
{
    #[inline(always)]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self(a, b)
    }
}

// ============================================================================
//  Lexicographic (unsigned)
// ============================================================================

/// Unsigned byte-wise lexicographic order with shorter-is-less tie-break.
///
/// This is the default comparator of every tree in the crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Lexicographic;

impl KeyComparator for Lexicographic {
    #[inline(always)]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        compare_keys(a, b)
    }
}

/// Compare two keys under the default (unsigned) ordering rule.
///
/// # Example
///
/// ```rust
/// use std::cmp::Ordering;
/// use bytetree::compare_keys;
///
/// assert_eq!(compare_keys(&[1, 2, 3], &[1, 2]), Ordering::Greater);
/// assert_eq!(compare_keys(&[], &[0]), Ordering::Less);
/// assert_eq!(compare_keys(&[0xFE], &[0x02]), Ordering::Greater);
/// ```
#[must_use]
#[inline(always)]
pub fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    // `[u8]` already orders this way: bytewise, then by length.
    a.cmp(b)
}

// ============================================================================
//  SignedLexicographic
// ============================================================================

/// Byte-wise lexicographic order treating each byte as a signed `i8`.
///
/// `0x80..=0xFF` sort before `0x00..=0x7F`. Length tie-break is the same as
/// [`Lexicographic`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SignedLexicographic;

impl KeyComparator for SignedLexicographic {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        #[expect(clippy::cast_possible_wrap, reason = "reinterpreting bytes as i8")]
        let mismatch: Option<Ordering> = a
            .iter()
            .zip(b)
            .map(|(&x, &y)| (x as i8).cmp(&(y as i8)))
            .find(|ord| ord.is_ne());

        mismatch.unwrap_or_else(|| a.len().cmp(&b.len()))
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[expect(clippy::cast_sign_loss, reason = "building signed test bytes")]
    fn signed(bytes: &[i8]) -> Vec<u8> {
        bytes.iter().map(|&b| b as u8).collect()
    }

    #[test]
    fn test_longer_with_shared_prefix_is_greater() {
        let a = [1u8, 2, 3, 4, 5, 6];
        let b = [1u8, 2, 3, 4, 5];

        assert_eq!(compare_keys(&a, &b), Ordering::Greater);
        assert_eq!(compare_keys(&b, &a), Ordering::Less);
        assert_eq!(SignedLexicographic.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_identical_is_equal() {
        let a = [1u8, 2, 3, 4, 5];
        let b = [1u8, 2, 3, 4, 5];

        assert_eq!(compare_keys(&a, &b), Ordering::Equal);
        assert_eq!(SignedLexicographic.compare(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_negative_byte_signed_vs_unsigned() {
        let a = signed(&[1, -2, 3, 4, 5]);
        let b = signed(&[1, 2, 3, 4, 5]);

        // -2 < 2 as i8
        assert_eq!(SignedLexicographic.compare(&a, &b), Ordering::Less);
        // 0xFE > 0x02 as u8
        assert_eq!(Lexicographic.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_empty_key_is_least() {
        assert_eq!(compare_keys(&[], &[]), Ordering::Equal);
        assert_eq!(compare_keys(&[], &[0]), Ordering::Less);
        assert_eq!(compare_keys(&[0], &[]), Ordering::Greater);
        assert_eq!(SignedLexicographic.compare(&[], &[0x80]), Ordering::Less);
    }

    #[test]
    fn test_first_mismatch_decides() {
        assert_eq!(compare_keys(b"abz", b"acaaaa"), Ordering::Less);
        assert_eq!(compare_keys(b"b", b"abcdef"), Ordering::Greater);
    }

    #[test]
    fn test_closure_comparator() {
        let reversed = |a: &[u8], b: &[u8]| b.cmp(a);

        assert_eq!(reversed.compare(b"a", b"b"), Ordering::Greater);
        assert_eq!(KeyComparator::compare(&reversed, b"same", b"same"), Ordering::Equal);
    }
}
