//! Property-based laws over `Word`/`Byte` arithmetic and the RISC-V
//! M-extension division helpers, beyond the fixed examples already covered
//! by the module's own inline tests.

use proptest::prelude::*;
use rvsim_core::word::{div_trunc, rem_trunc, Byte, Word};

proptest! {
    #[test]
    fn word_byte_round_trip(value: u32) {
        let w = Word::new(value);
        prop_assert_eq!(Word::from_bytes(&w.as_bytes()), w);
    }

    #[test]
    fn byte_zero_extend_never_sets_high_bits(value: u8) {
        let extended = Byte::from(value).zero_extend();
        prop_assert_eq!(extended.value() >> 8, 0);
    }

    #[test]
    fn unsigned_comparisons_agree_with_native_u32(a: u32, b: u32) {
        let (wa, wb) = (Word::new(a), Word::new(b));
        prop_assert_eq!(wa.unsigned_lt(wb), a < b);
        prop_assert_eq!(wa.unsigned_le(wb), a <= b);
        prop_assert_eq!(wa.unsigned_gt(wb), a > b);
        prop_assert_eq!(wa.unsigned_ge(wb), a >= b);
    }

    #[test]
    fn signed_comparisons_agree_with_native_i32(a: i32, b: i32) {
        let (wa, wb) = (Word::new(a as u32), Word::new(b as u32));
        prop_assert_eq!(wa.signed_lt(wb), a < b);
        prop_assert_eq!(wa.signed_le(wb), a <= b);
        prop_assert_eq!(wa.signed_gt(wb), a > b);
        prop_assert_eq!(wa.signed_ge(wb), a >= b);
    }

    #[test]
    fn div_trunc_matches_native_division_away_from_edge_cases(
        a in any::<i32>(), b in any::<i32>().prop_filter("nonzero, not the overflow pair", |&b| b != 0)
    ) {
        prop_assume!(!(a == i32::MIN && b == -1));
        prop_assert_eq!(div_trunc(a, b), a / b);
        prop_assert_eq!(rem_trunc(a, b), a % b);
    }

    #[test]
    fn div_trunc_is_always_defined(a: i32, b: i32) {
        // Must never panic, unlike Rust's native `/`/`%` on these same inputs.
        let _ = div_trunc(a, b);
        let _ = rem_trunc(a, b);
    }

    #[test]
    fn wrapping_add_matches_native_wrapping_u32(a: u32, b: u32) {
        prop_assert_eq!(Word::new(a).wrapping_add(Word::new(b)), Word::new(a.wrapping_add(b)));
    }
}
