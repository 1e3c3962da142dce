//! 32-bit `Word` and 8-bit `Byte` fixed-width arithmetic.
//!
//! This module defines the two numeric primitives that every other subsystem
//! operates on. It provides:
//! 1. **Modular arithmetic:** all operators wrap at the type's width, matching
//!    two's-complement hardware registers rather than Rust's panic-on-overflow
//!    default.
//! 2. **Dual views:** every value can be read as unsigned or as signed
//!    two's-complement, with comparison operators for both.
//! 3. **RISC-V M-extension division:** `div_trunc`/`rem_trunc` reproduce the
//!    RISC-V integer-division corner cases (division by zero, signed overflow)
//!    exactly, since ordinary Rust `/` and `%` panic or differ on these inputs.

use std::fmt;

/// An 8-bit value in `[0, 256)`, used for individual memory cells.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Byte(u8);

impl Byte {
    /// Width in bits.
    pub const WIDTH: u32 = 8;

    /// Creates a new byte from the given unsigned or two's-complement signed value.
    #[inline]
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(value.rem_euclid(1 << Self::WIDTH) as u8)
    }

    /// Returns this value as an unsigned integer.
    #[inline]
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Zero-extends this byte to the width of a word.
    #[inline]
    #[must_use]
    pub fn zero_extend(self) -> Word {
        Word::new(u32::from(self.0))
    }
}

impl From<u8> for Byte {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for Byte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Byte({:#04x})", self.0)
    }
}

/// A 32-bit value used for register contents, addresses, and immediates.
///
/// Every arithmetic operator wraps modulo `2^32`; use [`Word::signed_value`]
/// for a two's-complement interpretation when it matters (shifts, division,
/// ordered comparisons).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Word(u32);

impl Word {
    /// Width in bits.
    pub const WIDTH: u32 = 32;
    /// Width in bytes.
    pub const WIDTH_BYTES: u32 = Self::WIDTH / Byte::WIDTH;

    /// Creates a new word from the given unsigned value, wrapping at the width.
    #[inline]
    #[must_use]
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Creates a new word from a signed value, wrapping at the width.
    #[inline]
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self(value.rem_euclid(1i64 << Self::WIDTH) as u32)
    }

    /// Returns this value as an unsigned integer.
    #[inline]
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Returns this value as a two's-complement signed integer.
    #[inline]
    #[must_use]
    pub fn signed_value(self) -> i32 {
        self.0 as i32
    }

    /// Builds a word from up to [`Word::WIDTH_BYTES`] little-endian bytes,
    /// zero- or sign-extending the missing high bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is empty or longer than [`Word::WIDTH_BYTES`].
    #[must_use]
    pub fn from_some_bytes(bytes: &[Byte], sign_extend: bool) -> Self {
        assert!(
            !bytes.is_empty() && bytes.len() <= Self::WIDTH_BYTES as usize,
            "invalid byte count for word: {}",
            bytes.len()
        );

        let mut value: u32 = 0;
        for b in bytes.iter().rev() {
            value = (value << Byte::WIDTH) | u32::from(b.value());
        }

        if sign_extend {
            let sign_bit = 1u32 << (bytes.len() as u32 * Byte::WIDTH - 1);
            if value & sign_bit != 0 {
                let fill_mask = !0u32 << (bytes.len() as u32 * Byte::WIDTH);
                value |= fill_mask;
            }
        }

        Self(value)
    }

    /// Builds a word from exactly [`Word::WIDTH_BYTES`] little-endian bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes.len() != 4`.
    #[must_use]
    pub fn from_bytes(bytes: &[Byte]) -> Self {
        assert_eq!(bytes.len(), Self::WIDTH_BYTES as usize, "invalid word width");
        Self::from_some_bytes(bytes, false)
    }

    /// Returns the little-endian byte representation of this word.
    #[must_use]
    pub fn as_bytes(self) -> [Byte; 4] {
        [
            Byte::new(i64::from(self.0 & 0xFF)),
            Byte::new(i64::from((self.0 >> 8) & 0xFF)),
            Byte::new(i64::from((self.0 >> 16) & 0xFF)),
            Byte::new(i64::from((self.0 >> 24) & 0xFF)),
        ]
    }

    #[inline]
    #[must_use]
    pub fn wrapping_add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }

    #[inline]
    #[must_use]
    pub fn wrapping_sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }

    #[inline]
    #[must_use]
    pub fn shift_left(self, amount: Self) -> Self {
        Self(self.0.wrapping_shl(amount.0))
    }

    #[inline]
    #[must_use]
    pub fn shift_right_logical(self, amount: Self) -> Self {
        Self(self.0.wrapping_shr(amount.0))
    }

    #[inline]
    #[must_use]
    pub fn shift_right_arithmetic(self, amount: Self) -> Self {
        Self((self.signed_value().wrapping_shr(amount.0)) as u32)
    }

    #[inline]
    #[must_use]
    pub fn unsigned_lt(self, rhs: Self) -> bool {
        self.0 < rhs.0
    }

    #[inline]
    #[must_use]
    pub fn unsigned_le(self, rhs: Self) -> bool {
        self.0 <= rhs.0
    }

    #[inline]
    #[must_use]
    pub fn unsigned_gt(self, rhs: Self) -> bool {
        self.0 > rhs.0
    }

    #[inline]
    #[must_use]
    pub fn unsigned_ge(self, rhs: Self) -> bool {
        self.0 >= rhs.0
    }

    #[inline]
    #[must_use]
    pub fn signed_lt(self, rhs: Self) -> bool {
        self.signed_value() < rhs.signed_value()
    }

    #[inline]
    #[must_use]
    pub fn signed_le(self, rhs: Self) -> bool {
        self.signed_value() <= rhs.signed_value()
    }

    #[inline]
    #[must_use]
    pub fn signed_gt(self, rhs: Self) -> bool {
        self.signed_value() > rhs.signed_value()
    }

    #[inline]
    #[must_use]
    pub fn signed_ge(self, rhs: Self) -> bool {
        self.signed_value() >= rhs.signed_value()
    }
}

impl std::ops::Add for Word {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }
}

impl std::ops::Sub for Word {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }
}

impl std::ops::BitAnd for Word {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl std::ops::BitOr for Word {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitXor for Word {
    type Output = Self;
    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl std::ops::Not for Word {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({:#010x})", self.0)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Divides `a` by `b` truncating toward zero, per RISC-V M-extension semantics.
///
/// Division by zero yields `-1` (all-ones). Signed overflow
/// (`i32::MIN / -1`) yields `i32::MIN` rather than panicking.
#[must_use]
pub fn div_trunc(a: i32, b: i32) -> i32 {
    if b == 0 {
        return -1;
    }
    if a == i32::MIN && b == -1 {
        return i32::MIN;
    }
    a / b
}

/// Computes the remainder of `a / b` truncating toward zero, per RISC-V
/// M-extension semantics.
///
/// Division by zero yields `a` unchanged. Signed overflow
/// (`i32::MIN / -1`) yields `0`.
#[must_use]
pub fn rem_trunc(a: i32, b: i32) -> i32 {
    if b == 0 {
        return a;
    }
    if a == i32::MIN && b == -1 {
        return 0;
    }
    a % b
}
