//! Immediate operands for Anvil IR instructions.
//!
//! Each type here is a simple wrapper around a bit pattern. Floating point
//! immediates in particular are kept as bits all the way through the
//! pipeline so that NaN payloads survive unchanged.

use core::fmt::{self, Display, Formatter};

/// A 64-bit immediate signed integer operand.
///
/// An `Imm64` operand can also be used to represent immediate values of
/// smaller integer types by sign-extending to `i64`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Imm64(i64);

impl Imm64 {
    /// Create a new `Imm64` representing the signed number `x`.
    pub fn new(x: i64) -> Self {
        Self(x)
    }

    /// Return self negated.
    pub fn wrapping_neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }

    /// Returns the value of this immediate.
    pub fn bits(self) -> i64 {
        self.0
    }

    /// Sign extend this immediate as if it were a signed integer of the
    /// given width.
    pub fn sign_extend_from_width(self, bit_width: u32) -> Self {
        debug_assert!(bit_width.is_power_of_two());
        if bit_width >= 64 {
            return self;
        }
        let bit_width = i64::from(bit_width);
        let delta = 64 - bit_width;
        let sign_extended = (self.0 << delta) >> delta;
        Self(sign_extended)
    }
}

impl From<Imm64> for i64 {
    fn from(val: Imm64) -> i64 {
        val.0
    }
}

impl From<i64> for Imm64 {
    fn from(x: i64) -> Self {
        Self(x)
    }
}

impl Display for Imm64 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let x = self.0;
        if -10_000 < x && x < 10_000 {
            // Use decimal for small numbers.
            write!(f, "{x}")
        } else {
            write!(f, "0x{:x}", x as u64)
        }
    }
}

/// An 8-bit unsigned integer immediate operand, used for lane indexes and
/// small shift amounts.
pub type Uimm8 = u8;

/// A 32-bit signed address offset, used by load/store instructions.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Default)]
pub struct Offset32(i32);

impl Offset32 {
    /// Create a new `Offset32` representing the signed number `x`.
    pub fn new(x: i32) -> Self {
        Self(x)
    }

    /// Create a new `Offset32` representing the signed number `x` if
    /// possible.
    pub fn try_from_i64(x: i64) -> Option<Self> {
        i32::try_from(x).ok().map(Self::new)
    }

    /// Add in the signed number `x` if possible.
    pub fn try_add_i64(self, x: i64) -> Option<Self> {
        let total = i64::from(self.0).checked_add(x)?;
        Self::try_from_i64(total)
    }
}

impl From<Offset32> for i32 {
    fn from(val: Offset32) -> i32 {
        val.0
    }
}

impl From<Offset32> for i64 {
    fn from(val: Offset32) -> i64 {
        i64::from(val.0)
    }
}

impl From<i32> for Offset32 {
    fn from(x: i32) -> Self {
        Self(x)
    }
}

impl Display for Offset32 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.0 == 0 {
            return Ok(());
        }
        if self.0 < 0 {
            write!(f, "-{}", -i64::from(self.0))
        } else {
            write!(f, "+{}", self.0)
        }
    }
}

/// An IEEE binary32 immediate floating point value, represented as a u32
/// containing the bit pattern.
///
/// We specifically avoid using a f32 here since some architectures may
/// silently alter floats. All bit patterns are allowed.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Ieee32(u32);

impl Ieee32 {
    /// Create a new `Ieee32` containing the bits of `x`.
    pub fn with_bits(x: u32) -> Self {
        Self(x)
    }

    /// Create an `Ieee32` number representing `x`.
    pub fn with_float(x: f32) -> Self {
        Self(x.to_bits())
    }

    /// Get the bitwise representation.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Converts to an `f32` value.
    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.0)
    }
}

impl Display for Ieee32 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// An IEEE binary64 immediate floating point value, represented as a u64
/// containing the bit pattern.
///
/// All bit patterns are allowed.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Ieee64(u64);

impl Ieee64 {
    /// Create a new `Ieee64` containing the bits of `x`.
    pub fn with_bits(x: u64) -> Self {
        Self(x)
    }

    /// Create an `Ieee64` number representing `x`.
    pub fn with_float(x: f64) -> Self {
        Self(x.to_bits())
    }

    /// Get the bitwise representation.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Converts to an `f64` value.
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl Display for Ieee64 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imm64_sign_extension() {
        assert_eq!(Imm64::new(0xff).sign_extend_from_width(8).bits(), -1);
        assert_eq!(Imm64::new(0x7f).sign_extend_from_width(8).bits(), 0x7f);
        assert_eq!(
            Imm64::new(0xffff_ffff).sign_extend_from_width(32).bits(),
            -1
        );
        assert_eq!(Imm64::new(-5).sign_extend_from_width(64).bits(), -5);
    }

    #[test]
    fn float_bits_round_trip() {
        let nan = Ieee32::with_bits(0x7fc0_0001);
        assert_eq!(nan.bits(), 0x7fc0_0001);
        assert_eq!(Ieee64::with_float(1.0).bits(), 0x3ff0_0000_0000_0000);
        assert_eq!(Ieee32::with_float(1.0).bits(), 0x3f80_0000);
    }

    #[test]
    fn offset_display() {
        assert_eq!(Offset32::new(0).to_string(), "");
        assert_eq!(Offset32::new(12).to_string(), "+12");
        assert_eq!(Offset32::new(-4).to_string(), "-4");
        assert_eq!(Offset32::new(i32::MIN).to_string(), "-2147483648");
    }
}
