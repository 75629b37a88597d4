//! Common types for the Anvil code generator.

use core::fmt::{self, Debug, Display, Formatter};

/// The type of an SSA value.
///
/// A type is encoded in a single byte. Scalar types occupy the lane-code
/// range `0x70..=0x7C`; a vector type is its lane code plus
/// `log2(lane_count) << 4`, which places all vectors at `0x80` and above.
/// The lane count is always a power of two, and the vector types used by
/// this crate never exceed 256 bits.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Type(u8);

/// An invalid type, used as a placeholder where no value is produced.
pub const INVALID: Type = Type(0);

// Scalar lane codes.

/// An integer type with 8 bits.
pub const I8: Type = Type(0x74);

/// An integer type with 16 bits.
pub const I16: Type = Type(0x75);

/// An integer type with 32 bits.
pub const I32: Type = Type(0x76);

/// An integer type with 64 bits.
pub const I64: Type = Type(0x77);

/// An integer type with 128 bits.
pub const I128: Type = Type(0x78);

/// A 32-bit floating point type represented in the IEEE 754-2008 *binary32*
/// interchange format.
pub const F32: Type = Type(0x7A);

/// A 64-bit floating point type represented in the IEEE 754-2008 *binary64*
/// interchange format.
pub const F64: Type = Type(0x7B);

/// A 128-bit floating point type represented in the IEEE 754-2008
/// *binary128* interchange format.
pub const F128: Type = Type(0x7C);

const LANE_BASE: u8 = 0x70;
const VECTOR_BASE: u8 = 0x80;

impl Type {
    /// Get the lane type of this SSA value type.
    ///
    /// A scalar type is its own lane type.
    pub fn lane_type(self) -> Self {
        if self.0 < VECTOR_BASE {
            self
        } else {
            Self(LANE_BASE | (self.0 & 0x0f))
        }
    }

    /// Get log_2 of the number of lanes in this SIMD vector type.
    ///
    /// All SIMD types have a lane count that is a power of two and no larger
    /// than 256, so this will be a number in the range 0-8.
    ///
    /// A scalar type is the same as a SIMD vector type with one lane, so it
    /// returns 0.
    pub fn log2_lane_count(self) -> u32 {
        u32::from(self.0.saturating_sub(LANE_BASE)) >> 4
    }

    /// Get the number of lanes in this SIMD vector type.
    ///
    /// A scalar type is the same as a SIMD vector type with one lane, so it
    /// returns 1.
    pub fn lane_count(self) -> u32 {
        1 << self.log2_lane_count()
    }

    /// Get the number of bits in a lane.
    pub fn lane_bits(self) -> u32 {
        match self.lane_type() {
            I8 => 8,
            I16 => 16,
            I32 | F32 => 32,
            I64 | F64 => 64,
            I128 | F128 => 128,
            _ => 0,
        }
    }

    /// Get the total number of bits used to represent this type.
    pub fn bits(self) -> u32 {
        self.lane_bits() * self.lane_count()
    }

    /// Get the number of bytes used to store this type in memory.
    pub fn bytes(self) -> u32 {
        (self.bits() + 7) / 8
    }

    /// Is this the INVALID type?
    pub fn is_invalid(self) -> bool {
        self == INVALID
    }

    /// Is this a scalar integer type?
    pub fn is_int(self) -> bool {
        !self.is_vector() && matches!(self, I8 | I16 | I32 | I64 | I128)
    }

    /// Is this a scalar floating point type?
    pub fn is_float(self) -> bool {
        !self.is_vector() && matches!(self, F32 | F64 | F128)
    }

    /// Is this a SIMD vector type with more than one lane?
    pub fn is_vector(self) -> bool {
        self.0 >= VECTOR_BASE
    }

    /// Get a SIMD vector type with `n` times more lanes than this one.
    ///
    /// If this is a scalar type, this produces a SIMD type with this as a
    /// lane type and `n` lanes.
    ///
    /// If this is already a SIMD vector type, this produces a SIMD vector
    /// type with `n * self.lane_count()` lanes.
    pub fn by(self, n: u32) -> Option<Self> {
        if self.lane_bits() == 0 || !n.is_power_of_two() {
            return None;
        }
        let log2_lanes: u32 = n.trailing_zeros();
        let new_type = u32::from(self.0) + (log2_lanes << 4);
        if new_type < 0x100 && (new_type as u8 | LANE_BASE) >= VECTOR_BASE {
            let t = Self(new_type as u8);
            if t.bits() <= 256 {
                return Some(t);
            }
        }
        None
    }

    /// Index of this type, for use with tables of type-specific data.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Get an integer type with the requested number of bits.
    pub fn int(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(I8),
            16 => Some(I16),
            32 => Some(I32),
            64 => Some(I64),
            128 => Some(I128),
            _ => None,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.is_int() {
            write!(f, "i{}", self.lane_bits())
        } else if self.is_float() {
            write!(f, "f{}", self.lane_bits())
        } else if self.is_vector() {
            write!(f, "{}x{}", self.lane_type(), self.lane_count())
        } else {
            f.write_str("invalid")
        }
    }
}

impl Debug for Type {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.is_int() {
            write!(f, "types::I{}", self.lane_bits())
        } else if self.is_float() {
            write!(f, "types::F{}", self.lane_bits())
        } else if self.is_vector() {
            write!(f, "{:?}X{}", self.lane_type(), self.lane_count())
        } else {
            write!(f, "types::INVALID")
        }
    }
}

impl Default for Type {
    fn default() -> Self {
        INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_scalars() {
        assert_eq!(I8.bits(), 8);
        assert_eq!(I16.bits(), 16);
        assert_eq!(I32.bits(), 32);
        assert_eq!(I64.bits(), 64);
        assert_eq!(I128.bits(), 128);
        assert_eq!(F32.bits(), 32);
        assert_eq!(F64.bits(), 64);
        assert_eq!(F128.bits(), 128);
        assert_eq!(I32.bytes(), 4);
        assert_eq!(I64.lane_count(), 1);
        assert_eq!(F64.lane_type(), F64);
        assert!(I64.is_int() && !I64.is_float() && !I64.is_vector());
        assert!(F32.is_float() && !F32.is_int());
    }

    #[test]
    fn vectors() {
        let i32x4 = I32.by(4).unwrap();
        assert!(i32x4.is_vector());
        assert_eq!(i32x4.lane_type(), I32);
        assert_eq!(i32x4.lane_count(), 4);
        assert_eq!(i32x4.bits(), 128);
        assert_eq!(i32x4.to_string(), "i32x4");

        // 256-bit limit.
        assert_eq!(I32.by(8).map(|t| t.bits()), Some(256));
        assert_eq!(I64.by(8), None);
        assert_eq!(I32.by(3), None);
    }

    #[test]
    fn lane_code_layout() {
        // Scalars occupy 0x70..=0x7C; vectors start at 0x80 and encode
        // log2(lane_count) in the high nibble above the lane code.
        assert_eq!(I8.index(), 0x74);
        assert_eq!(I128.index(), 0x78);
        assert_eq!(F128.index(), 0x7C);
        let f32x2 = F32.by(2).unwrap();
        assert_eq!(f32x2.index(), 0x7A + (1 << 4));
    }

    #[test]
    fn display_and_debug() {
        assert_eq!(I64.to_string(), "i64");
        assert_eq!(F32.to_string(), "f32");
        assert_eq!(format!("{:?}", I8), "types::I8");
    }
}
