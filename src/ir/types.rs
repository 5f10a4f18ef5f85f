//! Primitive value types and target properties.
//!
//! [`VarType`] is the static type carried by every IR node and local. The
//! assertion engine mostly cares about four questions: is the type small
//! (needs normalization), floating (NaN-sensitive), integral (eligible for
//! subrange facts), and what range of values can it represent.

use std::fmt;

use strum::{EnumCount, EnumIter};

/// Static type of an IR value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum VarType {
    /// Not yet typed.
    Undef,
    /// No value.
    Void,
    /// Boolean (0 or 1), stored in a byte.
    Bool,
    /// Signed 8-bit integer.
    Byte,
    /// Unsigned 8-bit integer.
    UByte,
    /// Signed 16-bit integer.
    Short,
    /// Unsigned 16-bit integer.
    UShort,
    /// UTF-16 code unit.
    Char,
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    UInt,
    /// Signed 64-bit integer.
    Long,
    /// Unsigned 64-bit integer.
    ULong,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// Managed object reference.
    Ref,
    /// Managed interior pointer.
    ByRef,
    /// Value type aggregate.
    Struct,
}

impl VarType {
    /// Size of a value of this type in bytes on the given target.
    #[must_use]
    pub const fn size(self, target: Target) -> usize {
        match self {
            Self::Undef | Self::Void => 0,
            Self::Bool | Self::Byte | Self::UByte => 1,
            Self::Short | Self::UShort | Self::Char => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Long | Self::ULong | Self::Double => 8,
            Self::Ref | Self::ByRef => target.pointer_size(),
            Self::Struct => 0,
        }
    }

    /// Returns `true` for types narrower than 32 bits.
    #[must_use]
    pub const fn is_small(self) -> bool {
        matches!(
            self,
            Self::Bool | Self::Byte | Self::UByte | Self::Short | Self::UShort | Self::Char
        )
    }

    /// Returns `true` for `Float` and `Double`.
    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Returns `true` for all integer types including `Bool` and `Char`.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Byte
                | Self::UByte
                | Self::Short
                | Self::UShort
                | Self::Char
                | Self::Int
                | Self::UInt
                | Self::Long
                | Self::ULong
        )
    }

    /// Returns `true` for the 64-bit integer types.
    #[must_use]
    pub const fn is_long(self) -> bool {
        matches!(self, Self::Long | Self::ULong)
    }

    /// Returns `true` for garbage-collected pointer types.
    #[must_use]
    pub const fn is_gc(self) -> bool {
        matches!(self, Self::Ref | Self::ByRef)
    }

    /// Returns `true` for unsigned integer types.
    #[must_use]
    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            Self::Bool | Self::UByte | Self::UShort | Self::Char | Self::UInt | Self::ULong
        )
    }

    /// The type a value of this type has once loaded onto the evaluation stack.
    ///
    /// Small integers widen to `Int`, unsigned 32/64-bit integers collapse to
    /// their signed counterparts.
    #[must_use]
    pub const fn actual(self) -> Self {
        match self {
            Self::Bool
            | Self::Byte
            | Self::UByte
            | Self::Short
            | Self::UShort
            | Self::Char
            | Self::Int
            | Self::UInt => Self::Int,
            Self::Long | Self::ULong => Self::Long,
            other => other,
        }
    }

    /// Smallest value representable by an integral type.
    ///
    /// `Long` and `ULong` have no bound that fits a subrange fact and return `None`,
    /// as do non-integral types.
    #[must_use]
    pub const fn lower_bound(self) -> Option<i64> {
        match self {
            Self::Byte => Some(i8::MIN as i64),
            Self::Short => Some(i16::MIN as i64),
            Self::Int => Some(i32::MIN as i64),
            Self::Bool | Self::UByte | Self::UShort | Self::Char | Self::UInt => Some(0),
            _ => None,
        }
    }

    /// Largest value representable by an integral type.
    #[must_use]
    pub const fn upper_bound(self) -> Option<i64> {
        match self {
            Self::Bool => Some(1),
            Self::Byte => Some(i8::MAX as i64),
            Self::UByte => Some(u8::MAX as i64),
            Self::Short => Some(i16::MAX as i64),
            Self::UShort | Self::Char => Some(u16::MAX as i64),
            Self::Int => Some(i32::MAX as i64),
            Self::UInt => Some(u32::MAX as i64),
            _ => None,
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undef => "undef",
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Byte => "byte",
            Self::UByte => "ubyte",
            Self::Short => "short",
            Self::UShort => "ushort",
            Self::Char => "char",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Long => "long",
            Self::ULong => "ulong",
            Self::Float => "float",
            Self::Double => "double",
            Self::Ref => "ref",
            Self::ByRef => "byref",
            Self::Struct => "struct",
        };
        f.write_str(name)
    }
}

/// Code generation target.
///
/// Only a handful of target properties influence assertion propagation:
/// pointer width (handle constants and `is_long` literals) and, on 32-bit
/// ARM, which integer literals are encodable as a single move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum Target {
    /// x86-64.
    #[default]
    X64,
    /// AArch64.
    Arm64,
    /// 32-bit x86.
    X86,
    /// 32-bit ARM (Thumb-2).
    Arm32,
}

impl Target {
    /// Returns `true` for 64-bit targets.
    #[must_use]
    pub const fn is_64bit(self) -> bool {
        matches!(self, Self::X64 | Self::Arm64)
    }

    /// Pointer size in bytes.
    #[must_use]
    pub const fn pointer_size(self) -> usize {
        if self.is_64bit() {
            8
        } else {
            4
        }
    }

    /// Returns `true` if an integer literal can be materialized with a single move.
    ///
    /// Only 32-bit ARM restricts this; every other target accepts any value.
    #[must_use]
    pub fn is_valid_mov_immediate(self, value: i64) -> bool {
        match self {
            Self::Arm32 => arm_valid_mov_immediate(value as i32),
            _ => true,
        }
    }
}

/// Thumb-2 `mov`/`mvn`/`movw` encodability.
fn arm_valid_mov_immediate(value: i32) -> bool {
    let bits = value as u32;
    (0..=0xffff).contains(&bits) || is_thumb2_modified_immediate(bits) || is_thumb2_modified_immediate(!bits)
}

fn is_thumb2_modified_immediate(bits: u32) -> bool {
    let byte = bits & 0xff;
    if bits == byte
        || bits == (byte | byte << 16)
        || bits == (byte << 8 | byte << 24)
        || bits == (byte | byte << 8 | byte << 16 | byte << 24)
    {
        return true;
    }

    // 8-bit value with its top bit set, rotated right by 8..=31.
    (8..32).any(|rot| {
        let unrotated = bits.rotate_left(rot);
        unrotated <= 0xff && unrotated & 0x80 != 0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_and_actual() {
        assert!(VarType::Byte.is_small());
        assert!(!VarType::Int.is_small());
        assert_eq!(VarType::UShort.actual(), VarType::Int);
        assert_eq!(VarType::ULong.actual(), VarType::Long);
        assert_eq!(VarType::Ref.actual(), VarType::Ref);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(VarType::Byte.lower_bound(), Some(-128));
        assert_eq!(VarType::Byte.upper_bound(), Some(127));
        assert_eq!(VarType::Bool.upper_bound(), Some(1));
        assert_eq!(VarType::Char.upper_bound(), Some(65535));
        assert_eq!(VarType::UInt.upper_bound(), Some(4_294_967_295));
        assert_eq!(VarType::Long.lower_bound(), None);
        assert_eq!(VarType::Double.upper_bound(), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(VarType::Ref.size(Target::X64), 8);
        assert_eq!(VarType::Ref.size(Target::X86), 4);
        assert_eq!(VarType::Short.size(Target::Arm32), 2);
    }

    #[test]
    fn test_arm_immediates() {
        assert!(Target::Arm32.is_valid_mov_immediate(0x1234));
        assert!(Target::Arm32.is_valid_mov_immediate(0x00ab_00ab));
        assert!(Target::Arm32.is_valid_mov_immediate(0xff00_0000_u32 as i32 as i64));
        assert!(Target::Arm32.is_valid_mov_immediate(-1));
        assert!(!Target::Arm32.is_valid_mov_immediate(0x1234_5678));
        assert!(Target::X64.is_valid_mov_immediate(0x1234_5678));
    }
}
