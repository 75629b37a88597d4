//! AArch64 ISA definitions: instruction arguments.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::isa::aarch64::inst::imms::{SImm7Scaled, SImm9, UImm12Scaled};
use crate::machinst::{MachLabel, Reg, SpillSlot};

/// An operand size: 32 or 64 bits, selecting the W or X view of a
/// register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandSize {
    /// 32-bit.
    Size32,
    /// 64-bit.
    Size64,
}

impl OperandSize {
    /// Convert from a "is 64-bit" flag.
    pub fn from_bits(bits: u32) -> OperandSize {
        if bits <= 32 {
            OperandSize::Size32
        } else {
            OperandSize::Size64
        }
    }

    /// Operand size for an integer type.
    pub fn from_ty(ty: crate::ir::Type) -> OperandSize {
        Self::from_bits(ty.bits())
    }

    /// The `sf` bit of most integer instructions.
    pub fn sf_bit(&self) -> u32 {
        match self {
            OperandSize::Size32 => 0,
            OperandSize::Size64 => 1,
        }
    }

    /// Is this the 32-bit size?
    pub fn is32(&self) -> bool {
        *self == OperandSize::Size32
    }
}

/// A scalar FPU operand size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarSize {
    /// 32-bit (S register view).
    Size32,
    /// 64-bit (D register view).
    Size64,
}

impl ScalarSize {
    /// Scalar size for a float type.
    pub fn from_ty(ty: crate::ir::Type) -> ScalarSize {
        match ty {
            crate::ir::types::F32 => ScalarSize::Size32,
            crate::ir::types::F64 => ScalarSize::Size64,
            _ => panic!("unexpected float type {ty}"),
        }
    }

    /// The `type` field (bits 23..22) of most scalar FP instructions.
    pub fn ftype(&self) -> u32 {
        match self {
            ScalarSize::Size32 => 0b00,
            ScalarSize::Size64 => 0b01,
        }
    }
}

/// A condition for conditional branches, csel, cset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    /// Equal.
    Eq = 0,
    /// Not equal.
    Ne = 1,
    /// Carry set / unsigned higher or same.
    Hs = 2,
    /// Carry clear / unsigned lower.
    Lo = 3,
    /// Minus / negative.
    Mi = 4,
    /// Plus / positive or zero.
    Pl = 5,
    /// Overflow set.
    Vs = 6,
    /// Overflow clear.
    Vc = 7,
    /// Unsigned higher.
    Hi = 8,
    /// Unsigned lower or same.
    Ls = 9,
    /// Signed greater or equal.
    Ge = 10,
    /// Signed less than.
    Lt = 11,
    /// Signed greater than.
    Gt = 12,
    /// Signed less or equal.
    Le = 13,
    /// Always.
    Al = 14,
    /// Always (second encoding).
    Nv = 15,
}

impl Cond {
    /// The inverted condition.
    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Hs => Cond::Lo,
            Cond::Lo => Cond::Hs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Al => Cond::Nv,
            Cond::Nv => Cond::Al,
        }
    }

    /// The 4-bit encoding.
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// The condition for an integer comparison.
    pub fn from_intcc(cc: IntCC) -> Cond {
        match cc {
            IntCC::Equal => Cond::Eq,
            IntCC::NotEqual => Cond::Ne,
            IntCC::SignedGreaterThanOrEqual => Cond::Ge,
            IntCC::SignedGreaterThan => Cond::Gt,
            IntCC::SignedLessThanOrEqual => Cond::Le,
            IntCC::SignedLessThan => Cond::Lt,
            IntCC::UnsignedGreaterThanOrEqual => Cond::Hs,
            IntCC::UnsignedGreaterThan => Cond::Hi,
            IntCC::UnsignedLessThanOrEqual => Cond::Ls,
            IntCC::UnsignedLessThan => Cond::Lo,
        }
    }

    /// The condition for a float comparison (after `fcmp`).
    pub fn from_floatcc(cc: FloatCC) -> Cond {
        match cc {
            FloatCC::Ordered => Cond::Vc,
            FloatCC::Unordered => Cond::Vs,
            FloatCC::Equal => Cond::Eq,
            FloatCC::NotEqual => Cond::Ne,
            // Not expressible as a single condition; lowering rejects
            // these before asking.
            FloatCC::OrderedNotEqual | FloatCC::UnorderedOrEqual => {
                panic!("unexpected floatcc {cc}")
            }
            FloatCC::LessThan => Cond::Mi,
            FloatCC::LessThanOrEqual => Cond::Ls,
            FloatCC::GreaterThan => Cond::Gt,
            FloatCC::GreaterThanOrEqual => Cond::Ge,
            FloatCC::UnorderedOrLessThan => Cond::Lt,
            FloatCC::UnorderedOrLessThanOrEqual => Cond::Le,
            FloatCC::UnorderedOrGreaterThan => Cond::Hi,
            FloatCC::UnorderedOrGreaterThanOrEqual => Cond::Hs,
        }
    }
}

/// The kind of conditional branch: on condition flags, or
/// compare-and-branch on a register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CondBrKind {
    /// Branch if the register is zero.
    Zero(Reg),
    /// Branch if the register is not zero.
    NotZero(Reg),
    /// Branch on the given condition flags.
    Cond(Cond),
}

impl CondBrKind {
    /// The inverted branch kind.
    pub fn invert(self) -> CondBrKind {
        match self {
            CondBrKind::Zero(r) => CondBrKind::NotZero(r),
            CondBrKind::NotZero(r) => CondBrKind::Zero(r),
            CondBrKind::Cond(c) => CondBrKind::Cond(c.invert()),
        }
    }
}

/// An extend operation on a register value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtendOp {
    /// Unsigned extend byte.
    UXTB = 0b000,
    /// Unsigned extend halfword.
    UXTH = 0b001,
    /// Unsigned extend word.
    UXTW = 0b010,
    /// Unsigned extend doubleword (no-op).
    UXTX = 0b011,
    /// Signed extend byte.
    SXTB = 0b100,
    /// Signed extend halfword.
    SXTH = 0b101,
    /// Signed extend word.
    SXTW = 0b110,
    /// Signed extend doubleword (no-op).
    SXTX = 0b111,
}

impl ExtendOp {
    /// Encoding of this extend op.
    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// An addressing mode for load/store instructions.
#[derive(Clone, Copy, Debug)]
pub enum AMode {
    /// Base register plus unscaled signed 9-bit immediate.
    Unscaled {
        /// Base register.
        rn: Reg,
        /// Offset.
        simm9: SImm9,
    },
    /// Base register plus scaled unsigned 12-bit immediate.
    UnsignedOffset {
        /// Base register.
        rn: Reg,
        /// Offset.
        uimm12: UImm12Scaled,
    },
    /// Register plus register, with the index extended/shifted.
    RegReg {
        /// Base register.
        rn: Reg,
        /// Index register.
        rm: Reg,
    },
    /// An offset from the stack pointer; used for the outgoing argument
    /// area. Resolved by `mem_finalize`.
    SPOffset {
        /// Offset from SP.
        off: i64,
    },
    /// An offset into the incoming argument area. Resolved against the
    /// frame layout by `mem_finalize`.
    IncomingArg {
        /// Offset from the first incoming stack argument.
        off: i64,
    },
    /// A register-allocator spill slot. Resolved against the frame layout
    /// by `mem_finalize`.
    SpillOffset {
        /// The slot.
        slot: SpillSlot,
    },
    /// An offset into the explicit stack-slot area.
    StackSlotOffset {
        /// Offset from the start of the stack-slot area.
        off: i64,
    },
}

/// An addressing mode for load/store-pair instructions: signed scaled
/// 7-bit offset from a base register, with optional pre/post-increment.
#[derive(Clone, Copy, Debug)]
pub enum PairAMode {
    /// Signed offset, no writeback.
    SignedOffset(Reg, SImm7Scaled),
    /// Pre-indexed (decrement before store); used by the prologue's
    /// `stp fp, lr, [sp, #-16]!`.
    PreIndexed(Reg, SImm7Scaled),
    /// Post-indexed (increment after load); used by the epilogue's
    /// `ldp fp, lr, [sp], #16`.
    PostIndexed(Reg, SImm7Scaled),
}

/// A branch target: either a resolved lowered-block label or a raw offset
/// (used only in tests).
#[derive(Clone, Copy, Debug)]
pub enum BranchTarget {
    /// An unresolved reference to a label.
    Label(MachLabel),
    /// A resolved offset in words from the branch instruction.
    ResolvedOffset(i32),
}

impl BranchTarget {
    /// The label, if this is an unresolved target.
    pub fn as_label(self) -> Option<MachLabel> {
        match self {
            BranchTarget::Label(l) => Some(l),
            BranchTarget::ResolvedOffset(_) => None,
        }
    }

    /// The 26-bit offset field, or zero for unresolved labels (fixed up
    /// later).
    pub fn as_offset26_or_zero(self) -> u32 {
        match self {
            BranchTarget::ResolvedOffset(off) => {
                debug_assert!((-(1 << 25)..(1 << 25)).contains(&off));
                (off as u32) & ((1 << 26) - 1)
            }
            BranchTarget::Label(_) => 0,
        }
    }

    /// The 19-bit offset field, or zero for unresolved labels.
    pub fn as_offset19_or_zero(self) -> u32 {
        match self {
            BranchTarget::ResolvedOffset(off) => {
                debug_assert!((-(1 << 18)..(1 << 18)).contains(&off));
                (off as u32) & ((1 << 19) - 1)
            }
            BranchTarget::Label(_) => 0,
        }
    }
}

/// An ALU operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ALUOp {
    /// Add.
    Add,
    /// Subtract.
    Sub,
    /// Add, setting flags (`cmn` when the destination is the zero
    /// register).
    AddS,
    /// Subtract, setting flags (`cmp` when the destination is the zero
    /// register).
    SubS,
    /// Bitwise or.
    Orr,
    /// Bitwise and.
    And,
    /// Bitwise xor.
    Eor,
    /// Logical shift left (variable).
    Lsl,
    /// Logical shift right (variable).
    Lsr,
    /// Arithmetic shift right (variable).
    Asr,
    /// Rotate right (variable).
    RotR,
    /// Unsigned divide.
    UDiv,
    /// Signed divide.
    SDiv,
}

/// A three-source-operand ALU operation (multiply-add family).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ALUOp3 {
    /// `madd`: rd = ra + rn * rm.
    MAdd,
    /// `msub`: rd = ra - rn * rm.
    MSub,
}

/// A one-source bit operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitOp {
    /// Reverse bits.
    RBit,
    /// Count leading zeros.
    Clz,
}

/// A scalar FPU operation with one source register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FPUOp1 {
    /// Absolute value.
    Abs,
    /// Negate.
    Neg,
    /// Square root.
    Sqrt,
    /// Convert f32 to f64.
    Cvt32To64,
    /// Convert f64 to f32.
    Cvt64To32,
}

/// A scalar FPU operation with two source registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FPUOp2 {
    /// Add.
    Add,
    /// Subtract.
    Sub,
    /// Multiply.
    Mul,
    /// Divide.
    Div,
    /// Maximum: NaN-propagating, and +0.0 > -0.0 (`fmax`).
    Max,
    /// Minimum: NaN-propagating, and -0.0 < +0.0 (`fmin`).
    Min,
}
