//! x86-64 definitions: instruction arguments.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::machinst::{MachLabel, OperandVisitor, Reg, SpillSlot};

/// An operand width: x64 instructions come in 8-, 16-, 32- and 64-bit
/// forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandSize {
    /// 8-bit.
    Size8,
    /// 16-bit.
    Size16,
    /// 32-bit.
    Size32,
    /// 64-bit.
    Size64,
}

impl OperandSize {
    /// The size for an integer type.
    pub fn from_ty(ty: crate::ir::Type) -> Self {
        match ty.bits() {
            8 => Self::Size8,
            16 => Self::Size16,
            32 => Self::Size32,
            _ => Self::Size64,
        }
    }

    /// Width in bits.
    pub fn to_bits(self) -> u8 {
        match self {
            Self::Size8 => 8,
            Self::Size16 => 16,
            Self::Size32 => 32,
            Self::Size64 => 64,
        }
    }

    /// Does this operand size require the REX.W bit?
    pub fn rex_w(self) -> bool {
        self == Self::Size64
    }
}

/// A memory addressing mode.
#[derive(Clone, Copy, Debug)]
pub enum Amode {
    /// Immediate displacement plus base register.
    ImmReg {
        /// Displacement.
        simm32: i32,
        /// Base.
        base: Reg,
    },
    /// Displacement plus base plus scaled index.
    ImmRegRegShift {
        /// Displacement.
        simm32: i32,
        /// Base.
        base: Reg,
        /// Index.
        index: Reg,
        /// log2 of the index scale (0-3).
        shift: u8,
    },
    /// RIP-relative, to a label (constant-pool entries, jump tables).
    RipRelative {
        /// The target label.
        target: MachLabel,
    },
}

impl Amode {
    /// Base + displacement.
    pub fn imm_reg(simm32: i32, base: Reg) -> Self {
        Self::ImmReg { simm32, base }
    }

    /// Visit the registers of this address.
    pub fn get_operands(&mut self, visitor: &mut impl OperandVisitor) {
        match self {
            Amode::ImmReg { base, .. } => visitor.reg_use(base),
            Amode::ImmRegRegShift { base, index, .. } => {
                visitor.reg_use(base);
                visitor.reg_use(index);
            }
            Amode::RipRelative { .. } => {}
        }
    }
}

/// A memory address with frame-relative pseudo-modes resolved at emission
/// against the frame layout.
#[derive(Clone, Copy, Debug)]
pub enum SyntheticAmode {
    /// A real addressing mode.
    Real(Amode),
    /// An offset from SP into the outgoing-argument area.
    SPOffset {
        /// Offset from SP.
        off: i64,
    },
    /// An offset into the incoming argument area.
    IncomingArg {
        /// Offset from the first stack argument.
        off: i64,
    },
    /// A register-allocator spill slot.
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

impl SyntheticAmode {
    /// Visit the registers of this address.
    pub fn get_operands(&mut self, visitor: &mut impl OperandVisitor) {
        match self {
            SyntheticAmode::Real(amode) => amode.get_operands(visitor),
            _ => {}
        }
    }
}

impl From<Amode> for SyntheticAmode {
    fn from(amode: Amode) -> Self {
        Self::Real(amode)
    }
}

/// An operand that is either a register or in memory.
#[derive(Clone, Copy, Debug)]
pub enum RegMem {
    /// A register.
    Reg {
        /// The register.
        reg: Reg,
    },
    /// A memory operand.
    Mem {
        /// The address.
        addr: SyntheticAmode,
    },
}

impl RegMem {
    /// A register operand.
    pub fn reg(reg: Reg) -> Self {
        Self::Reg { reg }
    }

    /// A memory operand.
    pub fn mem(addr: impl Into<SyntheticAmode>) -> Self {
        Self::Mem { addr: addr.into() }
    }

    /// Visit the registers of this operand.
    pub fn get_operands(&mut self, visitor: &mut impl OperandVisitor) {
        match self {
            RegMem::Reg { reg } => visitor.reg_use(reg),
            RegMem::Mem { addr } => addr.get_operands(visitor),
        }
    }
}

/// An operand that is a register, in memory, or an immediate.
#[derive(Clone, Copy, Debug)]
pub enum RegMemImm {
    /// A register.
    Reg {
        /// The register.
        reg: Reg,
    },
    /// A memory operand.
    Mem {
        /// The address.
        addr: SyntheticAmode,
    },
    /// A 32-bit immediate, sign-extended for 64-bit forms.
    Imm {
        /// The immediate.
        simm32: i32,
    },
}

impl RegMemImm {
    /// A register operand.
    pub fn reg(reg: Reg) -> Self {
        Self::Reg { reg }
    }

    /// An immediate operand.
    pub fn imm(simm32: i32) -> Self {
        Self::Imm { simm32 }
    }

    /// Visit the registers of this operand.
    pub fn get_operands(&mut self, visitor: &mut impl OperandVisitor) {
        match self {
            RegMemImm::Reg { reg } => visitor.reg_use(reg),
            RegMemImm::Mem { addr } => addr.get_operands(visitor),
            RegMemImm::Imm { .. } => {}
        }
    }
}

/// An 8-bit shift amount: an immediate or the CL register.
#[derive(Clone, Copy, Debug)]
pub enum Imm8Reg {
    /// An immediate count.
    Imm8 {
        /// The count.
        imm: u8,
    },
    /// A count in CL (a fixed-register constraint).
    Reg {
        /// The register (pinned to RCX at allocation).
        reg: Reg,
    },
}

/// The ALU operations of the RMI-R (two-address) form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluRmiROpcode {
    /// Add.
    Add,
    /// Subtract.
    Sub,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
}

/// A shift or rotate kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftKind {
    /// shl.
    ShiftLeft,
    /// shr.
    ShiftRightLogical,
    /// sar.
    ShiftRightArithmetic,
    /// rol.
    RotateLeft,
    /// ror.
    RotateRight,
}

/// An extension mode for movzx/movsx: source width and destination
/// width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtMode {
    /// Byte to longword.
    BL,
    /// Byte to quadword.
    BQ,
    /// Word to longword.
    WL,
    /// Word to quadword.
    WQ,
    /// Longword to quadword.
    LQ,
}

/// Scalar SSE operations of the RM-R form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SseOpcode {
    Addss,
    Addsd,
    Subss,
    Subsd,
    Mulss,
    Mulsd,
    Divss,
    Divsd,
    Minss,
    Minsd,
    Maxss,
    Maxsd,
    Andps,
    Andpd,
    Orps,
    Orpd,
    Xorps,
    Xorpd,
    Sqrtss,
    Sqrtsd,
    Cvtss2sd,
    Cvtsd2ss,
    Ucomiss,
    Ucomisd,
    Movss,
    Movsd,
}

impl SseOpcode {
    /// Is this a 64-bit (double) form?
    pub fn is_f64(self) -> bool {
        use SseOpcode::*;
        matches!(
            self,
            Addsd | Subsd | Mulsd | Divsd | Minsd | Maxsd | Andpd | Orpd | Xorpd | Sqrtsd
                | Cvtsd2ss | Ucomisd | Movsd
        )
    }
}

/// A condition code for x64 conditional instructions (the encoding is
/// the hardware's 4-bit `cc` field).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum CC {
    /// Overflow.
    O = 0,
    /// No overflow.
    NO = 1,
    /// Below (unsigned <).
    B = 2,
    /// Not below (unsigned >=).
    NB = 3,
    /// Zero / equal.
    Z = 4,
    /// Not zero / not equal.
    NZ = 5,
    /// Below or equal (unsigned <=).
    BE = 6,
    /// Not below or equal (unsigned >).
    NBE = 7,
    /// Sign.
    S = 8,
    /// No sign.
    NS = 9,
    /// Parity.
    P = 10,
    /// No parity.
    NP = 11,
    /// Less (signed <).
    L = 12,
    /// Not less (signed >=).
    NL = 13,
    /// Less or equal (signed <=).
    LE = 14,
    /// Not less or equal (signed >).
    NLE = 15,
}

impl CC {
    /// From an integer condition code.
    pub fn from_intcc(cc: IntCC) -> Self {
        match cc {
            IntCC::Equal => CC::Z,
            IntCC::NotEqual => CC::NZ,
            IntCC::SignedLessThan => CC::L,
            IntCC::SignedGreaterThanOrEqual => CC::NL,
            IntCC::SignedGreaterThan => CC::NLE,
            IntCC::SignedLessThanOrEqual => CC::LE,
            IntCC::UnsignedLessThan => CC::B,
            IntCC::UnsignedGreaterThanOrEqual => CC::NB,
            IntCC::UnsignedGreaterThan => CC::NBE,
            IntCC::UnsignedLessThanOrEqual => CC::BE,
        }
    }

    /// The inverted condition.
    pub fn invert(self) -> Self {
        match self {
            CC::O => CC::NO,
            CC::NO => CC::O,
            CC::B => CC::NB,
            CC::NB => CC::B,
            CC::Z => CC::NZ,
            CC::NZ => CC::Z,
            CC::BE => CC::NBE,
            CC::NBE => CC::BE,
            CC::S => CC::NS,
            CC::NS => CC::S,
            CC::P => CC::NP,
            CC::NP => CC::P,
            CC::L => CC::NL,
            CC::NL => CC::L,
            CC::LE => CC::NLE,
            CC::NLE => CC::LE,
        }
    }

    /// The encoding bits.
    pub fn get_enc(self) -> u8 {
        self as u8
    }
}

/// The condition for a float comparison via `ucomiss`/`ucomisd`, plus
/// whether the operands must be swapped first.
///
/// After `ucomis* a, b`: ZF/PF/CF encode the relation; unordered sets all
/// three. Only conditions that don't confuse "unordered" with the wanted
/// result are usable directly; the others swap operands.
pub fn floatcc_to_cc_and_swap(cc: FloatCC) -> Option<(CC, bool)> {
    match cc {
        // ucomis sets: eq -> ZF; lt -> CF; unordered -> ZF|PF|CF.
        FloatCC::GreaterThan => Some((CC::NBE, false)),
        FloatCC::GreaterThanOrEqual => Some((CC::NB, false)),
        FloatCC::LessThan => Some((CC::NBE, true)),
        FloatCC::LessThanOrEqual => Some((CC::NB, true)),
        FloatCC::UnorderedOrLessThan => Some((CC::B, false)),
        FloatCC::UnorderedOrLessThanOrEqual => Some((CC::BE, false)),
        FloatCC::UnorderedOrGreaterThan => Some((CC::B, true)),
        FloatCC::UnorderedOrGreaterThanOrEqual => Some((CC::BE, true)),
        FloatCC::Ordered => Some((CC::NP, false)),
        FloatCC::Unordered => Some((CC::P, false)),
        // Equal and NotEqual need a parity check as well; lowering
        // handles them separately.
        FloatCC::Equal | FloatCC::NotEqual => None,
        FloatCC::OrderedNotEqual | FloatCC::UnorderedOrEqual => None,
    }
}

/// A branch target for x64 branches.
#[derive(Clone, Copy, Debug)]
pub enum BranchTarget {
    /// A label fixed up by the code buffer.
    Label(MachLabel),
}

impl BranchTarget {
    /// The label of this target.
    pub fn as_label(self) -> MachLabel {
        match self {
            BranchTarget::Label(l) => l,
        }
    }
}
