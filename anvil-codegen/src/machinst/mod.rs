//! This module exposes the machine-specific backend definition pieces.
//!
//! The MachInst infrastructure is the compiler backend, from the IR (ir::Function)
//! to machine code. The purpose of this infrastructure is to allow implementing
//! new backends that translate from the IR to machine code with a minimum of
//! per-ISA glue:
//!
//! - An ISA defines an instruction enum implementing [`MachInst`] and
//!   [`MachInstEmit`], a register environment, and a [`LowerBackend`]
//!   implementation producing those instructions from IR.
//! - The shared parts of this module then drive lowering
//!   ([`lower::Lower`]), block ordering ([`blockorder`]), register
//!   allocation ([`crate::regalloc`]), and emission ([`buffer::MachBuffer`]).
//!
//! The final output of the pipeline is a [`buffer::MachBufferFinalized`]
//! plus a frame-layout record.

use crate::binemit::CodeOffset;
use crate::ir::Type;
use crate::result::CodegenResult;
use core::fmt;
use core::fmt::Debug;

pub mod abi;
pub mod blockorder;
pub mod buffer;
pub mod compile;
pub mod lower;
mod operands;
mod reg;
pub mod vcode;

pub use abi::*;
pub use blockorder::*;
pub use buffer::*;
pub use compile::*;
pub use lower::*;
pub use operands::*;
pub use reg::*;
pub use vcode::*;

/// The index of a lowered-order block in a `VCode`.
pub type BlockIndex = u32;

/// The index of a machine instruction in a `VCode`.
pub type InsnIndex = u32;

/// A machine-code label, which may be branched to and later bound to an
/// offset in the emitted code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachLabel(u32);

impl MachLabel {
    /// Get a label for a block. (The first N labels are always directly
    /// mapped to the N lowered blocks.)
    pub fn from_block(bindex: BlockIndex) -> Self {
        Self(bindex)
    }

    /// Creates a label from its raw index.
    pub fn from_u32(index: u32) -> Self {
        Self(index)
    }

    /// Get the numeric label index.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for MachLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "label{}", self.0)
    }
}

/// The kind of terminator that ends a lowered block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachTerminator {
    /// Not a terminator.
    None,
    /// A return instruction.
    Ret,
    /// A branch (unconditional, conditional, or table dispatch).
    Branch,
}

/// A machine instruction.
pub trait MachInst: Clone + Debug {
    /// The ABI machine spec for this `MachInst`.
    type ABIMachineSpec: abi::ABIMachineSpec<I = Self>;

    /// The kind of label-use (branch-offset encoding) this ISA supports.
    type LabelUse: MachInstLabelUse;

    /// Visit every register mention in this instruction with its operand
    /// role. The same visit collects operands before register allocation
    /// and rewrites the fields afterwards.
    fn get_operands(&mut self, visitor: &mut impl OperandVisitor);

    /// If this is a simple register-to-register move, return the (dest,
    /// src) pair. The allocator uses this to elide moves whose source and
    /// destination received the same register.
    fn is_move(&self) -> Option<(Writable<Reg>, Reg)>;

    /// What kind of terminator is this instruction, if any?
    fn is_term(&self) -> MachTerminator;

    /// Is this the pseudo-instruction that defines the function's incoming
    /// argument registers at the top of the entry block?
    fn is_args(&self) -> bool {
        false
    }

    /// Generate a move between registers of the given type.
    fn gen_move(to_reg: Writable<Reg>, from_reg: Reg, ty: Type) -> Self;

    /// Generate an unconditional jump to `target`.
    fn gen_jump(target: MachLabel) -> Self;

    /// Generate a NOP of the given size (or the nearest smaller encodable
    /// size).
    fn gen_nop(preferred_size: usize) -> Self;

    /// What register class is used to hold a value of the given type?
    fn rc_for_type(ty: Type) -> CodegenResult<RegClass>;

    /// The worst-case size of any instruction, in bytes, used to decide
    /// when an island must be emitted.
    fn worst_case_size() -> CodeOffset;
}

/// A trait describing the ability to encode a MachInst into binary machine
/// code.
pub trait MachInstEmit: MachInst {
    /// Persistent state carried across instructions during emission, e.g.
    /// the resolved frame layout.
    type State: MachInstEmitState;

    /// Constant information used in emission (compilation flags, ISA
    /// feature selection).
    type Info;

    /// Emit the instruction.
    fn emit(&self, sink: &mut MachBuffer<Self>, info: &Self::Info, state: &mut Self::State);
}

/// A trait describing emission state.
pub trait MachInstEmitState: Clone + Debug {
    /// Create the emission state for a function with the given (final)
    /// frame layout.
    fn new(frame: abi::FrameLayout) -> Self;

    /// The frame layout resolved after register allocation.
    fn frame_layout(&self) -> &abi::FrameLayout;
}

/// A descriptor of a label reference in an instruction: the branch-offset
/// range it supports and how to patch or extend it.
pub trait MachInstLabelUse: Clone + Copy + Debug + Eq {
    /// Required alignment for any veneer.
    const ALIGN: CodeOffset;

    /// The maximum offset in bytes forward (in the positive direction) that
    /// this label-use can refer to.
    fn max_pos_range(self) -> CodeOffset;

    /// The maximum offset in bytes backward that this label-use can refer
    /// to.
    fn max_neg_range(self) -> CodeOffset;

    /// The size of the region of code that must be patched.
    fn patch_size(self) -> CodeOffset;

    /// Patch the code buffer at `use_offset` to refer to `label_offset`.
    fn patch(self, buffer: &mut [u8], use_offset: CodeOffset, label_offset: CodeOffset);

    /// Can this label-use be extended with a veneer when the target is out
    /// of range?
    fn supports_veneer(self) -> bool;

    /// The size of a veneer for this label-use kind.
    fn veneer_size(self) -> CodeOffset;

    /// The worst-case veneer size for any label-use kind of this ISA.
    fn worst_case_veneer_size() -> CodeOffset;

    /// Generate a veneer at `veneer_offset` in `buffer`. Returns the offset
    /// within the veneer that must be fixed up to point at the real target,
    /// and the (longer-range) label-use kind of that fixup.
    fn generate_veneer(self, buffer: &mut [u8], veneer_offset: CodeOffset)
        -> (CodeOffset, Self);
}
