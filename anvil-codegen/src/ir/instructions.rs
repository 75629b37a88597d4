//! Instruction formats and opcodes.
//!
//! The `instructions` module contains definitions for instruction formats
//! and opcodes.
//!
//! A large class of instructions are exactly equivalent except for their
//! opcode, so instruction data is split into an `Opcode` and an
//! `InstructionData` format variant carrying the operands. Small fixed
//! operand counts are stored inline; variable-length argument lists (calls,
//! returns, branch arguments) live in the data flow graph's shared
//! [`ValueListPool`] so that growing one list never invalidates another.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::immediates::{Ieee32, Ieee64, Imm64, Offset32};
use crate::ir::types::{self, Type};
use crate::ir::{Block, FuncRef, JumpTable, MemFlags, SigRef, TrapCode, Value};

use core::fmt;

/// A variable list of `Value` operands used for function call arguments and
/// passing arguments to basic blocks.
pub type ValueList = anvil_entity::EntityList<Value>;

/// Memory pool for holding value lists. See [`ValueList`].
pub type ValueListPool = anvil_entity::ListPool<Value>;

/// A block being branched to, plus the arguments being passed to it.
///
/// The arguments supply the destination block's parameters; they must match
/// in number and type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockCall {
    /// The block being branched to.
    block: Block,
    /// Arguments passed to the block's parameters.
    args: ValueList,
}

impl BlockCall {
    /// Construct a `BlockCall` with the given block and arguments.
    pub fn new(block: Block, args: &[Value], pool: &mut ValueListPool) -> Self {
        Self {
            block,
            args: ValueList::from_slice(args, pool),
        }
    }

    /// Return the block for this `BlockCall`.
    pub fn block(&self, _pool: &ValueListPool) -> Block {
        self.block
    }

    /// Replace the block for this `BlockCall`.
    pub fn set_block(&mut self, block: Block, _pool: &mut ValueListPool) {
        self.block = block;
    }

    /// Append an argument to the block args.
    pub fn append_argument(&mut self, arg: Value, pool: &mut ValueListPool) {
        self.args.push(arg, pool);
    }

    /// Return a slice of the arguments of this block call.
    pub fn args_slice<'a>(&self, pool: &'a ValueListPool) -> &'a [Value] {
        self.args.as_slice(pool)
    }

    /// Return a mutable slice of the arguments of this block call.
    pub fn args_slice_mut<'a>(&mut self, pool: &'a mut ValueListPool) -> &'a mut [Value] {
        self.args.as_mut_slice(pool)
    }

    /// Create a deep clone of this `BlockCall`, not aliasing the argument
    /// storage of the original.
    pub fn deep_clone(&self, pool: &mut ValueListPool) -> Self {
        Self {
            block: self.block,
            args: self.args.deep_clone(pool),
        }
    }
}

/// An instruction opcode.
///
/// All instructions from all supported ISAs are present.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[allow(missing_docs)]
pub enum Opcode {
    // Control flow.
    /// Unconditional jump to a single destination with arguments.
    Jump,
    /// Conditional branch: if arg is non-zero take the first destination,
    /// otherwise the second.
    Brif,
    /// Indirect jump via a jump table, with a default destination.
    BrTable,
    /// Return from the function with the given values.
    Return,
    /// Direct call to a known function.
    Call,
    /// Indirect call; the first argument is the callee address.
    CallIndirect,
    /// Unconditional trap.
    Trap,

    // Constants and data movement.
    /// Integer constant.
    Iconst,
    /// 32-bit float constant (bit pattern).
    F32const,
    /// 64-bit float constant (bit pattern).
    F64const,
    /// Conditional select: `select c, x, y` is `x` if `c` is non-zero.
    Select,

    // Integer arithmetic.
    Iadd,
    Isub,
    Imul,
    Udiv,
    Sdiv,
    Urem,
    Srem,
    Band,
    Bor,
    Bxor,
    Ishl,
    Ushr,
    Sshr,
    Rotl,
    Rotr,
    Clz,
    Ctz,
    Popcnt,
    /// Integer comparison producing an `i8` flag value.
    Icmp,

    // Integer width changes.
    /// Zero-extend to the controlling type.
    Uextend,
    /// Sign-extend to the controlling type.
    Sextend,
    /// Truncate to the (narrower) controlling type.
    Ireduce,

    // Floating point.
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fneg,
    Fabs,
    Sqrt,
    /// Minimum, propagating NaN and ordering -0.0 < +0.0.
    Fmin,
    /// Maximum, propagating NaN and ordering -0.0 < +0.0.
    Fmax,
    /// Float comparison producing an `i8` flag value.
    Fcmp,
    /// Convert `f32` to `f64`.
    Fpromote,
    /// Convert `f64` to `f32`.
    Fdemote,
    /// Float to signed integer, trapping on NaN or overflow.
    FcvtToSint,
    /// Float to unsigned integer, trapping on NaN or overflow.
    FcvtToUint,
    /// Signed integer to float.
    FcvtFromSint,
    /// Unsigned integer to float.
    FcvtFromUint,
    /// Reinterpret the bits of a value as a different type of the same
    /// width.
    Bitcast,

    // Memory.
    /// Load the controlling type from memory.
    Load,
    Uload8,
    Sload8,
    Uload16,
    Sload16,
    Uload32,
    Sload32,
    /// Store a value to memory.
    Store,
    Istore8,
    Istore16,
    Istore32,
}

impl Opcode {
    /// True for all branching instructions.
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Jump | Self::Brif | Self::BrTable)
    }

    /// Is this instruction a block terminator?
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Jump | Self::Brif | Self::BrTable | Self::Return | Self::Trap
        )
    }

    /// Is this a return instruction?
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return)
    }

    /// Is this a call instruction?
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::CallIndirect)
    }

    /// Can this instruction read from memory?
    pub fn can_load(self) -> bool {
        matches!(
            self,
            Self::Load
                | Self::Uload8
                | Self::Sload8
                | Self::Uload16
                | Self::Sload16
                | Self::Uload32
                | Self::Sload32
        )
    }

    /// Can this instruction write to memory?
    pub fn can_store(self) -> bool {
        matches!(
            self,
            Self::Store | Self::Istore8 | Self::Istore16 | Self::Istore32
        )
    }

    /// Can this instruction cause a trap?
    pub fn can_trap(self) -> bool {
        matches!(
            self,
            Self::Trap
                | Self::Udiv
                | Self::Sdiv
                | Self::Urem
                | Self::Srem
                | Self::FcvtToSint
                | Self::FcvtToUint
        )
    }

    /// Does this instruction have other side effects besides can_* flags?
    ///
    /// Side-effecting instructions pin the relative order of observable
    /// events; lowering gives each one a fresh side-effect color.
    pub fn other_side_effects(self) -> bool {
        self.is_call() || self.is_terminator()
    }

    /// Does this instruction have any side effect that must be preserved
    /// even when its results are unused?
    pub fn has_side_effects(self) -> bool {
        self.can_trap() || self.can_store() || self.can_load() || self.other_side_effects()
    }

    /// Number of results produced by this opcode given its controlling
    /// type. Calls are handled separately through their signature.
    pub fn num_fixed_results(self) -> usize {
        match self {
            Self::Jump
            | Self::Brif
            | Self::BrTable
            | Self::Return
            | Self::Trap
            | Self::Store
            | Self::Istore8
            | Self::Istore16
            | Self::Istore32 => 0,
            Self::Call | Self::CallIndirect => {
                panic!("call results come from the signature")
            }
            _ => 1,
        }
    }

    /// The type of this opcode's single fixed result, given the controlling
    /// type.
    pub fn result_type(self, ctrl_type: Type) -> Type {
        match self {
            Self::Icmp | Self::Fcmp => types::I8,
            _ => ctrl_type,
        }
    }

    /// Get the textual name of this opcode.
    pub fn name(self) -> &'static str {
        use self::Opcode::*;
        match self {
            Jump => "jump",
            Brif => "brif",
            BrTable => "br_table",
            Return => "return",
            Call => "call",
            CallIndirect => "call_indirect",
            Trap => "trap",
            Iconst => "iconst",
            F32const => "f32const",
            F64const => "f64const",
            Select => "select",
            Iadd => "iadd",
            Isub => "isub",
            Imul => "imul",
            Udiv => "udiv",
            Sdiv => "sdiv",
            Urem => "urem",
            Srem => "srem",
            Band => "band",
            Bor => "bor",
            Bxor => "bxor",
            Ishl => "ishl",
            Ushr => "ushr",
            Sshr => "sshr",
            Rotl => "rotl",
            Rotr => "rotr",
            Clz => "clz",
            Ctz => "ctz",
            Popcnt => "popcnt",
            Icmp => "icmp",
            Uextend => "uextend",
            Sextend => "sextend",
            Ireduce => "ireduce",
            Fadd => "fadd",
            Fsub => "fsub",
            Fmul => "fmul",
            Fdiv => "fdiv",
            Fneg => "fneg",
            Fabs => "fabs",
            Sqrt => "sqrt",
            Fmin => "fmin",
            Fmax => "fmax",
            Fcmp => "fcmp",
            Fpromote => "fpromote",
            Fdemote => "fdemote",
            FcvtToSint => "fcvt_to_sint",
            FcvtToUint => "fcvt_to_uint",
            FcvtFromSint => "fcvt_from_sint",
            FcvtFromUint => "fcvt_from_uint",
            Bitcast => "bitcast",
            Load => "load",
            Uload8 => "uload8",
            Sload8 => "sload8",
            Uload16 => "uload16",
            Sload16 => "sload16",
            Uload32 => "uload32",
            Sload32 => "sload32",
            Store => "store",
            Istore8 => "istore8",
            Istore16 => "istore16",
            Istore32 => "istore32",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contents of an instruction: the opcode and its operands.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum InstructionData {
    /// A single value operand.
    Unary { opcode: Opcode, arg: Value },
    /// A 64-bit integer immediate.
    UnaryImm { opcode: Opcode, imm: Imm64 },
    /// A 32-bit float immediate.
    UnaryIeee32 { opcode: Opcode, imm: Ieee32 },
    /// A 64-bit float immediate.
    UnaryIeee64 { opcode: Opcode, imm: Ieee64 },
    /// Two value operands.
    Binary { opcode: Opcode, args: [Value; 2] },
    /// Three value operands (`select`).
    Ternary { opcode: Opcode, args: [Value; 3] },
    /// Integer comparison.
    IntCompare {
        opcode: Opcode,
        args: [Value; 2],
        cond: IntCC,
    },
    /// Float comparison.
    FloatCompare {
        opcode: Opcode,
        args: [Value; 2],
        cond: FloatCC,
    },
    /// Unconditional jump.
    Jump {
        opcode: Opcode,
        destination: BlockCall,
    },
    /// Two-way conditional branch: `blocks[0]` when the condition is
    /// non-zero, `blocks[1]` otherwise.
    Brif {
        opcode: Opcode,
        arg: Value,
        blocks: [BlockCall; 2],
    },
    /// Jump-table dispatch on an index value.
    BranchTable {
        opcode: Opcode,
        arg: Value,
        table: JumpTable,
    },
    /// Direct call.
    Call {
        opcode: Opcode,
        func_ref: FuncRef,
        args: ValueList,
    },
    /// Indirect call. The first list element is the callee address.
    CallIndirect {
        opcode: Opcode,
        sig_ref: SigRef,
        args: ValueList,
    },
    /// Variable-arity instruction (`return`).
    MultiAry { opcode: Opcode, args: ValueList },
    /// Memory load from `arg + offset`.
    Load {
        opcode: Opcode,
        arg: Value,
        flags: MemFlags,
        offset: Offset32,
    },
    /// Memory store of `args[0]` to `args[1] + offset`.
    Store {
        opcode: Opcode,
        args: [Value; 2],
        flags: MemFlags,
        offset: Offset32,
    },
    /// Unconditional trap.
    Trap { opcode: Opcode, code: TrapCode },
}

impl InstructionData {
    /// Get the opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match *self {
            Self::Unary { opcode, .. }
            | Self::UnaryImm { opcode, .. }
            | Self::UnaryIeee32 { opcode, .. }
            | Self::UnaryIeee64 { opcode, .. }
            | Self::Binary { opcode, .. }
            | Self::Ternary { opcode, .. }
            | Self::IntCompare { opcode, .. }
            | Self::FloatCompare { opcode, .. }
            | Self::Jump { opcode, .. }
            | Self::Brif { opcode, .. }
            | Self::BranchTable { opcode, .. }
            | Self::Call { opcode, .. }
            | Self::CallIndirect { opcode, .. }
            | Self::MultiAry { opcode, .. }
            | Self::Load { opcode, .. }
            | Self::Store { opcode, .. }
            | Self::Trap { opcode, .. } => opcode,
        }
    }

    /// Get the value arguments to this instruction.
    ///
    /// Branch arguments to destination blocks are not included; those
    /// belong to the `BlockCall`s.
    pub fn arguments<'a>(&'a self, pool: &'a ValueListPool) -> &'a [Value] {
        match self {
            Self::Unary { arg, .. } | Self::Load { arg, .. } => core::slice::from_ref(arg),
            Self::Binary { args, .. }
            | Self::IntCompare { args, .. }
            | Self::FloatCompare { args, .. }
            | Self::Store { args, .. } => args,
            Self::Ternary { args, .. } => args,
            Self::Brif { arg, .. } | Self::BranchTable { arg, .. } => {
                core::slice::from_ref(arg)
            }
            Self::Call { args, .. }
            | Self::CallIndirect { args, .. }
            | Self::MultiAry { args, .. } => args.as_slice(pool),
            Self::UnaryImm { .. }
            | Self::UnaryIeee32 { .. }
            | Self::UnaryIeee64 { .. }
            | Self::Jump { .. }
            | Self::Trap { .. } => &[],
        }
    }

    /// Mutable access to the value arguments to this instruction.
    pub fn arguments_mut<'a>(&'a mut self, pool: &'a mut ValueListPool) -> &'a mut [Value] {
        match self {
            Self::Unary { arg, .. } | Self::Load { arg, .. } => core::slice::from_mut(arg),
            Self::Binary { args, .. }
            | Self::IntCompare { args, .. }
            | Self::FloatCompare { args, .. }
            | Self::Store { args, .. } => args,
            Self::Ternary { args, .. } => args,
            Self::Brif { arg, .. } | Self::BranchTable { arg, .. } => {
                core::slice::from_mut(arg)
            }
            Self::Call { args, .. }
            | Self::CallIndirect { args, .. }
            | Self::MultiAry { args, .. } => args.as_mut_slice(pool),
            Self::UnaryImm { .. }
            | Self::UnaryIeee32 { .. }
            | Self::UnaryIeee64 { .. }
            | Self::Jump { .. }
            | Self::Trap { .. } => &mut [],
        }
    }

    /// Get the destinations of this instruction, if it's a branch.
    ///
    /// `br_table` returns an empty slice here; its destinations live in the
    /// jump table.
    pub fn branch_destination(&self) -> &[BlockCall] {
        match self {
            Self::Jump { destination, .. } => core::slice::from_ref(destination),
            Self::Brif { blocks, .. } => blocks,
            _ => &[],
        }
    }

    /// Get mutable access to the destinations of this instruction, if it's
    /// a branch.
    pub fn branch_destination_mut(&mut self) -> &mut [BlockCall] {
        match self {
            Self::Jump { destination, .. } => core::slice::from_mut(destination),
            Self::Brif { blocks, .. } => blocks,
            _ => &mut [],
        }
    }

    /// If this is a trapping instruction, get its trap code.
    pub fn trap_code(&self) -> Option<TrapCode> {
        match *self {
            Self::Trap { code, .. } => Some(code),
            _ => None,
        }
    }
}
