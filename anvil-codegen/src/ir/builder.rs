//! Instruction builder.
//!
//! A `Builder` provides a convenient interface for inserting instructions
//! into an Anvil function. Instruction-building methods are provided by the
//! `InstBuilder` trait, implemented for any type that implements
//! `InstBuilderBase` — most notably the cursor types.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::immediates::{Ieee32, Ieee64, Imm64, Offset32};
use crate::ir::instructions::BlockCall;
use crate::ir::types::{self, Type};
use crate::ir::{
    Block, DataFlowGraph, FuncRef, Inst, InstructionData, JumpTable, MemFlags, Opcode, SigRef,
    TrapCode, Value,
};

/// Base trait for instruction builders.
///
/// The `InstBuilderBase` trait provides the basic functionality required by
/// the methods of the generic `InstBuilder` trait. An instruction builder
/// must allocate an instruction, attach result values and decide where the
/// instruction goes in the layout.
pub trait InstBuilderBase<'f>: Sized {
    /// Get an immutable reference to the data flow graph that will hold the
    /// constructed instructions.
    fn data_flow_graph(&self) -> &DataFlowGraph;
    /// Get a mutable reference to the data flow graph that will hold the
    /// constructed instructions.
    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph;

    /// Insert an instruction and return a reference to it, consuming the
    /// builder. The result values are created with `ctrl_typevar` as the
    /// controlling type.
    fn build(self, data: InstructionData, ctrl_typevar: Type) -> (Inst, &'f mut DataFlowGraph);
}

/// Instruction builder methods.
///
/// Each method constructs a single instruction of a particular opcode,
/// inserts it, and returns its result value (or the instruction itself for
/// instructions without results).
pub trait InstBuilder<'f>: InstBuilderBase<'f> {
    // -- Control flow. --------------------------------------------------

    /// Unconditional jump to `destination`, passing `args` as the block
    /// arguments.
    fn jump(mut self, destination: Block, args: &[Value]) -> Inst {
        let destination = {
            let pool = &mut self.data_flow_graph_mut().value_lists;
            BlockCall::new(destination, args, pool)
        };
        self.build(
            InstructionData::Jump {
                opcode: Opcode::Jump,
                destination,
            },
            types::INVALID,
        )
        .0
    }

    /// Conditional branch: to `block_then` when `c` is non-zero, to
    /// `block_else` otherwise.
    fn brif(
        mut self,
        c: Value,
        block_then: Block,
        args_then: &[Value],
        block_else: Block,
        args_else: &[Value],
    ) -> Inst {
        let blocks = {
            let pool = &mut self.data_flow_graph_mut().value_lists;
            [
                BlockCall::new(block_then, args_then, pool),
                BlockCall::new(block_else, args_else, pool),
            ]
        };
        self.build(
            InstructionData::Brif {
                opcode: Opcode::Brif,
                arg: c,
                blocks,
            },
            types::INVALID,
        )
        .0
    }

    /// Indirect branch via jump table.
    ///
    /// Use `x` as an unsigned index into the jump table `jt`. If a jump
    /// table entry is found, branch to the corresponding block. If no entry
    /// was found or the index is out-of-bounds, branch to the table's
    /// default block.
    fn br_table(self, x: Value, jt: JumpTable) -> Inst {
        self.build(
            InstructionData::BranchTable {
                opcode: Opcode::BrTable,
                arg: x,
                table: jt,
            },
            types::INVALID,
        )
        .0
    }

    /// Return from the function with the given values.
    fn return_(mut self, rvals: &[Value]) -> Inst {
        let args = {
            let pool = &mut self.data_flow_graph_mut().value_lists;
            crate::ir::instructions::ValueList::from_slice(rvals, pool)
        };
        self.build(
            InstructionData::MultiAry {
                opcode: Opcode::Return,
                args,
            },
            types::INVALID,
        )
        .0
    }

    /// Direct call to the function `func_ref` with `args`.
    fn call(mut self, func_ref: FuncRef, args: &[Value]) -> Inst {
        let args = {
            let pool = &mut self.data_flow_graph_mut().value_lists;
            crate::ir::instructions::ValueList::from_slice(args, pool)
        };
        self.build(
            InstructionData::Call {
                opcode: Opcode::Call,
                func_ref,
                args,
            },
            types::INVALID,
        )
        .0
    }

    /// Indirect call to the address `callee` with signature `sig_ref` and
    /// `args`.
    fn call_indirect(mut self, sig_ref: SigRef, callee: Value, args: &[Value]) -> Inst {
        let all_args = {
            let pool = &mut self.data_flow_graph_mut().value_lists;
            let mut list = crate::ir::instructions::ValueList::from_slice(&[callee], pool);
            list.extend(args.iter().copied(), pool);
            list
        };
        self.build(
            InstructionData::CallIndirect {
                opcode: Opcode::CallIndirect,
                sig_ref,
                args: all_args,
            },
            types::INVALID,
        )
        .0
    }

    /// Unconditional trap with the given code.
    fn trap(self, code: TrapCode) -> Inst {
        self.build(
            InstructionData::Trap {
                opcode: Opcode::Trap,
                code,
            },
            types::INVALID,
        )
        .0
    }

    // -- Constants. -----------------------------------------------------

    /// Integer constant of type `ty`.
    fn iconst(self, ty: Type, imm: impl Into<Imm64>) -> Value {
        let (inst, dfg) = self.build(
            InstructionData::UnaryImm {
                opcode: Opcode::Iconst,
                imm: imm.into(),
            },
            ty,
        );
        dfg.first_result(inst)
    }

    /// 32-bit float constant.
    fn f32const(self, imm: Ieee32) -> Value {
        let (inst, dfg) = self.build(
            InstructionData::UnaryIeee32 {
                opcode: Opcode::F32const,
                imm,
            },
            types::F32,
        );
        dfg.first_result(inst)
    }

    /// 64-bit float constant.
    fn f64const(self, imm: Ieee64) -> Value {
        let (inst, dfg) = self.build(
            InstructionData::UnaryIeee64 {
                opcode: Opcode::F64const,
                imm,
            },
            types::F64,
        );
        dfg.first_result(inst)
    }

    /// Conditional select: `x` when `c` is non-zero, `y` otherwise.
    fn select(self, c: Value, x: Value, y: Value) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        let (inst, dfg) = self.build(
            InstructionData::Ternary {
                opcode: Opcode::Select,
                args: [c, x, y],
            },
            ty,
        );
        dfg.first_result(inst)
    }

    // -- Integer arithmetic. --------------------------------------------

    /// Build a two-operand instruction whose controlling type is the type
    /// of `x`.
    fn binary(self, opcode: Opcode, x: Value, y: Value) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        let (inst, dfg) = self.build(InstructionData::Binary { opcode, args: [x, y] }, ty);
        dfg.first_result(inst)
    }

    /// Build a one-operand instruction whose controlling type is the type
    /// of `x`.
    fn unary(self, opcode: Opcode, x: Value) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        let (inst, dfg) = self.build(InstructionData::Unary { opcode, arg: x }, ty);
        dfg.first_result(inst)
    }

    /// Wrapping integer addition.
    fn iadd(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Iadd, x, y)
    }

    /// Wrapping integer subtraction.
    fn isub(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Isub, x, y)
    }

    /// Wrapping integer multiplication.
    fn imul(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Imul, x, y)
    }

    /// Unsigned integer division, trapping when the divisor is zero.
    fn udiv(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Udiv, x, y)
    }

    /// Signed integer division, trapping on zero divisors and on overflow.
    fn sdiv(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Sdiv, x, y)
    }

    /// Unsigned integer remainder.
    fn urem(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Urem, x, y)
    }

    /// Signed integer remainder.
    fn srem(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Srem, x, y)
    }

    /// Bitwise and.
    fn band(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Band, x, y)
    }

    /// Bitwise or.
    fn bor(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Bor, x, y)
    }

    /// Bitwise xor.
    fn bxor(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Bxor, x, y)
    }

    /// Shift left; the shift amount is masked to the type width.
    fn ishl(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Ishl, x, y)
    }

    /// Logical shift right.
    fn ushr(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Ushr, x, y)
    }

    /// Arithmetic shift right.
    fn sshr(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Sshr, x, y)
    }

    /// Rotate left.
    fn rotl(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Rotl, x, y)
    }

    /// Rotate right.
    fn rotr(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Rotr, x, y)
    }

    /// Count leading zero bits.
    fn clz(self, x: Value) -> Value {
        self.unary(Opcode::Clz, x)
    }

    /// Count trailing zero bits.
    fn ctz(self, x: Value) -> Value {
        self.unary(Opcode::Ctz, x)
    }

    /// Population count.
    fn popcnt(self, x: Value) -> Value {
        self.unary(Opcode::Popcnt, x)
    }

    /// Integer comparison producing an `i8` result.
    fn icmp(self, cond: IntCC, x: Value, y: Value) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        let (inst, dfg) = self.build(
            InstructionData::IntCompare {
                opcode: Opcode::Icmp,
                args: [x, y],
                cond,
            },
            ty,
        );
        dfg.first_result(inst)
    }

    // -- Width changes. -------------------------------------------------

    /// Build a one-operand conversion whose controlling type is the
    /// destination type.
    fn unary_to(self, opcode: Opcode, ty: Type, x: Value) -> Value {
        let (inst, dfg) = self.build(InstructionData::Unary { opcode, arg: x }, ty);
        dfg.first_result(inst)
    }

    /// Zero-extend `x` to type `ty`.
    fn uextend(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::Uextend, ty, x)
    }

    /// Sign-extend `x` to type `ty`.
    fn sextend(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::Sextend, ty, x)
    }

    /// Truncate `x` to the narrower type `ty`.
    fn ireduce(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::Ireduce, ty, x)
    }

    // -- Floating point. ------------------------------------------------

    /// Floating point addition.
    fn fadd(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fadd, x, y)
    }

    /// Floating point subtraction.
    fn fsub(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fsub, x, y)
    }

    /// Floating point multiplication.
    fn fmul(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fmul, x, y)
    }

    /// Floating point division.
    fn fdiv(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fdiv, x, y)
    }

    /// Floating point negation.
    fn fneg(self, x: Value) -> Value {
        self.unary(Opcode::Fneg, x)
    }

    /// Floating point absolute value.
    fn fabs(self, x: Value) -> Value {
        self.unary(Opcode::Fabs, x)
    }

    /// Floating point square root.
    fn sqrt(self, x: Value) -> Value {
        self.unary(Opcode::Sqrt, x)
    }

    /// Floating point minimum, propagating NaN.
    fn fmin(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fmin, x, y)
    }

    /// Floating point maximum, propagating NaN.
    fn fmax(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fmax, x, y)
    }

    /// Floating point comparison producing an `i8` result.
    fn fcmp(self, cond: FloatCC, x: Value, y: Value) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        let (inst, dfg) = self.build(
            InstructionData::FloatCompare {
                opcode: Opcode::Fcmp,
                args: [x, y],
                cond,
            },
            ty,
        );
        dfg.first_result(inst)
    }

    /// Convert `f32` to `f64`.
    fn fpromote(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::Fpromote, ty, x)
    }

    /// Convert `f64` to `f32`.
    fn fdemote(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::Fdemote, ty, x)
    }

    /// Convert float to signed integer, trapping on NaN and overflow.
    fn fcvt_to_sint(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::FcvtToSint, ty, x)
    }

    /// Convert float to unsigned integer, trapping on NaN and overflow.
    fn fcvt_to_uint(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::FcvtToUint, ty, x)
    }

    /// Convert signed integer to float.
    fn fcvt_from_sint(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::FcvtFromSint, ty, x)
    }

    /// Convert unsigned integer to float.
    fn fcvt_from_uint(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::FcvtFromUint, ty, x)
    }

    /// Reinterpret the bits of `x` as `ty` without changing them.
    fn bitcast(self, ty: Type, x: Value) -> Value {
        self.unary_to(Opcode::Bitcast, ty, x)
    }

    // -- Memory. --------------------------------------------------------

    /// Build a load of `ty` from `addr + offset`.
    fn load_op(
        self,
        opcode: Opcode,
        ty: Type,
        flags: MemFlags,
        addr: Value,
        offset: impl Into<Offset32>,
    ) -> Value {
        let (inst, dfg) = self.build(
            InstructionData::Load {
                opcode,
                arg: addr,
                flags,
                offset: offset.into(),
            },
            ty,
        );
        dfg.first_result(inst)
    }

    /// Load `ty` from memory at `addr + offset`.
    fn load(self, ty: Type, flags: MemFlags, addr: Value, offset: impl Into<Offset32>) -> Value {
        self.load_op(Opcode::Load, ty, flags, addr, offset)
    }

    /// Load an unsigned 8-bit value, zero-extended to `ty`.
    fn uload8(self, ty: Type, flags: MemFlags, addr: Value, offset: impl Into<Offset32>) -> Value {
        self.load_op(Opcode::Uload8, ty, flags, addr, offset)
    }

    /// Load a signed 8-bit value, sign-extended to `ty`.
    fn sload8(self, ty: Type, flags: MemFlags, addr: Value, offset: impl Into<Offset32>) -> Value {
        self.load_op(Opcode::Sload8, ty, flags, addr, offset)
    }

    /// Load an unsigned 16-bit value, zero-extended to `ty`.
    fn uload16(self, ty: Type, flags: MemFlags, addr: Value, offset: impl Into<Offset32>) -> Value {
        self.load_op(Opcode::Uload16, ty, flags, addr, offset)
    }

    /// Load a signed 16-bit value, sign-extended to `ty`.
    fn sload16(self, ty: Type, flags: MemFlags, addr: Value, offset: impl Into<Offset32>) -> Value {
        self.load_op(Opcode::Sload16, ty, flags, addr, offset)
    }

    /// Load an unsigned 32-bit value, zero-extended to `ty`.
    fn uload32(self, ty: Type, flags: MemFlags, addr: Value, offset: impl Into<Offset32>) -> Value {
        self.load_op(Opcode::Uload32, ty, flags, addr, offset)
    }

    /// Load a signed 32-bit value, sign-extended to `ty`.
    fn sload32(self, ty: Type, flags: MemFlags, addr: Value, offset: impl Into<Offset32>) -> Value {
        self.load_op(Opcode::Sload32, ty, flags, addr, offset)
    }

    /// Build a store of `x` to `addr + offset`.
    fn store_op(
        self,
        opcode: Opcode,
        flags: MemFlags,
        x: Value,
        addr: Value,
        offset: impl Into<Offset32>,
    ) -> Inst {
        self.build(
            InstructionData::Store {
                opcode,
                args: [x, addr],
                flags,
                offset: offset.into(),
            },
            types::INVALID,
        )
        .0
    }

    /// Store `x` to memory at `addr + offset`.
    fn store(self, flags: MemFlags, x: Value, addr: Value, offset: impl Into<Offset32>) -> Inst {
        self.store_op(Opcode::Store, flags, x, addr, offset)
    }

    /// Store the low 8 bits of `x`.
    fn istore8(self, flags: MemFlags, x: Value, addr: Value, offset: impl Into<Offset32>) -> Inst {
        self.store_op(Opcode::Istore8, flags, x, addr, offset)
    }

    /// Store the low 16 bits of `x`.
    fn istore16(self, flags: MemFlags, x: Value, addr: Value, offset: impl Into<Offset32>) -> Inst {
        self.store_op(Opcode::Istore16, flags, x, addr, offset)
    }

    /// Store the low 32 bits of `x`.
    fn istore32(self, flags: MemFlags, x: Value, addr: Value, offset: impl Into<Offset32>) -> Inst {
        self.store_op(Opcode::Istore32, flags, x, addr, offset)
    }
}

impl<'f, T: InstBuilderBase<'f>> InstBuilder<'f> for T {}
