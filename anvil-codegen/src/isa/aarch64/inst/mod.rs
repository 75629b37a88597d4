//! This module defines aarch64-specific machine instruction types.

use crate::binemit::CodeOffset;
use crate::ir::types::{F32, F64, I16, I32, I64, I8};
use crate::ir::{ExternalName, TrapCode, Type};
use crate::machinst::abi::{ArgPair, RetPair, StackArgPair};
use crate::machinst::{
    MachInst, MachInstLabelUse, MachLabel, MachTerminator, OperandVisitor, PRegSet, Reg, RegClass,
    Writable,
};
use crate::result::{CodegenError, CodegenResult};
use smallvec::{smallvec, SmallVec};
use std::boxed::Box;
use std::vec::Vec;

pub mod args;
pub mod emit;
pub mod imms;
pub mod regs;
#[cfg(test)]
mod emit_tests;

pub use self::args::*;
pub use self::imms::*;
pub use self::regs::*;

/// The shift-or-not choice of the move-wide family: MOVZ moves a shifted
/// 16-bit chunk over zeros, MOVN over ones (bitwise-inverted).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveWideOp {
    /// MOVZ.
    MovZ,
    /// MOVN.
    MovN,
}

/// A conversion from float to integer (raw instruction; range/NaN checks
/// are separate).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FpuToIntOp {
    /// f32 -> signed i32.
    F32ToI32,
    /// f32 -> unsigned i32.
    F32ToU32,
    /// f32 -> signed i64.
    F32ToI64,
    /// f32 -> unsigned i64.
    F32ToU64,
    /// f64 -> signed i32.
    F64ToI32,
    /// f64 -> unsigned i32.
    F64ToU32,
    /// f64 -> signed i64.
    F64ToI64,
    /// f64 -> unsigned i64.
    F64ToU64,
}

/// A conversion from integer to float.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntToFpuOp {
    /// Signed i32 -> f32.
    I32ToF32,
    /// Unsigned i32 -> f32.
    U32ToF32,
    /// Signed i32 -> f64.
    I32ToF64,
    /// Unsigned i32 -> f64.
    U32ToF64,
    /// Signed i64 -> f32.
    I64ToF32,
    /// Unsigned i64 -> f32.
    U64ToF32,
    /// Signed i64 -> f64.
    I64ToF64,
    /// Unsigned i64 -> f64.
    U64ToF64,
}

/// Additional information for a direct call.
#[derive(Clone, Debug)]
pub struct CallInfo {
    /// The external symbol being called.
    pub dest: ExternalName,
    /// Arguments in fixed registers.
    pub uses: SmallVec<[RetPair; 8]>,
    /// Results in fixed registers.
    pub defs: SmallVec<[ArgPair; 2]>,
    /// Registers clobbered by the callee.
    pub clobbers: PRegSet,
}

/// Additional information for an indirect call.
#[derive(Clone, Debug)]
pub struct CallIndInfo {
    /// The callee address.
    pub rn: Reg,
    /// Arguments in fixed registers.
    pub uses: SmallVec<[RetPair; 8]>,
    /// Results in fixed registers.
    pub defs: SmallVec<[ArgPair; 2]>,
    /// Registers clobbered by the callee.
    pub clobbers: PRegSet,
}

/// Additional information for a jump-table dispatch sequence.
#[derive(Clone, Debug)]
pub struct JTSequenceInfo {
    /// The case targets, indexed by the dispatch value.
    pub targets: Vec<BranchTarget>,
    /// The default target, taken when the index is out of bounds.
    pub default_target: BranchTarget,
}

/// An AArch64 machine instruction.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Inst {
    /// An ALU operation with two register sources and one destination.
    AluRRR {
        alu_op: ALUOp,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
    },
    /// A multiply-add/subtract.
    AluRRRR {
        alu_op: ALUOp3,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
        ra: Reg,
    },
    /// Add/subtract with a 12-bit immediate.
    AluRRImm12 {
        alu_op: ALUOp,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        imm12: Imm12,
    },
    /// Logical operation with a bitmask immediate.
    AluRRImmLogic {
        alu_op: ALUOp,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        imml: ImmLogic,
    },
    /// Shift with an immediate amount.
    AluRRImmShift {
        alu_op: ALUOp,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
        immshift: ImmShift,
    },
    /// A bit operation (rbit, clz).
    BitRR {
        op: BitOp,
        size: OperandSize,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// An unsigned 8-bit load, zero-extended.
    ULoad8 { rd: Writable<Reg>, mem: AMode },
    /// A signed 8-bit load, sign-extended to 64 bits.
    SLoad8 { rd: Writable<Reg>, mem: AMode },
    ULoad16 { rd: Writable<Reg>, mem: AMode },
    SLoad16 { rd: Writable<Reg>, mem: AMode },
    ULoad32 { rd: Writable<Reg>, mem: AMode },
    SLoad32 { rd: Writable<Reg>, mem: AMode },
    /// A 64-bit load.
    ULoad64 { rd: Writable<Reg>, mem: AMode },
    Store8 { rd: Reg, mem: AMode },
    Store16 { rd: Reg, mem: AMode },
    Store32 { rd: Reg, mem: AMode },
    Store64 { rd: Reg, mem: AMode },
    /// A store-pair (used by the prologue).
    StoreP64 { rt: Reg, rt2: Reg, mem: PairAMode },
    /// A load-pair (used by the epilogue).
    LoadP64 {
        rt: Writable<Reg>,
        rt2: Writable<Reg>,
        mem: PairAMode,
    },
    /// A register move (`mov`, encoded as `orr` with the zero register).
    Mov {
        size: OperandSize,
        rd: Writable<Reg>,
        rm: Reg,
    },
    /// A MOVZ or MOVN with a 16-bit shifted immediate.
    MovWide {
        op: MoveWideOp,
        rd: Writable<Reg>,
        imm: MoveWideConst,
        size: OperandSize,
    },
    /// A MOVK: insert a 16-bit chunk, keeping the other bits. Reads and
    /// writes the destination.
    MovK {
        rd: Writable<Reg>,
        rn: Reg,
        imm: MoveWideConst,
        size: OperandSize,
    },
    /// A sign- or zero-extension.
    Extend {
        rd: Writable<Reg>,
        rn: Reg,
        signed: bool,
        from_bits: u8,
        to_bits: u8,
    },
    /// Conditional select.
    CSel {
        rd: Writable<Reg>,
        cond: Cond,
        rn: Reg,
        rm: Reg,
    },
    /// Conditional set (materialize a flag into a register).
    CSet { rd: Writable<Reg>, cond: Cond },
    /// Conditional compare with immediate.
    CCmpImm {
        size: OperandSize,
        rn: Reg,
        imm: u8,
        nzcv: NZCV,
        cond: Cond,
    },
    /// FPU register move.
    FpuMove {
        size: ScalarSize,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// A 1-operand FPU instruction.
    FpuRR {
        fpu_op: FPUOp1,
        size: ScalarSize,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// A 2-operand FPU instruction.
    FpuRRR {
        fpu_op: FPUOp2,
        size: ScalarSize,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
    },
    /// FPU comparison, setting the NZCV flags.
    FpuCmp { size: ScalarSize, rn: Reg, rm: Reg },
    FpuLoad32 { rd: Writable<Reg>, mem: AMode },
    FpuLoad64 { rd: Writable<Reg>, mem: AMode },
    FpuStore32 { rd: Reg, mem: AMode },
    FpuStore64 { rd: Reg, mem: AMode },
    /// FPU conditional select.
    FpuCSel {
        size: ScalarSize,
        rd: Writable<Reg>,
        rn: Reg,
        rm: Reg,
        cond: Cond,
    },
    /// Raw float-to-integer conversion (fcvtzs/fcvtzu).
    FpuToInt {
        op: FpuToIntOp,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// Integer-to-float conversion (scvtf/ucvtf).
    IntToFpu {
        op: IntToFpuOp,
        rd: Writable<Reg>,
        rn: Reg,
    },
    /// Load a 32-bit float constant from a literal-pool island.
    FpuLoadConst32 { rd: Writable<Reg>, const_data: u32 },
    /// Load a 64-bit float constant from a literal-pool island.
    FpuLoadConst64 { rd: Writable<Reg>, const_data: u64 },
    /// Move from an integer to a float register (fmov).
    MovToFpu {
        rd: Writable<Reg>,
        rn: Reg,
        size: ScalarSize,
    },
    /// Move from a float to an integer register (fmov).
    MovFromFpu {
        rd: Writable<Reg>,
        rn: Reg,
        size: ScalarSize,
    },
    /// Per-byte population count (`cnt vd.8b, vn.8b`).
    VecCnt8B { rd: Writable<Reg>, rn: Reg },
    /// Horizontal byte add (`addv bd, vn.8b`).
    VecAddv8B { rd: Writable<Reg>, rn: Reg },
    /// A direct call.
    Call { info: Box<CallInfo> },
    /// An indirect call.
    CallInd { info: Box<CallIndInfo> },
    /// The entry-block pseudo instruction defining the register
    /// arguments, and the stack arguments in their reserved frame slots.
    Args {
        args: Vec<ArgPair>,
        stack_args: Vec<StackArgPair>,
    },
    /// The return pseudo instruction: carries the returned values as
    /// fixed-register uses and expands to epilogue-plus-`ret`.
    Rets { rets: Vec<RetPair> },
    /// An unconditional branch.
    Jump { dest: BranchTarget },
    /// A conditional branch, with both taken and not-taken targets.
    CondBr {
        taken: BranchTarget,
        not_taken: BranchTarget,
        kind: CondBrKind,
    },
    /// A one-way conditional branch that falls through when not taken.
    /// Only used inside a terminator group, before the instruction that
    /// handles the fall-through case.
    OneWayCondBr {
        target: BranchTarget,
        kind: CondBrKind,
    },
    /// Trap if the condition holds.
    TrapIf {
        kind: CondBrKind,
        trap_code: TrapCode,
    },
    /// Jump-table dispatch: bounds-checked indirect branch through an
    /// inline table of 32-bit offsets.
    JTSequence {
        info: Box<JTSequenceInfo>,
        ridx: Reg,
        rtmp1: Writable<Reg>,
        rtmp2: Writable<Reg>,
    },
    /// Load the address of an external symbol (via a literal with an
    /// absolute relocation).
    LoadExtName {
        rd: Writable<Reg>,
        name: Box<ExternalName>,
        offset: i64,
    },
    /// An undefined-instruction trap.
    Udf { trap_code: TrapCode },
    /// A no-op of 4 bytes.
    Nop4,
}

impl Inst {
    /// Create instructions that load a 64-bit constant into a register,
    /// using MOVZ/MOVN when a single move-wide suffices, a logical
    /// immediate when the constant is a bitmask pattern, and a
    /// MOVZ/MOVK chain otherwise. Intermediate values get fresh registers
    /// from `alloc_tmp`, so the result stays in SSA form.
    pub fn load_constant(
        rd: Writable<Reg>,
        value: u64,
        alloc_tmp: &mut dyn FnMut(Type) -> Writable<Reg>,
    ) -> SmallVec<[Inst; 4]> {
        if let Some(imm) = MoveWideConst::maybe_from_u64(value) {
            return smallvec![Inst::MovWide {
                op: MoveWideOp::MovZ,
                rd,
                imm,
                size: OperandSize::Size64,
            }];
        }
        if let Some(imm) = MoveWideConst::maybe_from_u64(!value) {
            return smallvec![Inst::MovWide {
                op: MoveWideOp::MovN,
                rd,
                imm,
                size: OperandSize::Size64,
            }];
        }
        if let Some(imml) = ImmLogic::maybe_from_u64(value, I64) {
            return smallvec![Inst::AluRRImmLogic {
                alu_op: ALUOp::Orr,
                size: OperandSize::Size64,
                rd,
                rn: zero_reg(),
                imml,
            }];
        }

        // A MOVZ of the first nonzero chunk, then MOVK for each further
        // nonzero chunk.
        let mut insts: SmallVec<[Inst; 4]> = SmallVec::new();
        let mut first_seen = false;
        let mut src: Option<Reg> = None;
        let nonzero: Vec<u8> = (0..4)
            .filter(|&c| (value >> (c * 16)) & 0xffff != 0)
            .collect();
        for (i, &chunk) in nonzero.iter().enumerate() {
            let imm = MoveWideConst::from_chunk_of(value, chunk);
            let last = i == nonzero.len() - 1;
            let dst = if last { rd } else { alloc_tmp(I64) };
            if !first_seen {
                insts.push(Inst::MovWide {
                    op: MoveWideOp::MovZ,
                    rd: dst,
                    imm,
                    size: OperandSize::Size64,
                });
                first_seen = true;
            } else {
                insts.push(Inst::MovK {
                    rd: dst,
                    rn: src.unwrap(),
                    imm,
                    size: OperandSize::Size64,
                });
            }
            src = Some(dst.to_reg());
        }
        insts
    }

    /// The load instruction of the right width for `ty`, into `rd`.
    pub fn gen_load(rd: Writable<Reg>, mem: AMode, ty: Type) -> Inst {
        match ty {
            I8 => Inst::ULoad8 { rd, mem },
            I16 => Inst::ULoad16 { rd, mem },
            I32 => Inst::ULoad32 { rd, mem },
            I64 => Inst::ULoad64 { rd, mem },
            F32 => Inst::FpuLoad32 { rd, mem },
            F64 => Inst::FpuLoad64 { rd, mem },
            _ => panic!("gen_load: unsupported type {ty}"),
        }
    }

    /// The store instruction of the right width for `ty`.
    pub fn gen_store(rd: Reg, mem: AMode, ty: Type) -> Inst {
        match ty {
            I8 => Inst::Store8 { rd, mem },
            I16 => Inst::Store16 { rd, mem },
            I32 => Inst::Store32 { rd, mem },
            I64 => Inst::Store64 { rd, mem },
            F32 => Inst::FpuStore32 { rd, mem },
            F64 => Inst::FpuStore64 { rd, mem },
            _ => panic!("gen_store: unsupported type {ty}"),
        }
    }
}

fn memarg_operands(mem: &mut AMode, visitor: &mut impl OperandVisitor) {
    match mem {
        AMode::Unscaled { rn, .. } | AMode::UnsignedOffset { rn, .. } => visitor.reg_use(rn),
        AMode::RegReg { rn, rm } => {
            visitor.reg_use(rn);
            visitor.reg_use(rm);
        }
        // SP/frame-relative modes use no allocatable registers.
        AMode::SPOffset { .. }
        | AMode::IncomingArg { .. }
        | AMode::SpillOffset { .. }
        | AMode::StackSlotOffset { .. } => {}
    }
}

impl MachInst for Inst {
    type ABIMachineSpec = crate::isa::aarch64::abi::AArch64MachineDeps;
    type LabelUse = LabelUse;

    fn get_operands(&mut self, visitor: &mut impl OperandVisitor) {
        match self {
            Inst::AluRRR { rd, rn, rm, .. } => {
                visitor.reg_use(rn);
                visitor.reg_use(rm);
                visitor.reg_def(rd);
            }
            Inst::AluRRRR { rd, rn, rm, ra, .. } => {
                visitor.reg_use(rn);
                visitor.reg_use(rm);
                visitor.reg_use(ra);
                visitor.reg_def(rd);
            }
            Inst::AluRRImm12 { rd, rn, .. }
            | Inst::AluRRImmLogic { rd, rn, .. }
            | Inst::AluRRImmShift { rd, rn, .. }
            | Inst::BitRR { rd, rn, .. }
            | Inst::Extend { rd, rn, .. } => {
                visitor.reg_use(rn);
                visitor.reg_def(rd);
            }
            Inst::ULoad8 { rd, mem }
            | Inst::SLoad8 { rd, mem }
            | Inst::ULoad16 { rd, mem }
            | Inst::SLoad16 { rd, mem }
            | Inst::ULoad32 { rd, mem }
            | Inst::SLoad32 { rd, mem }
            | Inst::ULoad64 { rd, mem }
            | Inst::FpuLoad32 { rd, mem }
            | Inst::FpuLoad64 { rd, mem } => {
                memarg_operands(mem, visitor);
                visitor.reg_def(rd);
            }
            Inst::Store8 { rd, mem }
            | Inst::Store16 { rd, mem }
            | Inst::Store32 { rd, mem }
            | Inst::Store64 { rd, mem }
            | Inst::FpuStore32 { rd, mem }
            | Inst::FpuStore64 { rd, mem } => {
                visitor.reg_use(rd);
                memarg_operands(mem, visitor);
            }
            Inst::StoreP64 { .. } | Inst::LoadP64 { .. } => {
                // Only used in the prologue/epilogue, with fixed
                // registers; nothing to allocate.
            }
            Inst::Mov { rd, rm, .. } => {
                visitor.reg_use(rm);
                visitor.reg_def(rd);
            }
            Inst::MovWide { rd, .. } => visitor.reg_def(rd),
            Inst::MovK { rd, rn, .. } => {
                visitor.reg_use(rn);
                visitor.reg_reuse_def(rd, 0);
            }
            Inst::CSel { rd, rn, rm, .. } | Inst::FpuCSel { rd, rn, rm, .. } => {
                visitor.reg_use(rn);
                visitor.reg_use(rm);
                visitor.reg_def(rd);
            }
            Inst::CSet { rd, .. } => visitor.reg_def(rd),
            Inst::CCmpImm { rn, .. } => visitor.reg_use(rn),
            Inst::FpuMove { rd, rn, .. }
            | Inst::FpuRR { rd, rn, .. }
            | Inst::FpuToInt { rd, rn, .. }
            | Inst::IntToFpu { rd, rn, .. }
            | Inst::MovToFpu { rd, rn, .. }
            | Inst::MovFromFpu { rd, rn, .. }
            | Inst::VecCnt8B { rd, rn }
            | Inst::VecAddv8B { rd, rn } => {
                visitor.reg_use(rn);
                visitor.reg_def(rd);
            }
            Inst::FpuRRR { rd, rn, rm, .. } => {
                visitor.reg_use(rn);
                visitor.reg_use(rm);
                visitor.reg_def(rd);
            }
            Inst::FpuCmp { rn, rm, .. } => {
                visitor.reg_use(rn);
                visitor.reg_use(rm);
            }
            Inst::FpuLoadConst32 { rd, .. } | Inst::FpuLoadConst64 { rd, .. } => {
                visitor.reg_def(rd)
            }
            Inst::Call { info } => {
                for u in &mut info.uses {
                    visitor.reg_fixed_use(&mut u.vreg, u.preg);
                }
                for d in &mut info.defs {
                    visitor.reg_fixed_def(&mut d.vreg, d.preg);
                }
                visitor.reg_clobbers(info.clobbers);
            }
            Inst::CallInd { info } => {
                visitor.reg_use(&mut info.rn);
                for u in &mut info.uses {
                    visitor.reg_fixed_use(&mut u.vreg, u.preg);
                }
                for d in &mut info.defs {
                    visitor.reg_fixed_def(&mut d.vreg, d.preg);
                }
                visitor.reg_clobbers(info.clobbers);
            }
            Inst::Args { args, stack_args } => {
                for arg in args {
                    visitor.reg_fixed_def(&mut arg.vreg, arg.preg);
                }
                for arg in stack_args {
                    visitor.reg_fixed_stack_def(&mut arg.vreg, arg.slot);
                }
            }
            Inst::Rets { rets } => {
                for ret in rets {
                    visitor.reg_fixed_use(&mut ret.vreg, ret.preg);
                }
            }
            Inst::Jump { .. } | Inst::Nop4 | Inst::Udf { .. } => {}
            Inst::CondBr { kind, .. }
            | Inst::OneWayCondBr { kind, .. }
            | Inst::TrapIf { kind, .. } => match kind {
                CondBrKind::Zero(r) | CondBrKind::NotZero(r) => visitor.reg_use(r),
                CondBrKind::Cond(_) => {}
            },
            Inst::JTSequence {
                ridx, rtmp1, rtmp2, ..
            } => {
                visitor.reg_use(ridx);
                visitor.reg_early_def(rtmp1);
                visitor.reg_early_def(rtmp2);
            }
            Inst::LoadExtName { rd, .. } => visitor.reg_def(rd),
        }
    }

    fn is_move(&self) -> Option<(Writable<Reg>, Reg)> {
        match self {
            &Inst::Mov {
                size: OperandSize::Size64,
                rd,
                rm,
            } => Some((rd, rm)),
            &Inst::FpuMove { rd, rn, .. } => Some((rd, rn)),
            _ => None,
        }
    }

    fn is_term(&self) -> MachTerminator {
        match self {
            Inst::Rets { .. } => MachTerminator::Ret,
            Inst::Jump { .. } | Inst::CondBr { .. } | Inst::JTSequence { .. } => {
                MachTerminator::Branch
            }
            Inst::Udf { .. } => MachTerminator::Ret,
            _ => MachTerminator::None,
        }
    }

    fn is_args(&self) -> bool {
        matches!(self, Inst::Args { .. })
    }

    fn gen_move(to_reg: Writable<Reg>, from_reg: Reg, ty: Type) -> Inst {
        match ty {
            F32 | F64 => Inst::FpuMove {
                size: ScalarSize::Size64,
                rd: to_reg,
                rn: from_reg,
            },
            _ => Inst::Mov {
                size: OperandSize::Size64,
                rd: to_reg,
                rm: from_reg,
            },
        }
    }

    fn gen_jump(target: MachLabel) -> Inst {
        Inst::Jump {
            dest: BranchTarget::Label(target),
        }
    }

    fn gen_nop(preferred_size: usize) -> Inst {
        debug_assert!(preferred_size >= 4);
        Inst::Nop4
    }

    fn rc_for_type(ty: Type) -> CodegenResult<RegClass> {
        match ty {
            I8 | I16 | I32 | I64 => Ok(RegClass::Int),
            F32 | F64 => Ok(RegClass::Float),
            _ => Err(CodegenError::Unsupported(format!(
                "type {ty} not supported on aarch64"
            ))),
        }
    }

    fn worst_case_size() -> CodeOffset {
        // The float-to-int check sequences; jump tables add their table
        // size, which the emission of JTSequence accounts for itself.
        44
    }
}

/// Different forms of label references for different instruction formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelUse {
    /// 26-bit branch offset (unconditional branches and calls), PC-rel,
    /// range +/- 128 MiB, shifted right by 2.
    Branch26,
    /// 19-bit branch offset (conditional branches, cbz/cbnz, ldr
    /// literal), PC-rel, range +/- 1 MiB, shifted right by 2.
    Branch19,
    /// 32-bit PC-relative offset, used in jump tables.
    PCRel32,
}

impl MachInstLabelUse for LabelUse {
    /// Alignment for veneer code: every AArch64 instruction is 4 bytes.
    const ALIGN: CodeOffset = 4;

    fn max_pos_range(self) -> CodeOffset {
        match self {
            // PC-rel offset is shifted right by 2; 25 bits of positive
            // magnitude remain (26-bit signed field).
            LabelUse::Branch26 => (1 << 27) - 1,
            LabelUse::Branch19 => (1 << 20) - 1,
            LabelUse::PCRel32 => 0x7fff_ffff,
        }
    }

    fn max_neg_range(self) -> CodeOffset {
        match self {
            LabelUse::Branch26 => 1 << 27,
            LabelUse::Branch19 => 1 << 20,
            LabelUse::PCRel32 => 0x8000_0000,
        }
    }

    fn patch_size(self) -> CodeOffset {
        4
    }

    fn patch(self, buffer: &mut [u8], use_offset: CodeOffset, label_offset: CodeOffset) {
        let pc_rel = (label_offset as i64) - (use_offset as i64);
        let insn_word = u32::from_le_bytes(
            buffer[use_offset as usize..use_offset as usize + 4]
                .try_into()
                .unwrap(),
        );
        let patched = match self {
            LabelUse::Branch26 => {
                debug_assert_eq!(pc_rel & 3, 0);
                let imm26 = ((pc_rel >> 2) as u32) & ((1 << 26) - 1);
                (insn_word & !((1 << 26) - 1)) | imm26
            }
            LabelUse::Branch19 => {
                debug_assert_eq!(pc_rel & 3, 0);
                let imm19 = ((pc_rel >> 2) as u32) & ((1 << 19) - 1);
                (insn_word & !(((1 << 19) - 1) << 5)) | (imm19 << 5)
            }
            LabelUse::PCRel32 => (pc_rel as u32).wrapping_add(insn_word),
        };
        buffer[use_offset as usize..use_offset as usize + 4]
            .copy_from_slice(&patched.to_le_bytes());
    }

    fn supports_veneer(self) -> bool {
        // A conditional branch extends through an unconditional one.
        matches!(self, LabelUse::Branch19)
    }

    fn veneer_size(self) -> CodeOffset {
        4
    }

    fn worst_case_veneer_size() -> CodeOffset {
        4
    }

    fn generate_veneer(
        self,
        buffer: &mut [u8],
        veneer_offset: CodeOffset,
    ) -> (CodeOffset, Self) {
        match self {
            LabelUse::Branch19 => {
                // Unconditional branch with an unfilled 26-bit offset.
                let insn_word: u32 = 0b000101 << 26;
                buffer[0..4].copy_from_slice(&insn_word.to_le_bytes());
                (veneer_offset, LabelUse::Branch26)
            }
            _ => panic!("veneer not supported for {self:?}"),
        }
    }
}
