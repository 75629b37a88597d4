//! This module defines x86-64-specific machine instruction types.

use crate::binemit::CodeOffset;
use crate::ir::types::{F32, F64, I16, I32, I64, I8};
use crate::ir::{ExternalName, TrapCode, Type};
use crate::machinst::abi::{ArgPair, RetPair, StackArgPair};
use crate::machinst::{
    MachInst, MachInstLabelUse, MachLabel, MachTerminator, OperandVisitor, PRegSet, Reg, RegClass,
    Writable,
};
use crate::result::{CodegenError, CodegenResult};
use smallvec::SmallVec;
use std::boxed::Box;
use std::vec::Vec;

pub mod args;
pub mod emit;
pub mod regs;
#[cfg(test)]
mod emit_tests;

pub use self::args::*;
pub use self::regs::*;

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

/// One-operand instructions with a GPR destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryRmROpcode {
    /// Leading-zero count (BMI1).
    Lzcnt,
    /// Trailing-zero count (BMI1).
    Tzcnt,
    /// Population count (SSE4.2).
    Popcnt,
}

/// An x64 machine instruction.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Inst {
    /// Nops of various sizes, including zero.
    Nop { len: u8 },
    /// Integer arithmetic/bit-twiddling of the two-address RMI-R form:
    /// `dst = dst op src2`, with `src1` tied to `dst`.
    AluRmiR {
        size: OperandSize,
        op: AluRmiROpcode,
        src1: Reg,
        src2: RegMemImm,
        dst: Writable<Reg>,
    },
    /// Signed multiply (two-address).
    Imul {
        size: OperandSize,
        src1: Reg,
        src2: RegMem,
        dst: Writable<Reg>,
    },
    /// Bit-counting instructions.
    UnaryRmR {
        size: OperandSize,
        op: UnaryRmROpcode,
        src: RegMem,
        dst: Writable<Reg>,
    },
    /// Materialize an immediate: `mov` (imm32, zero-extended), signed
    /// imm32 (`C7`), or `movabs`.
    Imm {
        dst_size: OperandSize,
        simm64: u64,
        dst: Writable<Reg>,
    },
    /// Register-to-register move.
    MovRR {
        size: OperandSize,
        src: Reg,
        dst: Writable<Reg>,
    },
    /// Zero-extending load / register extension.
    MovzxRmR {
        ext_mode: ExtMode,
        src: RegMem,
        dst: Writable<Reg>,
    },
    /// Sign-extending load / register extension.
    MovsxRmR {
        ext_mode: ExtMode,
        src: RegMem,
        dst: Writable<Reg>,
    },
    /// 64-bit load.
    Mov64MR {
        src: SyntheticAmode,
        dst: Writable<Reg>,
    },
    /// Integer store of the given width.
    MovRM {
        size: OperandSize,
        src: Reg,
        dst: SyntheticAmode,
    },
    /// Shifts and rotates (two-address); the variable count is in CL.
    ShiftR {
        size: OperandSize,
        kind: ShiftKind,
        src1: Reg,
        num_bits: Imm8Reg,
        dst: Writable<Reg>,
    },
    /// Integer compare, setting flags.
    CmpRmiR {
        size: OperandSize,
        src: RegMemImm,
        dst: Reg,
    },
    /// Integer test (and-discard), setting flags.
    TestRmiR {
        size: OperandSize,
        src: RegMemImm,
        dst: Reg,
    },
    /// Set the low byte of `dst` from a condition.
    Setcc { cc: CC, dst: Writable<Reg> },
    /// Conditional move (two-address).
    Cmove {
        size: OperandSize,
        cc: CC,
        consequent: RegMem,
        alternative: Reg,
        dst: Writable<Reg>,
    },
    /// Sign-extend RAX into RDX (cdq/cqo), for signed division.
    SignExtendData {
        size: OperandSize,
        src: Reg,
        dst: Writable<Reg>,
    },
    /// Hardware divide. The hardware traps on a zero divisor; the trap
    /// record carries the division-by-zero code.
    Div {
        size: OperandSize,
        signed: bool,
        divisor: RegMem,
        dividend_lo: Reg,
        dividend_hi: Reg,
        dst_quotient: Writable<Reg>,
        dst_remainder: Writable<Reg>,
    },
    /// Push a 64-bit value (prologue only).
    Push64 { src: Reg },
    /// Pop a 64-bit value (epilogue only).
    Pop64 { dst: Writable<Reg> },
    /// Scalar float ops of the two-address RM-R form.
    XmmRmR {
        op: SseOpcode,
        src1: Reg,
        src2: RegMem,
        dst: Writable<Reg>,
    },
    /// Scalar float unary ops (sqrt, conversions, plain moves/loads).
    XmmUnaryRmR {
        op: SseOpcode,
        src: RegMem,
        dst: Writable<Reg>,
    },
    /// Full-register XMM move.
    XmmMovRR {
        src: Reg,
        dst: Writable<Reg>,
    },
    /// Scalar float store.
    XmmMovRM {
        op: SseOpcode,
        src: Reg,
        dst: SyntheticAmode,
    },
    /// Scalar float compare (`ucomiss`/`ucomisd`), setting flags.
    XmmCmpRmR {
        op: SseOpcode,
        src: RegMem,
        dst: Reg,
    },
    /// Load a float constant from the constant pool (RIP-relative).
    XmmLoadConst {
        const_data: u64,
        is_f64: bool,
        dst: Writable<Reg>,
    },
    /// XMM -> GPR: bit moves and truncating conversions.
    XmmToGpr {
        op: XmmToGprOp,
        src: Reg,
        dst: Writable<Reg>,
        dst_size: OperandSize,
    },
    /// GPR -> XMM: bit moves and int-to-float conversions.
    GprToXmm {
        op: GprToXmmOp,
        src: RegMem,
        dst: Writable<Reg>,
        src_size: OperandSize,
    },
    /// Float conditional move: `dst = cc ? consequent : alternative`,
    /// emitted as a short branch over a register move.
    XmmCmove {
        cc: CC,
        consequent: Reg,
        alternative: Reg,
        dst: Writable<Reg>,
    },
    /// The IEEE-754-2008 / Wasm min/max semantics: NaN propagates, and
    /// the sign of zero is honored (`min(-0, +0) = -0`). The hardware
    /// min/max alone picks an operand, so equality and NaN get special
    /// paths.
    XmmMinMaxSeq {
        is_f64: bool,
        is_min: bool,
        lhs: Reg,
        rhs: Reg,
        dst: Writable<Reg>,
    },
    /// Unsigned 64-bit int to float/double, with the halving trick for
    /// values with the top bit set.
    CvtUint64ToFloatSeq {
        dst_is_f64: bool,
        src: Reg,
        dst: Writable<Reg>,
        tmp_gpr1: Writable<Reg>,
        tmp_gpr2: Writable<Reg>,
    },
    /// Float to signed int, trapping on NaN and overflow.
    CvtFloatToSintSeq {
        src_is_f64: bool,
        dst_size: OperandSize,
        src: Reg,
        dst: Writable<Reg>,
        tmp_gpr: Writable<Reg>,
        tmp_xmm: Writable<Reg>,
    },
    /// Float to unsigned 64-bit int, trapping on NaN and overflow.
    CvtFloatToUintSeq {
        src_is_f64: bool,
        src: Reg,
        dst: Writable<Reg>,
        tmp_gpr: Writable<Reg>,
        tmp_xmm: Writable<Reg>,
    },
    /// Direct call.
    CallKnown { info: Box<CallInfo> },
    /// Indirect call.
    CallUnknown { info: Box<CallIndInfo> },
    /// The entry-block pseudo instruction defining register arguments,
    /// and stack arguments in their reserved frame slots.
    Args {
        args: Vec<ArgPair>,
        stack_args: Vec<StackArgPair>,
    },
    /// The return pseudo instruction: epilogue plus `ret`.
    Rets { rets: Vec<RetPair> },
    /// Unconditional jump.
    JmpKnown { dst: MachLabel },
    /// Conditional jump with both destinations.
    JmpCond {
        cc: CC,
        taken: MachLabel,
        not_taken: MachLabel,
    },
    /// Conditional jump that falls through when not taken; used inside
    /// terminator groups.
    OneWayJmpCond { cc: CC, target: MachLabel },
    /// Jump-table dispatch: `lea` of the table, indexed fetch of a
    /// 32-bit offset, add, indirect jump, then the table itself.
    JmpTableSeq {
        idx: Reg,
        tmp1: Writable<Reg>,
        tmp2: Writable<Reg>,
        targets: Vec<MachLabel>,
    },
    /// Trap if the condition holds.
    TrapIf { cc: CC, trap_code: TrapCode },
    /// An undefined-instruction trap.
    Ud2 { trap_code: TrapCode },
}

/// XMM-to-GPR operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XmmToGprOp {
    /// Bit move (movd/movq).
    MovdMovq,
    /// Truncating f32 -> int.
    Cvttss2si,
    /// Truncating f64 -> int.
    Cvttsd2si,
}

/// GPR-to-XMM operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GprToXmmOp {
    /// Bit move (movd/movq).
    MovdMovq,
    /// Signed int -> f32.
    Cvtsi2ss,
    /// Signed int -> f64.
    Cvtsi2sd,
}

impl Inst {
    /// A load of the right width and class for `ty`.
    pub fn gen_load(dst: Writable<Reg>, addr: SyntheticAmode, ty: Type) -> Inst {
        match ty {
            I8 => Inst::MovzxRmR {
                ext_mode: ExtMode::BQ,
                src: RegMem::Mem { addr },
                dst,
            },
            I16 => Inst::MovzxRmR {
                ext_mode: ExtMode::WQ,
                src: RegMem::Mem { addr },
                dst,
            },
            I32 => Inst::MovzxRmR {
                ext_mode: ExtMode::LQ,
                src: RegMem::Mem { addr },
                dst,
            },
            I64 => Inst::Mov64MR { src: addr, dst },
            F32 => Inst::XmmUnaryRmR {
                op: SseOpcode::Movss,
                src: RegMem::Mem { addr },
                dst,
            },
            F64 => Inst::XmmUnaryRmR {
                op: SseOpcode::Movsd,
                src: RegMem::Mem { addr },
                dst,
            },
            _ => panic!("gen_load: unsupported type {ty}"),
        }
    }

    /// A store of the right width and class for `ty`.
    pub fn gen_store(src: Reg, addr: SyntheticAmode, ty: Type) -> Inst {
        match ty {
            I8 | I16 | I32 | I64 => Inst::MovRM {
                size: OperandSize::from_ty(ty),
                src,
                dst: addr,
            },
            F32 => Inst::XmmMovRM {
                op: SseOpcode::Movss,
                src,
                dst: addr,
            },
            F64 => Inst::XmmMovRM {
                op: SseOpcode::Movsd,
                src,
                dst: addr,
            },
            _ => panic!("gen_store: unsupported type {ty}"),
        }
    }
}

impl MachInst for Inst {
    type ABIMachineSpec = crate::isa::x64::abi::X64MachineDeps;
    type LabelUse = LabelUse;

    fn get_operands(&mut self, visitor: &mut impl OperandVisitor) {
        match self {
            Inst::Nop { .. } => {}
            Inst::AluRmiR {
                src1, src2, dst, ..
            } => {
                visitor.reg_use(src1);
                src2.get_operands(visitor);
                visitor.reg_reuse_def(dst, 0);
            }
            Inst::Imul {
                src1, src2, dst, ..
            } => {
                visitor.reg_use(src1);
                src2.get_operands(visitor);
                visitor.reg_reuse_def(dst, 0);
            }
            Inst::UnaryRmR { src, dst, .. } => {
                src.get_operands(visitor);
                visitor.reg_def(dst);
            }
            Inst::Imm { dst, .. } => visitor.reg_def(dst),
            Inst::MovRR { src, dst, .. } => {
                visitor.reg_use(src);
                visitor.reg_def(dst);
            }
            Inst::MovzxRmR { src, dst, .. } | Inst::MovsxRmR { src, dst, .. } => {
                src.get_operands(visitor);
                visitor.reg_def(dst);
            }
            Inst::Mov64MR { src, dst } => {
                src.get_operands(visitor);
                visitor.reg_def(dst);
            }
            Inst::MovRM { src, dst, .. } => {
                visitor.reg_use(src);
                dst.get_operands(visitor);
            }
            Inst::ShiftR {
                src1,
                num_bits,
                dst,
                ..
            } => {
                visitor.reg_use(src1);
                if let Imm8Reg::Reg { reg } = num_bits {
                    visitor.reg_fixed_use(reg, gpr_preg(ENC_RCX));
                }
                visitor.reg_reuse_def(dst, 0);
            }
            Inst::CmpRmiR { src, dst, .. } | Inst::TestRmiR { src, dst, .. } => {
                visitor.reg_use(dst);
                src.get_operands(visitor);
            }
            Inst::Setcc { dst, .. } => visitor.reg_def(dst),
            Inst::Cmove {
                consequent,
                alternative,
                dst,
                ..
            } => {
                visitor.reg_use(alternative);
                consequent.get_operands(visitor);
                visitor.reg_reuse_def(dst, 0);
            }
            Inst::SignExtendData { src, dst, .. } => {
                visitor.reg_fixed_use(src, gpr_preg(ENC_RAX));
                visitor.reg_fixed_def(dst, gpr_preg(ENC_RDX));
            }
            Inst::Div {
                divisor,
                dividend_lo,
                dividend_hi,
                dst_quotient,
                dst_remainder,
                ..
            } => {
                visitor.reg_fixed_use(dividend_lo, gpr_preg(ENC_RAX));
                visitor.reg_fixed_use(dividend_hi, gpr_preg(ENC_RDX));
                divisor.get_operands(visitor);
                visitor.reg_fixed_def(dst_quotient, gpr_preg(ENC_RAX));
                visitor.reg_fixed_def(dst_remainder, gpr_preg(ENC_RDX));
            }
            Inst::Push64 { .. } | Inst::Pop64 { .. } => {
                // Prologue/epilogue only; fixed registers.
            }
            Inst::XmmRmR {
                src1, src2, dst, ..
            } => {
                visitor.reg_use(src1);
                src2.get_operands(visitor);
                visitor.reg_reuse_def(dst, 0);
            }
            Inst::XmmUnaryRmR { src, dst, .. } => {
                src.get_operands(visitor);
                visitor.reg_def(dst);
            }
            Inst::XmmMovRR { src, dst } => {
                visitor.reg_use(src);
                visitor.reg_def(dst);
            }
            Inst::XmmMovRM { src, dst, .. } => {
                visitor.reg_use(src);
                dst.get_operands(visitor);
            }
            Inst::XmmCmpRmR { src, dst, .. } => {
                visitor.reg_use(dst);
                src.get_operands(visitor);
            }
            Inst::XmmLoadConst { dst, .. } => visitor.reg_def(dst),
            Inst::XmmToGpr { src, dst, .. } => {
                visitor.reg_use(src);
                visitor.reg_def(dst);
            }
            Inst::GprToXmm { src, dst, .. } => {
                src.get_operands(visitor);
                visitor.reg_def(dst);
            }
            Inst::XmmCmove {
                consequent,
                alternative,
                dst,
                ..
            } => {
                visitor.reg_use(alternative);
                visitor.reg_use(consequent);
                visitor.reg_reuse_def(dst, 0);
            }
            Inst::XmmMinMaxSeq { lhs, rhs, dst, .. } => {
                visitor.reg_use(lhs);
                visitor.reg_use(rhs);
                visitor.reg_reuse_def(dst, 1);
            }
            Inst::CvtUint64ToFloatSeq {
                src,
                dst,
                tmp_gpr1,
                tmp_gpr2,
                ..
            } => {
                visitor.reg_use(src);
                visitor.reg_early_def(dst);
                visitor.reg_early_def(tmp_gpr1);
                visitor.reg_early_def(tmp_gpr2);
            }
            Inst::CvtFloatToSintSeq {
                src,
                dst,
                tmp_gpr,
                tmp_xmm,
                ..
            } => {
                visitor.reg_use(src);
                visitor.reg_early_def(dst);
                visitor.reg_early_def(tmp_gpr);
                visitor.reg_early_def(tmp_xmm);
            }
            Inst::CvtFloatToUintSeq {
                src,
                dst,
                tmp_gpr,
                tmp_xmm,
                ..
            } => {
                visitor.reg_use(src);
                visitor.reg_early_def(dst);
                visitor.reg_early_def(tmp_gpr);
                visitor.reg_early_def(tmp_xmm);
            }
            Inst::CallKnown { info } => {
                for u in &mut info.uses {
                    visitor.reg_fixed_use(&mut u.vreg, u.preg);
                }
                for d in &mut info.defs {
                    visitor.reg_fixed_def(&mut d.vreg, d.preg);
                }
                visitor.reg_clobbers(info.clobbers);
            }
            Inst::CallUnknown { info } => {
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
            Inst::JmpKnown { .. }
            | Inst::JmpCond { .. }
            | Inst::OneWayJmpCond { .. }
            | Inst::TrapIf { .. }
            | Inst::Ud2 { .. } => {}
            Inst::JmpTableSeq {
                idx, tmp1, tmp2, ..
            } => {
                visitor.reg_use(idx);
                visitor.reg_early_def(tmp1);
                visitor.reg_early_def(tmp2);
            }
        }
    }

    fn is_move(&self) -> Option<(Writable<Reg>, Reg)> {
        match self {
            &Inst::MovRR {
                size: OperandSize::Size64,
                src,
                dst,
            } => Some((dst, src)),
            &Inst::XmmMovRR { src, dst } => Some((dst, src)),
            _ => None,
        }
    }

    fn is_term(&self) -> MachTerminator {
        match self {
            Inst::Rets { .. } => MachTerminator::Ret,
            Inst::JmpKnown { .. } | Inst::JmpCond { .. } | Inst::JmpTableSeq { .. } => {
                MachTerminator::Branch
            }
            Inst::Ud2 { .. } => MachTerminator::Ret,
            _ => MachTerminator::None,
        }
    }

    fn is_args(&self) -> bool {
        matches!(self, Inst::Args { .. })
    }

    fn gen_move(to_reg: Writable<Reg>, from_reg: Reg, ty: Type) -> Inst {
        match ty {
            F32 | F64 => Inst::XmmMovRR {
                src: from_reg,
                dst: to_reg,
            },
            _ => Inst::MovRR {
                size: OperandSize::Size64,
                src: from_reg,
                dst: to_reg,
            },
        }
    }

    fn gen_jump(target: MachLabel) -> Inst {
        Inst::JmpKnown { dst: target }
    }

    fn gen_nop(preferred_size: usize) -> Inst {
        Inst::Nop {
            len: preferred_size.min(9) as u8,
        }
    }

    fn rc_for_type(ty: Type) -> CodegenResult<RegClass> {
        match ty {
            I8 | I16 | I32 | I64 => Ok(RegClass::Int),
            F32 | F64 => Ok(RegClass::Float),
            _ => Err(CodegenError::Unsupported(format!(
                "type {ty} not supported on x86-64"
            ))),
        }
    }

    fn worst_case_size() -> CodeOffset {
        // The float-to-uint sequence.
        160
    }
}

/// Label-use kinds for x64.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelUse {
    /// A 32-bit offset from the end of the instruction (i.e. from the
    /// patch location + 4): jumps, calls, RIP-relative addressing.
    JmpRel32,
    /// A 32-bit offset from the patch location itself: jump-table
    /// entries.
    PCRel32,
    /// An 8-bit offset from the end of the instruction: short jumps
    /// within a pseudo-instruction's expansion.
    PCRel8,
}

impl MachInstLabelUse for LabelUse {
    const ALIGN: CodeOffset = 1;

    fn max_pos_range(self) -> CodeOffset {
        match self {
            LabelUse::PCRel8 => 0x7f,
            _ => 0x7fff_ffff,
        }
    }

    fn max_neg_range(self) -> CodeOffset {
        match self {
            LabelUse::PCRel8 => 0x80,
            _ => 0x8000_0000,
        }
    }

    fn patch_size(self) -> CodeOffset {
        match self {
            LabelUse::PCRel8 => 1,
            _ => 4,
        }
    }

    fn patch(self, buffer: &mut [u8], use_offset: CodeOffset, label_offset: CodeOffset) {
        match self {
            LabelUse::PCRel8 => {
                let value = (label_offset as i64) - (use_offset as i64) - 1;
                buffer[use_offset as usize] = (value as i8) as u8;
            }
            _ => {
                let addend = match self {
                    LabelUse::JmpRel32 => -4i64,
                    _ => 0,
                };
                let value = (label_offset as i64) - (use_offset as i64) + addend;
                let bytes = (value as i32).to_le_bytes();
                buffer[use_offset as usize..use_offset as usize + 4].copy_from_slice(&bytes);
            }
        }
    }

    fn supports_veneer(self) -> bool {
        false
    }

    fn veneer_size(self) -> CodeOffset {
        0
    }

    fn worst_case_veneer_size() -> CodeOffset {
        0
    }

    fn generate_veneer(self, _buffer: &mut [u8], _veneer_offset: CodeOffset) -> (CodeOffset, Self) {
        panic!("x64 label uses do not support veneers")
    }
}
