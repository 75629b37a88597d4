//! Lowering rules for x64.

use crate::ir::condcodes::FloatCC;
use crate::ir::types::{F32, F64, I16, I32, I64, I8};
use crate::ir::{self, InstructionData, Opcode, TrapCode, Type};
use crate::isa::x64::inst::*;
use crate::isa::x64::settings as x64_settings;
use crate::machinst::abi::CallDest;
use crate::machinst::{Lower, LowerBackend, MachLabel, Reg, Writable};
use crate::result::{CodegenError, CodegenResult};
use crate::settings;
use smallvec::SmallVec;
use std::boxed::Box;
use std::vec::Vec;

/// The x64 lowering backend.
pub struct X64LowerBackend {
    /// Shared flags.
    pub flags: settings::Flags,
    /// ISA flags.
    pub isa_flags: x64_settings::Flags,
}

fn op_size(ty: Type) -> OperandSize {
    OperandSize::from_ty(ty)
}

/// The operand size used for a flags-setting compare or test of a value
/// of `ty`: narrow values are stored zero-extended, so the 32-bit form is
/// always correct for them.
fn test_size(ty: Type) -> OperandSize {
    if ty == I64 {
        OperandSize::Size64
    } else {
        OperandSize::Size32
    }
}

/// Emit the flags-setting compare for an `icmp`.
fn emit_icmp(ctx: &mut Lower<Inst>, inst: ir::Inst) {
    let ty = ctx.input_ty(inst, 0);
    let size = test_size(ty);
    let lhs = ctx.put_input_in_reg(inst, 0);
    let src = if let Some(c) = ctx.input_as_const(inst, 1) {
        if let Ok(imm) = i32::try_from(c) {
            RegMemImm::imm(imm)
        } else {
            let tmp = ctx.alloc_tmp(ty);
            ctx.emit(Inst::Imm {
                dst_size: OperandSize::Size64,
                simm64: c as u64,
                dst: tmp,
            });
            RegMemImm::reg(tmp.to_reg())
        }
    } else {
        RegMemImm::reg(ctx.put_input_in_reg(inst, 1))
    };
    ctx.emit(Inst::CmpRmiR {
        size,
        src,
        dst: lhs,
    });
}

/// Materialize an 8-bit condition result, zero-extended to the full
/// register.
fn emit_setcc(ctx: &mut Lower<Inst>, cc: CC, dst: Writable<Reg>) {
    let tmp = ctx.alloc_tmp(I8);
    ctx.emit(Inst::Setcc { cc, dst: tmp });
    ctx.emit(Inst::MovzxRmR {
        ext_mode: ExtMode::BL,
        src: RegMem::reg(tmp.to_reg()),
        dst,
    });
}

/// Lower the condition input of a `brif`/`select` to a condition code,
/// sinking a single-use `icmp` when possible, or testing the value for
/// non-zero.
fn lower_cond_input(ctx: &mut Lower<Inst>, inst: ir::Inst, idx: usize) -> CC {
    if let Some(cmp_inst) = ctx.maybe_sink_input(inst, idx, |op| op == Opcode::Icmp) {
        let cond = match *ctx.data(cmp_inst) {
            InstructionData::IntCompare { cond, .. } => cond,
            _ => unreachable!(),
        };
        emit_icmp(ctx, cmp_inst);
        CC::from_intcc(cond)
    } else {
        let ty = ctx.input_ty(inst, idx);
        let rn = ctx.put_input_in_reg(inst, idx);
        ctx.emit(Inst::TestRmiR {
            size: test_size(ty),
            src: RegMemImm::reg(rn),
            dst: rn,
        });
        CC::NZ
    }
}

fn emit_float_binop(ctx: &mut Lower<Inst>, inst: ir::Inst, op32: SseOpcode, op64: SseOpcode) {
    let ty = ctx.output_ty(inst, 0);
    let op = if ty == F64 { op64 } else { op32 };
    let lhs = ctx.put_input_in_reg(inst, 0);
    let rhs = ctx.put_input_in_reg(inst, 1);
    let dst = ctx.get_output(inst, 0);
    ctx.emit(Inst::XmmRmR {
        op,
        src1: lhs,
        src2: RegMem::reg(rhs),
        dst,
    });
}

impl LowerBackend for X64LowerBackend {
    type MInst = Inst;

    fn lower(&self, ctx: &mut Lower<Inst>, inst: ir::Inst) -> CodegenResult<()> {
        let op = ctx.data(inst).opcode();
        match op {
            Opcode::Iconst => {
                let value = match *ctx.data(inst) {
                    InstructionData::UnaryImm { imm, .. } => imm.bits() as u64,
                    _ => unreachable!(),
                };
                let ty = ctx.output_ty(inst, 0);
                let value = if ty.bits() < 64 {
                    value & ((1u64 << ty.bits()) - 1)
                } else {
                    value
                };
                let dst = ctx.get_output(inst, 0);
                ctx.emit(Inst::Imm {
                    dst_size: op_size(ty),
                    simm64: value,
                    dst,
                });
            }

            Opcode::F32const => {
                let bits = match *ctx.data(inst) {
                    InstructionData::UnaryIeee32 { imm, .. } => imm.bits(),
                    _ => unreachable!(),
                };
                let dst = ctx.get_output(inst, 0);
                if bits == 0 {
                    ctx.emit(Inst::XmmRmR {
                        op: SseOpcode::Xorps,
                        src1: dst.to_reg(),
                        src2: RegMem::reg(dst.to_reg()),
                        dst,
                    });
                } else {
                    ctx.emit(Inst::XmmLoadConst {
                        const_data: bits as u64,
                        is_f64: false,
                        dst,
                    });
                }
            }

            Opcode::F64const => {
                let bits = match *ctx.data(inst) {
                    InstructionData::UnaryIeee64 { imm, .. } => imm.bits(),
                    _ => unreachable!(),
                };
                let dst = ctx.get_output(inst, 0);
                if bits == 0 {
                    ctx.emit(Inst::XmmRmR {
                        op: SseOpcode::Xorpd,
                        src1: dst.to_reg(),
                        src2: RegMem::reg(dst.to_reg()),
                        dst,
                    });
                } else {
                    ctx.emit(Inst::XmmLoadConst {
                        const_data: bits,
                        is_f64: true,
                        dst,
                    });
                }
            }

            Opcode::Iadd | Opcode::Isub | Opcode::Band | Opcode::Bor | Opcode::Bxor => {
                let ty = ctx.output_ty(inst, 0);
                let size = op_size(ty);
                let alu_op = match op {
                    Opcode::Iadd => AluRmiROpcode::Add,
                    Opcode::Isub => AluRmiROpcode::Sub,
                    Opcode::Band => AluRmiROpcode::And,
                    Opcode::Bor => AluRmiROpcode::Or,
                    Opcode::Bxor => AluRmiROpcode::Xor,
                    _ => unreachable!(),
                };
                let lhs = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                let src2 = if let Some(c) = ctx.input_as_const(inst, 1) {
                    if let Ok(imm) = i32::try_from(c) {
                        RegMemImm::imm(imm)
                    } else {
                        let tmp = ctx.alloc_tmp(ty);
                        ctx.emit(Inst::Imm {
                            dst_size: OperandSize::Size64,
                            simm64: c as u64,
                            dst: tmp,
                        });
                        RegMemImm::reg(tmp.to_reg())
                    }
                } else if let Some(load) = ctx.maybe_sink_input(inst, 1, |op| op == Opcode::Load)
                {
                    // Fold a single-use load into the ALU operation.
                    let (offset, _) = match ctx.data(load) {
                        InstructionData::Load { offset, flags, .. } => {
                            (i64::from(*offset), *flags)
                        }
                        _ => unreachable!(),
                    };
                    let base = ctx.put_input_in_reg(load, 0);
                    RegMemImm::Mem {
                        addr: SyntheticAmode::Real(Amode::imm_reg(offset as i32, base)),
                    }
                } else {
                    RegMemImm::reg(ctx.put_input_in_reg(inst, 1))
                };
                ctx.emit(Inst::AluRmiR {
                    size,
                    op: alu_op,
                    src1: lhs,
                    src2,
                    dst,
                });
            }

            Opcode::Imul => {
                let ty = ctx.output_ty(inst, 0);
                let lhs = ctx.put_input_in_reg(inst, 0);
                let rhs = ctx.put_input_in_reg(inst, 1);
                let dst = ctx.get_output(inst, 0);
                ctx.emit(Inst::Imul {
                    size: op_size(ty),
                    src1: lhs,
                    src2: RegMem::reg(rhs),
                    dst,
                });
            }

            Opcode::Udiv | Opcode::Sdiv | Opcode::Urem | Opcode::Srem => {
                let ty = ctx.output_ty(inst, 0);
                let size = op_size(ty);
                let signed = matches!(op, Opcode::Sdiv | Opcode::Srem);
                let is_rem = matches!(op, Opcode::Urem | Opcode::Srem);
                let dividend = ctx.put_input_in_reg(inst, 0);
                let mut divisor = ctx.put_input_in_reg(inst, 1);
                let dst = ctx.get_output(inst, 0);

                if op == Opcode::Sdiv {
                    // INT_MIN / -1 overflows (and faults); an explicit
                    // check gives it the right trap code.
                    let min = if ty == I64 {
                        0x8000_0000_0000_0000u64
                    } else {
                        0x8000_0000u64
                    };
                    let t1 = ctx.alloc_tmp(I8);
                    let t1x = ctx.alloc_tmp(I32);
                    let t2 = ctx.alloc_tmp(I8);
                    let t2x = ctx.alloc_tmp(I32);
                    ctx.emit(Inst::CmpRmiR {
                        size,
                        src: RegMemImm::imm(-1),
                        dst: divisor,
                    });
                    ctx.emit(Inst::Setcc { cc: CC::Z, dst: t1 });
                    ctx.emit(Inst::MovzxRmR {
                        ext_mode: ExtMode::BL,
                        src: RegMem::reg(t1.to_reg()),
                        dst: t1x,
                    });
                    let min_src = if ty == I64 {
                        let tmp = ctx.alloc_tmp(I64);
                        ctx.emit(Inst::Imm {
                            dst_size: OperandSize::Size64,
                            simm64: min,
                            dst: tmp,
                        });
                        RegMemImm::reg(tmp.to_reg())
                    } else {
                        RegMemImm::imm(min as i32)
                    };
                    ctx.emit(Inst::CmpRmiR {
                        size,
                        src: min_src,
                        dst: dividend,
                    });
                    ctx.emit(Inst::Setcc { cc: CC::Z, dst: t2 });
                    ctx.emit(Inst::MovzxRmR {
                        ext_mode: ExtMode::BL,
                        src: RegMem::reg(t2.to_reg()),
                        dst: t2x,
                    });
                    let both = ctx.alloc_tmp(I32);
                    ctx.emit(Inst::AluRmiR {
                        size: OperandSize::Size32,
                        op: AluRmiROpcode::And,
                        src1: t1x.to_reg(),
                        src2: RegMemImm::reg(t2x.to_reg()),
                        dst: both,
                    });
                    ctx.emit(Inst::TestRmiR {
                        size: OperandSize::Size32,
                        src: RegMemImm::reg(both.to_reg()),
                        dst: both.to_reg(),
                    });
                    ctx.emit(Inst::TrapIf {
                        cc: CC::NZ,
                        trap_code: TrapCode::IntegerOverflow,
                    });
                }
                if op == Opcode::Srem {
                    // idiv faults on INT_MIN % -1 even though the result
                    // (zero) is well-defined. Remainder by 1 is also zero,
                    // so swap a -1 divisor for 1.
                    let one = ctx.alloc_tmp(ty);
                    ctx.emit(Inst::Imm {
                        dst_size: size,
                        simm64: 1,
                        dst: one,
                    });
                    ctx.emit(Inst::CmpRmiR {
                        size,
                        src: RegMemImm::imm(-1),
                        dst: divisor,
                    });
                    let fixed = ctx.alloc_tmp(ty);
                    ctx.emit(Inst::Cmove {
                        size,
                        cc: CC::Z,
                        consequent: RegMem::reg(one.to_reg()),
                        alternative: divisor,
                        dst: fixed,
                    });
                    divisor = fixed.to_reg();
                }

                // Set up the high half of the dividend.
                let lo = ctx.alloc_tmp(ty);
                ctx.emit(Inst::MovRR {
                    size: OperandSize::Size64,
                    src: dividend,
                    dst: lo,
                });
                let hi = ctx.alloc_tmp(ty);
                if signed {
                    ctx.emit(Inst::SignExtendData {
                        size,
                        src: lo.to_reg(),
                        dst: hi,
                    });
                } else {
                    ctx.emit(Inst::Imm {
                        dst_size: OperandSize::Size32,
                        simm64: 0,
                        dst: hi,
                    });
                }
                let quot = ctx.alloc_tmp(ty);
                let rem = ctx.alloc_tmp(ty);
                ctx.emit(Inst::Div {
                    size,
                    signed,
                    divisor: RegMem::reg(divisor),
                    dividend_lo: lo.to_reg(),
                    dividend_hi: hi.to_reg(),
                    dst_quotient: quot,
                    dst_remainder: rem,
                });
                let result = if is_rem { rem } else { quot };
                ctx.emit(Inst::MovRR {
                    size: OperandSize::Size64,
                    src: result.to_reg(),
                    dst,
                });
            }

            Opcode::Ishl | Opcode::Ushr | Opcode::Sshr | Opcode::Rotl | Opcode::Rotr => {
                let ty = ctx.output_ty(inst, 0);
                let size = op_size(ty);
                let kind = match op {
                    Opcode::Ishl => ShiftKind::ShiftLeft,
                    Opcode::Ushr => ShiftKind::ShiftRightLogical,
                    Opcode::Sshr => ShiftKind::ShiftRightArithmetic,
                    Opcode::Rotl => ShiftKind::RotateLeft,
                    Opcode::Rotr => ShiftKind::RotateRight,
                    _ => unreachable!(),
                };
                let lhs = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                let num_bits = if let Some(c) = ctx.input_as_const(inst, 1) {
                    Imm8Reg::Imm8 {
                        imm: (c as u64 & (ty.bits() as u64 - 1)) as u8,
                    }
                } else {
                    Imm8Reg::Reg {
                        reg: ctx.put_input_in_reg(inst, 1),
                    }
                };
                ctx.emit(Inst::ShiftR {
                    size,
                    kind,
                    src1: lhs,
                    num_bits,
                    dst,
                });
            }

            Opcode::Clz | Opcode::Ctz | Opcode::Popcnt => {
                let ty = ctx.output_ty(inst, 0);
                let (unary_op, ok) = match op {
                    Opcode::Clz => (UnaryRmROpcode::Lzcnt, self.isa_flags.has_bmi),
                    Opcode::Ctz => (UnaryRmROpcode::Tzcnt, self.isa_flags.has_bmi),
                    Opcode::Popcnt => (UnaryRmROpcode::Popcnt, self.isa_flags.has_sse42),
                    _ => unreachable!(),
                };
                if !ok {
                    return Err(CodegenError::Unsupported(format!(
                        "{op} requires newer CPU feature flags"
                    )));
                }
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                ctx.emit(Inst::UnaryRmR {
                    size: op_size(ty),
                    op: unary_op,
                    src: RegMem::reg(src),
                    dst,
                });
            }

            Opcode::Icmp => {
                let cond = match *ctx.data(inst) {
                    InstructionData::IntCompare { cond, .. } => cond,
                    _ => unreachable!(),
                };
                emit_icmp(ctx, inst);
                let dst = ctx.get_output(inst, 0);
                emit_setcc(ctx, CC::from_intcc(cond), dst);
            }

            Opcode::Fcmp => {
                let cond = match *ctx.data(inst) {
                    InstructionData::FloatCompare { cond, .. } => cond,
                    _ => unreachable!(),
                };
                let ty = ctx.input_ty(inst, 0);
                let cmp_op = if ty == F64 {
                    SseOpcode::Ucomisd
                } else {
                    SseOpcode::Ucomiss
                };
                let lhs = ctx.put_input_in_reg(inst, 0);
                let rhs = ctx.put_input_in_reg(inst, 1);
                let dst = ctx.get_output(inst, 0);
                match cond {
                    FloatCC::Equal | FloatCC::NotEqual => {
                        // ZF alone confuses "equal" with "unordered"; a
                        // parity check disambiguates.
                        ctx.emit(Inst::XmmCmpRmR {
                            op: cmp_op,
                            src: RegMem::reg(rhs),
                            dst: lhs,
                        });
                        let t1 = ctx.alloc_tmp(I8);
                        let t1x = ctx.alloc_tmp(I32);
                        let t2 = ctx.alloc_tmp(I8);
                        let t2x = ctx.alloc_tmp(I32);
                        let (cc1, cc2, combine) = if cond == FloatCC::Equal {
                            (CC::NP, CC::Z, AluRmiROpcode::And)
                        } else {
                            (CC::P, CC::NZ, AluRmiROpcode::Or)
                        };
                        ctx.emit(Inst::Setcc { cc: cc1, dst: t1 });
                        ctx.emit(Inst::MovzxRmR {
                            ext_mode: ExtMode::BL,
                            src: RegMem::reg(t1.to_reg()),
                            dst: t1x,
                        });
                        ctx.emit(Inst::Setcc { cc: cc2, dst: t2 });
                        ctx.emit(Inst::MovzxRmR {
                            ext_mode: ExtMode::BL,
                            src: RegMem::reg(t2.to_reg()),
                            dst: t2x,
                        });
                        ctx.emit(Inst::AluRmiR {
                            size: OperandSize::Size32,
                            op: combine,
                            src1: t1x.to_reg(),
                            src2: RegMemImm::reg(t2x.to_reg()),
                            dst,
                        });
                    }
                    _ => {
                        let (cc, swap) = floatcc_to_cc_and_swap(cond).ok_or_else(|| {
                            CodegenError::Unsupported(format!(
                                "float condition {cond} on x64"
                            ))
                        })?;
                        let (a, b) = if swap { (rhs, lhs) } else { (lhs, rhs) };
                        ctx.emit(Inst::XmmCmpRmR {
                            op: cmp_op,
                            src: RegMem::reg(b),
                            dst: a,
                        });
                        emit_setcc(ctx, cc, dst);
                    }
                }
            }

            Opcode::Select => {
                let ty = ctx.output_ty(inst, 0);
                let cc = lower_cond_input(ctx, inst, 0);
                let consequent = ctx.put_input_in_reg(inst, 1);
                let alternative = ctx.put_input_in_reg(inst, 2);
                let dst = ctx.get_output(inst, 0);
                if ty.is_float() {
                    ctx.emit(Inst::XmmCmove {
                        cc,
                        consequent,
                        alternative,
                        dst,
                    });
                } else {
                    ctx.emit(Inst::Cmove {
                        size: op_size(ty),
                        cc,
                        consequent: RegMem::reg(consequent),
                        alternative,
                        dst,
                    });
                }
            }

            Opcode::Uextend | Opcode::Sextend => {
                let from_ty = ctx.input_ty(inst, 0);
                let to_ty = ctx.output_ty(inst, 0);
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                let signed = op == Opcode::Sextend;
                let ext_mode = match (from_ty, to_ty) {
                    (I8, I32) | (I8, I16) => ExtMode::BL,
                    (I8, I64) => ExtMode::BQ,
                    (I16, I32) => ExtMode::WL,
                    (I16, I64) => ExtMode::WQ,
                    (I32, I64) => ExtMode::LQ,
                    _ => {
                        return Err(CodegenError::Unsupported(format!(
                            "extend {from_ty} -> {to_ty}"
                        )))
                    }
                };
                if signed {
                    ctx.emit(Inst::MovsxRmR {
                        ext_mode,
                        src: RegMem::reg(src),
                        dst,
                    });
                } else {
                    ctx.emit(Inst::MovzxRmR {
                        ext_mode,
                        src: RegMem::reg(src),
                        dst,
                    });
                }
            }

            Opcode::Ireduce => {
                let to_ty = ctx.output_ty(inst, 0);
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                // Re-establish the zero-extension invariant at the
                // narrower width.
                let ext_mode = match to_ty {
                    I8 => ExtMode::BL,
                    I16 => ExtMode::WL,
                    _ => ExtMode::LQ,
                };
                ctx.emit(Inst::MovzxRmR {
                    ext_mode,
                    src: RegMem::reg(src),
                    dst,
                });
            }

            Opcode::Fadd => emit_float_binop(ctx, inst, SseOpcode::Addss, SseOpcode::Addsd),
            Opcode::Fsub => emit_float_binop(ctx, inst, SseOpcode::Subss, SseOpcode::Subsd),
            Opcode::Fmul => emit_float_binop(ctx, inst, SseOpcode::Mulss, SseOpcode::Mulsd),
            Opcode::Fdiv => emit_float_binop(ctx, inst, SseOpcode::Divss, SseOpcode::Divsd),

            Opcode::Fmin | Opcode::Fmax => {
                let ty = ctx.output_ty(inst, 0);
                let lhs = ctx.put_input_in_reg(inst, 0);
                let rhs = ctx.put_input_in_reg(inst, 1);
                let dst = ctx.get_output(inst, 0);
                ctx.emit(Inst::XmmMinMaxSeq {
                    is_f64: ty == F64,
                    is_min: op == Opcode::Fmin,
                    lhs,
                    rhs,
                    dst,
                });
            }

            Opcode::Fneg | Opcode::Fabs => {
                let ty = ctx.output_ty(inst, 0);
                let is_f64 = ty == F64;
                let (mask, logic_op) = if op == Opcode::Fneg {
                    let mask = if is_f64 {
                        0x8000_0000_0000_0000u64
                    } else {
                        0x8000_0000u64
                    };
                    (
                        mask,
                        if is_f64 {
                            SseOpcode::Xorpd
                        } else {
                            SseOpcode::Xorps
                        },
                    )
                } else {
                    let mask = if is_f64 {
                        0x7fff_ffff_ffff_ffffu64
                    } else {
                        0x7fff_ffffu64
                    };
                    (
                        mask,
                        if is_f64 {
                            SseOpcode::Andpd
                        } else {
                            SseOpcode::Andps
                        },
                    )
                };
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                let mask_reg = ctx.alloc_tmp(ty);
                ctx.emit(Inst::XmmLoadConst {
                    const_data: mask,
                    is_f64,
                    dst: mask_reg,
                });
                ctx.emit(Inst::XmmRmR {
                    op: logic_op,
                    src1: src,
                    src2: RegMem::reg(mask_reg.to_reg()),
                    dst,
                });
            }

            Opcode::Sqrt => {
                let ty = ctx.output_ty(inst, 0);
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                ctx.emit(Inst::XmmUnaryRmR {
                    op: if ty == F64 {
                        SseOpcode::Sqrtsd
                    } else {
                        SseOpcode::Sqrtss
                    },
                    src: RegMem::reg(src),
                    dst,
                });
            }

            Opcode::Fpromote => {
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                ctx.emit(Inst::XmmUnaryRmR {
                    op: SseOpcode::Cvtss2sd,
                    src: RegMem::reg(src),
                    dst,
                });
            }

            Opcode::Fdemote => {
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                ctx.emit(Inst::XmmUnaryRmR {
                    op: SseOpcode::Cvtsd2ss,
                    src: RegMem::reg(src),
                    dst,
                });
            }

            Opcode::FcvtToSint | Opcode::FcvtToUint => {
                let in_ty = ctx.input_ty(inst, 0);
                let out_ty = ctx.output_ty(inst, 0);
                let src_is_f64 = in_ty == F64;
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                match (op, out_ty) {
                    (Opcode::FcvtToSint, I32) | (Opcode::FcvtToSint, I64) => {
                        let tmp_gpr = ctx.alloc_tmp(I64);
                        let tmp_xmm = ctx.alloc_tmp(in_ty);
                        ctx.emit(Inst::CvtFloatToSintSeq {
                            src_is_f64,
                            dst_size: op_size(out_ty),
                            src,
                            dst,
                            tmp_gpr,
                            tmp_xmm,
                        });
                    }
                    (Opcode::FcvtToUint, I32) => {
                        // Convert through i64, then range-check.
                        let wide = ctx.alloc_tmp(I64);
                        let tmp_gpr = ctx.alloc_tmp(I64);
                        let tmp_xmm = ctx.alloc_tmp(in_ty);
                        ctx.emit(Inst::CvtFloatToSintSeq {
                            src_is_f64,
                            dst_size: OperandSize::Size64,
                            src,
                            dst: wide,
                            tmp_gpr,
                            tmp_xmm,
                        });
                        let limit = ctx.alloc_tmp(I64);
                        ctx.emit(Inst::Imm {
                            dst_size: OperandSize::Size64,
                            simm64: 0xffff_ffff,
                            dst: limit,
                        });
                        ctx.emit(Inst::CmpRmiR {
                            size: OperandSize::Size64,
                            src: RegMemImm::reg(limit.to_reg()),
                            dst: wide.to_reg(),
                        });
                        ctx.emit(Inst::TrapIf {
                            cc: CC::NBE,
                            trap_code: TrapCode::IntegerOverflow,
                        });
                        ctx.emit(Inst::MovzxRmR {
                            ext_mode: ExtMode::LQ,
                            src: RegMem::reg(wide.to_reg()),
                            dst,
                        });
                    }
                    (Opcode::FcvtToUint, I64) => {
                        let tmp_gpr = ctx.alloc_tmp(I64);
                        let tmp_xmm = ctx.alloc_tmp(in_ty);
                        ctx.emit(Inst::CvtFloatToUintSeq {
                            src_is_f64,
                            src,
                            dst,
                            tmp_gpr,
                            tmp_xmm,
                        });
                    }
                    _ => {
                        return Err(CodegenError::Unsupported(format!(
                            "fcvt {in_ty} -> {out_ty}"
                        )))
                    }
                }
            }

            Opcode::FcvtFromSint | Opcode::FcvtFromUint => {
                let in_ty = ctx.input_ty(inst, 0);
                let out_ty = ctx.output_ty(inst, 0);
                let cvt_op = if out_ty == F64 {
                    GprToXmmOp::Cvtsi2sd
                } else {
                    GprToXmmOp::Cvtsi2ss
                };
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                match (op, in_ty) {
                    (Opcode::FcvtFromSint, I32) => ctx.emit(Inst::GprToXmm {
                        op: cvt_op,
                        src: RegMem::reg(src),
                        dst,
                        src_size: OperandSize::Size32,
                    }),
                    (Opcode::FcvtFromSint, I64) => ctx.emit(Inst::GprToXmm {
                        op: cvt_op,
                        src: RegMem::reg(src),
                        dst,
                        src_size: OperandSize::Size64,
                    }),
                    (Opcode::FcvtFromUint, I32) => {
                        // The u32 is already zero-extended; a 64-bit
                        // signed conversion is exact.
                        ctx.emit(Inst::GprToXmm {
                            op: cvt_op,
                            src: RegMem::reg(src),
                            dst,
                            src_size: OperandSize::Size64,
                        });
                    }
                    (Opcode::FcvtFromUint, I64) => {
                        let tmp_gpr1 = ctx.alloc_tmp(I64);
                        let tmp_gpr2 = ctx.alloc_tmp(I64);
                        ctx.emit(Inst::CvtUint64ToFloatSeq {
                            dst_is_f64: out_ty == F64,
                            src,
                            dst,
                            tmp_gpr1,
                            tmp_gpr2,
                        });
                    }
                    _ => {
                        return Err(CodegenError::Unsupported(format!(
                            "fcvt {in_ty} -> {out_ty}"
                        )))
                    }
                }
            }

            Opcode::Bitcast => {
                let in_ty = ctx.input_ty(inst, 0);
                let out_ty = ctx.output_ty(inst, 0);
                let src = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                match (in_ty, out_ty) {
                    (I32, F32) => ctx.emit(Inst::GprToXmm {
                        op: GprToXmmOp::MovdMovq,
                        src: RegMem::reg(src),
                        dst,
                        src_size: OperandSize::Size32,
                    }),
                    (I64, F64) => ctx.emit(Inst::GprToXmm {
                        op: GprToXmmOp::MovdMovq,
                        src: RegMem::reg(src),
                        dst,
                        src_size: OperandSize::Size64,
                    }),
                    (F32, I32) => ctx.emit(Inst::XmmToGpr {
                        op: XmmToGprOp::MovdMovq,
                        src,
                        dst,
                        dst_size: OperandSize::Size32,
                    }),
                    (F64, I64) => ctx.emit(Inst::XmmToGpr {
                        op: XmmToGprOp::MovdMovq,
                        src,
                        dst,
                        dst_size: OperandSize::Size64,
                    }),
                    _ => {
                        return Err(CodegenError::Unsupported(format!(
                            "bitcast {in_ty} -> {out_ty}"
                        )))
                    }
                }
            }

            Opcode::Load
            | Opcode::Uload8
            | Opcode::Sload8
            | Opcode::Uload16
            | Opcode::Sload16
            | Opcode::Uload32
            | Opcode::Sload32 => {
                let (offset, _flags) = match ctx.data(inst) {
                    InstructionData::Load { offset, flags, .. } => {
                        (i64::from(*offset), *flags)
                    }
                    _ => unreachable!(),
                };
                let out_ty = ctx.output_ty(inst, 0);
                let base = ctx.put_input_in_reg(inst, 0);
                let dst = ctx.get_output(inst, 0);
                let amode = Amode::imm_reg(offset as i32, base);
                let src = RegMem::mem(amode);
                let inst = match (op, out_ty) {
                    (Opcode::Load, _) => Inst::gen_load(dst, amode.into(), out_ty),
                    (Opcode::Uload8, I64) => Inst::MovzxRmR {
                        ext_mode: ExtMode::BQ,
                        src,
                        dst,
                    },
                    (Opcode::Uload8, _) => Inst::MovzxRmR {
                        ext_mode: ExtMode::BL,
                        src,
                        dst,
                    },
                    (Opcode::Sload8, I64) => Inst::MovsxRmR {
                        ext_mode: ExtMode::BQ,
                        src,
                        dst,
                    },
                    (Opcode::Sload8, _) => Inst::MovsxRmR {
                        ext_mode: ExtMode::BL,
                        src,
                        dst,
                    },
                    (Opcode::Uload16, I64) => Inst::MovzxRmR {
                        ext_mode: ExtMode::WQ,
                        src,
                        dst,
                    },
                    (Opcode::Uload16, _) => Inst::MovzxRmR {
                        ext_mode: ExtMode::WL,
                        src,
                        dst,
                    },
                    (Opcode::Sload16, I64) => Inst::MovsxRmR {
                        ext_mode: ExtMode::WQ,
                        src,
                        dst,
                    },
                    (Opcode::Sload16, _) => Inst::MovsxRmR {
                        ext_mode: ExtMode::WL,
                        src,
                        dst,
                    },
                    (Opcode::Uload32, _) => Inst::MovzxRmR {
                        ext_mode: ExtMode::LQ,
                        src,
                        dst,
                    },
                    (Opcode::Sload32, _) => Inst::MovsxRmR {
                        ext_mode: ExtMode::LQ,
                        src,
                        dst,
                    },
                    _ => unreachable!(),
                };
                ctx.emit(inst);
            }

            Opcode::Store | Opcode::Istore8 | Opcode::Istore16 | Opcode::Istore32 => {
                let (offset, _flags) = match ctx.data(inst) {
                    InstructionData::Store { offset, flags, .. } => {
                        (i64::from(*offset), *flags)
                    }
                    _ => unreachable!(),
                };
                let val_ty = ctx.input_ty(inst, 0);
                let src = ctx.put_input_in_reg(inst, 0);
                let base = ctx.put_input_in_reg(inst, 1);
                let addr: SyntheticAmode = Amode::imm_reg(offset as i32, base).into();
                let inst = match op {
                    Opcode::Store => Inst::gen_store(src, addr, val_ty),
                    Opcode::Istore8 => Inst::MovRM {
                        size: OperandSize::Size8,
                        src,
                        dst: addr,
                    },
                    Opcode::Istore16 => Inst::MovRM {
                        size: OperandSize::Size16,
                        src,
                        dst: addr,
                    },
                    Opcode::Istore32 => Inst::MovRM {
                        size: OperandSize::Size32,
                        src,
                        dst: addr,
                    },
                    _ => unreachable!(),
                };
                ctx.emit(inst);
            }

            Opcode::Call => {
                let (func_ref, args) = match ctx.data(inst) {
                    InstructionData::Call { func_ref, args, .. } => {
                        (*func_ref, args.as_slice(&ctx.f.dfg.value_lists).to_vec())
                    }
                    _ => unreachable!(),
                };
                let ext = &ctx.f.dfg.ext_funcs[func_ref];
                let sig = ctx.f.dfg.signatures[ext.signature].clone();
                let name = ext.name.clone();
                let results = ctx.f.dfg.inst_results(inst).to_vec();
                ctx.gen_call(&sig, CallDest::ExtName(name), &args, &results)?;
            }

            Opcode::CallIndirect => {
                let (sig_ref, args) = match ctx.data(inst) {
                    InstructionData::CallIndirect { sig_ref, args, .. } => {
                        (*sig_ref, args.as_slice(&ctx.f.dfg.value_lists).to_vec())
                    }
                    _ => unreachable!(),
                };
                let sig = ctx.f.dfg.signatures[sig_ref].clone();
                let callee = ctx.put_value_in_reg(args[0]);
                let results = ctx.f.dfg.inst_results(inst).to_vec();
                ctx.gen_call(&sig, CallDest::Reg(callee), &args[1..], &results)?;
            }

            Opcode::Return => {
                let args: SmallVec<[ir::Value; 2]> =
                    ctx.f.dfg.inst_args(inst).iter().copied().collect();
                ctx.gen_return(&args);
            }

            Opcode::Trap => {
                let code = match *ctx.data(inst) {
                    InstructionData::Trap { code, .. } => code,
                    _ => unreachable!(),
                };
                ctx.emit(Inst::Ud2 { trap_code: code });
            }

            Opcode::Jump | Opcode::Brif | Opcode::BrTable => {
                unreachable!("branch lowered through lower_branch")
            }
        }
        Ok(())
    }

    fn lower_branch(
        &self,
        ctx: &mut Lower<Inst>,
        inst: ir::Inst,
        targets: &[MachLabel],
    ) -> CodegenResult<()> {
        let op = ctx.data(inst).opcode();
        match op {
            Opcode::Jump => {
                ctx.emit(Inst::JmpKnown { dst: targets[0] });
            }
            Opcode::Brif => {
                let cc = lower_cond_input(ctx, inst, 0);
                ctx.emit(Inst::JmpCond {
                    cc,
                    taken: targets[0],
                    not_taken: targets[1],
                });
            }
            Opcode::BrTable => {
                let idx = ctx.put_input_in_reg(inst, 0);
                let num_cases = targets.len() - 1;
                ctx.emit(Inst::CmpRmiR {
                    size: OperandSize::Size32,
                    src: RegMemImm::imm(num_cases as i32),
                    dst: idx,
                });
                ctx.emit(Inst::OneWayJmpCond {
                    cc: CC::NB,
                    target: targets[0],
                });
                let tmp1 = ctx.alloc_tmp(I64);
                let tmp2 = ctx.alloc_tmp(I64);
                ctx.emit(Inst::JmpTableSeq {
                    idx,
                    tmp1,
                    tmp2,
                    targets: targets[1..].to_vec(),
                });
            }
            _ => unreachable!("non-branch terminator in lower_branch"),
        }
        Ok(())
    }
}
