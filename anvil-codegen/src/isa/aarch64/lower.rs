//! Lowering rules for AArch64.

use crate::ir::condcodes::FloatCC;
use crate::ir::types::{F32, F64, I16, I32, I64, I8};
use std::boxed::Box;
use std::vec::Vec;
use crate::ir::{self, InstructionData, Opcode, TrapCode, Type};
use crate::isa::aarch64::inst::*;
use crate::isa::aarch64::settings as aarch64_settings;
use crate::machinst::abi::CallDest;
use crate::machinst::{Lower, LowerBackend, MachLabel, Reg, Writable};
use crate::result::{CodegenError, CodegenResult};
use crate::settings;
use smallvec::SmallVec;

/// The AArch64 lowering backend.
pub struct AArch64LowerBackend {
    /// Shared flags.
    pub flags: settings::Flags,
    /// ISA flags.
    pub isa_flags: aarch64_settings::Flags,
}

fn op_size(ty: Type) -> OperandSize {
    OperandSize::from_ty(ty)
}

/// Materialize a constant into `rd`.
fn lower_constant(ctx: &mut Lower<Inst>, rd: Writable<Reg>, value: u64) {
    let insts = Inst::load_constant(rd, value, &mut |ty| ctx.alloc_tmp(ty));
    for inst in insts {
        ctx.emit(inst);
    }
}

/// Emit a compare of the `icmp` feeding `inst`'s input `idx` (if one was
/// sunk) or of the input value against zero; returns the condition to
/// branch on for a non-zero (true) input.
fn lower_cond_input(ctx: &mut Lower<Inst>, inst: ir::Inst, idx: usize) -> CondBrKind {
    if let Some(cmp_inst) = ctx.maybe_sink_input(inst, idx, |op| op == Opcode::Icmp) {
        let cond = match *ctx.data(cmp_inst) {
            InstructionData::IntCompare { cond, .. } => cond,
            _ => unreachable!(),
        };
        let ty = ctx.input_ty(cmp_inst, 0);
        emit_icmp(ctx, cmp_inst, ty);
        CondBrKind::Cond(Cond::from_intcc(cond))
    } else {
        let rn = ctx.put_input_in_reg(inst, idx);
        CondBrKind::NotZero(rn)
    }
}

/// Emit the flags-setting compare for an `icmp` instruction.
fn emit_icmp(ctx: &mut Lower<Inst>, inst: ir::Inst, ty: Type) {
    let rn = ctx.put_input_in_reg(inst, 0);
    let size = op_size(ty);
    if let Some(c) = ctx.input_as_const(inst, 1) {
        if let Some(imm12) = Imm12::maybe_from_u64(c as u64) {
            ctx.emit(Inst::AluRRImm12 {
                alu_op: ALUOp::SubS,
                size,
                rd: writable_zero_reg(),
                rn,
                imm12,
            });
            return;
        }
        // The constant was absorbed but doesn't fit; rematerialize.
        let tmp = ctx.alloc_tmp(ty);
        lower_constant(ctx, tmp, c as u64);
        ctx.emit(Inst::AluRRR {
            alu_op: ALUOp::SubS,
            size,
            rd: writable_zero_reg(),
            rn,
            rm: tmp.to_reg(),
        });
        return;
    }
    let rm = ctx.put_input_in_reg(inst, 1);
    ctx.emit(Inst::AluRRR {
        alu_op: ALUOp::SubS,
        size,
        rd: writable_zero_reg(),
        rn,
        rm,
    });
}

/// Compute the addressing mode for a load/store with the given address
/// input and immediate offset.
fn lower_address(
    ctx: &mut Lower<Inst>,
    base: Reg,
    offset: i64,
    access_ty: Type,
) -> AMode {
    if offset == 0 {
        return AMode::UnsignedOffset {
            rn: base,
            uimm12: UImm12Scaled::zero(access_ty),
        };
    }
    if let Some(uimm12) = UImm12Scaled::maybe_from_i64(offset, access_ty) {
        return AMode::UnsignedOffset { rn: base, uimm12 };
    }
    if let Some(simm9) = SImm9::maybe_from_i64(offset) {
        return AMode::Unscaled { rn: base, simm9 };
    }
    let tmp = ctx.alloc_tmp(I64);
    lower_constant(ctx, tmp, offset as u64);
    AMode::RegReg {
        rn: base,
        rm: tmp.to_reg(),
    }
}

/// The float bounds check for a trapping float-to-int conversion:
/// `(low_bits, trap_if_cond_vs_low, high_bits)`, in the source float
/// format.
fn fcvt_bounds(op: FpuToIntOp) -> (u64, Cond, u64, bool) {
    // The valid input range is (low, high) with the low comparison being
    // `Le` where the boundary itself is out of range and `Lt` where the
    // boundary is exactly the minimum representable integer.
    match op {
        FpuToIntOp::F32ToI32 => (
            (-2147483648.0f32).to_bits() as u64,
            Cond::Lt,
            2147483648.0f32.to_bits() as u64,
            false,
        ),
        FpuToIntOp::F32ToU32 => (
            (-1.0f32).to_bits() as u64,
            Cond::Le,
            4294967296.0f32.to_bits() as u64,
            false,
        ),
        FpuToIntOp::F32ToI64 => (
            (-9223372036854775808.0f32).to_bits() as u64,
            Cond::Lt,
            9223372036854775808.0f32.to_bits() as u64,
            false,
        ),
        FpuToIntOp::F32ToU64 => (
            (-1.0f32).to_bits() as u64,
            Cond::Le,
            18446744073709551616.0f32.to_bits() as u64,
            false,
        ),
        FpuToIntOp::F64ToI32 => (
            (-2147483649.0f64).to_bits(),
            Cond::Le,
            2147483648.0f64.to_bits(),
            true,
        ),
        FpuToIntOp::F64ToU32 => (
            (-1.0f64).to_bits(),
            Cond::Le,
            4294967296.0f64.to_bits(),
            true,
        ),
        FpuToIntOp::F64ToI64 => (
            (-9223372036854775808.0f64).to_bits(),
            Cond::Lt,
            9223372036854775808.0f64.to_bits(),
            true,
        ),
        FpuToIntOp::F64ToU64 => (
            (-1.0f64).to_bits(),
            Cond::Le,
            18446744073709551616.0f64.to_bits(),
            true,
        ),
    }
}

fn load_float_const(ctx: &mut Lower<Inst>, rd: Writable<Reg>, bits: u64, is64: bool) {
    if is64 {
        ctx.emit(Inst::FpuLoadConst64 {
            rd,
            const_data: bits,
        });
    } else {
        ctx.emit(Inst::FpuLoadConst32 {
            rd,
            const_data: bits as u32,
        });
    }
}

impl LowerBackend for AArch64LowerBackend {
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
                let rd = ctx.get_output(inst, 0);
                lower_constant(ctx, rd, value);
            }

            Opcode::F32const => {
                let bits = match *ctx.data(inst) {
                    InstructionData::UnaryIeee32 { imm, .. } => imm.bits(),
                    _ => unreachable!(),
                };
                let rd = ctx.get_output(inst, 0);
                if bits == 0 {
                    ctx.emit(Inst::MovToFpu {
                        rd,
                        rn: zero_reg(),
                        size: ScalarSize::Size32,
                    });
                } else {
                    load_float_const(ctx, rd, bits as u64, false);
                }
            }

            Opcode::F64const => {
                let bits = match *ctx.data(inst) {
                    InstructionData::UnaryIeee64 { imm, .. } => imm.bits(),
                    _ => unreachable!(),
                };
                let rd = ctx.get_output(inst, 0);
                if bits == 0 {
                    ctx.emit(Inst::MovToFpu {
                        rd,
                        rn: zero_reg(),
                        size: ScalarSize::Size64,
                    });
                } else {
                    load_float_const(ctx, rd, bits, true);
                }
            }

            Opcode::Iadd | Opcode::Isub => {
                let ty = ctx.output_ty(inst, 0);
                let size = op_size(ty);
                let alu_op = if op == Opcode::Iadd {
                    ALUOp::Add
                } else {
                    ALUOp::Sub
                };
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                if let Some(c) = ctx.input_as_const(inst, 1) {
                    if let Some(imm12) = Imm12::maybe_from_u64(c as u64) {
                        ctx.emit(Inst::AluRRImm12 {
                            alu_op,
                            size,
                            rd,
                            rn,
                            imm12,
                        });
                        return Ok(());
                    }
                    let tmp = ctx.alloc_tmp(ty);
                    lower_constant(ctx, tmp, c as u64);
                    ctx.emit(Inst::AluRRR {
                        alu_op,
                        size,
                        rd,
                        rn,
                        rm: tmp.to_reg(),
                    });
                    return Ok(());
                }
                let rm = ctx.put_input_in_reg(inst, 1);
                ctx.emit(Inst::AluRRR {
                    alu_op,
                    size,
                    rd,
                    rn,
                    rm,
                });
            }

            Opcode::Band | Opcode::Bor | Opcode::Bxor => {
                let ty = ctx.output_ty(inst, 0);
                let size = op_size(ty);
                let alu_op = match op {
                    Opcode::Band => ALUOp::And,
                    Opcode::Bor => ALUOp::Orr,
                    Opcode::Bxor => ALUOp::Eor,
                    _ => unreachable!(),
                };
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                if let Some(c) = ctx.input_as_const(inst, 1) {
                    let imm_ty = if ty == I64 { I64 } else { I32 };
                    if let Some(imml) = ImmLogic::maybe_from_u64(c as u64, imm_ty) {
                        ctx.emit(Inst::AluRRImmLogic {
                            alu_op,
                            size,
                            rd,
                            rn,
                            imml,
                        });
                        return Ok(());
                    }
                    let tmp = ctx.alloc_tmp(ty);
                    lower_constant(ctx, tmp, c as u64);
                    ctx.emit(Inst::AluRRR {
                        alu_op,
                        size,
                        rd,
                        rn,
                        rm: tmp.to_reg(),
                    });
                    return Ok(());
                }
                let rm = ctx.put_input_in_reg(inst, 1);
                ctx.emit(Inst::AluRRR {
                    alu_op,
                    size,
                    rd,
                    rn,
                    rm,
                });
            }

            Opcode::Imul => {
                let ty = ctx.output_ty(inst, 0);
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                let rm = ctx.put_input_in_reg(inst, 1);
                ctx.emit(Inst::AluRRRR {
                    alu_op: ALUOp3::MAdd,
                    size: op_size(ty),
                    rd,
                    rn,
                    rm,
                    ra: zero_reg(),
                });
            }

            Opcode::Udiv | Opcode::Sdiv => {
                let ty = ctx.output_ty(inst, 0);
                let size = op_size(ty);
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                let rm = ctx.put_input_in_reg(inst, 1);
                ctx.emit(Inst::TrapIf {
                    kind: CondBrKind::Zero(rm),
                    trap_code: TrapCode::IntegerDivisionByZero,
                });
                if op == Opcode::Sdiv {
                    // INT_MIN / -1 overflows: `cmn rm, #1` sets Z when the
                    // divisor is -1; then a conditional compare of the
                    // dividend against 1 raises V exactly when it is
                    // INT_MIN.
                    ctx.emit(Inst::AluRRImm12 {
                        alu_op: ALUOp::AddS,
                        size,
                        rd: writable_zero_reg(),
                        rn: rm,
                        imm12: Imm12::maybe_from_u64(1).unwrap(),
                    });
                    ctx.emit(Inst::CCmpImm {
                        size,
                        rn,
                        imm: 1,
                        nzcv: NZCV::new(false, false, false, false),
                        cond: Cond::Eq,
                    });
                    ctx.emit(Inst::TrapIf {
                        kind: CondBrKind::Cond(Cond::Vs),
                        trap_code: TrapCode::IntegerOverflow,
                    });
                }
                ctx.emit(Inst::AluRRR {
                    alu_op: if op == Opcode::Udiv {
                        ALUOp::UDiv
                    } else {
                        ALUOp::SDiv
                    },
                    size,
                    rd,
                    rn,
                    rm,
                });
            }

            Opcode::Urem | Opcode::Srem => {
                let ty = ctx.output_ty(inst, 0);
                let size = op_size(ty);
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                let rm = ctx.put_input_in_reg(inst, 1);
                let quotient = ctx.alloc_tmp(ty);
                ctx.emit(Inst::TrapIf {
                    kind: CondBrKind::Zero(rm),
                    trap_code: TrapCode::IntegerDivisionByZero,
                });
                // The remainder of INT_MIN % -1 is 0; the hardware divide
                // doesn't trap, and msub reconstructs the correct value.
                ctx.emit(Inst::AluRRR {
                    alu_op: if op == Opcode::Urem {
                        ALUOp::UDiv
                    } else {
                        ALUOp::SDiv
                    },
                    size,
                    rd: quotient,
                    rn,
                    rm,
                });
                ctx.emit(Inst::AluRRRR {
                    alu_op: ALUOp3::MSub,
                    size,
                    rd,
                    rn: quotient.to_reg(),
                    rm,
                    ra: rn,
                });
            }

            Opcode::Ishl | Opcode::Ushr | Opcode::Sshr | Opcode::Rotr | Opcode::Rotl => {
                let ty = ctx.output_ty(inst, 0);
                let size = op_size(ty);
                let bits = ty.bits() as u64;
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                let alu_op = match op {
                    Opcode::Ishl => ALUOp::Lsl,
                    Opcode::Ushr => ALUOp::Lsr,
                    Opcode::Sshr => ALUOp::Asr,
                    Opcode::Rotr | Opcode::Rotl => ALUOp::RotR,
                    _ => unreachable!(),
                };
                if let Some(c) = ctx.input_as_const(inst, 1) {
                    let mut amt = (c as u64) & (bits - 1);
                    if op == Opcode::Rotl {
                        amt = (bits - amt) & (bits - 1);
                    }
                    if amt == 0 && op != Opcode::Ishl && op != Opcode::Ushr && op != Opcode::Sshr
                    {
                        ctx.emit(Inst::Mov { size, rd, rm: rn });
                        return Ok(());
                    }
                    ctx.emit(Inst::AluRRImmShift {
                        alu_op,
                        size,
                        rd,
                        rn,
                        immshift: ImmShift::maybe_from_u64(amt).unwrap(),
                    });
                    return Ok(());
                }
                let rm = ctx.put_input_in_reg(inst, 1);
                let rm = if op == Opcode::Rotl {
                    // rotl x, y == rotr x, width - y; the variable-shift
                    // form masks the amount by the width.
                    let neg = ctx.alloc_tmp(ty);
                    ctx.emit(Inst::AluRRR {
                        alu_op: ALUOp::Sub,
                        size,
                        rd: neg,
                        rn: zero_reg(),
                        rm,
                    });
                    neg.to_reg()
                } else {
                    rm
                };
                ctx.emit(Inst::AluRRR {
                    alu_op,
                    size,
                    rd,
                    rn,
                    rm,
                });
            }

            Opcode::Clz | Opcode::Ctz => {
                let ty = ctx.output_ty(inst, 0);
                let size = op_size(ty);
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                if op == Opcode::Clz {
                    ctx.emit(Inst::BitRR {
                        op: BitOp::Clz,
                        size,
                        rd,
                        rn,
                    });
                } else {
                    let rev = ctx.alloc_tmp(ty);
                    ctx.emit(Inst::BitRR {
                        op: BitOp::RBit,
                        size,
                        rd: rev,
                        rn,
                    });
                    ctx.emit(Inst::BitRR {
                        op: BitOp::Clz,
                        size,
                        rd,
                        rn: rev.to_reg(),
                    });
                }
            }

            Opcode::Popcnt => {
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                debug_assert!(self.isa_flags.has_neon);
                // fmov; cnt v.8b; addv b; fmov back. The 32-bit input is
                // zero-extended in its register, so the 64-bit path works
                // for both widths.
                let vtmp1 = ctx.alloc_tmp(F64);
                let vtmp2 = ctx.alloc_tmp(F64);
                ctx.emit(Inst::MovToFpu {
                    rd: vtmp1,
                    rn,
                    size: ScalarSize::Size64,
                });
                ctx.emit(Inst::VecCnt8B {
                    rd: vtmp2,
                    rn: vtmp1.to_reg(),
                });
                ctx.emit(Inst::VecAddv8B {
                    rd: vtmp1,
                    rn: vtmp2.to_reg(),
                });
                ctx.emit(Inst::MovFromFpu {
                    rd,
                    rn: vtmp1.to_reg(),
                    size: ScalarSize::Size32,
                });
            }

            Opcode::Icmp => {
                let cond = match *ctx.data(inst) {
                    InstructionData::IntCompare { cond, .. } => cond,
                    _ => unreachable!(),
                };
                let ty = ctx.input_ty(inst, 0);
                emit_icmp(ctx, inst, ty);
                let rd = ctx.get_output(inst, 0);
                ctx.emit(Inst::CSet {
                    rd,
                    cond: Cond::from_intcc(cond),
                });
            }

            Opcode::Fcmp => {
                let cond = match *ctx.data(inst) {
                    InstructionData::FloatCompare { cond, .. } => cond,
                    _ => unreachable!(),
                };
                if matches!(cond, FloatCC::OrderedNotEqual | FloatCC::UnorderedOrEqual) {
                    return Err(CodegenError::Unsupported(format!(
                        "float condition {cond} on aarch64"
                    )));
                }
                let ty = ctx.input_ty(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                let rm = ctx.put_input_in_reg(inst, 1);
                ctx.emit(Inst::FpuCmp {
                    size: ScalarSize::from_ty(ty),
                    rn,
                    rm,
                });
                let rd = ctx.get_output(inst, 0);
                ctx.emit(Inst::CSet {
                    rd,
                    cond: Cond::from_floatcc(cond),
                });
            }

            Opcode::Select => {
                let ty = ctx.output_ty(inst, 0);
                let kind = lower_cond_input(ctx, inst, 0);
                let cond = match kind {
                    CondBrKind::Cond(c) => c,
                    CondBrKind::NotZero(rn) => {
                        ctx.emit(Inst::AluRRImm12 {
                            alu_op: ALUOp::SubS,
                            size: OperandSize::Size64,
                            rd: writable_zero_reg(),
                            rn,
                            imm12: Imm12::zero(),
                        });
                        Cond::Ne
                    }
                    CondBrKind::Zero(_) => unreachable!(),
                };
                let rn = ctx.put_input_in_reg(inst, 1);
                let rm = ctx.put_input_in_reg(inst, 2);
                let rd = ctx.get_output(inst, 0);
                if ty.is_float() {
                    ctx.emit(Inst::FpuCSel {
                        size: ScalarSize::from_ty(ty),
                        rd,
                        rn,
                        rm,
                        cond,
                    });
                } else {
                    ctx.emit(Inst::CSel { rd, cond, rn, rm });
                }
            }

            Opcode::Uextend | Opcode::Sextend => {
                let from_ty = ctx.input_ty(inst, 0);
                let to_ty = ctx.output_ty(inst, 0);
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                ctx.emit(Inst::Extend {
                    rd,
                    rn,
                    signed: op == Opcode::Sextend,
                    from_bits: from_ty.bits() as u8,
                    to_bits: to_ty.bits() as u8,
                });
            }

            Opcode::Ireduce => {
                // A plain 32-bit move truncates and re-establishes the
                // zeroed upper word.
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                ctx.emit(Inst::Mov {
                    size: OperandSize::Size32,
                    rd,
                    rm: rn,
                });
            }

            Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv | Opcode::Fmin
            | Opcode::Fmax => {
                let ty = ctx.output_ty(inst, 0);
                let fpu_op = match op {
                    Opcode::Fadd => FPUOp2::Add,
                    Opcode::Fsub => FPUOp2::Sub,
                    Opcode::Fmul => FPUOp2::Mul,
                    Opcode::Fdiv => FPUOp2::Div,
                    Opcode::Fmin => FPUOp2::Min,
                    Opcode::Fmax => FPUOp2::Max,
                    _ => unreachable!(),
                };
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                let rm = ctx.put_input_in_reg(inst, 1);
                ctx.emit(Inst::FpuRRR {
                    fpu_op,
                    size: ScalarSize::from_ty(ty),
                    rd,
                    rn,
                    rm,
                });
            }

            Opcode::Fneg | Opcode::Fabs | Opcode::Sqrt => {
                let ty = ctx.output_ty(inst, 0);
                let fpu_op = match op {
                    Opcode::Fneg => FPUOp1::Neg,
                    Opcode::Fabs => FPUOp1::Abs,
                    Opcode::Sqrt => FPUOp1::Sqrt,
                    _ => unreachable!(),
                };
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                ctx.emit(Inst::FpuRR {
                    fpu_op,
                    size: ScalarSize::from_ty(ty),
                    rd,
                    rn,
                });
            }

            Opcode::Fpromote => {
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                ctx.emit(Inst::FpuRR {
                    fpu_op: FPUOp1::Cvt32To64,
                    size: ScalarSize::Size32,
                    rd,
                    rn,
                });
            }

            Opcode::Fdemote => {
                let rd = ctx.get_output(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                ctx.emit(Inst::FpuRR {
                    fpu_op: FPUOp1::Cvt64To32,
                    size: ScalarSize::Size64,
                    rd,
                    rn,
                });
            }

            Opcode::FcvtToSint | Opcode::FcvtToUint => {
                let in_ty = ctx.input_ty(inst, 0);
                let out_ty = ctx.output_ty(inst, 0);
                let signed = op == Opcode::FcvtToSint;
                let cvt_op = match (in_ty, out_ty, signed) {
                    (F32, I32, true) => FpuToIntOp::F32ToI32,
                    (F32, I32, false) => FpuToIntOp::F32ToU32,
                    (F32, I64, true) => FpuToIntOp::F32ToI64,
                    (F32, I64, false) => FpuToIntOp::F32ToU64,
                    (F64, I32, true) => FpuToIntOp::F64ToI32,
                    (F64, I32, false) => FpuToIntOp::F64ToU32,
                    (F64, I64, true) => FpuToIntOp::F64ToI64,
                    (F64, I64, false) => FpuToIntOp::F64ToU64,
                    _ => {
                        return Err(CodegenError::Unsupported(format!(
                            "fcvt {in_ty} -> {out_ty}"
                        )))
                    }
                };
                let size = ScalarSize::from_ty(in_ty);
                let rn = ctx.put_input_in_reg(inst, 0);
                let rd = ctx.get_output(inst, 0);

                // NaN check.
                ctx.emit(Inst::FpuCmp { size, rn, rm: rn });
                ctx.emit(Inst::TrapIf {
                    kind: CondBrKind::Cond(Cond::Vs),
                    trap_code: TrapCode::BadConversionToInteger,
                });
                // Range check.
                let (low_bits, low_cond, high_bits, is64) = fcvt_bounds(cvt_op);
                let low = ctx.alloc_tmp(if is64 { F64 } else { F32 });
                load_float_const(ctx, low, low_bits, is64);
                ctx.emit(Inst::FpuCmp {
                    size,
                    rn,
                    rm: low.to_reg(),
                });
                ctx.emit(Inst::TrapIf {
                    kind: CondBrKind::Cond(low_cond),
                    trap_code: TrapCode::IntegerOverflow,
                });
                let high = ctx.alloc_tmp(if is64 { F64 } else { F32 });
                load_float_const(ctx, high, high_bits, is64);
                ctx.emit(Inst::FpuCmp {
                    size,
                    rn,
                    rm: high.to_reg(),
                });
                ctx.emit(Inst::TrapIf {
                    kind: CondBrKind::Cond(Cond::Ge),
                    trap_code: TrapCode::IntegerOverflow,
                });
                ctx.emit(Inst::FpuToInt {
                    op: cvt_op,
                    rd,
                    rn,
                });
            }

            Opcode::FcvtFromSint | Opcode::FcvtFromUint => {
                let in_ty = ctx.input_ty(inst, 0);
                let out_ty = ctx.output_ty(inst, 0);
                let signed = op == Opcode::FcvtFromSint;
                let cvt_op = match (in_ty, out_ty, signed) {
                    (I32, F32, true) => IntToFpuOp::I32ToF32,
                    (I32, F32, false) => IntToFpuOp::U32ToF32,
                    (I32, F64, true) => IntToFpuOp::I32ToF64,
                    (I32, F64, false) => IntToFpuOp::U32ToF64,
                    (I64, F32, true) => IntToFpuOp::I64ToF32,
                    (I64, F32, false) => IntToFpuOp::U64ToF32,
                    (I64, F64, true) => IntToFpuOp::I64ToF64,
                    (I64, F64, false) => IntToFpuOp::U64ToF64,
                    _ => {
                        return Err(CodegenError::Unsupported(format!(
                            "fcvt {in_ty} -> {out_ty}"
                        )))
                    }
                };
                let rn = ctx.put_input_in_reg(inst, 0);
                let rd = ctx.get_output(inst, 0);
                ctx.emit(Inst::IntToFpu {
                    op: cvt_op,
                    rd,
                    rn,
                });
            }

            Opcode::Bitcast => {
                let in_ty = ctx.input_ty(inst, 0);
                let out_ty = ctx.output_ty(inst, 0);
                let rn = ctx.put_input_in_reg(inst, 0);
                let rd = ctx.get_output(inst, 0);
                match (in_ty, out_ty) {
                    (I32, F32) => ctx.emit(Inst::MovToFpu {
                        rd,
                        rn,
                        size: ScalarSize::Size32,
                    }),
                    (I64, F64) => ctx.emit(Inst::MovToFpu {
                        rd,
                        rn,
                        size: ScalarSize::Size64,
                    }),
                    (F32, I32) => ctx.emit(Inst::MovFromFpu {
                        rd,
                        rn,
                        size: ScalarSize::Size32,
                    }),
                    (F64, I64) => ctx.emit(Inst::MovFromFpu {
                        rd,
                        rn,
                        size: ScalarSize::Size64,
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
                let rd = ctx.get_output(inst, 0);
                let access_ty = match op {
                    Opcode::Load => out_ty,
                    Opcode::Uload8 | Opcode::Sload8 => I8,
                    Opcode::Uload16 | Opcode::Sload16 => I16,
                    Opcode::Uload32 | Opcode::Sload32 => I32,
                    _ => unreachable!(),
                };
                let mem = lower_address(ctx, base, offset, access_ty);
                match (op, out_ty) {
                    (Opcode::Load, _) => ctx.emit(Inst::gen_load(rd, mem, out_ty)),
                    (Opcode::Uload8, _) => ctx.emit(Inst::ULoad8 { rd, mem }),
                    (Opcode::Uload16, _) => ctx.emit(Inst::ULoad16 { rd, mem }),
                    (Opcode::Uload32, _) => ctx.emit(Inst::ULoad32 { rd, mem }),
                    (Opcode::Sload8, I64) => ctx.emit(Inst::SLoad8 { rd, mem }),
                    (Opcode::Sload16, I64) => ctx.emit(Inst::SLoad16 { rd, mem }),
                    (Opcode::Sload32, I64) => ctx.emit(Inst::SLoad32 { rd, mem }),
                    (Opcode::Sload8, _) | (Opcode::Sload16, _) => {
                        // Sign-extend within the 32-bit register, keeping
                        // the upper word zeroed.
                        let from_bits = if op == Opcode::Sload8 { 8 } else { 16 };
                        let tmp = ctx.alloc_tmp(out_ty);
                        let load = if from_bits == 8 {
                            Inst::ULoad8 { rd: tmp, mem }
                        } else {
                            Inst::ULoad16 { rd: tmp, mem }
                        };
                        ctx.emit(load);
                        ctx.emit(Inst::Extend {
                            rd,
                            rn: tmp.to_reg(),
                            signed: true,
                            from_bits,
                            to_bits: 32,
                        });
                    }
                    _ => unreachable!(),
                }
            }

            Opcode::Store | Opcode::Istore8 | Opcode::Istore16 | Opcode::Istore32 => {
                let (offset, _flags) = match ctx.data(inst) {
                    InstructionData::Store { offset, flags, .. } => {
                        (i64::from(*offset), *flags)
                    }
                    _ => unreachable!(),
                };
                let val_ty = ctx.input_ty(inst, 0);
                let rd = ctx.put_input_in_reg(inst, 0);
                let base = ctx.put_input_in_reg(inst, 1);
                let access_ty = match op {
                    Opcode::Store => val_ty,
                    Opcode::Istore8 => I8,
                    Opcode::Istore16 => I16,
                    Opcode::Istore32 => I32,
                    _ => unreachable!(),
                };
                let mem = lower_address(ctx, base, offset, access_ty);
                let inst = match op {
                    Opcode::Store => Inst::gen_store(rd, mem, val_ty),
                    Opcode::Istore8 => Inst::Store8 { rd, mem },
                    Opcode::Istore16 => Inst::Store16 { rd, mem },
                    Opcode::Istore32 => Inst::Store32 { rd, mem },
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
                ctx.emit(Inst::Udf { trap_code: code });
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
                ctx.emit(Inst::Jump {
                    dest: BranchTarget::Label(targets[0]),
                });
            }
            Opcode::Brif => {
                let kind = lower_cond_input(ctx, inst, 0);
                ctx.emit(Inst::CondBr {
                    taken: BranchTarget::Label(targets[0]),
                    not_taken: BranchTarget::Label(targets[1]),
                    kind,
                });
            }
            Opcode::BrTable => {
                // targets[0] is the default; the rest are the table.
                let ridx = ctx.put_input_in_reg(inst, 0);
                let num_cases = targets.len() - 1;
                if let Some(imm12) = Imm12::maybe_from_u64(num_cases as u64) {
                    ctx.emit(Inst::AluRRImm12 {
                        alu_op: ALUOp::SubS,
                        size: OperandSize::Size32,
                        rd: writable_zero_reg(),
                        rn: ridx,
                        imm12,
                    });
                } else {
                    let tmp = ctx.alloc_tmp(I32);
                    lower_constant(ctx, tmp, num_cases as u64);
                    ctx.emit(Inst::AluRRR {
                        alu_op: ALUOp::SubS,
                        size: OperandSize::Size32,
                        rd: writable_zero_reg(),
                        rn: ridx,
                        rm: tmp.to_reg(),
                    });
                }
                ctx.emit(Inst::OneWayCondBr {
                    target: BranchTarget::Label(targets[0]),
                    kind: CondBrKind::Cond(Cond::Hs),
                });
                let jt_targets: Vec<BranchTarget> = targets[1..]
                    .iter()
                    .map(|&l| BranchTarget::Label(l))
                    .collect();
                let rtmp1 = ctx.alloc_tmp(I64);
                let rtmp2 = ctx.alloc_tmp(I64);
                ctx.emit(Inst::JTSequence {
                    info: Box::new(JTSequenceInfo {
                        targets: jt_targets,
                        default_target: BranchTarget::Label(targets[0]),
                    }),
                    ridx,
                    rtmp1,
                    rtmp2,
                });
            }
            _ => unreachable!("non-branch terminator in lower_branch"),
        }
        Ok(())
    }
}
