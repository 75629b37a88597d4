//! AArch64 ISA: binary code emission.

use crate::binemit::Reloc;
use crate::ir::types::I64;
use crate::ir::TrapCode;
use crate::isa::aarch64::inst::*;
use crate::machinst::abi::FrameLayout;
use crate::machinst::{MachBuffer, MachInstEmit, MachInstEmitState, Reg, Writable};
use crate::settings;

/// Memory addressing mode finalization: convert "special" modes (stack
/// offsets against the frame layout) into real addressing modes, possibly
/// by emitting some helper instructions that come immediately before the
/// use of this amode.
pub fn mem_finalize(mem: &AMode, state: &EmitState) -> (SmallVec<[Inst; 4]>, AMode) {
    match mem {
        &AMode::SPOffset { off }
        | &AMode::IncomingArg { off }
        | &AMode::StackSlotOffset { off } => {
            let frame = state.frame_layout();
            let off = match mem {
                AMode::SPOffset { .. } => off,
                AMode::IncomingArg { .. } => frame.incoming_args_offset() + off,
                AMode::StackSlotOffset { .. } => frame.stackslot_area_offset() as i64 + off,
                _ => unreachable!(),
            };
            finalize_sp_offset(off)
        }
        &AMode::SpillOffset { slot } => {
            let off = state.frame_layout().spillslot_offset(slot);
            finalize_sp_offset(off)
        }
        _ => (smallvec![], *mem),
    }
}

fn finalize_sp_offset(off: i64) -> (SmallVec<[Inst; 4]>, AMode) {
    let basereg = stack_reg();
    if let Some(simm9) = SImm9::maybe_from_i64(off) {
        (smallvec![], AMode::Unscaled { rn: basereg, simm9 })
    } else if let Some(uimm12) = UImm12Scaled::maybe_from_i64(off, I64) {
        (
            smallvec![],
            AMode::UnsignedOffset {
                rn: basereg,
                uimm12,
            },
        )
    } else {
        let tmp = writable_spilltmp_reg();
        let mut const_insts =
            Inst::load_constant(tmp, off as u64, &mut |_| writable_spilltmp_reg());
        let mem = AMode::RegReg {
            rn: basereg,
            rm: tmp.to_reg(),
        };
        (const_insts.drain(..).collect(), mem)
    }
}

//=============================================================================
// Instructions and subcomponents: emission

pub(crate) fn machreg_to_gpr(m: Reg) -> u32 {
    u32::try_from(m.to_real_reg().hw_enc() & 31).unwrap()
}

pub(crate) fn machreg_to_vec(m: Reg) -> u32 {
    u32::try_from(m.to_real_reg().hw_enc() & 31).unwrap()
}

fn enc_arith_rrr(bits_31_21: u32, bits_15_10: u32, rd: Writable<Reg>, rn: Reg, rm: Reg) -> u32 {
    (bits_31_21 << 21)
        | (bits_15_10 << 10)
        | machreg_to_gpr(rd.to_reg())
        | (machreg_to_gpr(rn) << 5)
        | (machreg_to_gpr(rm) << 16)
}

fn enc_arith_rr_imm12(
    bits_31_24: u32,
    immshift: u32,
    imm12: u32,
    rn: Reg,
    rd: Writable<Reg>,
) -> u32 {
    (bits_31_24 << 24)
        | (immshift << 22)
        | (imm12 << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr(rd.to_reg())
}

fn enc_arith_rr_imml(bits_31_23: u32, imm_bits: u32, rn: Reg, rd: Writable<Reg>) -> u32 {
    (bits_31_23 << 23) | (imm_bits << 10) | (machreg_to_gpr(rn) << 5) | machreg_to_gpr(rd.to_reg())
}

fn enc_arith_rrrr(top11: u32, rm: Reg, bit15: u32, ra: Reg, rn: Reg, rd: Writable<Reg>) -> u32 {
    (top11 << 21)
        | (machreg_to_gpr(rm) << 16)
        | (bit15 << 15)
        | (machreg_to_gpr(ra) << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr(rd.to_reg())
}

fn enc_jump26(op_31_26: u32, off_26_0: u32) -> u32 {
    debug_assert!(off_26_0 < (1 << 26));
    (op_31_26 << 26) | off_26_0
}

fn enc_cmpbr(op_31_24: u32, off_18_0: u32, reg: Reg) -> u32 {
    debug_assert!(off_18_0 < (1 << 19));
    (op_31_24 << 24) | (off_18_0 << 5) | machreg_to_gpr(reg)
}

fn enc_cbr(op_31_24: u32, off_18_0: u32, op_4: u32, cond: u32) -> u32 {
    debug_assert!(off_18_0 < (1 << 19));
    debug_assert!(cond < (1 << 4));
    (op_31_24 << 24) | (off_18_0 << 5) | (op_4 << 4) | cond
}

fn enc_conditional_br(taken: BranchTarget, kind: CondBrKind) -> u32 {
    match kind {
        CondBrKind::Zero(reg) => enc_cmpbr(0b1_011010_0, taken.as_offset19_or_zero(), reg),
        CondBrKind::NotZero(reg) => enc_cmpbr(0b1_011010_1, taken.as_offset19_or_zero(), reg),
        CondBrKind::Cond(c) => enc_cbr(0b01010100, taken.as_offset19_or_zero(), 0b0, c.bits()),
    }
}

fn enc_move_wide(op: MoveWideOp, rd: Writable<Reg>, imm: MoveWideConst, size: OperandSize) -> u32 {
    debug_assert!(imm.shift <= 0b11);
    let op = match op {
        MoveWideOp::MovN => 0b00,
        MoveWideOp::MovZ => 0b10,
    };
    0x12800000
        | size.sf_bit() << 31
        | op << 29
        | u32::from(imm.shift) << 21
        | u32::from(imm.bits) << 5
        | machreg_to_gpr(rd.to_reg())
}

fn enc_movk(rd: Writable<Reg>, imm: MoveWideConst, size: OperandSize) -> u32 {
    debug_assert!(imm.shift <= 0b11);
    0x72800000
        | size.sf_bit() << 31
        | u32::from(imm.shift) << 21
        | u32::from(imm.bits) << 5
        | machreg_to_gpr(rd.to_reg())
}

fn enc_ldst_pair(op_31_22: u32, simm7: SImm7Scaled, rn: Reg, rt: Reg, rt2: Reg) -> u32 {
    (op_31_22 << 22)
        | (simm7.bits() << 15)
        | (machreg_to_gpr(rt2) << 10)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr(rt)
}

fn enc_ldst_simm9(op_31_22: u32, simm9: SImm9, op_11_10: u32, rn: Reg, rd: u32) -> u32 {
    (op_31_22 << 22) | (simm9.bits() << 12) | (op_11_10 << 10) | (machreg_to_gpr(rn) << 5) | rd
}

fn enc_ldst_uimm12(op_31_22: u32, uimm12: UImm12Scaled, rn: Reg, rd: u32) -> u32 {
    (op_31_22 << 22) | (0b1 << 24) | (uimm12.bits() << 10) | (machreg_to_gpr(rn) << 5) | rd
}

fn enc_ldst_reg(op_31_22: u32, rn: Reg, rm: Reg, rd: u32) -> u32 {
    // LSL extend (option 011), no shift.
    (op_31_22 << 22)
        | (1 << 21)
        | (machreg_to_gpr(rm) << 16)
        | (0b011 << 13)
        | (0b10 << 10)
        | (machreg_to_gpr(rn) << 5)
        | rd
}

fn enc_extend(top22: u32, rd: Writable<Reg>, rn: Reg) -> u32 {
    (top22 << 10) | (machreg_to_gpr(rn) << 5) | machreg_to_gpr(rd.to_reg())
}

fn enc_csel(rd: Writable<Reg>, rn: Reg, rm: Reg, cond: Cond) -> u32 {
    0x9a800000
        | (machreg_to_gpr(rm) << 16)
        | (cond.bits() << 12)
        | (machreg_to_gpr(rn) << 5)
        | machreg_to_gpr(rd.to_reg())
}

fn enc_cset(rd: Writable<Reg>, cond: Cond) -> u32 {
    // cset rd, c == csinc rd, xzr, xzr, invert(c).
    0x9a800400
        | (31 << 16)
        | (cond.invert().bits() << 12)
        | (31 << 5)
        | machreg_to_gpr(rd.to_reg())
}

fn enc_ccmp_imm(size: OperandSize, rn: Reg, imm: u8, nzcv: NZCV, cond: Cond) -> u32 {
    0x7a400800
        | size.sf_bit() << 31
        | u32::from(imm) << 16
        | cond.bits() << 12
        | machreg_to_gpr(rn) << 5
        | nzcv.bits()
}

fn enc_fpurr(top22: u32, rd: Writable<Reg>, rn: Reg) -> u32 {
    (top22 << 10) | (machreg_to_vec(rn) << 5) | machreg_to_vec(rd.to_reg())
}

fn enc_fpurrr(top22: u32, rd: Writable<Reg>, rn: Reg, rm: Reg) -> u32 {
    (top22 << 10)
        | (machreg_to_vec(rm) << 16)
        | (machreg_to_vec(rn) << 5)
        | machreg_to_vec(rd.to_reg())
}

fn enc_fcmp(size: ScalarSize, rn: Reg, rm: Reg) -> u32 {
    0x1e202000 | (size.ftype() << 22) | (machreg_to_vec(rm) << 16) | (machreg_to_vec(rn) << 5)
}

fn enc_fcsel(rd: Writable<Reg>, rn: Reg, rm: Reg, cond: Cond, size: ScalarSize) -> u32 {
    0x1e200c00
        | (size.ftype() << 22)
        | (machreg_to_vec(rm) << 16)
        | (machreg_to_vec(rn) << 5)
        | machreg_to_vec(rd.to_reg())
        | (cond.bits() << 12)
}

fn enc_fputoint(top16: u32, rd: Writable<Reg>, rn: Reg) -> u32 {
    (top16 << 16) | (machreg_to_vec(rn) << 5) | machreg_to_gpr(rd.to_reg())
}

fn enc_inttofpu(top16: u32, rd: Writable<Reg>, rn: Reg) -> u32 {
    (top16 << 16) | (machreg_to_gpr(rn) << 5) | machreg_to_vec(rd.to_reg())
}

fn enc_adr(off: i32, rd: Writable<Reg>) -> u32 {
    let off = off as u32;
    let immlo = off & 3;
    let immhi = (off >> 2) & ((1 << 19) - 1);
    0x10000000 | (immlo << 29) | (immhi << 5) | machreg_to_gpr(rd.to_reg())
}

/// Emission state carried between instructions.
#[derive(Clone, Debug)]
pub struct EmitState {
    frame: FrameLayout,
}

impl MachInstEmitState for EmitState {
    fn new(frame: FrameLayout) -> Self {
        Self { frame }
    }

    fn frame_layout(&self) -> &FrameLayout {
        &self.frame
    }
}

/// Constant information used in emission.
#[derive(Clone, Debug, Default)]
pub struct EmitInfo {
    _flags: settings::Flags,
}

impl EmitInfo {
    /// Create emission info from the shared flags.
    pub fn new(flags: settings::Flags) -> Self {
        Self { _flags: flags }
    }
}

impl MachInstEmit for Inst {
    type State = EmitState;
    type Info = EmitInfo;

    fn emit(&self, sink: &mut MachBuffer<Inst>, emit_info: &Self::Info, state: &mut EmitState) {
        match self {
            &Inst::AluRRR {
                alu_op,
                size,
                rd,
                rn,
                rm,
            } => {
                let sf = size.sf_bit();
                let (top11, bit15_10) = match alu_op {
                    ALUOp::Add => (0b000_01011_00_0, 0b000000),
                    ALUOp::Sub => (0b010_01011_00_0, 0b000000),
                    ALUOp::AddS => (0b001_01011_00_0, 0b000000),
                    ALUOp::SubS => (0b011_01011_00_0, 0b000000),
                    ALUOp::Orr => (0b001_01010_00_0, 0b000000),
                    ALUOp::And => (0b000_01010_00_0, 0b000000),
                    ALUOp::Eor => (0b010_01010_00_0, 0b000000),
                    ALUOp::Lsl => (0b000_11010110, 0b001000),
                    ALUOp::Lsr => (0b000_11010110, 0b001001),
                    ALUOp::Asr => (0b000_11010110, 0b001010),
                    ALUOp::RotR => (0b000_11010110, 0b001011),
                    ALUOp::UDiv => (0b000_11010110, 0b000010),
                    ALUOp::SDiv => (0b000_11010110, 0b000011),
                };
                let top11 = top11 | (sf << 10);
                sink.put4(enc_arith_rrr(top11, bit15_10, rd, rn, rm));
            }
            &Inst::AluRRRR {
                alu_op,
                size,
                rd,
                rn,
                rm,
                ra,
            } => {
                let (top11, bit15) = match alu_op {
                    ALUOp3::MAdd => (0b0_00_11011_000, 0),
                    ALUOp3::MSub => (0b0_00_11011_000, 1),
                };
                let top11 = top11 | (size.sf_bit() << 10);
                sink.put4(enc_arith_rrrr(top11, rm, bit15, ra, rn, rd));
            }
            &Inst::AluRRImm12 {
                alu_op,
                size,
                rd,
                rn,
                imm12,
            } => {
                let top8 = match alu_op {
                    ALUOp::Add => 0b000_10001,
                    ALUOp::Sub => 0b010_10001,
                    ALUOp::AddS => 0b001_10001,
                    ALUOp::SubS => 0b011_10001,
                    _ => unreachable!("{alu_op:?} with imm12"),
                };
                let top8 = top8 | (size.sf_bit() << 7);
                sink.put4(enc_arith_rr_imm12(
                    top8,
                    imm12.shift_bits(),
                    imm12.imm_bits(),
                    rn,
                    rd,
                ));
            }
            &Inst::AluRRImmLogic {
                alu_op,
                size,
                rd,
                rn,
                imml,
            } => {
                let top9 = match alu_op {
                    ALUOp::And => 0b000_100100,
                    ALUOp::Orr => 0b001_100100,
                    ALUOp::Eor => 0b010_100100,
                    _ => unreachable!("{alu_op:?} with logical imm"),
                };
                let top9 = top9 | (size.sf_bit() << 8);
                sink.put4(enc_arith_rr_imml(top9, imml.enc_bits(), rn, rd));
            }
            &Inst::AluRRImmShift {
                alu_op,
                size,
                rd,
                rn,
                immshift,
            } => {
                let sh = u32::from(immshift.value());
                let (bits, immr, imms) = match (alu_op, size) {
                    (ALUOp::Lsl, OperandSize::Size64) => {
                        (0xd340_0000, (64 - sh) & 63, 63 - sh)
                    }
                    (ALUOp::Lsl, OperandSize::Size32) => {
                        (0x5300_0000, (32 - sh) & 31, 31 - sh)
                    }
                    (ALUOp::Lsr, OperandSize::Size64) => (0xd340_0000, sh, 63),
                    (ALUOp::Lsr, OperandSize::Size32) => (0x5300_0000, sh, 31),
                    (ALUOp::Asr, OperandSize::Size64) => (0x9340_0000, sh, 63),
                    (ALUOp::Asr, OperandSize::Size32) => (0x1300_0000, sh, 31),
                    (ALUOp::RotR, OperandSize::Size64) => {
                        // extr rd, rn, rn, #sh
                        let word = 0x93c0_0000
                            | (machreg_to_gpr(rn) << 16)
                            | (sh << 10)
                            | (machreg_to_gpr(rn) << 5)
                            | machreg_to_gpr(rd.to_reg());
                        sink.put4(word);
                        return;
                    }
                    (ALUOp::RotR, OperandSize::Size32) => {
                        let word = 0x1380_0000
                            | (machreg_to_gpr(rn) << 16)
                            | (sh << 10)
                            | (machreg_to_gpr(rn) << 5)
                            | machreg_to_gpr(rd.to_reg());
                        sink.put4(word);
                        return;
                    }
                    _ => unreachable!("{alu_op:?} with shift imm"),
                };
                let word = bits
                    | (immr << 16)
                    | (imms << 10)
                    | (machreg_to_gpr(rn) << 5)
                    | machreg_to_gpr(rd.to_reg());
                sink.put4(word);
            }
            &Inst::BitRR { op, size, rd, rn } => {
                let sf = size.sf_bit();
                let (op1, op2) = match op {
                    BitOp::RBit => (0b00000, 0b000000),
                    BitOp::Clz => (0b00000, 0b000100),
                };
                let word = 0x5ac0_0000
                    | (sf << 31)
                    | (op1 << 16)
                    | (op2 << 10)
                    | (machreg_to_gpr(rn) << 5)
                    | machreg_to_gpr(rd.to_reg());
                sink.put4(word);
            }
            &Inst::ULoad8 { rd, ref mem }
            | &Inst::SLoad8 { rd, ref mem }
            | &Inst::ULoad16 { rd, ref mem }
            | &Inst::SLoad16 { rd, ref mem }
            | &Inst::ULoad32 { rd, ref mem }
            | &Inst::SLoad32 { rd, ref mem }
            | &Inst::ULoad64 { rd, ref mem }
            | &Inst::FpuLoad32 { rd, ref mem }
            | &Inst::FpuLoad64 { rd, ref mem } => {
                let (mem_insts, mem) = mem_finalize(mem, state);
                for inst in mem_insts {
                    inst.emit(sink, emit_info, state);
                }
                let op = match self {
                    Inst::ULoad8 { .. } => 0b0011100001,
                    Inst::SLoad8 { .. } => 0b0011100010,
                    Inst::ULoad16 { .. } => 0b0111100001,
                    Inst::SLoad16 { .. } => 0b0111100010,
                    Inst::ULoad32 { .. } => 0b1011100001,
                    Inst::SLoad32 { .. } => 0b1011100010,
                    Inst::ULoad64 { .. } => 0b1111100001,
                    Inst::FpuLoad32 { .. } => 0b1011110001,
                    Inst::FpuLoad64 { .. } => 0b1111110001,
                    _ => unreachable!(),
                };
                let rd_bits = match self {
                    Inst::FpuLoad32 { .. } | Inst::FpuLoad64 { .. } => {
                        machreg_to_vec(rd.to_reg())
                    }
                    _ => machreg_to_gpr(rd.to_reg()),
                };
                match &mem {
                    AMode::Unscaled { rn, simm9 } => {
                        sink.put4(enc_ldst_simm9(op, *simm9, 0b00, *rn, rd_bits));
                    }
                    AMode::UnsignedOffset { rn, uimm12 } => {
                        sink.put4(enc_ldst_uimm12(op, *uimm12, *rn, rd_bits));
                    }
                    AMode::RegReg { rn, rm } => {
                        sink.put4(enc_ldst_reg(op, *rn, *rm, rd_bits));
                    }
                    _ => unreachable!("amode not finalized"),
                }
            }
            &Inst::Store8 { rd, ref mem }
            | &Inst::Store16 { rd, ref mem }
            | &Inst::Store32 { rd, ref mem }
            | &Inst::Store64 { rd, ref mem }
            | &Inst::FpuStore32 { rd, ref mem }
            | &Inst::FpuStore64 { rd, ref mem } => {
                let (mem_insts, mem) = mem_finalize(mem, state);
                for inst in mem_insts {
                    inst.emit(sink, emit_info, state);
                }
                let op = match self {
                    Inst::Store8 { .. } => 0b0011100000,
                    Inst::Store16 { .. } => 0b0111100000,
                    Inst::Store32 { .. } => 0b1011100000,
                    Inst::Store64 { .. } => 0b1111100000,
                    Inst::FpuStore32 { .. } => 0b1011110000,
                    Inst::FpuStore64 { .. } => 0b1111110000,
                    _ => unreachable!(),
                };
                let rd_bits = match self {
                    Inst::FpuStore32 { .. } | Inst::FpuStore64 { .. } => machreg_to_vec(rd),
                    _ => machreg_to_gpr(rd),
                };
                match &mem {
                    AMode::Unscaled { rn, simm9 } => {
                        sink.put4(enc_ldst_simm9(op, *simm9, 0b00, *rn, rd_bits));
                    }
                    AMode::UnsignedOffset { rn, uimm12 } => {
                        sink.put4(enc_ldst_uimm12(op, *uimm12, *rn, rd_bits));
                    }
                    AMode::RegReg { rn, rm } => {
                        sink.put4(enc_ldst_reg(op, *rn, *rm, rd_bits));
                    }
                    _ => unreachable!("amode not finalized"),
                }
            }
            &Inst::StoreP64 { rt, rt2, ref mem } => match mem {
                PairAMode::SignedOffset(rn, simm7) => {
                    sink.put4(enc_ldst_pair(0b1010100100, *simm7, *rn, rt, rt2));
                }
                PairAMode::PreIndexed(rn, simm7) => {
                    sink.put4(enc_ldst_pair(0b1010100110, *simm7, *rn, rt, rt2));
                }
                PairAMode::PostIndexed(rn, simm7) => {
                    sink.put4(enc_ldst_pair(0b1010100010, *simm7, *rn, rt, rt2));
                }
            },
            &Inst::LoadP64 { rt, rt2, ref mem } => {
                let rt = rt.to_reg();
                let rt2 = rt2.to_reg();
                match mem {
                    PairAMode::SignedOffset(rn, simm7) => {
                        sink.put4(enc_ldst_pair(0b1010100101, *simm7, *rn, rt, rt2));
                    }
                    PairAMode::PreIndexed(rn, simm7) => {
                        sink.put4(enc_ldst_pair(0b1010100111, *simm7, *rn, rt, rt2));
                    }
                    PairAMode::PostIndexed(rn, simm7) => {
                        sink.put4(enc_ldst_pair(0b1010100011, *simm7, *rn, rt, rt2));
                    }
                }
            }
            &Inst::Mov { size, rd, rm } => {
                // Encoded as ORR rd, zero, rm.
                let top11 = match size {
                    OperandSize::Size64 => 0b101_01010_00_0,
                    OperandSize::Size32 => 0b001_01010_00_0,
                };
                sink.put4(enc_arith_rrr(top11, 0b000000, rd, zero_reg(), rm));
            }
            &Inst::MovWide { op, rd, imm, size } => {
                sink.put4(enc_move_wide(op, rd, imm, size));
            }
            &Inst::MovK { rd, imm, size, .. } => {
                sink.put4(enc_movk(rd, imm, size));
            }
            &Inst::Extend {
                rd,
                rn,
                signed,
                from_bits,
                to_bits,
            } => {
                // SBFM/UBFM with immr=0, imms=from_bits-1. 32->64 unsigned
                // is just a W-view move.
                match (signed, from_bits, to_bits) {
                    (false, 32, 64) => {
                        let inst = Inst::Mov {
                            size: OperandSize::Size32,
                            rd,
                            rm: rn,
                        };
                        inst.emit(sink, emit_info, state);
                    }
                    (s, from, to) => {
                        debug_assert!(from < to);
                        let sf = if to == 64 { 1 } else { 0 };
                        let (opc, n) = if s { (0b00, sf) } else { (0b10, 0) };
                        // For unsigned extends the 32-bit form suffices
                        // (writes zero the upper word).
                        let (sf, n) = if s { (sf, n) } else { (0, 0) };
                        let top22 = (sf << 21)
                            | (opc << 19)
                            | (0b100110 << 13)
                            | (n << 12)
                            | (u32::from(from) - 1);
                        // top22 layout: sf opc(2) 100110 N immr(6) imms(6)
                        // with immr=0; imms already placed in low bits.
                        sink.put4(enc_extend(top22, rd, rn));
                    }
                }
            }
            &Inst::CSel { rd, cond, rn, rm } => {
                sink.put4(enc_csel(rd, rn, rm, cond));
            }
            &Inst::CSet { rd, cond } => {
                sink.put4(enc_cset(rd, cond));
            }
            &Inst::CCmpImm {
                size,
                rn,
                imm,
                nzcv,
                cond,
            } => {
                sink.put4(enc_ccmp_imm(size, rn, imm, nzcv, cond));
            }
            &Inst::FpuMove { size, rd, rn } => {
                let top22 = match size {
                    ScalarSize::Size32 => 0b000_11110_00_1_000000_10000,
                    ScalarSize::Size64 => 0b000_11110_01_1_000000_10000,
                };
                sink.put4(enc_fpurr(top22, rd, rn));
            }
            &Inst::FpuRR {
                fpu_op,
                size,
                rd,
                rn,
            } => {
                let top22 = match (fpu_op, size) {
                    (FPUOp1::Abs, ScalarSize::Size32) => 0b000_11110_00_1_000001_10000,
                    (FPUOp1::Abs, ScalarSize::Size64) => 0b000_11110_01_1_000001_10000,
                    (FPUOp1::Neg, ScalarSize::Size32) => 0b000_11110_00_1_000010_10000,
                    (FPUOp1::Neg, ScalarSize::Size64) => 0b000_11110_01_1_000010_10000,
                    (FPUOp1::Sqrt, ScalarSize::Size32) => 0b000_11110_00_1_000011_10000,
                    (FPUOp1::Sqrt, ScalarSize::Size64) => 0b000_11110_01_1_000011_10000,
                    (FPUOp1::Cvt32To64, ScalarSize::Size32) => 0b000_11110_00_1_000101_10000,
                    (FPUOp1::Cvt64To32, ScalarSize::Size64) => 0b000_11110_01_1_000100_10000,
                    (op, size) => unreachable!("bad FpuRR: {op:?} {size:?}"),
                };
                sink.put4(enc_fpurr(top22, rd, rn));
            }
            &Inst::FpuRRR {
                fpu_op,
                size,
                rd,
                rn,
                rm,
            } => {
                let bits = match fpu_op {
                    FPUOp2::Add => 0b001010,
                    FPUOp2::Sub => 0b001110,
                    FPUOp2::Mul => 0b000010,
                    FPUOp2::Div => 0b000110,
                    FPUOp2::Max => 0b010010,
                    FPUOp2::Min => 0b010110,
                };
                let word = ((0b000_11110_00_1 | (size.ftype() << 1)) << 21)
                    | (machreg_to_vec(rm) << 16)
                    | (bits << 10)
                    | (machreg_to_vec(rn) << 5)
                    | machreg_to_vec(rd.to_reg());
                sink.put4(word);
            }
            &Inst::FpuCmp { size, rn, rm } => {
                sink.put4(enc_fcmp(size, rn, rm));
            }
            &Inst::FpuCSel {
                size,
                rd,
                rn,
                rm,
                cond,
            } => {
                sink.put4(enc_fcsel(rd, rn, rm, cond, size));
            }
            &Inst::FpuToInt { op, rd, rn } => {
                let top16 = match op {
                    // sf 00 11110 type 1 11 000 (fcvtzs) / 001 (fcvtzu)
                    FpuToIntOp::F32ToI32 => 0b000_11110_00_1_11_000,
                    FpuToIntOp::F32ToU32 => 0b000_11110_00_1_11_001,
                    FpuToIntOp::F32ToI64 => 0b100_11110_00_1_11_000,
                    FpuToIntOp::F32ToU64 => 0b100_11110_00_1_11_001,
                    FpuToIntOp::F64ToI32 => 0b000_11110_01_1_11_000,
                    FpuToIntOp::F64ToU32 => 0b000_11110_01_1_11_001,
                    FpuToIntOp::F64ToI64 => 0b100_11110_01_1_11_000,
                    FpuToIntOp::F64ToU64 => 0b100_11110_01_1_11_001,
                };
                sink.put4(enc_fputoint(top16, rd, rn));
            }
            &Inst::IntToFpu { op, rd, rn } => {
                let top16 = match op {
                    // sf 00 11110 type 1 00 010 (scvtf) / 011 (ucvtf)
                    IntToFpuOp::I32ToF32 => 0b000_11110_00_1_00_010,
                    IntToFpuOp::U32ToF32 => 0b000_11110_00_1_00_011,
                    IntToFpuOp::I64ToF32 => 0b100_11110_00_1_00_010,
                    IntToFpuOp::U64ToF32 => 0b100_11110_00_1_00_011,
                    IntToFpuOp::I32ToF64 => 0b000_11110_01_1_00_010,
                    IntToFpuOp::U32ToF64 => 0b000_11110_01_1_00_011,
                    IntToFpuOp::I64ToF64 => 0b100_11110_01_1_00_010,
                    IntToFpuOp::U64ToF64 => 0b100_11110_01_1_00_011,
                };
                sink.put4(enc_inttofpu(top16, rd, rn));
            }
            &Inst::FpuLoadConst32 { rd, const_data } => {
                let label = sink.defer_constant(&const_data.to_le_bytes(), 4);
                sink.use_label_at_offset(sink.cur_offset(), label, LabelUse::Branch19);
                // ldr sN, <literal>
                sink.put4(0x1c000000 | machreg_to_vec(rd.to_reg()));
            }
            &Inst::FpuLoadConst64 { rd, const_data } => {
                let label = sink.defer_constant(&const_data.to_le_bytes(), 8);
                sink.use_label_at_offset(sink.cur_offset(), label, LabelUse::Branch19);
                // ldr dN, <literal>
                sink.put4(0x5c000000 | machreg_to_vec(rd.to_reg()));
            }
            &Inst::MovToFpu { rd, rn, size } => {
                let word = match size {
                    ScalarSize::Size32 => 0x1e270000,
                    ScalarSize::Size64 => 0x9e670000,
                };
                sink.put4(word | (machreg_to_gpr(rn) << 5) | machreg_to_vec(rd.to_reg()));
            }
            &Inst::MovFromFpu { rd, rn, size } => {
                let word = match size {
                    ScalarSize::Size32 => 0x1e260000,
                    ScalarSize::Size64 => 0x9e660000,
                };
                sink.put4(word | (machreg_to_vec(rn) << 5) | machreg_to_gpr(rd.to_reg()));
            }
            &Inst::VecCnt8B { rd, rn } => {
                sink.put4(0x0e205800 | (machreg_to_vec(rn) << 5) | machreg_to_vec(rd.to_reg()));
            }
            &Inst::VecAddv8B { rd, rn } => {
                sink.put4(0x0e31b800 | (machreg_to_vec(rn) << 5) | machreg_to_vec(rd.to_reg()));
            }
            Inst::Call { info } => {
                sink.add_reloc(Reloc::Arm64Call, &info.dest, 0);
                sink.put4(enc_jump26(0b100101, 0));
                sink.add_call_site();
            }
            Inst::CallInd { info } => {
                sink.put4(0xd63f0000 | (machreg_to_gpr(info.rn) << 5));
                sink.add_call_site();
            }
            Inst::Args { .. } => {
                // Pseudo-instruction: no code emitted.
            }
            Inst::Rets { .. } => {
                // Epilogue: restore clobbered callee-saves, deallocate the
                // frame, restore FP/LR, return.
                let frame = state.frame_layout().clone();
                emit_clobber_restores(sink, emit_info, state, &frame);
                emit_frame_dealloc(sink, emit_info, state, &frame);
                // ldp fp, lr, [sp], #16
                sink.put4(enc_ldst_pair(
                    0b1010100011,
                    SImm7Scaled::maybe_from_i64(16, I64).unwrap(),
                    stack_reg(),
                    fp_reg(),
                    link_reg(),
                ));
                // ret
                sink.put4(0xd65f03c0);
            }
            &Inst::Jump { dest } => {
                let off = sink.cur_offset();
                if let Some(l) = dest.as_label() {
                    sink.use_label_at_offset(off, l, LabelUse::Branch26);
                }
                sink.put4(enc_jump26(0b000101, dest.as_offset26_or_zero()));
                if let Some(l) = dest.as_label() {
                    sink.add_uncond_branch(off, off + 4, l);
                }
            }
            &Inst::CondBr {
                taken,
                not_taken,
                kind,
            } => {
                // Conditional part.
                let cond_off = sink.cur_offset();
                if let Some(l) = taken.as_label() {
                    sink.use_label_at_offset(cond_off, l, LabelUse::Branch19);
                }
                sink.put4(enc_conditional_br(taken, kind));
                // Unconditional part.
                let uncond_off = sink.cur_offset();
                if let Some(l) = not_taken.as_label() {
                    sink.use_label_at_offset(uncond_off, l, LabelUse::Branch26);
                }
                sink.put4(enc_jump26(0b000101, not_taken.as_offset26_or_zero()));
                if let Some(l) = not_taken.as_label() {
                    sink.add_uncond_branch(uncond_off, uncond_off + 4, l);
                }
            }
            &Inst::OneWayCondBr { target, kind } => {
                let off = sink.cur_offset();
                if let Some(l) = target.as_label() {
                    sink.use_label_at_offset(off, l, LabelUse::Branch19);
                }
                sink.put4(enc_conditional_br(target, kind));
            }
            &Inst::TrapIf { kind, trap_code } => {
                // Skip over the trap if the condition does NOT hold.
                sink.put4(enc_conditional_br(
                    BranchTarget::ResolvedOffset(2),
                    kind.invert(),
                ));
                sink.add_trap(trap_code);
                sink.put4(0x0000_0000); // udf
            }
            Inst::JTSequence {
                info,
                ridx,
                rtmp1,
                rtmp2,
            } => {
                let ridx = *ridx;
                let rtmp1 = *rtmp1;
                let rtmp2 = *rtmp2;
                // adr rtmp1, <table>
                sink.put4(enc_adr(20, rtmp1));
                // add rtmp1, rtmp1, ridx, uxtw #2
                sink.put4(
                    0x8b204800
                        | (machreg_to_gpr(ridx) << 16)
                        | (machreg_to_gpr(rtmp1.to_reg()) << 5)
                        | machreg_to_gpr(rtmp1.to_reg()),
                );
                // ldrsw rtmp2, [rtmp1]
                sink.put4(
                    0xb980_0000
                        | (machreg_to_gpr(rtmp1.to_reg()) << 5)
                        | machreg_to_gpr(rtmp2.to_reg()),
                );
                // add rtmp1, rtmp1, rtmp2
                sink.put4(enc_arith_rrr(
                    0b100_01011_00_0,
                    0b000000,
                    rtmp1,
                    rtmp1.to_reg(),
                    rtmp2.to_reg(),
                ));
                // br rtmp1
                sink.put4(0xd61f0000 | (machreg_to_gpr(rtmp1.to_reg()) << 5));
                // The table itself.
                for target in &info.targets {
                    let entry_off = sink.cur_offset();
                    let label = target.as_label().expect("jump table target must be a label");
                    sink.use_label_at_offset(entry_off, label, LabelUse::PCRel32);
                    sink.put4(0);
                }
            }
            Inst::LoadExtName { rd, name, offset } => {
                // ldr rd, #8 ; b #12 ; <8-byte absolute address>
                sink.put4(0x5800_0000 | (2 << 5) | machreg_to_gpr(rd.to_reg()));
                sink.put4(enc_jump26(0b000101, 3));
                sink.add_reloc(Reloc::Abs8, name, *offset);
                sink.put8(0);
            }
            &Inst::Udf { trap_code } => {
                sink.add_trap(trap_code);
                sink.put4(0x0000_0000);
            }
            Inst::Nop4 => {
                sink.put4(0xd503201f);
            }
        }
    }
}

fn emit_clobber_restores(
    sink: &mut MachBuffer<Inst>,
    emit_info: &EmitInfo,
    state: &mut EmitState,
    frame: &FrameLayout,
) {
    let base = (frame.frame_size() - frame.clobber_size) as i64;
    for (i, reg) in frame.clobbered_callee_saves.iter().enumerate() {
        let off = base + (i as i64) * 8;
        let inst = match reg.class() {
            crate::machinst::RegClass::Int => Inst::gen_load(
                Writable::from_reg(Reg::from_real(*reg)),
                AMode::SPOffset { off },
                I64,
            ),
            _ => Inst::FpuLoad64 {
                rd: Writable::from_reg(Reg::from_real(*reg)),
                mem: AMode::SPOffset { off },
            },
        };
        inst.emit(sink, emit_info, state);
    }
}

fn emit_frame_dealloc(
    sink: &mut MachBuffer<Inst>,
    emit_info: &EmitInfo,
    state: &mut EmitState,
    frame: &FrameLayout,
) {
    let amt = frame.frame_size() as u64;
    for inst in AArch64MachineDeps::gen_sp_adjust_seq(amt as i64) {
        inst.emit(sink, emit_info, state);
    }
}

use crate::isa::aarch64::abi::AArch64MachineDeps;
