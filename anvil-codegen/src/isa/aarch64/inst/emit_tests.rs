//! Tests for the AArch64 emitter: golden bytes checked against a
//! reference assembler's output.

use crate::ir::types::I64;
use crate::ir::TrapCode;
use crate::isa::aarch64::inst::emit::{EmitInfo, EmitState};
use crate::isa::aarch64::inst::*;
use crate::machinst::abi::FrameLayout;
use crate::machinst::{MachBuffer, MachInst, MachInstEmit, MachInstEmitState};

fn emit_bytes(insts: &[Inst]) -> Vec<u8> {
    let mut buffer = MachBuffer::<Inst>::new();
    let info = EmitInfo::default();
    let mut state = EmitState::new(FrameLayout::default());
    for inst in insts {
        inst.emit(&mut buffer, &info, &mut state);
    }
    buffer.finish().data().to_vec()
}

fn check(inst: Inst, expected: u32, asm: &str) {
    let bytes = emit_bytes(core::slice::from_ref(&inst));
    assert_eq!(
        bytes,
        expected.to_le_bytes().to_vec(),
        "{asm}: got {:08x}, want {expected:08x}",
        u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
    );
}

#[test]
fn test_alu_rrr() {
    check(
        Inst::AluRRR {
            alu_op: ALUOp::Add,
            size: OperandSize::Size64,
            rd: writable_xreg(4),
            rn: xreg(5),
            rm: xreg(6),
        },
        0x8b0600a4,
        "add x4, x5, x6",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::Sub,
            size: OperandSize::Size32,
            rd: writable_xreg(1),
            rn: xreg(2),
            rm: xreg(3),
        },
        0x4b030041,
        "sub w1, w2, w3",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::UDiv,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            rm: xreg(2),
        },
        0x9ac20820,
        "udiv x0, x1, x2",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::SDiv,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            rm: xreg(2),
        },
        0x9ac20c20,
        "sdiv x0, x1, x2",
    );
    check(
        Inst::AluRRR {
            alu_op: ALUOp::Lsl,
            size: OperandSize::Size64,
            rd: writable_xreg(7),
            rn: xreg(8),
            rm: xreg(9),
        },
        0x9ac92107,
        "lsl x7, x8, x9",
    );
}

#[test]
fn test_alu_rrrr() {
    check(
        Inst::AluRRRR {
            alu_op: ALUOp3::MAdd,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            rm: xreg(2),
            ra: zero_reg(),
        },
        0x9b027c20,
        "mul x0, x1, x2",
    );
    check(
        Inst::AluRRRR {
            alu_op: ALUOp3::MSub,
            size: OperandSize::Size64,
            rd: writable_xreg(3),
            rn: xreg(4),
            rm: xreg(5),
            ra: xreg(6),
        },
        0x9b059883,
        "msub x3, x4, x5, x6",
    );
}

#[test]
fn test_alu_imm12() {
    check(
        Inst::AluRRImm12 {
            alu_op: ALUOp::Add,
            size: OperandSize::Size64,
            rd: writable_xreg(7),
            rn: xreg(8),
            imm12: Imm12::maybe_from_u64(42).unwrap(),
        },
        0x9100a907,
        "add x7, x8, #42",
    );
    check(
        Inst::AluRRImm12 {
            alu_op: ALUOp::SubS,
            size: OperandSize::Size32,
            rd: writable_zero_reg(),
            rn: xreg(3),
            imm12: Imm12::maybe_from_u64(100).unwrap(),
        },
        0x7101907f,
        "cmp w3, #100",
    );
}

#[test]
fn test_alu_imm_logic() {
    // and x0, x1, #0xff: N=1, immr=0, imms=0b000111.
    check(
        Inst::AluRRImmLogic {
            alu_op: ALUOp::And,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            imml: ImmLogic::maybe_from_u64(0xff, I64).unwrap(),
        },
        0x92401c20,
        "and x0, x1, #0xff",
    );
}

#[test]
fn test_alu_imm_shift() {
    check(
        Inst::AluRRImmShift {
            alu_op: ALUOp::Lsl,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            immshift: ImmShift::maybe_from_u64(8).unwrap(),
        },
        0xd378dc20,
        "lsl x0, x1, #8",
    );
    check(
        Inst::AluRRImmShift {
            alu_op: ALUOp::Lsr,
            size: OperandSize::Size64,
            rd: writable_xreg(0),
            rn: xreg(1),
            immshift: ImmShift::maybe_from_u64(8).unwrap(),
        },
        0xd348fc20,
        "lsr x0, x1, #8",
    );
    check(
        Inst::AluRRImmShift {
            alu_op: ALUOp::Asr,
            size: OperandSize::Size64,
            rd: writable_xreg(4),
            rn: xreg(5),
            immshift: ImmShift::maybe_from_u64(3).unwrap(),
        },
        0x9343fca4,
        "asr x4, x5, #3",
    );
}

#[test]
fn test_bit_rr() {
    check(
        Inst::BitRR {
            op: BitOp::RBit,
            size: OperandSize::Size64,
            rd: writable_xreg(1),
            rn: xreg(10),
        },
        0xdac00141,
        "rbit x1, x10",
    );
    check(
        Inst::BitRR {
            op: BitOp::Clz,
            size: OperandSize::Size64,
            rd: writable_xreg(15),
            rn: xreg(3),
        },
        0xdac0106f,
        "clz x15, x3",
    );
}

#[test]
fn test_move_wide() {
    check(
        Inst::MovWide {
            op: MoveWideOp::MovZ,
            rd: writable_xreg(1),
            imm: MoveWideConst::maybe_from_u64(0xffff).unwrap(),
            size: OperandSize::Size64,
        },
        0xd29fffe1,
        "movz x1, #0xffff",
    );
    check(
        Inst::MovWide {
            op: MoveWideOp::MovN,
            rd: writable_xreg(2),
            imm: MoveWideConst::zero(),
            size: OperandSize::Size64,
        },
        0x92800002,
        "movn x2, #0",
    );
    check(
        Inst::MovK {
            rd: writable_xreg(3),
            rn: xreg(3),
            imm: MoveWideConst::from_chunk_of(0x0001_0000, 1),
            size: OperandSize::Size64,
        },
        0xf2a00023,
        "movk x3, #1, lsl #16",
    );
}

#[test]
fn test_mov() {
    check(
        Inst::Mov {
            size: OperandSize::Size64,
            rd: writable_xreg(10),
            rm: xreg(12),
        },
        0xaa0c03ea,
        "mov x10, x12",
    );
    check(
        Inst::Mov {
            size: OperandSize::Size32,
            rd: writable_xreg(2),
            rm: xreg(3),
        },
        0x2a0303e2,
        "mov w2, w3",
    );
}

#[test]
fn test_extend() {
    check(
        Inst::Extend {
            rd: writable_xreg(3),
            rn: xreg(4),
            signed: true,
            from_bits: 8,
            to_bits: 64,
        },
        0x93401c83,
        "sxtb x3, w4",
    );
    check(
        Inst::Extend {
            rd: writable_xreg(1),
            rn: xreg(2),
            signed: true,
            from_bits: 32,
            to_bits: 64,
        },
        0x93407c41,
        "sxtw x1, w2",
    );
    check(
        Inst::Extend {
            rd: writable_xreg(5),
            rn: xreg(6),
            signed: false,
            from_bits: 16,
            to_bits: 32,
        },
        0x53003cc5,
        "uxth w5, w6",
    );
    // 32 -> 64 unsigned is a W-register move.
    check(
        Inst::Extend {
            rd: writable_xreg(7),
            rn: xreg(8),
            signed: false,
            from_bits: 32,
            to_bits: 64,
        },
        0x2a0803e7,
        "mov w7, w8",
    );
}

#[test]
fn test_loads_stores() {
    check(
        Inst::ULoad64 {
            rd: writable_xreg(1),
            mem: AMode::UnsignedOffset {
                rn: xreg(2),
                uimm12: UImm12Scaled::maybe_from_i64(16, I64).unwrap(),
            },
        },
        0xf9400841,
        "ldr x1, [x2, #16]",
    );
    check(
        Inst::Store32 {
            rd: xreg(3),
            mem: AMode::UnsignedOffset {
                rn: xreg(5),
                uimm12: UImm12Scaled::zero(crate::ir::types::I32),
            },
        },
        0xb90000a3,
        "str w3, [x5]",
    );
    check(
        Inst::ULoad8 {
            rd: writable_xreg(0),
            mem: AMode::Unscaled {
                rn: xreg(1),
                simm9: SImm9::maybe_from_i64(-1).unwrap(),
            },
        },
        0x385ff020,
        "ldurb w0, [x1, #-1]",
    );
    check(
        Inst::SLoad16 {
            rd: writable_xreg(4),
            mem: AMode::UnsignedOffset {
                rn: xreg(7),
                uimm12: UImm12Scaled::maybe_from_i64(2, crate::ir::types::I16).unwrap(),
            },
        },
        0x798004e4,
        "ldrsh x4, [x7, #2]",
    );
}

#[test]
fn test_pairs() {
    check(
        Inst::StoreP64 {
            rt: fp_reg(),
            rt2: link_reg(),
            mem: PairAMode::PreIndexed(
                stack_reg(),
                SImm7Scaled::maybe_from_i64(-16, I64).unwrap(),
            ),
        },
        0xa9bf7bfd,
        "stp fp, lr, [sp, #-16]!",
    );
    check(
        Inst::LoadP64 {
            rt: writable_xreg(29),
            rt2: writable_xreg(30),
            mem: PairAMode::PostIndexed(
                stack_reg(),
                SImm7Scaled::maybe_from_i64(16, I64).unwrap(),
            ),
        },
        0xa8c17bfd,
        "ldp fp, lr, [sp], #16",
    );
}

#[test]
fn test_csel_cset() {
    check(
        Inst::CSel {
            rd: writable_xreg(1),
            cond: Cond::Ne,
            rn: xreg(2),
            rm: xreg(3),
        },
        0x9a831041,
        "csel x1, x2, x3, ne",
    );
    check(
        Inst::CSet {
            rd: writable_xreg(2),
            cond: Cond::Eq,
        },
        0x9a9f17e2,
        "cset x2, eq",
    );
}

#[test]
fn test_fpu() {
    check(
        Inst::FpuRRR {
            fpu_op: FPUOp2::Add,
            size: ScalarSize::Size64,
            rd: writable_vreg(1),
            rn: vreg(2),
            rm: vreg(3),
        },
        0x1e632841,
        "fadd d1, d2, d3",
    );
    check(
        Inst::FpuRRR {
            fpu_op: FPUOp2::Min,
            size: ScalarSize::Size32,
            rd: writable_vreg(4),
            rn: vreg(5),
            rm: vreg(6),
        },
        0x1e2658a4,
        "fmin s4, s5, s6",
    );
    check(
        Inst::FpuRR {
            fpu_op: FPUOp1::Sqrt,
            size: ScalarSize::Size64,
            rd: writable_vreg(0),
            rn: vreg(1),
        },
        0x1e61c020,
        "fsqrt d0, d1",
    );
    check(
        Inst::FpuCmp {
            size: ScalarSize::Size32,
            rn: vreg(0),
            rm: vreg(1),
        },
        0x1e212000,
        "fcmp s0, s1",
    );
    check(
        Inst::FpuMove {
            size: ScalarSize::Size64,
            rd: writable_vreg(3),
            rn: vreg(4),
        },
        0x1e604083,
        "fmov d3, d4",
    );
    check(
        Inst::MovToFpu {
            rd: writable_vreg(1),
            rn: xreg(2),
            size: ScalarSize::Size64,
        },
        0x9e670041,
        "fmov d1, x2",
    );
    check(
        Inst::MovFromFpu {
            rd: writable_xreg(1),
            rn: vreg(2),
            size: ScalarSize::Size64,
        },
        0x9e660041,
        "fmov x1, d2",
    );
    check(
        Inst::FpuToInt {
            op: FpuToIntOp::F64ToI64,
            rd: writable_xreg(0),
            rn: vreg(1),
        },
        0x9e780020,
        "fcvtzs x0, d1",
    );
    check(
        Inst::IntToFpu {
            op: IntToFpuOp::I64ToF64,
            rd: writable_vreg(0),
            rn: xreg(1),
        },
        0x9e620020,
        "scvtf d0, x1",
    );
}

#[test]
fn test_vec_popcnt_helpers() {
    check(
        Inst::VecCnt8B {
            rd: writable_vreg(0),
            rn: vreg(1),
        },
        0x0e205820,
        "cnt v0.8b, v1.8b",
    );
    check(
        Inst::VecAddv8B {
            rd: writable_vreg(0),
            rn: vreg(1),
        },
        0x0e31b820,
        "addv b0, v1.8b",
    );
}

#[test]
fn test_branches() {
    check(
        Inst::Jump {
            dest: BranchTarget::ResolvedOffset(2),
        },
        0x14000002,
        "b #8",
    );
    check(
        Inst::Udf {
            trap_code: TrapCode::UnreachableCodeReached,
        },
        0x00000000,
        "udf",
    );
    check(Inst::Nop4, 0xd503201f, "nop");

    // TrapIf: an inverted-skip branch followed by udf.
    let bytes = emit_bytes(&[Inst::TrapIf {
        kind: CondBrKind::Cond(Cond::Vs),
        trap_code: TrapCode::IntegerOverflow,
    }]);
    assert_eq!(bytes.len(), 8);
    // b.vc #8
    assert_eq!(&bytes[0..4], &0x54000047u32.to_le_bytes());
    assert_eq!(&bytes[4..8], &0x00000000u32.to_le_bytes());
}

#[test]
fn test_label_branch_resolution() {
    // A forward conditional branch to a label bound after one
    // instruction, with its unconditional partner chomped as a branch to
    // the fall-through.
    let mut buffer = MachBuffer::<Inst>::new();
    let info = EmitInfo::default();
    let mut state = EmitState::new(FrameLayout::default());

    let target = buffer.get_label();
    Inst::CondBr {
        taken: BranchTarget::Label(target),
        not_taken: BranchTarget::Label(target),
        kind: CondBrKind::Cond(Cond::Eq),
    }
    .emit(&mut buffer, &info, &mut state);
    buffer.bind_label(target);
    Inst::Nop4.emit(&mut buffer, &info, &mut state);
    let out = buffer.finish();
    // The b.eq resolves to +4 (the uncond partner was chomped), then the
    // nop.
    assert_eq!(out.data().len(), 8);
    let cond = u32::from_le_bytes(out.data()[0..4].try_into().unwrap());
    assert_eq!(cond, 0x54000020); // b.eq #4
    let nop = u32::from_le_bytes(out.data()[4..8].try_into().unwrap());
    assert_eq!(nop, 0xd503201f);
}

#[test]
fn test_veneer_insertion() {
    // Force a conditional-branch fixup past its 1 MiB range and check
    // that an island veneer extends it: the b.cond is patched to target
    // the veneer, which is an unconditional branch to the real target.
    let mut buffer = MachBuffer::<Inst>::new();
    let info = EmitInfo::default();
    let mut state = EmitState::new(FrameLayout::default());

    let far = buffer.get_label();
    Inst::OneWayCondBr {
        target: BranchTarget::Label(far),
        kind: CondBrKind::Cond(Cond::Eq),
    }
    .emit(&mut buffer, &info, &mut state);

    // Emit more than 1 MiB of nops, checking for island needs the same
    // way the emission driver does.
    let worst = Inst::worst_case_size();
    let mut island_at = None;
    for _ in 0..(1024 * 1024 / 4 + 16) {
        if island_at.is_none() && buffer.island_needed(worst) {
            let skip = buffer.get_label();
            Inst::gen_jump(skip).emit(&mut buffer, &info, &mut state);
            buffer.emit_island(worst);
            buffer.bind_label(skip);
            island_at = Some(buffer.cur_offset());
        }
        Inst::Nop4.emit(&mut buffer, &info, &mut state);
    }
    let island_at = island_at.expect("island must have been emitted");
    buffer.bind_label(far);
    Inst::Nop4.emit(&mut buffer, &info, &mut state);
    let out = buffer.finish();

    // The original b.cond must point into the island (a veneer), not at
    // the far label.
    let cond = u32::from_le_bytes(out.data()[0..4].try_into().unwrap());
    let imm19 = (cond >> 5) & ((1 << 19) - 1);
    let cond_dest = (imm19 << 2) as usize;
    assert!(cond_dest < island_at as usize, "b.cond retargeted to veneer");
    // The veneer is an unconditional branch; decode and follow it.
    let veneer = u32::from_le_bytes(out.data()[cond_dest..cond_dest + 4].try_into().unwrap());
    assert_eq!(veneer >> 26, 0b000101, "veneer is an unconditional branch");
    let imm26 = veneer & ((1 << 26) - 1);
    let veneer_dest = cond_dest + ((imm26 << 2) as usize);
    let far_offset = out.data().len() - 4;
    assert_eq!(veneer_dest, far_offset, "veneer reaches the far label");
}
