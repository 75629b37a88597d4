//! Tests for the x64 emitter: golden bytes checked against a reference
//! assembler's output.

use crate::ir::TrapCode;
use crate::isa::x64::inst::emit::{EmitInfo, EmitState};
use crate::isa::x64::inst::*;
use crate::isa::x64::settings as x64_settings;
use crate::machinst::abi::FrameLayout;
use crate::machinst::{MachBuffer, MachInstEmit, MachInstEmitState, Writable};

fn emit_with(insts: &[Inst], info: &EmitInfo) -> Vec<u8> {
    let mut buffer = MachBuffer::<Inst>::new();
    let mut state = EmitState::new(FrameLayout::default());
    for inst in insts {
        inst.emit(&mut buffer, info, &mut state);
    }
    buffer.finish().data().to_vec()
}

fn emit_bytes(insts: &[Inst]) -> Vec<u8> {
    emit_with(insts, &EmitInfo::default())
}

fn check(inst: Inst, expected: &[u8], asm: &str) {
    let bytes = emit_bytes(core::slice::from_ref(&inst));
    assert_eq!(bytes, expected, "{asm}: got {bytes:02x?}, want {expected:02x?}");
}

fn wr(reg: crate::machinst::Reg) -> Writable<crate::machinst::Reg> {
    Writable::from_reg(reg)
}

#[test]
fn test_alu() {
    check(
        Inst::AluRmiR {
            size: OperandSize::Size64,
            op: AluRmiROpcode::Add,
            src1: rax(),
            src2: RegMemImm::reg(rcx()),
            dst: wr(rax()),
        },
        &[0x48, 0x03, 0xC1],
        "add rax, rcx",
    );
    check(
        Inst::AluRmiR {
            size: OperandSize::Size32,
            op: AluRmiROpcode::Add,
            src1: rax(),
            src2: RegMemImm::imm(1),
            dst: wr(rax()),
        },
        &[0x83, 0xC0, 0x01],
        "add eax, 1",
    );
    check(
        Inst::AluRmiR {
            size: OperandSize::Size32,
            op: AluRmiROpcode::Add,
            src1: rax(),
            src2: RegMemImm::imm(128),
            dst: wr(rax()),
        },
        &[0x81, 0xC0, 0x80, 0x00, 0x00, 0x00],
        "add eax, 128",
    );
    check(
        Inst::AluRmiR {
            size: OperandSize::Size64,
            op: AluRmiROpcode::Xor,
            src1: r10(),
            src2: RegMemImm::reg(r9()),
            dst: wr(r10()),
        },
        &[0x4D, 0x33, 0xD1],
        "xor r10, r9",
    );
    check(
        Inst::Imul {
            size: OperandSize::Size64,
            src1: rax(),
            src2: RegMem::reg(rcx()),
            dst: wr(rax()),
        },
        &[0x48, 0x0F, 0xAF, 0xC1],
        "imul rax, rcx",
    );
}

#[test]
fn test_imm() {
    check(
        Inst::Imm {
            dst_size: OperandSize::Size64,
            simm64: 0x1234_5678_9abc_def0,
            dst: wr(rax()),
        },
        &[0x48, 0xB8, 0xF0, 0xDE, 0xBC, 0x9A, 0x78, 0x56, 0x34, 0x12],
        "movabs rax, 0x123456789abcdef0",
    );
    check(
        Inst::Imm {
            dst_size: OperandSize::Size64,
            simm64: 1,
            dst: wr(rax()),
        },
        &[0x48, 0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00],
        "mov rax, 1",
    );
    check(
        Inst::Imm {
            dst_size: OperandSize::Size64,
            simm64: 0xffff_ffff,
            dst: wr(rax()),
        },
        &[0xB8, 0xFF, 0xFF, 0xFF, 0xFF],
        "mov eax, 0xffffffff",
    );
    check(
        Inst::Imm {
            dst_size: OperandSize::Size32,
            simm64: 42,
            dst: wr(rcx()),
        },
        &[0xB9, 0x2A, 0x00, 0x00, 0x00],
        "mov ecx, 42",
    );
}

#[test]
fn test_moves_loads_stores() {
    check(
        Inst::MovRR {
            size: OperandSize::Size64,
            src: rdi(),
            dst: wr(rax()),
        },
        &[0x48, 0x89, 0xF8],
        "mov rax, rdi",
    );
    check(
        Inst::Mov64MR {
            src: SyntheticAmode::Real(Amode::imm_reg(8, rbp())),
            dst: wr(rax()),
        },
        &[0x48, 0x8B, 0x45, 0x08],
        "mov rax, [rbp+8]",
    );
    check(
        Inst::Mov64MR {
            src: SyntheticAmode::Real(Amode::imm_reg(0, rsp())),
            dst: wr(rax()),
        },
        &[0x48, 0x8B, 0x04, 0x24],
        "mov rax, [rsp]",
    );
    check(
        Inst::Mov64MR {
            src: SyntheticAmode::Real(Amode::imm_reg(0, gpr(ENC_R12))),
            dst: wr(rax()),
        },
        &[0x49, 0x8B, 0x04, 0x24],
        "mov rax, [r12]",
    );
    check(
        Inst::Mov64MR {
            src: SyntheticAmode::Real(Amode::imm_reg(0, gpr(ENC_R13))),
            dst: wr(rax()),
        },
        &[0x49, 0x8B, 0x45, 0x00],
        "mov rax, [r13]",
    );
    check(
        Inst::MovRM {
            size: OperandSize::Size32,
            src: rcx(),
            dst: SyntheticAmode::Real(Amode::imm_reg(16, rax())),
        },
        &[0x89, 0x48, 0x10],
        "mov [rax+16], ecx",
    );
    check(
        Inst::MovzxRmR {
            ext_mode: ExtMode::BL,
            src: RegMem::reg(rcx()),
            dst: wr(rax()),
        },
        &[0x0F, 0xB6, 0xC1],
        "movzx eax, cl",
    );
    // SIL requires a REX prefix for byte access.
    check(
        Inst::MovzxRmR {
            ext_mode: ExtMode::BL,
            src: RegMem::reg(rsi()),
            dst: wr(rax()),
        },
        &[0x40, 0x0F, 0xB6, 0xC6],
        "movzx eax, sil",
    );
    check(
        Inst::MovsxRmR {
            ext_mode: ExtMode::LQ,
            src: RegMem::reg(rcx()),
            dst: wr(rax()),
        },
        &[0x48, 0x63, 0xC1],
        "movsxd rax, ecx",
    );
}

#[test]
fn test_shift_cmp_setcc() {
    check(
        Inst::ShiftR {
            size: OperandSize::Size64,
            kind: ShiftKind::ShiftLeft,
            src1: rax(),
            num_bits: Imm8Reg::Imm8 { imm: 3 },
            dst: wr(rax()),
        },
        &[0x48, 0xC1, 0xE0, 0x03],
        "shl rax, 3",
    );
    check(
        Inst::ShiftR {
            size: OperandSize::Size32,
            kind: ShiftKind::ShiftRightLogical,
            src1: rax(),
            num_bits: Imm8Reg::Reg { reg: rcx() },
            dst: wr(rax()),
        },
        &[0xD3, 0xE8],
        "shr eax, cl",
    );
    check(
        Inst::CmpRmiR {
            size: OperandSize::Size32,
            src: RegMemImm::imm(5),
            dst: rbx(),
        },
        &[0x83, 0xFB, 0x05],
        "cmp ebx, 5",
    );
    check(
        Inst::TestRmiR {
            size: OperandSize::Size64,
            src: RegMemImm::reg(rax()),
            dst: rax(),
        },
        &[0x48, 0x85, 0xC0],
        "test rax, rax",
    );
    check(
        Inst::Setcc {
            cc: CC::Z,
            dst: wr(rcx()),
        },
        &[0x0F, 0x94, 0xC1],
        "setz cl",
    );
    check(
        Inst::Setcc {
            cc: CC::Z,
            dst: wr(rsi()),
        },
        &[0x40, 0x0F, 0x94, 0xC6],
        "setz sil",
    );
    check(
        Inst::Cmove {
            size: OperandSize::Size64,
            cc: CC::NZ,
            consequent: RegMem::reg(rcx()),
            alternative: rax(),
            dst: wr(rax()),
        },
        &[0x48, 0x0F, 0x45, 0xC1],
        "cmovnz rax, rcx",
    );
}

#[test]
fn test_div() {
    check(
        Inst::SignExtendData {
            size: OperandSize::Size64,
            src: rax(),
            dst: wr(rdx()),
        },
        &[0x48, 0x99],
        "cqo",
    );
    let bytes = emit_bytes(&[Inst::Div {
        size: OperandSize::Size64,
        signed: true,
        divisor: RegMem::reg(rcx()),
        dividend_lo: rax(),
        dividend_hi: rdx(),
        dst_quotient: wr(rax()),
        dst_remainder: wr(rdx()),
    }]);
    assert_eq!(bytes, vec![0x48, 0xF7, 0xF9], "idiv rcx");
}

#[test]
fn test_sse() {
    check(
        Inst::XmmRmR {
            op: SseOpcode::Addsd,
            src1: xmm(1),
            src2: RegMem::reg(xmm(2)),
            dst: wr(xmm(1)),
        },
        &[0xF2, 0x0F, 0x58, 0xCA],
        "addsd xmm1, xmm2",
    );
    check(
        Inst::XmmRmR {
            op: SseOpcode::Xorps,
            src1: xmm(0),
            src2: RegMem::reg(xmm(0)),
            dst: wr(xmm(0)),
        },
        &[0x0F, 0x57, 0xC0],
        "xorps xmm0, xmm0",
    );
    check(
        Inst::XmmCmpRmR {
            op: SseOpcode::Ucomiss,
            src: RegMem::reg(xmm(1)),
            dst: xmm(0),
        },
        &[0x0F, 0x2E, 0xC1],
        "ucomiss xmm0, xmm1",
    );
    check(
        Inst::XmmUnaryRmR {
            op: SseOpcode::Sqrtsd,
            src: RegMem::reg(xmm(3)),
            dst: wr(xmm(2)),
        },
        &[0xF2, 0x0F, 0x51, 0xD3],
        "sqrtsd xmm2, xmm3",
    );
    check(
        Inst::XmmMovRR {
            src: xmm(1),
            dst: wr(xmm(4)),
        },
        &[0x0F, 0x28, 0xE1],
        "movaps xmm4, xmm1",
    );
    check(
        Inst::GprToXmm {
            op: GprToXmmOp::Cvtsi2sd,
            src: RegMem::reg(rax()),
            dst: wr(xmm(0)),
            src_size: OperandSize::Size64,
        },
        &[0xF2, 0x48, 0x0F, 0x2A, 0xC0],
        "cvtsi2sd xmm0, rax",
    );
    check(
        Inst::XmmToGpr {
            op: XmmToGprOp::Cvttsd2si,
            src: xmm(0),
            dst: wr(rax()),
            dst_size: OperandSize::Size64,
        },
        &[0xF2, 0x48, 0x0F, 0x2C, 0xC0],
        "cvttsd2si rax, xmm0",
    );
    check(
        Inst::UnaryRmR {
            size: OperandSize::Size64,
            op: UnaryRmROpcode::Lzcnt,
            src: RegMem::reg(rcx()),
            dst: wr(rax()),
        },
        &[0xF3, 0x48, 0x0F, 0xBD, 0xC1],
        "lzcnt rax, rcx",
    );
}

#[test]
fn test_avx_vex_form() {
    // With AVX enabled, the scalar add uses the two-byte VEX form.
    let info = EmitInfo::new(
        Default::default(),
        x64_settings::Flags {
            has_avx: true,
            ..Default::default()
        },
    );
    let bytes = emit_with(
        &[Inst::XmmRmR {
            op: SseOpcode::Addsd,
            src1: xmm(2),
            src2: RegMem::reg(xmm(3)),
            dst: wr(xmm(1)),
        }],
        &info,
    );
    assert_eq!(bytes, vec![0xC5, 0xEB, 0x58, 0xCB], "vaddsd xmm1, xmm2, xmm3");
}

#[test]
fn test_avx512_evex_form() {
    // With AVX-512 enabled, the scalar add uses the four-byte EVEX
    // prefix.
    let info = EmitInfo::new(
        Default::default(),
        x64_settings::Flags {
            has_avx512: true,
            ..Default::default()
        },
    );
    let bytes = emit_with(
        &[Inst::XmmRmR {
            op: SseOpcode::Addsd,
            src1: xmm(2),
            src2: RegMem::reg(xmm(3)),
            dst: wr(xmm(1)),
        }],
        &info,
    );
    assert_eq!(bytes.len(), 6, "EVEX prefix (4) + opcode + modrm");
    assert_eq!(bytes[0], 0x62, "EVEX escape byte");
    assert_eq!(bytes[4], 0x58, "addsd opcode");
    assert_eq!(bytes[5], 0xCB, "modrm xmm1, xmm3");
}

#[test]
fn test_push_pop_traps() {
    check(Inst::Push64 { src: rbp() }, &[0x55], "push rbp");
    check(Inst::Pop64 { dst: wr(rbp()) }, &[0x5D], "pop rbp");
    check(
        Inst::Ud2 {
            trap_code: TrapCode::UnreachableCodeReached,
        },
        &[0x0F, 0x0B],
        "ud2",
    );
    check(
        Inst::TrapIf {
            cc: CC::NZ,
            trap_code: TrapCode::IntegerOverflow,
        },
        &[0x74, 0x02, 0x0F, 0x0B],
        "jz +2; ud2",
    );
}

#[test]
fn test_trap_records() {
    let mut buffer = MachBuffer::<Inst>::new();
    let info = EmitInfo::default();
    let mut state = EmitState::new(FrameLayout::default());
    Inst::Nop { len: 2 }.emit(&mut buffer, &info, &mut state);
    Inst::Div {
        size: OperandSize::Size64,
        signed: true,
        divisor: RegMem::reg(rcx()),
        dividend_lo: rax(),
        dividend_hi: rdx(),
        dst_quotient: wr(rax()),
        dst_remainder: wr(rdx()),
    }
    .emit(&mut buffer, &info, &mut state);
    let out = buffer.finish();
    let traps = out.traps();
    assert_eq!(traps.len(), 1);
    assert_eq!(traps[0].offset, 2, "trap is recorded at the div itself");
    assert_eq!(traps[0].code, TrapCode::IntegerDivisionByZero);
}

#[test]
fn test_jmp_resolution() {
    // A forward jump chomped as a branch to the fall-through.
    let mut buffer = MachBuffer::<Inst>::new();
    let info = EmitInfo::default();
    let mut state = EmitState::new(FrameLayout::default());
    let label = buffer.get_label();
    Inst::JmpKnown { dst: label }.emit(&mut buffer, &info, &mut state);
    buffer.bind_label(label);
    Inst::Nop { len: 1 }.emit(&mut buffer, &info, &mut state);
    let out = buffer.finish();
    assert_eq!(out.data(), &[0x90], "jump-to-next is elided");
}
