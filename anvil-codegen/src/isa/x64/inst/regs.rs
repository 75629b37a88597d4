//! x86-64 definitions: registers.

use crate::machinst::{PReg, Reg, RegClass, Writable};

// Hardware encodings for the integer registers.
pub(crate) const ENC_RAX: u8 = 0;
pub(crate) const ENC_RCX: u8 = 1;
pub(crate) const ENC_RDX: u8 = 2;
pub(crate) const ENC_RBX: u8 = 3;
pub(crate) const ENC_RSP: u8 = 4;
pub(crate) const ENC_RBP: u8 = 5;
pub(crate) const ENC_RSI: u8 = 6;
pub(crate) const ENC_RDI: u8 = 7;
pub(crate) const ENC_R8: u8 = 8;
pub(crate) const ENC_R9: u8 = 9;
pub(crate) const ENC_R10: u8 = 10;
pub(crate) const ENC_R11: u8 = 11;
pub(crate) const ENC_R12: u8 = 12;
pub(crate) const ENC_R13: u8 = 13;
pub(crate) const ENC_R14: u8 = 14;
pub(crate) const ENC_R15: u8 = 15;

/// The physical GPR with the given hardware encoding.
pub const fn gpr_preg(enc: u8) -> PReg {
    PReg::new(enc as usize, RegClass::Int)
}

/// The physical XMM register with the given hardware encoding.
pub const fn xmm_preg(enc: u8) -> PReg {
    PReg::new(enc as usize, RegClass::Float)
}

/// A `Reg` for the given GPR.
pub fn gpr(enc: u8) -> Reg {
    Reg::from_real(gpr_preg(enc))
}

/// A `Reg` for the given XMM register.
pub fn xmm(enc: u8) -> Reg {
    Reg::from_real(xmm_preg(enc))
}

/// rax.
pub fn rax() -> Reg {
    gpr(ENC_RAX)
}
/// rcx.
pub fn rcx() -> Reg {
    gpr(ENC_RCX)
}
/// rdx.
pub fn rdx() -> Reg {
    gpr(ENC_RDX)
}
/// rbx.
pub fn rbx() -> Reg {
    gpr(ENC_RBX)
}
/// The stack pointer.
pub fn rsp() -> Reg {
    gpr(ENC_RSP)
}
/// The frame pointer.
pub fn rbp() -> Reg {
    gpr(ENC_RBP)
}
/// rsi.
pub fn rsi() -> Reg {
    gpr(ENC_RSI)
}
/// rdi.
pub fn rdi() -> Reg {
    gpr(ENC_RDI)
}
/// r8.
pub fn r8() -> Reg {
    gpr(ENC_R8)
}
/// r9.
pub fn r9() -> Reg {
    gpr(ENC_R9)
}
/// r10.
pub fn r10() -> Reg {
    gpr(ENC_R10)
}
/// r11, the scratch register for move cycles; excluded from allocation.
pub fn r11() -> Reg {
    gpr(ENC_R11)
}

/// A writable rbp reference (prologue only).
pub fn writable_rbp() -> Writable<Reg> {
    Writable::from_reg(rbp())
}

/// A writable rsp reference (prologue only).
pub fn writable_rsp() -> Writable<Reg> {
    Writable::from_reg(rsp())
}
