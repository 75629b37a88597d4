//! AArch64 ISA definitions: registers.

use crate::machinst::{PReg, Reg, RegClass, Writable};

/// Get a reference to an X-register (integer register).
pub fn xreg(num: u8) -> Reg {
    Reg::from_real(xreg_preg(num))
}

/// Get the physical X-register.
pub const fn xreg_preg(num: u8) -> PReg {
    assert!(num < 31);
    PReg::new(num as usize, RegClass::Int)
}

/// Get a writable reference to an X-register.
pub fn writable_xreg(num: u8) -> Writable<Reg> {
    Writable::from_reg(xreg(num))
}

/// Get a reference to a V-register (vector/FP register).
pub fn vreg(num: u8) -> Reg {
    Reg::from_real(vreg_preg(num))
}

/// Get the physical V-register.
pub const fn vreg_preg(num: u8) -> PReg {
    assert!(num < 32);
    PReg::new(num as usize, RegClass::Float)
}

/// Get a writable reference to a V-register.
pub fn writable_vreg(num: u8) -> Writable<Reg> {
    Writable::from_reg(vreg(num))
}

/// The zero register, XZR. Encoded as register 31 in contexts where 31
/// means the zero register; kept out of the allocatable set.
pub fn zero_reg() -> Reg {
    Reg::from_real(PReg::new(31, RegClass::Int))
}

/// Get a writable reference to the zero-register (this discards a
/// result).
pub fn writable_zero_reg() -> Writable<Reg> {
    Writable::from_reg(zero_reg())
}

/// The stack-pointer register. XSP shares encoding 31 with XZR; which one
/// an instruction means is contextual, and only the ABI code ever uses
/// SP.
pub fn stack_reg() -> Reg {
    Reg::from_real(PReg::new(31, RegClass::Int))
}

/// Get a writable reference to the stack-pointer register.
pub fn writable_stack_reg() -> Writable<Reg> {
    Writable::from_reg(stack_reg())
}

/// Get a reference to the link register (x30).
pub fn link_reg() -> Reg {
    xreg(30)
}

/// Get a writable reference to the link register.
pub fn writable_link_reg() -> Writable<Reg> {
    writable_xreg(30)
}

/// Get a reference to the frame pointer (x29).
pub fn fp_reg() -> Reg {
    xreg(29)
}

/// Get a writable reference to the frame pointer.
pub fn writable_fp_reg() -> Writable<Reg> {
    writable_xreg(29)
}

/// The first spill/veneer temporary, x16 (IP0 in the AArch64 ABI). Used
/// to build addresses that don't fit an addressing mode and as the
/// allocator's move-cycle scratch. Excluded from allocation.
pub fn spilltmp_reg() -> Reg {
    xreg(16)
}

/// Get a writable reference to the spilltmp reg.
pub fn writable_spilltmp_reg() -> Writable<Reg> {
    writable_xreg(16)
}

/// The second temporary, x17 (IP1), for the rare cases that need two
/// scratch registers (jump-table dispatch). Excluded from allocation.
pub fn tmp2_reg() -> Reg {
    xreg(17)
}

/// Get a writable reference to the tmp2 reg.
pub fn writable_tmp2_reg() -> Writable<Reg> {
    writable_xreg(17)
}

/// The float scratch register for move cycles, v31.
pub fn fp_scratch_reg() -> Reg {
    vreg(31)
}
