//! Implementation of the standard x64 ABIs: System V AMD64 and Windows
//! fastcall.
//!
//! System V passes integer arguments in RDI, RSI, RDX, RCX, R8, R9 and
//! floats in XMM0-XMM7; returns in RAX/RDX and XMM0/XMM1; RBX, RBP and
//! R12-R15 are callee-saved. Windows fastcall passes the first four
//! arguments positionally in RCX, RDX, R8, R9 / XMM0-XMM3, requires the
//! caller to reserve a 32-byte shadow space, and additionally saves RSI,
//! RDI and XMM6-XMM15 in the callee.

use crate::ir::{self, AbiParam, ArgumentPurpose, Type};
use crate::isa::x64::inst::*;
use crate::isa::CallConv;
use crate::machinst::abi::{
    ABIArg, ABIMachineSpec, ArgPair, ArgsOrRets, CallDest, FrameLayout, RetPair, StackArgPair,
};
use crate::machinst::{PReg, PRegSet, Reg, RegClass, SpillSlot, Writable};
use crate::regalloc::MachineEnv;
use crate::result::{CodegenError, CodegenResult};
use smallvec::{smallvec, SmallVec};
use std::vec::Vec;

/// A cap on the size of the stack argument area, to avoid 32-bit offset
/// overflow.
static STACK_ARG_RET_SIZE_LIMIT: u32 = 128 * 1024 * 1024;

/// x64-specific ABI behavior. This struct just serves as an
/// implementation point for the trait; it is never actually instantiated.
pub struct X64MachineDeps;

const SYSV_INT_ARGS: [u8; 6] = [ENC_RDI, ENC_RSI, ENC_RDX, ENC_RCX, ENC_R8, ENC_R9];
const WIN_INT_ARGS: [u8; 4] = [ENC_RCX, ENC_RDX, ENC_R8, ENC_R9];

impl ABIMachineSpec for X64MachineDeps {
    type I = Inst;

    fn word_bits() -> u32 {
        64
    }

    fn stack_align(_call_conv: CallConv) -> u32 {
        16
    }

    fn is_call_conv_supported(call_conv: CallConv) -> bool {
        match call_conv {
            CallConv::SystemV | CallConv::WindowsFastcall => true,
            // The Apple AArch64 convention has no meaning on x64.
            CallConv::AppleAarch64 => false,
        }
    }

    fn compute_arg_locs(
        call_conv: CallConv,
        params: &[AbiParam],
        args_or_rets: ArgsOrRets,
    ) -> CodegenResult<(Vec<ABIArg>, u32)> {
        let is_win = call_conv == CallConv::WindowsFastcall;
        let mut locs = Vec::with_capacity(params.len());

        match args_or_rets {
            ArgsOrRets::Rets => {
                // RAX/RDX and XMM0/XMM1 (RAX/XMM0 only on Windows).
                let max = if is_win { 1 } else { 2 };
                let mut next_int = 0;
                let mut next_flt = 0;
                for param in params {
                    let ty = param.value_type;
                    if ty.is_float() {
                        if next_flt >= max {
                            return Err(CodegenError::Unsupported(
                                "too many return values".into(),
                            ));
                        }
                        let enc = [0u8, 1u8][next_flt];
                        next_flt += 1;
                        locs.push(ABIArg::Reg {
                            reg: xmm_preg(enc),
                            ty,
                            extension: param.extension,
                            purpose: param.purpose,
                        });
                    } else {
                        if next_int >= max {
                            return Err(CodegenError::Unsupported(
                                "too many return values".into(),
                            ));
                        }
                        let enc = [ENC_RAX, ENC_RDX][next_int];
                        next_int += 1;
                        locs.push(ABIArg::Reg {
                            reg: gpr_preg(enc),
                            ty,
                            extension: param.extension,
                            purpose: param.purpose,
                        });
                    }
                }
                Ok((locs, 0))
            }
            ArgsOrRets::Args if is_win => {
                // Positional: slot i is the i'th register regardless of
                // class; slots 4+ go to the stack after the 32-byte shadow
                // space.
                let mut next_stack = 32u32;
                for (i, param) in params.iter().enumerate() {
                    let ty = param.value_type;
                    if let ArgumentPurpose::StructArgument(_) = param.purpose {
                        return Err(CodegenError::Unsupported(
                            "struct arguments on x64".into(),
                        ));
                    }
                    if i < 4 {
                        let reg = if ty.is_float() {
                            xmm_preg(i as u8)
                        } else {
                            gpr_preg(WIN_INT_ARGS[i])
                        };
                        locs.push(ABIArg::Reg {
                            reg,
                            ty,
                            extension: param.extension,
                            purpose: param.purpose,
                        });
                    } else {
                        locs.push(ABIArg::Stack {
                            offset: next_stack as i64,
                            ty,
                            extension: param.extension,
                            purpose: param.purpose,
                        });
                        next_stack += 8;
                    }
                }
                let next_stack = crate::machinst::abi::align_to(next_stack, 16);
                if next_stack > STACK_ARG_RET_SIZE_LIMIT {
                    return Err(CodegenError::Overflow);
                }
                Ok((locs, next_stack))
            }
            ArgsOrRets::Args => {
                let mut next_int = 0usize;
                let mut next_flt = 0usize;
                let mut next_stack = 0u32;
                for param in params {
                    let ty = param.value_type;
                    if let ArgumentPurpose::StructArgument(_) = param.purpose {
                        return Err(CodegenError::Unsupported(
                            "struct arguments on x64".into(),
                        ));
                    }
                    if ty.is_float() {
                        if next_flt < 8 {
                            let reg = xmm_preg(next_flt as u8);
                            next_flt += 1;
                            locs.push(ABIArg::Reg {
                                reg,
                                ty,
                                extension: param.extension,
                                purpose: param.purpose,
                            });
                            continue;
                        }
                    } else if next_int < SYSV_INT_ARGS.len() {
                        let reg = gpr_preg(SYSV_INT_ARGS[next_int]);
                        next_int += 1;
                        locs.push(ABIArg::Reg {
                            reg,
                            ty,
                            extension: param.extension,
                            purpose: param.purpose,
                        });
                        continue;
                    }
                    locs.push(ABIArg::Stack {
                        offset: next_stack as i64,
                        ty,
                        extension: param.extension,
                        purpose: param.purpose,
                    });
                    next_stack += 8;
                }
                let next_stack = crate::machinst::abi::align_to(next_stack, 16);
                if next_stack > STACK_ARG_RET_SIZE_LIMIT {
                    return Err(CodegenError::Overflow);
                }
                Ok((locs, next_stack))
            }
        }
    }

    fn gen_args(args: Vec<ArgPair>, stack_args: Vec<StackArgPair>) -> Inst {
        Inst::Args { args, stack_args }
    }

    fn gen_rets(rets: Vec<RetPair>) -> Inst {
        Inst::Rets { rets }
    }

    fn gen_load_stack_arg(into: Writable<Reg>, offset: i64, ty: Type) -> Inst {
        Inst::gen_load(into, SyntheticAmode::IncomingArg { off: offset }, ty)
    }

    fn gen_store_stack_arg(from: Reg, offset: i64, ty: Type) -> Inst {
        Inst::gen_store(from, SyntheticAmode::SPOffset { off: offset }, ty)
    }

    fn gen_spill(to_slot: SpillSlot, from_reg: Reg, ty: Type) -> Inst {
        let ty = canonical_spill_ty(from_reg, ty);
        Inst::gen_store(from_reg, SyntheticAmode::SpillOffset { slot: to_slot }, ty)
    }

    fn gen_reload(to_reg: Writable<Reg>, from_slot: SpillSlot, ty: Type) -> Inst {
        let ty = canonical_spill_ty(to_reg.to_reg(), ty);
        Inst::gen_load(to_reg, SyntheticAmode::SpillOffset { slot: from_slot }, ty)
    }

    fn gen_call(
        dest: CallDest,
        uses: SmallVec<[RetPair; 8]>,
        defs: SmallVec<[ArgPair; 2]>,
        clobbers: PRegSet,
    ) -> SmallVec<[Inst; 2]> {
        match dest {
            CallDest::ExtName(name) => smallvec![Inst::CallKnown {
                info: Box::new(CallInfo {
                    dest: name,
                    uses,
                    defs,
                    clobbers,
                }),
            }],
            CallDest::Reg(rn) => smallvec![Inst::CallUnknown {
                info: Box::new(CallIndInfo {
                    rn,
                    uses,
                    defs,
                    clobbers,
                }),
            }],
        }
    }

    fn gen_prologue(_call_conv: CallConv, frame: &FrameLayout) -> SmallVec<[Inst; 16]> {
        let mut insts: SmallVec<[Inst; 16]> = SmallVec::new();
        // push rbp; mov rbp, rsp.
        insts.push(Inst::Push64 { src: rbp() });
        insts.push(Inst::MovRR {
            size: OperandSize::Size64,
            src: rsp(),
            dst: writable_rbp(),
        });
        // sub rsp, frame_size.
        let amt = frame.frame_size();
        if amt > 0 {
            insts.push(Inst::AluRmiR {
                size: OperandSize::Size64,
                op: AluRmiROpcode::Sub,
                src1: rsp(),
                src2: RegMemImm::imm(amt as i32),
                dst: writable_rsp(),
            });
        }
        // Save clobbered callee-saves above the spill area.
        let base = (frame.frame_size() - frame.clobber_size) as i64;
        for (i, reg) in frame.clobbered_callee_saves.iter().enumerate() {
            let off = base + (i as i64) * 8;
            let ty = match reg.class() {
                RegClass::Int => ir::types::I64,
                _ => ir::types::F64,
            };
            insts.push(Inst::gen_store(
                Reg::from_real(*reg),
                SyntheticAmode::SPOffset { off },
                ty,
            ));
        }
        // Park the stack-passed arguments in their reserved slots, where
        // the allocator expects to find them.
        for copy in &frame.stack_arg_copies {
            let tmp = if copy.ty.is_float() {
                Writable::from_reg(xmm(15))
            } else {
                Writable::from_reg(r11())
            };
            insts.push(Self::gen_load_stack_arg(tmp, copy.incoming_offset, copy.ty));
            insts.push(Self::gen_spill(copy.slot, tmp.to_reg(), copy.ty));
        }
        insts
    }

    fn machine_env(call_conv: CallConv) -> MachineEnv {
        let mut env = MachineEnv::default();
        // Caller-saved GPRs, allocated first. R11 is the move-cycle
        // scratch; RSP/RBP are never allocatable.
        for enc in [
            ENC_RAX, ENC_RCX, ENC_RDX, ENC_RSI, ENC_RDI, ENC_R8, ENC_R9, ENC_R10,
        ] {
            env.preferred_regs_by_class[RegClass::Int as usize].push(gpr_preg(enc));
        }
        for enc in [ENC_RBX, ENC_R12, ENC_R13, ENC_R14, ENC_R15] {
            env.non_preferred_regs_by_class[RegClass::Int as usize].push(gpr_preg(enc));
        }
        match call_conv {
            CallConv::WindowsFastcall => {
                // XMM6-XMM15 are callee-saved on Windows.
                for enc in 0..6 {
                    env.preferred_regs_by_class[RegClass::Float as usize]
                        .push(xmm_preg(enc));
                }
                for enc in 6..15 {
                    env.non_preferred_regs_by_class[RegClass::Float as usize]
                        .push(xmm_preg(enc));
                }
            }
            _ => {
                for enc in 0..15 {
                    env.preferred_regs_by_class[RegClass::Float as usize]
                        .push(xmm_preg(enc));
                }
            }
        }
        // XMM15 is the float move-cycle scratch.
        env.scratch_by_class[RegClass::Int as usize] = Some(gpr_preg(ENC_R11));
        env.scratch_by_class[RegClass::Float as usize] = Some(xmm_preg(15));
        env
    }

    fn caller_saved_regs(call_conv: CallConv) -> PRegSet {
        let mut set = PRegSet::empty();
        for enc in [
            ENC_RAX, ENC_RCX, ENC_RDX, ENC_RSI, ENC_RDI, ENC_R8, ENC_R9, ENC_R10, ENC_R11,
        ] {
            set.add(gpr_preg(enc));
        }
        match call_conv {
            CallConv::WindowsFastcall => {
                // RSI/RDI are callee-saved on Windows.
                set.remove(gpr_preg(ENC_RSI));
                set.remove(gpr_preg(ENC_RDI));
                for enc in 0..6 {
                    set.add(xmm_preg(enc));
                }
            }
            _ => {
                for enc in 0..16 {
                    set.add(xmm_preg(enc));
                }
            }
        }
        set
    }

    fn callee_saved_regs(call_conv: CallConv) -> PRegSet {
        let mut set = PRegSet::empty();
        for enc in [ENC_RBX, ENC_R12, ENC_R13, ENC_R14, ENC_R15] {
            set.add(gpr_preg(enc));
        }
        if call_conv == CallConv::WindowsFastcall {
            set.add(gpr_preg(ENC_RSI));
            set.add(gpr_preg(ENC_RDI));
            for enc in 6..16 {
                set.add(xmm_preg(enc));
            }
        }
        set
    }
}

/// The full-register type used for spills/reloads of a register of this
/// class.
fn canonical_spill_ty(reg: Reg, ty: Type) -> Type {
    match reg.class() {
        RegClass::Int => ir::types::I64,
        RegClass::Float => ir::types::F64,
        RegClass::Vector => ty,
    }
}
