//! Implementation of a standard AArch64 ABI.
//!
//! This follows AAPCS64: arguments in X0-X7 / V0-V7, return values in
//! X0/X1 / V0/V1, callee-saved X19-X28 and the low halves of V8-V15,
//! 16-byte stack alignment, FP/LR pair saved by the prologue. The Apple
//! variant differs only in how stack arguments are packed: natural
//! alignment instead of 8-byte slots.

use crate::ir::{self, AbiParam, ArgumentPurpose, Type};
use crate::isa::aarch64::inst::*;
use crate::isa::CallConv;
use crate::machinst::abi::{
    ABIArg, ABIMachineSpec, ArgPair, ArgsOrRets, CallDest, FrameLayout, RetPair, StackArgPair,
};
use crate::machinst::{PReg, PRegSet, Reg, RegClass, SpillSlot, Writable};
use crate::regalloc::MachineEnv;
use crate::result::{CodegenError, CodegenResult};
use crate::settings;
use smallvec::{smallvec, SmallVec};
use std::vec::Vec;

/// This is the limit for the size of argument and return-value areas on
/// the stack. We place a reasonable limit here to avoid integer overflow
/// issues with 32-bit arithmetic: for now, 128 MB.
static STACK_ARG_RET_SIZE_LIMIT: u32 = 128 * 1024 * 1024;

/// AArch64-specific ABI behavior. This struct just serves as an
/// implementation point for the trait; it is never actually instantiated.
pub struct AArch64MachineDeps;

impl AArch64MachineDeps {
    /// Adjust SP by `amount` (positive: deallocate, negative: allocate),
    /// as a sequence of add/sub with 12-bit (possibly shifted)
    /// immediates.
    pub fn gen_sp_adjust_seq(amount: i64) -> SmallVec<[Inst; 2]> {
        let mut insts = SmallVec::new();
        if amount == 0 {
            return insts;
        }
        let alu_op = if amount > 0 { ALUOp::Add } else { ALUOp::Sub };
        let abs = amount.unsigned_abs();
        assert!(abs < (1 << 24), "frame too large");
        for part in [abs & 0xfff, abs & 0xfff_000] {
            if part != 0 {
                insts.push(Inst::AluRRImm12 {
                    alu_op,
                    size: OperandSize::Size64,
                    rd: writable_stack_reg(),
                    rn: stack_reg(),
                    imm12: Imm12::maybe_from_u64(part).unwrap(),
                });
            }
        }
        insts
    }
}

impl ABIMachineSpec for AArch64MachineDeps {
    type I = Inst;

    fn word_bits() -> u32 {
        64
    }

    /// Return required stack alignment in bytes.
    fn stack_align(_call_conv: CallConv) -> u32 {
        16
    }

    fn is_call_conv_supported(call_conv: CallConv) -> bool {
        match call_conv {
            CallConv::SystemV | CallConv::AppleAarch64 => true,
            // Windows on ARM64 is not implemented; selecting it must be a
            // configuration error, not a silent fallback.
            CallConv::WindowsFastcall => false,
        }
    }

    fn compute_arg_locs(
        call_conv: CallConv,
        params: &[AbiParam],
        args_or_rets: ArgsOrRets,
    ) -> CodegenResult<(Vec<ABIArg>, u32)> {
        let is_apple = call_conv == CallConv::AppleAarch64;
        let (max_x, max_v) = match args_or_rets {
            ArgsOrRets::Args => (8u8, 8u8),
            ArgsOrRets::Rets => (2u8, 2u8),
        };

        let mut next_xreg = 0u8;
        let mut next_vreg = 0u8;
        let mut next_stack = 0u32;
        let mut locs = Vec::with_capacity(params.len());

        for param in params {
            let ty = param.value_type;
            if let ArgumentPurpose::StructArgument(_) = param.purpose {
                return Err(CodegenError::Unsupported(
                    "struct arguments on aarch64".into(),
                ));
            }
            let (next_reg, max_reg, class) = if ty.is_float() {
                (&mut next_vreg, max_v, RegClass::Float)
            } else {
                (&mut next_xreg, max_x, RegClass::Int)
            };
            if *next_reg < max_reg {
                let reg = PReg::new(*next_reg as usize, class);
                *next_reg += 1;
                locs.push(ABIArg::Reg {
                    reg,
                    ty,
                    extension: param.extension,
                    purpose: param.purpose,
                });
            } else {
                // Stack slot: AAPCS rounds each argument up to 8 bytes;
                // the Apple variant packs by natural size and alignment.
                let size = if is_apple { ty.bytes() } else { ty.bytes().max(8) };
                let align = size;
                next_stack = crate::machinst::abi::align_to(next_stack, align);
                locs.push(ABIArg::Stack {
                    offset: next_stack as i64,
                    ty,
                    extension: param.extension,
                    purpose: param.purpose,
                });
                next_stack += size;
            }
        }

        let next_stack = crate::machinst::abi::align_to(next_stack, 16);
        if next_stack > STACK_ARG_RET_SIZE_LIMIT {
            return Err(CodegenError::Overflow);
        }
        Ok((locs, next_stack))
    }

    fn gen_args(args: Vec<ArgPair>, stack_args: Vec<StackArgPair>) -> Inst {
        Inst::Args { args, stack_args }
    }

    fn gen_rets(rets: Vec<RetPair>) -> Inst {
        Inst::Rets { rets }
    }

    fn gen_load_stack_arg(into: Writable<Reg>, offset: i64, ty: Type) -> Inst {
        Inst::gen_load(into, AMode::IncomingArg { off: offset }, ty)
    }

    fn gen_store_stack_arg(from: Reg, offset: i64, ty: Type) -> Inst {
        Inst::gen_store(from, AMode::SPOffset { off: offset }, ty)
    }

    fn gen_spill(to_slot: SpillSlot, from_reg: Reg, ty: Type) -> Inst {
        let ty = canonical_spill_ty(from_reg, ty);
        Inst::gen_store(from_reg, AMode::SpillOffset { slot: to_slot }, ty)
    }

    fn gen_reload(to_reg: Writable<Reg>, from_slot: SpillSlot, ty: Type) -> Inst {
        let ty = canonical_spill_ty(to_reg.to_reg(), ty);
        Inst::gen_load(to_reg, AMode::SpillOffset { slot: from_slot }, ty)
    }

    fn gen_call(
        dest: CallDest,
        uses: SmallVec<[RetPair; 8]>,
        defs: SmallVec<[ArgPair; 2]>,
        clobbers: PRegSet,
    ) -> SmallVec<[Inst; 2]> {
        match dest {
            CallDest::ExtName(name) => smallvec![Inst::Call {
                info: Box::new(CallInfo {
                    dest: name,
                    uses,
                    defs,
                    clobbers,
                }),
            }],
            CallDest::Reg(rn) => smallvec![Inst::CallInd {
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
        // stp fp, lr, [sp, #-16]!
        insts.push(Inst::StoreP64 {
            rt: fp_reg(),
            rt2: link_reg(),
            mem: PairAMode::PreIndexed(
                stack_reg(),
                SImm7Scaled::maybe_from_i64(-16, ir::types::I64).unwrap(),
            ),
        });
        // mov fp, sp (add fp, sp, #0: the form that reads SP).
        insts.push(Inst::AluRRImm12 {
            alu_op: ALUOp::Add,
            size: OperandSize::Size64,
            rd: writable_fp_reg(),
            rn: stack_reg(),
            imm12: Imm12::zero(),
        });
        // sub sp, sp, #frame_size
        insts.extend(Self::gen_sp_adjust_seq(-(frame.frame_size() as i64)));
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
                AMode::SPOffset { off },
                ty,
            ));
        }
        // Park the stack-passed arguments in their reserved slots, where
        // the allocator expects to find them.
        for copy in &frame.stack_arg_copies {
            let tmp = if copy.ty.is_float() {
                Writable::from_reg(fp_scratch_reg())
            } else {
                writable_spilltmp_reg()
            };
            insts.push(Self::gen_load_stack_arg(tmp, copy.incoming_offset, copy.ty));
            insts.push(Self::gen_spill(copy.slot, tmp.to_reg(), copy.ty));
        }
        insts
    }

    fn machine_env(_call_conv: CallConv) -> MachineEnv {
        let mut env = MachineEnv::default();
        // x0-x15: caller-saved, preferred. x16/x17 are the address and
        // move-cycle scratch registers, x18 is platform-reserved, x29/x30
        // are FP/LR, x31 is SP.
        for i in 0..16 {
            env.preferred_regs_by_class[RegClass::Int as usize].push(xreg_preg(i));
        }
        // x19-x28: callee-saved.
        for i in 19..29 {
            env.non_preferred_regs_by_class[RegClass::Int as usize].push(xreg_preg(i));
        }
        // v0-v7 and v16-v30: caller-saved; v31 is the FP scratch.
        for i in 0..8 {
            env.preferred_regs_by_class[RegClass::Float as usize].push(vreg_preg(i));
        }
        for i in 16..31 {
            env.preferred_regs_by_class[RegClass::Float as usize].push(vreg_preg(i));
        }
        // v8-v15: callee-saved (low 64 bits).
        for i in 8..16 {
            env.non_preferred_regs_by_class[RegClass::Float as usize].push(vreg_preg(i));
        }
        env.scratch_by_class[RegClass::Int as usize] = Some(xreg_preg(17));
        env.scratch_by_class[RegClass::Float as usize] = Some(vreg_preg(31));
        env
    }

    fn caller_saved_regs(_call_conv: CallConv) -> PRegSet {
        let mut set = PRegSet::empty();
        for i in 0..18 {
            set.add(xreg_preg(i));
        }
        for i in 0..8 {
            set.add(vreg_preg(i));
        }
        for i in 16..32 {
            set.add(vreg_preg(i));
        }
        set
    }

    fn callee_saved_regs(_call_conv: CallConv) -> PRegSet {
        let mut set = PRegSet::empty();
        for i in 19..29 {
            set.add(xreg_preg(i));
        }
        for i in 8..16 {
            set.add(vreg_preg(i));
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
