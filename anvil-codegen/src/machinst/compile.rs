//! Compilation backend pipeline: lowered code (VCode) to machine code.

use crate::ir::Function;
use crate::machinst::abi::{ABIMachineSpec, Callee, FrameLayout};
use crate::machinst::lower::{lower_function, AbiOf, LowerBackend};
use crate::machinst::{
    MachBuffer, MachBufferFinalized, MachInstEmit, MachInstEmitState, OperandKind,
};
use crate::regalloc::{self, Edit, MachineEnv};
use crate::result::CodegenResult;
use crate::settings;
use crate::machinst::{InsnIndex, PReg};
use std::vec::Vec;

/// The result of compiling one function: the finalized code buffer and
/// the frame-layout record the embedder needs for unwind and diagnostics.
#[derive(Clone, Debug)]
pub struct CompiledCode {
    /// Encoded machine code plus relocations, traps, call sites and source
    /// locations.
    pub buffer: MachBufferFinalized,
    /// The final frame layout: frame size, spill area, clobbered
    /// callee-saves, argument areas.
    pub frame: FrameLayout,
}

/// Compile the given function with the given backend: lower, allocate
/// registers, and emit.
pub fn compile_function<B: LowerBackend>(
    f: &Function,
    backend: &B,
    flags: &settings::Flags,
    emit_info: &<B::MInst as MachInstEmit>::Info,
    env: &MachineEnv,
) -> CodegenResult<CompiledCode> {
    // Total explicit stack-slot storage (slot offsets are assigned in
    // declaration order).
    let stackslots_size: u32 = f
        .stack_slots
        .values()
        .map(|slot| crate::machinst::abi::align_to(slot.size, 8))
        .sum();

    let callee = Callee::<AbiOf<B::MInst>>::new(&f.signature, flags, stackslots_size)?;
    let (mut vcode, callee) = lower_function(f, backend, callee, flags)?;
    log::trace!(
        "compile: lowered {} blocks, {} insts",
        vcode.num_blocks(),
        vcode.num_insts()
    );

    let regalloc = regalloc::run(&vcode, env)?;

    // The clobbered registers are those actually written by the final
    // code: def operands and edit destinations.
    let mut clobbered: Vec<PReg> = Vec::new();
    let mut note = |preg: PReg| {
        if !clobbered.contains(&preg) {
            clobbered.push(preg);
        }
    };
    let mut alloc_idx = 0;
    for iix in 0..vcode.num_insts() as InsnIndex {
        for op in vcode.inst_operands(iix) {
            let alloc = regalloc.allocs[alloc_idx];
            alloc_idx += 1;
            if op.kind == OperandKind::Def {
                if let Some(preg) = alloc.to_real() {
                    note(preg);
                }
            }
        }
    }
    for (_, edit) in &regalloc.edits {
        let Edit::Move { to, .. } = edit;
        if let Some(preg) = to.to_real() {
            note(preg);
        }
    }

    let frame = callee.compute_frame_layout(&clobbered, regalloc.num_spillslots);
    log::trace!("compile: frame layout {frame:?}");

    vcode.apply_allocations(&regalloc);

    let prologue = AbiOf::<B::MInst>::gen_prologue(callee.call_conv(), &frame);
    let mut buffer = MachBuffer::new();
    let mut state = <B::MInst as MachInstEmit>::State::new(frame.clone());
    vcode.emit(&regalloc, &prologue, &mut buffer, emit_info, &mut state);

    Ok(CompiledCode {
        buffer: buffer.finish(),
        frame,
    })
}

/// Convenience: compile with the backend's default machine environment.
pub fn compile_function_with_env<B: LowerBackend>(
    f: &Function,
    backend: &B,
    flags: &settings::Flags,
    emit_info: &<B::MInst as MachInstEmit>::Info,
) -> CodegenResult<CompiledCode>
where
    B: HasMachineEnv,
{
    let env = backend.machine_env(f);
    compile_function(f, backend, flags, emit_info, &env)
}

/// Backends that can provide a machine environment for a function (the
/// environment depends on the calling convention's callee-saved set).
pub trait HasMachineEnv: LowerBackend {
    /// The machine environment to use for `f`.
    fn machine_env(&self, f: &Function) -> MachineEnv;
}
