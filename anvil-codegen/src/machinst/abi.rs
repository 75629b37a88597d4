//! ABI definitions: argument/return-value passing, frame layout, prologue
//! and epilogue, clobber saves.
//!
//! Each ISA provides an [`ABIMachineSpec`] implementation describing its
//! calling conventions in tables (argument registers, alignment, shadow
//! space, callee-saved sets). The shared [`Callee`] type drives the
//! callee-side work: receiving arguments in the entry block, returning
//! values, and computing the final [`FrameLayout`] once register
//! allocation has determined the clobbers and spill count.
//!
//! The frame grows downward:
//!
//! ```plain
//!   (high address)
//!             | incoming stack args        |
//!     FP+16 ->| ...                        |
//!             | return address / saved FP  | <- setup area
//!       FP -> +----------------------------+
//!             | clobbered callee-saves     |
//!             | explicit stack slots       |
//!             | spill slots                |
//!             | outgoing call args         |
//!       SP -> +----------------------------+
//!   (low address)
//! ```

use crate::ir::{ArgumentExtension, ArgumentPurpose, ExternalName, Signature, Type};
use crate::isa::CallConv;
use crate::machinst::{PReg, PRegSet, Reg, SpillSlot, VCodeInst, Writable};
use crate::result::CodegenResult;
use crate::settings;
use crate::regalloc::MachineEnv;
use smallvec::SmallVec;
use std::vec::Vec;

/// Are we computing argument locations or return-value locations?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgsOrRets {
    /// Arguments.
    Args,
    /// Return values.
    Rets,
}

/// A location for one ABI argument or return value.
#[derive(Clone, Copy, Debug)]
pub enum ABIArg {
    /// In a physical register.
    Reg {
        /// The register.
        reg: PReg,
        /// The value type.
        ty: Type,
        /// Required extension to full register width.
        extension: ArgumentExtension,
        /// The declared purpose of the argument.
        purpose: ArgumentPurpose,
    },
    /// At an offset in the argument area.
    Stack {
        /// Offset from the start of the argument area.
        offset: i64,
        /// The value type.
        ty: Type,
        /// Required extension to full register width.
        extension: ArgumentExtension,
        /// The declared purpose of the argument.
        purpose: ArgumentPurpose,
    },
}

/// One (vreg, preg) pairing for the entry block's argument pseudo
/// instruction.
#[derive(Clone, Copy, Debug)]
pub struct ArgPair {
    /// The vreg the argument is defined into.
    pub vreg: Writable<Reg>,
    /// The fixed physical register it arrives in.
    pub preg: PReg,
}

/// One (vreg, slot) pairing for a stack-passed argument on the entry
/// block's argument pseudo instruction.
///
/// The vreg is defined under a fixed-stack constraint: the value's home
/// is a reserved frame slot that the prologue fills from the incoming
/// argument area, and the allocator reloads from there on demand.
#[derive(Clone, Copy, Debug)]
pub struct StackArgPair {
    /// The vreg the argument is defined into.
    pub vreg: Writable<Reg>,
    /// The reserved slot holding it.
    pub slot: SpillSlot,
}

/// A prologue copy from the incoming argument area into a reserved frame
/// slot, backing one [`StackArgPair`].
#[derive(Clone, Copy, Debug)]
pub struct StackArgCopy {
    /// Offset of the argument within the incoming argument area.
    pub incoming_offset: i64,
    /// The reserved slot it is parked in.
    pub slot: SpillSlot,
    /// The argument's type.
    pub ty: Type,
}

/// One (vreg, preg) pairing for the return pseudo instruction.
#[derive(Clone, Copy, Debug)]
pub struct RetPair {
    /// The vreg holding the value to return.
    pub vreg: Reg,
    /// The fixed physical register it must be placed in.
    pub preg: PReg,
}

/// The destination of a call.
#[derive(Clone, Debug)]
pub enum CallDest {
    /// A direct call to an external name, via relocation.
    ExtName(ExternalName),
    /// An indirect call through a register.
    Reg(Reg),
}

/// Information the emission stage needs about the function's frame, fixed
/// after register allocation.
#[derive(Clone, Debug, Default)]
pub struct FrameLayout {
    /// Size of incoming arguments on the stack.
    pub incoming_args_size: u32,
    /// The size of the frame-setup area: saved FP and return address, when
    /// the ABI saves them.
    pub setup_area_size: u32,
    /// Size of the area used to save callee-saved (clobbered) registers.
    pub clobber_size: u32,
    /// Storage for the function's explicit stack slots.
    pub fixed_frame_storage_size: u32,
    /// Storage for the register allocator's spill slots.
    pub spillslots_size: u32,
    /// Size of the outgoing-argument area for calls made by this function.
    pub outgoing_args_size: u32,
    /// The callee-saved registers actually clobbered, in save order.
    pub clobbered_callee_saves: Vec<PReg>,
    /// Prologue copies of stack-passed arguments into their reserved
    /// frame slots.
    pub stack_arg_copies: Vec<StackArgCopy>,
}

impl FrameLayout {
    /// The frame size allocated (and deallocated) below the setup area.
    pub fn frame_size(&self) -> u32 {
        self.clobber_size
            + self.fixed_frame_storage_size
            + self.spillslots_size
            + self.outgoing_args_size
    }

    /// Offset from SP to the start of the spill-slot area.
    pub fn spillslot_area_offset(&self) -> u32 {
        self.outgoing_args_size
    }

    /// Offset from SP of a given spill slot (slots are 8-byte units).
    pub fn spillslot_offset(&self, slot: SpillSlot) -> i64 {
        self.spillslot_area_offset() as i64 + slot.index() as i64 * 8
    }

    /// Offset from SP to the start of the explicit stack-slot storage.
    pub fn stackslot_area_offset(&self) -> u32 {
        self.outgoing_args_size + self.spillslots_size
    }

    /// Offset from SP to the first incoming stack argument.
    pub fn incoming_args_offset(&self) -> i64 {
        self.frame_size() as i64 + self.setup_area_size as i64
    }
}

/// Trait implemented by machine-specific backend to provide information
/// about register assignments and to generate the specific instructions
/// the ABI layer needs.
pub trait ABIMachineSpec {
    /// The instruction type.
    type I: VCodeInst;

    /// Returns the number of bits in a word.
    fn word_bits() -> u32;

    /// Returns the required stack alignment in bytes.
    fn stack_align(call_conv: CallConv) -> u32;

    /// Is the given calling convention supported by this backend?
    fn is_call_conv_supported(call_conv: CallConv) -> bool;

    /// Process a list of parameters or return values and allocate them to
    /// registers and stack slots.
    ///
    /// Returns the argument locations and the total stack space used by
    /// stack-passed values.
    fn compute_arg_locs(
        call_conv: CallConv,
        params: &[crate::ir::AbiParam],
        args_or_rets: ArgsOrRets,
    ) -> CodegenResult<(Vec<ABIArg>, u32)>;

    /// Generate the entry-block pseudo instruction that defines every
    /// register argument into a vreg under a fixed-register constraint,
    /// and every stack argument under a fixed-stack constraint on its
    /// reserved frame slot.
    fn gen_args(args: Vec<ArgPair>, stack_args: Vec<StackArgPair>) -> Self::I;

    /// Generate the return pseudo instruction, which carries the return
    /// values as fixed-register uses and expands to the epilogue and `ret`
    /// at emission time.
    fn gen_rets(rets: Vec<RetPair>) -> Self::I;

    /// Generate a load of an incoming stack argument (offset is relative
    /// to the first stack argument).
    fn gen_load_stack_arg(into: Writable<Reg>, offset: i64, ty: Type) -> Self::I;

    /// Generate a store to the outgoing argument area (offset is relative
    /// to SP at the call site).
    fn gen_store_stack_arg(from: Reg, offset: i64, ty: Type) -> Self::I;

    /// Generate a spill of a register to a spill slot.
    fn gen_spill(to_slot: SpillSlot, from_reg: Reg, ty: Type) -> Self::I;

    /// Generate a reload from a spill slot.
    fn gen_reload(to_reg: Writable<Reg>, from_slot: SpillSlot, ty: Type) -> Self::I;

    /// Generate the call instruction(s).
    fn gen_call(
        dest: CallDest,
        uses: SmallVec<[RetPair; 8]>,
        defs: SmallVec<[ArgPair; 2]>,
        clobbers: PRegSet,
    ) -> SmallVec<[Self::I; 2]>;

    /// Generate the prologue for the given (final) frame layout.
    fn gen_prologue(call_conv: CallConv, frame: &FrameLayout) -> SmallVec<[Self::I; 16]>;

    /// The register environment (allocatable registers in preference
    /// order, scratch registers) for the given calling convention.
    fn machine_env(call_conv: CallConv) -> MachineEnv;

    /// The registers clobbered by a call with the given callee convention.
    fn caller_saved_regs(call_conv: CallConv) -> PRegSet;

    /// The callee-saved registers of the given calling convention.
    fn callee_saved_regs(call_conv: CallConv) -> PRegSet;
}

/// The callee-side ABI state for the function being compiled: its argument
/// and return locations and, after register allocation, its frame layout.
pub struct Callee<M: ABIMachineSpec> {
    /// Argument locations.
    arg_locs: Vec<ABIArg>,
    /// Return-value locations.
    ret_locs: Vec<ABIArg>,
    /// Bytes of incoming arguments on the stack.
    incoming_args_size: u32,
    /// The calling convention of the function.
    call_conv: CallConv,
    /// Total bytes of explicit stack slots.
    stackslots_size: u32,
    /// The maximum outgoing-argument-area size over all calls lowered so
    /// far.
    outgoing_args_size: u32,
    /// Shared compilation flags.
    _flags: settings::Flags,
    _marker: core::marker::PhantomData<M>,
}

impl<M: ABIMachineSpec> Callee<M> {
    /// Create the ABI state for a function signature.
    pub fn new(sig: &Signature, flags: &settings::Flags, stackslots_size: u32) -> CodegenResult<Self> {
        if !M::is_call_conv_supported(sig.call_conv) {
            return Err(crate::CodegenError::Unsupported(format!(
                "calling convention {} on this target",
                sig.call_conv
            )));
        }
        let (arg_locs, incoming_args_size) =
            M::compute_arg_locs(sig.call_conv, &sig.params, ArgsOrRets::Args)?;
        let (ret_locs, ret_stack) =
            M::compute_arg_locs(sig.call_conv, &sig.returns, ArgsOrRets::Rets)?;
        if ret_stack != 0 {
            return Err(crate::CodegenError::Unsupported(
                "stack-passed return values".into(),
            ));
        }
        Ok(Self {
            arg_locs,
            ret_locs,
            incoming_args_size,
            call_conv: sig.call_conv,
            stackslots_size,
            outgoing_args_size: 0,
            _flags: flags.clone(),
            _marker: core::marker::PhantomData,
        })
    }

    /// The calling convention.
    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }

    /// The argument locations.
    pub fn arg_locs(&self) -> &[ABIArg] {
        &self.arg_locs
    }

    /// The return-value locations.
    pub fn ret_locs(&self) -> &[ABIArg] {
        &self.ret_locs
    }

    /// Record that a call needs `size` bytes of outgoing argument space.
    pub fn accumulate_outgoing_args_size(&mut self, size: u32) {
        self.outgoing_args_size = self.outgoing_args_size.max(size);
    }

    /// The reserved frame slot for each stack-passed argument, in
    /// argument order, with the incoming-area offset it is filled from.
    ///
    /// Lowering and the frame layout both derive this mapping from the
    /// argument locations, so the pseudo instruction's fixed-stack
    /// constraints and the prologue's copies always agree. Slots are
    /// handed out densely from zero; the allocator reserves them before
    /// placing any of its own spills.
    pub fn stack_arg_slots(&self) -> Vec<StackArgCopy> {
        let mut copies = Vec::new();
        let mut next_slot = 0;
        for loc in &self.arg_locs {
            if let ABIArg::Stack { offset, ty, .. } = *loc {
                debug_assert!(ty.bits() <= 64, "wide stack args not supported");
                copies.push(StackArgCopy {
                    incoming_offset: offset,
                    slot: SpillSlot::new(next_slot),
                    ty,
                });
                next_slot += 1;
            }
        }
        copies
    }

    /// Compute the final frame layout, given the set of callee-saved
    /// registers the allocated code actually writes and the number of
    /// spill slots (8-byte units) the allocator used.
    pub fn compute_frame_layout(
        &self,
        clobbered: &[PReg],
        num_spillslots: usize,
    ) -> FrameLayout {
        let mut clobbered_callee_saves: Vec<PReg> = clobbered
            .iter()
            .copied()
            .filter(|r| M::callee_saved_regs(self.call_conv).contains(*r))
            .collect();
        clobbered_callee_saves.sort_by_key(|r| r.index());

        // Each clobbered register gets a full 16-byte-aligned-total area;
        // individual saves are word-sized (vector callee-saves save their
        // low 64 bits only, per the AAPCS rule both of our ABIs follow).
        let clobber_size = align_to(clobbered_callee_saves.len() as u32 * 8, 16);
        let spillslots_size = align_to(num_spillslots as u32 * 8, 16);
        let fixed_frame_storage_size = align_to(self.stackslots_size, 16);
        let outgoing_args_size = align_to(self.outgoing_args_size, 16);

        FrameLayout {
            incoming_args_size: self.incoming_args_size,
            setup_area_size: 16,
            clobber_size,
            fixed_frame_storage_size,
            spillslots_size,
            outgoing_args_size,
            clobbered_callee_saves,
            stack_arg_copies: self.stack_arg_slots(),
        }
    }
}

/// Align `x` up to `alignment`, which must be a power of two.
pub fn align_to(x: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (x + alignment - 1) & !(alignment - 1)
}
