//! This implements the VCode container: a CFG of virtual-register machine
//! instructions.
//!
//! VCode is the lowered IR. The virtual-register instructions here are
//! immediately before register allocation; the allocator rewrites them in
//! place, after which the container emits machine code.
//!
//! VCode is built *backwards*: the lowering walks blocks in reverse order,
//! and instructions within a block in reverse, so that a use is always seen
//! before (i.e. later in program order than) its def. The builder reverses
//! the instruction stream when it is finalized.

use crate::ir::{SourceLoc, Type};
use crate::machinst::{
    BlockIndex, BlockLoweringOrder, InsnIndex, MachBuffer, MachInst, MachInstEmit, MachLabel,
    Operand, OperandCollector, OperandRewriter, OperandVisitor, PRegSet, Reg, RegClass, VReg,
    Writable,
};
use crate::regalloc::{Edit, EditPos, Output as RegAllocOutput};
use smallvec::SmallVec;
use std::vec::Vec;

/// A grouping of the trait bounds needed by the pipeline's instruction
/// type.
pub trait VCodeInst: MachInst + MachInstEmit {}
impl<I: MachInst + MachInstEmit> VCodeInst for I {}

/// A function in "VCode" (virtualized-register code) form, after lowering.
/// This is essentially a standard CFG of basic blocks, where each basic
/// block consists of lowered instructions produced by the machine-specific
/// backend.
pub struct VCode<I: VCodeInst> {
    /// Lowered machine instructions in order corresponding to the final
    /// generated code.
    pub(crate) insts: Vec<I>,

    /// Source locations for each instruction (as inherited from the IR
    /// instruction that was lowered).
    srclocs: Vec<SourceLoc>,

    /// The flat operand vector for all instructions; each instruction owns
    /// the range recorded in `operand_ranges`.
    operands: Vec<Operand>,

    /// The range of `operands` for each instruction.
    operand_ranges: Vec<(u32, u32)>,

    /// Clobbered physical registers per instruction.
    clobbers: Vec<PRegSet>,

    /// Block instruction ranges: `insts[start .. end)` for each lowered
    /// block.
    block_ranges: Vec<(InsnIndex, InsnIndex)>,

    /// Block parameter vregs per lowered block.
    block_params: Vec<SmallVec<[VReg; 4]>>,

    /// For each lowered block and each of its successor edges, the vregs
    /// passed as block arguments on that edge. Indexed parallel to
    /// `block_order.succ_indices(block)`.
    branch_args: Vec<SmallVec<[SmallVec<[VReg; 4]>; 2]>>,

    /// The type of each vreg.
    vreg_types: Vec<Type>,

    /// The lowered block order.
    block_order: BlockLoweringOrder,
}

impl<I: VCodeInst> VCode<I> {
    /// Number of lowered blocks.
    pub fn num_blocks(&self) -> usize {
        self.block_ranges.len()
    }

    /// Number of instructions.
    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// Number of virtual registers allocated, including the pinned ones.
    pub fn num_vregs(&self) -> usize {
        self.vreg_types.len()
    }

    /// The entry block (always the first lowered block).
    pub fn entry(&self) -> BlockIndex {
        0
    }

    /// The instruction index range of a block.
    pub fn block_insns(&self, block: BlockIndex) -> core::ops::Range<usize> {
        let (start, end) = self.block_ranges[block as usize];
        start as usize..end as usize
    }

    /// Successor blocks of a lowered block.
    pub fn block_succs(&self, block: BlockIndex) -> &[BlockIndex] {
        self.block_order.succ_indices(block)
    }

    /// Block parameter vregs of a lowered block.
    pub fn block_params(&self, block: BlockIndex) -> &[VReg] {
        &self.block_params[block as usize]
    }

    /// The vregs passed to the `succ_pos`'th successor of `block`.
    pub fn branch_args(&self, block: BlockIndex, succ_pos: usize) -> &[VReg] {
        self.branch_args[block as usize]
            .get(succ_pos)
            .map(|v| &v[..])
            .unwrap_or(&[])
    }

    /// The operands of an instruction.
    pub fn inst_operands(&self, insn: InsnIndex) -> &[Operand] {
        let (start, end) = self.operand_ranges[insn as usize];
        &self.operands[start as usize..end as usize]
    }

    /// The index of an instruction's first operand in the flat operand
    /// vector.
    pub fn operand_range_start(&self, insn: InsnIndex) -> u32 {
        self.operand_ranges[insn as usize].0
    }

    /// The clobber set of an instruction.
    pub fn inst_clobbers(&self, insn: InsnIndex) -> PRegSet {
        self.clobbers[insn as usize]
    }

    /// The type of a vreg.
    pub fn vreg_type(&self, vreg: VReg) -> Type {
        self.vreg_types[vreg.index()]
    }

    /// The block order descriptor.
    pub fn block_order(&self) -> &BlockLoweringOrder {
        &self.block_order
    }

    /// Rewrite every instruction's register fields with the allocations
    /// chosen by the register allocator.
    pub fn apply_allocations(&mut self, regalloc: &RegAllocOutput) {
        for (i, inst) in self.insts.iter_mut().enumerate() {
            let (start, end) = self.operand_ranges[i];
            let allocs = &regalloc.allocs[start as usize..end as usize];
            let mut rewriter = OperandRewriter::new(allocs);
            inst.get_operands(&mut rewriter);
            rewriter.finish();
        }
    }

    /// Emit the instructions (already rewritten with allocations) into a
    /// `MachBuffer`, interleaving the allocator's inserted moves and
    /// binding one label per lowered block.
    pub fn emit(
        &self,
        regalloc: &RegAllocOutput,
        prologue: &[I],
        buffer: &mut MachBuffer<I>,
        emit_info: &I::Info,
        state: &mut I::State,
    ) {
        buffer.reserve_labels_for_blocks(self.num_blocks());

        let mut edit_idx = 0;
        let mut cur_srcloc: Option<SourceLoc> = None;

        for block in 0..self.num_blocks() as BlockIndex {
            buffer.bind_label(MachLabel::from_block(block));
            if block == self.entry() {
                for inst in prologue {
                    inst.emit(buffer, emit_info, state);
                }
            }

            for iix in self.block_insns(block) {
                // Moves inserted before this instruction.
                edit_idx =
                    self.emit_edits(regalloc, edit_idx, iix as InsnIndex, EditPos::Before, buffer, emit_info, state);

                // Island check: if the worst-case distance to a deadline
                // could be exceeded by this instruction, branch over an
                // island now.
                let worst = I::worst_case_size();
                if buffer.island_needed(worst) {
                    let skip = buffer.get_label();
                    I::gen_jump(skip).emit(buffer, emit_info, state);
                    buffer.emit_island(worst);
                    buffer.bind_label(skip);
                }

                let loc = self.srclocs[iix];
                if cur_srcloc != Some(loc) {
                    if cur_srcloc.is_some() {
                        buffer.end_srcloc();
                    }
                    if !loc.is_default() {
                        buffer.start_srcloc(loc);
                        cur_srcloc = Some(loc);
                    } else {
                        cur_srcloc = None;
                    }
                }

                let inst = &self.insts[iix];
                // Elide moves that allocation turned into nops; their
                // edits (if any) still apply.
                let elided = matches!(inst.is_move(), Some((to, from)) if to.to_reg() == from);
                if !elided {
                    inst.emit(buffer, emit_info, state);
                }

                // Moves inserted after this instruction.
                edit_idx =
                    self.emit_edits(regalloc, edit_idx, iix as InsnIndex, EditPos::After, buffer, emit_info, state);
            }
        }
        if cur_srcloc.is_some() {
            buffer.end_srcloc();
        }
    }

    fn emit_edits(
        &self,
        regalloc: &RegAllocOutput,
        mut edit_idx: usize,
        iix: InsnIndex,
        pos: EditPos,
        buffer: &mut MachBuffer<I>,
        emit_info: &I::Info,
        state: &mut I::State,
    ) -> usize {
        while edit_idx < regalloc.edits.len() {
            let (point, edit) = &regalloc.edits[edit_idx];
            if point.inst != iix || point.pos != pos {
                break;
            }
            let Edit::Move { from, to, class } = *edit;
            if from != to {
                let ty = type_for_class(class);
                for inst in gen_edit_insts::<I>(to, from, ty) {
                    inst.emit(buffer, emit_info, state);
                }
            }
            edit_idx += 1;
        }
        edit_idx
    }
}

/// The canonical full-width type moved for each register class.
fn type_for_class(class: RegClass) -> Type {
    match class {
        RegClass::Int => crate::ir::types::I64,
        RegClass::Float => crate::ir::types::F64,
        RegClass::Vector => crate::ir::types::F128,
    }
}

/// Generate the instruction(s) for one allocator edit: move, spill, or
/// reload, depending on whether the endpoints are registers or slots.
fn gen_edit_insts<I: VCodeInst>(to: Reg, from: Reg, ty: Type) -> SmallVec<[I; 2]> {
    use crate::machinst::abi::ABIMachineSpec;
    match (to.to_spillslot(), from.to_spillslot()) {
        (None, None) => smallvec::smallvec![I::gen_move(Writable::from_reg(to), from, ty)],
        (Some(slot), None) => smallvec::smallvec![I::ABIMachineSpec::gen_spill(slot, from, ty)],
        (None, Some(slot)) => {
            smallvec::smallvec![I::ABIMachineSpec::gen_reload(Writable::from_reg(to), slot, ty)]
        }
        (Some(_), Some(_)) => {
            // Slot-to-slot moves are resolved through a scratch register by
            // the allocator's move resolver; they must not reach here.
            panic!("stack-to-stack move requested");
        }
    }
}

/// Builder for a `VCode` instance.
///
/// Lowering hands instructions to this builder in *reverse* program order
/// within each block, and blocks in reverse lowered order; `finish`
/// reverses the stream and collects the operand tables.
pub struct VCodeBuilder<I: VCodeInst> {
    insts: Vec<I>,
    srclocs: Vec<SourceLoc>,
    /// Per-block (in reverse order) instruction counts; converted to
    /// ranges at finish.
    block_ends: Vec<usize>,
    block_params: Vec<SmallVec<[VReg; 4]>>,
    branch_args: Vec<SmallVec<[SmallVec<[VReg; 4]>; 2]>>,
    vreg_types: Vec<Type>,
    block_order: BlockLoweringOrder,
}

impl<I: VCodeInst> VCodeBuilder<I> {
    /// Create a new builder for a function with the given lowered block
    /// order.
    pub fn new(block_order: BlockLoweringOrder) -> Self {
        let nblocks = block_order.lowered_order().len();
        let mut vreg_types = Vec::new();
        vreg_types.resize(
            crate::machinst::reg::PINNED_VREGS,
            crate::ir::types::INVALID,
        );
        Self {
            insts: Vec::new(),
            srclocs: Vec::new(),
            block_ends: Vec::new(),
            block_params: vec![SmallVec::new(); nblocks],
            branch_args: vec![SmallVec::new(); nblocks],
            vreg_types,
            block_order,
        }
    }

    /// The block order being built against.
    pub fn block_order(&self) -> &BlockLoweringOrder {
        &self.block_order
    }

    /// Allocate a fresh virtual register of the given type.
    pub fn alloc_vreg(&mut self, ty: Type) -> VReg {
        let class = match I::rc_for_type(ty) {
            Ok(rc) => rc,
            Err(_) => RegClass::Int,
        };
        let index = self.vreg_types.len();
        self.vreg_types.push(ty);
        VReg::new(index, class)
    }

    /// Push an instruction; lowering pushes in reverse program order.
    pub fn push(&mut self, inst: I, loc: SourceLoc) {
        self.insts.push(inst);
        self.srclocs.push(loc);
    }

    /// Mark the end (in reverse building, the *start*) of the current
    /// block's instructions. Called once per lowered block, in reverse
    /// block order.
    pub fn end_block(&mut self) {
        self.block_ends.push(self.insts.len());
    }

    /// Set the parameter vregs of a lowered block.
    pub fn set_block_params(&mut self, block: BlockIndex, params: SmallVec<[VReg; 4]>) {
        self.block_params[block as usize] = params;
    }

    /// Set the branch argument vregs for each successor edge of a lowered
    /// block.
    pub fn set_branch_args(
        &mut self,
        block: BlockIndex,
        args: SmallVec<[SmallVec<[VReg; 4]>; 2]>,
    ) {
        self.branch_args[block as usize] = args;
    }

    /// Finish building: reverse the instruction stream into program order
    /// and collect operand tables.
    pub fn finish(mut self) -> VCode<I> {
        let nblocks = self.block_order.lowered_order().len();
        assert_eq!(
            self.block_ends.len(),
            nblocks,
            "end_block() must be called once per lowered block"
        );

        self.insts.reverse();
        self.srclocs.reverse();
        let n = self.insts.len();

        // `block_ends[i]` was the reversed-stream length after pushing
        // block (nblocks-1-i); convert to forward ranges.
        let mut block_ranges: Vec<(InsnIndex, InsnIndex)> = vec![(0, 0); nblocks];
        let mut prev_end = 0usize;
        for (i, &rev_end) in self.block_ends.iter().enumerate() {
            let block = nblocks - 1 - i;
            // Reversed-stream [prev_end, rev_end) maps to forward
            // [n - rev_end, n - prev_end).
            block_ranges[block] = ((n - rev_end) as InsnIndex, (n - prev_end) as InsnIndex);
            prev_end = rev_end;
        }

        // Collect operands in forward order.
        let mut operands = Vec::new();
        let mut operand_ranges = Vec::with_capacity(n);
        let mut clobbers = Vec::with_capacity(n);
        for inst in self.insts.iter_mut() {
            let start = operands.len() as u32;
            let mut collector = OperandCollector::new(&mut operands);
            inst.get_operands(&mut collector);
            let inst_clobbers = collector.finish();
            operand_ranges.push((start, operands.len() as u32));
            clobbers.push(inst_clobbers);
        }

        VCode {
            insts: self.insts,
            srclocs: self.srclocs,
            operands,
            operand_ranges,
            clobbers,
            block_ranges,
            block_params: self.block_params,
            branch_args: self.branch_args,
            vreg_types: self.vreg_types,
            block_order: self.block_order,
        }
    }
}
