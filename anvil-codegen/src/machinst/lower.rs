//! This module implements lowering (instruction selection) from IR to
//! machine instructions with virtual registers.
//!
//! Lowering is a two-phase walk over each block:
//!
//! 1. A forward pass classifies every value's use count (unused, once, or
//!    many) and assigns every instruction a *side-effect color*: each
//!    side-effecting instruction starts a new color. A producer may be
//!    *sunk* into its single consumer (merged into one machine
//!    instruction) only if it is pure, or if it is a load with the same
//!    color as the consumer, which proves no store or other side effect
//!    falls in between.
//! 2. A backward pass over the instructions emits machine code: walking
//!    uses before defs lets the "is this result used at all" question be
//!    answered exactly at the moment a producer is visited. Instructions
//!    are pushed in reverse and the whole stream is reversed when the
//!    VCode is finalized.

use crate::ir::{self, Function, InstructionData, Opcode, SourceLoc, Type, Value};
use crate::machinst::abi::{
    ABIArg, ABIMachineSpec, ArgPair, Callee, CallDest, RetPair, StackArgPair,
};
use crate::machinst::{
    BlockIndex, BlockLoweringOrder, LoweredBlock, MachInst, MachLabel, Reg, VCode, VCodeBuilder,
    VCodeInst, VReg, Writable,
};
use crate::result::CodegenResult;
use crate::settings;
use anvil_entity::SecondaryMap;
use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;
use std::vec::Vec;

/// The ABI spec of a lowering's instruction type.
pub type AbiOf<I> = <I as MachInst>::ABIMachineSpec;

/// An "instruction color" partitioning a block by side effects: every
/// side-effecting instruction starts a new color, and only a load with the
/// same color as its single consumer may be sunk into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct InstColor(u32);

/// A machine backend, implementing lowering of IR instructions to machine
/// instructions for one ISA.
pub trait LowerBackend {
    /// The machine instruction type.
    type MInst: VCodeInst;

    /// Lower a single non-branch instruction.
    fn lower(&self, ctx: &mut Lower<Self::MInst>, inst: ir::Inst) -> CodegenResult<()>;

    /// Lower a branch instruction, given the lowered-block labels of its
    /// successors (in the same order as the IR branch destinations).
    fn lower_branch(
        &self,
        ctx: &mut Lower<Self::MInst>,
        inst: ir::Inst,
        targets: &[MachLabel],
    ) -> CodegenResult<()>;
}

/// Lowering context passed to the backend. Carries per-function state and
/// provides the value/register mapping, sinking queries, ABI helpers and
/// the emission sink.
pub struct Lower<'f, I: VCodeInst> {
    /// The function being lowered.
    pub f: &'f Function,
    vcode: VCodeBuilder<I>,
    callee: Callee<AbiOf<I>>,
    /// The vreg holding each IR value.
    value_regs: HashMap<Value, Reg>,
    /// Remaining use count per value; decremented when a use is absorbed
    /// as an immediate or by sinking.
    value_uses: HashMap<Value, u32>,
    /// The side-effect color of each instruction.
    inst_colors: SecondaryMap<ir::Inst, InstColor>,
    /// Producers that have been sunk into their consumers.
    sunk: HashSet<ir::Inst>,
    /// Instructions emitted for the IR instruction currently being
    /// lowered, in forward order; flushed (reversed) into the VCode after
    /// each IR instruction.
    ir_insts: Vec<I>,
    cur_srcloc: SourceLoc,
    sinking_enabled: bool,
    /// Accumulated outgoing-argument size over all lowered calls.
    outgoing_args_size: u32,
}

impl<'f, I: VCodeInst> Lower<'f, I> {
    fn new(
        f: &'f Function,
        callee: Callee<AbiOf<I>>,
        flags: &settings::Flags,
        block_order: BlockLoweringOrder,
    ) -> Self {
        let mut lower = Self {
            f,
            vcode: VCodeBuilder::new(block_order),
            callee,
            value_regs: HashMap::new(),
            value_uses: HashMap::new(),
            inst_colors: SecondaryMap::new(),
            sunk: HashSet::new(),
            ir_insts: Vec::new(),
            cur_srcloc: Default::default(),
            sinking_enabled: flags.enable_sinking(),
            outgoing_args_size: 0,
        };
        lower.compute_use_counts_and_colors();
        lower
    }

    fn compute_use_counts_and_colors(&mut self) {
        let f = self.f;
        let mut color = 0u32;
        for block in f.layout.blocks() {
            for inst in f.layout.block_insts(block) {
                if inst.opcode_of(f).has_side_effects() {
                    color += 1;
                }
                self.inst_colors[inst] = InstColor(color);

                for &arg in f.dfg.inst_args(inst) {
                    self.bump_use(arg);
                }
                for call in f.dfg.inst_data(inst).branch_destination() {
                    for &arg in call.args_slice(&f.dfg.value_lists) {
                        self.bump_use(arg);
                    }
                }
                if let InstructionData::BranchTable { table, .. } = f.dfg.inst_data(inst) {
                    for call in f.dfg.jump_tables[*table].all_branches() {
                        for &arg in call.args_slice(&f.dfg.value_lists) {
                            self.bump_use(arg);
                        }
                    }
                }
            }
        }
    }

    fn bump_use(&mut self, value: Value) {
        let value = self.f.dfg.resolve_aliases(value);
        *self.value_uses.entry(value).or_insert(0) += 1;
    }

    // ---- Queries for the backend. -------------------------------------

    /// The instruction data of an IR instruction.
    pub fn data(&self, inst: ir::Inst) -> &InstructionData {
        self.f.dfg.inst_data(inst)
    }

    /// The `idx`'th input value of an instruction, aliases resolved.
    pub fn input_as_value(&self, inst: ir::Inst, idx: usize) -> Value {
        let v = self.f.dfg.inst_args(inst)[idx];
        self.f.dfg.resolve_aliases(v)
    }

    /// The number of inputs of an instruction.
    pub fn num_inputs(&self, inst: ir::Inst) -> usize {
        self.f.dfg.inst_args(inst).len()
    }

    /// The type of the `idx`'th input.
    pub fn input_ty(&self, inst: ir::Inst, idx: usize) -> Type {
        self.f.dfg.value_type(self.input_as_value(inst, idx))
    }

    /// The type of the `idx`'th output.
    pub fn output_ty(&self, inst: ir::Inst, idx: usize) -> Type {
        self.f.dfg.value_type(self.f.dfg.inst_results(inst)[idx])
    }

    /// The vreg holding `value`, allocating one if needed.
    pub fn put_value_in_reg(&mut self, value: Value) -> Reg {
        let value = self.f.dfg.resolve_aliases(value);
        let ty = self.f.dfg.value_type(value);
        let vcode = &mut self.vcode;
        *self
            .value_regs
            .entry(value)
            .or_insert_with(|| Reg::from_virtual(vcode.alloc_vreg(ty)))
    }

    /// The vreg holding input `idx` of `inst`.
    pub fn put_input_in_reg(&mut self, inst: ir::Inst, idx: usize) -> Reg {
        let value = self.input_as_value(inst, idx);
        self.put_value_in_reg(value)
    }

    /// The register into which output `idx` of `inst` must be written.
    pub fn get_output(&mut self, inst: ir::Inst, idx: usize) -> Writable<Reg> {
        let value = self.f.dfg.inst_results(inst)[idx];
        Writable::from_reg(self.put_value_in_reg(value))
    }

    /// Allocate a fresh temporary register of the given type.
    pub fn alloc_tmp(&mut self, ty: Type) -> Writable<Reg> {
        Writable::from_reg(Reg::from_virtual(self.vcode.alloc_vreg(ty)))
    }

    /// If input `idx` of `inst` is produced by an `iconst`, absorb it and
    /// return the constant, sign-extended from its type's width.
    pub fn input_as_const(&mut self, inst: ir::Inst, idx: usize) -> Option<i64> {
        let value = self.input_as_value(inst, idx);
        let def_inst = self.f.dfg.value_def(value).inst()?;
        match *self.f.dfg.inst_data(def_inst) {
            InstructionData::UnaryImm {
                opcode: Opcode::Iconst,
                imm,
            } => {
                let ty = self.f.dfg.value_type(value);
                self.dec_use(value);
                Some(imm.sign_extend_from_width(ty.bits()).bits())
            }
            _ => None,
        }
    }

    /// Try to sink the producer of input `idx` of `inst` into the current
    /// instruction: the producer must match `want`, be used exactly once,
    /// and (for loads) share the consumer's side-effect color. Returns the
    /// producer for the backend to read its operands; the main loop will
    /// skip it.
    pub fn maybe_sink_input(
        &mut self,
        inst: ir::Inst,
        idx: usize,
        want: fn(Opcode) -> bool,
    ) -> Option<ir::Inst> {
        if !self.sinking_enabled {
            return None;
        }
        let value = self.input_as_value(inst, idx);
        let def_inst = self.f.dfg.value_def(value).inst()?;
        let def_op = self.f.dfg.inst_data(def_inst).opcode();
        if !want(def_op) {
            return None;
        }
        if self.value_uses.get(&value).copied().unwrap_or(0) != 1 {
            return None;
        }
        // A load may only move across instructions with no side effects:
        // same color means no store, trap, or call in between.
        if def_op.has_side_effects() && self.inst_colors[def_inst] != self.inst_colors[inst] {
            return None;
        }
        self.dec_use(value);
        self.sunk.insert(def_inst);
        log::trace!("lower: sinking {def_inst} into {inst}");
        Some(def_inst)
    }

    fn dec_use(&mut self, value: Value) {
        if let Some(n) = self.value_uses.get_mut(&value) {
            *n = n.saturating_sub(1);
        }
    }

    /// Emit a machine instruction for the IR instruction currently being
    /// lowered. Instructions are emitted in forward (program) order.
    pub fn emit(&mut self, inst: I) {
        self.ir_insts.push(inst);
    }

    /// The current source location.
    pub fn srcloc(&self) -> SourceLoc {
        self.cur_srcloc
    }

    // ---- ABI helpers. -------------------------------------------------

    /// Lower a `return`: move the return values into their ABI locations
    /// and emit the return pseudo instruction.
    pub fn gen_return(&mut self, rets: &[Value]) {
        let ret_locs: Vec<ABIArg> = self.callee.ret_locs().to_vec();
        let mut pairs: SmallVec<[RetPair; 2]> = SmallVec::new();
        for (i, &value) in rets.iter().enumerate() {
            match ret_locs[i] {
                ABIArg::Reg { reg, .. } => {
                    let vreg = self.put_value_in_reg(value);
                    pairs.push(RetPair { vreg, preg: reg });
                }
                ABIArg::Stack { .. } => {
                    unreachable!("stack return values are rejected at Callee creation")
                }
            }
        }
        let ret = AbiOf::<I>::gen_rets(pairs.into_iter().collect());
        self.emit(ret);
    }

    /// Lower a call: move arguments into ABI locations, emit the call with
    /// the proper fixed-register uses/defs and clobbers, and define the
    /// result vregs.
    pub fn gen_call(
        &mut self,
        sig: &ir::Signature,
        dest: CallDest,
        args: &[Value],
        results: &[Value],
    ) -> CodegenResult<()> {
        use crate::machinst::abi::ArgsOrRets;
        let (arg_locs, stack_arg_size) =
            AbiOf::<I>::compute_arg_locs(sig.call_conv, &sig.params, ArgsOrRets::Args)?;
        let (ret_locs, _) =
            AbiOf::<I>::compute_arg_locs(sig.call_conv, &sig.returns, ArgsOrRets::Rets)?;
        self.outgoing_args_size = self.outgoing_args_size.max(stack_arg_size);

        let mut uses: SmallVec<[RetPair; 8]> = SmallVec::new();
        for (i, &arg) in args.iter().enumerate() {
            let src = self.put_value_in_reg(arg);
            match arg_locs[i] {
                ABIArg::Reg { reg, .. } => uses.push(RetPair {
                    vreg: src,
                    preg: reg,
                }),
                ABIArg::Stack { offset, ty, .. } => {
                    let store = AbiOf::<I>::gen_store_stack_arg(src, offset, ty);
                    self.emit(store);
                }
            }
        }

        let mut defs: SmallVec<[ArgPair; 2]> = SmallVec::new();
        for (i, &res) in results.iter().enumerate() {
            match ret_locs[i] {
                ABIArg::Reg { reg, .. } => {
                    let dst = Writable::from_reg(self.put_value_in_reg(res));
                    defs.push(ArgPair {
                        vreg: dst,
                        preg: reg,
                    });
                }
                ABIArg::Stack { .. } => {
                    unreachable!("stack return values are rejected in compute_arg_locs")
                }
            }
        }

        let clobbers = AbiOf::<I>::caller_saved_regs(sig.call_conv);
        for inst in AbiOf::<I>::gen_call(dest, uses, defs, clobbers) {
            self.emit(inst);
        }
        Ok(())
    }

    // ---- Driver internals. --------------------------------------------

    /// Flush the per-IR-instruction buffer into the (reversed) VCode.
    fn flush_ir_insts(&mut self) {
        while let Some(inst) = self.ir_insts.pop() {
            self.vcode.push(inst, self.cur_srcloc);
        }
    }

    /// Does the instruction need lowering? Side-effecting instructions
    /// always do; pure instructions only if some result is still used.
    fn inst_needed(&self, inst: ir::Inst) -> bool {
        if self.sunk.contains(&inst) {
            return false;
        }
        if self.f.dfg.inst_data(inst).opcode().has_side_effects() {
            return true;
        }
        self.f
            .dfg
            .inst_results(inst)
            .iter()
            .any(|&r| self.value_uses.get(&r).copied().unwrap_or(0) > 0)
    }

    /// Lower the entry-block argument setup: one pseudo instruction that
    /// defines register arguments under fixed-register constraints and
    /// stack arguments under fixed-stack constraints on the frame slots
    /// the prologue fills for them.
    fn lower_arg_setup(&mut self) {
        let entry = self.f.entry_block().expect("no entry block");
        let params: Vec<Value> = self.f.dfg.block_params(entry).to_vec();
        let arg_locs: Vec<ABIArg> = self.callee.arg_locs().to_vec();
        debug_assert_eq!(params.len(), arg_locs.len());

        let mut reg_args: Vec<ArgPair> = Vec::new();
        let mut stack_args: Vec<StackArgPair> = Vec::new();
        let mut slots = self.callee.stack_arg_slots().into_iter();
        for (&param, loc) in params.iter().zip(arg_locs.iter()) {
            let dst = Writable::from_reg(self.put_value_in_reg(param));
            match *loc {
                ABIArg::Reg { reg, .. } => reg_args.push(ArgPair {
                    vreg: dst,
                    preg: reg,
                }),
                ABIArg::Stack { .. } => {
                    let copy = slots.next().expect("stack arg without a slot");
                    stack_args.push(StackArgPair {
                        vreg: dst,
                        slot: copy.slot,
                    });
                }
            }
        }
        debug_assert!(slots.next().is_none());
        self.emit(AbiOf::<I>::gen_args(reg_args, stack_args));
    }

    /// The vregs passed along each successor edge of `block`'s terminator,
    /// in successor order: arguments go on the direct edge, or on the
    /// critical-edge block when one was inserted.
    fn branch_arg_vregs(&mut self, lb: LoweredBlock) -> SmallVec<[SmallVec<[VReg; 4]>; 2]> {
        let mut out: SmallVec<[SmallVec<[VReg; 4]>; 2]> = SmallVec::new();
        match lb {
            LoweredBlock::Orig { block } => {
                let term = match self.f.layout.last_inst(block) {
                    Some(t) => t,
                    None => return out,
                };
                let ncalls = self.branch_calls(term).len();
                for i in 0..ncalls {
                    let (target, args) = self.branch_calls(term)[i].clone();
                    let is_split = {
                        let order = self.vcode.block_order();
                        // The i'th successor is an edge block iff it is
                        // not the lowered index of the IR target.
                        let lowered_target = order.lowered_index(target);
                        let succ = self.lowered_succ(lb, i);
                        Some(succ) != lowered_target
                    };
                    if is_split {
                        out.push(SmallVec::new());
                    } else {
                        let vregs = args
                            .iter()
                            .map(|&v| self.put_value_in_reg(v).as_virtual())
                            .collect();
                        out.push(vregs);
                    }
                }
            }
            LoweredBlock::CriticalEdge { pred, succ_idx, .. } => {
                let term = self.f.layout.last_inst(pred).expect("edge from empty block");
                let (_, args) = self.branch_calls(term)[succ_idx as usize].clone();
                let vregs = args
                    .iter()
                    .map(|&v| self.put_value_in_reg(v).as_virtual())
                    .collect();
                out.push(vregs);
            }
        }
        out
    }

    /// All (target, args) destinations of a branch, in successor order.
    fn branch_calls(&self, term: ir::Inst) -> SmallVec<[(ir::Block, SmallVec<[Value; 4]>); 4]> {
        let pool = &self.f.dfg.value_lists;
        let mut out: SmallVec<[(ir::Block, SmallVec<[Value; 4]>); 4]> = SmallVec::new();
        match self.f.dfg.inst_data(term) {
            InstructionData::BranchTable { table, .. } => {
                for call in self.f.dfg.jump_tables[*table].all_branches() {
                    out.push((
                        call.block(pool),
                        call.args_slice(pool)
                            .iter()
                            .map(|&v| self.f.dfg.resolve_aliases(v))
                            .collect(),
                    ));
                }
            }
            data => {
                for call in data.branch_destination() {
                    out.push((
                        call.block(pool),
                        call.args_slice(pool)
                            .iter()
                            .map(|&v| self.f.dfg.resolve_aliases(v))
                            .collect(),
                    ));
                }
            }
        }
        out
    }

    fn lowered_succ(&self, lb: LoweredBlock, i: usize) -> BlockIndex {
        let order = self.vcode.block_order();
        let bindex = match lb {
            LoweredBlock::Orig { block } => order.lowered_index(block).unwrap(),
            LoweredBlock::CriticalEdge { .. } => unreachable!(),
        };
        order.succ_indices(bindex)[i]
    }
}

/// Lower a function to VCode with the given backend.
pub fn lower_function<B: LowerBackend>(
    f: &Function,
    backend: &B,
    callee: Callee<AbiOf<B::MInst>>,
    flags: &settings::Flags,
) -> CodegenResult<(VCode<B::MInst>, Callee<AbiOf<B::MInst>>)> {
    let block_order = BlockLoweringOrder::new(f);
    let lowered: Vec<LoweredBlock> = block_order.lowered_order().to_vec();
    let mut ctx: Lower<B::MInst> = Lower::new(f, callee, flags, block_order);

    // Pre-create vregs for all block parameters of reachable non-entry
    // blocks, and register them as VCode block params.
    let entry_block = f.entry_block().expect("no entry block");
    for (bindex, lb) in lowered.iter().enumerate() {
        if let LoweredBlock::Orig { block } = *lb {
            if block != entry_block {
                let params: SmallVec<[VReg; 4]> = f
                    .dfg
                    .block_params(block)
                    .iter()
                    .map(|&p| ctx.put_value_in_reg(p).as_virtual())
                    .collect();
                ctx.vcode.set_block_params(bindex as BlockIndex, params);
            }
        }
    }

    // Walk lowered blocks in reverse, instructions in reverse.
    for (bindex, lb) in lowered.iter().enumerate().rev() {
        let bindex = bindex as BlockIndex;
        let branch_args = ctx.branch_arg_vregs(*lb);
        ctx.vcode.set_branch_args(bindex, branch_args);

        match *lb {
            LoweredBlock::CriticalEdge { succ, .. } => {
                let order = ctx.vcode.block_order();
                let succ_index = order.succ_indices(bindex)[0];
                debug_assert_eq!(
                    order.lowered_order()[succ_index as usize].orig_block(),
                    Some(succ)
                );
                ctx.cur_srcloc = Default::default();
                ctx.emit(B::MInst::gen_jump(MachLabel::from_block(succ_index)));
                ctx.flush_ir_insts();
            }
            LoweredBlock::Orig { block } => {
                let insts: Vec<ir::Inst> = f.layout.block_insts(block).collect();
                for (pos, &inst) in insts.iter().enumerate().rev() {
                    let is_term = pos == insts.len() - 1
                        && f.dfg.inst_data(inst).opcode().is_branch();
                    if !is_term && !ctx.inst_needed(inst) {
                        continue;
                    }
                    ctx.cur_srcloc = f.srclocs[inst];
                    if is_term {
                        let order = ctx.vcode.block_order();
                        let targets: Vec<MachLabel> = order
                            .succ_indices(bindex)
                            .iter()
                            .map(|&s| MachLabel::from_block(s))
                            .collect();
                        backend.lower_branch(&mut ctx, inst, &targets)?;
                    } else {
                        backend.lower(&mut ctx, inst)?;
                    }
                    ctx.flush_ir_insts();
                }
                if block == entry_block {
                    ctx.cur_srcloc = Default::default();
                    ctx.lower_arg_setup();
                    ctx.flush_ir_insts();
                }
            }
        }
        ctx.vcode.end_block();
    }

    let Lower {
        vcode,
        mut callee,
        outgoing_args_size,
        ..
    } = ctx;
    callee.accumulate_outgoing_args_size(outgoing_args_size);
    Ok((vcode.finish(), callee))
}

/// A tiny extension trait to keep opcode lookups readable in the counting
/// pass.
trait OpcodeOf {
    fn opcode_of(self, f: &Function) -> Opcode;
}

impl OpcodeOf for ir::Inst {
    fn opcode_of(self, f: &Function) -> Opcode {
        f.dfg.inst_data(self).opcode()
    }
}
