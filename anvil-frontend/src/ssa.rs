//! A SSA-building API that handles incomplete CFGs.
//!
//! The algorithm is the one described in:
//!
//! Braun M., Buchwald S., Hack S., Leißa R., Mallon C., Zwinkau A. (2013)
//! Simple and Efficient Construction of Static Single Assignment Form.
//! Lecture Notes in Computer Science, vol 7791.
//!
//! A block is *sealed* once all of its predecessors are known. Reading a
//! variable in an unsealed block creates a block parameter whose incoming
//! arguments are filled in when the block is sealed; reading in a sealed
//! block either recurses into a unique predecessor or creates a parameter
//! fed by every predecessor.

use crate::variable::Variable;
use anvil_codegen::cursor::FuncCursor;
use anvil_codegen::ir::{Block, Function, Inst, InstBuilder, InstructionData, Type, Value};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::vec::Vec;

/// Structure containing the data relevant the construction of SSA for a
/// given function.
#[derive(Default)]
pub struct SSABuilder {
    /// Records the current definition of each variable in each block.
    variable_defs: HashMap<(Variable, Block), Value>,
    /// Per-block state: predecessors, sealing, and parameters awaiting
    /// their incoming arguments.
    blocks: HashMap<Block, SSABlockData>,
}

#[derive(Default)]
struct SSABlockData {
    /// The predecessors of the block, with the branch instruction in each
    /// that targets it.
    predecessors: Vec<(Block, Inst)>,
    /// Whether the block's predecessor list is final.
    sealed: bool,
    /// Block parameters created for variables read before the block was
    /// sealed; their incoming arguments are appended at seal time.
    undef_variables: Vec<(Variable, Value)>,
}

impl SSABuilder {
    /// Clear the state for a new function.
    pub fn clear(&mut self) {
        self.variable_defs.clear();
        self.blocks.clear();
    }

    /// Declares a new definition of a variable in a given basic block.
    pub fn def_var(&mut self, var: Variable, val: Value, block: Block) {
        self.variable_defs.insert((var, block), val);
    }

    /// Declares a use of a variable in a given basic block. Returns the
    /// SSA value corresponding to the current SSA definition of this
    /// variable.
    pub fn use_var(
        &mut self,
        func: &mut Function,
        var: Variable,
        ty: Type,
        block: Block,
    ) -> Value {
        if let Some(&val) = self.variable_defs.get(&(var, block)) {
            return val;
        }
        self.use_var_nonlocal(func, var, ty, block)
    }

    fn use_var_nonlocal(
        &mut self,
        func: &mut Function,
        var: Variable,
        ty: Type,
        block: Block,
    ) -> Value {
        let (sealed, single_pred) = {
            let data = self.blocks.entry(block).or_default();
            let single = if data.predecessors.len() == 1 {
                Some(data.predecessors[0].0)
            } else {
                None
            };
            (data.sealed, single)
        };

        if !sealed {
            // Incomplete CFG: create a parameter now, fill in its
            // arguments when the block is sealed.
            let val = func.dfg.append_block_param(block, ty);
            self.blocks
                .get_mut(&block)
                .unwrap()
                .undef_variables
                .push((var, val));
            self.def_var(var, val, block);
            return val;
        }

        if let Some(pred) = single_pred {
            // One predecessor: no parameter needed.
            let val = self.use_var(func, var, ty, pred);
            self.def_var(var, val, block);
            return val;
        }

        // Sealed with several predecessors: create the parameter first
        // (breaking potential cycles through this very block), then feed
        // it from every predecessor.
        let val = func.dfg.append_block_param(block, ty);
        self.def_var(var, val, block);
        self.append_pred_args(func, block, var, ty);
        val
    }

    /// For the newest parameter of `block` for `var`, look up the
    /// variable in each predecessor and append the value to the branch.
    fn append_pred_args(&mut self, func: &mut Function, block: Block, var: Variable, ty: Type) {
        let preds: SmallVec<[(Block, Inst); 4]> = self
            .blocks
            .get(&block)
            .map(|d| d.predecessors.iter().copied().collect())
            .unwrap_or_default();
        for (pred, branch) in preds {
            let arg = self.use_var(func, var, ty, pred);
            self.append_branch_argument(func, pred, branch, block, arg);
        }
    }

    /// Declares a new predecessor for a block, with the branch
    /// instruction that jumps to it. The block must not be sealed yet. A
    /// branch targeting the same block several times (e.g. a jump table
    /// with repeated entries) counts as one predecessor.
    pub fn declare_block_predecessor(&mut self, block: Block, pred: Block, inst: Inst) {
        let data = self.blocks.entry(block).or_default();
        debug_assert!(!data.sealed, "cannot add a predecessor to a sealed block");
        if !data.predecessors.contains(&(pred, inst)) {
            data.predecessors.push((pred, inst));
        }
    }

    /// Removes a predecessor record, when a branch is retargeted away
    /// from `block`.
    pub fn remove_block_predecessor(&mut self, block: Block, pred: Block, inst: Inst) {
        if let Some(data) = self.blocks.get_mut(&block) {
            debug_assert!(!data.sealed, "cannot remove a predecessor of a sealed block");
            data.predecessors.retain(|&p| p != (pred, inst));
        }
    }

    /// Is the block sealed?
    pub fn is_sealed(&self, block: Block) -> bool {
        self.blocks.get(&block).map(|d| d.sealed).unwrap_or(false)
    }

    /// The number of known predecessors of a block.
    pub fn num_predecessors(&self, block: Block) -> usize {
        self.blocks
            .get(&block)
            .map(|d| d.predecessors.len())
            .unwrap_or(0)
    }

    /// Completes the global value numbering for a block: all the block's
    /// predecessors are now known, and the arguments for the parameters
    /// created while the block was open can be computed.
    pub fn seal_block(&mut self, block: Block, func: &mut Function) {
        let undef = {
            let data = self.blocks.entry(block).or_default();
            debug_assert!(!data.sealed, "block sealed twice");
            core::mem::take(&mut data.undef_variables)
        };
        for (var, val) in undef {
            let ty = func.dfg.value_type(val);
            self.append_pred_args(func, block, var, ty);
        }
        self.blocks.get_mut(&block).unwrap().sealed = true;
    }

    /// Append `arg` to the arguments `branch` (in `pred`) passes to
    /// `block`.
    ///
    /// A `br_table` branch cannot carry arguments on its edges, so the
    /// edge is split: a new block is created, the jump-table entries that
    /// targeted `block` are retargeted to it, and the argument rides on
    /// the new block's jump. This mirrors the edge-splitting the
    /// WebAssembly translator performs for visible block arguments.
    fn append_branch_argument(
        &mut self,
        func: &mut Function,
        pred: Block,
        branch: Inst,
        block: Block,
        arg: Value,
    ) {
        match func.dfg.inst_data(branch) {
            InstructionData::BranchTable { table, .. } => {
                let table = *table;
                // Create the splitting block and retarget every entry.
                let split = func.dfg.make_block();
                func.layout.append_block(split);
                {
                    let pool = &mut func.dfg.value_lists;
                    let jt = &mut func.dfg.jump_tables[table];
                    if jt.default_block().block(pool) == block {
                        jt.default_block_mut().set_block(split, pool);
                    }
                    for call in jt.as_mut_slice() {
                        if call.block(pool) == block {
                            call.set_block(split, pool);
                        }
                    }
                }
                // The split block simply jumps to the real target; it is
                // immediately complete.
                let jump = {
                    let mut cur = FuncCursor::new(func).at_bottom(split);
                    cur.ins().jump(block, &[])
                };
                // Rewire the predecessor record for `block` and register
                // the new block.
                if let Some(data) = self.blocks.get_mut(&block) {
                    for p in data.predecessors.iter_mut() {
                        if *p == (pred, branch) {
                            *p = (split, jump);
                        }
                    }
                }
                let split_data = self.blocks.entry(split).or_default();
                split_data.predecessors.push((pred, branch));
                split_data.sealed = true;
                // Now the argument goes on the new jump.
                self.append_branch_argument(func, split, jump, block, arg);
            }
            _ => {
                func.dfg.append_branch_argument(branch, block, arg);
            }
        }
    }
}
