//! Data flow graph tracking instructions, values, and blocks.

use crate::ir::instructions::{InstructionData, ValueList, ValueListPool};
use crate::ir::jumptable::JumpTableData;
use crate::ir::types::Type;
use crate::ir::{Block, ExtFuncData, FuncRef, Inst, JumpTable, SigRef, Signature, Value};
use anvil_entity::{PrimaryMap, SecondaryMap};
use core::fmt;
use core::ops::{Index, IndexMut};
use smallvec::SmallVec;

/// A data flow graph defines all instructions and basic blocks in a function
/// as well as the data flow dependencies between them. The DFG also tracks
/// values which can be either instruction results or block parameters.
///
/// The layout of blocks in the function and of instructions in each block is
/// recorded by the `Layout` data structure which forms the other half of the
/// function representation.
#[derive(Clone)]
pub struct DataFlowGraph {
    /// Data about all of the instructions in the function. The instructions
    /// in this map are not in program order; that is tracked by `Layout`,
    /// along with the block containing each instruction.
    insts: PrimaryMap<Inst, InstructionData>,

    /// List of result values for each instruction.
    results: SecondaryMap<Inst, ValueList>,

    /// Basic blocks in the function and their parameters.
    ///
    /// This map is not in program order; that is handled by `Layout`, and
    /// so is the sequence of instructions contained in each block.
    blocks: PrimaryMap<Block, BlockData>,

    /// Memory pool of value lists.
    ///
    /// The `ValueList` references into this pool appear in many places:
    ///
    /// - Instructions in `insts` that don't have room for their entire
    ///   argument list inline.
    /// - Instruction result values in `results`.
    /// - Block parameters in `blocks`.
    pub value_lists: ValueListPool,

    /// Primary value table with entries for all values.
    values: PrimaryMap<Value, ValueData>,

    /// Function signature table. These signatures are referenced by
    /// indirect call instructions as well as the external function
    /// references.
    pub signatures: PrimaryMap<SigRef, Signature>,

    /// External function references. These are functions that can be called
    /// directly.
    pub ext_funcs: PrimaryMap<FuncRef, ExtFuncData>,

    /// Jump tables used in `br_table` instructions.
    pub jump_tables: PrimaryMap<JumpTable, JumpTableData>,
}

impl DataFlowGraph {
    /// Create a new empty `DataFlowGraph`.
    pub fn new() -> Self {
        Self {
            insts: PrimaryMap::new(),
            results: SecondaryMap::new(),
            blocks: PrimaryMap::new(),
            value_lists: ValueListPool::new(),
            values: PrimaryMap::new(),
            signatures: PrimaryMap::new(),
            ext_funcs: PrimaryMap::new(),
            jump_tables: PrimaryMap::new(),
        }
    }

    /// Clear everything.
    pub fn clear(&mut self) {
        self.insts.clear();
        self.results.clear();
        self.blocks.clear();
        self.value_lists.clear();
        self.values.clear();
        self.signatures.clear();
        self.ext_funcs.clear();
        self.jump_tables.clear();
    }

    /// Get the total number of instructions created in this function,
    /// whether they are currently inserted in the layout or not.
    ///
    /// This is intended for use with `SecondaryMap::with_capacity`.
    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// Returns `true` if the given instruction reference is valid.
    pub fn inst_is_valid(&self, inst: Inst) -> bool {
        self.insts.is_valid(inst)
    }

    /// Get the total number of basic blocks created in this function.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Get the total number of values.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }
}

/// Where did a value come from?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    /// Value is the n'th result of an instruction.
    Result(Inst, usize),
    /// Value is the n'th parameter to a block.
    Param(Block, usize),
}

impl ValueDef {
    /// Unwrap the instruction where the value was defined, or panic.
    pub fn unwrap_inst(&self) -> Inst {
        self.inst().expect("Value is not an instruction result")
    }

    /// Get the instruction where the value was defined, if any.
    pub fn inst(&self) -> Option<Inst> {
        match *self {
            Self::Result(inst, _) => Some(inst),
            _ => None,
        }
    }

    /// Unwrap the block there the parameter is defined, or panic.
    pub fn unwrap_block(&self) -> Block {
        match *self {
            Self::Param(block, _) => block,
            _ => panic!("Value is not a block parameter"),
        }
    }

    /// Get the number component of this definition.
    pub fn num(self) -> usize {
        match self {
            Self::Result(_, n) | Self::Param(_, n) => n,
        }
    }
}

/// Internal table storage for extended values.
#[derive(Clone, Debug)]
enum ValueData {
    /// Value is defined by an instruction.
    Inst { ty: Type, num: u16, inst: Inst },

    /// Value is a block parameter.
    Param { ty: Type, num: u16, block: Block },

    /// Value is an alias of another value.
    /// An alias value can't be linked to an instruction or block header.
    Alias { ty: Type, original: Value },
}

/// Handling values.
///
/// Values are either block parameters or instruction results.
impl DataFlowGraph {
    /// Allocate an extended value entry.
    fn make_value(&mut self, data: ValueData) -> Value {
        self.values.push(data)
    }

    /// Check if a value reference is valid.
    pub fn value_is_valid(&self, v: Value) -> bool {
        self.values.is_valid(v)
    }

    /// Get the type of a value.
    pub fn value_type(&self, v: Value) -> Type {
        match self.values[v] {
            ValueData::Inst { ty, .. }
            | ValueData::Param { ty, .. }
            | ValueData::Alias { ty, .. } => ty,
        }
    }

    /// Get the definition of a value.
    ///
    /// This is either the instruction that defined it or the block that has
    /// the value as a parameter. Aliases are followed to the original value.
    pub fn value_def(&self, v: Value) -> ValueDef {
        match self.values[v] {
            ValueData::Inst { inst, num, .. } => ValueDef::Result(inst, num.into()),
            ValueData::Param { block, num, .. } => ValueDef::Param(block, num.into()),
            ValueData::Alias { original, .. } => {
                // Make sure we only recurse one level. `resolve_aliases` has
                // safeguards to detect alias loops without overrunning the
                // stack.
                self.value_def(self.resolve_aliases(original))
            }
        }
    }

    /// Resolve value aliases.
    ///
    /// Find the original SSA value that `value` aliases. The resolution is
    /// transitive and idempotent: resolving the returned value again gives
    /// the same value.
    pub fn resolve_aliases(&self, value: Value) -> Value {
        let mut v = value;
        // Note that values may be empty here.
        for _ in 0..=self.values.len() {
            if let ValueData::Alias { original, .. } = self.values[v] {
                v = original;
            } else {
                return v;
            }
        }
        panic!("alias loop detected for {value}");
    }

    /// Turn a value into an alias of another.
    ///
    /// Change the `dest` value to behave as an alias of `src`. This means
    /// that all uses of `dest` will behave as if they used that value
    /// `src`.
    ///
    /// The `dest` value can't be attached to an instruction or block.
    pub fn change_to_alias(&mut self, dest: Value, src: Value) {
        debug_assert!(!matches!(self.values[dest], ValueData::Alias { .. }));
        // Try to create short alias chains by finding the original source
        // value. This also avoids the creation of loops.
        let original = self.resolve_aliases(src);
        debug_assert_ne!(
            dest, original,
            "can't make {dest} an alias of itself"
        );
        let ty = self.value_type(original);
        debug_assert_eq!(
            self.value_type(dest),
            ty,
            "aliasing {dest} to {src} would change its type"
        );
        self.values[dest] = ValueData::Alias { ty, original };
    }

    /// Replaces all uses of a value with another value, in instruction
    /// arguments, branch arguments and jump tables.
    pub fn resolve_all_aliases_in_inst(&mut self, inst: Inst) {
        // Resolve fixed and pooled arguments in place.
        let mut args: SmallVec<[(usize, Value); 8]> = SmallVec::new();
        for (i, &arg) in self.insts[inst].arguments(&self.value_lists).iter().enumerate() {
            let resolved = self.resolve_aliases(arg);
            if resolved != arg {
                args.push((i, resolved));
            }
        }
        if !args.is_empty() {
            let data = &mut self.insts[inst];
            for &(i, v) in &args {
                data.arguments_mut(&mut self.value_lists)[i] = v;
            }
        }
    }
}

/// Instructions.
impl DataFlowGraph {
    /// Create a new instruction.
    ///
    /// The type of the first result is indicated by `data.ty`. If the
    /// instruction produces multiple results, also call
    /// `make_inst_results` to allocate value table entries.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        self.insts.push(data)
    }

    /// Get all value arguments on `inst` as a slice.
    pub fn inst_args(&self, inst: Inst) -> &[Value] {
        self.insts[inst].arguments(&self.value_lists)
    }

    /// Get all value arguments on `inst` as a mutable slice.
    pub fn inst_args_mut(&mut self, inst: Inst) -> &mut [Value] {
        self.insts[inst].arguments_mut(&mut self.value_lists)
    }

    /// Get the fixed instruction data for `inst`.
    pub fn inst_data(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }

    /// Create result values for an instruction that produces multiple
    /// results.
    ///
    /// Instructions that produce no result values only need to be created
    /// with `make_inst`, otherwise call `make_inst_results` to allocate
    /// value table entries for the results.
    ///
    /// The result value types are determined from the instruction's
    /// controlling type variable for ordinary instructions, and from the
    /// call signature for call instructions.
    ///
    /// Returns the number of results produced by the instruction.
    pub fn make_inst_results(&mut self, inst: Inst, ctrl_typevar: Type) -> usize {
        debug_assert!(
            self.results[inst].is_empty(),
            "instruction already has results"
        );

        if let Some(sig) = self.call_signature(inst) {
            // Create result values corresponding to the call return types.
            let rets: SmallVec<[Type; 4]> = self.signatures[sig]
                .returns
                .iter()
                .map(|r| r.value_type)
                .collect();
            for ty in &rets {
                self.append_result(inst, *ty);
            }
            rets.len()
        } else {
            let opcode = self.insts[inst].opcode();
            let num = opcode.num_fixed_results();
            if num == 1 {
                self.append_result(inst, opcode.result_type(ctrl_typevar));
            }
            num
        }
    }

    /// Append a new instruction result value to `inst`.
    fn append_result(&mut self, inst: Inst, ty: Type) -> Value {
        let res = self.values.next_key();
        let num = self.results[inst].push(res, &mut self.value_lists);
        debug_assert!(num <= u16::MAX as usize, "too many result values");
        self.make_value(ValueData::Inst {
            ty,
            num: num as u16,
            inst,
        })
    }

    /// Get the first result of an instruction.
    ///
    /// This function panics if the instruction doesn't have any result.
    pub fn first_result(&self, inst: Inst) -> Value {
        self.results[inst]
            .first(&self.value_lists)
            .expect("instruction has no results")
    }

    /// Test if `inst` has any result values currently.
    pub fn has_results(&self, inst: Inst) -> bool {
        !self.results[inst].is_empty()
    }

    /// Return all the results of an instruction.
    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        self.results[inst].as_slice(&self.value_lists)
    }

    /// Get the call signature of a direct or indirect call instruction.
    /// Returns `None` if `inst` is not a call instruction.
    pub fn call_signature(&self, inst: Inst) -> Option<SigRef> {
        match self.insts[inst] {
            InstructionData::Call { func_ref, .. } => {
                Some(self.ext_funcs[func_ref].signature)
            }
            InstructionData::CallIndirect { sig_ref, .. } => Some(sig_ref),
            _ => None,
        }
    }

    /// Get the destinations of a branch instruction. `br_table` reports
    /// the jump table's branches, default destination first.
    pub fn branch_destinations(&self, inst: Inst) -> SmallVec<[Block; 4]> {
        match &self.insts[inst] {
            InstructionData::BranchTable { table, .. } => self.jump_tables[*table]
                .all_branches()
                .map(|call| call.block(&self.value_lists))
                .collect(),
            data => data
                .branch_destination()
                .iter()
                .map(|call| call.block(&self.value_lists))
                .collect(),
        }
    }

    /// Append `arg` to the arguments that branch `inst` passes to every
    /// destination equal to `target`.
    pub fn append_branch_argument(&mut self, inst: Inst, target: Block, arg: Value) {
        let insts = &mut self.insts;
        let pool = &mut self.value_lists;
        let mut found = false;
        for call in insts[inst].branch_destination_mut() {
            if call.block(pool) == target {
                call.append_argument(arg, pool);
                found = true;
            }
        }
        debug_assert!(found, "branch {inst} does not target {target}");
    }

    /// Rewrite the destination of any branch in `inst` that targets `old`
    /// to `new`, preserving the branch arguments.
    ///
    /// `br_table` destinations are never rewritten this way; the translator
    /// only retargets the placeholder destination of a two-way branch.
    pub fn change_branch_destination(&mut self, inst: Inst, old: Block, new: Block) {
        let insts = &mut self.insts;
        for call in insts[inst].branch_destination_mut() {
            if call.block(&self.value_lists) == old {
                call.set_block(new, &mut self.value_lists);
            }
        }
    }
}

/// Basic blocks.
impl DataFlowGraph {
    /// Create a new basic block.
    pub fn make_block(&mut self) -> Block {
        self.blocks.push(BlockData::new())
    }

    /// Get the number of parameters on a given block.
    pub fn num_block_params(&self, block: Block) -> usize {
        self.blocks[block].params.len(&self.value_lists)
    }

    /// Get the parameters on a given block.
    pub fn block_params(&self, block: Block) -> &[Value] {
        self.blocks[block].params.as_slice(&self.value_lists)
    }

    /// Append a parameter with type `ty` to `block`.
    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let param = self.values.next_key();
        let num = self.blocks[block].params.push(param, &mut self.value_lists);
        debug_assert!(num <= u16::MAX as usize, "too many parameters on block");
        self.make_value(ValueData::Param {
            ty,
            num: num as u16,
            block,
        })
    }
}

#[derive(Clone)]
struct BlockData {
    /// List of parameters to this block.
    params: ValueList,
}

impl BlockData {
    fn new() -> Self {
        Self {
            params: ValueList::new(),
        }
    }
}

/// Allow immutable access to instructions via indexing.
impl Index<Inst> for DataFlowGraph {
    type Output = InstructionData;

    fn index(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }
}

/// Allow mutable access to instructions via indexing.
impl IndexMut<Inst> for DataFlowGraph {
    fn index_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst]
    }
}

impl fmt::Debug for DataFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "dfg with {} values, {} insts, {} blocks",
            self.num_values(),
            self.num_insts(),
            self.num_blocks()
        )
    }
}

impl Default for DataFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::InstructionData;
    use crate::ir::types;
    use crate::ir::{immediates::Imm64, Opcode};
    use anvil_entity::EntityRef;

    #[test]
    fn make_inst() {
        let mut dfg = DataFlowGraph::new();

        let idata = InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: Imm64::new(0),
        };
        let inst = dfg.make_inst(idata);
        dfg.make_inst_results(inst, types::I32);
        assert_eq!(inst.to_string(), "inst0");

        // Immutable reference resolution.
        let immdfg = &dfg;
        let ins = &immdfg[inst];
        assert_eq!(ins.opcode(), Opcode::Iconst);

        // Results.
        let val = dfg.first_result(inst);
        assert_eq!(dfg.inst_results(inst), &[val]);

        assert_eq!(dfg.value_def(val), ValueDef::Result(inst, 0));
        assert_eq!(dfg.value_type(val), types::I32);
    }

    #[test]
    fn block_params() {
        let mut dfg = DataFlowGraph::new();

        let block = dfg.make_block();
        assert_eq!(block.to_string(), "block0");
        assert_eq!(dfg.num_block_params(block), 0);
        assert_eq!(dfg.block_params(block), &[]);

        let arg1 = dfg.append_block_param(block, types::F32);
        assert_eq!(arg1.to_string(), "v0");
        let arg2 = dfg.append_block_param(block, types::I16);
        assert_eq!(arg2.to_string(), "v1");

        assert_eq!(dfg.num_block_params(block), 2);
        assert_eq!(dfg.block_params(block), &[arg1, arg2]);
        assert_eq!(dfg.value_def(arg1), ValueDef::Param(block, 0));
        assert_eq!(dfg.value_def(arg2), ValueDef::Param(block, 1));
        assert_eq!(dfg.value_type(arg1), types::F32);
        assert_eq!(dfg.value_type(arg2), types::I16);
    }

    #[test]
    fn aliases() {
        let mut dfg = DataFlowGraph::new();

        let block = dfg.make_block();
        let v0 = dfg.append_block_param(block, types::I32);
        let v1 = dfg.append_block_param(block, types::I32);
        let v2 = dfg.append_block_param(block, types::I32);

        // Alias chains resolve transitively, and resolution is idempotent.
        dfg.change_to_alias(v1, v0);
        dfg.change_to_alias(v2, v1);
        assert_eq!(dfg.resolve_aliases(v2), v0);
        assert_eq!(
            dfg.resolve_aliases(dfg.resolve_aliases(v2)),
            dfg.resolve_aliases(v2)
        );
        // The def of an alias is the def of its original.
        assert_eq!(dfg.value_def(v2), ValueDef::Param(block, 0));
    }

    #[test]
    fn determinism() {
        // Given a fixed sequence of make/append calls, entity ids are
        // stable.
        let build = || {
            let mut dfg = DataFlowGraph::new();
            let b0 = dfg.make_block();
            let v0 = dfg.append_block_param(b0, types::I64);
            let inst = dfg.make_inst(InstructionData::Unary {
                opcode: Opcode::Popcnt,
                arg: v0,
            });
            dfg.make_inst_results(inst, types::I64);
            (b0, v0, inst, dfg.first_result(inst))
        };
        assert_eq!(build(), build());
        let (b0, v0, inst, res) = build();
        assert_eq!(b0, Block::new(0));
        assert_eq!(v0, Value::new(0));
        assert_eq!(inst, Inst::new(0));
        assert_eq!(res, Value::new(1));
    }
}
