//! A frontend for building Anvil IR from other languages.

use crate::ssa::SSABuilder;
use crate::variable::Variable;
use anvil_codegen::ir::{
    Block, DataFlowGraph, ExtFuncData, FuncRef, Function, Inst, InstBuilderBase, InstructionData,
    JumpTable, JumpTableData, SigRef, Signature, SourceLoc, Type, Value,
};
use anvil_entity::SecondaryMap;

/// Structure used for translating a series of functions into Anvil IR.
///
/// In order to reduce memory reallocations when compiling multiple
/// functions, `FunctionBuilderContext` holds various data structures which
/// are cleared between functions, rather than dropped, preserving the
/// underlying allocations.
#[derive(Default)]
pub struct FunctionBuilderContext {
    ssa: SSABuilder,
    types: SecondaryMap<Variable, Type>,
}

impl FunctionBuilderContext {
    /// Creates a `FunctionBuilderContext` structure. The structure is
    /// automatically cleared after each [`FunctionBuilder`] completes
    /// translating a function.
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.ssa.clear();
        self.types.clear();
    }
}

/// Temporary object used to build a single Anvil IR [`Function`].
pub struct FunctionBuilder<'a> {
    /// The function currently being built. This field is public so the
    /// function can be re-borrowed.
    pub func: &'a mut Function,

    /// Source location to assign to all new instructions.
    srcloc: SourceLoc,

    ctx: &'a mut FunctionBuilderContext,
    position: Option<Block>,
}

impl<'a> FunctionBuilder<'a> {
    /// Creates a new `FunctionBuilder` structure that will operate on a
    /// `Function` using a `FunctionBuilderContext`.
    pub fn new(func: &'a mut Function, ctx: &'a mut FunctionBuilderContext) -> Self {
        ctx.clear();
        Self {
            func,
            srcloc: Default::default(),
            ctx,
            position: None,
        }
    }

    /// Set the source location that should be assigned to all new
    /// instructions.
    pub fn set_srcloc(&mut self, srcloc: SourceLoc) {
        self.srcloc = srcloc;
    }

    /// Creates a new `Block` and inserts it at the end of the layout.
    pub fn create_block(&mut self) -> Block {
        let block = self.func.dfg.make_block();
        self.func.layout.append_block(block);
        block
    }

    /// The block currently being filled, if any.
    pub fn current_block(&self) -> Option<Block> {
        self.position
    }

    /// After the call to this function, new instructions will be inserted
    /// into the designated block, in the order they are declared.
    ///
    /// When inserting the terminator instruction (which doesn't have a
    /// fallthrough to its immediate successor), the block will be
    /// declared filled and it will not be possible to append instructions
    /// to it.
    pub fn switch_to_block(&mut self, block: Block) {
        self.position = Some(block);
    }

    /// Declares that all the predecessors of this block are known.
    ///
    /// Function to call with `block` as soon as the last branch
    /// instruction to `block` has been created. Forgetting to call this
    /// method on every block will cause inconsistencies in the produced
    /// functions.
    pub fn seal_block(&mut self, block: Block) {
        self.ctx.ssa.seal_block(block, self.func);
    }

    /// Declares the type of a variable, so that it can be used later
    /// (by calling [`FunctionBuilder::use_var`]).
    pub fn declare_var(&mut self, var: Variable, ty: Type) {
        self.ctx.types[var] = ty;
    }

    /// Returns the Anvil IR necessary to use a previously defined user
    /// variable, returning an error if this is not possible.
    pub fn use_var(&mut self, var: Variable) -> Value {
        let ty = self.ctx.types[var];
        debug_assert!(
            !ty.is_invalid(),
            "variable {var} used before declare_var"
        );
        let block = self.position.expect("use_var with no current block");
        self.ctx.ssa.use_var(self.func, var, ty, block)
    }

    /// Registers a new definition of a user variable. The type of the
    /// value must match the type declared for the variable.
    pub fn def_var(&mut self, var: Variable, val: Value) {
        debug_assert_eq!(
            self.func.dfg.value_type(val),
            self.ctx.types[var],
            "declared type of variable {var} doesn't match type of value {val}"
        );
        let block = self.position.expect("def_var with no current block");
        self.ctx.ssa.def_var(var, val, block);
    }

    /// Returns an object with the [`InstBuilder`](anvil_codegen::ir::InstBuilder)
    /// trait that allows to conveniently append an instruction to the
    /// current block being built.
    pub fn ins<'short>(&'short mut self) -> FuncInstBuilder<'short, 'a> {
        let block = self.position.expect("ins() with no current block");
        FuncInstBuilder {
            builder: self,
            block,
        }
    }

    /// Append parameters to the given block corresponding to the function
    /// parameters. This can be used to set up the block parameters for
    /// the entry block.
    pub fn append_block_params_for_function_params(&mut self, block: Block) {
        for ty in self
            .func
            .signature
            .params
            .iter()
            .map(|p| p.value_type)
            .collect::<smallvec::SmallVec<[Type; 8]>>()
        {
            self.func.dfg.append_block_param(block, ty);
        }
    }

    /// The parameters of the given block.
    pub fn block_params(&self, block: Block) -> &[Value] {
        self.func.dfg.block_params(block)
    }

    /// Declare an external function import.
    pub fn import_function(&mut self, data: ExtFuncData) -> FuncRef {
        self.func.import_function(data)
    }

    /// Add a signature which can later be used to declare an external
    /// function import.
    pub fn import_signature(&mut self, signature: Signature) -> SigRef {
        self.func.import_signature(signature)
    }

    /// Creates a jump table in the function.
    pub fn create_jump_table(&mut self, data: JumpTableData) -> JumpTable {
        self.func.create_jump_table(data)
    }

    /// Returns `true` if and only if the current block is sealed and has
    /// no predecessors declared and is not the entry block.
    ///
    /// The entry block of a function is never unreachable.
    pub fn is_unreachable(&self) -> bool {
        let block = match self.position {
            Some(block) => block,
            None => return false,
        };
        let is_entry = self.func.layout.entry_block() == Some(block);
        !is_entry
            && self.ctx.ssa.is_sealed(block)
            && self.ctx.ssa.num_predecessors(block) == 0
    }

    /// Returns `true` if and only if no instructions have been added
    /// since the last call to `switch_to_block`.
    pub fn is_pristine(&self) -> bool {
        match self.position {
            Some(block) => self.func.layout.first_inst(block).is_none(),
            None => true,
        }
    }

    /// Changes the destination of a branch instruction so that it
    /// targets `new_dest` wherever it targeted `old_dest`. The
    /// predecessor records move with it.
    pub fn change_jump_destination(&mut self, inst: Inst, old_dest: Block, new_dest: Block) {
        let pred = self
            .func
            .layout
            .inst_block(inst)
            .expect("branch not inserted");
        self.func
            .dfg
            .change_branch_destination(inst, old_dest, new_dest);
        self.ctx
            .ssa
            .remove_block_predecessor(old_dest, pred, inst);
        self.ctx.ssa.declare_block_predecessor(new_dest, pred, inst);
    }

    /// Declare that translation of the current function is complete.
    ///
    /// This resets the state of the `FunctionBuilderContext` in
    /// preparation for it to be used for another function.
    pub fn finalize(self) {
        self.ctx.clear();
    }
}

/// An instruction builder that inserts at the end of the
/// `FunctionBuilder`'s current block, and records the CFG predecessor
/// edges every branch creates.
pub struct FuncInstBuilder<'short, 'long: 'short> {
    builder: &'short mut FunctionBuilder<'long>,
    block: Block,
}

impl<'short, 'long> InstBuilderBase<'short> for FuncInstBuilder<'short, 'long> {
    fn data_flow_graph(&self) -> &DataFlowGraph {
        &self.builder.func.dfg
    }

    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph {
        &mut self.builder.func.dfg
    }

    fn build(self, data: InstructionData, ctrl_typevar: Type) -> (Inst, &'short mut DataFlowGraph) {
        let inst = self.builder.func.dfg.make_inst(data);
        self.builder.func.dfg.make_inst_results(inst, ctrl_typevar);
        self.builder.func.layout.append_inst(inst, self.block);
        if !self.builder.srcloc.is_default() {
            self.builder.func.srclocs[inst] = self.builder.srcloc;
        }

        // Branches declare their destinations' predecessors.
        if self.builder.func.dfg.inst_data(inst).opcode().is_branch() {
            for dest in self.builder.func.dfg.branch_destinations(inst) {
                self.builder
                    .ctx
                    .ssa
                    .declare_block_predecessor(dest, self.block, inst);
            }
        }

        (inst, &mut self.builder.func.dfg)
    }
}
