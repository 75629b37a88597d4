//! Cursor for inserting instructions into a function.
//!
//! A `FuncCursor` tracks a position in a function's layout and inserts
//! instructions at that position. The instruction-building methods of
//! `InstBuilder` are available on the value returned by
//! [`FuncCursor::ins`].

use crate::ir::{
    Block, DataFlowGraph, Function, Inst, InstBuilderBase, InstructionData, SourceLoc, Type,
};

/// The possible positions of a cursor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Not pointing anywhere. No instructions can be inserted.
    Nowhere,
    /// Immediately before the current instruction. New instructions will be
    /// inserted before the current instruction.
    At(Inst),
    /// Before the beginning of a block. New instructions will be prepended
    /// to the block.
    Before(Block),
    /// After the end of a block. New instructions will be appended to the
    /// block.
    After(Block),
}

/// Function cursor.
///
/// A `FuncCursor` holds a mutable reference to a whole `ir::Function` while
/// keeping a position too. The function can be re-borrowed by accessing the
/// public `cur.func` member.
pub struct FuncCursor<'f> {
    pos: CursorPosition,
    srcloc: SourceLoc,

    /// The referenced function.
    pub func: &'f mut Function,
}

impl<'f> FuncCursor<'f> {
    /// Create a new `FuncCursor` pointing nowhere.
    pub fn new(func: &'f mut Function) -> Self {
        Self {
            pos: CursorPosition::Nowhere,
            srcloc: Default::default(),
            func,
        }
    }

    /// Get the current cursor position.
    pub fn position(&self) -> CursorPosition {
        self.pos
    }

    /// Get the source location that will be assigned to new instructions.
    pub fn srcloc(&self) -> SourceLoc {
        self.srcloc
    }

    /// Set the source location that will be assigned to new instructions.
    pub fn set_srcloc(&mut self, srcloc: SourceLoc) {
        self.srcloc = srcloc;
    }

    /// Get the block corresponding to the current position.
    pub fn current_block(&self) -> Option<Block> {
        match self.pos {
            CursorPosition::Nowhere => None,
            CursorPosition::At(inst) => self.func.layout.inst_block(inst),
            CursorPosition::Before(block) | CursorPosition::After(block) => Some(block),
        }
    }

    /// Go to the bottom of `block`, so instructions are appended to the
    /// block.
    pub fn goto_bottom(&mut self, block: Block) {
        self.pos = CursorPosition::After(block);
    }

    /// Go to a specific instruction which must be inserted in the layout.
    /// New instructions will be inserted before `inst`.
    pub fn goto_inst(&mut self, inst: Inst) {
        debug_assert!(self.func.layout.inst_block(inst).is_some());
        self.pos = CursorPosition::At(inst);
    }

    /// Create a cursor positioned at the bottom of `block`.
    pub fn at_bottom(mut self, block: Block) -> Self {
        self.goto_bottom(block);
        self
    }

    /// Insert an instruction at the current position.
    pub fn insert_inst(&mut self, inst: Inst) {
        match self.pos {
            CursorPosition::Nowhere => panic!("attempted insertion at Nowhere"),
            CursorPosition::At(cur) => self.func.layout.insert_inst(inst, cur),
            CursorPosition::Before(block) => match self.func.layout.first_inst(block) {
                Some(first) => self.func.layout.insert_inst(inst, first),
                None => self.func.layout.append_inst(inst, block),
            },
            CursorPosition::After(block) => self.func.layout.append_inst(inst, block),
        }
    }

    /// Return an object that can display `inst` for debugging.
    pub fn display_inst(&self, inst: Inst) -> String {
        let data = self.func.dfg.inst_data(inst);
        format!("{data:?}")
    }

    /// Get an instruction builder inserting at the current position.
    pub fn ins(&mut self) -> FuncInstBuilder<'_, 'f> {
        FuncInstBuilder { cursor: self }
    }
}

/// An instruction builder that inserts at a cursor's current position.
pub struct FuncInstBuilder<'c, 'f: 'c> {
    cursor: &'c mut FuncCursor<'f>,
}

impl<'c, 'f> InstBuilderBase<'c> for FuncInstBuilder<'c, 'f> {
    fn data_flow_graph(&self) -> &DataFlowGraph {
        &self.cursor.func.dfg
    }

    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph {
        &mut self.cursor.func.dfg
    }

    fn build(self, data: InstructionData, ctrl_typevar: Type) -> (Inst, &'c mut DataFlowGraph) {
        let inst = self.cursor.func.dfg.make_inst(data);
        self.cursor.func.dfg.make_inst_results(inst, ctrl_typevar);
        self.cursor.insert_inst(inst);
        if !self.cursor.srcloc.is_default() {
            self.cursor.func.srclocs[inst] = self.cursor.srcloc;
        }
        (inst, &mut self.cursor.func.dfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::I32;
    use crate::ir::InstBuilder;

    #[test]
    fn insert_at_bottom() {
        let mut func = Function::new();
        let block = func.dfg.make_block();
        func.layout.append_block(block);

        let mut cur = FuncCursor::new(&mut func).at_bottom(block);
        let v0 = cur.ins().iconst(I32, 7);
        let v1 = cur.ins().iconst(I32, 8);
        let sum = cur.ins().iadd(v0, v1);
        cur.ins().return_(&[sum]);

        let insts: Vec<Inst> = func.layout.block_insts(block).collect();
        assert_eq!(insts.len(), 4);
        assert_eq!(func.dfg.value_type(sum), I32);
    }
}
