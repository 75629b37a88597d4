//! Jump table representation.
//!
//! Jump tables are declared in the preamble and assigned an `ir::JumpTable`
//! reference. The actual table of destinations is stored in a
//! `JumpTableData` struct defined in this module.

use crate::ir::instructions::{BlockCall, ValueListPool};
use core::slice;
use std::vec::Vec;

/// Contents of a jump table.
///
/// All jump tables use 0-based indexing and are densely populated. The
/// default destination is used when the index is out of bounds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JumpTableData {
    /// Default block, when the index is out of bounds.
    def: BlockCall,
    /// Table of destination blocks.
    table: Vec<BlockCall>,
}

impl JumpTableData {
    /// Create a new jump table with the provided default and case blocks.
    pub fn new(def: BlockCall, table: &[BlockCall]) -> Self {
        Self {
            def,
            table: table.to_vec(),
        }
    }

    /// Fetch the default block for this jump table.
    pub fn default_block(&self) -> &BlockCall {
        &self.def
    }

    /// Mutable access to the default block of this jump table.
    pub fn default_block_mut(&mut self) -> &mut BlockCall {
        &mut self.def
    }

    /// The jump table and default block as a single slice. The default
    /// block is always first.
    pub fn all_branches(&self) -> AllBranches {
        AllBranches {
            def: Some(&self.def),
            rest: self.table.iter(),
        }
    }

    /// Access the jump table's case blocks.
    pub fn as_slice(&self) -> &[BlockCall] {
        self.table.as_slice()
    }

    /// Access the jump table's case blocks, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [BlockCall] {
        self.table.as_mut_slice()
    }

    /// Returns the number of case blocks in this jump table, excluding the
    /// default.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true when there are no case blocks.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Create a deep clone of this jump table, not aliasing any argument
    /// lists of the original.
    pub fn deep_clone(&self, pool: &mut ValueListPool) -> Self {
        Self {
            def: self.def.deep_clone(pool),
            table: self.table.iter().map(|b| b.deep_clone(pool)).collect(),
        }
    }
}

/// Iterator over all branches of a jump table, default first.
pub struct AllBranches<'a> {
    def: Option<&'a BlockCall>,
    rest: slice::Iter<'a, BlockCall>,
}

impl<'a> Iterator for AllBranches<'a> {
    type Item = &'a BlockCall;

    fn next(&mut self) -> Option<Self::Item> {
        self.def.take().or_else(|| self.rest.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::ValueListPool;
    use crate::ir::Block;
    use anvil_entity::EntityRef;

    #[test]
    fn all_branches_order() {
        let pool = &mut ValueListPool::new();
        let def = BlockCall::new(Block::new(0), &[], pool);
        let c1 = BlockCall::new(Block::new(1), &[], pool);
        let c2 = BlockCall::new(Block::new(2), &[], pool);
        let jt = JumpTableData::new(def, &[c1, c2]);
        let blocks: Vec<Block> = jt.all_branches().map(|c| c.block(pool)).collect();
        assert_eq!(
            blocks,
            vec![Block::new(0), Block::new(1), Block::new(2)]
        );
        assert_eq!(jt.len(), 2);
    }
}
