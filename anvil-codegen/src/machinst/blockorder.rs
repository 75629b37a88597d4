//! Computation of basic block order in emitted code.
//!
//! The lowered block order is a reverse postorder over the IR control
//! flow graph, with one *critical-edge block* inserted for every edge from
//! a block with more than one successor to a block with more than one
//! predecessor. Critical-edge blocks are where the register allocator
//! places block-parameter moves: with every critical edge split, any edge
//! that carries arguments has either a single-successor source or a
//! single-predecessor destination, so the moves have an unambiguous home.
//!
//! The resulting order is the emission order. Unreachable blocks do not
//! appear.

use crate::ir::{Block, Function};
use crate::machinst::BlockIndex;
use anvil_entity::SecondaryMap;
use smallvec::SmallVec;
use std::vec::Vec;

/// A block in the lowered order: either an IR block, or a critical edge
/// between two of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoweredBlock {
    /// A block that corresponds one-to-one to an IR block.
    Orig {
        /// The original IR block.
        block: Block,
    },
    /// A critical edge between two IR blocks.
    CriticalEdge {
        /// The predecessor (source) IR block.
        pred: Block,
        /// The successor (destination) IR block.
        succ: Block,
        /// The index of this edge in the predecessor's successor list.
        succ_idx: u32,
    },
}

impl LoweredBlock {
    /// The IR block this lowered block is (for `Orig` blocks).
    pub fn orig_block(self) -> Option<Block> {
        match self {
            Self::Orig { block } => Some(block),
            Self::CriticalEdge { .. } => None,
        }
    }
}

/// The lowered block order for a function, plus successor tables over the
/// lowered indices.
pub struct BlockLoweringOrder {
    /// The lowered blocks, in emission order.
    lowered_order: Vec<LoweredBlock>,
    /// Successor lowered-block indices, concatenated; indexed by
    /// `lowered_succ_ranges`.
    lowered_succs: Vec<BlockIndex>,
    /// The range of `lowered_succs` for each lowered block.
    lowered_succ_ranges: Vec<(u32, u32)>,
    /// Mapping from IR block to lowered index, for reachable blocks.
    orig_map: SecondaryMap<Block, Option<BlockIndex>>,
}

impl BlockLoweringOrder {
    /// Compute the lowered block order for `func`.
    pub fn new(func: &Function) -> Self {
        // Gather the IR-level successor lists and predecessor counts.
        let num_blocks = func.dfg.num_blocks();
        let mut succs: SecondaryMap<Block, SmallVec<[Block; 4]>> = SecondaryMap::new();
        let mut pred_count: SecondaryMap<Block, u32> = SecondaryMap::new();
        for block in func.layout.blocks() {
            if let Some(term) = func.layout.last_inst(block) {
                for succ in func.dfg.branch_destinations(term) {
                    succs[block].push(succ);
                    pred_count[succ] += 1;
                }
            }
        }

        // Depth-first postorder from the entry; reversed, this is the RPO
        // of the reachable blocks.
        let entry = func.entry_block().expect("function has no entry block");
        let mut postorder: Vec<Block> = Vec::with_capacity(num_blocks);
        let mut visited: SecondaryMap<Block, bool> = SecondaryMap::new();
        // Stack of (block, next successor index to visit).
        let mut stack: Vec<(Block, usize)> = Vec::new();
        visited[entry] = true;
        stack.push((entry, 0));
        while let Some(&mut (block, ref mut next)) = stack.last_mut() {
            let block_succs = &succs[block];
            if *next < block_succs.len() {
                let succ = block_succs[*next];
                *next += 1;
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
                stack.pop();
            }
        }

        // Lay out the lowered order: each block in RPO, immediately
        // followed by the critical-edge blocks for its out-edges so that
        // one of them can fall through to its target.
        let mut lowered_order: Vec<LoweredBlock> = Vec::new();
        let mut orig_map: SecondaryMap<Block, Option<BlockIndex>> = SecondaryMap::new();
        // Map (pred, succ_idx) -> lowered index of the edge block.
        let mut edge_blocks: Vec<((Block, u32), BlockIndex)> = Vec::new();
        for &block in postorder.iter().rev() {
            orig_map[block] = Some(lowered_order.len() as BlockIndex);
            lowered_order.push(LoweredBlock::Orig { block });
        }
        // Insert edge blocks after all original blocks; their position in
        // the linear order does not affect correctness, only fallthrough
        // quality, and a trailing clump keeps the hot path contiguous.
        for &block in postorder.iter().rev() {
            let block_succs = &succs[block];
            if block_succs.len() > 1 {
                for (i, &succ) in block_succs.iter().enumerate() {
                    if pred_count[succ] > 1 {
                        let index = lowered_order.len() as BlockIndex;
                        lowered_order.push(LoweredBlock::CriticalEdge {
                            pred: block,
                            succ,
                            succ_idx: i as u32,
                        });
                        edge_blocks.push(((block, i as u32), index));
                    }
                }
            }
        }

        // Successor tables over lowered indices.
        let find_edge = |pred: Block, succ_idx: u32| -> Option<BlockIndex> {
            edge_blocks
                .iter()
                .find(|&&(key, _)| key == (pred, succ_idx))
                .map(|&(_, index)| index)
        };
        let mut lowered_succs: Vec<BlockIndex> = Vec::new();
        let mut lowered_succ_ranges: Vec<(u32, u32)> = Vec::with_capacity(lowered_order.len());
        for lb in &lowered_order {
            let start = lowered_succs.len() as u32;
            match *lb {
                LoweredBlock::Orig { block } => {
                    for (i, &succ) in succs[block].iter().enumerate() {
                        match find_edge(block, i as u32) {
                            Some(edge) => lowered_succs.push(edge),
                            None => lowered_succs.push(orig_map[succ].expect("reachable succ")),
                        }
                    }
                }
                LoweredBlock::CriticalEdge { succ, .. } => {
                    lowered_succs.push(orig_map[succ].expect("reachable succ"));
                }
            }
            lowered_succ_ranges.push((start, lowered_succs.len() as u32));
        }

        log::trace!("BlockLoweringOrder: {lowered_order:?}");
        Self {
            lowered_order,
            lowered_succs,
            lowered_succ_ranges,
            orig_map,
        }
    }

    /// Get the lowered order of blocks.
    pub fn lowered_order(&self) -> &[LoweredBlock] {
        &self.lowered_order
    }

    /// Get the successor indices for a lowered block.
    pub fn succ_indices(&self, block: BlockIndex) -> &[BlockIndex] {
        let (start, end) = self.lowered_succ_ranges[block as usize];
        &self.lowered_succs[start as usize..end as usize]
    }

    /// Get the lowered index of an IR block, if it is reachable.
    pub fn lowered_index(&self, block: Block) -> Option<BlockIndex> {
        self.orig_map[block]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FuncCursor;
    use crate::ir::types::I64;
    use crate::ir::{Function, InstBuilder};

    #[test]
    fn linear_order() {
        // entry -> a -> b, no critical edges.
        let mut func = Function::new();
        let e = func.dfg.make_block();
        let a = func.dfg.make_block();
        func.layout.append_block(e);
        func.layout.append_block(a);
        {
            let mut cur = FuncCursor::new(&mut func).at_bottom(e);
            cur.ins().jump(a, &[]);
            cur.goto_bottom(a);
            cur.ins().return_(&[]);
        }
        let order = BlockLoweringOrder::new(&func);
        assert_eq!(order.lowered_order().len(), 2);
        assert_eq!(order.succ_indices(0), &[1]);
        assert_eq!(order.succ_indices(1), &[] as &[BlockIndex]);
    }

    #[test]
    fn critical_edge_is_split() {
        // A diamond with a shared join where one predecessor branches
        // conditionally straight to the join: that edge is critical.
        //
        // entry: brif v0, join, other
        // other: jump join
        // join:  return
        //
        // entry has two successors and join has two predecessors, so the
        // entry->join edge must get an edge block. The other->join edge
        // has a single-successor source and needs none.
        let mut func = Function::new();
        let entry = func.dfg.make_block();
        let other = func.dfg.make_block();
        let join = func.dfg.make_block();
        func.layout.append_block(entry);
        func.layout.append_block(other);
        func.layout.append_block(join);
        {
            let mut cur = FuncCursor::new(&mut func).at_bottom(entry);
            let v0 = cur.ins().iconst(I64, 1);
            cur.ins().brif(v0, join, &[], other, &[]);
            cur.goto_bottom(other);
            cur.ins().jump(join, &[]);
            cur.goto_bottom(join);
            cur.ins().return_(&[]);
        }
        let order = BlockLoweringOrder::new(&func);
        let edges: Vec<_> = order
            .lowered_order()
            .iter()
            .filter(|lb| matches!(lb, LoweredBlock::CriticalEdge { .. }))
            .collect();
        assert_eq!(edges.len(), 1);
        match edges[0] {
            LoweredBlock::CriticalEdge { pred, succ, succ_idx } => {
                assert_eq!(*pred, entry);
                assert_eq!(*succ, join);
                assert_eq!(*succ_idx, 0);
            }
            _ => unreachable!(),
        }
        // The entry's first successor is the edge block, which in turn
        // has the join as its only successor.
        let entry_lowered = order.lowered_index(entry).unwrap();
        let join_lowered = order.lowered_index(join).unwrap();
        let first_succ = order.succ_indices(entry_lowered)[0];
        assert!(matches!(
            order.lowered_order()[first_succ as usize],
            LoweredBlock::CriticalEdge { .. }
        ));
        assert_eq!(order.succ_indices(first_succ), &[join_lowered]);
    }
}
