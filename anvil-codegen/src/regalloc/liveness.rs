//! Liveness analysis over VCode.

use super::RegAllocError;
use crate::machinst::{BlockIndex, InsnIndex, OperandKind, VCode, VCodeInst, VReg};
use hashbrown::HashSet;
use std::vec::Vec;

/// The result of liveness analysis, plus the block predecessor table and
/// an approximate loop-nesting depth per block.
pub struct Liveness {
    /// Live-in vregs per lowered block.
    pub livein: Vec<HashSet<VReg>>,
    /// Live-out vregs per lowered block.
    pub liveout: Vec<HashSet<VReg>>,
    /// Predecessors per lowered block.
    pub preds: Vec<Vec<BlockIndex>>,
    /// Loop depth per lowered block, from back-edge intervals.
    pub loop_depth: Vec<u32>,
}

/// Compute liveness as a worklist fixed point.
///
/// The live set is walked backwards through each block: defs remove, uses
/// add. Branch block-arguments are uses at the terminator. Block parameters
/// are defs at the block head. A non-empty live-in set at the entry block
/// means some value is used without ever being defined, which is rejected.
pub fn compute<I: VCodeInst>(vcode: &VCode<I>) -> Result<Liveness, RegAllocError> {
    let nblocks = vcode.num_blocks();

    let mut preds: Vec<Vec<BlockIndex>> = vec![Vec::new(); nblocks];
    for b in 0..nblocks as BlockIndex {
        for &s in vcode.block_succs(b) {
            preds[s as usize].push(b);
        }
    }

    let mut livein: Vec<HashSet<VReg>> = vec![HashSet::new(); nblocks];
    let mut liveout: Vec<HashSet<VReg>> = vec![HashSet::new(); nblocks];

    // Process in reverse order first so most of the graph converges on the
    // first pass; iterate to the fixed point.
    let mut worklist: Vec<BlockIndex> = (0..nblocks as BlockIndex).rev().collect();
    let mut on_worklist: Vec<bool> = vec![true; nblocks];

    while let Some(b) = worklist.pop() {
        on_worklist[b as usize] = false;

        let mut live: HashSet<VReg> = HashSet::new();
        for &s in vcode.block_succs(b) {
            for &v in &livein[s as usize] {
                live.insert(v);
            }
        }
        liveout[b as usize] = live.clone();

        // Branch arguments are uses at the end of the block.
        for pos in 0..vcode.block_succs(b).len() {
            for &arg in vcode.branch_args(b, pos) {
                if !arg.is_pinned() {
                    live.insert(arg);
                }
            }
        }

        for iix in vcode.block_insns(b).rev() {
            let operands = vcode.inst_operands(iix as InsnIndex);
            for op in operands {
                if op.kind == OperandKind::Def && !op.vreg.is_pinned() {
                    live.remove(&op.vreg);
                }
            }
            for op in operands {
                if op.kind == OperandKind::Use && !op.vreg.is_pinned() {
                    live.insert(op.vreg);
                }
            }
        }

        // Block parameters are defined at the head of the block.
        for &param in vcode.block_params(b) {
            live.remove(&param);
        }

        if live != livein[b as usize] {
            livein[b as usize] = live;
            for &p in &preds[b as usize] {
                if !on_worklist[p as usize] {
                    on_worklist[p as usize] = true;
                    worklist.push(p);
                }
            }
        }
    }

    if !livein[vcode.entry() as usize].is_empty() {
        log::trace!(
            "entry block live-ins: {:?}",
            livein[vcode.entry() as usize]
        );
        return Err(RegAllocError::EntryLivein);
    }

    // Approximate loop depth: each back edge (b -> h with h <= b in the
    // lowered order) nests the interval [h, b].
    let mut loop_depth = vec![0u32; nblocks];
    for b in 0..nblocks as BlockIndex {
        for &s in vcode.block_succs(b) {
            if s <= b {
                for block in s..=b {
                    loop_depth[block as usize] += 1;
                }
            }
        }
    }

    Ok(Liveness {
        livein,
        liveout,
        preds,
        loop_depth,
    })
}
