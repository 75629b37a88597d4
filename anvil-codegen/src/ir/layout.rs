//! Function layout.
//!
//! The order of basic blocks in a function and the order of instructions in
//! a block is determined by the `Layout` data structure defined in this
//! module.

use crate::ir::{Block, Inst};
use anvil_entity::packed_option::PackedOption;
use anvil_entity::SecondaryMap;
use core::cmp;

/// A program point is either a block header or an instruction; the layout
/// assigns every program point a position in a total order over the
/// function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramPoint {
    /// A block header.
    Block(Block),
    /// An instruction.
    Inst(Inst),
}

impl From<Block> for ProgramPoint {
    fn from(block: Block) -> Self {
        Self::Block(block)
    }
}

impl From<Inst> for ProgramPoint {
    fn from(inst: Inst) -> Self {
        Self::Inst(inst)
    }
}

/// The `Layout` struct determines the layout of blocks and instructions in
/// a function. It does not contain definitions of instructions or blocks,
/// but depends on `Inst` and `Block` entity references being defined
/// elsewhere.
///
/// This data structure determines:
///
/// - The order of blocks in the function.
/// - Which block contains a given instruction.
/// - The order of instructions within a block.
///
/// While data dependencies are not recorded, instruction ordering does
/// affect control dependencies, so part of the semantics of the program are
/// determined by the layout.
#[derive(Clone)]
pub struct Layout {
    /// Linked list nodes for the layout order of blocks. Forms a doubly
    /// linked list, terminated in both ends by `None`.
    blocks: SecondaryMap<Block, BlockNode>,

    /// Linked list nodes for the layout order of instructions. Forms a
    /// doubly linked list per block, terminated in both ends by `None`.
    insts: SecondaryMap<Inst, InstNode>,

    /// First block in the layout order, or `None` when no blocks have been
    /// laid out.
    first_block: Option<Block>,

    /// Last block in the layout order, or `None` when no blocks have been
    /// laid out.
    last_block: Option<Block>,
}

#[derive(Clone, Debug, Default)]
struct BlockNode {
    prev: PackedOption<Block>,
    next: PackedOption<Block>,
    first_inst: PackedOption<Inst>,
    last_inst: PackedOption<Inst>,
    seq: SequenceNumber,
}

#[derive(Clone, Debug, Default)]
struct InstNode {
    /// The Block containing this instruction, or `None` when the
    /// instruction is not yet inserted.
    block: PackedOption<Block>,
    prev: PackedOption<Inst>,
    next: PackedOption<Inst>,
    seq: SequenceNumber,
}

/// Sequence numbers.
///
/// Comparing two program points would be O(n) if it had to walk the
/// linked lists, so every block and instruction additionally carries a
/// sequence number that mirrors its layout position. The numbers are
/// assigned with gaps (a stride of [`MAJOR_STRIDE`]) so that an insertion
/// can usually pick a midpoint without disturbing its neighbors; only
/// when a gap is exhausted does a local (and, in the worst case, a whole-
/// function) renumbering run.
///
/// Invariant: block numbers increase in layout order, instruction numbers
/// increase within their block, and an instruction's number lies strictly
/// between its block header's number and the next block's.
type SequenceNumber = u32;

/// The gap left between consecutive program points on a fresh
/// assignment, so most insertions find a free midpoint.
const MAJOR_STRIDE: SequenceNumber = 10;

/// The (smaller) gap used while repairing numbers locally after a
/// midpoint ran out.
const MINOR_STRIDE: SequenceNumber = 2;

/// How far past the insertion point a local repair may cascade before the
/// whole function is renumbered instead.
const LOCAL_LIMIT: SequenceNumber = 100 * MINOR_STRIDE;

/// Compute the midpoint between `a` and `b`.
/// Return `None` if the midpoint would be equal to either.
fn midpoint(a: SequenceNumber, b: SequenceNumber) -> Option<SequenceNumber> {
    debug_assert!(a < b);
    // Avoid integer overflow.
    let m = a + (b - a) / 2;
    if m > a {
        Some(m)
    } else {
        None
    }
}

impl Layout {
    /// Create a new empty `Layout`.
    pub fn new() -> Self {
        Self {
            blocks: SecondaryMap::new(),
            insts: SecondaryMap::new(),
            first_block: None,
            last_block: None,
        }
    }

    /// Clear the layout.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.insts.clear();
        self.first_block = None;
        self.last_block = None;
    }

    /// Compare the program order of two program points.
    ///
    /// This is a total order: any two program points in the layout compare,
    /// and `pp_cmp(a, b)` is the reverse of `pp_cmp(b, a)`.
    pub fn pp_cmp<A, B>(&self, a: A, b: B) -> cmp::Ordering
    where
        A: Into<ProgramPoint>,
        B: Into<ProgramPoint>,
    {
        let a_seq = self.seq(a.into());
        let b_seq = self.seq(b.into());
        a_seq.cmp(&b_seq)
    }
}

// Private methods for dealing with sequence numbers.
impl Layout {
    /// Get the sequence number of a program point that must correspond to
    /// an entity in the layout.
    fn seq(&self, pp: ProgramPoint) -> SequenceNumber {
        match pp {
            ProgramPoint::Block(block) => self.blocks[block].seq,
            ProgramPoint::Inst(inst) => self.insts[inst].seq,
        }
    }

    /// The sequence number of the last program point inside `block`: its
    /// final instruction's, or the header's if the block is empty.
    fn last_block_seq(&self, block: Block) -> SequenceNumber {
        self.blocks[block]
            .last_inst
            .map(|inst| self.insts[inst].seq)
            .unwrap_or(self.blocks[block].seq)
    }

    /// Pick a sequence number for a block that was just linked into the
    /// layout, renumbering neighbors when no free number exists.
    fn assign_block_seq(&mut self, block: Block) {
        debug_assert!(self.is_block_inserted(block));

        // The number must land strictly between the last point of the
        // previous block (or 0 at the front) and whatever follows the
        // new header.
        let prev_seq = self.blocks[block]
            .prev
            .map(|prev_block| self.last_block_seq(prev_block))
            .unwrap_or(0);

        let next_seq = if let Some(inst) = self.blocks[block].first_inst.expand() {
            self.insts[inst].seq
        } else if let Some(next_block) = self.blocks[block].next.expand() {
            self.blocks[next_block].seq
        } else {
            // Appending at the very end: take a full stride of headroom.
            self.blocks[block].seq = prev_seq + MAJOR_STRIDE;
            return;
        };

        if let Some(seq) = midpoint(prev_seq, next_seq) {
            self.blocks[block].seq = seq;
        } else {
            // The gap is used up; cascade fresh numbers forward.
            self.renumber_from_block(block, prev_seq + MINOR_STRIDE, prev_seq + LOCAL_LIMIT);
        }
    }

    /// Pick a sequence number for an instruction that was just linked
    /// into the layout, renumbering neighbors when no free number exists.
    fn assign_inst_seq(&mut self, inst: Inst) {
        let block = self
            .inst_block(inst)
            .expect("inst must be inserted before assigning a seq");

        // The legal window runs from the previous instruction (or the
        // block header) to the next program point.
        let prev_seq = match self.insts[inst].prev.expand() {
            Some(prev_inst) => self.insts[prev_inst].seq,
            None => self.blocks[block].seq,
        };

        let next_seq = if let Some(next_inst) = self.insts[inst].next.expand() {
            self.insts[next_inst].seq
        } else if let Some(next_block) = self.blocks[block].next.expand() {
            self.blocks[next_block].seq
        } else {
            // Appending at the very end: take a full stride of headroom.
            self.insts[inst].seq = prev_seq + MAJOR_STRIDE;
            return;
        };

        if let Some(seq) = midpoint(prev_seq, next_seq) {
            self.insts[inst].seq = seq;
        } else {
            // The gap is used up; cascade fresh numbers forward.
            self.renumber_from_inst(inst, prev_seq + MINOR_STRIDE, prev_seq + LOCAL_LIMIT);
        }
    }

    /// Push fresh sequence numbers (stepping by the minor stride) through
    /// the instructions of one block, starting at `inst`.
    ///
    /// The cascade stops as soon as the next instruction's existing
    /// number is already larger than the one just written — the usual
    /// case after a single insertion — and `None` is returned. If the end
    /// of the block is reached first, the last number written is returned
    /// so the caller can continue into the following block. A cascade
    /// that runs past `limit` gives up on local repair: the whole
    /// function is renumbered and `None` is returned.
    fn renumber_insts(
        &mut self,
        inst: Inst,
        first_seq: SequenceNumber,
        limit: SequenceNumber,
    ) -> Option<SequenceNumber> {
        let mut cursor = inst;
        let mut seq = first_seq;
        loop {
            self.insts[cursor].seq = seq;
            let next = match self.insts[cursor].next.expand() {
                Some(next) => next,
                None => return Some(seq),
            };
            if self.insts[next].seq > seq {
                // The existing numbering takes over from here.
                return None;
            }
            seq += MINOR_STRIDE;
            if seq > limit {
                // The cascade isn't converging; make room everywhere
                // instead.
                self.full_renumber();
                return None;
            }
            cursor = next;
        }
    }

    /// Give `block` the number `first_seq` and cascade through its
    /// instructions and any following blocks until the existing
    /// numbering is larger than the cascade.
    fn renumber_from_block(
        &mut self,
        block: Block,
        first_seq: SequenceNumber,
        limit: SequenceNumber,
    ) {
        let mut cursor = block;
        let mut seq = first_seq;
        loop {
            self.blocks[cursor].seq = seq;
            if let Some(first_inst) = self.blocks[cursor].first_inst.expand() {
                seq = match self.renumber_insts(first_inst, seq + MINOR_STRIDE, limit) {
                    Some(last) => last,
                    // Converged (or fell back to a full renumbering)
                    // inside the block.
                    None => return,
                };
            }
            let next = match self.blocks[cursor].next.expand() {
                Some(next) => next,
                None => return,
            };
            if self.blocks[next].seq > seq {
                return;
            }
            seq += MINOR_STRIDE;
            cursor = next;
        }
    }

    /// Cascade fresh numbers from `inst`, crossing into the next block if
    /// the end of the current one is reached before the numbers converge.
    fn renumber_from_inst(&mut self, inst: Inst, first_seq: SequenceNumber, limit: SequenceNumber) {
        let last = match self.renumber_insts(inst, first_seq, limit) {
            Some(last) => last,
            None => return,
        };
        let block = self.inst_block(inst).unwrap();
        if let Some(next_block) = self.blocks[block].next.expand() {
            self.renumber_from_block(next_block, last + MINOR_STRIDE, limit);
        }
    }

    /// Rewrite every sequence number in the layout, restoring the full
    /// major-stride gap between consecutive program points. Positions are
    /// unchanged; this only buys headroom for future insertions.
    fn full_renumber(&mut self) {
        let mut seq = 0;
        let mut points = 0usize;
        let mut next_block = self.first_block;
        while let Some(block) = next_block {
            self.blocks[block].seq = seq;
            seq += MAJOR_STRIDE;
            points += 1;

            let mut next_inst = self.blocks[block].first_inst.expand();
            while let Some(inst) = next_inst {
                self.insts[inst].seq = seq;
                seq += MAJOR_STRIDE;
                points += 1;
                next_inst = self.insts[inst].next.expand();
            }
            next_block = self.blocks[block].next.expand();
        }
        log::trace!("layout: full renumbering over {points} program points");
    }
}

/// Methods for laying out blocks.
///
/// An unknown block starts out as *not inserted* in the block layout. The
/// layout is a linear order of inserted blocks. Once a block has been
/// inserted in the layout, instructions can be added. A block can only be
/// removed from the layout when it is empty.
///
/// Since every block must end with a terminator instruction which cannot
/// fall through, the layout of blocks does not affect the semantics of the
/// program.
impl Layout {
    /// Is `block` currently part of the layout?
    pub fn is_block_inserted(&self, block: Block) -> bool {
        Some(block) == self.first_block || self.blocks[block].prev.is_some()
    }

    /// Insert `block` as the last block in the layout.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "Cannot append block that is already in the layout"
        );
        {
            let node = &mut self.blocks[block];
            debug_assert!(node.first_inst.is_none() && node.last_inst.is_none());
            node.prev = self.last_block.into();
            node.next = None.into();
        }
        if let Some(last) = self.last_block {
            self.blocks[last].next = block.into();
        } else {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
        self.assign_block_seq(block);
    }

    /// Insert `block` in the layout before the existing block `before`.
    pub fn insert_block(&mut self, block: Block, before: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "Cannot insert block that is already in the layout"
        );
        debug_assert!(
            self.is_block_inserted(before),
            "block insertion point not in the layout"
        );
        let after = self.blocks[before].prev;
        {
            let node = &mut self.blocks[block];
            node.next = before.into();
            node.prev = after;
        }
        self.blocks[before].prev = block.into();
        match after.expand() {
            None => self.first_block = Some(block),
            Some(a) => self.blocks[a].next = block.into(),
        }
        self.assign_block_seq(block);
    }

    /// Insert `block` in the layout *after* the existing block `after`.
    pub fn insert_block_after(&mut self, block: Block, after: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "Cannot insert block that is already in the layout"
        );
        debug_assert!(
            self.is_block_inserted(after),
            "block insertion point not in the layout"
        );
        let before = self.blocks[after].next;
        {
            let node = &mut self.blocks[block];
            node.next = before;
            node.prev = after.into();
        }
        self.blocks[after].next = block.into();
        match before.expand() {
            None => self.last_block = Some(block),
            Some(b) => self.blocks[b].prev = block.into(),
        }
        self.assign_block_seq(block);
    }

    /// Return an iterator over all blocks in layout order.
    pub fn blocks(&self) -> Blocks {
        Blocks {
            layout: self,
            next: self.first_block,
        }
    }

    /// Get the function's entry block: the first block in the layout.
    pub fn entry_block(&self) -> Option<Block> {
        self.first_block
    }

    /// Get the last block in the layout.
    pub fn last_block(&self) -> Option<Block> {
        self.last_block
    }

    /// Get the block following `block` in the layout order.
    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next.expand()
    }

    /// Get the block preceding `block` in the layout order.
    pub fn prev_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].prev.expand()
    }
}

/// Methods for arranging instructions.
impl Layout {
    /// Get the block containing `inst`, or `None` if `inst` is not inserted
    /// in the layout.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts[inst].block.into()
    }

    /// Append `inst` to the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert_eq!(self.inst_block(inst), None);
        debug_assert!(
            self.is_block_inserted(block),
            "Cannot append instructions to block not in layout"
        );
        {
            let block_node = &mut self.blocks[block];
            {
                let inst_node = &mut self.insts[inst];
                inst_node.block = block.into();
                inst_node.prev = block_node.last_inst;
                debug_assert!(inst_node.next.is_none());
            }
            if block_node.first_inst.is_none() {
                block_node.first_inst = inst.into();
            } else {
                self.insts[block_node.last_inst.unwrap()].next = inst.into();
            }
            block_node.last_inst = inst.into();
        }
        self.assign_inst_seq(inst);
    }

    /// Fetch a block's first instruction.
    pub fn first_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].first_inst.into()
    }

    /// Fetch a block's last instruction.
    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last_inst.into()
    }

    /// Fetch the instruction following `inst`.
    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].next.expand()
    }

    /// Fetch the instruction preceding `inst`.
    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].prev.expand()
    }

    /// Insert `inst` before the instruction `before` in the same block.
    pub fn insert_inst(&mut self, inst: Inst, before: Inst) {
        debug_assert_eq!(self.inst_block(inst), None);
        let block = self
            .inst_block(before)
            .expect("Instruction before insertion point not in the layout");
        let after = self.insts[before].prev;
        {
            let inst_node = &mut self.insts[inst];
            inst_node.block = block.into();
            inst_node.next = before.into();
            inst_node.prev = after;
        }
        self.insts[before].prev = inst.into();
        match after.expand() {
            None => self.blocks[block].first_inst = inst.into(),
            Some(a) => self.insts[a].next = inst.into(),
        }
        self.assign_inst_seq(inst);
    }

    /// Remove `inst` from the layout.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.inst_block(inst).expect("Instruction already removed");
        // Clear the `inst` node and extract links.
        let prev;
        let next;
        {
            let n = &mut self.insts[inst];
            prev = n.prev.take();
            next = n.next.take();
            n.block = None.into();
        }
        // Fix up links to `inst`.
        match prev {
            None => self.blocks[block].first_inst = next.into(),
            Some(p) => self.insts[p].next = next.into(),
        }
        match next {
            None => self.blocks[block].last_inst = prev.into(),
            Some(n) => self.insts[n].prev = prev.into(),
        }
    }

    /// Iterate over the instructions in `block` in layout order.
    pub fn block_insts(&self, block: Block) -> Insts {
        Insts {
            layout: self,
            head: self.blocks[block].first_inst.into(),
            tail: self.blocks[block].last_inst.into(),
        }
    }

    /// Split the block containing `before` in two.
    ///
    /// Insert `new_block` after the old block and move `before` and the
    /// following instructions to `new_block`:
    ///
    /// ```text
    /// old_block:
    ///     i1
    ///     i2
    ///     i3 << before
    ///     i4
    /// ```
    ///
    /// becomes:
    ///
    /// ```text
    /// old_block:
    ///     i1
    ///     i2
    /// new_block:
    ///     i3 << before
    ///     i4
    /// ```
    pub fn split_block(&mut self, new_block: Block, before: Inst) {
        let old_block = self
            .inst_block(before)
            .expect("The `before` instruction must be in the layout");
        debug_assert!(!self.is_block_inserted(new_block));

        // Insert new_block after old_block.
        let next_block = self.blocks[old_block].next;
        let last_inst = self.blocks[old_block].last_inst;
        {
            let node = &mut self.blocks[new_block];
            node.prev = old_block.into();
            node.next = next_block;
            node.first_inst = before.into();
            node.last_inst = last_inst;
        }
        self.blocks[old_block].next = new_block.into();

        // Fix backwards link.
        if Some(old_block) == self.last_block {
            self.last_block = Some(new_block);
        } else {
            self.blocks[next_block.unwrap()].prev = new_block.into();
        }

        // Disconnect the instruction links.
        let prev_inst = self.insts[before].prev;
        self.insts[before].prev = None.into();
        self.blocks[old_block].last_inst = prev_inst;
        match prev_inst.expand() {
            None => self.blocks[old_block].first_inst = None.into(),
            Some(pi) => self.insts[pi].next = None.into(),
        }

        // Fix the instruction -> block pointers.
        let mut opt_i = Some(before);
        while let Some(i) = opt_i {
            debug_assert_eq!(self.insts[i].block.expand(), Some(old_block));
            self.insts[i].block = new_block.into();
            opt_i = self.insts[i].next.expand();
        }

        self.assign_block_seq(new_block);
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterate over blocks in layout order. See [`Layout::blocks`].
pub struct Blocks<'f> {
    layout: &'f Layout,
    next: Option<Block>,
}

impl<'f> Iterator for Blocks<'f> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        match self.next {
            Some(block) => {
                self.next = self.layout.next_block(block);
                Some(block)
            }
            None => None,
        }
    }
}

/// Iterate over instructions in a block in layout order. See
/// [`Layout::block_insts`].
pub struct Insts<'f> {
    layout: &'f Layout,
    head: Option<Inst>,
    tail: Option<Inst>,
}

impl<'f> Iterator for Insts<'f> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        let rval = self.head;
        if let Some(inst) = rval {
            if self.head == self.tail {
                self.head = None;
                self.tail = None;
            } else {
                self.head = self.layout.next_inst(inst);
            }
        }
        rval
    }
}

impl<'f> DoubleEndedIterator for Insts<'f> {
    fn next_back(&mut self) -> Option<Inst> {
        let rval = self.tail;
        if let Some(inst) = rval {
            if self.head == self.tail {
                self.head = None;
                self.tail = None;
            } else {
                self.tail = self.layout.prev_inst(inst);
            }
        }
        rval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_entity::EntityRef;
    use std::vec::Vec;

    fn verify(layout: &mut Layout, blocks: &[(Block, &[Inst])]) {
        // Check the full layout by iterating.
        let mut seen: Vec<Block> = Vec::new();
        for block in layout.blocks() {
            seen.push(block);
        }
        let expected: Vec<Block> = blocks.iter().map(|&(b, _)| b).collect();
        assert_eq!(seen, expected);

        for &(block, insts) in blocks {
            let got: Vec<Inst> = layout.block_insts(block).collect();
            assert_eq!(got, insts);
            for &inst in insts {
                assert_eq!(layout.inst_block(inst), Some(block));
            }
        }

        // Program point ordering must be a total order consistent with the
        // enumeration order.
        let mut points: Vec<ProgramPoint> = Vec::new();
        for &(block, insts) in blocks {
            points.push(block.into());
            for &inst in insts {
                points.push(inst.into());
            }
        }
        for (ai, &a) in points.iter().enumerate() {
            for (bi, &b) in points.iter().enumerate() {
                assert_eq!(layout.pp_cmp(a, b), ai.cmp(&bi));
                assert_eq!(layout.pp_cmp(a, b), layout.pp_cmp(b, a).reverse());
            }
        }
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(midpoint(0, 1), None);
        assert_eq!(midpoint(0, 2), Some(1));
        assert_eq!(midpoint(0, 3), Some(1));
        assert_eq!(midpoint(0, 4), Some(2));
        assert_eq!(midpoint(1, 4), Some(2));
        assert_eq!(midpoint(2, 4), Some(3));
        assert_eq!(midpoint(3, 4), None);
    }

    #[test]
    fn insert_block() {
        let mut layout = Layout::new();
        let e0 = Block::new(0);
        let e1 = Block::new(1);
        let e2 = Block::new(2);

        assert!(!layout.is_block_inserted(e0));

        layout.append_block(e1);
        assert!(layout.is_block_inserted(e1));
        assert_eq!(layout.entry_block(), Some(e1));

        layout.insert_block(e2, e1);
        verify(&mut layout, &[(e2, &[]), (e1, &[])]);

        layout.insert_block(e0, e1);
        verify(&mut layout, &[(e2, &[]), (e0, &[]), (e1, &[])]);
    }

    #[test]
    fn insert_block_after() {
        let mut layout = Layout::new();
        let e0 = Block::new(0);
        let e1 = Block::new(1);
        let e2 = Block::new(2);

        layout.append_block(e1);
        layout.insert_block_after(e2, e1);
        verify(&mut layout, &[(e1, &[]), (e2, &[])]);

        layout.insert_block_after(e0, e1);
        verify(&mut layout, &[(e1, &[]), (e0, &[]), (e2, &[])]);
    }

    #[test]
    fn append_inst() {
        let mut layout = Layout::new();
        let e1 = Block::new(1);

        layout.append_block(e1);
        let v: Vec<Inst> = layout.block_insts(e1).collect();
        assert_eq!(v, []);

        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        let i2 = Inst::new(2);

        assert_eq!(layout.inst_block(i0), None);
        assert_eq!(layout.inst_block(i1), None);
        assert_eq!(layout.inst_block(i2), None);

        layout.append_inst(i1, e1);
        assert_eq!(layout.inst_block(i1), Some(e1));
        layout.append_inst(i2, e1);
        verify(&mut layout, &[(e1, &[i1, i2])]);

        // Removing instructions.
        layout.remove_inst(i1);
        verify(&mut layout, &[(e1, &[i2])]);
        assert_eq!(layout.inst_block(i1), None);
    }

    #[test]
    fn insert_inst() {
        let mut layout = Layout::new();
        let e1 = Block::new(1);
        layout.append_block(e1);

        let i1 = Inst::new(1);
        let i2 = Inst::new(2);
        let i3 = Inst::new(3);

        layout.append_inst(i2, e1);
        layout.insert_inst(i1, i2);
        verify(&mut layout, &[(e1, &[i1, i2])]);
        layout.insert_inst(i3, i2);
        verify(&mut layout, &[(e1, &[i1, i3, i2])]);
    }

    #[test]
    fn many_insertions_keep_order() {
        // Repeated insertion at the front forces midpoint exhaustion and
        // renumbering; the order must survive it.
        let mut layout = Layout::new();
        let b = Block::new(0);
        layout.append_block(b);
        let anchor = Inst::new(0);
        layout.append_inst(anchor, b);
        let mut expected = vec![anchor];
        for n in 1..200 {
            let i = Inst::new(n);
            layout.insert_inst(i, expected[0]);
            expected.insert(0, i);
        }
        let got: Vec<Inst> = layout.block_insts(b).collect();
        assert_eq!(got, expected);
        // And pp_cmp still agrees with the list order.
        for w in got.windows(2) {
            assert_eq!(layout.pp_cmp(w[0], w[1]), core::cmp::Ordering::Less);
        }
    }

    #[test]
    fn split_block() {
        let mut layout = Layout::new();
        let e0 = Block::new(0);
        let e1 = Block::new(1);
        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        let i2 = Inst::new(2);

        layout.append_block(e0);
        layout.append_inst(i0, e0);
        layout.append_inst(i1, e0);
        layout.append_inst(i2, e0);

        layout.split_block(e1, i1);
        verify(&mut layout, &[(e0, &[i0]), (e1, &[i1, i2])]);
    }
}
