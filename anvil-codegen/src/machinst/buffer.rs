//! In-memory representation of compiled machine code, with labels and
//! fixups to refer to those labels. Handles constant-pool island insertion
//! and veneer insertion for out-of-range branches.
//!
//! # Label use and branch resolution
//!
//! An instruction that refers to a label (a branch, or a load from a
//! constant-pool entry) is emitted with a [`MachLabelFixup`] describing the
//! byte range to patch and the [`MachInstLabelUse`] kind that knows the
//! offset encoding. If the label is already bound, the fixup is applied as
//! soon as it is known; otherwise it is kept in a min-heap keyed by its
//! *deadline*: the last buffer offset at which the encoding can still reach
//! the label (`offset + max_pos_range`, saturating).
//!
//! Before emitting each instruction, the emission driver asks whether an
//! *island* is needed: if the next instruction could push the tail past the
//! earliest deadline, the driver branches over an island into which the
//! buffer emits any deferred constants and a *veneer* for each endangered
//! fixup. A veneer is a short trampoline with a longer-range branch; the
//! original site is patched to target the veneer and the veneer's own fixup
//! (with a much later deadline) replaces the original in the heap.
//!
//! # Branch peephole
//!
//! The buffer tracks the most recently emitted unconditional branches.
//! When a label is bound exactly at the end of such a branch and the branch
//! targets that label, the branch is a jump-to-next-instruction: the bytes
//! are chomped (the buffer is truncated) and any labels bound at the old
//! tail move back to the branch start. This removes the empty-block jumps
//! that lowering of critical edges would otherwise leave behind.

use crate::binemit::{Addend, CodeOffset, MachCallSite, MachReloc, MachSrcLoc, MachTrap, Reloc};
use crate::ir::{ExternalName, SourceLoc, TrapCode};
use crate::machinst::{MachInstEmit, MachInstLabelUse, MachLabel};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::vec::Vec;

/// A fixup to perform on the buffer once code is emitted. Fixups always
/// refer to labels and patch the code based on label offsets. Hence, they
/// are like relocations, but internal to one buffer.
#[derive(Clone, Debug)]
pub struct MachLabelFixup<I: MachInstEmit> {
    /// The label whose offset is to be fixed up.
    label: MachLabel,
    /// The offset to fix up / patch to refer to this label.
    offset: CodeOffset,
    /// The kind of fixup. This is architecture-specific; each architecture
    /// may have, e.g., several kinds of branch instructions, each with a
    /// different offset range, different location of offset in the
    /// instruction word, different semantics, or different veneer
    /// possibilities.
    kind: I::LabelUse,
}

impl<I: MachInstEmit> MachLabelFixup<I> {
    fn deadline(&self) -> CodeOffset {
        self.offset.saturating_add(self.kind.max_pos_range())
    }
}

impl<I: MachInstEmit> PartialEq for MachLabelFixup<I> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline() == other.deadline()
    }
}

impl<I: MachInstEmit> Eq for MachLabelFixup<I> {}

impl<I: MachInstEmit> PartialOrd for MachLabelFixup<I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I: MachInstEmit> Ord for MachLabelFixup<I> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order so that `BinaryHeap` (a max-heap) pops the fixup
        // with the *earliest* deadline first.
        other.deadline().cmp(&self.deadline())
    }
}

/// A constant deferred into an emission island.
#[derive(Clone, Debug)]
struct MachBufferConstant {
    label: MachLabel,
    align: CodeOffset,
    data: SmallVec<[u8; 8]>,
}

/// A branch that is still at the tail of the buffer, tracked to allow
/// chomping of branches to the fall-through address.
#[derive(Clone, Debug)]
struct MachBranch {
    start: CodeOffset,
    end: CodeOffset,
    target: MachLabel,
    /// Labels that were bound exactly at the start of this branch.
    labels_at_this_branch: SmallVec<[MachLabel; 4]>,
}

/// Placeholder offset for labels that are not yet bound.
const UNKNOWN_LABEL_OFFSET: CodeOffset = 0xffff_ffff;
/// Placeholder alias target for labels that are not aliased.
const UNKNOWN_LABEL: u32 = 0xffff_ffff;

/// A buffer of output to be produced, fixed up, and then emitted to a CodeSink
/// in bulk.
///
/// This struct uses `SmallVec`s to support small-ish function bodies without
/// any heap allocation.
pub struct MachBuffer<I: MachInstEmit> {
    /// The buffer contents, as raw bytes.
    data: SmallVec<[u8; 1024]>,
    /// Any relocations referring to this code.
    relocs: SmallVec<[MachReloc; 16]>,
    /// Any trap records referring to this code.
    traps: SmallVec<[MachTrap; 16]>,
    /// Any call site records referring to this code.
    call_sites: SmallVec<[MachCallSite; 16]>,
    /// Any source location mappings referring to this code.
    srclocs: SmallVec<[MachSrcLoc; 64]>,
    /// The current source location in progress (after `start_srcloc()` and
    /// before `end_srcloc()`).
    cur_srcloc: Option<(CodeOffset, SourceLoc)>,
    /// Known label offsets; `UNKNOWN_LABEL_OFFSET` if unknown.
    label_offsets: SmallVec<[CodeOffset; 16]>,
    /// Label aliases: when one label points to an unconditional jump, and
    /// that jump points to another label, we can redirect references to the
    /// first label immediately to the second. Label index, or
    /// `UNKNOWN_LABEL` when not aliased.
    label_aliases: SmallVec<[u32; 16]>,
    /// Fixups that haven't yet been promoted into the deadline heap.
    ///
    /// Fixups are collected here first because the branch peephole may
    /// still truncate the range they live in; they are promoted when an
    /// island is considered.
    pending_fixups: SmallVec<[MachLabelFixup<I>; 16]>,
    /// The minimum deadline among `pending_fixups`.
    pending_fixup_deadline: CodeOffset,
    /// Fixups whose region is final, ordered by deadline.
    fixup_records: BinaryHeap<MachLabelFixup<I>>,
    /// Constants deferred to the next island.
    pending_constants: SmallVec<[MachBufferConstant; 4]>,
    /// Total size of all pending constants, including alignment slop.
    pending_constants_size: CodeOffset,
    /// Latest branches, to facilitate in-place editing.
    latest_branches: SmallVec<[MachBranch; 4]>,
    /// All labels bound at the current tail offset.
    labels_at_tail: SmallVec<[MachLabel; 4]>,
    /// The offset for which `labels_at_tail` is valid.
    labels_at_tail_off: CodeOffset,
}

impl<I: MachInstEmit> Default for MachBuffer<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MachInstEmit> MachBuffer<I> {
    /// Create a new section, known to start at `start_offset` and with a
    /// size limited to 32 bits.
    pub fn new() -> Self {
        Self {
            data: SmallVec::new(),
            relocs: SmallVec::new(),
            traps: SmallVec::new(),
            call_sites: SmallVec::new(),
            srclocs: SmallVec::new(),
            cur_srcloc: None,
            label_offsets: SmallVec::new(),
            label_aliases: SmallVec::new(),
            pending_fixups: SmallVec::new(),
            pending_fixup_deadline: UNKNOWN_LABEL_OFFSET,
            fixup_records: BinaryHeap::new(),
            pending_constants: SmallVec::new(),
            pending_constants_size: 0,
            latest_branches: SmallVec::new(),
            labels_at_tail: SmallVec::new(),
            labels_at_tail_off: 0,
        }
    }

    /// Current offset from start of buffer.
    pub fn cur_offset(&self) -> CodeOffset {
        self.data.len() as CodeOffset
    }

    /// Add a byte.
    pub fn put1(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Add 2 bytes.
    pub fn put2(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Add 4 bytes.
    pub fn put4(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Add 8 bytes.
    pub fn put8(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Add a slice of bytes.
    pub fn put_data(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Align up to the given alignment, padding with zero bytes.
    pub fn align_to(&mut self, align_to: CodeOffset) {
        debug_assert!(align_to.is_power_of_two());
        while self.cur_offset() & (align_to - 1) != 0 {
            self.put1(0);
        }
    }

    /// Reserve a new label, initially unbound.
    pub fn get_label(&mut self) -> MachLabel {
        let l = self.label_offsets.len() as u32;
        self.label_offsets.push(UNKNOWN_LABEL_OFFSET);
        self.label_aliases.push(UNKNOWN_LABEL);
        MachLabel::from_u32(l)
    }

    /// Reserve the first N label numbers for block labels: label `n` for
    /// block index `n`.
    pub fn reserve_labels_for_blocks(&mut self, blocks: usize) {
        debug_assert!(self.label_offsets.is_empty());
        self.label_offsets
            .resize(blocks, UNKNOWN_LABEL_OFFSET);
        self.label_aliases.resize(blocks, UNKNOWN_LABEL);
    }

    /// Resolve a label through its alias chain.
    fn resolve_label_alias(&self, mut label: MachLabel) -> MachLabel {
        // Chains are kept short by writing through on creation; bound on
        // the number of labels nonetheless.
        for _ in 0..=self.label_aliases.len() {
            let alias = self.label_aliases[label.as_u32() as usize];
            if alias == UNKNOWN_LABEL {
                return label;
            }
            label = MachLabel::from_u32(alias);
        }
        panic!("label alias loop");
    }

    /// Get the resolved offset of a label, or `UNKNOWN_LABEL_OFFSET`.
    fn resolve_label_offset(&self, label: MachLabel) -> CodeOffset {
        let label = self.resolve_label_alias(label);
        self.label_offsets[label.as_u32() as usize]
    }

    /// Is the given label bound to an offset yet?
    pub fn label_bound(&self, label: MachLabel) -> bool {
        self.resolve_label_offset(label) != UNKNOWN_LABEL_OFFSET
    }

    /// Bind a label to the current offset.
    pub fn bind_label(&mut self, label: MachLabel) {
        log::trace!(
            "MachBuffer: bind label {:?} at offset {}",
            label,
            self.cur_offset()
        );
        debug_assert_eq!(
            self.label_offsets[label.as_u32() as usize],
            UNKNOWN_LABEL_OFFSET,
            "label bound twice"
        );
        let offset = self.cur_offset();
        self.label_offsets[label.as_u32() as usize] = offset;
        if self.labels_at_tail_off != offset {
            self.labels_at_tail.clear();
            self.labels_at_tail_off = offset;
        }
        self.labels_at_tail.push(label);
        self.optimize_branches();
    }

    /// Chomp any unconditional branches to the next instruction.
    fn optimize_branches(&mut self) {
        loop {
            let b = match self.latest_branches.last() {
                Some(b) => b.clone(),
                None => return,
            };
            if b.end != self.cur_offset() {
                return;
            }
            // The branch must target a label that resolves to the offset
            // just past the branch; then it is a branch to the next
            // instruction and can be removed.
            let target_off = self.resolve_label_offset(b.target);
            if target_off != b.end {
                return;
            }
            log::trace!(
                "MachBuffer: chomping branch at {}..{} to fall-through",
                b.start,
                b.end
            );
            // Truncate the buffer.
            self.data.truncate(b.start as usize);
            // Labels bound at the old tail move back to the branch start,
            // joining any labels that were bound at the branch itself.
            for &l in &self.labels_at_tail {
                self.label_offsets[l.as_u32() as usize] = b.start;
            }
            for &l in &b.labels_at_this_branch {
                self.labels_at_tail.push(l);
            }
            self.labels_at_tail_off = b.start;
            // Drop any fixups in the truncated region (the branch's own).
            self.pending_fixups.retain(|f| f.offset < b.start);
            self.latest_branches.pop();
        }
    }

    /// Inform the buffer of an unconditional branch just emitted at
    /// `[start, end)` targeting `target`, enabling the fall-through
    /// peephole. ISA emission code calls this immediately after emitting an
    /// unconditional jump.
    pub fn add_uncond_branch(&mut self, start: CodeOffset, end: CodeOffset, target: MachLabel) {
        debug_assert_eq!(end, self.cur_offset());
        let labels_at_this_branch = if self.labels_at_tail_off == start {
            self.labels_at_tail.clone()
        } else {
            SmallVec::new()
        };
        self.latest_branches.push(MachBranch {
            start,
            end,
            target,
            labels_at_this_branch,
        });
    }

    /// Use the given label at the given offset in the buffer, with the
    /// given branch-encoding kind. If the label is already bound and in
    /// range, the patch is applied immediately; otherwise a fixup record is
    /// queued.
    pub fn use_label_at_offset(&mut self, offset: CodeOffset, label: MachLabel, kind: I::LabelUse) {
        let fixup = MachLabelFixup {
            label,
            offset,
            kind,
        };
        // Attempt an eager resolution for backward references; forward
        // references always queue.
        let label_off = self.resolve_label_offset(label);
        if label_off != UNKNOWN_LABEL_OFFSET && label_off <= offset {
            let range = offset - label_off;
            if range <= kind.max_neg_range() {
                kind.patch(&mut self.data, offset, label_off);
                return;
            }
        }
        self.pending_fixup_deadline = self.pending_fixup_deadline.min(fixup.deadline());
        self.pending_fixups.push(fixup);
    }

    /// Defer a constant into the next emission island, returning the label
    /// that will address it.
    pub fn defer_constant(&mut self, data: &[u8], align: CodeOffset) -> MachLabel {
        let label = self.get_label();
        self.pending_constants_size += data.len() as CodeOffset + align;
        self.pending_constants.push(MachBufferConstant {
            label,
            align,
            data: SmallVec::from_slice(data),
        });
        label
    }

    /// The earliest deadline among all live fixups.
    fn earliest_deadline(&self) -> CodeOffset {
        let heap_deadline = self
            .fixup_records
            .peek()
            .map(|f| f.deadline())
            .unwrap_or(UNKNOWN_LABEL_OFFSET);
        heap_deadline.min(self.pending_fixup_deadline)
    }

    /// Is an island needed within the next `distance` bytes?
    pub fn island_needed(&self, distance: CodeOffset) -> bool {
        let budget = self
            .cur_offset()
            .saturating_add(distance)
            .saturating_add(I::LabelUse::worst_case_veneer_size())
            .saturating_add(self.pending_constants_size);
        budget >= self.earliest_deadline()
    }

    /// Emit an island: deferred constants and veneers for endangered
    /// fixups. The caller must have branched over the island (or know that
    /// control cannot reach it).
    pub fn emit_island(&mut self, forced_threshold: CodeOffset) {
        log::trace!(
            "MachBuffer: emitting island at offset {}",
            self.cur_offset()
        );
        // The branch peephole must not reach across an island.
        self.latest_branches.clear();

        // Emit the deferred constants.
        let constants = core::mem::take(&mut self.pending_constants);
        self.pending_constants_size = 0;
        for c in constants {
            self.align_to(c.align);
            // Note: bind directly; the label cannot have been bound before.
            self.label_offsets[c.label.as_u32() as usize] = self.cur_offset();
            self.data.extend_from_slice(&c.data);
        }

        // Promote pending fixups into the deadline heap.
        for f in core::mem::take(&mut self.pending_fixups) {
            self.fixup_records.push(f);
        }
        self.pending_fixup_deadline = UNKNOWN_LABEL_OFFSET;

        // Process every fixup that could expire before the next island
        // opportunity.
        let threshold = self
            .cur_offset()
            .saturating_add(forced_threshold)
            .saturating_add(I::LabelUse::worst_case_veneer_size());
        let mut keep: Vec<MachLabelFixup<I>> = Vec::new();
        while let Some(fixup) = self.fixup_records.peek() {
            if fixup.deadline() > threshold {
                break;
            }
            let fixup = self.fixup_records.pop().unwrap();
            self.finish_or_veneer_fixup(fixup, &mut keep);
        }
        for f in keep {
            self.fixup_records.push(f);
        }
    }

    /// Resolve one fixup: patch it if its label is bound, otherwise emit a
    /// veneer for it.
    fn finish_or_veneer_fixup(
        &mut self,
        fixup: MachLabelFixup<I>,
        keep: &mut Vec<MachLabelFixup<I>>,
    ) {
        let label_off = self.resolve_label_offset(fixup.label);
        if label_off != UNKNOWN_LABEL_OFFSET {
            // Bound label: patch directly. The deadline discipline
            // guarantees the offset is in range.
            self.checked_patch(&fixup, label_off);
            return;
        }

        // Unbound label: emit a veneer that this fixup can reach, and
        // queue a longer-range fixup at the veneer.
        assert!(
            fixup.kind.supports_veneer(),
            "branch fixup at {} expired with no veneer support",
            fixup.offset
        );
        self.align_to(I::LabelUse::ALIGN);
        let veneer_offset = self.cur_offset();
        let size = fixup.kind.veneer_size() as usize;
        self.data.resize(self.data.len() + size, 0);
        let (veneer_fixup_off, veneer_label_use) = fixup
            .kind
            .generate_veneer(&mut self.data[veneer_offset as usize..], veneer_offset);
        // Point the original use at the veneer.
        self.checked_patch(&fixup, veneer_offset);
        keep.push(MachLabelFixup {
            label: fixup.label,
            offset: veneer_fixup_off,
            kind: veneer_label_use,
        });
    }

    /// Patch `fixup` to refer to `label_off`, checking the range.
    fn checked_patch(&mut self, fixup: &MachLabelFixup<I>, label_off: CodeOffset) {
        if label_off >= fixup.offset {
            assert!(
                (label_off - fixup.offset) <= fixup.kind.max_pos_range(),
                "forward label reference at {} out of range for {:?}",
                fixup.offset,
                fixup.kind,
            );
        } else {
            assert!(
                (fixup.offset - label_off) <= fixup.kind.max_neg_range(),
                "backward label reference at {} out of range for {:?}",
                fixup.offset,
                fixup.kind,
            );
        }
        fixup.kind.patch(&mut self.data, fixup.offset, label_off);
    }

    /// Finish any deferred emissions and/or fixups and seal the buffer.
    pub fn finish(mut self) -> MachBufferFinalized {
        // Ensure that all labels have been bound by emission; emit any
        // remaining constants, then drain the fixup heap.
        let mut rounds = 0;
        while !self.pending_constants.is_empty()
            || !self.pending_fixups.is_empty()
            || !self.fixup_records.is_empty()
        {
            // At finish time the only unbound labels are constants, which
            // `emit_island` binds. Every branch fixup then resolves; more
            // than a couple of rounds means a label was never bound.
            assert!(rounds < 4, "unbound label at finish");
            self.emit_island(UNKNOWN_LABEL_OFFSET);
            rounds += 1;
        }
        debug_assert!(self.cur_srcloc.is_none(), "unterminated srcloc range");
        MachBufferFinalized {
            data: self.data,
            relocs: self.relocs,
            traps: self.traps,
            call_sites: self.call_sites,
            srclocs: self.srclocs,
        }
    }

    /// Add an external relocation at the current offset.
    pub fn add_reloc(&mut self, kind: Reloc, name: &ExternalName, addend: Addend) {
        self.relocs.push(MachReloc {
            offset: self.cur_offset(),
            kind,
            name: name.clone(),
            addend,
        });
    }

    /// Add a trap record at the current offset.
    pub fn add_trap(&mut self, code: TrapCode) {
        self.traps.push(MachTrap {
            offset: self.cur_offset(),
            code,
        });
    }

    /// Add a call-site record: the current offset is the return address of
    /// a call just emitted.
    pub fn add_call_site(&mut self) {
        self.call_sites.push(MachCallSite {
            ret_addr: self.cur_offset(),
        });
    }

    /// Set the current source location, beginning a mapped range.
    pub fn start_srcloc(&mut self, loc: SourceLoc) {
        debug_assert!(self.cur_srcloc.is_none());
        self.cur_srcloc = Some((self.cur_offset(), loc));
    }

    /// End the current source location's mapped range.
    pub fn end_srcloc(&mut self) {
        let (start, loc) = self
            .cur_srcloc
            .take()
            .expect("end_srcloc() before start_srcloc()");
        // The range may have been truncated by the branch peephole.
        let start = start.min(self.cur_offset());
        let end = self.cur_offset();
        if start != end {
            self.srclocs.push(MachSrcLoc {
                start,
                end,
                loc,
            });
        }
    }

    /// Current contents of the buffer, for tests and for veneer
    /// generation.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A `MachBuffer` once emission is completed: holds generated code and
/// records of relocations, trap sites, call sites, and source locations. No
/// further fixups are possible.
#[derive(Clone, Debug, Default)]
pub struct MachBufferFinalized {
    /// The buffer contents, as raw bytes.
    data: SmallVec<[u8; 1024]>,
    /// Any relocations referring to this code.
    relocs: SmallVec<[MachReloc; 16]>,
    /// Any trap records referring to this code.
    traps: SmallVec<[MachTrap; 16]>,
    /// Any call site records referring to this code.
    call_sites: SmallVec<[MachCallSite; 16]>,
    /// Any source location mappings referring to this code.
    srclocs: SmallVec<[MachSrcLoc; 64]>,
}

impl MachBufferFinalized {
    /// Get the total required size for the code.
    pub fn total_size(&self) -> CodeOffset {
        self.data.len() as CodeOffset
    }

    /// Get the code bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the list of external relocations for this code.
    pub fn relocs(&self) -> &[MachReloc] {
        &self.relocs
    }

    /// Get the list of trap records for this code.
    pub fn traps(&self) -> &[MachTrap] {
        &self.traps
    }

    /// Get the list of call sites for this code.
    pub fn call_sites(&self) -> &[MachCallSite] {
        &self.call_sites
    }

    /// Get the source location mappings for this code, sorted by code
    /// offset.
    pub fn get_srclocs_sorted(&self) -> Vec<MachSrcLoc> {
        let mut srclocs: Vec<MachSrcLoc> = self.srclocs.iter().cloned().collect();
        srclocs.sort_by_key(|s| s.start);
        srclocs
    }
}
