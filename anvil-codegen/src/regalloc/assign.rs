//! Bundle assignment, eviction, splitting, spilling, and move insertion.

use super::bundle::{
    bundle_requirement, BundleIx, Ctx, LiveBundle, LiveRange, ProgPoint, Requirement,
};
use super::liveness::Liveness;
use super::{Edit, EditPoint, EditPos, MachineEnv, Output, RegAllocError};
use crate::machinst::{
    BlockIndex, InsnIndex, OperandConstraint, OperandKind, PReg, Reg, RegClass, SpillSlot, VCode,
    VCodeInst, VReg,
};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::collections::BinaryHeap;
use std::vec::Vec;

/// An allocation: either a physical register or a spill slot (in 8-byte
/// units).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Alloc {
    Reg(PReg),
    Slot(u32),
}

impl Alloc {
    fn as_reg(self) -> Reg {
        match self {
            Alloc::Reg(p) => Reg::from_real(p),
            Alloc::Slot(s) => Reg::from_spillslot(SpillSlot::new(s as usize)),
        }
    }
}

/// Priority-queue entry: bundles with the highest spill weight are
/// allocated first. `f32::to_bits` is monotonic for non-negative floats,
/// so the bit pattern works as an ordering key.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    weight_bits: u32,
    bundle: BundleIx,
}

struct Assignments {
    /// Chosen allocation per bundle.
    bundle_alloc: Vec<Option<Alloc>>,
    /// Occupied intervals per preg index: (from, to, bundle).
    preg_ranges: HashMap<usize, Vec<(ProgPoint, ProgPoint, BundleIx)>>,
    /// Next free spill slot, in 8-byte units.
    next_slot: u32,
}

impl Assignments {
    fn slot_for_class(&mut self, class: RegClass) -> u32 {
        let slot = self.next_slot;
        self.next_slot += match class {
            RegClass::Int | RegClass::Float => 1,
            RegClass::Vector => 2,
        };
        slot
    }
}

/// Run assignment and move insertion. See the module doc for the overall
/// shape of the algorithm.
pub fn run<I: VCodeInst>(
    vcode: &VCode<I>,
    env: &MachineEnv,
    liveness: &Liveness,
    mut ctx: Ctx,
) -> Result<Output, RegAllocError> {
    // Slots named by FixedStack constraints are reserved up front, so
    // ordinary spills never collide with ABI-pinned storage.
    let mut reserved_slots = 0u32;
    for r in &ctx.ranges {
        for u in &r.uses {
            if let OperandConstraint::FixedStack(slot) = u.constraint {
                reserved_slots = reserved_slots.max(slot.index() as u32 + 1);
            }
        }
    }

    let mut state = Assignments {
        bundle_alloc: vec![None; ctx.bundles.len()],
        preg_ranges: HashMap::new(),
        next_slot: reserved_slots,
    };

    let mut queue: BinaryHeap<QueueEntry> = BinaryHeap::new();
    for (b, bundle) in ctx.bundles.iter().enumerate() {
        if !bundle.ranges.is_empty() {
            queue.push(QueueEntry {
                weight_bits: bundle.weight.to_bits(),
                bundle: b,
            });
        }
    }

    while let Some(entry) = queue.pop() {
        let b = entry.bundle;
        if ctx.bundles[b].ranges.is_empty() || state.bundle_alloc[b].is_some() {
            continue;
        }
        // A requeued bundle may have a stale weight entry; skip those.
        if entry.weight_bits != ctx.bundles[b].weight.to_bits() {
            continue;
        }

        let req = match bundle_requirement(&ctx, b) {
            Ok(req) => req,
            Err(conflict_at) => {
                // Internal requirement conflict (e.g. two different fixed
                // registers): recoverable by splitting at the conflict.
                split_bundle(&mut ctx, &mut state, &mut queue, b, Some(conflict_at));
                continue;
            }
        };

        match try_allocate(&mut ctx, &mut state, env, b, req) {
            AllocResult::Assigned => {}
            AllocResult::Evicted(evicted) => {
                for e in evicted {
                    queue.push(QueueEntry {
                        weight_bits: ctx.bundles[e].weight.to_bits(),
                        bundle: e,
                    });
                }
            }
            AllocResult::NoRegister => {
                if ctx.bundles[b].minimal {
                    // A minimal bundle could not obtain a register even
                    // with eviction; the constraint set is unsatisfiable.
                    return Err(RegAllocError::TooManyLiveRegs);
                }
                split_bundle(&mut ctx, &mut state, &mut queue, b, None);
            }
        }
    }

    // Resolve multi-fixed-register fixups and build the final per-operand
    // allocation table and move list.
    finish(vcode, env, liveness, &ctx, &mut state)
}

enum AllocResult {
    Assigned,
    Evicted(SmallVec<[BundleIx; 4]>),
    NoRegister,
}

/// Try to put bundle `b` into a register satisfying `req`, evicting
/// lighter bundles if necessary.
fn try_allocate(
    ctx: &mut Ctx,
    state: &mut Assignments,
    env: &MachineEnv,
    b: BundleIx,
    req: Requirement,
) -> AllocResult {
    let class = ctx.spillsets[ctx.bundles[b].spillset].class;

    if let Requirement::FixedStack(slot) = req {
        // ABI-pinned storage: the bundle lives exactly there, and any
        // other pieces of the same value spill to the same slot.
        let spillset = ctx.bundles[b].spillset;
        if ctx.spillsets[spillset].slot.is_none() {
            ctx.spillsets[spillset].slot = Some(slot.index());
        }
        state.bundle_alloc[b] = Some(Alloc::Slot(slot.index() as u32));
        return AllocResult::Assigned;
    }

    if req == Requirement::Stack {
        let spillset = ctx.bundles[b].spillset;
        let slot = spill_slot(ctx, state, spillset);
        state.bundle_alloc[b] = Some(Alloc::Slot(slot));
        return AllocResult::Assigned;
    }

    let candidates: SmallVec<[PReg; 16]> = match req {
        Requirement::FixedReg(p) => smallvec::smallvec![p],
        Requirement::Limit(n) => env
            .regs_of_class(class)
            .filter(|p| (p.hw_enc() as u32) < n)
            .collect(),
        _ => env.regs_of_class(class).collect(),
    };

    let mut best_evict: Option<(PReg, SmallVec<[BundleIx; 4]>, f32)> = None;
    for &p in &candidates {
        // Non-evictable busy intervals (clobbers, fixed constraints of
        // other instructions).
        if let Some(busy) = ctx.preg_busy.get(&p.index()) {
            if ranges_conflict_busy(ctx, b, busy) {
                continue;
            }
        }
        match conflicting_bundles(ctx, state, b, p) {
            None => {
                assign_to_preg(ctx, state, b, p);
                return AllocResult::Assigned;
            }
            Some(conflicts) => {
                let max_weight = conflicts
                    .iter()
                    .map(|&c| ctx.bundles[c].weight)
                    .fold(0.0f32, f32::max);
                if max_weight < ctx.bundles[b].weight
                    && best_evict
                        .as_ref()
                        .map(|&(_, _, w)| max_weight < w)
                        .unwrap_or(true)
                {
                    best_evict = Some((p, conflicts, max_weight));
                }
            }
        }
    }

    if let Some((p, conflicts, _)) = best_evict {
        for &c in &conflicts {
            evict(state, c, p);
        }
        assign_to_preg(ctx, state, b, p);
        return AllocResult::Evicted(conflicts);
    }

    // A bundle whose uses are all `Any` can go straight to the stack.
    if req == Requirement::Any {
        let spillset = ctx.bundles[b].spillset;
        let slot = spill_slot(ctx, state, spillset);
        state.bundle_alloc[b] = Some(Alloc::Slot(slot));
        return AllocResult::Assigned;
    }

    AllocResult::NoRegister
}

/// The spill slot for a spill set, assigned lazily and shared by every
/// bundle split from the same original value.
fn spill_slot(ctx: &mut Ctx, state: &mut Assignments, spillset: super::bundle::SpillSetIx) -> u32 {
    if let Some(slot) = ctx.spillsets[spillset].slot {
        return slot as u32;
    }
    let class = ctx.spillsets[spillset].class;
    let slot = state.slot_for_class(class);
    ctx.spillsets[spillset].slot = Some(slot as usize);
    slot
}

fn ranges_conflict_busy(ctx: &Ctx, b: BundleIx, busy: &[(ProgPoint, ProgPoint)]) -> bool {
    for &rix in &ctx.bundles[b].ranges {
        let r = &ctx.ranges[rix];
        for &(from, to) in busy {
            if r.from < to && from < r.to {
                return true;
            }
        }
    }
    false
}

/// Find the set of bundles already occupying `p` that overlap `b`'s
/// ranges; `None` means no conflict.
fn conflicting_bundles(
    ctx: &Ctx,
    state: &Assignments,
    b: BundleIx,
    p: PReg,
) -> Option<SmallVec<[BundleIx; 4]>> {
    let occupied = match state.preg_ranges.get(&p.index()) {
        Some(v) => v,
        None => return None,
    };
    let mut conflicts: SmallVec<[BundleIx; 4]> = SmallVec::new();
    for &rix in &ctx.bundles[b].ranges {
        let r = &ctx.ranges[rix];
        for &(from, to, owner) in occupied {
            if r.from < to && from < r.to && !conflicts.contains(&owner) {
                conflicts.push(owner);
            }
        }
    }
    if conflicts.is_empty() {
        None
    } else {
        Some(conflicts)
    }
}

fn assign_to_preg(ctx: &Ctx, state: &mut Assignments, b: BundleIx, p: PReg) {
    state.bundle_alloc[b] = Some(Alloc::Reg(p));
    let entry = state.preg_ranges.entry(p.index()).or_default();
    for &rix in &ctx.bundles[b].ranges {
        let r = &ctx.ranges[rix];
        entry.push((r.from, r.to, b));
    }
    log::trace!("regalloc: bundle {b} -> {p:?}");
}

fn evict(state: &mut Assignments, b: BundleIx, p: PReg) {
    log::trace!("regalloc: evicting bundle {b} from {p:?}");
    state.bundle_alloc[b] = None;
    if let Some(ranges) = state.preg_ranges.get_mut(&p.index()) {
        ranges.retain(|&(_, _, owner)| owner != b);
    }
}

/// Split `b` and requeue the pieces. With a known conflict point, split
/// there; otherwise split between the first two uses, or shrink to a
/// minimal bundle around the single remaining use with the connector
/// ranges spilled.
fn split_bundle(
    ctx: &mut Ctx,
    state: &mut Assignments,
    queue: &mut BinaryHeap<QueueEntry>,
    b: BundleIx,
    conflict_at: Option<ProgPoint>,
) {
    // Gather the use points.
    let mut use_points: SmallVec<[ProgPoint; 8]> = SmallVec::new();
    for &rix in &ctx.bundles[b].ranges {
        for u in &ctx.ranges[rix].uses {
            let inst_start = ProgPoint::early(u.point.inst());
            if use_points.last() != Some(&inst_start) {
                use_points.push(inst_start);
            }
        }
    }
    use_points.sort();
    use_points.dedup();

    if use_points.len() <= 1 {
        // One (or zero) mandatory position: shrink to a minimal bundle
        // around it; everything else lives on the stack.
        make_minimal(ctx, state, queue, b, use_points.first().copied());
        return;
    }

    // Choose the split point: at the reported conflict when it separates
    // uses, otherwise between the first two use positions.
    let mid = match conflict_at {
        Some(p) if p > use_points[0] => ProgPoint(p.0.max(use_points[0].next().0)),
        _ => use_points[1],
    };

    log::trace!("regalloc: splitting bundle {b} at {mid:?}");
    let old_ranges = core::mem::take(&mut ctx.bundles[b].ranges);
    let mut lo: SmallVec<[usize; 4]> = SmallVec::new();
    let mut hi: SmallVec<[usize; 4]> = SmallVec::new();
    for rix in old_ranges {
        let r = ctx.ranges[rix].clone();
        if r.to <= mid {
            lo.push(rix);
        } else if r.from >= mid {
            hi.push(rix);
        } else {
            // The range straddles the split point: cut it in two.
            let lo_uses: SmallVec<[super::bundle::Use; 4]> =
                r.uses.iter().copied().filter(|u| u.point < mid).collect();
            let hi_uses: SmallVec<[super::bundle::Use; 4]> =
                r.uses.iter().copied().filter(|u| u.point >= mid).collect();
            let vreg = ctx.range_vreg[rix];
            ctx.ranges[rix] = LiveRange {
                from: r.from,
                to: mid,
                uses: lo_uses,
            };
            lo.push(rix);
            let new_rix = ctx.ranges.len();
            ctx.ranges.push(LiveRange {
                from: mid,
                to: r.to,
                uses: hi_uses,
            });
            ctx.range_vreg.push(vreg);
            ctx.vreg_ranges.get_mut(&vreg).unwrap().push(new_rix);
            hi.push(new_rix);
        }
    }

    let spillset = ctx.bundles[b].spillset;
    ctx.bundles[b].ranges = lo;
    ctx.bundles[b].weight = bundle_weight(ctx, b);
    let hi_bundle = ctx.bundles.len();
    ctx.bundles.push(LiveBundle {
        ranges: hi,
        spillset,
        weight: 0.0,
        minimal: false,
    });
    state.bundle_alloc.push(None);
    ctx.bundles[hi_bundle].weight = bundle_weight(ctx, hi_bundle);

    for &piece in &[b, hi_bundle] {
        if !ctx.bundles[piece].ranges.is_empty() {
            queue.push(QueueEntry {
                weight_bits: ctx.bundles[piece].weight.to_bits(),
                bundle: piece,
            });
        }
    }
}

fn bundle_weight(ctx: &Ctx, b: BundleIx) -> f32 {
    ctx.bundles[b]
        .ranges
        .iter()
        .flat_map(|&rix| ctx.ranges[rix].uses.iter())
        .map(|u| u.weight.to_f32())
        .sum()
}

/// Shrink `b` to a minimal bundle around `point` (one instruction), give
/// it eviction priority, and spill the connector ranges.
fn make_minimal(
    ctx: &mut Ctx,
    state: &mut Assignments,
    queue: &mut BinaryHeap<QueueEntry>,
    b: BundleIx,
    point: Option<ProgPoint>,
) {
    let spillset = ctx.bundles[b].spillset;
    let slot = {
        let class = ctx.spillsets[spillset].class;
        match ctx.spillsets[spillset].slot {
            Some(s) => s as u32,
            None => {
                let s = state.slot_for_class(class);
                ctx.spillsets[spillset].slot = Some(s as usize);
                s
            }
        }
    };

    let Some(point) = point else {
        // No uses at all: the whole bundle lives on the stack.
        state.bundle_alloc[b] = Some(Alloc::Slot(slot));
        return;
    };

    let inst = point.inst();
    let lo = ProgPoint::early(inst);
    let hi = ProgPoint::late(inst).next();

    log::trace!("regalloc: minimal split of bundle {b} around inst {inst}");
    let old_ranges = core::mem::take(&mut ctx.bundles[b].ranges);
    let mut minimal_ranges: SmallVec<[usize; 4]> = SmallVec::new();
    let mut stack_ranges: SmallVec<[usize; 4]> = SmallVec::new();
    for rix in old_ranges {
        let r = ctx.ranges[rix].clone();
        if r.to <= lo || r.from >= hi {
            stack_ranges.push(rix);
            continue;
        }
        let vreg = ctx.range_vreg[rix];
        // Piece before the use.
        if r.from < lo {
            let new_rix = ctx.ranges.len();
            ctx.ranges.push(LiveRange {
                from: r.from,
                to: lo,
                uses: r.uses.iter().copied().filter(|u| u.point < lo).collect(),
            });
            ctx.range_vreg.push(vreg);
            ctx.vreg_ranges.get_mut(&vreg).unwrap().push(new_rix);
            stack_ranges.push(new_rix);
        }
        // Piece after the use.
        if r.to > hi {
            let new_rix = ctx.ranges.len();
            ctx.ranges.push(LiveRange {
                from: hi,
                to: r.to,
                uses: r.uses.iter().copied().filter(|u| u.point >= hi).collect(),
            });
            ctx.range_vreg.push(vreg);
            ctx.vreg_ranges.get_mut(&vreg).unwrap().push(new_rix);
            stack_ranges.push(new_rix);
        }
        // The minimal piece itself.
        ctx.ranges[rix] = LiveRange {
            from: r.from.max(lo),
            to: r.to.min(hi),
            uses: r
                .uses
                .iter()
                .copied()
                .filter(|u| u.point >= lo && u.point < hi)
                .collect(),
        };
        minimal_ranges.push(rix);
    }

    // The stack part: a new bundle, allocated immediately to the slot.
    if !stack_ranges.is_empty() {
        ctx.bundles.push(LiveBundle {
            ranges: stack_ranges,
            spillset,
            weight: 0.0,
            minimal: false,
        });
        state.bundle_alloc.push(Some(Alloc::Slot(slot)));
        debug_assert_eq!(state.bundle_alloc.len(), ctx.bundles.len());
    }

    // The minimal part: a single mandatory position cannot be spilled, so
    // it gets an effectively-infinite spill weight and will evict anything
    // non-minimal.
    ctx.bundles[b].ranges = minimal_ranges;
    ctx.bundles[b].minimal = true;
    ctx.bundles[b].weight = 1e30;
    queue.push(QueueEntry {
        weight_bits: ctx.bundles[b].weight.to_bits(),
        bundle: b,
    });
}

/// Build the final output: per-operand allocations, intra-vreg connection
/// moves, block-edge moves (with parallel-move resolution), and the
/// multi-fixed-register copies.
fn finish<I: VCodeInst>(
    vcode: &VCode<I>,
    env: &MachineEnv,
    liveness: &Liveness,
    ctx: &Ctx,
    state: &mut Assignments,
) -> Result<Output, RegAllocError> {
    // Allocation lookup per vreg: sorted (from, to, alloc).
    let mut vreg_allocs: HashMap<VReg, SmallVec<[(ProgPoint, ProgPoint, Alloc); 4]>> =
        HashMap::new();
    for (bix, bundle) in ctx.bundles.iter().enumerate() {
        if bundle.ranges.is_empty() {
            continue;
        }
        let alloc = state.bundle_alloc[bix].expect("bundle left unallocated");
        for &rix in &bundle.ranges {
            let r = &ctx.ranges[rix];
            vreg_allocs
                .entry(ctx.range_vreg[rix])
                .or_default()
                .push((r.from, r.to, alloc));
        }
    }
    for list in vreg_allocs.values_mut() {
        list.sort_by_key(|&(from, _, _)| from);
    }

    let alloc_at = |vreg: VReg, point: ProgPoint| -> Option<Alloc> {
        vreg_allocs.get(&vreg).and_then(|list| {
            list.iter()
                .find(|&&(from, to, _)| from <= point && point < to)
                .map(|&(_, _, a)| a)
        })
    };

    // Per-operand allocations.
    let mut allocs: Vec<Reg> = Vec::new();
    for iix in 0..vcode.num_insts() as InsnIndex {
        for op in vcode.inst_operands(iix) {
            let point = match (op.kind, op.pos) {
                (_, crate::machinst::OperandPos::Early) => ProgPoint::early(iix),
                (_, crate::machinst::OperandPos::Late) => ProgPoint::late(iix),
            };
            let reg = if let Some(p) = op.vreg.as_preg() {
                Reg::from_real(p)
            } else {
                match alloc_at(op.vreg, point) {
                    Some(a) => a.as_reg(),
                    None => {
                        // A reuse-def extended to Early keeps its
                        // allocation record at the Late point.
                        alloc_at(op.vreg, ProgPoint::late(iix))
                            .expect("operand without allocation")
                            .as_reg()
                    }
                }
            };
            allocs.push(reg);
        }
    }

    // Apply multi-fixed fixups: the rewritten operand reads the secondary
    // register, fed by a copy from the primary.
    let mut edits: Vec<(EditPoint, Edit)> = Vec::new();
    for fixup in &ctx.fixups {
        allocs[fixup.op_index as usize] = Reg::from_real(fixup.secondary);
        edits.push((
            EditPoint {
                inst: fixup.inst,
                pos: EditPos::Before,
            },
            Edit::Move {
                from: Reg::from_real(fixup.primary),
                to: Reg::from_real(fixup.secondary),
                class: fixup.class,
            },
        ));
    }

    // Reuse-constraint fallback: when the def and reused use ended up in
    // different allocations, route the input through the def's allocation.
    for iix in 0..vcode.num_insts() as InsnIndex {
        let operands = vcode.inst_operands(iix);
        let base = vcode.operand_range_start(iix) as usize;
        for (i, op) in operands.iter().enumerate() {
            if let OperandConstraint::Reuse(k) = op.constraint {
                let def_alloc = allocs[base + i];
                let use_alloc = allocs[base + k];
                if def_alloc != use_alloc {
                    edits.push((
                        EditPoint {
                            inst: iix,
                            pos: EditPos::Before,
                        },
                        Edit::Move {
                            from: use_alloc,
                            to: def_alloc,
                            class: op.vreg.class(),
                        },
                    ));
                    allocs[base + k] = def_alloc;
                }
            }
        }
    }

    // Collect block start/end points to distinguish in-block range
    // boundaries from block boundaries.
    let mut block_start_points: HashMap<ProgPoint, BlockIndex> = HashMap::new();
    for b in 0..vcode.num_blocks() as BlockIndex {
        let range = vcode.block_insns(b);
        block_start_points.insert(ProgPoint::early(range.start as InsnIndex), b);
    }

    // Intra-block connection moves: where consecutive ranges of one vreg
    // meet inside a block with different allocations. Vregs are visited
    // in index order for deterministic output.
    let mut moves_at: HashMap<EditPoint, Vec<(Alloc, Alloc, RegClass)>> = HashMap::new();
    let mut move_vregs: Vec<VReg> = vreg_allocs.keys().copied().collect();
    move_vregs.sort();
    for vreg in &move_vregs {
        let list = &vreg_allocs[vreg];
        for w in list.windows(2) {
            let (_, to_a, alloc_a) = w[0];
            let (from_b, _, alloc_b) = w[1];
            if to_a == from_b
                && alloc_a != alloc_b
                && !block_start_points.contains_key(&from_b)
            {
                let point = EditPoint {
                    inst: from_b.inst(),
                    pos: if from_b.is_late() {
                        EditPos::After
                    } else {
                        EditPos::Before
                    },
                };
                moves_at
                    .entry(point)
                    .or_default()
                    .push((alloc_a, alloc_b, vreg.class()));
            }
        }
    }

    // Block-edge moves: pass-through vregs whose allocation differs across
    // the edge, and block-parameter arguments.
    for pred in 0..vcode.num_blocks() as BlockIndex {
        let pred_range = vcode.block_insns(pred);
        if pred_range.is_empty() {
            continue;
        }
        let term = (pred_range.end - 1) as InsnIndex;
        let pred_out = ProgPoint::late(term);
        for (pos, &succ) in vcode.block_succs(pred).iter().enumerate() {
            let succ_range = vcode.block_insns(succ);
            let succ_in = ProgPoint::early(succ_range.start as InsnIndex);
            // Placement: start of the successor when it has a unique
            // predecessor, otherwise the end of the (single-successor)
            // predecessor. Critical-edge splitting guarantees one of the
            // two holds.
            let point = if liveness.preds[succ as usize].len() == 1 {
                EditPoint {
                    inst: succ_range.start as InsnIndex,
                    pos: EditPos::Before,
                }
            } else {
                debug_assert_eq!(vcode.block_succs(pred).len(), 1, "unsplit critical edge");
                EditPoint {
                    inst: term,
                    pos: EditPos::Before,
                }
            };

            let mut edge_moves: Vec<(Alloc, Alloc, RegClass)> = Vec::new();
            let mut live: Vec<VReg> = liveness.livein[succ as usize].iter().copied().collect();
            live.sort();
            for vreg in live {
                let src = alloc_at(vreg, pred_out);
                let dst = alloc_at(vreg, succ_in);
                if let (Some(src), Some(dst)) = (src, dst) {
                    if src != dst {
                        edge_moves.push((src, dst, vreg.class()));
                    }
                }
            }
            let params = vcode.block_params(succ);
            let args = vcode.branch_args(pred, pos);
            for (&param, &arg) in params.iter().zip(args.iter()) {
                let src = alloc_at(arg, pred_out).expect("branch arg not live at branch");
                let dst = match alloc_at(param, succ_in) {
                    Some(d) => d,
                    // An unused parameter has no range; no move needed.
                    None => continue,
                };
                if src != dst {
                    edge_moves.push((src, dst, param.class()));
                }
            }
            if !edge_moves.is_empty() {
                moves_at.entry(point).or_default().extend(edge_moves);
            }
        }
    }

    // Resolve each point's moves as a parallel move set, breaking cycles
    // and stack-to-stack transfers with the scratch register.
    for (point, pending) in moves_at {
        let resolved = resolve_parallel_moves(&pending, env);
        for (from, to, class) in resolved {
            edits.push((point, Edit::Move { from, to, class }));
        }
    }

    edits.sort_by_key(|&(point, _)| point);

    Ok(Output {
        allocs,
        edits,
        num_spillslots: state.next_slot as usize,
    })
}

/// Order a parallel move set so that no move clobbers a pending source;
/// cycles go through the scratch register, as do stack-to-stack moves.
fn resolve_parallel_moves(
    moves: &[(Alloc, Alloc, RegClass)],
    env: &MachineEnv,
) -> Vec<(Reg, Reg, RegClass)> {
    let mut pending: Vec<(Alloc, Alloc, RegClass)> = moves.to_vec();
    let mut out: Vec<(Reg, Reg, RegClass)> = Vec::new();

    // Self-moves have already been filtered by the callers.
    while !pending.is_empty() {
        // Emit every move whose destination is not the source of another
        // pending move.
        let mut progressed = false;
        let mut i = 0;
        while i < pending.len() {
            let (from, to, class) = pending[i];
            let blocks_any = pending
                .iter()
                .enumerate()
                .any(|(j, &(src, _, _))| j != i && src == to);
            if !blocks_any {
                emit_move(&mut out, from, to, class, env);
                pending.swap_remove(i);
                progressed = true;
            } else {
                i += 1;
            }
        }
        if pending.is_empty() {
            break;
        }
        if !progressed {
            // A cycle: rotate through the scratch register. Move one
            // source aside, redirect the moves that consumed it, and
            // continue.
            let (from, to, class) = pending[0];
            let scratch = env.scratch_by_class[class as usize]
                .expect("move cycle with no scratch register");
            emit_move(&mut out, from, Alloc::Reg(scratch), class, env);
            for m in pending.iter_mut() {
                if m.0 == from {
                    m.0 = Alloc::Reg(scratch);
                }
            }
            let _ = to;
        }
    }
    out
}

/// Emit one move, expanding stack-to-stack through the scratch register.
fn emit_move(
    out: &mut Vec<(Reg, Reg, RegClass)>,
    from: Alloc,
    to: Alloc,
    class: RegClass,
    env: &MachineEnv,
) {
    match (from, to) {
        (Alloc::Slot(_), Alloc::Slot(_)) => {
            let scratch = env.scratch_by_class[class as usize]
                .expect("stack-to-stack move with no scratch register");
            out.push((from.as_reg(), Reg::from_real(scratch), class));
            out.push((Reg::from_real(scratch), to.as_reg(), class));
        }
        _ => out.push((from.as_reg(), to.as_reg(), class)),
    }
}
