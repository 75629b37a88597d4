//! Live ranges, spill weights, bundles and requirements.

use super::liveness::Liveness;
use crate::machinst::{
    InsnIndex, OperandConstraint, OperandKind, OperandPos, PReg, VCode, VCodeInst, VReg,
};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::vec::Vec;

/// A program point: an instruction index with an Early/Late position, as a
/// single ordered integer (`2 * inst + late`). Live ranges are half-open
/// intervals over these points.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgPoint(pub u32);

impl ProgPoint {
    /// The Early point of an instruction.
    pub fn early(inst: InsnIndex) -> Self {
        Self(inst * 2)
    }
    /// The Late point of an instruction.
    pub fn late(inst: InsnIndex) -> Self {
        Self(inst * 2 + 1)
    }
    /// The instruction this point belongs to.
    pub fn inst(self) -> InsnIndex {
        self.0 / 2
    }
    /// Is this a Late point?
    pub fn is_late(self) -> bool {
        self.0 & 1 != 0
    }
    /// The next point.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl core::fmt::Debug for ProgPoint {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "{}{}",
            self.inst(),
            if self.is_late() { "L" } else { "E" }
        )
    }
}

/// A spill weight: how costly it is to keep this use out of a register.
///
/// Stored compactly as the upper 16 bits of an `f32` (a bfloat16-style
/// encoding); precision in the low mantissa bits is irrelevant for
/// priority comparison.
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug, Default)]
pub struct SpillWeight(u16);

impl SpillWeight {
    /// Encode an `f32` weight.
    pub fn from_f32(x: f32) -> Self {
        Self((x.to_bits() >> 16) as u16)
    }

    /// Decode to an `f32`.
    pub fn to_f32(self) -> f32 {
        f32::from_bits((self.0 as u32) << 16)
    }

    /// Weight for one use: the constraint kind sets the base priority
    /// (fixed > register > limited > any > stack) and each level of loop
    /// nesting multiplies it.
    pub fn for_use(constraint: OperandConstraint, loop_depth: u32) -> Self {
        let base = match constraint {
            OperandConstraint::FixedReg(_) => 2000.0,
            OperandConstraint::Reuse(_) => 2000.0,
            OperandConstraint::Reg => 1000.0,
            OperandConstraint::Any => 10.0,
            // Already home on the stack; cheapest of all to "spill".
            OperandConstraint::FixedStack(_) => 5.0,
        };
        let depth = loop_depth.min(4);
        Self::from_f32(base * 10f32.powi(depth as i32))
    }
}

/// One operand's register mention within a live range.
#[derive(Clone, Copy, Debug)]
pub struct Use {
    /// The program point of the operand.
    pub point: ProgPoint,
    /// Index into the VCode's flat operand vector.
    pub op_index: u32,
    /// The operand's constraint (possibly rewritten by the multi-fixed-reg
    /// fixup).
    pub constraint: OperandConstraint,
    /// Use or def.
    pub kind: OperandKind,
    /// The spill weight of this use.
    pub weight: SpillWeight,
}

/// A half-open range `[from, to)` of program points over which one vreg is
/// live, together with the uses inside it. Ranges never span block
/// boundaries; a vreg live across blocks has one range per block.
#[derive(Clone, Debug)]
pub struct LiveRange {
    /// Start point (inclusive).
    pub from: ProgPoint,
    /// End point (exclusive).
    pub to: ProgPoint,
    /// The uses within this range, in program order.
    pub uses: SmallVec<[Use; 4]>,
}

impl LiveRange {
    /// Do two ranges overlap?
    pub fn overlaps(&self, other: &LiveRange) -> bool {
        self.from < other.to && other.from < self.to
    }

    /// Does the range contain the given point?
    pub fn contains(&self, point: ProgPoint) -> bool {
        self.from <= point && point < self.to
    }
}

/// Index types into the allocation context.
pub type RangeIx = usize;
/// Index of a bundle.
pub type BundleIx = usize;
/// Index of a spill set.
pub type SpillSetIx = usize;

/// A collection of non-overlapping live ranges that must share one
/// allocation.
#[derive(Clone, Debug, Default)]
pub struct LiveBundle {
    /// Ranges in this bundle, kept sorted by start point.
    pub ranges: SmallVec<[RangeIx; 4]>,
    /// The spill set this bundle belongs to.
    pub spillset: SpillSetIx,
    /// Total spill weight of all uses, the assignment priority.
    pub weight: f32,
    /// A minimal bundle surrounds a single mandatory use and can be
    /// neither split nor spilled; it gets eviction priority.
    pub minimal: bool,
}

/// A spill set: all bundles split from one original value group share one
/// lazily-allocated spill slot.
#[derive(Clone, Debug)]
pub struct SpillSet {
    /// Register class of the value.
    pub class: crate::machinst::RegClass,
    /// The assigned slot, once any member bundle has spilled.
    pub slot: Option<usize>,
    /// The vregs covered by this spill set.
    pub vregs: SmallVec<[VReg; 2]>,
}

/// A required-location summary for a bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    /// Any location: register or stack.
    Any,
    /// Some register of the bundle's class.
    Register,
    /// A specific register.
    FixedReg(PReg),
    /// One of the first `n` registers of the class.
    Limit(u32),
    /// Some stack slot.
    Stack,
    /// A specific stack slot.
    FixedStack(crate::machinst::SpillSlot),
}

impl Requirement {
    /// Merge two requirements. The merge is associative and commutative;
    /// `Err` carries no data and means the two cannot be satisfied by one
    /// allocation.
    pub fn merge(self, other: Requirement) -> Result<Requirement, ()> {
        use Requirement::*;
        match (self, other) {
            (Any, r) | (r, Any) => Ok(r),
            (Register, Register) => Ok(Register),
            (Stack, Stack) => Ok(Stack),
            (FixedReg(a), FixedReg(b)) => {
                if a == b {
                    Ok(FixedReg(a))
                } else {
                    Err(())
                }
            }
            (Limit(n), Limit(m)) => Ok(Limit(n.min(m))),
            (Register, FixedReg(p)) | (FixedReg(p), Register) => Ok(FixedReg(p)),
            (Limit(n), Register) | (Register, Limit(n)) => Ok(Limit(n)),
            (Limit(n), FixedReg(p)) | (FixedReg(p), Limit(n)) => {
                if (p.hw_enc() as u32) < n {
                    Ok(FixedReg(p))
                } else {
                    Err(())
                }
            }
            (FixedStack(a), FixedStack(b)) => {
                if a == b {
                    Ok(FixedStack(a))
                } else {
                    Err(())
                }
            }
            // A fixed slot satisfies a plain stack requirement.
            (FixedStack(s), Stack) | (Stack, FixedStack(s)) => Ok(FixedStack(s)),
            // A fixed slot cannot satisfy any register-side requirement.
            (FixedStack(_), _) | (_, FixedStack(_)) => Err(()),
            (Stack, _) | (_, Stack) => Err(()),
        }
    }
}

/// A queued copy fixing up an instruction that mentions one vreg under two
/// different fixed-register constraints.
#[derive(Clone, Copy, Debug)]
pub struct MultiFixedFixup {
    /// The instruction.
    pub inst: InsnIndex,
    /// The operand rewritten to the secondary register.
    pub op_index: u32,
    /// The primary register holding the value.
    pub primary: PReg,
    /// The secondary register the copy must reach.
    pub secondary: PReg,
    /// Register class.
    pub class: crate::machinst::RegClass,
}

/// All allocation state built before assignment.
pub struct Ctx {
    /// All live ranges.
    pub ranges: Vec<LiveRange>,
    /// The vreg each range belongs to.
    pub range_vreg: Vec<VReg>,
    /// Ranges per vreg index.
    pub vreg_ranges: HashMap<VReg, SmallVec<[RangeIx; 4]>>,
    /// All bundles.
    pub bundles: Vec<LiveBundle>,
    /// Bundle per vreg.
    pub vreg_bundle: HashMap<VReg, BundleIx>,
    /// All spill sets.
    pub spillsets: Vec<SpillSet>,
    /// Physical-register busy intervals from clobbers, fixed constraints
    /// and pinned-vreg mentions, keyed by preg index.
    pub preg_busy: HashMap<usize, Vec<(ProgPoint, ProgPoint)>>,
    /// Queued multi-fixed-register copies.
    pub fixups: Vec<MultiFixedFixup>,
}

/// Build live ranges and initial (per-vreg) bundles.
pub fn build<I: VCodeInst>(vcode: &VCode<I>, liveness: &Liveness) -> Ctx {
    let mut ranges: Vec<LiveRange> = Vec::new();
    let mut range_vreg: Vec<VReg> = Vec::new();
    let mut vreg_ranges: HashMap<VReg, SmallVec<[RangeIx; 4]>> = HashMap::new();
    let mut preg_busy: HashMap<usize, Vec<(ProgPoint, ProgPoint)>> = HashMap::new();
    let mut fixups: Vec<MultiFixedFixup> = Vec::new();

    let mut mark_busy = |map: &mut HashMap<usize, Vec<(ProgPoint, ProgPoint)>>,
                         preg: PReg,
                         from: ProgPoint,
                         to: ProgPoint| {
        map.entry(preg.index()).or_default().push((from, to));
    };

    for b in 0..vcode.num_blocks() as u32 {
        let insns = vcode.block_insns(b);
        let depth = liveness.loop_depth[b as usize];
        let block_start = ProgPoint::early(insns.start as InsnIndex);
        let block_end = ProgPoint::early(insns.end as InsnIndex);

        // Open ranges: vreg -> (end point, collected uses in reverse).
        let mut open: HashMap<VReg, (ProgPoint, SmallVec<[Use; 4]>)> = HashMap::new();

        for &v in &liveness.liveout[b as usize] {
            open.insert(v, (block_end, SmallVec::new()));
        }
        for pos in 0..vcode.block_succs(b).len() {
            for &arg in vcode.branch_args(b, pos) {
                if !arg.is_pinned() {
                    open.entry(arg).or_insert((block_end, SmallVec::new()));
                }
            }
        }

        let mut close = |open: &mut HashMap<VReg, (ProgPoint, SmallVec<[Use; 4]>)>,
                         vreg: VReg,
                         from: ProgPoint| {
            if let Some((to, mut uses)) = open.remove(&vreg) {
                uses.reverse();
                let ix = ranges.len();
                ranges.push(LiveRange { from, to, uses });
                range_vreg.push(vreg);
                vreg_ranges.entry(vreg).or_default().push(ix);
            }
        };

        for iix in insns.clone().rev() {
            let iix = iix as InsnIndex;
            let operands = vcode.inst_operands(iix);

            // Clobbers occupy their registers at the Late point — except
            // the registers the instruction defines into (a call's return
            // registers are in its clobber set, but the results live
            // there).
            let fixed_defs: SmallVec<[PReg; 4]> = operands
                .iter()
                .filter(|op| op.kind == OperandKind::Def)
                .filter_map(|op| match op.constraint {
                    OperandConstraint::FixedReg(p) => Some(p),
                    _ => None,
                })
                .collect();
            for preg in vcode.inst_clobbers(iix).iter() {
                if fixed_defs.contains(&preg) {
                    continue;
                }
                mark_busy(
                    &mut preg_busy,
                    preg,
                    ProgPoint::late(iix),
                    ProgPoint::late(iix).next(),
                );
            }

            // Detect one vreg with several conflicting fixed-register
            // mentions on this instruction; the first stays primary and
            // the rest become explicit copies.
            let mut fixed_seen: SmallVec<[(VReg, PReg); 2]> = SmallVec::new();
            let mut rewritten: SmallVec<[(usize, OperandConstraint); 2]> = SmallVec::new();
            for (i, op) in operands.iter().enumerate() {
                if let OperandConstraint::FixedReg(p) = op.constraint {
                    if op.vreg.is_pinned() {
                        continue;
                    }
                    match fixed_seen.iter().find(|&&(v, _)| v == op.vreg) {
                        Some(&(_, primary)) if primary != p => {
                            rewritten.push((i, OperandConstraint::Any));
                            fixups.push(MultiFixedFixup {
                                inst: iix,
                                op_index: vcode_operand_index(vcode, iix, i),
                                primary,
                                secondary: p,
                                class: op.vreg.class(),
                            });
                            mark_busy(
                                &mut preg_busy,
                                p,
                                ProgPoint::early(iix),
                                ProgPoint::late(iix).next(),
                            );
                        }
                        Some(_) => {}
                        None => fixed_seen.push((op.vreg, p)),
                    }
                }
            }
            let constraint_of = |i: usize, op_constraint: OperandConstraint| {
                rewritten
                    .iter()
                    .find(|&&(j, _)| j == i)
                    .map(|&(_, c)| c)
                    .unwrap_or(op_constraint)
            };

            // Defs close ranges (or create dead-def points).
            for (i, op) in operands.iter().enumerate() {
                if op.kind != OperandKind::Def {
                    continue;
                }
                let point = match op.pos {
                    OperandPos::Early => ProgPoint::early(iix),
                    OperandPos::Late => ProgPoint::late(iix),
                };
                let constraint = constraint_of(i, op.constraint);
                if op.vreg.is_pinned() {
                    // A mention of a pinned vreg reserves its physical
                    // register; it never becomes an allocatable range.
                    // (Fixed constraints on ordinary vregs are enforced
                    // through the bundle requirement and the occupancy
                    // map, not here: a busy interval would conflict with
                    // the very operand that created it.)
                    if let OperandConstraint::FixedReg(p) = constraint {
                        mark_busy(&mut preg_busy, p, point, point.next());
                    }
                    continue;
                }
                let use_rec = Use {
                    point,
                    op_index: vcode_operand_index(vcode, iix, i),
                    constraint,
                    kind: OperandKind::Def,
                    weight: SpillWeight::for_use(constraint, depth),
                };
                if !open.contains_key(&op.vreg) {
                    // Dead def: the register is still written.
                    open.insert(op.vreg, (point.next(), SmallVec::new()));
                }
                open.get_mut(&op.vreg).unwrap().1.push(use_rec);
                close(&mut open, op.vreg, point);
            }

            // Uses open or extend ranges.
            for (i, op) in operands.iter().enumerate() {
                if op.kind != OperandKind::Use {
                    continue;
                }
                let point = match op.pos {
                    OperandPos::Early => ProgPoint::early(iix),
                    OperandPos::Late => ProgPoint::late(iix),
                };
                let constraint = constraint_of(i, op.constraint);
                if op.vreg.is_pinned() {
                    if let OperandConstraint::FixedReg(p) = constraint {
                        mark_busy(&mut preg_busy, p, point, point.next());
                    }
                    continue;
                }
                let use_rec = Use {
                    point,
                    op_index: vcode_operand_index(vcode, iix, i),
                    constraint,
                    kind: OperandKind::Use,
                    weight: SpillWeight::for_use(constraint, depth),
                };
                open.entry(op.vreg).or_insert((point.next(), SmallVec::new()));
                open.get_mut(&op.vreg).unwrap().1.push(use_rec);
            }
        }

        // Whatever remains open is live into the block (or is a block
        // parameter defined at the head). Sorted so that range numbering
        // stays deterministic.
        let mut remaining: Vec<VReg> = open.keys().copied().collect();
        remaining.sort();
        for vreg in remaining {
            close(&mut open, vreg, block_start);
        }
    }

    // Sort each vreg's ranges by start point and build one bundle per
    // vreg. The vregs are visited in index order so that bundle numbering
    // (and therefore the whole allocation) is deterministic.
    let mut bundles: Vec<LiveBundle> = Vec::new();
    let mut vreg_bundle: HashMap<VReg, BundleIx> = HashMap::new();
    let mut spillsets: Vec<SpillSet> = Vec::new();
    let mut all_vregs: Vec<VReg> = vreg_ranges.keys().copied().collect();
    all_vregs.sort();
    for vreg in all_vregs {
        let vreg = &vreg;
        let rlist = vreg_ranges.get_mut(vreg).unwrap();
        rlist.sort_by_key(|&ix| ranges[ix].from);
        let weight: f32 = rlist
            .iter()
            .flat_map(|&ix| ranges[ix].uses.iter())
            .map(|u| u.weight.to_f32())
            .sum();
        let spillset = spillsets.len();
        spillsets.push(SpillSet {
            class: vreg.class(),
            slot: None,
            vregs: smallvec::smallvec![*vreg],
        });
        let bundle = bundles.len();
        bundles.push(LiveBundle {
            ranges: rlist.clone(),
            spillset,
            weight,
            minimal: false,
        });
        vreg_bundle.insert(*vreg, bundle);
    }

    Ctx {
        ranges,
        range_vreg,
        vreg_ranges,
        bundles,
        vreg_bundle,
        spillsets,
        preg_busy,
        fixups,
    }
}

/// The global operand index of operand `i` of instruction `iix`.
fn vcode_operand_index<I: VCodeInst>(vcode: &VCode<I>, iix: InsnIndex, i: usize) -> u32 {
    vcode.operand_range_start(iix) + i as u32
}

/// Compute the merged requirement of a bundle, or the point of the first
/// conflict.
pub fn bundle_requirement(ctx: &Ctx, bundle: BundleIx) -> Result<Requirement, ProgPoint> {
    let mut req = Requirement::Any;
    for &rix in &ctx.bundles[bundle].ranges {
        for u in &ctx.ranges[rix].uses {
            let operand_req = match u.constraint {
                OperandConstraint::Any => Requirement::Any,
                OperandConstraint::Reg => Requirement::Register,
                OperandConstraint::FixedReg(p) => Requirement::FixedReg(p),
                OperandConstraint::FixedStack(s) => Requirement::FixedStack(s),
                OperandConstraint::Reuse(_) => Requirement::Register,
            };
            req = req.merge(operand_req).map_err(|_| u.point)?;
        }
    }
    Ok(req)
}

/// Merge bundles joined by reuse constraints and block-parameter edges,
/// when their ranges don't overlap and their requirements are compatible.
pub fn merge_bundles<I: VCodeInst>(vcode: &VCode<I>, ctx: &mut Ctx) {
    // Reuse-constraint pairs: def vreg joins the used vreg it reuses.
    let mut pairs: Vec<(VReg, VReg)> = Vec::new();
    let mut reuse_pairs: Vec<(VReg, VReg, InsnIndex)> = Vec::new();
    for iix in 0..vcode.num_insts() as InsnIndex {
        let operands = vcode.inst_operands(iix);
        for op in operands {
            if let OperandConstraint::Reuse(k) = op.constraint {
                let other = operands[k].vreg;
                if !op.vreg.is_pinned() && !other.is_pinned() {
                    pairs.push((op.vreg, other));
                    reuse_pairs.push((op.vreg, other, iix));
                }
            }
        }
    }
    // Block-parameter edges: each branch argument joins the parameter it
    // supplies.
    for b in 0..vcode.num_blocks() as u32 {
        for (pos, &succ) in vcode.block_succs(b).iter().enumerate() {
            let params = vcode.block_params(succ);
            let args = vcode.branch_args(b, pos);
            for (&param, &arg) in params.iter().zip(args.iter()) {
                if !param.is_pinned() && !arg.is_pinned() {
                    pairs.push((param, arg));
                }
            }
        }
    }

    for (a, b) in pairs {
        let (Some(&ba), Some(&bb)) = (ctx.vreg_bundle.get(&a), ctx.vreg_bundle.get(&b)) else {
            continue;
        };
        try_merge(ctx, ba, bb);
    }

    // A reuse pair that could not be merged must have its def extended to
    // the Early point: the two-address fixup copies the input into the
    // def's register before the instruction, so the def's register must
    // not be shared with any other input.
    for (def, input, iix) in reuse_pairs {
        if ctx.vreg_bundle.get(&def) == ctx.vreg_bundle.get(&input) {
            continue;
        }
        let late = ProgPoint::late(iix);
        let early = ProgPoint::early(iix);
        if let Some(rlist) = ctx.vreg_ranges.get(&def) {
            for &rix in rlist {
                let r = &mut ctx.ranges[rix];
                if r.from == late || r.contains(late) {
                    r.from = r.from.min(early);
                }
            }
        }
    }
}

/// Attempt to merge bundle `b` into bundle `a`. Fails silently when the
/// ranges overlap or the requirements conflict.
fn try_merge(ctx: &mut Ctx, a: BundleIx, b: BundleIx) -> bool {
    if a == b {
        return true;
    }
    // Overlap check over the sorted range lists.
    {
        let ra = &ctx.bundles[a].ranges;
        let rb = &ctx.bundles[b].ranges;
        let (mut i, mut j) = (0, 0);
        while i < ra.len() && j < rb.len() {
            let x = &ctx.ranges[ra[i]];
            let y = &ctx.ranges[rb[j]];
            if x.overlaps(y) {
                return false;
            }
            if x.to <= y.from {
                i += 1;
            } else {
                j += 1;
            }
        }
    }
    // Requirements must be mergeable.
    let req_a = match bundle_requirement(ctx, a) {
        Ok(r) => r,
        Err(_) => return false,
    };
    let req_b = match bundle_requirement(ctx, b) {
        Ok(r) => r,
        Err(_) => return false,
    };
    if req_a.merge(req_b).is_err() {
        return false;
    }
    // Same class only.
    if ctx.spillsets[ctx.bundles[a].spillset].class
        != ctx.spillsets[ctx.bundles[b].spillset].class
    {
        return false;
    }

    // Move ranges of b into a, keeping them sorted.
    let b_ranges = core::mem::take(&mut ctx.bundles[b].ranges);
    let b_weight = ctx.bundles[b].weight;
    let b_spillset = ctx.bundles[b].spillset;
    let ranges = &ctx.ranges;
    let a_bundle = &mut ctx.bundles[a];
    a_bundle.ranges.extend(b_ranges);
    a_bundle
        .ranges
        .sort_by_key(|&ix| ranges[ix].from);
    a_bundle.weight += b_weight;
    ctx.bundles[b].weight = 0.0;

    // Re-point b's vregs at a, and fold its spill set in.
    let moved_vregs = core::mem::take(&mut ctx.spillsets[b_spillset].vregs);
    for &v in &moved_vregs {
        ctx.vreg_bundle.insert(v, a);
    }
    let a_spillset = ctx.bundles[a].spillset;
    ctx.spillsets[a_spillset].vregs.extend(moved_vregs);
    log::trace!("regalloc: merged bundle {b} into {a}");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machinst::RegClass;

    #[test]
    fn requirement_merge_table() {
        use crate::machinst::SpillSlot;
        use Requirement::*;
        let p0 = PReg::new(0, RegClass::Int);
        let p1 = PReg::new(1, RegClass::Int);
        let s0 = SpillSlot::new(0);
        let s1 = SpillSlot::new(1);
        assert_eq!(Any.merge(Register), Ok(Register));
        assert_eq!(Register.merge(Register), Ok(Register));
        assert_eq!(Stack.merge(Stack), Ok(Stack));
        assert_eq!(FixedReg(p0).merge(FixedReg(p0)), Ok(FixedReg(p0)));
        assert_eq!(FixedReg(p0).merge(FixedReg(p1)), Err(()));
        assert_eq!(Limit(4).merge(Limit(2)), Ok(Limit(2)));
        assert_eq!(Register.merge(FixedReg(p1)), Ok(FixedReg(p1)));
        assert_eq!(Register.merge(Stack), Err(()));
        // Fixed stack slots: identical slots merge, different slots (or
        // any register-side requirement) conflict, and a fixed slot
        // satisfies both `Any` and plain `Stack`.
        assert_eq!(FixedStack(s0).merge(FixedStack(s0)), Ok(FixedStack(s0)));
        assert_eq!(FixedStack(s0).merge(FixedStack(s1)), Err(()));
        assert_eq!(FixedStack(s0).merge(Stack), Ok(FixedStack(s0)));
        assert_eq!(Any.merge(FixedStack(s1)), Ok(FixedStack(s1)));
        assert_eq!(FixedStack(s0).merge(Register), Err(()));
        assert_eq!(FixedStack(s0).merge(FixedReg(p0)), Err(()));
        assert_eq!(FixedStack(s0).merge(Limit(4)), Err(()));
        // Commutativity on a few entries.
        assert_eq!(Any.merge(Stack), Stack.merge(Any));
        assert_eq!(FixedReg(p0).merge(Register), Register.merge(FixedReg(p0)));
        assert_eq!(Stack.merge(FixedStack(s0)), FixedStack(s0).merge(Stack));
    }

    #[test]
    fn spill_weight_encoding() {
        let w = SpillWeight::from_f32(1000.0);
        // bfloat16-style truncation keeps the magnitude.
        assert!((w.to_f32() - 1000.0).abs() / 1000.0 < 0.01);
        let heavier = SpillWeight::for_use(OperandConstraint::Reg, 2);
        let lighter = SpillWeight::for_use(OperandConstraint::Reg, 0);
        assert!(heavier.to_f32() > lighter.to_f32());
        let fixed = SpillWeight::for_use(
            OperandConstraint::FixedReg(PReg::new(0, RegClass::Int)),
            0,
        );
        assert!(fixed.to_f32() > lighter.to_f32());
    }

    #[test]
    fn prog_point_order() {
        let e = ProgPoint::early(3);
        let l = ProgPoint::late(3);
        assert!(e < l);
        assert!(l < ProgPoint::early(4));
        assert_eq!(e.inst(), 3);
        assert_eq!(l.inst(), 3);
        assert!(l.is_late() && !e.is_late());
    }
}
