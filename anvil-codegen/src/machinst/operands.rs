//! Instruction operands for register allocation.
//!
//! Every machine instruction describes its register mentions through
//! [`MachInst::get_operands`](super::MachInst::get_operands), which visits
//! each register field with an [`OperandVisitor`]. The same visit is used
//! twice: once before allocation with an [`OperandCollector`] to build the
//! flat operand vector the allocator consumes, and once after allocation to
//! rewrite the register fields in place with the assigned registers.

use crate::machinst::reg::{PReg, PRegSet, Reg, SpillSlot, VReg, Writable};
use core::fmt;

/// A constraint on where an operand may be allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandConstraint {
    /// Any location: register or stack.
    Any,
    /// Any register of the operand's class.
    Reg,
    /// A particular fixed physical register.
    FixedReg(PReg),
    /// A particular fixed stack slot (ABI-mandated storage, e.g. an
    /// incoming stack argument parked in its reserved frame slot).
    FixedStack(SpillSlot),
    /// Reuse the allocation of an earlier operand (by operand index).
    Reuse(usize),
}

/// Is the operand read or written?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Read by the instruction.
    Use,
    /// Written by the instruction.
    Def,
}

/// At which point of the instruction does the operand take effect?
///
/// Uses are normally `Early` (the value must be present on entry to the
/// instruction) and defs `Late` (the result appears after all inputs are
/// consumed). An early def conflicts with every use and is how "the output
/// must not share a register with any input" is expressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandPos {
    /// At the start of the instruction.
    Early,
    /// At the end of the instruction.
    Late,
}

/// One register mention of an instruction, as seen by the allocator.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    /// The virtual register.
    pub vreg: VReg,
    /// Where the operand may live.
    pub constraint: OperandConstraint,
    /// Read or write.
    pub kind: OperandKind,
    /// Early or late.
    pub pos: OperandPos,
}

impl Operand {
    /// An ordinary register use.
    pub fn reg_use(vreg: VReg) -> Self {
        Self {
            vreg,
            constraint: OperandConstraint::Reg,
            kind: OperandKind::Use,
            pos: OperandPos::Early,
        }
    }

    /// An ordinary register def.
    pub fn reg_def(vreg: VReg) -> Self {
        Self {
            vreg,
            constraint: OperandConstraint::Reg,
            kind: OperandKind::Def,
            pos: OperandPos::Late,
        }
    }
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            OperandKind::Use => "use",
            OperandKind::Def => "def",
        };
        let pos = match self.pos {
            OperandPos::Early => "early",
            OperandPos::Late => "late",
        };
        write!(f, "{:?} {} @{} ({:?})", self.vreg, kind, pos, self.constraint)
    }
}

/// A visitor over the register fields of one machine instruction.
///
/// Each method both describes the role of a register and receives a mutable
/// reference so the visit can rewrite the field in place.
pub trait OperandVisitor {
    /// Visit one register field with an explicit role.
    fn add_operand(
        &mut self,
        reg: &mut Reg,
        constraint: OperandConstraint,
        kind: OperandKind,
        pos: OperandPos,
    );

    /// Record the set of physical registers clobbered by the instruction.
    fn reg_clobbers(&mut self, _regs: PRegSet) {}

    /// An ordinary use at the Early point, in a register.
    fn reg_use(&mut self, reg: &mut Reg) {
        self.add_operand(
            reg,
            OperandConstraint::Reg,
            OperandKind::Use,
            OperandPos::Early,
        );
    }

    /// A use that may be allocated to a register or to a stack slot.
    fn any_use(&mut self, reg: &mut Reg) {
        self.add_operand(
            reg,
            OperandConstraint::Any,
            OperandKind::Use,
            OperandPos::Early,
        );
    }

    /// A use at the Late point: the register must remain live through the
    /// instruction (e.g. one consumed after a def is written).
    fn reg_late_use(&mut self, reg: &mut Reg) {
        self.add_operand(
            reg,
            OperandConstraint::Reg,
            OperandKind::Use,
            OperandPos::Late,
        );
    }

    /// An ordinary def at the Late point, in a register.
    fn reg_def(&mut self, reg: &mut Writable<Reg>) {
        self.add_operand(
            reg.reg_mut(),
            OperandConstraint::Reg,
            OperandKind::Def,
            OperandPos::Late,
        );
    }

    /// A def that may be allocated to a register or a stack slot.
    fn any_def(&mut self, reg: &mut Writable<Reg>) {
        self.add_operand(
            reg.reg_mut(),
            OperandConstraint::Any,
            OperandKind::Def,
            OperandPos::Late,
        );
    }

    /// A def at the Early point: the destination must not share a register
    /// with any input of the instruction.
    fn reg_early_def(&mut self, reg: &mut Writable<Reg>) {
        self.add_operand(
            reg.reg_mut(),
            OperandConstraint::Reg,
            OperandKind::Def,
            OperandPos::Early,
        );
    }

    /// A use pinned to a fixed physical register.
    fn reg_fixed_use(&mut self, reg: &mut Reg, preg: PReg) {
        self.add_operand(
            reg,
            OperandConstraint::FixedReg(preg),
            OperandKind::Use,
            OperandPos::Early,
        );
    }

    /// A def pinned to a fixed physical register.
    fn reg_fixed_def(&mut self, reg: &mut Writable<Reg>, preg: PReg) {
        self.add_operand(
            reg.reg_mut(),
            OperandConstraint::FixedReg(preg),
            OperandKind::Def,
            OperandPos::Late,
        );
    }

    /// A def pinned to a fixed stack slot: the value is defined as living
    /// in that slot (the slot's contents are established outside the
    /// allocated code, e.g. by the prologue).
    fn reg_fixed_stack_def(&mut self, reg: &mut Writable<Reg>, slot: SpillSlot) {
        self.add_operand(
            reg.reg_mut(),
            OperandConstraint::FixedStack(slot),
            OperandKind::Def,
            OperandPos::Late,
        );
    }

    /// A def that reuses the allocation of the use at operand index `idx`
    /// (two-address forms).
    fn reg_reuse_def(&mut self, reg: &mut Writable<Reg>, idx: usize) {
        self.add_operand(
            reg.reg_mut(),
            OperandConstraint::Reuse(idx),
            OperandKind::Def,
            OperandPos::Late,
        );
    }
}

/// Collects the operands of an instruction into a flat vector shared by the
/// whole VCode; an instruction's operands are the range `[start, end)`
/// recorded by the caller around the visit.
pub struct OperandCollector<'a> {
    operands: &'a mut Vec<Operand>,
    clobbers: PRegSet,
}

impl<'a> OperandCollector<'a> {
    /// Start collecting into `operands`.
    pub fn new(operands: &'a mut Vec<Operand>) -> Self {
        Self {
            operands,
            clobbers: PRegSet::empty(),
        }
    }

    /// Finish, returning the accumulated clobber set.
    pub fn finish(self) -> PRegSet {
        self.clobbers
    }

    /// Number of operands collected so far (across all instructions).
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }
}

impl<'a> OperandVisitor for OperandCollector<'a> {
    fn add_operand(
        &mut self,
        reg: &mut Reg,
        constraint: OperandConstraint,
        kind: OperandKind,
        pos: OperandPos,
    ) {
        let vreg = reg.as_virtual();
        // Pinned vregs are references to physical registers; they become
        // fixed constraints rather than allocatable operands.
        let constraint = match vreg.as_preg() {
            Some(preg) => OperandConstraint::FixedReg(preg),
            None => constraint,
        };
        self.operands.push(Operand {
            vreg,
            constraint,
            kind,
            pos,
        });
    }

    fn reg_clobbers(&mut self, regs: PRegSet) {
        self.clobbers.union_from(regs);
    }
}

/// Rewrites each visited register field with the allocation chosen for the
/// corresponding operand, in collection order.
pub struct OperandRewriter<'a> {
    allocs: &'a [Reg],
    next: usize,
}

impl<'a> OperandRewriter<'a> {
    /// Create a rewriter over the allocations for one instruction.
    pub fn new(allocs: &'a [Reg]) -> Self {
        Self { allocs, next: 0 }
    }

    /// Check that every allocation was consumed.
    pub fn finish(self) {
        debug_assert_eq!(self.next, self.allocs.len(), "allocation count mismatch");
    }
}

impl<'a> OperandVisitor for OperandRewriter<'a> {
    fn add_operand(
        &mut self,
        reg: &mut Reg,
        _constraint: OperandConstraint,
        _kind: OperandKind,
        _pos: OperandPos,
    ) {
        let alloc = self.allocs[self.next];
        self.next += 1;
        *reg = alloc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machinst::reg::RegClass;

    #[test]
    fn collect_and_rewrite() {
        let v0 = VReg::new(200, RegClass::Int);
        let v1 = VReg::new(201, RegClass::Int);
        let mut src = Reg::from_virtual(v0);
        let mut dst = Writable::from_reg(Reg::from_virtual(v1));

        let mut operands = Vec::new();
        let mut col = OperandCollector::new(&mut operands);
        col.reg_use(&mut src);
        col.reg_def(&mut dst);
        assert!(col.finish().is_empty());

        assert_eq!(operands.len(), 2);
        assert_eq!(operands[0].kind, OperandKind::Use);
        assert_eq!(operands[0].pos, OperandPos::Early);
        assert_eq!(operands[1].kind, OperandKind::Def);
        assert_eq!(operands[1].pos, OperandPos::Late);

        // Rewrite with "allocations".
        let p0 = Reg::from_real(PReg::new(3, RegClass::Int));
        let p1 = Reg::from_real(PReg::new(4, RegClass::Int));
        let allocs = vec![p0, p1];
        let mut rw = OperandRewriter::new(&allocs);
        rw.reg_use(&mut src);
        rw.reg_def(&mut dst);
        rw.finish();
        assert_eq!(src, p0);
        assert_eq!(dst.to_reg(), p1);
    }

    #[test]
    fn pinned_vreg_becomes_fixed() {
        let preg = PReg::new(0, RegClass::Int);
        let mut r = Reg::from_real(preg);
        let mut operands = Vec::new();
        let mut col = OperandCollector::new(&mut operands);
        col.reg_use(&mut r);
        col.finish();
        assert_eq!(operands[0].constraint, OperandConstraint::FixedReg(preg));
    }
}
