//! Register allocation.
//!
//! This is a bundle-based linear-scan allocator over the virtual-register
//! machine code (`VCode`). It proceeds in phases:
//!
//! 1. **Liveness** (`liveness`): a worklist fixed-point computes live-in /
//!    live-out vreg sets per lowered block. Branch block-arguments join the
//!    live-outs of their predecessor. A live-in at the entry block is a
//!    programmer error (use of an uninitialized value) and is rejected.
//! 2. **Live ranges** (`bundle`): a reverse walk over each block builds
//!    half-open ranges over program points (two points per instruction:
//!    Early and Late), with a use record per operand carrying a spill
//!    weight derived from the constraint kind and loop depth.
//! 3. **Bundles** (`bundle`): each vreg's ranges form a bundle; bundles
//!    connected by reuse constraints or block-parameter edges are merged
//!    when their ranges don't overlap and their requirements are
//!    compatible.
//! 4. **Assignment** (`assign`): a priority queue ordered by spill weight
//!    assigns each bundle a physical register, evicting lighter bundles on
//!    conflict, splitting at conflict points when no register fits, and
//!    finally assigning a spill slot when a piece cannot live in a
//!    register.
//! 5. **Move insertion** (`assign`): wherever a vreg's allocation changes
//!    across a program point or a block-parameter edge, a move is
//!    recorded; cycles in the per-edge parallel moves are broken with the
//!    ISA scratch register.
//!
//! The output maps each instruction operand to its allocation and lists
//! the inserted edits in program order.

use crate::machinst::{InsnIndex, PReg, Reg, RegClass, VCode, VCodeInst};
use core::fmt;
use std::vec::Vec;

mod assign;
mod bundle;
mod liveness;

pub use bundle::{Requirement, SpillWeight};

/// An error from the register allocator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegAllocError {
    /// A value is live into the entry block, i.e. used before it is
    /// defined anywhere. This indicates invalid input, not an allocation
    /// failure.
    EntryLivein,
    /// An implementation limit was exceeded.
    TooManyLiveRegs,
}

impl fmt::Display for RegAllocError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::EntryLivein => write!(f, "entry block has live-in values"),
            Self::TooManyLiveRegs => write!(f, "too many live registers"),
        }
    }
}

impl std::error::Error for RegAllocError {}

/// The machine register environment: which physical registers the
/// allocator may use, in preference order, and the scratch register per
/// class used to break move cycles.
#[derive(Clone, Debug, Default)]
pub struct MachineEnv {
    /// Allocatable registers to prefer (not callee-saved; no save/restore
    /// cost), by class.
    pub preferred_regs_by_class: [Vec<PReg>; 3],
    /// Allocatable registers to use when the preferred set is exhausted
    /// (callee-saved; must be saved in the prologue if used), by class.
    pub non_preferred_regs_by_class: [Vec<PReg>; 3],
    /// Scratch register per class, excluded from allocation, for resolving
    /// move cycles.
    pub scratch_by_class: [Option<PReg>; 3],
}

impl MachineEnv {
    /// All allocatable registers of a class, preferred first.
    pub fn regs_of_class(&self, class: RegClass) -> impl Iterator<Item = PReg> + '_ {
        self.preferred_regs_by_class[class as usize]
            .iter()
            .chain(self.non_preferred_regs_by_class[class as usize].iter())
            .copied()
    }
}

/// Whether an edit applies before or after its instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EditPos {
    /// Before the instruction executes.
    Before,
    /// After the instruction executes.
    After,
}

/// A program point an edit is anchored to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditPoint {
    /// The instruction index.
    pub inst: InsnIndex,
    /// Before or after the instruction.
    pub pos: EditPos,
}

/// An edit the allocator asks the emitter to materialize.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edit {
    /// Move a value between two allocations (register or spill slot).
    Move {
        /// Source allocation: a pinned (physical) register or spill slot.
        from: Reg,
        /// Destination allocation.
        to: Reg,
        /// Register class of the moved value.
        class: RegClass,
    },
}

/// The result of register allocation.
#[derive(Clone, Debug, Default)]
pub struct Output {
    /// The allocation for each operand, parallel to the VCode's flat
    /// operand vector. Each entry is a pinned-vreg `Reg` or a spill-slot
    /// `Reg`.
    pub allocs: Vec<Reg>,
    /// Inserted moves, sorted by point (and in dependency order within one
    /// point).
    pub edits: Vec<(EditPoint, Edit)>,
    /// Number of spill slots used. Slots are sized and aligned by register
    /// class word size; the frame layout maps them to stack offsets.
    pub num_spillslots: usize,
}

/// Run register allocation over `vcode`.
pub fn run<I: VCodeInst>(vcode: &VCode<I>, env: &MachineEnv) -> Result<Output, RegAllocError> {
    let liveness = liveness::compute(vcode)?;
    let mut ctx = bundle::build(vcode, &liveness);
    bundle::merge_bundles(vcode, &mut ctx);
    assign::run(vcode, env, &liveness, ctx)
}
