//! Stack slots.
//!
//! The `StackSlotData` struct keeps track of a single stack slot in a
//! function.

use core::fmt;

/// The kind of a stack slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StackSlotKind {
    /// An explicit stack slot. This is a chunk of stack memory for use by
    /// user-visible operations; the register allocator's spill slots are
    /// tracked separately in the frame layout.
    ExplicitSlot,
}

impl fmt::Display for StackSlotKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ExplicitSlot => f.write_str("explicit_slot"),
        }
    }
}

/// Contents of a stack slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackSlotData {
    /// The kind of stack slot.
    pub kind: StackSlotKind,

    /// Size of stack slot in bytes.
    pub size: u32,

    /// Alignment of stack slot as a power-of-two exponent.
    pub align_shift: u8,
}

impl StackSlotData {
    /// Create a stack slot with the specified byte size and alignment.
    pub fn new(kind: StackSlotKind, size: u32, align_shift: u8) -> Self {
        Self {
            kind,
            size,
            align_shift,
        }
    }
}

impl fmt::Display for StackSlotData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.align_shift != 0 {
            write!(
                f,
                "{} {}, align = {}",
                self.kind,
                self.size,
                1u32 << self.align_shift
            )
        } else {
            write!(f, "{} {}", self.kind, self.size)
        }
    }
}
