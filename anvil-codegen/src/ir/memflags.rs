//! Memory operation flags.

use core::fmt;

enum FlagBit {
    Notrap,
    Aligned,
    Readonly,
}

const NAMES: [&str; 3] = ["notrap", "aligned", "readonly"];

/// Flags for memory operations like load/store.
///
/// Each of these flags introduce a limited form of undefined behavior. The
/// flags each enable certain optimizations that need to make additional
/// assumptions. Generally, the semantics of a program does not change when a
/// flag is removed, but adding a flag will.
///
/// In addition, the flags determine the trapping behavior of a memory
/// access: accesses that can't trap (`notrap`) don't get a trap record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct MemFlags {
    bits: u8,
}

impl MemFlags {
    /// Create a new empty set of flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set of flags representing an access from a "trusted"
    /// address, meaning it's known to be aligned and non-trapping.
    pub fn trusted() -> Self {
        let mut result = Self::new();
        result.set_notrap();
        result.set_aligned();
        result
    }

    /// Read a flag bit.
    fn read(self, bit: FlagBit) -> bool {
        self.bits & (1 << bit as usize) != 0
    }

    /// Set a flag bit.
    fn set(&mut self, bit: FlagBit) {
        self.bits |= 1 << bit as usize
    }

    /// Test if the `notrap` flag is set.
    ///
    /// Normally, trapping is part of the semantics of a load/store; this
    /// flag asserts the memory access will not trap, making it possible to
    /// delete it if the value is unused.
    pub fn notrap(self) -> bool {
        self.read(FlagBit::Notrap)
    }

    /// Set the `notrap` flag.
    pub fn set_notrap(&mut self) {
        self.set(FlagBit::Notrap)
    }

    /// Test if the `aligned` flag is set.
    ///
    /// By default, Anvil memory instructions work with any unaligned
    /// effective address. If the `aligned` flag is set, the instruction is
    /// permitted to trap or return a wrong value if the effective address is
    /// misaligned.
    pub fn aligned(self) -> bool {
        self.read(FlagBit::Aligned)
    }

    /// Set the `aligned` flag.
    pub fn set_aligned(&mut self) {
        self.set(FlagBit::Aligned)
    }

    /// Test if the `readonly` flag is set.
    ///
    /// Loads with this flag can be freely reordered with other loads and
    /// stores, since the accessed memory is constant for the lifetime of the
    /// function.
    pub fn readonly(self) -> bool {
        self.read(FlagBit::Readonly)
    }

    /// Set the `readonly` flag.
    pub fn set_readonly(&mut self) {
        self.set(FlagBit::Readonly)
    }
}

impl fmt::Display for MemFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, n) in NAMES.iter().enumerate() {
            if self.bits & (1 << i) != 0 {
                write!(f, " {n}")?;
            }
        }
        Ok(())
    }
}
