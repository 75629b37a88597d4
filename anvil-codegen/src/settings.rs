//! Shared compilation settings.
//!
//! Settings that apply to every backend live here; each ISA adds its own
//! flag struct on top (`isa::x64::settings`, `isa::aarch64::settings`).

use core::fmt;

/// Optimization level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OptLevel {
    /// Compile as fast as possible; no instruction sinking or peephole
    /// cleanup.
    #[default]
    None,
    /// Optimize for speed: enable single-use value sinking (compare+branch
    /// and load+op combining) and branch peepholes in the code buffer.
    Speed,
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Speed => "speed",
        })
    }
}

/// Flags that apply to all backends.
#[derive(Clone, Debug, Default)]
pub struct Flags {
    opt_level: OptLevel,
}

impl Flags {
    /// Create flags with the given optimization level.
    pub fn new(opt_level: OptLevel) -> Self {
        Self { opt_level }
    }

    /// Get the optimization level.
    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }

    /// Is instruction sinking enabled?
    ///
    /// Sinking merges a single-use value into its consumer during lowering;
    /// it changes only code quality, never semantics, so it is gated on the
    /// optimization level.
    pub fn enable_sinking(&self) -> bool {
        self.opt_level == OptLevel::Speed
    }
}
