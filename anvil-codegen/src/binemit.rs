//! Binary machine code emission definitions.
//!
//! The `binemit` module contains the types shared by the code sink layer:
//! code offsets, relocation kinds, and the records the embedder consumes to
//! build an object file.

use crate::ir::{ExternalName, SourceLoc, TrapCode};
use core::fmt;

/// Offset in bytes from the beginning of the function.
///
/// Anvil can be used as a cross compiler, so `usize` is not appropriate
/// here.
pub type CodeOffset = u32;

/// Addend to add to the symbol value.
pub type Addend = i64;

/// Relocation kinds for every ISA.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Reloc {
    /// Absolute 4-byte.
    Abs4,
    /// Absolute 8-byte, e.g. `R_X86_64_64` / `R_AARCH64_ABS64`.
    Abs8,
    /// x86 PC-relative 4-byte, `R_X86_64_PC32`.
    X86PCRel4,
    /// x86 call to PC-relative 4-byte, via PLT: `R_X86_64_PLT32`.
    X86CallPLTRel4,
    /// x86 GOT PC-relative 4-byte, `R_X86_64_GOTPCREL`.
    X86GOTPCRel4,
    /// AArch64 call target (26-bit PC-relative branch),
    /// `ARM64_RELOC_BRANCH26` / `R_AARCH64_CALL26`.
    Arm64Call,
    /// AArch64 `adrp` page, `ARM64_RELOC_PAGE21`.
    Aarch64AdrPage21,
    /// AArch64 low-12-bit page offset, `ARM64_RELOC_PAGEOFF12`.
    Aarch64AddLo12,
    /// AArch64 GOT-load page, `ARM64_RELOC_GOT_LOAD_PAGE21`.
    Aarch64AdrGotPage21,
    /// AArch64 GOT-load page offset, `ARM64_RELOC_GOT_LOAD_PAGEOFF12`.
    Aarch64Ld64GotLo12Nc,
}

impl fmt::Display for Reloc {
    /// Display trait implementation drops the arch, since its used in
    /// contexts where the arch is already unambiguous.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Abs4 => write!(f, "Abs4"),
            Self::Abs8 => write!(f, "Abs8"),
            Self::X86PCRel4 => write!(f, "PCRel4"),
            Self::X86CallPLTRel4 => write!(f, "CallPLTRel4"),
            Self::X86GOTPCRel4 => write!(f, "GOTPCRel4"),
            Self::Arm64Call => write!(f, "Arm64Call"),
            Self::Aarch64AdrPage21 => write!(f, "AdrPage21"),
            Self::Aarch64AddLo12 => write!(f, "AddLo12"),
            Self::Aarch64AdrGotPage21 => write!(f, "AdrGotPage21"),
            Self::Aarch64Ld64GotLo12Nc => write!(f, "Ld64GotLo12Nc"),
        }
    }
}

/// A relocation resulting from a compilation.
#[derive(Clone, Debug, PartialEq)]
pub struct MachReloc {
    /// The offset at which the relocation applies, *relative to the
    /// containing section*.
    pub offset: CodeOffset,
    /// The kind of relocation.
    pub kind: Reloc,
    /// The external symbol / name to which this relocation refers.
    pub name: ExternalName,
    /// The addend to add to the symbol value.
    pub addend: Addend,
}

/// A trap record resulting from a compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachTrap {
    /// The offset at which the trap instruction occurs, *relative to the
    /// containing section*.
    pub offset: CodeOffset,
    /// The trap code.
    pub code: TrapCode,
}

/// A call site record resulting from a compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachCallSite {
    /// The offset of the call's return address, *relative to the containing
    /// section*.
    pub ret_addr: CodeOffset,
}

/// A source-location mapping resulting from a compilation.
///
/// The byte range is over machine code; the source location is the one
/// attached to the originating IR instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachSrcLoc {
    /// The start of the region of code corresponding to a source location.
    pub start: CodeOffset,
    /// The end of the region of code corresponding to a source location.
    pub end: CodeOffset,
    /// The source location.
    pub loc: SourceLoc,
}
