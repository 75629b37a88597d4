//! Result and error types representing the outcome of compiling a function.

use crate::regalloc::RegAllocError;
use std::fmt;
use std::string::String;

/// A compilation error.
///
/// When Anvil fails to compile a function, it will return one of these error
/// codes.
#[derive(Debug, PartialEq, Eq)]
pub enum CodegenError {
    /// A feature is not supported by the target or by this build.
    ///
    /// This is attached to requests for opcodes, types, or (ISA, calling
    /// convention) pairs the selected backend does not implement. It is
    /// never a silent fallback.
    Unsupported(String),

    /// An immediate operand has no legal encoding on the target.
    ImmediateOutOfRange,

    /// A branch offset exceeds the addressable range even after veneer
    /// insertion; indicates a misconfigured code buffer.
    BranchOutOfRange,

    /// An implementation limit was exceeded (too many labels, spill slots,
    /// or a code region larger than the buffer supports).
    Overflow,

    /// The register allocator rejected the function.
    Regalloc(RegAllocError),

    /// The generated code for the function exceeds the limits of the
    /// relocation model.
    CodeTooLarge,
}

/// A convenient alias for a `Result` that uses `CodegenError` as the error
/// type.
pub type CodegenResult<T> = Result<T, CodegenError>;

impl std::error::Error for CodegenError {}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodegenError::Unsupported(feature) => write!(f, "unsupported: {feature}"),
            CodegenError::ImmediateOutOfRange => write!(f, "immediate out of encodable range"),
            CodegenError::BranchOutOfRange => write!(f, "branch out of range"),
            CodegenError::Overflow => write!(f, "implementation limit exceeded"),
            CodegenError::Regalloc(e) => write!(f, "register allocation failed: {e}"),
            CodegenError::CodeTooLarge => write!(f, "code is too large"),
        }
    }
}

impl From<RegAllocError> for CodegenError {
    fn from(e: RegAllocError) -> Self {
        CodegenError::Regalloc(e)
    }
}
