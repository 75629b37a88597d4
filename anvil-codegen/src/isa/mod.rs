//! Instruction Set Architectures.
//!
//! The `isa` module provides a `TargetIsa` trait. It supports the
//! following ISAs: x86-64 and AArch64, selected by build features and by
//! target triple at runtime.

use crate::ir::Function;
use crate::machinst::CompiledCode;
use crate::result::{CodegenError, CodegenResult};
use crate::settings;
use core::fmt;
use target_lexicon::{Architecture, Triple};

#[cfg(feature = "arm64")]
pub mod aarch64;
#[cfg(feature = "x86")]
pub mod x64;

/// A calling convention.
///
/// The calling convention is part of a function's signature; the (ISA,
/// calling convention) pair selects the ABI tables used for argument
/// passing and the frame contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// The System V AMD64 / AAPCS64 convention of ELF platforms (the
    /// "default" convention of each ISA).
    SystemV,
    /// The Windows x64 "fastcall" convention.
    WindowsFastcall,
    /// The Apple AArch64 variant of AAPCS64 (packed stack arguments).
    AppleAarch64,
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::SystemV => "system_v",
            Self::WindowsFastcall => "windows_fastcall",
            Self::AppleAarch64 => "apple_aarch64",
        })
    }
}

impl CallConv {
    /// The default calling convention for a target triple.
    pub fn triple_default(triple: &Triple) -> Self {
        match triple.operating_system {
            target_lexicon::OperatingSystem::Windows => Self::WindowsFastcall,
            target_lexicon::OperatingSystem::MacOSX { .. }
            | target_lexicon::OperatingSystem::Darwin
                if triple.architecture == Architecture::Aarch64(target_lexicon::Aarch64Architecture::Aarch64) =>
            {
                Self::AppleAarch64
            }
            _ => Self::SystemV,
        }
    }
}

/// Methods implemented by a target backend.
pub trait TargetIsa: Send + Sync {
    /// The name of this ISA.
    fn name(&self) -> &'static str;

    /// The triple this ISA compiles for.
    fn triple(&self) -> &Triple;

    /// Compile a function to machine code, running the whole pipeline:
    /// lowering, register allocation, and emission.
    fn compile_function(&self, func: &Function) -> CodegenResult<CompiledCode>;
}

impl fmt::Debug for dyn TargetIsa + '_ {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TargetIsa {{ triple: {:?} }}", self.triple())
    }
}

/// Look up a backend for the given target triple, with the given shared
/// flags and default ISA flags.
///
/// An unknown or disabled architecture is a configuration error.
pub fn lookup(triple: Triple, flags: settings::Flags) -> CodegenResult<Box<dyn TargetIsa>> {
    match triple.architecture {
        Architecture::X86_64 => {
            #[cfg(feature = "x86")]
            {
                Ok(Box::new(x64::X64Backend::new(
                    triple,
                    flags,
                    x64::settings::Flags::default(),
                )))
            }
            #[cfg(not(feature = "x86"))]
            {
                Err(CodegenError::Unsupported(
                    "x86-64 support disabled by build features".into(),
                ))
            }
        }
        Architecture::Aarch64(..) => {
            #[cfg(feature = "arm64")]
            {
                Ok(Box::new(aarch64::AArch64Backend::new(
                    triple,
                    flags,
                    aarch64::settings::Flags::default(),
                )))
            }
            #[cfg(not(feature = "arm64"))]
            {
                Err(CodegenError::Unsupported(
                    "aarch64 support disabled by build features".into(),
                ))
            }
        }
        _ => Err(CodegenError::Unsupported(format!(
            "no backend for architecture {}",
            triple.architecture
        ))),
    }
}
