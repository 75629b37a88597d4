//! X86_64-bit Instruction Set Architecture.

use crate::ir::Function;
use crate::isa::TargetIsa;
use crate::machinst::abi::ABIMachineSpec;
use crate::machinst::{compile, CompiledCode};
use crate::result::CodegenResult;
use crate::settings as shared_settings;
use target_lexicon::Triple;

pub mod abi;
pub mod inst;
mod lower;

pub use inst::emit::EmitInfo;

/// x64-specific settings.
pub mod settings {
    /// ISA flags for x64.
    ///
    /// The baseline is SSE2 (guaranteed by the x86-64 architecture). The
    /// bit-counting instructions and the AVX/AVX-512 encodings are gated
    /// on their respective CPUID feature flags.
    #[derive(Clone, Debug)]
    pub struct Flags {
        /// Has AVX (VEX encodings of the scalar float operations).
        pub has_avx: bool,
        /// Has AVX2.
        pub has_avx2: bool,
        /// Has AVX-512 (VL+F; EVEX encodings of the scalar float
        /// operations).
        pub has_avx512: bool,
        /// Has BMI1 (lzcnt/tzcnt).
        pub has_bmi: bool,
        /// Has SSE4.2 (and popcnt).
        pub has_sse42: bool,
    }

    impl Default for Flags {
        fn default() -> Self {
            Self {
                has_avx: false,
                has_avx2: false,
                has_avx512: false,
                has_bmi: true,
                has_sse42: true,
            }
        }
    }
}

/// An x64 backend.
pub struct X64Backend {
    triple: Triple,
    flags: shared_settings::Flags,
    isa_flags: settings::Flags,
}

impl X64Backend {
    /// Create a new x64 backend with the given (shared) flags.
    pub fn new(
        triple: Triple,
        flags: shared_settings::Flags,
        isa_flags: settings::Flags,
    ) -> Self {
        Self {
            triple,
            flags,
            isa_flags,
        }
    }

    /// The shared flags.
    pub fn flags(&self) -> &shared_settings::Flags {
        &self.flags
    }

    /// The ISA flags.
    pub fn isa_flags(&self) -> &settings::Flags {
        &self.isa_flags
    }
}

impl TargetIsa for X64Backend {
    fn name(&self) -> &'static str {
        "x64"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn compile_function(&self, func: &Function) -> CodegenResult<CompiledCode> {
        let emit_info = EmitInfo::new(self.flags.clone(), self.isa_flags.clone());
        let env = abi::X64MachineDeps::machine_env(func.signature.call_conv);
        let backend = lower::X64LowerBackend {
            flags: self.flags.clone(),
            isa_flags: self.isa_flags.clone(),
        };
        compile::compile_function(func, &backend, &self.flags, &emit_info, &env)
    }
}
