//! ARM 64-bit Instruction Set Architecture.

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

/// AArch64-specific settings.
pub mod settings {
    /// ISA flags for AArch64.
    #[derive(Clone, Debug)]
    pub struct Flags {
        /// Has Advanced SIMD (NEON). On by default: every ARMv8-A
        /// implementation carries it, and the scalar popcount lowering
        /// uses it.
        pub has_neon: bool,
    }

    impl Default for Flags {
        fn default() -> Self {
            Self { has_neon: true }
        }
    }
}

/// An AArch64 backend.
pub struct AArch64Backend {
    triple: Triple,
    flags: shared_settings::Flags,
    isa_flags: settings::Flags,
}

impl AArch64Backend {
    /// Create a new AArch64 backend with the given (shared) flags.
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

impl TargetIsa for AArch64Backend {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn compile_function(&self, func: &Function) -> CodegenResult<CompiledCode> {
        let emit_info = EmitInfo::new(self.flags.clone());
        let env = abi::AArch64MachineDeps::machine_env(func.signature.call_conv);
        let backend = lower::AArch64LowerBackend {
            flags: self.flags.clone(),
            isa_flags: self.isa_flags.clone(),
        };
        compile::compile_function(func, &backend, &self.flags, &emit_info, &env)
    }
}
