//! Error types for the wasm translation.

use thiserror::Error;

/// A WebAssembly translation error.
///
/// When a WebAssembly function can't be translated, one of these error
/// codes will be returned to describe the failure.
#[derive(Error, Debug)]
pub enum WasmError {
    /// The input WebAssembly code is invalid.
    ///
    /// This error code is used by a WebAssembly translator when the
    /// binary cannot be decoded. Since the input is expected to have been
    /// validated already, this means either a bug in the validator or in
    /// the way it was driven.
    #[error("Invalid input WebAssembly code at offset {offset}: {message}")]
    InvalidWebAssembly {
        /// A string describing the validation error.
        message: String,
        /// The bytecode offset where the error occurred.
        offset: usize,
    },

    /// A feature used by the WebAssembly code is not supported by this
    /// translator.
    ///
    /// Embedding environments may have their own limitations and
    /// feature restrictions; atomics, SIMD shuffles and similar deferred
    /// proposals are refused with this error rather than silently
    /// degraded.
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// A generic error from the code generator.
    #[error("Codegen error: {0}")]
    Codegen(#[from] anvil_codegen::CodegenError),
}

/// A convenient alias for a `Result` that uses `WasmError` as the error
/// type.
pub type WasmResult<T> = Result<T, WasmError>;

impl From<wasmparser::BinaryReaderError> for WasmError {
    fn from(e: wasmparser::BinaryReaderError) -> Self {
        Self::InvalidWebAssembly {
            message: e.message().into(),
            offset: e.offset(),
        }
    }
}

/// A convenience macro for returning `WasmError::Unsupported`.
macro_rules! wasm_unsupported {
    ($($arg:tt)*) => { crate::errors::WasmError::Unsupported(format!($($arg)*)) }
}
pub(crate) use wasm_unsupported;
