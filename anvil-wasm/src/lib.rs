//! Performs translation from a wasm module in binary format to the
//! in-memory form of Anvil IR.
//!
//! The translation is accomplished in two parts: the base translation of
//! the wasm stack machine into the SSA-based IR (this crate's
//! [`FuncTranslator`] and the operator dispatch in `code_translator`), and
//! the module environment ([`FuncEnvironment`]) which tells the translator
//! how module-level concepts such as globals, linear memory and indirect
//! calls are materialized for the particular embedding.
//!
//! The input is expected to be *validated* WebAssembly; the translator
//! does not re-run validation, and malformed input is a programmer error,
//! not a recoverable condition.

#![warn(missing_docs)]

mod code_translator;
mod environ;
mod errors;
mod func_translator;
mod module_translator;
mod state;
mod translation_utils;

pub use crate::environ::{DummyEnvironment, FuncEnvironment, GlobalVariable, ModuleInfo};
pub use crate::errors::{WasmError, WasmResult};
pub use crate::func_translator::FuncTranslator;
pub use crate::module_translator::translate_module;
pub use crate::translation_utils::{
    FuncIndex, GlobalIndex, MemoryIndex, SignatureIndex, TableIndex,
};
