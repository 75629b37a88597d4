//! All the runtime support necessary for the wasm-to-IR translation is
//! formalized by the trait `FuncEnvironment`.
//!
//! The `FuncEnvironment` trait defines the exact hooks the per-function
//! translation needs from the embedding: how to materialize globals,
//! linear-memory accesses, and the two kinds of calls. The translation
//! itself stays completely agnostic of the module's runtime layout.

use crate::errors::WasmResult;
use crate::translation_utils::{FuncIndex, GlobalIndex, MemoryIndex, SignatureIndex, TableIndex};
use anvil_codegen::ir::{self, InstBuilder, Type, Value};
use anvil_frontend::FunctionBuilder;
use std::vec::Vec;

/// The value of a WebAssembly global variable.
#[derive(Clone, Copy)]
pub enum GlobalVariable {
    /// This is a constant global with a value known at compile time.
    Const(Value),
    /// This is a variable in memory that should be referenced through a
    /// pointer-plus-offset computation.
    Memory {
        /// The address of the global variable storage.
        base: Value,
        /// An offset to add to the base.
        offset: i32,
        /// The global variable's type.
        ty: Type,
    },
}

/// Environment affecting the translation of a single WebAssembly
/// function.
pub trait FuncEnvironment {
    /// Get the type of the pointers on the target.
    fn pointer_type(&self) -> Type {
        ir::types::I64
    }

    /// Set up the necessary preamble definitions in `func` to access the
    /// global variable identified by `index`.
    fn make_global(
        &mut self,
        builder: &mut FunctionBuilder,
        index: GlobalIndex,
    ) -> WasmResult<GlobalVariable>;

    /// Set up an external function definition in the preamble of `func`
    /// that can be used to directly call the function `index`.
    fn make_direct_func(
        &mut self,
        func: &mut ir::Function,
        index: FuncIndex,
    ) -> WasmResult<ir::FuncRef>;

    /// Set up a signature definition in the preamble of `func` that can
    /// be used for an indirect call with signature `index`.
    fn make_indirect_sig(
        &mut self,
        func: &mut ir::Function,
        index: SignatureIndex,
    ) -> WasmResult<ir::SigRef>;

    /// Translate a `call` WebAssembly instruction at the builder's
    /// current position.
    fn translate_call(
        &mut self,
        builder: &mut FunctionBuilder,
        callee_index: FuncIndex,
        callee: ir::FuncRef,
        call_args: &[Value],
    ) -> WasmResult<ir::Inst> {
        let _ = callee_index;
        Ok(builder.ins().call(callee, call_args))
    }

    /// Translate a `call_indirect` WebAssembly instruction at the
    /// builder's current position.
    fn translate_call_indirect(
        &mut self,
        builder: &mut FunctionBuilder,
        table_index: TableIndex,
        sig_index: SignatureIndex,
        sig_ref: ir::SigRef,
        callee: Value,
        call_args: &[Value],
    ) -> WasmResult<ir::Inst>;

    /// The base address of linear memory `index`, as a pointer-typed
    /// value.
    fn translate_memory_base(
        &mut self,
        builder: &mut FunctionBuilder,
        index: MemoryIndex,
    ) -> WasmResult<Value>;

    /// Translate a `memory.size` instruction, returning the size in
    /// pages.
    fn translate_memory_size(
        &mut self,
        builder: &mut FunctionBuilder,
        index: MemoryIndex,
    ) -> WasmResult<Value>;

    /// Translate a `memory.grow` instruction, returning the old size in
    /// pages, or `-1` on failure.
    fn translate_memory_grow(
        &mut self,
        builder: &mut FunctionBuilder,
        index: MemoryIndex,
        delta: Value,
    ) -> WasmResult<Value>;

    /// Translate a `memory.copy` instruction.
    fn translate_memory_copy(
        &mut self,
        builder: &mut FunctionBuilder,
        index: MemoryIndex,
        dst: Value,
        src: Value,
        len: Value,
    ) -> WasmResult<()>;

    /// Translate a `memory.fill` instruction.
    fn translate_memory_fill(
        &mut self,
        builder: &mut FunctionBuilder,
        index: MemoryIndex,
        dst: Value,
        val: Value,
        len: Value,
    ) -> WasmResult<()>;

    /// The parameter and result types of the given wasm block type.
    fn blocktype_params_results(
        &self,
        blocktype: wasmparser::BlockType,
    ) -> WasmResult<(Vec<Type>, Vec<Type>)>;
}
