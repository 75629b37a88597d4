//! Helper functions and structures for the translation.

use crate::errors::{wasm_unsupported, WasmResult};
use anvil_codegen::ir;
use anvil_entity::entity_impl;

/// Index type of a function (imported or defined) inside the WebAssembly
/// module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct FuncIndex(u32);
entity_impl!(FuncIndex);

/// Index type of a global variable (imported or defined) inside the
/// WebAssembly module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct GlobalIndex(u32);
entity_impl!(GlobalIndex);

/// Index type of a linear memory (imported or defined) inside the
/// WebAssembly module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct MemoryIndex(u32);
entity_impl!(MemoryIndex);

/// Index type of a table (imported or defined) inside the WebAssembly
/// module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TableIndex(u32);
entity_impl!(TableIndex);

/// Index type of a signature inside the WebAssembly module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SignatureIndex(u32);
entity_impl!(SignatureIndex);

/// Convert a wasm value type to an IR type.
pub fn value_type(ty: wasmparser::ValType) -> WasmResult<ir::Type> {
    match ty {
        wasmparser::ValType::I32 => Ok(ir::types::I32),
        wasmparser::ValType::I64 => Ok(ir::types::I64),
        wasmparser::ValType::F32 => Ok(ir::types::F32),
        wasmparser::ValType::F64 => Ok(ir::types::F64),
        other => Err(wasm_unsupported!("value type {other:?}")),
    }
}

/// Convert a wasm function type to an IR signature.
pub fn sig_from_functy(
    call_conv: anvil_codegen::isa::CallConv,
    functy: &wasmparser::FuncType,
) -> WasmResult<ir::Signature> {
    let mut sig = ir::Signature::new(call_conv);
    for param in functy.params() {
        sig.params.push(ir::AbiParam::new(value_type(*param)?));
    }
    for ret in functy.results() {
        sig.returns.push(ir::AbiParam::new(value_type(*ret)?));
    }
    Ok(sig)
}
