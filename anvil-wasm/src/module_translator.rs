//! Translation skeleton that traverses the whole WebAssembly module and
//! translates each function body.

use crate::environ::DummyEnvironment;
use crate::errors::{wasm_unsupported, WasmResult};
use crate::func_translator::FuncTranslator;
use crate::translation_utils::{sig_from_functy, value_type, FuncIndex, SignatureIndex};
use anvil_codegen::ir;
use anvil_entity::EntityRef;
use wasmparser::{Parser, Payload, TypeRef};

/// Translate a whole module's code section against a
/// [`DummyEnvironment`], leaving the translated functions in
/// `environ.info.function_bodies`.
///
/// A real embedding drives the section traversal itself (it also needs
/// data segments, exports and start functions); this traversal covers the
/// sections that affect function translation and is primarily used by
/// tests.
pub fn translate_module(data: &[u8], environ: &mut DummyEnvironment) -> WasmResult<()> {
    let mut translator = FuncTranslator::new();
    let mut code_index = 0u32;

    for payload in Parser::new(0).parse_all(data) {
        match payload? {
            Payload::TypeSection(types) => {
                for ty in types {
                    match ty? {
                        wasmparser::Type::Func(functy) => {
                            let sig = sig_from_functy(environ.call_conv, &functy)?;
                            environ.info.signatures.push((sig, functy));
                        }
                    }
                }
            }
            Payload::ImportSection(imports) => {
                for import in imports {
                    let import = import?;
                    match import.ty {
                        TypeRef::Func(sig) => {
                            environ
                                .info
                                .functions
                                .push(SignatureIndex::new(sig as usize));
                            code_index += 1;
                        }
                        TypeRef::Global(g) => {
                            environ.info.globals.push(value_type(g.content_type)?);
                        }
                        TypeRef::Memory(_) => {
                            environ.info.memory_count += 1;
                        }
                        TypeRef::Table(_) => {}
                        other => {
                            return Err(wasm_unsupported!("import {other:?}"));
                        }
                    }
                }
            }
            Payload::FunctionSection(functions) => {
                for f in functions {
                    environ
                        .info
                        .functions
                        .push(SignatureIndex::new(f? as usize));
                }
            }
            Payload::MemorySection(memories) => {
                for memory in memories {
                    let _ = memory?;
                    environ.info.memory_count += 1;
                }
            }
            Payload::GlobalSection(globals) => {
                for global in globals {
                    let global = global?;
                    environ
                        .info
                        .globals
                        .push(value_type(global.ty.content_type)?);
                }
            }
            Payload::CodeSectionEntry(body) => {
                let func_index = FuncIndex::new(code_index as usize);
                let mut func = ir::Function::with_name_signature(
                    ir::ExternalName::user(0, code_index),
                    environ.native_signature(func_index),
                );
                translator.translate_body(&body, &mut func, environ)?;
                environ.info.function_bodies.push(func);
                code_index += 1;
            }
            _ => {}
        }
    }
    Ok(())
}
