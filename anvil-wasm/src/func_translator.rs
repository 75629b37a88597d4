//! Stand-alone WebAssembly to Anvil IR translator.
//!
//! This module defines the `FuncTranslator` type; it contains the
//! wasm-to-IR translator for a single function body. It does not contain
//! the SSA construction (that lives in `anvil-frontend`) nor the
//! module-level handling of imports, globals and memories (that is the
//! [`FuncEnvironment`](crate::environ::FuncEnvironment)'s job).

use crate::code_translator::translate_operator;
use crate::environ::FuncEnvironment;
use crate::errors::{wasm_unsupported, WasmResult};
use crate::state::FuncTranslationState;
use anvil_codegen::ir::{self, InstBuilder};
use anvil_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use wasmparser::{FunctionBody, ValType};

/// WebAssembly to Anvil IR function translator.
///
/// A `FuncTranslator` is used to translate a binary WebAssembly function
/// into Anvil IR guided by a `FuncEnvironment` which provides information
/// about the containing module and the runtime environment.
pub struct FuncTranslator {
    func_ctx: FunctionBuilderContext,
    state: FuncTranslationState,
}

impl FuncTranslator {
    /// Create a new translator.
    pub fn new() -> Self {
        Self {
            func_ctx: FunctionBuilderContext::new(),
            state: FuncTranslationState::new(),
        }
    }

    /// Translate a binary WebAssembly function body into `func`.
    ///
    /// The IR function `func` should be completely empty except for the
    /// `func.name` and `func.signature`. The signature may contain
    /// special-purpose arguments (such as the VM context pointer) which
    /// are not regarded as WebAssembly locals.
    pub fn translate_body<FE: FuncEnvironment + ?Sized>(
        &mut self,
        body: &FunctionBody,
        func: &mut ir::Function,
        environ: &mut FE,
    ) -> WasmResult<()> {
        log::trace!(
            "translate_body: {} {}",
            func.name,
            func.signature
        );

        let mut builder = FunctionBuilder::new(func, &mut self.func_ctx);
        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        // The entry block has no predecessors.
        builder.seal_block(entry_block);

        let num_params = declare_wasm_parameters(&mut builder, entry_block);

        // Declare the rest of the locals, initialized to zero.
        let mut next_local = num_params;
        let mut locals = body.get_locals_reader()?;
        for _ in 0..locals.get_count() {
            let (count, ty) = locals.read()?;
            declare_locals(&mut builder, count, ty, &mut next_local)?;
        }

        // Set up the exit block, which collects the function's return
        // values as block parameters.
        let exit_block = builder.create_block();
        let return_types: smallvec::SmallVec<[ir::Type; 2]> = builder
            .func
            .signature
            .returns
            .iter()
            .map(|r| r.value_type)
            .collect();
        for ty in return_types {
            builder.func.dfg.append_block_param(exit_block, ty);
        }
        self.state
            .initialize(exit_block, builder.func.signature.returns.len());

        let mut reader = body.get_operators_reader()?;
        while !reader.eof() {
            let (op, offset) = reader.read_with_offset()?;
            builder.set_srcloc(ir::SourceLoc::new(offset as u32));
            translate_operator(&op, &mut builder, &mut self.state, environ)?;
        }
        reader.ensure_end()?;

        // The final `End` of the body popped the outermost frame and
        // switched to the exit block; emit the actual return.
        if self.state.reachable && !builder.is_unreachable() {
            let rets = self.state.stack.clone();
            builder.ins().return_(&rets);
        }
        self.state.stack.clear();
        debug_assert!(self.state.control_stack.is_empty());

        builder.finalize();
        Ok(())
    }
}

impl Default for FuncTranslator {
    fn default() -> Self {
        Self::new()
    }
}

/// Declare one variable for each WebAssembly parameter of the signature
/// (skipping special-purpose parameters such as the VM context), bound to
/// the entry block's parameter values. Returns the number of parameter
/// locals.
fn declare_wasm_parameters(builder: &mut FunctionBuilder, entry_block: ir::Block) -> usize {
    let sig_len = builder.func.signature.params.len();
    let mut next_local = 0;
    for i in 0..sig_len {
        let param = builder.func.signature.params[i];
        if param.purpose == ir::ArgumentPurpose::Normal {
            let local = Variable::with_u32(next_local as u32);
            builder.declare_var(local, param.value_type);
            let param_value = builder.func.dfg.block_params(entry_block)[i];
            builder.def_var(local, param_value);
            next_local += 1;
        }
    }
    next_local
}

/// Declare `count` locals of type `ty`, initialized to zero.
fn declare_locals(
    builder: &mut FunctionBuilder,
    count: u32,
    ty: ValType,
    next_local: &mut usize,
) -> WasmResult<()> {
    use anvil_codegen::ir::immediates::{Ieee32, Ieee64};
    use anvil_codegen::ir::types;
    let (ir_ty, init) = match ty {
        ValType::I32 => (types::I32, builder.ins().iconst(types::I32, 0)),
        ValType::I64 => (types::I64, builder.ins().iconst(types::I64, 0)),
        ValType::F32 => (types::F32, builder.ins().f32const(Ieee32::with_bits(0))),
        ValType::F64 => (types::F64, builder.ins().f64const(Ieee64::with_bits(0))),
        other => return Err(wasm_unsupported!("local type {other:?}")),
    };
    for _ in 0..count {
        let local = Variable::with_u32(*next_local as u32);
        builder.declare_var(local, ir_ty);
        builder.def_var(local, init);
        *next_local += 1;
    }
    Ok(())
}
