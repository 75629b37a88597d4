//! A "dummy" embedding environment, for testing the wasm translation.
//!
//! The module layout assumed by this environment is deliberately simple:
//! every function takes a VM context pointer as its last argument;
//! `vmctx+0` holds the linear-memory base, `vmctx+8` the memory size in
//! pages, and the globals live at `vmctx + 16 + index*8`. Bulk-memory
//! operations become calls to runtime library functions.

use crate::environ::spec::{FuncEnvironment, GlobalVariable};
use crate::errors::{wasm_unsupported, WasmResult};
use crate::translation_utils::{
    sig_from_functy, value_type, FuncIndex, GlobalIndex, MemoryIndex, SignatureIndex, TableIndex,
};
use anvil_codegen::ir::{
    self, AbiParam, ArgumentPurpose, ExtFuncData, ExternalName, InstBuilder, MemFlags, Signature,
    Type, Value,
};
use anvil_codegen::isa::CallConv;
use anvil_entity::{EntityRef, PrimaryMap};
use anvil_frontend::FunctionBuilder;
use std::vec::Vec;

/// Layout offsets of the dummy `vmctx`.
const VMCTX_MEMORY_BASE: i32 = 0;
const VMCTX_MEMORY_PAGES: i32 = 8;
const VMCTX_GLOBALS_BASE: i32 = 16;

/// The collected module-level information a `DummyEnvironment` carries
/// between the module translation and the function translations.
#[derive(Default)]
pub struct ModuleInfo {
    /// Signatures as translated IR signatures (without the vmctx
    /// parameter) and the wasm function types they came from.
    pub signatures: PrimaryMap<SignatureIndex, (Signature, wasmparser::FuncType)>,
    /// The signature index of each function.
    pub functions: PrimaryMap<FuncIndex, SignatureIndex>,
    /// The types of the globals.
    pub globals: PrimaryMap<GlobalIndex, Type>,
    /// Number of linear memories.
    pub memory_count: usize,
    /// The translated functions.
    pub function_bodies: PrimaryMap<FuncIndex, ir::Function>,
}

/// This `FuncEnvironment` implementation is a "naïve" one, doing
/// essentially nothing and emitting placeholders when forced to. Used for
/// testing.
pub struct DummyEnvironment {
    /// Module information: function and signature indices.
    pub info: ModuleInfo,
    /// The calling convention used for the translated functions.
    pub call_conv: CallConv,
}

impl DummyEnvironment {
    /// Create a new `DummyEnvironment`.
    pub fn new(call_conv: CallConv) -> Self {
        Self {
            info: ModuleInfo::default(),
            call_conv,
        }
    }

    /// The full native signature of function `index`, including the
    /// vmctx parameter.
    pub fn native_signature(&self, index: FuncIndex) -> Signature {
        let sigidx = self.info.functions[index];
        let mut sig = self.info.signatures[sigidx].0.clone();
        sig.params.push(AbiParam::special(
            ir::types::I64,
            ArgumentPurpose::VMContext,
        ));
        sig
    }

    fn vmctx_value(&self, builder: &mut FunctionBuilder) -> Value {
        let entry = builder
            .func
            .layout
            .entry_block()
            .expect("nothing translated yet");
        let vmctx_index = builder
            .func
            .signature
            .special_param_index(ArgumentPurpose::VMContext)
            .expect("no vmctx parameter");
        builder.func.dfg.block_params(entry)[vmctx_index]
    }

    fn libcall(
        &mut self,
        builder: &mut FunctionBuilder,
        name: &str,
        params: &[Type],
        returns: &[Type],
    ) -> ir::FuncRef {
        let mut sig = Signature::new(self.call_conv);
        for &ty in params {
            sig.params.push(AbiParam::new(ty));
        }
        sig.params.push(AbiParam::special(
            ir::types::I64,
            ArgumentPurpose::VMContext,
        ));
        for &ty in returns {
            sig.returns.push(AbiParam::new(ty));
        }
        let sigref = builder.import_signature(sig);
        builder.import_function(ExtFuncData {
            name: ExternalName::LibCall(name.into()),
            signature: sigref,
            colocated: false,
        })
    }
}

impl FuncEnvironment for DummyEnvironment {
    fn make_global(
        &mut self,
        builder: &mut FunctionBuilder,
        index: GlobalIndex,
    ) -> WasmResult<GlobalVariable> {
        let ty = self.info.globals[index];
        let base = self.vmctx_value(builder);
        Ok(GlobalVariable::Memory {
            base,
            offset: VMCTX_GLOBALS_BASE + (index.index() as i32) * 8,
            ty,
        })
    }

    fn make_direct_func(
        &mut self,
        func: &mut ir::Function,
        index: FuncIndex,
    ) -> WasmResult<ir::FuncRef> {
        let sigidx = self.info.functions[index];
        let mut sig = self.info.signatures[sigidx].0.clone();
        sig.params.push(AbiParam::special(
            ir::types::I64,
            ArgumentPurpose::VMContext,
        ));
        let sigref = func.import_signature(sig);
        Ok(func.import_function(ExtFuncData {
            name: ExternalName::user(0, index.index() as u32),
            signature: sigref,
            colocated: true,
        }))
    }

    fn make_indirect_sig(
        &mut self,
        func: &mut ir::Function,
        index: SignatureIndex,
    ) -> WasmResult<ir::SigRef> {
        let mut sig = self.info.signatures[index].0.clone();
        sig.params.push(AbiParam::special(
            ir::types::I64,
            ArgumentPurpose::VMContext,
        ));
        Ok(func.import_signature(sig))
    }

    fn translate_call(
        &mut self,
        builder: &mut FunctionBuilder,
        _callee_index: FuncIndex,
        callee: ir::FuncRef,
        call_args: &[Value],
    ) -> WasmResult<ir::Inst> {
        let vmctx = self.vmctx_value(builder);
        let mut args = call_args.to_vec();
        args.push(vmctx);
        Ok(builder.ins().call(callee, &args))
    }

    fn translate_call_indirect(
        &mut self,
        builder: &mut FunctionBuilder,
        _table_index: TableIndex,
        _sig_index: SignatureIndex,
        sig_ref: ir::SigRef,
        callee: Value,
        call_args: &[Value],
    ) -> WasmResult<ir::Inst> {
        // The dummy table holds raw function addresses; a real embedding
        // would bounds-check the table and verify the signature here.
        let vmctx = self.vmctx_value(builder);
        let mut args = call_args.to_vec();
        args.push(vmctx);
        let addr = builder.ins().uextend(ir::types::I64, callee);
        Ok(builder.ins().call_indirect(sig_ref, addr, &args))
    }

    fn translate_memory_base(
        &mut self,
        builder: &mut FunctionBuilder,
        _index: MemoryIndex,
    ) -> WasmResult<Value> {
        let vmctx = self.vmctx_value(builder);
        Ok(builder
            .ins()
            .load(ir::types::I64, MemFlags::trusted(), vmctx, VMCTX_MEMORY_BASE))
    }

    fn translate_memory_size(
        &mut self,
        builder: &mut FunctionBuilder,
        _index: MemoryIndex,
    ) -> WasmResult<Value> {
        let vmctx = self.vmctx_value(builder);
        Ok(builder.ins().load(
            ir::types::I32,
            MemFlags::trusted(),
            vmctx,
            VMCTX_MEMORY_PAGES,
        ))
    }

    fn translate_memory_grow(
        &mut self,
        builder: &mut FunctionBuilder,
        _index: MemoryIndex,
        delta: Value,
    ) -> WasmResult<Value> {
        let grow = self.libcall(builder, "memory_grow", &[ir::types::I32], &[ir::types::I32]);
        let vmctx = self.vmctx_value(builder);
        let call = builder.ins().call(grow, &[delta, vmctx]);
        Ok(builder.func.dfg.first_result(call))
    }

    fn translate_memory_copy(
        &mut self,
        builder: &mut FunctionBuilder,
        _index: MemoryIndex,
        dst: Value,
        src: Value,
        len: Value,
    ) -> WasmResult<()> {
        let copy = self.libcall(
            builder,
            "memory_copy",
            &[ir::types::I32, ir::types::I32, ir::types::I32],
            &[],
        );
        let vmctx = self.vmctx_value(builder);
        builder.ins().call(copy, &[dst, src, len, vmctx]);
        Ok(())
    }

    fn translate_memory_fill(
        &mut self,
        builder: &mut FunctionBuilder,
        _index: MemoryIndex,
        dst: Value,
        val: Value,
        len: Value,
    ) -> WasmResult<()> {
        let fill = self.libcall(
            builder,
            "memory_fill",
            &[ir::types::I32, ir::types::I32, ir::types::I32],
            &[],
        );
        let vmctx = self.vmctx_value(builder);
        builder.ins().call(fill, &[dst, val, len, vmctx]);
        Ok(())
    }

    fn blocktype_params_results(
        &self,
        blocktype: wasmparser::BlockType,
    ) -> WasmResult<(Vec<Type>, Vec<Type>)> {
        Ok(match blocktype {
            wasmparser::BlockType::Empty => (Vec::new(), Vec::new()),
            wasmparser::BlockType::Type(ty) => (Vec::new(), vec![value_type(ty)?]),
            wasmparser::BlockType::FuncType(index) => {
                let (_, functy) = self
                    .info
                    .signatures
                    .get(SignatureIndex::new(index as usize))
                    .ok_or_else(|| wasm_unsupported!("unknown block type {index}"))?;
                let params = functy
                    .params()
                    .iter()
                    .map(|&t| value_type(t))
                    .collect::<WasmResult<Vec<_>>>()?;
                let results = functy
                    .results()
                    .iter()
                    .map(|&t| value_type(t))
                    .collect::<WasmResult<Vec<_>>>()?;
                (params, results)
            }
        })
    }
}

/// Build the IR signature (without vmctx) for a wasm function type, using
/// the environment's calling convention.
pub(crate) fn translate_signature(
    call_conv: CallConv,
    functy: &wasmparser::FuncType,
) -> WasmResult<Signature> {
    sig_from_functy(call_conv, functy)
}
