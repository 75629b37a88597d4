//! This module contains the bulk of the interesting code performing the
//! translation between WebAssembly and Anvil IR.
//!
//! The translation is done in one pass, opcode by opcode. Two main data
//! structures are used during code translation: the value stack and the
//! control stack. The value stack mimics the execution of the WebAssembly
//! stack machine: each instruction result is pushed onto the stack and
//! instruction arguments are popped off the stack. Similarly, when
//! encountering a control flow block, it is pushed onto the control stack
//! and popped off when encountering the corresponding `End`.
//!
//! The translation state also records reachability: after an
//! unconditional branch, return or trap, operators produce no IR until a
//! block header restores reachability.
//!
//! `br_table` is the delicate case. The IR's `br_table` cannot pass block
//! arguments on its edges, so whenever any target needs arguments, one
//! intermediate block per *unique depth* is created; the table dispatches
//! to the intermediates and each intermediate jumps to the real
//! destination carrying the proper argument set. The intermediate blocks
//! are a semantic necessity (the register allocator needs an edge to put
//! block-parameter moves on), not an optimization.

use crate::environ::{FuncEnvironment, GlobalVariable};
use crate::errors::{wasm_unsupported, WasmResult};
use crate::state::{ControlStackFrame, ElseData, FuncTranslationState};
use crate::translation_utils::{
    value_type, FuncIndex, GlobalIndex, MemoryIndex, SignatureIndex, TableIndex,
};
use anvil_codegen::ir::condcodes::{FloatCC, IntCC};
use anvil_codegen::ir::immediates::{Ieee32, Ieee64, Offset32};
use anvil_codegen::ir::instructions::BlockCall;
use anvil_codegen::ir::types::{F32, F64, I32, I64, I8};
use anvil_codegen::ir::{self, InstBuilder, JumpTableData, MemFlags, TrapCode, Value};
use anvil_entity::EntityRef;
use anvil_frontend::FunctionBuilder;
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::vec::Vec;
use wasmparser::{MemArg, Operator};

/// Translates wasm operators into Anvil IR instructions.
pub fn translate_operator<FE: FuncEnvironment + ?Sized>(
    op: &Operator,
    builder: &mut FunctionBuilder,
    state: &mut FuncTranslationState,
    environ: &mut FE,
) -> WasmResult<()> {
    if !state.reachable {
        return translate_unreachable_operator(op, builder, state, environ);
    }

    match op {
        /********************************** Locals *****************************************
         * `local.get` and `local.set` are treated as non-SSA variables and
         * will completely disappear in the IR.
         ***********************************************************************************/
        Operator::LocalGet { local_index } => {
            let val = builder.use_var(anvil_frontend::Variable::with_u32(*local_index));
            state.push1(val);
        }
        Operator::LocalSet { local_index } => {
            let val = state.pop1();
            builder.def_var(anvil_frontend::Variable::with_u32(*local_index), val);
        }
        Operator::LocalTee { local_index } => {
            let val = state.peek1();
            builder.def_var(anvil_frontend::Variable::with_u32(*local_index), val);
        }
        /********************************** Globals ****************************************
         * `global.get` and `global.set` are handled by the environment.
         ***********************************************************************************/
        Operator::GlobalGet { global_index } => {
            let val = match environ.make_global(builder, GlobalIndex::new(*global_index as usize))?
            {
                GlobalVariable::Const(val) => val,
                GlobalVariable::Memory { base, offset, ty } => {
                    builder.ins().load(ty, MemFlags::trusted(), base, offset)
                }
            };
            state.push1(val);
        }
        Operator::GlobalSet { global_index } => {
            match environ.make_global(builder, GlobalIndex::new(*global_index as usize))? {
                GlobalVariable::Const(_) => {
                    return Err(wasm_unsupported!(
                        "global.set of an immutable global {global_index}"
                    ))
                }
                GlobalVariable::Memory { base, offset, .. } => {
                    let val = state.pop1();
                    builder.ins().store(MemFlags::trusted(), val, base, offset);
                }
            }
        }
        /********************************* Stack misc **************************************/
        Operator::Drop => {
            state.pop1();
        }
        Operator::Select => {
            let (arg1, arg2, cond) = state.pop3();
            state.push1(builder.ins().select(cond, arg1, arg2));
        }
        Operator::Nop => {
            // We do nothing.
        }
        Operator::Unreachable => {
            builder.ins().trap(TrapCode::UnreachableCodeReached);
            state.reachable = false;
        }
        /***************************** Control flow blocks *********************************
         * When starting a control flow block, we create a new block that
         * will hold the code after the block, and push a frame on the
         * control stack. Depending on the kind of block, we create a new
         * block for the body as well.
         ***********************************************************************************/
        Operator::Block { blockty } => {
            let (params, results) = environ.blocktype_params_results(*blockty)?;
            let next = block_with_params(builder, &results)?;
            state.push_block(next, params.len(), results.len());
        }
        Operator::Loop { blockty } => {
            let (params, results) = environ.blocktype_params_results(*blockty)?;
            let loop_body = block_with_params(builder, &params)?;
            let next = block_with_params(builder, &results)?;
            builder.ins().jump(loop_body, state.peekn(params.len()));
            state.popn(params.len());
            state.push_loop(loop_body, next, params.len(), results.len());
            builder.switch_to_block(loop_body);
            state.pushn(builder.block_params(loop_body));
        }
        Operator::If { blockty } => {
            let val = state.pop1();
            let (params, results) = environ.blocktype_params_results(*blockty)?;
            let consequent = block_with_params(builder, &[])?;
            let destination = block_with_params(builder, &results)?;
            // The false edge initially targets the destination,
            // carrying the `if`'s parameters (wasm validation requires
            // params == results when there is no `else`). If an `else`
            // appears, the branch is retargeted to a new else block with
            // matching parameters.
            let branch_inst =
                builder
                    .ins()
                    .brif(val, consequent, &[], destination, state.peekn(params.len()));
            builder.switch_to_block(consequent);
            builder.seal_block(consequent);
            state.push_if(
                destination,
                ElseData::NoElse {
                    branch_inst,
                    placeholder: destination,
                },
                params.len(),
                results.len(),
                *blockty,
            );
        }
        Operator::Else => {
            let i = state.control_stack.len() - 1;
            // Copy the bits we need out of the frame, ending the borrow.
            let (destination, return_count, param_count, head_is_reachable, blocktype) =
                match &state.control_stack[i] {
                    ControlStackFrame::If {
                        destination,
                        num_return_values,
                        num_param_values,
                        head_is_reachable,
                        blocktype,
                        ..
                    } => (
                        *destination,
                        *num_return_values,
                        *num_param_values,
                        *head_is_reachable,
                        *blocktype,
                    ),
                    _ => panic!("`else` without a matching `if`"),
                };
            debug_assert!(head_is_reachable);
            let else_data = match &mut state.control_stack[i] {
                ControlStackFrame::If {
                    consequent_ends_reachable,
                    else_data,
                    ..
                } => {
                    debug_assert!(consequent_ends_reachable.is_none());
                    *consequent_ends_reachable = Some(true);
                    core::mem::replace(
                        else_data,
                        ElseData::WithElse {
                            else_block: destination,
                        },
                    )
                }
                _ => unreachable!(),
            };

            // Close the consequent with a jump to the exit.
            builder.ins().jump(destination, state.peekn(return_count));
            state.popn(return_count);

            let else_block = match else_data {
                ElseData::NoElse {
                    branch_inst,
                    placeholder,
                } => {
                    let (params, _results) = environ.blocktype_params_results(blocktype)?;
                    let else_block = block_with_params(builder, &params)?;
                    builder.change_jump_destination(branch_inst, placeholder, else_block);
                    else_block
                }
                ElseData::WithElse { else_block } => else_block,
            };
            builder.seal_block(else_block);
            builder.switch_to_block(else_block);

            // Restore the value stack to the if's parameters, replacing
            // the preserved copies with the else block's parameters.
            state.control_stack[i].truncate_value_stack_to_else_params(&mut state.stack);
            state.popn(param_count);
            state.pushn(builder.block_params(else_block).to_vec().as_slice());
            match &mut state.control_stack[i] {
                ControlStackFrame::If { else_data, .. } => {
                    *else_data = ElseData::WithElse { else_block };
                }
                _ => unreachable!(),
            }
        }
        Operator::End => {
            let frame = state.control_stack.pop().unwrap();
            let next_block = frame.following_code();
            let return_count = frame.num_return_values();
            builder
                .ins()
                .jump(next_block, state.peekn(return_count));
            state.popn(return_count);

            // An `if` without an `else` has a false edge straight to the
            // destination; its parameter count must then match.
            if let ControlStackFrame::If {
                else_data: ElseData::NoElse { .. },
                num_param_values,
                num_return_values,
                ..
            } = &frame
            {
                debug_assert_eq!(
                    num_param_values, num_return_values,
                    "an if without an else must have matching params and results"
                );
            }

            builder.switch_to_block(next_block);
            builder.seal_block(next_block);
            if let ControlStackFrame::Loop { header, .. } = frame {
                builder.seal_block(header);
            }
            frame.truncate_value_stack_to_original_size(&mut state.stack);
            state.pushn(builder.block_params(next_block));
        }
        /**************************** Branch instructions **********************************
         * The branch instructions all have as arguments a target nesting
         * level, which corresponds to how many control stack frames to pop
         * to get the destination block.
         ***********************************************************************************/
        Operator::Br { relative_depth } => {
            br(*relative_depth, builder, state);
        }
        Operator::BrIf { relative_depth } => {
            translate_br_if(*relative_depth, builder, state);
        }
        Operator::BrTable { targets } => {
            translate_br_table(targets, builder, state)?;
        }
        Operator::Return => {
            let return_count = {
                let frame = &mut state.control_stack[0];
                frame.num_return_values()
            };
            builder.ins().return_(state.peekn(return_count));
            state.popn(return_count);
            state.reachable = false;
        }
        /************************************ Calls ****************************************/
        Operator::Call { function_index } => {
            let index = FuncIndex::new(*function_index as usize);
            let fref = environ.make_direct_func(builder.func, index)?;
            let sig = builder.func.dfg.ext_funcs[fref].signature;
            let num_args = normal_args(&builder.func.dfg.signatures[sig]);
            let args = state.peekn(num_args).to_vec();
            let call = environ.translate_call(builder, index, fref, &args)?;
            state.popn(num_args);
            state.pushn(builder.func.dfg.inst_results(call).to_vec().as_slice());
        }
        Operator::CallIndirect {
            type_index,
            table_index,
            ..
        } => {
            let sig_index = SignatureIndex::new(*type_index as usize);
            let sigref = environ.make_indirect_sig(builder.func, sig_index)?;
            let num_args = normal_args(&builder.func.dfg.signatures[sigref]);
            let callee = state.pop1();
            let args = state.peekn(num_args).to_vec();
            let call = environ.translate_call_indirect(
                builder,
                TableIndex::new(*table_index as usize),
                sig_index,
                sigref,
                callee,
                &args,
            )?;
            state.popn(num_args);
            state.pushn(builder.func.dfg.inst_results(call).to_vec().as_slice());
        }
        /******************************* Memory management *********************************/
        Operator::MemoryGrow { mem, .. } => {
            let delta = state.pop1();
            let val =
                environ.translate_memory_grow(builder, MemoryIndex::new(*mem as usize), delta)?;
            state.push1(val);
        }
        Operator::MemorySize { mem, .. } => {
            let val = environ.translate_memory_size(builder, MemoryIndex::new(*mem as usize))?;
            state.push1(val);
        }
        Operator::MemoryCopy { dst_mem, src_mem } => {
            if dst_mem != src_mem {
                return Err(wasm_unsupported!("memory.copy between distinct memories"));
            }
            let (dst, src, len) = state.pop3();
            environ.translate_memory_copy(
                builder,
                MemoryIndex::new(*dst_mem as usize),
                dst,
                src,
                len,
            )?;
        }
        Operator::MemoryFill { mem } => {
            let (dst, val, len) = state.pop3();
            environ.translate_memory_fill(builder, MemoryIndex::new(*mem as usize), dst, val, len)?;
        }
        /******************************* Load instructions *********************************/
        Operator::I32Load8U { memarg } => translate_load(memarg, LoadKind::Uload8, I32, builder, state, environ)?,
        Operator::I32Load8S { memarg } => translate_load(memarg, LoadKind::Sload8, I32, builder, state, environ)?,
        Operator::I32Load16U { memarg } => translate_load(memarg, LoadKind::Uload16, I32, builder, state, environ)?,
        Operator::I32Load16S { memarg } => translate_load(memarg, LoadKind::Sload16, I32, builder, state, environ)?,
        Operator::I32Load { memarg } => translate_load(memarg, LoadKind::Plain, I32, builder, state, environ)?,
        Operator::I64Load8U { memarg } => translate_load(memarg, LoadKind::Uload8, I64, builder, state, environ)?,
        Operator::I64Load8S { memarg } => translate_load(memarg, LoadKind::Sload8, I64, builder, state, environ)?,
        Operator::I64Load16U { memarg } => translate_load(memarg, LoadKind::Uload16, I64, builder, state, environ)?,
        Operator::I64Load16S { memarg } => translate_load(memarg, LoadKind::Sload16, I64, builder, state, environ)?,
        Operator::I64Load32U { memarg } => translate_load(memarg, LoadKind::Uload32, I64, builder, state, environ)?,
        Operator::I64Load32S { memarg } => translate_load(memarg, LoadKind::Sload32, I64, builder, state, environ)?,
        Operator::I64Load { memarg } => translate_load(memarg, LoadKind::Plain, I64, builder, state, environ)?,
        Operator::F32Load { memarg } => translate_load(memarg, LoadKind::Plain, F32, builder, state, environ)?,
        Operator::F64Load { memarg } => translate_load(memarg, LoadKind::Plain, F64, builder, state, environ)?,
        /******************************* Store instructions ********************************/
        Operator::I32Store8 { memarg } | Operator::I64Store8 { memarg } => {
            translate_store(memarg, StoreKind::Istore8, builder, state, environ)?
        }
        Operator::I32Store16 { memarg } | Operator::I64Store16 { memarg } => {
            translate_store(memarg, StoreKind::Istore16, builder, state, environ)?
        }
        Operator::I64Store32 { memarg } => {
            translate_store(memarg, StoreKind::Istore32, builder, state, environ)?
        }
        Operator::I32Store { memarg }
        | Operator::I64Store { memarg }
        | Operator::F32Store { memarg }
        | Operator::F64Store { memarg } => {
            translate_store(memarg, StoreKind::Plain, builder, state, environ)?
        }
        /****************************** Nullary Operators **********************************/
        Operator::I32Const { value } => {
            state.push1(builder.ins().iconst(I32, i64::from(*value)))
        }
        Operator::I64Const { value } => state.push1(builder.ins().iconst(I64, *value)),
        Operator::F32Const { value } => {
            state.push1(builder.ins().f32const(Ieee32::with_bits(value.bits())));
        }
        Operator::F64Const { value } => {
            state.push1(builder.ins().f64const(Ieee64::with_bits(value.bits())));
        }
        /**************************** Unary Operators **************************************/
        Operator::I32Clz | Operator::I64Clz => {
            let arg = state.pop1();
            state.push1(builder.ins().clz(arg));
        }
        Operator::I32Ctz | Operator::I64Ctz => {
            let arg = state.pop1();
            state.push1(builder.ins().ctz(arg));
        }
        Operator::I32Popcnt | Operator::I64Popcnt => {
            let arg = state.pop1();
            state.push1(builder.ins().popcnt(arg));
        }
        Operator::I64ExtendI32S => {
            let val = state.pop1();
            state.push1(builder.ins().sextend(I64, val));
        }
        Operator::I64ExtendI32U => {
            let val = state.pop1();
            state.push1(builder.ins().uextend(I64, val));
        }
        Operator::I32WrapI64 => {
            let val = state.pop1();
            state.push1(builder.ins().ireduce(I32, val));
        }
        Operator::I32Extend8S | Operator::I64Extend8S => {
            let val = state.pop1();
            let ty = type_of(op);
            let narrow = builder.ins().ireduce(I8, val);
            state.push1(builder.ins().sextend(ty, narrow));
        }
        Operator::I32Extend16S | Operator::I64Extend16S => {
            let val = state.pop1();
            let ty = type_of(op);
            let narrow = builder.ins().ireduce(ir::types::I16, val);
            state.push1(builder.ins().sextend(ty, narrow));
        }
        Operator::I64Extend32S => {
            let val = state.pop1();
            let narrow = builder.ins().ireduce(I32, val);
            state.push1(builder.ins().sextend(I64, narrow));
        }
        Operator::F32Sqrt | Operator::F64Sqrt => {
            let arg = state.pop1();
            state.push1(builder.ins().sqrt(arg));
        }
        Operator::F32Neg | Operator::F64Neg => {
            let arg = state.pop1();
            state.push1(builder.ins().fneg(arg));
        }
        Operator::F32Abs | Operator::F64Abs => {
            let arg = state.pop1();
            state.push1(builder.ins().fabs(arg));
        }
        Operator::F64PromoteF32 => {
            let val = state.pop1();
            state.push1(builder.ins().fpromote(F64, val));
        }
        Operator::F32DemoteF64 => {
            let val = state.pop1();
            state.push1(builder.ins().fdemote(F32, val));
        }
        Operator::I32TruncF32S | Operator::I32TruncF64S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_sint(I32, val));
        }
        Operator::I64TruncF32S | Operator::I64TruncF64S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_sint(I64, val));
        }
        Operator::I32TruncF32U | Operator::I32TruncF64U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_uint(I32, val));
        }
        Operator::I64TruncF32U | Operator::I64TruncF64U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_to_uint(I64, val));
        }
        Operator::F32ConvertI32S | Operator::F32ConvertI64S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_from_sint(F32, val));
        }
        Operator::F64ConvertI32S | Operator::F64ConvertI64S => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_from_sint(F64, val));
        }
        Operator::F32ConvertI32U | Operator::F32ConvertI64U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_from_uint(F32, val));
        }
        Operator::F64ConvertI32U | Operator::F64ConvertI64U => {
            let val = state.pop1();
            state.push1(builder.ins().fcvt_from_uint(F64, val));
        }
        Operator::I32ReinterpretF32 => {
            let val = state.pop1();
            state.push1(builder.ins().bitcast(I32, val));
        }
        Operator::I64ReinterpretF64 => {
            let val = state.pop1();
            state.push1(builder.ins().bitcast(I64, val));
        }
        Operator::F32ReinterpretI32 => {
            let val = state.pop1();
            state.push1(builder.ins().bitcast(F32, val));
        }
        Operator::F64ReinterpretI64 => {
            let val = state.pop1();
            state.push1(builder.ins().bitcast(F64, val));
        }
        /****************************** Binary Operators ***********************************/
        Operator::I32Add | Operator::I64Add => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().iadd(arg1, arg2));
        }
        Operator::I32Sub | Operator::I64Sub => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().isub(arg1, arg2));
        }
        Operator::I32Mul | Operator::I64Mul => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().imul(arg1, arg2));
        }
        Operator::I32DivS | Operator::I64DivS => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().sdiv(arg1, arg2));
        }
        Operator::I32DivU | Operator::I64DivU => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().udiv(arg1, arg2));
        }
        Operator::I32RemS | Operator::I64RemS => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().srem(arg1, arg2));
        }
        Operator::I32RemU | Operator::I64RemU => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().urem(arg1, arg2));
        }
        Operator::I32And | Operator::I64And => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().band(arg1, arg2));
        }
        Operator::I32Or | Operator::I64Or => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().bor(arg1, arg2));
        }
        Operator::I32Xor | Operator::I64Xor => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().bxor(arg1, arg2));
        }
        Operator::I32Shl | Operator::I64Shl => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().ishl(arg1, arg2));
        }
        Operator::I32ShrS | Operator::I64ShrS => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().sshr(arg1, arg2));
        }
        Operator::I32ShrU | Operator::I64ShrU => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().ushr(arg1, arg2));
        }
        Operator::I32Rotl | Operator::I64Rotl => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().rotl(arg1, arg2));
        }
        Operator::I32Rotr | Operator::I64Rotr => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().rotr(arg1, arg2));
        }
        Operator::F32Add | Operator::F64Add => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fadd(arg1, arg2));
        }
        Operator::F32Sub | Operator::F64Sub => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fsub(arg1, arg2));
        }
        Operator::F32Mul | Operator::F64Mul => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fmul(arg1, arg2));
        }
        Operator::F32Div | Operator::F64Div => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fdiv(arg1, arg2));
        }
        Operator::F32Min | Operator::F64Min => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fmin(arg1, arg2));
        }
        Operator::F32Max | Operator::F64Max => {
            let (arg1, arg2) = state.pop2();
            state.push1(builder.ins().fmax(arg1, arg2));
        }
        /**************************** Comparison Operators **********************************/
        Operator::I32Eqz | Operator::I64Eqz => {
            let arg = state.pop1();
            let ty = builder.func.dfg.value_type(arg);
            let zero = builder.ins().iconst(ty, 0);
            let cmp = builder.ins().icmp(IntCC::Equal, arg, zero);
            state.push1(builder.ins().uextend(I32, cmp));
        }
        Operator::I32Eq | Operator::I64Eq => translate_icmp(IntCC::Equal, builder, state),
        Operator::I32Ne | Operator::I64Ne => translate_icmp(IntCC::NotEqual, builder, state),
        Operator::I32LtS | Operator::I64LtS => {
            translate_icmp(IntCC::SignedLessThan, builder, state)
        }
        Operator::I32LtU | Operator::I64LtU => {
            translate_icmp(IntCC::UnsignedLessThan, builder, state)
        }
        Operator::I32LeS | Operator::I64LeS => {
            translate_icmp(IntCC::SignedLessThanOrEqual, builder, state)
        }
        Operator::I32LeU | Operator::I64LeU => {
            translate_icmp(IntCC::UnsignedLessThanOrEqual, builder, state)
        }
        Operator::I32GtS | Operator::I64GtS => {
            translate_icmp(IntCC::SignedGreaterThan, builder, state)
        }
        Operator::I32GtU | Operator::I64GtU => {
            translate_icmp(IntCC::UnsignedGreaterThan, builder, state)
        }
        Operator::I32GeS | Operator::I64GeS => {
            translate_icmp(IntCC::SignedGreaterThanOrEqual, builder, state)
        }
        Operator::I32GeU | Operator::I64GeU => {
            translate_icmp(IntCC::UnsignedGreaterThanOrEqual, builder, state)
        }
        Operator::F32Eq | Operator::F64Eq => translate_fcmp(FloatCC::Equal, builder, state),
        Operator::F32Ne | Operator::F64Ne => translate_fcmp(FloatCC::NotEqual, builder, state),
        Operator::F32Lt | Operator::F64Lt => translate_fcmp(FloatCC::LessThan, builder, state),
        Operator::F32Le | Operator::F64Le => {
            translate_fcmp(FloatCC::LessThanOrEqual, builder, state)
        }
        Operator::F32Gt | Operator::F64Gt => {
            translate_fcmp(FloatCC::GreaterThan, builder, state)
        }
        Operator::F32Ge | Operator::F64Ge => {
            translate_fcmp(FloatCC::GreaterThanOrEqual, builder, state)
        }
        op => {
            return Err(wasm_unsupported!("operator {op:?}"));
        }
    };
    Ok(())
}

/// The kind of a translated load.
enum LoadKind {
    Plain,
    Uload8,
    Sload8,
    Uload16,
    Sload16,
    Uload32,
    Sload32,
}

/// The kind of a translated store.
enum StoreKind {
    Plain,
    Istore8,
    Istore16,
    Istore32,
}

/// Compute the effective address of a memory access: the memory base plus
/// the zero-extended index; small static offsets fold into the load's
/// offset field.
fn prepare_addr<FE: FuncEnvironment + ?Sized>(
    memarg: &MemArg,
    builder: &mut FunctionBuilder,
    state: &mut FuncTranslationState,
    environ: &mut FE,
) -> WasmResult<(Value, Offset32)> {
    let index = state.pop1();
    let base = environ.translate_memory_base(builder, MemoryIndex::new(memarg.memory as usize))?;
    let index64 = builder.ins().uextend(I64, index);
    let mut addr = builder.ins().iadd(base, index64);
    let offset = if let Ok(small) = i32::try_from(memarg.offset) {
        Offset32::new(small)
    } else {
        let big = builder.ins().iconst(I64, memarg.offset as i64);
        addr = builder.ins().iadd(addr, big);
        Offset32::new(0)
    };
    Ok((addr, offset))
}

fn translate_load<FE: FuncEnvironment + ?Sized>(
    memarg: &MemArg,
    kind: LoadKind,
    result_ty: ir::Type,
    builder: &mut FunctionBuilder,
    state: &mut FuncTranslationState,
    environ: &mut FE,
) -> WasmResult<()> {
    let (addr, offset) = prepare_addr(memarg, builder, state, environ)?;
    let flags = MemFlags::new();
    let val = match kind {
        LoadKind::Plain => builder.ins().load(result_ty, flags, addr, offset),
        LoadKind::Uload8 => builder.ins().uload8(result_ty, flags, addr, offset),
        LoadKind::Sload8 => builder.ins().sload8(result_ty, flags, addr, offset),
        LoadKind::Uload16 => builder.ins().uload16(result_ty, flags, addr, offset),
        LoadKind::Sload16 => builder.ins().sload16(result_ty, flags, addr, offset),
        LoadKind::Uload32 => builder.ins().uload32(result_ty, flags, addr, offset),
        LoadKind::Sload32 => builder.ins().sload32(result_ty, flags, addr, offset),
    };
    state.push1(val);
    Ok(())
}

fn translate_store<FE: FuncEnvironment + ?Sized>(
    memarg: &MemArg,
    kind: StoreKind,
    builder: &mut FunctionBuilder,
    state: &mut FuncTranslationState,
    environ: &mut FE,
) -> WasmResult<()> {
    let val = state.pop1();
    let (addr, offset) = prepare_addr(memarg, builder, state, environ)?;
    let flags = MemFlags::new();
    match kind {
        StoreKind::Plain => builder.ins().store(flags, val, addr, offset),
        StoreKind::Istore8 => builder.ins().istore8(flags, val, addr, offset),
        StoreKind::Istore16 => builder.ins().istore16(flags, val, addr, offset),
        StoreKind::Istore32 => builder.ins().istore32(flags, val, addr, offset),
    };
    Ok(())
}

fn translate_icmp(cc: IntCC, builder: &mut FunctionBuilder, state: &mut FuncTranslationState) {
    let (arg1, arg2) = state.pop2();
    let val = builder.ins().icmp(cc, arg1, arg2);
    state.push1(builder.ins().uextend(I32, val));
}

fn translate_fcmp(cc: FloatCC, builder: &mut FunctionBuilder, state: &mut FuncTranslationState) {
    let (arg1, arg2) = state.pop2();
    let val = builder.ins().fcmp(cc, arg1, arg2);
    state.push1(builder.ins().uextend(I32, val));
}

/// Create a block with one parameter per type.
fn block_with_params(
    builder: &mut FunctionBuilder,
    types: &[ir::Type],
) -> WasmResult<ir::Block> {
    let block = builder.create_block();
    for &ty in types {
        builder.func.dfg.append_block_param(block, ty);
    }
    Ok(block)
}

/// The number of branch arguments a branch to depth `relative_depth`
/// carries: the frame's parameter count for loops (re-entry), its result
/// count otherwise.
fn inputs_len(relative_depth: u32, state: &FuncTranslationState) -> usize {
    let i = state.control_stack.len() - 1 - (relative_depth as usize);
    let frame = &state.control_stack[i];
    if frame.is_loop() {
        frame.num_param_values()
    } else {
        frame.num_return_values()
    }
}

/// Translate an unconditional `br`.
fn br(relative_depth: u32, builder: &mut FunctionBuilder, state: &mut FuncTranslationState) {
    let i = state.control_stack.len() - 1 - (relative_depth as usize);
    let (return_count, br_destination) = {
        let frame = &mut state.control_stack[i];
        // We signal that all the code that follows until the next End is
        // unreachable.
        frame.set_branched_to_exit();
        let count = if frame.is_loop() {
            frame.num_param_values()
        } else {
            frame.num_return_values()
        };
        (count, frame.br_destination())
    };
    builder
        .ins()
        .jump(br_destination, state.peekn(return_count));
    state.popn(return_count);
    state.reachable = false;
}

/// Translate a `br_if`: a conditional branch to the target frame, with
/// the branch values remaining on the stack for the fall-through path.
fn translate_br_if(
    relative_depth: u32,
    builder: &mut FunctionBuilder,
    state: &mut FuncTranslationState,
) {
    let cond = state.pop1();
    let next_block = builder.create_block();
    let (br_destination, inputs) = translate_br_if_args(relative_depth, state);
    builder
        .ins()
        .brif(cond, br_destination, inputs, next_block, &[]);
    builder.seal_block(next_block);
    builder.switch_to_block(next_block);
}

/// Resolve the destination and arguments of a `br_if`.
fn translate_br_if_args<'a>(
    relative_depth: u32,
    state: &'a mut FuncTranslationState,
) -> (ir::Block, &'a [Value]) {
    let i = state.control_stack.len() - 1 - (relative_depth as usize);
    let (return_count, br_destination) = {
        let frame = &mut state.control_stack[i];
        frame.set_branched_to_exit();
        let count = if frame.is_loop() {
            frame.num_param_values()
        } else {
            frame.num_return_values()
        };
        (count, frame.br_destination())
    };
    let inputs = state.peekn(return_count);
    (br_destination, inputs)
}

/// Translate a `br_table`.
///
/// When no target carries arguments, the jump table points straight at
/// the destination blocks. Otherwise one intermediate block per unique
/// depth is created; the table dispatches to the intermediates, and each
/// intermediate jumps to its real destination with the argument values.
fn translate_br_table(
    targets: &wasmparser::BrTable<'_>,
    builder: &mut FunctionBuilder,
    state: &mut FuncTranslationState,
) -> WasmResult<()> {
    let default = targets.default();
    let mut min_depth = default;
    let depths: SmallVec<[u32; 16]> = targets
        .targets()
        .collect::<Result<_, _>>()
        .map_err(crate::errors::WasmError::from)?;
    for &depth in &depths {
        if depth < min_depth {
            min_depth = depth;
        }
    }
    let jump_args_count = inputs_len(min_depth, state);

    let val = state.pop1();

    if jump_args_count == 0 {
        // No jump arguments: dispatch straight to the destinations.
        let mut table: Vec<BlockCall> = Vec::with_capacity(depths.len());
        for &depth in &depths {
            let block = {
                let i = state.control_stack.len() - 1 - (depth as usize);
                let frame = &mut state.control_stack[i];
                frame.set_branched_to_exit();
                frame.br_destination()
            };
            let pool = &mut builder.func.dfg.value_lists;
            table.push(BlockCall::new(block, &[], pool));
        }
        let def_block = {
            let i = state.control_stack.len() - 1 - (default as usize);
            let frame = &mut state.control_stack[i];
            frame.set_branched_to_exit();
            frame.br_destination()
        };
        let pool = &mut builder.func.dfg.value_lists;
        let def_call = BlockCall::new(def_block, &[], pool);
        let jt = builder.create_jump_table(JumpTableData::new(def_call, &table));
        builder.ins().br_table(val, jt);
    } else {
        // The IR's br_table can't carry arguments on its edges, so they
        // are split: one intermediate block per unique depth.
        let return_count = jump_args_count;
        let mut dest_block_sequence = Vec::new();
        let mut dest_block_map = HashMap::new();
        let mut table: Vec<BlockCall> = Vec::with_capacity(depths.len());
        for &depth in &depths {
            let branch_block = match dest_block_map.get(&(depth as usize)) {
                Some(&block) => block,
                None => {
                    let block = builder.create_block();
                    dest_block_sequence.push((depth as usize, block));
                    dest_block_map.insert(depth as usize, block);
                    block
                }
            };
            let pool = &mut builder.func.dfg.value_lists;
            table.push(BlockCall::new(branch_block, &[], pool));
        }
        let default_branch_block = match dest_block_map.get(&(default as usize)) {
            Some(&block) => block,
            None => {
                let block = builder.create_block();
                dest_block_sequence.push((default as usize, block));
                dest_block_map.insert(default as usize, block);
                block
            }
        };
        let pool = &mut builder.func.dfg.value_lists;
        let def_call = BlockCall::new(default_branch_block, &[], pool);
        let jt = builder.create_jump_table(JumpTableData::new(def_call, &table));
        builder.ins().br_table(val, jt);

        // Fill the intermediate blocks with a jump to the real
        // destination, carrying the proper arguments.
        for (depth, dest_block) in dest_block_sequence {
            builder.switch_to_block(dest_block);
            builder.seal_block(dest_block);
            let real_dest_block = {
                let i = state.control_stack.len() - 1 - depth;
                let frame = &mut state.control_stack[i];
                frame.set_branched_to_exit();
                frame.br_destination()
            };
            builder.ins().jump(real_dest_block, state.peekn(return_count));
        }
        state.popn(return_count);
    }
    state.reachable = false;
    Ok(())
}

/// Deal with a WebAssembly instruction located in an unreachable portion
/// of the code. Most of them are dropped but special ones like `End`
/// which corresponds to the end of a basic block are affecting the
/// translation state as well.
fn translate_unreachable_operator<FE: FuncEnvironment + ?Sized>(
    op: &Operator,
    builder: &mut FunctionBuilder,
    state: &mut FuncTranslationState,
    environ: &mut FE,
) -> WasmResult<()> {
    debug_assert!(!state.reachable);
    match op {
        Operator::If { blockty } => {
            // Push a placeholder control stack entry. The if isn't
            // reachable, so we don't have any branches anywhere.
            state.push_if(
                ir::Block::from_u32(u32::MAX - 1),
                ElseData::NoElse {
                    branch_inst: ir::Inst::from_u32(u32::MAX - 1),
                    placeholder: ir::Block::from_u32(u32::MAX - 1),
                },
                0,
                0,
                *blockty,
            );
        }
        Operator::Loop { .. } | Operator::Block { .. } => {
            state.push_block(ir::Block::from_u32(u32::MAX - 1), 0, 0);
        }
        Operator::Else => {
            let i = state.control_stack.len() - 1;
            let (destination, param_count, head_is_reachable, blocktype) =
                match &state.control_stack[i] {
                    ControlStackFrame::If {
                        destination,
                        num_param_values,
                        head_is_reachable,
                        blocktype,
                        ..
                    } => (
                        *destination,
                        *num_param_values,
                        *head_is_reachable,
                        *blocktype,
                    ),
                    _ => panic!("`else` without a matching `if`"),
                };
            let else_data = match &mut state.control_stack[i] {
                ControlStackFrame::If {
                    consequent_ends_reachable,
                    else_data,
                    ..
                } => {
                    debug_assert!(consequent_ends_reachable.is_none());
                    *consequent_ends_reachable = Some(false);
                    core::mem::replace(
                        else_data,
                        ElseData::WithElse {
                            else_block: destination,
                        },
                    )
                }
                _ => unreachable!(),
            };

            if head_is_reachable {
                // The head of the `if` branches directly here when the
                // condition is false: the else arm is reachable even
                // though the consequent's end was not.
                state.reachable = true;

                let else_block = match else_data {
                    ElseData::NoElse {
                        branch_inst,
                        placeholder,
                    } => {
                        let (params, _results) = environ.blocktype_params_results(blocktype)?;
                        let else_block = block_with_params(builder, &params)?;
                        builder.change_jump_destination(branch_inst, placeholder, else_block);
                        else_block
                    }
                    ElseData::WithElse { else_block } => else_block,
                };
                builder.seal_block(else_block);
                builder.switch_to_block(else_block);

                state.control_stack[i].truncate_value_stack_to_else_params(&mut state.stack);
                state.popn(param_count);
                state.pushn(builder.block_params(else_block).to_vec().as_slice());
                match &mut state.control_stack[i] {
                    ControlStackFrame::If { else_data, .. } => {
                        *else_data = ElseData::WithElse { else_block };
                    }
                    _ => unreachable!(),
                }
            }
        }
        Operator::End => {
            let stack = &mut state.stack;
            let frame = state.control_stack.pop().unwrap();
            frame.truncate_value_stack_to_original_size(stack);

            let reachable_anyway = match frame {
                // If it is a loop we also have to seal the body loop
                // block.
                ControlStackFrame::Loop { header, .. } => {
                    builder.seal_block(header);
                    // And loops can't have branches to the end.
                    false
                }
                // If we never set `consequent_ends_reachable` then that
                // means that we are finishing the `if` without seeing an
                // `else`, and the whole `if` is unreachable only if its
                // head was: the false edge of the conditional branch
                // reaches the destination.
                ControlStackFrame::If {
                    head_is_reachable,
                    consequent_ends_reachable: None,
                    ..
                } => head_is_reachable,
                // The `if` has an `else`, and the destination is
                // reachable if the consequent could reach it.
                ControlStackFrame::If {
                    head_is_reachable,
                    consequent_ends_reachable: Some(consequent_ends_reachable),
                    ..
                } => head_is_reachable && consequent_ends_reachable,
                _ => false,
            };

            if frame.exit_is_branched_to() || reachable_anyway {
                builder.switch_to_block(frame.following_code());
                builder.seal_block(frame.following_code());

                // And add the return values of the block but only if the
                // next block is reachable.
                stack.extend_from_slice(builder.block_params(frame.following_code()));
                state.reachable = true;
            }
        }
        _ => {
            // We don't translate because this is unreachable code.
        }
    }
    Ok(())
}

/// The controlling integer type of a sign-extension operator.
fn type_of(op: &Operator) -> ir::Type {
    match op {
        Operator::I32Extend8S | Operator::I32Extend16S => I32,
        Operator::I64Extend8S | Operator::I64Extend16S => I64,
        _ => unreachable!(),
    }
}

/// The number of normal (non-vmctx) parameters of a signature.
fn normal_args(sig: &ir::Signature) -> usize {
    sig.params
        .iter()
        .filter(|p| p.purpose == ir::ArgumentPurpose::Normal)
        .count()
}
