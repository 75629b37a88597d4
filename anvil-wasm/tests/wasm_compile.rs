//! End-to-end tests: WebAssembly text → IR → machine code on both ISAs.
//!
//! The suite runs hostless, so the scenarios are validated structurally:
//! trap records, frame layout, block structure, and successful emission
//! on both backends.

use anvil_codegen::ir::{self, InstructionData, TrapCode};
use anvil_codegen::isa::CallConv;
use anvil_codegen::machinst::CompiledCode;
use anvil_codegen::settings::{Flags, OptLevel};
use anvil_wasm::{translate_module, DummyEnvironment};

fn translate(wat_src: &str) -> DummyEnvironment {
    let wasm = wat::parse_str(wat_src).expect("invalid test wat");
    let mut env = DummyEnvironment::new(CallConv::SystemV);
    translate_module(&wasm, &mut env).expect("translation failed");
    env
}

fn compile_on(triple: &str, func: &ir::Function, opt: OptLevel) -> CompiledCode {
    let isa = anvil_codegen::isa::lookup(triple.parse().unwrap(), Flags::new(opt))
        .expect("no backend");
    isa.compile_function(func)
        .unwrap_or_else(|e| panic!("compilation failed on {triple}: {e}\n{func}"))
}

fn compile_both(wat_src: &str) -> Vec<CompiledCode> {
    let env = translate(wat_src);
    let mut out = Vec::new();
    for triple in ["x86_64-unknown-linux-gnu", "aarch64-unknown-linux-gnu"] {
        for (_, func) in env.info.function_bodies.iter() {
            out.push(compile_on(triple, func, OptLevel::None));
            out.push(compile_on(triple, func, OptLevel::Speed));
        }
    }
    out
}

#[test]
fn identity_function() {
    // S1: the identity function must compile with no spill slots.
    let outs = compile_both(
        r#"(module (func (param i64) (result i64) local.get 0))"#,
    );
    for code in outs {
        assert!(!code.buffer.data().is_empty());
        assert_eq!(code.frame.spillslots_size, 0, "identity must not spill");
        assert!(code.buffer.relocs().is_empty());
    }
}

#[test]
fn sum9_arguments() {
    // S2: nine i64 arguments exceed the argument registers of both ABIs,
    // so some arrive on the stack.
    let outs = compile_both(
        r#"(module (func (param i64 i64 i64 i64 i64 i64 i64 i64 i64) (result i64)
              local.get 0 local.get 1 i64.add
              local.get 2 i64.add
              local.get 3 i64.add
              local.get 4 i64.add
              local.get 5 i64.add
              local.get 6 i64.add
              local.get 7 i64.add
              local.get 8 i64.add))"#,
    );
    for code in outs {
        assert!(!code.buffer.data().is_empty());
        assert!(
            code.frame.incoming_args_size > 0,
            "nine i64 args must use the stack"
        );
    }
}

#[test]
fn loop_sum_branches_to_header() {
    // S3: `while i < N { s += i; i += 1 }`. The defining property is
    // that a `br` targeting a loop frame branches to the loop *header*,
    // forming a back edge in the IR.
    let src = r#"(module (func (result i32)
        (local $i i32) (local $s i32)
        (block $exit
          (loop $l
            local.get $i
            i32.const 100
            i32.ge_s
            br_if $exit
            local.get $s
            local.get $i
            i32.add
            local.set $s
            local.get $i
            i32.const 1
            i32.add
            local.set $i
            br $l))
        local.get $s))"#;
    let env = translate(src);
    let func = &env.info.function_bodies[anvil_wasm::FuncIndex::from_u32(0)];

    // Find a branch whose target precedes it in the layout: the loop
    // back edge to the header.
    let mut found_back_edge = false;
    for block in func.layout.blocks() {
        for inst in func.layout.block_insts(block) {
            for target in func.dfg.branch_destinations(inst) {
                if func.layout.pp_cmp(target, block) == core::cmp::Ordering::Less
                    || target == block
                {
                    found_back_edge = true;
                }
            }
        }
    }
    assert!(found_back_edge, "loop must branch back to its header:\n{func}");

    for triple in ["x86_64-unknown-linux-gnu", "aarch64-unknown-linux-gnu"] {
        compile_on(triple, func, OptLevel::Speed);
    }
}

#[test]
fn br_table_with_args_splits_edges() {
    // S4: a br_table whose targets carry a block argument must get one
    // intermediate block per unique depth, each holding exactly one jump
    // that passes the argument along.
    let src = r#"(module (func (param i32) (result i32)
        (block $b3 (result i32)
          (block $b2 (result i32)
            (block $b1 (result i32)
              (block $b0 (result i32)
                i32.const 100
                local.get 0
                br_table $b0 $b1 $b2 $b3)
              i32.const 1
              i32.add)
            i32.const 2
            i32.add)
          i32.const 3
          i32.add)))"#;
    let env = translate(src);
    let func = &env.info.function_bodies[anvil_wasm::FuncIndex::from_u32(0)];

    // Find the br_table and inspect its targets.
    let mut checked = false;
    for block in func.layout.blocks() {
        for inst in func.layout.block_insts(block) {
            if let InstructionData::BranchTable { table, .. } = func.dfg.inst_data(inst) {
                let jt = &func.dfg.jump_tables[*table];
                let mut targets: Vec<ir::Block> = jt
                    .all_branches()
                    .map(|call| call.block(&func.dfg.value_lists))
                    .collect();
                targets.sort();
                targets.dedup();
                // 4 unique depths (3 cases + default at distinct depths).
                assert_eq!(targets.len(), 4, "one intermediate per unique depth");
                for target in targets {
                    let insts: Vec<_> = func.layout.block_insts(target).collect();
                    assert_eq!(
                        insts.len(),
                        1,
                        "intermediate block must hold exactly one jump:\n{func}"
                    );
                    let data = func.dfg.inst_data(insts[0]);
                    assert_eq!(data.opcode(), ir::Opcode::Jump);
                    let call = &data.branch_destination()[0];
                    assert_eq!(
                        call.args_slice(&func.dfg.value_lists).len(),
                        1,
                        "the dispatched value must ride on the edge"
                    );
                }
                checked = true;
            }
        }
    }
    assert!(checked, "no br_table found:\n{func}");

    for triple in ["x86_64-unknown-linux-gnu", "aarch64-unknown-linux-gnu"] {
        compile_on(triple, func, OptLevel::None);
    }
}

#[test]
fn division_records_trap() {
    // S5: i64.div_s must leave a division-by-zero trap record.
    let outs = compile_both(
        r#"(module (func (param i64 i64) (result i64)
              local.get 0 local.get 1 i64.div_s))"#,
    );
    for code in outs {
        assert!(
            code.buffer
                .traps()
                .iter()
                .any(|t| t.code == TrapCode::IntegerDivisionByZero),
            "expected a division trap record"
        );
        assert!(
            !code.buffer.get_srclocs_sorted().is_empty(),
            "bytecode offsets must survive into the source-location map"
        );
    }
}

#[test]
fn many_live_locals_spill() {
    // S6: forty simultaneously-live i64 values exceed both register
    // files; the allocator must introduce spill slots and the frame must
    // report a non-zero spill area.
    let mut body = String::new();
    for i in 0..40 {
        body.push_str(&format!(
            "local.get 0 i64.const {i} i64.add local.set {} ",
            i + 1
        ));
    }
    body.push_str("local.get 1 ");
    for i in 1..40 {
        body.push_str(&format!("local.get {} i64.add ", i + 1));
    }
    let src = format!(
        r#"(module (func (param i64) (result i64) (local {}) {body}))"#,
        "i64 ".repeat(40)
    );
    let outs = compile_both(&src);
    for code in outs {
        assert!(
            code.frame.spillslots_size > 0,
            "forty live values must spill"
        );
    }
}

#[test]
fn calls_and_memory() {
    // Direct and indirect calls, loads and stores, and the bulk-memory
    // libcalls must all make it through both backends; calls leave
    // relocations behind.
    let src = r#"(module
        (memory 1)
        (func $leaf (param i32) (result i32) local.get 0)
        (func (param i32) (result i32)
          local.get 0
          call $leaf
          i32.load offset=16
          i32.const 4
          i32.store
          memory.size
          memory.grow
          drop
          i32.const 0
          i32.const 1
          i32.const 8
          memory.copy
          i32.const 0
          i32.load8_u))"#;
    let env = translate(src);
    let mut saw_reloc = false;
    for triple in ["x86_64-unknown-linux-gnu", "aarch64-unknown-linux-gnu"] {
        for (_, func) in env.info.function_bodies.iter() {
            let code = compile_on(triple, func, OptLevel::Speed);
            saw_reloc |= !code.buffer.relocs().is_empty();
        }
    }
    assert!(saw_reloc, "calls must produce relocations");
}

#[test]
fn float_operations() {
    let src = r#"(module
        (func (param f64 f64) (result f64)
          local.get 0 local.get 1 f64.add
          local.get 0 f64.mul
          f64.sqrt
          local.get 1 f64.min)
        (func (param f32) (result i32)
          local.get 0
          i32.trunc_f32_s)
        (func (param i64) (result f64)
          local.get 0
          f64.convert_i64_u)
        (func (param f32 f32) (result i32)
          local.get 0 local.get 1 f32.eq))"#;
    for code in compile_both(src) {
        assert!(!code.buffer.data().is_empty());
    }
}

#[test]
fn if_else_and_select() {
    let src = r#"(module
        (func (param i32 i64 i64) (result i64)
          local.get 0
          (if (result i64)
            (then local.get 1 i64.const 1 i64.add)
            (else local.get 2 i64.const 2 i64.mul)))
        (func (param i32 i64 i64) (result i64)
          local.get 1 local.get 2 local.get 0 select)
        (func (param i32) (result i32)
          local.get 0
          (if (then unreachable))
          i32.const 7))"#;
    for code in compile_both(src) {
        assert!(!code.buffer.data().is_empty());
    }
}

#[test]
fn unsupported_operators_are_refused() {
    // Deferred proposals (atomics here) must be refused with a clear
    // error, not silently degraded.
    let wasm = wat::parse_str(
        r#"(module (memory 1 1 shared)
             (func (param i32) (result i32)
               local.get 0 i32.atomic.load))"#,
    )
    .unwrap();
    let mut env = DummyEnvironment::new(CallConv::SystemV);
    let err = translate_module(&wasm, &mut env).unwrap_err();
    assert!(
        matches!(err, anvil_wasm::WasmError::Unsupported(_)),
        "expected an unsupported-feature error, got: {err}"
    );
}

#[test]
fn emission_is_deterministic() {
    // Compiling the same function twice must produce byte-identical code
    // and identical relocation tables.
    let src = r#"(module
        (func $f (param i64 i64) (result i64)
          local.get 0 local.get 1 i64.add)
        (func (param i64) (result i64)
          local.get 0 local.get 0 call $f
          local.get 0 i64.mul))"#;
    let env = translate(src);
    for triple in ["x86_64-unknown-linux-gnu", "aarch64-unknown-linux-gnu"] {
        for (_, func) in env.info.function_bodies.iter() {
            let a = compile_on(triple, func, OptLevel::Speed);
            let b = compile_on(triple, func, OptLevel::Speed);
            assert_eq!(a.buffer.data(), b.buffer.data(), "{triple}");
            assert_eq!(a.buffer.relocs(), b.buffer.relocs(), "{triple}");
            assert_eq!(a.buffer.traps(), b.buffer.traps(), "{triple}");
        }
    }
}

#[test]
fn sign_extension_ops() {
    let src = r#"(module
        (func (param i32) (result i32) local.get 0 i32.extend8_s)
        (func (param i64) (result i64) local.get 0 i64.extend16_s)
        (func (param i64) (result i64) local.get 0 i64.extend32_s))"#;
    for code in compile_both(src) {
        assert!(!code.buffer.data().is_empty());
    }
}
