//! Intermediate representation of a function.
//!
//! The `Function` struct defined in this module owns all of its basic
//! blocks and instructions.

use crate::ir::instructions::InstructionData;
use crate::ir::{
    Block, DataFlowGraph, ExtFuncData, ExternalName, FuncRef, Inst, JumpTableData, Layout,
    SigRef, Signature, SourceLoc, StackSlot, StackSlotData, Value,
};
use crate::isa::CallConv;
use anvil_entity::{PrimaryMap, SecondaryMap};
use core::fmt;

/// A function.
///
/// Functions can be cloned, but it is not a very fast operation. The clone
/// will have all the same entity numbers as the original.
#[derive(Clone)]
pub struct Function {
    /// Name of this function. Used for relocations and diagnostics.
    pub name: ExternalName,

    /// Signature of this function.
    pub signature: Signature,

    /// Explicit stack slots allocated in this function.
    pub stack_slots: PrimaryMap<StackSlot, StackSlotData>,

    /// Data flow graph containing the primary definition of all
    /// instructions, blocks and values.
    pub dfg: DataFlowGraph,

    /// Layout of blocks and instructions in the function body.
    pub layout: Layout,

    /// Source locations.
    ///
    /// Track the original source location for each instruction. The source
    /// locations are not interpreted by the code generator, only preserved
    /// into the output source-location map.
    pub srclocs: SecondaryMap<Inst, SourceLoc>,
}

impl Function {
    /// Create a function with the given name and signature.
    pub fn with_name_signature(name: ExternalName, sig: Signature) -> Self {
        Self {
            name,
            signature: sig,
            stack_slots: PrimaryMap::new(),
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
            srclocs: SecondaryMap::new(),
        }
    }

    /// Create a new empty, anonymous function with a SystemV calling
    /// convention.
    pub fn new() -> Self {
        Self::with_name_signature(ExternalName::default(), Signature::new(CallConv::SystemV))
    }

    /// Clear all data structures in this function.
    pub fn clear(&mut self) {
        let call_conv = self.signature.call_conv;
        self.signature.clear(call_conv);
        self.stack_slots.clear();
        self.dfg.clear();
        self.layout.clear();
        self.srclocs.clear();
    }

    /// Creates a stack slot in the function, to be used by the function's
    /// own explicit loads and stores.
    pub fn create_stack_slot(&mut self, data: StackSlotData) -> StackSlot {
        self.stack_slots.push(data)
    }

    /// Adds a signature which can later be used to declare an external
    /// function import.
    pub fn import_signature(&mut self, signature: Signature) -> SigRef {
        self.dfg.signatures.push(signature)
    }

    /// Declare an external function import.
    pub fn import_function(&mut self, data: ExtFuncData) -> FuncRef {
        self.dfg.ext_funcs.push(data)
    }

    /// Creates a jump table in the function, to be used by `br_table`
    /// instructions.
    pub fn create_jump_table(&mut self, data: JumpTableData) -> crate::ir::JumpTable {
        self.dfg.jump_tables.push(data)
    }

    /// Get the entry block, if any.
    pub fn entry_block(&self) -> Option<Block> {
        self.layout.entry_block()
    }

    /// Is this function reachability-wise empty (no blocks laid out)?
    pub fn is_empty(&self) -> bool {
        self.layout.entry_block().is_none()
    }

    /// Return an object that can display this function with correct ISA
    /// annotations.
    pub fn display(&self) -> DisplayFunction {
        DisplayFunction(self)
    }

    /// Collect the block parameters of the entry block, which correspond to
    /// the function's ABI parameters.
    pub fn entry_params(&self) -> &[Value] {
        let entry = self.layout.entry_block().expect("no entry block");
        self.dfg.block_params(entry)
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper type capable of displaying a `Function`.
pub struct DisplayFunction<'a>(&'a Function);

impl<'a> fmt::Display for DisplayFunction<'a> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write_function(fmt, self.0)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write_function(fmt, self)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write_function(fmt, self)
    }
}

/// Write a function to the formatter in the textual format.
fn write_function(w: &mut fmt::Formatter, func: &Function) -> fmt::Result {
    writeln!(w, "function {}{} {{", func.name, func.signature)?;
    let mut any = write_preamble(w, func)?;
    for block in func.layout.blocks() {
        if any {
            writeln!(w)?;
        }
        write_block(w, func, block)?;
        any = true;
    }
    writeln!(w, "}}")
}

fn write_preamble(w: &mut fmt::Formatter, func: &Function) -> Result<bool, fmt::Error> {
    let mut any = false;

    for (ss, slot) in func.stack_slots.iter() {
        any = true;
        writeln!(w, "    {ss} = {slot}")?;
    }

    for (sig, sig_data) in func.dfg.signatures.iter() {
        any = true;
        writeln!(w, "    {sig} = {sig_data}")?;
    }

    for (fnref, ext_func) in func.dfg.ext_funcs.iter() {
        any = true;
        writeln!(w, "    {fnref} = {ext_func}")?;
    }

    Ok(any)
}

fn write_block_header(w: &mut fmt::Formatter, func: &Function, block: Block) -> fmt::Result {
    write!(w, "{block}")?;
    let params = func.dfg.block_params(block);
    if params.is_empty() {
        return writeln!(w, ":");
    }
    write!(w, "(")?;
    for (i, param) in params.iter().enumerate() {
        if i != 0 {
            write!(w, ", ")?;
        }
        write!(w, "{}: {}", param, func.dfg.value_type(*param))?;
    }
    writeln!(w, "):")
}

fn write_block(w: &mut fmt::Formatter, func: &Function, block: Block) -> fmt::Result {
    write_block_header(w, func, block)?;
    for inst in func.layout.block_insts(block) {
        write_instruction(w, func, inst)?;
    }
    Ok(())
}

fn write_block_call(
    w: &mut fmt::Formatter,
    func: &Function,
    call: &crate::ir::instructions::BlockCall,
) -> fmt::Result {
    let pool = &func.dfg.value_lists;
    write!(w, "{}", call.block(pool))?;
    let args = call.args_slice(pool);
    if !args.is_empty() {
        write!(w, "(")?;
        for (i, arg) in args.iter().enumerate() {
            if i != 0 {
                write!(w, ", ")?;
            }
            write!(w, "{arg}")?;
        }
        write!(w, ")")?;
    }
    Ok(())
}

fn write_instruction(w: &mut fmt::Formatter, func: &Function, inst: Inst) -> fmt::Result {
    write!(w, "    ")?;

    // Write out the result values, if any.
    let mut has_results = false;
    for r in func.dfg.inst_results(inst) {
        if !has_results {
            has_results = true;
            write!(w, "{r}")?;
        } else {
            write!(w, ", {r}")?;
        }
    }
    if has_results {
        write!(w, " = ")?;
    }

    let pool = &func.dfg.value_lists;
    use InstructionData::*;
    match func.dfg.inst_data(inst) {
        Unary { opcode, arg } => write!(w, "{opcode} {arg}")?,
        UnaryImm { opcode, imm } => {
            write!(w, "{}.{} {}", opcode, func.dfg.value_type(func.dfg.first_result(inst)), imm)?
        }
        UnaryIeee32 { opcode, imm } => write!(w, "{opcode} {imm}")?,
        UnaryIeee64 { opcode, imm } => write!(w, "{opcode} {imm}")?,
        Binary { opcode, args } => write!(w, "{} {}, {}", opcode, args[0], args[1])?,
        Ternary { opcode, args } => {
            write!(w, "{} {}, {}, {}", opcode, args[0], args[1], args[2])?
        }
        IntCompare { opcode, args, cond } => {
            write!(w, "{} {} {}, {}", opcode, cond, args[0], args[1])?
        }
        FloatCompare { opcode, args, cond } => {
            write!(w, "{} {} {}, {}", opcode, cond, args[0], args[1])?
        }
        Jump { opcode, destination } => {
            write!(w, "{opcode} ")?;
            write_block_call(w, func, destination)?
        }
        Brif { opcode, arg, blocks } => {
            write!(w, "{opcode} {arg}, ")?;
            write_block_call(w, func, &blocks[0])?;
            write!(w, ", ")?;
            write_block_call(w, func, &blocks[1])?
        }
        BranchTable { opcode, arg, table } => {
            write!(w, "{opcode} {arg}, ")?;
            let jt = &func.dfg.jump_tables[*table];
            write_block_call(w, func, jt.default_block())?;
            write!(w, ", [")?;
            for (i, dest) in jt.as_slice().iter().enumerate() {
                if i != 0 {
                    write!(w, ", ")?;
                }
                write_block_call(w, func, dest)?;
            }
            write!(w, "]")?
        }
        Call {
            opcode,
            func_ref,
            args,
        } => {
            write!(w, "{opcode} {func_ref}(")?;
            for (i, arg) in args.as_slice(pool).iter().enumerate() {
                if i != 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{arg}")?;
            }
            write!(w, ")")?
        }
        CallIndirect {
            opcode,
            sig_ref,
            args,
        } => {
            let all = args.as_slice(pool);
            write!(w, "{} {}, {}(", opcode, sig_ref, all[0])?;
            for (i, arg) in all[1..].iter().enumerate() {
                if i != 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{arg}")?;
            }
            write!(w, ")")?
        }
        MultiAry { opcode, args } => {
            write!(w, "{opcode}")?;
            for (i, arg) in args.as_slice(pool).iter().enumerate() {
                if i == 0 {
                    write!(w, " {arg}")?;
                } else {
                    write!(w, ", {arg}")?;
                }
            }
        }
        Load {
            opcode,
            arg,
            flags,
            offset,
        } => write!(w, "{opcode}{flags} {arg}{offset}")?,
        Store {
            opcode,
            args,
            flags,
            offset,
        } => write!(w, "{}{} {}, {}{}", opcode, flags, args[0], args[1], offset)?,
        Trap { opcode, code } => write!(w, "{opcode} {code}")?,
    }
    writeln!(w)
}
