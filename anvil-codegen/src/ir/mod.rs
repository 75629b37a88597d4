//! Representation of Anvil IR functions.

mod builder;
pub mod condcodes;
pub mod dfg;
pub mod entities;
pub mod extfunc;
pub mod function;
pub mod immediates;
pub mod instructions;
pub mod jumptable;
pub mod layout;
mod memflags;
mod sourceloc;
pub mod stackslot;
mod trapcode;
pub mod types;

pub use crate::ir::builder::{InstBuilder, InstBuilderBase};
pub use crate::ir::dfg::{DataFlowGraph, ValueDef};
pub use crate::ir::entities::{
    Block, Constant, FuncRef, Inst, JumpTable, SigRef, StackSlot, Value,
};
pub use crate::ir::extfunc::{
    AbiParam, ArgumentExtension, ArgumentPurpose, ExtFuncData, ExternalName, Signature,
};
pub use crate::ir::function::Function;
pub use crate::ir::instructions::{BlockCall, InstructionData, Opcode, ValueList, ValueListPool};
pub use crate::ir::jumptable::JumpTableData;
pub use crate::ir::layout::Layout;
pub use crate::ir::memflags::MemFlags;
pub use crate::ir::sourceloc::SourceLoc;
pub use crate::ir::stackslot::{StackSlotData, StackSlotKind};
pub use crate::ir::trapcode::TrapCode;
pub use crate::ir::types::Type;
