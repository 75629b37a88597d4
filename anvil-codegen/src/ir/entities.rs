//! Anvil IR entity references.
//!
//! Instructions in the IR need to reference other entities in the function.
//! This can be other parts of the function like basic blocks or stack slots,
//! or it can be external entities that are declared in the function
//! preamble.
//!
//! These entity references are not implemented as Rust references, both
//! because Rust's ownership and mutability rules make it difficult, and
//! because 64-bit pointers take up a lot of space and we want a compact
//! in-memory representation. Instead, entity references are structs wrapping
//! a `u32` index into a table in the `Function` main data structure, with a
//! separate index type for each entity type for type safety. The index
//! `u32::MAX` is reserved in every entity type to mean "none", so compact
//! data structures can use `PackedOption<T>` where function signatures use
//! `Option<T>`.
//!
//! Entity references are 0-based within a function, and their `Display`
//! impls match the textual IR format (`block3`, `v12`, ...).

use anvil_entity::entity_impl;
use core::fmt;

/// An opaque reference to a basic block in a
/// [`Function`](super::function::Function).
///
/// While the order is stable, it is arbitrary and does not necessarily
/// resemble the layout order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an SSA value.
///
/// Values are defined either by instructions or as block parameters; an
/// alias value stands for another value after rewriting and is transparently
/// resolved by [`DataFlowGraph::resolve_aliases`](super::dfg::DataFlowGraph::resolve_aliases).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an instruction in a
/// [`Function`](super::function::Function).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An opaque reference to a stack slot.
///
/// Stack slots represent an explicit region in the function's activation
/// frame.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// An opaque reference to a jump table, used with `br_table`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JumpTable(u32);
entity_impl!(JumpTable, "jt");

/// An opaque reference to another function, used for direct calls and to
/// take a function's address.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// An opaque reference to a function signature, used to describe indirect
/// call targets.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

/// An opaque reference to a constant in the function's constant pool.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constant(u32);
entity_impl!(Constant, "const");

/// An opaque reference to any of the entities defined in this module that
/// can appear in IR.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum AnyEntity {
    /// The whole function.
    Function,
    /// A basic block.
    Block(Block),
    /// An instruction.
    Inst(Inst),
    /// An SSA value.
    Value(Value),
    /// A stack slot.
    StackSlot(StackSlot),
    /// A jump table.
    JumpTable(JumpTable),
    /// An external function.
    FuncRef(FuncRef),
    /// A function call signature.
    SigRef(SigRef),
    /// A constant.
    Constant(Constant),
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Function => write!(f, "function"),
            Self::Block(r) => r.fmt(f),
            Self::Inst(r) => r.fmt(f),
            Self::Value(r) => r.fmt(f),
            Self::StackSlot(r) => r.fmt(f),
            Self::JumpTable(r) => r.fmt(f),
            Self::FuncRef(r) => r.fmt(f),
            Self::SigRef(r) => r.fmt(f),
            Self::Constant(r) => r.fmt(f),
        }
    }
}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_entity::packed_option::PackedOption;
    use anvil_entity::EntityRef;

    #[test]
    fn display() {
        assert_eq!(Block::new(0).to_string(), "block0");
        assert_eq!(Value::new(12).to_string(), "v12");
        assert_eq!(Inst::new(3).to_string(), "inst3");
        assert_eq!(StackSlot::new(1).to_string(), "ss1");
        assert_eq!(JumpTable::new(0).to_string(), "jt0");
    }

    #[test]
    fn memory() {
        use core::mem;
        // This is the whole point of `PackedOption`.
        assert_eq!(
            mem::size_of::<Value>(),
            mem::size_of::<PackedOption<Value>>()
        );
    }
}
