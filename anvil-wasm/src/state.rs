//! WebAssembly function translation state.
//!
//! The `FuncTranslationState` tracks the mappings between the WebAssembly
//! value stack, the control stack of enclosing frames, and the IR values
//! and blocks being produced.

use anvil_codegen::ir::{Block, Inst, Value};
use std::vec::Vec;

/// Information about the presence of an associated `else` for an `if`, or
/// the lack thereof.
#[derive(Debug)]
pub enum ElseData {
    /// The `if` does not already have an `else` block.
    ///
    /// This doesn't mean that it will never have an `else`, just that we
    /// haven't seen it yet. The conditional branch still needs a
    /// destination for the false edge, so it initially targets the `if`'s
    /// exit block (the placeholder); when an `else` is seen, the branch is
    /// retargeted to a freshly created else block.
    NoElse {
        /// The branch instruction to rewrite.
        branch_inst: Inst,
        /// The destination the false edge currently targets.
        placeholder: Block,
    },
    /// We have already allocated an `else` block.
    WithElse {
        /// This is the `else` block.
        else_block: Block,
    },
}

/// A control stack frame can be an `if`, a `block` or a `loop`, and the
/// translation of a branch depends on the frame kind: a branch targets
/// the *exit* block of `block` and `if` frames, and the *header* of
/// `loop` frames.
#[derive(Debug)]
pub enum ControlStackFrame {
    /// An `if ... else ... end` region.
    If {
        /// The exit block, receiving the result values.
        destination: Block,
        /// Where (and whether) the `else` is.
        else_data: ElseData,
        /// Number of parameter values of the region.
        num_param_values: usize,
        /// Number of result values of the region.
        num_return_values: usize,
        /// Value-stack depth at entry, *including* the duplicated
        /// parameters pushed for the sake of a potential `else`.
        original_stack_size: usize,
        /// Was the head of the `if` reachable?
        head_is_reachable: bool,
        /// What was the reachability at the end of the consequent?
        ///
        /// `None` means that we haven't reached the `else` yet.
        consequent_ends_reachable: Option<bool>,
        /// Has the exit block been branched to?
        exit_is_branched_to: bool,
        /// The wasm block type, needed to build the `else` block's
        /// parameter list.
        blocktype: wasmparser::BlockType,
    },
    /// A `block ... end` region.
    Block {
        /// The exit block, receiving the result values.
        destination: Block,
        /// Number of parameter values of the region.
        num_param_values: usize,
        /// Number of result values of the region.
        num_return_values: usize,
        /// Value-stack depth at entry.
        original_stack_size: usize,
        /// Has the exit block been branched to?
        exit_is_branched_to: bool,
    },
    /// A `loop ... end` region.
    Loop {
        /// The exit block.
        destination: Block,
        /// The loop header; branches to the loop re-enter here.
        header: Block,
        /// Number of parameter values of the region.
        num_param_values: usize,
        /// Number of result values of the region.
        num_return_values: usize,
        /// Value-stack depth at entry.
        original_stack_size: usize,
    },
}

impl ControlStackFrame {
    /// The number of result values of the region.
    pub fn num_return_values(&self) -> usize {
        match *self {
            Self::If {
                num_return_values, ..
            }
            | Self::Block {
                num_return_values, ..
            }
            | Self::Loop {
                num_return_values, ..
            } => num_return_values,
        }
    }

    /// The number of parameter values of the region.
    pub fn num_param_values(&self) -> usize {
        match *self {
            Self::If {
                num_param_values, ..
            }
            | Self::Block {
                num_param_values, ..
            }
            | Self::Loop {
                num_param_values, ..
            } => num_param_values,
        }
    }

    /// The block following the whole region.
    pub fn following_code(&self) -> Block {
        match *self {
            Self::If { destination, .. }
            | Self::Block { destination, .. }
            | Self::Loop { destination, .. } => destination,
        }
    }

    /// The destination of a branch targeting this frame: the exit block,
    /// or the loop header for `loop` frames.
    pub fn br_destination(&self) -> Block {
        match *self {
            Self::If { destination, .. } | Self::Block { destination, .. } => destination,
            Self::Loop { header, .. } => header,
        }
    }

    /// The value-stack depth recorded when the frame was pushed.
    fn original_stack_size(&self) -> usize {
        match *self {
            Self::If {
                original_stack_size,
                ..
            }
            | Self::Block {
                original_stack_size,
                ..
            }
            | Self::Loop {
                original_stack_size,
                ..
            } => original_stack_size,
        }
    }

    /// Is this frame a `loop`?
    pub fn is_loop(&self) -> bool {
        matches!(self, Self::Loop { .. })
    }

    /// Has the exit block been branched to?
    pub fn exit_is_branched_to(&self) -> bool {
        match *self {
            Self::If {
                exit_is_branched_to,
                ..
            }
            | Self::Block {
                exit_is_branched_to,
                ..
            } => exit_is_branched_to,
            Self::Loop { .. } => false,
        }
    }

    /// Record that the exit block is branched to.
    pub fn set_branched_to_exit(&mut self) {
        match self {
            Self::If {
                exit_is_branched_to,
                ..
            }
            | Self::Block {
                exit_is_branched_to,
                ..
            } => *exit_is_branched_to = true,
            Self::Loop { .. } => {}
        }
    }

    /// Pop the values pushed by the region body off the value stack.
    ///
    /// `If` frames pushed a duplicate copy of their parameters, which is
    /// removed here as well.
    pub fn truncate_value_stack_to_original_size(&self, stack: &mut Vec<Value>) {
        let num_duplicated_params = match self {
            Self::If {
                num_param_values, ..
            } => *num_param_values,
            _ => 0,
        };
        stack.truncate(self.original_stack_size() - num_duplicated_params);
    }

    /// Pop everything above the frame's parameters, restoring the state
    /// the `else` arm starts from.
    pub fn truncate_value_stack_to_else_params(&self, stack: &mut Vec<Value>) {
        debug_assert!(matches!(self, Self::If { .. }));
        stack.truncate(self.original_stack_size());
    }
}

/// Contains information passed along during a function's translation and
/// that records:
///
/// - The current value and control stacks.
/// - The depth of the two unreachable-code states.
pub struct FuncTranslationState {
    /// A stack of values corresponding to the active values in the input
    /// wasm function at this point.
    pub stack: Vec<Value>,
    /// A stack of active control flow operations at this point in the
    /// input wasm function.
    pub control_stack: Vec<ControlStackFrame>,
    /// Is the current translation state still reachable?
    ///
    /// This is false when translating operators like `end`, `return`, or
    /// `unreachable` in unreachable code: no IR is produced until a block
    /// header restores reachability.
    pub reachable: bool,
}

impl FuncTranslationState {
    /// Construct a new, empty translation state.
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            control_stack: Vec::new(),
            reachable: true,
        }
    }

    /// Clear the state, readying it for a new function.
    pub fn clear(&mut self) {
        debug_assert!(self.stack.is_empty());
        debug_assert!(self.control_stack.is_empty());
        self.stack.clear();
        self.control_stack.clear();
        self.reachable = true;
    }

    /// Initialize the state for a new function, pushing the outermost
    /// "block" frame (which receives the function's return values).
    pub fn initialize(&mut self, exit_block: Block, num_return_values: usize) {
        self.clear();
        self.push_block(exit_block, 0, num_return_values);
    }

    /// Push a value.
    pub fn push1(&mut self, val: Value) {
        self.stack.push(val);
    }

    /// Push multiple values.
    pub fn pushn(&mut self, vals: &[Value]) {
        self.stack.extend_from_slice(vals);
    }

    /// Pop one value.
    pub fn pop1(&mut self) -> Value {
        self.stack
            .pop()
            .expect("attempted to pop a value from an empty stack")
    }

    /// Peek at the top of the stack without popping it.
    pub fn peek1(&self) -> Value {
        *self
            .stack
            .last()
            .expect("attempted to peek at a value on an empty stack")
    }

    /// Pop two values. Return them in the order they were pushed.
    pub fn pop2(&mut self) -> (Value, Value) {
        let v2 = self.pop1();
        let v1 = self.pop1();
        (v1, v2)
    }

    /// Pop three values. Return them in the order they were pushed.
    pub fn pop3(&mut self) -> (Value, Value, Value) {
        let v3 = self.pop1();
        let v2 = self.pop1();
        let v1 = self.pop1();
        (v1, v2, v3)
    }

    /// Pop the top `n` values without returning them.
    pub fn popn(&mut self, n: usize) {
        debug_assert!(self.stack.len() >= n);
        let new_len = self.stack.len() - n;
        self.stack.truncate(new_len);
    }

    /// Peek at the top `n` values in the order they were pushed.
    pub fn peekn(&self, n: usize) -> &[Value] {
        debug_assert!(self.stack.len() >= n);
        &self.stack[self.stack.len() - n..]
    }

    /// Push a `block` control frame.
    pub fn push_block(
        &mut self,
        following_code: Block,
        num_param_values: usize,
        num_return_values: usize,
    ) {
        debug_assert!(self.stack.len() >= num_param_values);
        self.control_stack.push(ControlStackFrame::Block {
            destination: following_code,
            original_stack_size: self.stack.len() - num_param_values,
            num_param_values,
            num_return_values,
            exit_is_branched_to: false,
        });
    }

    /// Push a `loop` control frame.
    pub fn push_loop(
        &mut self,
        header: Block,
        following_code: Block,
        num_param_values: usize,
        num_return_values: usize,
    ) {
        debug_assert!(self.stack.len() >= num_param_values);
        self.control_stack.push(ControlStackFrame::Loop {
            header,
            destination: following_code,
            original_stack_size: self.stack.len() - num_param_values,
            num_param_values,
            num_return_values,
        });
    }

    /// Push an `if` control frame, duplicating the parameters so the
    /// `else` arm can be started from the same values.
    pub fn push_if(
        &mut self,
        destination: Block,
        else_data: ElseData,
        num_param_values: usize,
        num_return_values: usize,
        blocktype: wasmparser::BlockType,
    ) {
        debug_assert!(self.stack.len() >= num_param_values);

        // Push a second copy of our param values on the stack, so we can
        // restore them for the else block.
        let start = self.stack.len() - num_param_values;
        self.stack.reserve(num_param_values);
        for i in start..start + num_param_values {
            let val = self.stack[i];
            self.stack.push(val);
        }

        self.control_stack.push(ControlStackFrame::If {
            destination,
            else_data,
            original_stack_size: start + num_param_values,
            num_param_values,
            num_return_values,
            head_is_reachable: self.reachable,
            consequent_ends_reachable: None,
            exit_is_branched_to: false,
            blocktype,
        });
    }
}
