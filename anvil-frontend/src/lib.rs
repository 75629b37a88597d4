//! Anvil IR builder library.
//!
//! Provides a straightforward way to create an Anvil IR function and fill
//! it with instructions translated from another language. Contains an SSA
//! construction pass (on the "sealed blocks" scheme) so the caller can
//! work with mutable *variables* and let this crate insert the block
//! parameters and branch arguments that SSA form requires.

#![warn(missing_docs)]

mod frontend;
mod ssa;
mod variable;

pub use crate::frontend::{FunctionBuilder, FunctionBuilderContext};
pub use crate::variable::Variable;
