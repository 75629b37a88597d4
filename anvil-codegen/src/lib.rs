//! Anvil code generation library.
//!
//! This crate translates a typed, SSA-form intermediate representation into
//! executable machine code for 64-bit x86 and AArch64. The pipeline is:
//!
//! 1. Build an [`ir::Function`] (the `anvil-wasm` crate does this from
//!    WebAssembly, and tests construct IR directly with a
//!    [`cursor::FuncCursor`]).
//! 2. Lower the IR to virtual-register machine instructions
//!    ([`machinst::VCode`]) for the selected ISA.
//! 3. Run register allocation ([`regalloc`]).
//! 4. Emit bytes, relocations, traps and call sites into a
//!    [`machinst::MachBuffer`].
//!
//! Each function is compiled independently; the library keeps no mutable
//! state between compilations, so separate functions may be compiled on
//! separate threads.

#![warn(missing_docs)]

pub mod binemit;
pub mod cursor;
pub mod ir;
pub mod isa;
pub mod machinst;
pub mod regalloc;
pub mod settings;

mod result;

pub use crate::result::{CodegenError, CodegenResult};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
