//! Bytecode definitions for the Ember runtime.
//!
//! This crate is the interface between the code generator and the
//! interpreter: the opcode set with its static operand widths, and the
//! [`InstructionBlock`] container a compiled module arrives in. The
//! runtime never sees source text; it registers finished blocks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod opcode;

pub use block::{read_i32, read_u32, read_u64, read_u8, InstructionBlock};
pub use opcode::{Opcode, PutClassFlags, PutFunctionFlags, OPCODE_COUNT};
