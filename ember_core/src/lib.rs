//! Core value representation for the Ember runtime.
//!
//! This crate defines the NaN-boxed [`Value`] word, the numeric tower and
//! its conversion/arithmetic contract, the two immediate string
//! encodings, and the symbol table. It has no knowledge of the heap
//! beyond the 48-bit cell index a heap reference carries.

#![warn(clippy::all)]

pub mod error;
pub mod symbol;
pub mod value;

pub use error::RuntimeErrorKind;
pub use symbol::{crc32, symbol_hash, symbol_value, SymbolTable};
pub use value::{
    parse_float, parse_int, utf8_codepoint_count, utf8_codepoint_range, Value, ISTRING_MAX,
    MAX_INT, MIN_INT, PSTRING_LEN,
};
