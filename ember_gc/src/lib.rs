//! Heap management for the Ember runtime.
//!
//! A cell heap backed by growing arenas with a precise stop-the-world
//! mark-and-sweep collector. Every heap value occupies one [`Cell`];
//! inter-value references are 48-bit cell indices carried inside
//! NaN-boxed [`ember_core::Value`] words, so the collector owns all
//! memory and no raw pointers cross the crate boundary (the opaque
//! cpointer payload excepted).
//!
//! Collection runs when the interpreter reaches a safepoint with the
//! free list below the low-water mark, or on explicit request. Roots are
//! provided by the caller; the persistent-temporary registry protects
//! host-side intermediates between allocations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod collector;
pub mod config;
pub mod handles;
pub mod heap;
pub mod shared;

mod stats;

pub use cell::{
    Array, CFunction, CatchTable, Cell, CellData, Class, CPointer, CPointerDestructor, Frame,
    Function, FunctionFlags, Generator, HeapString, HeapTag, Header, Object, ThreadPolicy,
    SHORT_STRING_MAX, SMALL_FRAME_LOCALS,
};
pub use config::{ConfigError, GcConfig};
pub use heap::Heap;
pub use shared::{PersistentGuard, SharedHeap};
pub use stats::GcStats;
