//! The Ember virtual machine.
//!
//! A stack-based bytecode interpreter for a dynamically-typed,
//! class-based scripting language, fused with a cooperative scheduler:
//!
//! - **Dispatch**: one-byte opcodes with fixed operand widths, a direct
//!   match dispatch, and a safepoint poll between instructions for
//!   suspension, timeslice preemption and collection pressure.
//! - **Frames & catch tables**: reified activation records on the cell
//!   heap; lexical parents drive variable lookup, dynamic parents drive
//!   return and unwinding.
//! - **Generators**: suspended generators own a frame, a catch-chain
//!   tail, an operand-stack slice and a resume address.
//! - **Fibers**: cooperative threads identified by uid; paused fibers
//!   live in a side table, tasks resume them in FIFO order.
//! - **Workers**: blocking host calls run on OS threads and marshal
//!   their result or error back as tasks.
//!
//! ```ignore
//! use ember_bytecode::InstructionBlock;
//! use ember_vm::Machine;
//!
//! let mut block = InstructionBlock::new(0);
//! block.emit_putvalue(ember_core::Value::int(42));
//! block.emit_pop();
//! block.emit_halt();
//!
//! let mut machine = Machine::with_defaults();
//! machine.register_module(&block)?;
//! let status = machine.start_runtime();
//! ```

#![warn(clippy::all)]

pub mod builtins;
pub mod config;
pub mod error;
pub mod frame;
pub mod host;
pub mod machine;
pub mod ops;
pub mod pretty;
pub mod scheduler;
pub mod stats;
pub mod worker;

pub use config::MachineConfig;
pub use error::{VmError, VmResult};
pub use host::{HostCtx, HostFn, HostFunctionDef, OutputSink};
pub use machine::{Machine, ModuleEntry, Primitives};
pub use pretty::render_value;
pub use scheduler::{Fiber, Task, TaskQueue, TimerWheel};
pub use stats::MachineStats;
pub use worker::{WorkerRecord, WorkerTable};
