//! Worker threads for blocking host calls.
//!
//! A host function whose thread policy excludes the interpreter thread
//! is offloaded: the calling fiber suspends, an OS thread runs the
//! function, and the result (or a caught host panic) comes back as a
//! resume task. Workers never interpret bytecode and touch heap values
//! only through the shared heap handle, i.e. under the collector mutex.
//!
//! The registry keeps each running worker's argument inbox alive for
//! the collector; the record is registered before the thread starts so
//! the arguments are never unrooted, and torn down by the worker itself
//! once its result task is safely rooted in the task queue.

use crate::host::{HostCtx, HostFunctionDef, OutputSink};
use crate::scheduler::{Task, TaskQueue};
use ember_core::{SymbolTable, Value};
use ember_gc::SharedHeap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A running worker's rooted state.
#[derive(Debug)]
pub struct WorkerRecord {
    /// Arguments handed to the host function.
    pub arguments: Vec<Value>,
    /// Fiber waiting on the result.
    pub fiber_uid: u64,
}

/// Registry of running workers.
#[derive(Default)]
pub struct WorkerTable {
    records: Mutex<FxHashMap<u64, WorkerRecord>>,
    next_id: Mutex<u64>,
}

impl WorkerTable {
    /// Create an empty table.
    pub fn new() -> WorkerTable {
        WorkerTable::default()
    }

    /// Register a worker before its thread starts.
    pub fn register(&self, arguments: Vec<Value>, fiber_uid: u64) -> u64 {
        let mut next = self.next_id.lock();
        let id = *next;
        *next += 1;
        self.records.lock().insert(
            id,
            WorkerRecord {
                arguments,
                fiber_uid,
            },
        );
        id
    }

    /// Tear down a finished worker.
    pub fn finish(&self, id: u64) {
        self.records.lock().remove(&id);
    }

    /// Number of running workers.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no workers are running.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Append every rooted value to `out`.
    pub fn root_values(&self, out: &mut Vec<Value>) {
        for record in self.records.lock().values() {
            out.extend_from_slice(&record.arguments);
        }
    }
}

/// Everything a worker thread needs, cloned out of the machine.
pub struct WorkerContext {
    /// Shared heap handle.
    pub heap: SharedHeap,
    /// Symbol table.
    pub symbols: Arc<SymbolTable>,
    /// Task queue for the result.
    pub tasks: Arc<TaskQueue>,
    /// Worker registry for teardown.
    pub workers: Arc<WorkerTable>,
    /// Output sink.
    pub out: OutputSink,
}

/// Spawn a worker thread executing `def` with `arguments`, resuming
/// `fiber_uid` with the result. Host panics are caught and re-thrown
/// inside the fiber.
pub fn spawn_worker(ctx: WorkerContext, def: HostFunctionDef, arguments: Vec<Value>, fiber_uid: u64) {
    let worker_id = ctx.workers.register(arguments.clone(), fiber_uid);

    std::thread::spawn(move || {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut host_ctx =
                HostCtx::for_worker(&ctx.heap, &ctx.symbols, &ctx.tasks, &ctx.out, fiber_uid);
            let result = (def.fp)(&mut host_ctx, &arguments);
            (result, host_ctx.take_thrown())
        }));

        let task = match outcome {
            Ok((_, Some(payload))) => Task::ResumeThrow {
                uid: fiber_uid,
                payload,
            },
            Ok((result, None)) => Task::Resume {
                uid: fiber_uid,
                argument: result,
            },
            Err(panic) => {
                let message = panic_message(&panic);
                let payload = ctx
                    .heap
                    .create_string(format!("worker thread panicked: {message}").as_bytes());
                Task::ResumeThrow {
                    uid: fiber_uid,
                    payload,
                }
            }
        };

        // Keep the result alive across the gap between allocation and
        // the task landing in the queue (which is itself a GC root).
        let guard = match task {
            Task::Resume { argument, .. } => Some(ctx.heap.persist(argument)),
            Task::ResumeThrow { payload, .. } => Some(ctx.heap.persist(payload)),
            _ => None,
        };
        ctx.tasks.push(task);
        drop(guard);

        ctx.workers.finish(worker_id);
    });
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
