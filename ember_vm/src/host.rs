//! Host-function ABI.
//!
//! A host function receives a [`HostCtx`] plus a value slice already
//! truncated to its declared arity. Failure is reported by calling
//! [`HostCtx::throw`] before returning; the return value is then
//! ignored. The registry maps the `host_index` operand of
//! `PutCFunction` to a concrete function pointer, so bytecode never
//! carries raw pointers.

use crate::scheduler::{Task, TaskQueue, TimerWheel};
use ember_core::{SymbolTable, Value};
use ember_gc::{SharedHeap, ThreadPolicy};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Shared output sink for `print`-family host functions.
pub type OutputSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Host function signature.
pub type HostFn = fn(&mut HostCtx<'_>, &[Value]) -> Value;

/// A registered host function.
#[derive(Clone)]
pub struct HostFunctionDef {
    /// Diagnostic name; also the default symbol for `PutCFunction`.
    pub name: &'static str,
    /// The function pointer.
    pub fp: HostFn,
    /// Declared arity; surplus arguments are dropped before the call.
    pub argc: u32,
    /// Execution context policy.
    pub policy: ThreadPolicy,
    /// Push the return value after the call.
    pub push_return: bool,
    /// Halt the interpreter after the call returns.
    pub halt_after_return: bool,
}

impl std::fmt::Debug for HostFunctionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HostFunctionDef({}, argc={})", self.name, self.argc)
    }
}

/// Services only available while the interpreter thread is calling.
pub struct MainServices<'a> {
    /// Timer and ticker registration.
    pub timers: &'a mut TimerWheel,
}

/// Call context handed to host functions.
pub struct HostCtx<'a> {
    /// The shared heap handle.
    pub heap: &'a SharedHeap,
    /// The runtime's symbol table.
    pub symbols: &'a SymbolTable,
    /// The scheduler task queue.
    pub tasks: &'a Arc<TaskQueue>,
    /// Output sink for the print family.
    pub out: &'a OutputSink,
    /// Uid of the fiber this call belongs to.
    pub fiber_uid: u64,
    /// Whether the call runs on a worker thread.
    pub on_worker: bool,
    main: Option<MainServices<'a>>,
    thrown: Option<Value>,
    suspend: bool,
    exit: Option<u8>,
    uncaught_handler: Option<Value>,
}

impl<'a> HostCtx<'a> {
    /// Context for a call on the interpreter thread.
    #[allow(clippy::too_many_arguments)]
    pub fn for_main(
        heap: &'a SharedHeap,
        symbols: &'a SymbolTable,
        tasks: &'a Arc<TaskQueue>,
        out: &'a OutputSink,
        fiber_uid: u64,
        main: MainServices<'a>,
    ) -> HostCtx<'a> {
        HostCtx {
            heap,
            symbols,
            tasks,
            out,
            fiber_uid,
            on_worker: false,
            main: Some(main),
            thrown: None,
            suspend: false,
            exit: None,
            uncaught_handler: None,
        }
    }

    /// Context for a call on a worker thread.
    pub fn for_worker(
        heap: &'a SharedHeap,
        symbols: &'a SymbolTable,
        tasks: &'a Arc<TaskQueue>,
        out: &'a OutputSink,
        fiber_uid: u64,
    ) -> HostCtx<'a> {
        HostCtx {
            heap,
            symbols,
            tasks,
            out,
            fiber_uid,
            on_worker: true,
            main: None,
            thrown: None,
            suspend: false,
            exit: None,
            uncaught_handler: None,
        }
    }

    // =========================================================================
    // Effects
    // =========================================================================

    /// Report a thrown payload. The call's return value is ignored and
    /// the payload unwinds on the interpreter thread.
    pub fn throw(&mut self, payload: Value) {
        self.thrown = Some(payload);
    }

    /// Throw a message string.
    pub fn throw_message(&mut self, message: &str) {
        let payload = self.heap.create_string(message.as_bytes());
        self.throw(payload);
    }

    /// Ask the interpreter to suspend the calling fiber once this call
    /// returns. The fiber resumes when something enqueues a resume task
    /// for [`HostCtx::fiber_uid`]; the resume argument becomes the
    /// call's result.
    pub fn request_suspend(&mut self) {
        self.suspend = true;
    }

    /// Ask the runtime to stop with the given status code.
    pub fn request_exit(&mut self, status: u8) {
        self.exit = Some(status);
    }

    /// Register the interpreted function called with uncaught payloads.
    pub fn register_uncaught_handler(&mut self, handler: Value) {
        self.uncaught_handler = Some(handler);
    }

    /// Enqueue a resume task for a paused fiber.
    pub fn resume_fiber(&mut self, uid: u64, argument: Value) {
        self.tasks.push(Task::Resume { uid, argument });
    }

    /// Enqueue a callback task.
    pub fn enqueue_callback(&mut self, func: Value, arguments: &[Value]) {
        self.tasks.push(Task::callback(func, arguments));
    }

    /// Timer services; `None` on worker threads.
    pub fn timers(&mut self) -> Option<&mut TimerWheel> {
        self.main.as_mut().map(|m| &mut *m.timers)
    }

    /// Register a one-shot timer invoking `func` after `delay`.
    /// Returns `None` on worker threads.
    pub fn register_timer(&mut self, delay: Duration, func: Value, args: &[Value]) -> Option<u64> {
        let task = Task::callback(func, args);
        self.timers().map(|wheel| wheel.register_timer(delay, task))
    }

    /// Register a re-arming ticker. Returns `None` on worker threads.
    pub fn register_ticker(
        &mut self,
        interval: Duration,
        func: Value,
        args: &[Value],
    ) -> Option<u64> {
        let task = Task::callback(func, args);
        self.timers()
            .map(|wheel| wheel.register_ticker(interval, task))
    }

    // =========================================================================
    // Effect readout (interpreter side)
    // =========================================================================

    /// The thrown payload, if any.
    pub fn take_thrown(&mut self) -> Option<Value> {
        self.thrown.take()
    }

    /// Whether suspension was requested.
    pub fn suspend_requested(&self) -> bool {
        self.suspend
    }

    /// The requested exit status, if any.
    pub fn exit_requested(&self) -> Option<u8> {
        self.exit
    }

    /// The handler registered during this call, if any.
    pub fn take_uncaught_handler(&mut self) -> Option<Value> {
        self.uncaught_handler.take()
    }
}
