//! The virtual machine.
//!
//! The machine owns the operand stack, the frame and catch-table
//! chains, the registered code space, the globals and primitive-class
//! registry, and the scheduler state (fibers, task queue, timer wheel,
//! worker registry). The dispatch loop fetches one opcode at a time and
//! polls a safepoint between instructions for pending suspension,
//! timeslice preemption and collection pressure.

use crate::config::MachineConfig;
use crate::error::{VmError, VmResult};
use crate::host::{HostFunctionDef, OutputSink};
use crate::pretty::render_value;
use crate::scheduler::{Fiber, Task, TaskQueue, TimerWheel};
use crate::stats::MachineStats;
use crate::worker::WorkerTable;
use ember_bytecode::{read_i32, read_u32, read_u64, read_u8, InstructionBlock, Opcode};
use ember_core::{RuntimeErrorKind, SymbolTable, Value};
use ember_gc::{FunctionFlags, HeapTag, SharedHeap};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;

/// Code-space bookkeeping for one registered module.
#[derive(Debug, Clone, Copy)]
pub struct ModuleEntry {
    /// First code address of the module.
    pub code_start: usize,
    /// One past the last code address.
    pub code_end: usize,
    /// Offset of the module's data segment in the machine data space.
    pub data_start: usize,
}

/// The per-type classes consulted for member lookup on non-objects.
#[derive(Debug, Clone, Copy)]
pub struct Primitives {
    /// Class for arrays.
    pub array: Value,
    /// Class for booleans.
    pub boolean: Value,
    /// Class for classes.
    pub class: Value,
    /// Class for functions and cfunctions.
    pub function: Value,
    /// Class for generators.
    pub generator: Value,
    /// Class for null.
    pub null: Value,
    /// Class for numbers.
    pub number: Value,
    /// Class for objects.
    pub object: Value,
    /// Class for strings.
    pub string: Value,
    /// Fallback class for everything else.
    pub value: Value,
}

impl Primitives {
    fn empty() -> Primitives {
        Primitives {
            array: Value::NULL,
            boolean: Value::NULL,
            class: Value::NULL,
            function: Value::NULL,
            generator: Value::NULL,
            null: Value::NULL,
            number: Value::NULL,
            object: Value::NULL,
            string: Value::NULL,
            value: Value::NULL,
        }
    }

    /// All ten primitive class values.
    pub fn values(&self) -> [Value; 10] {
        [
            self.array,
            self.boolean,
            self.class,
            self.function,
            self.generator,
            self.null,
            self.number,
            self.object,
            self.string,
            self.value,
        ]
    }
}

/// Pre-interned symbols the runtime itself needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WellKnownSymbols {
    pub name: Value,
    pub message: Value,
    pub length: Value,
    pub main: Value,
}

/// The Ember virtual machine.
pub struct Machine {
    pub(crate) config: MachineConfig,
    pub(crate) heap: SharedHeap,
    pub(crate) symbols: Arc<SymbolTable>,
    pub(crate) out: OutputSink,

    // Registered code
    pub(crate) code: Vec<u8>,
    pub(crate) data: Vec<u8>,
    pub(crate) modules: Vec<ModuleEntry>,
    pub(crate) host_functions: Vec<HostFunctionDef>,

    // Interpreter state (the running fiber)
    pub(crate) stack: Vec<Value>,
    pub(crate) frame: Value,
    pub(crate) catchstack: Value,
    pub(crate) ip: usize,
    pub(crate) halted: bool,
    pub(crate) running: bool,
    pub(crate) status_code: u8,
    pub(crate) frame_depth: usize,
    pub(crate) in_uncaught_handler: bool,
    pub(crate) timeslice_remaining: u32,

    // Globals, primitives and error machinery
    pub(crate) globals: Value,
    pub(crate) primitives: Primitives,
    pub(crate) internal_error_class: Value,
    pub(crate) uncaught_exception_handler: Value,
    pub(crate) well_known: WellKnownSymbols,

    // Scheduler
    pub(crate) current_fiber: u64,
    pub(crate) next_fiber_uid: u64,
    pub(crate) paused_fibers: FxHashMap<u64, Fiber>,
    pub(crate) tasks: Arc<TaskQueue>,
    pub(crate) timers: TimerWheel,
    pub(crate) workers: Arc<WorkerTable>,

    pub(crate) stats: MachineStats,
}

impl Machine {
    /// Create a machine, boot its globals and primitive classes, and
    /// install the default host functions.
    pub fn new(config: MachineConfig) -> Machine {
        let heap = SharedHeap::new(config.gc.clone());
        let symbols = Arc::new(SymbolTable::new());

        let well_known = WellKnownSymbols {
            name: symbols.intern("name"),
            message: symbols.intern("message"),
            length: symbols.intern("length"),
            main: symbols.intern("main"),
        };

        let stdout: Box<dyn std::io::Write + Send> = Box::new(std::io::stdout());
        let mut machine = Machine {
            config,
            heap,
            symbols,
            out: Arc::new(Mutex::new(stdout)),
            code: Vec::new(),
            data: Vec::new(),
            modules: Vec::new(),
            host_functions: Vec::new(),
            stack: Vec::new(),
            frame: Value::NULL,
            catchstack: Value::NULL,
            ip: 0,
            halted: true,
            running: true,
            status_code: 0,
            frame_depth: 0,
            in_uncaught_handler: false,
            timeslice_remaining: 0,
            globals: Value::NULL,
            primitives: Primitives::empty(),
            internal_error_class: Value::NULL,
            uncaught_exception_handler: Value::NULL,
            well_known,
            current_fiber: 0,
            next_fiber_uid: 1,
            paused_fibers: FxHashMap::default(),
            tasks: Arc::new(TaskQueue::new()),
            timers: TimerWheel::new(),
            workers: Arc::new(WorkerTable::new()),
            stats: MachineStats::default(),
        };
        machine.boot();
        crate::builtins::install(&mut machine);
        machine
    }

    /// Create a machine with default configuration.
    pub fn with_defaults() -> Machine {
        Machine::new(MachineConfig::default())
    }

    fn boot(&mut self) {
        // Address 0 is a lone Halt: the safe resume address for fibers
        // suspended outside bytecode (host-function callbacks).
        self.code.push(Opcode::Halt as u8);

        let names = [
            "Array",
            "Boolean",
            "Class",
            "Function",
            "Generator",
            "Null",
            "Number",
            "Object",
            "String",
            "Value",
            "InternalError",
        ];
        let symbols: Vec<Value> = names.iter().map(|n| self.symbols.intern(n)).collect();
        let argv_symbol = self.symbols.intern("ARGV");
        let argv = self.config.argv.clone();

        let (globals, classes) = self.heap.with(|heap| {
            let globals = heap.create_object(Value::NULL);
            let classes: Vec<Value> = symbols
                .iter()
                .map(|&name| {
                    let class = heap.create_class(name);
                    let prototype = heap.create_object(Value::NULL);
                    heap.class_mut(class).expect("just created").prototype = prototype;
                    class
                })
                .collect();

            // Forwarded command-line arguments, visible to scripts.
            let arguments: Vec<Value> = argv
                .iter()
                .map(|arg| heap.create_string(arg.as_bytes()))
                .collect();
            let argv_value = heap.create_array(arguments);
            if let Some(data) = heap.object_mut(globals) {
                data.container.insert(argv_symbol, argv_value);
            }

            (globals, classes)
        });

        self.globals = globals;
        self.primitives = Primitives {
            array: classes[0],
            boolean: classes[1],
            class: classes[2],
            function: classes[3],
            generator: classes[4],
            null: classes[5],
            number: classes[6],
            object: classes[7],
            string: classes[8],
            value: classes[9],
        };
        self.internal_error_class = classes[10];
    }

    // =========================================================================
    // Embedding surface
    // =========================================================================

    /// Register a host function; returns the index `PutCFunction` uses.
    pub fn register_host_function(&mut self, def: HostFunctionDef) -> u32 {
        let index = self.host_functions.len() as u32;
        self.host_functions.push(def);
        index
    }

    /// Look up a registered host function by name.
    pub fn host_function_index(&self, name: &str) -> Option<u32> {
        self.host_functions
            .iter()
            .position(|def| def.name == name)
            .map(|i| i as u32)
    }

    pub(crate) fn host_function(&self, index: u32) -> VmResult<HostFunctionDef> {
        self.host_functions
            .get(index as usize)
            .cloned()
            .ok_or(VmError::UnknownHostFunction(index))
    }

    /// Register a compiled module: its code and data are appended to
    /// the machine's spaces, a module-level function is created, and a
    /// boot task for it is enqueued. Returns the module function.
    pub fn register_module(&mut self, block: &InstructionBlock) -> VmResult<Value> {
        if !self.running {
            return Err(VmError::RuntimeStopped);
        }
        let code_start = self.code.len();
        self.code.extend_from_slice(block.code());
        let data_start = self.data.len();
        self.data.extend_from_slice(block.data());
        self.modules.push(ModuleEntry {
            code_start,
            code_end: self.code.len(),
            data_start,
        });

        let name = self.well_known.main;
        let lvarcount = block.lvarcount();
        let func = self.heap.with(|heap| {
            heap.create_function(name, code_start, 0, 0, lvarcount, FunctionFlags::empty())
        });
        self.tasks.push(Task::callback(func, &[]));
        Ok(func)
    }

    /// Register the interpreted function called with uncaught payloads.
    pub fn set_uncaught_exception_handler(&mut self, handler: Value) {
        self.uncaught_exception_handler = handler;
    }

    /// Redirect the print-family output (tests install a capture
    /// buffer here).
    pub fn set_output(&mut self, out: OutputSink) {
        self.out = out;
    }

    /// The shared heap handle.
    pub fn heap(&self) -> &SharedHeap {
        &self.heap
    }

    /// The symbol table.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Intern a string into a symbol value.
    pub fn intern(&self, text: &str) -> Value {
        self.symbols.intern(text)
    }

    /// Machine statistics.
    pub fn stats(&self) -> &MachineStats {
        &self.stats
    }

    /// Current operand-stack depth (embedding/test visibility).
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// The primitive-class registry.
    pub fn primitives(&self) -> Primitives {
        self.primitives
    }

    /// The class internal runtime errors are instances of.
    pub fn internal_error_class(&self) -> Value {
        self.internal_error_class
    }

    /// Read a global binding by name (embedding convenience).
    pub fn global(&self, name: &str) -> Option<Value> {
        let symbol = self.symbols.intern(name);
        self.heap
            .with(|heap| heap.object(self.globals)?.container.get(&symbol).copied())
    }

    /// Render a value the way `print` would.
    pub fn render(&self, value: Value) -> String {
        self.heap
            .with(|heap| render_value(heap, &self.symbols, value))
    }

    // =========================================================================
    // Scheduler loop
    // =========================================================================

    /// Run the scheduler until no further work can arrive. Returns the
    /// exit status code.
    pub fn start_runtime(&mut self) -> u8 {
        while self.running {
            let now = Instant::now();
            for task in self.timers.drain_due(now) {
                self.tasks.push(task);
            }

            match self.tasks.try_pop() {
                Some(task) => {
                    self.stats.tasks_dispatched += 1;
                    self.install_task(task);
                    if !self.halted {
                        self.run_interpreter();
                    }
                }
                None => {
                    if self.timers.is_empty() && self.workers.is_empty() {
                        break;
                    }
                    self.tasks.wait(self.timers.earliest_deadline());
                }
            }

            if self.heap.should_collect() {
                self.collect_garbage();
            }
        }
        self.status_code
    }

    fn install_task(&mut self, task: Task) {
        self.in_uncaught_handler = false;
        match task {
            Task::Resume { uid, argument } => {
                if self.activate_fiber(uid) {
                    self.stack.push(argument);
                }
            }
            Task::Preempted { uid } => {
                self.activate_fiber(uid);
            }
            Task::ResumeThrow { uid, payload } => {
                if self.activate_fiber(uid) {
                    self.throw_value(payload);
                }
            }
            Task::Callback { func, args, argc } => {
                let uid = self.next_fiber_uid;
                self.next_fiber_uid += 1;
                self.stats.fibers_spawned += 1;
                self.current_fiber = uid;
                self.stack.clear();
                self.frame = Value::NULL;
                self.catchstack = Value::NULL;
                self.frame_depth = 0;
                self.halted = false;
                self.timeslice_remaining = self.config.timeslice;
                self.invoke_callback(func, &args[..argc as usize]);
                if self.frame == Value::NULL {
                    // The callback completed without entering bytecode.
                    self.halted = true;
                }
            }
        }
    }

    /// Restore a paused fiber into the live machine state. A missing
    /// uid means its resumption was cancelled; the task is dropped.
    fn activate_fiber(&mut self, uid: u64) -> bool {
        match self.paused_fibers.remove(&uid) {
            Some(fiber) => {
                self.current_fiber = uid;
                self.stack = fiber.stack;
                self.frame = fiber.frame;
                self.catchstack = fiber.catchstack;
                self.ip = fiber.resume_address;
                self.frame_depth = fiber.frame_depth;
                self.halted = false;
                self.timeslice_remaining = self.config.timeslice;
                true
            }
            None => {
                self.halted = true;
                false
            }
        }
    }

    /// Move the running fiber into the paused table. Execution resumes
    /// at `resume_address` when a resume task arrives.
    pub(crate) fn suspend_current_fiber(&mut self, resume_address: usize) -> u64 {
        let uid = self.current_fiber;
        let fiber = Fiber {
            stack: std::mem::take(&mut self.stack),
            frame: self.frame,
            catchstack: self.catchstack,
            resume_address,
            frame_depth: self.frame_depth,
        };
        self.paused_fibers.insert(uid, fiber);
        self.frame = Value::NULL;
        self.catchstack = Value::NULL;
        self.frame_depth = 0;
        self.halted = true;
        uid
    }

    fn invoke_callback(&mut self, func: Value, args: &[Value]) {
        match self.heap.with(|heap| heap.tag_of(func)) {
            Some(HeapTag::Function) => {
                // The boot frame returns straight to the scheduler.
                self.call_function(func, args, None, 0, true, false, Value::NULL);
            }
            Some(HeapTag::CFunction) => {
                self.call_cfunction(func, args.to_vec(), 0);
            }
            _ => {
                self.throw_internal(
                    RuntimeErrorKind::NotCallable,
                    "task callback is not callable",
                );
            }
        }
    }

    // =========================================================================
    // Dispatch loop
    // =========================================================================

    pub(crate) fn run_interpreter(&mut self) {
        while !self.halted && self.running {
            let byte = match read_u8(&self.code, self.ip) {
                Some(byte) => byte,
                None => self.fatal("instruction pointer out of range"),
            };
            let op = match Opcode::from_u8(byte) {
                Some(op) => op,
                None => self.fatal(&format!("invalid opcode 0x{byte:02x} at {:#x}", self.ip)),
            };
            if self.config.trace_opcodes {
                eprintln!("[vm] {:#06x}: {}", self.ip, op.mnemonic());
            }

            let ip_before = self.ip;
            self.execute(op);
            self.stats.instructions += 1;
            if !self.halted && self.ip == ip_before {
                self.ip += op.length();
            }

            self.safepoint();
        }
    }

    fn execute(&mut self, op: Opcode) {
        match op {
            Opcode::ReadLocal => self.op_readlocal(),
            Opcode::SetLocal => self.op_setlocal(false),
            Opcode::SetLocalPush => self.op_setlocal(true),
            Opcode::ReadMemberSymbol => self.op_readmembersymbol(),
            Opcode::SetMemberSymbol => self.op_setmembersymbol(false),
            Opcode::SetMemberSymbolPush => self.op_setmembersymbol(true),
            Opcode::ReadMemberValue => self.op_readmembervalue(),
            Opcode::SetMemberValue => self.op_setmembervalue(false),
            Opcode::SetMemberValuePush => self.op_setmembervalue(true),
            Opcode::ReadArrayIndex => self.op_readarrayindex(),
            Opcode::SetArrayIndex => self.op_setarrayindex(false),
            Opcode::SetArrayIndexPush => self.op_setarrayindex(true),
            Opcode::ReadGlobal => self.op_readglobal(),
            Opcode::SetGlobal => self.op_setglobal(false),
            Opcode::SetGlobalPush => self.op_setglobal(true),
            Opcode::PutSelf => self.op_putself(),
            Opcode::PutSuper => self.op_putsuper(),
            Opcode::PutSuperMember => self.op_putsupermember(),
            Opcode::PutValue => self.op_putvalue(),
            Opcode::PutString => self.op_putstring(),
            Opcode::PutFunction => self.op_putfunction(),
            Opcode::PutCFunction => self.op_putcfunction(),
            Opcode::PutGenerator => self.op_putgenerator(),
            Opcode::PutClass => self.op_putclass(),
            Opcode::PutArray => self.op_putarray(),
            Opcode::PutHash => self.op_puthash(),
            Opcode::Pop => self.op_pop(),
            Opcode::Dup => self.op_dup(),
            Opcode::DupN => self.op_dupn(),
            Opcode::Swap => self.op_swap(),
            Opcode::Call => self.op_call(),
            Opcode::CallMember => self.op_callmember(),
            Opcode::New => self.op_new(),
            Opcode::Return => self.op_return(),
            Opcode::Yield => self.op_yield(),
            Opcode::Throw => self.op_throw(),
            Opcode::RegisterCatchTable => self.op_registercatchtable(),
            Opcode::PopCatchTable => self.op_popcatchtable(),
            Opcode::Branch => self.op_branch(),
            Opcode::BranchIf => self.op_branchif(),
            Opcode::BranchUnless => self.op_branchunless(),
            Opcode::BranchLt => self.op_branch_compare(Opcode::BranchLt),
            Opcode::BranchGt => self.op_branch_compare(Opcode::BranchGt),
            Opcode::BranchLe => self.op_branch_compare(Opcode::BranchLe),
            Opcode::BranchGe => self.op_branch_compare(Opcode::BranchGe),
            Opcode::BranchEq => self.op_branch_compare(Opcode::BranchEq),
            Opcode::BranchNeq => self.op_branch_compare(Opcode::BranchNeq),
            Opcode::Typeof => self.op_typeof(),
            Opcode::Halt => self.op_halt(),
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Pow
            | Opcode::Eq
            | Opcode::Neq
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::Le
            | Opcode::Ge
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::BAnd
            | Opcode::BOr
            | Opcode::BXor => self.op_binary(op),
            Opcode::UAdd | Opcode::USub | Opcode::UNot | Opcode::UBNot => self.op_unary(op),
        }
    }

    /// Between-instruction poll: timeslice preemption and collection
    /// pressure. Cheap checks only; the counter amortizes the rest.
    fn safepoint(&mut self) {
        if self.timeslice_remaining > 0 {
            self.timeslice_remaining -= 1;
            return;
        }
        self.timeslice_remaining = self.config.timeslice;

        if self.heap.should_collect() {
            self.collect_garbage();
        }

        // Preempt only when another task is actually waiting.
        if !self.halted && !self.tasks.is_empty() {
            let uid = self.suspend_current_fiber(self.ip);
            self.tasks.push(Task::Preempted { uid });
        }
    }

    // =========================================================================
    // Garbage collection
    // =========================================================================

    /// Gather every root and run a collection cycle.
    pub fn collect_garbage(&mut self) {
        let mut roots = Vec::with_capacity(self.stack.len() + 64);
        roots.extend_from_slice(&self.stack);
        roots.push(self.frame);
        roots.push(self.catchstack);
        roots.push(self.globals);
        roots.extend_from_slice(&self.primitives.values());
        roots.push(self.internal_error_class);
        roots.push(self.uncaught_exception_handler);

        for fiber in self.paused_fibers.values() {
            fiber.root_values(&mut roots);
        }
        self.tasks.root_values(&mut roots);
        self.timers.root_values(&mut roots);
        self.workers.root_values(&mut roots);

        self.heap.with(|heap| heap.collect(&roots));
        self.stats.gc_cycles += 1;
    }

    // =========================================================================
    // Stack and operand helpers
    // =========================================================================

    #[inline]
    pub(crate) fn push_stack(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub(crate) fn pop_stack(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => self.fatal("operand stack underflow"),
        }
    }

    #[inline]
    pub(crate) fn operand_u32(&self, offset: usize) -> u32 {
        match read_u32(&self.code, self.ip + offset) {
            Some(v) => v,
            None => self.fatal("truncated instruction operand"),
        }
    }

    #[inline]
    pub(crate) fn operand_i32(&self, offset: usize) -> i32 {
        match read_i32(&self.code, self.ip + offset) {
            Some(v) => v,
            None => self.fatal("truncated instruction operand"),
        }
    }

    #[inline]
    pub(crate) fn operand_u64(&self, offset: usize) -> u64 {
        match read_u64(&self.code, self.ip + offset) {
            Some(v) => v,
            None => self.fatal("truncated instruction operand"),
        }
    }

    #[inline]
    pub(crate) fn operand_u8(&self, offset: usize) -> u8 {
        match read_u8(&self.code, self.ip + offset) {
            Some(v) => v,
            None => self.fatal("truncated instruction operand"),
        }
    }

    /// Resolve a `PutString` data offset against the module containing
    /// the current instruction.
    pub(crate) fn module_data(&self, offset: u32, length: u32) -> &[u8] {
        let module = self
            .modules
            .iter()
            .find(|m| m.code_start <= self.ip && self.ip < m.code_end);
        let module = match module {
            Some(module) => module,
            None => self.fatal("instruction pointer outside every module"),
        };
        let start = module.data_start + offset as usize;
        let end = start + length as usize;
        match self.data.get(start..end) {
            Some(bytes) => bytes,
            None => self.fatal("string constant outside the module data segment"),
        }
    }

    /// Broken-invariant exit: print a diagnostic and terminate the
    /// process. Not catchable.
    pub(crate) fn fatal(&self, message: &str) -> ! {
        eprintln!("ember: fatal runtime fault: {message}");
        std::process::exit(70);
    }
}
