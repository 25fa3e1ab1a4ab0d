//! Generator calls, yields and fiber-level yields.
//!
//! Calling a generator reinstalls its saved frame, catch-chain tail,
//! operand-stack snapshot and resume address on top of the caller's
//! state. `Yield` snapshots everything above the frame's entry stack
//! size and returns the yielded value while the generator stays
//! runnable. A `Return` inside the body marks it finished; further
//! calls return null.
//!
//! `Yield` in a frame that belongs to no generator suspends the
//! running fiber instead and requeues it at the task-queue tail.

use crate::machine::Machine;
use crate::scheduler::Task;
use ember_core::{RuntimeErrorKind, Value};

impl Machine {
    pub(crate) fn op_yield(&mut self) {
        let generator = self
            .heap
            .with(|heap| heap.frame(self.frame).map(|f| f.generator))
            .unwrap_or(Value::NULL);

        if generator != Value::NULL {
            self.generator_yield(generator);
        } else {
            // Cooperative fiber yield: requeue at the tail so other
            // tasks run first, resume with null pushed.
            let uid = self.suspend_current_fiber(self.ip + 1);
            self.tasks.push(Task::Resume {
                uid,
                argument: Value::NULL,
            });
        }
    }

    /// Call semantics for a generator value.
    pub(crate) fn call_generator(&mut self, generator: Value, args: &[Value], next_ip: usize) {
        let snapshot = self.heap.with(|heap| {
            heap.generator(generator).map(|g| {
                (
                    g.started,
                    g.running,
                    g.finished,
                    g.boot_function,
                    g.bound_self,
                    g.bound_self_set,
                )
            })
        });
        let (started, running, finished, boot, bound_self, bound_self_set) = match snapshot {
            Some(fields) => fields,
            None => {
                self.throw_internal(RuntimeErrorKind::NotCallable, "callee is not a generator");
                return;
            }
        };

        if finished {
            self.push_stack(Value::NULL);
            return;
        }
        if running {
            self.throw_internal(
                RuntimeErrorKind::GeneratorRunning,
                "generator resumed while already running",
            );
            return;
        }

        if !started {
            self.start_generator(generator, boot, bound_self, bound_self_set, args, next_ip);
        } else {
            let argument = args.first().copied().unwrap_or(Value::NULL);
            self.resume_generator(generator, argument, next_ip);
        }
    }

    /// First call: run the boot function with the generator recorded on
    /// its frame.
    fn start_generator(
        &mut self,
        generator: Value,
        boot: Value,
        bound_self: Value,
        bound_self_set: bool,
        args: &[Value],
        next_ip: usize,
    ) {
        let receiver = if bound_self_set { Some(bound_self) } else { None };
        self.call_function(boot, args, receiver, next_ip, false, false, generator);

        // The call can fail (arity, depth); only a frame that actually
        // carries the generator marks it started.
        let entered = self
            .heap
            .with(|heap| heap.frame(self.frame).map(|f| f.generator) == Some(generator));
        if entered {
            self.heap.with(|heap| {
                if let Some(data) = heap.generator_mut(generator) {
                    data.started = true;
                    data.running = true;
                }
            });
        }
    }

    /// Later calls: reinstall the saved machine slice on top of the
    /// current state.
    fn resume_generator(&mut self, generator: Value, argument: Value, next_ip: usize) {
        let (frame_ref, saved_catch, saved_stack, resume_address) = self.heap.with(|heap| {
            let data = heap.generator_mut(generator).expect("checked by caller");
            data.running = true;
            (
                data.frame,
                std::mem::replace(&mut data.catchtable, Value::NULL),
                std::mem::take(&mut data.stack),
                data.resume_address,
            )
        });

        // Relink the frame to the current call site: resumption may
        // come from anywhere.
        let current_frame = self.frame;
        let current_catch = self.catchstack;
        let caller_stacksize = self.stack.len();
        self.heap.with(|heap| {
            if let Some(frame) = heap.frame_mut(frame_ref) {
                frame.parent = current_frame;
                frame.return_address = next_ip;
                frame.stacksize = caller_stacksize;
                frame.catchtable = current_catch;
            }
        });

        // Splice the generator's own catch tables onto the current
        // chain.
        if saved_catch != Value::NULL {
            self.heap.with(|heap| {
                let mut cursor = saved_catch;
                loop {
                    let parent = match heap.catchtable(cursor) {
                        Some(table) => table.parent,
                        None => break,
                    };
                    if parent == Value::NULL {
                        if let Some(table) = heap.catchtable_mut(cursor) {
                            table.parent = current_catch;
                        }
                        break;
                    }
                    cursor = parent;
                }
            });
            self.catchstack = saved_catch;
        }

        self.frame = frame_ref;
        self.frame_depth += 1;
        self.stack.extend(saved_stack);
        self.ip = resume_address;
        self.push_stack(argument);
    }

    /// `Yield` inside a generator body: snapshot and return to the
    /// caller with the yielded value.
    fn generator_yield(&mut self, generator: Value) {
        let yielded = self.pop_stack();
        let frame_ref = self.frame;
        let (parent, return_address, stacksize, entry_catch) = match self.heap.with(|heap| {
            heap.frame(frame_ref)
                .map(|f| (f.parent, f.return_address, f.stacksize, f.catchtable))
        }) {
            Some(fields) => fields,
            None => self.fatal("yield outside any frame"),
        };

        // Operand values above the entry size belong to the generator.
        let saved_stack = self.stack.split_off(stacksize);

        // Catch tables pushed since entry belong to it too; cut the
        // chain where it meets the caller's.
        let saved_catch = if self.catchstack != entry_catch {
            let top = self.catchstack;
            self.heap.with(|heap| {
                let mut cursor = top;
                loop {
                    let parent = match heap.catchtable(cursor) {
                        Some(table) => table.parent,
                        None => break,
                    };
                    if parent == entry_catch {
                        if let Some(table) = heap.catchtable_mut(cursor) {
                            table.parent = Value::NULL;
                        }
                        break;
                    }
                    cursor = parent;
                }
            });
            top
        } else {
            Value::NULL
        };
        self.catchstack = entry_catch;

        let resume_address = self.ip + 1;
        self.heap.with(|heap| {
            if let Some(data) = heap.generator_mut(generator) {
                data.stack = saved_stack;
                data.catchtable = saved_catch;
                data.resume_address = resume_address;
                data.running = false;
                data.frame = frame_ref;
            }
        });

        self.frame = parent;
        self.frame_depth -= 1;
        self.ip = return_address;
        self.push_stack(yielded);
    }
}
