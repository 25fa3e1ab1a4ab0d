//! Call and return machinery.
//!
//! `Call` dispatches on the callee's heap type: functions push a frame,
//! host functions run through the registry (or get offloaded to a
//! worker when their thread policy demands it), classes instantiate,
//! generators resume.

use crate::host::{HostCtx, MainServices};
use crate::machine::Machine;
use crate::worker::{spawn_worker, WorkerContext};
use ember_bytecode::Opcode;
use ember_core::{RuntimeErrorKind, Value};
use ember_gc::{Frame, HeapTag, ThreadPolicy};
use smallvec::smallvec;
use std::sync::Arc;

impl Machine {
    pub(crate) fn op_call(&mut self) {
        let argc = self.operand_u32(1) as usize;
        let next_ip = self.ip + Opcode::Call.length();
        let args = self.pop_arguments(argc);
        let callee = self.pop_stack();
        self.call_value(callee, args, None, next_ip);
    }

    pub(crate) fn op_callmember(&mut self) {
        let argc = self.operand_u32(1) as usize;
        let next_ip = self.ip + Opcode::CallMember.length();
        let args = self.pop_arguments(argc);
        let callee = self.pop_stack();
        let receiver = self.pop_stack();
        self.call_value(callee, args, Some(receiver), next_ip);
    }

    pub(crate) fn op_new(&mut self) {
        let argc = self.operand_u32(1) as usize;
        let next_ip = self.ip + Opcode::New.length();
        let args = self.pop_arguments(argc);
        let callee = self.pop_stack();
        if self.heap.with(|heap| heap.tag_of(callee)) == Some(HeapTag::Class) {
            self.call_class(callee, &args, next_ip);
        } else {
            let kind = self.heap.with(|heap| heap.type_name(callee));
            self.throw_internal(
                RuntimeErrorKind::NotCallable,
                &format!("new expects a class, got {kind}"),
            );
        }
    }

    fn pop_arguments(&mut self, argc: usize) -> Vec<Value> {
        if self.stack.len() < argc {
            self.fatal("operand stack underflow in call");
        }
        let start = self.stack.len() - argc;
        self.stack.split_off(start)
    }

    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        receiver: Option<Value>,
        next_ip: usize,
    ) {
        match self.heap.with(|heap| heap.tag_of(callee)) {
            Some(HeapTag::Function) => {
                self.call_function(callee, &args, receiver, next_ip, false, false, Value::NULL);
            }
            Some(HeapTag::CFunction) => {
                self.call_cfunction(callee, args, next_ip);
            }
            Some(HeapTag::Class) => {
                self.call_class(callee, &args, next_ip);
            }
            Some(HeapTag::Generator) => {
                self.call_generator(callee, &args, next_ip);
            }
            _ => {
                let kind = self.heap.with(|heap| heap.type_name(callee));
                self.throw_internal(
                    RuntimeErrorKind::NotCallable,
                    &format!("value of type {kind} is not callable"),
                );
            }
        }
    }

    // =========================================================================
    // Interpreted calls
    // =========================================================================

    /// Push a frame for `function` and jump to its body.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn call_function(
        &mut self,
        function: Value,
        args: &[Value],
        receiver: Option<Value>,
        return_address: usize,
        halt_after_return: bool,
        return_self: bool,
        generator: Value,
    ) {
        let data = match self.heap.with(|heap| heap.function(function).cloned()) {
            Some(data) => data,
            None => {
                self.throw_internal(RuntimeErrorKind::NotCallable, "callee is not a function");
                return;
            }
        };

        if (args.len() as u32) < data.minimum_argc {
            let name = self.symbols.describe(data.name);
            self.throw_internal(
                RuntimeErrorKind::WrongArity,
                &format!(
                    "{} expects at least {} arguments, got {}",
                    name,
                    data.minimum_argc,
                    args.len()
                ),
            );
            return;
        }
        if self.frame_depth >= self.config.max_frame_depth {
            self.throw_internal(RuntimeErrorKind::StackOverflow, "frame stack exhausted");
            return;
        }

        let self_value = if data.bound_self_set {
            data.bound_self
        } else if let Some(receiver) = receiver {
            receiver
        } else {
            self.current_self()
        };

        // Locals: declared parameters first, everything else null.
        // Surplus arguments are dropped unless the function asked for
        // an arguments array in the slot after its parameters.
        let lvarcount = data.lvarcount as usize;
        let declared = data.argc as usize;
        let mut locals = smallvec![Value::NULL; lvarcount];
        for (slot, &argument) in locals.iter_mut().zip(args.iter().take(declared)) {
            *slot = argument;
        }
        if data.flags.contains(ember_gc::FunctionFlags::NEEDS_ARGUMENTS) && declared < lvarcount {
            let bundle = self.heap.with(|heap| heap.create_array(args.to_vec()));
            locals[declared] = bundle;
        }

        let frame = Frame {
            parent: self.frame,
            lexical_parent: data.context,
            catchtable: self.catchstack,
            caller: function,
            self_value,
            origin_address: data.body_address,
            return_address,
            stacksize: self.stack.len(),
            locals,
            halt_after_return,
            return_self,
            generator,
        };
        let frame_ref = self.heap.with(|heap| heap.create_frame(frame));
        if self.config.trace_frames {
            eprintln!(
                "[vm] push frame {} depth={}",
                self.symbols.describe(data.name),
                self.frame_depth + 1
            );
        }

        self.frame = frame_ref;
        self.frame_depth += 1;
        self.stats.calls += 1;
        self.ip = data.body_address;
    }

    pub(crate) fn op_return(&mut self) {
        if self.frame == Value::NULL {
            self.fatal("return outside any frame");
        }
        let frame_ref = self.frame;
        let (parent, return_address, stacksize, halt_after_return, return_self, self_value, generator) =
            match self.heap.with(|heap| {
                heap.frame(frame_ref).map(|f| {
                    (
                        f.parent,
                        f.return_address,
                        f.stacksize,
                        f.halt_after_return,
                        f.return_self,
                        f.self_value,
                        f.generator,
                    )
                })
            }) {
                Some(fields) => fields,
                None => self.fatal("current frame is not a frame cell"),
            };

        let return_value = self.pop_stack();

        // A return out of a generator body finishes the generator.
        if generator != Value::NULL {
            self.heap.with(|heap| {
                if let Some(data) = heap.generator_mut(generator) {
                    data.finished = true;
                    data.running = false;
                    data.frame = Value::NULL;
                    data.catchtable = Value::NULL;
                    data.stack.clear();
                }
            });
        }

        self.pop_catchtables_for(frame_ref);
        if self.config.trace_frames {
            eprintln!("[vm] pop frame depth={}", self.frame_depth);
        }
        self.frame = parent;
        self.frame_depth -= 1;
        self.stack.truncate(stacksize);

        if halt_after_return {
            self.halted = true;
        } else {
            self.ip = return_address;
            let pushed = if return_self { self_value } else { return_value };
            self.push_stack(pushed);
        }
    }

    // =========================================================================
    // Host calls
    // =========================================================================

    /// Call a host function, routing to a worker thread when its policy
    /// excludes the interpreter thread.
    pub(crate) fn call_cfunction(&mut self, cfunction: Value, mut args: Vec<Value>, next_ip: usize) {
        let data = match self.heap.with(|heap| heap.cfunction(cfunction).cloned()) {
            Some(data) => data,
            None => {
                self.throw_internal(RuntimeErrorKind::NotCallable, "callee is not a cfunction");
                return;
            }
        };
        // Surplus arguments beyond the declared arity are dropped.
        args.truncate(data.argc as usize);

        let def = match self.host_function(data.host_index) {
            Ok(def) => def,
            Err(_) => {
                self.throw_internal(
                    RuntimeErrorKind::InvalidArgument,
                    "cfunction refers to an unregistered host function",
                );
                return;
            }
        };

        if matches!(def.policy, ThreadPolicy::Worker) {
            // Offload: the calling fiber suspends and resumes with the
            // worker's result (or its error re-thrown).
            let uid = self.suspend_current_fiber(next_ip);
            self.stats.workers_started += 1;
            let context = WorkerContext {
                heap: self.heap.clone(),
                symbols: Arc::clone(&self.symbols),
                tasks: Arc::clone(&self.tasks),
                workers: Arc::clone(&self.workers),
                out: Arc::clone(&self.out),
            };
            spawn_worker(context, def, args, uid);
            return;
        }

        let fiber_uid = self.current_fiber;
        let (result, thrown, suspend, exit, uncaught_handler) = {
            let mut ctx = HostCtx::for_main(
                &self.heap,
                &self.symbols,
                &self.tasks,
                &self.out,
                fiber_uid,
                MainServices {
                    timers: &mut self.timers,
                },
            );
            let result = (def.fp)(&mut ctx, &args);
            (
                result,
                ctx.take_thrown(),
                ctx.suspend_requested(),
                ctx.exit_requested(),
                ctx.take_uncaught_handler(),
            )
        };

        if let Some(handler) = uncaught_handler {
            self.uncaught_exception_handler = handler;
        }
        if let Some(payload) = thrown {
            self.throw_value(payload);
            return;
        }
        if let Some(status) = exit {
            self.status_code = status;
            self.running = false;
            self.halted = true;
            return;
        }
        if suspend {
            // The resume argument becomes the call's result.
            self.suspend_current_fiber(next_ip);
            return;
        }
        if data.push_return {
            self.push_stack(result);
        }
        if data.halt_after_return {
            self.halted = true;
        }
    }
}
