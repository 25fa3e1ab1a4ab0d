//! Default host functions.
//!
//! The minimal set the runtime and its tests rely on: output, fiber
//! control, timers and the worker-offloaded `sleep`. Everything else a
//! standard library would add goes through the same registry.

use crate::host::{HostCtx, HostFunctionDef};
use crate::machine::Machine;
use crate::pretty::render_value;
use ember_core::Value;
use ember_gc::ThreadPolicy;
use std::io::Write;
use std::time::Duration;

fn render_arguments(ctx: &HostCtx<'_>, args: &[Value]) -> String {
    let rendered: Vec<String> = args
        .iter()
        .map(|&value| ctx.heap.with(|heap| render_value(heap, ctx.symbols, value)))
        .collect();
    rendered.join(" ")
}

fn builtin_print(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let line = render_arguments(ctx, args);
    let mut out = ctx.out.lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
    Value::NULL
}

fn builtin_write(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let text = render_arguments(ctx, args);
    let mut out = ctx.out.lock();
    let _ = write!(out, "{text}");
    let _ = out.flush();
    Value::NULL
}

fn builtin_spawn(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    if args.is_empty() {
        ctx.throw_message("spawn expects a callable");
        return Value::NULL;
    }
    ctx.enqueue_callback(args[0], &args[1..]);
    Value::NULL
}

fn builtin_suspend_thread(ctx: &mut HostCtx<'_>, _args: &[Value]) -> Value {
    ctx.request_suspend();
    Value::NULL
}

fn builtin_resume_thread(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let uid = args.first().copied().unwrap_or(Value::NULL).to_i64();
    if uid < 0 {
        ctx.throw_message("resume expects a fiber uid");
        return Value::NULL;
    }
    let argument = args.get(1).copied().unwrap_or(Value::NULL);
    ctx.resume_fiber(uid as u64, argument);
    Value::NULL
}

fn builtin_get_thread_uid(ctx: &mut HostCtx<'_>, _args: &[Value]) -> Value {
    Value::number_from_i64(ctx.fiber_uid as i64)
}

fn builtin_set_timer(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let delay = Duration::from_millis(args.first().copied().unwrap_or(Value::NULL).to_i64().max(0) as u64);
    let func = args.get(1).copied().unwrap_or(Value::NULL);
    let rest = args.get(2..).unwrap_or(&[]);
    match ctx.register_timer(delay, func, rest) {
        Some(id) => Value::number_from_i64(id as i64),
        None => {
            ctx.throw_message("timers are unavailable on worker threads");
            Value::NULL
        }
    }
}

fn builtin_set_ticker(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let interval =
        Duration::from_millis(args.first().copied().unwrap_or(Value::NULL).to_i64().max(0) as u64);
    let func = args.get(1).copied().unwrap_or(Value::NULL);
    let rest = args.get(2..).unwrap_or(&[]);
    match ctx.register_ticker(interval, func, rest) {
        Some(id) => Value::number_from_i64(id as i64),
        None => {
            ctx.throw_message("tickers are unavailable on worker threads");
            Value::NULL
        }
    }
}

fn builtin_clear_timer(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let id = args.first().copied().unwrap_or(Value::NULL).to_i64();
    if let Some(wheel) = ctx.timers() {
        if id >= 0 {
            wheel.clear_timer(id as u64);
        }
    }
    Value::NULL
}

fn builtin_clear_ticker(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let id = args.first().copied().unwrap_or(Value::NULL).to_i64();
    if let Some(wheel) = ctx.timers() {
        if id >= 0 {
            wheel.clear_ticker(id as u64);
        }
    }
    Value::NULL
}

/// Blocking sleep; worker-only, so calling it from a fiber offloads and
/// lets the scheduler keep dispatching. Returns its argument so the
/// continuation observes the round-trip.
fn builtin_sleep(_ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let ms = args.first().copied().unwrap_or(Value::NULL).to_i64().max(0);
    std::thread::sleep(Duration::from_millis(ms as u64));
    args.first().copied().unwrap_or(Value::NULL)
}

fn builtin_set_uncaught_exception_handler(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let handler = args.first().copied().unwrap_or(Value::NULL);
    ctx.register_uncaught_handler(handler);
    Value::NULL
}

fn builtin_exit(ctx: &mut HostCtx<'_>, args: &[Value]) -> Value {
    let status = args.first().copied().unwrap_or(Value::NULL).to_i64();
    ctx.request_exit(status.clamp(0, 255) as u8);
    Value::NULL
}

/// Register the default host functions on a fresh machine.
pub fn install(machine: &mut Machine) {
    let defs = [
        HostFunctionDef {
            name: "print",
            fp: builtin_print,
            argc: 8,
            policy: ThreadPolicy::Both,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "write",
            fp: builtin_write,
            argc: 8,
            policy: ThreadPolicy::Both,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "spawn",
            fp: builtin_spawn,
            argc: 4,
            policy: ThreadPolicy::Main,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "suspend_thread",
            fp: builtin_suspend_thread,
            argc: 0,
            policy: ThreadPolicy::Main,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "resume_thread",
            fp: builtin_resume_thread,
            argc: 2,
            policy: ThreadPolicy::Main,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "get_thread_uid",
            fp: builtin_get_thread_uid,
            argc: 0,
            policy: ThreadPolicy::Main,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "set_timer",
            fp: builtin_set_timer,
            argc: 6,
            policy: ThreadPolicy::Main,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "set_ticker",
            fp: builtin_set_ticker,
            argc: 6,
            policy: ThreadPolicy::Main,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "clear_timer",
            fp: builtin_clear_timer,
            argc: 1,
            policy: ThreadPolicy::Main,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "clear_ticker",
            fp: builtin_clear_ticker,
            argc: 1,
            policy: ThreadPolicy::Main,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "sleep",
            fp: builtin_sleep,
            argc: 1,
            policy: ThreadPolicy::Worker,
            push_return: true,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "set_uncaught_exception_handler",
            fp: builtin_set_uncaught_exception_handler,
            argc: 1,
            policy: ThreadPolicy::Main,
            push_return: false,
            halt_after_return: false,
        },
        HostFunctionDef {
            name: "exit",
            fp: builtin_exit,
            argc: 1,
            policy: ThreadPolicy::Main,
            push_return: false,
            halt_after_return: false,
        },
    ];
    for def in defs {
        machine.register_host_function(def);
    }
}
