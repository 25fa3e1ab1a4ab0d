//! Scheduler-level behavior: timers, tickers, explicit fiber
//! suspension, and collection pressure under a small heap.

mod common;

use common::{default_machine, finish_module, host, lines, machine_with_capture, run};
use ember_bytecode::{InstructionBlock, Opcode, PutFunctionFlags};
use ember_core::Value;
use ember_gc::GcConfig;
use ember_vm::MachineConfig;

#[test]
fn timer_callback_fires_after_the_module_completes() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let set_timer = host(&machine, "set_timer");
    let print_sym = machine.intern("print");
    let set_timer_sym = machine.intern("set_timer");
    let cb_sym = machine.intern("cb");

    let mut block = InstructionBlock::new(0);
    let skip = block.emit_branch(0);
    let cb_body = block.here();
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putstring(b"fired");
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);
    block.patch_offset(skip, 1, block.here());

    block.emit_putcfunction(set_timer_sym, set_timer, 6);
    block.emit_putvalue(Value::int(10));
    let put = block.emit_putfunction(cb_sym, 0, PutFunctionFlags::empty(), 0, 0, 0);
    block.patch_offset(put, 9, cb_body);
    block.emit_call(2);
    block.emit_pop();

    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putstring(b"scheduled");
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["scheduled", "fired"]);
}

#[test]
fn cleared_timer_never_fires() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let set_timer = host(&machine, "set_timer");
    let clear_timer = host(&machine, "clear_timer");
    let print_sym = machine.intern("print");
    let set_timer_sym = machine.intern("set_timer");
    let clear_timer_sym = machine.intern("clear_timer");
    let cb_sym = machine.intern("cb");

    let mut block = InstructionBlock::new(0);
    let skip = block.emit_branch(0);
    let cb_body = block.here();
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putstring(b"should not fire");
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);
    block.patch_offset(skip, 1, block.here());

    // clear_timer(set_timer(10, cb))
    block.emit_putcfunction(clear_timer_sym, clear_timer, 1);
    block.emit_putcfunction(set_timer_sym, set_timer, 6);
    block.emit_putvalue(Value::int(10));
    let put = block.emit_putfunction(cb_sym, 0, PutFunctionFlags::empty(), 0, 0, 0);
    block.patch_offset(put, 9, cb_body);
    block.emit_call(2);
    block.emit_call(1);
    block.emit_pop();

    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putstring(b"done");
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["done"]);
}

#[test]
fn ticker_rearms_until_cleared_from_its_callback() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let set_ticker = host(&machine, "set_ticker");
    let clear_ticker = host(&machine, "clear_ticker");
    let print_sym = machine.intern("print");
    let set_ticker_sym = machine.intern("set_ticker");
    let clear_ticker_sym = machine.intern("clear_ticker");
    let cb_sym = machine.intern("tick");
    let count_sym = machine.intern("count");
    let tid_sym = machine.intern("tid");

    let mut block = InstructionBlock::new(0);
    let skip = block.emit_branch(0);

    // tick() { count = count + 1; print(count); if count >= 3 { clear_ticker(tid) } }
    let cb_body = block.here();
    block.emit_readglobal(count_sym);
    block.emit_putvalue(Value::int(1));
    block.emit_op(Opcode::Add);
    block.emit_setglobal(count_sym);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_readglobal(count_sym);
    block.emit_call(1);
    block.emit_pop();
    block.emit_readglobal(count_sym);
    block.emit_putvalue(Value::int(3));
    let keep_going = block.emit_branch_op(Opcode::BranchLt, 0);
    block.emit_putcfunction(clear_ticker_sym, clear_ticker, 1);
    block.emit_readglobal(tid_sym);
    block.emit_call(1);
    block.emit_pop();
    let cb_end = block.here();
    block.patch_offset(keep_going, 1, cb_end);
    finish_module(&mut block);
    block.patch_offset(skip, 1, block.here());

    block.emit_putvalue(Value::int(0));
    block.emit_setglobal(count_sym);
    block.emit_putcfunction(set_ticker_sym, set_ticker, 6);
    block.emit_putvalue(Value::int(5));
    let put = block.emit_putfunction(cb_sym, 0, PutFunctionFlags::empty(), 0, 0, 0);
    block.patch_offset(put, 9, cb_body);
    block.emit_call(2);
    block.emit_setglobal(tid_sym);
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["1", "2", "3"]);
}

#[test]
fn suspended_fiber_resumes_with_the_passed_value() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let spawn = host(&machine, "spawn");
    let suspend = host(&machine, "suspend_thread");
    let resume = host(&machine, "resume_thread");
    let get_uid = host(&machine, "get_thread_uid");
    let set_timer = host(&machine, "set_timer");
    let print_sym = machine.intern("print");
    let spawn_sym = machine.intern("spawn");
    let suspend_sym = machine.intern("suspend_thread");
    let resume_sym = machine.intern("resume_thread");
    let get_uid_sym = machine.intern("get_thread_uid");
    let set_timer_sym = machine.intern("set_timer");
    let sleeper_sym = machine.intern("sleeper");
    let waker_sym = machine.intern("waker");
    let uid_sym = machine.intern("uid");

    let mut block = InstructionBlock::new(1);
    let skip = block.emit_branch(0);

    // sleeper() { uid = get_thread_uid(); print(suspend_thread()) }
    let sleeper_body = block.here();
    block.emit_putcfunction(get_uid_sym, get_uid, 0);
    block.emit_call(0);
    block.emit_setglobal(uid_sym);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putcfunction(suspend_sym, suspend, 0);
    block.emit_call(0);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    // waker() { resume_thread(uid, 99) }
    let waker_body = block.here();
    block.emit_putcfunction(resume_sym, resume, 2);
    block.emit_readglobal(uid_sym);
    block.emit_putvalue(Value::int(99));
    block.emit_call(2);
    block.emit_pop();
    finish_module(&mut block);
    block.patch_offset(skip, 1, block.here());

    // spawn(sleeper); set_timer(20, waker)
    block.emit_putcfunction(spawn_sym, spawn, 4);
    let sleeper_put = block.emit_putfunction(sleeper_sym, 0, PutFunctionFlags::empty(), 0, 0, 0);
    block.patch_offset(sleeper_put, 9, sleeper_body);
    block.emit_call(1);
    block.emit_pop();

    block.emit_putcfunction(set_timer_sym, set_timer, 6);
    block.emit_putvalue(Value::int(20));
    let waker_put = block.emit_putfunction(waker_sym, 0, PutFunctionFlags::empty(), 0, 0, 0);
    block.patch_offset(waker_put, 9, waker_body);
    block.emit_call(2);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["99"]);
}

#[test]
fn collection_runs_under_allocation_pressure_without_breaking_programs() {
    let config = MachineConfig {
        timeslice: 64,
        gc: GcConfig::low_memory(),
        ..Default::default()
    };
    let (mut machine, buffer) = machine_with_capture(config);
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");

    // Allocate two thousand heap strings in a loop, keeping none.
    let mut block = InstructionBlock::new(1);
    block.emit_putvalue(Value::int(0));
    block.emit_setlocal(0, 0);
    let loop_start = block.here();
    block.emit_putstring(b"a heap-resident string constant, well past immediates");
    block.emit_pop();
    block.emit_readlocal(0, 0);
    block.emit_putvalue(Value::int(1));
    block.emit_op(Opcode::Add);
    block.emit_setlocalpush(0, 0);
    block.emit_putvalue(Value::int(2000));
    let back = block.emit_branch_op(Opcode::BranchLt, 0);
    block.patch_offset(back, 1, loop_start);

    block.emit_putcfunction(print_sym, print, 8);
    block.emit_readlocal(0, 0);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["2000"]);
    assert!(machine.stats().gc_cycles >= 1, "collector never ran");
}
