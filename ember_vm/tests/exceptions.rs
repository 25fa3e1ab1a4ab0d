//! Exception-model tests: unwinding depth, internal error objects,
//! the uncaught-exception handler.

mod common;

use common::{default_machine, finish_module, host, lines, run};
use ember_bytecode::{InstructionBlock, PutFunctionFlags};
use ember_core::Value;

#[test]
fn throw_unwinds_across_frames_to_an_outer_handler() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");
    let thrower_sym = machine.intern("thrower");

    let mut block = InstructionBlock::new(1);
    let skip = block.emit_branch(0);
    let body = block.here();
    block.emit_putstring(b"deep failure");
    block.emit_throw();
    block.patch_offset(skip, 1, block.here());

    let register = block.emit_registercatchtable(0);
    let put = block.emit_putfunction(thrower_sym, 0, PutFunctionFlags::empty(), 0, 0, 0);
    block.patch_offset(put, 9, body);
    block.emit_call(0);
    block.emit_pop();

    let handler = block.here();
    block.patch_offset(register, 1, handler);
    block.emit_setlocal(0, 0);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_readlocal(0, 0);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["deep failure"]);
    assert_eq!(machine.stack_size(), 0);
}

#[test]
fn calling_a_non_callable_raises_an_internal_error() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");
    let name_sym = machine.intern("name");

    // try { 5() } catch(e) { print(e.name) }
    let mut block = InstructionBlock::new(1);
    let register = block.emit_registercatchtable(0);
    block.emit_putvalue(Value::int(5));
    block.emit_call(0);

    let handler = block.here();
    block.patch_offset(register, 1, handler);
    block.emit_setlocal(0, 0);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_readlocal(0, 0);
    block.emit_readmembersymbol(name_sym);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["NotCallable"]);

    // The payload was an instance of the internal error class.
    let error_class = machine.internal_error_class();
    assert!(machine.heap().with(|heap| heap.class(error_class).is_some()));
}

#[test]
fn wrong_arity_raises_when_the_callee_demands_more() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");
    let strict_sym = machine.intern("strict");
    let name_sym = machine.intern("name");

    let mut block = InstructionBlock::new(1);
    let skip = block.emit_branch(0);
    let body = block.here();
    finish_module(&mut block);
    block.patch_offset(skip, 1, block.here());

    let register = block.emit_registercatchtable(0);
    // strict(x, y) called with a single argument.
    let put = block.emit_putfunction(strict_sym, 0, PutFunctionFlags::empty(), 2, 2, 2);
    block.patch_offset(put, 9, body);
    block.emit_putvalue(Value::int(1));
    block.emit_call(1);

    let handler = block.here();
    block.patch_offset(register, 1, handler);
    block.emit_setlocal(0, 0);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_readlocal(0, 0);
    block.emit_readmembersymbol(name_sym);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["WrongArity"]);
}

#[test]
fn missing_member_reads_yield_null_not_faults() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");
    let missing_sym = machine.intern("missing");

    let mut block = InstructionBlock::new(0);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_puthash(0);
    block.emit_readmembersymbol(missing_sym);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["null"]);
}

#[test]
fn uncaught_payload_goes_to_the_registered_handler() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let register_handler = host(&machine, "set_uncaught_exception_handler");
    let print_sym = machine.intern("print");
    let register_sym = machine.intern("set_uncaught_exception_handler");
    let handler_sym = machine.intern("handler");

    let mut block = InstructionBlock::new(0);
    let skip = block.emit_branch(0);
    let body = block.here();
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putstring(b"last chance:");
    block.emit_readlocal(0, 0);
    block.emit_call(2);
    block.emit_pop();
    finish_module(&mut block);
    block.patch_offset(skip, 1, block.here());

    block.emit_putcfunction(register_sym, register_handler, 1);
    let put = block.emit_putfunction(handler_sym, 0, PutFunctionFlags::empty(), 1, 1, 1);
    block.patch_offset(put, 9, body);
    block.emit_call(1);

    block.emit_putstring(b"boom");
    block.emit_throw();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["last chance: boom"]);
}

#[test]
fn uncaught_without_handler_terminates_the_fiber_with_error_status() {
    let (mut machine, buffer) = default_machine();

    let mut block = InstructionBlock::new(0);
    block.emit_putstring(b"nobody catches this");
    block.emit_throw();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 1);
    assert!(lines(&buffer).is_empty());
}

#[test]
fn exit_builtin_stops_the_runtime_with_its_status() {
    let (mut machine, buffer) = default_machine();
    let exit = host(&machine, "exit");
    let print = host(&machine, "print");
    let exit_sym = machine.intern("exit");
    let print_sym = machine.intern("print");

    let mut block = InstructionBlock::new(0);
    block.emit_putcfunction(exit_sym, exit, 1);
    block.emit_putvalue(Value::int(3));
    block.emit_call(1);
    // Unreachable once the runtime stops.
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putstring(b"not printed");
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 3);
    assert!(lines(&buffer).is_empty());
}
