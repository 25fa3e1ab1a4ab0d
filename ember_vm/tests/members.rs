//! Member and index access paths: computed keys, fixed array indices,
//! UTF-8 string indexing and the length member.

mod common;

use common::{default_machine, finish_module, host, lines, machine_with_capture, run};
use ember_bytecode::InstructionBlock;
use ember_core::Value;
use ember_vm::MachineConfig;

#[test]
fn array_and_string_indexing_via_computed_keys() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");

    let mut block = InstructionBlock::new(0);
    // print([10, 20, 30][1])
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putvalue(Value::int(10));
    block.emit_putvalue(Value::int(20));
    block.emit_putvalue(Value::int(30));
    block.emit_putarray(3);
    block.emit_putvalue(Value::int(1));
    block.emit_readmembervalue();
    block.emit_call(1);
    block.emit_pop();

    // print("aäz"[1]) - code-point indexing on the underlying bytes
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putstring("aäz".as_bytes());
    block.emit_putvalue(Value::int(1));
    block.emit_readmembervalue();
    block.emit_call(1);
    block.emit_pop();

    // print([1][5]) - out of range reads null, never faults
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putvalue(Value::int(1));
    block.emit_putarray(1);
    block.emit_putvalue(Value::int(5));
    block.emit_readmembervalue();
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["20", "ä", "null"]);
}

#[test]
fn fixed_array_index_opcodes_read_and_write() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");

    let mut block = InstructionBlock::new(1);
    block.emit_putvalue(Value::int(7));
    block.emit_putvalue(Value::int(8));
    block.emit_putarray(2);
    block.emit_setlocal(0, 0);

    // a[1] = 99; print(a[1])
    block.emit_readlocal(0, 0);
    block.emit_putvalue(Value::int(99));
    block.emit_setarrayindex(1);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_readlocal(0, 0);
    block.emit_readarrayindex(1);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["99"]);
}

#[test]
fn length_member_works_across_string_representations() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");
    let length_sym = machine.intern("length");

    let mut block = InstructionBlock::new(0);
    for text in [&b"ab"[..], b"sixsix", b"a string long enough for a heap cell"] {
        block.emit_putcfunction(print_sym, print, 8);
        block.emit_putstring(text);
        block.emit_readmembersymbol(length_sym);
        block.emit_call(1);
        block.emit_pop();
    }
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putvalue(Value::int(4));
    block.emit_putvalue(Value::int(5));
    block.emit_putarray(2);
    block.emit_readmembersymbol(length_sym);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["2", "6", "36", "2"]);
}

#[test]
fn hash_literal_members_are_readable_and_writable() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");
    let level_sym = machine.intern("level");

    let mut block = InstructionBlock::new(1);
    // let h = { level: 1 }
    block.emit_putvalue(level_sym);
    block.emit_putvalue(Value::int(1));
    block.emit_puthash(1);
    block.emit_setlocal(0, 0);

    // h.level = h.level + 41; print(h.level)
    block.emit_readlocal(0, 0);
    block.emit_readlocal(0, 0);
    block.emit_readmembersymbol(level_sym);
    block.emit_putvalue(Value::int(41));
    block.emit_op(ember_bytecode::Opcode::Add);
    block.emit_setmembersymbol(level_sym);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_readlocal(0, 0);
    block.emit_readmembersymbol(level_sym);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["42"]);
}

#[test]
fn forwarded_argv_is_visible_as_a_global() {
    let config = MachineConfig {
        argv: vec!["script.em".to_string(), "--fast".to_string()],
        ..Default::default()
    };
    let (mut machine, buffer) = machine_with_capture(config);
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");
    let argv_sym = machine.intern("ARGV");
    let length_sym = machine.intern("length");

    let mut block = InstructionBlock::new(0);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_readglobal(argv_sym);
    block.emit_readmembersymbol(length_sym);
    block.emit_call(1);
    block.emit_pop();
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_readglobal(argv_sym);
    block.emit_readarrayindex(1);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["2", "--fast"]);
}

#[test]
fn string_concatenation_through_the_add_operator() {
    let (mut machine, buffer) = default_machine();
    let print = host(&machine, "print");
    let print_sym = machine.intern("print");

    let mut block = InstructionBlock::new(0);
    block.emit_putcfunction(print_sym, print, 8);
    block.emit_putstring(b"value: ");
    block.emit_putvalue(Value::int(7));
    block.emit_op(ember_bytecode::Opcode::Add);
    block.emit_call(1);
    block.emit_pop();
    finish_module(&mut block);

    let status = run(&mut machine, &block);
    assert_eq!(status, 0);
    assert_eq!(lines(&buffer), vec!["value: 7"]);
}
