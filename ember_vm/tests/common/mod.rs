//! Shared helpers for the runtime integration tests.
//!
//! Tests assemble instruction blocks through the writer API (the same
//! interface a compiler would use), run them on a machine with a
//! captured output sink, and assert on printed lines and machine state.

// Each test binary compiles this module separately and uses a subset.
#![allow(dead_code)]

use ember_bytecode::InstructionBlock;
use ember_vm::{Machine, MachineConfig, OutputSink};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A machine wired to an inspectable output buffer.
pub fn machine_with_capture(config: MachineConfig) -> (Machine, Arc<Mutex<Vec<u8>>>) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let writer: Box<dyn Write + Send> = Box::new(SharedWriter(Arc::clone(&buffer)));
    let sink: OutputSink = Arc::new(Mutex::new(writer));
    let mut machine = Machine::new(config);
    machine.set_output(sink);
    (machine, buffer)
}

/// Default-config machine with capture.
pub fn default_machine() -> (Machine, Arc<Mutex<Vec<u8>>>) {
    machine_with_capture(MachineConfig::default())
}

/// Registry index of a builtin, for `PutCFunction` operands.
pub fn host(machine: &Machine, name: &str) -> u32 {
    machine
        .host_function_index(name)
        .unwrap_or_else(|| panic!("builtin {name} not installed"))
}

/// Terminate a module body: push null and return to the scheduler.
pub fn finish_module(block: &mut InstructionBlock) {
    block.emit_putvalue(ember_core::Value::NULL);
    block.emit_return();
}

/// Register the block and run the scheduler to completion.
pub fn run(machine: &mut Machine, block: &InstructionBlock) -> u8 {
    machine.register_module(block).expect("module registration");
    machine.start_runtime()
}

/// The captured output, split into lines.
pub fn lines(buffer: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
    String::from_utf8(buffer.lock().clone())
        .expect("output is utf-8")
        .lines()
        .map(str::to_string)
        .collect()
}
