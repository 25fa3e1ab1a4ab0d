//! Local and global load/store handlers.

use crate::machine::Machine;
use ember_core::{RuntimeErrorKind, Value};

impl Machine {
    pub(crate) fn op_readlocal(&mut self) {
        let index = self.operand_u32(1);
        let level = self.operand_u32(5);
        let value = self.read_local(index, level);
        self.push_stack(value);
    }

    pub(crate) fn op_setlocal(&mut self, push: bool) {
        let index = self.operand_u32(1);
        let level = self.operand_u32(5);
        let value = self.pop_stack();
        self.write_local(index, level, value);
        if push {
            self.push_stack(value);
        }
    }

    pub(crate) fn op_readglobal(&mut self) {
        let symbol = Value::from_bits(self.operand_u64(1));
        let value = self
            .heap
            .with(|heap| heap.object(self.globals)?.container.get(&symbol).copied());
        match value {
            Some(value) => self.push_stack(value),
            None => {
                let name = self.symbols.describe(symbol);
                self.throw_internal(
                    RuntimeErrorKind::UnknownSymbol,
                    &format!("no global named {name}"),
                );
            }
        }
    }

    pub(crate) fn op_setglobal(&mut self, push: bool) {
        let symbol = Value::from_bits(self.operand_u64(1));
        let value = self.pop_stack();
        self.heap.with(|heap| {
            if let Some(globals) = heap.object_mut(self.globals) {
                globals.container.insert(symbol, value);
            }
        });
        if push {
            self.push_stack(value);
        }
    }
}
