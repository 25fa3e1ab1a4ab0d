//! Constant and literal handlers.

use crate::machine::Machine;
use ember_bytecode::PutFunctionFlags;
use ember_core::{RuntimeErrorKind, Value};
use ember_gc::{FunctionFlags, HeapTag};

impl Machine {
    pub(crate) fn op_putvalue(&mut self) {
        let value = Value::from_bits(self.operand_u64(1));
        self.push_stack(value);
    }

    pub(crate) fn op_putstring(&mut self) {
        let offset = self.operand_u32(1);
        let length = self.operand_u32(5);
        let bytes = self.module_data(offset, length).to_vec();
        let value = self.heap.with(|heap| heap.create_string(&bytes));
        self.push_stack(value);
    }

    pub(crate) fn op_putfunction(&mut self) {
        let name = Value::from_bits(self.operand_u64(1));
        let body_offset = self.operand_i32(9);
        let raw_flags = PutFunctionFlags::from_bits_truncate(self.operand_u8(13));
        let argc = self.operand_u32(14);
        let minimum_argc = self.operand_u32(18);
        let lvarcount = self.operand_u32(22);

        let body_address = (self.ip as i64 + body_offset as i64) as usize;
        let mut flags = FunctionFlags::empty();
        if raw_flags.contains(PutFunctionFlags::ANONYMOUS) {
            flags |= FunctionFlags::ANONYMOUS;
        }
        if raw_flags.contains(PutFunctionFlags::NEEDS_ARGUMENTS) {
            flags |= FunctionFlags::NEEDS_ARGUMENTS;
        }

        let context = self.frame;
        let function = self.heap.with(|heap| {
            let function =
                heap.create_function(name, body_address, argc, minimum_argc, lvarcount, flags);
            heap.function_mut(function).expect("just created").context = context;
            function
        });
        self.push_stack(function);
    }

    pub(crate) fn op_putcfunction(&mut self) {
        let name = Value::from_bits(self.operand_u64(1));
        let host_index = self.operand_u32(9);
        let argc = self.operand_u32(13);

        let def = match self.host_function(host_index) {
            Ok(def) => def,
            Err(_) => {
                self.throw_internal(
                    RuntimeErrorKind::InvalidArgument,
                    &format!("no host function registered at index {host_index}"),
                );
                return;
            }
        };

        let cfunction = self.heap.with(|heap| {
            let cfunction = heap.create_cfunction(name, host_index, argc, def.policy);
            let data = heap.cfunction_mut(cfunction).expect("just created");
            data.push_return = def.push_return;
            data.halt_after_return = def.halt_after_return;
            cfunction
        });
        self.push_stack(cfunction);
    }

    pub(crate) fn op_putgenerator(&mut self) {
        let name = Value::from_bits(self.operand_u64(1));
        let resume_offset = self.operand_i32(9);
        let resume_address = (self.ip as i64 + resume_offset as i64) as usize;

        let boot = self.pop_stack();
        if self.heap.with(|heap| heap.tag_of(boot)) != Some(HeapTag::Function) {
            self.throw_internal(
                RuntimeErrorKind::InvalidArgument,
                "generator literal expects a boot function",
            );
            return;
        }

        let generator = self
            .heap
            .with(|heap| heap.create_generator(name, resume_address, boot));
        self.push_stack(generator);
    }

    pub(crate) fn op_putarray(&mut self) {
        let count = self.operand_u32(1) as usize;
        if self.stack.len() < count {
            self.fatal("operand stack underflow in PutArray");
        }
        let start = self.stack.len() - count;
        let elements = self.stack.split_off(start);
        let array = self.heap.with(|heap| heap.create_array(elements));
        self.push_stack(array);
    }

    pub(crate) fn op_puthash(&mut self) {
        let count = self.operand_u32(1) as usize;
        let mut pairs = Vec::with_capacity(count);
        for _ in 0..count {
            let value = self.pop_stack();
            let key = self.pop_stack();
            pairs.push((key, value));
        }
        let object = self.heap.with(|heap| {
            let object = heap.create_object(Value::NULL);
            let container = &mut heap.object_mut(object).expect("just created").container;
            for (key, value) in pairs.into_iter().rev() {
                container.insert(key, value);
            }
            object
        });
        self.push_stack(object);
    }

    pub(crate) fn op_putself(&mut self) {
        let receiver = self.current_self();
        self.push_stack(receiver);
    }
}
