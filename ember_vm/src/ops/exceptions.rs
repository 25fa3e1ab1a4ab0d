//! Throwing and unwinding.
//!
//! A throw pops catch tables until it finds one whose owning frame is
//! the current frame or a dynamic ancestor, pops frames down to that
//! owner, restores the recorded operand stack size, pushes the payload
//! and jumps to the handler. Without a handler the payload goes to the
//! registered uncaught-exception handler; if that throws too, the fiber
//! terminates with an error status.

use crate::machine::Machine;
use ember_core::{RuntimeErrorKind, Value};

impl Machine {
    pub(crate) fn op_throw(&mut self) {
        let payload = self.pop_stack();
        self.throw_value(payload);
    }

    pub(crate) fn op_registercatchtable(&mut self) {
        let offset = self.operand_i32(1);
        let address = (self.ip as i64 + offset as i64) as usize;
        self.push_catchtable(address);
    }

    pub(crate) fn op_popcatchtable(&mut self) {
        self.pop_catchtable();
    }

    /// Unwind to the nearest applicable handler.
    pub(crate) fn throw_value(&mut self, payload: Value) {
        self.stats.throws += 1;

        // Find the innermost table owned by a frame on the dynamic chain.
        let mut table = self.catchstack;
        let found = loop {
            if table == Value::NULL {
                break None;
            }
            let (owner, parent) = match self
                .heap
                .with(|heap| heap.catchtable(table).map(|t| (t.frame, t.parent)))
            {
                Some(fields) => fields,
                None => self.fatal("catch-table chain contains a non-table cell"),
            };
            if self.frame_in_dynamic_chain(owner) {
                break Some(table);
            }
            table = parent;
        };

        let table = match found {
            Some(table) => table,
            None => return self.uncaught_exception(payload),
        };

        let (address, stacksize, owner, parent) = self
            .heap
            .with(|heap| {
                heap.catchtable(table)
                    .map(|t| (t.address, t.stacksize, t.frame, t.parent))
            })
            .expect("table verified above");

        // Pop frames until the owner is current.
        while self.frame != owner {
            let frame_parent = match self.heap.with(|heap| heap.frame(self.frame).map(|f| f.parent))
            {
                Some(parent) => parent,
                None => self.fatal("unwinding walked off the frame chain"),
            };
            self.frame = frame_parent;
            self.frame_depth -= 1;
        }

        self.catchstack = parent;
        self.stack.truncate(stacksize);
        self.push_stack(payload);
        self.ip = address;
    }

    fn frame_in_dynamic_chain(&self, target: Value) -> bool {
        let mut frame = self.frame;
        loop {
            if frame == target {
                return true;
            }
            if frame == Value::NULL {
                return false;
            }
            frame = match self.heap.with(|heap| heap.frame(frame).map(|f| f.parent)) {
                Some(parent) => parent,
                None => return false,
            };
        }
    }

    /// Raise an internal runtime error: an instance of the well-known
    /// error class, recoverable by the same catch mechanism.
    pub(crate) fn throw_internal(&mut self, kind: RuntimeErrorKind, message: &str) {
        let class = self.internal_error_class;
        let name_symbol = self.well_known.name;
        let message_symbol = self.well_known.message;
        let error = self.heap.with(|heap| {
            let error = heap.create_object(class);
            let name_value = heap.create_string(kind.name().as_bytes());
            let message_value = heap.create_string(message.as_bytes());
            let container = &mut heap.object_mut(error).expect("just created").container;
            container.insert(name_symbol, name_value);
            container.insert(message_symbol, message_value);
            error
        });
        self.throw_value(error);
    }

    /// No handler matched: hand the payload to the registered
    /// uncaught-exception handler on a clean frame chain.
    fn uncaught_exception(&mut self, payload: Value) {
        let handler = self.uncaught_exception_handler;

        if self.in_uncaught_handler || handler == Value::NULL {
            let rendered = self.render(payload);
            if self.in_uncaught_handler {
                eprintln!("ember: exception thrown inside the uncaught-exception handler");
            }
            eprintln!("ember: uncaught exception: {rendered}");
            self.status_code = 1;
            self.stack.clear();
            self.frame = Value::NULL;
            self.catchstack = Value::NULL;
            self.frame_depth = 0;
            self.halted = true;
            return;
        }

        self.in_uncaught_handler = true;
        self.stack.clear();
        self.frame = Value::NULL;
        self.catchstack = Value::NULL;
        self.frame_depth = 0;
        self.call_function(handler, &[payload], None, 0, true, false, Value::NULL);
        if self.frame == Value::NULL {
            // The handler could not be entered; terminate the fiber.
            self.status_code = 1;
            self.halted = true;
        }
    }
}
