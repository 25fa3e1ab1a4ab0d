//! Frames, local variables and the catch-table chain.
//!
//! A frame's lexical-parent pointer drives variable lookup; the dynamic
//! parent drives return and unwinding. Catch tables are owned by the
//! frame that registered them: popping a frame pops the tables that
//! point to it.

use crate::machine::Machine;
use ember_core::Value;
use ember_gc::CatchTable;

impl Machine {
    /// The current frame's receiver, or null outside any frame.
    pub(crate) fn current_self(&self) -> Value {
        self.heap
            .with(|heap| heap.frame(self.frame).map(|f| f.self_value))
            .unwrap_or(Value::NULL)
    }

    /// The function value executing in the current frame.
    pub(crate) fn current_function(&self) -> Value {
        self.heap
            .with(|heap| heap.frame(self.frame).map(|f| f.caller))
            .unwrap_or(Value::NULL)
    }

    /// Walk `level` lexical parents from the current frame.
    fn frame_at_level(&self, level: u32) -> Value {
        let mut frame = self.frame;
        for _ in 0..level {
            frame = match self.heap.with(|heap| heap.frame(frame).map(|f| f.lexical_parent)) {
                Some(parent) => parent,
                None => self.fatal("lexical level overflows the environment chain"),
            };
            if frame == Value::NULL {
                self.fatal("lexical level overflows the environment chain");
            }
        }
        frame
    }

    /// Read local `index` at lexical `level`.
    pub(crate) fn read_local(&self, index: u32, level: u32) -> Value {
        let frame = self.frame_at_level(level);
        match self
            .heap
            .with(|heap| heap.frame(frame).and_then(|f| f.locals.get(index as usize).copied()))
        {
            Some(value) => value,
            None => self.fatal("local slot index out of range"),
        }
    }

    /// Write local `index` at lexical `level`.
    pub(crate) fn write_local(&mut self, index: u32, level: u32, value: Value) {
        let frame = self.frame_at_level(level);
        let wrote = self.heap.with(|heap| {
            heap.frame_mut(frame)
                .and_then(|f| f.locals.get_mut(index as usize))
                .map(|slot| *slot = value)
                .is_some()
        });
        if !wrote {
            self.fatal("local slot index out of range");
        }
    }

    // =========================================================================
    // Catch tables
    // =========================================================================

    /// Register a handler at `address`, capturing the current operand
    /// stack size and owning frame.
    pub(crate) fn push_catchtable(&mut self, address: usize) {
        let table = CatchTable {
            address,
            stacksize: self.stack.len(),
            frame: self.frame,
            parent: self.catchstack,
        };
        let table_ref = self.heap.with(|heap| heap.create_catchtable(table));
        self.catchstack = table_ref;
        if self.config.trace_catchtables {
            eprintln!("[vm] push catchtable -> {:#x}", address);
        }
    }

    /// Drop the innermost handler. An empty chain is a broken compiler
    /// invariant.
    pub(crate) fn pop_catchtable(&mut self) {
        match self
            .heap
            .with(|heap| heap.catchtable(self.catchstack).map(|t| t.parent))
        {
            Some(parent) => {
                self.catchstack = parent;
                if self.config.trace_catchtables {
                    eprintln!("[vm] pop catchtable");
                }
            }
            None => self.fatal("unbalanced catch-table stack"),
        }
    }

    /// Pop every catch table owned by `frame` (frame teardown).
    pub(crate) fn pop_catchtables_for(&mut self, frame: Value) {
        loop {
            let owner = self
                .heap
                .with(|heap| heap.catchtable(self.catchstack).map(|t| (t.frame, t.parent)));
            match owner {
                Some((table_frame, parent)) if table_frame == frame => {
                    self.catchstack = parent;
                }
                _ => break,
            }
        }
    }
}
