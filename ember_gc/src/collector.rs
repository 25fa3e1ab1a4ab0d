//! Precise mark-and-sweep collection.
//!
//! Marking starts from a caller-provided root set plus the persistent
//! temporaries, follows each type's contained references with an
//! explicit worklist, and flips header mark bits. Sweeping visits every
//! cell of every arena: marked cells are unmarked, unmarked live cells
//! are finalized (payload drop releases long-string buffers and
//! containers, cpointer destructors run) and rethreaded onto the free
//! list.

use crate::cell::CellData;
use crate::heap::Heap;
use ember_core::Value;
use smallvec::SmallVec;
use std::time::Instant;

impl Heap {
    /// Run a full collection cycle over the given roots.
    pub fn collect(&mut self, roots: &[Value]) {
        let started = Instant::now();

        self.mark_phase(roots);
        let freed = self.sweep_phase();

        let nanos = started.elapsed().as_nanos() as u64;
        self.stats.record_collection(freed, nanos);
        if self.config().trace {
            eprintln!(
                "#-- GC: freed {} cells in {} ns ({} free / {} total) --#",
                freed,
                nanos,
                self.free_count(),
                self.capacity()
            );
        }
    }

    fn mark_phase(&mut self, roots: &[Value]) {
        let mut worklist: Vec<u64> = roots.iter().filter_map(|v| v.as_heap_index()).collect();
        worklist.extend(self.persistent.keys().copied());

        while let Some(index) = worklist.pop() {
            {
                let cell = self.cell_mut(index);
                if cell.header.marked() || matches!(cell.data, CellData::Free { .. }) {
                    continue;
                }
                cell.header.set_marked(true);
            }

            let mut children: SmallVec<[Value; 8]> = SmallVec::new();
            match &self.cell(index).data {
                CellData::Free { .. } | CellData::Str(_) | CellData::CPointer(_) => {}

                CellData::Object(object) => {
                    children.push(object.class);
                    children.extend(object.container.values().copied());
                }

                CellData::Array(array) => {
                    children.extend(array.elements.iter().copied());
                }

                CellData::Class(class) => {
                    children.push(class.constructor);
                    children.push(class.prototype);
                    children.push(class.parent_class);
                    children.extend(class.container.values().copied());
                }

                CellData::Function(function) => {
                    children.push(function.context);
                    children.push(function.host_class);
                    if function.bound_self_set {
                        children.push(function.bound_self);
                    }
                    children.extend(function.container.values().copied());
                }

                CellData::CFunction(cfunction) => {
                    children.extend(cfunction.container.values().copied());
                }

                CellData::Generator(generator) => {
                    // A finished generator keeps nothing alive besides
                    // its attached properties.
                    if !generator.finished {
                        children.push(generator.frame);
                        children.push(generator.catchtable);
                        children.push(generator.boot_function);
                        if generator.bound_self_set {
                            children.push(generator.bound_self);
                        }
                        children.extend(generator.stack.iter().copied());
                    }
                    children.extend(generator.container.values().copied());
                }

                CellData::Frame(frame) => {
                    children.push(frame.parent);
                    children.push(frame.lexical_parent);
                    children.push(frame.catchtable);
                    children.push(frame.caller);
                    children.push(frame.self_value);
                    children.push(frame.generator);
                    children.extend(frame.locals.iter().copied());
                }

                CellData::CatchTable(table) => {
                    children.push(table.frame);
                    children.push(table.parent);
                }
            }

            worklist.extend(children.iter().filter_map(|v| v.as_heap_index()));
        }
    }

    fn sweep_phase(&mut self) -> u64 {
        let per = self.cells_per_arena();
        let mut freed = 0u64;
        for arena in 0..self.arena_count() {
            for slot in 0..per {
                let index = (arena * per + slot) as u64;
                if self.cell(index).header.marked() {
                    self.cell_mut(index).header.set_marked(false);
                } else if !matches!(self.cell(index).data, CellData::Free { .. }) {
                    self.push_free(index);
                    freed += 1;
                }
            }
        }
        freed
    }
}
