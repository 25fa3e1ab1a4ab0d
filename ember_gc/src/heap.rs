//! The arena cell allocator.
//!
//! The heap is a growing list of fixed-size arenas of uniform cells.
//! Dead cells thread an intrusive free list; allocation pops its head
//! and never collects — when the list runs dry the arena list grows by
//! the configured factor, and the interpreter performs collections at
//! safepoints whenever the free count sits below the low-water mark.

use crate::cell::{
    Array, CFunction, CatchTable, Cell, CellData, Class, CPointer, CPointerDestructor, Frame,
    Function, FunctionFlags, Generator, HeapString, HeapTag, Header, Object, ThreadPolicy,
};
use crate::config::GcConfig;
use crate::stats::GcStats;
use ember_core::Value;
use rustc_hash::FxHashMap;
use std::ffi::c_void;

/// The cell heap.
pub struct Heap {
    config: GcConfig,
    arenas: Vec<Box<[Cell]>>,
    free_head: Option<u64>,
    free_count: usize,
    /// Persistent temporaries: cell index -> registration count.
    pub(crate) persistent: FxHashMap<u64, u32>,
    pub(crate) stats: GcStats,
}

impl Heap {
    /// Create a heap with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics when the configuration fails validation.
    pub fn new(config: GcConfig) -> Heap {
        config.validate().expect("invalid GC configuration");
        let mut heap = Heap {
            config,
            arenas: Vec::new(),
            free_head: None,
            free_count: 0,
            persistent: FxHashMap::default(),
            stats: GcStats::default(),
        };
        for _ in 0..heap.config.initial_arenas {
            heap.add_arena();
        }
        heap
    }

    /// Create a heap with default configuration.
    pub fn with_defaults() -> Heap {
        Heap::new(GcConfig::default())
    }

    // =========================================================================
    // Arenas and the free list
    // =========================================================================

    /// Append one arena and thread its cells onto the free list.
    fn add_arena(&mut self) {
        let base = (self.arenas.len() * self.config.arena_cell_count) as u64;
        let mut next = self.free_head;
        let cells: Vec<Cell> = (0..self.config.arena_cell_count)
            .map(|i| {
                let cell = Cell::free(next);
                next = Some(base + i as u64);
                cell
            })
            .collect();
        self.free_head = next;
        self.free_count += self.config.arena_cell_count;
        self.arenas.push(cells.into_boxed_slice());
    }

    /// Grow the arena list by the configured factor.
    pub(crate) fn grow(&mut self) {
        let current = self.arenas.len();
        let target = ((current as f64 * self.config.growth_factor) as usize).max(current + 1);
        let added = target - current;
        for _ in 0..added {
            self.add_arena();
        }
        self.stats.record_growth(added as u64);
    }

    #[inline]
    fn slot(&self, index: u64) -> (usize, usize) {
        let per = self.config.arena_cell_count;
        (index as usize / per, index as usize % per)
    }

    /// The cell at `index`. An out-of-range index is a broken runtime
    /// invariant and aborts.
    #[inline]
    pub fn cell(&self, index: u64) -> &Cell {
        let (arena, slot) = self.slot(index);
        &self.arenas[arena][slot]
    }

    /// Mutable access to the cell at `index`.
    #[inline]
    pub fn cell_mut(&mut self, index: u64) -> &mut Cell {
        let (arena, slot) = self.slot(index);
        &mut self.arenas[arena][slot]
    }

    pub(crate) fn arena_count(&self) -> usize {
        self.arenas.len()
    }

    pub(crate) fn cells_per_arena(&self) -> usize {
        self.config.arena_cell_count
    }

    pub(crate) fn push_free(&mut self, index: u64) {
        let head = self.free_head;
        *self.cell_mut(index) = Cell::free(head);
        self.free_head = Some(index);
        self.free_count += 1;
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate a cell for `data` and return its heap reference.
    pub fn allocate(&mut self, data: CellData) -> Value {
        let index = match self.free_head {
            Some(index) => index,
            None => {
                self.grow();
                self.free_head.expect("heap growth yielded no free cells")
            }
        };
        let next = match self.cell(index).data {
            CellData::Free { next } => next,
            _ => unreachable!("free list head points at a live cell"),
        };
        self.free_head = next;
        self.free_count -= 1;

        let mut header = Header::new(data.tag());
        if let CellData::Str(ref s) = data {
            header.set_flag_a(s.is_short());
        }
        *self.cell_mut(index) = Cell { header, data };
        self.stats.record_allocation();
        Value::heap_ref(index)
    }

    /// Whether the free list sits at or below the low-water mark.
    #[inline]
    pub fn should_collect(&self) -> bool {
        self.free_count <= self.config.min_free_cells
    }

    /// Free cells currently available.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Total cell capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arenas.len() * self.config.arena_cell_count
    }

    /// Collector statistics.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// The active configuration.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    // =========================================================================
    // Typed access
    // =========================================================================

    /// The payload behind a heap reference; `None` for non-references
    /// and dead cells.
    pub fn get(&self, value: Value) -> Option<&CellData> {
        let index = value.as_heap_index()?;
        match &self.cell(index).data {
            CellData::Free { .. } => None,
            data => Some(data),
        }
    }

    /// Mutable payload access.
    pub fn get_mut(&mut self, value: Value) -> Option<&mut CellData> {
        let index = value.as_heap_index()?;
        match &mut self.cell_mut(index).data {
            CellData::Free { .. } => None,
            data => Some(data),
        }
    }

    /// The heap tag of a reference, if it points at a live cell.
    pub fn tag_of(&self, value: Value) -> Option<HeapTag> {
        let index = value.as_heap_index()?;
        match self.cell(index).header.tag() {
            HeapTag::Dead => None,
            tag => Some(tag),
        }
    }

    /// Type name used by `typeof`: heap tag names for references,
    /// immediate names otherwise.
    pub fn type_name(&self, value: Value) -> &'static str {
        match self.tag_of(value) {
            Some(tag) => tag.name(),
            None if value.is_heap_ref() => "dead",
            None => value.immediate_type_name(),
        }
    }
}

macro_rules! typed_accessors {
    ($(($ref_name:ident, $mut_name:ident, $variant:ident, $ty:ty)),* $(,)?) => {
        impl Heap {
            $(
                /// Borrow the payload when the reference has the expected type.
                pub fn $ref_name(&self, value: Value) -> Option<&$ty> {
                    match self.get(value)? {
                        CellData::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                /// Mutably borrow the payload when the reference has the
                /// expected type.
                pub fn $mut_name(&mut self, value: Value) -> Option<&mut $ty> {
                    match self.get_mut(value)? {
                        CellData::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            )*
        }
    };
}

typed_accessors!(
    (object, object_mut, Object, Object),
    (array, array_mut, Array, Array),
    (string, string_mut, Str, HeapString),
    (class, class_mut, Class, Class),
    (function, function_mut, Function, Function),
    (cfunction, cfunction_mut, CFunction, CFunction),
    (generator, generator_mut, Generator, Generator),
    (frame, frame_mut, Frame, Frame),
    (catchtable, catchtable_mut, CatchTable, CatchTable),
    (cpointer, cpointer_mut, CPointer, CPointer),
);

impl Heap {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Allocate an object of `class` with an empty container.
    pub fn create_object(&mut self, class: Value) -> Value {
        self.allocate(CellData::Object(Object {
            class,
            container: FxHashMap::default(),
        }))
    }

    /// Allocate an array from its elements.
    pub fn create_array(&mut self, elements: Vec<Value>) -> Value {
        self.allocate(CellData::Array(Array { elements }))
    }

    /// Allocate a heap string (no immediate-representation attempt).
    pub fn create_heap_string(&mut self, bytes: &[u8]) -> Value {
        self.allocate(CellData::Str(HeapString::from_bytes(bytes)))
    }

    /// Encode a string in the tightest representation: immediate when it
    /// fits in six bytes, heap cell otherwise.
    pub fn create_string(&mut self, bytes: &[u8]) -> Value {
        match Value::immediate_string(bytes) {
            Some(v) => v,
            None => self.create_heap_string(bytes),
        }
    }

    /// Allocate an empty class.
    pub fn create_class(&mut self, name: Value) -> Value {
        self.allocate(CellData::Class(Class {
            name,
            constructor: Value::NULL,
            member_properties: Default::default(),
            prototype: Value::NULL,
            parent_class: Value::NULL,
            container: FxHashMap::default(),
        }))
    }

    /// Allocate an interpreted function.
    #[allow(clippy::too_many_arguments)]
    pub fn create_function(
        &mut self,
        name: Value,
        body_address: usize,
        argc: u32,
        minimum_argc: u32,
        lvarcount: u32,
        flags: FunctionFlags,
    ) -> Value {
        self.allocate(CellData::Function(Function {
            name,
            argc,
            minimum_argc,
            lvarcount,
            body_address,
            context: Value::NULL,
            bound_self: Value::NULL,
            bound_self_set: false,
            host_class: Value::NULL,
            flags,
            container: FxHashMap::default(),
        }))
    }

    /// Allocate a host function descriptor.
    pub fn create_cfunction(
        &mut self,
        name: Value,
        host_index: u32,
        argc: u32,
        policy: ThreadPolicy,
    ) -> Value {
        self.allocate(CellData::CFunction(CFunction {
            name,
            host_index,
            argc,
            policy,
            push_return: true,
            halt_after_return: false,
            container: FxHashMap::default(),
        }))
    }

    /// Allocate a generator wrapping `boot_function`.
    pub fn create_generator(
        &mut self,
        name: Value,
        resume_address: usize,
        boot_function: Value,
    ) -> Value {
        self.allocate(CellData::Generator(Generator {
            name,
            frame: Value::NULL,
            catchtable: Value::NULL,
            stack: Vec::new(),
            resume_address,
            boot_function,
            bound_self: Value::NULL,
            bound_self_set: false,
            started: false,
            running: false,
            finished: false,
            container: FxHashMap::default(),
        }))
    }

    /// Allocate a frame.
    pub fn create_frame(&mut self, frame: Frame) -> Value {
        self.allocate(CellData::Frame(frame))
    }

    /// Allocate a catch table.
    pub fn create_catchtable(&mut self, table: CatchTable) -> Value {
        self.allocate(CellData::CatchTable(table))
    }

    /// Allocate a cpointer wrapping a host resource.
    pub fn create_cpointer(
        &mut self,
        data: *mut c_void,
        destructor: Option<CPointerDestructor>,
    ) -> Value {
        self.allocate(CellData::CPointer(CPointer { data, destructor }))
    }

    // =========================================================================
    // Value-level helpers
    // =========================================================================

    /// Bytes of any string representation (immediate, packed or heap).
    pub fn string_bytes(&self, value: Value) -> Option<Vec<u8>> {
        if let Some((buf, len)) = value.immediate_string_bytes() {
            return Some(buf[..len].to_vec());
        }
        self.string(value).map(|s| s.as_bytes().to_vec())
    }

    /// Byte length of any string representation.
    pub fn string_len(&self, value: Value) -> Option<usize> {
        if let Some((_, len)) = value.immediate_string_bytes() {
            return Some(len);
        }
        self.string(value).map(|s| s.len())
    }

    /// Whether the value is any string representation.
    pub fn is_string(&self, value: Value) -> bool {
        value.is_immediate_string() || self.tag_of(value) == Some(HeapTag::String)
    }

    /// Truthiness including heap values: only a finished generator is
    /// falsey on the heap side.
    pub fn truthy(&self, value: Value) -> bool {
        match value.immediate_truthiness() {
            Some(b) => b,
            None => match self.generator(value) {
                Some(generator) => !generator.finished,
                None => true,
            },
        }
    }

    /// Polymorphic equality: exact for integer pairs, IEEE once a double
    /// is involved, byte-wise for strings, identity otherwise.
    pub fn values_equal(&self, left: Value, right: Value) -> bool {
        if left.is_number() && right.is_number() {
            return left.numeric_eq(right);
        }
        if self.is_string(left) && self.is_string(right) {
            return self.string_bytes(left) == self.string_bytes(right);
        }
        left == right
    }

    /// Concatenate two strings, choosing the tightest representation for
    /// the result.
    pub fn concat_strings(&mut self, left: Value, right: Value) -> Option<Value> {
        let mut bytes = self.string_bytes(left)?;
        bytes.extend(self.string_bytes(right)?);
        Some(self.create_string(&bytes))
    }

    /// Shallow copy: strings, arrays, objects, functions, cfunctions and
    /// generators duplicate their cell; every other value is returned
    /// unchanged.
    pub fn copy_value(&mut self, value: Value) -> Value {
        let data = match self.get(value) {
            Some(CellData::Str(s)) => CellData::Str(s.clone()),
            Some(CellData::Array(a)) => CellData::Array(a.clone()),
            Some(CellData::Object(o)) => CellData::Object(o.clone()),
            Some(CellData::Function(f)) => CellData::Function(f.clone()),
            Some(CellData::CFunction(f)) => CellData::CFunction(f.clone()),
            Some(CellData::Generator(g)) => CellData::Generator(g.clone()),
            _ => return value,
        };
        self.allocate(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_access() {
        let mut heap = Heap::new(GcConfig::low_memory());
        let obj = heap.create_object(Value::NULL);
        assert_eq!(heap.tag_of(obj), Some(HeapTag::Object));
        assert!(heap.object(obj).unwrap().container.is_empty());
        assert!(heap.array(obj).is_none());
    }

    #[test]
    fn test_free_list_accounting() {
        let mut heap = Heap::new(GcConfig::low_memory());
        let before = heap.free_count();
        heap.create_array(vec![]);
        heap.create_array(vec![]);
        assert_eq!(heap.free_count(), before - 2);
        assert_eq!(heap.stats().allocations, 2);
    }

    #[test]
    fn test_growth_when_exhausted() {
        let config = GcConfig {
            arena_cell_count: 64,
            initial_arenas: 1,
            min_free_cells: 4,
            ..Default::default()
        };
        let mut heap = Heap::new(config);
        let capacity = heap.capacity();
        for _ in 0..capacity + 8 {
            heap.create_array(vec![]);
        }
        assert!(heap.capacity() > capacity);
        assert!(heap.stats().arenas_grown > 0);
    }

    #[test]
    fn test_string_representation_selection() {
        let mut heap = Heap::new(GcConfig::low_memory());
        assert!(heap.create_string(b"hi").is_istring());
        assert!(heap.create_string(b"sixsix").is_pstring());
        let heap_str = heap.create_string(b"this one needs a cell");
        assert_eq!(heap.tag_of(heap_str), Some(HeapTag::String));
        assert!(heap.cell(heap_str.as_heap_index().unwrap()).header.flag_a());
    }

    #[test]
    fn test_string_bytes_across_representations() {
        let mut heap = Heap::new(GcConfig::low_memory());
        let a = heap.create_string(b"ab");
        let b = heap.create_string(b"abcdef");
        let c = heap.create_string("a long string outgrowing immediates".as_bytes());
        assert_eq!(heap.string_bytes(a).unwrap(), b"ab");
        assert_eq!(heap.string_bytes(b).unwrap(), b"abcdef");
        assert_eq!(
            heap.string_bytes(c).unwrap(),
            "a long string outgrowing immediates".as_bytes()
        );
    }

    #[test]
    fn test_concat_picks_tightest() {
        let mut heap = Heap::new(GcConfig::low_memory());
        let a = heap.create_string(b"ab");
        let b = heap.create_string(b"cd");
        let ab = heap.concat_strings(a, b).unwrap();
        assert!(ab.is_istring());
        assert_eq!(heap.string_bytes(ab).unwrap(), b"abcd");

        let c = heap.create_string(b"ef");
        let six = heap.concat_strings(ab, c).unwrap();
        assert!(six.is_pstring());
    }

    #[test]
    fn test_values_equal_strings() {
        let mut heap = Heap::new(GcConfig::low_memory());
        let short = heap.create_string(b"abcdef");
        let spelled = heap.create_heap_string(b"abcdef");
        assert!(heap.values_equal(short, spelled));
        let other = heap.create_string(b"other!");
        assert!(!heap.values_equal(short, other));
    }

    #[test]
    fn test_copy_value_is_shallow() {
        let mut heap = Heap::new(GcConfig::low_memory());
        let array = heap.create_array(vec![Value::int(1)]);
        let copy = heap.copy_value(array);
        assert_ne!(array, copy);
        heap.array_mut(copy).unwrap().elements.push(Value::int(2));
        assert_eq!(heap.array(array).unwrap().elements.len(), 1);
        assert_eq!(heap.copy_value(Value::int(5)), Value::int(5));
    }

    #[test]
    fn test_truthiness_of_heap_values() {
        let mut heap = Heap::new(GcConfig::low_memory());
        let obj = heap.create_object(Value::NULL);
        assert!(heap.truthy(obj));
        let generator = heap.create_generator(Value::NULL, 0, Value::NULL);
        assert!(heap.truthy(generator));
        heap.generator_mut(generator).unwrap().finished = true;
        assert!(!heap.truthy(generator));
    }
}
