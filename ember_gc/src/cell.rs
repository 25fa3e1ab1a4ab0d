//! Heap cell layout: the one-byte header and the closed set of heap types.
//!
//! Every heap value occupies one [`Cell`]. The header packs a 5-bit type
//! tag, the collector's mark bit and two user flag bits into a single
//! byte; the payload is a tagged variant over the eleven heap types. The
//! set is closed on purpose: polymorphism over heap data is an
//! interpreter operation, not a trait hierarchy.

use ember_core::Value;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::ffi::c_void;

/// Inline storage cap for short heap strings.
pub const SHORT_STRING_MAX: usize = 118;

/// Inline storage cap for frame local slots.
pub const SMALL_FRAME_LOCALS: usize = 5;

// =============================================================================
// Header
// =============================================================================

/// Type tag stored in the low five header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeapTag {
    /// Unoccupied cell (free-list member).
    Dead = 0,
    /// Class definition.
    Class = 1,
    /// Instance object.
    Object = 2,
    /// Growable value sequence.
    Array = 3,
    /// Short or long string.
    String = 4,
    /// Interpreted function.
    Function = 5,
    /// Host function descriptor.
    CFunction = 6,
    /// Suspendable generator.
    Generator = 7,
    /// Activation record.
    Frame = 8,
    /// Exception handler record.
    CatchTable = 9,
    /// Opaque host resource.
    CPointer = 10,
}

impl HeapTag {
    /// Human-readable type name, as reported by `typeof`.
    pub fn name(self) -> &'static str {
        match self {
            HeapTag::Dead => "dead",
            HeapTag::Class => "class",
            HeapTag::Object => "object",
            HeapTag::Array => "array",
            HeapTag::String => "string",
            HeapTag::Function => "function",
            HeapTag::CFunction => "cfunction",
            HeapTag::Generator => "generator",
            HeapTag::Frame => "frame",
            HeapTag::CatchTable => "catchtable",
            HeapTag::CPointer => "cpointer",
        }
    }
}

/// One-byte cell header.
///
/// Bit layout: `FFMT TTTT` — five tag bits, the mark bit, two user flags.
/// The string type repurposes flag A as its short/long discriminant
/// (kept in sync with the payload enum by the allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header(u8);

const TAG_MASK: u8 = 0b0001_1111;
const MARK_BIT: u8 = 0b0010_0000;
const FLAG_A_BIT: u8 = 0b0100_0000;
const FLAG_B_BIT: u8 = 0b1000_0000;

impl Header {
    /// Header for a freshly occupied cell of the given type.
    pub fn new(tag: HeapTag) -> Header {
        Header(tag as u8)
    }

    /// Header of a dead cell.
    pub fn dead() -> Header {
        Header(HeapTag::Dead as u8)
    }

    /// The type tag.
    #[inline]
    pub fn tag(self) -> HeapTag {
        match self.0 & TAG_MASK {
            1 => HeapTag::Class,
            2 => HeapTag::Object,
            3 => HeapTag::Array,
            4 => HeapTag::String,
            5 => HeapTag::Function,
            6 => HeapTag::CFunction,
            7 => HeapTag::Generator,
            8 => HeapTag::Frame,
            9 => HeapTag::CatchTable,
            10 => HeapTag::CPointer,
            _ => HeapTag::Dead,
        }
    }

    /// Collector mark bit.
    #[inline]
    pub fn marked(self) -> bool {
        self.0 & MARK_BIT != 0
    }

    /// Set or clear the mark bit.
    #[inline]
    pub fn set_marked(&mut self, marked: bool) {
        if marked {
            self.0 |= MARK_BIT;
        } else {
            self.0 &= !MARK_BIT;
        }
    }

    /// First user flag.
    #[inline]
    pub fn flag_a(self) -> bool {
        self.0 & FLAG_A_BIT != 0
    }

    /// Set the first user flag.
    #[inline]
    pub fn set_flag_a(&mut self, set: bool) {
        if set {
            self.0 |= FLAG_A_BIT;
        } else {
            self.0 &= !FLAG_A_BIT;
        }
    }

    /// Second user flag.
    #[inline]
    pub fn flag_b(self) -> bool {
        self.0 & FLAG_B_BIT != 0
    }

    /// Set the second user flag.
    #[inline]
    pub fn set_flag_b(&mut self, set: bool) {
        if set {
            self.0 |= FLAG_B_BIT;
        } else {
            self.0 &= !FLAG_B_BIT;
        }
    }
}

// =============================================================================
// Heap types
// =============================================================================

/// Instance object: class reference plus a symbol-keyed container.
#[derive(Debug, Default, Clone)]
pub struct Object {
    /// The class this object was constructed from, or null.
    pub class: Value,
    /// Member storage keyed by symbol values.
    pub container: FxHashMap<Value, Value>,
}

/// Growable ordered sequence of values.
#[derive(Debug, Default, Clone)]
pub struct Array {
    /// The elements in order.
    pub elements: Vec<Value>,
}

/// Heap string storage: inline up to [`SHORT_STRING_MAX`] bytes,
/// otherwise an owned buffer.
#[derive(Clone)]
pub enum HeapString {
    /// Inline representation.
    Short {
        /// Number of used bytes.
        len: u8,
        /// Inline byte storage.
        data: [u8; SHORT_STRING_MAX],
    },
    /// Owned heap buffer.
    Long(Box<[u8]>),
}

impl HeapString {
    /// Build the tightest heap representation for `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> HeapString {
        if bytes.len() <= SHORT_STRING_MAX {
            let mut data = [0u8; SHORT_STRING_MAX];
            data[..bytes.len()].copy_from_slice(bytes);
            HeapString::Short {
                len: bytes.len() as u8,
                data,
            }
        } else {
            HeapString::Long(bytes.into())
        }
    }

    /// The string bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            HeapString::Short { len, data } => &data[..*len as usize],
            HeapString::Long(buf) => buf,
        }
    }

    /// Byte length.
    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the string is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the inline representation is in use.
    #[inline]
    pub fn is_short(&self) -> bool {
        matches!(self, HeapString::Short { .. })
    }
}

impl std::fmt::Debug for HeapString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HeapString({:?}, short={})",
            String::from_utf8_lossy(self.as_bytes()),
            self.is_short()
        )
    }
}

/// Class definition.
#[derive(Debug, Default, Clone)]
pub struct Class {
    /// Class name symbol.
    pub name: Value,
    /// Constructor function, or null.
    pub constructor: Value,
    /// Member property symbols installed on every new instance.
    pub member_properties: SmallVec<[Value; 4]>,
    /// Prototype object holding instance methods.
    pub prototype: Value,
    /// Parent class, or null.
    pub parent_class: Value,
    /// Static properties and methods.
    pub container: FxHashMap<Value, Value>,
}

bitflags::bitflags! {
    /// Flags describing an interpreted function.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FunctionFlags: u8 {
        /// Function literal had no name.
        const ANONYMOUS = 1 << 0;
        /// Surplus arguments are bundled into an `arguments` array.
        const NEEDS_ARGUMENTS = 1 << 1;
    }
}

/// Interpreted function.
#[derive(Debug, Clone)]
pub struct Function {
    /// Name symbol.
    pub name: Value,
    /// Declared parameter count.
    pub argc: u32,
    /// Minimum arguments the callee accepts.
    pub minimum_argc: u32,
    /// Local variable slot count (parameters included).
    pub lvarcount: u32,
    /// Entry address of the body in the machine's code space.
    pub body_address: usize,
    /// Captured environment frame, or null for top-level functions.
    pub context: Value,
    /// Receiver the function was bound to.
    pub bound_self: Value,
    /// Whether `bound_self` is meaningful (null is a valid receiver).
    pub bound_self_set: bool,
    /// Class the function was defined in, or null (super resolution).
    pub host_class: Value,
    /// Anonymous / needs-arguments flags.
    pub flags: FunctionFlags,
    /// Attached properties.
    pub container: FxHashMap<Value, Value>,
}

/// Where a host function may execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPolicy {
    /// Interpreter thread only.
    Main,
    /// Worker threads only (blocking calls).
    Worker,
    /// Either context.
    Both,
}

/// Host function descriptor. The callable itself lives in the machine's
/// host-function registry; the cell stores its index so bytecode never
/// carries raw function pointers.
#[derive(Debug, Clone)]
pub struct CFunction {
    /// Name symbol.
    pub name: Value,
    /// Index into the machine's host-function registry.
    pub host_index: u32,
    /// Declared arity; surplus arguments are dropped.
    pub argc: u32,
    /// Execution context policy.
    pub policy: ThreadPolicy,
    /// Whether the return value is pushed after the call.
    pub push_return: bool,
    /// Whether the interpreter halts after the call returns.
    pub halt_after_return: bool,
    /// Attached properties.
    pub container: FxHashMap<Value, Value>,
}

/// Suspendable generator: a reified frame, catch-chain tail, operand
/// stack slice and resume address.
#[derive(Debug, Clone)]
pub struct Generator {
    /// Name symbol.
    pub name: Value,
    /// Suspended frame, or null before the first call.
    pub frame: Value,
    /// Top of the generator's catch-table chain at suspension.
    pub catchtable: Value,
    /// Operand stack snapshot. Empty while the generator runs (its
    /// values are live on the interpreter stack), populated on suspend.
    pub stack: Vec<Value>,
    /// Address execution resumes at.
    pub resume_address: usize,
    /// Function executed on first call.
    pub boot_function: Value,
    /// Receiver the generator was bound to.
    pub bound_self: Value,
    /// Whether `bound_self` is meaningful.
    pub bound_self_set: bool,
    /// First call has happened.
    pub started: bool,
    /// Currently executing (re-entry is an error).
    pub running: bool,
    /// Ran to completion; further calls return null.
    pub finished: bool,
    /// Attached properties.
    pub container: FxHashMap<Value, Value>,
}

/// Activation record.
#[derive(Debug)]
pub struct Frame {
    /// Dynamic parent (caller) frame; defines return and unwinding.
    pub parent: Value,
    /// Lexical parent frame; defines variable lookup.
    pub lexical_parent: Value,
    /// Top of the catch-table chain when the frame was pushed.
    pub catchtable: Value,
    /// The function value being executed.
    pub caller: Value,
    /// Receiver.
    pub self_value: Value,
    /// Address of the body start.
    pub origin_address: usize,
    /// Address execution continues at after return.
    pub return_address: usize,
    /// Operand stack size at entry.
    pub stacksize: usize,
    /// Local variable slots; inline for small frames.
    pub locals: SmallVec<[Value; SMALL_FRAME_LOCALS]>,
    /// Return control to the scheduler instead of the caller.
    pub halt_after_return: bool,
    /// Push the receiver instead of the return value when the frame
    /// pops (constructor calls leave the new object on the stack).
    pub return_self: bool,
    /// Owning generator when this frame is a generator body, else null.
    pub generator: Value,
}

/// Exception handler record.
#[derive(Debug)]
pub struct CatchTable {
    /// Handler address.
    pub address: usize,
    /// Operand stack size to restore before entering the handler.
    pub stacksize: usize,
    /// Frame the handler belongs to.
    pub frame: Value,
    /// Previous top of the catch-table chain.
    pub parent: Value,
}

/// Destructor invoked when a cpointer cell is reclaimed.
pub type CPointerDestructor = unsafe fn(*mut c_void);

/// Opaque host resource wrapper.
pub struct CPointer {
    /// The wrapped pointer.
    pub data: *mut c_void,
    /// Optional cleanup routine run by the sweeper.
    pub destructor: Option<CPointerDestructor>,
}

// Safety: cpointers are only dereferenced by host code that created
// them; the heap merely stores and finalizes the pointer under the
// collector mutex.
unsafe impl Send for CPointer {}

impl Drop for CPointer {
    fn drop(&mut self) {
        if let Some(destructor) = self.destructor {
            // Safety: the destructor was registered together with the
            // pointer and is called exactly once, at reclamation.
            unsafe { destructor(self.data) };
        }
    }
}

impl std::fmt::Debug for CPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CPointer({:p})", self.data)
    }
}

// =============================================================================
// Cell
// =============================================================================

/// Payload of a heap cell.
#[derive(Debug)]
pub enum CellData {
    /// Dead cell; `next` threads the intrusive free list.
    Free {
        /// Next free cell index, if any.
        next: Option<u64>,
    },
    /// Class payload.
    Class(Class),
    /// Object payload.
    Object(Object),
    /// Array payload.
    Array(Array),
    /// String payload.
    Str(HeapString),
    /// Function payload.
    Function(Function),
    /// Host function payload.
    CFunction(CFunction),
    /// Generator payload.
    Generator(Generator),
    /// Frame payload.
    Frame(Frame),
    /// Catch-table payload.
    CatchTable(CatchTable),
    /// Host pointer payload.
    CPointer(CPointer),
}

impl CellData {
    /// The type tag matching this payload.
    pub fn tag(&self) -> HeapTag {
        match self {
            CellData::Free { .. } => HeapTag::Dead,
            CellData::Class(_) => HeapTag::Class,
            CellData::Object(_) => HeapTag::Object,
            CellData::Array(_) => HeapTag::Array,
            CellData::Str(_) => HeapTag::String,
            CellData::Function(_) => HeapTag::Function,
            CellData::CFunction(_) => HeapTag::CFunction,
            CellData::Generator(_) => HeapTag::Generator,
            CellData::Frame(_) => HeapTag::Frame,
            CellData::CatchTable(_) => HeapTag::CatchTable,
            CellData::CPointer(_) => HeapTag::CPointer,
        }
    }
}

/// One heap cell: header byte plus payload.
#[derive(Debug)]
pub struct Cell {
    /// Header byte (tag, mark, user flags).
    pub header: Header,
    /// The payload.
    pub data: CellData,
}

impl Cell {
    /// A dead cell linked to the given free-list successor.
    pub fn free(next: Option<u64>) -> Cell {
        Cell {
            header: Header::dead(),
            data: CellData::Free { next },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bit_layout() {
        let mut h = Header::new(HeapTag::Generator);
        assert_eq!(h.tag(), HeapTag::Generator);
        assert!(!h.marked());

        h.set_marked(true);
        assert!(h.marked());
        assert_eq!(h.tag(), HeapTag::Generator);

        h.set_flag_a(true);
        h.set_flag_b(true);
        assert!(h.flag_a() && h.flag_b());
        h.set_marked(false);
        assert!(h.flag_a() && h.flag_b());
        assert_eq!(h.tag(), HeapTag::Generator);
    }

    #[test]
    fn test_short_string_cap() {
        let short = HeapString::from_bytes(&[b'x'; SHORT_STRING_MAX]);
        assert!(short.is_short());
        assert_eq!(short.len(), SHORT_STRING_MAX);

        let long = HeapString::from_bytes(&[b'x'; SHORT_STRING_MAX + 1]);
        assert!(!long.is_short());
        assert_eq!(long.len(), SHORT_STRING_MAX + 1);
    }

    #[test]
    fn test_cell_data_tags() {
        assert_eq!(CellData::Free { next: None }.tag(), HeapTag::Dead);
        assert_eq!(CellData::Array(Array::default()).tag(), HeapTag::Array);
        assert_eq!(
            CellData::Str(HeapString::from_bytes(b"hello")).tag(),
            HeapTag::String
        );
    }

    #[test]
    fn test_cpointer_destructor_runs_on_drop() {
        static mut DROPPED: bool = false;
        unsafe fn destructor(_: *mut c_void) {
            unsafe { DROPPED = true };
        }
        drop(CPointer {
            data: std::ptr::null_mut(),
            destructor: Some(destructor),
        });
        assert!(unsafe { DROPPED });
    }
}
