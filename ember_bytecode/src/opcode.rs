//! The opcode set.
//!
//! Instructions are a one-byte opcode followed by zero or more
//! fixed-width operands. Operand widths are a static property of each
//! opcode; [`Opcode::length`] is the table the interpreter uses to step
//! to the next instruction when no branch is taken.
//!
//! Branch and body offsets are `i32`, relative to the address of the
//! opcode byte itself.

/// One-byte operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Read local `index` at lexical `level`. `(u32, u32)`
    ReadLocal = 0x00,
    /// Write local; pops the value. `(u32, u32)`
    SetLocal = 0x01,
    /// Write local; leaves the value on top. `(u32, u32)`
    SetLocalPush = 0x02,

    /// Read member by symbol. `(u64)`
    ReadMemberSymbol = 0x03,
    /// Write member by symbol; pops the value. `(u64)`
    SetMemberSymbol = 0x04,
    /// Write member by symbol; leaves the value on top. `(u64)`
    SetMemberSymbolPush = 0x05,
    /// Read member by computed key (key on top of the target).
    ReadMemberValue = 0x06,
    /// Write member by computed key; pops the value.
    SetMemberValue = 0x07,
    /// Write member by computed key; leaves the value on top.
    SetMemberValuePush = 0x08,
    /// Read array element at a fixed index. `(u32)`
    ReadArrayIndex = 0x09,
    /// Write array element at a fixed index; pops the value. `(u32)`
    SetArrayIndex = 0x0a,
    /// Write array element at a fixed index; leaves the value. `(u32)`
    SetArrayIndexPush = 0x0b,

    /// Read a global binding. `(u64)`
    ReadGlobal = 0x0c,
    /// Write a global binding; pops the value. `(u64)`
    SetGlobal = 0x0d,
    /// Write a global binding; leaves the value on top. `(u64)`
    SetGlobalPush = 0x0e,

    /// Push the current receiver.
    PutSelf = 0x0f,
    /// Push the parent class of the executing function's host class.
    PutSuper = 0x10,
    /// Push a parent-class method by symbol. `(u64)`
    PutSuperMember = 0x11,
    /// Push a raw encoded immediate. `(u64)`
    PutValue = 0x12,
    /// Push a string from the block's data segment. `(offset u32, len u32)`
    PutString = 0x13,
    /// Push a function literal.
    /// `(symbol u64, body i32, flags u8, argc u32, minargc u32, lvarcount u32)`
    PutFunction = 0x14,
    /// Push a host function. `(symbol u64, host_index u32, argc u32)`
    PutCFunction = 0x15,
    /// Wrap the function on top into a generator. `(symbol u64, resume i32)`
    PutGenerator = 0x16,
    /// Assemble a class from stack operands.
    /// `(symbol u64, props u32, staticprops u32, methods u32, staticmethods u32, flags u8)`
    PutClass = 0x17,
    /// Collect `n` stack values into an array. `(u32)`
    PutArray = 0x18,
    /// Collect `n` key/value pairs into an object. `(u32)`
    PutHash = 0x19,

    /// Drop the top of the stack.
    Pop = 0x1a,
    /// Duplicate the top of the stack.
    Dup = 0x1b,
    /// Duplicate the top `n` values. `(u32)`
    DupN = 0x1c,
    /// Exchange the two top values.
    Swap = 0x1d,

    /// Call with `argc` arguments. `(u32)`
    Call = 0x1e,
    /// Method call: receiver below the arguments. `(u32)`
    CallMember = 0x1f,
    /// Instantiate a class. `(u32)`
    New = 0x20,
    /// Return from the current frame.
    Return = 0x21,
    /// Suspend the generator or fiber.
    Yield = 0x22,

    /// Throw the top of the stack.
    Throw = 0x23,
    /// Register an exception handler. `(i32)`
    RegisterCatchTable = 0x24,
    /// Drop the innermost exception handler.
    PopCatchTable = 0x25,

    /// Unconditional branch. `(i32)`
    Branch = 0x26,
    /// Branch when the popped value is truthy. `(i32)`
    BranchIf = 0x27,
    /// Branch when the popped value is falsey. `(i32)`
    BranchUnless = 0x28,
    /// Fused compare-and-branch; pops two values. `(i32)`
    BranchLt = 0x29,
    /// Fused compare-and-branch; pops two values. `(i32)`
    BranchGt = 0x2a,
    /// Fused compare-and-branch; pops two values. `(i32)`
    BranchLe = 0x2b,
    /// Fused compare-and-branch; pops two values. `(i32)`
    BranchGe = 0x2c,
    /// Fused compare-and-branch; pops two values. `(i32)`
    BranchEq = 0x2d,
    /// Fused compare-and-branch; pops two values. `(i32)`
    BranchNeq = 0x2e,

    /// Replace the top of the stack with its type name string.
    Typeof = 0x2f,
    /// Stop the interpreter and return control to the scheduler.
    Halt = 0x30,

    /// Addition; also string and array concatenation.
    Add = 0x31,
    /// Subtraction.
    Sub = 0x32,
    /// Multiplication.
    Mul = 0x33,
    /// Division (always double space).
    Div = 0x34,
    /// Modulo; modulo by zero yields NaN.
    Mod = 0x35,
    /// Exponentiation (double space).
    Pow = 0x36,
    /// Polymorphic equality.
    Eq = 0x37,
    /// Polymorphic inequality.
    Neq = 0x38,
    /// Numeric less-than.
    Lt = 0x39,
    /// Numeric greater-than.
    Gt = 0x3a,
    /// Numeric less-or-equal.
    Le = 0x3b,
    /// Numeric greater-or-equal.
    Ge = 0x3c,
    /// Left shift (32-bit operand space).
    Shl = 0x3d,
    /// Arithmetic right shift (32-bit operand space).
    Shr = 0x3e,
    /// Bitwise and.
    BAnd = 0x3f,
    /// Bitwise or.
    BOr = 0x40,
    /// Bitwise xor.
    BXor = 0x41,
    /// Unary plus.
    UAdd = 0x42,
    /// Unary minus.
    USub = 0x43,
    /// Truthiness negation.
    UNot = 0x44,
    /// Bitwise complement.
    UBNot = 0x45,
}

/// Number of defined opcodes.
pub const OPCODE_COUNT: usize = 0x46;

impl Opcode {
    /// Decode an opcode byte.
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        if (byte as usize) < OPCODE_COUNT {
            // Safety: Opcode is repr(u8) with contiguous discriminants
            // 0..OPCODE_COUNT, checked above.
            Some(unsafe { std::mem::transmute::<u8, Opcode>(byte) })
        } else {
            None
        }
    }

    /// Total instruction length in bytes, opcode byte included.
    pub const fn length(self) -> usize {
        match self {
            Opcode::ReadLocal | Opcode::SetLocal | Opcode::SetLocalPush => 1 + 4 + 4,

            Opcode::ReadMemberSymbol
            | Opcode::SetMemberSymbol
            | Opcode::SetMemberSymbolPush
            | Opcode::ReadGlobal
            | Opcode::SetGlobal
            | Opcode::SetGlobalPush
            | Opcode::PutSuperMember
            | Opcode::PutValue => 1 + 8,

            Opcode::ReadMemberValue
            | Opcode::SetMemberValue
            | Opcode::SetMemberValuePush
            | Opcode::PutSelf
            | Opcode::PutSuper
            | Opcode::Pop
            | Opcode::Dup
            | Opcode::Swap
            | Opcode::Return
            | Opcode::Yield
            | Opcode::Throw
            | Opcode::PopCatchTable
            | Opcode::Typeof
            | Opcode::Halt
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Pow
            | Opcode::Eq
            | Opcode::Neq
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::Le
            | Opcode::Ge
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::BAnd
            | Opcode::BOr
            | Opcode::BXor
            | Opcode::UAdd
            | Opcode::USub
            | Opcode::UNot
            | Opcode::UBNot => 1,

            Opcode::ReadArrayIndex
            | Opcode::SetArrayIndex
            | Opcode::SetArrayIndexPush
            | Opcode::PutArray
            | Opcode::PutHash
            | Opcode::DupN
            | Opcode::Call
            | Opcode::CallMember
            | Opcode::New => 1 + 4,

            Opcode::PutString => 1 + 4 + 4,
            Opcode::PutFunction => 1 + 8 + 4 + 1 + 4 + 4 + 4,
            Opcode::PutCFunction => 1 + 8 + 4 + 4,
            Opcode::PutGenerator => 1 + 8 + 4,
            Opcode::PutClass => 1 + 8 + 4 + 4 + 4 + 4 + 1,

            Opcode::RegisterCatchTable
            | Opcode::Branch
            | Opcode::BranchIf
            | Opcode::BranchUnless
            | Opcode::BranchLt
            | Opcode::BranchGt
            | Opcode::BranchLe
            | Opcode::BranchGe
            | Opcode::BranchEq
            | Opcode::BranchNeq => 1 + 4,
        }
    }

    /// Mnemonic for diagnostics.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::ReadLocal => "readlocal",
            Opcode::SetLocal => "setlocal",
            Opcode::SetLocalPush => "setlocalpush",
            Opcode::ReadMemberSymbol => "readmembersymbol",
            Opcode::SetMemberSymbol => "setmembersymbol",
            Opcode::SetMemberSymbolPush => "setmembersymbolpush",
            Opcode::ReadMemberValue => "readmembervalue",
            Opcode::SetMemberValue => "setmembervalue",
            Opcode::SetMemberValuePush => "setmembervaluepush",
            Opcode::ReadArrayIndex => "readarrayindex",
            Opcode::SetArrayIndex => "setarrayindex",
            Opcode::SetArrayIndexPush => "setarrayindexpush",
            Opcode::ReadGlobal => "readglobal",
            Opcode::SetGlobal => "setglobal",
            Opcode::SetGlobalPush => "setglobalpush",
            Opcode::PutSelf => "putself",
            Opcode::PutSuper => "putsuper",
            Opcode::PutSuperMember => "putsupermember",
            Opcode::PutValue => "putvalue",
            Opcode::PutString => "putstring",
            Opcode::PutFunction => "putfunction",
            Opcode::PutCFunction => "putcfunction",
            Opcode::PutGenerator => "putgenerator",
            Opcode::PutClass => "putclass",
            Opcode::PutArray => "putarray",
            Opcode::PutHash => "puthash",
            Opcode::Pop => "pop",
            Opcode::Dup => "dup",
            Opcode::DupN => "dupn",
            Opcode::Swap => "swap",
            Opcode::Call => "call",
            Opcode::CallMember => "callmember",
            Opcode::New => "new",
            Opcode::Return => "return",
            Opcode::Yield => "yield",
            Opcode::Throw => "throw",
            Opcode::RegisterCatchTable => "registercatchtable",
            Opcode::PopCatchTable => "popcatchtable",
            Opcode::Branch => "branch",
            Opcode::BranchIf => "branchif",
            Opcode::BranchUnless => "branchunless",
            Opcode::BranchLt => "branchlt",
            Opcode::BranchGt => "branchgt",
            Opcode::BranchLe => "branchle",
            Opcode::BranchGe => "branchge",
            Opcode::BranchEq => "brancheq",
            Opcode::BranchNeq => "branchneq",
            Opcode::Typeof => "typeof",
            Opcode::Halt => "halt",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Pow => "pow",
            Opcode::Eq => "eq",
            Opcode::Neq => "neq",
            Opcode::Lt => "lt",
            Opcode::Gt => "gt",
            Opcode::Le => "le",
            Opcode::Ge => "ge",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::BAnd => "band",
            Opcode::BOr => "bor",
            Opcode::BXor => "bxor",
            Opcode::UAdd => "uadd",
            Opcode::USub => "usub",
            Opcode::UNot => "unot",
            Opcode::UBNot => "ubnot",
        }
    }
}

bitflags::bitflags! {
    /// Flag byte of `PutFunction`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PutFunctionFlags: u8 {
        /// The literal had no name.
        const ANONYMOUS = 1 << 0;
        /// Surplus arguments are bundled into an `arguments` array.
        const NEEDS_ARGUMENTS = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Flag byte of `PutClass`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PutClassFlags: u8 {
        /// A parent class value sits on the stack.
        const HAS_PARENT = 1 << 0;
        /// A constructor function sits on the stack.
        const HAS_CONSTRUCTOR = 1 << 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_opcodes() {
        for byte in 0..OPCODE_COUNT as u8 {
            let opcode = Opcode::from_u8(byte).expect("contiguous opcode space");
            assert_eq!(opcode as u8, byte);
        }
        assert_eq!(Opcode::from_u8(OPCODE_COUNT as u8), None);
        assert_eq!(Opcode::from_u8(0xff), None);
    }

    #[test]
    fn test_length_table_sanity() {
        assert_eq!(Opcode::Pop.length(), 1);
        assert_eq!(Opcode::ReadLocal.length(), 9);
        assert_eq!(Opcode::PutValue.length(), 9);
        assert_eq!(Opcode::PutFunction.length(), 26);
        assert_eq!(Opcode::PutClass.length(), 26);
        assert_eq!(Opcode::Branch.length(), 5);
        for byte in 0..OPCODE_COUNT as u8 {
            assert!(Opcode::from_u8(byte).unwrap().length() >= 1);
        }
    }
}
