//! Instruction blocks.
//!
//! A block is what the compiler hands the runtime for one module: a
//! linear byte buffer of instructions, a data segment for string
//! constants, and the module-level local count. The writer API below is
//! the emission interface; the free `read_*` functions are the decode
//! helpers the interpreter uses against its registered code space.

use crate::opcode::{Opcode, PutClassFlags, PutFunctionFlags};
use ember_core::Value;

/// A compiled instruction block.
#[derive(Debug, Default, Clone)]
pub struct InstructionBlock {
    code: Vec<u8>,
    data: Vec<u8>,
    lvarcount: u32,
}

impl InstructionBlock {
    /// Create an empty block with the given module-level local count.
    pub fn new(lvarcount: u32) -> InstructionBlock {
        InstructionBlock {
            code: Vec::new(),
            data: Vec::new(),
            lvarcount,
        }
    }

    /// The instruction bytes.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// The data segment.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Module-level local slot count.
    pub fn lvarcount(&self) -> u32 {
        self.lvarcount
    }

    /// Current write offset (the address the next instruction gets).
    pub fn here(&self) -> usize {
        self.code.len()
    }

    // =========================================================================
    // Raw writers
    // =========================================================================

    fn write_u8(&mut self, v: u8) {
        self.code.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn write_opcode(&mut self, op: Opcode) -> usize {
        let at = self.here();
        self.write_u8(op as u8);
        at
    }

    /// Overwrite a relative offset operand. `opcode_addr` is the address
    /// of the branch-family opcode, `operand_at` the byte offset of the
    /// `i32` operand within the instruction, and `target` the absolute
    /// address the offset should reach.
    pub fn patch_offset(&mut self, opcode_addr: usize, operand_at: usize, target: usize) {
        let rel = target as i64 - opcode_addr as i64;
        let bytes = (rel as i32).to_le_bytes();
        let start = opcode_addr + operand_at;
        self.code[start..start + 4].copy_from_slice(&bytes);
    }

    /// Append bytes to the data segment, returning their offset.
    pub fn add_data(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        offset
    }

    // =========================================================================
    // Load/store emission
    // =========================================================================

    /// Emit `ReadLocal index, level`.
    pub fn emit_readlocal(&mut self, index: u32, level: u32) {
        self.write_opcode(Opcode::ReadLocal);
        self.write_u32(index);
        self.write_u32(level);
    }

    /// Emit `SetLocal index, level`.
    pub fn emit_setlocal(&mut self, index: u32, level: u32) {
        self.write_opcode(Opcode::SetLocal);
        self.write_u32(index);
        self.write_u32(level);
    }

    /// Emit `SetLocalPush index, level`.
    pub fn emit_setlocalpush(&mut self, index: u32, level: u32) {
        self.write_opcode(Opcode::SetLocalPush);
        self.write_u32(index);
        self.write_u32(level);
    }

    /// Emit `ReadMemberSymbol sym`.
    pub fn emit_readmembersymbol(&mut self, symbol: Value) {
        self.write_opcode(Opcode::ReadMemberSymbol);
        self.write_u64(symbol.bits());
    }

    /// Emit `SetMemberSymbol sym`.
    pub fn emit_setmembersymbol(&mut self, symbol: Value) {
        self.write_opcode(Opcode::SetMemberSymbol);
        self.write_u64(symbol.bits());
    }

    /// Emit `SetMemberSymbolPush sym`.
    pub fn emit_setmembersymbolpush(&mut self, symbol: Value) {
        self.write_opcode(Opcode::SetMemberSymbolPush);
        self.write_u64(symbol.bits());
    }

    /// Emit `ReadMemberValue`.
    pub fn emit_readmembervalue(&mut self) {
        self.write_opcode(Opcode::ReadMemberValue);
    }

    /// Emit `SetMemberValue`.
    pub fn emit_setmembervalue(&mut self) {
        self.write_opcode(Opcode::SetMemberValue);
    }

    /// Emit `SetMemberValuePush`.
    pub fn emit_setmembervaluepush(&mut self) {
        self.write_opcode(Opcode::SetMemberValuePush);
    }

    /// Emit `ReadArrayIndex index`.
    pub fn emit_readarrayindex(&mut self, index: u32) {
        self.write_opcode(Opcode::ReadArrayIndex);
        self.write_u32(index);
    }

    /// Emit `SetArrayIndex index`.
    pub fn emit_setarrayindex(&mut self, index: u32) {
        self.write_opcode(Opcode::SetArrayIndex);
        self.write_u32(index);
    }

    /// Emit `SetArrayIndexPush index`.
    pub fn emit_setarrayindexpush(&mut self, index: u32) {
        self.write_opcode(Opcode::SetArrayIndexPush);
        self.write_u32(index);
    }

    /// Emit `ReadGlobal sym`.
    pub fn emit_readglobal(&mut self, symbol: Value) {
        self.write_opcode(Opcode::ReadGlobal);
        self.write_u64(symbol.bits());
    }

    /// Emit `SetGlobal sym`.
    pub fn emit_setglobal(&mut self, symbol: Value) {
        self.write_opcode(Opcode::SetGlobal);
        self.write_u64(symbol.bits());
    }

    /// Emit `SetGlobalPush sym`.
    pub fn emit_setglobalpush(&mut self, symbol: Value) {
        self.write_opcode(Opcode::SetGlobalPush);
        self.write_u64(symbol.bits());
    }

    // =========================================================================
    // Literal emission
    // =========================================================================

    /// Emit `PutSelf`.
    pub fn emit_putself(&mut self) {
        self.write_opcode(Opcode::PutSelf);
    }

    /// Emit `PutSuper`.
    pub fn emit_putsuper(&mut self) {
        self.write_opcode(Opcode::PutSuper);
    }

    /// Emit `PutSuperMember sym`.
    pub fn emit_putsupermember(&mut self, symbol: Value) {
        self.write_opcode(Opcode::PutSuperMember);
        self.write_u64(symbol.bits());
    }

    /// Emit `PutValue imm`.
    pub fn emit_putvalue(&mut self, value: Value) {
        self.write_opcode(Opcode::PutValue);
        self.write_u64(value.bits());
    }

    /// Emit `PutString`, copying the bytes into the data segment.
    pub fn emit_putstring(&mut self, bytes: &[u8]) {
        let offset = self.add_data(bytes);
        self.write_opcode(Opcode::PutString);
        self.write_u32(offset);
        self.write_u32(bytes.len() as u32);
    }

    /// Emit `PutFunction`, with the body at a known relative offset.
    /// Returns the opcode address so the body offset can be patched via
    /// [`InstructionBlock::patch_offset`] with `operand_at = 9`.
    #[allow(clippy::too_many_arguments)]
    pub fn emit_putfunction(
        &mut self,
        symbol: Value,
        body_offset: i32,
        flags: PutFunctionFlags,
        argc: u32,
        minimum_argc: u32,
        lvarcount: u32,
    ) -> usize {
        let at = self.write_opcode(Opcode::PutFunction);
        self.write_u64(symbol.bits());
        self.write_i32(body_offset);
        self.write_u8(flags.bits());
        self.write_u32(argc);
        self.write_u32(minimum_argc);
        self.write_u32(lvarcount);
        at
    }

    /// Emit `PutCFunction host_index, argc`.
    pub fn emit_putcfunction(&mut self, symbol: Value, host_index: u32, argc: u32) {
        self.write_opcode(Opcode::PutCFunction);
        self.write_u64(symbol.bits());
        self.write_u32(host_index);
        self.write_u32(argc);
    }

    /// Emit `PutGenerator resume_offset`; pops the boot function.
    /// Returns the opcode address (`operand_at = 9` for patching).
    pub fn emit_putgenerator(&mut self, symbol: Value, resume_offset: i32) -> usize {
        let at = self.write_opcode(Opcode::PutGenerator);
        self.write_u64(symbol.bits());
        self.write_i32(resume_offset);
        at
    }

    /// Emit `PutClass`.
    pub fn emit_putclass(
        &mut self,
        symbol: Value,
        propertycount: u32,
        staticpropertycount: u32,
        methodcount: u32,
        staticmethodcount: u32,
        flags: PutClassFlags,
    ) {
        self.write_opcode(Opcode::PutClass);
        self.write_u64(symbol.bits());
        self.write_u32(propertycount);
        self.write_u32(staticpropertycount);
        self.write_u32(methodcount);
        self.write_u32(staticmethodcount);
        self.write_u8(flags.bits());
    }

    /// Emit `PutArray n`.
    pub fn emit_putarray(&mut self, count: u32) {
        self.write_opcode(Opcode::PutArray);
        self.write_u32(count);
    }

    /// Emit `PutHash n`.
    pub fn emit_puthash(&mut self, count: u32) {
        self.write_opcode(Opcode::PutHash);
        self.write_u32(count);
    }

    // =========================================================================
    // Stack / call / control emission
    // =========================================================================

    /// Emit `Pop`.
    pub fn emit_pop(&mut self) {
        self.write_opcode(Opcode::Pop);
    }

    /// Emit `Dup`.
    pub fn emit_dup(&mut self) {
        self.write_opcode(Opcode::Dup);
    }

    /// Emit `DupN n`.
    pub fn emit_dupn(&mut self, count: u32) {
        self.write_opcode(Opcode::DupN);
        self.write_u32(count);
    }

    /// Emit `Swap`.
    pub fn emit_swap(&mut self) {
        self.write_opcode(Opcode::Swap);
    }

    /// Emit `Call argc`.
    pub fn emit_call(&mut self, argc: u32) {
        self.write_opcode(Opcode::Call);
        self.write_u32(argc);
    }

    /// Emit `CallMember argc`.
    pub fn emit_callmember(&mut self, argc: u32) {
        self.write_opcode(Opcode::CallMember);
        self.write_u32(argc);
    }

    /// Emit `New argc`.
    pub fn emit_new(&mut self, argc: u32) {
        self.write_opcode(Opcode::New);
        self.write_u32(argc);
    }

    /// Emit `Return`.
    pub fn emit_return(&mut self) {
        self.write_opcode(Opcode::Return);
    }

    /// Emit `Yield`.
    pub fn emit_yield(&mut self) {
        self.write_opcode(Opcode::Yield);
    }

    /// Emit `Throw`.
    pub fn emit_throw(&mut self) {
        self.write_opcode(Opcode::Throw);
    }

    /// Emit `RegisterCatchTable offset`; returns the opcode address.
    pub fn emit_registercatchtable(&mut self, offset: i32) -> usize {
        let at = self.write_opcode(Opcode::RegisterCatchTable);
        self.write_i32(offset);
        at
    }

    /// Emit `PopCatchTable`.
    pub fn emit_popcatchtable(&mut self) {
        self.write_opcode(Opcode::PopCatchTable);
    }

    /// Emit a branch-family instruction; returns the opcode address so a
    /// forward target can be patched later (`operand_at = 1`).
    pub fn emit_branch_op(&mut self, op: Opcode, offset: i32) -> usize {
        debug_assert!(matches!(
            op,
            Opcode::Branch
                | Opcode::BranchIf
                | Opcode::BranchUnless
                | Opcode::BranchLt
                | Opcode::BranchGt
                | Opcode::BranchLe
                | Opcode::BranchGe
                | Opcode::BranchEq
                | Opcode::BranchNeq
        ));
        let at = self.write_opcode(op);
        self.write_i32(offset);
        at
    }

    /// Emit `Branch offset`.
    pub fn emit_branch(&mut self, offset: i32) -> usize {
        self.emit_branch_op(Opcode::Branch, offset)
    }

    /// Emit `BranchIf offset`.
    pub fn emit_branchif(&mut self, offset: i32) -> usize {
        self.emit_branch_op(Opcode::BranchIf, offset)
    }

    /// Emit `BranchUnless offset`.
    pub fn emit_branchunless(&mut self, offset: i32) -> usize {
        self.emit_branch_op(Opcode::BranchUnless, offset)
    }

    /// Emit `Typeof`.
    pub fn emit_typeof(&mut self) {
        self.write_opcode(Opcode::Typeof);
    }

    /// Emit any zero-operand opcode (stack ops, operators, `Halt`).
    pub fn emit_op(&mut self, op: Opcode) {
        debug_assert_eq!(op.length(), 1, "{} takes operands", op.mnemonic());
        self.write_opcode(op);
    }

    /// Emit `Halt`.
    pub fn emit_halt(&mut self) {
        self.write_opcode(Opcode::Halt);
    }
}

// =============================================================================
// Decode helpers
// =============================================================================

/// Read one byte, or `None` past the end.
#[inline]
pub fn read_u8(code: &[u8], at: usize) -> Option<u8> {
    code.get(at).copied()
}

/// Read a little-endian `u32`.
#[inline]
pub fn read_u32(code: &[u8], at: usize) -> Option<u32> {
    let bytes = code.get(at..at + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

/// Read a little-endian `i32`.
#[inline]
pub fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    let bytes = code.get(at..at + 4)?;
    Some(i32::from_le_bytes(bytes.try_into().ok()?))
}

/// Read a little-endian `u64`.
#[inline]
pub fn read_u64(code: &[u8], at: usize) -> Option<u64> {
    let bytes = code.get(at..at + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_back() {
        let mut block = InstructionBlock::new(1);
        block.emit_putvalue(Value::int(42));
        block.emit_readlocal(3, 1);
        block.emit_halt();

        let code = block.code();
        assert_eq!(Opcode::from_u8(code[0]), Some(Opcode::PutValue));
        assert_eq!(read_u64(code, 1), Some(Value::int(42).bits()));
        let next = Opcode::PutValue.length();
        assert_eq!(Opcode::from_u8(code[next]), Some(Opcode::ReadLocal));
        assert_eq!(read_u32(code, next + 1), Some(3));
        assert_eq!(read_u32(code, next + 5), Some(1));
    }

    #[test]
    fn test_instruction_lengths_match_emission() {
        let mut block = InstructionBlock::new(0);
        block.emit_readlocal(0, 0);
        assert_eq!(block.here(), Opcode::ReadLocal.length());

        let mut block = InstructionBlock::new(0);
        block.emit_putfunction(
            Value::NULL,
            12,
            PutFunctionFlags::ANONYMOUS,
            2,
            1,
            3,
        );
        assert_eq!(block.here(), Opcode::PutFunction.length());

        let mut block = InstructionBlock::new(0);
        block.emit_putclass(Value::NULL, 1, 0, 2, 0, PutClassFlags::HAS_CONSTRUCTOR);
        assert_eq!(block.here(), Opcode::PutClass.length());
    }

    #[test]
    fn test_branch_patching() {
        let mut block = InstructionBlock::new(0);
        let branch = block.emit_branch(0);
        block.emit_pop();
        let target = block.here();
        block.emit_halt();
        block.patch_offset(branch, 1, target);

        let offset = read_i32(block.code(), branch + 1).unwrap();
        assert_eq!(branch as i64 + offset as i64, target as i64);
    }

    #[test]
    fn test_string_data_segment() {
        let mut block = InstructionBlock::new(0);
        block.emit_putstring(b"hello world, a long constant");
        block.emit_putstring(b"second");

        let code = block.code();
        assert_eq!(read_u32(code, 1), Some(0));
        assert_eq!(read_u32(code, 5), Some(28));
        let second = Opcode::PutString.length();
        assert_eq!(read_u32(code, second + 1), Some(28));
        assert_eq!(&block.data()[..5], b"hello");
    }

    #[test]
    fn test_reads_past_end_fail() {
        let block = InstructionBlock::new(0);
        assert_eq!(read_u8(block.code(), 0), None);
        assert_eq!(read_u32(&[1, 2], 0), None);
        assert_eq!(read_u64(&[1, 2, 3, 4, 5, 6, 7], 0), None);
    }
}
