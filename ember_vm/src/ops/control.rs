//! Stack manipulation, branches and typeof.

use crate::machine::Machine;
use ember_bytecode::Opcode;
use ember_core::Value;

impl Machine {
    pub(crate) fn op_pop(&mut self) {
        self.pop_stack();
    }

    pub(crate) fn op_dup(&mut self) {
        let top = match self.stack.last() {
            Some(&top) => top,
            None => self.fatal("operand stack underflow in Dup"),
        };
        self.push_stack(top);
    }

    pub(crate) fn op_dupn(&mut self) {
        let count = self.operand_u32(1) as usize;
        if self.stack.len() < count {
            self.fatal("operand stack underflow in DupN");
        }
        let start = self.stack.len() - count;
        for i in start..start + count {
            let value = self.stack[i];
            self.push_stack(value);
        }
    }

    pub(crate) fn op_swap(&mut self) {
        let a = self.pop_stack();
        let b = self.pop_stack();
        self.push_stack(a);
        self.push_stack(b);
    }

    // =========================================================================
    // Branches (offsets are relative to the branch opcode's address)
    // =========================================================================

    fn branch_to(&mut self, offset: i32) {
        let target = self.ip as i64 + offset as i64;
        if target < 0 {
            self.fatal("branch target before the code space");
        }
        self.ip = target as usize;
    }

    pub(crate) fn op_branch(&mut self) {
        let offset = self.operand_i32(1);
        self.branch_to(offset);
    }

    pub(crate) fn op_branchif(&mut self) {
        let offset = self.operand_i32(1);
        let condition = self.pop_stack();
        if self.heap.with(|heap| heap.truthy(condition)) {
            self.branch_to(offset);
        }
    }

    pub(crate) fn op_branchunless(&mut self) {
        let offset = self.operand_i32(1);
        let condition = self.pop_stack();
        if !self.heap.with(|heap| heap.truthy(condition)) {
            self.branch_to(offset);
        }
    }

    /// Fused compare-and-branch: pops two values, branches when the
    /// comparison holds.
    pub(crate) fn op_branch_compare(&mut self, op: Opcode) {
        let offset = self.operand_i32(1);
        let right = self.pop_stack();
        let left = self.pop_stack();
        let taken = match op {
            Opcode::BranchLt => left.numeric_lt(right),
            Opcode::BranchGt => left.numeric_gt(right),
            Opcode::BranchLe => left.numeric_le(right),
            Opcode::BranchGe => left.numeric_ge(right),
            Opcode::BranchEq => self.heap.with(|heap| heap.values_equal(left, right)),
            Opcode::BranchNeq => !self.heap.with(|heap| heap.values_equal(left, right)),
            _ => self.fatal("non-comparison opcode in compare dispatch"),
        };
        if taken {
            self.branch_to(offset);
        }
    }

    pub(crate) fn op_typeof(&mut self) {
        let value = self.pop_stack();
        let name = self.heap.with(|heap| heap.type_name(value));
        let string = self.heap.with(|heap| heap.create_string(name.as_bytes()));
        self.push_stack(string);
    }

    pub(crate) fn op_halt(&mut self) {
        self.halted = true;
    }
}
