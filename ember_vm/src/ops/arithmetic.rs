//! Operator handlers.
//!
//! Binary operators pop the right operand, then the left. Numeric
//! dispatch follows the value core: integer space while both operands
//! are immediate integers, double space otherwise. `Add` additionally
//! concatenates strings (rendering a non-string other operand) and
//! arrays.

use crate::machine::Machine;
use crate::pretty::render_value;
use ember_bytecode::Opcode;
use ember_core::Value;

impl Machine {
    pub(crate) fn op_binary(&mut self, op: Opcode) {
        let right = self.pop_stack();
        let left = self.pop_stack();
        let result = match op {
            Opcode::Add => self.add_values(left, right),
            Opcode::Sub => left.sub(right),
            Opcode::Mul => left.mul(right),
            Opcode::Div => left.div(right),
            Opcode::Mod => left.modulo(right),
            Opcode::Pow => left.pow(right),
            Opcode::Eq => {
                Value::boolean(self.heap.with(|heap| heap.values_equal(left, right)))
            }
            Opcode::Neq => {
                Value::boolean(!self.heap.with(|heap| heap.values_equal(left, right)))
            }
            Opcode::Lt => Value::boolean(left.numeric_lt(right)),
            Opcode::Gt => Value::boolean(left.numeric_gt(right)),
            Opcode::Le => Value::boolean(left.numeric_le(right)),
            Opcode::Ge => Value::boolean(left.numeric_ge(right)),
            Opcode::Shl => left.shl(right),
            Opcode::Shr => left.shr(right),
            Opcode::BAnd => left.bitand(right),
            Opcode::BOr => left.bitor(right),
            Opcode::BXor => left.bitxor(right),
            _ => self.fatal("non-binary opcode in operator dispatch"),
        };
        self.push_stack(result);
    }

    pub(crate) fn op_unary(&mut self, op: Opcode) {
        let value = self.pop_stack();
        let result = match op {
            Opcode::UAdd => value.unary_plus(),
            Opcode::USub => value.unary_minus(),
            Opcode::UNot => Value::boolean(!self.heap.with(|heap| heap.truthy(value))),
            Opcode::UBNot => value.bitwise_not(),
            _ => self.fatal("non-unary opcode in operator dispatch"),
        };
        self.push_stack(result);
    }

    /// `Add` with the concatenation cases.
    fn add_values(&mut self, left: Value, right: Value) -> Value {
        let symbols = &self.symbols;
        self.heap.with(|heap| {
            let left_string = heap.is_string(left);
            let right_string = heap.is_string(right);
            if left_string || right_string {
                let mut bytes = if left_string {
                    heap.string_bytes(left).unwrap_or_default()
                } else {
                    render_value(heap, symbols, left).into_bytes()
                };
                if right_string {
                    bytes.extend(heap.string_bytes(right).unwrap_or_default());
                } else {
                    bytes.extend(render_value(heap, symbols, right).into_bytes());
                }
                return heap.create_string(&bytes);
            }

            if let (Some(a), Some(b)) = (heap.array(left), heap.array(right)) {
                let mut elements = a.elements.clone();
                elements.extend(b.elements.iter().copied());
                return heap.create_array(elements);
            }

            left.add(right)
        })
    }
}
