//! Member and index access.
//!
//! Symbol lookup on an object falls through its class's prototype
//! chain; lookup on a non-object consults the primitive class for the
//! value's type. Reading a member that does not exist yields null and
//! never faults. Writes go directly into the target's own container.

use crate::machine::Machine;
use ember_core::{symbol_hash, utf8_codepoint_range, Value};
use ember_gc::{Heap, HeapTag};

impl Machine {
    pub(crate) fn op_readmembersymbol(&mut self) {
        let symbol = Value::from_bits(self.operand_u64(1));
        let target = self.pop_stack();
        let value = self.resolve_member_symbol(target, symbol);
        self.push_stack(value.unwrap_or(Value::NULL));
    }

    pub(crate) fn op_setmembersymbol(&mut self, push: bool) {
        let symbol = Value::from_bits(self.operand_u64(1));
        let value = self.pop_stack();
        let target = self.pop_stack();
        self.write_member_symbol(target, symbol, value);
        if push {
            self.push_stack(value);
        }
    }

    pub(crate) fn op_readmembervalue(&mut self) {
        let key = self.pop_stack();
        let target = self.pop_stack();
        let value = self.resolve_member_value(target, key);
        self.push_stack(value.unwrap_or(Value::NULL));
    }

    pub(crate) fn op_setmembervalue(&mut self, push: bool) {
        let value = self.pop_stack();
        let key = self.pop_stack();
        let target = self.pop_stack();

        if key.is_number() {
            let index = key.to_i64();
            self.heap.with(|heap| {
                if let Some(array) = heap.array_mut(target) {
                    if index >= 0 {
                        let index = index as usize;
                        if index < array.elements.len() {
                            array.elements[index] = value;
                        } else if index == array.elements.len() {
                            array.elements.push(value);
                        }
                    }
                }
            });
        } else if let Some(symbol) = self.symbolize_key(key) {
            self.write_member_symbol(target, symbol, value);
        }

        if push {
            self.push_stack(value);
        }
    }

    pub(crate) fn op_readarrayindex(&mut self) {
        let index = self.operand_u32(1) as usize;
        let target = self.pop_stack();
        let value = self
            .heap
            .with(|heap| heap.array(target)?.elements.get(index).copied());
        self.push_stack(value.unwrap_or(Value::NULL));
    }

    pub(crate) fn op_setarrayindex(&mut self, push: bool) {
        let index = self.operand_u32(1) as usize;
        let value = self.pop_stack();
        let target = self.pop_stack();
        self.heap.with(|heap| {
            if let Some(array) = heap.array_mut(target) {
                if index < array.elements.len() {
                    array.elements[index] = value;
                } else if index == array.elements.len() {
                    array.elements.push(value);
                }
            }
        });
        if push {
            self.push_stack(value);
        }
    }

    // =========================================================================
    // Super resolution
    // =========================================================================

    /// Parent class of the executing function's host class (not of the
    /// runtime class of `self`).
    fn super_class(&self) -> Value {
        let function = self.current_function();
        self.heap
            .with(|heap| {
                let host_class = heap.function(function)?.host_class;
                Some(heap.class(host_class)?.parent_class)
            })
            .unwrap_or(Value::NULL)
    }

    pub(crate) fn op_putsuper(&mut self) {
        let parent = self.super_class();
        self.push_stack(parent);
    }

    pub(crate) fn op_putsupermember(&mut self) {
        let symbol = Value::from_bits(self.operand_u64(1));
        let parent = self.super_class();
        let method = self
            .heap
            .with(|heap| prototype_chain_lookup(heap, parent, symbol));
        self.push_stack(method.unwrap_or(Value::NULL));
    }

    // =========================================================================
    // Resolution helpers
    // =========================================================================

    /// Full symbol resolution including the primitive-class fallback.
    pub(crate) fn resolve_member_symbol(&self, target: Value, symbol: Value) -> Option<Value> {
        let primitives = self.primitives;
        let length_symbol = self.well_known.length;
        self.heap.with(|heap| {
            if symbol == length_symbol {
                if let Some(len) = heap.string_len(target) {
                    return Some(Value::number_from_i64(len as i64));
                }
                if let Some(array) = heap.array(target) {
                    return Some(Value::number_from_i64(array.elements.len() as i64));
                }
            }

            match heap.tag_of(target) {
                Some(HeapTag::Object) => {
                    let object = heap.object(target)?;
                    if let Some(&value) = object.container.get(&symbol) {
                        return Some(value);
                    }
                    prototype_chain_lookup(heap, object.class, symbol)
                }
                Some(HeapTag::Class) => {
                    let mut class = target;
                    while let Some(data) = heap.class(class) {
                        if let Some(&value) = data.container.get(&symbol) {
                            return Some(value);
                        }
                        class = data.parent_class;
                    }
                    None
                }
                Some(HeapTag::Function) => heap
                    .function(target)?
                    .container
                    .get(&symbol)
                    .copied()
                    .or_else(|| prototype_chain_lookup(heap, primitives.function, symbol)),
                Some(HeapTag::CFunction) => heap
                    .cfunction(target)?
                    .container
                    .get(&symbol)
                    .copied()
                    .or_else(|| prototype_chain_lookup(heap, primitives.function, symbol)),
                Some(HeapTag::Generator) => heap
                    .generator(target)?
                    .container
                    .get(&symbol)
                    .copied()
                    .or_else(|| prototype_chain_lookup(heap, primitives.generator, symbol)),
                _ => {
                    let class = primitive_class_for(heap, &primitives, target);
                    prototype_chain_lookup(heap, class, symbol)
                }
            }
        })
    }

    fn resolve_member_value(&self, target: Value, key: Value) -> Option<Value> {
        if key.is_number() {
            let index = key.to_i64();
            if index < 0 {
                return None;
            }
            let indexed = self.heap.with(|heap| {
                if let Some(array) = heap.array(target) {
                    return Some(array.elements.get(index as usize).copied());
                }
                if let Some(bytes) = heap.string_bytes(target) {
                    let slice = utf8_codepoint_range(&bytes, index as usize)
                        .map(|(start, end)| bytes[start..end].to_vec());
                    return Some(slice.map(|bytes| heap.create_string(&bytes)));
                }
                None
            });
            if let Some(result) = indexed {
                return result;
            }
        }
        let symbol = self.symbolize_key(key)?;
        self.resolve_member_symbol(target, symbol)
    }

    /// Writes always target the value's own container; arrays and
    /// immediates ignore symbol writes.
    fn write_member_symbol(&mut self, target: Value, symbol: Value, value: Value) {
        self.heap.with(|heap| match heap.tag_of(target) {
            Some(HeapTag::Object) => {
                if let Some(object) = heap.object_mut(target) {
                    object.container.insert(symbol, value);
                }
            }
            Some(HeapTag::Class) => {
                if let Some(class) = heap.class_mut(target) {
                    class.container.insert(symbol, value);
                }
            }
            Some(HeapTag::Function) => {
                if let Some(function) = heap.function_mut(target) {
                    function.container.insert(symbol, value);
                }
            }
            Some(HeapTag::CFunction) => {
                if let Some(cfunction) = heap.cfunction_mut(target) {
                    cfunction.container.insert(symbol, value);
                }
            }
            Some(HeapTag::Generator) => {
                if let Some(generator) = heap.generator_mut(target) {
                    generator.container.insert(symbol, value);
                }
            }
            _ => {}
        });
    }

    /// Symbols pass through; strings hash to their symbol.
    fn symbolize_key(&self, key: Value) -> Option<Value> {
        if key.is_symbol() {
            return Some(key);
        }
        let bytes = self.heap.with(|heap| heap.string_bytes(key))?;
        Some(Value::symbol_from_raw(symbol_hash(&bytes)))
    }
}

/// Walk a class chain looking `symbol` up in each prototype container.
pub(crate) fn prototype_chain_lookup(heap: &Heap, start: Value, symbol: Value) -> Option<Value> {
    let mut class = start;
    while let Some(data) = heap.class(class) {
        if let Some(prototype) = heap.object(data.prototype) {
            if let Some(&value) = prototype.container.get(&symbol) {
                return Some(value);
            }
        }
        class = data.parent_class;
    }
    None
}

/// The primitive class consulted for a non-object receiver.
fn primitive_class_for(
    heap: &Heap,
    primitives: &crate::machine::Primitives,
    value: Value,
) -> Value {
    if value.is_number() {
        return primitives.number;
    }
    if value.is_boolean() {
        return primitives.boolean;
    }
    if value.is_null() {
        return primitives.null;
    }
    if value.is_immediate_string() {
        return primitives.string;
    }
    match heap.tag_of(value) {
        Some(HeapTag::String) => primitives.string,
        Some(HeapTag::Array) => primitives.array,
        Some(HeapTag::Class) => primitives.class,
        Some(HeapTag::Function) | Some(HeapTag::CFunction) => primitives.function,
        Some(HeapTag::Generator) => primitives.generator,
        _ => primitives.value,
    }
}
