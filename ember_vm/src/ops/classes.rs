//! Class assembly and instantiation.
//!
//! `PutClass` consumes its stack operands pushed bottom-to-top as:
//! member-property symbols, static-property symbols, methods, static
//! methods, the constructor (when flagged), the parent class (when
//! flagged). Methods keep a back-reference to the class they were
//! defined in, which is what `PutSuperMember` resolves against.

use crate::machine::Machine;
use ember_bytecode::PutClassFlags;
use ember_core::{RuntimeErrorKind, Value};
use ember_gc::HeapTag;

impl Machine {
    pub(crate) fn op_putclass(&mut self) {
        let name = Value::from_bits(self.operand_u64(1));
        let propertycount = self.operand_u32(9) as usize;
        let staticpropertycount = self.operand_u32(13) as usize;
        let methodcount = self.operand_u32(17) as usize;
        let staticmethodcount = self.operand_u32(21) as usize;
        let flags = PutClassFlags::from_bits_truncate(self.operand_u8(25));

        let parent = if flags.contains(PutClassFlags::HAS_PARENT) {
            let parent = self.pop_stack();
            if self.heap.with(|heap| heap.tag_of(parent)) != Some(HeapTag::Class) {
                self.throw_internal(
                    RuntimeErrorKind::InvalidArgument,
                    "class parent is not a class",
                );
                return;
            }
            parent
        } else {
            Value::NULL
        };
        let constructor = if flags.contains(PutClassFlags::HAS_CONSTRUCTOR) {
            self.pop_stack()
        } else {
            Value::NULL
        };

        let mut static_methods = Vec::with_capacity(staticmethodcount);
        for _ in 0..staticmethodcount {
            static_methods.push(self.pop_stack());
        }
        let mut methods = Vec::with_capacity(methodcount);
        for _ in 0..methodcount {
            methods.push(self.pop_stack());
        }
        let mut static_properties = Vec::with_capacity(staticpropertycount);
        for _ in 0..staticpropertycount {
            static_properties.push(self.pop_stack());
        }
        let mut member_properties = Vec::with_capacity(propertycount);
        for _ in 0..propertycount {
            member_properties.push(self.pop_stack());
        }

        let class = self.heap.with(|heap| {
            let class = heap.create_class(name);
            let prototype = heap.create_object(Value::NULL);

            for &method in &methods {
                let method_name = match heap.function(method) {
                    Some(function) => function.name,
                    None => continue,
                };
                if let Some(function) = heap.function_mut(method) {
                    function.host_class = class;
                }
                if let Some(proto) = heap.object_mut(prototype) {
                    proto.container.insert(method_name, method);
                }
            }

            {
                let data = heap.class_mut(class).expect("just created");
                data.prototype = prototype;
                data.parent_class = parent;
                data.member_properties
                    .extend(member_properties.iter().rev().copied());
            }

            for &symbol in static_properties.iter().rev() {
                if let Some(data) = heap.class_mut(class) {
                    data.container.insert(symbol, Value::NULL);
                }
            }
            for &method in &static_methods {
                let method_name = match heap.function(method) {
                    Some(function) => function.name,
                    None => continue,
                };
                if let Some(function) = heap.function_mut(method) {
                    function.host_class = class;
                }
                if let Some(data) = heap.class_mut(class) {
                    data.container.insert(method_name, method);
                }
            }

            if constructor != Value::NULL {
                if let Some(function) = heap.function_mut(constructor) {
                    function.host_class = class;
                }
                heap.class_mut(class).expect("just created").constructor = constructor;
            }

            class
        });

        self.push_stack(class);
    }

    /// Instantiate `class`: allocate the object with every member
    /// property along the parent chain pre-installed as null, then run
    /// the first constructor found walking up the chain with the new
    /// object bound as self. The object ends up on the stack either way.
    pub(crate) fn call_class(&mut self, class: Value, args: &[Value], next_ip: usize) {
        let (object, constructor) = self.heap.with(|heap| {
            let mut properties = Vec::new();
            let mut constructor = Value::NULL;
            let mut cursor = class;
            while let Some(data) = heap.class(cursor) {
                properties.extend(data.member_properties.iter().copied());
                if constructor == Value::NULL && data.constructor != Value::NULL {
                    constructor = data.constructor;
                }
                cursor = data.parent_class;
            }

            let object = heap.create_object(class);
            let container = &mut heap.object_mut(object).expect("just created").container;
            for symbol in properties {
                container.insert(symbol, Value::NULL);
            }
            (object, constructor)
        });

        if constructor == Value::NULL {
            self.push_stack(object);
        } else {
            // return_self: the constructor's own return value is
            // discarded and the new object is pushed instead.
            self.call_function(constructor, args, Some(object), next_ip, false, true, Value::NULL);
        }
    }

}
