//! Value rendering for `print` and diagnostics.

use ember_core::{SymbolTable, Value};
use ember_gc::{CellData, Heap};

const MAX_DEPTH: usize = 4;

/// Render a value the way `print` shows it. Containers render shallowly
/// past [`MAX_DEPTH`] to keep cyclic structures printable.
pub fn render_value(heap: &Heap, symbols: &SymbolTable, value: Value) -> String {
    render(heap, symbols, value, 0)
}

fn render(heap: &Heap, symbols: &SymbolTable, value: Value, depth: usize) -> String {
    if value.is_int() {
        return value.as_i64().to_string();
    }
    if value.is_double() {
        return render_double(value.as_f64());
    }
    if value.is_boolean() {
        return (value == Value::TRUE).to_string();
    }
    if value.is_null() {
        return "null".to_string();
    }
    if value.is_symbol() {
        return symbols.describe(value);
    }
    if let Some((buf, len)) = value.immediate_string_bytes() {
        return String::from_utf8_lossy(&buf[..len]).into_owned();
    }

    match heap.get(value) {
        None => "null".to_string(),
        Some(CellData::Str(s)) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
        Some(CellData::Array(array)) => {
            if depth >= MAX_DEPTH {
                return "[...]".to_string();
            }
            let items: Vec<String> = array
                .elements
                .iter()
                .map(|&item| render(heap, symbols, item, depth + 1))
                .collect();
            format!("[{}]", items.join(", "))
        }
        Some(CellData::Object(object)) => {
            if depth >= MAX_DEPTH {
                return "{...}".to_string();
            }
            let mut entries: Vec<String> = object
                .container
                .iter()
                .map(|(&key, &item)| {
                    format!(
                        "{}: {}",
                        symbols.describe(key),
                        render(heap, symbols, item, depth + 1)
                    )
                })
                .collect();
            entries.sort();
            format!("{{{}}}", entries.join(", "))
        }
        Some(CellData::Function(function)) => {
            format!("<function {}>", symbols.describe(function.name))
        }
        Some(CellData::CFunction(cfunction)) => {
            format!("<cfunction {}>", symbols.describe(cfunction.name))
        }
        Some(CellData::Generator(generator)) => {
            format!("<generator {}>", symbols.describe(generator.name))
        }
        Some(CellData::Class(class)) => format!("<class {}>", symbols.describe(class.name)),
        Some(CellData::Frame(_)) => "<frame>".to_string(),
        Some(CellData::CatchTable(_)) => "<catchtable>".to_string(),
        Some(CellData::CPointer(_)) => "<cpointer>".to_string(),
        Some(CellData::Free { .. }) => "null".to_string(),
    }
}

/// Integral doubles print without a fractional part; everything else
/// uses the shortest round-trip form.
fn render_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gc::GcConfig;

    #[test]
    fn test_render_numbers() {
        let heap = Heap::new(GcConfig::low_memory());
        let symbols = SymbolTable::new();
        assert_eq!(render_value(&heap, &symbols, Value::int(42)), "42");
        assert_eq!(render_value(&heap, &symbols, Value::from_f64(2.5)), "2.5");
        assert_eq!(
            render_value(&heap, &symbols, Value::from_f64(2f64.powi(41))),
            "2199023255552"
        );
        assert_eq!(render_value(&heap, &symbols, Value::NAN), "NaN");
    }

    #[test]
    fn test_render_strings_and_arrays() {
        let mut heap = Heap::new(GcConfig::low_memory());
        let symbols = SymbolTable::new();
        let s = heap.create_string(b"oops");
        assert_eq!(render_value(&heap, &symbols, s), "oops");
        let array = heap.create_array(vec![Value::int(1), s]);
        assert_eq!(render_value(&heap, &symbols, array), "[1, oops]");
    }

    #[test]
    fn test_render_cyclic_array_terminates() {
        let mut heap = Heap::new(GcConfig::low_memory());
        let symbols = SymbolTable::new();
        let array = heap.create_array(vec![]);
        heap.array_mut(array).unwrap().elements.push(array);
        let rendered = render_value(&heap, &symbols, array);
        assert!(rendered.contains("[...]"));
    }
}
