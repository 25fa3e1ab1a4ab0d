//! Symbols and the runtime-scoped symbol registry.
//!
//! A symbol is a 48-bit CRC32-derived hash of a byte string, packed into
//! the symbol signature of a [`Value`]. The registry keeps the original
//! text so diagnostics can recover it; 48-bit collisions are assumed
//! absent for realistic programs and are not defended against.
//!
//! The table is an explicit collaborator owned by the runtime that
//! created it, so several runtimes can coexist in one process.

use crate::value::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

// =============================================================================
// Compile-time CRC32
// =============================================================================

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xedb8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC32_TABLE: [u32; 256] = crc32_table();

/// CRC32 (IEEE polynomial) of a byte string, usable in const contexts so
/// symbol hashes of literals can be computed at compile time.
pub const fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    let mut i = 0;
    while i < bytes.len() {
        crc = (crc >> 8) ^ CRC32_TABLE[((crc ^ bytes[i] as u32) & 0xff) as usize];
        i += 1;
    }
    !crc
}

/// 48-bit symbol hash: CRC32 in the low 32 bits, the byte length
/// (mod 2^16) above it.
pub const fn symbol_hash(bytes: &[u8]) -> u64 {
    crc32(bytes) as u64 | ((bytes.len() as u64 & 0xffff) << 32)
}

/// Encode a symbol value for a byte string, without registering it.
pub const fn symbol_value(bytes: &[u8]) -> Value {
    Value::symbol_from_raw(symbol_hash(bytes))
}

// =============================================================================
// Symbol table
// =============================================================================

/// Reverse mapping from symbol hashes to their source text.
///
/// Interning is idempotent; lookups of never-interned hashes return
/// `None`, which callers render as an opaque hex symbol.
#[derive(Default)]
pub struct SymbolTable {
    entries: RwLock<FxHashMap<u64, Box<str>>>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string and return its symbol value.
    pub fn intern(&self, text: &str) -> Value {
        let hash = symbol_hash(text.as_bytes());
        self.entries
            .write()
            .entry(hash)
            .or_insert_with(|| text.into());
        Value::symbol_from_raw(hash)
    }

    /// Recover the text of a symbol, if it was interned here.
    pub fn lookup(&self, symbol: Value) -> Option<String> {
        if !symbol.is_symbol() {
            return None;
        }
        self.entries
            .read()
            .get(&symbol.as_symbol_raw())
            .map(|s| s.to_string())
    }

    /// Render a symbol for diagnostics: the interned text, or the raw
    /// hash when the text is unknown.
    pub fn describe(&self, symbol: Value) -> String {
        self.lookup(symbol)
            .unwrap_or_else(|| format!("<sym:{:012x}>", symbol.as_symbol_raw()))
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_vectors() {
        assert_eq!(crc32(b""), 0x0000_0000);
        assert_eq!(crc32(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn test_symbol_hash_is_deterministic() {
        let a = symbol_hash(b"length");
        let b = symbol_hash(b"length");
        assert_eq!(a, b);
        assert_ne!(symbol_hash(b"length"), symbol_hash(b"lengtH"));
    }

    #[test]
    fn test_const_hash_matches_runtime_hash() {
        const NAME: u64 = symbol_hash(b"constructor");
        assert_eq!(NAME, symbol_hash(b"constructor"));
    }

    #[test]
    fn test_intern_and_lookup() {
        let table = SymbolTable::new();
        let sym = table.intern("greeting");
        assert!(sym.is_symbol());
        assert_eq!(table.lookup(sym).as_deref(), Some("greeting"));
        assert_eq!(table.intern("greeting"), sym);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_symbol() {
        let table = SymbolTable::new();
        let sym = Value::symbol_from_raw(0x1234);
        assert_eq!(table.lookup(sym), None);
        assert!(table.describe(sym).contains("1234"));
    }
}
