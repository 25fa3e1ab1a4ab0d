//! NaN-boxed value representation.
//!
//! Every Ember value is a single 64-bit word. Finite doubles are stored
//! verbatim; everything else lives inside the payload of a quiet NaN,
//! discriminated by the high 16 signature bits:
//!
//! ```text
//! S[Exponent---][Q TTT Payload------------------------------------]
//!
//! 000  canonical NaN          100  48-bit signed integer
//! 001  false                  101  48-bit symbol hash
//! 010  true                   110  packed string (exactly 6 bytes)
//! 011  null                   111  immediate string (0-5 bytes + length)
//!
//! sign bit set: heap reference (payload = 48-bit cell index)
//! ```
//!
//! All bit casts are confined to this module; the rest of the runtime
//! only sees the constructor/predicate/projection API.

// =============================================================================
// Bit masks and signatures
// =============================================================================

/// Sign bit.
pub const MASK_SIGN: u64 = 0x8000_0000_0000_0000;
/// Exponent bits of an IEEE-754 double.
pub const MASK_EXPONENT: u64 = 0x7ff0_0000_0000_0000;
/// Quiet bit (highest mantissa bit).
pub const MASK_QUIET: u64 = 0x0008_0000_0000_0000;
/// Three type bits below the quiet bit.
pub const MASK_TYPE: u64 = 0x0007_0000_0000_0000;
/// Full 16-bit signature.
pub const MASK_SIGNATURE: u64 = 0xffff_0000_0000_0000;
/// Low 48 payload bits.
pub const MASK_PAYLOAD: u64 = 0x0000_ffff_ffff_ffff;
/// Sign bit of a 48-bit immediate integer.
const MASK_INT_SIGN: u64 = 0x0000_8000_0000_0000;
/// High 16 bits used to sign-extend a 48-bit integer.
const SIGN_BLOCK: u64 = 0xffff_0000_0000_0000;

const TYPE_NAN: u64 = 0x0000_0000_0000_0000;
const TYPE_FALSE: u64 = 0x0001_0000_0000_0000;
const TYPE_TRUE: u64 = 0x0002_0000_0000_0000;
const TYPE_NULL: u64 = 0x0003_0000_0000_0000;
const TYPE_INTEGER: u64 = 0x0004_0000_0000_0000;
const TYPE_SYMBOL: u64 = 0x0005_0000_0000_0000;
const TYPE_PSTRING: u64 = 0x0006_0000_0000_0000;
const TYPE_ISTRING: u64 = 0x0007_0000_0000_0000;

/// Bit pattern of the canonical quiet NaN.
pub const BITS_NAN: u64 = MASK_EXPONENT | MASK_QUIET;

const SIG_POINTER: u64 = MASK_SIGN | BITS_NAN;
const SIG_INTEGER: u64 = BITS_NAN | TYPE_INTEGER;
const SIG_SYMBOL: u64 = BITS_NAN | TYPE_SYMBOL;
const SIG_PSTRING: u64 = BITS_NAN | TYPE_PSTRING;
const SIG_ISTRING: u64 = BITS_NAN | TYPE_ISTRING;

/// Largest immediate integer.
pub const MAX_INT: i64 = (1 << 47) - 1;
/// Smallest immediate integer.
pub const MIN_INT: i64 = -(1 << 47);

/// Maximum byte length of an immediate string.
pub const ISTRING_MAX: usize = 5;
/// Exact byte length of a packed string.
pub const PSTRING_LEN: usize = 6;

// =============================================================================
// Value
// =============================================================================

/// A NaN-boxed Ember value.
///
/// `PartialEq`/`Eq`/`Hash` compare raw bits, which is the identity used
/// for symbol-keyed containers. Language-level equality lives in
/// [`Value::numeric_eq`] and the VM's polymorphic equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

impl Default for Value {
    /// Defaults to [`Value::NULL`].
    #[inline]
    fn default() -> Value {
        Value::NULL
    }
}

impl Value {
    /// The `false` value.
    pub const FALSE: Value = Value(BITS_NAN | TYPE_FALSE);
    /// The `true` value.
    pub const TRUE: Value = Value(BITS_NAN | TYPE_TRUE);
    /// The `null` value.
    pub const NULL: Value = Value(BITS_NAN | TYPE_NULL);
    /// The canonical NaN.
    pub const NAN: Value = Value(BITS_NAN);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Reconstruct a value from raw bits (bytecode immediates).
    #[inline]
    pub const fn from_bits(bits: u64) -> Value {
        Value(bits)
    }

    /// Raw bit pattern.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Encode a double. Every NaN input collapses to the canonical NaN so
    /// that no payload pattern can masquerade as a tagged value.
    #[inline]
    pub fn from_f64(v: f64) -> Value {
        if v.is_nan() {
            Value::NAN
        } else {
            Value(v.to_bits())
        }
    }

    /// Encode an in-range immediate integer.
    ///
    /// Callers that cannot guarantee the range use [`Value::number_from_i64`].
    #[inline]
    pub fn int(v: i64) -> Value {
        debug_assert!((MIN_INT..=MAX_INT).contains(&v));
        Value(SIG_INTEGER | (v as u64 & MASK_PAYLOAD))
    }

    /// Encode an integer, promoting to double when it falls outside the
    /// 48-bit immediate range.
    #[inline]
    pub fn number_from_i64(v: i64) -> Value {
        if v > MAX_INT || v < MIN_INT {
            Value::from_f64(v as f64)
        } else {
            Value::int(v)
        }
    }

    /// Encode a double (alias of [`Value::from_f64`], named for symmetry).
    #[inline]
    pub fn number_from_f64(v: f64) -> Value {
        Value::from_f64(v)
    }

    /// Encode a boolean.
    #[inline]
    pub const fn boolean(v: bool) -> Value {
        if v {
            Value::TRUE
        } else {
            Value::FALSE
        }
    }

    /// Encode a symbol from its 48-bit hash.
    #[inline]
    pub const fn symbol_from_raw(hash: u64) -> Value {
        Value(SIG_SYMBOL | (hash & MASK_PAYLOAD))
    }

    /// Encode a heap reference from a cell index.
    #[inline]
    pub fn heap_ref(index: u64) -> Value {
        debug_assert!(index <= MASK_PAYLOAD);
        Value(SIG_POINTER | (index & MASK_PAYLOAD))
    }

    /// Encode an immediate string of at most 5 bytes.
    pub fn istring(bytes: &[u8]) -> Option<Value> {
        if bytes.len() > ISTRING_MAX {
            return None;
        }
        let mut bits = SIG_ISTRING;
        for (i, &b) in bytes.iter().enumerate() {
            bits |= (b as u64) << (8 * i);
        }
        bits |= (bytes.len() as u64) << 40;
        Some(Value(bits))
    }

    /// Encode a packed string of exactly 6 bytes.
    pub fn pstring(bytes: &[u8]) -> Option<Value> {
        if bytes.len() != PSTRING_LEN {
            return None;
        }
        let mut bits = SIG_PSTRING;
        for (i, &b) in bytes.iter().enumerate() {
            bits |= (b as u64) << (8 * i);
        }
        Some(Value(bits))
    }

    /// Encode a string of at most 6 bytes in the tightest immediate
    /// representation, or `None` if it needs heap storage.
    pub fn immediate_string(bytes: &[u8]) -> Option<Value> {
        match bytes.len() {
            0..=ISTRING_MAX => Value::istring(bytes),
            PSTRING_LEN => Value::pstring(bytes),
            _ => None,
        }
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// A double: exponent not all ones, quiet bit clear (infinities), or
    /// the canonical NaN itself.
    #[inline]
    pub const fn is_double(self) -> bool {
        (self.0 & MASK_EXPONENT) != MASK_EXPONENT
            || (self.0 & MASK_QUIET) == 0
            || self.0 == BITS_NAN
    }

    /// An immediate integer.
    #[inline]
    pub const fn is_int(self) -> bool {
        (self.0 & MASK_SIGNATURE) == SIG_INTEGER
    }

    /// Any number (integer or double).
    #[inline]
    pub const fn is_number(self) -> bool {
        self.is_int() || self.is_double()
    }

    /// `true` or `false`.
    #[inline]
    pub const fn is_boolean(self) -> bool {
        self.0 == Value::TRUE.0 || self.0 == Value::FALSE.0
    }

    /// The null value.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == Value::NULL.0
    }

    /// A symbol.
    #[inline]
    pub const fn is_symbol(self) -> bool {
        (self.0 & MASK_SIGNATURE) == SIG_SYMBOL
    }

    /// An immediate string (0-5 bytes).
    #[inline]
    pub const fn is_istring(self) -> bool {
        (self.0 & MASK_SIGNATURE) == SIG_ISTRING
    }

    /// A packed string (exactly 6 bytes).
    #[inline]
    pub const fn is_pstring(self) -> bool {
        (self.0 & MASK_SIGNATURE) == SIG_PSTRING
    }

    /// Either immediate string representation.
    #[inline]
    pub const fn is_immediate_string(self) -> bool {
        self.is_istring() || self.is_pstring()
    }

    /// A heap reference.
    #[inline]
    pub const fn is_heap_ref(self) -> bool {
        (self.0 & MASK_SIGNATURE) == SIG_POINTER
    }

    // =========================================================================
    // Projections
    // =========================================================================

    /// The double stored in this value. Caller checked [`Value::is_double`].
    #[inline]
    pub fn as_f64(self) -> f64 {
        debug_assert!(self.is_double());
        f64::from_bits(self.0)
    }

    /// The integer stored in this value, sign-extended from 48 bits.
    /// Caller checked [`Value::is_int`].
    #[inline]
    pub fn as_i64(self) -> i64 {
        debug_assert!(self.is_int());
        let payload = self.0 & MASK_PAYLOAD;
        if payload & MASK_INT_SIGN != 0 {
            (payload | SIGN_BLOCK) as i64
        } else {
            payload as i64
        }
    }

    /// The 48-bit symbol hash. Caller checked [`Value::is_symbol`].
    #[inline]
    pub fn as_symbol_raw(self) -> u64 {
        debug_assert!(self.is_symbol());
        self.0 & MASK_PAYLOAD
    }

    /// The heap cell index, or `None` if this is not a heap reference.
    #[inline]
    pub fn as_heap_index(self) -> Option<u64> {
        if self.is_heap_ref() {
            Some(self.0 & MASK_PAYLOAD)
        } else {
            None
        }
    }

    /// The bytes and length of an immediate string.
    pub fn immediate_string_bytes(self) -> Option<([u8; PSTRING_LEN], usize)> {
        let len = if self.is_pstring() {
            PSTRING_LEN
        } else if self.is_istring() {
            ((self.0 >> 40) & 0xff) as usize
        } else {
            return None;
        };
        let mut buf = [0u8; PSTRING_LEN];
        for (i, slot) in buf.iter_mut().enumerate().take(len) {
            *slot = ((self.0 >> (8 * i)) & 0xff) as u8;
        }
        Some((buf, len))
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Widen to double. Booleans and null widen to 1/0; anything
    /// non-numeric yields NaN.
    #[inline]
    pub fn to_f64(self) -> f64 {
        if self.is_int() {
            self.as_i64() as f64
        } else if self.is_double() {
            self.as_f64()
        } else if self.0 == Value::TRUE.0 {
            1.0
        } else if self.0 == Value::FALSE.0 || self.is_null() {
            0.0
        } else {
            f64::NAN
        }
    }

    /// Narrow to integer. Doubles truncate toward zero; infinities and
    /// NaN convert to 0; booleans and null convert to 1/0; anything
    /// non-numeric yields 0.
    #[inline]
    pub fn to_i64(self) -> i64 {
        if self.is_int() {
            self.as_i64()
        } else if self.is_double() {
            let d = self.as_f64();
            if d.is_finite() {
                d.trunc() as i64
            } else {
                0
            }
        } else if self.0 == Value::TRUE.0 {
            1
        } else {
            0
        }
    }

    /// Truncate to a signed 32-bit integer (bitwise operand contract).
    #[inline]
    pub fn to_i32(self) -> i32 {
        self.to_i64() as i32
    }

    /// Truthiness of immediate values: `false`, `null`, NaN and both
    /// numeric zeroes are false, every other immediate is true. Heap
    /// references return `None` (the VM decides; a finished generator is
    /// the one falsey heap value).
    #[inline]
    pub fn immediate_truthiness(self) -> Option<bool> {
        if self.is_heap_ref() {
            return None;
        }
        if self.0 == Value::FALSE.0 || self.is_null() || self.0 == BITS_NAN {
            return Some(false);
        }
        if self.is_int() {
            return Some(self.as_i64() != 0);
        }
        if self.is_double() {
            return Some(self.as_f64() != 0.0);
        }
        Some(true)
    }

    /// Human-readable type name for non-heap values.
    pub fn immediate_type_name(self) -> &'static str {
        if self.is_double() {
            "float"
        } else if self.is_int() {
            "integer"
        } else if self.is_null() {
            "null"
        } else if self.is_immediate_string() {
            "string"
        } else if self.is_boolean() {
            "boolean"
        } else if self.is_symbol() {
            "symbol"
        } else {
            "unknown"
        }
    }

    // =========================================================================
    // Arithmetic
    // =========================================================================

    /// Addition. Integer space when both operands are immediate integers,
    /// double space otherwise; out-of-range integer results promote.
    #[inline]
    pub fn add(self, rhs: Value) -> Value {
        if self.is_int() && rhs.is_int() {
            Value::number_from_i64(self.as_i64() + rhs.as_i64())
        } else {
            Value::from_f64(self.to_f64() + rhs.to_f64())
        }
    }

    /// Subtraction, with the same promotion rule as [`Value::add`].
    #[inline]
    pub fn sub(self, rhs: Value) -> Value {
        if self.is_int() && rhs.is_int() {
            Value::number_from_i64(self.as_i64() - rhs.as_i64())
        } else {
            Value::from_f64(self.to_f64() - rhs.to_f64())
        }
    }

    /// Multiplication. A product that overflows even 64-bit space is
    /// recomputed in doubles.
    #[inline]
    pub fn mul(self, rhs: Value) -> Value {
        if self.is_int() && rhs.is_int() {
            match self.as_i64().checked_mul(rhs.as_i64()) {
                Some(p) => Value::number_from_i64(p),
                None => Value::from_f64(self.as_i64() as f64 * rhs.as_i64() as f64),
            }
        } else {
            Value::from_f64(self.to_f64() * rhs.to_f64())
        }
    }

    /// Division always runs in double space.
    #[inline]
    pub fn div(self, rhs: Value) -> Value {
        Value::from_f64(self.to_f64() / rhs.to_f64())
    }

    /// Modulo. Integer remainder when both operands are integers; modulo
    /// by zero yields NaN in either space.
    #[inline]
    pub fn modulo(self, rhs: Value) -> Value {
        if self.is_int() && rhs.is_int() {
            let r = rhs.as_i64();
            if r == 0 {
                Value::NAN
            } else {
                Value::number_from_i64(self.as_i64() % r)
            }
        } else {
            Value::from_f64(self.to_f64() % rhs.to_f64())
        }
    }

    /// Exponentiation runs in double space and stays a double.
    #[inline]
    pub fn pow(self, rhs: Value) -> Value {
        Value::from_f64(self.to_f64().powf(rhs.to_f64()))
    }

    /// Unary plus is the identity on numbers, NaN elsewhere.
    #[inline]
    pub fn unary_plus(self) -> Value {
        if self.is_number() {
            self
        } else {
            Value::NAN
        }
    }

    /// Unary minus.
    #[inline]
    pub fn unary_minus(self) -> Value {
        if self.is_int() {
            Value::number_from_i64(-self.as_i64())
        } else if self.is_double() {
            Value::from_f64(-self.as_f64())
        } else {
            Value::NAN
        }
    }

    /// Bitwise complement on the 32-bit truncation.
    #[inline]
    pub fn bitwise_not(self) -> Value {
        Value::number_from_i64(!self.to_i32() as i64)
    }

    // =========================================================================
    // Bitwise and shifts (32-bit signed operand space)
    // =========================================================================

    /// Left shift. Negative shift amounts clamp to zero.
    #[inline]
    pub fn shl(self, rhs: Value) -> Value {
        let amount = rhs.to_i32().clamp(0, 31) as u32;
        Value::number_from_i64((self.to_i32() << amount) as i64)
    }

    /// Arithmetic right shift. Negative shift amounts clamp to zero.
    #[inline]
    pub fn shr(self, rhs: Value) -> Value {
        let amount = rhs.to_i32().clamp(0, 31) as u32;
        Value::number_from_i64((self.to_i32() >> amount) as i64)
    }

    /// Bitwise and.
    #[inline]
    pub fn bitand(self, rhs: Value) -> Value {
        Value::number_from_i64((self.to_i32() & rhs.to_i32()) as i64)
    }

    /// Bitwise or.
    #[inline]
    pub fn bitor(self, rhs: Value) -> Value {
        Value::number_from_i64((self.to_i32() | rhs.to_i32()) as i64)
    }

    /// Bitwise xor.
    #[inline]
    pub fn bitxor(self, rhs: Value) -> Value {
        Value::number_from_i64((self.to_i32() ^ rhs.to_i32()) as i64)
    }

    // =========================================================================
    // Comparison
    // =========================================================================

    /// Numeric equality: exact for integer pairs, IEEE equality once a
    /// double is involved (NaN compares unequal to everything).
    #[inline]
    pub fn numeric_eq(self, rhs: Value) -> bool {
        if self.is_int() && rhs.is_int() {
            self.as_i64() == rhs.as_i64()
        } else {
            self.to_f64() == rhs.to_f64()
        }
    }

    /// Numeric less-than; false when either side is NaN or non-numeric.
    #[inline]
    pub fn numeric_lt(self, rhs: Value) -> bool {
        if self.is_int() && rhs.is_int() {
            self.as_i64() < rhs.as_i64()
        } else {
            self.to_f64() < rhs.to_f64()
        }
    }

    /// Numeric greater-than.
    #[inline]
    pub fn numeric_gt(self, rhs: Value) -> bool {
        if self.is_int() && rhs.is_int() {
            self.as_i64() > rhs.as_i64()
        } else {
            self.to_f64() > rhs.to_f64()
        }
    }

    /// Numeric less-or-equal.
    #[inline]
    pub fn numeric_le(self, rhs: Value) -> bool {
        if self.is_int() && rhs.is_int() {
            self.as_i64() <= rhs.as_i64()
        } else {
            self.to_f64() <= rhs.to_f64()
        }
    }

    /// Numeric greater-or-equal.
    #[inline]
    pub fn numeric_ge(self, rhs: Value) -> bool {
        if self.is_int() && rhs.is_int() {
            self.as_i64() >= rhs.as_i64()
        } else {
            self.to_f64() >= rhs.to_f64()
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_heap_ref() {
            write!(f, "Value(heap:{})", self.0 & MASK_PAYLOAD)
        } else if self.is_int() {
            write!(f, "Value(int:{})", self.as_i64())
        } else if self.is_double() {
            write!(f, "Value(float:{})", self.as_f64())
        } else if self.is_symbol() {
            write!(f, "Value(sym:{:012x})", self.as_symbol_raw())
        } else if let Some((buf, len)) = self.immediate_string_bytes() {
            write!(f, "Value(str:{:?})", String::from_utf8_lossy(&buf[..len]))
        } else if self.is_boolean() {
            write!(f, "Value({})", self.0 == Value::TRUE.0)
        } else {
            write!(f, "Value(null)")
        }
    }
}

// =============================================================================
// String parsing and indexing helpers
// =============================================================================

/// Base-aware integer parsing: optional sign, optional `0x`/`0o`/`0b`
/// prefix, surrounding whitespace ignored. Returns 0 when nothing parses.
pub fn parse_int(text: &str) -> i64 {
    let trimmed = text.trim();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (base, digits) = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        (16, hex)
    } else if let Some(oct) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
        (8, oct)
    } else if let Some(bin) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        (2, bin)
    } else {
        (10, rest)
    };
    match i64::from_str_radix(digits, base) {
        Ok(v) if negative => -v,
        Ok(v) => v,
        Err(_) => 0,
    }
}

/// Floating-point parsing; NaN when nothing parses.
pub fn parse_float(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Byte range of the UTF-8 code point at `index`, or `None` when the
/// index is past the last code point. Operates on raw bytes; malformed
/// sequences advance one byte at a time.
pub fn utf8_codepoint_range(bytes: &[u8], index: usize) -> Option<(usize, usize)> {
    let mut offset = 0;
    let mut seen = 0;
    while offset < bytes.len() {
        let width = match bytes[offset] {
            b if b < 0x80 => 1,
            b if b & 0xe0 == 0xc0 => 2,
            b if b & 0xf0 == 0xe0 => 3,
            b if b & 0xf8 == 0xf0 => 4,
            _ => 1,
        };
        let end = (offset + width).min(bytes.len());
        if seen == index {
            return Some((offset, end));
        }
        seen += 1;
        offset = end;
    }
    None
}

/// Number of UTF-8 code points in a byte string.
pub fn utf8_codepoint_count(bytes: &[u8]) -> usize {
    let mut offset = 0;
    let mut count = 0;
    while offset < bytes.len() {
        let width = match bytes[offset] {
            b if b < 0x80 => 1,
            b if b & 0xe0 == 0xc0 => 2,
            b if b & 0xf0 == 0xe0 => 3,
            b if b & 0xf8 == 0xf0 => 4,
            _ => 1,
        };
        offset = (offset + width).min(bytes.len());
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_roundtrip() {
        for v in [0.0, -0.0, 1.5, -1.5, 1e308, -1e308, f64::MIN_POSITIVE] {
            let boxed = Value::from_f64(v);
            assert!(boxed.is_double());
            assert_eq!(boxed.as_f64().to_bits(), v.to_bits());
        }
    }

    #[test]
    fn test_nan_is_canonical() {
        let weird_nan = f64::from_bits(0x7ff8_dead_beef_0001);
        assert_eq!(Value::from_f64(weird_nan).bits(), BITS_NAN);
        assert!(Value::NAN.is_double());
        assert!(Value::NAN.as_f64().is_nan());
    }

    #[test]
    fn test_infinity_is_double() {
        let inf = Value::from_f64(f64::INFINITY);
        assert!(inf.is_double());
        assert_eq!(inf.as_f64(), f64::INFINITY);
        assert_eq!(Value::from_f64(f64::NEG_INFINITY).as_f64(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_singleton_encodings() {
        assert_ne!(Value::TRUE.bits(), Value::FALSE.bits());
        assert_ne!(Value::NULL.bits(), Value::NAN.bits());
        assert!(!Value::TRUE.is_double());
        assert!(!Value::NULL.is_number());
    }

    #[test]
    fn test_integer_roundtrip() {
        for v in [0i64, 1, -1, 42, -42, MAX_INT, MIN_INT] {
            let boxed = Value::int(v);
            assert!(boxed.is_int());
            assert_eq!(boxed.as_i64(), v);
        }
    }

    #[test]
    fn test_int_double_roundtrip() {
        // Invariant: in-range integers survive a double round-trip.
        for v in [0i64, 7, -7, MAX_INT, MIN_INT] {
            let d = Value::int(v).to_f64();
            assert_eq!(Value::from_f64(d).to_i64(), v);
        }
    }

    #[test]
    fn test_number_promotion() {
        assert!(Value::number_from_i64(MAX_INT).is_int());
        assert!(Value::number_from_i64(MAX_INT + 1).is_double());
        assert!(Value::number_from_i64(MIN_INT).is_int());
        assert!(Value::number_from_i64(MIN_INT - 1).is_double());
    }

    #[test]
    fn test_add_overflow_promotes() {
        let big = Value::int(MAX_INT);
        let sum = big.add(Value::int(1));
        assert!(sum.is_double());
        assert_eq!(sum.as_f64(), (MAX_INT + 1) as f64);
    }

    #[test]
    fn test_mul_overflow_promotes() {
        let big = Value::int(1 << 40);
        let product = big.mul(big);
        assert!(product.is_double());
        assert_eq!(product.as_f64(), 2f64.powi(80));
    }

    #[test]
    fn test_division_is_double() {
        let q = Value::int(6).div(Value::int(3));
        assert!(q.is_double());
        assert_eq!(q.as_f64(), 2.0);
        assert!(Value::int(1).div(Value::int(0)).as_f64().is_infinite());
    }

    #[test]
    fn test_modulo_by_zero_is_nan() {
        assert!(Value::int(5).modulo(Value::int(0)).as_f64().is_nan());
        assert!(Value::from_f64(5.0).modulo(Value::from_f64(0.0)).as_f64().is_nan());
        assert_eq!(Value::int(7).modulo(Value::int(3)).as_i64(), 1);
    }

    #[test]
    fn test_pow_is_double() {
        let p = Value::int(2).pow(Value::int(40));
        assert!(p.is_double());
        assert_eq!(p.as_f64(), 2f64.powi(40));
    }

    #[test]
    fn test_shift_clamping() {
        assert_eq!(Value::int(1).shl(Value::int(-5)).as_i64(), 1);
        assert_eq!(Value::int(8).shr(Value::int(-1)).as_i64(), 8);
        assert_eq!(Value::int(1).shl(Value::int(4)).as_i64(), 16);
    }

    #[test]
    fn test_bitwise_truncates_to_32_bits() {
        let wide = Value::number_from_i64(0x1_0000_0001);
        assert_eq!(wide.bitand(Value::int(-1)).as_i64(), 1);
        assert_eq!(Value::int(0b1100).bitxor(Value::int(0b1010)).as_i64(), 0b0110);
    }

    #[test]
    fn test_conversion_truncates_toward_zero() {
        assert_eq!(Value::from_f64(2.9).to_i64(), 2);
        assert_eq!(Value::from_f64(-2.9).to_i64(), -2);
        assert_eq!(Value::from_f64(f64::INFINITY).to_i64(), 0);
        assert_eq!(Value::NAN.to_i64(), 0);
        assert_eq!(Value::TRUE.to_i64(), 1);
        assert_eq!(Value::NULL.to_i64(), 0);
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(Value::FALSE.immediate_truthiness(), Some(false));
        assert_eq!(Value::NULL.immediate_truthiness(), Some(false));
        assert_eq!(Value::NAN.immediate_truthiness(), Some(false));
        assert_eq!(Value::int(0).immediate_truthiness(), Some(false));
        assert_eq!(Value::from_f64(0.0).immediate_truthiness(), Some(false));
        assert_eq!(Value::int(3).immediate_truthiness(), Some(true));
        assert_eq!(Value::istring(b"").unwrap().immediate_truthiness(), Some(true));
        assert_eq!(Value::heap_ref(12).immediate_truthiness(), None);
    }

    #[test]
    fn test_numeric_equality() {
        assert!(Value::int(3).numeric_eq(Value::int(3)));
        assert!(Value::int(3).numeric_eq(Value::from_f64(3.0)));
        assert!(!Value::NAN.numeric_eq(Value::NAN));
        assert!(!Value::int(3).numeric_eq(Value::int(4)));
    }

    #[test]
    fn test_comparisons_reject_nan() {
        assert!(!Value::NAN.numeric_lt(Value::int(1)));
        assert!(!Value::NAN.numeric_ge(Value::int(1)));
        assert!(Value::int(1).numeric_lt(Value::from_f64(1.5)));
    }

    #[test]
    fn test_istring_encoding() {
        let s = Value::istring(b"hi").unwrap();
        assert!(s.is_istring());
        let (buf, len) = s.immediate_string_bytes().unwrap();
        assert_eq!(&buf[..len], b"hi");

        let empty = Value::istring(b"").unwrap();
        assert_eq!(empty.immediate_string_bytes().unwrap().1, 0);
        assert!(Value::istring(b"toolong").is_none());
    }

    #[test]
    fn test_pstring_encoding() {
        let s = Value::pstring(b"sixsix").unwrap();
        assert!(s.is_pstring());
        let (buf, len) = s.immediate_string_bytes().unwrap();
        assert_eq!(len, 6);
        assert_eq!(&buf[..], b"sixsix");
        assert!(Value::pstring(b"five!").is_none());
    }

    #[test]
    fn test_immediate_string_picks_tightest() {
        assert!(Value::immediate_string(b"ab").unwrap().is_istring());
        assert!(Value::immediate_string(b"abcdef").unwrap().is_pstring());
        assert!(Value::immediate_string(b"abcdefg").is_none());
    }

    #[test]
    fn test_heap_ref() {
        let r = Value::heap_ref(0xdead);
        assert!(r.is_heap_ref());
        assert!(!r.is_number());
        assert_eq!(r.as_heap_index(), Some(0xdead));
        assert_eq!(Value::int(1).as_heap_index(), None);
    }

    #[test]
    fn test_symbol_encoding() {
        let s = Value::symbol_from_raw(0xabc123);
        assert!(s.is_symbol());
        assert_eq!(s.as_symbol_raw(), 0xabc123);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42"), 42);
        assert_eq!(parse_int("  -17 "), -17);
        assert_eq!(parse_int("0xff"), 255);
        assert_eq!(parse_int("0b101"), 5);
        assert_eq!(parse_int("0o17"), 15);
        assert_eq!(parse_int("bogus"), 0);
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("2.5"), 2.5);
        assert_eq!(parse_float(" -1e3 "), -1000.0);
        assert!(parse_float("bogus").is_nan());
    }

    #[test]
    fn test_utf8_indexing() {
        let s = "aäz".as_bytes();
        assert_eq!(utf8_codepoint_count(s), 3);
        assert_eq!(utf8_codepoint_range(s, 0), Some((0, 1)));
        assert_eq!(utf8_codepoint_range(s, 1), Some((1, 3)));
        assert_eq!(utf8_codepoint_range(s, 2), Some((3, 4)));
        assert_eq!(utf8_codepoint_range(s, 3), None);
    }
}
