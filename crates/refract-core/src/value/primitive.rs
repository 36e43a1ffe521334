//! Typed views over basic values
//!
//! Each view is obtained from a [`Value`] of a matching kind and reads or
//! writes the value at its native width. Setters require a settable handle
//! and report misuse otherwise.

use super::Value;
use crate::config::misuse;
use crate::gc::Heap;
use crate::runtime::{Complex128, Complex64, StringHeader};
use crate::types::Kind;

fn check_set(v: &Value, op: &str) -> bool {
    if v.can_set() {
        return true;
    }
    misuse(op, "value is not settable");
    false
}

// ============================================================================
// Integers
// ============================================================================

/// Signed integer view (`int`, `int8` .. `int64`)
#[derive(Debug, Clone, Copy)]
pub struct IntValue(Value);

impl IntValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    fn bits(&self) -> u32 {
        self.0.typ.map_or(64, |t| t.size() as u32 * 8)
    }

    /// Current value, sign-extended
    pub fn get(&self) -> i64 {
        let p = self.0.ptr;
        unsafe {
            match self.bits() {
                8 => *(p as *const i8) as i64,
                16 => *(p as *const i16) as i64,
                32 => *(p as *const i32) as i64,
                _ => *(p as *const i64),
            }
        }
    }

    /// Store `x`, truncated to the value's width
    pub fn set(&self, x: i64) -> bool {
        if !check_set(&self.0, "IntValue::set") {
            return false;
        }
        let p = self.0.ptr;
        unsafe {
            match self.bits() {
                8 => *(p as *mut i8) = x as i8,
                16 => *(p as *mut i16) = x as i16,
                32 => *(p as *mut i32) = x as i32,
                _ => *(p as *mut i64) = x,
            }
        }
        true
    }

    /// Whether `x` cannot be represented at the value's width
    pub fn overflows(&self, x: i64) -> bool {
        let shift = 64 - self.bits();
        (x << shift) >> shift != x
    }

    /// Whether the value can be set
    pub fn can_set(&self) -> bool {
        self.0.can_set()
    }
}

/// Unsigned integer view (`uint`, `uint8` .. `uint64`, `uintptr`)
#[derive(Debug, Clone, Copy)]
pub struct UintValue(Value);

impl UintValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    fn bits(&self) -> u32 {
        self.0.typ.map_or(64, |t| t.size() as u32 * 8)
    }

    /// Current value, zero-extended
    pub fn get(&self) -> u64 {
        let p = self.0.ptr;
        unsafe {
            match self.bits() {
                8 => *p as u64,
                16 => *(p as *const u16) as u64,
                32 => *(p as *const u32) as u64,
                _ => *(p as *const u64),
            }
        }
    }

    /// Store `x`, truncated to the value's width
    pub fn set(&self, x: u64) -> bool {
        if !check_set(&self.0, "UintValue::set") {
            return false;
        }
        let p = self.0.ptr;
        unsafe {
            match self.bits() {
                8 => *p = x as u8,
                16 => *(p as *mut u16) = x as u16,
                32 => *(p as *mut u32) = x as u32,
                _ => *(p as *mut u64) = x,
            }
        }
        true
    }

    /// Whether `x` cannot be represented at the value's width
    pub fn overflows(&self, x: u64) -> bool {
        let shift = 64 - self.bits();
        (x << shift) >> shift != x
    }

    /// Whether the value can be set
    pub fn can_set(&self) -> bool {
        self.0.can_set()
    }
}

// ============================================================================
// Floating point
// ============================================================================

fn overflows_f32(x: f64) -> bool {
    let x = x.abs();
    (f32::MAX as f64) < x && x <= f64::MAX
}

/// Floating point view (`float32`, `float64`)
#[derive(Debug, Clone, Copy)]
pub struct FloatValue(Value);

impl FloatValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    fn is_f32(&self) -> bool {
        self.0.kind() == Kind::Float32
    }

    /// Current value, widened to `f64`
    pub fn get(&self) -> f64 {
        unsafe {
            if self.is_f32() {
                *(self.0.ptr as *const f32) as f64
            } else {
                *(self.0.ptr as *const f64)
            }
        }
    }

    /// Store `x`, rounded to the value's precision
    pub fn set(&self, x: f64) -> bool {
        if !check_set(&self.0, "FloatValue::set") {
            return false;
        }
        unsafe {
            if self.is_f32() {
                *(self.0.ptr as *mut f32) = x as f32;
            } else {
                *(self.0.ptr as *mut f64) = x;
            }
        }
        true
    }

    /// Whether `x` is finite but out of the value's range
    pub fn overflows(&self, x: f64) -> bool {
        self.is_f32() && overflows_f32(x)
    }

    /// Whether the value can be set
    pub fn can_set(&self) -> bool {
        self.0.can_set()
    }
}

/// Complex view (`complex64`, `complex128`)
#[derive(Debug, Clone, Copy)]
pub struct ComplexValue(Value);

impl ComplexValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    fn is_c64(&self) -> bool {
        self.0.kind() == Kind::Complex64
    }

    /// Current value, widened to `complex128`
    pub fn get(&self) -> Complex128 {
        unsafe {
            if self.is_c64() {
                (*(self.0.ptr as *const Complex64)).into()
            } else {
                *(self.0.ptr as *const Complex128)
            }
        }
    }

    /// Store `x`, rounding each component to the value's precision
    pub fn set(&self, x: Complex128) -> bool {
        if !check_set(&self.0, "ComplexValue::set") {
            return false;
        }
        unsafe {
            if self.is_c64() {
                *(self.0.ptr as *mut Complex64) = Complex64 {
                    re: x.re as f32,
                    im: x.im as f32,
                };
            } else {
                *(self.0.ptr as *mut Complex128) = x;
            }
        }
        true
    }

    /// Whether either component of `x` is out of the value's range
    pub fn overflows(&self, x: Complex128) -> bool {
        self.is_c64() && (overflows_f32(x.re) || overflows_f32(x.im))
    }

    /// Whether the value can be set
    pub fn can_set(&self) -> bool {
        self.0.can_set()
    }
}

// ============================================================================
// Bool, string, unsafe pointer
// ============================================================================

/// Boolean view
#[derive(Debug, Clone, Copy)]
pub struct BoolValue(Value);

impl BoolValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    /// Current value
    pub fn get(&self) -> bool {
        unsafe { *self.0.ptr != 0 }
    }

    /// Store `x`
    pub fn set(&self, x: bool) -> bool {
        if !check_set(&self.0, "BoolValue::set") {
            return false;
        }
        unsafe { *self.0.ptr = x as u8 };
        true
    }

    /// Whether the value can be set
    pub fn can_set(&self) -> bool {
        self.0.can_set()
    }
}

/// String view
#[derive(Debug, Clone, Copy)]
pub struct StringValue(Value);

impl StringValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    fn header(&self) -> StringHeader {
        unsafe { *(self.0.ptr as *const StringHeader) }
    }

    /// Current contents, replacing invalid UTF-8 sequences
    pub fn get(&self) -> String {
        unsafe { self.header().to_string_lossy() }
    }

    /// Current contents as raw bytes
    pub fn bytes(&self) -> Vec<u8> {
        unsafe { self.header().as_bytes().to_vec() }
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.header().len
    }

    /// Whether the string is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a copy of `x` in engine memory
    pub fn set(&self, x: &str) -> bool {
        self.set_bytes(x.as_bytes())
    }

    /// Store a copy of `bytes` in engine memory
    pub fn set_bytes(&self, bytes: &[u8]) -> bool {
        if !check_set(&self.0, "StringValue::set") {
            return false;
        }
        unsafe { *(self.0.ptr as *mut StringHeader) = alloc_string(bytes) };
        true
    }

    /// Whether the value can be set
    pub fn can_set(&self) -> bool {
        self.0.can_set()
    }
}

/// Copy `bytes` into engine memory and return a header over them
pub(crate) fn alloc_string(bytes: &[u8]) -> StringHeader {
    if bytes.is_empty() {
        return StringHeader::EMPTY;
    }
    let p = Heap::global().alloc_bytes(bytes.len());
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), p, bytes.len()) };
    StringHeader {
        data: p,
        len: bytes.len(),
    }
}

/// Unsafe pointer view
#[derive(Debug, Clone, Copy)]
pub struct PointerValue(Value);

impl PointerValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    /// Current address
    pub fn get(&self) -> *mut u8 {
        self.0.word()
    }

    /// Store `x`
    pub fn set(&self, x: *mut u8) -> bool {
        if !check_set(&self.0, "PointerValue::set") {
            return false;
        }
        unsafe { *(self.0.ptr as *mut *mut u8) = x };
        true
    }

    /// Whether the value can be set
    pub fn can_set(&self) -> bool {
        self.0.can_set()
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Value {
    fn view_of(&self, op: &str, ok: impl Fn(Kind) -> bool) -> Option<Value> {
        if self.is_valid() && !self.is_method() && ok(self.kind()) {
            return Some(*self);
        }
        misuse(op, format_args!("call on {} value", self.kind()));
        None
    }

    /// Signed integer view
    pub fn as_int(&self) -> Option<IntValue> {
        self.view_of("Value::as_int", Kind::is_signed_int).map(IntValue)
    }

    /// Unsigned integer view
    pub fn as_uint(&self) -> Option<UintValue> {
        self.view_of("Value::as_uint", Kind::is_unsigned_int).map(UintValue)
    }

    /// Floating point view
    pub fn as_float(&self) -> Option<FloatValue> {
        self.view_of("Value::as_float", Kind::is_float).map(FloatValue)
    }

    /// Complex view
    pub fn as_complex(&self) -> Option<ComplexValue> {
        self.view_of("Value::as_complex", Kind::is_complex).map(ComplexValue)
    }

    /// Boolean view
    pub fn as_bool(&self) -> Option<BoolValue> {
        self.view_of("Value::as_bool", |k| k == Kind::Bool).map(BoolValue)
    }

    /// String view
    pub fn as_string(&self) -> Option<StringValue> {
        self.view_of("Value::as_string", |k| k == Kind::String).map(StringValue)
    }

    /// Unsafe pointer view
    pub fn as_unsafe_pointer(&self) -> Option<PointerValue> {
        self.view_of("Value::as_unsafe_pointer", |k| k == Kind::UnsafePointer)
            .map(PointerValue)
    }
}
