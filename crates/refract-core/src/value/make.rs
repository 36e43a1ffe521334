//! Value constructors

use super::primitive::alloc_string;
use super::{alloc, Flags, Value};
use crate::config::misuse;
use crate::gc::Heap;
use crate::runtime::{Complex128, Complex64, EmptyInterface, MapObject, SliceHeader, StringHeader};
use crate::types::{basic, Kind, TypeRef, TypeRegistry};

/// Handle to the concrete value held by a boxed value
///
/// A nil box yields the invalid handle.
pub fn value_of(e: &EmptyInterface) -> Value {
    match e.typ {
        Some(t) => Value::from_word(t, e.word, Flags::default()),
        None => Value::INVALID,
    }
}

/// Dynamic type of a boxed value
pub fn type_of(e: &EmptyInterface) -> Option<TypeRef> {
    e.typ
}

/// Pointer to a fresh zero value of type `t`
pub fn new(registry: &TypeRegistry, t: TypeRef) -> Value {
    Value::direct(registry.ptr_to(t), alloc(t), Flags::default())
}

/// Fresh zero value of type `t`; not addressable
pub fn zero(t: TypeRef) -> Value {
    Value::at(t, alloc(t), Flags::default())
}

/// New slice of type `t` with the given length and capacity
pub fn make_slice(t: TypeRef, len: usize, cap: usize) -> Option<Value> {
    let Some(elem) = t.elem().filter(|_| t.kind() == Kind::Slice) else {
        misuse("make_slice", format_args!("{} is not a slice type", t));
        return None;
    };
    if len > cap {
        misuse("make_slice", format_args!("len {} exceeds cap {}", len, cap));
        return None;
    }
    let header = SliceHeader {
        data: Heap::global().alloc_array(elem, cap),
        len,
        cap,
    };
    let p = alloc(t);
    unsafe { *(p as *mut SliceHeader) = header };
    Some(Value::at(t, p, Flags::default()))
}

/// New empty map of type `t`
pub fn make_map(t: TypeRef) -> Option<Value> {
    make_map_with_size(t, 0)
}

/// New empty map of type `t` sized for about `n` entries
pub fn make_map_with_size(t: TypeRef, n: usize) -> Option<Value> {
    let m = MapObject::alloc(t, n);
    if m.is_null() {
        misuse("make_map", format_args!("{} is not a map type", t));
        return None;
    }
    Some(Value::direct(t, m as *mut u8, Flags::default()))
}

/// Element storage, length and element type of a copy operand
fn copy_operand(v: &Value) -> Option<(*mut u8, usize, TypeRef)> {
    let t = v.typ?;
    match t.kind() {
        Kind::Array => Some((v.data(), t.len()?, t.elem()?)),
        Kind::Slice => {
            let h = unsafe { *(v.ptr as *const SliceHeader) };
            Some((h.data, h.len, t.elem()?))
        }
        Kind::String => {
            let h = unsafe { *(v.ptr as *const StringHeader) };
            Some((h.data as *mut u8, h.len, basic(Kind::Uint8)))
        }
        _ => None,
    }
}

/// Copy elements from `src` into `dst` until either is exhausted
///
/// `dst` is a slice or a settable array; `src` is a slice, an array or,
/// for byte destinations, a string. Returns the number of elements copied.
pub fn copy(dst: &Value, src: &Value) -> usize {
    if dst.kind() == Kind::Array && !dst.can_set() {
        misuse("copy", "destination array is not settable");
        return 0;
    }
    if dst.kind() == Kind::String || dst.is_read_only() {
        misuse("copy", "invalid destination");
        return 0;
    }
    let (Some((dp, dn, de)), Some((sp, sn, se))) = (copy_operand(dst), copy_operand(src)) else {
        misuse("copy", format_args!("copy from {} to {}", src.kind(), dst.kind()));
        return 0;
    };
    if de != se {
        misuse("copy", format_args!("element types {} and {} differ", de, se));
        return 0;
    }
    let n = dn.min(sn);
    if n > 0 && de.size() > 0 {
        unsafe { std::ptr::copy(sp, dp, n * de.size()) };
    }
    n
}

// ============================================================================
// Host conversions
// ============================================================================

/// Conversion of a host value into a fresh engine value
pub trait ToValue {
    /// Copy `self` into engine memory
    fn to_value(&self) -> Value;
}

fn boxed<T: Copy>(kind: Kind, x: T) -> Value {
    let t = basic(kind);
    debug_assert_eq!(t.size(), std::mem::size_of::<T>());
    let p = alloc(t);
    unsafe { std::ptr::write(p as *mut T, x) };
    Value::at(t, p, Flags::default())
}

macro_rules! impl_to_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    boxed(Kind::$kind, *self)
                }
            }
        )*
    };
}

impl_to_value! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    isize => Int,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    usize => Uint,
    f32 => Float32,
    f64 => Float64,
    Complex64 => Complex64,
    Complex128 => Complex128,
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        boxed(Kind::String, alloc_string(self.as_bytes()))
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        self.as_str().to_value()
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::with_verbose;

    #[test]
    fn test_make_slice() {
        let reg = TypeRegistry::new();
        let st = reg.slice_of(basic(Kind::Int32));
        let s = make_slice(st, 2, 5).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.as_slice().unwrap().cap(), 5);
        assert!(s.index(1).can_set());
        with_verbose(false, || assert!(make_slice(st, 6, 5).is_none()));
    }

    #[test]
    fn test_new_points_at_zero() {
        let reg = TypeRegistry::new();
        let p = new(&reg, basic(Kind::Float64));
        assert_eq!(p.typ(), Some(reg.ptr_to(basic(Kind::Float64))));
        let elem = p.deref();
        assert!(elem.can_set());
        assert_eq!(elem.as_float().unwrap().get(), 0.0);
    }

    #[test]
    fn test_copy_string_into_bytes() {
        let reg = TypeRegistry::new();
        let bytes = make_slice(reg.slice_of(basic(Kind::Uint8)), 3, 3).unwrap();
        assert_eq!(copy(&bytes, &"hello".to_value()), 3);
        assert_eq!(bytes.as_slice().unwrap().bytes(), b"hel");
    }

    #[test]
    fn test_copy_overlapping() {
        let reg = TypeRegistry::new();
        let s = make_slice(reg.slice_of(basic(Kind::Int64)), 4, 4).unwrap();
        for i in 0..4 {
            s.index(i).as_int().unwrap().set(i as i64);
        }
        let tail = s.as_slice().unwrap().slice(1, 4).unwrap();
        assert_eq!(copy(&tail, &s), 3);
        let got: Vec<i64> = (0..4).map(|i| s.index(i).as_int().unwrap().get()).collect();
        assert_eq!(got, vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_copy_mismatched_elements() {
        let reg = TypeRegistry::new();
        let a = make_slice(reg.slice_of(basic(Kind::Int64)), 2, 2).unwrap();
        let b = make_slice(reg.slice_of(basic(Kind::Uint64)), 2, 2).unwrap();
        with_verbose(false, || assert_eq!(copy(&a, &b), 0));
    }

    #[test]
    fn test_nil_box_is_invalid() {
        assert!(!value_of(&EmptyInterface::NIL).is_valid());
        assert!(type_of(&EmptyInterface::NIL).is_none());
    }
}
