//! Dynamic value handles
//!
//! A [`Value`] is a `(type, location, flags)` triple referring to a value
//! whose type is known only at run time. The location is either the
//! address of the value's storage (`indirect`) or, for pointer-shaped
//! types taken out of an interface word, the value itself.
//!
//! ```text
//! Value { typ: *main.User, ptr: 0x7f00.., indirect: false }  // the pointer itself
//! Value { typ: main.User,  ptr: 0x7f00.., indirect: true,    // its storage
//!         addressable: true }
//! ```
//!
//! Handles are immutable. Every different view of the same memory (a
//! dereference, a field, an element, the content of an interface) is a new
//! handle. Accessing a kind-specific view on the wrong kind, or setting a
//! handle that is not settable, is misuse: it yields an empty result and a
//! warning, or a panic with verbose diagnostics enabled.

pub mod convert;
pub mod deep_equal;
pub mod make;
pub mod maps;
pub mod method;
pub mod primitive;
pub mod slices;
pub mod structs;

pub use deep_equal::deep_equal;
pub use make::{copy, make_map, make_map_with_size, make_slice, new, type_of, value_of, zero, ToValue};
pub use maps::MapValue;
pub use primitive::{BoolValue, ComplexValue, FloatValue, IntValue, PointerValue, StringValue, UintValue};
pub use slices::SliceValue;
pub use structs::StructValue;

use crate::config::misuse;
use crate::gc::Heap;
use crate::runtime::{EmptyInterface, MapObject, NonEmptyInterface, SliceHeader, StringHeader};
use crate::types::{Kind, TypeRef, TypeRegistry, PTR_SIZE};
use std::fmt;

/// Per-handle flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// Kind of the referenced value
    pub kind: Kind,
    /// The location is the address of the value rather than the value
    pub indirect: bool,
    /// The value can be addressed (and set, if also exported)
    pub addressable: bool,
    /// Reached through an unexported, non-embedded field
    pub sticky_ro: bool,
    /// Reached through an unexported embedded field
    pub embed_ro: bool,
    /// Bound method: index into the receiver's method set
    pub method: Option<u32>,
}

impl Flags {
    /// Flags for a fresh value of `kind`
    pub fn of(kind: Kind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Whether the value was obtained through an unexported field
    #[inline]
    pub fn read_only(&self) -> bool {
        self.sticky_ro || self.embed_ro
    }

    /// Read-only state to pass on to derived handles
    #[inline]
    pub(crate) fn inherit_ro(mut self, from: Flags) -> Self {
        if from.read_only() {
            self.sticky_ro = true;
        }
        self
    }
}

/// Handle to a dynamically typed value
#[derive(Clone, Copy)]
pub struct Value {
    pub(crate) typ: Option<TypeRef>,
    pub(crate) ptr: *mut u8,
    pub(crate) flag: Flags,
}

/// Allocate zeroed storage for one `t`
pub(crate) fn alloc(t: TypeRef) -> *mut u8 {
    Heap::global().alloc(t)
}

/// Copy one `t` from `src` to `dst`
///
/// # Safety
///
/// Both locations must hold storage for a `t`.
#[inline]
pub(crate) unsafe fn typedmemmove(t: TypeRef, dst: *mut u8, src: *const u8) {
    if t.size() > 0 && dst as *const u8 != src {
        std::ptr::copy(src, dst, t.size());
    }
}

impl Value {
    /// The invalid handle
    pub const INVALID: Value = Value {
        typ: None,
        ptr: std::ptr::null_mut(),
        flag: Flags {
            kind: Kind::Invalid,
            indirect: false,
            addressable: false,
            sticky_ro: false,
            embed_ro: false,
            method: None,
        },
    };

    /// Handle to the value stored at `ptr`
    pub(crate) fn at(t: TypeRef, ptr: *mut u8, flag: Flags) -> Self {
        Self {
            typ: Some(t),
            ptr,
            flag: Flags {
                kind: t.kind(),
                indirect: true,
                ..flag
            },
        }
    }

    /// Handle to a pointer-shaped value held inline
    pub(crate) fn direct(t: TypeRef, word: *mut u8, flag: Flags) -> Self {
        Self {
            typ: Some(t),
            ptr: word,
            flag: Flags {
                kind: t.kind(),
                indirect: false,
                addressable: false,
                ..flag
            },
        }
    }

    /// Handle built from an interface word
    pub(crate) fn from_word(t: TypeRef, word: *mut u8, flag: Flags) -> Self {
        if t.is_direct_iface() {
            Self::direct(t, word, flag)
        } else {
            Self::at(t, word, Flags { addressable: false, ..flag })
        }
    }

    /// Handle to the storage at `ptr` holding a value of type `t`
    ///
    /// The handle is addressable and settable.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a valid, properly aligned `t` that outlives
    /// every use of the handle.
    pub unsafe fn from_raw(t: TypeRef, ptr: *mut u8) -> Self {
        Self::at(
            t,
            ptr,
            Flags {
                addressable: true,
                ..Flags::default()
            },
        )
    }

    // ========================================================================
    // Flags
    // ========================================================================

    /// Kind of the value, `Invalid` for the invalid handle
    #[inline]
    pub fn kind(&self) -> Kind {
        self.flag.kind
    }

    /// Flag set
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flag
    }

    /// Whether the handle refers to a value
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.typ.is_some()
    }

    /// Whether [`Value::addr`] may be used
    #[inline]
    pub fn can_addr(&self) -> bool {
        self.flag.addressable
    }

    /// Whether the value can be changed
    #[inline]
    pub fn can_set(&self) -> bool {
        self.flag.addressable && !self.flag.read_only()
    }

    /// Whether [`Value::interface`] may be used
    #[inline]
    pub fn can_interface(&self) -> bool {
        self.is_valid() && !self.flag.read_only()
    }

    /// Whether the value was reached through an unexported field
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.flag.read_only()
    }

    /// Whether the handle is a bound method
    #[inline]
    pub fn is_method(&self) -> bool {
        self.flag.method.is_some()
    }

    /// Raw location: the storage address, or the word itself
    #[inline]
    pub fn raw_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Type of the value; for a bound method, the method's signature
    pub fn typ(&self) -> Option<TypeRef> {
        if self.flag.method.is_some() {
            return self.method_type();
        }
        self.typ
    }

    /// Type of the value, or misuse on the invalid handle
    pub(crate) fn expect_typ(&self, op: &str) -> Option<TypeRef> {
        if self.typ.is_none() {
            misuse(op, "invalid value");
        }
        self.typ
    }

    /// Whether the value has kind `kind`, reporting misuse otherwise
    pub(crate) fn must_be(&self, op: &str, kind: Kind) -> bool {
        if self.kind() == kind && !self.is_method() {
            return true;
        }
        misuse(op, format_args!("call on {} value", self.kind()));
        false
    }

    // ========================================================================
    // Raw access
    // ========================================================================

    /// Word of a pointer-shaped value
    #[inline]
    pub(crate) fn word(&self) -> *mut u8 {
        if self.flag.indirect {
            // pointer-shaped values are one aligned word
            unsafe { *(self.ptr as *const *mut u8) }
        } else {
            self.ptr
        }
    }

    /// Address of the value's storage, spilling an inline word if needed
    pub(crate) fn data(&self) -> *mut u8 {
        match self.typ {
            Some(t) if !self.flag.indirect => {
                let p = alloc(t);
                unsafe { *(p as *mut *mut u8) = self.ptr };
                p
            }
            _ => self.ptr,
        }
    }

    /// Data word for boxing the value in an interface
    pub(crate) fn pack_word(&self, t: TypeRef) -> *mut u8 {
        if t.is_direct_iface() {
            return self.word();
        }
        if self.flag.addressable {
            // the box must not alias mutable storage
            let p = alloc(t);
            unsafe { typedmemmove(t, p, self.ptr) };
            p
        } else {
            self.ptr
        }
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// The value a pointer points at
    ///
    /// A nil pointer yields the invalid handle.
    pub fn deref(&self) -> Value {
        if !self.must_be("Value::deref", Kind::Ptr) {
            return Value::INVALID;
        }
        let p = self.word();
        let Some(elem) = self.typ.and_then(|t| t.elem()) else {
            return Value::INVALID;
        };
        if p.is_null() {
            return Value::INVALID;
        }
        Value::at(
            elem,
            p,
            Flags {
                addressable: true,
                ..Flags::default()
            }
            .inherit_ro(self.flag),
        )
    }

    /// The concrete value an interface currently holds
    ///
    /// A nil interface yields the invalid handle.
    pub fn unwrap_interface(&self) -> Value {
        if !self.must_be("Value::unwrap_interface", Kind::Interface) {
            return Value::INVALID;
        }
        let Some(t) = self.typ else {
            return Value::INVALID;
        };
        let (dyn_typ, word) = unsafe { read_interface(t, self.ptr) };
        match dyn_typ {
            Some(dt) => Value::from_word(dt, word, Flags::default().inherit_ro(self.flag)),
            None => Value::INVALID,
        }
    }

    /// Pointer to the value
    ///
    /// Requires an addressable value.
    pub fn addr(&self, registry: &TypeRegistry) -> Option<Value> {
        let t = self.expect_typ("Value::addr")?;
        if !self.can_addr() {
            misuse("Value::addr", "value is not addressable");
            return None;
        }
        let pt = registry.ptr_to(t);
        Some(Value::direct(pt, self.ptr, Flags::default().inherit_ro(self.flag)))
    }

    /// Box the value
    ///
    /// Fails for values reached through unexported fields.
    pub fn interface(&self) -> Option<EmptyInterface> {
        let t = self.expect_typ("Value::interface")?;
        if self.flag.read_only() {
            misuse("Value::interface", "value obtained through an unexported field or method");
            return None;
        }
        if self.is_method() {
            return self.make_method_value().and_then(|v| v.interface());
        }
        if t.kind() == Kind::Interface {
            let (dyn_typ, word) = unsafe { read_interface(t, self.ptr) };
            return Some(match dyn_typ {
                Some(dt) => EmptyInterface::new(dt, word),
                None => EmptyInterface::NIL,
            });
        }
        Some(EmptyInterface::new(t, self.pack_word(t)))
    }

    /// Assign `x` to the value
    ///
    /// `x` must be assignable to the value's type; the value must be
    /// settable.
    pub fn set(&self, x: &Value) -> bool {
        let Some(t) = self.expect_typ("Value::set") else {
            return false;
        };
        if !self.can_set() {
            misuse("Value::set", "value is not settable");
            return false;
        }
        if !x.is_valid() || x.is_read_only() {
            misuse("Value::set", "argument is invalid or obtained through an unexported field");
            return false;
        }
        let Some(src) = convert::assign_to(x, t) else {
            misuse(
                "Value::set",
                format_args!("{} is not assignable to {}", type_name(x), t),
            );
            return false;
        };
        unsafe { store(t, self.ptr, &src) };
        true
    }

    /// Whether a chan, func, interface, map, pointer or slice is nil
    pub fn is_nil(&self) -> bool {
        match self.kind() {
            Kind::Chan | Kind::Func | Kind::Map | Kind::Ptr | Kind::UnsafePointer => {
                !self.is_method() && self.word().is_null()
            }
            Kind::Interface | Kind::Slice => unsafe { (*(self.ptr as *const *mut u8)).is_null() },
            k => {
                misuse("Value::is_nil", format_args!("call on {} value", k));
                false
            }
        }
    }

    /// Whether the value is the zero value of its type
    pub fn is_zero(&self) -> bool {
        let Some(t) = self.expect_typ("Value::is_zero") else {
            return false;
        };
        match t.kind() {
            Kind::Array => (0..t.len().unwrap_or(0)).all(|i| self.index(i).is_zero()),
            Kind::Struct => (0..t.num_field()).all(|i| self.field_unchecked(i).is_zero()),
            Kind::String => unsafe { (*(self.ptr as *const StringHeader)).len == 0 },
            Kind::Chan | Kind::Func | Kind::Interface | Kind::Map | Kind::Ptr | Kind::Slice | Kind::UnsafePointer => {
                self.is_nil()
            }
            Kind::Invalid => false,
            // floats count as zero only for +0.0, which is all zero bits
            _ => unsafe { std::slice::from_raw_parts(self.ptr, t.size()) }
                .iter()
                .all(|&b| b == 0),
        }
    }

    /// Address held by a pointer-shaped value, or a slice's data pointer
    pub fn pointer(&self) -> Option<*mut u8> {
        match self.kind() {
            Kind::Chan | Kind::Map | Kind::Ptr | Kind::UnsafePointer | Kind::Func if !self.is_method() => {
                Some(self.word())
            }
            Kind::Slice => Some(unsafe { (*(self.ptr as *const SliceHeader)).data }),
            k => {
                misuse("Value::pointer", format_args!("call on {} value", k));
                None
            }
        }
    }

    /// Length of an array, slice, string or map
    pub fn len(&self) -> usize {
        let Some(t) = self.typ else {
            misuse("Value::len", "invalid value");
            return 0;
        };
        match t.kind() {
            Kind::Array => t.len().unwrap_or(0),
            Kind::Slice => unsafe { (*(self.ptr as *const SliceHeader)).len },
            Kind::String => unsafe { (*(self.ptr as *const StringHeader)).len },
            Kind::Map => {
                let m = self.word() as *const MapObject;
                if m.is_null() {
                    0
                } else {
                    unsafe { (*m).len() }
                }
            }
            k => {
                misuse("Value::len", format_args!("call on {} value", k));
                0
            }
        }
    }

    /// Whether [`Value::len`] is zero
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` of an array, slice or string
    ///
    /// Slice elements are always addressable; array elements inherit the
    /// array's addressability; string bytes never are.
    pub fn index(&self, i: usize) -> Value {
        let Some(t) = self.typ else {
            misuse("Value::index", "invalid value");
            return Value::INVALID;
        };
        match t.kind() {
            Kind::Array => {
                let (Some(elem), Some(len)) = (t.elem(), t.len()) else {
                    return Value::INVALID;
                };
                if i >= len {
                    misuse("Value::index", format_args!("index {} out of range [0, {})", i, len));
                    return Value::INVALID;
                }
                if !self.flag.indirect {
                    // a one-element array of a pointer-shaped type held inline
                    return Value::direct(elem, self.ptr, self.flag);
                }
                let p = unsafe { self.ptr.add(i * elem.size()) };
                Value::at(
                    elem,
                    p,
                    Flags {
                        addressable: self.flag.addressable,
                        ..Flags::default()
                    }
                    .inherit_ro(self.flag),
                )
            }
            Kind::Slice => {
                let Some(elem) = t.elem() else {
                    return Value::INVALID;
                };
                let h = unsafe { *(self.ptr as *const SliceHeader) };
                if i >= h.len {
                    misuse("Value::index", format_args!("index {} out of range [0, {})", i, h.len));
                    return Value::INVALID;
                }
                let p = unsafe { h.data.add(i * elem.size()) };
                Value::at(
                    elem,
                    p,
                    Flags {
                        addressable: true,
                        ..Flags::default()
                    }
                    .inherit_ro(self.flag),
                )
            }
            Kind::String => {
                let h = unsafe { *(self.ptr as *const StringHeader) };
                if i >= h.len {
                    misuse("Value::index", format_args!("index {} out of range [0, {})", i, h.len));
                    return Value::INVALID;
                }
                let p = unsafe { h.data.add(i) } as *mut u8;
                Value::at(
                    crate::types::basic(Kind::Uint8),
                    p,
                    Flags::default().inherit_ro(self.flag),
                )
            }
            k => {
                misuse("Value::index", format_args!("call on {} value", k));
                Value::INVALID
            }
        }
    }
}

/// Dynamic type and data word of the interface stored at `p`
///
/// # Safety
///
/// `p` must point at an interface value of type `t`.
pub(crate) unsafe fn read_interface(t: TypeRef, p: *const u8) -> (Option<TypeRef>, *mut u8) {
    if t.interface_methods().is_empty() {
        let e = *(p as *const EmptyInterface);
        (e.typ, e.word)
    } else {
        let i = *(p as *const NonEmptyInterface);
        (i.itab.map(|tab| tab.typ), i.word)
    }
}

/// Store `src` (already of type `t`) into the storage at `dst`
///
/// # Safety
///
/// `dst` must hold storage for a `t`.
pub(crate) unsafe fn store(t: TypeRef, dst: *mut u8, src: &Value) {
    if src.flag.indirect {
        typedmemmove(t, dst, src.ptr);
    } else {
        *(dst as *mut *mut u8) = src.ptr;
    }
}

pub(crate) fn type_name(v: &Value) -> String {
    v.typ().map_or_else(|| "<invalid>".to_string(), |t| t.string().to_string())
}

impl Default for Value {
    fn default() -> Self {
        Value::INVALID
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("typ", &type_name(self))
            .field("ptr", &self.ptr)
            .field("flags", &self.flag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::with_verbose;
    use crate::types::{basic, TypeRegistry};

    #[test]
    fn test_invalid_value() {
        let v = Value::INVALID;
        assert!(!v.is_valid());
        assert_eq!(v.kind(), Kind::Invalid);
        assert!(v.typ().is_none());
        with_verbose(false, || assert!(v.interface().is_none()));
    }

    #[test]
    fn test_from_raw_is_settable() {
        let mut x = 5i64;
        let v = unsafe { Value::from_raw(basic(Kind::Int64), &mut x as *mut i64 as *mut u8) };
        assert!(v.can_set());
        assert!(v.set(&7i64.to_value()));
        assert_eq!(x, 7);
    }

    #[test]
    fn test_set_rejects_unassignable() {
        let mut x = 5i64;
        let v = unsafe { Value::from_raw(basic(Kind::Int64), &mut x as *mut i64 as *mut u8) };
        with_verbose(false, || assert!(!v.set(&7i32.to_value())));
        assert_eq!(x, 5);
    }

    #[test]
    #[should_panic(expected = "not settable")]
    fn test_set_non_settable_panics_when_verbose() {
        let v = 3i32.to_value();
        with_verbose(true, || v.set(&4i32.to_value()));
    }

    #[test]
    fn test_addr_and_deref() {
        let reg = TypeRegistry::new();
        let mut x = 1u16;
        let v = unsafe { Value::from_raw(basic(Kind::Uint16), &mut x as *mut u16 as *mut u8) };
        let p = v.addr(&reg).unwrap();
        assert_eq!(p.kind(), Kind::Ptr);
        assert_eq!(p.pointer(), Some(&mut x as *mut u16 as *mut u8));
        let back = p.deref();
        assert!(back.can_set());
        back.as_uint().unwrap().set(9);
        assert_eq!(x, 9);
    }

    #[test]
    fn test_deref_nil_is_invalid() {
        let reg = TypeRegistry::new();
        let pt = reg.ptr_to(basic(Kind::Int));
        let nil = zero(pt);
        assert!(nil.is_nil());
        assert!(!nil.deref().is_valid());
    }

    #[test]
    fn test_interface_round_trip() {
        let v = "hello".to_value();
        let e = v.interface().unwrap();
        let back = value_of(&e);
        assert_eq!(back.as_string().unwrap().get(), "hello");
        assert_eq!(type_of(&e), Some(basic(Kind::String)));
    }

    #[test]
    fn test_is_zero() {
        assert!(0i32.to_value().is_zero());
        assert!(!1i32.to_value().is_zero());
        assert!(0.0f64.to_value().is_zero());
        assert!(!(-0.0f64).to_value().is_zero());
        assert!("".to_value().is_zero());
        assert!(zero(basic(Kind::Complex128)).is_zero());
    }

    #[test]
    fn test_string_index_is_not_addressable() {
        let v = "abc".to_value();
        let b = v.index(1);
        assert_eq!(b.as_uint().unwrap().get(), b'b' as u64);
        assert!(!b.can_set());
        with_verbose(false, || assert!(!v.index(5).is_valid()));
    }
}
