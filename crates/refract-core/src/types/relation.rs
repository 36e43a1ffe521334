//! Type relations: identity, assignability, convertibility, implements
//!
//! All predicates are cheap probes that never fail; they answer `false`
//! for any pair they do not relate.

use super::descriptor::{TypeDescriptor, TypeRef};
use super::kind::{ChanDir, Kind};
use super::name::Name;

/// Whether `src` satisfies interface `iface`
///
/// Both method tables are sorted exported-first then by name, so one
/// merge-scan decides. An unexported interface method only matches a
/// method declared in the same package.
pub fn implements(iface: TypeRef, src: TypeRef) -> bool {
    let Some(it) = iface.as_interface() else {
        return false;
    };
    let want = it.methods();
    if want.is_empty() {
        return true;
    }

    if let Some(st) = src.as_interface() {
        let have = st.methods();
        let mut j = 0;
        for tm in want {
            loop {
                let Some(vm) = have.get(j) else {
                    return false;
                };
                j += 1;
                if same_method(
                    &tm.name,
                    tm.typ,
                    it.pkg_path(),
                    &vm.name,
                    vm.typ,
                    st.pkg_path(),
                ) {
                    break;
                }
            }
        }
        return true;
    }

    let Some(u) = src.uncommon() else {
        return false;
    };
    let have = u.methods();
    let mut j = 0;
    for tm in want {
        loop {
            let Some(vm) = have.get(j) else {
                return false;
            };
            j += 1;
            if same_method(&tm.name, tm.typ, it.pkg_path(), &vm.name, vm.mtyp, src.pkg_path()) {
                break;
            }
        }
    }
    true
}

fn same_method(
    t_name: &Name,
    t_typ: TypeRef,
    t_pkg: Option<&str>,
    v_name: &Name,
    v_typ: TypeRef,
    v_pkg: Option<&str>,
) -> bool {
    if t_name.name() != v_name.name() || t_typ != v_typ {
        return false;
    }
    if t_name.is_exported() {
        return true;
    }
    let tp = t_name.pkg_path().or(t_pkg);
    let vp = v_name.pkg_path().or(v_pkg);
    tp == vp
}

/// Whether a value of type `src` can be assigned to a variable of type `dst`
pub fn assignable_to(src: TypeRef, dst: TypeRef) -> bool {
    directly_assignable(dst, src) || (dst.kind() == Kind::Interface && implements(dst, src))
}

/// Identical types, or an unnamed side with an identical underlying shape
pub fn directly_assignable(dst: TypeRef, src: TypeRef) -> bool {
    if dst == src {
        return true;
    }
    if (dst.is_named() && src.is_named()) || dst.kind() != src.kind() {
        return false;
    }
    // a bidirectional channel can be assigned to a directional one
    if dst.kind() == Kind::Chan && src.chan_dir() == Some(ChanDir::Both) {
        if let (Some(de), Some(se)) = (dst.elem(), src.elem()) {
            if identical_type(de, se, false) {
                return true;
            }
        }
    }
    identical_underlying(dst, src, true)
}

/// Whether two element types are identical
///
/// With `cmp_tags` only the very same descriptor counts; otherwise two
/// descriptors match if they agree on name, kind, package and shape.
fn identical_type(t: TypeRef, v: TypeRef, cmp_tags: bool) -> bool {
    if cmp_tags {
        return t == v;
    }
    if t.name() != v.name() || t.kind() != v.kind() || t.pkg_path() != v.pkg_path() {
        return false;
    }
    identical_underlying(t, v, false)
}

/// Whether two types have the same underlying shape
pub fn identical_underlying(t: &TypeDescriptor, v: &TypeDescriptor, cmp_tags: bool) -> bool {
    if std::ptr::eq(t, v) {
        return true;
    }
    if t.kind() != v.kind() {
        return false;
    }
    if t.kind().is_basic() {
        return true;
    }

    match t.kind() {
        Kind::Array => t.len() == v.len() && elem_identical(t, v, cmp_tags),
        Kind::Chan => t.chan_dir() == v.chan_dir() && elem_identical(t, v, cmp_tags),
        Kind::Ptr | Kind::Slice => elem_identical(t, v, cmp_tags),
        Kind::Map => {
            match (t.key(), v.key()) {
                (Some(a), Some(b)) if identical_type(a, b, cmp_tags) => {}
                _ => return false,
            }
            elem_identical(t, v, cmp_tags)
        }
        Kind::Func => {
            let (Some(tf), Some(vf)) = (t.as_func(), v.as_func()) else {
                return false;
            };
            tf.is_variadic() == vf.is_variadic()
                && tf.ins().len() == vf.ins().len()
                && tf.outs().len() == vf.outs().len()
                && tf.ins().iter().zip(vf.ins()).all(|(&a, &b)| identical_type(a, b, cmp_tags))
                && tf.outs().iter().zip(vf.outs()).all(|(&a, &b)| identical_type(a, b, cmp_tags))
        }
        Kind::Interface => {
            let (tm, vm) = (t.interface_methods(), v.interface_methods());
            tm.len() == vm.len()
                && tm
                    .iter()
                    .zip(vm)
                    .all(|(a, b)| a.name.name() == b.name.name() && identical_type(a.typ, b.typ, cmp_tags))
        }
        Kind::Struct => {
            let (Some(ts), Some(vs)) = (t.as_struct(), v.as_struct()) else {
                return false;
            };
            if ts.fields().len() != vs.fields().len() || ts.pkg_path() != vs.pkg_path() {
                return false;
            }
            ts.fields().iter().zip(vs.fields()).all(|(a, b)| {
                a.name.name() == b.name.name()
                    && identical_type(a.typ, b.typ, cmp_tags)
                    && (!cmp_tags || a.name.tag() == b.name.tag())
                    && a.offset_embed == b.offset_embed
            })
        }
        _ => false,
    }
}

fn elem_identical(t: &TypeDescriptor, v: &TypeDescriptor, cmp_tags: bool) -> bool {
    match (t.elem(), v.elem()) {
        (Some(a), Some(b)) => identical_type(a, b, cmp_tags),
        _ => false,
    }
}

/// How a value of one type converts to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOp {
    /// Integer or float to integer or float
    Numeric,
    /// Complex to complex
    Complex,
    /// Integer to its code point as a string
    IntToString,
    /// String to a fresh byte slice
    StringToBytes,
    /// String to a fresh code point slice
    StringToRunes,
    /// Byte slice to a fresh string
    BytesToString,
    /// Code point slice to a fresh string
    RunesToString,
    /// Slice to a pointer at its backing array
    SliceToArrayPtr,
    /// Slice to a copy of its first elements
    SliceToArray,
    /// Same representation, new type
    Retype,
    /// Concrete value into an interface
    ToInterface,
    /// Interface value into another interface
    InterfaceToInterface,
}

/// Conversion from `src` to `dst`, if any
pub fn conversion_op(src: TypeRef, dst: TypeRef) -> Option<ConversionOp> {
    let (sk, dk) = (src.kind(), dst.kind());
    let int_like = |k: Kind| k.is_signed_int() || k.is_unsigned_int();

    if (int_like(sk) || sk.is_float()) && (int_like(dk) || dk.is_float()) {
        return Some(ConversionOp::Numeric);
    }
    if int_like(sk) && dk == Kind::String {
        return Some(ConversionOp::IntToString);
    }
    if sk.is_complex() && dk.is_complex() {
        return Some(ConversionOp::Complex);
    }

    let unnamed_elem = |t: TypeRef, k: Kind| t.elem().is_some_and(|e| e.kind() == k && e.pkg_path().is_none());
    if sk == Kind::String && dk == Kind::Slice {
        if unnamed_elem(dst, Kind::Uint8) {
            return Some(ConversionOp::StringToBytes);
        }
        if unnamed_elem(dst, Kind::Int32) {
            return Some(ConversionOp::StringToRunes);
        }
    }
    if sk == Kind::Slice && dk == Kind::String {
        if unnamed_elem(src, Kind::Uint8) {
            return Some(ConversionOp::BytesToString);
        }
        if unnamed_elem(src, Kind::Int32) {
            return Some(ConversionOp::RunesToString);
        }
    }
    if sk == Kind::Slice {
        if dk == Kind::Ptr {
            if let Some(arr) = dst.elem().filter(|a| a.kind() == Kind::Array) {
                if src.elem() == arr.elem() {
                    return Some(ConversionOp::SliceToArrayPtr);
                }
            }
        }
        if dk == Kind::Array && src.elem() == dst.elem() {
            return Some(ConversionOp::SliceToArray);
        }
    }

    if identical_underlying(dst, src, false) {
        return Some(ConversionOp::Retype);
    }
    if dk == Kind::Ptr && !dst.is_named() && sk == Kind::Ptr && !src.is_named() {
        if let (Some(de), Some(se)) = (dst.elem(), src.elem()) {
            if identical_underlying(de, se, false) {
                return Some(ConversionOp::Retype);
            }
        }
    }

    if implements(dst, src) {
        return Some(if sk == Kind::Interface {
            ConversionOp::InterfaceToInterface
        } else {
            ConversionOp::ToInterface
        });
    }
    None
}

/// Whether a value of type `src` can be converted to type `dst`
pub fn convertible_to(src: TypeRef, dst: TypeRef) -> bool {
    conversion_op(src, dst).is_some()
}

impl TypeDescriptor {
    /// Whether the type satisfies interface `iface`
    pub fn implements(&'static self, iface: TypeRef) -> bool {
        implements(iface, self)
    }

    /// Whether a value of the type can be assigned to `dst`
    pub fn assignable_to(&'static self, dst: TypeRef) -> bool {
        assignable_to(self, dst)
    }

    /// Whether a value of the type can be converted to `dst`
    pub fn convertible_to(&'static self, dst: TypeRef) -> bool {
        convertible_to(self, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{basic, empty_interface, ModuleBuilder, TypeRegistry};

    unsafe fn nop(_closure: *const crate::runtime::FuncObject, _frame: *mut u8) {}

    #[test]
    fn test_implements_merge_scan() {
        let mut m = ModuleBuilder::new("io");
        let read = m.func(&[], &[basic(Kind::Int)], false).unwrap();
        let close = m.func(&[], &[], false).unwrap();
        let reader = m.interface(&[("Read", read)]).unwrap();
        let rc = m.interface(&[("Read", read), ("Close", close)]).unwrap();
        let file = m
            .named("File", basic(Kind::Int))
            .method("Read", read, nop)
            .pointer_method("Close", close, nop)
            .build()
            .unwrap();
        let file_ptr = file.ptr_to_this().unwrap();

        assert!(file.implements(reader));
        assert!(!file.implements(rc));
        assert!(file_ptr.implements(rc));
        assert!(rc.implements(reader));
        assert!(!reader.implements(rc));
        assert!(basic(Kind::Int).implements(empty_interface()));
        assert!(!basic(Kind::Int).implements(reader));
    }

    #[test]
    fn test_unexported_methods_need_same_package() {
        let mut a = ModuleBuilder::new("a");
        let f = a.func(&[], &[], false).unwrap();
        let secret = a.interface(&[("secret", f)]).unwrap();
        let mine = a.named("Mine", basic(Kind::Int)).method("secret", f, nop).build().unwrap();

        let mut b = ModuleBuilder::new("b");
        let theirs = b.named("Theirs", basic(Kind::Int)).method("secret", f, nop).build().unwrap();

        assert!(mine.implements(secret));
        assert!(!theirs.implements(secret));
    }

    #[test]
    fn test_assignability() {
        let reg = TypeRegistry::new();
        let mut m = ModuleBuilder::new("main");
        let ints = reg.slice_of(basic(Kind::Int));
        let named_ints = m.named("Ints", ints).build().unwrap();
        let id = m.named("ID", basic(Kind::Int)).build().unwrap();

        assert!(ints.assignable_to(named_ints));
        assert!(named_ints.assignable_to(ints));
        assert!(!id.assignable_to(basic(Kind::Int)));
        assert!(id.assignable_to(empty_interface()));
        assert!(!basic(Kind::Int).assignable_to(basic(Kind::Int64)));
    }

    #[test]
    fn test_conversion_ops() {
        let reg = TypeRegistry::new();
        let bytes = reg.slice_of(basic(Kind::Uint8));
        let runes = reg.slice_of(basic(Kind::Int32));
        let s = basic(Kind::String);

        assert_eq!(conversion_op(basic(Kind::Int8), basic(Kind::Uint8)), Some(ConversionOp::Numeric));
        assert_eq!(conversion_op(basic(Kind::Int), s), Some(ConversionOp::IntToString));
        assert_eq!(conversion_op(s, bytes), Some(ConversionOp::StringToBytes));
        assert_eq!(conversion_op(runes, s), Some(ConversionOp::RunesToString));
        assert_eq!(
            conversion_op(basic(Kind::Complex64), basic(Kind::Complex128)),
            Some(ConversionOp::Complex)
        );
        assert_eq!(conversion_op(s, empty_interface()), Some(ConversionOp::ToInterface));
        assert!(!convertible_to(s, basic(Kind::Int)));
        assert!(!convertible_to(basic(Kind::Float64), basic(Kind::Complex128)));

        let arr = reg.array_of(basic(Kind::Uint8), 4).unwrap();
        assert_eq!(conversion_op(bytes, reg.ptr_to(arr)), Some(ConversionOp::SliceToArrayPtr));
        assert_eq!(conversion_op(bytes, arr), Some(ConversionOp::SliceToArray));
    }

    #[test]
    fn test_exported_structs_match_across_packages() {
        let declare = |pkg: &str, field: &str| {
            let mut m = ModuleBuilder::new(pkg);
            let shape = m.struct_type().field(field, basic(Kind::Int)).build().unwrap();
            let named = m.named("T", shape).build().unwrap();
            (shape, named)
        };
        let (a_shape, a_t) = declare("example.com/a", "X");
        let (b_shape, b_t) = declare("example.com/b", "X");
        assert!(a_shape.assignable_to(b_shape));
        assert!(convertible_to(a_t, b_t));
        assert!(!a_t.assignable_to(b_t));

        // an unexported field ties the struct to its package
        let (c_shape, c_t) = declare("example.com/c", "x");
        let (d_shape, d_t) = declare("example.com/d", "x");
        assert!(!c_shape.assignable_to(d_shape));
        assert!(!convertible_to(c_t, d_t));
    }

    #[test]
    fn test_unnamed_pointer_conversion() {
        let reg = TypeRegistry::new();
        let mut m = ModuleBuilder::new("main");
        let celsius = m.named("Celsius", basic(Kind::Float64)).build().unwrap();
        let p1 = reg.ptr_to(basic(Kind::Float64));
        let p2 = celsius.ptr_to_this().unwrap();
        assert!(convertible_to(p1, p2));
        assert!(convertible_to(celsius, basic(Kind::Float64)));
    }
}
