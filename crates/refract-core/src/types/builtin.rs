//! Builtin descriptors
//!
//! Basic kinds (`bool`, the integers, floats, complex numbers, `string`,
//! `unsafe.Pointer`) and the empty interface have exactly one descriptor
//! per process, shared by every module and registry.

use super::alg::TypeAlg;
use super::descriptor::{InterfaceType, TypeDescriptor, TypeExt, TypeFlags, TypeRef};
use super::factory::fnv1;
use super::gcdata::GcData;
use super::kind::{Kind, PTR_SIZE};
use super::name::Name;
use once_cell::sync::Lazy;
use once_cell::sync::OnceCell;

struct Builtins {
    basic: Vec<Option<TypeRef>>,
    empty_interface: TypeRef,
}

static BUILTINS: Lazy<Builtins> = Lazy::new(|| {
    let basic = Kind::ALL
        .iter()
        .map(|&k| k.is_basic().then(|| leak(basic_descriptor(k))))
        .collect();
    Builtins {
        basic,
        empty_interface: leak(empty_interface_descriptor()),
    }
});

fn leak(t: TypeDescriptor) -> TypeRef {
    Box::leak(Box::new(t))
}

/// Descriptor of a basic kind
///
/// # Panics
///
/// Panics if `kind` is not a basic kind.
pub fn basic(kind: Kind) -> TypeRef {
    match BUILTINS.basic[kind as usize] {
        Some(t) => t,
        None => panic!("no builtin descriptor for kind {}", kind),
    }
}

/// Descriptor of a basic kind, or `None` for composite kinds
pub fn try_basic(kind: Kind) -> Option<TypeRef> {
    BUILTINS.basic[kind as usize]
}

/// Descriptor of `interface {}`
pub fn empty_interface() -> TypeRef {
    BUILTINS.empty_interface
}

fn basic_descriptor(kind: Kind) -> TypeDescriptor {
    let size = kind.basic_size().unwrap_or(0);
    let align = match kind {
        Kind::Complex64 => 4,
        Kind::Complex128 => 8,
        Kind::String => PTR_SIZE,
        _ => size,
    }
    .min(8) as u8;

    let pointer = matches!(kind, Kind::String | Kind::UnsafePointer);
    let regular = !(kind.is_float() || kind.is_complex() || kind == Kind::String);

    let mut flags = TypeFlags::NAMED;
    if regular {
        flags |= TypeFlags::REGULAR_MEMORY;
    }
    if kind == Kind::UnsafePointer {
        flags |= TypeFlags::DIRECT_IFACE;
    }

    let string = Name::type_string(kind.name());
    TypeDescriptor {
        size,
        ptr_data: if pointer { PTR_SIZE } else { 0 },
        hash: fnv1(kind.name().as_bytes()),
        flags,
        align,
        field_align: align,
        kind,
        alg: Some(if regular {
            TypeAlg::MEMORY
        } else {
            TypeAlg::GENERIC
        }),
        gc: if pointer {
            GcData::Mask(Box::new([1]))
        } else {
            GcData::None
        },
        string,
        uncommon: OnceCell::new(),
        ptr_to_this: OnceCell::new(),
        ext: TypeExt::Basic,
    }
}

fn empty_interface_descriptor() -> TypeDescriptor {
    let s = "interface {}";
    TypeDescriptor {
        size: 2 * PTR_SIZE,
        ptr_data: 2 * PTR_SIZE,
        hash: fnv1(s.as_bytes()),
        flags: TypeFlags::empty(),
        align: PTR_SIZE as u8,
        field_align: PTR_SIZE as u8,
        kind: Kind::Interface,
        alg: Some(TypeAlg::GENERIC),
        gc: GcData::Mask(Box::new([0b11])),
        string: Name::type_string(s),
        uncommon: OnceCell::new(),
        ptr_to_this: OnceCell::new(),
        ext: TypeExt::Interface(InterfaceType {
            pkg_path: None,
            methods: Vec::new(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_basic_kind_has_a_descriptor() {
        for &k in Kind::ALL.iter().filter(|k| k.is_basic()) {
            let t = basic(k);
            assert_eq!(t.kind(), k);
            assert_eq!(Some(t.size()), k.basic_size());
            assert!(t.comparable());
            assert_eq!(t.name(), t.string().rsplit('.').next().unwrap());
        }
        assert!(try_basic(Kind::Struct).is_none());
    }

    #[test]
    fn test_pointer_bearing_basics() {
        assert!(basic(Kind::String).has_pointers());
        assert!(basic(Kind::UnsafePointer).is_direct_iface());
        assert!(!basic(Kind::Int).has_pointers());
        assert_eq!(basic(Kind::UnsafePointer).name(), "Pointer");
    }

    #[test]
    fn test_empty_interface() {
        let t = empty_interface();
        assert_eq!(t.kind(), Kind::Interface);
        assert_eq!(t.num_method(), 0);
        assert_eq!(t.ptr_data(), 2 * PTR_SIZE);
        assert_eq!(t.string(), "interface {}");
    }

    #[test]
    #[should_panic(expected = "no builtin descriptor")]
    fn test_basic_rejects_composite_kinds() {
        basic(Kind::Map);
    }
}
