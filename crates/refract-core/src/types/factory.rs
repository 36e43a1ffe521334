//! Descriptor constructors
//!
//! Pure functions that compute the full descriptor (layout, algorithm, GC
//! data, textual form) for one composite shape. They never register
//! anything: the [`super::ModuleBuilder`] leaks what it declares and the
//! [`super::TypeRegistry`] decides under its lock whether a freshly built
//! descriptor becomes the canonical one.

use super::alg::TypeAlg;
use super::descriptor::{
    method_order, ArrayType, ChanType, FuncType, IMethod, InterfaceType, MapType, Method,
    PtrType, SliceType, StructField, StructType, TypeDescriptor, TypeExt, TypeFlags, TypeRef,
    UncommonType,
};
use super::gcdata::{emit_gc_mask, BitVector, GcData, ProgramWriter, MAX_PTR_MASK_BYTES};
use super::kind::{ChanDir, Kind, PTR_SIZE};
use super::name::Name;
use super::tag::quote;
use crate::{ReflectError, ReflectResult};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashSet;

/// Slots per map bucket
pub const BUCKET_COUNT: usize = 8;

/// Keys larger than this are stored through a pointer
pub const MAX_KEY_SIZE: usize = 128;

/// Elements larger than this are stored through a pointer
pub const MAX_ELEM_SIZE: usize = 128;

const FNV_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// FNV-1 hash of `bytes`
pub(crate) fn fnv1(bytes: &[u8]) -> u32 {
    fnv1_extend(FNV_BASIS, bytes)
}

/// Continue an FNV-1 hash with more bytes
pub(crate) fn fnv1_extend(mut h: u32, bytes: &[u8]) -> u32 {
    for &b in bytes {
        h = h.wrapping_mul(FNV_PRIME) ^ b as u32;
    }
    h
}

/// A struct field as declared, before layout
#[derive(Debug, Clone)]
pub struct FieldDecl {
    /// Encoded name, tag and package
    pub name: Name,
    /// Field type
    pub typ: TypeRef,
    /// Embedded (anonymous) field
    pub embedded: bool,
}

fn align_up(n: usize, a: usize) -> usize {
    if a <= 1 {
        n
    } else {
        n.div_ceil(a) * a
    }
}

fn pointer_mask() -> GcData {
    GcData::Mask(Box::new([1]))
}

/// Base record for a one-word pointer-shaped type
fn word_descriptor(kind: Kind, string: &str, hash: u32, alg: Option<TypeAlg>, ext: TypeExt) -> TypeDescriptor {
    let mut flags = TypeFlags::DIRECT_IFACE;
    if alg.is_some() {
        flags |= TypeFlags::REGULAR_MEMORY;
    }
    TypeDescriptor {
        size: PTR_SIZE,
        ptr_data: PTR_SIZE,
        hash,
        flags,
        align: PTR_SIZE as u8,
        field_align: PTR_SIZE as u8,
        kind,
        alg,
        gc: pointer_mask(),
        string: Name::type_string(string),
        uncommon: OnceCell::new(),
        ptr_to_this: OnceCell::new(),
        ext,
    }
}

// ============================================================================
// Arrays
// ============================================================================

/// Descriptor of `[len]elem`
pub fn array_descriptor(elem: TypeRef, len: usize) -> ReflectResult<TypeDescriptor> {
    let esize = elem.size();
    let size = esize.checked_mul(len).ok_or_else(|| ReflectError::ArrayTooLarge {
        elem: elem.string().to_string(),
        len,
    })?;
    if size > isize::MAX as usize {
        return Err(ReflectError::ArrayTooLarge {
            elem: elem.string().to_string(),
            len,
        });
    }

    let string = format!("[{}]{}", len, elem.string());
    let hash = fnv1_extend(elem.hash(), format!("[{}]", len).as_bytes());

    let (ptr_data, gc) = if len == 0 || !elem.has_pointers() {
        (0, GcData::None)
    } else if len == 1 {
        (elem.ptr_data(), elem.gc_data().clone())
    } else {
        let ptr_data = (len - 1) * esize + elem.ptr_data();
        let words = ptr_data.div_ceil(PTR_SIZE);
        if !elem.gc_data().is_program() && words <= MAX_PTR_MASK_BYTES * 8 {
            let mut bits = BitVector::with_len(words);
            emit_gc_mask(&mut bits, 0, elem, len);
            (ptr_data, GcData::from_bits(&bits))
        } else {
            let elem_words = esize / PTR_SIZE;
            let mut w = ProgramWriter::new();
            let emitted = w.type_bits(elem);
            if elem_words > emitted {
                w.zeros(elem_words - emitted);
            }
            w.repeat(elem_words, len - 1);
            (ptr_data, GcData::Program(w.finish()))
        }
    };

    let mut flags = TypeFlags::empty();
    if len == 1 && elem.is_direct_iface() {
        flags |= TypeFlags::DIRECT_IFACE;
    }
    if len == 0 || elem.flags().contains(TypeFlags::REGULAR_MEMORY) {
        flags |= TypeFlags::REGULAR_MEMORY;
    }
    let alg = elem.alg().map(|_| {
        if flags.contains(TypeFlags::REGULAR_MEMORY) {
            TypeAlg::MEMORY
        } else {
            TypeAlg::GENERIC
        }
    });

    Ok(TypeDescriptor {
        size,
        ptr_data,
        hash,
        flags,
        align: elem.align,
        field_align: elem.field_align,
        kind: Kind::Array,
        alg,
        gc,
        string: Name::type_string(&string),
        uncommon: OnceCell::new(),
        ptr_to_this: OnceCell::new(),
        ext: TypeExt::Array(ArrayType { elem, len }),
    })
}

// ============================================================================
// Slices, pointers, channels
// ============================================================================

/// Descriptor of `[]elem`
pub fn slice_descriptor(elem: TypeRef) -> TypeDescriptor {
    let string = format!("[]{}", elem.string());
    TypeDescriptor {
        size: 3 * PTR_SIZE,
        ptr_data: PTR_SIZE,
        hash: fnv1_extend(elem.hash(), b"[]"),
        flags: TypeFlags::empty(),
        align: PTR_SIZE as u8,
        field_align: PTR_SIZE as u8,
        kind: Kind::Slice,
        alg: None,
        gc: pointer_mask(),
        string: Name::type_string(&string),
        uncommon: OnceCell::new(),
        ptr_to_this: OnceCell::new(),
        ext: TypeExt::Slice(SliceType { elem }),
    }
}

/// Descriptor of `*elem`
pub fn ptr_descriptor(elem: TypeRef) -> TypeDescriptor {
    let string = format!("*{}", elem.string());
    word_descriptor(
        Kind::Ptr,
        &string,
        fnv1_extend(elem.hash(), b"*"),
        Some(TypeAlg::MEMORY),
        TypeExt::Ptr(PtrType {
            elem: OnceCell::with_value(elem),
        }),
    )
}

/// Descriptor of a pointer whose element is filled in later
///
/// `string` is the final textual form, e.g. `*main.Node`.
pub fn forward_ptr_descriptor(string: &str) -> TypeDescriptor {
    word_descriptor(
        Kind::Ptr,
        string,
        fnv1(string.as_bytes()),
        Some(TypeAlg::MEMORY),
        TypeExt::Ptr(PtrType {
            elem: OnceCell::new(),
        }),
    )
}

/// Descriptor of a channel of `elem`
pub fn chan_descriptor(elem: TypeRef, dir: ChanDir) -> TypeDescriptor {
    // `chan (<-chan T)` needs parentheses to stay unambiguous
    let string = if dir == ChanDir::Both && elem.chan_dir() == Some(ChanDir::Recv) {
        format!("{}({})", dir.prefix(), elem.string())
    } else {
        format!("{}{}", dir.prefix(), elem.string())
    };
    word_descriptor(
        Kind::Chan,
        &string,
        fnv1_extend(elem.hash(), dir.prefix().as_bytes()),
        Some(TypeAlg::MEMORY),
        TypeExt::Chan(ChanType { elem, dir }),
    )
}

// ============================================================================
// Functions and interfaces
// ============================================================================

fn signature_string(ins: &[TypeRef], outs: &[TypeRef], variadic: bool) -> String {
    let mut s = String::from("(");
    for (i, t) in ins.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        if variadic && i == ins.len() - 1 {
            s.push_str("...");
            s.push_str(t.elem().map_or("?", |e| e.string()));
        } else {
            s.push_str(t.string());
        }
    }
    s.push(')');
    match outs {
        [] => {}
        [one] => {
            s.push(' ');
            s.push_str(one.string());
        }
        many => {
            s.push_str(" (");
            for (i, t) in many.iter().enumerate() {
                if i > 0 {
                    s.push_str(", ");
                }
                s.push_str(t.string());
            }
            s.push(')');
        }
    }
    s
}

/// Descriptor of a function signature
///
/// A variadic signature must end in a slice parameter.
pub fn func_descriptor(ins: Vec<TypeRef>, outs: Vec<TypeRef>, variadic: bool) -> ReflectResult<TypeDescriptor> {
    if variadic && ins.last().map(|t| t.kind()) != Some(Kind::Slice) {
        return Err(ReflectError::Variadic(
            "variadic function must end in a slice parameter".to_string(),
        ));
    }
    let string = format!("func{}", signature_string(&ins, &outs, variadic));
    let mut hash = fnv1(b"func");
    for t in ins.iter().chain(outs.iter()) {
        hash = fnv1_extend(hash, &t.hash().to_le_bytes());
    }
    if variadic {
        hash = fnv1_extend(hash, b"...");
    }
    Ok(word_descriptor(
        Kind::Func,
        &string,
        hash,
        None,
        TypeExt::Func(FuncType { ins, outs, variadic }),
    ))
}

/// Descriptor of an interface type
pub fn interface_descriptor(pkg_path: Option<&str>, mut methods: Vec<IMethod>) -> ReflectResult<TypeDescriptor> {
    methods.sort_by(|a, b| method_order(&a.name, &b.name));
    for pair in methods.windows(2) {
        if pair[0].name.name() == pair[1].name.name() {
            return Err(ReflectError::InvalidType(format!(
                "duplicate method {}",
                pair[0].name.name()
            )));
        }
    }
    for m in &methods {
        if m.typ.kind() != Kind::Func {
            return Err(ReflectError::InvalidType(format!(
                "method {} has non-function type {}",
                m.name.name(),
                m.typ
            )));
        }
    }

    let string = if methods.is_empty() {
        "interface {}".to_string()
    } else {
        let parts: Vec<String> = methods
            .iter()
            .map(|m| format!("{}{}", m.name.name(), m.typ.string().trim_start_matches("func")))
            .collect();
        format!("interface {{ {} }}", parts.join("; "))
    };

    Ok(TypeDescriptor {
        size: 2 * PTR_SIZE,
        ptr_data: 2 * PTR_SIZE,
        hash: fnv1(string.as_bytes()),
        flags: TypeFlags::empty(),
        align: PTR_SIZE as u8,
        field_align: PTR_SIZE as u8,
        kind: Kind::Interface,
        alg: Some(TypeAlg::GENERIC),
        gc: GcData::Mask(Box::new([0b11])),
        string: Name::type_string(&string),
        uncommon: OnceCell::new(),
        ptr_to_this: OnceCell::new(),
        ext: TypeExt::Interface(InterfaceType {
            pkg_path: pkg_path.map(str::to_string),
            methods,
        }),
    })
}

// ============================================================================
// Structs
// ============================================================================

/// Descriptor of a struct, laying fields out in declaration order
pub fn struct_descriptor(pkg_path: Option<&str>, decls: Vec<FieldDecl>) -> ReflectResult<TypeDescriptor> {
    let mut seen = FxHashSet::default();
    let mut offset = 0usize;
    let mut max_align = 1usize;
    let mut comparable = true;
    let mut regular = true;
    let mut fields = Vec::with_capacity(decls.len());
    let mut parts = Vec::with_capacity(decls.len());

    for decl in decls {
        let name = decl.name.name();
        if name != "_" && !seen.insert(name.to_string()) {
            return Err(ReflectError::InvalidType(format!("duplicate field {}", name)));
        }

        let t = decl.typ;
        let fa = t.field_align().max(1);
        let aligned = align_up(offset, fa);
        if aligned != offset {
            regular = false;
        }
        offset = aligned;
        max_align = max_align.max(fa);
        comparable &= t.comparable();
        regular &= t.flags().contains(TypeFlags::REGULAR_MEMORY) && name != "_";

        let mut part = if decl.embedded {
            t.string().to_string()
        } else {
            format!("{} {}", name, t.string())
        };
        if decl.name.has_tag() {
            part.push(' ');
            part.push_str(&quote(decl.name.tag()));
        }
        parts.push(part);

        fields.push(StructField {
            name: decl.name,
            typ: t,
            offset_embed: (offset << 1) | decl.embedded as usize,
        });
        offset = offset
            .checked_add(t.size())
            .ok_or_else(|| ReflectError::InvalidType("struct too large".to_string()))?;
    }

    // a trailing zero-size field must not point past the end
    if offset > 0 && fields.last().is_some_and(|f| f.typ.size() == 0) {
        offset += 1;
        regular = false;
    }
    let size = align_up(offset, max_align);
    if size != offset {
        regular = false;
    }

    let mut bits = BitVector::new();
    let mut ptr_data = 0;
    for f in &fields {
        if f.typ.has_pointers() {
            emit_gc_mask(&mut bits, f.offset() / PTR_SIZE, f.typ, 1);
            ptr_data = f.offset() + f.typ.ptr_data();
        }
    }

    let mut flags = TypeFlags::empty();
    if fields.len() == 1 && fields[0].typ.is_direct_iface() {
        flags |= TypeFlags::DIRECT_IFACE;
    }
    let alg = if comparable {
        if regular {
            flags |= TypeFlags::REGULAR_MEMORY;
            Some(TypeAlg::MEMORY)
        } else {
            Some(TypeAlg::GENERIC)
        }
    } else {
        None
    };

    let string = if parts.is_empty() {
        "struct {}".to_string()
    } else {
        format!("struct {{ {} }}", parts.join("; "))
    };

    Ok(TypeDescriptor {
        size,
        ptr_data,
        hash: fnv1(string.as_bytes()),
        flags,
        align: max_align as u8,
        field_align: max_align as u8,
        kind: Kind::Struct,
        alg,
        gc: GcData::from_bits(&bits),
        string: Name::type_string(&string),
        uncommon: OnceCell::new(),
        ptr_to_this: OnceCell::new(),
        ext: TypeExt::Struct(StructType {
            pkg_path: pkg_path.map(str::to_string),
            fields,
        }),
    })
}

/// Struct-kind descriptor with no visible fields
///
/// Used for runtime-internal records (map buckets, call frames) whose
/// layout is known only through size and GC data.
pub(crate) fn opaque_struct(string: &str, size: usize, align: usize, bits: &BitVector) -> TypeDescriptor {
    let gc = GcData::from_bits(bits);
    let ptr_data = bits.last_set().map_or(0, |i| (i + 1) * PTR_SIZE);
    TypeDescriptor {
        size,
        ptr_data,
        hash: fnv1(string.as_bytes()),
        flags: TypeFlags::empty(),
        align: align as u8,
        field_align: align as u8,
        kind: Kind::Struct,
        alg: None,
        gc,
        string: Name::type_string(string),
        uncommon: OnceCell::new(),
        ptr_to_this: OnceCell::new(),
        ext: TypeExt::Struct(StructType {
            pkg_path: None,
            fields: Vec::new(),
        }),
    }
}

// ============================================================================
// Maps
// ============================================================================

/// Whether `k == k` holds for every value of `t`
fn is_reflexive(t: TypeRef) -> bool {
    match t.kind() {
        Kind::Float32 | Kind::Float64 | Kind::Complex64 | Kind::Complex128 | Kind::Interface => false,
        Kind::Array => t.elem().is_some_and(is_reflexive),
        Kind::Struct => t
            .as_struct()
            .is_some_and(|s| s.fields().iter().all(|f| is_reflexive(f.typ))),
        _ => true,
    }
}

/// Whether equal keys may still differ in representation
fn need_key_update(t: TypeRef) -> bool {
    match t.kind() {
        Kind::Float32
        | Kind::Float64
        | Kind::Complex64
        | Kind::Complex128
        | Kind::Interface
        | Kind::String => true,
        Kind::Array => t.elem().is_some_and(need_key_update),
        Kind::Struct => t
            .as_struct()
            .is_some_and(|s| s.fields().iter().any(|f| need_key_update(f.typ))),
        _ => false,
    }
}

/// Bucket record for `map[key]elem`
///
/// ```text
/// +-------------+------------+-------------+----------+
/// | tophash [8] | keys [8]K  | elems [8]V  | overflow |
/// +-------------+------------+-------------+----------+
/// ```
///
/// Key and element slots hold a pointer instead of the value when the
/// value is too large to store inline.
fn bucket_descriptor(key: TypeRef, elem: TypeRef, key_slot: usize, elem_slot: usize) -> ReflectResult<TypeDescriptor> {
    let indirect_key = key.size() > MAX_KEY_SIZE;
    let indirect_elem = elem.size() > MAX_ELEM_SIZE;
    if (!indirect_key && key.align() > BUCKET_COUNT) || (!indirect_elem && elem.align() > BUCKET_COUNT) {
        return Err(ReflectError::InvalidType(format!(
            "map[{}]{}: alignment too large for bucket",
            key, elem
        )));
    }

    let keys_at = BUCKET_COUNT;
    let elems_at = keys_at + BUCKET_COUNT * key_slot;
    let overflow_at = align_up(elems_at + BUCKET_COUNT * elem_slot, PTR_SIZE);
    let size = overflow_at + PTR_SIZE;

    let mut bits = BitVector::new();
    let key_ptrs = indirect_key || key.has_pointers();
    let elem_ptrs = indirect_elem || elem.has_pointers();
    if key_ptrs || elem_ptrs {
        for i in 0..BUCKET_COUNT {
            if indirect_key {
                bits.set((keys_at + i * key_slot) / PTR_SIZE);
            } else if key.has_pointers() {
                emit_gc_mask(&mut bits, (keys_at + i * key_slot) / PTR_SIZE, key, 1);
            }
            if indirect_elem {
                bits.set((elems_at + i * elem_slot) / PTR_SIZE);
            } else if elem.has_pointers() {
                emit_gc_mask(&mut bits, (elems_at + i * elem_slot) / PTR_SIZE, elem, 1);
            }
        }
        bits.set(overflow_at / PTR_SIZE);
    }

    let string = format!("map.bucket[{}]{}", key.string(), elem.string());
    Ok(opaque_struct(&string, size, PTR_SIZE, &bits))
}

/// Descriptor of `map[key]elem`
///
/// Fails for key types without an equality algorithm.
pub fn map_descriptor(key: TypeRef, elem: TypeRef) -> ReflectResult<TypeDescriptor> {
    if !key.comparable() {
        return Err(ReflectError::InvalidMapKey(key.string().to_string()));
    }

    let indirect_key = key.size() > MAX_KEY_SIZE;
    let indirect_elem = elem.size() > MAX_ELEM_SIZE;
    let key_slot = if indirect_key { PTR_SIZE } else { key.size() };
    let elem_slot = if indirect_elem { PTR_SIZE } else { elem.size() };
    let bucket = bucket_descriptor(key, elem, key_slot, elem_slot)?;
    let bucket_size = u16::try_from(bucket.size())
        .map_err(|_| ReflectError::InvalidType("map bucket too large".to_string()))?;

    let string = format!("map[{}]{}", key.string(), elem.string());
    let hash = fnv1_extend(fnv1_extend(key.hash(), b"map"), &elem.hash().to_le_bytes());
    Ok(word_descriptor(
        Kind::Map,
        &string,
        hash,
        None,
        TypeExt::Map(MapType {
            key,
            elem,
            bucket: Box::new(bucket),
            key_slot: key_slot as u8,
            elem_slot: elem_slot as u8,
            bucket_size,
            indirect_key,
            indirect_elem,
            reflexive_key: is_reflexive(key),
            need_key_update: need_key_update(key),
        }),
    ))
}

// ============================================================================
// Named types
// ============================================================================

/// Descriptor of a declared type `name` in package `pkg_path`
///
/// The layout is copied from `underlying`; the result is a distinct type
/// with its own method table.
pub fn named_descriptor(pkg_path: &str, name: &str, underlying: &TypeDescriptor, mut methods: Vec<Method>) -> TypeDescriptor {
    let pkg_name = pkg_path.rsplit('/').next().unwrap_or(pkg_path);
    let string = if pkg_name.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", pkg_name, name)
    };
    methods.sort_by(|a, b| method_order(&a.name, &b.name));
    let exported = methods.iter().take_while(|m| m.name.is_exported()).count();

    let mut t = underlying.duplicate();
    t.flags |= TypeFlags::NAMED;
    t.hash = fnv1(format!("{}.{}", pkg_path, name).as_bytes());
    t.string = Name::type_string(&string);
    t.uncommon = OnceCell::with_value(UncommonType {
        pkg_path: Some(pkg_path.to_string()),
        methods,
        exported,
    });
    t
}
