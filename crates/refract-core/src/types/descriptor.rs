//! Type descriptors
//!
//! A [`TypeDescriptor`] is the immutable runtime record for one type. The
//! common header (size, alignment, pointer-bearing prefix, equality/hash
//! algorithm, GC data, textual form) is followed by a kind-specific
//! extension held in [`TypeExt`]; callers downcast through the kind-checked
//! `as_*` accessors.
//!
//! Descriptors are never freed. Compiler-emitted descriptors are created
//! when a [`super::Module`] is built and synthesized ones when the
//! [`super::TypeRegistry`] first sees a shape; both are leaked to
//! `&'static` so that a [`TypeRef`] can be copied freely. Pointer identity
//! is type identity.

use super::alg::TypeAlg;
use super::gcdata::GcData;
use super::kind::{ChanDir, Kind, PTR_SIZE};
use super::name::Name;
use super::tag::StructTag;
use crate::runtime::CallFn;
use bitflags::bitflags;
use once_cell::sync::OnceCell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Shared reference to an interned type descriptor
pub type TypeRef = &'static TypeDescriptor;

bitflags! {
    /// Descriptor-level flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u8 {
        /// Values are stored directly in an interface data word
        const DIRECT_IFACE = 1 << 0;
        /// The type has a declared name
        const NAMED = 1 << 1;
        /// Equality and hashing may treat the value as plain bytes
        const REGULAR_MEMORY = 1 << 2;
    }
}

/// Runtime type descriptor
pub struct TypeDescriptor {
    pub(crate) size: usize,
    pub(crate) ptr_data: usize,
    pub(crate) hash: u32,
    pub(crate) flags: TypeFlags,
    pub(crate) align: u8,
    pub(crate) field_align: u8,
    pub(crate) kind: Kind,
    pub(crate) alg: Option<TypeAlg>,
    pub(crate) gc: GcData,
    pub(crate) string: Name,
    pub(crate) uncommon: OnceCell<UncommonType>,
    pub(crate) ptr_to_this: OnceCell<TypeRef>,
    pub(crate) ext: TypeExt,
}

/// Extended info present on named or method-bearing types
#[derive(Debug, Clone)]
pub struct UncommonType {
    pub(crate) pkg_path: Option<String>,
    /// Exported methods first, each group sorted by name
    pub(crate) methods: Vec<Method>,
    pub(crate) exported: usize,
}

/// A concrete method in a method table
#[derive(Clone)]
pub struct Method {
    /// Method name (package path set for unexported methods)
    pub name: Name,
    /// Function type without the receiver
    pub mtyp: TypeRef,
    /// Implementation; the receiver slot holds the address of the `T` value
    /// for methods declared on both `T` and `*T`
    pub func: CallFn,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name.name())
            .field("mtyp", &self.mtyp.string())
            .finish()
    }
}

/// A method declared by an interface type
#[derive(Debug, Clone)]
pub struct IMethod {
    /// Method name
    pub name: Name,
    /// Function type without the receiver
    pub typ: TypeRef,
}

/// Kind-specific descriptor extension
#[derive(Debug, Clone)]
pub enum TypeExt {
    /// Basic kinds carry no extension
    Basic,
    /// Fixed-length array
    Array(ArrayType),
    /// Channel
    Chan(ChanType),
    /// Function signature
    Func(FuncType),
    /// Interface method set
    Interface(InterfaceType),
    /// Hash map
    Map(MapType),
    /// Pointer
    Ptr(PtrType),
    /// Slice
    Slice(SliceType),
    /// Struct field table
    Struct(StructType),
}

/// Array extension
#[derive(Debug, Clone)]
pub struct ArrayType {
    pub(crate) elem: TypeRef,
    pub(crate) len: usize,
}

/// Channel extension
#[derive(Debug, Clone)]
pub struct ChanType {
    pub(crate) elem: TypeRef,
    pub(crate) dir: ChanDir,
}

/// Function extension
#[derive(Debug, Clone)]
pub struct FuncType {
    pub(crate) ins: Vec<TypeRef>,
    pub(crate) outs: Vec<TypeRef>,
    pub(crate) variadic: bool,
}

/// Interface extension
#[derive(Debug, Clone)]
pub struct InterfaceType {
    pub(crate) pkg_path: Option<String>,
    /// Exported methods first, each group sorted by name
    pub(crate) methods: Vec<IMethod>,
}

/// Map extension with the derived bucket layout
#[derive(Debug)]
pub struct MapType {
    pub(crate) key: TypeRef,
    pub(crate) elem: TypeRef,
    pub(crate) bucket: Box<TypeDescriptor>,
    pub(crate) key_slot: u8,
    pub(crate) elem_slot: u8,
    pub(crate) bucket_size: u16,
    pub(crate) indirect_key: bool,
    pub(crate) indirect_elem: bool,
    pub(crate) reflexive_key: bool,
    pub(crate) need_key_update: bool,
}

/// Pointer extension
///
/// The element is a cell so that recursive types (`*Node` inside `Node`)
/// can be declared before their element is complete.
#[derive(Debug, Clone)]
pub struct PtrType {
    pub(crate) elem: OnceCell<TypeRef>,
}

/// Slice extension
#[derive(Debug, Clone)]
pub struct SliceType {
    pub(crate) elem: TypeRef,
}

/// Struct extension
#[derive(Debug, Clone)]
pub struct StructType {
    pub(crate) pkg_path: Option<String>,
    /// Fields in ascending offset order
    pub(crate) fields: Vec<StructField>,
}

/// A struct field
#[derive(Debug, Clone)]
pub struct StructField {
    /// Field name; the tag travels inside the name record
    pub name: Name,
    /// Field type
    pub typ: TypeRef,
    /// `offset << 1 | embedded`
    pub offset_embed: usize,
}

impl StructField {
    /// Byte offset within the struct
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset_embed >> 1
    }

    /// Whether the field is an embedded (anonymous) field
    #[inline]
    pub fn embedded(&self) -> bool {
        self.offset_embed & 1 != 0
    }

    /// The field's struct tag
    pub fn tag(&self) -> StructTag<'_> {
        StructTag(self.name.tag())
    }
}

/// Per-field record delivered by field enumeration
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo<'a> {
    /// Field index
    pub index: usize,
    /// Field name
    pub name: &'a str,
    /// Field type
    pub typ: TypeRef,
    /// Struct tag
    pub tag: StructTag<'a>,
    /// Declaring package for unexported fields
    pub pkg_path: Option<&'a str>,
    /// Embedded field
    pub embedded: bool,
    /// Exported field
    pub exported: bool,
    /// Byte offset within the struct
    pub offset: usize,
}

/// Per-method record delivered by method enumeration
#[derive(Debug, Clone, Copy)]
pub struct MethodInfo<'a> {
    /// Method index among the enumerated methods
    pub index: usize,
    /// Method name
    pub name: &'a str,
    /// Parameter types, without the receiver
    pub ins: &'a [TypeRef],
    /// Result types
    pub outs: &'a [TypeRef],
}

/// Ordering used by every method table: exported first, then by name
pub(crate) fn method_order(a: &Name, b: &Name) -> Ordering {
    b.is_exported()
        .cmp(&a.is_exported())
        .then_with(|| a.name().cmp(b.name()))
}

impl TypeDescriptor {
    /// Kind of the type
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Size of a value in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment of a value in memory
    #[inline]
    pub fn align(&self) -> usize {
        self.align as usize
    }

    /// Alignment when used as a struct field
    #[inline]
    pub fn field_align(&self) -> usize {
        self.field_align as usize
    }

    /// Byte length of the prefix that can contain pointers
    #[inline]
    pub fn ptr_data(&self) -> usize {
        self.ptr_data
    }

    /// Whether any word of a value may be a pointer
    #[inline]
    pub fn has_pointers(&self) -> bool {
        self.ptr_data != 0
    }

    /// GC pointer map or program
    #[inline]
    pub fn gc_data(&self) -> &GcData {
        &self.gc
    }

    /// Precomputed hash of the type
    #[inline]
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Descriptor flags
    #[inline]
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    /// Whether values are stored directly in an interface word
    #[inline]
    pub fn is_direct_iface(&self) -> bool {
        self.flags.contains(TypeFlags::DIRECT_IFACE)
    }

    /// Equality/hash algorithm, absent for non-comparable types
    #[inline]
    pub fn alg(&self) -> Option<&TypeAlg> {
        self.alg.as_ref()
    }

    /// Whether values of the type can be compared with `==`
    #[inline]
    pub fn comparable(&self) -> bool {
        self.alg.is_some()
    }

    /// Textual form, e.g. `[]main.User`
    pub fn string(&self) -> &str {
        self.string.name()
    }

    /// Whether the type has a declared name
    #[inline]
    pub fn is_named(&self) -> bool {
        self.flags.contains(TypeFlags::NAMED)
    }

    /// Declared name without the package qualifier; empty for unnamed types
    pub fn name(&self) -> &str {
        if !self.is_named() {
            return "";
        }
        let s = self.string();
        let mut i = s.len();
        while i > 0 {
            i -= 1;
            if s.as_bytes()[i] == b'.' {
                return &s[i + 1..];
            }
        }
        s
    }

    /// Declaring package of a named type
    pub fn pkg_path(&self) -> Option<&str> {
        if !self.is_named() {
            return None;
        }
        self.uncommon.get().and_then(|u| u.pkg_path.as_deref())
    }

    /// Extended info, present on named or method-bearing types
    #[inline]
    pub fn uncommon(&self) -> Option<&UncommonType> {
        self.uncommon.get()
    }

    /// Kind-specific extension
    #[inline]
    pub fn ext(&self) -> &TypeExt {
        &self.ext
    }

    /// Cached pointer-to-this type, if it has been created
    pub fn ptr_to_this(&self) -> Option<TypeRef> {
        self.ptr_to_this.get().copied()
    }

    /// Size in bits of a numeric type
    pub fn bits(&self) -> Option<usize> {
        if self.kind.is_numeric() {
            Some(self.size * 8)
        } else {
            None
        }
    }

    // ========================================================================
    // Kind-checked downcasts
    // ========================================================================

    /// Array extension
    pub fn as_array(&self) -> Option<&ArrayType> {
        match &self.ext {
            TypeExt::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Channel extension
    pub fn as_chan(&self) -> Option<&ChanType> {
        match &self.ext {
            TypeExt::Chan(c) => Some(c),
            _ => None,
        }
    }

    /// Function extension
    pub fn as_func(&self) -> Option<&FuncType> {
        match &self.ext {
            TypeExt::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Interface extension
    pub fn as_interface(&self) -> Option<&InterfaceType> {
        match &self.ext {
            TypeExt::Interface(i) => Some(i),
            _ => None,
        }
    }

    /// Map extension
    pub fn as_map(&self) -> Option<&MapType> {
        match &self.ext {
            TypeExt::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Pointer extension
    pub fn as_ptr(&self) -> Option<&PtrType> {
        match &self.ext {
            TypeExt::Ptr(p) => Some(p),
            _ => None,
        }
    }

    /// Slice extension
    pub fn as_slice(&self) -> Option<&SliceType> {
        match &self.ext {
            TypeExt::Slice(s) => Some(s),
            _ => None,
        }
    }

    /// Struct extension
    pub fn as_struct(&self) -> Option<&StructType> {
        match &self.ext {
            TypeExt::Struct(s) => Some(s),
            _ => None,
        }
    }

    // ========================================================================
    // Common element accessors
    // ========================================================================

    /// Element type of an array, channel, map, pointer or slice
    pub fn elem(&self) -> Option<TypeRef> {
        match &self.ext {
            TypeExt::Array(a) => Some(a.elem),
            TypeExt::Chan(c) => Some(c.elem),
            TypeExt::Map(m) => Some(m.elem),
            TypeExt::Ptr(p) => p.elem.get().copied(),
            TypeExt::Slice(s) => Some(s.elem),
            _ => None,
        }
    }

    /// Key type of a map
    pub fn key(&self) -> Option<TypeRef> {
        self.as_map().map(|m| m.key)
    }

    /// Length of an array type
    pub fn len(&self) -> Option<usize> {
        self.as_array().map(|a| a.len)
    }

    /// Direction of a channel type
    pub fn chan_dir(&self) -> Option<ChanDir> {
        self.as_chan().map(|c| c.dir)
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Number of parameters of a function type
    pub fn num_in(&self) -> usize {
        self.as_func().map_or(0, |f| f.ins.len())
    }

    /// Number of results of a function type
    pub fn num_out(&self) -> usize {
        self.as_func().map_or(0, |f| f.outs.len())
    }

    /// Parameter type `i` of a function type
    pub fn in_(&self, i: usize) -> Option<TypeRef> {
        self.as_func().and_then(|f| f.ins.get(i).copied())
    }

    /// Result type `i` of a function type
    pub fn out(&self, i: usize) -> Option<TypeRef> {
        self.as_func().and_then(|f| f.outs.get(i).copied())
    }

    /// Whether the final parameter of a function type is variadic
    pub fn is_variadic(&self) -> bool {
        self.as_func().is_some_and(|f| f.variadic)
    }

    // ========================================================================
    // Fields
    // ========================================================================

    /// Number of struct fields
    pub fn num_field(&self) -> usize {
        self.as_struct().map_or(0, |s| s.fields.len())
    }

    /// Struct field `i`
    pub fn field(&self, i: usize) -> Option<&StructField> {
        self.as_struct().and_then(|s| s.fields.get(i))
    }

    /// Struct field with the given name, and its index
    pub fn field_by_name(&self, name: &str) -> Option<(usize, &StructField)> {
        self.as_struct()?
            .fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name.name() == name)
    }

    /// Enumerate struct fields in declaration order
    pub fn fields(&self, mut f: impl FnMut(FieldInfo<'_>)) {
        let Some(st) = self.as_struct() else {
            return;
        };
        for (index, field) in st.fields.iter().enumerate() {
            let exported = field.name.is_exported();
            let pkg_path = if exported {
                None
            } else {
                field.name.pkg_path().or(st.pkg_path.as_deref())
            };
            f(FieldInfo {
                index,
                name: field.name.name(),
                typ: field.typ,
                tag: field.tag(),
                pkg_path,
                embedded: field.embedded(),
                exported,
                offset: field.offset(),
            });
        }
    }

    // ========================================================================
    // Methods
    // ========================================================================

    /// Exported methods of a concrete type
    pub fn exported_methods(&self) -> &[Method] {
        match self.uncommon.get() {
            Some(u) => &u.methods[..u.exported],
            None => &[],
        }
    }

    /// Every method of a concrete type, exported first
    pub fn all_methods(&self) -> &[Method] {
        match self.uncommon.get() {
            Some(u) => &u.methods,
            None => &[],
        }
    }

    /// Methods declared by an interface type
    pub fn interface_methods(&self) -> &[IMethod] {
        self.as_interface().map_or(&[], |i| i.methods.as_slice())
    }

    /// Number of methods: all methods of an interface, exported methods otherwise
    pub fn num_method(&self) -> usize {
        if self.kind == Kind::Interface {
            self.interface_methods().len()
        } else {
            self.exported_methods().len()
        }
    }

    /// Exported method `i` of a concrete type
    pub fn method(&self, i: usize) -> Option<&Method> {
        self.exported_methods().get(i)
    }

    /// Exported method with the given name, and its index
    pub fn method_by_name(&self, name: &str) -> Option<(usize, &Method)> {
        let methods = self.exported_methods();
        methods
            .binary_search_by(|m| m.name.name().cmp(name))
            .ok()
            .map(|i| (i, &methods[i]))
    }

    /// Enumerate methods; interface types report their declared methods
    pub fn methods(&self, mut f: impl FnMut(MethodInfo<'_>)) {
        if self.kind == Kind::Interface {
            for (index, m) in self.interface_methods().iter().enumerate() {
                let (ins, outs) = signature(m.typ);
                f(MethodInfo {
                    index,
                    name: m.name.name(),
                    ins,
                    outs,
                });
            }
            return;
        }
        for (index, m) in self.exported_methods().iter().enumerate() {
            let (ins, outs) = signature(m.mtyp);
            f(MethodInfo {
                index,
                name: m.name.name(),
                ins,
                outs,
            });
        }
    }

    /// Copy of the layout and extension as a new, distinct descriptor
    ///
    /// The copy has no pointer-to-this back-reference.
    pub(crate) fn duplicate(&self) -> TypeDescriptor {
        TypeDescriptor {
            size: self.size,
            ptr_data: self.ptr_data,
            hash: self.hash,
            flags: self.flags,
            align: self.align,
            field_align: self.field_align,
            kind: self.kind,
            alg: self.alg,
            gc: self.gc.clone(),
            string: self.string.clone(),
            uncommon: self.uncommon.clone(),
            ptr_to_this: OnceCell::new(),
            ext: self.ext.clone(),
        }
    }

    /// Number of pointer-sized words covered by the pointer prefix
    #[inline]
    pub(crate) fn ptr_words(&self) -> usize {
        self.ptr_data.div_ceil(PTR_SIZE)
    }
}

fn signature(t: TypeRef) -> (&'static [TypeRef], &'static [TypeRef]) {
    match t.as_func() {
        Some(f) => (&f.ins, &f.outs),
        None => (&[], &[]),
    }
}

impl ArrayType {
    /// Element type
    #[inline]
    pub fn elem(&self) -> TypeRef {
        self.elem
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl FuncType {
    /// Parameter types
    pub fn ins(&self) -> &[TypeRef] {
        &self.ins
    }

    /// Result types
    pub fn outs(&self) -> &[TypeRef] {
        &self.outs
    }

    /// Whether the final parameter is variadic
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }
}

impl MapType {
    /// Key type
    #[inline]
    pub fn key(&self) -> TypeRef {
        self.key
    }

    /// Element type
    #[inline]
    pub fn elem(&self) -> TypeRef {
        self.elem
    }

    /// Synthesized bucket record type
    #[inline]
    pub fn bucket(&self) -> &TypeDescriptor {
        &self.bucket
    }

    /// Size of a key slot (a pointer when keys are indirect)
    #[inline]
    pub fn key_slot(&self) -> usize {
        self.key_slot as usize
    }

    /// Size of an element slot (a pointer when elements are indirect)
    #[inline]
    pub fn elem_slot(&self) -> usize {
        self.elem_slot as usize
    }

    /// Size of one bucket record
    #[inline]
    pub fn bucket_size(&self) -> usize {
        self.bucket_size as usize
    }

    /// Keys are stored through one level of indirection
    #[inline]
    pub fn indirect_key(&self) -> bool {
        self.indirect_key
    }

    /// Elements are stored through one level of indirection
    #[inline]
    pub fn indirect_elem(&self) -> bool {
        self.indirect_elem
    }

    /// `k == k` holds for every key
    #[inline]
    pub fn reflexive_key(&self) -> bool {
        self.reflexive_key
    }

    /// Overwriting an entry must also overwrite its key
    #[inline]
    pub fn need_key_update(&self) -> bool {
        self.need_key_update
    }
}

impl Clone for MapType {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            elem: self.elem,
            bucket: Box::new(self.bucket.duplicate()),
            key_slot: self.key_slot,
            elem_slot: self.elem_slot,
            bucket_size: self.bucket_size,
            indirect_key: self.indirect_key,
            indirect_elem: self.indirect_elem,
            reflexive_key: self.reflexive_key,
            need_key_update: self.need_key_update,
        }
    }
}

impl PtrType {
    /// Pointee type
    ///
    /// # Panics
    ///
    /// Panics if a forward-declared pointer was never resolved; modules
    /// reject unresolved forward pointers when they are built.
    pub fn elem(&self) -> TypeRef {
        match self.elem.get() {
            Some(t) => t,
            None => panic!("pointer type used before its element was resolved"),
        }
    }
}

impl SliceType {
    /// Element type
    #[inline]
    pub fn elem(&self) -> TypeRef {
        self.elem
    }
}

impl StructType {
    /// Fields in ascending offset order
    pub fn fields(&self) -> &[StructField] {
        &self.fields
    }

    /// Package of unexported fields
    pub fn pkg_path(&self) -> Option<&str> {
        self.pkg_path.as_deref()
    }
}

impl InterfaceType {
    /// Declared methods, exported first and sorted by name
    pub fn methods(&self) -> &[IMethod] {
        &self.methods
    }

    /// Package of unexported methods
    pub fn pkg_path(&self) -> Option<&str> {
        self.pkg_path.as_deref()
    }
}

impl UncommonType {
    /// Declaring package
    pub fn pkg_path(&self) -> Option<&str> {
        self.pkg_path.as_deref()
    }

    /// Every method, exported first
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }
}

// Identity semantics: two descriptors are the same type only if they are
// the same record.
impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self as *const TypeDescriptor as usize).hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("string", &self.string())
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("ptr_data", &self.ptr_data)
            .field("gc", &self.gc)
            .field("comparable", &self.comparable())
            .finish()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.string())
    }
}
