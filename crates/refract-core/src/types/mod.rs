//! Runtime type information
//!
//! Descriptors, name records and tags, GC pointer data, the canonical
//! registry of synthesized composite types and the relations between types.

pub mod alg;
pub mod builtin;
pub mod descriptor;
pub mod factory;
pub mod gcdata;
pub mod kind;
pub mod module;
pub mod name;
pub mod registry;
pub mod relation;
pub mod tag;

pub use alg::TypeAlg;
pub use builtin::{basic, empty_interface, try_basic};
pub use descriptor::{
    ArrayType, ChanType, FieldInfo, FuncType, IMethod, InterfaceType, MapType, Method, MethodInfo,
    PtrType, SliceType, StructField, StructType, TypeDescriptor, TypeExt, TypeFlags, TypeRef,
    UncommonType,
};
pub use gcdata::{BitVector, GcData};
pub use kind::{ChanDir, Kind, PTR_SIZE};
pub use module::{Module, ModuleBuilder, NamedBuilder, StructBuilder};
pub use name::Name;
pub use registry::{TypeRegistry, TypeRegistryBuilder};
pub use relation::{
    assignable_to, conversion_op, convertible_to, directly_assignable, identical_underlying, implements, ConversionOp,
};
pub use tag::{StructTag, Tag, Tags};
