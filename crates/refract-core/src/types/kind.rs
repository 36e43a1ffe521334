//! Kind classification
//!
//! A [`Kind`] is the coarse shape of a type, independent of any declared
//! name. Two named types over `int64` are distinct types but share the
//! `Int64` kind.

use std::fmt;

/// Size of a pointer-sized word on the running platform
pub const PTR_SIZE: usize = std::mem::size_of::<usize>();

/// Coarse classification of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Kind {
    /// Not a type; the kind of an invalid value handle
    #[default]
    Invalid = 0,
    /// Boolean
    Bool,
    /// Pointer-sized signed integer
    Int,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// Pointer-sized unsigned integer
    Uint,
    /// 8-bit unsigned integer
    Uint8,
    /// 16-bit unsigned integer
    Uint16,
    /// 32-bit unsigned integer
    Uint32,
    /// 64-bit unsigned integer
    Uint64,
    /// Unsigned integer large enough to hold a pointer
    Uintptr,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Complex number of two 32-bit floats
    Complex64,
    /// Complex number of two 64-bit floats
    Complex128,
    /// Fixed-length array
    Array,
    /// Channel
    Chan,
    /// Function
    Func,
    /// Interface
    Interface,
    /// Hash map
    Map,
    /// Typed pointer
    Ptr,
    /// Slice
    Slice,
    /// String
    String,
    /// Struct
    Struct,
    /// Untyped raw pointer
    UnsafePointer,
}

impl Kind {
    /// All kinds in declaration order
    pub const ALL: [Kind; 27] = [
        Kind::Invalid,
        Kind::Bool,
        Kind::Int,
        Kind::Int8,
        Kind::Int16,
        Kind::Int32,
        Kind::Int64,
        Kind::Uint,
        Kind::Uint8,
        Kind::Uint16,
        Kind::Uint32,
        Kind::Uint64,
        Kind::Uintptr,
        Kind::Float32,
        Kind::Float64,
        Kind::Complex64,
        Kind::Complex128,
        Kind::Array,
        Kind::Chan,
        Kind::Func,
        Kind::Interface,
        Kind::Map,
        Kind::Ptr,
        Kind::Slice,
        Kind::String,
        Kind::Struct,
        Kind::UnsafePointer,
    ];

    /// Display name of the kind
    pub fn name(self) -> &'static str {
        match self {
            Kind::Invalid => "invalid",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Int8 => "int8",
            Kind::Int16 => "int16",
            Kind::Int32 => "int32",
            Kind::Int64 => "int64",
            Kind::Uint => "uint",
            Kind::Uint8 => "uint8",
            Kind::Uint16 => "uint16",
            Kind::Uint32 => "uint32",
            Kind::Uint64 => "uint64",
            Kind::Uintptr => "uintptr",
            Kind::Float32 => "float32",
            Kind::Float64 => "float64",
            Kind::Complex64 => "complex64",
            Kind::Complex128 => "complex128",
            Kind::Array => "array",
            Kind::Chan => "chan",
            Kind::Func => "func",
            Kind::Interface => "interface",
            Kind::Map => "map",
            Kind::Ptr => "ptr",
            Kind::Slice => "slice",
            Kind::String => "string",
            Kind::Struct => "struct",
            Kind::UnsafePointer => "unsafe.Pointer",
        }
    }

    /// Signed integer kinds
    #[inline]
    pub fn is_signed_int(self) -> bool {
        matches!(
            self,
            Kind::Int | Kind::Int8 | Kind::Int16 | Kind::Int32 | Kind::Int64
        )
    }

    /// Unsigned integer kinds, including `Uintptr`
    #[inline]
    pub fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            Kind::Uint | Kind::Uint8 | Kind::Uint16 | Kind::Uint32 | Kind::Uint64 | Kind::Uintptr
        )
    }

    /// Float kinds
    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, Kind::Float32 | Kind::Float64)
    }

    /// Complex kinds
    #[inline]
    pub fn is_complex(self) -> bool {
        matches!(self, Kind::Complex64 | Kind::Complex128)
    }

    /// Any integer, float or complex kind
    #[inline]
    pub fn is_numeric(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int() || self.is_float() || self.is_complex()
    }

    /// Kinds with a builtin descriptor and no element/field structure
    pub fn is_basic(self) -> bool {
        self.is_numeric()
            || matches!(self, Kind::Bool | Kind::String | Kind::UnsafePointer)
    }

    /// Kinds whose representation is exactly one pointer word
    ///
    /// Values of these kinds are stored directly in an interface word.
    #[inline]
    pub fn is_pointer_shaped(self) -> bool {
        matches!(
            self,
            Kind::Ptr | Kind::Map | Kind::Chan | Kind::Func | Kind::UnsafePointer
        )
    }

    /// Kinds that may legitimately hold a nil value
    #[inline]
    pub fn is_nilable(self) -> bool {
        matches!(
            self,
            Kind::Chan
                | Kind::Func
                | Kind::Map
                | Kind::Ptr
                | Kind::UnsafePointer
                | Kind::Interface
                | Kind::Slice
        )
    }

    /// Size in bytes of a value of a basic kind
    pub fn basic_size(self) -> Option<usize> {
        let size = match self {
            Kind::Bool | Kind::Int8 | Kind::Uint8 => 1,
            Kind::Int16 | Kind::Uint16 => 2,
            Kind::Int32 | Kind::Uint32 | Kind::Float32 => 4,
            Kind::Int64 | Kind::Uint64 | Kind::Float64 | Kind::Complex64 => 8,
            Kind::Complex128 => 16,
            Kind::Int | Kind::Uint | Kind::Uintptr | Kind::UnsafePointer => PTR_SIZE,
            Kind::String => 2 * PTR_SIZE,
            _ => return None,
        };
        Some(size)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a channel type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChanDir {
    /// Receive-only
    Recv,
    /// Send-only
    Send,
    /// Bidirectional
    Both,
}

impl ChanDir {
    /// Prefix used in the textual form of a channel type
    pub fn prefix(self) -> &'static str {
        match self {
            ChanDir::Recv => "<-chan ",
            ChanDir::Send => "chan<- ",
            ChanDir::Both => "chan ",
        }
    }
}
