//! Refract Core Runtime
//!
//! Runtime type introspection and dynamic value manipulation:
//! - Type descriptors, name records and struct tags
//! - Value handles with per-kind accessors and conversion
//! - Composite type synthesis with a canonical cache
//! - GC pointer maps and a mark-sweep heap
//! - Dynamic calls and handler-backed functions
//! - Cycle-safe deep equality

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod call;
pub mod config;
pub mod gc;
pub mod runtime;
pub mod types;
pub mod value;

pub use call::{make_func, FrameLayout, Handler};
pub use config::Config;
pub use gc::{GarbageCollector, Heap};
pub use runtime::{EmptyInterface, FuncObject};
pub use types::{basic, Kind, ModuleBuilder, TypeDescriptor, TypeRef, TypeRegistry};
pub use value::{deep_equal, type_of, value_of, ToValue, Value};

/// Reflection errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReflectError {
    /// Malformed struct tag
    #[error("Tag syntax error at byte {pos}: {reason}")]
    TagSyntax {
        /// Byte offset into the tag
        pos: usize,
        /// What was expected
        reason: &'static str,
    },

    /// Malformed name record
    #[error("Invalid name record: {0}")]
    NameRecord(&'static str),

    /// A string does not fit in a name record
    #[error("Name too long: {0} bytes")]
    NameTooLong(usize),

    /// Wrong number of call arguments
    #[error("Wrong argument count: want {want}, got {got}")]
    ArgCount {
        /// Expected count
        want: usize,
        /// Supplied count
        got: usize,
    },

    /// A call argument cannot be assigned to its parameter
    #[error("Argument {index}: {from} is not assignable to {to}")]
    NotAssignable {
        /// Argument position
        index: usize,
        /// Argument type
        from: String,
        /// Parameter type
        to: String,
    },

    /// Variadic call mismatch
    #[error("Variadic mismatch: {0}")]
    Variadic(String),

    /// Call through a nil function value
    #[error("Call of nil function")]
    NilFunction,

    /// Value obtained through an unexported field or method
    #[error("Use of unexported {0}")]
    Unexported(String),

    /// No conversion between two types
    #[error("Cannot convert {from} to {to}")]
    NotConvertible {
        /// Source type
        from: String,
        /// Target type
        to: String,
    },

    /// Map key type without equality
    #[error("Invalid map key type {0}")]
    InvalidMapKey(String),

    /// Array size overflows the address space
    #[error("Array too large: [{len}]{elem}")]
    ArrayTooLarge {
        /// Element type
        elem: String,
        /// Requested length
        len: usize,
    },

    /// Type declaration rejected
    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// Operation not valid for the value
    #[error("Misuse: {0}")]
    Misuse(String),
}

/// Reflection result
pub type ReflectResult<T> = Result<T, ReflectError>;
