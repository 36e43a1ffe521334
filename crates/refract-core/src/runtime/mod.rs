//! Runtime representations
//!
//! Memory layouts shared by the engine and the values it manipulates:
//! string, slice and interface headers, function objects, interface
//! dispatch tables and the map runtime.

pub mod func;
pub mod hashmap;
pub mod itab;
pub mod repr;

pub use func::{CallFn, FuncObject};
pub(crate) use func::FuncEnv;
pub use hashmap::MapObject;
pub use itab::get_itab;
pub use repr::{
    Complex128, Complex64, Eface, EmptyInterface, Itab, NonEmptyInterface, SliceHeader, StringHeader,
};
