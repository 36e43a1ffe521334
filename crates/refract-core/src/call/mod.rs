//! Call engine
//!
//! Frame layouts, dynamic invocation of function values and bound methods,
//! and handler-backed functions built at run time.

pub mod invoke;
pub mod layout;
pub mod make_func;

pub(crate) use invoke::{method_value_call, MethodEnv};
pub use layout::FrameLayout;
pub(crate) use make_func::HandlerEnv;
pub use make_func::{make_func, Handler};

use crate::config::misuse;
use crate::gc::Heap;
use crate::runtime::{CallFn, FuncObject};
use crate::types::TypeRef;
use crate::value::{Flags, Value};

/// Function value of type `ft` running the native `code`
pub fn func_value(ft: TypeRef, code: CallFn) -> Option<Value> {
    if ft.as_func().is_none() {
        misuse("func_value", format_args!("{} is not a function type", ft));
        return None;
    }
    let p = Heap::global().alloc_native(FuncObject::new(code));
    Some(Value::direct(ft, p as *mut u8, Flags::default()))
}
