//! Handler-backed function values
//!
//! [`make_func`] wraps a host closure as a function value of an arbitrary
//! signature. Callers use the ordinary calling convention; the trampoline
//! unpacks the frame into value handles, runs the handler and writes its
//! results back at the output offsets.

use super::layout::FrameLayout;
use crate::config::misuse;
use crate::gc::Heap;
use crate::runtime::{FuncEnv, FuncObject};
use crate::types::TypeRef;
use crate::value::convert::assign_to;
use crate::value::{alloc, store, type_name, typedmemmove, Flags, Value};

/// Host implementation of a dynamically created function
///
/// Receives one handle per input and must return exactly one value per
/// output, each assignable to its result type.
pub type Handler = dyn Fn(&[Value]) -> Vec<Value>;

/// Environment of a handler-backed function object
pub(crate) struct HandlerEnv {
    ft: TypeRef,
    layout: &'static FrameLayout,
    handler: Box<Handler>,
}

/// Function value of type `ft` implemented by `handler`
///
/// Values captured by the handler are not traced by the collector; keep
/// them rooted for as long as the function may run.
pub fn make_func(ft: TypeRef, handler: impl Fn(&[Value]) -> Vec<Value> + 'static) -> Option<Value> {
    let Some(layout) = FrameLayout::of(ft, None) else {
        misuse("make_func", format_args!("{} is not a function type", ft));
        return None;
    };
    let obj = FuncObject {
        code: handler_call,
        env: FuncEnv::Handler(HandlerEnv {
            ft,
            layout,
            handler: Box::new(handler),
        }),
    };
    let p = Heap::global().alloc_native(obj);
    tracing::debug!(func = %ft, frame = layout.size(), "handler function created");
    Some(Value::direct(ft, p as *mut u8, Flags::default()))
}

/// Trampoline behind every handler-backed function
///
/// # Panics
///
/// Panics if the handler returns the wrong number of results, or a result
/// that is invalid, read-only or not assignable to its declared type.
///
/// # Safety
///
/// `closure` must be a handler-backed function object and `frame` a frame
/// laid out for its signature.
unsafe fn handler_call(closure: *const FuncObject, frame: *mut u8) {
    let FuncEnv::Handler(env) = &(*closure).env else {
        panic!("refract: handler trampoline called on a plain function");
    };
    let Some(func) = env.ft.as_func() else {
        panic!("refract: make_func of non-function type {}", env.ft);
    };

    // copy inputs out so the handler may keep them past the call
    let args: Vec<Value> = func
        .ins()
        .iter()
        .zip(env.layout.in_offsets())
        .map(|(&t, &off)| {
            let p = alloc(t);
            typedmemmove(t, p, frame.add(off));
            Value::at(t, p, Flags::default())
        })
        .collect();

    let results = (env.handler)(&args);

    let outs = func.outs();
    if results.len() != outs.len() {
        panic!(
            "refract: function created by make_func returned {} values, want {}",
            results.len(),
            outs.len()
        );
    }
    for (i, ((r, &t), &off)) in results.iter().zip(outs).zip(env.layout.out_offsets()).enumerate() {
        if !r.is_valid() || r.is_read_only() {
            panic!(
                "refract: function created by make_func returned an invalid or read-only value for result {}",
                i
            );
        }
        let Some(x) = assign_to(r, t) else {
            panic!(
                "refract: function created by make_func returned wrong type: have {} for {}",
                type_name(r),
                t
            );
        };
        store(t, frame.add(off), &x);
    }
}
