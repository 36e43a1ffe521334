//! Function objects
//!
//! A function value is one pointer word referring to a [`FuncObject`]. The
//! object carries the code pointer plus an environment: nothing for plain
//! functions, the handler for handler-backed callables, or the bound
//! receiver for method values.
//!
//! Every implementation shares one calling convention: the callee receives
//! its own function object and a raw argument frame laid out by
//! [`crate::call::FrameLayout`]. Arguments sit at their input offsets and
//! the callee writes results at the output offsets.

use crate::call::{HandlerEnv, MethodEnv};
use crate::gc::Trace;

/// Native calling convention for every callable
///
/// `closure` is the function object being called (null for direct method
/// calls); `frame` is the argument frame.
pub type CallFn = unsafe fn(closure: *const FuncObject, frame: *mut u8);

/// Heap-resident function object
pub struct FuncObject {
    pub(crate) code: CallFn,
    pub(crate) env: FuncEnv,
}

/// Environment captured by a function object
pub(crate) enum FuncEnv {
    /// Plain function
    None,
    /// Handler-backed callable
    Handler(HandlerEnv),
    /// Method bound to a receiver
    Method(MethodEnv),
}

impl FuncObject {
    /// Wrap a plain function
    pub fn new(code: CallFn) -> Self {
        Self {
            code,
            env: FuncEnv::None,
        }
    }

    /// Code pointer
    #[inline]
    pub fn code(&self) -> CallFn {
        self.code
    }

    /// Whether the object is backed by a handler
    pub fn is_handler(&self) -> bool {
        matches!(self.env, FuncEnv::Handler(_))
    }
}

impl Trace for FuncObject {
    fn trace(&self, visit: &mut dyn FnMut(*const u8)) {
        if let FuncEnv::Method(env) = &self.env {
            env.trace(visit);
        }
    }
}

impl std::fmt::Debug for FuncObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env = match self.env {
            FuncEnv::None => "none",
            FuncEnv::Handler(_) => "handler",
            FuncEnv::Method(_) => "method",
        };
        f.debug_struct("FuncObject").field("env", &env).finish()
    }
}
