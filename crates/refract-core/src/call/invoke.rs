//! Dynamic invocation
//!
//! A call resolves its callee (a function object or a bound method),
//! checks and converts the arguments against the signature, lays them out
//! in a heap frame and jumps through the native calling convention.
//! Results are read back from the frame, which stays alive for as long as
//! any result handle points into it.

use super::layout::FrameLayout;
use crate::runtime::{CallFn, FuncEnv, FuncObject};
use crate::types::TypeRef;
use crate::value::convert::{assign_to, not_assignable};
use crate::value::{make_slice, store, type_name, typedmemmove, Flags, Value};
use crate::{ReflectError, ReflectResult};

/// Receiver captured by a method value
pub(crate) struct MethodEnv {
    /// The receiver, without the method binding
    pub(crate) rcvr: Value,
    /// Index into the receiver's method set
    pub(crate) index: u32,
    /// Signature without the receiver
    pub(crate) mtyp: TypeRef,
}

impl MethodEnv {
    pub(crate) fn trace(&self, visit: &mut dyn FnMut(*const u8)) {
        if self.rcvr.is_valid() {
            visit(self.rcvr.raw_ptr());
        }
    }
}

/// Resolved callee
struct Callee {
    ft: TypeRef,
    code: CallFn,
    closure: *const FuncObject,
    rcvr: Option<(TypeRef, *mut u8)>,
}

fn resolve(v: &Value) -> ReflectResult<Callee> {
    if let Some(i) = v.flags().method {
        let target = v.method_target(i as usize)?;
        return Ok(Callee {
            ft: target.ft,
            code: target.code,
            closure: std::ptr::null(),
            rcvr: Some((target.rcvr_typ, target.rcvr)),
        });
    }
    let ft = v
        .typ()
        .filter(|t| t.as_func().is_some())
        .ok_or_else(|| ReflectError::Misuse(format!("call of {} value", v.kind())))?;
    let obj = v.word() as *const FuncObject;
    if obj.is_null() {
        return Err(ReflectError::NilFunction);
    }
    Ok(Callee {
        ft,
        code: unsafe { (*obj).code },
        closure: obj,
        rcvr: None,
    })
}

impl Value {
    /// Call a function value or bound method with `args`
    ///
    /// For variadic functions the trailing arguments are packed into a
    /// fresh slice. Every argument must be assignable to its parameter.
    pub fn call(&self, args: &[Value]) -> ReflectResult<Vec<Value>> {
        self.call_frame(args, false)
    }

    /// Call a variadic function with its final argument already a slice
    pub fn call_slice(&self, args: &[Value]) -> ReflectResult<Vec<Value>> {
        self.call_frame(args, true)
    }

    fn call_frame(&self, args: &[Value], spread: bool) -> ReflectResult<Vec<Value>> {
        let callee = resolve(self)?;
        let ft = callee.ft;
        let Some(func) = ft.as_func() else {
            return Err(ReflectError::Misuse(format!("call of non-function type {}", ft)));
        };
        let ins = func.ins();
        let n = ins.len();

        let packed: Vec<Value> = if spread {
            if !func.is_variadic() {
                return Err(ReflectError::Variadic(format!("call_slice of non-variadic {}", ft)));
            }
            if args.len() != n {
                return Err(ReflectError::ArgCount { want: n, got: args.len() });
            }
            args.to_vec()
        } else if func.is_variadic() {
            if args.len() < n - 1 {
                return Err(ReflectError::ArgCount {
                    want: n - 1,
                    got: args.len(),
                });
            }
            let mut packed = args[..n - 1].to_vec();
            packed.push(pack_variadic(ins[n - 1], &args[n - 1..], n - 1)?);
            packed
        } else {
            if args.len() != n {
                return Err(ReflectError::ArgCount { want: n, got: args.len() });
            }
            args.to_vec()
        };

        let layout = FrameLayout::of(ft, callee.rcvr.map(|(t, _)| t))
            .ok_or_else(|| ReflectError::Misuse(format!("no frame layout for {}", ft)))?;
        let frame = layout.alloc_frame();
        if let Some((_, word)) = callee.rcvr {
            unsafe { *(frame as *mut *mut u8) = word };
        }
        for (i, (a, &t)) in packed.iter().zip(ins).enumerate() {
            check_arg(i, a)?;
            let x = assign_to(a, t).ok_or_else(|| not_assignable(i, a, t))?;
            unsafe { store(t, frame.add(layout.in_offsets()[i]), &x) };
        }

        tracing::trace!(func = %ft, args = n, "dynamic call");
        unsafe { (callee.code)(callee.closure, frame) };

        Ok(func
            .outs()
            .iter()
            .zip(layout.out_offsets())
            .map(|(&t, &off)| Value::at(t, unsafe { frame.add(off) }, Flags::default()))
            .collect())
    }
}

fn check_arg(i: usize, a: &Value) -> ReflectResult<()> {
    if !a.is_valid() {
        return Err(ReflectError::Misuse(format!("argument {} is the invalid value", i)));
    }
    if a.is_read_only() {
        return Err(ReflectError::Unexported(format!(
            "argument {} ({}) obtained through an unexported field",
            i,
            type_name(a)
        )));
    }
    Ok(())
}

/// Pack trailing variadic arguments into a fresh slice of type `st`
fn pack_variadic(st: TypeRef, extra: &[Value], first: usize) -> ReflectResult<Value> {
    let elem = st
        .elem()
        .ok_or_else(|| ReflectError::Variadic(format!("final parameter {} is not a slice", st)))?;
    let s = make_slice(st, extra.len(), extra.len())
        .ok_or_else(|| ReflectError::Variadic(format!("final parameter {} is not a slice", st)))?;
    for (j, a) in extra.iter().enumerate() {
        check_arg(first + j, a)?;
        let x = assign_to(a, elem).ok_or_else(|| not_assignable(first + j, a, elem))?;
        unsafe { store(elem, s.index(j).raw_ptr(), &x) };
    }
    Ok(s)
}

/// Trampoline behind method values
///
/// Re-lays the caller's frame with the bound receiver in slot 0 and calls
/// the method implementation.
///
/// # Safety
///
/// `closure` must be a function object created for a method value and
/// `frame` a frame laid out for its signature.
pub(crate) unsafe fn method_value_call(closure: *const FuncObject, frame: *mut u8) {
    let FuncEnv::Method(env) = &(*closure).env else {
        panic!("refract: method trampoline called without a bound receiver");
    };
    let target = match env.rcvr.method_target(env.index as usize) {
        Ok(target) => target,
        Err(e) => panic!("refract: calling method value: {}", e),
    };
    let (Some(func), Some(outer), Some(inner)) = (
        env.mtyp.as_func(),
        FrameLayout::of(env.mtyp, None),
        FrameLayout::of(target.ft, Some(target.rcvr_typ)),
    ) else {
        panic!("refract: method value of non-function type {}", env.mtyp);
    };

    let inner_frame = inner.alloc_frame();
    *(inner_frame as *mut *mut u8) = target.rcvr;
    for (i, &t) in func.ins().iter().enumerate() {
        typedmemmove(
            t,
            inner_frame.add(inner.in_offsets()[i]),
            frame.add(outer.in_offsets()[i]),
        );
    }
    (target.code)(std::ptr::null(), inner_frame);
    for (j, &t) in func.outs().iter().enumerate() {
        typedmemmove(
            t,
            frame.add(outer.out_offsets()[j]),
            inner_frame.add(inner.out_offsets()[j]),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::func_value;
    use crate::types::{basic, Kind, ModuleBuilder, TypeRegistry};
    use crate::value::{new, ToValue};

    unsafe fn add(_closure: *const FuncObject, frame: *mut u8) {
        let a = *(frame as *const i64);
        let b = *(frame.add(8) as *const i64);
        *(frame.add(16) as *mut i64) = a + b;
    }

    unsafe fn sum(_closure: *const FuncObject, frame: *mut u8) {
        let s = *(frame as *const crate::runtime::SliceHeader);
        let xs = std::slice::from_raw_parts(s.data as *const i64, s.len);
        *(frame.add(3 * 8) as *mut i64) = xs.iter().sum();
    }

    unsafe fn get(_closure: *const FuncObject, frame: *mut u8) {
        let p = *(frame as *const *const isize);
        *(frame.add(8) as *mut isize) = *p;
    }

    unsafe fn inc(_closure: *const FuncObject, frame: *mut u8) {
        let p = *(frame as *const *mut isize);
        *p += 1;
    }

    #[test]
    fn test_call_native_function() {
        let mut m = ModuleBuilder::new("main");
        let i64t = basic(Kind::Int64);
        let ft = m.func(&[i64t, i64t], &[i64t], false).unwrap();
        let f = func_value(ft, add).unwrap();

        let out = f.call(&[40i64.to_value(), 2i64.to_value()]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_int().unwrap().get(), 42);

        assert_eq!(
            f.call(&[1i64.to_value()]).unwrap_err(),
            ReflectError::ArgCount { want: 2, got: 1 }
        );
        assert!(matches!(
            f.call(&[1i64.to_value(), "x".to_value()]),
            Err(ReflectError::NotAssignable { index: 1, .. })
        ));
    }

    #[test]
    fn test_call_variadic() {
        let reg = TypeRegistry::new();
        let mut m = ModuleBuilder::new("main");
        let i64t = basic(Kind::Int64);
        let st = reg.slice_of(i64t);
        let ft = m.func(&[st], &[i64t], true).unwrap();
        let f = func_value(ft, sum).unwrap();

        let out = f
            .call(&[1i64.to_value(), 2i64.to_value(), 3i64.to_value()])
            .unwrap();
        assert_eq!(out[0].as_int().unwrap().get(), 6);
        assert_eq!(f.call(&[]).unwrap()[0].as_int().unwrap().get(), 0);

        let xs = crate::value::make_slice(st, 2, 2).unwrap();
        xs.index(0).as_int().unwrap().set(10);
        xs.index(1).as_int().unwrap().set(5);
        assert_eq!(f.call_slice(&[xs]).unwrap()[0].as_int().unwrap().get(), 15);
    }

    #[test]
    fn test_nil_function() {
        let mut m = ModuleBuilder::new("main");
        let ft = m.func(&[], &[], false).unwrap();
        let nil = crate::value::zero(ft);
        assert_eq!(nil.call(&[]).unwrap_err(), ReflectError::NilFunction);
    }

    #[test]
    fn test_bound_methods_and_method_values() {
        let reg = TypeRegistry::new();
        let mut m = ModuleBuilder::new("main");
        let int = basic(Kind::Int);
        let getter = m.func(&[], &[int], false).unwrap();
        let action = m.func(&[], &[], false).unwrap();
        let counter = m
            .named("Counter", int)
            .method("Get", getter, get)
            .pointer_method("Inc", action, inc)
            .build()
            .unwrap();

        let p = new(&reg, counter);
        p.deref().as_int().unwrap().set(41);
        p.method_by_name("Inc").unwrap().call(&[]).unwrap();
        let got = p.method_by_name("Get").unwrap().call(&[]).unwrap();
        assert_eq!(got[0].as_int().unwrap().get(), 42);

        // a boxed method value snapshots an addressable receiver
        let bound = p.deref().method_by_name("Get").unwrap();
        let e = bound.interface().unwrap();
        p.deref().as_int().unwrap().set(0);
        let f = crate::value::value_of(&e);
        assert_eq!(f.typ(), Some(getter));
        assert_eq!(f.call(&[]).unwrap()[0].as_int().unwrap().get(), 42);
    }
}
