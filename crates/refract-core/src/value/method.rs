//! Method sets and bound methods
//!
//! `v.method(i)` does not allocate: it returns `v` itself with the method
//! index recorded in its flags. Only boxing or assigning such a handle
//! materializes a function object carrying the receiver.

use super::{alloc, typedmemmove, Flags, Value};
use crate::call::{method_value_call, MethodEnv};
use crate::config::misuse;
use crate::gc::Heap;
use crate::runtime::{CallFn, FuncEnv, FuncObject, NonEmptyInterface};
use crate::types::{Kind, MethodInfo, TypeRef};
use crate::{ReflectError, ReflectResult};

/// Resolved callee of a bound method
pub(crate) struct MethodTarget {
    /// Signature without the receiver
    pub ft: TypeRef,
    /// Implementation
    pub code: CallFn,
    /// Type owning the method table
    pub rcvr_typ: TypeRef,
    /// Receiver slot contents: the address of the receiver value
    pub rcvr: *mut u8,
}

impl Value {
    /// Number of methods in the value's method set
    pub fn num_method(&self) -> usize {
        match self.typ {
            Some(t) if !self.is_method() => t.num_method(),
            _ => 0,
        }
    }

    /// Method `i` bound to this value as its receiver
    pub fn method(&self, i: usize) -> Value {
        let Some(t) = self.typ else {
            misuse("Value::method", "invalid value");
            return Value::INVALID;
        };
        if self.is_method() || i >= t.num_method() {
            misuse("Value::method", format_args!("method index {} out of range", i));
            return Value::INVALID;
        }
        if t.kind() == Kind::Interface && self.is_nil() {
            misuse("Value::method", "method on nil interface value");
            return Value::INVALID;
        }
        Value {
            typ: self.typ,
            ptr: self.ptr,
            flag: Flags {
                kind: Kind::Func,
                indirect: self.flag.indirect,
                method: Some(i as u32),
                ..Flags::default()
            }
            .inherit_ro(self.flag),
        }
    }

    /// Method with the given name bound to this value
    pub fn method_by_name(&self, name: &str) -> Option<Value> {
        let t = self.typ?;
        if self.is_method() {
            return None;
        }
        let i = if t.kind() == Kind::Interface {
            t.interface_methods().iter().position(|m| m.name.name() == name)?
        } else {
            t.method_by_name(name)?.0
        };
        Some(self.method(i))
    }

    /// Visit every method in the value's method set with its bound value
    pub fn methods(&self, mut f: impl FnMut(MethodInfo<'_>, Value)) {
        let Some(t) = self.typ else {
            return;
        };
        if self.is_method() {
            return;
        }
        t.methods(|info| {
            let bound = self.method(info.index);
            f(info, bound);
        });
    }

    /// Signature of a bound method, without the receiver
    pub(crate) fn method_type(&self) -> Option<TypeRef> {
        let (t, i) = (self.typ?, self.flag.method? as usize);
        if t.kind() == Kind::Interface {
            t.interface_methods().get(i).map(|m| m.typ)
        } else {
            t.method(i).map(|m| m.mtyp)
        }
    }

    /// The receiver handle, without the method binding
    pub(crate) fn receiver(&self) -> Value {
        Value {
            flag: Flags {
                kind: self.typ.map_or(Kind::Invalid, |t| t.kind()),
                method: None,
                ..self.flag
            },
            ..*self
        }
    }

    /// Implementation and receiver slot of bound method `i`
    pub(crate) fn method_target(&self, i: usize) -> ReflectResult<MethodTarget> {
        let t = self
            .typ
            .ok_or_else(|| ReflectError::Misuse("method of invalid value".into()))?;
        let rcvr = self.receiver();

        if t.kind() == Kind::Interface {
            let im = t
                .interface_methods()
                .get(i)
                .ok_or_else(|| ReflectError::Misuse(format!("method index {} out of range", i)))?;
            let iface = unsafe { *(rcvr.ptr as *const NonEmptyInterface) };
            let itab = iface.itab.ok_or(ReflectError::NilFunction)?;
            let code = *itab
                .fun
                .get(i)
                .ok_or_else(|| ReflectError::Misuse(format!("method index {} out of range", i)))?;
            let dt = itab.typ;
            return Ok(MethodTarget {
                ft: im.typ,
                code,
                rcvr_typ: dt,
                rcvr: receiver_slot(dt, iface.word, false),
            });
        }

        let m = t
            .method(i)
            .ok_or_else(|| ReflectError::Misuse(format!("method index {} out of range", i)))?;
        let word = if t.kind() == Kind::Ptr || !rcvr.flag.indirect {
            rcvr.word()
        } else {
            rcvr.ptr
        };
        Ok(MethodTarget {
            ft: m.mtyp,
            code: m.func,
            rcvr_typ: t,
            rcvr: receiver_slot(t, word, rcvr.flag.indirect && t.kind() != Kind::Ptr),
        })
    }

    /// Function object for a bound method, capturing a copy of the receiver
    pub(crate) fn make_method_value(&self) -> Option<Value> {
        let (i, mtyp) = (self.flag.method?, self.method_type()?);
        if self.is_read_only() {
            misuse("Value::method", "method obtained through an unexported field");
            return None;
        }
        let mut rcvr = self.receiver();
        if let Some(t) = rcvr.typ.filter(|_| rcvr.flag.indirect) {
            // snapshot so later writes through the original do not leak in
            let p = alloc(t);
            unsafe { typedmemmove(t, p, rcvr.ptr) };
            rcvr = Value::at(t, p, Flags::default());
        }
        rcvr.flag.addressable = false;
        let obj = FuncObject {
            code: method_value_call,
            env: FuncEnv::Method(MethodEnv {
                rcvr,
                index: i,
                mtyp,
            }),
        };
        let p = Heap::global().alloc_native(obj);
        Some(Value::direct(mtyp, p as *mut u8, Flags::default()))
    }
}

/// Address of a receiver of type `t`
///
/// `word` is the receiver's storage address when `is_addr` is set, and
/// the receiver's own word otherwise. Pointer receivers already are the
/// address of their element; other pointer-shaped values are spilled.
fn receiver_slot(t: TypeRef, word: *mut u8, is_addr: bool) -> *mut u8 {
    if is_addr || t.kind() == Kind::Ptr || !t.is_direct_iface() {
        return word;
    }
    let p = alloc(t);
    unsafe { *(p as *mut *mut u8) = word };
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::with_verbose;
    use crate::types::{basic, ModuleBuilder, TypeRegistry};
    use crate::value::new;

    unsafe fn noop(_closure: *const FuncObject, _frame: *mut u8) {}

    #[test]
    fn test_method_sets() {
        let reg = TypeRegistry::new();
        let mut m = ModuleBuilder::new("main");
        let ft = m.func(&[], &[basic(Kind::Int)], false).unwrap();
        let counter = m
            .named("Counter", basic(Kind::Int))
            .method("Get", ft, noop)
            .pointer_method("Inc", ft, noop)
            .method("reset", ft, noop)
            .build()
            .unwrap();

        let p = new(&reg, counter);
        assert_eq!(p.num_method(), 2);
        assert_eq!(p.deref().num_method(), 1);

        let mut names = Vec::new();
        p.methods(|info, bound| {
            assert_eq!(bound.kind(), Kind::Func);
            assert_eq!(bound.typ(), Some(ft));
            names.push(info.name.to_string());
        });
        assert_eq!(names, vec!["Get", "Inc"]);

        let inc = p.method_by_name("Inc").unwrap();
        assert!(inc.is_method());
        assert!(p.deref().method_by_name("Inc").is_none());
        with_verbose(false, || assert!(!p.method(5).is_valid()));
    }
}
