//! Assignment and conversion between types

use super::primitive::alloc_string;
use super::{alloc, make_slice, read_interface, typedmemmove, type_name, Flags, Value};
use crate::runtime::{get_itab, EmptyInterface, NonEmptyInterface, SliceHeader};
use crate::types::{conversion_op, directly_assignable, implements, ConversionOp, Kind, TypeRef};
use crate::{ReflectError, ReflectResult};

/// `v` as a value of type `dst`, if assignable
///
/// Directly assignable values keep their storage; interface targets get
/// fresh interface storage.
pub(crate) fn assign_to(v: &Value, dst: TypeRef) -> Option<Value> {
    if v.is_method() {
        return assign_to(&v.make_method_value()?, dst);
    }
    let vt = v.typ?;
    if directly_assignable(dst, vt) {
        let mut out = *v;
        out.typ = Some(dst);
        out.flag.kind = dst.kind();
        return Some(out);
    }
    if dst.kind() == Kind::Interface && implements(dst, vt) {
        let p = alloc(dst);
        if !unsafe { write_interface(dst, p, v) } {
            return None;
        }
        return Some(Value::at(dst, p, Flags::default().inherit_ro(v.flag)));
    }
    None
}

/// Box `v` into interface storage of type `dst` at `p`
///
/// Returns false if the dynamic type does not implement `dst`.
///
/// # Safety
///
/// `p` must hold zeroed storage for a `dst`.
pub(crate) unsafe fn write_interface(dst: TypeRef, p: *mut u8, v: &Value) -> bool {
    let Some(vt) = v.typ else {
        return false;
    };
    let (dyn_typ, word) = if vt.kind() == Kind::Interface {
        match read_interface(vt, v.ptr) {
            (Some(dt), word) => (dt, word),
            // a nil interface converts to a nil interface
            (None, _) => return true,
        }
    } else {
        (vt, v.pack_word(vt))
    };

    if dst.interface_methods().is_empty() {
        *(p as *mut EmptyInterface) = EmptyInterface::new(dyn_typ, word);
        return true;
    }
    match get_itab(dst, dyn_typ) {
        Some(itab) => {
            *(p as *mut NonEmptyInterface) = NonEmptyInterface {
                itab: Some(itab),
                word,
            };
            true
        }
        None => false,
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Uint(u64),
    Float(f64),
}

fn read_number(v: &Value) -> Option<Number> {
    let k = v.kind();
    if k.is_signed_int() {
        Some(Number::Int(v.as_int()?.get()))
    } else if k.is_unsigned_int() {
        Some(Number::Uint(v.as_uint()?.get()))
    } else if k.is_float() {
        Some(Number::Float(v.as_float()?.get()))
    } else {
        None
    }
}

fn rune_string(code: i64) -> String {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
        .to_string()
}

impl Value {
    /// The value converted to type `t`
    ///
    /// Numeric conversions truncate or round; string conversions allocate
    /// fresh storage. The result keeps the read-only state of the source.
    pub fn convert(&self, t: TypeRef) -> ReflectResult<Value> {
        if self.is_method() {
            let bound = self
                .make_method_value()
                .ok_or_else(|| ReflectError::Misuse("cannot materialize method value".into()))?;
            return bound.convert(t);
        }
        let Some(vt) = self.typ else {
            return Err(ReflectError::Misuse("convert of invalid value".into()));
        };
        let op = conversion_op(vt, t).ok_or_else(|| ReflectError::NotConvertible {
            from: vt.string().to_string(),
            to: t.string().to_string(),
        })?;

        let out = Value::at(
            t,
            alloc(t),
            Flags {
                addressable: true,
                ..Flags::default()
            },
        );
        let ro = Flags::default().inherit_ro(self.flag);
        let finish = |v: Value| Value {
            flag: Flags {
                addressable: false,
                ..ro
            }
            .with_repr(v),
            ..v
        };

        match op {
            ConversionOp::Numeric => {
                let n = read_number(self).ok_or_else(|| not_convertible(vt, t))?;
                let k = t.kind();
                let ok = if k.is_signed_int() {
                    out.as_int().map(|d| {
                        d.set(match n {
                            Number::Int(x) => x,
                            Number::Uint(x) => x as i64,
                            Number::Float(x) => x as i64,
                        })
                    })
                } else if k.is_unsigned_int() {
                    out.as_uint().map(|d| {
                        d.set(match n {
                            Number::Int(x) => x as u64,
                            Number::Uint(x) => x,
                            // negative floats truncate through int64 and wrap
                            Number::Float(x) if x < 0.0 => x as i64 as u64,
                            Number::Float(x) => x as u64,
                        })
                    })
                } else {
                    out.as_float().map(|d| {
                        d.set(match n {
                            Number::Int(x) => x as f64,
                            Number::Uint(x) => x as f64,
                            Number::Float(x) => x,
                        })
                    })
                };
                ok.ok_or_else(|| not_convertible(vt, t))?;
            }
            ConversionOp::Complex => {
                let c = self.as_complex().ok_or_else(|| not_convertible(vt, t))?.get();
                if let Some(d) = out.as_complex() {
                    d.set(c);
                }
            }
            ConversionOp::IntToString => {
                let code = match read_number(self) {
                    Some(Number::Int(x)) => x,
                    Some(Number::Uint(x)) => i64::try_from(x).unwrap_or(-1),
                    _ => -1,
                };
                if let Some(d) = out.as_string() {
                    d.set(&rune_string(code));
                }
            }
            ConversionOp::StringToBytes => {
                let bytes = self.as_string().ok_or_else(|| not_convertible(vt, t))?.bytes();
                let s = make_slice(t, bytes.len(), bytes.len()).ok_or_else(|| not_convertible(vt, t))?;
                unsafe { s.fill_elems(bytes.as_ptr(), bytes.len()) };
                return Ok(finish(s));
            }
            ConversionOp::StringToRunes => {
                let runes: Vec<i32> = self
                    .as_string()
                    .ok_or_else(|| not_convertible(vt, t))?
                    .get()
                    .chars()
                    .map(|c| c as i32)
                    .collect();
                let s = make_slice(t, runes.len(), runes.len()).ok_or_else(|| not_convertible(vt, t))?;
                unsafe { s.fill_elems(runes.as_ptr() as *const u8, runes.len() * 4) };
                return Ok(finish(s));
            }
            ConversionOp::BytesToString => {
                let bytes = self.as_slice().ok_or_else(|| not_convertible(vt, t))?.bytes();
                unsafe { *(out.ptr as *mut crate::runtime::StringHeader) = alloc_string(&bytes) };
            }
            ConversionOp::RunesToString => {
                let runes = self.as_slice().ok_or_else(|| not_convertible(vt, t))?.runes();
                let s: String = runes.iter().map(|&r| rune_string(r as i64)).collect();
                if let Some(d) = out.as_string() {
                    d.set(&s);
                }
            }
            ConversionOp::SliceToArrayPtr | ConversionOp::SliceToArray => {
                let h = unsafe { *(self.ptr as *const SliceHeader) };
                let arr = if op == ConversionOp::SliceToArray { Some(t) } else { t.elem() };
                let n = arr.and_then(|a| a.len()).unwrap_or(0);
                if h.len < n {
                    return Err(ReflectError::Misuse(format!(
                        "cannot convert slice with length {} to {}",
                        h.len, t
                    )));
                }
                if op == ConversionOp::SliceToArrayPtr {
                    return Ok(Value::direct(t, h.data, ro));
                }
                unsafe { typedmemmove(t, out.ptr, h.data) };
            }
            ConversionOp::Retype => {
                if !self.flag.indirect {
                    return Ok(Value::direct(t, self.ptr, ro));
                }
                unsafe { typedmemmove(t, out.ptr, self.ptr) };
            }
            ConversionOp::ToInterface | ConversionOp::InterfaceToInterface => {
                if !unsafe { write_interface(t, out.ptr, self) } {
                    return Err(not_convertible(vt, t));
                }
            }
        }
        Ok(finish(out))
    }
}

impl Flags {
    /// These flags with the representation bits of `v`
    fn with_repr(self, v: Value) -> Flags {
        Flags {
            kind: v.flag.kind,
            indirect: v.flag.indirect,
            ..self
        }
    }
}

fn not_convertible(from: TypeRef, to: TypeRef) -> ReflectError {
    ReflectError::NotConvertible {
        from: from.string().to_string(),
        to: to.string().to_string(),
    }
}

/// Error for an argument that cannot be assigned to its parameter
pub(crate) fn not_assignable(index: usize, v: &Value, to: TypeRef) -> ReflectError {
    ReflectError::NotAssignable {
        index,
        from: type_name(v),
        to: to.string().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{basic, empty_interface, ModuleBuilder, TypeRegistry};
    use crate::value::{value_of, ToValue};

    #[test]
    fn test_numeric_conversions() {
        let v = 300i32.to_value();
        let b = v.convert(basic(Kind::Uint8)).unwrap();
        assert_eq!(b.as_uint().unwrap().get(), 44);
        let f = (-7i64).to_value().convert(basic(Kind::Float32)).unwrap();
        assert_eq!(f.as_float().unwrap().get(), -7.0);
        let i = 3.9f64.to_value().convert(basic(Kind::Int)).unwrap();
        assert_eq!(i.as_int().unwrap().get(), 3);
        assert!(!i.can_set());
    }

    #[test]
    fn test_negative_float_to_unsigned_wraps() {
        let u = (-1.5f64).to_value().convert(basic(Kind::Uint64)).unwrap();
        assert_eq!(u.as_uint().unwrap().get(), u64::MAX);
        let b = (-1.0f32).to_value().convert(basic(Kind::Uint8)).unwrap();
        assert_eq!(b.as_uint().unwrap().get(), 255);
        let big = 1e19f64.to_value().convert(basic(Kind::Uint64)).unwrap();
        assert_eq!(big.as_uint().unwrap().get(), 10_000_000_000_000_000_000);
    }

    #[test]
    fn test_int_to_string() {
        let s = 0x263Ai32.to_value().convert(basic(Kind::String)).unwrap();
        assert_eq!(s.as_string().unwrap().get(), "\u{263A}");
        let bad = (-1i32).to_value().convert(basic(Kind::String)).unwrap();
        assert_eq!(bad.as_string().unwrap().get(), "\u{FFFD}");
    }

    #[test]
    fn test_string_bytes_runes() {
        let reg = TypeRegistry::new();
        let bytes_t = reg.slice_of(basic(Kind::Uint8));
        let runes_t = reg.slice_of(basic(Kind::Int32));

        let b = "héllo".to_value().convert(bytes_t).unwrap();
        assert_eq!(b.len(), 6);
        let back = b.convert(basic(Kind::String)).unwrap();
        assert_eq!(back.as_string().unwrap().get(), "héllo");

        let r = "héllo".to_value().convert(runes_t).unwrap();
        assert_eq!(r.len(), 5);
        assert_eq!(r.as_slice().unwrap().runes()[1], 'é' as i32);
        let back = r.convert(basic(Kind::String)).unwrap();
        assert_eq!(back.as_string().unwrap().get(), "héllo");
    }

    #[test]
    fn test_slice_to_array() {
        let reg = TypeRegistry::new();
        let st = reg.slice_of(basic(Kind::Int16));
        let at = reg.array_of(basic(Kind::Int16), 2).unwrap();
        let s = make_slice(st, 3, 3).unwrap();
        s.index(1).as_int().unwrap().set(5);

        let a = s.convert(at).unwrap();
        assert_eq!(a.index(1).as_int().unwrap().get(), 5);

        let p = s.convert(reg.ptr_to(at)).unwrap();
        assert_eq!(p.pointer(), s.pointer());

        let long = reg.array_of(basic(Kind::Int16), 4).unwrap();
        assert!(matches!(s.convert(long), Err(ReflectError::Misuse(_))));
    }

    #[test]
    fn test_named_retype() {
        let mut m = ModuleBuilder::new("main");
        let celsius = m.named("Celsius", basic(Kind::Float64)).build().unwrap();
        let c = 21.5f64.to_value().convert(celsius).unwrap();
        assert_eq!(c.typ(), Some(celsius));
        assert_eq!(c.as_float().unwrap().get(), 21.5);
        assert!(matches!(
            c.convert(basic(Kind::Bool)),
            Err(ReflectError::NotConvertible { .. })
        ));
    }

    #[test]
    fn test_to_empty_interface() {
        let any = empty_interface();
        let v = 9u32.to_value().convert(any).unwrap();
        assert_eq!(v.kind(), Kind::Interface);
        let inner = v.unwrap_interface();
        assert_eq!(inner.as_uint().unwrap().get(), 9);
        let e = v.interface().unwrap();
        assert_eq!(value_of(&e).as_uint().unwrap().get(), 9);
    }

    #[test]
    fn test_assign_to_interface_copies_addressable() {
        let mut x = 1u64;
        let v = unsafe { Value::from_raw(basic(Kind::Uint64), &mut x as *mut u64 as *mut u8) };
        let boxed = assign_to(&v, empty_interface()).unwrap();
        x = 2;
        assert_eq!(boxed.unwrap_interface().as_uint().unwrap().get(), 1);
        assert_eq!(x, 2);
    }
}
