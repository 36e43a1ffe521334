//! Deep equality
//!
//! Structural comparison that follows pointers, slices, maps and
//! interfaces. Pairs of references already under comparison are recorded
//! so cyclic data terminates: a revisited pair is assumed equal, and any
//! real difference is found along another path.

use super::{read_interface, Flags, Value};
use crate::runtime::{EmptyInterface, MapObject, SliceHeader};
use crate::types::{Kind, TypeDescriptor};
use rustc_hash::FxHashSet;

/// A pair of references under comparison, ordered by address
type Visit = (usize, usize, usize);

/// Whether two boxed values are deeply equal
///
/// Values of different dynamic types are never equal.
pub fn deep_equal(x: &EmptyInterface, y: &EmptyInterface) -> bool {
    match (x.typ, y.typ) {
        (None, None) => true,
        (Some(_), Some(_)) => super::value_of(x).deep_equal(&super::value_of(y)),
        _ => false,
    }
}

impl Value {
    /// Whether two values are deeply equal
    pub fn deep_equal(&self, other: &Value) -> bool {
        let mut visited = FxHashSet::default();
        deep_value_equal(self, other, &mut visited)
    }
}

/// Identity of the referenced storage, for kinds that can form cycles
///
/// Slices are keyed by the location of their header: sub-slices sharing a
/// backing array still differ in length.
fn reference(v: &Value) -> Option<usize> {
    let addr = match v.kind() {
        Kind::Ptr | Kind::Map => v.word(),
        Kind::Slice | Kind::Interface => v.ptr,
        _ => return None,
    };
    (!addr.is_null() && !v.is_nil()).then_some(addr as usize)
}

fn deep_value_equal(v1: &Value, v2: &Value, visited: &mut FxHashSet<Visit>) -> bool {
    let (Some(t), Some(t2)) = (v1.typ, v2.typ) else {
        return v1.is_valid() == v2.is_valid();
    };
    if t != t2 {
        return false;
    }

    if let (Some(a), Some(b)) = (reference(v1), reference(v2)) {
        let key = (a.min(b), a.max(b), t as *const TypeDescriptor as usize);
        if !visited.insert(key) {
            return true;
        }
    }

    match t.kind() {
        Kind::Array => (0..t.len().unwrap_or(0)).all(|i| deep_value_equal(&v1.index(i), &v2.index(i), visited)),
        Kind::Slice => {
            let (h1, h2) = unsafe { (*(v1.ptr as *const SliceHeader), *(v2.ptr as *const SliceHeader)) };
            if h1.data.is_null() != h2.data.is_null() || h1.len != h2.len {
                return false;
            }
            if h1.data == h2.data {
                return true;
            }
            (0..h1.len).all(|i| deep_value_equal(&v1.index(i), &v2.index(i), visited))
        }
        Kind::Interface => {
            if v1.is_nil() || v2.is_nil() {
                return v1.is_nil() == v2.is_nil();
            }
            deep_value_equal(&unwrap(v1), &unwrap(v2), visited)
        }
        Kind::Ptr => {
            if v1.word() == v2.word() {
                return true;
            }
            deep_value_equal(&v1.deref(), &v2.deref(), visited)
        }
        Kind::Struct => (0..t.num_field())
            .all(|i| deep_value_equal(&v1.field_unchecked(i), &v2.field_unchecked(i), visited)),
        Kind::Map => {
            let (m1, m2) = (v1.word() as *const MapObject, v2.word() as *const MapObject);
            if m1.is_null() != m2.is_null() || v1.len() != v2.len() {
                return false;
            }
            if m1 == m2 {
                return true;
            }
            let Some(et) = t.elem() else {
                return false;
            };
            unsafe { (*m1).entries() }.into_iter().all(|(k, e1)| {
                match unsafe { (*m2).get(k) } {
                    Some(e2) => deep_value_equal(
                        &Value::at(et, e1, Flags::default()),
                        &Value::at(et, e2, Flags::default()),
                        visited,
                    ),
                    None => false,
                }
            })
        }
        Kind::Func => v1.is_nil() && v2.is_nil(),
        Kind::Chan | Kind::UnsafePointer => v1.word() == v2.word(),
        Kind::Float32 | Kind::Float64 => match (v1.as_float(), v2.as_float()) {
            (Some(a), Some(b)) => a.get() == b.get(),
            _ => false,
        },
        Kind::Complex64 | Kind::Complex128 => match (v1.as_complex(), v2.as_complex()) {
            (Some(a), Some(b)) => a.get() == b.get(),
            _ => false,
        },
        Kind::String => match (v1.as_string(), v2.as_string()) {
            (Some(a), Some(b)) => a.bytes() == b.bytes(),
            _ => false,
        },
        // remaining basic kinds compare by representation
        _ => unsafe {
            std::slice::from_raw_parts(v1.data(), t.size()) == std::slice::from_raw_parts(v2.data(), t.size())
        },
    }
}

/// Dynamic value of a non-nil interface, ignoring read-only state
fn unwrap(v: &Value) -> Value {
    let Some(t) = v.typ else {
        return Value::INVALID;
    };
    match unsafe { read_interface(t, v.ptr) } {
        (Some(dt), word) => Value::from_word(dt, word, Flags::default()),
        (None, _) => Value::INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{basic, empty_interface, ModuleBuilder, TypeRegistry};
    use crate::value::{make_map, make_slice, new, ToValue};

    #[test]
    fn test_basic_values() {
        assert!(3i32.to_value().deep_equal(&3i32.to_value()));
        assert!(!3i32.to_value().deep_equal(&4i32.to_value()));
        assert!(!3i32.to_value().deep_equal(&3i64.to_value()));
        assert!(!f64::NAN.to_value().deep_equal(&f64::NAN.to_value()));
        assert!("ab".to_value().deep_equal(&"ab".to_value()));
        assert!(!Value::INVALID.deep_equal(&1u8.to_value()));
        assert!(Value::INVALID.deep_equal(&Value::INVALID));
    }

    #[test]
    fn test_slices_and_maps() {
        let reg = TypeRegistry::new();
        let st = reg.slice_of(basic(Kind::String));
        let a = make_slice(st, 2, 2).unwrap();
        let b = make_slice(st, 2, 4).unwrap();
        for s in [&a, &b] {
            s.index(0).as_string().unwrap().set("x");
            s.index(1).as_string().unwrap().set("y");
        }
        assert!(a.deep_equal(&b));
        b.index(1).as_string().unwrap().set("z");
        assert!(!a.deep_equal(&b));
        assert!(!a.deep_equal(&crate::value::zero(st)));

        let mt = reg.map_of(basic(Kind::Int), st).unwrap();
        let (m1, m2) = (make_map(mt).unwrap(), make_map(mt).unwrap());
        m1.as_map().unwrap().set(&1isize.to_value(), &a);
        m2.as_map().unwrap().set(&1isize.to_value(), &a);
        assert!(m1.deep_equal(&m2));
        m2.as_map().unwrap().set(&2isize.to_value(), &a);
        assert!(!m1.deep_equal(&m2));
    }

    #[test]
    fn test_cyclic_pointers_terminate() {
        let reg = TypeRegistry::new();
        let mut m = ModuleBuilder::new("main");
        let fp = m.forward_ptr("Node");
        let st = m
            .struct_type()
            .field("Val", basic(Kind::Int))
            .field("Next", fp)
            .build()
            .unwrap();
        let node = m.named("Node", st).build().unwrap();
        m.finish().unwrap();

        let ring = |val: isize| {
            let a = new(&reg, node);
            let b = new(&reg, node);
            let (sa, sb) = (a.deref().as_struct().unwrap(), b.deref().as_struct().unwrap());
            sa.field(0).as_int().unwrap().set(val as i64);
            sb.field(0).as_int().unwrap().set(val as i64);
            sa.field(1).set(&b);
            sb.field(1).set(&a);
            a
        };
        let (x, y) = (ring(1), ring(1));
        assert!(x.deep_equal(&y));
        assert!(!x.deep_equal(&ring(2)));
    }

    #[test]
    fn test_sub_slices_of_one_backing_array() {
        let reg = TypeRegistry::new();
        let st = reg.slice_of(basic(Kind::Int64));
        let mut m = ModuleBuilder::new("main");
        let pair = m.struct_type().field("A", st).field("B", st).build().unwrap();

        let build = |second: i64| {
            let s = make_slice(st, 2, 2).unwrap();
            s.index(0).as_int().unwrap().set(1);
            s.index(1).as_int().unwrap().set(second);
            let v = new(&reg, pair).deref();
            let sv = v.as_struct().unwrap();
            sv.field(0).set(&s.as_slice().unwrap().slice(0, 1).unwrap());
            sv.field(1).set(&s.as_slice().unwrap().slice(0, 2).unwrap());
            v
        };
        assert!(build(2).deep_equal(&build(2)));
        assert!(!build(2).deep_equal(&build(3)));
    }

    #[test]
    fn test_shared_targets_do_not_hide_other_differences() {
        let reg = TypeRegistry::new();
        let int = basic(Kind::Int64);
        let mt = reg.map_of(basic(Kind::String), int).unwrap();
        let mut m = ModuleBuilder::new("main");
        let holder = m
            .struct_type()
            .field("P", reg.ptr_to(int))
            .field("M", mt)
            .field("N", int)
            .build()
            .unwrap();

        let target = new(&reg, int);
        let table = make_map(mt).unwrap();
        table.as_map().unwrap().set(&"k".to_value(), &1i64.to_value());
        let build = |n: i64| {
            let v = new(&reg, holder).deref();
            let sv = v.as_struct().unwrap();
            sv.field(0).set(&target);
            sv.field(1).set(&table);
            sv.field(2).as_int().unwrap().set(n);
            v
        };
        assert!(build(7).deep_equal(&build(7)));
        assert!(!build(7).deep_equal(&build(8)));
    }

    #[test]
    fn test_boxed_values() {
        let any = empty_interface();
        let x = 5u16.to_value().convert(any).unwrap();
        let y = 5u16.to_value().convert(any).unwrap();
        assert!(x.deep_equal(&y));
        assert!(deep_equal(&x.interface().unwrap(), &y.interface().unwrap()));
        assert!(deep_equal(&EmptyInterface::NIL, &EmptyInterface::NIL));
        assert!(!deep_equal(&EmptyInterface::NIL, &x.interface().unwrap()));
    }
}
