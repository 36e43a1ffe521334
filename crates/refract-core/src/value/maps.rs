//! Map views

use super::convert::assign_to;
use super::{alloc, store, type_name, typedmemmove, Flags, Value};
use crate::config::misuse;
use crate::runtime::MapObject;
use crate::types::{Kind, TypeRef};

/// View of a map value
#[derive(Debug, Clone, Copy)]
pub struct MapValue(Value);

impl MapValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    fn object(&self) -> *mut MapObject {
        self.0.word() as *mut MapObject
    }

    fn types(&self) -> Option<(TypeRef, TypeRef)> {
        let t = self.0.typ?;
        Some((t.key()?, t.elem()?))
    }

    /// Whether the map is nil
    pub fn is_nil(&self) -> bool {
        self.object().is_null()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        let m = self.object();
        if m.is_null() {
            0
        } else {
            unsafe { (*m).len() }
        }
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key converted to the key type and spilled to addressable storage
    fn key_storage(&self, op: &str, key: &Value) -> Option<*mut u8> {
        let (kt, _) = self.types()?;
        if key.is_read_only() {
            misuse(op, "key obtained through an unexported field");
            return None;
        }
        match assign_to(key, kt) {
            Some(k) => Some(k.data()),
            None => {
                misuse(op, format_args!("{} is not assignable to {}", type_name(key), kt));
                None
            }
        }
    }

    /// Copy of the element stored under `key`
    ///
    /// A nil map or a missing key yields `None`.
    pub fn get(&self, key: &Value) -> Option<Value> {
        let (_, et) = self.types()?;
        let k = self.key_storage("MapValue::get", key)?;
        let m = self.object();
        if m.is_null() {
            return None;
        }
        let p = unsafe { (*m).get(k) }?;
        Some(copy_out(et, p, self.0.flag))
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Store `elem` under `key`, replacing any previous entry
    ///
    /// An invalid `elem` deletes the entry. Storing into a nil map is misuse.
    pub fn set(&self, key: &Value, elem: &Value) -> bool {
        if !elem.is_valid() {
            return self.delete(key);
        }
        let Some((_, et)) = self.types() else {
            return false;
        };
        if self.0.is_read_only() || elem.is_read_only() {
            misuse("MapValue::set", "value obtained through an unexported field");
            return false;
        }
        let m = self.object();
        if m.is_null() {
            misuse("MapValue::set", "assignment to entry in nil map");
            return false;
        }
        let Some(k) = self.key_storage("MapValue::set", key) else {
            return false;
        };
        let Some(e) = assign_to(elem, et) else {
            misuse("MapValue::set", format_args!("{} is not assignable to {}", type_name(elem), et));
            return false;
        };
        unsafe {
            let slot = (*m).assign(k);
            store(et, slot, &e);
        }
        true
    }

    /// Remove `key`; returns whether it was present
    pub fn delete(&self, key: &Value) -> bool {
        if self.0.is_read_only() {
            misuse("MapValue::delete", "map obtained through an unexported field");
            return false;
        }
        let Some(k) = self.key_storage("MapValue::delete", key) else {
            return false;
        };
        let m = self.object();
        !m.is_null() && unsafe { (*m).delete(k) }
    }

    /// Copies of every key, in unspecified order
    pub fn keys(&self) -> Vec<Value> {
        let mut keys = Vec::with_capacity(self.len());
        self.entries(|k, _| keys.push(k));
        keys
    }

    /// Visit a copy of every entry, in unspecified order
    pub fn entries(&self, mut f: impl FnMut(Value, Value)) {
        let (Some((kt, et)), m) = (self.types(), self.object()) else {
            return;
        };
        if m.is_null() {
            return;
        }
        // snapshot first so the callback may modify the map
        for (k, e) in unsafe { (*m).entries() } {
            f(copy_out(kt, k, self.0.flag), copy_out(et, e, self.0.flag));
        }
    }
}

fn copy_out(t: TypeRef, src: *mut u8, from: Flags) -> Value {
    let p = alloc(t);
    unsafe { typedmemmove(t, p, src) };
    Value::at(t, p, Flags::default().inherit_ro(from))
}

impl Value {
    /// Map view
    pub fn as_map(&self) -> Option<MapValue> {
        if self.kind() == Kind::Map && !self.is_method() {
            return Some(MapValue(*self));
        }
        misuse("Value::as_map", format_args!("call on {} value", self.kind()));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::with_verbose;
    use crate::types::{basic, TypeRegistry};
    use crate::value::{make_map, zero, ToValue};

    #[test]
    fn test_set_get_delete() {
        let reg = TypeRegistry::new();
        let mt = reg.map_of(basic(Kind::String), basic(Kind::Int)).unwrap();
        let m = make_map(mt).unwrap();
        let mv = m.as_map().unwrap();

        assert!(mv.set(&"a".to_value(), &1isize.to_value()));
        assert!(mv.set(&"b".to_value(), &2isize.to_value()));
        assert!(mv.set(&"a".to_value(), &3isize.to_value()));
        assert_eq!(mv.len(), 2);
        assert_eq!(m.len(), 2);
        assert_eq!(mv.get(&"a".to_value()).unwrap().as_int().unwrap().get(), 3);
        assert!(mv.get(&"z".to_value()).is_none());

        assert!(mv.delete(&"a".to_value()));
        assert!(!mv.delete(&"a".to_value()));
        assert_eq!(mv.len(), 1);

        assert!(mv.set(&"b".to_value(), &Value::INVALID));
        assert!(mv.is_empty());
    }

    #[test]
    fn test_entries_are_copies() {
        let reg = TypeRegistry::new();
        let mt = reg.map_of(basic(Kind::Int32), basic(Kind::Float64)).unwrap();
        let mv = make_map(mt).unwrap().as_map().unwrap();
        for i in 0..20i32 {
            mv.set(&i.to_value(), &(i as f64 / 2.0).to_value());
        }
        let mut sum = 0.0;
        mv.entries(|k, e| {
            assert!(!k.can_set());
            sum += e.as_float().unwrap().get();
        });
        assert_eq!(sum, 95.0);
        let mut keys: Vec<i64> = mv.keys().iter().map(|k| k.as_int().unwrap().get()).collect();
        keys.sort();
        assert_eq!(keys, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_nil_map() {
        let reg = TypeRegistry::new();
        let mt = reg.map_of(basic(Kind::Int), basic(Kind::Int)).unwrap();
        let nil = zero(mt);
        assert!(nil.is_nil());
        let mv = nil.as_map().unwrap();
        assert_eq!(mv.len(), 0);
        assert!(mv.get(&1isize.to_value()).is_none());
        with_verbose(false, || assert!(!mv.set(&1isize.to_value(), &1isize.to_value())));
    }

    #[test]
    fn test_wrong_key_type() {
        let reg = TypeRegistry::new();
        let mt = reg.map_of(basic(Kind::Int), basic(Kind::Int)).unwrap();
        let mv = make_map(mt).unwrap().as_map().unwrap();
        with_verbose(false, || assert!(!mv.set(&"k".to_value(), &1isize.to_value())));
        assert!(mv.is_empty());
    }
}
