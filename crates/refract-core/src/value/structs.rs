//! Struct views
//!
//! Fields inherit addressability from the struct. A field reached through
//! an unexported name is read-only: non-embedded fields set the sticky bit,
//! embedded ones the embed bit, so promoted exported fields of an
//! unexported embedded struct stay distinguishable.

use super::{Flags, Value};
use crate::config::misuse;
use crate::types::{FieldInfo, Kind, MethodInfo, TypeRef};

/// View of a struct value
#[derive(Debug, Clone, Copy)]
pub struct StructValue(Value);

impl StructValue {
    /// The underlying handle
    pub fn value(&self) -> Value {
        self.0
    }

    fn typ(&self) -> Option<TypeRef> {
        self.0.typ
    }

    /// Number of fields
    pub fn num_field(&self) -> usize {
        self.typ().map_or(0, |t| t.num_field())
    }

    /// Field `i`
    pub fn field(&self, i: usize) -> Value {
        if i >= self.num_field() {
            misuse("StructValue::field", format_args!("field index {} out of range", i));
            return Value::INVALID;
        }
        self.0.field_unchecked(i)
    }

    /// Field with the given name, searching only direct fields
    pub fn field_by_name(&self, name: &str) -> Option<Value> {
        let (i, _) = self.typ()?.field_by_name(name)?;
        Some(self.0.field_unchecked(i))
    }

    /// Nested field reached by following a path of field indices
    ///
    /// Embedded pointers along the path are dereferenced; a nil pointer
    /// ends the walk with `None`.
    pub fn field_by_index(&self, path: &[usize]) -> Option<Value> {
        let mut v = self.0;
        for (depth, &i) in path.iter().enumerate() {
            if depth > 0 && v.kind() == Kind::Ptr && v.typ?.elem()?.kind() == Kind::Struct {
                v = v.deref();
                if !v.is_valid() {
                    return None;
                }
            }
            let sv = v.as_struct()?;
            if i >= sv.num_field() {
                misuse("StructValue::field_by_index", format_args!("field index {} out of range", i));
                return None;
            }
            v = v.field_unchecked(i);
        }
        Some(v)
    }

    /// Visit every field with its metadata, in declaration order
    pub fn fields(&self, mut f: impl FnMut(FieldInfo<'_>, Value)) {
        let Some(t) = self.typ() else {
            return;
        };
        t.fields(|info| {
            let v = self.0.field_unchecked(info.index);
            f(info, v);
        });
    }

    /// Number of exported methods of the struct's type
    pub fn num_method(&self) -> usize {
        self.0.num_method()
    }

    /// Bound method `i`
    pub fn method(&self, i: usize) -> Value {
        self.0.method(i)
    }

    /// Bound method with the given name
    pub fn method_by_name(&self, name: &str) -> Option<Value> {
        self.0.method_by_name(name)
    }

    /// Visit every exported method with its signature and bound value
    pub fn methods(&self, f: impl FnMut(MethodInfo<'_>, Value)) {
        self.0.methods(f)
    }
}

impl Value {
    /// Struct view
    pub fn as_struct(&self) -> Option<StructValue> {
        if self.kind() == Kind::Struct && !self.is_method() {
            return Some(StructValue(*self));
        }
        misuse("Value::as_struct", format_args!("call on {} value", self.kind()));
        None
    }

    /// Field `i` of a struct value; the index must be in range
    pub(crate) fn field_unchecked(&self, i: usize) -> Value {
        let Some(field) = self.typ.and_then(|t| t.field(i)) else {
            return Value::INVALID;
        };
        let mut fl = Flags {
            addressable: self.flag.addressable,
            sticky_ro: self.flag.sticky_ro,
            embed_ro: self.flag.embed_ro,
            ..Flags::default()
        };
        if !field.name.is_exported() {
            if field.embedded() {
                fl.embed_ro = true;
            } else {
                fl.sticky_ro = true;
            }
        }
        if !self.flag.indirect {
            // a pointer-shaped struct held inline has its only field at offset 0
            return Value::direct(field.typ, self.ptr, fl);
        }
        Value::at(field.typ, unsafe { self.ptr.add(field.offset()) }, fl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::with_verbose;
    use crate::types::{basic, ModuleBuilder, TypeRegistry};
    use crate::value::new;

    #[test]
    fn test_field_offsets_and_setting() {
        let reg = TypeRegistry::new();
        let mut m = ModuleBuilder::new("main");
        let user = m
            .struct_type()
            .field("ID", basic(Kind::Uint64))
            .tagged_field("Name", basic(Kind::String), r#"json:"name""#)
            .field("secret", basic(Kind::Bool))
            .build()
            .unwrap();

        let v = new(&reg, user).deref();
        let sv = v.as_struct().unwrap();
        assert_eq!(sv.num_field(), 3);

        let id = sv.field(0);
        assert!(id.can_set());
        id.as_uint().unwrap().set(7);
        sv.field_by_name("Name").unwrap().as_string().unwrap().set("ann");

        let secret = sv.field(2);
        assert!(secret.is_read_only());
        assert!(!secret.can_set());
        with_verbose(false, || assert!(secret.interface().is_none()));

        let mut seen = Vec::new();
        sv.fields(|info, fv| {
            if info.exported {
                seen.push((info.name.to_string(), info.offset, fv.can_set()));
            }
        });
        assert_eq!(
            seen,
            vec![("ID".to_string(), 0, true), ("Name".to_string(), 8, true)]
        );
        assert_eq!(v.field_unchecked(1).as_string().unwrap().get(), "ann");
    }

    #[test]
    fn test_embedded_read_only_flags() {
        let mut m = ModuleBuilder::new("main");
        let shape = m.struct_type().field("X", basic(Kind::Int)).build().unwrap();
        let inner = m.named("inner", shape).build().unwrap();
        let outer = m.struct_type().embedded(inner).build().unwrap();

        let v = crate::value::zero(outer);
        let emb = v.as_struct().unwrap().field(0);
        assert!(emb.flags().embed_ro);
        assert!(!emb.flags().sticky_ro);
        let x = emb.as_struct().unwrap().field(0);
        assert!(x.flags().embed_ro);
        assert!(x.is_read_only());
    }

    #[test]
    fn test_field_by_index_through_pointer() {
        let reg = TypeRegistry::new();
        let mut m = ModuleBuilder::new("main");
        let point = m
            .struct_type()
            .field("X", basic(Kind::Int32))
            .field("Y", basic(Kind::Int32))
            .build()
            .unwrap();
        let pp = reg.ptr_to(point);
        let line = m.struct_type().field("A", pp).field("B", pp).build().unwrap();

        let l = new(&reg, line).deref();
        let ls = l.as_struct().unwrap();
        assert!(ls.field_by_index(&[1, 0]).is_none());

        let b = new(&reg, point);
        ls.field(1).set(&b);
        ls.field_by_index(&[1, 1]).unwrap().as_int().unwrap().set(-4);
        assert_eq!(b.deref().as_struct().unwrap().field(1).as_int().unwrap().get(), -4);
    }
}
