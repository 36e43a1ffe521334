//! Interface dispatch tables
//!
//! Converting a concrete value to a method-bearing interface needs the
//! concrete type's implementations arranged in the interface's method
//! order. Tables are built once per (interface, concrete type) pair and
//! shared process-wide.

use super::repr::Itab;
use crate::types::{Kind, TypeDescriptor, TypeRef};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

static ITABS: Lazy<RwLock<FxHashMap<(usize, usize), &'static Itab>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

fn addr(t: TypeRef) -> usize {
    t as *const TypeDescriptor as usize
}

/// Dispatch table for `typ` as `inter`, or `None` if `typ` does not
/// implement it
pub fn get_itab(inter: TypeRef, typ: TypeRef) -> Option<&'static Itab> {
    if inter.kind() != Kind::Interface || typ.kind() == Kind::Interface {
        return None;
    }
    let key = (addr(inter), addr(typ));
    if let Some(&tab) = ITABS.read().get(&key) {
        return Some(tab);
    }

    let fun = build(inter, typ)?;
    let mut itabs = ITABS.write();
    let tab = *itabs.entry(key).or_insert_with(|| {
        tracing::debug!(inter = inter.string(), typ = typ.string(), "itab built");
        Box::leak(Box::new(Itab { inter, typ, fun }))
    });
    Some(tab)
}

/// Resolve each interface method against the concrete method table
fn build(inter: TypeRef, typ: TypeRef) -> Option<Box<[crate::runtime::CallFn]>> {
    if !crate::types::implements(inter, typ) {
        return None;
    }
    let have = typ.all_methods();
    let mut j = 0;
    let mut fun = Vec::with_capacity(inter.interface_methods().len());
    for im in inter.interface_methods() {
        // implements() already proved every method is present in order
        while let Some(m) = have.get(j) {
            j += 1;
            if m.name.name() == im.name.name() && m.mtyp == im.typ {
                fun.push(m.func);
                break;
            }
        }
    }
    (fun.len() == inter.interface_methods().len()).then(|| fun.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{basic, ModuleBuilder};

    unsafe fn read(_closure: *const crate::runtime::FuncObject, _frame: *mut u8) {}
    unsafe fn close(_closure: *const crate::runtime::FuncObject, _frame: *mut u8) {}

    #[test]
    fn test_itab_is_shared() {
        let mut m = ModuleBuilder::new("io");
        let f = m.func(&[], &[], false).unwrap();
        let rc = m.interface(&[("Read", f), ("Close", f)]).unwrap();
        let file = m
            .named("File", basic(Kind::Int))
            .method("Read", f, read)
            .method("Close", f, close)
            .build()
            .unwrap();

        let a = get_itab(rc, file).unwrap();
        let b = get_itab(rc, file).unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.fun.len(), 2);
        assert_eq!(a.inter.interface_methods()[0].name.name(), "Close");
        assert!(get_itab(rc, basic(Kind::Int)).is_none());
    }
}
