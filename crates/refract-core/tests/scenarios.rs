//! End-to-end reflection scenarios
//!
//! Each test declares its types the way a compiled package would, freezes
//! them into a registry and then drives the dynamic API:
//! - struct enumeration and field layout
//! - handler-backed functions
//! - interned array types written through a handle and read back boxed
//! - interface satisfaction and dispatch through an itab
//! - tags, conversion and deep equality across the public surface

mod common;

use pretty_assertions::assert_eq;
use refract_core::runtime::FuncObject;
use refract_core::types::{empty_interface, ChanDir, PTR_SIZE};
use refract_core::value::{make_slice, new, zero};
use refract_core::{
    basic, deep_equal, make_func, type_of, value_of, Kind, ModuleBuilder, ReflectError, ToValue, TypeRegistry,
};

// ============================================================================
// Structs
// ============================================================================

#[test]
fn test_struct_fields_enumerate_in_declaration_order() {
    common::init_tracing();
    let mut m = ModuleBuilder::new("main");
    let record = m
        .struct_type()
        .field("id", basic(Kind::Uint64))
        .field("name", basic(Kind::String))
        .build()
        .unwrap();

    let mut seen = Vec::new();
    record.fields(|f| seen.push((f.name.to_string(), f.offset, f.exported)));
    assert_eq!(
        seen,
        vec![("id".to_string(), 0, false), ("name".to_string(), PTR_SIZE, false)]
    );
    assert_eq!(record.size(), PTR_SIZE + 2 * PTR_SIZE);

    let v = zero(record);
    let s = v.as_struct().unwrap();
    assert_eq!(s.num_field(), 2);
    assert_eq!(s.field(0).as_uint().unwrap().get(), 0);
    assert!(s.field_by_name("name").unwrap().is_read_only());
}

#[test]
fn test_struct_tags_and_nested_access() {
    let reg = TypeRegistry::new();
    let mut m = ModuleBuilder::new("shop");
    let item = m
        .struct_type()
        .tagged_field("Sku", basic(Kind::String), r#"json:"sku" db:"item_sku""#)
        .tagged_field("Qty", basic(Kind::Int32), r#"json:"qty,omitempty""#)
        .build()
        .unwrap();
    let order = m
        .struct_type()
        .field("Item", item)
        .field("Ref", reg.ptr_to(item))
        .build()
        .unwrap();

    let (_, sku) = item.field_by_name("Sku").unwrap();
    assert_eq!(sku.tag().get("db").unwrap(), Some("item_sku".to_string()));
    let tags = item.field(1).unwrap().tag().parse().unwrap();
    assert!(tags.get("json").unwrap().has_option("omitempty"));

    let p = new(&reg, order);
    let o = p.deref().as_struct().unwrap();
    let qty = o.field_by_index(&[0, 1]).unwrap();
    assert!(qty.can_set());
    assert!(qty.as_int().unwrap().set(3));
    assert_eq!(o.field(0).as_struct().unwrap().field(1).as_int().unwrap().get(), 3);

    // nil pointer on the path
    assert!(o.field_by_index(&[1, 0]).is_none());
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_make_func_increments_its_argument() {
    common::init_tracing();
    let mut m = ModuleBuilder::new("main");
    let int = basic(Kind::Int);
    let ft = m.func(&[int], &[int], false).unwrap();

    let inc = make_func(ft, |args| vec![(args[0].as_int().unwrap().get() as isize + 1).to_value()]).unwrap();
    assert_eq!(inc.typ(), Some(ft));

    let out = inc.call(&[41isize.to_value()]).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].as_int().unwrap().get(), 42);

    assert_eq!(
        inc.call(&[]).unwrap_err(),
        ReflectError::ArgCount { want: 1, got: 0 }
    );
}

#[test]
fn test_make_func_variadic_receives_packed_slice() {
    let reg = TypeRegistry::new();
    let mut m = ModuleBuilder::new("main");
    let st = reg.slice_of(basic(Kind::String));
    let ft = m.func(&[basic(Kind::String), st], &[basic(Kind::Int)], true).unwrap();

    let count = make_func(ft, |args| {
        let sep = args[0].as_string().unwrap().get();
        let parts = args[1].as_slice().unwrap();
        let joined: Vec<String> = (0..parts.len())
            .map(|i| parts.index(i).as_string().unwrap().get())
            .collect();
        vec![(joined.join(&sep).len() as isize).to_value()]
    })
    .unwrap();

    let out = count
        .call(&["-".to_value(), "ab".to_value(), "c".to_value()])
        .unwrap();
    assert_eq!(out[0].as_int().unwrap().get(), 4);
    assert_eq!(count.call(&["-".to_value()]).unwrap()[0].as_int().unwrap().get(), 0);
}

// ============================================================================
// Arrays
// ============================================================================

#[test]
fn test_array_type_is_interned_and_writes_survive_boxing() {
    let reg = TypeRegistry::new();
    let a1 = reg.array_of(basic(Kind::Uint8), 6).unwrap();
    let a2 = reg.array_of(basic(Kind::Uint8), 6).unwrap();
    assert!(std::ptr::eq(a1, a2));
    assert_eq!(a1.string(), "[6]uint8");

    let arr = new(&reg, a1).deref();
    assert!(arr.index(4).as_uint().unwrap().set(0xAB));

    let boxed = arr.interface().unwrap();
    assert_eq!(type_of(&boxed), Some(a1));
    let back = value_of(&boxed);
    assert_eq!(back.len(), 6);
    assert_eq!(back.index(4).as_uint().unwrap().get(), 0xAB);
    assert_eq!(back.index(3).as_uint().unwrap().get(), 0);
}

// ============================================================================
// Interfaces
// ============================================================================

unsafe fn counter_get(_closure: *const FuncObject, frame: *mut u8) {
    let p = *(frame as *const *const isize);
    *(frame.add(PTR_SIZE) as *mut isize) = *p * 10;
}

#[test]
fn test_interface_dispatch_through_itab() {
    let mut m = ModuleBuilder::new("main");
    let int = basic(Kind::Int);
    let getter = m.func(&[], &[int], false).unwrap();
    let counter = m.named("Counter", int).method("Get", getter, counter_get).build().unwrap();
    let iface = m.interface(&[("Get", getter)]).unwrap();
    let module = m.finish().unwrap();
    let reg = TypeRegistry::builder().module(module).build();

    assert_eq!(reg.lookup_type("main", "Counter"), Some(counter));
    assert!(counter.implements(iface));
    assert!(!int.implements(iface));
    assert!(counter.assignable_to(iface));
    assert!(counter.convertible_to(int));

    let c = new(&reg, counter).deref();
    c.as_int().unwrap().set(4);
    let i = c.convert(iface).unwrap();
    assert_eq!(i.kind(), Kind::Interface);
    assert_eq!(i.unwrap_interface().typ(), Some(counter));

    let out = i.method_by_name("Get").unwrap().call(&[]).unwrap();
    assert_eq!(out[0].as_int().unwrap().get(), 40);
}

// ============================================================================
// Conversions and equality
// ============================================================================

#[test]
fn test_conversions_across_kinds() {
    let reg = TypeRegistry::new();
    let mut m = ModuleBuilder::new("main");
    let bytes = reg.slice_of(basic(Kind::Uint8));

    let b = "héllo".to_value().convert(bytes).unwrap();
    assert_eq!(b.len(), 6);
    let s = b.convert(basic(Kind::String)).unwrap();
    assert_eq!(s.as_string().unwrap().get(), "héllo");

    let f = 7.9f64.to_value().convert(basic(Kind::Int16)).unwrap();
    assert_eq!(f.as_int().unwrap().get(), 7);

    let ch = m.chan(basic(Kind::Int), ChanDir::Both);
    assert!(matches!(
        1i32.to_value().convert(ch),
        Err(ReflectError::NotConvertible { .. })
    ));

    let any = 3u8.to_value().convert(empty_interface()).unwrap();
    assert_eq!(any.unwrap_interface().as_uint().unwrap().get(), 3);
}

#[test]
fn test_deep_equal_on_independent_copies() {
    let reg = TypeRegistry::new();
    let st = reg.slice_of(basic(Kind::Float64));
    let mt = reg.map_of(basic(Kind::String), st).unwrap();

    let build = || {
        let xs = make_slice(st, 3, 3).unwrap();
        for i in 0..3 {
            xs.index(i).as_float().unwrap().set(i as f64 * 0.5);
        }
        let m = refract_core::value::make_map(mt).unwrap();
        m.as_map().unwrap().set(&"xs".to_value(), &xs);
        m
    };
    let (a, b) = (build(), build());
    assert!(a.deep_equal(&b));
    assert!(deep_equal(&a.interface().unwrap(), &b.interface().unwrap()));

    let xs = b.as_map().unwrap().get(&"xs".to_value()).unwrap();
    xs.index(2).as_float().unwrap().set(f64::NAN);
    assert!(!a.deep_equal(&b));
}
