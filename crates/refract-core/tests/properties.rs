//! Property-based tests for the reflection engine
//!
//! These tests use proptest to check laws that must hold for every input:
//! 1. Interning: composite constructors return one descriptor per shape
//! 2. Tags: rendering a parsed tag and parsing it again is lossless
//! 3. Quoting: `unquote(quote(s)) == s`
//! 4. Conversion: integer conversions match native truncating casts
//! 5. Equality: every primitive equals itself, except NaN

use proptest::prelude::*;
use refract_core::types::tag::{quote, unquote};
use refract_core::types::{StructTag, Tag, Tags};
use refract_core::{basic, Kind, ToValue, TypeRegistry};

const ELEM_KINDS: [Kind; 8] = [
    Kind::Bool,
    Kind::Int8,
    Kind::Uint16,
    Kind::Int64,
    Kind::Float32,
    Kind::Complex128,
    Kind::String,
    Kind::UnsafePointer,
];

fn elem_kind() -> impl Strategy<Value = Kind> {
    prop::sample::select(ELEM_KINDS.to_vec())
}

fn tag_strategy() -> impl Strategy<Value = Tag> {
    (
        "[a-z][a-z0-9_]{0,7}",
        "[A-Za-z0-9_]{0,8}",
        prop::collection::vec("[a-z]{1,8}", 0..3),
    )
        .prop_map(|(key, name, options)| Tag { key, name, options })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_array_of_is_idempotent(kind in elem_kind(), len in 0usize..64) {
        let reg = TypeRegistry::new();
        let a = reg.array_of(basic(kind), len).unwrap();
        let b = reg.array_of(basic(kind), len).unwrap();
        prop_assert!(std::ptr::eq(a, b));
        prop_assert_eq!(a.len(), Some(len));
        prop_assert_eq!(a.size(), basic(kind).size() * len);
    }

    #[test]
    fn prop_slice_and_map_interning(kind in elem_kind()) {
        let reg = TypeRegistry::new();
        prop_assert!(std::ptr::eq(reg.slice_of(basic(kind)), reg.slice_of(basic(kind))));
        let m1 = reg.map_of(basic(Kind::String), basic(kind)).unwrap();
        let m2 = reg.map_of(basic(Kind::String), basic(kind)).unwrap();
        prop_assert!(std::ptr::eq(m1, m2));
    }

    #[test]
    fn prop_tags_render_then_parse(tags in prop::collection::vec(tag_strategy(), 1..4)) {
        let mut unique: Vec<Tag> = Vec::new();
        for t in tags {
            if !unique.iter().any(|u| u.key == t.key) {
                unique.push(t);
            }
        }
        let rendered = unique.iter().map(Tag::to_string).collect::<Vec<_>>().join(" ");

        let parsed = Tags::parse(&rendered).unwrap();
        prop_assert_eq!(parsed.tags(), &unique[..]);
        prop_assert_eq!(parsed.to_string(), rendered.clone());

        let first = &unique[0];
        prop_assert_eq!(StructTag(&rendered).get(&first.key).unwrap(), Some(first.value()));
        prop_assert_eq!(StructTag(&rendered).get("missing-key").unwrap(), None);
    }

    #[test]
    fn prop_quote_unquote(s in "[ -~\t\n\r\u{1}é日本]{0,32}") {
        prop_assert_eq!(unquote(&quote(&s)).unwrap(), s);
    }

    #[test]
    fn prop_int8_to_uint8_truncates(n in any::<i8>()) {
        let v = n.to_value().convert(basic(Kind::Uint8)).unwrap();
        prop_assert_eq!(v.as_uint().unwrap().get(), u64::from(n as u8));
    }

    #[test]
    fn prop_int64_narrowing_matches_cast(n in any::<i64>()) {
        let v = n.to_value().convert(basic(Kind::Int16)).unwrap();
        prop_assert_eq!(v.as_int().unwrap().get(), i64::from(n as i16));
        let u = n.to_value().convert(basic(Kind::Uint32)).unwrap();
        prop_assert_eq!(u.as_uint().unwrap().get(), u64::from(n as u32));
    }

    #[test]
    fn prop_int_overflow_matches_range(n in any::<i64>()) {
        let v = 0i8.to_value();
        let int8 = v.as_int().unwrap();
        prop_assert_eq!(int8.overflows(n), i8::try_from(n).is_err());
    }

    #[test]
    fn prop_primitives_equal_themselves(i in any::<i64>(), u in any::<u32>(), s in ".{0,16}", b in any::<bool>()) {
        prop_assert!(i.to_value().deep_equal(&i.to_value()));
        prop_assert!(u.to_value().deep_equal(&u.to_value()));
        prop_assert!(s.as_str().to_value().deep_equal(&s.as_str().to_value()));
        prop_assert!(b.to_value().deep_equal(&b.to_value()));
    }

    #[test]
    fn prop_floats_equal_themselves_unless_nan(x in any::<f64>()) {
        prop_assert_eq!(x.to_value().deep_equal(&x.to_value()), !x.is_nan());
    }
}
