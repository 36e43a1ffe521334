//! Equality and hashing algorithms
//!
//! A comparable type carries a [`TypeAlg`]: an `equal` and a `hash`
//! function operating on raw memory. Types whose values are plain bytes
//! (integers, booleans, pointers) use the memory algorithm; everything else
//! uses the generic algorithm, which dispatches on the kind and recurses
//! through array elements and struct fields.
//!
//! Floats follow IEEE semantics: `+0 == -0` and NaN never equals itself.

use super::descriptor::TypeRef;
use super::kind::Kind;
use crate::runtime::{Complex128, Complex64, EmptyInterface, NonEmptyInterface, StringHeader};
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};

/// Compare two values of type `t` at `p` and `q`
pub type EqualFn = unsafe fn(t: TypeRef, p: *const u8, q: *const u8) -> bool;

/// Hash a value of type `t` at `p` with `seed`
pub type HashFn = unsafe fn(t: TypeRef, p: *const u8, seed: u64) -> u64;

/// Equality and hash capability of a comparable type
#[derive(Clone, Copy)]
pub struct TypeAlg {
    /// Equality
    pub equal: EqualFn,
    /// Hash
    pub hash: HashFn,
}

impl TypeAlg {
    /// Byte-wise equality and hashing
    pub const MEMORY: TypeAlg = TypeAlg {
        equal: mem_equal,
        hash: mem_hash,
    };

    /// Kind-directed equality and hashing
    pub const GENERIC: TypeAlg = TypeAlg {
        equal: generic_equal,
        hash: generic_hash,
    };
}

impl fmt::Debug for TypeAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeAlg").finish_non_exhaustive()
    }
}

/// Compare two values of the same type
///
/// # Panics
///
/// Panics if `t` is not comparable, or if an interface holds a dynamic
/// type that is not comparable.
///
/// # Safety
///
/// `p` and `q` must point to initialized values of type `t`.
pub unsafe fn equal(t: TypeRef, p: *const u8, q: *const u8) -> bool {
    match t.alg() {
        Some(alg) => (alg.equal)(t, p, q),
        None => panic!("comparing uncomparable type {}", t),
    }
}

/// Hash a value
///
/// # Panics
///
/// Panics if `t` is not comparable.
///
/// # Safety
///
/// `p` must point to an initialized value of type `t`.
pub unsafe fn hash(t: TypeRef, p: *const u8, seed: u64) -> u64 {
    match t.alg() {
        Some(alg) => (alg.hash)(t, p, seed),
        None => panic!("hash of unhashable type {}", t),
    }
}

unsafe fn mem_equal(t: TypeRef, p: *const u8, q: *const u8) -> bool {
    let n = t.size();
    n == 0 || std::slice::from_raw_parts(p, n) == std::slice::from_raw_parts(q, n)
}

unsafe fn mem_hash(t: TypeRef, p: *const u8, seed: u64) -> u64 {
    hash_bytes(std::slice::from_raw_parts(p, t.size()), seed)
}

fn hash_bytes(bytes: &[u8], seed: u64) -> u64 {
    let mut h = FxHasher::default();
    h.write_u64(seed);
    h.write(bytes);
    h.finish()
}

fn hash_u64(v: u64, seed: u64) -> u64 {
    let mut h = FxHasher::default();
    h.write_u64(seed);
    h.write_u64(v);
    h.finish()
}

static NAN_SALT: AtomicU64 = AtomicU64::new(0x9e37_79b9_7f4a_7c15);

fn float_hash(f: f64, seed: u64) -> u64 {
    if f == 0.0 {
        // +0 and -0 compare equal
        hash_u64(0, seed)
    } else if f.is_nan() {
        // NaN != NaN, so any hash will do; spread them out
        hash_u64(NAN_SALT.fetch_add(1, Ordering::Relaxed), seed)
    } else {
        hash_u64(f.to_bits(), seed)
    }
}

unsafe fn generic_equal(t: TypeRef, p: *const u8, q: *const u8) -> bool {
    match t.kind() {
        Kind::Float32 => *(p as *const f32) == *(q as *const f32),
        Kind::Float64 => *(p as *const f64) == *(q as *const f64),
        Kind::Complex64 => {
            let (x, y) = (&*(p as *const Complex64), &*(q as *const Complex64));
            x.re == y.re && x.im == y.im
        }
        Kind::Complex128 => {
            let (x, y) = (&*(p as *const Complex128), &*(q as *const Complex128));
            x.re == y.re && x.im == y.im
        }
        Kind::String => {
            let (x, y) = (&*(p as *const StringHeader), &*(q as *const StringHeader));
            x.len == y.len && (x.data == y.data || x.as_bytes() == y.as_bytes())
        }
        Kind::Interface => {
            if t.interface_methods().is_empty() {
                eface_equal(&*(p as *const EmptyInterface), &*(q as *const EmptyInterface))
            } else {
                iface_equal(
                    &*(p as *const NonEmptyInterface),
                    &*(q as *const NonEmptyInterface),
                )
            }
        }
        Kind::Array => {
            let Some(arr) = t.as_array() else {
                return false;
            };
            let elem = arr.elem();
            (0..arr.len()).all(|i| {
                let off = i * elem.size();
                equal(elem, p.add(off), q.add(off))
            })
        }
        Kind::Struct => {
            let Some(st) = t.as_struct() else {
                return false;
            };
            st.fields()
                .iter()
                .filter(|f| !f.name.is_blank())
                .all(|f| equal(f.typ, p.add(f.offset()), q.add(f.offset())))
        }
        Kind::Func | Kind::Map | Kind::Slice | Kind::Invalid => false,
        _ => mem_equal(t, p, q),
    }
}

unsafe fn generic_hash(t: TypeRef, p: *const u8, seed: u64) -> u64 {
    match t.kind() {
        Kind::Float32 => float_hash(f64::from(*(p as *const f32)), seed),
        Kind::Float64 => float_hash(*(p as *const f64), seed),
        Kind::Complex64 => {
            let c = &*(p as *const Complex64);
            float_hash(f64::from(c.im), float_hash(f64::from(c.re), seed))
        }
        Kind::Complex128 => {
            let c = &*(p as *const Complex128);
            float_hash(c.im, float_hash(c.re, seed))
        }
        Kind::String => hash_bytes((*(p as *const StringHeader)).as_bytes(), seed),
        Kind::Interface => {
            let (dyn_type, word) = if t.interface_methods().is_empty() {
                let e = &*(p as *const EmptyInterface);
                (e.typ, e.word)
            } else {
                let i = &*(p as *const NonEmptyInterface);
                (i.itab.map(|tab| tab.typ), i.word)
            };
            match dyn_type {
                None => hash_u64(0, seed),
                Some(dt) => {
                    let seed = hash_u64(u64::from(dt.hash()), seed);
                    if dt.is_direct_iface() {
                        hash_u64(word as u64, seed)
                    } else {
                        hash(dt, word, seed)
                    }
                }
            }
        }
        Kind::Array => {
            let Some(arr) = t.as_array() else {
                return seed;
            };
            let elem = arr.elem();
            (0..arr.len()).fold(seed, |h, i| hash(elem, p.add(i * elem.size()), h))
        }
        Kind::Struct => {
            let Some(st) = t.as_struct() else {
                return seed;
            };
            st.fields()
                .iter()
                .filter(|f| !f.name.is_blank())
                .fold(seed, |h, f| hash(f.typ, p.add(f.offset()), h))
        }
        _ => mem_hash(t, p, seed),
    }
}

/// Compare two empty interfaces
///
/// # Safety
///
/// Both words must be valid for their dynamic types.
pub(crate) unsafe fn eface_equal(x: &EmptyInterface, y: &EmptyInterface) -> bool {
    match (x.typ, y.typ) {
        (None, None) => true,
        (Some(tx), Some(ty)) if tx == ty => dyn_equal(tx, x.word, y.word),
        _ => false,
    }
}

unsafe fn iface_equal(x: &NonEmptyInterface, y: &NonEmptyInterface) -> bool {
    match (x.itab, y.itab) {
        (None, None) => true,
        (Some(tx), Some(ty)) if std::ptr::eq(tx, ty) => dyn_equal(tx.typ, x.word, y.word),
        _ => false,
    }
}

unsafe fn dyn_equal(t: TypeRef, a: *mut u8, b: *mut u8) -> bool {
    if t.alg().is_none() {
        panic!("comparing uncomparable type {}", t);
    }
    if t.is_direct_iface() {
        return a == b;
    }
    equal(t, a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::basic;

    #[test]
    fn test_memory_equal_and_hash() {
        let t = basic(Kind::Int64);
        let (a, b, c) = (7i64, 7i64, 8i64);
        unsafe {
            let pa = &a as *const i64 as *const u8;
            let pb = &b as *const i64 as *const u8;
            let pc = &c as *const i64 as *const u8;
            assert!(equal(t, pa, pb));
            assert!(!equal(t, pa, pc));
            assert_eq!(hash(t, pa, 1), hash(t, pb, 1));
        }
    }

    #[test]
    fn test_float_semantics() {
        let t = basic(Kind::Float64);
        let (pz, nz, nan) = (0.0f64, -0.0f64, f64::NAN);
        unsafe {
            let p = |f: &f64| f as *const f64 as *const u8;
            assert!(equal(t, p(&pz), p(&nz)));
            assert_eq!(hash(t, p(&pz), 3), hash(t, p(&nz), 3));
            assert!(!equal(t, p(&nan), p(&nan)));
        }
    }

    #[test]
    fn test_string_equal() {
        let t = basic(Kind::String);
        let a = StringHeader::from_static("hello");
        let b = StringHeader::from_static("hello");
        let c = StringHeader::from_static("world");
        unsafe {
            let p = |s: &StringHeader| s as *const StringHeader as *const u8;
            assert!(equal(t, p(&a), p(&b)));
            assert!(!equal(t, p(&a), p(&c)));
            assert_eq!(hash(t, p(&a), 9), hash(t, p(&b), 9));
        }
    }
}
