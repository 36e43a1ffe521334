//! Map runtime
//!
//! A map value is one word pointing at a [`MapObject`] on the global heap.
//! Entries live in an array of `2^B` buckets laid out by the map type's
//! synthesized bucket descriptor, with overflow buckets chained off the
//! last word:
//!
//! ```text
//! bucket: [ tophash x8 | key x8 | elem x8 | overflow ptr ]
//! ```
//!
//! The low `B` bits of a key's hash pick the bucket; the top byte is kept
//! in the tophash array so most slots are skipped without comparing keys.
//! The table doubles and rehashes everything once the average load passes
//! 6.5 entries per bucket.

use crate::gc::{Heap, Trace};
use crate::types::alg;
use crate::types::factory::BUCKET_COUNT;
use crate::types::{MapType, TypeRef, PTR_SIZE};
use std::sync::atomic::{AtomicU64, Ordering};

const EMPTY: u8 = 0;
const DELETED: u8 = 1;
const MIN_TOPHASH: u8 = 2;

/// Load factor 6.5 as a fraction
const LOAD_NUM: usize = 13;
const LOAD_DEN: usize = 2;

static SEED: AtomicU64 = AtomicU64::new(0x9e37_79b9_7f4a_7c15);

fn tophash(hash: u64) -> u8 {
    let top = (hash >> 56) as u8;
    if top < MIN_TOPHASH {
        top + MIN_TOPHASH
    } else {
        top
    }
}

fn over_load(count: usize, log_buckets: u8) -> bool {
    count > BUCKET_COUNT && count * LOAD_DEN > LOAD_NUM << log_buckets
}

/// Heap-resident hash map
pub struct MapObject {
    typ: TypeRef,
    mt: &'static MapType,
    count: usize,
    log_buckets: u8,
    seed: u64,
    buckets: *mut u8,
}

impl MapObject {
    /// Allocate an empty map of type `typ` sized for `hint` entries
    ///
    /// Returns null if `typ` is not a map type.
    pub fn alloc(typ: TypeRef, hint: usize) -> *mut MapObject {
        let Some(mt) = typ.as_map() else {
            return std::ptr::null_mut();
        };
        let mut log_buckets = 0u8;
        while over_load(hint, log_buckets) {
            log_buckets += 1;
        }
        let mut map = MapObject {
            typ,
            mt,
            count: 0,
            log_buckets,
            seed: SEED.fetch_add(0x6a09_e667_f3bc_c909, Ordering::Relaxed),
            buckets: std::ptr::null_mut(),
        };
        map.buckets = map.alloc_buckets(1 << log_buckets);
        Heap::global().alloc_native(map)
    }

    /// Map type
    #[inline]
    pub fn typ(&self) -> TypeRef {
        self.typ
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the map has no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    fn mt(&self) -> &'static MapType {
        self.mt
    }

    fn alloc_buckets(&self, n: usize) -> *mut u8 {
        Heap::global().alloc_array(self.mt().bucket(), n)
    }

    fn bucket_size(&self) -> usize {
        self.mt().bucket_size()
    }

    unsafe fn bucket(&self, i: usize) -> *mut u8 {
        self.buckets.add(i * self.bucket_size())
    }

    unsafe fn overflow(&self, b: *mut u8) -> *mut *mut u8 {
        b.add(self.bucket_size() - PTR_SIZE) as *mut *mut u8
    }

    unsafe fn key_slot(&self, b: *mut u8, i: usize) -> *mut u8 {
        b.add(BUCKET_COUNT + i * self.mt().key_slot())
    }

    unsafe fn elem_slot(&self, b: *mut u8, i: usize) -> *mut u8 {
        let mt = self.mt();
        b.add(BUCKET_COUNT + BUCKET_COUNT * mt.key_slot() + i * mt.elem_slot())
    }

    unsafe fn key_at(&self, b: *mut u8, i: usize) -> *mut u8 {
        let slot = self.key_slot(b, i);
        if self.mt().indirect_key() {
            *(slot as *mut *mut u8)
        } else {
            slot
        }
    }

    unsafe fn elem_at(&self, b: *mut u8, i: usize) -> *mut u8 {
        let slot = self.elem_slot(b, i);
        if self.mt().indirect_elem() {
            *(slot as *mut *mut u8)
        } else {
            slot
        }
    }

    unsafe fn hash(&self, key: *const u8) -> u64 {
        alg::hash(self.mt().key(), key, self.seed)
    }

    /// Bucket and slot holding `key`
    unsafe fn find(&self, key: *const u8) -> Option<(*mut u8, usize)> {
        let h = self.hash(key);
        let top = tophash(h);
        let mask = (1usize << self.log_buckets) - 1;
        let mut b = self.bucket(h as usize & mask);
        while !b.is_null() {
            for i in 0..BUCKET_COUNT {
                if *b.add(i) == top && alg::equal(self.mt().key(), key, self.key_at(b, i)) {
                    return Some((b, i));
                }
            }
            b = *self.overflow(b);
        }
        None
    }

    /// Pointer to the element stored under `key`
    ///
    /// # Safety
    ///
    /// `key` must point at a valid value of the key type.
    pub unsafe fn get(&self, key: *const u8) -> Option<*mut u8> {
        if self.count == 0 {
            return None;
        }
        self.find(key).map(|(b, i)| self.elem_at(b, i))
    }

    /// Pointer to the element slot for `key`, inserting a zero element
    /// if the key is new
    ///
    /// # Safety
    ///
    /// `key` must point at a valid value of the key type.
    pub unsafe fn assign(&mut self, key: *const u8) -> *mut u8 {
        let mt = self.mt();
        let ksize = mt.key().size();

        if let Some((b, i)) = self.find(key) {
            if mt.need_key_update() {
                std::ptr::copy(key, self.key_at(b, i), ksize);
            }
            return self.elem_at(b, i);
        }

        if over_load(self.count + 1, self.log_buckets) {
            self.grow();
        }

        let h = self.hash(key);
        let mask = (1usize << self.log_buckets) - 1;
        let (b, i) = self.free_slot(self.bucket(h as usize & mask));
        *b.add(i) = tophash(h);

        let heap = Heap::global();
        let kslot = self.key_slot(b, i);
        if mt.indirect_key() {
            let p = heap.alloc(mt.key());
            *(kslot as *mut *mut u8) = p;
            std::ptr::copy_nonoverlapping(key, p, ksize);
        } else {
            std::ptr::copy_nonoverlapping(key, kslot, ksize);
        }
        let eslot = self.elem_slot(b, i);
        if mt.indirect_elem() {
            *(eslot as *mut *mut u8) = heap.alloc(mt.elem());
        }

        self.count += 1;
        self.elem_at(b, i)
    }

    /// First unused slot in the chain starting at `b`, growing the chain
    unsafe fn free_slot(&self, mut b: *mut u8) -> (*mut u8, usize) {
        loop {
            for i in 0..BUCKET_COUNT {
                let top = *b.add(i);
                if top == EMPTY || top == DELETED {
                    return (b, i);
                }
            }
            let next = *self.overflow(b);
            if next.is_null() {
                let fresh = self.alloc_buckets(1);
                *self.overflow(b) = fresh;
                return (fresh, 0);
            }
            b = next;
        }
    }

    /// Remove `key`; returns whether it was present
    ///
    /// # Safety
    ///
    /// `key` must point at a valid value of the key type.
    pub unsafe fn delete(&mut self, key: *const u8) -> bool {
        if self.count == 0 {
            return false;
        }
        let Some((b, i)) = self.find(key) else {
            return false;
        };
        let mt = self.mt();
        *b.add(i) = DELETED;
        std::ptr::write_bytes(self.key_slot(b, i), 0, mt.key_slot());
        std::ptr::write_bytes(self.elem_slot(b, i), 0, mt.elem_slot());
        self.count -= 1;
        true
    }

    /// Snapshot of `(key, elem)` pointers for every entry
    pub fn entries(&self) -> Vec<(*mut u8, *mut u8)> {
        let mut out = Vec::with_capacity(self.count);
        unsafe {
            for n in 0..(1usize << self.log_buckets) {
                let mut b = self.bucket(n);
                while !b.is_null() {
                    for i in 0..BUCKET_COUNT {
                        if *b.add(i) >= MIN_TOPHASH {
                            out.push((self.key_at(b, i), self.elem_at(b, i)));
                        }
                    }
                    b = *self.overflow(b);
                }
            }
        }
        out
    }

    /// Double the bucket array and reinsert every entry
    unsafe fn grow(&mut self) {
        let mt = self.mt();
        let (ksize, esize) = (mt.key().size(), mt.elem().size());
        let stride = ksize + esize;
        if stride == 0 {
            // at most one zero-size key can exist
            return;
        }

        // copy out before the old buckets become unreachable
        let entries = self.entries();
        let mut saved = Vec::with_capacity(entries.len() * stride);
        for &(k, e) in &entries {
            saved.extend_from_slice(std::slice::from_raw_parts(k, ksize));
            saved.extend_from_slice(std::slice::from_raw_parts(e, esize));
        }

        self.log_buckets += 1;
        self.buckets = self.alloc_buckets(1 << self.log_buckets);
        self.count = 0;
        tracing::trace!(map = self.typ.string(), buckets = 1usize << self.log_buckets, "map grow");

        for chunk in saved.chunks_exact(stride) {
            let e = self.assign(chunk.as_ptr());
            std::ptr::copy_nonoverlapping(chunk.as_ptr().add(ksize), e, esize);
        }
    }
}

impl Trace for MapObject {
    fn trace(&self, visit: &mut dyn FnMut(*const u8)) {
        visit(self.buckets);
        unsafe {
            for n in 0..(1usize << self.log_buckets) {
                let mut b = *self.overflow(self.bucket(n));
                while !b.is_null() {
                    visit(b);
                    b = *self.overflow(b);
                }
            }
        }
    }
}

impl std::fmt::Debug for MapObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapObject")
            .field("typ", &self.typ.string())
            .field("count", &self.count)
            .field("buckets", &(1usize << self.log_buckets))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::StringHeader;
    use crate::types::{basic, Kind, TypeRegistry};

    #[test]
    fn test_insert_get_delete() {
        let reg = TypeRegistry::new();
        let t = reg.map_of(basic(Kind::Int64), basic(Kind::Int64)).unwrap();
        let map = unsafe { &mut *MapObject::alloc(t, 0) };

        for k in 0i64..100 {
            unsafe { *(map.assign(&k as *const i64 as *const u8) as *mut i64) = k * 10 };
        }
        assert_eq!(map.len(), 100);
        assert!(map.log_buckets > 0);

        let k = 42i64;
        let e = unsafe { map.get(&k as *const i64 as *const u8) }.unwrap();
        assert_eq!(unsafe { *(e as *const i64) }, 420);

        assert!(unsafe { map.delete(&k as *const i64 as *const u8) });
        assert!(unsafe { map.get(&k as *const i64 as *const u8) }.is_none());
        assert_eq!(map.len(), 99);
        assert_eq!(map.entries().len(), 99);
    }

    #[test]
    fn test_string_keys_and_overwrite() {
        let reg = TypeRegistry::new();
        let t = reg.map_of(basic(Kind::String), basic(Kind::Int)).unwrap();
        let map = unsafe { &mut *MapObject::alloc(t, 4) };

        let a = StringHeader::from_static("alpha");
        let a2 = StringHeader::from_static("alpha");
        unsafe {
            *(map.assign(&a as *const StringHeader as *const u8) as *mut isize) = 1;
            *(map.assign(&a2 as *const StringHeader as *const u8) as *mut isize) = 2;
        }
        assert_eq!(map.len(), 1);
        let e = unsafe { map.get(&a as *const StringHeader as *const u8) }.unwrap();
        assert_eq!(unsafe { *(e as *const isize) }, 2);
    }

    #[test]
    fn test_nan_keys_never_match() {
        let reg = TypeRegistry::new();
        let t = reg.map_of(basic(Kind::Float64), basic(Kind::Bool)).unwrap();
        let map = unsafe { &mut *MapObject::alloc(t, 0) };
        let nan = f64::NAN;
        unsafe {
            map.assign(&nan as *const f64 as *const u8);
            map.assign(&nan as *const f64 as *const u8);
            assert!(map.get(&nan as *const f64 as *const u8).is_none());
        }
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_indirect_elements() {
        let reg = TypeRegistry::new();
        let big = reg.array_of(basic(Kind::Int64), 32).unwrap();
        let t = reg.map_of(basic(Kind::Int32), big).unwrap();
        let map = unsafe { &mut *MapObject::alloc(t, 0) };
        let k = 7i32;
        unsafe {
            let e = map.assign(&k as *const i32 as *const u8) as *mut [i64; 32];
            (*e)[31] = 99;
            let e = map.get(&k as *const i32 as *const u8).unwrap() as *const [i64; 32];
            assert_eq!((*e)[31], 99);
        }
    }
}
