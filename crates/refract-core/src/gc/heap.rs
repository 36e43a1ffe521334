//! Heap allocator for dynamically created values
//!
//! Memory handed out by the engine (new values, slice backing arrays,
//! string bytes, map buckets, call frames, function objects) comes from a
//! [`Heap`]. Every block is zeroed and recorded with an [`AllocHeader`]
//! naming its element type, so the collector can scan it precisely.
//!
//! There is one process-wide heap ([`Heap::global`]); privately owned
//! heaps exist for isolated collection and free everything when dropped.

use super::header::{AllocHeader, NativeHooks};
use crate::types::TypeRef;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::collections::BTreeMap;

/// Rust-owned objects living on the heap report their heap pointers
pub trait Trace {
    /// Call `visit` with every heap pointer held by `self`
    fn trace(&self, visit: &mut dyn FnMut(*const u8));
}

/// Backing storage for zero-sized allocations
static ZERO_BASE: u64 = 0;

/// Address returned for every zero-sized allocation
#[inline]
pub fn zero_base() -> *mut u8 {
    &ZERO_BASE as *const u64 as *mut u8
}

static GLOBAL: Lazy<Heap> = Lazy::new(|| {
    let heap = Heap::new();
    heap.set_threshold(crate::config::current().gc_threshold_bytes);
    heap
});

/// Heap allocator for engine-managed memory
pub struct Heap {
    inner: Mutex<HeapInner>,
}

pub(crate) struct HeapInner {
    /// All allocations, keyed by base address
    pub(crate) allocations: BTreeMap<usize, AllocHeader>,

    /// Total bytes allocated
    pub(crate) allocated_bytes: usize,

    /// Maximum heap size (0 = unlimited)
    max_heap_bytes: usize,

    /// Bytes after which a collection is suggested
    pub(crate) threshold: usize,
}

impl HeapInner {
    /// Allocation containing `addr`
    pub(crate) fn find(&self, addr: usize) -> Option<(usize, AllocHeader)> {
        let (&base, header) = self.allocations.range(..=addr).next_back()?;
        (addr < base + header.size()).then_some((base, *header))
    }
}

impl Heap {
    /// Create a new, empty heap
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HeapInner {
                allocations: BTreeMap::new(),
                allocated_bytes: 0,
                max_heap_bytes: 0, // Unlimited by default
                threshold: crate::config::Config::default().gc_threshold_bytes,
            }),
        }
    }

    /// The process-wide heap
    pub fn global() -> &'static Heap {
        &GLOBAL
    }

    /// Set maximum heap size
    pub fn set_max_heap_size(&self, bytes: usize) {
        self.inner.lock().max_heap_bytes = bytes;
    }

    /// Set the collection threshold
    pub fn set_threshold(&self, bytes: usize) {
        self.inner.lock().threshold = bytes;
    }

    /// Allocate one zeroed value of type `typ`
    ///
    /// # Panics
    ///
    /// Panics if the heap size limit is exceeded.
    pub fn alloc(&self, typ: TypeRef) -> *mut u8 {
        self.alloc_array(typ, 1)
    }

    /// Allocate `count` consecutive zeroed values of type `typ`
    ///
    /// # Panics
    ///
    /// Panics if the size overflows or the heap size limit is exceeded.
    pub fn alloc_array(&self, typ: TypeRef, count: usize) -> *mut u8 {
        let size = match typ.size().checked_mul(count) {
            Some(size) => size,
            None => panic!("allocation of {} x {} overflows", count, typ),
        };
        self.alloc_raw(Some(typ), count, size, typ.align().max(1))
    }

    /// Allocate a pointer-free byte buffer
    pub fn alloc_bytes(&self, len: usize) -> *mut u8 {
        self.alloc_raw(None, len, len, 1)
    }

    fn alloc_raw(&self, typ: Option<TypeRef>, count: usize, size: usize, align: usize) -> *mut u8 {
        if size == 0 {
            return zero_base();
        }
        let layout = match Layout::from_size_align(size, align) {
            Ok(layout) => layout,
            Err(_) => panic!("invalid allocation layout: size {} align {}", size, align),
        };

        let mut inner = self.inner.lock();
        self.check_limit(&inner, size);

        // Allocate memory
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }

        // Track allocation
        inner
            .allocations
            .insert(ptr as usize, AllocHeader::new(typ, count, layout));
        inner.allocated_bytes += size;
        ptr
    }

    /// Move a Rust value onto the heap
    ///
    /// The value is dropped when its block is swept or the heap is dropped;
    /// the collector discovers its outgoing pointers through [`Trace`].
    pub fn alloc_native<T: Trace + 'static>(&self, value: T) -> *mut T {
        unsafe fn drop_native<T>(p: *mut u8) {
            std::ptr::drop_in_place(p as *mut T);
        }
        unsafe fn trace_native<T: Trace>(p: *const u8, visit: &mut dyn FnMut(*const u8)) {
            (*(p as *const T)).trace(visit);
        }

        let layout = Layout::new::<T>();
        if layout.size() == 0 {
            // Zero-sized natives carry no state worth tracking
            std::mem::forget(value);
            return zero_base() as *mut T;
        }

        let mut inner = self.inner.lock();
        self.check_limit(&inner, layout.size());

        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        unsafe { (ptr as *mut T).write(value) };

        let hooks = NativeHooks {
            drop: drop_native::<T>,
            trace: trace_native::<T>,
        };
        inner
            .allocations
            .insert(ptr as usize, AllocHeader::native(layout, hooks));
        inner.allocated_bytes += layout.size();
        ptr as *mut T
    }

    fn check_limit(&self, inner: &HeapInner, size: usize) {
        if inner.max_heap_bytes > 0 && inner.allocated_bytes + size > inner.max_heap_bytes {
            panic!("Heap size limit exceeded");
        }
    }

    /// Header of the allocation containing `addr`, with its base address
    pub fn find(&self, addr: *const u8) -> Option<(usize, AllocHeader)> {
        self.inner.lock().find(addr as usize)
    }

    /// Whether `addr` points into an allocation of this heap
    pub fn contains(&self, addr: *const u8) -> bool {
        self.find(addr).is_some()
    }

    /// Get total allocated bytes
    pub fn allocated_bytes(&self) -> usize {
        self.inner.lock().allocated_bytes
    }

    /// Get number of allocations
    pub fn allocation_count(&self) -> usize {
        self.inner.lock().allocations.len()
    }

    /// Whether allocation has passed the collection threshold
    pub fn should_collect(&self) -> bool {
        let inner = self.inner.lock();
        inner.allocated_bytes > inner.threshold
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HeapInner> {
        self.inner.lock()
    }

    /// Release a block that has already been removed from the table
    ///
    /// # Safety
    ///
    /// `base` must be the start of a block described by `header` and must
    /// not be used afterwards.
    pub(crate) unsafe fn release(base: usize, header: &AllocHeader) {
        let ptr = base as *mut u8;
        if let Some(hooks) = header.native_hooks() {
            (hooks.drop)(ptr);
        }
        dealloc(ptr, header.layout());
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let allocations = std::mem::take(&mut self.inner.get_mut().allocations);
        for (base, header) in allocations {
            unsafe { Heap::release(base, &header) };
        }
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Heap")
            .field("allocations", &inner.allocations.len())
            .field("allocated_bytes", &inner.allocated_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{basic, Kind};

    struct Counted(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    impl Trace for Counted {
        fn trace(&self, _visit: &mut dyn FnMut(*const u8)) {}
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn test_heap_creation() {
        let heap = Heap::new();
        assert_eq!(heap.allocated_bytes(), 0);
        assert_eq!(heap.allocation_count(), 0);
    }

    #[test]
    fn test_alloc_is_zeroed_and_tracked() {
        let heap = Heap::new();
        let p = heap.alloc_array(basic(Kind::Int64), 4);
        let words = unsafe { std::slice::from_raw_parts(p as *const i64, 4) };
        assert_eq!(words, &[0, 0, 0, 0]);
        assert_eq!(heap.allocation_count(), 1);
        assert_eq!(heap.allocated_bytes(), 32);

        let (base, header) = heap.find(unsafe { p.add(17) }).unwrap();
        assert_eq!(base, p as usize);
        assert_eq!(header.count(), 4);
        assert!(heap.find(unsafe { p.add(32) }).is_none());
    }

    #[test]
    fn test_zero_sized_allocations_share_base() {
        let heap = Heap::new();
        assert_eq!(heap.alloc_bytes(0), zero_base());
        assert_eq!(heap.allocation_count(), 0);
    }

    #[test]
    fn test_native_objects_drop_with_heap() {
        let drops = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        {
            let heap = Heap::new();
            heap.alloc_native(Counted(drops.clone()));
            heap.alloc_native(Counted(drops.clone()));
            assert_eq!(heap.allocation_count(), 2);
        }
        assert_eq!(drops.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    #[should_panic(expected = "Heap size limit exceeded")]
    fn test_heap_limit() {
        let heap = Heap::new();
        heap.set_max_heap_size(16);
        heap.alloc_bytes(8);
        heap.alloc_bytes(16);
    }
}
