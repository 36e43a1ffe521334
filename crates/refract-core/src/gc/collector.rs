//! Mark-sweep garbage collector
//!
//! Marking starts from an explicit [`RootSet`] and follows pointers found
//! through each allocation's type descriptor: for every element of the
//! block, the descriptor's GC data (flat mask or program) names the words
//! that hold pointers. Native objects report their pointers through
//! [`super::Trace`]. Unmarked blocks are swept.

use super::heap::{Heap, HeapInner};
use super::roots::RootSet;
use crate::types::PTR_SIZE;
use std::time::{Duration, Instant};

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total bytes freed
    pub bytes_freed: usize,

    /// Objects found reachable in the last collection
    pub last_live_objects: usize,

    /// Total pause time
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,
}

/// Heap statistics
#[derive(Debug, Clone)]
pub struct HeapStats {
    /// Total allocated bytes
    pub allocated_bytes: usize,

    /// Number of allocations
    pub allocation_count: usize,
}

/// Mark-sweep garbage collector over one heap
pub struct GarbageCollector<'h> {
    /// Heap being collected
    heap: &'h Heap,

    /// Root set
    roots: RootSet,

    /// Statistics
    stats: GcStats,
}

impl<'h> GarbageCollector<'h> {
    /// Create a collector for `heap`
    pub fn new(heap: &'h Heap) -> Self {
        Self {
            heap,
            roots: RootSet::new(),
            stats: GcStats::default(),
        }
    }

    /// Mutable access to the root set
    pub fn roots_mut(&mut self) -> &mut RootSet {
        &mut self.roots
    }

    /// Run a collection only if the heap passed its threshold
    pub fn maybe_collect(&mut self) -> bool {
        if self.heap.should_collect() {
            self.collect();
            true
        } else {
            false
        }
    }

    /// Run garbage collection
    pub fn collect(&mut self) {
        let start = Instant::now();

        let freed = {
            let mut inner = self.heap.lock();

            // Mark phase
            let live = self.mark(&mut inner);
            self.stats.last_live_objects = live;

            // Sweep phase
            let dead: Vec<usize> = inner
                .allocations
                .iter()
                .filter(|(_, h)| !h.is_marked())
                .map(|(&base, _)| base)
                .collect();
            let mut freed = Vec::with_capacity(dead.len());
            for base in dead {
                if let Some(header) = inner.allocations.remove(&base) {
                    inner.allocated_bytes -= header.size();
                    freed.push((base, header));
                }
            }

            // Adjust threshold (grow by 2x current usage)
            inner.threshold = (inner.allocated_bytes * 2).max(crate::config::current().gc_threshold_bytes);
            freed
        };

        // Destructors run without the heap lock held
        let bytes: usize = freed.iter().map(|(_, h)| h.size()).sum();
        for (base, header) in &freed {
            unsafe { Heap::release(*base, header) };
        }

        // Update stats
        let duration = start.elapsed();
        self.stats.collections += 1;
        self.stats.objects_freed += freed.len();
        self.stats.bytes_freed += bytes;
        self.stats.last_pause_time = duration;
        self.stats.total_pause_time += duration;

        tracing::debug!(
            freed = freed.len(),
            bytes,
            live = self.stats.last_live_objects,
            pause_us = duration.as_micros() as u64,
            "gc cycle complete"
        );
    }

    /// Mark phase: mark all reachable allocations, returning how many
    fn mark(&self, inner: &mut HeapInner) -> usize {
        // Clear all mark bits first
        for header in inner.allocations.values_mut() {
            header.unmark();
        }

        let mut live = 0;
        let mut worklist: Vec<usize> = self.roots.iter().collect();
        while let Some(addr) = worklist.pop() {
            let Some((base, header)) = inner.find(addr) else {
                continue;
            };
            if header.is_marked() {
                continue;
            }
            if let Some(h) = inner.allocations.get_mut(&base) {
                h.mark();
            }
            live += 1;

            let mut push = |p: *const u8| {
                if !p.is_null() {
                    worklist.push(p as usize);
                }
            };

            if let Some(hooks) = header.native_hooks() {
                unsafe { (hooks.trace)(base as *const u8, &mut push) };
                continue;
            }

            let Some(typ) = header.typ() else {
                continue;
            };
            if !typ.has_pointers() {
                continue;
            }
            let words = typ.ptr_words();
            for i in 0..header.count() {
                let elem = base + i * typ.size();
                typ.gc_data().for_each_pointer_word(words, |w| {
                    let slot = (elem + w * PTR_SIZE) as *const *const u8;
                    push(unsafe { *slot });
                });
            }
        }
        live
    }

    /// Get GC statistics
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Get heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        HeapStats {
            allocated_bytes: self.heap.allocated_bytes(),
            allocation_count: self.heap.allocation_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{basic, Kind, TypeRegistry};

    #[test]
    fn test_gc_creation() {
        let heap = Heap::new();
        let gc = GarbageCollector::new(&heap);
        let stats = gc.heap_stats();

        assert_eq!(stats.allocated_bytes, 0);
        assert_eq!(stats.allocation_count, 0);
    }

    #[test]
    fn test_gc_frees_unreachable() {
        let heap = Heap::new();
        let kept = heap.alloc(basic(Kind::Int64));
        heap.alloc(basic(Kind::Int64));
        heap.alloc_bytes(10);

        let mut gc = GarbageCollector::new(&heap);
        gc.roots_mut().add_ptr(kept);
        gc.collect();

        assert_eq!(gc.stats().collections, 1);
        assert_eq!(gc.stats().objects_freed, 2);
        assert_eq!(gc.heap_stats().allocation_count, 1);
        assert!(heap.contains(kept));
    }

    #[test]
    fn test_gc_follows_pointers() {
        let registry = TypeRegistry::builder().build();
        let int_ptr = registry.ptr_to(basic(Kind::Int64));

        let heap = Heap::new();
        let target = heap.alloc(basic(Kind::Int64));
        let holder = heap.alloc(int_ptr);
        unsafe { *(holder as *mut *mut u8) = target };

        let mut gc = GarbageCollector::new(&heap);
        gc.roots_mut().add_ptr(holder);
        gc.collect();

        assert_eq!(gc.stats().objects_freed, 0);
        assert!(heap.contains(target));

        gc.roots_mut().clear();
        gc.collect();
        assert_eq!(gc.heap_stats().allocation_count, 0);
    }
}
