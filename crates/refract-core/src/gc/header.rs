//! Allocation headers
//!
//! The heap keeps one [`AllocHeader`] per allocation in a side table keyed
//! by address, so interior pointers (slice elements, struct fields) can be
//! resolved to their owning allocation.
//!
//! ```text
//! side table                         memory
//! ┌──────────┬──────────────────┐    ┌─────────────────────────────┐
//! │ address  │ AllocHeader      │ -> │ count x typ.size bytes      │
//! │          │  typ, count      │    │ (scanned through typ's GC   │
//! │          │  layout, marked  │    │  data, element by element)  │
//! │          │  native hooks    │    └─────────────────────────────┘
//! └──────────┴──────────────────┘
//! ```

use crate::types::TypeRef;
use std::alloc::Layout;

/// Drop hook for Rust-owned objects placed on the heap
pub type DropFn = unsafe fn(*mut u8);

/// Trace hook for Rust-owned objects placed on the heap
pub type TraceFn = unsafe fn(*const u8, &mut dyn FnMut(*const u8));

/// Hooks for allocations that hold a Rust value rather than typed memory
#[derive(Clone, Copy)]
pub struct NativeHooks {
    /// Runs the value's destructor in place
    pub drop: DropFn,
    /// Reports heap pointers held by the value
    pub trace: TraceFn,
}

/// Metadata for one heap allocation
#[derive(Clone, Copy)]
pub struct AllocHeader {
    /// Element type, `None` for raw byte buffers
    typ: Option<TypeRef>,

    /// Number of consecutive elements
    count: usize,

    /// Layout used to allocate (and later free) the block
    layout: Layout,

    /// Mark bit (true = reachable)
    marked: bool,

    /// Hooks for native objects
    native: Option<NativeHooks>,
}

impl AllocHeader {
    /// Create a header for typed memory
    pub fn new(typ: Option<TypeRef>, count: usize, layout: Layout) -> Self {
        Self {
            typ,
            count,
            layout,
            marked: false,
            native: None,
        }
    }

    /// Create a header for a native object
    pub fn native(layout: Layout, hooks: NativeHooks) -> Self {
        Self {
            typ: None,
            count: 1,
            layout,
            marked: false,
            native: Some(hooks),
        }
    }

    /// Check if this allocation is marked
    #[inline]
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Mark this allocation as reachable
    #[inline]
    pub fn mark(&mut self) {
        self.marked = true;
    }

    /// Unmark this allocation (for the next cycle)
    #[inline]
    pub fn unmark(&mut self) {
        self.marked = false;
    }

    /// Element type
    #[inline]
    pub fn typ(&self) -> Option<TypeRef> {
        self.typ
    }

    /// Number of elements
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Allocation layout
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Size of the block in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Native hooks, if this is a native object
    #[inline]
    pub fn native_hooks(&self) -> Option<NativeHooks> {
        self.native
    }
}

impl std::fmt::Debug for AllocHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocHeader")
            .field("typ", &self.typ.map(|t| t.string()))
            .field("count", &self.count)
            .field("size", &self.layout.size())
            .field("marked", &self.marked)
            .field("native", &self.native.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{basic, Kind};

    #[test]
    fn test_header_mark_unmark() {
        let layout = Layout::from_size_align(16, 8).unwrap();
        let mut header = AllocHeader::new(Some(basic(Kind::Int64)), 2, layout);
        assert!(!header.is_marked());
        assert_eq!(header.count(), 2);
        assert_eq!(header.size(), 16);

        header.mark();
        assert!(header.is_marked());

        header.unmark();
        assert!(!header.is_marked());
    }
}
