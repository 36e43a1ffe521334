//! GC root tracking
//!
//! Roots are addresses the collector must treat as live: values held by
//! the embedder outside the heap. A root may point anywhere inside an
//! allocation; the whole allocation is kept.

use crate::runtime::EmptyInterface;
use crate::value::Value;

/// Root set for garbage collection
#[derive(Debug, Default, Clone)]
pub struct RootSet {
    roots: Vec<usize>,
}

impl RootSet {
    /// Create a new root set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw address
    pub fn add_ptr(&mut self, ptr: *const u8) {
        if !ptr.is_null() {
            self.roots.push(ptr as usize);
        }
    }

    /// Keep the memory behind a value handle alive
    pub fn add_value(&mut self, value: &Value) {
        if value.is_valid() {
            self.add_ptr(value.raw_ptr());
        }
    }

    /// Keep the memory behind a boxed value alive
    pub fn add_eface(&mut self, e: &EmptyInterface) {
        if e.typ.is_some_and(|t| t.has_pointers() || !t.is_direct_iface()) {
            self.add_ptr(e.word);
        }
    }

    /// Remove every root
    pub fn clear(&mut self) {
        self.roots.clear();
    }

    /// Iterate over all roots
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.roots.iter().copied()
    }

    /// Get total number of roots
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_set_ignores_null() {
        let mut roots = RootSet::new();
        roots.add_ptr(std::ptr::null());
        assert!(roots.is_empty());

        let x = 5u64;
        roots.add_ptr(&x as *const u64 as *const u8);
        assert_eq!(roots.len(), 1);
        roots.clear();
        assert!(roots.is_empty());
    }
}
