//! Canonical type registry
//!
//! The registry owns the frozen set of compiler-emitted [`Module`]s and the
//! cache of descriptors synthesized at run time. Every composite request
//! resolves in the same order:
//!
//! 1. shared-read lookup in the cache;
//! 2. binary search of each module's string index, verifying structure;
//! 3. build the descriptor with no lock held (all validation happens here);
//! 4. exclusive insert, re-checking for a racing winner.
//!
//! A losing builder's descriptor is dropped, never registered, so two
//! requests for one shape always observe the same descriptor.

use super::descriptor::{TypeDescriptor, TypeRef};
use super::factory;
use super::kind::Kind;
use super::module::Module;
use crate::ReflectResult;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Canonical shape key; types are identified by address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheKey {
    Ptr(usize),
    Slice(usize),
    Array(usize, usize),
    Map(usize, usize),
}

fn addr(t: TypeRef) -> usize {
    t as *const TypeDescriptor as usize
}

/// Registry of compiler-emitted and synthesized descriptors
pub struct TypeRegistry {
    modules: Vec<Module>,
    cache: RwLock<FxHashMap<CacheKey, TypeRef>>,
}

/// Builder for a [`TypeRegistry`]
#[derive(Default)]
pub struct TypeRegistryBuilder {
    modules: Vec<Module>,
}

impl TypeRegistryBuilder {
    /// Add a compiled module
    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Freeze the module set
    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            modules: self.modules,
            cache: RwLock::new(FxHashMap::default()),
        }
    }
}

impl TypeRegistry {
    /// Start a registry
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Registry with no compiled modules
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Compiled modules
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Compiler-emitted descriptors whose textual form is `s`
    pub fn types_by_string(&self, s: &str) -> Vec<TypeRef> {
        self.modules
            .iter()
            .flat_map(|m| m.types_by_string(s).iter().copied())
            .collect()
    }

    /// Declared type `name` of package `pkg_path`
    pub fn lookup_type(&self, pkg_path: &str, name: &str) -> Option<TypeRef> {
        self.modules
            .iter()
            .filter(|m| m.pkg_path() == pkg_path)
            .find_map(|m| m.lookup(name))
    }

    /// Number of synthesized or adopted descriptors in the cache
    pub fn cached_types(&self) -> usize {
        self.cache.read().len()
    }

    /// Pointer type `*elem`
    pub fn ptr_to(&self, elem: TypeRef) -> TypeRef {
        let key = CacheKey::Ptr(addr(elem));
        let string = format!("*{}", elem.string());
        let p = match self.lookup(key, &string, |t| t.kind() == Kind::Ptr && t.elem() == Some(elem)) {
            Some(p) => p,
            // built by another registry or module: adopt it
            None => match elem.ptr_to_this() {
                Some(p) => *self.cache.write().entry(key).or_insert(p),
                None => self.insert(key, factory::ptr_descriptor(elem)),
            },
        };
        let _ = elem.ptr_to_this.set(p);
        elem.ptr_to_this().unwrap_or(p)
    }

    /// Slice type `[]elem`
    pub fn slice_of(&self, elem: TypeRef) -> TypeRef {
        let key = CacheKey::Slice(addr(elem));
        let string = format!("[]{}", elem.string());
        match self.lookup(key, &string, |t| t.kind() == Kind::Slice && t.elem() == Some(elem)) {
            Some(t) => t,
            None => self.insert(key, factory::slice_descriptor(elem)),
        }
    }

    /// Array type `[len]elem`
    ///
    /// Fails if the total size overflows.
    pub fn array_of(&self, elem: TypeRef, len: usize) -> ReflectResult<TypeRef> {
        let key = CacheKey::Array(addr(elem), len);
        let string = format!("[{}]{}", len, elem.string());
        let found = self.lookup(key, &string, |t| {
            t.kind() == Kind::Array && t.elem() == Some(elem) && t.len() == Some(len)
        });
        match found {
            Some(t) => Ok(t),
            None => Ok(self.insert(key, factory::array_descriptor(elem, len)?)),
        }
    }

    /// Map type `map[key]elem`
    ///
    /// Fails if `key` is not comparable.
    pub fn map_of(&self, key: TypeRef, elem: TypeRef) -> ReflectResult<TypeRef> {
        let cache_key = CacheKey::Map(addr(key), addr(elem));
        let string = format!("map[{}]{}", key.string(), elem.string());
        let found = self.lookup(cache_key, &string, |t| {
            t.kind() == Kind::Map && t.key() == Some(key) && t.elem() == Some(elem)
        });
        match found {
            Some(t) => Ok(t),
            None => Ok(self.insert(cache_key, factory::map_descriptor(key, elem)?)),
        }
    }

    /// Cached or compiler-emitted descriptor for a shape
    fn lookup(&self, key: CacheKey, string: &str, matches: impl Fn(TypeRef) -> bool) -> Option<TypeRef> {
        if let Some(&t) = self.cache.read().get(&key) {
            tracing::trace!(shape = string, "type cache hit");
            return Some(t);
        }

        // Compiler-emitted descriptors keep their identity
        let t = self.types_by_string(string).into_iter().find(|&t| matches(t))?;
        Some(*self.cache.write().entry(key).or_insert(t))
    }

    /// Register a fully validated descriptor unless another thread won
    fn insert(&self, key: CacheKey, built: TypeDescriptor) -> TypeRef {
        let mut cache = self.cache.write();
        if let Some(&winner) = cache.get(&key) {
            return winner;
        }
        let t: TypeRef = Box::leak(Box::new(built));
        cache.insert(key, t);
        tracing::debug!(
            shape = t.string(),
            size = t.size(),
            gc = %t.gc_data(),
            "synthesized type"
        );
        t
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("modules", &self.modules.len())
            .field("cached", &self.cached_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{basic, ModuleBuilder};
    use crate::ReflectError;
    use std::sync::Arc;

    #[test]
    fn test_array_of_is_interned() {
        let reg = TypeRegistry::new();
        let a = reg.array_of(basic(Kind::Uint8), 6).unwrap();
        let b = reg.array_of(basic(Kind::Uint8), 6).unwrap();
        assert!(std::ptr::eq(a, b));
        assert_ne!(a, reg.array_of(basic(Kind::Uint8), 7).unwrap());
        assert_eq!(reg.cached_types(), 2);
    }

    #[test]
    fn test_module_types_keep_identity() {
        let mut m = ModuleBuilder::new("main");
        let declared = m.slice(basic(Kind::Float32));
        let arr = m.array(basic(Kind::Int16), 3).unwrap();
        let reg = TypeRegistry::builder().module(m.finish().unwrap()).build();

        assert_eq!(reg.slice_of(basic(Kind::Float32)), declared);
        assert_eq!(reg.array_of(basic(Kind::Int16), 3).unwrap(), arr);
        assert_eq!(reg.types_by_string("[]float32"), vec![declared]);
    }

    #[test]
    fn test_ptr_to_sets_back_reference() {
        let reg = TypeRegistry::new();
        let elem = reg.array_of(basic(Kind::Int8), 33).unwrap();
        assert!(elem.ptr_to_this().is_none());
        let p = reg.ptr_to(elem);
        assert_eq!(elem.ptr_to_this(), Some(p));
        assert_eq!(reg.ptr_to(elem), p);
        assert_eq!(p.string(), "*[33]int8");
    }

    #[test]
    fn test_ptr_to_prefers_declared_pointer() {
        let mut m = ModuleBuilder::new("main");
        let celsius = m.named("Celsius", basic(Kind::Float64)).build().unwrap();
        let declared = m.ptr(celsius);
        let reg = TypeRegistry::builder().module(m.finish().unwrap()).build();
        assert_eq!(reg.cached_types(), 0);

        assert_eq!(reg.ptr_to(celsius), declared);
        assert_eq!(reg.cached_types(), 1);

        // a second registry adopts the same descriptor
        let other = TypeRegistry::new();
        assert_eq!(other.ptr_to(celsius), declared);
        assert_eq!(other.cached_types(), 1);
    }

    #[test]
    fn test_failed_map_registers_nothing() {
        let reg = TypeRegistry::new();
        let key = reg.slice_of(basic(Kind::Int));
        let before = reg.cached_types();
        assert!(matches!(
            reg.map_of(key, basic(Kind::Int)),
            Err(ReflectError::InvalidMapKey(_))
        ));
        assert_eq!(reg.cached_types(), before);
    }

    #[test]
    fn test_concurrent_requests_agree() {
        let reg = Arc::new(TypeRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    reg.map_of(basic(Kind::String), basic(Kind::Int64)).unwrap() as *const TypeDescriptor as usize
                })
            })
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }
}
