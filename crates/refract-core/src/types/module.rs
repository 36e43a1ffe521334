//! Compiler-emitted type modules
//!
//! A [`Module`] is the set of descriptors one compiled package contributes,
//! together with a string-sorted index used to find a declared descriptor
//! by its textual form. Modules are assembled once with a [`ModuleBuilder`]
//! and are immutable afterwards, so lookups need no locking.
//!
//! ```text
//! ModuleBuilder::new("example.com/app")
//!     .struct_type() ... build()      -> struct { ... }
//!     .named("User", st) ... build()  -> app.User, *app.User
//!     .finish()                       -> Module { index sorted by string }
//! ```

use super::descriptor::{method_order, IMethod, Method, TypeDescriptor, TypeRef, UncommonType};
use super::factory::{self, FieldDecl};
use super::kind::{ChanDir, Kind};
use super::name::{is_exported_ident, Name};
use crate::runtime::CallFn;
use crate::{ReflectError, ReflectResult};
use rustc_hash::FxHashMap;

fn leak(t: TypeDescriptor) -> TypeRef {
    Box::leak(Box::new(t))
}

/// Last path segment of a package path
fn pkg_name(pkg_path: &str) -> &str {
    pkg_path.rsplit('/').next().unwrap_or(pkg_path)
}

/// Immutable set of declared descriptors for one package
#[derive(Debug)]
pub struct Module {
    pkg_path: String,
    types: Vec<TypeRef>,
    named: FxHashMap<String, TypeRef>,
    /// Sorted by textual form
    index: Vec<TypeRef>,
}

impl Module {
    /// Package path
    pub fn pkg_path(&self) -> &str {
        &self.pkg_path
    }

    /// Every descriptor in declaration order
    pub fn types(&self) -> &[TypeRef] {
        &self.types
    }

    /// Declared type by its unqualified name
    pub fn lookup(&self, name: &str) -> Option<TypeRef> {
        self.named.get(name).copied()
    }

    /// Descriptors whose textual form is exactly `s`
    ///
    /// Several unrelated types can share a textual form (same name in two
    /// packages with the same last path segment), so callers must verify
    /// the structure of each candidate.
    pub fn types_by_string(&self, s: &str) -> &[TypeRef] {
        let lo = self.index.partition_point(|t| t.string() < s);
        let hi = lo + self.index[lo..].partition_point(|t| t.string() == s);
        &self.index[lo..hi]
    }

    /// Number of declared descriptors
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the module declares nothing
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Builder for a [`Module`]
#[derive(Debug)]
pub struct ModuleBuilder {
    pkg_path: String,
    types: Vec<TypeRef>,
    named: FxHashMap<String, TypeRef>,
    forward: FxHashMap<String, TypeRef>,
}

impl ModuleBuilder {
    /// Start declaring types for `pkg_path`
    pub fn new(pkg_path: impl Into<String>) -> Self {
        Self {
            pkg_path: pkg_path.into(),
            types: Vec::new(),
            named: FxHashMap::default(),
            forward: FxHashMap::default(),
        }
    }

    /// Package path
    pub fn pkg_path(&self) -> &str {
        &self.pkg_path
    }

    fn add(&mut self, t: TypeDescriptor) -> TypeRef {
        let t = leak(t);
        self.types.push(t);
        t
    }

    /// Name record for a member (field or method) declared in this package
    fn member_name(&self, name: &str, tag: &str) -> ReflectResult<Name> {
        let exported = is_exported_ident(name);
        let pkg = if exported { None } else { Some(self.pkg_path.as_str()) };
        Name::new(name, tag, exported, pkg)
    }

    /// Declare `[len]elem`
    pub fn array(&mut self, elem: TypeRef, len: usize) -> ReflectResult<TypeRef> {
        Ok(self.add(factory::array_descriptor(elem, len)?))
    }

    /// Declare `[]elem`
    pub fn slice(&mut self, elem: TypeRef) -> TypeRef {
        self.add(factory::slice_descriptor(elem))
    }

    /// Declare `*elem`
    pub fn ptr(&mut self, elem: TypeRef) -> TypeRef {
        if let Some(&p) = self.types.iter().find(|t| t.kind() == Kind::Ptr && t.elem() == Some(elem)) {
            return p;
        }
        if let Some(p) = elem.ptr_to_this() {
            return p;
        }
        let p = self.add(factory::ptr_descriptor(elem));
        let _ = elem.ptr_to_this.set(p);
        p
    }

    /// Declare a pointer to the not yet declared named type `name`
    ///
    /// Used for recursive types. The named type with the same name adopts
    /// this pointer as its pointer type when it is built.
    pub fn forward_ptr(&mut self, name: &str) -> TypeRef {
        if let Some(&p) = self.forward.get(name) {
            return p;
        }
        let string = format!("*{}.{}", pkg_name(&self.pkg_path), name);
        let p = self.add(factory::forward_ptr_descriptor(&string));
        self.forward.insert(name.to_string(), p);
        p
    }

    /// Declare `map[key]elem`
    pub fn map(&mut self, key: TypeRef, elem: TypeRef) -> ReflectResult<TypeRef> {
        Ok(self.add(factory::map_descriptor(key, elem)?))
    }

    /// Declare a channel type
    pub fn chan(&mut self, elem: TypeRef, dir: ChanDir) -> TypeRef {
        self.add(factory::chan_descriptor(elem, dir))
    }

    /// Declare a function signature
    pub fn func(&mut self, ins: &[TypeRef], outs: &[TypeRef], variadic: bool) -> ReflectResult<TypeRef> {
        Ok(self.add(factory::func_descriptor(ins.to_vec(), outs.to_vec(), variadic)?))
    }

    /// Declare an interface type from `(name, signature)` pairs
    pub fn interface(&mut self, methods: &[(&str, TypeRef)]) -> ReflectResult<TypeRef> {
        let methods = methods
            .iter()
            .map(|&(name, typ)| Ok(IMethod { name: self.member_name(name, "")?, typ }))
            .collect::<ReflectResult<Vec<_>>>()?;
        let pkg = self.pkg_path.clone();
        Ok(self.add(factory::interface_descriptor(Some(&pkg), methods)?))
    }

    /// Start declaring a struct type
    pub fn struct_type(&mut self) -> StructBuilder<'_> {
        StructBuilder {
            module: self,
            fields: Vec::new(),
            error: None,
        }
    }

    /// Start declaring the named type `name` over `underlying`
    pub fn named(&mut self, name: &str, underlying: TypeRef) -> NamedBuilder<'_> {
        NamedBuilder {
            module: self,
            name: name.to_string(),
            underlying,
            value_methods: Vec::new(),
            pointer_methods: Vec::new(),
            error: None,
        }
    }

    /// Freeze the module
    ///
    /// Fails if a forward-declared pointer was never resolved.
    pub fn finish(self) -> ReflectResult<Module> {
        if let Some((name, _)) = self.forward.iter().find(|(_, p)| p.elem().is_none()) {
            return Err(ReflectError::InvalidType(format!(
                "forward pointer to {} was never resolved",
                name
            )));
        }

        let mut index = self.types.clone();
        index.sort_by(|a, b| a.string().cmp(b.string()));
        tracing::debug!(pkg = %self.pkg_path, types = index.len(), "module registered");
        Ok(Module {
            pkg_path: self.pkg_path,
            types: self.types,
            named: self.named,
            index,
        })
    }
}

/// Builder for a struct type
pub struct StructBuilder<'m> {
    module: &'m mut ModuleBuilder,
    fields: Vec<FieldDecl>,
    error: Option<ReflectError>,
}

impl<'m> StructBuilder<'m> {
    fn push(mut self, name: &str, typ: TypeRef, tag: &str, embedded: bool) -> Self {
        match self.module.member_name(name, tag) {
            Ok(name) => self.fields.push(FieldDecl { name, typ, embedded }),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Add a field
    pub fn field(self, name: &str, typ: TypeRef) -> Self {
        self.push(name, typ, "", false)
    }

    /// Add a field with a struct tag
    pub fn tagged_field(self, name: &str, typ: TypeRef, tag: &str) -> Self {
        self.push(name, typ, tag, false)
    }

    /// Add an embedded field, named after its type
    pub fn embedded(self, typ: TypeRef) -> Self {
        let base = match typ.kind() {
            Kind::Ptr => typ.elem().unwrap_or(typ),
            _ => typ,
        };
        let name = if base.is_named() {
            base.name().to_string()
        } else {
            base.string().trim_start_matches('*').to_string()
        };
        self.push(&name, typ, "", true)
    }

    /// Lay out and declare the struct
    pub fn build(self) -> ReflectResult<TypeRef> {
        if let Some(e) = self.error {
            return Err(e);
        }
        // only structs with unexported fields belong to a package
        let pkg = self
            .fields
            .iter()
            .any(|f| !f.name.is_exported())
            .then(|| self.module.pkg_path.clone());
        let t = factory::struct_descriptor(pkg.as_deref(), self.fields)?;
        Ok(self.module.add(t))
    }
}

/// Builder for a named type and its method sets
pub struct NamedBuilder<'m> {
    module: &'m mut ModuleBuilder,
    name: String,
    underlying: TypeRef,
    value_methods: Vec<Method>,
    pointer_methods: Vec<Method>,
    error: Option<ReflectError>,
}

impl<'m> NamedBuilder<'m> {
    fn method_record(&mut self, name: &str, mtyp: TypeRef, func: CallFn) -> Option<Method> {
        if mtyp.kind() != Kind::Func {
            self.error.get_or_insert(ReflectError::InvalidType(format!(
                "method {} has non-function type {}",
                name, mtyp
            )));
            return None;
        }
        match self.module.member_name(name, "") {
            Ok(name) => Some(Method { name, mtyp, func }),
            Err(e) => {
                self.error.get_or_insert(e);
                None
            }
        }
    }

    /// Add a method with a value receiver
    ///
    /// It belongs to the method sets of both `T` and `*T`.
    pub fn method(mut self, name: &str, mtyp: TypeRef, func: CallFn) -> Self {
        if let Some(m) = self.method_record(name, mtyp, func) {
            self.value_methods.push(m);
        }
        self
    }

    /// Add a method with a pointer receiver, present only on `*T`
    pub fn pointer_method(mut self, name: &str, mtyp: TypeRef, func: CallFn) -> Self {
        if let Some(m) = self.method_record(name, mtyp, func) {
            self.pointer_methods.push(m);
        }
        self
    }

    /// Declare the named type and its pointer type
    ///
    /// Returns the named type; its pointer type is reachable through
    /// [`TypeDescriptor::ptr_to_this`].
    pub fn build(self) -> ReflectResult<TypeRef> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let module = self.module;
        if module.named.contains_key(&self.name) {
            return Err(ReflectError::InvalidType(format!(
                "type {} declared twice",
                self.name
            )));
        }

        let mut all = self.value_methods.clone();
        all.extend(self.pointer_methods);
        all.sort_by(|a, b| method_order(&a.name, &b.name));
        if let Some(w) = all.windows(2).find(|w| w[0].name.name() == w[1].name.name()) {
            return Err(ReflectError::InvalidType(format!(
                "method {} declared twice",
                w[0].name.name()
            )));
        }

        let t = factory::named_descriptor(&module.pkg_path, &self.name, self.underlying, self.value_methods);
        let t = module.add(t);
        module.named.insert(self.name.clone(), t);

        let exported = all.iter().take_while(|m| m.name.is_exported()).count();
        let table = UncommonType {
            pkg_path: None,
            methods: all,
            exported,
        };
        let p = match module.forward.get(&self.name).copied() {
            Some(p) => {
                p.as_ptr()
                    .and_then(|pt| pt.elem.set(t).ok())
                    .ok_or_else(|| ReflectError::InvalidType(format!("*{} resolved twice", self.name)))?;
                p
            }
            None => module.add(factory::ptr_descriptor(t)),
        };
        let _ = p.uncommon.set(table);
        let _ = t.ptr_to_this.set(p);
        Ok(t)
    }
}
