//! # Type Directory
//!
//! Resolves type names to [`TypeId`]s, enumerates the types of a module and
//! answers the hierarchy questions the resolvers ask.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TypeDirectory`] | Trait every directory implements; most queries are provided methods |
//! | [`LocalTypeDirectory`] | In-memory arena of [`TypeDef`]s with a found-type cache |
//! | [`TypeBuilder`] | Fluent construction of a [`TypeDef`] before registration |
//!
//! ```
//! use forward_types::directory::{LocalTypeDirectory, TypeBuilder, TypeDirectory};
//! use forward_types::model::{FieldDef, TypeId};
//!
//! let dir = LocalTypeDirectory::new();
//! let a = dir.register(TypeBuilder::class("Demo", "Demo.A")).unwrap();
//! let b = dir
//!     .register(TypeBuilder::class("Demo", "Demo.B").extends(a).field(FieldDef::instance("count", TypeId::INT32)))
//!     .unwrap();
//!
//! assert!(dir.is_assignable_from(a, b));
//! assert_eq!(dir.find_type("Demo.B", None).unwrap(), b);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::annotation::Annotation;
use crate::errors::{Fault, ForwardError};
use crate::model::{
    FieldDef, FieldStorage, Invocation, MethodDef, MethodRef, NativeBody, Param, PropertyDef,
    StaticCell, TypeDef, TypeId, TypeKind, BUILTIN_TYPES, CORE_MODULE,
};
use crate::value::{Object, Value};

// =============================================================================
// TypeDirectory Trait
// =============================================================================

/// Name resolution and scope enumeration over a set of types.
///
/// Implementors supply the four lookups; hierarchy checks, method lookup and
/// invocation are provided on top of them.
pub trait TypeDirectory: Send + Sync {
    /// Definition of a registered type.
    fn type_def(&self, id: TypeId) -> Option<Arc<TypeDef>>;

    /// Resolve a namespace-qualified type name, optionally restricted to one
    /// module. Fails with [`ForwardError::TypeNotFound`].
    fn find_type(&self, full_name: &str, module_hint: Option<&str>)
        -> Result<TypeId, ForwardError>;

    /// All loadable types of a module. Types that fail to load are skipped.
    fn list_types(&self, scope: &str) -> Vec<TypeId>;

    /// Names of all modules that contain at least one type.
    fn modules(&self) -> Vec<String>;

    /// Full name of a type, or a placeholder for unknown ids.
    fn type_name(&self, id: TypeId) -> String {
        self.type_def(id)
            .map(|def| def.full_name.clone())
            .unwrap_or_else(|| format!("<unknown type {}>", id))
    }

    fn is_value_type(&self, id: TypeId) -> bool {
        self.type_def(id)
            .map(|def| def.kind == TypeKind::ValueType)
            .unwrap_or(false)
    }

    /// `target` accepts values of `source`: same type, `System.Object`, or an
    /// ancestor of `source`. `System.Void` is only assignable from itself.
    fn is_assignable_from(&self, target: TypeId, source: TypeId) -> bool {
        if target == source {
            return true;
        }
        if target == TypeId::VOID || source == TypeId::VOID {
            return false;
        }
        if target == TypeId::OBJECT {
            return true;
        }
        let mut current = self.type_def(source).and_then(|def| def.base);
        while let Some(id) = current {
            if id == target {
                return true;
            }
            current = self.type_def(id).and_then(|def| def.base);
        }
        false
    }

    /// Either type is assignable from the other.
    fn in_same_hierarchy(&self, a: TypeId, b: TypeId) -> bool {
        self.is_assignable_from(a, b) || self.is_assignable_from(b, a)
    }

    /// Find a method by exact signature on `owner` or, failing that, on its
    /// base chain.
    fn find_method(&self, owner: TypeId, name: &str, param_types: &[TypeId]) -> Option<MethodRef> {
        let mut current = Some(owner);
        while let Some(id) = current {
            let def = self.type_def(id)?;
            if let Some(index) = def.find_method(name, param_types) {
                return Some(MethodRef::new(id, index));
            }
            current = def.base;
        }
        None
    }

    /// Clone of the method behind a handle.
    fn method_def(&self, method: MethodRef) -> Option<MethodDef> {
        self.type_def(method.owner)
            .and_then(|def| def.method(method.index).cloned())
    }

    /// `Type.Member` label for diagnostics.
    fn method_label(&self, method: MethodRef) -> String {
        match self.type_def(method.owner) {
            Some(def) => match def.method(method.index) {
                Some(m) => format!("{}.{}", def.full_name, m.name),
                None => format!("{}.<method {}>", def.full_name, method.index),
            },
            None => format!("<unknown type {}>.<method {}>", method.owner, method.index),
        }
    }

    /// Most derived override of `method` visible from `runtime_type`.
    ///
    /// Walks from the runtime type up to the declaring type and returns the
    /// first instance method with the same name and parameter types.
    fn resolve_override(&self, method: MethodRef, runtime_type: TypeId) -> MethodRef {
        let Some(base_def) = self.method_def(method) else {
            return method;
        };
        if base_def.is_static || runtime_type == method.owner {
            return method;
        }
        let param_types = base_def.param_types();
        let mut current = Some(runtime_type);
        while let Some(id) = current {
            if id == method.owner {
                break;
            }
            let Some(def) = self.type_def(id) else { break };
            if let Some(index) = def.find_method(&base_def.name, &param_types) {
                if !def.methods[index].is_static {
                    return MethodRef::new(id, index);
                }
            }
            current = def.base;
        }
        method
    }

    /// Ensure `value` is a non-null instance of `expected`.
    fn check_instance(&self, value: &Value, expected: TypeId, member: &str) -> Result<(), Fault> {
        match value.runtime_type() {
            None => Err(Fault::NullReference {
                member: member.to_string(),
            }),
            Some(actual) if self.is_assignable_from(expected, actual) => Ok(()),
            Some(_) => Err(Fault::InvalidCast {
                expected: self.type_name(expected),
                found: value.type_label(),
            }),
        }
    }

    /// Convert a boxed value to `ty`: exact for value types (null is a
    /// fault), reference-compatible for classes, discarded for `System.Void`.
    fn unbox(&self, value: Value, ty: TypeId) -> Result<Value, Fault> {
        if ty == TypeId::VOID {
            return Ok(Value::Null);
        }
        match value.runtime_type() {
            None if self.is_value_type(ty) => Err(Fault::NullReference {
                member: format!("unbox to {}", self.type_name(ty)),
            }),
            None => Ok(value),
            Some(actual) if self.is_assignable_from(ty, actual) => Ok(value),
            Some(_) => Err(Fault::InvalidCast {
                expected: self.type_name(ty),
                found: value.type_label(),
            }),
        }
    }

    /// Run a method body.
    ///
    /// Instance methods require a receiver assignable to the declaring type;
    /// with `virtual_call` the most derived override of the receiver's runtime
    /// type runs instead.
    fn invoke(
        &self,
        method: MethodRef,
        receiver: Option<&Value>,
        args: &[Value],
        virtual_call: bool,
    ) -> Result<Value, Fault> {
        let label = self.method_label(method);
        let def = self
            .method_def(method)
            .ok_or_else(|| Fault::MissingMember {
                member: label.clone(),
            })?;
        if args.len() != def.arity() {
            return Err(Fault::ArgumentCount {
                member: label,
                expected: def.arity(),
                got: args.len(),
            });
        }
        if def.is_static {
            return (def.body)(&Invocation {
                receiver: None,
                args,
            });
        }
        let this = receiver.ok_or_else(|| Fault::NullReference {
            member: label.clone(),
        })?;
        self.check_instance(this, method.owner, &label)?;
        let target = match (virtual_call, this.runtime_type()) {
            (true, Some(runtime_type)) => self.resolve_override(method, runtime_type),
            _ => method,
        };
        let body = if target == method {
            def.body
        } else {
            self.method_def(target)
                .map(|m| m.body)
                .unwrap_or(def.body)
        };
        body(&Invocation {
            receiver: Some(this),
            args,
        })
    }

    /// Allocate an object of `ty` with every instance field along its base
    /// chain set to its default value.
    fn instantiate(&self, ty: TypeId) -> Result<Value, Fault> {
        let def = self.type_def(ty).ok_or_else(|| Fault::MissingMember {
            member: format!("{}..ctor", ty),
        })?;
        if def.kind != TypeKind::Class {
            return Err(Fault::raised(
                "InvalidOperation",
                format!("{} is not a class", def.full_name),
            ));
        }
        let object = Object::new(ty, def.full_name.clone());
        let mut current = Some(def);
        while let Some(def) = current {
            for field in def.fields.iter().filter(|f| !f.is_static()) {
                if !object.has_field(&field.name) {
                    object.set_field(&field.name, Value::default_for(field.value_type));
                }
            }
            current = def.base.and_then(|b| self.type_def(b));
        }
        Ok(Value::object(object))
    }
}

// =============================================================================
// TypeBuilder
// =============================================================================

/// Accessor layout of a property created by [`TypeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyShape {
    pub is_static: bool,
    pub readable: bool,
    pub writable: bool,
}

impl PropertyShape {
    pub const STATIC_GET: PropertyShape = PropertyShape {
        is_static: true,
        readable: true,
        writable: false,
    };
    pub const STATIC_GET_SET: PropertyShape = PropertyShape {
        is_static: true,
        readable: true,
        writable: true,
    };
    pub const INSTANCE_GET: PropertyShape = PropertyShape {
        is_static: false,
        readable: true,
        writable: false,
    };
    pub const INSTANCE_GET_SET: PropertyShape = PropertyShape {
        is_static: false,
        readable: true,
        writable: true,
    };
}

/// Fluent builder for a [`TypeDef`]; the id is assigned on registration.
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    def: TypeDef,
}

impl TypeBuilder {
    /// A reference type deriving from `System.Object`.
    pub fn class(module: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            def: TypeDef {
                id: TypeId(u32::MAX),
                module: module.into(),
                full_name: full_name.into(),
                kind: TypeKind::Class,
                base: Some(TypeId::OBJECT),
                declaring: None,
                fields: Vec::new(),
                properties: Vec::new(),
                methods: Vec::new(),
                nested: Vec::new(),
                load_error: None,
            },
        }
    }

    /// A value type.
    pub fn value_type(module: impl Into<String>, full_name: impl Into<String>) -> Self {
        let mut builder = Self::class(module, full_name);
        builder.def.kind = TypeKind::ValueType;
        builder
    }

    pub fn extends(mut self, base: TypeId) -> Self {
        self.def.base = Some(base);
        self
    }

    pub fn nested_in(mut self, declaring: TypeId) -> Self {
        self.def.declaring = Some(declaring);
        self
    }

    /// Mark the type as failing to load.
    pub fn load_error(mut self, reason: impl Into<String>) -> Self {
        self.def.load_error = Some(reason.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.def.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.def.methods.push(method);
        self
    }

    /// A property backed by a compiler-style hidden field.
    pub fn auto_property(self, name: &str, value_type: TypeId, shape: PropertyShape) -> Self {
        self.property_with(name, value_type, shape, Vec::new())
    }

    /// An auto property carrying declaration annotations.
    pub fn property_with(
        mut self,
        name: &str,
        value_type: TypeId,
        shape: PropertyShape,
        annotations: Vec<Annotation>,
    ) -> Self {
        let backing = format!("<{}>k__BackingField", name);
        let (getter, setter) = if shape.is_static {
            let cell: StaticCell = Arc::new(Mutex::new(Value::default_for(value_type)));
            self.def.fields.push(FieldDef {
                name: backing,
                value_type,
                read_only: false,
                storage: FieldStorage::Static(cell.clone()),
            });
            let read = cell.clone();
            let getter: NativeBody = Arc::new(move |_: &Invocation<'_>| Ok(read.lock().clone()));
            let setter: NativeBody = Arc::new(move |inv: &Invocation<'_>| {
                *cell.lock() = inv.arg(0)?.clone();
                Ok(Value::Null)
            });
            (getter, setter)
        } else {
            self.def.fields.push(FieldDef::instance(&backing, value_type));
            let read_name = backing.clone();
            let label = name.to_string();
            let write_label = label.clone();
            let getter: NativeBody = Arc::new(move |inv: &Invocation<'_>| {
                let this = inv.this_object(&label)?;
                Ok(this.field(&read_name).unwrap_or(Value::default_for(value_type)))
            });
            let setter: NativeBody = Arc::new(move |inv: &Invocation<'_>| {
                let this = inv.this_object(&write_label)?;
                this.set_field(&backing, inv.arg(0)?.clone());
                Ok(Value::Null)
            });
            (getter, setter)
        };
        self.push_property(
            name,
            value_type,
            shape,
            shape.readable.then_some(getter),
            shape.writable.then_some(setter),
            annotations,
        )
    }

    /// A property whose accessors run the given bodies.
    pub fn computed_property(
        self,
        name: &str,
        value_type: TypeId,
        is_static: bool,
        getter: Option<NativeBody>,
        setter: Option<NativeBody>,
    ) -> Self {
        let shape = PropertyShape {
            is_static,
            readable: getter.is_some(),
            writable: setter.is_some(),
        };
        self.push_property(name, value_type, shape, getter, setter, Vec::new())
    }

    fn push_property(
        mut self,
        name: &str,
        value_type: TypeId,
        shape: PropertyShape,
        getter: Option<NativeBody>,
        setter: Option<NativeBody>,
        annotations: Vec<Annotation>,
    ) -> Self {
        let getter = getter.map(|body| {
            self.def.methods.push(MethodDef {
                name: format!("get_{}", name),
                params: Vec::new(),
                return_type: value_type,
                is_static: shape.is_static,
                annotations: Vec::new(),
                body,
            });
            self.def.methods.len() - 1
        });
        let setter = setter.map(|body| {
            self.def.methods.push(MethodDef {
                name: format!("set_{}", name),
                params: vec![Param::new("value", value_type)],
                return_type: TypeId::VOID,
                is_static: shape.is_static,
                annotations: Vec::new(),
                body,
            });
            self.def.methods.len() - 1
        });
        self.def.properties.push(PropertyDef {
            name: name.to_string(),
            value_type,
            is_static: shape.is_static,
            getter,
            setter,
            annotations,
        });
        self
    }
}

// =============================================================================
// LocalTypeDirectory
// =============================================================================

/// In-memory type directory.
///
/// Types are kept in an arena indexed by [`TypeId`]; name lookups are cached
/// under `"{module}:{full_name}"` (and `":{full_name}"` for unhinted lookups)
/// once found.
pub struct LocalTypeDirectory {
    types: RwLock<Vec<Arc<TypeDef>>>,
    found_types: RwLock<HashMap<String, TypeId>>,
    /// Serializes define() so parent/nested bookkeeping stays consistent.
    define_lock: Mutex<()>,
}

impl Default for LocalTypeDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTypeDirectory {
    /// A directory holding only the built-in types.
    pub fn new() -> Self {
        let types = BUILTIN_TYPES
            .iter()
            .map(|(id, name, kind)| {
                Arc::new(TypeDef {
                    id: *id,
                    module: CORE_MODULE.to_string(),
                    full_name: name.to_string(),
                    kind: *kind,
                    base: (*id != TypeId::OBJECT && *kind != TypeKind::Void)
                        .then_some(TypeId::OBJECT),
                    declaring: None,
                    fields: Vec::new(),
                    properties: Vec::new(),
                    methods: Vec::new(),
                    nested: Vec::new(),
                    load_error: None,
                })
            })
            .collect();
        Self {
            types: RwLock::new(types),
            found_types: RwLock::new(HashMap::new()),
            define_lock: Mutex::new(()),
        }
    }

    /// Reserve an id for a type that will be defined later, so types can
    /// refer to each other before all of them are built.
    pub fn declare(
        &self,
        module: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Result<TypeId, ForwardError> {
        let mut placeholder = TypeBuilder::class(module, full_name).def;
        let mut types = self.types.write();
        if types
            .iter()
            .any(|t| t.module == placeholder.module && t.full_name == placeholder.full_name)
        {
            return Err(ForwardError::argument(
                "full_name",
                format!(
                    "'{}' is already registered in module '{}'",
                    placeholder.full_name, placeholder.module
                ),
            ));
        }
        let id = TypeId(types.len() as u32);
        placeholder.id = id;
        types.push(Arc::new(placeholder));
        Ok(id)
    }

    /// Fill in a declared type. The builder's module and name must match the
    /// declaration.
    pub fn define(&self, id: TypeId, builder: TypeBuilder) -> Result<TypeId, ForwardError> {
        let _guard = self.define_lock.lock();
        let mut def = builder.def;
        let existing = self.type_def(id).ok_or_else(|| {
            ForwardError::argument("id", format!("type {} was never declared", id))
        })?;
        if existing.module != def.module || existing.full_name != def.full_name {
            return Err(ForwardError::argument(
                "builder",
                format!(
                    "defines '{}:{}' but {} was declared as '{}:{}'",
                    def.module, def.full_name, id, existing.module, existing.full_name
                ),
            ));
        }
        for (what, referenced) in [("base", def.base), ("declaring", def.declaring)] {
            if let Some(other) = referenced {
                if self.type_def(other).is_none() {
                    return Err(ForwardError::argument(
                        what,
                        format!("{} of '{}' is not registered", other, def.full_name),
                    ));
                }
            }
        }
        def.id = id;
        def.nested = existing.nested.clone();
        let declaring = def.declaring;

        let mut types = self.types.write();
        types[id.0 as usize] = Arc::new(def);
        if let Some(parent) = declaring {
            let parent_def = &types[parent.0 as usize];
            if !parent_def.nested.contains(&id) {
                let mut updated = TypeDef::clone(parent_def);
                updated.nested.push(id);
                types[parent.0 as usize] = Arc::new(updated);
            }
        }
        debug!(type_id = %id, "defined type");
        Ok(id)
    }

    /// Declare and define in one step.
    pub fn register(&self, builder: TypeBuilder) -> Result<TypeId, ForwardError> {
        let id = self.declare(builder.def.module.clone(), builder.def.full_name.clone())?;
        self.define(id, builder)
    }

    /// Number of registered types, built-ins included.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    /// Forget cached name lookups.
    pub fn clear_cache(&self) {
        self.found_types.write().clear();
    }
}

impl TypeDirectory for LocalTypeDirectory {
    fn type_def(&self, id: TypeId) -> Option<Arc<TypeDef>> {
        self.types.read().get(id.0 as usize).cloned()
    }

    fn find_type(
        &self,
        full_name: &str,
        module_hint: Option<&str>,
    ) -> Result<TypeId, ForwardError> {
        let hint = module_hint.filter(|m| !m.is_empty());
        let key = format!("{}:{}", hint.unwrap_or(""), full_name);
        if let Some(id) = self.found_types.read().get(&key) {
            return Ok(*id);
        }

        let found = self
            .types
            .read()
            .iter()
            .find(|t| {
                t.full_name == full_name
                    && t.is_loadable()
                    && hint.map(|m| t.module == m).unwrap_or(true)
            })
            .map(|t| (t.id, t.module.clone()));

        let Some((id, module)) = found else {
            return Err(ForwardError::TypeNotFound {
                full_name: full_name.to_string(),
                module: hint.map(str::to_string),
            });
        };
        let mut cache = self.found_types.write();
        cache.insert(key, id);
        cache.insert(format!("{}:{}", module, full_name), id);
        Ok(id)
    }

    fn list_types(&self, scope: &str) -> Vec<TypeId> {
        self.types
            .read()
            .iter()
            .filter(|t| t.module == scope)
            .filter_map(|t| match &t.load_error {
                None => Some(t.id),
                Some(reason) => {
                    warn!(type_name = %t.full_name, %reason, "skipping type that failed to load");
                    None
                }
            })
            .collect()
    }

    fn modules(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for t in self.types.read().iter() {
            if !seen.contains(&t.module) {
                seen.push(t.module.clone());
            }
        }
        seen
    }
}
