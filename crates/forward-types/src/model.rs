//! Runtime type model.
//!
//! Types live in a directory arena and refer to each other by [`TypeId`].
//! A type owns fields, properties and methods; a property is a named pair of
//! accessor methods (`get_<Name>` / `set_<Name>`) stored alongside the other
//! methods of the type. Method bodies are native closures over an
//! [`Invocation`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;
use crate::errors::Fault;
use crate::value::{ObjectRef, Value};

/// Index of a type in a directory arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const OBJECT: TypeId = TypeId(0);
    pub const VOID: TypeId = TypeId(1);
    pub const BOOLEAN: TypeId = TypeId(2);
    pub const INT32: TypeId = TypeId(3);
    pub const INT64: TypeId = TypeId(4);
    pub const DOUBLE: TypeId = TypeId(5);
    pub const STRING: TypeId = TypeId(6);
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Module every built-in type is registered under.
pub const CORE_MODULE: &str = "System.Private.CoreLib";

/// Built-in types, registered in this order so their ids match the
/// `TypeId` constants.
pub const BUILTIN_TYPES: [(TypeId, &str, TypeKind); 7] = [
    (TypeId::OBJECT, "System.Object", TypeKind::Class),
    (TypeId::VOID, "System.Void", TypeKind::Void),
    (TypeId::BOOLEAN, "System.Boolean", TypeKind::ValueType),
    (TypeId::INT32, "System.Int32", TypeKind::ValueType),
    (TypeId::INT64, "System.Int64", TypeKind::ValueType),
    (TypeId::DOUBLE, "System.Double", TypeKind::ValueType),
    (TypeId::STRING, "System.String", TypeKind::Class),
];

/// Handle to a method slot: the owning type plus the index into its methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MethodRef {
    pub owner: TypeId,
    pub index: usize,
}

impl MethodRef {
    pub fn new(owner: TypeId, index: usize) -> Self {
        Self { owner, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeKind {
    Class,
    ValueType,
    Void,
}

/// Shared storage behind a static field.
pub type StaticCell = Arc<Mutex<Value>>;

#[derive(Debug, Clone)]
pub enum FieldStorage {
    /// One slot per object, stored in the object's field table.
    Instance,
    /// One slot per type.
    Static(StaticCell),
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub value_type: TypeId,
    /// Assignable only from within the declaring type.
    pub read_only: bool,
    pub storage: FieldStorage,
}

impl FieldDef {
    /// An instance field.
    pub fn instance(name: impl Into<String>, value_type: TypeId) -> Self {
        Self {
            name: name.into(),
            value_type,
            read_only: false,
            storage: FieldStorage::Instance,
        }
    }

    /// A static field holding `initial`.
    pub fn new_static(name: impl Into<String>, value_type: TypeId, initial: Value) -> Self {
        Self {
            name: name.into(),
            value_type,
            read_only: false,
            storage: FieldStorage::Static(Arc::new(Mutex::new(initial))),
        }
    }

    /// Mark the field read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_static(&self) -> bool {
        matches!(self.storage, FieldStorage::Static(_))
    }

    pub fn static_cell(&self) -> Option<&StaticCell> {
        match &self.storage {
            FieldStorage::Static(cell) => Some(cell),
            FieldStorage::Instance => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// What a method body sees when it runs.
pub struct Invocation<'a> {
    pub receiver: Option<&'a Value>,
    pub args: &'a [Value],
}

impl<'a> Invocation<'a> {
    /// The receiver as an object, or a fault naming `member`.
    pub fn this_object(&self, member: &str) -> Result<&'a ObjectRef, Fault> {
        match self.receiver {
            Some(Value::Object(obj)) => Ok(obj),
            Some(other) => Err(Fault::InvalidCast {
                expected: "object".to_string(),
                found: other.type_label(),
            }),
            None => Err(Fault::NullReference {
                member: member.to_string(),
            }),
        }
    }

    /// Positional argument `index`.
    pub fn arg(&self, index: usize) -> Result<&'a Value, Fault> {
        self.args.get(index).ok_or_else(|| {
            Fault::raised(
                "IndexOutOfRange",
                format!("argument {} of {}", index, self.args.len()),
            )
        })
    }

    /// Positional `Int32` argument.
    pub fn arg_i32(&self, index: usize) -> Result<i32, Fault> {
        let value = self.arg(index)?;
        value.as_i32().ok_or_else(|| Fault::InvalidCast {
            expected: "System.Int32".to_string(),
            found: value.type_label(),
        })
    }
}

/// Native body of a method.
pub type NativeBody = Arc<dyn Fn(&Invocation<'_>) -> Result<Value, Fault> + Send + Sync>;

#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeId,
    pub is_static: bool,
    pub annotations: Vec<Annotation>,
    pub body: NativeBody,
}

impl MethodDef {
    /// An instance method.
    pub fn new<F>(name: impl Into<String>, params: Vec<Param>, return_type: TypeId, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            return_type,
            is_static: false,
            annotations: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// A static method.
    pub fn new_static<F>(
        name: impl Into<String>,
        params: Vec<Param>,
        return_type: TypeId,
        body: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        Self {
            is_static: true,
            ..Self::new(name, params, return_type, body)
        }
    }

    /// A static placeholder whose own body just returns the default value of
    /// its return type. Used for stub declarations.
    pub fn stub(name: impl Into<String>, params: Vec<Param>, return_type: TypeId) -> Self {
        Self::new_static(name, params, return_type, move |_| {
            Ok(Value::default_for(return_type))
        })
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn param_types(&self) -> Vec<TypeId> {
        self.params.iter().map(|p| p.ty).collect()
    }

    /// Exact signature match by name and parameter types.
    pub fn matches(&self, name: &str, param_types: &[TypeId]) -> bool {
        self.name == name
            && self.params.len() == param_types.len()
            && self.params.iter().zip(param_types).all(|(p, t)| p.ty == *t)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("is_static", &self.is_static)
            .field("annotations", &self.annotations)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    pub value_type: TypeId,
    pub is_static: bool,
    /// Index of the `get_<Name>` accessor in the owning type's methods.
    pub getter: Option<usize>,
    /// Index of the `set_<Name>` accessor in the owning type's methods.
    pub setter: Option<usize>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub id: TypeId,
    pub module: String,
    /// Namespace-qualified name; nested types use `Outer+Inner`.
    pub full_name: String,
    pub kind: TypeKind,
    pub base: Option<TypeId>,
    pub declaring: Option<TypeId>,
    pub fields: Vec<FieldDef>,
    pub properties: Vec<PropertyDef>,
    pub methods: Vec<MethodDef>,
    pub nested: Vec<TypeId>,
    /// Set when the type cannot be loaded; scope enumeration skips it.
    pub load_error: Option<String>,
}

impl TypeDef {
    /// Simple name without namespace or declaring type.
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit(['.', '+'])
            .next()
            .unwrap_or(&self.full_name)
    }

    pub fn is_loadable(&self) -> bool {
        self.load_error.is_none()
    }

    pub fn field(&self, name: &str) -> Option<(usize, &FieldDef)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    pub fn property(&self, name: &str) -> Option<(usize, &PropertyDef)> {
        self.properties
            .iter()
            .enumerate()
            .find(|(_, p)| p.name == name)
    }

    pub fn method(&self, index: usize) -> Option<&MethodDef> {
        self.methods.get(index)
    }

    /// Index of the method declared on this type with exactly this signature.
    pub fn find_method(&self, name: &str, param_types: &[TypeId]) -> Option<usize> {
        self.methods.iter().position(|m| m.matches(name, param_types))
    }

    /// Index of the first method declared on this type with this name.
    pub fn method_named(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }
}
