//! Variable resolution - one get/set capability over fields and properties.
//!
//! A [`VariableHandle`] is resolved once per (type, name) and shared from
//! then on, so two resolutions of the same storage return the same `Arc`.
//!
//! When a type has both a field and a property with the requested name, the
//! field wins. Lookup walks the owner type first, then its base chain, for
//! fields; only if no field exists anywhere on the chain are properties
//! searched the same way.

use std::collections::HashMap;
use std::sync::Arc;

use forward_types::directory::TypeDirectory;
use forward_types::errors::{Fault, ForwardError};
use forward_types::model::{MethodRef, StaticCell, TypeId};
use forward_types::value::Value;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::Lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageKind {
    Field,
    Property,
}

#[derive(Debug, Clone)]
enum Access {
    StaticField(StaticCell),
    InstanceField,
    Property {
        getter: Option<MethodRef>,
        setter: Option<MethodRef>,
    },
}

/// A resolved storage location.
#[derive(Debug)]
pub struct VariableHandle {
    owner: TypeId,
    name: String,
    label: String,
    value_type: TypeId,
    is_static: bool,
    read_only: bool,
    access: Access,
}

impl VariableHandle {
    /// Type that declares the storage (may be an ancestor of the requested type).
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Type.name` for messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn kind(&self) -> StorageKind {
        match self.access {
            Access::Property { .. } => StorageKind::Property,
            _ => StorageKind::Field,
        }
    }

    pub fn gettable(&self) -> bool {
        match &self.access {
            Access::Property { getter, .. } => getter.is_some(),
            _ => true,
        }
    }

    pub fn settable(&self) -> bool {
        match &self.access {
            Access::Property { setter, .. } => setter.is_some(),
            _ => !self.read_only,
        }
    }

    /// Read the storage. `receiver` is ignored for static storage.
    pub fn get(&self, directory: &dyn TypeDirectory, receiver: Option<&Value>) -> Result<Value, Fault> {
        match &self.access {
            Access::StaticField(cell) => Ok(cell.lock().clone()),
            Access::InstanceField => {
                let this = self.instance(directory, receiver)?;
                let Some(obj) = this.as_object() else {
                    return Err(Fault::InvalidCast {
                        expected: directory.type_name(self.owner),
                        found: this.type_label(),
                    });
                };
                Ok(obj
                    .field(&self.name)
                    .unwrap_or(Value::default_for(self.value_type)))
            }
            Access::Property { getter: Some(getter), .. } => {
                let this = if self.is_static { None } else { receiver };
                directory.invoke(*getter, this, &[], true)
            }
            Access::Property { getter: None, .. } => Err(Fault::raised(
                "MissingMethod",
                format!("property '{}' has no getter", self.label),
            )),
        }
    }

    /// Write the storage after checking the value against its type.
    pub fn set(
        &self,
        directory: &dyn TypeDirectory,
        receiver: Option<&Value>,
        value: Value,
    ) -> Result<(), Fault> {
        let value = directory.unbox(value, self.value_type)?;
        match &self.access {
            Access::StaticField(_) | Access::InstanceField if self.read_only => Err(Fault::raised(
                "FieldAccess",
                format!("field '{}' is read-only", self.label),
            )),
            Access::StaticField(cell) => {
                *cell.lock() = value;
                Ok(())
            }
            Access::InstanceField => {
                let this = self.instance(directory, receiver)?;
                match this.as_object() {
                    Some(obj) => {
                        obj.set_field(&self.name, value);
                        Ok(())
                    }
                    None => Err(Fault::InvalidCast {
                        expected: directory.type_name(self.owner),
                        found: this.type_label(),
                    }),
                }
            }
            Access::Property { setter: Some(setter), .. } => {
                let this = if self.is_static { None } else { receiver };
                directory.invoke(*setter, this, &[value], true).map(|_| ())
            }
            Access::Property { setter: None, .. } => Err(Fault::raised(
                "MissingMethod",
                format!("property '{}' has no setter", self.label),
            )),
        }
    }

    fn instance<'v>(
        &self,
        directory: &dyn TypeDirectory,
        receiver: Option<&'v Value>,
    ) -> Result<&'v Value, Fault> {
        let this = receiver.ok_or_else(|| Fault::NullReference {
            member: self.label.clone(),
        })?;
        directory.check_instance(this, self.owner, &self.label)?;
        Ok(this)
    }
}

/// Cache of resolved storage, keyed by (requested type, name).
#[derive(Debug, Default)]
pub struct VariableResolver {
    cache: RwLock<HashMap<(TypeId, String), Arc<VariableHandle>>>,
}

impl VariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find storage named `name` on `owner` or its ancestors.
    ///
    /// The first resolution is cached; concurrent first resolutions all end up
    /// sharing whichever handle was inserted first.
    pub fn lookup(
        &self,
        directory: &dyn TypeDirectory,
        owner: TypeId,
        name: &str,
    ) -> Result<Lookup<Arc<VariableHandle>>, ForwardError> {
        let key = (owner, name.to_string());
        if let Some(handle) = self.cache.read().get(&key) {
            return Ok(Lookup::Found(handle.clone()));
        }
        if directory.type_def(owner).is_none() {
            return Err(ForwardError::argument(
                "type",
                format!("{} is not a registered type", owner),
            ));
        }
        let Some(handle) = Self::build(directory, owner, name) else {
            return Ok(Lookup::NotFound);
        };
        debug!(
            variable = %handle.label,
            kind = ?handle.kind(),
            is_static = handle.is_static,
            "resolved variable"
        );
        let mut cache = self.cache.write();
        let shared = cache.entry(key).or_insert_with(|| Arc::new(handle));
        Ok(Lookup::Found(shared.clone()))
    }

    /// Resolve storage or fail.
    ///
    /// `MissingTarget` when no field or property exists; `StaticMismatch`
    /// when `require_static` is set and the storage is instance-scoped.
    pub fn resolve(
        &self,
        directory: &dyn TypeDirectory,
        owner: TypeId,
        name: &str,
        require_static: bool,
    ) -> Result<Arc<VariableHandle>, ForwardError> {
        let handle = match self.lookup(directory, owner, name)? {
            Lookup::Found(handle) => handle,
            Lookup::NotFound => {
                return Err(ForwardError::missing(
                    &directory.type_name(owner),
                    name,
                    "no field or property with this name",
                ))
            }
        };
        if require_static && !handle.is_static {
            return Err(ForwardError::StaticMismatch {
                target: handle.label.clone(),
                expected_static: true,
            });
        }
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    fn build(directory: &dyn TypeDirectory, owner: TypeId, name: &str) -> Option<VariableHandle> {
        let mut current = Some(owner);
        while let Some(id) = current {
            let def = directory.type_def(id)?;
            if let Some((_, field)) = def.field(name) {
                let access = match field.static_cell() {
                    Some(cell) => Access::StaticField(cell.clone()),
                    None => Access::InstanceField,
                };
                return Some(VariableHandle {
                    owner: id,
                    name: name.to_string(),
                    label: format!("{}.{}", def.full_name, name),
                    value_type: field.value_type,
                    is_static: field.is_static(),
                    read_only: field.read_only,
                    access,
                });
            }
            current = def.base;
        }

        let mut current = Some(owner);
        while let Some(id) = current {
            let def = directory.type_def(id)?;
            if let Some((_, prop)) = def.property(name) {
                return Some(VariableHandle {
                    owner: id,
                    name: name.to_string(),
                    label: format!("{}.{}", def.full_name, name),
                    value_type: prop.value_type,
                    is_static: prop.is_static,
                    read_only: prop.setter.is_none(),
                    access: Access::Property {
                        getter: prop.getter.map(|i| MethodRef::new(id, i)),
                        setter: prop.setter.map(|i| MethodRef::new(id, i)),
                    },
                });
            }
            current = def.base;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_types::directory::{LocalTypeDirectory, PropertyShape, TypeBuilder};
    use forward_types::model::FieldDef;

    fn fixture() -> (LocalTypeDirectory, TypeId, TypeId) {
        let dir = LocalTypeDirectory::new();
        let base = dir
            .register(
                TypeBuilder::class("Demo", "Demo.Base")
                    .field(FieldDef::instance("count", TypeId::INT32))
                    .field(FieldDef::instance("frozen", TypeId::INT32).read_only())
                    .field(FieldDef::new_static("Shared", TypeId::STRING, Value::string("s")))
                    .auto_property("Level", TypeId::INT32, PropertyShape::INSTANCE_GET_SET)
                    .auto_property("Version", TypeId::INT32, PropertyShape::STATIC_GET),
            )
            .unwrap();
        let derived = dir
            .register(
                TypeBuilder::class("Demo", "Demo.Derived")
                    .extends(base)
                    .auto_property("count", TypeId::INT64, PropertyShape::INSTANCE_GET_SET),
            )
            .unwrap();
        (dir, base, derived)
    }

    #[test]
    fn test_same_handle_for_same_key() {
        let (dir, base, _) = fixture();
        let resolver = VariableResolver::new();
        let first = resolver.resolve(&dir, base, "count", false).unwrap();
        let second = resolver.resolve(&dir, base, "count", false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_field_wins_over_property() {
        let (dir, _, derived) = fixture();
        let resolver = VariableResolver::new();
        let handle = resolver.resolve(&dir, derived, "count", false).unwrap();
        assert_eq!(handle.kind(), StorageKind::Field);
        assert_eq!(handle.value_type(), TypeId::INT32);
    }

    #[test]
    fn test_missing_and_static_mismatch() {
        let (dir, base, _) = fixture();
        let resolver = VariableResolver::new();
        let err = resolver.resolve(&dir, base, "nothing", false).unwrap_err();
        assert_eq!(err.kind(), "MissingTarget");
        let err = resolver.resolve(&dir, base, "count", true).unwrap_err();
        assert_eq!(err.kind(), "StaticMismatch");
        assert!(resolver.resolve(&dir, base, "Shared", true).is_ok());
    }

    #[test]
    fn test_instance_field_get_set() {
        let (dir, base, derived) = fixture();
        let resolver = VariableResolver::new();
        let count = resolver.resolve(&dir, base, "count", false).unwrap();
        let obj = dir.instantiate(derived).unwrap();

        count.set(&dir, Some(&obj), Value::Int32(7)).unwrap();
        assert_eq!(count.get(&dir, Some(&obj)).unwrap(), Value::Int32(7));

        assert!(matches!(
            count.get(&dir, None),
            Err(Fault::NullReference { .. })
        ));
        assert!(matches!(
            count.set(&dir, Some(&obj), Value::string("x")),
            Err(Fault::InvalidCast { .. })
        ));
    }

    #[test]
    fn test_read_only_storage() {
        let (dir, base, _) = fixture();
        let resolver = VariableResolver::new();
        let frozen = resolver.resolve(&dir, base, "frozen", false).unwrap();
        assert!(frozen.gettable());
        assert!(!frozen.settable());
        let version = resolver.resolve(&dir, base, "Version", true).unwrap();
        assert_eq!(version.kind(), StorageKind::Property);
        assert!(!version.settable());
        assert_eq!(version.get(&dir, None).unwrap(), Value::Int32(0));
    }

    #[test]
    fn test_property_storage_round_trip() {
        let (dir, base, _) = fixture();
        let resolver = VariableResolver::new();
        let level = resolver.resolve(&dir, base, "Level", false).unwrap();
        let obj = dir.instantiate(base).unwrap();
        level.set(&dir, Some(&obj), Value::Int32(3)).unwrap();
        assert_eq!(level.get(&dir, Some(&obj)).unwrap(), Value::Int32(3));
    }

    #[test]
    fn test_clear_drops_handles() {
        let (dir, base, _) = fixture();
        let resolver = VariableResolver::new();
        let first = resolver.resolve(&dir, base, "Shared", false).unwrap();
        resolver.clear();
        assert!(resolver.is_empty());
        let second = resolver.resolve(&dir, base, "Shared", false).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
