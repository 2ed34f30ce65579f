//! Code patching.
//!
//! [`CodePatcher`] is the seam through which generated routines become a
//! stub's live behavior. One patcher context exists per patch group; a
//! [`PatcherProvider`] creates them on demand.
//!
//! The in-memory implementation keeps a [`PatchTable`] of method-slot
//! overrides. Calls made through the table run the installed routine for a
//! patched slot and the original body otherwise.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use forward_types::directory::TypeDirectory;
use forward_types::errors::{Fault, ForwardError};
use forward_types::model::{MethodRef, TypeId};
use forward_types::value::Value;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::trampoline::{Dispatch, FaultHook};

/// Installs dispatch routines for one patch group.
pub trait CodePatcher: Send + Sync {
    /// Group id this context belongs to.
    fn group(&self) -> &str;

    /// Make `routine` the body of `stub`. With `fault_guard`, every fault
    /// escaping the routine is passed through the hook first.
    fn install(
        &self,
        stub: MethodRef,
        routine: Arc<dyn Dispatch>,
        fault_guard: Option<FaultHook>,
    ) -> Result<(), ForwardError>;

    /// Stub slots installed through this context.
    fn installed(&self) -> Vec<MethodRef>;
}

/// Creates one [`CodePatcher`] per group id.
pub trait PatcherProvider: Send + Sync {
    fn create(&self, group: &str) -> Result<Arc<dyn CodePatcher>, ForwardError>;
}

struct InstalledRoutine {
    group: String,
    routine: Arc<dyn Dispatch>,
    guard: Option<FaultHook>,
}

/// Method-slot overrides shared by every in-memory patcher.
pub struct PatchTable {
    directory: Arc<dyn TypeDirectory>,
    routines: RwLock<HashMap<MethodRef, InstalledRoutine>>,
}

impl PatchTable {
    pub fn new(directory: Arc<dyn TypeDirectory>) -> Self {
        Self {
            directory,
            routines: RwLock::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Arc<dyn TypeDirectory> {
        &self.directory
    }

    fn install(
        &self,
        group: &str,
        stub: MethodRef,
        routine: Arc<dyn Dispatch>,
        guard: Option<FaultHook>,
    ) -> Result<(), ForwardError> {
        let def = self.directory.method_def(stub).ok_or_else(|| {
            ForwardError::argument(
                "stub",
                format!("{} is not a method slot", self.directory.method_label(stub)),
            )
        })?;
        if !def.is_static {
            return Err(ForwardError::shape(
                self.directory.method_label(stub),
                "only static stubs can be patched",
            ));
        }
        let mut routines = self.routines.write();
        if let Some(previous) = routines.get(&stub) {
            warn!(
                stub = %self.directory.method_label(stub),
                previous_group = %previous.group,
                group,
                "replacing routine installed by another group"
            );
        }
        routines.insert(
            stub,
            InstalledRoutine {
                group: group.to_string(),
                routine,
                guard,
            },
        );
        Ok(())
    }

    /// Call a method slot. Patched slots run their routine, others their
    /// original body (virtually when a receiver is given).
    pub fn call(
        &self,
        method: MethodRef,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, Fault> {
        let installed = self
            .routines
            .read()
            .get(&method)
            .map(|r| (r.routine.clone(), r.guard.clone()));
        let Some((routine, guard)) = installed else {
            return self
                .directory
                .invoke(method, receiver, args, receiver.is_some());
        };
        let label = self.directory.method_label(method);
        let def = self
            .directory
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
        trace!(stub = %label, key = %routine.key(), "dispatch");
        match (routine.dispatch(args), guard) {
            (Err(fault), Some(guard)) => Err(guard(fault)),
            (result, _) => result,
        }
    }

    /// Call a static method by name.
    pub fn call_static(&self, owner: TypeId, name: &str, args: &[Value]) -> Result<Value, Fault> {
        let method = self.method_named(owner, name)?;
        self.call(method, None, args)
    }

    /// Read a static property through its getter slot.
    pub fn get_property(&self, owner: TypeId, name: &str) -> Result<Value, Fault> {
        let (getter, _) = self.accessors(owner, name)?;
        let getter = getter.ok_or_else(|| Fault::MissingMember {
            member: format!("{}.get_{}", self.directory.type_name(owner), name),
        })?;
        self.call(getter, None, &[])
    }

    /// Write a static property through its setter slot.
    pub fn set_property(&self, owner: TypeId, name: &str, value: Value) -> Result<(), Fault> {
        let (_, setter) = self.accessors(owner, name)?;
        let setter = setter.ok_or_else(|| Fault::MissingMember {
            member: format!("{}.set_{}", self.directory.type_name(owner), name),
        })?;
        self.call(setter, None, &[value]).map(|_| ())
    }

    pub fn is_patched(&self, method: MethodRef) -> bool {
        self.routines.read().contains_key(&method)
    }

    /// Group that installed the routine for `method`.
    pub fn group_of(&self, method: MethodRef) -> Option<String> {
        self.routines.read().get(&method).map(|r| r.group.clone())
    }

    /// Slots patched by `group`, in slot order.
    pub fn routines_in(&self, group: &str) -> Vec<MethodRef> {
        let mut slots: Vec<_> = self
            .routines
            .read()
            .iter()
            .filter(|(_, r)| r.group == group)
            .map(|(m, _)| *m)
            .collect();
        slots.sort();
        slots
    }

    /// Listing of the routine installed for `method`.
    pub fn listing(&self, method: MethodRef) -> Option<Vec<String>> {
        self.routines
            .read()
            .get(&method)
            .map(|r| r.routine.listing().to_vec())
    }

    /// Restore the original bodies of every slot patched by `group`.
    pub fn remove_group(&self, group: &str) -> usize {
        let mut routines = self.routines.write();
        let before = routines.len();
        routines.retain(|_, r| r.group != group);
        let removed = before - routines.len();
        debug!(group, removed, "removed patch group");
        removed
    }

    pub fn len(&self) -> usize {
        self.routines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.read().is_empty()
    }

    fn method_named(&self, owner: TypeId, name: &str) -> Result<MethodRef, Fault> {
        self.directory
            .type_def(owner)
            .and_then(|def| def.method_named(name))
            .map(|index| MethodRef::new(owner, index))
            .ok_or_else(|| Fault::MissingMember {
                member: format!("{}.{}", self.directory.type_name(owner), name),
            })
    }

    fn accessors(
        &self,
        owner: TypeId,
        name: &str,
    ) -> Result<(Option<MethodRef>, Option<MethodRef>), Fault> {
        let def = self.directory.type_def(owner).ok_or_else(|| Fault::MissingMember {
            member: format!("{}.{}", owner, name),
        })?;
        let (_, prop) = def.property(name).ok_or_else(|| Fault::MissingMember {
            member: format!("{}.{}", def.full_name, name),
        })?;
        Ok((
            prop.getter.map(|i| MethodRef::new(owner, i)),
            prop.setter.map(|i| MethodRef::new(owner, i)),
        ))
    }
}

impl fmt::Debug for PatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchTable")
            .field("patched", &self.len())
            .finish_non_exhaustive()
    }
}

/// Patcher context for one group, writing into a shared [`PatchTable`].
pub struct MemoryPatcher {
    group: String,
    table: Arc<PatchTable>,
}

impl MemoryPatcher {
    pub fn new(group: impl Into<String>, table: Arc<PatchTable>) -> Self {
        Self {
            group: group.into(),
            table,
        }
    }
}

impl CodePatcher for MemoryPatcher {
    fn group(&self) -> &str {
        &self.group
    }

    fn install(
        &self,
        stub: MethodRef,
        routine: Arc<dyn Dispatch>,
        fault_guard: Option<FaultHook>,
    ) -> Result<(), ForwardError> {
        self.table.install(&self.group, stub, routine, fault_guard)
    }

    fn installed(&self) -> Vec<MethodRef> {
        self.table.routines_in(&self.group)
    }
}

/// Hands out [`MemoryPatcher`]s over one table.
#[derive(Debug, Clone)]
pub struct MemoryPatcherProvider {
    table: Arc<PatchTable>,
}

impl MemoryPatcherProvider {
    pub fn new(table: Arc<PatchTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Arc<PatchTable> {
        &self.table
    }
}

impl PatcherProvider for MemoryPatcherProvider {
    fn create(&self, group: &str) -> Result<Arc<dyn CodePatcher>, ForwardError> {
        if group.trim().is_empty() {
            return Err(ForwardError::argument("group", "must not be empty or blank"));
        }
        debug!(group, "created patcher context");
        Ok(Arc::new(MemoryPatcher::new(group, self.table.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trampoline::{FaultGuard, TrampolineShape};
    use forward_types::directory::{LocalTypeDirectory, PropertyShape, TypeBuilder};
    use forward_types::key::RegistryKey;
    use forward_types::model::{MethodDef, Param};

    /// Returns a constant, or fails with the fault it was built with.
    struct Fixed {
        key: RegistryKey,
        result: Result<Value, Fault>,
        listing: Vec<String>,
    }

    impl Dispatch for Fixed {
        fn dispatch(&self, _args: &[Value]) -> Result<Value, Fault> {
            self.result.clone()
        }
        fn key(&self) -> &RegistryKey {
            &self.key
        }
        fn shape(&self) -> TrampolineShape {
            TrampolineShape::Method
        }
        fn listing(&self) -> &[String] {
            &self.listing
        }
    }

    fn fixed(result: Result<Value, Fault>) -> Arc<dyn Dispatch> {
        Arc::new(Fixed {
            key: RegistryKey::new("Demo", "Demo.Stubs", "Stub"),
            result,
            listing: vec!["ret".to_string()],
        })
    }

    fn fixture() -> (Arc<PatchTable>, TypeId) {
        let dir = LocalTypeDirectory::new();
        let stubs = dir
            .register(
                TypeBuilder::class("Demo", "Demo.Stubs")
                    .method(MethodDef::stub(
                        "Stub",
                        vec![Param::new("x", TypeId::INT32)],
                        TypeId::INT32,
                    ))
                    .method(MethodDef::new("Instance", vec![], TypeId::INT32, |_| {
                        Ok(Value::Int32(1))
                    }))
                    .auto_property("P", TypeId::INT32, PropertyShape::STATIC_GET_SET),
            )
            .unwrap();
        (Arc::new(PatchTable::new(Arc::new(dir))), stubs)
    }

    #[test]
    fn test_unpatched_runs_original() {
        let (table, stubs) = fixture();
        assert_eq!(
            table.call_static(stubs, "Stub", &[Value::Int32(3)]),
            Ok(Value::Int32(0))
        );
        table.set_property(stubs, "P", Value::Int32(4)).unwrap();
        assert_eq!(table.get_property(stubs, "P"), Ok(Value::Int32(4)));
    }

    #[test]
    fn test_patched_slot_runs_routine() {
        let (table, stubs) = fixture();
        let provider = MemoryPatcherProvider::new(table.clone());
        let patcher = provider.create("g1").unwrap();
        let slot = MethodRef::new(stubs, 0);
        patcher
            .install(slot, fixed(Ok(Value::Int32(42))), None)
            .unwrap();
        assert!(table.is_patched(slot));
        assert_eq!(table.group_of(slot).as_deref(), Some("g1"));
        assert_eq!(patcher.installed(), vec![slot]);
        assert_eq!(
            table.call_static(stubs, "Stub", &[Value::Int32(3)]),
            Ok(Value::Int32(42))
        );
        assert!(matches!(
            table.call_static(stubs, "Stub", &[]),
            Err(Fault::ArgumentCount { expected: 1, got: 0, .. })
        ));
    }

    #[test]
    fn test_guard_wraps_dispatch() {
        let (table, stubs) = fixture();
        let patcher = MemoryPatcher::new("g1", table.clone());
        let exhausted = Err(Fault::ResourceExhausted {
            resource: "stack".into(),
        });
        patcher
            .install(MethodRef::new(stubs, 0), fixed(exhausted.clone()), Some(FaultGuard::hook()))
            .unwrap();
        let err = table
            .call_static(stubs, "Stub", &[Value::Int32(0)])
            .unwrap_err();
        assert!(matches!(err, Fault::InvalidCast { .. }));

        patcher
            .install(MethodRef::new(stubs, 0), fixed(exhausted), None)
            .unwrap();
        let err = table
            .call_static(stubs, "Stub", &[Value::Int32(0)])
            .unwrap_err();
        assert!(matches!(err, Fault::ResourceExhausted { .. }));
    }

    #[test]
    fn test_instance_slots_rejected() {
        let (table, stubs) = fixture();
        let patcher = MemoryPatcher::new("g1", table);
        let err = patcher
            .install(MethodRef::new(stubs, 1), fixed(Ok(Value::Null)), None)
            .unwrap_err();
        assert_eq!(err.kind(), "UnsupportedShape");
    }

    #[test]
    fn test_remove_group_restores_originals() {
        let (table, stubs) = fixture();
        let provider = MemoryPatcherProvider::new(table.clone());
        let g1 = provider.create("g1").unwrap();
        g1.install(MethodRef::new(stubs, 0), fixed(Ok(Value::Int32(9))), None)
            .unwrap();
        assert_eq!(table.remove_group("g2"), 0);
        assert_eq!(table.remove_group("g1"), 1);
        assert!(table.is_empty());
        assert_eq!(
            table.call_static(stubs, "Stub", &[Value::Int32(3)]),
            Ok(Value::Int32(0))
        );
        assert!(provider.create("  ").is_err());
    }
}
