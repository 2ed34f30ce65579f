#![allow(dead_code)]
//! Shared fixtures for forward-core integration tests.
//!
//! - [`targets`]: the target model (`A <- B <- C` plus a `Program` holder)
//! - [`Harness`]: directory, registry, patch table and manager wired together
//! - [`assert_kind`]: check the kind of an activation error

use std::sync::Arc;

use forward_core::{
    ActivationReport, ForwardConfig, ForwardRegistry, MemoryPatcherProvider, PatchGroupManager,
    PatchTable,
};
use forward_types::{
    Fault, FieldDef, ForwardError, LocalTypeDirectory, MethodDef, Param, TypeBuilder,
    TypeDirectory, TypeId, Value,
};

/// Module the target types live in.
pub const TARGET_MODULE: &str = "Targets";
/// Module stub types are registered in.
pub const APP_MODULE: &str = "App";

/// Ids of the target model.
#[derive(Debug, Clone, Copy)]
pub struct Targets {
    pub a: TypeId,
    pub b: TypeId,
    pub c: TypeId,
    pub program: TypeId,
}

/// Register the target model:
///
/// - `A.Describe() -> "A"`
/// - `B : A` with `count`, read-only `limit`, static `Counter`,
///   `Compute(x) = 2x + count`, `MakeA`, `MakeC`, static `Twice` and `Overflow`,
///   and `Describe() -> "B"`
/// - `C : B` with `Describe() -> "C"`
/// - `Program` with a static `Instance: B` and an instance field `Local: B`
pub fn targets(dir: &LocalTypeDirectory) -> Targets {
    let a = dir
        .register(
            TypeBuilder::class(TARGET_MODULE, "Targets.A").method(MethodDef::new(
                "Describe",
                vec![],
                TypeId::STRING,
                |_| Ok(Value::string("A")),
            )),
        )
        .unwrap();
    let b = dir.declare(TARGET_MODULE, "Targets.B").unwrap();
    let c = dir.declare(TARGET_MODULE, "Targets.C").unwrap();
    dir.define(
        b,
        TypeBuilder::class(TARGET_MODULE, "Targets.B")
            .extends(a)
            .field(FieldDef::instance("count", TypeId::INT32))
            .field(FieldDef::instance("limit", TypeId::INT32).read_only())
            .field(FieldDef::new_static("Counter", TypeId::INT32, Value::Int32(0)))
            .method(MethodDef::new(
                "Compute",
                vec![Param::new("x", TypeId::INT32)],
                TypeId::INT32,
                |inv| {
                    let count = inv
                        .this_object("Targets.B.Compute")?
                        .field("count")
                        .and_then(|v| v.as_i32())
                        .unwrap_or(0);
                    Ok(Value::Int32(inv.arg_i32(0)? * 2 + count))
                },
            ))
            .method(MethodDef::new("MakeA", vec![], a, move |_| Ok(Value::Null)))
            .method(MethodDef::new("MakeC", vec![], c, move |_| Ok(Value::Null)))
            .method(MethodDef::new_static(
                "Twice",
                vec![Param::new("x", TypeId::INT32)],
                TypeId::INT32,
                |inv| Ok(Value::Int32(inv.arg_i32(0)? * 2)),
            ))
            .method(MethodDef::new_static("Overflow", vec![], TypeId::INT32, |_| {
                Err(Fault::ResourceExhausted {
                    resource: "call stack".into(),
                })
            }))
            .method(MethodDef::new(
                "Describe",
                vec![],
                TypeId::STRING,
                |_| Ok(Value::string("B")),
            )),
    )
    .unwrap();
    dir.define(
        c,
        TypeBuilder::class(TARGET_MODULE, "Targets.C")
            .extends(b)
            .method(MethodDef::new(
                "Describe",
                vec![],
                TypeId::STRING,
                |_| Ok(Value::string("C")),
            )),
    )
    .unwrap();
    let holder = dir.instantiate(b).unwrap();
    let program = dir
        .register(
            TypeBuilder::class(TARGET_MODULE, "Targets.Program")
                .field(FieldDef::new_static("Instance", b, holder))
                .field(FieldDef::instance("Local", b)),
        )
        .unwrap();
    Targets { a, b, c, program }
}

/// Current value of `Program.Instance`.
pub fn holder(dir: &LocalTypeDirectory, t: &Targets) -> Value {
    let def = dir.type_def(t.program).unwrap();
    let (_, field) = def.field("Instance").unwrap();
    let cell = field.static_cell().unwrap();
    let value = cell.lock().clone();
    value
}

pub struct Harness {
    pub directory: Arc<LocalTypeDirectory>,
    pub registry: Arc<ForwardRegistry>,
    pub table: Arc<PatchTable>,
    pub manager: PatchGroupManager,
}

impl Harness {
    pub fn new(directory: LocalTypeDirectory) -> Self {
        Self::with_config(directory, ForwardConfig::default())
    }

    pub fn with_config(directory: LocalTypeDirectory, config: ForwardConfig) -> Self {
        let directory = Arc::new(directory);
        let registry = Arc::new(ForwardRegistry::new());
        let table = Arc::new(PatchTable::new(directory.clone()));
        let manager = PatchGroupManager::new(directory.clone(), registry.clone(), config)
            .with_patcher_provider(Arc::new(MemoryPatcherProvider::new(table.clone())));
        Self {
            directory,
            registry,
            table,
            manager,
        }
    }

    pub fn activate(&self, group: &str, types: &[TypeId]) -> ActivationReport {
        self.manager
            .forward_types(group, types)
            .unwrap_or_else(|e| panic!("activation of {:?} failed: {}", types, e))
    }

    pub fn call(&self, owner: TypeId, name: &str, args: &[Value]) -> Result<Value, Fault> {
        self.table.call_static(owner, name, args)
    }
}

/// Assert that an activation failed with the given error kind.
pub fn assert_kind<T: std::fmt::Debug>(result: Result<T, ForwardError>, kind: &str) {
    match result {
        Ok(value) => panic!("expected {} but activation succeeded: {:?}", kind, value),
        Err(err) => assert_eq!(err.kind(), kind, "unexpected error: {}", err),
    }
}
