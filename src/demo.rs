//! The demo model: a small class hierarchy with hidden members, and a
//! `Program` type whose stubs forward to them through `Program.Instance`.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use forward_core::{
    ActivationReport, ForwardConfig, ForwardRegistry, MemoryPatcherProvider, PatchGroupManager,
    PatchTable, ResolvedTarget,
};
use forward_types::{
    Annotation, FieldDef, LocalTypeDirectory, MethodDef, PropertyShape, TypeBuilder,
    TypeDirectory, TypeId, Value,
};
use serde::Serialize;
use tracing::{debug, info};

/// Module every demo type is registered in.
pub const DEMO_MODULE: &str = "MemberForwarding";
/// Patch group used when none is given.
pub const DEFAULT_GROUP: &str = "demo";

const PROGRAM: &str = "MemberForwarding.Program";

/// Ids of the demo types.
#[derive(Debug, Clone, Copy)]
pub struct DemoTypes {
    pub a: TypeId,
    pub b: TypeId,
    pub c: TypeId,
    pub program: TypeId,
}

/// Register the demo model:
///
/// - `A`, `B : A` with instance `ForwardField = 1` and `ForwardMethod()`, `C : B`
/// - `Program` with a static `Instance: A` holding a `B`, a `PatchMethod()`
///   stub forwarded to `B.ForwardMethod` and a get-only `PatchProperty` stub
///   forwarded to `B.ForwardField`
pub fn build_model(directory: &LocalTypeDirectory) -> Result<DemoTypes> {
    let a = directory.register(TypeBuilder::class(DEMO_MODULE, "MemberForwarding.A"))?;
    let b = directory.register(
        TypeBuilder::class(DEMO_MODULE, "MemberForwarding.B")
            .extends(a)
            .field(FieldDef::instance("ForwardField", TypeId::INT32))
            .method(MethodDef::new("ForwardMethod", vec![], TypeId::VOID, |inv| {
                let this = inv.this_object("MemberForwarding.B.ForwardMethod")?;
                info!(receiver = this.type_name(), "called forwarded method");
                Ok(Value::Null)
            })),
    )?;
    let c = directory.register(TypeBuilder::class(DEMO_MODULE, "MemberForwarding.C").extends(b))?;

    let instance = directory.instantiate(b)?;
    if let Some(obj) = instance.as_object() {
        obj.set_field("ForwardField", Value::Int32(1));
    }

    let program = directory.register(
        TypeBuilder::class(DEMO_MODULE, PROGRAM)
            .field(FieldDef::new_static("Instance", a, instance))
            .method(
                MethodDef::stub("PatchMethod", vec![], TypeId::VOID)
                    .annotate(Annotation::forward_to(b, "ForwardMethod"))
                    .annotate(Annotation::Debug)
                    .annotate(Annotation::receiver_from_named(PROGRAM, Some(DEMO_MODULE), "Instance")),
            )
            .property_with(
                "PatchProperty",
                TypeId::INT32,
                PropertyShape::STATIC_GET,
                vec![
                    Annotation::forward_to(b, "ForwardField"),
                    Annotation::receiver_from_named(PROGRAM, Some(DEMO_MODULE), "Instance"),
                ],
            ),
    )?;
    debug!(types = directory.len(), "demo model registered");
    Ok(DemoTypes { a, b, c, program })
}

/// One stub call made by the demo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub call: String,
    pub result: String,
}

/// One of the generated routines behind a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutineInfo {
    pub stub: String,
    pub listing: Vec<String>,
}

/// A registry binding as shown by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclarationInfo {
    pub key: String,
    pub kind: &'static str,
    pub target: String,
    pub convention: String,
    pub receiver_source: Option<String>,
    pub group: String,
    pub activated: bool,
    pub routines: Vec<RoutineInfo>,
}

/// The demo model wired to a registry, an in-memory patch table and a manager.
pub struct DemoSession {
    pub types: DemoTypes,
    pub directory: Arc<LocalTypeDirectory>,
    pub registry: Arc<ForwardRegistry>,
    pub table: Arc<PatchTable>,
    pub manager: PatchGroupManager,
}

impl DemoSession {
    pub fn new(config: ForwardConfig) -> Result<Self> {
        let directory = LocalTypeDirectory::new();
        let types = build_model(&directory).context("failed to build demo model")?;
        let directory = Arc::new(directory);
        let registry = Arc::new(ForwardRegistry::new());
        let table = Arc::new(PatchTable::new(directory.clone()));
        let manager = PatchGroupManager::new(directory.clone(), registry.clone(), config)
            .with_patcher_provider(Arc::new(MemoryPatcherProvider::new(table.clone())));
        Ok(Self {
            types,
            directory,
            registry,
            table,
            manager,
        })
    }

    /// Activate the configured scope, or every module when none is set.
    pub fn activate(&self, group: &str) -> Result<ActivationReport> {
        let result = match self.manager.config().default_scope.as_deref() {
            Some(scope) => self.manager.forward_scope(group, scope),
            None => self.manager.forward_all(group),
        };
        result.with_context(|| format!("failed to activate group {}", group))
    }

    /// Call both stubs, then change the hidden field and read it back.
    pub fn run_calls(&self) -> Result<Vec<CallRecord>> {
        let program = self.types.program;
        let mut calls = Vec::new();

        let value = self
            .table
            .call_static(program, "PatchMethod", &[])
            .map_err(|f| anyhow!("PatchMethod() failed: {}", f))?;
        calls.push(record("Program.PatchMethod()", &value));

        let value = self
            .table
            .get_property(program, "PatchProperty")
            .map_err(|f| anyhow!("PatchProperty failed: {}", f))?;
        calls.push(record("Program.PatchProperty", &value));

        let holder = self.holder()?;
        let obj = holder
            .as_object()
            .ok_or_else(|| anyhow!("Program.Instance is null"))?;
        obj.set_field("ForwardField", Value::Int32(42));
        let value = self
            .table
            .get_property(program, "PatchProperty")
            .map_err(|f| anyhow!("PatchProperty failed: {}", f))?;
        calls.push(record("Program.PatchProperty (after ForwardField = 42)", &value));

        Ok(calls)
    }

    /// Every binding in the registry with its target and generated routines.
    pub fn declarations(&self) -> Vec<DeclarationInfo> {
        let directory: &dyn TypeDirectory = self.directory.as_ref();
        self.registry
            .bindings()
            .iter()
            .map(|binding| {
                let resolved = binding.resolved();
                let kind = match resolved {
                    ResolvedTarget::Method { .. } => "method",
                    ResolvedTarget::Storage { .. } => "storage",
                };
                let routines = binding
                    .stubs()
                    .iter()
                    .map(|stub| RoutineInfo {
                        stub: directory.method_label(*stub),
                        listing: self.table.listing(*stub).unwrap_or_default(),
                    })
                    .collect();
                DeclarationInfo {
                    key: binding.key().to_string(),
                    kind,
                    target: resolved.describe(directory),
                    convention: format!("{:?}", resolved.convention()),
                    receiver_source: binding.receiver_source().map(|v| v.label().to_string()),
                    group: binding.group().to_string(),
                    activated: binding.is_activated(),
                    routines,
                }
            })
            .collect()
    }

    fn holder(&self) -> Result<Value> {
        let def = self
            .directory
            .type_def(self.types.program)
            .ok_or_else(|| anyhow!("{} is not registered", PROGRAM))?;
        let (_, field) = def
            .field("Instance")
            .ok_or_else(|| anyhow!("{} has no Instance field", PROGRAM))?;
        let cell = field
            .static_cell()
            .ok_or_else(|| anyhow!("{}.Instance is not static", PROGRAM))?;
        let value = cell.lock().clone();
        Ok(value)
    }
}

fn record(call: &str, value: &Value) -> CallRecord {
    CallRecord {
        call: call.to_string(),
        result: value.to_string(),
    }
}
